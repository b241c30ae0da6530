//! Machine-readable output
//!
//! Stable envelope: `{ schema_version, command, generated_at, subject,
//! result, notes[] }`. Field names are snake_case; `generated_at` is the
//! only field that varies between identical runs.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::SCHEMA_VERSION;
use crate::models::{
    CapacityWarning, CertificateWarning, DiagnosisReport, GraphEdge, GraphNode, GraphReport,
    GraphStats, Issue, Severity, Subject, TopReport,
};

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'static str,
    generated_at: String,
    subject: &'a Subject,
    result: T,
    notes: &'a [String],
}

#[derive(Serialize)]
struct DiagResult<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    root_cause: Option<&'a Issue>,
    contributing_factors: &'a [Issue],
    all_issues: &'a [Issue],
    suggested_actions: &'a [String],
    summary: DiagSummary,
    exit_code: i32,
}

#[derive(Serialize)]
struct DiagSummary {
    total_issues: usize,
    critical: usize,
    warning: usize,
    info: usize,
}

#[derive(Serialize)]
struct GraphResult<'a> {
    nodes: &'a [GraphNode],
    edges: &'a [GraphEdge],
    stats: GraphStats,
}

#[derive(Serialize)]
struct TopResult<'a> {
    horizon_hours: u32,
    capacity_warnings: &'a [CapacityWarning],
    certificate_warnings: &'a [CertificateWarning],
    notes: &'a [String],
}

pub struct JsonRenderer {
    now: DateTime<Utc>,
}

impl JsonRenderer {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    fn generated_at(&self) -> String {
        self.now.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn render_diag(&self, report: &DiagnosisReport) -> String {
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            command: "diag",
            generated_at: self.generated_at(),
            subject: &report.subject,
            result: DiagResult {
                root_cause: report.root_cause.as_ref(),
                contributing_factors: &report.contributing_factors,
                all_issues: &report.issues,
                suggested_actions: &report.suggested_actions,
                summary: DiagSummary {
                    total_issues: report.issues.len(),
                    critical: report.count_by_severity(Severity::Critical),
                    warning: report.count_by_severity(Severity::Warning),
                    info: report.count_by_severity(Severity::Info),
                },
                exit_code: report.exit_code(),
            },
            notes: &report.notes,
        };
        to_pretty(&envelope)
    }

    pub fn render_graph(&self, report: &GraphReport) -> String {
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            command: "graph",
            generated_at: self.generated_at(),
            subject: &report.subject,
            result: GraphResult {
                nodes: &report.nodes,
                edges: &report.edges,
                stats: report.stats,
            },
            notes: &report.notes,
        };
        to_pretty(&envelope)
    }

    pub fn render_top(&self, report: &TopReport) -> String {
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            command: "top",
            generated_at: self.generated_at(),
            subject: &report.subject,
            result: TopResult {
                horizon_hours: report.horizon_hours,
                capacity_warnings: &report.capacity_warnings,
                certificate_warnings: &report.certificate_warnings,
                notes: &report.notes,
            },
            notes: &report.notes,
        };
        to_pretty(&envelope)
    }

    pub fn render_error(&self, message: &str) -> String {
        #[derive(Serialize)]
        struct ErrorOut<'a> {
            schema_version: &'static str,
            error: bool,
            message: &'a str,
            generated_at: String,
        }
        to_pretty(&ErrorOut {
            schema_version: SCHEMA_VERSION,
            error: true,
            message,
            generated_at: self.generated_at(),
        })
    }
}

fn to_pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        format!("{{\"error\": true, \"message\": \"serialization failed: {e}\"}}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceKind;
    use std::time::Duration;

    fn report() -> DiagnosisReport {
        let issue = Issue {
            title: "CrashLoopBackOff: web".into(),
            reason: "CrashLoopBackOff".into(),
            message: "back-off restarting".into(),
            severity: Severity::Critical,
            score: 100,
            source: crate::models::IssueSource::Status,
            resource_uid: "u1".into(),
            resource: "Pod/default/web".into(),
            evidence: vec!["container app waiting".into()],
            suggested_actions: vec!["inspect logs".into()],
            count: 15,
            last_seen: None,
        };
        DiagnosisReport {
            subject: Subject::new(ResourceKind::Pod, "web", Some("default".into())),
            resource: None,
            issues: vec![issue.clone()],
            root_cause: Some(issue),
            contributing_factors: vec![],
            suggested_actions: vec!["inspect logs".into()],
            notes: vec!["events: access denied".into()],
            elapsed: Duration::from_millis(120),
        }
    }

    #[test]
    fn envelope_has_versioned_snake_case_shape() {
        let now = "2024-03-01T12:00:00Z".parse().unwrap();
        let output = JsonRenderer::new(now).render_diag(&report());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["schema_version"], "1.0");
        assert_eq!(value["command"], "diag");
        assert_eq!(value["generated_at"], "2024-03-01T12:00:00Z");
        assert_eq!(value["subject"]["kind"], "Pod");
        assert_eq!(value["result"]["summary"]["total_issues"], 1);
        assert_eq!(value["result"]["summary"]["critical"], 1);
        assert_eq!(value["result"]["root_cause"]["reason"], "CrashLoopBackOff");
        assert_eq!(value["result"]["root_cause"]["severity"], "critical");
        assert_eq!(value["result"]["exit_code"], 2);
        assert_eq!(value["notes"][0], "events: access denied");
    }

    #[test]
    fn identical_reports_render_identically() {
        let now: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();
        let renderer = JsonRenderer::new(now);
        assert_eq!(renderer.render_diag(&report()), renderer.render_diag(&report()));
    }
}
