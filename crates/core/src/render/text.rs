//! Human-readable output
//!
//! Sectioned text with severity coloring, ASCII trees for `graph`, and
//! tables for `top`. Box-drawing glyphs are used only when the locale
//! reports UTF-8; otherwise plain ASCII. Lines wrap at the configured
//! width (default 100 columns).

use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::models::{
    DiagnosisReport, GraphReport, Health, Issue, Severity, TopReport, TreeNode,
};

/// Children displayed per node before truncating with `(+N more)`.
pub const TREE_DISPLAY_CAP: usize = 50;

/// Row for the capacity warnings table.
#[derive(Tabled)]
struct CapacityRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Projected")]
    projected: String,
    #[tabled(rename = "Hours to 90%")]
    hours: String,
    #[tabled(rename = "Action")]
    action: String,
}

/// Row for the certificate warnings table.
#[derive(Tabled)]
struct CertificateRow {
    #[tabled(rename = "Secret")]
    secret: String,
    #[tabled(rename = "Expires")]
    expires: String,
    #[tabled(rename = "Days Left")]
    days_left: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Referenced By")]
    referenced_by: String,
    #[tabled(rename = "Action")]
    action: String,
}

pub struct TextRenderer {
    colors: bool,
    unicode: bool,
    width: usize,
    max_issues: usize,
}

impl TextRenderer {
    pub fn new(colors: bool, unicode: bool, width: usize, max_issues: usize) -> Self {
        Self {
            colors,
            unicode,
            width: width.max(40),
            max_issues: max_issues.max(1),
        }
    }

    /// Renderer configured from the process environment.
    pub fn from_env(colors: Option<bool>, max_issues: usize) -> Self {
        let unicode = std::env::var("LC_ALL")
            .or_else(|_| std::env::var("LANG"))
            .map(|v| v.to_ascii_uppercase().contains("UTF-8") || v.to_ascii_uppercase().contains("UTF8"))
            .unwrap_or(false);
        Self::new(colors.unwrap_or(true), unicode, 100, max_issues)
    }

    pub fn render_diag(&self, report: &DiagnosisReport) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "DIAGNOSIS: {}\n",
            self.bold(&report.subject.full_name())
        ));
        match &report.resource {
            Some(resource) => {
                let phase = resource.phase.as_deref().unwrap_or("Unknown");
                let readiness = match resource.ready {
                    Some(true) => " (ready)",
                    Some(false) => " (not ready)",
                    None => "",
                };
                out.push_str(&format!("Status: {}{readiness}\n", self.phase_colored(phase)));
            }
            None => out.push_str("Status: resource not retrieved\n"),
        }

        match &report.root_cause {
            Some(root) => {
                out.push_str(&format!("\n{}\n", self.bold("ROOT CAUSE")));
                self.push_issue(&mut out, root, true);
            }
            None => {
                out.push_str("\nNo root cause identified (no issue scored 50 or higher)\n");
            }
        }

        if !report.contributing_factors.is_empty() {
            out.push_str(&format!(
                "\n{} ({})\n",
                self.bold("CONTRIBUTING FACTORS"),
                report.contributing_factors.len()
            ));
            for (i, factor) in report.contributing_factors.iter().enumerate() {
                out.push_str(&format!(
                    "  {}. {} {} (score {})\n",
                    i + 1,
                    self.severity_glyph(factor.severity),
                    factor.title,
                    factor.score
                ));
                if !factor.message.is_empty() {
                    out.push_str(&self.wrapped(&factor.message, "     "));
                }
            }
        }

        let remaining = report.issues.len().saturating_sub(
            report.contributing_factors.len() + usize::from(report.root_cause.is_some()),
        );
        if remaining > 0 && report.issues.len() > self.max_issues {
            out.push_str(&format!(
                "  ({} lower-scored issue(s) not shown)\n",
                remaining
            ));
        }

        if !report.suggested_actions.is_empty() {
            out.push_str(&format!("\n{}\n", self.bold("SUGGESTED ACTIONS")));
            for (i, action) in report.suggested_actions.iter().enumerate() {
                out.push_str(&self.wrapped(&format!("{}. {action}", i + 1), "  "));
            }
        }

        self.push_notes(&mut out, &report.notes);
        out.push_str(&format!(
            "\nCompleted in {:.2}s\n",
            report.elapsed.as_secs_f64()
        ));
        out
    }

    pub fn render_graph(&self, report: &GraphReport) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "DEPENDENCY GRAPH: {}\n",
            self.bold(&report.subject.full_name())
        ));

        for (direction, tree) in &report.trees {
            out.push_str(&format!("\n{}\n", self.bold(&direction.to_string().to_uppercase())));
            out.push_str(&format!(
                "{} {}\n",
                self.health_glyph(tree.health),
                tree.label
            ));
            self.push_tree_children(&mut out, tree, "");
        }

        out.push_str(&format!(
            "\nLegend: {} healthy  {} warning  {} critical\n",
            self.health_glyph(Health::Healthy),
            self.health_glyph(Health::Warning),
            self.health_glyph(Health::Critical)
        ));

        out.push_str(&format!("\n{}\n", self.bold("GRAPH STATISTICS")));
        out.push_str(&format!("  Resources:    {}\n", report.stats.resources));
        out.push_str(&format!("  Dependencies: {}\n", report.stats.dependencies));
        out.push_str(&format!("  Upstream:     {}\n", report.stats.upstream));
        out.push_str(&format!("  Downstream:   {}\n", report.stats.downstream));

        self.push_notes(&mut out, &report.notes);
        out.push_str(&format!(
            "\nCompleted in {:.2}s\n",
            report.elapsed.as_secs_f64()
        ));
        out
    }

    pub fn render_top(&self, report: &TopReport) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "PREDICTIVE OUTLOOK: namespace {}\n",
            self.bold(&report.subject.name)
        ));
        out.push_str(&format!("Forecast horizon: {}h\n", report.horizon_hours));

        if !report.capacity_warnings.is_empty() {
            out.push_str(&format!(
                "\n{} ({})\n",
                self.bold("CAPACITY WARNINGS"),
                report.capacity_warnings.len()
            ));
            let rows: Vec<CapacityRow> = report
                .capacity_warnings
                .iter()
                .map(|w| CapacityRow {
                    resource: w.resource.clone(),
                    metric: w.metric.clone(),
                    severity: self.severity_text(w.severity),
                    current: format!("{:.1}%", w.current_percent),
                    projected: w
                        .projected_percent
                        .map(|p| format!("{p:.1}%"))
                        .unwrap_or_else(|| "-".into()),
                    hours: w
                        .hours_to_threshold
                        .map(|h| format!("{h:.0}h"))
                        .unwrap_or_else(|| "-".into()),
                    action: w.action.clone(),
                })
                .collect();
            out.push_str(&self.table(rows));
        }

        if !report.certificate_warnings.is_empty() {
            out.push_str(&format!(
                "\n{} ({})\n",
                self.bold("CERTIFICATE WARNINGS"),
                report.certificate_warnings.len()
            ));
            let rows: Vec<CertificateRow> = report
                .certificate_warnings
                .iter()
                .map(|w| CertificateRow {
                    secret: w.secret.clone(),
                    expires: w.expires.format("%Y-%m-%d").to_string(),
                    days_left: w.days_left.to_string(),
                    severity: self.severity_text(w.severity),
                    referenced_by: if w.referenced_by.is_empty() {
                        "-".into()
                    } else {
                        w.referenced_by.join(", ")
                    },
                    action: w.action.clone(),
                })
                .collect();
            out.push_str(&self.table(rows));
        }

        if report.capacity_warnings.is_empty() && report.certificate_warnings.is_empty() {
            out.push_str("\nNo capacity or certificate issues predicted\n");
        }

        self.push_notes(&mut out, &report.notes);
        out.push_str(&format!(
            "\nCompleted in {:.2}s\n",
            report.elapsed.as_secs_f64()
        ));
        out
    }

    pub fn render_error(&self, message: &str, hint: Option<&str>) -> String {
        let mut out = if self.colors {
            format!("{} {message}\n", "error:".red().bold())
        } else {
            format!("error: {message}\n")
        };
        if let Some(hint) = hint {
            out.push_str(&format!("hint: {hint}\n"));
        }
        out
    }

    fn push_issue(&self, out: &mut String, issue: &Issue, with_evidence: bool) {
        out.push_str(&format!(
            "  {} {} (score {})\n",
            self.severity_glyph(issue.severity),
            self.bold(&issue.title),
            issue.score
        ));
        if !issue.message.is_empty() {
            out.push_str(&self.wrapped(&issue.message, "    "));
        }
        if with_evidence {
            for line in &issue.evidence {
                out.push_str(&self.wrapped(&format!("- {line}"), "    "));
            }
        }
    }

    fn push_tree_children(&self, out: &mut String, node: &TreeNode, prefix: &str) {
        let shown = node.children.len().min(TREE_DISPLAY_CAP);
        let hidden = node.children.len() - shown;

        for (i, child) in node.children.iter().take(shown).enumerate() {
            let last = i + 1 == shown && hidden == 0;
            let (connector, continuation) = self.connectors(last);
            let marker = if child.back_reference {
                " (see above)"
            } else {
                ""
            };
            out.push_str(&format!(
                "{prefix}{connector}{} {}{marker}\n",
                self.health_glyph(child.health),
                child.label
            ));
            let child_prefix = format!("{prefix}{continuation}");
            self.push_tree_children(out, child, &child_prefix);
        }
        if hidden > 0 {
            let (connector, _) = self.connectors(true);
            out.push_str(&format!("{prefix}{connector}(+{hidden} more)\n"));
        }
    }

    fn connectors(&self, last: bool) -> (&'static str, &'static str) {
        if self.unicode {
            if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            }
        } else if last {
            ("`-- ", "    ")
        } else {
            ("|-- ", "|   ")
        }
    }

    fn push_notes(&self, out: &mut String, notes: &[String]) {
        if notes.is_empty() {
            return;
        }
        out.push_str(&format!("\n{}\n", self.bold("NOTES")));
        for note in notes {
            out.push_str(&self.wrapped(&format!("- {note}"), "  "));
        }
    }

    fn table<T: Tabled>(&self, rows: Vec<T>) -> String {
        let mut table = Table::new(rows);
        if self.unicode {
            table.with(Style::rounded());
        } else {
            table.with(Style::ascii());
        }
        format!("{table}\n")
    }

    /// Space-aware wrapping with a hanging indent.
    fn wrapped(&self, text: &str, indent: &str) -> String {
        let available = self.width.saturating_sub(indent.len()).max(20);
        let mut out = String::new();
        let mut line = String::new();
        for word in text.split_whitespace() {
            if !line.is_empty() && line.len() + 1 + word.len() > available {
                out.push_str(&format!("{indent}{line}\n"));
                line.clear();
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        if !line.is_empty() {
            out.push_str(&format!("{indent}{line}\n"));
        }
        out
    }

    fn severity_glyph(&self, severity: Severity) -> String {
        let raw = if self.unicode {
            match severity {
                Severity::Critical => "✗",
                Severity::Warning => "⚠",
                Severity::Info => "ℹ",
            }
        } else {
            match severity {
                Severity::Critical => "[x]",
                Severity::Warning => "[!]",
                Severity::Info => "[i]",
            }
        };
        self.colorize_severity(raw, severity)
    }

    fn severity_text(&self, severity: Severity) -> String {
        self.colorize_severity(&severity.to_string(), severity)
    }

    fn colorize_severity(&self, raw: &str, severity: Severity) -> String {
        if !self.colors {
            return raw.to_string();
        }
        match severity {
            Severity::Critical => raw.red().bold().to_string(),
            Severity::Warning => raw.yellow().to_string(),
            Severity::Info => raw.blue().to_string(),
        }
    }

    fn health_glyph(&self, health: Health) -> String {
        let raw = if self.unicode {
            match health {
                Health::Healthy => "●",
                Health::Warning => "◐",
                Health::Critical => "✗",
            }
        } else {
            match health {
                Health::Healthy => "[ok]",
                Health::Warning => "[!]",
                Health::Critical => "[x]",
            }
        };
        if !self.colors {
            return raw.to_string();
        }
        match health {
            Health::Healthy => raw.green().to_string(),
            Health::Warning => raw.yellow().to_string(),
            Health::Critical => raw.red().bold().to_string(),
        }
    }

    fn phase_colored(&self, phase: &str) -> String {
        if !self.colors {
            return phase.to_string();
        }
        match phase {
            "Running" | "Ready" | "Active" | "Available" | "Bound" | "Complete" | "Succeeded" => {
                phase.green().to_string()
            }
            "Pending" | "Degraded" => phase.yellow().to_string(),
            "Failed" | "Unknown" | "NotReady" | "Unavailable" => phase.red().to_string(),
            _ => phase.to_string(),
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.colors {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueSource, ResourceKind, Subject, TraversalDirection};
    use std::time::Duration;

    fn plain() -> TextRenderer {
        TextRenderer::new(false, false, 100, 10)
    }

    fn issue(reason: &str, score: u8) -> Issue {
        Issue {
            title: format!("{reason}: web"),
            reason: reason.into(),
            message: "back-off 5m0s restarting failed container".into(),
            severity: Severity::from_score(score),
            score,
            source: IssueSource::Status,
            resource_uid: "u1".into(),
            resource: "Pod/default/web".into(),
            evidence: vec!["container app waiting (CrashLoopBackOff), restarts 15".into()],
            suggested_actions: vec![],
            count: 15,
            last_seen: None,
        }
    }

    #[test]
    fn diag_sections_appear_in_order() {
        let root = issue("CrashLoopBackOff", 100);
        let report = DiagnosisReport {
            subject: Subject::new(ResourceKind::Pod, "web", Some("default".into())),
            resource: None,
            issues: vec![root.clone(), issue("ImagePullBackOff", 95)],
            root_cause: Some(root),
            contributing_factors: vec![issue("ImagePullBackOff", 95)],
            suggested_actions: vec!["inspect previous-container logs".into()],
            notes: vec!["logs web/app: timed out".into()],
            elapsed: Duration::from_millis(420),
        };
        let out = plain().render_diag(&report);

        let root_pos = out.find("ROOT CAUSE").unwrap();
        let factors_pos = out.find("CONTRIBUTING FACTORS").unwrap();
        let actions_pos = out.find("SUGGESTED ACTIONS").unwrap();
        let notes_pos = out.find("NOTES").unwrap();
        assert!(root_pos < factors_pos && factors_pos < actions_pos && actions_pos < notes_pos);
        assert!(out.contains("(score 100)"));
        assert!(out.contains("Completed in 0.42s"));
    }

    #[test]
    fn no_root_cause_is_stated_explicitly() {
        let report = DiagnosisReport {
            subject: Subject::new(ResourceKind::Pod, "ok", Some("default".into())),
            resource: None,
            issues: vec![],
            root_cause: None,
            contributing_factors: vec![],
            suggested_actions: vec![],
            notes: vec![],
            elapsed: Duration::from_millis(10),
        };
        let out = plain().render_diag(&report);
        assert!(out.contains("No root cause identified"));
    }

    #[test]
    fn tree_truncates_past_display_cap() {
        let children: Vec<TreeNode> = (0..TREE_DISPLAY_CAP + 7)
            .map(|i| TreeNode {
                uid: format!("u{i}"),
                label: format!("Pod/default/web-{i}"),
                health: Health::Healthy,
                back_reference: false,
                children: vec![],
            })
            .collect();
        let tree = TreeNode {
            uid: "svc".into(),
            label: "Service/default/web".into(),
            health: Health::Healthy,
            back_reference: false,
            children,
        };
        let report = GraphReport {
            subject: Subject::new(ResourceKind::Service, "web", Some("default".into())),
            nodes: vec![],
            edges: vec![],
            stats: crate::models::GraphStats {
                resources: 58,
                dependencies: 57,
                upstream: 0,
                downstream: 57,
            },
            trees: vec![(TraversalDirection::Downstream, tree)],
            notes: vec![],
            elapsed: Duration::from_millis(33),
        };
        let out = plain().render_graph(&report);
        assert!(out.contains("(+7 more)"));
        assert!(out.contains("Resources:    58"));
    }

    #[test]
    fn back_references_are_marked() {
        let tree = TreeNode {
            uid: "a".into(),
            label: "Service/default/a".into(),
            health: Health::Warning,
            back_reference: false,
            children: vec![TreeNode {
                uid: "b".into(),
                label: "Pod/default/b".into(),
                health: Health::Critical,
                back_reference: true,
                children: vec![],
            }],
        };
        let report = GraphReport {
            subject: Subject::new(ResourceKind::Service, "a", Some("default".into())),
            nodes: vec![],
            edges: vec![],
            stats: crate::models::GraphStats {
                resources: 2,
                dependencies: 1,
                upstream: 0,
                downstream: 1,
            },
            trees: vec![(TraversalDirection::Downstream, tree)],
            notes: vec![],
            elapsed: Duration::from_millis(5),
        };
        let out = plain().render_graph(&report);
        assert!(out.contains("(see above)"));
        assert!(out.contains("`-- "));
    }

    #[test]
    fn top_prints_no_predictions_and_limited_signals() {
        let report = TopReport {
            subject: Subject::new(ResourceKind::Generic("Namespace".into()), "prod", None),
            horizon_hours: 48,
            capacity_warnings: vec![],
            certificate_warnings: vec![],
            notes: vec!["limited signals: metrics-server unavailable".into()],
            elapsed: Duration::from_millis(200),
        };
        let out = plain().render_top(&report);
        assert!(out.contains("No capacity or certificate issues predicted"));
        assert!(out.contains("limited signals"));
    }

    #[test]
    fn wrapping_honors_width() {
        let renderer = TextRenderer::new(false, false, 50, 10);
        let text = "word ".repeat(30);
        let wrapped = renderer.wrapped(&text, "  ");
        for line in wrapped.lines() {
            assert!(line.len() <= 50, "line too long: {line:?}");
        }
    }
}
