//! Heuristic scoring engine
//!
//! Produces scored [`Issue`]s from the run's records, events, container
//! statuses, and log tails, then promotes the single highest-scoring issue
//! at or above 50 to root cause. Deterministic for a given input set and
//! weight table.

mod actions;
mod weights;

pub use actions::suggested_actions;
pub use weights::WeightTable;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::models::{
    Issue, IssueSource, ResourceKind, ResourceRecord, Severity,
};

/// One collected log tail, used by the opt-in correlation modifier.
#[derive(Debug, Clone)]
pub struct LogTail {
    pub pod: String,
    pub container: String,
    pub previous: bool,
    pub text: String,
}

/// Bounded synonym list for log correlation. The reason string itself is
/// always checked; these add the phrasings runtimes actually log.
fn log_synonyms(reason: &str) -> &'static [&'static str] {
    match reason {
        "CrashLoopBackOff" => &["back-off restarting failed container"],
        "ImagePullBackOff" | "ErrImagePull" => {
            &["pull access denied", "manifest unknown", "image not found"]
        }
        "OOMKilled" => &["out of memory", "oom-kill"],
        "Unhealthy" => &["liveness probe failed", "readiness probe failed"],
        "FailedMount" => &["unable to attach or mount volumes"],
        _ => &[],
    }
}

pub struct ScoringEngine {
    weights: WeightTable,
    log_correlation: bool,
}

/// Everything the engine needs for one run. `now` is injected so scoring
/// stays deterministic under test.
pub struct AnalysisInput<'a> {
    pub records: &'a BTreeMap<String, ResourceRecord>,
    pub subject_uid: &'a str,
    pub logs: &'a [LogTail],
    pub now: DateTime<Utc>,
}

impl ScoringEngine {
    pub fn new(weights: WeightTable, log_correlation: bool) -> Self {
        Self {
            weights,
            log_correlation,
        }
    }

    /// Produce sorted issues for the subject and, for controllers, its
    /// owned children.
    pub fn analyze(&self, input: &AnalysisInput<'_>) -> Vec<Issue> {
        let scope = self.scope_uids(input);
        let scope_bonus = self.scope_bonus(input, &scope);

        let mut issues = Vec::new();
        for uid in &scope {
            let Some(record) = input.records.get(uid) else {
                continue;
            };
            let before = issues.len();
            self.issues_from_container_statuses(record, input, scope_bonus, &mut issues);
            self.issues_from_events(record, input, scope_bonus, &mut issues);
            self.issues_from_node(record, scope_bonus, &mut issues);
            if issues.len() == before {
                self.issues_from_conditions(record, input.now, scope_bonus, &mut issues);
            }
        }

        sort_issues(&mut issues);
        issues
    }

    /// Single highest-scoring issue at or above 50, if any.
    pub fn root_cause(issues: &[Issue]) -> Option<Issue> {
        issues.iter().find(|i| i.score >= 50).cloned()
    }

    /// Up to three further issues >= 50, deduplicated by `(reason, resource)`.
    pub fn contributing_factors(issues: &[Issue], root: Option<&Issue>) -> Vec<Issue> {
        let mut seen: HashSet<(String, String)> =
            root.iter().map(|r| r.dedup_key()).collect();
        issues
            .iter()
            .filter(|i| i.score >= 50)
            .filter(|i| seen.insert(i.dedup_key()))
            .take(3)
            .cloned()
            .collect()
    }

    /// Subject plus transitively owned children, plus the nodes those
    /// children run on.
    fn scope_uids(&self, input: &AnalysisInput<'_>) -> Vec<String> {
        let mut scope: Vec<String> = vec![input.subject_uid.to_string()];
        let mut in_scope: HashSet<String> = scope.iter().cloned().collect();

        loop {
            let mut added = false;
            for record in input.records.values() {
                if in_scope.contains(&record.uid) {
                    continue;
                }
                let owned = record.owner_references().iter().any(|owner| {
                    input.records.values().any(|parent| {
                        in_scope.contains(&parent.uid)
                            && parent.kind.as_str() == owner.kind
                            && (owner.uid.as_deref() == Some(parent.uid.as_str())
                                || owner.name == parent.name)
                    })
                });
                if owned {
                    in_scope.insert(record.uid.clone());
                    scope.push(record.uid.clone());
                    added = true;
                }
            }
            if !added {
                break;
            }
        }

        // Selector fallback for children without owner refs
        if let Some(subject) = input.records.get(input.subject_uid) {
            if subject.kind.is_controller() {
                let selector = subject.prop_str_map("selector");
                if !selector.is_empty() {
                    for record in input.records.values() {
                        if record.kind == ResourceKind::Pod
                            && record.namespace == subject.namespace
                            && record.owner_references().is_empty()
                            && selector
                                .iter()
                                .all(|(k, v)| record.labels.get(k) == Some(v))
                            && in_scope.insert(record.uid.clone())
                        {
                            scope.push(record.uid.clone());
                        }
                    }
                }
            }
        }

        // Nodes serving in-scope pods
        let mut node_uids = Vec::new();
        for uid in &scope {
            let Some(record) = input.records.get(uid) else {
                continue;
            };
            if record.kind != ResourceKind::Pod {
                continue;
            }
            if let Some(node_name) = record.prop_str("nodeName") {
                if let Some(node) = input
                    .records
                    .values()
                    .find(|r| r.kind == ResourceKind::Node && r.name == node_name)
                {
                    if in_scope.insert(node.uid.clone()) {
                        node_uids.push(node.uid.clone());
                    }
                }
            }
        }
        scope.extend(node_uids);
        scope
    }

    /// +5 when a controller subject has >=50% unhealthy replicas, +10 at 100%.
    fn scope_bonus(&self, input: &AnalysisInput<'_>, scope: &[String]) -> u8 {
        let Some(subject) = input.records.get(input.subject_uid) else {
            return 0;
        };
        if !subject.kind.is_controller() {
            return 0;
        }
        let pods: Vec<&ResourceRecord> = scope
            .iter()
            .filter_map(|uid| input.records.get(uid))
            .filter(|r| r.kind == ResourceKind::Pod)
            .collect();
        if pods.is_empty() {
            return 0;
        }
        let unhealthy = pods.iter().filter(|p| p.ready == Some(false)).count();
        let fraction = unhealthy as f64 / pods.len() as f64;
        if fraction >= 1.0 {
            10
        } else if fraction >= 0.5 {
            5
        } else {
            0
        }
    }

    fn issues_from_container_statuses(
        &self,
        record: &ResourceRecord,
        input: &AnalysisInput<'_>,
        scope_bonus: u8,
        issues: &mut Vec<Issue>,
    ) {
        if record.kind != ResourceKind::Pod {
            return;
        }
        // Container-status issues take recency from the pod's most recent
        // event; the status itself carries no timestamp.
        let latest_event_ts = record
            .events
            .iter()
            .filter_map(|e| e.last_timestamp)
            .max();

        for status in record.container_statuses() {
            let reasons = [
                status.waiting_reason.as_deref(),
                status.terminated_reason.as_deref(),
            ];
            for reason in reasons.into_iter().flatten() {
                let Some(base) = self.weights.base_score(reason) else {
                    continue;
                };
                let mut score = base as i32;
                score += recency_bonus(latest_event_ts, input.now);
                score += recurrence_bonus(status.restart_count.max(1));
                score += scope_bonus as i32;
                score += self.correlation_bonus(reason, &record.name, input.logs);
                let score = clamp_score(score);

                let mut evidence = vec![format!(
                    "container {} {} ({reason}), restarts {}",
                    status.name,
                    if status.waiting_reason.as_deref() == Some(reason) {
                        "waiting"
                    } else {
                        "terminated"
                    },
                    status.restart_count
                )];
                if let Some(code) = status.exit_code {
                    evidence.push(format!("last exit code {code}"));
                }

                issues.push(Issue {
                    title: format!("{reason}: {}", record.name),
                    reason: reason.to_string(),
                    message: status
                        .waiting_message
                        .clone()
                        .unwrap_or_else(|| format!("container {} in {reason}", status.name)),
                    severity: Severity::from_score(score),
                    score,
                    source: IssueSource::Status,
                    resource_uid: record.uid.clone(),
                    resource: record.full_name(),
                    evidence,
                    suggested_actions: suggested_actions(
                        reason,
                        &record.name,
                        record.namespace.as_deref(),
                        Some(&status.name),
                    ),
                    count: status.restart_count.max(1),
                    last_seen: latest_event_ts,
                });
            }
        }
    }

    fn issues_from_events(
        &self,
        record: &ResourceRecord,
        input: &AnalysisInput<'_>,
        scope_bonus: u8,
        issues: &mut Vec<Issue>,
    ) {
        for event in &record.events {
            let Some(base) = self.weights.base_score(&event.reason) else {
                continue;
            };
            let mut score = base as i32;
            score += recency_bonus(event.last_timestamp, input.now);
            score += recurrence_bonus(event.count);
            score += scope_bonus as i32;
            score += self.correlation_bonus(&event.reason, &record.name, input.logs);
            let score = clamp_score(score);

            let age = event
                .last_timestamp
                .map(|ts| humanize_age(input.now - ts))
                .unwrap_or_else(|| "unknown age".to_string());

            issues.push(Issue {
                title: format!("{}: {}", event.reason, record.name),
                reason: event.reason.clone(),
                message: event.message.clone(),
                severity: Severity::from_score(score),
                score,
                source: IssueSource::Event,
                resource_uid: record.uid.clone(),
                resource: record.full_name(),
                evidence: vec![format!(
                    "event {} x{}, last seen {age}",
                    event.reason, event.count
                )],
                suggested_actions: suggested_actions(
                    &event.reason,
                    &record.name,
                    record.namespace.as_deref(),
                    None,
                ),
                count: event.count,
                last_seen: event.last_timestamp,
            });
        }
    }

    fn issues_from_node(
        &self,
        record: &ResourceRecord,
        scope_bonus: u8,
        issues: &mut Vec<Issue>,
    ) {
        if record.kind != ResourceKind::Node || record.ready != Some(false) {
            return;
        }
        let Some(base) = self.weights.base_score("NodeNotReady") else {
            return;
        };
        let condition = record.condition("Ready");
        let score = clamp_score(base as i32 + scope_bonus as i32);
        issues.push(Issue {
            title: format!("NodeNotReady: {}", record.name),
            reason: "NodeNotReady".to_string(),
            message: condition
                .and_then(|c| c.message.clone())
                .unwrap_or_else(|| format!("node {} is not ready", record.name)),
            severity: Severity::from_score(score),
            score,
            source: IssueSource::Node,
            resource_uid: record.uid.clone(),
            resource: record.full_name(),
            evidence: vec![format!(
                "node condition Ready=False{}",
                condition
                    .and_then(|c| c.reason.as_deref())
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default()
            )],
            suggested_actions: suggested_actions("NodeNotReady", &record.name, None, None),
            count: 1,
            last_seen: condition.and_then(|c| c.last_transition_time),
        });
    }

    /// Generic fallback for CRDs and records nothing else matched:
    /// `Ready=False` 95, `Healthy=False` 90, `Progressing=True` >= 15 min 60.
    fn issues_from_conditions(
        &self,
        record: &ResourceRecord,
        now: DateTime<Utc>,
        scope_bonus: u8,
        issues: &mut Vec<Issue>,
    ) {
        if record.kind == ResourceKind::Node {
            return;
        }
        for condition in &record.conditions {
            let base: i32 = match (condition.condition_type.as_str(), condition.status.as_str()) {
                ("Ready", "False") => 95,
                ("Healthy", "False") => 90,
                // Built-in kinds keep Progressing=True when healthy; the
                // stuck-progressing rule only makes sense for CRDs
                ("Progressing", "True") if matches!(record.kind, ResourceKind::Generic(_)) => {
                    let stuck = condition
                        .last_transition_time
                        .map(|ts| now - ts >= ChronoDuration::minutes(15))
                        .unwrap_or(false);
                    if !stuck {
                        continue;
                    }
                    60
                }
                _ => continue,
            };
            let reason = condition.reason.clone().unwrap_or_else(|| {
                format!("{}{}", condition.condition_type, condition.status)
            });
            let score = clamp_score(base + scope_bonus as i32);
            issues.push(Issue {
                title: format!("Not Ready: {reason}"),
                reason: reason.clone(),
                message: condition.message.clone().unwrap_or_default(),
                severity: Severity::from_score(score),
                score,
                source: IssueSource::Status,
                resource_uid: record.uid.clone(),
                resource: record.full_name(),
                evidence: vec![format!(
                    "condition {}={}",
                    condition.condition_type, condition.status
                )],
                suggested_actions: suggested_actions(
                    &reason,
                    &record.name,
                    record.namespace.as_deref(),
                    None,
                ),
                count: 1,
                last_seen: condition.last_transition_time,
            });
            // One condition issue per record is enough
            break;
        }
    }

    /// Opt-in +5 when the reason or a known synonym shows up in the pod's
    /// log tail.
    fn correlation_bonus(&self, reason: &str, pod: &str, logs: &[LogTail]) -> i32 {
        if !self.log_correlation {
            return 0;
        }
        let needle = reason.to_ascii_lowercase();
        let synonyms = log_synonyms(reason);
        for tail in logs.iter().filter(|t| t.pod == pod) {
            let haystack = tail.text.to_ascii_lowercase();
            if haystack.contains(&needle)
                || synonyms.iter().any(|s| haystack.contains(s))
            {
                return 5;
            }
        }
        0
    }
}

/// +10 within five minutes, +5 within thirty.
fn recency_bonus(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i32 {
    let Some(ts) = last_seen else {
        return 0;
    };
    let age = now - ts;
    if age <= ChronoDuration::minutes(5) {
        10
    } else if age <= ChronoDuration::minutes(30) {
        5
    } else {
        0
    }
}

/// +min(15, count - 1).
fn recurrence_bonus(count: u32) -> i32 {
    (count.saturating_sub(1)).min(15) as i32
}

fn clamp_score(score: i32) -> u8 {
    score.clamp(0, 100) as u8
}

/// Deterministic order: score, then container-lifecycle origin, then
/// recurrence, then reason, then resource.
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.source.origin_rank().cmp(&b.source.origin_rank()))
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.reason.cmp(&b.reason))
            .then_with(|| a.resource.cmp(&b.resource))
    });
}

fn humanize_age(age: ChronoDuration) -> String {
    let secs = age.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}
