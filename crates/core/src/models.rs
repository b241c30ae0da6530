//! Core data models for the diagnostic pipeline

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Kubernetes resource kinds understood by the pipeline.
///
/// Unknown kinds (CRDs) are preserved as `Generic` with the original kind
/// string so the conditions-based fallback can still score them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Pod,
    ReplicaSet,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    Service,
    Ingress,
    ConfigMap,
    Secret,
    PersistentVolumeClaim,
    PersistentVolume,
    Node,
    HorizontalPodAutoscaler,
    NetworkPolicy,
    Endpoints,
    ServiceAccount,
    Generic(String),
}

impl ResourceKind {
    /// Normalize a kind string or kubectl short name into a kind.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "pod" | "pods" | "po" => Self::Pod,
            "replicaset" | "replicasets" | "rs" => Self::ReplicaSet,
            "deployment" | "deployments" | "deploy" => Self::Deployment,
            "statefulset" | "statefulsets" | "sts" => Self::StatefulSet,
            "daemonset" | "daemonsets" | "ds" => Self::DaemonSet,
            "job" | "jobs" => Self::Job,
            "service" | "services" | "svc" => Self::Service,
            "ingress" | "ingresses" | "ing" => Self::Ingress,
            "configmap" | "configmaps" | "cm" => Self::ConfigMap,
            "secret" | "secrets" => Self::Secret,
            "persistentvolumeclaim" | "persistentvolumeclaims" | "pvc" => {
                Self::PersistentVolumeClaim
            }
            "persistentvolume" | "persistentvolumes" | "pv" => Self::PersistentVolume,
            "node" | "nodes" | "no" => Self::Node,
            "horizontalpodautoscaler" | "horizontalpodautoscalers" | "hpa" => {
                Self::HorizontalPodAutoscaler
            }
            "networkpolicy" | "networkpolicies" | "netpol" => Self::NetworkPolicy,
            "endpoints" | "endpointslice" | "endpointslices" | "ep" => Self::Endpoints,
            "serviceaccount" | "serviceaccounts" | "sa" => Self::ServiceAccount,
            _ => Self::Generic(input.trim().to_string()),
        }
    }

    /// The canonical `kind` string as the API server reports it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pod => "Pod",
            Self::ReplicaSet => "ReplicaSet",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Job => "Job",
            Self::Service => "Service",
            Self::Ingress => "Ingress",
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
            Self::PersistentVolumeClaim => "PersistentVolumeClaim",
            Self::PersistentVolume => "PersistentVolume",
            Self::Node => "Node",
            Self::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::Endpoints => "Endpoints",
            Self::ServiceAccount => "ServiceAccount",
            Self::Generic(original) => original,
        }
    }

    /// Lowercase plural resource name for kubectl arguments.
    pub fn resource_name(&self) -> String {
        match self {
            Self::Endpoints => "endpoints".to_string(),
            Self::Ingress => "ingresses".to_string(),
            Self::NetworkPolicy => "networkpolicies".to_string(),
            Self::Generic(original) => original.to_ascii_lowercase(),
            other => format!("{}s", other.as_str().to_ascii_lowercase()),
        }
    }

    /// Controllers own child pods (directly or via an intermediate set).
    pub fn is_controller(&self) -> bool {
        matches!(
            self,
            Self::Deployment | Self::ReplicaSet | Self::StatefulSet | Self::DaemonSet | Self::Job
        )
    }

    /// Cluster-scoped kinds carry no namespace.
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, Self::Node | Self::PersistentVolume)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Err(D::Error::custom("empty resource kind"));
        }
        Ok(Self::parse(&raw))
    }
}

/// The resource named on the command line that anchors a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Subject {
    pub fn new(kind: ResourceKind, name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace,
            context: None,
        }
    }

    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", self.kind, ns, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

/// Reference to the object an event is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EventType {
    Normal,
    Warning,
}

/// A cluster event, coalesced by `(reason, involved object)` at parse time.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub count: u32,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub involved_object: ObjectRef,
}

impl EventRecord {
    /// Age of the most recent occurrence at diagnosis time.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_timestamp.map(|ts| now - ts)
    }
}

/// One `status.conditions[]` entry, kept verbatim for the generic fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, rename = "lastTransitionTime")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// Per-container status extracted from a pod.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub restart_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Standardized representation of one cluster resource.
///
/// Identity is `(kind, namespace, name, uid)`. `uid` is the API server uid
/// when present, otherwise synthesized by the parser; it is stable for a
/// single run only. `properties` carries parsed spec/status fragments the
/// graph builder, scorer, and forecaster consume.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, Value>,
    #[serde(skip)]
    pub events: Vec<EventRecord>,
}

impl ResourceRecord {
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", self.kind, ns, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }

    /// String property lookup.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// String-array property lookup; missing keys yield an empty list.
    pub fn prop_str_list(&self, key: &str) -> Vec<String> {
        self.properties
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// String-map property lookup (selectors and the like).
    pub fn prop_str_map(&self, key: &str) -> BTreeMap<String, String> {
        self.properties
            .get(key)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn container_statuses(&self) -> Vec<ContainerStatus> {
        self.properties
            .get("containerStatuses")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn owner_references(&self) -> Vec<ObjectRef> {
        self.properties
            .get("ownerReferences")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

/// Severity bucket derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// `<50` Info, `[50,90)` Warning, `>=90` Critical.
    pub fn from_score(score: u8) -> Self {
        if score >= 90 {
            Self::Critical
        } else if score >= 50 {
            Self::Warning
        } else {
            Self::Info
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// Where a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSource {
    Event,
    Status,
    Log,
    Forecast,
    Node,
}

impl IssueSource {
    /// Container-lifecycle origin ranks ahead of derived events when scores
    /// tie during root-cause selection.
    pub fn origin_rank(&self) -> u8 {
        match self {
            Self::Status => 0,
            Self::Node => 1,
            Self::Event => 2,
            Self::Log => 3,
            Self::Forecast => 4,
        }
    }
}

/// A scored finding attached to a resource in the current run.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub title: String,
    pub reason: String,
    pub message: String,
    pub severity: Severity,
    pub score: u8,
    pub source: IssueSource,
    pub resource_uid: String,
    pub resource: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
    /// Occurrence count backing the recurrence modifier and tie-breaks.
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Issue {
    pub fn dedup_key(&self) -> (String, String) {
        (self.reason.clone(), self.resource_uid.clone())
    }
}

/// Result of a `diag` run.
#[derive(Debug, Clone)]
pub struct DiagnosisReport {
    pub subject: Subject,
    pub resource: Option<ResourceRecord>,
    pub issues: Vec<Issue>,
    pub root_cause: Option<Issue>,
    pub contributing_factors: Vec<Issue>,
    pub suggested_actions: Vec<String>,
    pub notes: Vec<String>,
    pub elapsed: Duration,
}

impl DiagnosisReport {
    /// Highest score among all issues, 0 when there are none.
    pub fn max_score(&self) -> u8 {
        self.issues.iter().map(|i| i.score).max().unwrap_or(0)
    }

    /// `0` when no issue reaches 50, `1` for warnings, `2` for criticals.
    pub fn exit_code(&self) -> i32 {
        match Severity::from_score(self.max_score()) {
            Severity::Critical => 2,
            Severity::Warning => 1,
            Severity::Info => 0,
        }
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

/// Worst-severity health of a graph node, for glyph decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Warning,
    Critical,
}

/// One rendered vertex of a graph traversal.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub uid: String,
    pub kind: ResourceKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub full_name: String,
    pub health: Health,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GraphStats {
    pub resources: usize,
    pub dependencies: usize,
    pub upstream: usize,
    pub downstream: usize,
}

/// A subtree of the dependency traversal, ready for ASCII rendering.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub uid: String,
    pub label: String,
    pub health: Health,
    /// Set when this vertex was already printed on an earlier path.
    pub back_reference: bool,
    pub children: Vec<TreeNode>,
}

/// Result of a `graph` run.
#[derive(Debug, Clone)]
pub struct GraphReport {
    pub subject: Subject,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub stats: GraphStats,
    pub trees: Vec<(TraversalDirection, TreeNode)>,
    pub notes: Vec<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalDirection {
    Upstream,
    Downstream,
}

impl fmt::Display for TraversalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => f.write_str("upstream"),
            Self::Downstream => f.write_str("downstream"),
        }
    }
}

/// A capacity saturation prediction.
#[derive(Debug, Clone, Serialize)]
pub struct CapacityWarning {
    pub resource: String,
    pub metric: String,
    pub severity: Severity,
    pub current_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_to_threshold: Option<f64>,
    pub action: String,
}

/// A certificate nearing expiry.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateWarning {
    pub secret: String,
    pub expires: DateTime<Utc>,
    pub days_left: i64,
    pub severity: Severity,
    pub referenced_by: Vec<String>,
    pub action: String,
}

/// Result of a `top` run.
#[derive(Debug, Clone)]
pub struct TopReport {
    pub subject: Subject,
    pub horizon_hours: u32,
    pub capacity_warnings: Vec<CapacityWarning>,
    pub certificate_warnings: Vec<CertificateWarning>,
    pub notes: Vec<String>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_accepts_short_names() {
        assert_eq!(ResourceKind::parse("deploy"), ResourceKind::Deployment);
        assert_eq!(ResourceKind::parse("sts"), ResourceKind::StatefulSet);
        assert_eq!(ResourceKind::parse("Pod"), ResourceKind::Pod);
        assert_eq!(
            ResourceKind::parse("pvc"),
            ResourceKind::PersistentVolumeClaim
        );
    }

    #[test]
    fn resource_names_use_irregular_plurals() {
        assert_eq!(ResourceKind::Pod.resource_name(), "pods");
        assert_eq!(ResourceKind::Ingress.resource_name(), "ingresses");
        assert_eq!(ResourceKind::NetworkPolicy.resource_name(), "networkpolicies");
        assert_eq!(ResourceKind::Endpoints.resource_name(), "endpoints");
    }

    #[test]
    fn kind_parse_preserves_unknown_kinds() {
        let kind = ResourceKind::parse("FooWidget");
        assert_eq!(kind, ResourceKind::Generic("FooWidget".to_string()));
        assert_eq!(kind.as_str(), "FooWidget");
    }

    #[test]
    fn severity_buckets_match_thresholds() {
        assert_eq!(Severity::from_score(0), Severity::Info);
        assert_eq!(Severity::from_score(49), Severity::Info);
        assert_eq!(Severity::from_score(50), Severity::Warning);
        assert_eq!(Severity::from_score(89), Severity::Warning);
        assert_eq!(Severity::from_score(90), Severity::Critical);
        assert_eq!(Severity::from_score(100), Severity::Critical);
    }

    #[test]
    fn full_name_includes_namespace_when_present() {
        let subject = Subject::new(
            ResourceKind::Pod,
            "web-1",
            Some("production".to_string()),
        );
        assert_eq!(subject.full_name(), "Pod/production/web-1");

        let node = Subject::new(ResourceKind::Node, "worker-1", None);
        assert_eq!(node.full_name(), "Node/worker-1");
    }

    #[test]
    fn diag_exit_code_follows_severity_buckets() {
        let mut report = DiagnosisReport {
            subject: Subject::new(ResourceKind::Pod, "p", None),
            resource: None,
            issues: vec![],
            root_cause: None,
            contributing_factors: vec![],
            suggested_actions: vec![],
            notes: vec![],
            elapsed: Duration::from_millis(1),
        };
        assert_eq!(report.exit_code(), 0);

        let issue = |score: u8| Issue {
            title: "t".into(),
            reason: "r".into(),
            message: String::new(),
            severity: Severity::from_score(score),
            score,
            source: IssueSource::Event,
            resource_uid: "u".into(),
            resource: "Pod/p".into(),
            evidence: vec![],
            suggested_actions: vec![],
            count: 1,
            last_seen: None,
        };

        report.issues = vec![issue(49)];
        assert_eq!(report.exit_code(), 0);
        report.issues = vec![issue(50), issue(12)];
        assert_eq!(report.exit_code(), 1);
        report.issues = vec![issue(91), issue(55)];
        assert_eq!(report.exit_code(), 2);
    }
}
