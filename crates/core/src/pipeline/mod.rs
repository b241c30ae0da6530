//! Orchestrator
//!
//! One-shot workflow per command: validate inputs, resolve the subject,
//! fan out collectors, parse, then hand the typed records to the graph
//! builder, scorer, or forecaster. Collector failures degrade into
//! `notes[]`; only invalid input, a missing subject, a dead connection,
//! and cancellation abort a run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::client::{ClusterClient, EventFilter};
use crate::collect::{Artifact, Collection, Collector, Fetch, Limits};
use crate::config::Config;
use crate::error::{ClientError, PartialError, PartialErrorKind, Result, SmartError};
use crate::forecast::{CapacityInputs, Forecaster, SampleCache};
use crate::graph::ResourceGraph;
use crate::models::{
    DiagnosisReport, EventRecord, GraphEdge, GraphNode, GraphReport, GraphStats, Health,
    ResourceKind, ResourceRecord, Severity, Subject, TopReport, TraversalDirection,
};
use crate::parse::{event, prom, resource, top};
use crate::scoring::{AnalysisInput, LogTail, ScoringEngine, WeightTable};
use crate::validation;

/// Namespaced kinds listed when resolving graph neighbors.
const GRAPH_NEIGHBOR_KINDS: &[ResourceKind] = &[
    ResourceKind::Pod,
    ResourceKind::ReplicaSet,
    ResourceKind::Deployment,
    ResourceKind::StatefulSet,
    ResourceKind::DaemonSet,
    ResourceKind::Job,
    ResourceKind::Service,
    ResourceKind::Ingress,
    ResourceKind::ConfigMap,
    ResourceKind::Secret,
    ResourceKind::PersistentVolumeClaim,
    ResourceKind::HorizontalPodAutoscaler,
    ResourceKind::NetworkPolicy,
    ResourceKind::ServiceAccount,
];

pub struct Pipeline {
    client: Arc<dyn ClusterClient>,
    config: Config,
    weights: WeightTable,
}

impl Pipeline {
    /// Build a pipeline. The weight table loads here so a duplicate key is
    /// fatal before the first cluster call.
    pub fn new(client: Arc<dyn ClusterClient>, config: Config) -> Result<Self> {
        let weights = match &config.weights_file {
            Some(path) => WeightTable::load(path)?,
            None => WeightTable::default(),
        };
        Ok(Self {
            client,
            config,
            weights,
        })
    }

    fn limits(&self) -> Limits {
        Limits {
            max_concurrent: self.config.max_concurrent_collectors,
            per_call: self.config.collector_timeout,
            per_run: self.config.run_timeout,
        }
    }

    fn collector(&self) -> Collector {
        Collector::new(Arc::clone(&self.client), self.limits())
    }

    /// Root-cause analysis of one workload.
    pub async fn diag(&self, subject: &Subject) -> Result<DiagnosisReport> {
        validate_subject(subject)?;
        let started = Instant::now();
        let now = Utc::now();

        let (subject, subject_record) = match self.resolve_subject(subject).await? {
            Resolution::Found(subject, record) => (subject, record),
            Resolution::Forbidden(subject, note) => {
                // Nothing readable: zero issues and a notice, success exit
                return Ok(DiagnosisReport {
                    subject,
                    resource: None,
                    issues: vec![],
                    root_cause: None,
                    contributing_factors: vec![],
                    suggested_actions: vec![],
                    notes: vec![note],
                    elapsed: started.elapsed(),
                });
            }
        };

        let plan = self.diag_plan(&subject, &subject_record);
        let collection = self.collector().collect(plan).await;
        let mut notes = collection.notes();

        let (mut records, events, logs) = parse_collection(&collection, &mut notes);
        records.insert(subject_record.uid.clone(), subject_record.clone());
        attach_events(&mut records, events);

        let engine = ScoringEngine::new(self.weights.clone(), self.config.log_correlation);
        let issues = engine.analyze(&AnalysisInput {
            records: &records,
            subject_uid: &subject_record.uid,
            logs: &logs,
            now,
        });

        let root_cause = ScoringEngine::root_cause(&issues);
        let contributing_factors =
            ScoringEngine::contributing_factors(&issues, root_cause.as_ref());
        let suggested_actions = root_cause
            .as_ref()
            .map(|root| root.suggested_actions.clone())
            .unwrap_or_default();

        let resource = records.get(&subject_record.uid).cloned();
        info!(
            subject = %subject.full_name(),
            issues = issues.len(),
            root_cause = root_cause.as_ref().map(|r| r.reason.as_str()).unwrap_or("none"),
            "diagnosis complete"
        );

        Ok(DiagnosisReport {
            subject,
            resource,
            issues,
            root_cause,
            contributing_factors,
            suggested_actions,
            notes,
            elapsed: started.elapsed(),
        })
    }

    /// Dependency traversal around one resource.
    pub async fn graph(
        &self,
        subject: &Subject,
        upstream: bool,
        downstream: bool,
    ) -> Result<GraphReport> {
        validate_subject(subject)?;
        let started = Instant::now();

        let (subject, subject_record) = match self.resolve_subject(subject).await? {
            Resolution::Found(subject, record) => (subject, record),
            Resolution::Forbidden(subject, note) => {
                return Ok(GraphReport {
                    subject,
                    nodes: vec![],
                    edges: vec![],
                    stats: GraphStats {
                        resources: 0,
                        dependencies: 0,
                        upstream: 0,
                        downstream: 0,
                    },
                    trees: vec![],
                    notes: vec![note],
                    elapsed: started.elapsed(),
                });
            }
        };

        let namespace = subject.namespace.clone();
        let mut plan: Vec<Fetch> = GRAPH_NEIGHBOR_KINDS
            .iter()
            .map(|kind| Fetch::List {
                kind: kind.clone(),
                namespace: namespace.clone(),
                selector: None,
            })
            .collect();
        plan.push(Fetch::List {
            kind: ResourceKind::Node,
            namespace: None,
            selector: None,
        });
        plan.push(Fetch::List {
            kind: ResourceKind::PersistentVolume,
            namespace: None,
            selector: None,
        });

        let collection = self.collector().collect(plan).await;
        let mut notes = collection.notes();
        let (mut records, _, _) = parse_collection(&collection, &mut notes);
        records.insert(subject_record.uid.clone(), subject_record.clone());

        let graph = ResourceGraph::build(&records);
        let health = self.health_map(&records);

        // Downstream is the default direction
        let directions: Vec<TraversalDirection> = match (upstream, downstream) {
            (true, false) => vec![TraversalDirection::Upstream],
            (true, true) => vec![
                TraversalDirection::Upstream,
                TraversalDirection::Downstream,
            ],
            _ => vec![TraversalDirection::Downstream],
        };

        let mut trees = Vec::new();
        let mut visited_union: BTreeMap<String, ()> = BTreeMap::new();
        let mut edges: Vec<GraphEdge> = Vec::new();
        for direction in &directions {
            let Some(traversal) =
                graph.traverse(&subject_record.uid, *direction, &records, &health)
            else {
                continue;
            };
            for uid in &traversal.visited {
                visited_union.insert(uid.clone(), ());
            }
            for (source, target, relation) in &traversal.edges {
                edges.push(GraphEdge {
                    source: full_name_of(&records, source),
                    target: full_name_of(&records, target),
                    relation: relation.to_string(),
                });
            }
            trees.push((*direction, traversal.tree));
        }

        let nodes: Vec<GraphNode> = visited_union
            .keys()
            .filter_map(|uid| records.get(uid))
            .map(|record| GraphNode {
                uid: record.uid.clone(),
                kind: record.kind.clone(),
                name: record.name.clone(),
                namespace: record.namespace.clone(),
                full_name: record.full_name(),
                health: health.get(&record.uid).copied().unwrap_or(Health::Healthy),
            })
            .collect();

        let stats = GraphStats {
            resources: visited_union.len(),
            dependencies: edges.len(),
            upstream: graph.reachable_count(&subject_record.uid, TraversalDirection::Upstream),
            downstream: graph
                .reachable_count(&subject_record.uid, TraversalDirection::Downstream),
        };

        Ok(GraphReport {
            subject,
            nodes,
            edges,
            stats,
            trees,
            notes,
            elapsed: started.elapsed(),
        })
    }

    /// Capacity and certificate outlook for a namespace.
    pub async fn top(
        &self,
        namespace: &str,
        horizon_hours: u32,
        context: Option<&str>,
    ) -> Result<TopReport> {
        validation::validate_namespace(namespace)?;
        validation::validate_horizon(horizon_hours)?;
        if let Some(context) = context {
            validation::validate_context(context)?;
        }
        let started = Instant::now();
        let now = Utc::now();

        let ns = Some(namespace.to_string());
        let mut plan: Vec<Fetch> = [
            ResourceKind::Pod,
            ResourceKind::PersistentVolumeClaim,
            ResourceKind::Service,
            ResourceKind::Ingress,
            ResourceKind::Secret,
        ]
        .into_iter()
        .map(|kind| Fetch::List {
            kind,
            namespace: ns.clone(),
            selector: None,
        })
        .collect();
        plan.push(Fetch::List {
            kind: ResourceKind::Node,
            namespace: None,
            selector: None,
        });
        plan.push(Fetch::TopPods {
            namespace: namespace.to_string(),
        });
        plan.push(Fetch::TopNodes);

        let collection = self.collector().collect(plan).await;
        let mut notes = collection.notes();
        let (records, _, _) = parse_collection(&collection, &mut notes);

        // Second phase: kubelet volume metrics, one scrape per node
        let node_names: Vec<String> = records
            .values()
            .filter(|r| r.kind == ResourceKind::Node)
            .map(|r| r.name.clone())
            .collect();
        let kubelet_plan: Vec<Fetch> = node_names
            .iter()
            .map(|node| Fetch::KubeletMetrics { node: node.clone() })
            .collect();
        let kubelet_collection = if kubelet_plan.is_empty() {
            Collection::default()
        } else {
            self.collector().collect(kubelet_plan).await
        };
        notes.extend(kubelet_collection.notes());

        let inputs = build_capacity_inputs(&collection, &kubelet_collection, !node_names.is_empty());

        let cache = self.open_cache(context).await;
        let forecaster = Forecaster::new(horizon_hours, cache, now);
        let (capacity_warnings, capacity_notes) = forecaster.capacity(&records, &inputs);
        let (certificate_warnings, certificate_notes) = forecaster.certificates(&records);
        notes.extend(capacity_notes);
        notes.extend(certificate_notes);

        Ok(TopReport {
            subject: Subject {
                kind: ResourceKind::Generic("Namespace".to_string()),
                name: namespace.to_string(),
                namespace: Some(namespace.to_string()),
                context: context.map(str::to_string),
            },
            horizon_hours,
            capacity_warnings,
            certificate_warnings,
            notes,
            elapsed: started.elapsed(),
        })
    }

    /// Fetch the subject record, classifying the failure modes.
    async fn resolve_subject(&self, subject: &Subject) -> Result<Resolution> {
        let result = self
            .client
            .get(
                &subject.kind,
                subject.namespace.as_deref(),
                &subject.name,
                self.config.collector_timeout,
            )
            .await;

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(ClientError::NotFound(_)) => {
                return Err(SmartError::NotFound(subject.full_name()));
            }
            Err(ClientError::Forbidden(message)) => {
                let note = format!(
                    "get {}: access denied ({message}); no signals available",
                    subject.full_name()
                );
                return Ok(Resolution::Forbidden(subject.clone(), note));
            }
            Err(ClientError::Timeout(d)) => {
                return Err(SmartError::Unavailable(format!(
                    "fetching {} timed out after {d:?}",
                    subject.full_name()
                )));
            }
            Err(ClientError::Unavailable(message)) | Err(ClientError::Other(message)) => {
                return Err(SmartError::Unavailable(message));
            }
        };

        let mut records = resource::parse_resources(&bytes)
            .map_err(|e| SmartError::Internal(format!("subject parse failed: {e}")))?;
        let record = records
            .drain(..)
            .find(|r| r.kind == subject.kind && r.name == subject.name)
            .ok_or_else(|| SmartError::NotFound(subject.full_name()))?;

        // Adopt the server-reported namespace when none was given
        let mut subject = subject.clone();
        if subject.namespace.is_none() {
            subject.namespace = record.namespace.clone();
        }
        Ok(Resolution::Found(subject, record))
    }

    /// Collector set for `diag`: describe + events + logs, plus child
    /// pods (and replica sets) for controllers.
    fn diag_plan(&self, subject: &Subject, record: &ResourceRecord) -> Vec<Fetch> {
        let namespace = subject.namespace.clone().unwrap_or_else(|| "default".into());
        // Plain pods filter events server-side; controllers need the whole
        // namespace so child-pod events are seen too.
        let filter = (!subject.kind.is_controller()).then(|| EventFilter {
            kind: subject.kind.as_str().to_string(),
            name: subject.name.clone(),
        });
        let mut plan = vec![
            Fetch::Describe {
                kind: subject.kind.clone(),
                namespace: subject.namespace.clone(),
                name: subject.name.clone(),
            },
            Fetch::Events {
                namespace: namespace.clone(),
                filter,
            },
        ];

        if subject.kind == ResourceKind::Pod {
            for status in record.container_statuses() {
                plan.push(Fetch::Logs {
                    namespace: namespace.clone(),
                    pod: subject.name.clone(),
                    container: status.name.clone(),
                    previous: false,
                });
                if status.restart_count > 0 {
                    plan.push(Fetch::Logs {
                        namespace: namespace.clone(),
                        pod: subject.name.clone(),
                        container: status.name.clone(),
                        previous: true,
                    });
                }
            }
        }

        if subject.kind.is_controller() {
            let selector = selector_string(record);
            plan.push(Fetch::List {
                kind: ResourceKind::Pod,
                namespace: Some(namespace.clone()),
                selector: selector.clone(),
            });
            if subject.kind == ResourceKind::Deployment {
                plan.push(Fetch::List {
                    kind: ResourceKind::ReplicaSet,
                    namespace: Some(namespace),
                    selector,
                });
            }
        }
        plan
    }

    /// Worst status-derived severity per record, for graph glyphs.
    fn health_map(&self, records: &BTreeMap<String, ResourceRecord>) -> HashMap<String, Health> {
        let mut health = HashMap::new();
        for record in records.values() {
            let mut worst = Health::Healthy;
            for status in record.container_statuses() {
                for reason in [
                    status.waiting_reason.as_deref(),
                    status.terminated_reason.as_deref(),
                ]
                .into_iter()
                .flatten()
                {
                    if let Some(score) = self.weights.base_score(reason) {
                        worst = worst_of(worst, health_from_severity(Severity::from_score(score)));
                    }
                }
            }
            match record.phase.as_deref() {
                Some("Failed") | Some("NotReady") | Some("Unavailable") => {
                    worst = worst_of(worst, Health::Critical)
                }
                Some("Pending") | Some("Degraded") | Some("Unknown") => {
                    worst = worst_of(worst, Health::Warning)
                }
                _ => {}
            }
            if record.ready == Some(false) && worst == Health::Healthy {
                worst = Health::Warning;
            }
            health.insert(record.uid.clone(), worst);
        }
        health
    }

    async fn open_cache(&self, context: Option<&str>) -> Option<SampleCache> {
        let base = self.config.effective_cache_dir()?;
        let context = match context {
            Some(ctx) => ctx.to_string(),
            None => self
                .client
                .current_context()
                .await
                .unwrap_or_else(|_| "default".to_string()),
        };
        match SampleCache::open(&base, &context) {
            Ok(cache) => Some(cache),
            Err(e) => {
                debug!(error = %e, "sample cache unavailable, forecasting without history");
                None
            }
        }
    }
}

enum Resolution {
    Found(Subject, ResourceRecord),
    Forbidden(Subject, String),
}

fn validate_subject(subject: &Subject) -> Result<()> {
    validation::validate_resource_name(&subject.name)?;
    if let Some(namespace) = &subject.namespace {
        validation::validate_namespace(namespace)?;
    }
    if let Some(context) = &subject.context {
        validation::validate_context(context)?;
    }
    Ok(())
}

/// Split a collection into records, events, and log tails.
fn parse_collection(
    collection: &Collection,
    notes: &mut Vec<String>,
) -> (
    BTreeMap<String, ResourceRecord>,
    Vec<EventRecord>,
    Vec<LogTail>,
) {
    let mut records = BTreeMap::new();
    let mut events = Vec::new();
    let mut logs = Vec::new();

    for artifact in &collection.artifacts {
        match artifact {
            Artifact::Resources(bytes) => match resource::parse_resources(bytes) {
                Ok(parsed) => {
                    for record in parsed {
                        records.insert(record.uid.clone(), record);
                    }
                }
                Err(e) => notes.push(
                    PartialError {
                        source: "resources".into(),
                        kind: PartialErrorKind::Parse,
                        message: e,
                    }
                    .note(),
                ),
            },
            Artifact::Events(bytes) => match event::parse_events(bytes) {
                Ok(parsed) => events.extend(parsed),
                Err(e) => notes.push(
                    PartialError {
                        source: "events".into(),
                        kind: PartialErrorKind::Parse,
                        message: e,
                    }
                    .note(),
                ),
            },
            Artifact::LogTail {
                pod,
                container,
                previous,
                text,
            } => logs.push(LogTail {
                pod: pod.clone(),
                container: container.clone(),
                previous: *previous,
                text: text.clone(),
            }),
            // Metrics artifacts are consumed by `top` separately
            Artifact::Description(_)
            | Artifact::PodMetrics { .. }
            | Artifact::NodeMetrics(_)
            | Artifact::KubeletMetrics { .. } => {}
        }
    }

    (records, events, logs)
}

/// Attach events to the records they involve; events for resources the
/// run did not retrieve are dropped.
fn attach_events(records: &mut BTreeMap<String, ResourceRecord>, events: Vec<EventRecord>) {
    let mut index: HashMap<(String, String, Option<String>), String> = HashMap::new();
    for record in records.values() {
        index.insert(
            (
                record.kind.as_str().to_string(),
                record.name.clone(),
                record.namespace.clone(),
            ),
            record.uid.clone(),
        );
    }
    for event in events {
        let key = (
            event.involved_object.kind.clone(),
            event.involved_object.name.clone(),
            event.involved_object.namespace.clone(),
        );
        if let Some(uid) = index.get(&key) {
            if let Some(record) = records.get_mut(uid) {
                record.events.push(event);
            }
        }
    }
}

fn build_capacity_inputs(
    collection: &Collection,
    kubelet_collection: &Collection,
    had_nodes: bool,
) -> CapacityInputs {
    let mut inputs = CapacityInputs::default();
    let mut saw_pod_metrics = false;
    let mut saw_node_metrics = false;

    for artifact in &collection.artifacts {
        match artifact {
            Artifact::PodMetrics { namespace: ns, text } => {
                saw_pod_metrics = true;
                inputs.pod_usage.extend(top::parse_top_pods(text, ns));
            }
            Artifact::NodeMetrics(text) => {
                saw_node_metrics = true;
                inputs.node_usage.extend(top::parse_top_nodes(text));
            }
            _ => {}
        }
    }

    let mut saw_kubelet = false;
    for artifact in &kubelet_collection.artifacts {
        if let Artifact::KubeletMetrics { text, .. } = artifact {
            saw_kubelet = true;
            for (key, stats) in prom::parse_volume_stats(text) {
                inputs.volume_stats.insert(key, stats);
            }
        }
    }

    inputs.metrics_available = saw_pod_metrics || saw_node_metrics;
    // No nodes listed means the scrape never ran; report it as missing
    inputs.volume_metrics_available = saw_kubelet && had_nodes;
    inputs
}

fn selector_string(record: &ResourceRecord) -> Option<String> {
    let selector = record.prop_str_map("selector");
    if selector.is_empty() {
        return None;
    }
    Some(
        selector
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn full_name_of(records: &BTreeMap<String, ResourceRecord>, uid: &str) -> String {
    records
        .get(uid)
        .map(|r| r.full_name())
        .unwrap_or_else(|| uid.to_string())
}

fn health_from_severity(severity: Severity) -> Health {
    match severity {
        Severity::Critical => Health::Critical,
        Severity::Warning => Health::Warning,
        Severity::Info => Health::Healthy,
    }
}

fn worst_of(a: Health, b: Health) -> Health {
    use Health::*;
    match (a, b) {
        (Critical, _) | (_, Critical) => Critical,
        (Warning, _) | (_, Warning) => Warning,
        _ => Healthy,
    }
}
