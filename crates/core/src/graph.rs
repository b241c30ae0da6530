//! Resource dependency graph
//!
//! Directed petgraph over the run's record set. Vertices hold resource
//! uids; the records themselves stay owned by the orchestrator. Edge rules
//! are fixed: `owns` comes from ownerReferences (label-selector fallback),
//! `selects` from label selectors, `mounts` from pod volumes and env
//! references, `binds-to` from PVC bindings, `scheduled-on` from the pod's
//! node, and `references` for service accounts, ingress backends, and HPA
//! targets. The `owns` subgraph is acyclic by construction; traversal
//! carries a visited set so cycles elsewhere cannot loop.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::models::{Health, ResourceKind, ResourceRecord, TraversalDirection, TreeNode};

/// Closed set of edge labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Owns,
    Selects,
    Mounts,
    BindsTo,
    ScheduledOn,
    References,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owns => "owns",
            Self::Selects => "selects",
            Self::Mounts => "mounts",
            Self::BindsTo => "binds-to",
            Self::ScheduledOn => "scheduled-on",
            Self::References => "references",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a directional traversal from a subject.
#[derive(Debug, Clone)]
pub struct Traversal {
    pub tree: TreeNode,
    /// Uids of distinct visited vertices, subject included.
    pub visited: Vec<String>,
    /// `(source_uid, target_uid, relation)` in visit order.
    pub edges: Vec<(String, String, Relation)>,
}

pub struct ResourceGraph {
    graph: DiGraph<String, Relation>,
    by_uid: HashMap<String, NodeIndex>,
}

impl ResourceGraph {
    /// Build the graph from a record set.
    pub fn build(records: &BTreeMap<String, ResourceRecord>) -> Self {
        let mut graph = DiGraph::new();
        let mut by_uid = HashMap::new();
        let mut by_coords: HashMap<(ResourceKind, Option<String>, String), String> =
            HashMap::new();

        for (uid, record) in records {
            let idx = graph.add_node(uid.clone());
            by_uid.insert(uid.clone(), idx);
            by_coords.insert(
                (
                    record.kind.clone(),
                    record.namespace.clone(),
                    record.name.clone(),
                ),
                uid.clone(),
            );
        }

        let mut builder = EdgeBuilder {
            graph,
            by_uid,
            by_coords,
            seen: HashSet::new(),
        };

        for record in records.values() {
            builder.add_edges_for(record, records);
        }

        Self {
            graph: builder.graph,
            by_uid: builder.by_uid,
        }
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.by_uid.contains_key(uid)
    }

    /// All edges as `(source_uid, target_uid, relation)`, sorted by the
    /// target's `(kind, name)` for reproducible output.
    pub fn edges(&self, records: &BTreeMap<String, ResourceRecord>) -> Vec<(String, String, Relation)> {
        let mut edges: Vec<(String, String, Relation)> = self
            .graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].clone(),
                    self.graph[e.target()].clone(),
                    *e.weight(),
                )
            })
            .collect();
        edges.sort_by_key(|(source, target, relation)| {
            (
                sort_key(records, source),
                sort_key(records, target),
                relation.as_str(),
            )
        });
        edges
    }

    /// Number of vertices reachable from `root` in `direction`, root excluded.
    pub fn reachable_count(&self, root: &str, direction: TraversalDirection) -> usize {
        let Some(&start) = self.by_uid.get(root) else {
            return 0;
        };
        let dir = petgraph_direction(direction);
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for neighbor in self.graph.neighbors_directed(node, dir) {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        visited.len() - 1
    }

    /// BFS from `root` following `direction`, producing a printable tree.
    ///
    /// Every vertex is expanded at most once; re-encounters become
    /// back-reference leaves.
    pub fn traverse(
        &self,
        root: &str,
        direction: TraversalDirection,
        records: &BTreeMap<String, ResourceRecord>,
        health: &HashMap<String, Health>,
    ) -> Option<Traversal> {
        let &start = self.by_uid.get(root)?;
        let dir = petgraph_direction(direction);

        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        // (parent, child, relation, back_reference) in BFS order
        let mut links: Vec<(String, String, Relation, bool)> = Vec::new();

        while let Some(node) = queue.pop_front() {
            let mut neighbors: Vec<(NodeIndex, Relation)> = self
                .graph
                .edges_directed(node, dir)
                .map(|e| {
                    let other = if dir == Direction::Outgoing {
                        e.target()
                    } else {
                        e.source()
                    };
                    (other, *e.weight())
                })
                .collect();
            neighbors.sort_by_key(|(idx, relation)| {
                (sort_key(records, &self.graph[*idx]), relation.as_str())
            });
            neighbors.dedup();

            for (neighbor, relation) in neighbors {
                let parent_uid = self.graph[node].clone();
                let child_uid = self.graph[neighbor].clone();
                if visited.insert(neighbor) {
                    links.push((parent_uid, child_uid, relation, false));
                    queue.push_back(neighbor);
                } else {
                    links.push((parent_uid, child_uid, relation, true));
                }
            }
        }

        let mut children_of: HashMap<String, Vec<(String, bool)>> = HashMap::new();
        let mut edges = Vec::with_capacity(links.len());
        for (parent, child, relation, back_reference) in &links {
            children_of
                .entry(parent.clone())
                .or_default()
                .push((child.clone(), *back_reference));
            edges.push((parent.clone(), child.clone(), *relation));
        }

        let tree = assemble_tree(root, false, &children_of, records, health);
        let mut visited_uids: Vec<String> = visited
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect();
        visited_uids.sort_by_key(|uid| sort_key(records, uid));

        Some(Traversal {
            tree,
            visited: visited_uids,
            edges,
        })
    }
}

fn assemble_tree(
    uid: &str,
    back_reference: bool,
    children_of: &HashMap<String, Vec<(String, bool)>>,
    records: &BTreeMap<String, ResourceRecord>,
    health: &HashMap<String, Health>,
) -> TreeNode {
    let label = records
        .get(uid)
        .map(|r| r.full_name())
        .unwrap_or_else(|| uid.to_string());
    let children = if back_reference {
        Vec::new()
    } else {
        children_of
            .get(uid)
            .map(|kids| {
                kids.iter()
                    .map(|(child, is_back)| {
                        assemble_tree(child, *is_back, children_of, records, health)
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    TreeNode {
        uid: uid.to_string(),
        label,
        health: health.get(uid).copied().unwrap_or(Health::Healthy),
        back_reference,
        children,
    }
}

fn petgraph_direction(direction: TraversalDirection) -> Direction {
    match direction {
        TraversalDirection::Downstream => Direction::Outgoing,
        TraversalDirection::Upstream => Direction::Incoming,
    }
}

fn sort_key(records: &BTreeMap<String, ResourceRecord>, uid: &str) -> (String, String) {
    records
        .get(uid)
        .map(|r| (r.kind.as_str().to_string(), r.name.clone()))
        .unwrap_or_else(|| (String::new(), uid.to_string()))
}

struct EdgeBuilder {
    graph: DiGraph<String, Relation>,
    by_uid: HashMap<String, NodeIndex>,
    by_coords: HashMap<(ResourceKind, Option<String>, String), String>,
    seen: HashSet<(NodeIndex, NodeIndex, Relation)>,
}

impl EdgeBuilder {
    fn add_edges_for(
        &mut self,
        record: &ResourceRecord,
        records: &BTreeMap<String, ResourceRecord>,
    ) {
        match record.kind {
            ResourceKind::Pod => self.add_pod_edges(record),
            ResourceKind::Service => self.add_selector_edges(record, "selector", Relation::Selects, records),
            ResourceKind::NetworkPolicy => {
                self.add_selector_edges(record, "podSelector", Relation::Selects, records)
            }
            ResourceKind::Ingress => self.add_ingress_edges(record),
            ResourceKind::PersistentVolumeClaim => self.add_pvc_edges(record),
            ResourceKind::HorizontalPodAutoscaler => self.add_hpa_edges(record),
            ResourceKind::Deployment
            | ResourceKind::ReplicaSet
            | ResourceKind::StatefulSet
            | ResourceKind::DaemonSet
            | ResourceKind::Job => self.add_owner_edges(record, records),
            _ => {}
        }
    }

    fn add_pod_edges(&mut self, pod: &ResourceRecord) {
        if let Some(node) = pod.prop_str("nodeName") {
            self.add_edge_to(pod, ResourceKind::Node, None, node, Relation::ScheduledOn);
        }
        for name in pod.prop_str_list("mountedConfigMaps") {
            self.add_edge_to(
                pod,
                ResourceKind::ConfigMap,
                pod.namespace.as_deref(),
                &name,
                Relation::Mounts,
            );
        }
        for name in pod.prop_str_list("mountedSecrets") {
            self.add_edge_to(
                pod,
                ResourceKind::Secret,
                pod.namespace.as_deref(),
                &name,
                Relation::Mounts,
            );
        }
        for name in pod.prop_str_list("mountedPvcs") {
            self.add_edge_to(
                pod,
                ResourceKind::PersistentVolumeClaim,
                pod.namespace.as_deref(),
                &name,
                Relation::Mounts,
            );
        }
        if let Some(sa) = pod.prop_str("serviceAccountName") {
            self.add_edge_to(
                pod,
                ResourceKind::ServiceAccount,
                pod.namespace.as_deref(),
                sa,
                Relation::References,
            );
        }
    }

    /// Controller -> child via ownerReferences; selector match is the
    /// fallback for children that carry no owner refs at all.
    fn add_owner_edges(
        &mut self,
        controller: &ResourceRecord,
        records: &BTreeMap<String, ResourceRecord>,
    ) {
        let child_kind = match controller.kind {
            ResourceKind::Deployment => ResourceKind::ReplicaSet,
            _ => ResourceKind::Pod,
        };
        let selector = controller.prop_str_map("selector");

        for child in records.values() {
            if child.kind != child_kind || child.namespace != controller.namespace {
                continue;
            }
            let owners = child.owner_references();
            let owned = if owners.is_empty() {
                !selector.is_empty() && selector_matches(&selector, &child.labels)
            } else {
                owners.iter().any(|owner| {
                    owner.kind == controller.kind.as_str()
                        && (owner.uid.as_deref() == Some(controller.uid.as_str())
                            || owner.name == controller.name)
                })
            };
            if owned {
                self.add_edge_uid(&controller.uid, &child.uid, Relation::Owns);
            }
        }
    }

    /// Label-subset selection; an empty selector selects nothing.
    fn add_selector_edges(
        &mut self,
        source: &ResourceRecord,
        selector_key: &str,
        relation: Relation,
        records: &BTreeMap<String, ResourceRecord>,
    ) {
        let selector = source.prop_str_map(selector_key);
        if selector.is_empty() {
            return;
        }
        for pod in records.values() {
            if pod.kind != ResourceKind::Pod || pod.namespace != source.namespace {
                continue;
            }
            if selector_matches(&selector, &pod.labels) {
                self.add_edge_uid(&source.uid, &pod.uid, relation);
            }
        }
    }

    fn add_ingress_edges(&mut self, ingress: &ResourceRecord) {
        for service in ingress.prop_str_list("backendServices") {
            self.add_edge_to(
                ingress,
                ResourceKind::Service,
                ingress.namespace.as_deref(),
                &service,
                Relation::References,
            );
        }
    }

    fn add_pvc_edges(&mut self, pvc: &ResourceRecord) {
        if let Some(volume) = pvc.prop_str("volumeName") {
            self.add_edge_to(
                pvc,
                ResourceKind::PersistentVolume,
                None,
                volume,
                Relation::BindsTo,
            );
        }
    }

    fn add_hpa_edges(&mut self, hpa: &ResourceRecord) {
        let target = hpa.prop_str_map("scaleTargetRef");
        let (Some(kind), Some(name)) = (target.get("kind"), target.get("name")) else {
            return;
        };
        let kind = ResourceKind::parse(kind);
        if matches!(
            kind,
            ResourceKind::Deployment | ResourceKind::StatefulSet | ResourceKind::ReplicaSet
        ) {
            self.add_edge_to(hpa, kind, hpa.namespace.as_deref(), name, Relation::References);
        }
    }

    fn add_edge_to(
        &mut self,
        source: &ResourceRecord,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        relation: Relation,
    ) {
        let key = (kind, namespace.map(str::to_string), name.to_string());
        if let Some(target_uid) = self.by_coords.get(&key).cloned() {
            self.add_edge_uid(&source.uid, &target_uid, relation);
        }
    }

    fn add_edge_uid(&mut self, source: &str, target: &str, relation: Relation) {
        let (Some(&a), Some(&b)) = (self.by_uid.get(source), self.by_uid.get(target)) else {
            return;
        };
        if self.seen.insert((a, b, relation)) {
            self.graph.add_edge(a, b, relation);
        }
    }
}

/// Subset containment: every selector pair must appear in the labels.
fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::resource::parse_resources;
    use serde_json::json;

    fn records_from(items: Vec<serde_json::Value>) -> BTreeMap<String, ResourceRecord> {
        let list = json!({"kind": "List", "items": items});
        parse_resources(&serde_json::to_vec(&list).unwrap())
            .unwrap()
            .into_iter()
            .map(|r| (r.uid.clone(), r))
            .collect()
    }

    fn pod(name: &str, labels: serde_json::Value, owner: Option<(&str, &str)>) -> serde_json::Value {
        let mut metadata = json!({
            "name": name,
            "namespace": "default",
            "uid": format!("pod-{name}"),
            "labels": labels,
        });
        if let Some((kind, owner_name)) = owner {
            metadata["ownerReferences"] = json!([{
                "kind": kind, "name": owner_name, "uid": format!("{}-{owner_name}", kind.to_lowercase())
            }]);
        }
        json!({
            "kind": "Pod",
            "metadata": metadata,
            "spec": {"nodeName": "worker-1"},
            "status": {"phase": "Running"}
        })
    }

    #[test]
    fn service_selects_matching_pods_only() {
        let records = records_from(vec![
            pod("lonely-pod", json!({"app": "lonely-app"}), None),
            json!({
                "kind": "Service",
                "metadata": {"name": "orphan-service", "namespace": "default", "uid": "svc-1"},
                "spec": {"selector": {"app": "non-existent-app"}}
            }),
            json!({
                "kind": "Node",
                "metadata": {"name": "worker-1", "uid": "node-1"},
                "status": {"conditions": [{"type": "Ready", "status": "True"}]}
            }),
        ]);
        let graph = ResourceGraph::build(&records);

        let traversal = graph
            .traverse(
                "svc-1",
                TraversalDirection::Downstream,
                &records,
                &HashMap::new(),
            )
            .unwrap();
        assert_eq!(traversal.visited.len(), 1);
        assert!(traversal.edges.is_empty());
    }

    #[test]
    fn owner_references_create_owns_chain() {
        let records = records_from(vec![
            json!({
                "kind": "Deployment",
                "metadata": {"name": "web", "namespace": "default", "uid": "deploy-web"},
                "spec": {"replicas": 1, "selector": {"matchLabels": {"app": "web"}}},
                "status": {"readyReplicas": 1}
            }),
            json!({
                "kind": "ReplicaSet",
                "metadata": {
                    "name": "web-5f7c", "namespace": "default", "uid": "rs-web",
                    "ownerReferences": [{"kind": "Deployment", "name": "web", "uid": "deploy-web"}]
                },
                "spec": {"replicas": 1, "selector": {"matchLabels": {"app": "web"}}},
                "status": {"readyReplicas": 1}
            }),
            pod("web-5f7c-abcde", json!({"app": "web"}), Some(("ReplicaSet", "web-5f7c"))),
        ]);
        let graph = ResourceGraph::build(&records);

        let traversal = graph
            .traverse(
                "deploy-web",
                TraversalDirection::Downstream,
                &records,
                &HashMap::new(),
            )
            .unwrap();
        assert_eq!(traversal.visited.len(), 3);
        let relations: Vec<Relation> = traversal.edges.iter().map(|(_, _, r)| *r).collect();
        assert!(relations.contains(&Relation::Owns));

        // Upstream from the pod reaches the deployment through the replicaset
        let upstream = graph
            .traverse(
                "pod-web-5f7c-abcde",
                TraversalDirection::Upstream,
                &records,
                &HashMap::new(),
            )
            .unwrap();
        assert!(upstream.visited.contains(&"deploy-web".to_string()));
    }

    #[test]
    fn selector_fallback_applies_only_without_owner_refs() {
        let records = records_from(vec![
            json!({
                "kind": "ReplicaSet",
                "metadata": {"name": "bare-rs", "namespace": "default", "uid": "rs-bare"},
                "spec": {"replicas": 1, "selector": {"matchLabels": {"app": "bare"}}},
                "status": {"readyReplicas": 0}
            }),
            pod("bare-1", json!({"app": "bare"}), None),
        ]);
        let graph = ResourceGraph::build(&records);
        let traversal = graph
            .traverse(
                "rs-bare",
                TraversalDirection::Downstream,
                &records,
                &HashMap::new(),
            )
            .unwrap();
        assert!(traversal
            .edges
            .iter()
            .any(|(_, target, r)| target == "pod-bare-1" && *r == Relation::Owns));
    }

    #[test]
    fn traversal_terminates_on_shared_nodes() {
        let records = records_from(vec![
            pod("shared", json!({"app": "shared"}), None),
            json!({
                "kind": "Service",
                "metadata": {"name": "svc-a", "namespace": "default", "uid": "svc-a"},
                "spec": {"selector": {"app": "shared"}}
            }),
            json!({
                "kind": "Secret",
                "metadata": {"name": "s", "namespace": "default", "uid": "sec-1"},
                "type": "Opaque"
            }),
        ]);
        let graph = ResourceGraph::build(&records);
        let traversal = graph
            .traverse(
                "svc-a",
                TraversalDirection::Downstream,
                &records,
                &HashMap::new(),
            )
            .unwrap();
        let expansions = traversal
            .visited
            .iter()
            .filter(|uid| *uid == "pod-shared")
            .count();
        assert_eq!(expansions, 1);
    }

    #[test]
    fn edges_are_sorted_for_reproducibility() {
        let records = records_from(vec![
            pod("b-pod", json!({"app": "x"}), None),
            pod("a-pod", json!({"app": "x"}), None),
            json!({
                "kind": "Service",
                "metadata": {"name": "svc", "namespace": "default", "uid": "svc-x"},
                "spec": {"selector": {"app": "x"}}
            }),
        ]);
        let graph = ResourceGraph::build(&records);
        let edges = graph.edges(&records);
        let selects: Vec<&String> = edges
            .iter()
            .filter(|(_, _, r)| *r == Relation::Selects)
            .map(|(_, target, _)| target)
            .collect();
        assert_eq!(selects, vec!["pod-a-pod", "pod-b-pod"]);
    }
}
