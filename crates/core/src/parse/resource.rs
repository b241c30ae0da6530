//! Resource JSON parsing
//!
//! Converts `kubectl get -o json` output (single objects or `List`s) into
//! [`ResourceRecord`]s, extracting the spec/status fragments the graph
//! builder, scorer, and forecaster need into the record's `properties`.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::{dot_get, dot_str, parse_timestamp, quantity};
use crate::models::{Condition, ResourceKind, ResourceRecord};

/// Parse one artifact of resource JSON into records.
///
/// Items that lack a name are dropped; everything else is tolerated.
pub fn parse_resources(bytes: &[u8]) -> Result<Vec<ResourceRecord>, String> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| format!("invalid resource JSON: {e}"))?;

    let items: Vec<&Value> = if value.get("kind").and_then(Value::as_str) == Some("List")
        || value.get("items").is_some()
    {
        value
            .get("items")
            .and_then(Value::as_array)
            .map(|a| a.iter().collect())
            .unwrap_or_default()
    } else {
        vec![&value]
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match parse_single(item) {
            Some(record) => records.push(record),
            None => debug!("dropped resource item without kind or name"),
        }
    }
    Ok(records)
}

fn parse_single(value: &Value) -> Option<ResourceRecord> {
    let kind_str = value.get("kind").and_then(Value::as_str)?;
    let kind = ResourceKind::parse(kind_str);
    let metadata = value.get("metadata")?;
    let name = metadata.get("name").and_then(Value::as_str)?.to_string();
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .map(str::to_string);

    let uid = metadata
        .get("uid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| synthetic_uid(&kind, namespace.as_deref(), &name));

    let labels = string_map(metadata.get("labels"));
    let annotations = string_map(metadata.get("annotations"));
    let creation_timestamp = metadata
        .get("creationTimestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    let conditions = parse_conditions(value);

    let mut properties = Map::new();
    if let ResourceKind::Generic(original) = &kind {
        properties.insert("kind".into(), Value::String(original.clone()));
    }
    if let Some(owners) = parse_owner_references(metadata) {
        properties.insert("ownerReferences".into(), owners);
    }

    let (phase, ready) = match kind {
        ResourceKind::Pod => parse_pod(value, &mut properties, &conditions),
        ResourceKind::Deployment
        | ResourceKind::ReplicaSet
        | ResourceKind::StatefulSet
        | ResourceKind::DaemonSet => parse_workload(value, &mut properties),
        ResourceKind::Job => parse_job(value, &conditions),
        ResourceKind::Service => parse_service(value, &mut properties),
        ResourceKind::Ingress => parse_ingress(value, &mut properties),
        ResourceKind::Secret => parse_secret(value, &mut properties),
        ResourceKind::PersistentVolumeClaim => parse_pvc(value, &mut properties),
        ResourceKind::PersistentVolume => {
            (dot_str(value, "status.phase").map(str::to_string), None)
        }
        ResourceKind::Node => parse_node(value, &mut properties, &conditions),
        ResourceKind::HorizontalPodAutoscaler => parse_hpa(value, &mut properties),
        ResourceKind::NetworkPolicy => parse_network_policy(value, &mut properties),
        _ => (None, None),
    };

    Some(ResourceRecord {
        kind,
        name,
        namespace,
        uid,
        phase,
        ready,
        conditions,
        labels,
        annotations,
        creation_timestamp,
        properties,
        events: Vec::new(),
    })
}

/// Deterministic fallback uid for items the API served without one.
fn synthetic_uid(kind: &ResourceKind, namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("synthetic:{kind}/{ns}/{name}"),
        None => format!("synthetic:{kind}/{name}"),
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_conditions(value: &Value) -> Vec<Condition> {
    dot_get(value, "status.conditions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| serde_json::from_value(c.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_owner_references(metadata: &Value) -> Option<Value> {
    let owners = metadata.get("ownerReferences")?.as_array()?;
    let refs: Vec<Value> = owners
        .iter()
        .filter_map(|o| {
            let kind = o.get("kind")?.as_str()?;
            let name = o.get("name")?.as_str()?;
            Some(json!({
                "kind": kind,
                "name": name,
                "uid": o.get("uid").and_then(Value::as_str),
            }))
        })
        .collect();
    Some(Value::Array(refs))
}

fn parse_pod(
    value: &Value,
    properties: &mut Map<String, Value>,
    conditions: &[Condition],
) -> (Option<String>, Option<bool>) {
    let phase = dot_str(value, "status.phase").map(str::to_string);

    let mut statuses = Vec::new();
    if let Some(raw) = dot_get(value, "status.containerStatuses").and_then(Value::as_array) {
        for cs in raw {
            let name = cs.get("name").and_then(Value::as_str).unwrap_or_default();
            statuses.push(json!({
                "name": name,
                "ready": cs.get("ready").and_then(Value::as_bool).unwrap_or(false),
                "restart_count": cs.get("restartCount").and_then(Value::as_u64).unwrap_or(0),
                "waiting_reason": dot_str(cs, "state.waiting.reason"),
                "waiting_message": dot_str(cs, "state.waiting.message"),
                "terminated_reason": dot_str(cs, "state.terminated.reason")
                    .or_else(|| dot_str(cs, "lastState.terminated.reason")),
                "exit_code": dot_get(cs, "state.terminated.exitCode")
                    .or_else(|| dot_get(cs, "lastState.terminated.exitCode"))
                    .and_then(Value::as_i64),
            }));
        }
    }
    if !statuses.is_empty() {
        properties.insert("containerStatuses".into(), Value::Array(statuses));
    }

    if let Some(node) = dot_str(value, "spec.nodeName") {
        properties.insert("nodeName".into(), Value::String(node.to_string()));
    }
    if let Some(sa) = dot_str(value, "spec.serviceAccountName") {
        properties.insert("serviceAccountName".into(), Value::String(sa.to_string()));
    }

    let (config_maps, secrets, pvcs) = parse_pod_volumes(value);
    let (env_config_maps, env_secrets) = parse_pod_env_refs(value);
    insert_names(properties, "mountedConfigMaps", merge(config_maps, env_config_maps));
    insert_names(properties, "mountedSecrets", merge(secrets, env_secrets));
    insert_names(properties, "mountedPvcs", pvcs);

    parse_pod_resources(value, properties);

    // Ready when the Ready condition says so; fall back to container readiness.
    let ready = conditions
        .iter()
        .find(|c| c.condition_type == "Ready")
        .map(|c| c.status == "True")
        .or_else(|| {
            dot_get(value, "status.containerStatuses")
                .and_then(Value::as_array)
                .map(|cs| {
                    !cs.is_empty()
                        && cs
                            .iter()
                            .all(|c| c.get("ready").and_then(Value::as_bool).unwrap_or(false))
                })
        });

    (phase, ready)
}

fn parse_pod_volumes(value: &Value) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut config_maps = Vec::new();
    let mut secrets = Vec::new();
    let mut pvcs = Vec::new();

    if let Some(volumes) = dot_get(value, "spec.volumes").and_then(Value::as_array) {
        for volume in volumes {
            if let Some(name) = dot_str(volume, "configMap.name") {
                config_maps.push(name.to_string());
            }
            if let Some(name) = dot_str(volume, "secret.secretName") {
                secrets.push(name.to_string());
            }
            if let Some(name) = dot_str(volume, "persistentVolumeClaim.claimName") {
                pvcs.push(name.to_string());
            }
        }
    }
    (config_maps, secrets, pvcs)
}

fn parse_pod_env_refs(value: &Value) -> (Vec<String>, Vec<String>) {
    let mut config_maps = Vec::new();
    let mut secrets = Vec::new();

    let containers = dot_get(value, "spec.containers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    for container in containers {
        if let Some(env_from) = container.get("envFrom").and_then(Value::as_array) {
            for source in env_from {
                if let Some(name) = dot_str(source, "configMapRef.name") {
                    config_maps.push(name.to_string());
                }
                if let Some(name) = dot_str(source, "secretRef.name") {
                    secrets.push(name.to_string());
                }
            }
        }
        if let Some(env) = container.get("env").and_then(Value::as_array) {
            for var in env {
                if let Some(name) = dot_str(var, "valueFrom.configMapKeyRef.name") {
                    config_maps.push(name.to_string());
                }
                if let Some(name) = dot_str(var, "valueFrom.secretKeyRef.name") {
                    secrets.push(name.to_string());
                }
            }
        }
    }
    (config_maps, secrets)
}

/// Aggregate container requests/limits into pod totals.
fn parse_pod_resources(value: &Value, properties: &mut Map<String, Value>) {
    let mut cpu_request = 0u64;
    let mut cpu_limit = 0u64;
    let mut mem_request = 0u64;
    let mut mem_limit = 0u64;

    let containers = dot_get(value, "spec.containers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    for container in containers {
        if let Some(cpu) = dot_str(container, "resources.requests.cpu") {
            cpu_request += quantity::parse_cpu_millicores(cpu).unwrap_or(0);
        }
        if let Some(cpu) = dot_str(container, "resources.limits.cpu") {
            cpu_limit += quantity::parse_cpu_millicores(cpu).unwrap_or(0);
        }
        if let Some(mem) = dot_str(container, "resources.requests.memory") {
            mem_request += quantity::parse_bytes(mem).unwrap_or(0);
        }
        if let Some(mem) = dot_str(container, "resources.limits.memory") {
            mem_limit += quantity::parse_bytes(mem).unwrap_or(0);
        }
    }

    if cpu_request > 0 {
        properties.insert("cpuRequestMillicores".into(), json!(cpu_request));
    }
    if cpu_limit > 0 {
        properties.insert("cpuLimitMillicores".into(), json!(cpu_limit));
    }
    if mem_request > 0 {
        properties.insert("memoryRequestBytes".into(), json!(mem_request));
    }
    if mem_limit > 0 {
        properties.insert("memoryLimitBytes".into(), json!(mem_limit));
    }
}

fn parse_workload(
    value: &Value,
    properties: &mut Map<String, Value>,
) -> (Option<String>, Option<bool>) {
    if let Some(selector) = dot_get(value, "spec.selector.matchLabels") {
        properties.insert("selector".into(), selector.clone());
    }

    let desired = dot_get(value, "spec.replicas")
        .and_then(Value::as_u64)
        .or_else(|| dot_get(value, "status.desiredNumberScheduled").and_then(Value::as_u64));
    let ready = dot_get(value, "status.readyReplicas")
        .and_then(Value::as_u64)
        .or_else(|| dot_get(value, "status.numberReady").and_then(Value::as_u64))
        .unwrap_or(0);

    if let Some(desired) = desired {
        properties.insert("replicas".into(), json!(desired));
        properties.insert("readyReplicas".into(), json!(ready));
        let all_ready = desired == 0 || ready >= desired;
        let phase = if all_ready { "Available" } else { "Degraded" };
        return (Some(phase.to_string()), Some(all_ready));
    }
    (None, None)
}

fn parse_job(value: &Value, conditions: &[Condition]) -> (Option<String>, Option<bool>) {
    for condition in conditions {
        if condition.status == "True" {
            match condition.condition_type.as_str() {
                "Complete" => return (Some("Complete".into()), Some(true)),
                "Failed" => return (Some("Failed".into()), Some(false)),
                _ => {}
            }
        }
    }
    let active = dot_get(value, "status.active")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if active > 0 {
        (Some("Running".into()), None)
    } else {
        (None, None)
    }
}

fn parse_service(
    value: &Value,
    properties: &mut Map<String, Value>,
) -> (Option<String>, Option<bool>) {
    if let Some(selector) = dot_get(value, "spec.selector") {
        if selector.as_object().is_some_and(|m| !m.is_empty()) {
            properties.insert("selector".into(), selector.clone());
        }
    }
    (Some("Active".into()), None)
}

fn parse_ingress(
    value: &Value,
    properties: &mut Map<String, Value>,
) -> (Option<String>, Option<bool>) {
    let mut backends = Vec::new();
    if let Some(rules) = dot_get(value, "spec.rules").and_then(Value::as_array) {
        for rule in rules {
            if let Some(paths) = dot_get(rule, "http.paths").and_then(Value::as_array) {
                for path in paths {
                    if let Some(name) = dot_str(path, "backend.service.name") {
                        backends.push(name.to_string());
                    }
                }
            }
        }
    }
    if let Some(name) = dot_str(value, "spec.defaultBackend.service.name") {
        backends.push(name.to_string());
    }
    insert_names(properties, "backendServices", backends);

    let mut tls_secrets = Vec::new();
    if let Some(tls) = dot_get(value, "spec.tls").and_then(Value::as_array) {
        for entry in tls {
            if let Some(name) = dot_str(entry, "secretName") {
                tls_secrets.push(name.to_string());
            }
        }
    }
    insert_names(properties, "tlsSecretNames", tls_secrets);

    (Some("Active".into()), None)
}

fn parse_secret(
    value: &Value,
    properties: &mut Map<String, Value>,
) -> (Option<String>, Option<bool>) {
    if let Some(secret_type) = value.get("type").and_then(Value::as_str) {
        properties.insert("secretType".into(), Value::String(secret_type.to_string()));
    }
    // "tls.crt" contains a dot, so no dot-path lookup here
    if let Some(crt) = value
        .get("data")
        .and_then(|d| d.get("tls.crt"))
        .and_then(Value::as_str)
    {
        properties.insert("tlsCrt".into(), Value::String(crt.to_string()));
    }
    (Some("Active".into()), None)
}

fn parse_pvc(
    value: &Value,
    properties: &mut Map<String, Value>,
) -> (Option<String>, Option<bool>) {
    let phase = dot_str(value, "status.phase").map(str::to_string);
    let bound_volume = dot_str(value, "spec.volumeName")
        .or_else(|| dot_str(value, "status.boundVolume"));
    if let Some(volume) = bound_volume {
        properties.insert("volumeName".into(), Value::String(volume.to_string()));
    }
    if let Some(capacity) = dot_str(value, "status.capacity.storage") {
        if let Some(bytes) = quantity::parse_bytes(capacity) {
            properties.insert("capacityBytes".into(), json!(bytes));
        }
    }
    let ready = phase.as_deref().map(|p| p == "Bound");
    (phase, ready)
}

fn parse_node(
    value: &Value,
    properties: &mut Map<String, Value>,
    conditions: &[Condition],
) -> (Option<String>, Option<bool>) {
    if let Some(cpu) = dot_str(value, "status.capacity.cpu") {
        if let Some(millis) = quantity::parse_cpu_millicores(cpu) {
            properties.insert("capacityCpuMillicores".into(), json!(millis));
        }
    }
    if let Some(memory) = dot_str(value, "status.capacity.memory") {
        if let Some(bytes) = quantity::parse_bytes(memory) {
            properties.insert("capacityMemoryBytes".into(), json!(bytes));
        }
    }

    let ready = conditions
        .iter()
        .find(|c| c.condition_type == "Ready")
        .map(|c| c.status == "True");
    let phase = match ready {
        Some(true) => Some("Ready".to_string()),
        Some(false) => Some("NotReady".to_string()),
        None => None,
    };
    (phase, ready)
}

fn parse_hpa(
    value: &Value,
    properties: &mut Map<String, Value>,
) -> (Option<String>, Option<bool>) {
    if let (Some(kind), Some(name)) = (
        dot_str(value, "spec.scaleTargetRef.kind"),
        dot_str(value, "spec.scaleTargetRef.name"),
    ) {
        properties.insert(
            "scaleTargetRef".into(),
            json!({"kind": kind, "name": name}),
        );
    }
    (Some("Active".into()), None)
}

fn parse_network_policy(
    value: &Value,
    properties: &mut Map<String, Value>,
) -> (Option<String>, Option<bool>) {
    if let Some(selector) = dot_get(value, "spec.podSelector.matchLabels") {
        if selector.as_object().is_some_and(|m| !m.is_empty()) {
            properties.insert("podSelector".into(), selector.clone());
        }
    }
    if let Some(types) = dot_get(value, "spec.policyTypes") {
        properties.insert("policyTypes".into(), types.clone());
    }
    (Some("Active".into()), None)
}

fn merge(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    a.extend(b);
    a.sort();
    a.dedup();
    a
}

fn insert_names(properties: &mut Map<String, Value>, key: &str, names: Vec<String>) {
    if !names.is_empty() {
        properties.insert(
            key.into(),
            Value::Array(names.into_iter().map(Value::String).collect()),
        );
    }
}
