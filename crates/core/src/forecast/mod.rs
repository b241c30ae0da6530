//! Forecaster
//!
//! Two independent analyses over a horizon of 1..=168 hours: capacity
//! saturation (node CPU/memory, pod usage against limits, PVC disk from
//! kubelet volume metrics) and TLS certificate expiry. The forecaster
//! never fabricates a warning: a capacity warning requires the current
//! value or a real projection to cross 90%, and a certificate warning
//! requires a parsed `notAfter`. Missing signals produce explicit
//! "limited signals" notes instead.

mod cache;
mod trend;

pub use cache::SampleCache;
pub use trend::{forecast, linear_slope, TrendForecast, MIN_SAMPLES_LINEAR, MIN_SAMPLES_SMOOTHING};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{
    CapacityWarning, CertificateWarning, ResourceKind, ResourceRecord, Severity,
};
use crate::parse::cert::{parse_not_after, ParsedCert};
use crate::parse::prom::VolumeStats;
use crate::parse::top::{NodeUsage, PodUsage};

/// Utilization threshold for capacity warnings, in percent.
pub const CAPACITY_THRESHOLD: f64 = 90.0;
/// Days-to-expiry thresholds for certificate warnings.
pub const CERT_WARNING_DAYS: i64 = 14;
pub const CERT_CRITICAL_DAYS: i64 = 3;

const PRESSURE_CONDITIONS: &[&str] = &["DiskPressure", "MemoryPressure", "PIDPressure"];

/// Metric snapshots gathered for one `top` run.
#[derive(Debug, Default)]
pub struct CapacityInputs {
    pub pod_usage: Vec<PodUsage>,
    pub node_usage: Vec<NodeUsage>,
    pub volume_stats: BTreeMap<(String, String), VolumeStats>,
    /// False when metrics-server was unreachable or forbidden.
    pub metrics_available: bool,
    /// False when the kubelet node-proxy scrape failed or was forbidden.
    pub volume_metrics_available: bool,
}

pub struct Forecaster {
    horizon_hours: u32,
    cache: Option<SampleCache>,
    now: DateTime<Utc>,
}

impl Forecaster {
    pub fn new(horizon_hours: u32, cache: Option<SampleCache>, now: DateTime<Utc>) -> Self {
        Self {
            horizon_hours,
            cache,
            now,
        }
    }

    /// Capacity analysis. Returns warnings plus `notes[]` entries.
    pub fn capacity(
        &self,
        records: &BTreeMap<String, ResourceRecord>,
        inputs: &CapacityInputs,
    ) -> (Vec<CapacityWarning>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut notes = Vec::new();
        let mut insufficient = 0usize;

        // Node pressure conditions are immediate criticals
        for record in records.values() {
            if record.kind != ResourceKind::Node {
                continue;
            }
            for condition in &record.conditions {
                if condition.status == "True"
                    && PRESSURE_CONDITIONS.contains(&condition.condition_type.as_str())
                {
                    let current = inputs
                        .node_usage
                        .iter()
                        .find(|u| u.name == record.name)
                        .and_then(|u| match condition.condition_type.as_str() {
                            "MemoryPressure" => u.memory_percent,
                            _ => None,
                        })
                        .unwrap_or(100.0);
                    warnings.push(CapacityWarning {
                        resource: record.full_name(),
                        metric: condition.condition_type.clone(),
                        severity: Severity::Critical,
                        current_percent: current,
                        projected_percent: None,
                        hours_to_threshold: Some(0.0),
                        action: format!(
                            "investigate {} on node {}",
                            condition.condition_type, record.name
                        ),
                    });
                }
            }
        }

        if inputs.metrics_available {
            for usage in &inputs.node_usage {
                for (metric, percent) in [
                    ("cpu", usage.cpu_percent),
                    ("memory", usage.memory_percent),
                ] {
                    let Some(percent) = percent else { continue };
                    let id = format!("node_{}_{metric}_pct", usage.name);
                    self.analyze_metric(
                        &id,
                        percent,
                        &format!("Node/{}", usage.name),
                        metric,
                        node_action(metric),
                        &mut warnings,
                        &mut insufficient,
                    );
                }
            }

            for usage in &inputs.pod_usage {
                let Some(pod) = records.values().find(|r| {
                    r.kind == ResourceKind::Pod
                        && r.name == usage.name
                        && r.namespace.as_deref() == Some(usage.namespace.as_str())
                }) else {
                    continue;
                };
                if let Some(limit) = pod
                    .properties
                    .get("cpuLimitMillicores")
                    .and_then(serde_json::Value::as_u64)
                    .filter(|l| *l > 0)
                {
                    let percent = usage.cpu_millicores as f64 / limit as f64 * 100.0;
                    let id = format!("pod_{}_{}_cpu_pct", usage.namespace, usage.name);
                    self.analyze_metric(
                        &id,
                        percent,
                        &pod.full_name(),
                        "cpu",
                        "raise the CPU limit or scale the workload out",
                        &mut warnings,
                        &mut insufficient,
                    );
                }
                if let Some(limit) = pod
                    .properties
                    .get("memoryLimitBytes")
                    .and_then(serde_json::Value::as_u64)
                    .filter(|l| *l > 0)
                {
                    let percent = usage.memory_bytes as f64 / limit as f64 * 100.0;
                    let id = format!("pod_{}_{}_memory_pct", usage.namespace, usage.name);
                    self.analyze_metric(
                        &id,
                        percent,
                        &pod.full_name(),
                        "memory",
                        "raise the memory limit before the container is OOM killed",
                        &mut warnings,
                        &mut insufficient,
                    );
                }
            }
        } else {
            notes.push(
                "limited signals: metrics-server unavailable, CPU/memory forecasts skipped"
                    .to_string(),
            );
        }

        if inputs.volume_metrics_available {
            for ((namespace, pvc), stats) in &inputs.volume_stats {
                let Some(percent) = stats.utilization_percent() else {
                    continue;
                };
                let id = format!("pvc_{namespace}_{pvc}_disk_pct");
                self.analyze_metric(
                    &id,
                    percent,
                    &format!("PersistentVolumeClaim/{namespace}/{pvc}"),
                    "disk",
                    "expand the PersistentVolumeClaim or clean up data",
                    &mut warnings,
                    &mut insufficient,
                );
            }
        } else {
            notes.push(
                "limited signals: kubelet volume metrics unavailable, PVC forecasts skipped"
                    .to_string(),
            );
        }

        if insufficient > 0 {
            notes.push(format!(
                "insufficient data to forecast {insufficient} metric(s); trends need at least {MIN_SAMPLES_LINEAR} samples"
            ));
        }

        warnings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.resource.cmp(&b.resource))
                .then_with(|| a.metric.cmp(&b.metric))
        });
        (warnings, notes)
    }

    /// Record the sample, load history, and emit a warning when warranted.
    #[allow(clippy::too_many_arguments)]
    fn analyze_metric(
        &self,
        metric_id: &str,
        current: f64,
        resource: &str,
        metric: &str,
        action: &str,
        warnings: &mut Vec<CapacityWarning>,
        insufficient: &mut usize,
    ) {
        let history = match &self.cache {
            Some(cache) => cache
                .record(metric_id, self.now.timestamp(), current)
                .unwrap_or_else(|e| {
                    debug!(metric = metric_id, error = %e, "cache unavailable for metric");
                    vec![(self.now.timestamp(), current)]
                }),
            None => vec![(self.now.timestamp(), current)],
        };

        if current >= CAPACITY_THRESHOLD {
            warnings.push(CapacityWarning {
                resource: resource.to_string(),
                metric: metric.to_string(),
                severity: Severity::Critical,
                current_percent: current,
                projected_percent: Some(current),
                hours_to_threshold: Some(0.0),
                action: action.to_string(),
            });
            return;
        }

        match forecast(&history, self.horizon_hours as f64, CAPACITY_THRESHOLD) {
            Some(result) => {
                if let Some(hours) = result.hours_to_threshold {
                    warnings.push(CapacityWarning {
                        resource: resource.to_string(),
                        metric: metric.to_string(),
                        severity: Severity::Warning,
                        current_percent: result.current,
                        projected_percent: Some(result.projected),
                        hours_to_threshold: Some(hours),
                        action: action.to_string(),
                    });
                }
            }
            None => *insufficient += 1,
        }
    }

    /// Certificate analysis over the namespace's TLS secrets.
    pub fn certificates(
        &self,
        records: &BTreeMap<String, ResourceRecord>,
    ) -> (Vec<CertificateWarning>, Vec<String>) {
        let mut certs = Vec::new();
        let mut notes = Vec::new();

        for record in records.values() {
            if record.kind != ResourceKind::Secret
                || record.prop_str("secretType") != Some("kubernetes.io/tls")
            {
                continue;
            }
            let Some(crt) = record.prop_str("tlsCrt") else {
                continue;
            };
            match parse_not_after(crt) {
                Ok(not_after) => certs.push(ParsedCert {
                    secret: record.full_name(),
                    not_after,
                }),
                Err(e) => notes.push(format!("{}: {e}", record.full_name())),
            }
        }

        (self.warnings_from_certs(&certs, records), notes)
    }

    /// Warning emission from already-parsed certificates; split out so the
    /// day-threshold logic is testable without DER fixtures.
    pub fn warnings_from_certs(
        &self,
        certs: &[ParsedCert],
        records: &BTreeMap<String, ResourceRecord>,
    ) -> Vec<CertificateWarning> {
        let mut warnings: Vec<CertificateWarning> = certs
            .iter()
            .filter_map(|cert| {
                let days_left = (cert.not_after - self.now).num_days();
                if days_left > CERT_WARNING_DAYS {
                    return None;
                }
                let severity = if days_left <= CERT_CRITICAL_DAYS {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                let secret_name = cert.secret.rsplit('/').next().unwrap_or(&cert.secret);
                Some(CertificateWarning {
                    secret: cert.secret.clone(),
                    expires: cert.not_after,
                    days_left,
                    severity,
                    referenced_by: referring_ingresses(records, secret_name),
                    action: format!("renew the certificate in secret {secret_name}"),
                })
            })
            .collect();
        warnings.sort_by(|a, b| a.days_left.cmp(&b.days_left).then_with(|| a.secret.cmp(&b.secret)));
        warnings
    }
}

fn node_action(metric: &str) -> &'static str {
    match metric {
        "cpu" => "rebalance workloads or add nodes before CPU saturates",
        _ => "rebalance workloads or add nodes before memory saturates",
    }
}

fn referring_ingresses(
    records: &BTreeMap<String, ResourceRecord>,
    secret_name: &str,
) -> Vec<String> {
    let mut referrers: Vec<String> = records
        .values()
        .filter(|r| r.kind == ResourceKind::Ingress)
        .filter(|r| {
            r.prop_str_list("tlsSecretNames")
                .iter()
                .any(|s| s == secret_name)
        })
        .map(|r| r.full_name())
        .collect();
    referrers.sort();
    referrers
}
