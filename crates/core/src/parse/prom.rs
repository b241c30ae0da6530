//! Kubelet Prometheus exposition parsing
//!
//! The node-proxy `/metrics` endpoint is the only place PVC-level disk
//! usage is visible. Only the two volume-stats series are extracted;
//! everything else in the exposition is skipped.

use std::collections::BTreeMap;

/// Disk usage of one PVC as reported by a kubelet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeStats {
    pub used_bytes: Option<f64>,
    pub capacity_bytes: Option<f64>,
}

impl VolumeStats {
    pub fn utilization_percent(&self) -> Option<f64> {
        match (self.used_bytes, self.capacity_bytes) {
            (Some(used), Some(capacity)) if capacity > 0.0 => Some(used / capacity * 100.0),
            _ => None,
        }
    }
}

/// Parse one or more concatenated expositions into
/// `(namespace, persistentvolumeclaim) -> VolumeStats`.
pub fn parse_volume_stats(text: &str) -> BTreeMap<(String, String), VolumeStats> {
    let mut stats: BTreeMap<(String, String), VolumeStats> = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((metric, labels, value)) = split_sample(line) else {
            continue;
        };
        let is_used = metric == "kubelet_volume_stats_used_bytes";
        let is_capacity = metric == "kubelet_volume_stats_capacity_bytes";
        if !is_used && !is_capacity {
            continue;
        }
        let (Some(namespace), Some(pvc)) = (
            label_value(labels, "namespace"),
            label_value(labels, "persistentvolumeclaim"),
        ) else {
            continue;
        };
        let Ok(value) = value.parse::<f64>() else {
            continue;
        };

        let entry = stats.entry((namespace, pvc)).or_default();
        if is_used {
            entry.used_bytes = Some(value);
        } else {
            entry.capacity_bytes = Some(value);
        }
    }
    stats
}

/// Split `name{labels} value` into its three parts.
fn split_sample(line: &str) -> Option<(&str, &str, &str)> {
    let open = line.find('{')?;
    let close = line[open..].find('}')? + open;
    let metric = &line[..open];
    let labels = &line[open + 1..close];
    let value = line[close + 1..].split_whitespace().next()?;
    Some((metric, labels, value))
}

fn label_value(labels: &str, key: &str) -> Option<String> {
    for part in labels.split(',') {
        let (k, v) = part.split_once('=')?;
        if k.trim() == key {
            return Some(v.trim().trim_matches('"').to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSITION: &str = r#"
# HELP kubelet_volume_stats_used_bytes Number of used bytes in the volume
# TYPE kubelet_volume_stats_used_bytes gauge
kubelet_volume_stats_used_bytes{namespace="production",persistentvolumeclaim="fillpvc"} 9.9614720e+08
kubelet_volume_stats_capacity_bytes{namespace="production",persistentvolumeclaim="fillpvc"} 1.073741824e+09
kubelet_volume_stats_used_bytes{namespace="default",persistentvolumeclaim="small"} 1048576
kubelet_volume_stats_capacity_bytes{namespace="default",persistentvolumeclaim="small"} 10485760
some_other_metric{namespace="default"} 42
"#;

    #[test]
    fn extracts_volume_series_and_ignores_others() {
        let stats = parse_volume_stats(EXPOSITION);
        assert_eq!(stats.len(), 2);

        let fillpvc = &stats[&("production".to_string(), "fillpvc".to_string())];
        assert_eq!(fillpvc.used_bytes, Some(996_147_200.0));
        assert_eq!(fillpvc.capacity_bytes, Some(1_073_741_824.0));

        let pct = fillpvc.utilization_percent().unwrap();
        assert!((pct - 92.77).abs() < 0.1, "expected ~92.8%, got {pct}");
    }

    #[test]
    fn tolerates_malformed_lines() {
        let stats = parse_volume_stats("kubelet_volume_stats_used_bytes no-labels 5\n{}\n");
        assert!(stats.is_empty());
    }

    #[test]
    fn missing_capacity_means_no_utilization() {
        let stats =
            parse_volume_stats("kubelet_volume_stats_used_bytes{namespace=\"a\",persistentvolumeclaim=\"b\"} 10\n");
        let entry = &stats[&("a".to_string(), "b".to_string())];
        assert!(entry.utilization_percent().is_none());
    }
}
