//! `kubectl top` table parsing
//!
//! The metrics pipeline only ever sees the plain-text tables kubectl
//! prints; there is no JSON mode for `top`.

use super::quantity;

/// One row of `kubectl top pods`.
#[derive(Debug, Clone, PartialEq)]
pub struct PodUsage {
    pub namespace: String,
    pub name: String,
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

/// One row of `kubectl top nodes`. Percent columns are present when the
/// server knows the node's allocatable capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUsage {
    pub name: String,
    pub cpu_millicores: u64,
    pub cpu_percent: Option<f64>,
    pub memory_bytes: u64,
    pub memory_percent: Option<f64>,
}

/// Parse `kubectl top pods` output for one namespace.
pub fn parse_top_pods(text: &str, namespace: &str) -> Vec<PodUsage> {
    let mut rows = Vec::new();
    for line in data_lines(text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let (Some(cpu), Some(memory)) = (
            quantity::parse_cpu_millicores(fields[1]),
            quantity::parse_bytes(fields[2]),
        ) else {
            continue;
        };
        rows.push(PodUsage {
            namespace: namespace.to_string(),
            name: fields[0].to_string(),
            cpu_millicores: cpu,
            memory_bytes: memory,
        });
    }
    rows
}

/// Parse `kubectl top nodes` output.
pub fn parse_top_nodes(text: &str) -> Vec<NodeUsage> {
    let mut rows = Vec::new();
    for line in data_lines(text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // NAME CPU(cores) CPU% MEMORY(bytes) MEMORY%
        if fields.len() >= 5 {
            let (Some(cpu), Some(memory)) = (
                quantity::parse_cpu_millicores(fields[1]),
                quantity::parse_bytes(fields[3]),
            ) else {
                continue;
            };
            rows.push(NodeUsage {
                name: fields[0].to_string(),
                cpu_millicores: cpu,
                cpu_percent: parse_percent(fields[2]),
                memory_bytes: memory,
                memory_percent: parse_percent(fields[4]),
            });
        } else if fields.len() >= 3 {
            let (Some(cpu), Some(memory)) = (
                quantity::parse_cpu_millicores(fields[1]),
                quantity::parse_bytes(fields[2]),
            ) else {
                continue;
            };
            rows.push(NodeUsage {
                name: fields[0].to_string(),
                cpu_millicores: cpu,
                cpu_percent: None,
                memory_bytes: memory,
                memory_percent: None,
            });
        }
    }
    rows
}

/// Skip the header line and blank lines.
fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !l.starts_with("NAME"))
}

fn parse_percent(field: &str) -> Option<f64> {
    field.strip_suffix('%').and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pod_table() {
        let text = "NAME            CPU(cores)   MEMORY(bytes)\n\
                    web-5f7c-abcde  250m         512Mi\n\
                    worker-0        2            1Gi\n";
        let rows = parse_top_pods(text, "production");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "web-5f7c-abcde");
        assert_eq!(rows[0].namespace, "production");
        assert_eq!(rows[0].cpu_millicores, 250);
        assert_eq!(rows[0].memory_bytes, 512 * 1024 * 1024);
        assert_eq!(rows[1].cpu_millicores, 2000);
    }

    #[test]
    fn parses_node_table_with_percentages() {
        let text = "NAME      CPU(cores)   CPU%   MEMORY(bytes)   MEMORY%\n\
                    worker-1  3500m        43%    12Gi            75%\n";
        let rows = parse_top_nodes(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cpu_millicores, 3500);
        assert_eq!(rows[0].cpu_percent, Some(43.0));
        assert_eq!(rows[0].memory_percent, Some(75.0));
    }

    #[test]
    fn empty_or_garbage_input_yields_no_rows() {
        assert!(parse_top_pods("", "default").is_empty());
        assert!(parse_top_pods("error: Metrics API not available", "default").is_empty());
        assert!(parse_top_nodes("NAME CPU(cores) CPU% MEMORY(bytes) MEMORY%\n").is_empty());
    }
}
