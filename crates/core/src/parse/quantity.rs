//! Kubernetes quantity parsing
//!
//! Handles the suffixes that appear in resource requests, `kubectl top`
//! tables, and PVC capacities: binary (Ki, Mi, Gi, Ti, Pi), decimal
//! (k, M, G, T, P), and the CPU millicore form (`250m`).

/// Parse a CPU quantity into millicores. `"250m"` -> 250, `"2"` -> 2000.
pub fn parse_cpu_millicores(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(stripped) = raw.strip_suffix('m') {
        return stripped.parse::<f64>().ok().map(|v| v.round() as u64);
    }
    raw.parse::<f64>().ok().map(|v| (v * 1000.0).round() as u64)
}

/// Parse a memory/storage quantity into bytes. `"512Mi"` -> 536870912.
pub fn parse_bytes(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let split = raw.find(|c: char| !c.is_ascii_digit() && c != '.');
    let (number, suffix) = match split {
        Some(idx) => raw.split_at(idx),
        None => (raw, ""),
    };
    let value: f64 = number.parse().ok()?;

    let multiplier: f64 = match suffix {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => 1024.0_f64.powi(2),
        "Gi" => 1024.0_f64.powi(3),
        "Ti" => 1024.0_f64.powi(4),
        "Pi" => 1024.0_f64.powi(5),
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        // CPU-style millis occasionally appear on memory columns
        "m" => 1e-3,
        _ => return None,
    };

    Some((value * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_quantities() {
        assert_eq!(parse_cpu_millicores("250m"), Some(250));
        assert_eq!(parse_cpu_millicores("2"), Some(2000));
        assert_eq!(parse_cpu_millicores("0.5"), Some(500));
        assert_eq!(parse_cpu_millicores("3000"), Some(3_000_000));
        assert_eq!(parse_cpu_millicores(""), None);
        assert_eq!(parse_cpu_millicores("abc"), None);
    }

    #[test]
    fn byte_quantities() {
        assert_eq!(parse_bytes("1024"), Some(1024));
        assert_eq!(parse_bytes("1Ki"), Some(1024));
        assert_eq!(parse_bytes("512Mi"), Some(512 * 1024 * 1024));
        assert_eq!(parse_bytes("1Gi"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_bytes("2G"), Some(2_000_000_000));
        assert_eq!(parse_bytes("bogus"), None);
    }
}
