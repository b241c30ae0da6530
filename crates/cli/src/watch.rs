//! Watch mode
//!
//! Re-invokes the pipeline on an interval. For `diag` the issue sets of
//! consecutive runs are diffed by `(reason, resource)` and only changes
//! are printed; `graph` and `top` simply re-render. Runs until Ctrl-C,
//! which the caller turns into exit code 2.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use chrono::Local;
use colored::Colorize;
use tracing::warn;

use kubectl_smart_core::error::SmartError;
use kubectl_smart_core::models::{DiagnosisReport, Severity, Subject};
use kubectl_smart_core::Pipeline;

const MIN_INTERVAL: f64 = 1.0;

fn interval_duration(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds.max(MIN_INTERVAL))
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Diff-based watch for `diag`. Never returns except through an error.
pub async fn watch_diag(
    pipeline: &Pipeline,
    subject: &Subject,
    interval_secs: f64,
) -> Result<u8, SmartError> {
    let interval = interval_duration(interval_secs);
    println!(
        "WATCH: {} every {:.0}s (Ctrl-C to stop)",
        subject.full_name(),
        interval.as_secs_f64()
    );

    let mut previous: Option<BTreeSet<(String, String)>> = None;
    loop {
        match pipeline.diag(subject).await {
            Ok(report) => {
                let current = issue_keys(&report);
                match &previous {
                    None => print_initial(&report),
                    Some(prior) => print_changes(prior, &current, &report),
                }
                previous = Some(current);
            }
            // Fatal errors stop the watch; a transient blip is worth a retry
            Err(e @ SmartError::Input(_)) | Err(e @ SmartError::Config(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "watch iteration failed");
                println!("[{}] check failed: {e}", timestamp());
            }
        }
        tokio::time::sleep(interval).await;
    }
}

/// Re-render watch for `graph` and `top`.
pub async fn watch_reprint<F, Fut>(interval_secs: f64, mut run: F) -> Result<u8, SmartError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, SmartError>>,
{
    let interval = interval_duration(interval_secs);
    loop {
        match run().await {
            Ok(output) => {
                println!("--- {} ---", timestamp());
                print!("{output}");
            }
            Err(e @ SmartError::Input(_)) | Err(e @ SmartError::Config(_)) => return Err(e),
            Err(e) => println!("[{}] check failed: {e}", timestamp()),
        }
        tokio::time::sleep(interval).await;
    }
}

fn issue_keys(report: &DiagnosisReport) -> BTreeSet<(String, String)> {
    report
        .issues
        .iter()
        .map(|i| (i.reason.clone(), i.resource.clone()))
        .collect()
}

fn print_initial(report: &DiagnosisReport) {
    let critical = report.count_by_severity(Severity::Critical);
    let warning = report.count_by_severity(Severity::Warning);
    println!(
        "[{}] initial state: {} issue(s), {} critical, {} warning",
        timestamp(),
        report.issues.len(),
        critical,
        warning
    );
    if let Some(root) = &report.root_cause {
        println!("           root cause: {} (score {})", root.title, root.score);
    }
}

fn print_changes(
    prior: &BTreeSet<(String, String)>,
    current: &BTreeSet<(String, String)>,
    report: &DiagnosisReport,
) {
    for (reason, resource) in current.difference(prior) {
        let score = report
            .issues
            .iter()
            .find(|i| &i.reason == reason && &i.resource == resource)
            .map(|i| i.score)
            .unwrap_or(0);
        println!(
            "[{}] {} new issue: {reason} on {resource} (score {score})",
            timestamp(),
            "+".red().bold()
        );
    }
    for (reason, resource) in prior.difference(current) {
        println!(
            "[{}] {} resolved: {reason} on {resource}",
            timestamp(),
            "-".green().bold()
        );
    }
}
