//! kubectl-backed ClusterClient
//!
//! The plugin talks to the cluster exactly the way its user does: by
//! invoking kubectl. Arguments are always passed as an argv vector, never
//! through a shell. stderr is classified into the client error taxonomy,
//! and transient connection failures retry with a short backoff inside
//! the caller's deadline. All verbs used here are read-only.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use kubectl_smart_core::client::{ClusterClient, EventFilter};
use kubectl_smart_core::error::ClientError;
use kubectl_smart_core::models::ResourceKind;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

pub struct KubectlClient {
    kubectl: PathBuf,
    context: Option<String>,
}

impl KubectlClient {
    pub fn new(context: Option<String>) -> Self {
        let kubectl = std::env::var("KUBECTL_SMART_KUBECTL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("kubectl"));
        Self { kubectl, context }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args
    }

    /// Run kubectl with a deadline; retries transient connection errors
    /// while time remains.
    async fn run(&self, args: Vec<String>, deadline: Duration) -> Result<Vec<u8>, ClientError> {
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let remaining = deadline
                .checked_sub(started.elapsed())
                .ok_or(ClientError::Timeout(deadline))?;

            trace!(?args, attempt, "invoking kubectl");
            let output = tokio::time::timeout(
                remaining,
                Command::new(&self.kubectl)
                    .args(self.base_args())
                    .args(&args)
                    .stdin(Stdio::null())
                    .kill_on_drop(true)
                    .output(),
            )
            .await;

            let result = match output {
                Err(_) => Err(ClientError::Timeout(deadline)),
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(ClientError::Unavailable("kubectl not found in PATH".into()))
                }
                Ok(Err(e)) => Err(ClientError::Other(format!("failed to spawn kubectl: {e}"))),
                Ok(Ok(out)) if out.status.success() => Ok(out.stdout),
                Ok(Ok(out)) => {
                    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                    Err(classify_stderr(&stderr))
                }
            };

            match result {
                Err(ClientError::Unavailable(message))
                    if attempt < MAX_ATTEMPTS
                        && started.elapsed() + RETRY_BACKOFF * attempt < deadline =>
                {
                    debug!(attempt, %message, "transient kubectl failure, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn run_text(&self, args: Vec<String>, deadline: Duration) -> Result<String, ClientError> {
        let bytes = self.run(args, deadline).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Map kubectl stderr onto the structured error taxonomy.
fn classify_stderr(stderr: &str) -> ClientError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("notfound") {
        ClientError::NotFound(stderr.to_string())
    } else if lower.contains("forbidden")
        || lower.contains("unauthorized")
        || lower.contains("permission denied")
    {
        ClientError::Forbidden(stderr.to_string())
    } else if lower.contains("connection refused")
        || lower.contains("no such host")
        || lower.contains("unable to connect")
        || lower.contains("i/o timeout")
        || lower.contains("temporarily unavailable")
        || lower.contains("metrics api not available")
        || lower.contains("metrics not available")
    {
        ClientError::Unavailable(stderr.to_string())
    } else {
        ClientError::Other(stderr.to_string())
    }
}

fn namespace_args(namespace: Option<&str>) -> Vec<String> {
    match namespace {
        Some(ns) => vec!["-n".to_string(), ns.to_string()],
        None => vec![],
    }
}

#[async_trait]
impl ClusterClient for KubectlClient {
    async fn list_namespaced(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        selector: Option<&str>,
        deadline: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        let mut args = vec!["get".to_string(), kind.resource_name()];
        args.extend(namespace_args(namespace));
        if let Some(selector) = selector {
            args.push("-l".to_string());
            args.push(selector.to_string());
        }
        args.push("-o".to_string());
        args.push("json".to_string());
        self.run(args, deadline).await
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        deadline: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        let mut args = vec!["get".to_string(), kind.resource_name(), name.to_string()];
        args.extend(namespace_args(namespace));
        args.push("-o".to_string());
        args.push("json".to_string());
        self.run(args, deadline).await
    }

    async fn describe(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        deadline: Duration,
    ) -> Result<String, ClientError> {
        let mut args = vec![
            "describe".to_string(),
            kind.resource_name(),
            name.to_string(),
        ];
        args.extend(namespace_args(namespace));
        self.run_text(args, deadline).await
    }

    async fn events(
        &self,
        namespace: &str,
        filter: Option<&EventFilter>,
        deadline: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        let mut args = vec![
            "get".to_string(),
            "events".to_string(),
            "-n".to_string(),
            namespace.to_string(),
            "--sort-by=.lastTimestamp".to_string(),
        ];
        if let Some(filter) = filter {
            args.push("--field-selector".to_string());
            args.push(format!(
                "involvedObject.name={},involvedObject.kind={}",
                filter.name, filter.kind
            ));
        }
        args.push("-o".to_string());
        args.push("json".to_string());
        self.run(args, deadline).await
    }

    async fn logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        tail: u32,
        previous: bool,
        deadline: Duration,
    ) -> Result<String, ClientError> {
        let mut args = vec![
            "logs".to_string(),
            pod.to_string(),
            "-c".to_string(),
            container.to_string(),
            "-n".to_string(),
            namespace.to_string(),
            format!("--tail={tail}"),
        ];
        if previous {
            args.push("--previous".to_string());
        }
        self.run_text(args, deadline).await
    }

    async fn top_pods(&self, namespace: &str, deadline: Duration) -> Result<String, ClientError> {
        self.run_text(
            vec![
                "top".to_string(),
                "pods".to_string(),
                "-n".to_string(),
                namespace.to_string(),
            ],
            deadline,
        )
        .await
    }

    async fn top_nodes(&self, deadline: Duration) -> Result<String, ClientError> {
        self.run_text(vec!["top".to_string(), "nodes".to_string()], deadline)
            .await
    }

    async fn raw_get(&self, path: &str, deadline: Duration) -> Result<Vec<u8>, ClientError> {
        self.run(
            vec!["get".to_string(), "--raw".to_string(), path.to_string()],
            deadline,
        )
        .await
    }

    async fn current_context(&self) -> Result<String, ClientError> {
        if let Some(context) = &self.context {
            return Ok(context.clone());
        }
        let text = self
            .run_text(
                vec!["config".to_string(), "current-context".to_string()],
                Duration::from_secs(2),
            )
            .await?;
        Ok(text.trim().to_string())
    }

    async fn can_i(
        &self,
        verb: &str,
        resource: &str,
        namespace: Option<&str>,
        deadline: Duration,
    ) -> Result<bool, ClientError> {
        let mut args = vec![
            "auth".to_string(),
            "can-i".to_string(),
            verb.to_string(),
            resource.to_string(),
        ];
        args.extend(namespace_args(namespace));

        // `kubectl auth can-i` prints "no" and exits 1 when denied
        match self.run_text(args, deadline).await {
            Ok(text) => Ok(text.trim().eq_ignore_ascii_case("yes")),
            Err(ClientError::Other(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_classification() {
        assert!(matches!(
            classify_stderr("Error from server (NotFound): pods \"x\" not found"),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            classify_stderr("Error from server (Forbidden): pods is forbidden"),
            ClientError::Forbidden(_)
        ));
        assert!(matches!(
            classify_stderr("Unable to connect to the server: dial tcp: connection refused"),
            ClientError::Unavailable(_)
        ));
        assert!(matches!(
            classify_stderr("error: Metrics API not available"),
            ClientError::Unavailable(_)
        ));
        assert!(matches!(
            classify_stderr("some other failure"),
            ClientError::Other(_)
        ));
    }

    #[test]
    fn namespace_args_only_when_present() {
        assert!(namespace_args(None).is_empty());
        assert_eq!(namespace_args(Some("prod")), vec!["-n", "prod"]);
    }
}
