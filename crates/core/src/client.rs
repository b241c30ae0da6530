//! Cluster API boundary
//!
//! Every cluster access goes through [`ClusterClient`]. All operations are
//! read-only, concurrency-safe, and carry an explicit deadline. The
//! production implementation shells out to kubectl and lives in the CLI
//! crate; the pipeline tests use an in-memory fixture.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::models::ResourceKind;

/// Field-selector style filter for event retrieval.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub kind: String,
    pub name: String,
}

/// Read-only boundary to the cluster API.
///
/// Implementations must distinguish `NotFound`, `Forbidden`, `Timeout`,
/// and `Unavailable` so the collectors can apply the per-source failure
/// policy. None of these operations mutate cluster state.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List resources of a kind in a namespace as raw JSON bytes.
    /// `selector` is a label selector in `k=v,k2=v2` form.
    async fn list_namespaced(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        selector: Option<&str>,
        deadline: Duration,
    ) -> Result<Vec<u8>, ClientError>;

    /// Fetch a single resource as raw JSON bytes.
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        deadline: Duration,
    ) -> Result<Vec<u8>, ClientError>;

    /// Verbose human-oriented description of a resource.
    async fn describe(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        deadline: Duration,
    ) -> Result<String, ClientError>;

    /// Events in a namespace, optionally filtered to one involved object.
    async fn events(
        &self,
        namespace: &str,
        filter: Option<&EventFilter>,
        deadline: Duration,
    ) -> Result<Vec<u8>, ClientError>;

    /// Tail of one container's logs.
    async fn logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        tail: u32,
        previous: bool,
        deadline: Duration,
    ) -> Result<String, ClientError>;

    /// `kubectl top pods` style table for a namespace.
    async fn top_pods(&self, namespace: &str, deadline: Duration) -> Result<String, ClientError>;

    /// `kubectl top nodes` style table.
    async fn top_nodes(&self, deadline: Duration) -> Result<String, ClientError>;

    /// Raw GET against an API server path (node-proxy metrics).
    async fn raw_get(&self, path: &str, deadline: Duration) -> Result<Vec<u8>, ClientError>;

    /// Name of the kubeconfig context in use.
    async fn current_context(&self) -> Result<String, ClientError>;

    /// RBAC self-check for a verb/resource pair.
    async fn can_i(
        &self,
        verb: &str,
        resource: &str,
        namespace: Option<&str>,
        deadline: Duration,
    ) -> Result<bool, ClientError>;
}
