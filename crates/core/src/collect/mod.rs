//! Collectors
//!
//! Thin fan-out layer that knows what to fetch for a given command and
//! subject. All fetches for a plan run concurrently behind a shared
//! semaphore, each bounded by a per-call deadline, the whole plan bounded
//! by a per-run deadline. Partial failures never abort collection: each
//! failed source becomes a [`PartialError`] and the run continues with
//! whatever arrived. Completion order is scrubbed out by sorting the
//! artifacts afterwards, so scheduling can never change the output.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::client::{ClusterClient, EventFilter};
use crate::error::{ClientError, PartialError, PartialErrorKind};
use crate::models::ResourceKind;

/// Default per-container log tail.
pub const LOG_TAIL_LINES: u32 = 100;

/// One planned fetch.
#[derive(Debug, Clone)]
pub enum Fetch {
    Get {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
    List {
        kind: ResourceKind,
        namespace: Option<String>,
        selector: Option<String>,
    },
    Describe {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
    Events {
        namespace: String,
        filter: Option<EventFilter>,
    },
    Logs {
        namespace: String,
        pod: String,
        container: String,
        previous: bool,
    },
    TopPods {
        namespace: String,
    },
    TopNodes,
    KubeletMetrics {
        node: String,
    },
}

impl Fetch {
    /// Human label for partial-error notes and logging.
    pub fn label(&self) -> String {
        match self {
            Self::Get { kind, name, .. } => format!("get {kind}/{name}"),
            Self::List { kind, .. } => format!("list {}", kind.resource_name()),
            Self::Describe { kind, name, .. } => format!("describe {kind}/{name}"),
            Self::Events { .. } => "events".to_string(),
            Self::Logs {
                pod,
                container,
                previous,
                ..
            } => {
                if *previous {
                    format!("logs {pod}/{container} (previous)")
                } else {
                    format!("logs {pod}/{container}")
                }
            }
            Self::TopPods { .. } => "top pods".to_string(),
            Self::TopNodes => "top nodes".to_string(),
            Self::KubeletMetrics { node } => format!("kubelet metrics {node}"),
        }
    }

    /// Sort key that makes artifact order independent of completion order.
    fn sort_key(&self) -> (u8, String) {
        let rank = match self {
            Self::Get { .. } => 0,
            Self::List { .. } => 1,
            Self::Describe { .. } => 2,
            Self::Events { .. } => 3,
            Self::Logs { .. } => 4,
            Self::TopPods { .. } => 5,
            Self::TopNodes => 6,
            Self::KubeletMetrics { .. } => 7,
        };
        (rank, self.label())
    }
}

/// Raw artifact produced by one fetch.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// JSON from get/list.
    Resources(Vec<u8>),
    Description(String),
    /// JSON event list.
    Events(Vec<u8>),
    LogTail {
        pod: String,
        container: String,
        previous: bool,
        text: String,
    },
    PodMetrics {
        namespace: String,
        text: String,
    },
    NodeMetrics(String),
    KubeletMetrics {
        node: String,
        text: String,
    },
}

/// Everything a plan produced.
#[derive(Debug, Default)]
pub struct Collection {
    pub artifacts: Vec<Artifact>,
    pub partial_errors: Vec<PartialError>,
}

impl Collection {
    pub fn notes(&self) -> Vec<String> {
        self.partial_errors.iter().map(PartialError::note).collect()
    }

    /// True when a source failed with the given kind.
    pub fn failed_with(&self, kind: PartialErrorKind, source_fragment: &str) -> bool {
        self.partial_errors
            .iter()
            .any(|e| e.kind == kind && e.source.contains(source_fragment))
    }
}

/// Concurrency limits for one run.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_concurrent: usize,
    pub per_call: Duration,
    pub per_run: Duration,
}

pub struct Collector {
    client: Arc<dyn ClusterClient>,
    limits: Limits,
}

impl Collector {
    pub fn new(client: Arc<dyn ClusterClient>, limits: Limits) -> Self {
        Self { client, limits }
    }

    /// Run every fetch in the plan concurrently and gather what arrives
    /// before the run deadline.
    pub async fn collect(&self, plan: Vec<Fetch>) -> Collection {
        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrent));
        let mut set: JoinSet<(usize, Result<Artifact, PartialError>)> = JoinSet::new();

        for (index, fetch) in plan.iter().cloned().enumerate() {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let per_call = self.limits.per_call;
            set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            index,
                            Err(PartialError {
                                source: fetch.label(),
                                kind: PartialErrorKind::Other,
                                message: "collector pool shut down".to_string(),
                            }),
                        )
                    }
                };
                let label = fetch.label();
                // Per-call deadline applies here and inside the client
                let result =
                    match tokio::time::timeout(per_call, run_fetch(client.as_ref(), &fetch, per_call))
                        .await
                    {
                        Ok(outcome) => outcome.map_err(|e| PartialError::from_client(label, &e)),
                        Err(_) => Err(PartialError {
                            source: label,
                            kind: PartialErrorKind::Timeout,
                            message: format!("after {per_call:?}"),
                        }),
                    };
                (index, result)
            });
        }

        let mut outcomes: Vec<(usize, Result<Artifact, PartialError>)> = Vec::new();
        let deadline = tokio::time::sleep(self.limits.per_run);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    set.abort_all();
                    debug!(pending = plan.len() - outcomes.len(), "run deadline hit, continuing with partial data");
                    outcomes.push((
                        usize::MAX,
                        Err(PartialError {
                            source: "collection".to_string(),
                            kind: PartialErrorKind::Timeout,
                            message: format!("run deadline {:?} exceeded", self.limits.per_run),
                        }),
                    ));
                    break;
                }
                joined = set.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok(outcome)) => outcomes.push(outcome),
                        Some(Err(e)) if e.is_cancelled() => {}
                        Some(Err(e)) => outcomes.push((
                            usize::MAX,
                            Err(PartialError {
                                source: "collection".to_string(),
                                kind: PartialErrorKind::Other,
                                message: format!("collector task failed: {e}"),
                            }),
                        )),
                    }
                }
            }
        }

        // Plan order, not completion order, decides the output
        outcomes.sort_by_key(|(index, _)| {
            plan.get(*index)
                .map(|f| f.sort_key())
                .unwrap_or((u8::MAX, String::new()))
        });

        let mut collection = Collection::default();
        for (_, outcome) in outcomes {
            match outcome {
                Ok(artifact) => collection.artifacts.push(artifact),
                Err(partial) => collection.partial_errors.push(partial),
            }
        }
        collection
    }
}

async fn run_fetch(
    client: &dyn ClusterClient,
    fetch: &Fetch,
    deadline: Duration,
) -> Result<Artifact, ClientError> {
    match fetch {
        Fetch::Get {
            kind,
            namespace,
            name,
        } => client
            .get(kind, namespace.as_deref(), name, deadline)
            .await
            .map(Artifact::Resources),
        Fetch::List {
            kind,
            namespace,
            selector,
        } => client
            .list_namespaced(kind, namespace.as_deref(), selector.as_deref(), deadline)
            .await
            .map(Artifact::Resources),
        Fetch::Describe {
            kind,
            namespace,
            name,
        } => client
            .describe(kind, namespace.as_deref(), name, deadline)
            .await
            .map(Artifact::Description),
        Fetch::Events { namespace, filter } => client
            .events(namespace, filter.as_ref(), deadline)
            .await
            .map(Artifact::Events),
        Fetch::Logs {
            namespace,
            pod,
            container,
            previous,
        } => client
            .logs(namespace, pod, container, LOG_TAIL_LINES, *previous, deadline)
            .await
            .map(|text| Artifact::LogTail {
                pod: pod.clone(),
                container: container.clone(),
                previous: *previous,
                text,
            }),
        Fetch::TopPods { namespace } => client
            .top_pods(namespace, deadline)
            .await
            .map(|text| Artifact::PodMetrics {
                namespace: namespace.clone(),
                text,
            }),
        Fetch::TopNodes => client.top_nodes(deadline).await.map(Artifact::NodeMetrics),
        Fetch::KubeletMetrics { node } => client
            .raw_get(&format!("/api/v1/nodes/{node}/proxy/metrics"), deadline)
            .await
            .map(|bytes| Artifact::KubeletMetrics {
                node: node.clone(),
                text: String::from_utf8_lossy(&bytes).into_owned(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Client that records concurrency and can fail or stall per kind.
    struct ProbeClient {
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
        forbidden_lists: bool,
    }

    impl ProbeClient {
        fn new(delay: Duration, forbidden_lists: bool) -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay,
                forbidden_lists,
            }
        }

        async fn track<T>(&self, value: T) -> T {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            value
        }
    }

    #[async_trait]
    impl ClusterClient for ProbeClient {
        async fn list_namespaced(
            &self,
            _kind: &ResourceKind,
            _namespace: Option<&str>,
            _selector: Option<&str>,
            _deadline: Duration,
        ) -> Result<Vec<u8>, ClientError> {
            if self.forbidden_lists {
                return self
                    .track(Err(ClientError::Forbidden("lists are forbidden".into())))
                    .await;
            }
            self.track(Ok(b"{\"kind\":\"List\",\"items\":[]}".to_vec())).await
        }

        async fn get(
            &self,
            _kind: &ResourceKind,
            _namespace: Option<&str>,
            _name: &str,
            _deadline: Duration,
        ) -> Result<Vec<u8>, ClientError> {
            self.track(Ok(b"{}".to_vec())).await
        }

        async fn describe(
            &self,
            _kind: &ResourceKind,
            _namespace: Option<&str>,
            _name: &str,
            _deadline: Duration,
        ) -> Result<String, ClientError> {
            self.track(Ok("described".to_string())).await
        }

        async fn events(
            &self,
            _namespace: &str,
            _filter: Option<&EventFilter>,
            _deadline: Duration,
        ) -> Result<Vec<u8>, ClientError> {
            self.track(Ok(b"{\"items\":[]}".to_vec())).await
        }

        async fn logs(
            &self,
            _namespace: &str,
            _pod: &str,
            _container: &str,
            _tail: u32,
            _previous: bool,
            _deadline: Duration,
        ) -> Result<String, ClientError> {
            self.track(Ok(String::new())).await
        }

        async fn top_pods(
            &self,
            _namespace: &str,
            _deadline: Duration,
        ) -> Result<String, ClientError> {
            self.track(Ok(String::new())).await
        }

        async fn top_nodes(&self, _deadline: Duration) -> Result<String, ClientError> {
            self.track(Ok(String::new())).await
        }

        async fn raw_get(&self, _path: &str, _deadline: Duration) -> Result<Vec<u8>, ClientError> {
            self.track(Ok(Vec::new())).await
        }

        async fn current_context(&self) -> Result<String, ClientError> {
            Ok("probe".to_string())
        }

        async fn can_i(
            &self,
            _verb: &str,
            _resource: &str,
            _namespace: Option<&str>,
            _deadline: Duration,
        ) -> Result<bool, ClientError> {
            Ok(true)
        }
    }

    fn list_plan(count: usize) -> Vec<Fetch> {
        (0..count)
            .map(|i| Fetch::List {
                kind: ResourceKind::Pod,
                namespace: Some(format!("ns-{i}")),
                selector: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn concurrency_respects_the_cap() {
        let client = Arc::new(ProbeClient::new(Duration::from_millis(30), false));
        let collector = Collector::new(
            client.clone(),
            Limits {
                max_concurrent: 3,
                per_call: Duration::from_secs(1),
                per_run: Duration::from_secs(5),
            },
        );

        let collection = collector.collect(list_plan(10)).await;
        assert_eq!(collection.artifacts.len(), 10);
        assert!(collection.partial_errors.is_empty());
        assert!(client.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn forbidden_sources_become_partial_errors() {
        let client = Arc::new(ProbeClient::new(Duration::from_millis(1), true));
        let collector = Collector::new(
            client,
            Limits {
                max_concurrent: 5,
                per_call: Duration::from_secs(1),
                per_run: Duration::from_secs(5),
            },
        );

        let mut plan = list_plan(2);
        plan.push(Fetch::TopNodes);
        let collection = collector.collect(plan).await;

        assert_eq!(collection.artifacts.len(), 1);
        assert_eq!(collection.partial_errors.len(), 2);
        assert!(collection.failed_with(PartialErrorKind::Forbidden, "list"));
    }

    #[tokio::test]
    async fn run_deadline_cancels_stragglers() {
        let client = Arc::new(ProbeClient::new(Duration::from_secs(30), false));
        let collector = Collector::new(
            client,
            Limits {
                max_concurrent: 5,
                per_call: Duration::from_secs(60),
                per_run: Duration::from_millis(50),
            },
        );

        let started = std::time::Instant::now();
        let collection = collector.collect(list_plan(3)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(collection.artifacts.is_empty());
        assert!(collection.failed_with(PartialErrorKind::Timeout, "collection"));
    }

    #[tokio::test]
    async fn artifact_order_is_independent_of_completion_order() {
        // Varying delays scramble completion; output must stay sorted
        let client = Arc::new(ProbeClient::new(Duration::from_millis(5), false));
        let collector = Collector::new(
            client,
            Limits {
                max_concurrent: 8,
                per_call: Duration::from_secs(1),
                per_run: Duration::from_secs(5),
            },
        );

        let plan = vec![
            Fetch::TopNodes,
            Fetch::Events {
                namespace: "default".into(),
                filter: None,
            },
            Fetch::Get {
                kind: ResourceKind::Pod,
                namespace: Some("default".into()),
                name: "web".into(),
            },
        ];

        for _ in 0..3 {
            let collection = collector.collect(plan.clone()).await;
            let kinds: Vec<u8> = collection
                .artifacts
                .iter()
                .map(|a| match a {
                    Artifact::Resources(_) => 0,
                    Artifact::Events(_) => 3,
                    Artifact::NodeMetrics(_) => 6,
                    _ => 9,
                })
                .collect();
            assert_eq!(kinds, vec![0, 3, 6]);
        }
    }
}
