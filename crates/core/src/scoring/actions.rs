//! Suggested-action playbooks
//!
//! Each known reason maps to a short fixed playbook. The only templating
//! allowed is `${name}`, `${namespace}`, and `${container}` substitution;
//! nothing resource-specific is fabricated beyond that.

/// Fixed playbook for a reason, still holding template parameters.
fn playbook(reason: &str) -> &'static [&'static str] {
    match reason {
        "CrashLoopBackOff" => &[
            "inspect previous-container logs: kubectl logs ${name} -c ${container} -n ${namespace} --previous",
            "check the container entrypoint and the readiness of its dependencies",
            "check the last exit code: kubectl describe pod ${name} -n ${namespace}",
        ],
        "ImagePullBackOff" | "ErrImagePull" => &[
            "verify the image name and tag",
            "check image pull secrets: kubectl get secrets -n ${namespace}",
            "confirm the registry is reachable from the nodes",
        ],
        "OOMKilled" => &[
            "raise the container memory limit",
            "inspect memory usage: kubectl top pod ${name} -n ${namespace}",
            "inspect previous-container logs: kubectl logs ${name} -c ${container} -n ${namespace} --previous",
        ],
        "FailedScheduling" => &[
            "check node capacity: kubectl top nodes",
            "compare the pod's resource requests with allocatable node capacity",
            "check taints and affinity: kubectl describe pod ${name} -n ${namespace}",
        ],
        "FailedMount" | "FailedAttachVolume" => &[
            "check the claim: kubectl get pvc -n ${namespace}",
            "verify the storage class and its provisioner",
            "check mount events: kubectl describe pod ${name} -n ${namespace}",
        ],
        "Unhealthy" => &[
            "review the liveness/readiness probe configuration",
            "inspect container logs: kubectl logs ${name} -c ${container} -n ${namespace}",
        ],
        "BackOff" => &[
            "inspect container logs: kubectl logs ${name} -c ${container} -n ${namespace}",
            "check the container exit code: kubectl describe pod ${name} -n ${namespace}",
        ],
        "Evicted" => &[
            "check node pressure conditions: kubectl describe node",
            "review the pod's resource requests and limits",
        ],
        "NodeNotReady" | "NetworkNotReady" => &[
            "check node status: kubectl describe node ${name}",
            "check kubelet and container runtime health on the node",
        ],
        _ => &[
            "inspect recent events: kubectl describe ${name} -n ${namespace}",
        ],
    }
}

/// Render the playbook for a reason with parameters substituted.
pub fn suggested_actions(
    reason: &str,
    name: &str,
    namespace: Option<&str>,
    container: Option<&str>,
) -> Vec<String> {
    let namespace = namespace.unwrap_or("default");
    let container = container.unwrap_or("app");
    playbook(reason)
        .iter()
        .map(|template| {
            template
                .replace("${name}", name)
                .replace("${namespace}", namespace)
                .replace("${container}", container)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crashloop_playbook_mentions_previous_logs() {
        let actions = suggested_actions(
            "CrashLoopBackOff",
            "failing-app-xyz",
            Some("production"),
            Some("app"),
        );
        assert!(actions[0].contains("--previous"));
        assert!(actions[0].contains("failing-app-xyz"));
        assert!(actions[0].contains("-n production"));
        assert!(actions.len() <= 4);
    }

    #[test]
    fn unknown_reasons_get_the_generic_playbook() {
        let actions = suggested_actions("SomethingOdd", "w", None, None);
        assert_eq!(actions.len(), 1);
        assert!(actions[0].contains("kubectl describe w"));
    }

    #[test]
    fn no_unsubstituted_placeholders_remain() {
        for reason in [
            "CrashLoopBackOff",
            "ImagePullBackOff",
            "OOMKilled",
            "FailedScheduling",
            "FailedMount",
            "Unhealthy",
            "BackOff",
            "Evicted",
            "NodeNotReady",
        ] {
            for action in suggested_actions(reason, "p", Some("ns"), Some("c")) {
                assert!(!action.contains("${"), "unsubstituted template in {action}");
            }
        }
    }
}
