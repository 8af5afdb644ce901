//! Per-spec cluster access: a kube client and a throwaway namespace.

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use k8s_openapi::api::core::v1::{Namespace, Pod, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::wait::{Condition, await_condition};
use kube::{Client, Config};

use crate::context::TestContext;
use crate::error::FrameworkError;
use crate::names::{namespace_name, sanitize_k8s_name};
use crate::output::ExpectedOutput;

const SERVICE_ACCOUNT_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub struct Framework {
    namespace: String,
    client: Client,
    pod_start_timeout: Duration,
    delete_namespace: bool,
}

/// Get a kube client for the given context (or default)
pub async fn get_client(context: Option<&str>) -> Result<Client, FrameworkError> {
    let config = if let Some(ctx) = context {
        let kubeconfig = Kubeconfig::read()?;
        let options = KubeConfigOptions {
            context: Some(ctx.to_string()),
            ..Default::default()
        };
        Config::from_custom_kubeconfig(kubeconfig, &options).await?
    } else {
        Config::infer().await?
    };

    Ok(Client::try_from(config)?)
}

impl Framework {
    /// Connect to the cluster and create a fresh namespace for one spec
    pub async fn setup(ctx: &TestContext, base_name: &str) -> Result<Self, FrameworkError> {
        let client = get_client(ctx.kube_context.as_deref()).await?;
        Self::setup_with_client(client, ctx, base_name).await
    }

    /// Like [`Framework::setup`], over an already built client
    pub async fn setup_with_client(
        client: Client,
        ctx: &TestContext,
        base_name: &str,
    ) -> Result<Self, FrameworkError> {
        let namespace = namespace_name(base_name);
        info!(namespace = %namespace, "creating test namespace");
        let namespaces: Api<Namespace> = Api::all(client.clone());
        namespaces
            .create(&PostParams::default(), &build_namespace(&namespace, base_name))
            .await?;

        let framework = Framework {
            namespace,
            client,
            pod_start_timeout: ctx.pod_start_timeout,
            delete_namespace: ctx.delete_namespace,
        };

        // pods are rejected until the namespace's default service account exists
        if let Err(e) = framework.wait_for_default_service_account().await {
            framework.teardown().await;
            return Err(e);
        }

        Ok(framework)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn wait_for_default_service_account(&self) -> Result<(), FrameworkError> {
        let accounts: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &self.namespace);
        let cond = await_condition(accounts, "default", |sa: Option<&ServiceAccount>| sa.is_some());

        match tokio::time::timeout(SERVICE_ACCOUNT_TIMEOUT, cond).await {
            Ok(res) => {
                res?;
                Ok(())
            }
            Err(_) => Err(FrameworkError::Timeout(
                format!("default service account in '{}'", self.namespace),
                SERVICE_ACCOUNT_TIMEOUT,
            )),
        }
    }

    /// Delete the test namespace; failures are only logged
    pub async fn teardown(&self) {
        if !self.delete_namespace {
            info!(namespace = %self.namespace, "keeping test namespace");
            return;
        }

        info!(namespace = %self.namespace, "deleting test namespace");
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        if let Err(e) = namespaces.delete(&self.namespace, &DeleteParams::default()).await {
            warn!(namespace = %self.namespace, error = %e, "failed to delete test namespace");
        }
    }

    /// Run `pod` to completion and check the output of one of its containers.
    ///
    /// The pod is created in the framework's namespace and deleted afterwards
    /// whatever the outcome. `msg` prefixes the mismatch message.
    pub async fn test_container_output(
        &self,
        msg: &str,
        pod: Pod,
        container_index: usize,
        expected: &ExpectedOutput,
    ) -> Result<(), FrameworkError> {
        let pod_name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| FrameworkError::MissingField("pod metadata.name".into()))?;
        let container = container_name(&pod, container_index)?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        info!(pod = %pod_name, namespace = %self.namespace, "creating pod");
        pods.create(&PostParams::default(), &pod).await?;

        let result = self
            .check_container_output(&pods, msg, &pod_name, &container, expected)
            .await;

        if let Err(e) = pods.delete(&pod_name, &DeleteParams::default()).await {
            warn!(pod = %pod_name, error = %e, "failed to delete pod");
        }

        result
    }

    async fn check_container_output(
        &self,
        pods: &Api<Pod>,
        msg: &str,
        pod_name: &str,
        container: &str,
        expected: &ExpectedOutput,
    ) -> Result<(), FrameworkError> {
        let cond = await_condition(pods.clone(), pod_name, is_pod_completed());
        let completed = match tokio::time::timeout(self.pod_start_timeout, cond).await {
            Ok(res) => res?.ok_or_else(|| FrameworkError::PodGone(pod_name.to_string()))?,
            Err(_) => {
                return Err(FrameworkError::Timeout(
                    format!("pod '{}'", pod_name),
                    self.pod_start_timeout,
                ));
            }
        };

        let params = LogParams {
            container: Some(container.to_string()),
            ..Default::default()
        };
        let logs = pods.logs(pod_name, &params).await?;
        for line in logs.lines() {
            info!(pod = %pod_name, "{}", line);
        }

        if pod_phase(&completed) == Some("Failed") {
            return Err(FrameworkError::PodFailed {
                pod: pod_name.to_string(),
                logs,
            });
        }

        if !expected.matches(&logs) {
            return Err(FrameworkError::OutputMismatch {
                msg: msg.to_string(),
                pod: pod_name.to_string(),
                container: container.to_string(),
                expected: expected.expected().to_vec(),
                actual: logs,
            });
        }

        info!(pod = %pod_name, container = %container, "container output matched");
        Ok(())
    }
}

fn build_namespace(name: &str, base_name: &str) -> Namespace {
    let labels = BTreeMap::from([("e2e-framework".to_string(), sanitize_k8s_name(base_name))]);
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn container_name(pod: &Pod, index: usize) -> Result<String, FrameworkError> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.containers.get(index))
        .map(|c| c.name.clone())
        .ok_or_else(|| FrameworkError::NoContainer {
            pod: pod.metadata.name.clone().unwrap_or_default(),
            index,
        })
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.phase.as_deref()
}

/// Pod has reached a terminal phase (Succeeded or Failed)
pub fn is_pod_completed() -> impl Condition<Pod> {
    |obj: Option<&Pod>| {
        obj.and_then(pod_phase)
            .is_some_and(|phase| phase == "Succeeded" || phase == "Failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCluster;
    use http::Method;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodStatus};

    fn pod_in_phase(phase: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("pod-1".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "test-container".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: phase.map(str::to_string),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_completed_condition() {
        let cond = is_pod_completed();
        assert!(cond.matches_object(Some(&pod_in_phase(Some("Succeeded")))));
        assert!(cond.matches_object(Some(&pod_in_phase(Some("Failed")))));
        assert!(!cond.matches_object(Some(&pod_in_phase(Some("Pending")))));
        assert!(!cond.matches_object(Some(&pod_in_phase(Some("Running")))));
        assert!(!cond.matches_object(Some(&pod_in_phase(None))));
        assert!(!cond.matches_object(None));
    }

    #[test]
    fn test_container_name_by_index() {
        let pod = pod_in_phase(None);
        assert_eq!(container_name(&pod, 0).unwrap(), "test-container");
        let err = container_name(&pod, 1).unwrap_err();
        assert_eq!(err.to_string(), "pod 'pod-1' has no container at index 1");
    }

    #[test]
    fn test_build_namespace() {
        let ns = build_namespace("e2e-tests-localssd-abcde", "localssd");
        assert_eq!(ns.metadata.name.as_deref(), Some("e2e-tests-localssd-abcde"));
        let labels = ns.metadata.labels.unwrap();
        assert_eq!(labels.get("e2e-framework").map(String::as_str), Some("localssd"));
    }

    #[test]
    fn test_mismatch_message_carries_output() {
        let err = FrameworkError::OutputMismatch {
            msg: String::new(),
            pod: "pod-1".to_string(),
            container: "test-container".to_string(),
            expected: vec!["hello world".to_string()],
            actual: "oops\n".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("pod 'pod-1'"));
        assert!(text.contains("\"hello world\""));
        assert!(text.contains("oops"));
    }

    fn new_pod() -> Pod {
        let mut pod = pod_in_phase(None);
        pod.status = None;
        pod
    }

    async fn framework(phase: &str, logs: &str, pod_start_timeout: Duration) -> (Framework, MockCluster) {
        let (client, cluster) = MockCluster::start(phase, logs);
        let ctx = TestContext {
            provider: "gke".to_string(),
            pod_start_timeout,
            ..Default::default()
        };
        let f = Framework::setup_with_client(client, &ctx, "localssd").await.unwrap();
        (f, cluster)
    }

    #[tokio::test]
    async fn test_setup_creates_namespace() {
        let (f, cluster) = framework("Succeeded", "", Duration::from_secs(5)).await;
        assert!(f.namespace().starts_with("e2e-tests-localssd-"));

        let calls = cluster.calls();
        assert_eq!(calls[0].method, Method::POST);
        assert_eq!(calls[0].path, "/api/v1/namespaces");
        let sa_path = format!("/api/v1/namespaces/{}/serviceaccounts", f.namespace());
        assert!(calls.iter().any(|c| c.path == sa_path));

        f.teardown().await;
        assert_eq!(
            cluster.count(Method::DELETE, &format!("/api/v1/namespaces/{}", f.namespace())),
            1
        );
    }

    #[tokio::test]
    async fn test_output_match_runs_full_sequence() {
        let (f, cluster) = framework("Succeeded", "hello world\n", Duration::from_secs(5)).await;
        f.test_container_output("", new_pod(), 0, &ExpectedOutput::lines(["hello world"]))
            .await
            .unwrap();

        let pods_path = format!("/api/v1/namespaces/{}/pods", f.namespace());
        let sequence: Vec<(Method, String)> = cluster
            .calls()
            .into_iter()
            .filter(|c| c.path.starts_with(&pods_path) && !c.query.contains("watch=true"))
            .map(|c| (c.method, c.path))
            .collect();
        assert_eq!(
            sequence,
            vec![
                (Method::POST, pods_path.clone()),
                (Method::GET, pods_path.clone()),
                (Method::GET, format!("{}/pod-1/log", pods_path)),
                (Method::DELETE, format!("{}/pod-1", pods_path)),
            ]
        );

        let log_call = cluster.calls().into_iter().find(|c| c.path.ends_with("/log")).unwrap();
        assert!(log_call.query.contains("container=test-container"));
    }

    #[tokio::test]
    async fn test_output_mismatch_still_deletes_pod() {
        let (f, cluster) = framework("Succeeded", "goodbye\n", Duration::from_secs(5)).await;
        let err = f
            .test_container_output("", new_pod(), 0, &ExpectedOutput::lines(["hello world"]))
            .await
            .unwrap_err();

        match err {
            FrameworkError::OutputMismatch { pod, actual, .. } => {
                assert_eq!(pod, "pod-1");
                assert_eq!(actual, "goodbye\n");
            }
            other => panic!("expected output mismatch, got {other}"),
        }
        assert_eq!(cluster.count(Method::DELETE, "/pods/pod-1"), 1);
    }

    #[tokio::test]
    async fn test_failed_pod_reports_logs() {
        let (f, cluster) = framework("Failed", "cat: /mnt/disks/ssd0/data: No such file\n", Duration::from_secs(5)).await;
        let err = f
            .test_container_output("", new_pod(), 0, &ExpectedOutput::lines(["hello world"]))
            .await
            .unwrap_err();

        assert!(matches!(err, FrameworkError::PodFailed { .. }));
        assert!(err.to_string().contains("No such file"));
        assert_eq!(cluster.count(Method::DELETE, "/pods/pod-1"), 1);
    }

    #[tokio::test]
    async fn test_pod_that_never_finishes_times_out() {
        let (f, cluster) = framework("Running", "", Duration::from_millis(200)).await;
        let err = f
            .test_container_output("", new_pod(), 0, &ExpectedOutput::lines(["hello world"]))
            .await
            .unwrap_err();

        assert!(matches!(err, FrameworkError::Timeout(..)));
        assert_eq!(cluster.count(Method::GET, "/log"), 0);
        assert_eq!(cluster.count(Method::DELETE, "/pods/pod-1"), 1);
    }

    #[tokio::test]
    async fn test_bad_container_index_creates_nothing() {
        let (f, cluster) = framework("Succeeded", "", Duration::from_secs(5)).await;
        let err = f
            .test_container_output("", new_pod(), 3, &ExpectedOutput::lines(["hello world"]))
            .await
            .unwrap_err();

        assert!(matches!(err, FrameworkError::NoContainer { index: 3, .. }));
        assert_eq!(cluster.count(Method::POST, "/pods"), 0);
    }
}
