//! GKE local SSD: a node pool with a local SSD exposes the disk to pods
//! through a hostPath mount.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{info, warn};

use k8s_openapi::api::core::v1::{Container, HostPathVolumeSource, Pod, PodSpec, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::gcloud::Gcloud;
use e2e_framework::{E2eSpec, ExpectedOutput, Framework, Skipped, TestContext};

pub const NODE_POOL_NAME: &str = "np-ssd";

const CONTAINER_NAME: &str = "test-container";
const VOLUME_NAME: &str = "test-ssd-volume";
const SSD_MOUNT_PATH: &str = "/mnt/disks/ssd0";
const IMAGE: &str = "ubuntu:14.04";
const LOCAL_SSD_NODE_LABEL: &str = "cloud.google.com/gke-local-ssd";

const WRITE_AND_READ_COMMAND: &str =
    "echo 'hello world' > /mnt/disks/ssd0/data  && sleep 1 && cat /mnt/disks/ssd0/data";

pub struct LocalSsdSpec {
    node_pool: String,
    delete_node_pool: bool,
}

impl Default for LocalSsdSpec {
    fn default() -> Self {
        Self::new(NODE_POOL_NAME, false)
    }
}

impl LocalSsdSpec {
    pub fn new(node_pool: &str, delete_node_pool: bool) -> Self {
        Self {
            node_pool: node_pool.to_string(),
            delete_node_pool,
        }
    }
}

#[async_trait]
impl E2eSpec for LocalSsdSpec {
    fn name(&self) -> String {
        "GKE local SSD [Feature:GKELocalSSD] should write and read from node local SSD [Feature:GKELocalSSD]"
            .to_string()
    }

    fn base_name(&self) -> &str {
        "localssd"
    }

    fn before_each(&self, ctx: &TestContext) -> Result<(), Skipped> {
        ctx.skip_unless_provider_is(&["gke"])
    }

    async fn run(&self, f: &Framework, ctx: &TestContext) -> anyhow::Result<()> {
        info!(namespace = %f.namespace(), "Start local SSD test");
        let cluster = &ctx.cloud.cluster;
        anyhow::ensure!(!cluster.is_empty(), "cluster name is required for provider gke");

        Gcloud::from_context(ctx)
            .create_node_pool_with_local_ssds(&self.node_pool, cluster, 1)
            .await?;

        write_and_read_local_ssd(f).await
    }

    async fn after_each(&self, _f: &Framework, ctx: &TestContext) {
        let cluster = &ctx.cloud.cluster;
        if !self.delete_node_pool || cluster.is_empty() {
            return;
        }
        if let Err(e) = Gcloud::from_context(ctx).delete_node_pool(&self.node_pool, cluster).await {
            warn!(pool = %self.node_pool, error = %e, "failed to delete node pool");
        }
    }
}

async fn write_and_read_local_ssd(f: &Framework) -> anyhow::Result<()> {
    let pod = test_pod_with_ssd(WRITE_AND_READ_COMMAND);
    let msg = "";
    let expected = ExpectedOutput::lines(["hello world"]);

    f.test_container_output(msg, pod, 0, &expected).await?;
    Ok(())
}

/// Pod pinned to local-SSD nodes that runs `command` with the SSD mounted
pub fn test_pod_with_ssd(command: &str) -> Pod {
    let pod_name = format!("pod-{}", uuid::Uuid::new_v4());

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(IMAGE.to_string()),
        command: Some(vec!["/bin/sh".to_string()]),
        args: Some(vec!["-c".to_string(), command.to_string()]),
        volume_mounts: Some(vec![VolumeMount {
            name: VOLUME_NAME.to_string(),
            mount_path: SSD_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let volume = Volume {
        name: VOLUME_NAME.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: SSD_MOUNT_PATH.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };

    let node_selector = BTreeMap::from([(LOCAL_SSD_NODE_LABEL.to_string(), "true".to_string())]);

    Pod {
        metadata: ObjectMeta {
            name: Some(pod_name),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            restart_policy: Some("Never".to_string()),
            volumes: Some(vec![volume]),
            node_selector: Some(node_selector),
            ..Default::default()
        }),
        ..Default::default()
    }
}
