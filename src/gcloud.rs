//! Node pool provisioning through the gcloud CLI

use shell_escape::escape;
use std::borrow::Cow;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use e2e_framework::TestContext;

#[derive(Error, Debug)]
#[error("Failed to {action} node pool {pool}: Err: {err}\n{output}")]
pub struct GcloudError {
    pub action: &'static str,
    pub pool: String,
    pub err: String,
    pub output: String,
}

pub struct Gcloud {
    bin: String,
    project: Option<String>,
    zone: Option<String>,
}

impl Gcloud {
    pub fn from_context(ctx: &TestContext) -> Self {
        Self {
            bin: ctx.gcloud_bin.clone(),
            project: ctx.cloud.project.clone(),
            zone: ctx.cloud.zone.clone(),
        }
    }

    pub fn node_pool_create_args(&self, pool: &str, cluster: &str, local_ssd_count: u32) -> Vec<String> {
        let mut args = self.node_pool_args("create", pool, cluster);
        args.push(format!("--local-ssd-count={}", local_ssd_count));
        args
    }

    pub fn node_pool_delete_args(&self, pool: &str, cluster: &str) -> Vec<String> {
        let mut args = self.node_pool_args("delete", pool, cluster);
        args.push("--quiet".to_string());
        args
    }

    fn node_pool_args(&self, verb: &str, pool: &str, cluster: &str) -> Vec<String> {
        let mut args: Vec<String> = ["alpha", "container", "node-pools", verb, pool]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(format!("--cluster={}", cluster));
        if let Some(ref project) = self.project {
            args.push(format!("--project={}", project));
        }
        if let Some(ref zone) = self.zone {
            args.push(format!("--zone={}", zone));
        }
        args
    }

    /// Create a node pool with `local_ssd_count` local SSDs, returning gcloud's output
    pub async fn create_node_pool_with_local_ssds(
        &self,
        pool: &str,
        cluster: &str,
        local_ssd_count: u32,
    ) -> Result<String, GcloudError> {
        info!("Create node pool: {} with local SSDs in cluster: {}", pool, cluster);
        let args = self.node_pool_create_args(pool, cluster, local_ssd_count);
        let output = self.run("create", pool, &args).await?;
        info!("Successfully created node pool {}:\n{}", pool, output);
        Ok(output)
    }

    pub async fn delete_node_pool(&self, pool: &str, cluster: &str) -> Result<String, GcloudError> {
        info!(pool = %pool, cluster = %cluster, "deleting node pool");
        let args = self.node_pool_delete_args(pool, cluster);
        self.run("delete", pool, &args).await
    }

    /// Run gcloud to completion; stdout followed by stderr is the captured output
    async fn run(&self, action: &'static str, pool: &str, args: &[String]) -> Result<String, GcloudError> {
        info!(command = %self.command_line(args), "running gcloud");

        let fail = |err: String, output: String| GcloudError {
            action,
            pool: pool.to_string(),
            err,
            output,
        };

        // a cancelled spec must not leave gcloud provisioning in the background
        let out = Command::new(&self.bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| fail(e.to_string(), String::new()))?;

        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&out.stderr));

        if !out.status.success() {
            return Err(fail(out.status.to_string(), combined));
        }
        Ok(combined)
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(&self.bin)
            .chain(args)
            .map(|a| escape(Cow::Borrowed(a.as_str())).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use e2e_framework::CloudConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn gcloud(bin: &str, project: Option<&str>, zone: Option<&str>) -> Gcloud {
        Gcloud::from_context(&TestContext {
            provider: "gke".to_string(),
            cloud: CloudConfig {
                project: project.map(str::to_string),
                zone: zone.map(str::to_string),
                cluster: "e2e-cluster".to_string(),
            },
            gcloud_bin: bin.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_create_args() {
        let args = gcloud("gcloud", None, None).node_pool_create_args("np-ssd", "e2e-cluster", 1);
        assert_eq!(
            args,
            vec![
                "alpha",
                "container",
                "node-pools",
                "create",
                "np-ssd",
                "--cluster=e2e-cluster",
                "--local-ssd-count=1",
            ]
        );
    }

    #[test]
    fn test_create_args_with_project_and_zone() {
        let args = gcloud("gcloud", Some("my-proj"), Some("us-central1-b"))
            .node_pool_create_args("np-ssd", "e2e-cluster", 1);
        assert!(args.contains(&"--project=my-proj".to_string()));
        assert!(args.contains(&"--zone=us-central1-b".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--local-ssd-count=1"));
    }

    #[test]
    fn test_delete_args() {
        let args = gcloud("gcloud", None, None).node_pool_delete_args("np-ssd", "e2e-cluster");
        assert_eq!(&args[..5], ["alpha", "container", "node-pools", "delete", "np-ssd"]);
        assert_eq!(args.last().map(String::as_str), Some("--quiet"));
    }

    #[test]
    fn test_command_line_is_shell_escaped() {
        let g = gcloud("gcloud", None, None);
        let line = g.command_line(&["--cluster=my cluster".to_string()]);
        assert_eq!(line, "gcloud '--cluster=my cluster'");
    }

    #[tokio::test]
    async fn test_create_captures_output() {
        // echo stands in for gcloud and prints the arguments it was given
        let out = gcloud("echo", None, None)
            .create_node_pool_with_local_ssds("np-ssd", "e2e-cluster", 1)
            .await
            .unwrap();
        assert_eq!(
            out.trim(),
            "alpha container node-pools create np-ssd --cluster=e2e-cluster --local-ssd-count=1"
        );
    }

    #[tokio::test]
    async fn test_create_failure_names_pool() {
        let err = gcloud("false", None, None)
            .create_node_pool_with_local_ssds("np-ssd", "e2e-cluster", 1)
            .await
            .unwrap_err();
        assert_eq!(err.pool, "np-ssd");
        assert!(err.to_string().starts_with("Failed to create node pool np-ssd: Err: exit status: 1"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let err = gcloud("/nonexistent/gcloud", None, None)
            .create_node_pool_with_local_ssds("np-ssd", "e2e-cluster", 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("np-ssd"));
        assert!(err.output.is_empty());
    }

    #[test]
    fn test_error_message_includes_output() {
        let err = GcloudError {
            action: "create",
            pool: "np-ssd".to_string(),
            err: "exit status: 1".to_string(),
            output: "ERROR: (gcloud.alpha.container.node-pools.create) quota exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create node pool np-ssd: Err: exit status: 1\nERROR: (gcloud.alpha.container.node-pools.create) quota exceeded"
        );
    }

    #[tokio::test]
    async fn test_cancelled_create_kills_gcloud() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("created");
        let bin = fake::script(dir.path(), &format!("sleep 2\ntouch '{}'", marker.display()));

        let g = gcloud(&bin, None, None);
        let create = g.create_node_pool_with_local_ssds("np-ssd", "e2e-cluster", 1);
        assert!(tokio::time::timeout(Duration::from_millis(300), create).await.is_err());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists(), "gcloud kept running after the create was cancelled");
    }

    #[tokio::test]
    async fn test_failure_output_is_captured() {
        let dir = TempDir::new().unwrap();
        let bin = fake::script(
            dir.path(),
            "echo 'Creating node pool np-ssd...'\necho 'ERROR: quota exceeded' >&2\nexit 1",
        );

        let err = gcloud(&bin, None, None)
            .create_node_pool_with_local_ssds("np-ssd", "e2e-cluster", 1)
            .await
            .unwrap_err();
        assert_eq!(err.output, "Creating node pool np-ssd...\nERROR: quota exceeded\n");
        assert!(err.to_string().contains("Failed to create node pool np-ssd"));
    }
}
