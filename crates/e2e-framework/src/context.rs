//! Run-wide settings shared by every spec.

use std::fmt;
use std::time::Duration;

/// Cloud coordinates of the cluster under test
#[derive(Debug, Clone, Default)]
pub struct CloudConfig {
    /// project id (falls back to the CLI's configured default)
    pub project: Option<String>,
    /// compute zone (falls back to the CLI's configured default)
    pub zone: Option<String>,
    /// cluster name
    pub cluster: String,
}

#[derive(Debug, Clone)]
pub struct TestContext {
    /// active cloud provider, e.g. "gke" or "local"
    pub provider: String,
    pub cloud: CloudConfig,
    /// kubeconfig context, defaults to current
    pub kube_context: Option<String>,
    /// delete the test namespace after each spec
    pub delete_namespace: bool,
    /// how long a test pod may take to run to completion
    pub pod_start_timeout: Duration,
    /// upper bound for a whole spec body
    pub spec_timeout: Duration,
    /// path to the gcloud binary
    pub gcloud_bin: String,
}

impl Default for TestContext {
    fn default() -> Self {
        Self {
            provider: String::new(),
            cloud: CloudConfig::default(),
            kube_context: None,
            delete_namespace: true,
            pod_start_timeout: Duration::from_secs(5 * 60),
            spec_timeout: Duration::from_secs(30 * 60),
            gcloud_bin: "gcloud".to_string(),
        }
    }
}

impl TestContext {
    /// Skip the current spec unless the active provider is one of `providers`
    pub fn skip_unless_provider_is(&self, providers: &[&str]) -> Result<(), Skipped> {
        if providers.iter().any(|p| *p == self.provider) {
            return Ok(());
        }
        Err(Skipped(format!(
            "Only supported for providers [{}] (not {})",
            providers.join(" "),
            self.provider
        )))
    }
}

/// Reason a spec did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped(pub String);

impl fmt::Display for Skipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(provider: &str) -> TestContext {
        TestContext {
            provider: provider.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_supported_provider_runs() {
        assert!(ctx("gke").skip_unless_provider_is(&["gke"]).is_ok());
        assert!(ctx("gce").skip_unless_provider_is(&["gce", "gke"]).is_ok());
    }

    #[test]
    fn test_other_provider_skips() {
        let err = ctx("local").skip_unless_provider_is(&["gke"]).unwrap_err();
        assert_eq!(err.to_string(), "Only supported for providers [gke] (not local)");
    }

    #[test]
    fn test_empty_provider_skips() {
        assert!(ctx("").skip_unless_provider_is(&["gke"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let ctx = TestContext::default();
        assert!(ctx.delete_namespace);
        assert_eq!(ctx.pod_start_timeout, Duration::from_secs(300));
        assert_eq!(ctx.gcloud_bin, "gcloud");
    }
}
