//! Spec registration and the sequential runner.

use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use kube::Client;
use tracing::{error, info, warn};

use crate::context::{Skipped, TestContext};
use crate::framework::Framework;

/// One end-to-end test case
#[async_trait]
pub trait E2eSpec: Send + Sync {
    /// Full name, describe text followed by the case text
    fn name(&self) -> String;

    /// Base name for the spec's test namespace
    fn base_name(&self) -> &str;

    /// Precondition checked before touching the cluster
    fn before_each(&self, _ctx: &TestContext) -> Result<(), Skipped> {
        Ok(())
    }

    async fn run(&self, f: &Framework, ctx: &TestContext) -> anyhow::Result<()>;

    /// Cleanup after `run`, called whatever its outcome, including timeout
    async fn after_each(&self, _f: &Framework, _ctx: &TestContext) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum SpecOutcome {
    Passed,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: SpecOutcome,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

impl SpecResult {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, SpecOutcome::Failed(_))
    }
}

fn serialize_duration<S>(dur: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    // whole milliseconds keep the output readable
    let rounded = Duration::from_millis(dur.as_millis() as u64);
    s.serialize_str(&humantime::format_duration(rounded).to_string())
}

/// Runs specs one after another
pub struct Runner {
    ctx: TestContext,
    focus: Option<String>,
    skip: Option<String>,
    client: Option<Client>,
}

impl Runner {
    pub fn new(ctx: TestContext) -> Self {
        Self {
            ctx,
            focus: None,
            skip: None,
            client: None,
        }
    }

    /// Use `client` instead of one built from the kubeconfig
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Only run specs whose name contains `focus`
    pub fn focus(mut self, focus: Option<String>) -> Self {
        self.focus = focus;
        self
    }

    /// Leave out specs whose name contains `skip`
    pub fn skip(mut self, skip: Option<String>) -> Self {
        self.skip = skip;
        self
    }

    pub fn context(&self) -> &TestContext {
        &self.ctx
    }

    pub fn selects(&self, name: &str) -> bool {
        let focused = self.focus.as_deref().is_none_or(|f| name.contains(f));
        let skipped = self.skip.as_deref().is_some_and(|s| name.contains(s));
        focused && !skipped
    }

    pub async fn run(&self, specs: &[Box<dyn E2eSpec>]) -> Vec<SpecResult> {
        let mut results = Vec::new();
        for spec in specs {
            let name = spec.name();
            if !self.selects(&name) {
                continue;
            }

            let start = Instant::now();
            let outcome = self.run_one(spec.as_ref(), &name).await;
            match &outcome {
                SpecOutcome::Passed => info!(spec = %name, "spec passed"),
                SpecOutcome::Failed(msg) => error!(spec = %name, error = %msg, "spec failed"),
                SpecOutcome::Skipped(reason) => info!(spec = %name, reason = %reason, "spec skipped"),
            }
            results.push(SpecResult {
                name,
                outcome,
                elapsed: start.elapsed(),
            });
        }
        results
    }

    async fn run_one(&self, spec: &dyn E2eSpec, name: &str) -> SpecOutcome {
        if let Err(skipped) = spec.before_each(&self.ctx) {
            return SpecOutcome::Skipped(skipped.0);
        }

        info!(spec = %name, "running spec");
        let setup = match &self.client {
            Some(client) => Framework::setup_with_client(client.clone(), &self.ctx, spec.base_name()).await,
            None => Framework::setup(&self.ctx, spec.base_name()).await,
        };
        let framework = match setup {
            Ok(f) => f,
            Err(e) => return SpecOutcome::Failed(format!("framework setup failed: {}", e)),
        };

        let outcome = match tokio::time::timeout(self.ctx.spec_timeout, spec.run(&framework, &self.ctx)).await {
            Ok(Ok(())) => SpecOutcome::Passed,
            Ok(Err(e)) => SpecOutcome::Failed(format!("{:#}", e)),
            Err(_) => {
                warn!(spec = %name, timeout = ?self.ctx.spec_timeout, "spec timed out");
                SpecOutcome::Failed(format!(
                    "timed out after {}",
                    humantime::format_duration(self.ctx.spec_timeout)
                ))
            }
        };

        spec.after_each(&framework, &self.ctx).await;
        framework.teardown().await;
        outcome
    }
}
