//! Harness for Kubernetes end-to-end specs.
//!
//! A spec implements [`E2eSpec`]; the [`Runner`] checks its provider
//! precondition, gives it a [`Framework`] (kube client plus a throwaway
//! namespace) and records a [`SpecResult`].
//!
//! ```no_run
//! use e2e_framework::{ExpectedOutput, Framework, TestContext};
//! use k8s_openapi::api::core::v1::Pod;
//!
//! # async fn demo(ctx: &TestContext, pod: Pod) -> anyhow::Result<()> {
//! let f = Framework::setup(ctx, "demo").await?;
//! f.test_container_output("", pod, 0, &ExpectedOutput::lines(["hello"])).await?;
//! f.teardown().await;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod framework;
pub mod names;
pub mod output;
pub mod spec;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::{CloudConfig, Skipped, TestContext};
pub use error::FrameworkError;
pub use framework::Framework;
pub use output::ExpectedOutput;
pub use spec::{E2eSpec, Runner, SpecOutcome, SpecResult};
