use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameworkError {
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),
    #[error("config error: {0}")]
    Config(#[from] kube::config::KubeconfigError),
    #[error("infer config error: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),
    #[error("watch error: {0}")]
    Wait(#[from] kube::runtime::wait::Error),
    #[error("{0} timed out after {1:?}")]
    Timeout(String, Duration),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("pod '{pod}' has no container at index {index}")]
    NoContainer { pod: String, index: usize },
    #[error("pod '{0}' disappeared before completing")]
    PodGone(String),
    #[error("pod '{pod}' failed:\n{logs}")]
    PodFailed { pod: String, logs: String },
    #[error("{msg}: unexpected output of container '{container}' in pod '{pod}'\nexpected: {expected:?}\nactual:\n{actual}")]
    OutputMismatch {
        msg: String,
        pod: String,
        container: String,
        expected: Vec<String>,
        actual: String,
    },
}
