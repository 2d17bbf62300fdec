#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0} is not configured")]
    Missing(&'static str),

    #[error("{0}")]
    Plugin(#[from] bridge_api::PluginError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),

    #[error("bridge task: {0}")]
    Task(#[from] tokio::task::JoinError),
}
