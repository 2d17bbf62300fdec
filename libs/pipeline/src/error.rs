#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("dead-letter file ({path}): {source}")]
    DeadLetter { path: String, source: std::io::Error },
}
