use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("malformed change event on line {line}: {source}")]
    ChangeDecode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn change_decode(line: usize, source: serde_json::Error) -> Self {
        Self::ChangeDecode { line, source }
    }
}
