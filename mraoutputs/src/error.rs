use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("{output}: renderer unreachable: {message}")]
    Unreachable { output: String, message: String },
    #[error("{output}: action {action} failed: {message}")]
    ActionFailed {
        output: String,
        action: String,
        message: String,
    },
    #[error("{output}: action {action} timed out after {timeout_ms} ms")]
    Timeout {
        output: String,
        action: String,
        timeout_ms: u64,
    },
    #[error("{output}: stream not ready")]
    StreamNotReady { output: String },
    #[error("{output}: reconnect suppressed ({reason})")]
    ReconnectSuppressed { output: String, reason: String },
    #[error("soap fault {code}: {description}")]
    Soap { code: String, description: String },
    #[error("engine: {0}")]
    Engine(String),
}

impl OutputError {
    pub fn action_failed(output: &str, action: &str, message: impl Into<String>) -> Self {
        OutputError::ActionFailed {
            output: output.to_string(),
            action: action.to_string(),
            message: message.into(),
        }
    }
}

impl From<mraengine::EngineError> for OutputError {
    fn from(e: mraengine::EngineError) -> Self {
        OutputError::Engine(e.to_string())
    }
}
