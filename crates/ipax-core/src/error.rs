#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{program} not found (install it or set {env_key})")]
    NotFound {
        program: String,
        env_key: &'static str,
    },

    #[error("failed to run {program}: {message}")]
    Io { program: String, message: String },

    #[error("{0}")]
    Invalid(String),
}

impl ToolError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ToolError::Invalid(message.into())
    }
}
