use std::process::ExitCode;

/// Errors that cause chainwatch to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error(
        "no API credential found: set CHAINWATCH_API_KEY, add [api].key to .chainwatch.toml, or to the global config"
    )]
    MissingCredential,

    #[error(
        "chain depth limit ({max}) reached; continue manually from workspace {workspace} (branch: {branch})"
    )]
    ChainExhausted {
        max: u32,
        workspace: String,
        branch: String,
    },

    #[error("spawning replacement worker failed: {0}")]
    SpawnFailed(String),

    #[error("{0}")]
    Other(String),
}

impl ExitError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ExitError::Config(_) => ExitCode::from(2),
            ExitError::MissingCredential
            | ExitError::ChainExhausted { .. }
            | ExitError::SpawnFailed(_)
            | ExitError::Other(_) => ExitCode::FAILURE,
        }
    }
}
