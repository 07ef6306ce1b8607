use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error("No active billing session")]
    NoActiveSession,

    #[error("Billing session already active: {session_id}")]
    AlreadyActive {
        session_id: String,
    },

    #[error("Session not found: {session_id}")]
    SessionNotFound {
        session_id: String,
    },

    #[error("No completed sessions in the ledger")]
    NoSessionsRecorded,

    #[error("Sampler is running; stop it before resetting usage")]
    SamplerRunning,

    #[error("Failed to deliver report to {destination}: {message}")]
    Transport {
        destination: String,
        message: String,
    },

    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
}

impl MeterError {
    /// Stable machine-readable name, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            MeterError::NoActiveSession => "no_active_session",
            MeterError::AlreadyActive { .. } => "already_active",
            MeterError::SessionNotFound { .. } => "session_not_found",
            MeterError::NoSessionsRecorded => "no_sessions_recorded",
            MeterError::SamplerRunning => "sampler_running",
            MeterError::Transport { .. } => "transport",
            MeterError::Config(_) => "config",
        }
    }
}

// Result type alias for convenience
pub type MeterResult<T> = Result<T, MeterError>;

/// Logs a failed core operation with its name and passes the error through.
#[macro_export]
macro_rules! with_context {
    ($result:expr, $operation:expr) => {
        $result.map_err(|e| {
            $crate::errors::log_failure($operation, &e);
            e
        })
    };
}

pub fn log_failure(operation: &str, err: &MeterError) {
    error!(
        error = %err,
        kind = err.kind(),
        operation,
        "Operation failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_context_passes_the_error_through() {
        let result: MeterResult<()> = Err(MeterError::NoActiveSession);
        let err = crate::with_context!(result, "session_status").unwrap_err();
        assert_eq!(err.kind(), "no_active_session");

        let ok: MeterResult<u8> = Ok(7);
        assert_eq!(crate::with_context!(ok, "build_invoice").unwrap(), 7);
    }
}
