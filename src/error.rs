use thiserror::Error;

/// Errors that terminate an analysis or a controller operation.
///
/// Soft outcomes (no dark region, fewer than four fiducials, degenerate
/// cells, ambiguous marks) are not represented here; they degrade the
/// result instead of failing it.
#[derive(Debug, Error)]
pub enum OmrError {
    #[error("capture device unavailable: {message}")]
    Acquisition { message: String },
    #[error("imaging engine failed to load: {message}")]
    EngineLoad { message: String },
    #[error("imaging engine did not become ready within {timeout_ms} ms")]
    EngineTimeout { timeout_ms: u64 },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("image error while {context}: {source}")]
    Image {
        context: &'static str,
        #[source]
        source: image::ImageError,
    },
    #[error("JSON error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl OmrError {
    pub fn acquisition(message: impl Into<String>) -> Self {
        Self::Acquisition {
            message: message.into(),
        }
    }

    pub fn engine_load(message: impl Into<String>) -> Self {
        Self::EngineLoad {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn transition(action: &'static str, state: &'static str) -> Self {
        Self::InvalidTransition { action, state }
    }

    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn image(context: &'static str, source: image::ImageError) -> Self {
        Self::Image { context, source }
    }

    pub fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    /// Whether the error ends the whole analysis session rather than one call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Acquisition { .. } | Self::EngineLoad { .. } | Self::EngineTimeout { .. }
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, OmrError>;
