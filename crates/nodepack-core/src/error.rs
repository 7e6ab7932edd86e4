use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Io,
    Upstream,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::Io => "io",
            Self::Upstream => "upstream",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a lifecycle operation. Reaching the desired state early is
/// reported as a skipped outcome, never as an error.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{context}: {cause:#}")]
    Io {
        context: String,
        cause: anyhow::Error,
    },
    #[error("{context}: {cause:#}")]
    Upstream {
        context: String,
        cause: anyhow::Error,
    },
}

impl PackError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn io(context: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Io {
            context: context.into(),
            cause: cause.into(),
        }
    }

    pub fn upstream(context: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Upstream {
            context: context.into(),
            cause: cause.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Io { .. } => ErrorKind::Io,
            Self::Upstream { .. } => ErrorKind::Upstream,
        }
    }
}
