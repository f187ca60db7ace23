use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// The backend answered with a non-2xx status.
    Http {
        /// HTTP status code returned by the backend.
        status: u16,
        /// Response body text, kept verbatim for display.
        body: String,
    },
    /// The request never produced a response (connection, timeout, TLS).
    Network(String),
    /// A payload could not be decoded into the expected shape.
    Decode(String),
    /// Caller supplied something unusable (unknown field, bad key, missing image).
    InvalidInput(String),
    /// Local persistence failed.
    Storage(String),
    /// Screenshot rasterization or encoding failed.
    Capture(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Http { status, body } => write!(f, "API error: {} - {}", status, body),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Decode(msg) => write!(f, "Decode error: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Capture(msg) => write!(f, "Capture error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    /// Status code of the innermost HTTP error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Http { status, .. } => Some(*status),
            AppError::WithContext { source, .. } => source.status(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::Decode(err.to_string())
        } else {
            AppError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Capture(err.to_string())
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::Decode(format!("invalid base64 payload: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_status_and_body() {
        let err = AppError::Http {
            status: 502,
            body: "upstream down".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 502 - upstream down");
    }

    #[test]
    fn context_wraps_and_keeps_status() {
        let result: Result<(), AppError> = Err(AppError::Http {
            status: 404,
            body: "missing".to_string(),
        });
        let err = result.context("Fetching matches").unwrap_err();

        assert_eq!(err.to_string(), "Fetching matches: API error: 404 - missing");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn io_errors_become_storage_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let result: Result<(), std::io::Error> = Err(io);
        let err = result.with_context(|| "Writing key".to_string()).unwrap_err();

        match err {
            AppError::WithContext { source, context } => {
                assert_eq!(context, "Writing key");
                assert!(matches!(*source, AppError::Storage(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
