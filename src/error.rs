use thiserror::Error;

/// Structured error context for cache and configuration failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Cache key or configuration field involved (e.g. "scout:get_user:ab12..", "cache.redis.port")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g. the backend's own message)
    pub details: Option<String>,
    /// Component that raised the error (e.g. "redis_backend", "config")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the scout runtime.
///
/// Cache-layer variants (`CacheUnavailable`, `Serialization` raised while storing)
/// never leave [`crate::cache::CacheManager`]; they exist so backends can report
/// failures that the manager then logs and absorbs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Capability not found: '{name}'")]
    CapabilityNotFound { name: String },

    #[error("Cache unavailable: {message}{}", format_context(.context))]
    CacheUnavailable {
        message: String,
        context: ErrorContext,
    },

    #[error("Upstream invocation of '{capability}' failed: {message}")]
    UpstreamInvocationFailed { capability: String, message: String },

    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("A scrape is already in progress on this orchestrator")]
    ScrapeInProgress,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn capability_not_found(name: impl Into<String>) -> Self {
        Error::CapabilityNotFound { name: name.into() }
    }

    /// Wrap a failure raised by an external client operation.
    pub fn upstream(capability: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::UpstreamInvocationFailed {
            capability: capability.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_argument(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::InvalidArgument {
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Error::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create a cache-unavailable error with structured context
    pub fn cache_unavailable_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::CacheUnavailable {
            message: msg.into(),
            context,
        }
    }

    /// Create a configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::CacheUnavailable { context, .. } | Error::Configuration { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// True for faults the cache layer is expected to swallow.
    pub fn is_cache_fault(&self) -> bool {
        matches!(self, Error::CacheUnavailable { .. } | Error::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_rendered_in_display() {
        let err = Error::cache_unavailable_with_context(
            "connection refused",
            ErrorContext::new()
                .with_field_path("scout:k")
                .with_source("redis_backend"),
        );
        let text = err.to_string();
        assert!(text.contains("connection refused"));
        assert!(text.contains("field: scout:k"));
        assert!(text.contains("source: redis_backend"));
        assert!(err.is_cache_fault());
    }

    #[test]
    fn test_capability_not_found_names_operation() {
        let err = Error::capability_not_found("missing_op");
        assert_eq!(err.to_string(), "Capability not found: 'missing_op'");
        assert!(err.context().is_none());
    }
}
