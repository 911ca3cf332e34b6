//! Generic error handling utilities
//!
//! Provides unified error reporting across the error types of the crate
//! while keeping the domain-specific detail available at debug level.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)` with an actionable message; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the operator can act on
    /// directly, such as an invalid configuration value
    fn is_user_actionable(&self) -> bool;

    /// Returns the specific user message if this is a user-actionable error
    fn user_message(&self) -> Option<&str>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// User-actionable errors show their own message; system errors show the
/// operation context. Full detail is always logged at debug level.
///
/// # Examples
/// ```rust,no_run
/// # use msgflow::core::error_handling::log_error_with_context;
/// # use msgflow::pipeline::api::PipelineError;
/// let err = PipelineError::InvalidConfig { message: "timeout_ms must be greater than 0".into() };
/// log_error_with_context(&err, "Loading pipeline configuration");
/// // Logs: "FATAL: timeout_ms must be greater than 0"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message().filter(|_| error.is_user_actionable()) {
        Some(user_msg) => log::error!("FATAL: {}", user_msg),
        None => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
