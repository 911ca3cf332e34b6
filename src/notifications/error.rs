//! Error types for the notification system

/// Delivery problems reported by the notification manager
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotificationError {
    /// Some subscribers dropped their receiver; they have been unsubscribed
    #[error(
        "{event_type} event not delivered to {} closed subscriber(s): {}",
        .failed_subscribers.len(),
        .failed_subscribers.join(", ")
    )]
    PublishFailed {
        event_type: String,
        failed_subscribers: Vec<String>,
    },
}

impl crate::core::error_handling::ContextualError for NotificationError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}
