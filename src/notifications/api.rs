//! Public API for the notification system
//!
//! External modules should import from here rather than directly from
//! internal modules. Each pipeline owns its own [`Notifier`]; there is no
//! process-wide notification service.

// Core event types and enums
pub use crate::notifications::event::{
    BatchEvent, BatchEventType, Event, EventFilter, LifecycleEvent, LifecycleEventType, TaskEvent,
    TaskEventType,
};

// Manager and utilities
pub use crate::notifications::error::NotificationError;
pub use crate::notifications::manager::{AsyncNotificationManager, EventReceiver, Notifier};
