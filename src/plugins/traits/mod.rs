pub mod notifier;

pub use notifier::{NotificationPayload, NotificationTransport};

#[cfg(test)]
pub use notifier::MockNotificationTransport;
