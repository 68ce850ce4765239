//! User-facing notifications.
//!
//! The core never formats or displays messages itself. It hands them to a
//! [`Notifier`] supplied by the embedding application.

/// Sink for user-facing success and error messages.
pub trait Notifier: Send + Sync {
	fn success(&self, message: &str);
	fn error(&self, message: &str);
}

/// Notifier that writes messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
	fn success(&self, message: &str) {
		tracing::info!(target: "orderdesk::notify", "{}", message);
	}

	fn error(&self, message: &str) {
		tracing::error!(target: "orderdesk::notify", "{}", message);
	}
}
