//! Request configuration.

use keyverify_core::ValidityWindow;

/// Default number of buffered change notifications per subscriber.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 16;

/// Per-request configuration.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Window inside which timestamped messages are accepted.
    pub window: ValidityWindow,
    /// Buffered change notifications per subscriber before it lags.
    pub notification_capacity: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            window: ValidityWindow::default(),
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl RequestConfig {
    /// Set a custom validity window.
    pub fn with_window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }

    /// Set the notification buffer size. Zero is bumped to one.
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn default_config() {
        let config = RequestConfig::default();
        assert_eq!(config.window.timeout, Duration::minutes(10));
        assert_eq!(config.window.margin, Duration::seconds(3));
        assert_eq!(config.notification_capacity, DEFAULT_NOTIFICATION_CAPACITY);
    }

    #[test]
    fn custom_config() {
        let window = ValidityWindow {
            timeout: Duration::minutes(2),
            margin: Duration::seconds(1),
        };
        let config = RequestConfig::default()
            .with_window(window)
            .with_notification_capacity(0);

        assert_eq!(config.window.timeout, Duration::minutes(2));
        assert_eq!(config.notification_capacity, 1);
    }
}
