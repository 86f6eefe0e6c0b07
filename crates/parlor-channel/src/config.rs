//! Channel configuration.

use std::time::Duration;

/// Settings for one connection channel and the table channels on it.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How often the read loop writes a `keep-alive` element. `None`
    /// disables it.
    pub keepalive_interval: Option<Duration>,

    /// Close the connection when its last table channel closes.
    pub close_on_last_table: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Some(Duration::from_secs(30)),
            close_on_last_table: true,
        }
    }
}

impl ChannelConfig {
    #[must_use]
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn without_keepalive(mut self) -> Self {
        self.keepalive_interval = None;
        self
    }

    #[must_use]
    pub fn with_close_on_last_table(mut self, close: bool) -> Self {
        self.close_on_last_table = close;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_default() {
        let config = ChannelConfig::default();
        assert_eq!(config.keepalive_interval, Some(Duration::from_secs(30)));
        assert!(config.close_on_last_table);
    }

    #[test]
    fn test_channel_config_builders() {
        let config = ChannelConfig::default()
            .without_keepalive()
            .with_close_on_last_table(false);
        assert_eq!(config.keepalive_interval, None);
        assert!(!config.close_on_last_table);
        let config = config.with_keepalive(Duration::from_millis(5));
        assert_eq!(config.keepalive_interval, Some(Duration::from_millis(5)));
    }
}
