//! Session configuration.
//!
//! Everything a session needs is passed in here at construction; nothing
//! is read from process-wide state.

use std::time::Duration;

use parlor_channel::ChannelConfig;
use serde::{Deserialize, Serialize};

/// Facts about this client that the server is told at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    /// Ask the server to leave the full user list out of the lobby
    /// snapshot.
    pub constrained: bool,

    /// Sent as the `version` attribute of `connect`.
    pub client_version: String,
}

impl Default for ClientContext {
    fn default() -> Self {
        Self {
            constrained: false,
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Settings for one [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub channel: ChannelConfig,
    pub client: ClientContext,

    /// How long `login` waits for the lobby snapshot.
    pub login_timeout: Duration,

    /// How long `create_table` and `join_table` wait for the server's
    /// acknowledgement.
    pub reply_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            client: ClientContext::default(),
            login_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: ClientContext) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_constrained(mut self, constrained: bool) -> Self {
        self.client.constrained = constrained;
        self
    }

    #[must_use]
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }
}
