//! Client configuration.
//!
//! ```ignore
//! use docgate::config::Config;
//!
//! let config = Config::from_json_str(r#"{
//!     "hostport": "mongodb://10.0.0.5:27017",
//!     "username": "app",
//!     "password": "secret",
//!     "poolsize": 8,
//!     "timeout": 5,
//!     "enable_secondary_preferred": true
//! }"#)?;
//! # Ok::<(), docgate::error::DocGateError>(())
//! ```

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    driver::ConnectOptions,
    error::{DocGateError, DocGateResult},
};

/// Pool size used when the configured value is zero or negative.
pub const DEFAULT_POOL_SIZE: u32 = 3;

/// Request timeout used when the configured value is zero or negative.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an idle pooled connection is kept open.
pub const MAX_IDLE_TIME: Duration = Duration::from_secs(10 * 60);

/// Connection settings for a [`Client`](crate::client::Client).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection string of the document store.
    pub hostport: String,
    pub username: String,
    pub password: String,
    pub poolsize: i64,
    /// Request timeout in seconds.
    pub timeout: i64,
    #[serde(rename = "enable_secondary_preferred")]
    pub secondary_preferred: bool,
}

impl Config {
    pub fn new(hostport: impl Into<String>) -> Self {
        Self {
            hostport: hostport.into(),
            ..Default::default()
        }
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> DocGateResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> DocGateResult<()> {
        if self.hostport.trim().is_empty() {
            return Err(DocGateError::Initialization("hostport must not be empty".into()));
        }

        Ok(())
    }

    pub fn effective_timeout(&self) -> Duration {
        match u64::try_from(self.timeout) {
            Ok(seconds) if seconds > 0 => Duration::from_secs(seconds),
            _ => DEFAULT_TIMEOUT,
        }
    }

    pub fn effective_pool_size(&self) -> u32 {
        match u32::try_from(self.poolsize) {
            Ok(size) if size > 0 => size,
            _ => DEFAULT_POOL_SIZE,
        }
    }

    /// The driver-level pool ceiling: two connections above the effective pool size.
    pub fn max_pool_size(&self) -> u32 {
        self.effective_pool_size().saturating_add(2)
    }

    /// Translates the configuration into driver connection options.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            uri: self.hostport.clone(),
            credential: (!self.username.is_empty())
                .then(|| (self.username.clone(), self.password.clone())),
            max_pool_size: self.max_pool_size(),
            connect_timeout: self.effective_timeout(),
            max_idle_time: MAX_IDLE_TIME,
            secondary_preferred: self.secondary_preferred,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("hostport", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("poolsize", &self.poolsize)
            .field("timeout", &self.timeout)
            .field("secondary_preferred", &self.secondary_preferred)
            .finish()
    }
}
