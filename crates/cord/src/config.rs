//! Client configuration.

use std::time::Duration;

use cord_gateway::{GatewayConfig, GatewayVersion, ReconnectConfig};
use cord_proto::Intents;
use cord_rest::RetryConfig;

/// How many shards to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardScheme {
    /// Use the count recommended by `GET /gateway/bot`.
    #[default]
    Auto,
    /// A fixed shard count.
    Fixed(u64),
}

impl ShardScheme {
    /// Resolve against the server's recommendation.
    #[must_use]
    pub fn resolve(self, recommended: u64) -> u64 {
        match self {
            Self::Auto => recommended.max(1),
            Self::Fixed(count) => count.max(1),
        }
    }
}

/// Everything a [`crate::Client`] needs to run. Only the token is
/// required.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token.
    pub token: String,
    /// Event categories to subscribe to.
    pub intents: Intents,
    /// Shard count policy.
    pub shards: ShardScheme,
    /// Member count above which guilds are sent as large.
    pub large_threshold: Option<u32>,
    /// Gateway protocol version (v10 default, v6 legacy).
    pub gateway_version: GatewayVersion,
    /// Reconnect backoff policy.
    pub reconnect: ReconnectConfig,
    /// REST retry policy.
    pub rest_retry: RetryConfig,
    /// REST base override, for tests.
    pub rest_base_url: Option<String>,
    /// Gateway URL override, for tests.
    pub gateway_url: Option<String>,
    /// Identify spacing override, for tests.
    pub identify_spacing: Duration,
}

impl Config {
    /// Defaults for the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: Intents::non_privileged(),
            shards: ShardScheme::Auto,
            large_threshold: None,
            gateway_version: GatewayVersion::default(),
            reconnect: ReconnectConfig::default(),
            rest_retry: RetryConfig::default(),
            rest_base_url: None,
            gateway_url: None,
            identify_spacing: Duration::from_secs(5),
        }
    }

    /// Override the intents bitmask.
    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    /// Fix the shard count instead of asking the server.
    #[must_use]
    pub const fn with_shards(mut self, count: u64) -> Self {
        self.shards = ShardScheme::Fixed(count);
        self
    }

    /// Override the large-guild threshold.
    #[must_use]
    pub const fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = Some(threshold);
        self
    }

    /// Select the legacy v6 gateway and REST version.
    #[must_use]
    pub const fn with_gateway_version(mut self, version: GatewayVersion) -> Self {
        self.gateway_version = version;
        self
    }

    pub(crate) fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::new(self.token.clone())
            .with_intents(self.intents)
            .with_version(self.gateway_version)
            .with_reconnect(self.reconnect.clone())
            .with_identify_spacing(self.identify_spacing);
        if let Some(threshold) = self.large_threshold {
            config = config.with_large_threshold(threshold);
        }
        config
    }
}
