//! Public, transport-agnostic RPC configuration.
//!
//! Contains no broker-specific settings; those belong to whoever builds the
//! [`Transport`](crate::Transport).

use std::time::Duration;

/// Deadline applied to a call when the caller does not supply one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default prefix of the private reply address.
pub const DEFAULT_REPLY_PREFIX: &str = "rpc.reply";

/// Default capacity of each subscription inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 16;

/// Client and server configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Identifier for this node, used in the reply address and in logs.
    pub node_id: String,

    /// Deadline for calls that do not specify their own timeout.
    ///
    /// Default: 3000 ms
    pub default_timeout: Duration,

    /// Prefix of the private reply address.
    ///
    /// The full address is `{reply_prefix}.{node_id}.{uuid}` so every client
    /// instance gets a fresh channel and never receives replies meant for a
    /// previous instance.
    pub reply_prefix: String,

    /// Capacity of subscription inboxes created by the memory transport.
    pub inbox_capacity: usize,
}

impl RpcConfig {
    /// Create a config with defaults for the given node.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            default_timeout: DEFAULT_TIMEOUT,
            reply_prefix: DEFAULT_REPLY_PREFIX.to_string(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }

    /// Set the default per-call deadline.
    ///
    /// A zero duration is ignored and the built-in default is kept.
    ///
    /// # Example
    ///
    /// ```
    /// use mom_rpc_callbacks::RpcConfig;
    /// use std::time::Duration;
    ///
    /// let config = RpcConfig::new("portal").with_default_timeout(Duration::from_secs(5));
    /// assert_eq!(config.default_timeout, Duration::from_secs(5));
    /// ```
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.default_timeout = timeout;
        }
        self
    }

    /// Set the reply address prefix.
    pub fn with_reply_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reply_prefix = prefix.into();
        self
    }

    /// Set the subscription inbox capacity (minimum 1).
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }

    /// Resolve a caller-supplied timeout against the configured default.
    pub(crate) fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        match requested {
            Some(t) if !t.is_zero() => t,
            _ => self.default_timeout,
        }
    }
}
