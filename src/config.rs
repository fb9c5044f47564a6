//! Sender and receiver settings

use std::time::Duration;

/// Default port the receiver binds to
pub const DEFAULT_PORT: u16 = 8080;

/// Connection attempts the sender makes before giving up
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Per-attempt connect timeout, also used as the pause between attempts
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// What the receiver does when the next four bytes are not the signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignaturePolicy {
    /// Close the connection with a protocol error
    #[default]
    Reject,
    /// Skip ahead to the next complete signature in the buffered bytes
    Resync,
}

/// Configuration for the sending side
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Pause between failed attempts
    pub retry_interval: Duration,
    /// Total attempts, including the first one
    pub connect_attempts: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_interval: DEFAULT_CONNECT_TIMEOUT,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        }
    }
}

impl SenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Zero is treated as a single attempt
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }
}

/// Configuration for the receiving side
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub signature_policy: SignaturePolicy,
    /// Largest declared payload length accepted before the connection is dropped
    pub max_payload_len: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            signature_policy: SignaturePolicy::Reject,
            max_payload_len: u32::MAX,
        }
    }
}

impl ReceiverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signature_policy(mut self, policy: SignaturePolicy) -> Self {
        self.signature_policy = policy;
        self
    }

    pub fn with_max_payload_len(mut self, max: u32) -> Self {
        self.max_payload_len = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_defaults_retry_three_times_every_two_seconds() {
        let config = SenderConfig::default();
        assert_eq!(config.connect_attempts, 3);
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.retry_interval, config.connect_timeout);
    }

    #[test]
    fn zero_attempts_still_dials_once() {
        let config = SenderConfig::new().with_connect_attempts(0);
        assert_eq!(config.connect_attempts, 1);
    }

    #[test]
    fn receiver_rejects_bad_signatures_by_default() {
        let config = ReceiverConfig::default();
        assert_eq!(config.signature_policy, SignaturePolicy::Reject);
        assert_eq!(config.max_payload_len, u32::MAX);
    }
}
