//! Server configuration.

use std::time::Duration;

use parley_core::{CoreError, EntitlementTable, Entitlements, UserType};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_addr: String,

    /// Largest page the history endpoint will return.
    pub max_page_size: usize,

    /// How long closed stream sessions are remembered (seconds).
    pub stream_retention_secs: u64,

    /// How recent a finished assistant message must be to be replayed on resume (seconds).
    pub resume_window_secs: u64,

    /// Parts buffered per stream before slow consumers start lagging.
    pub stream_buffer: usize,

    /// Delay between parts emitted by the built-in producer (milliseconds).
    pub producer_chunk_delay_ms: u64,

    /// Daily message quota for guests.
    pub guest_messages_per_day: u32,

    /// Daily message quota for registered users.
    pub regular_messages_per_day: u32,
}

impl Config {
    pub fn stream_retention(&self) -> Duration {
        Duration::from_secs(self.stream_retention_secs)
    }

    pub fn resume_window(&self) -> Duration {
        Duration::from_secs(self.resume_window_secs)
    }

    /// Build the entitlement table. Fails if a user type has no quota.
    pub fn entitlements(&self) -> Result<EntitlementTable, CoreError> {
        EntitlementTable::from_entries([
            (
                UserType::Guest,
                Entitlements {
                    max_messages_per_day: self.guest_messages_per_day,
                },
            ),
            (
                UserType::Regular,
                Entitlements {
                    max_messages_per_day: self.regular_messages_per_day,
                },
            ),
        ])
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "[::1]:3000".to_string(),
            max_page_size: 100,
            stream_retention_secs: 60,
            resume_window_secs: 15,
            stream_buffer: 1024,
            producer_chunk_delay_ms: 50,
            guest_messages_per_day: 20,
            regular_messages_per_day: 50,
        }
    }
}
