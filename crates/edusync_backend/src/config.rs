//! Backend configuration.

use edusync_protocol::Timestamp;

/// How the backend assigns `updated_at` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityClock {
    /// Wall-clock milliseconds, bumped to stay strictly increasing.
    System,
    /// A logical counter starting after the given value.
    Logical {
        /// The first write is stamped `start + 1`.
        start: Timestamp,
    },
}

/// Configuration for the reference backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Maximum records per fetch page.
    pub max_page_size: usize,
    /// Timestamp source for accepted writes.
    pub clock: AuthorityClock,
}

impl BackendConfig {
    /// Creates a configuration with wall-clock timestamps.
    pub fn new() -> Self {
        Self {
            max_page_size: 500,
            clock: AuthorityClock::System,
        }
    }

    /// Sets the maximum page size.
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size.max(1);
        self
    }

    /// Uses a logical clock starting after `start`.
    pub fn with_logical_clock(mut self, start: Timestamp) -> Self {
        self.clock = AuthorityClock::Logical { start };
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new()
    }
}
