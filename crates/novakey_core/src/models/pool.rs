//! Connection pool tuning and status.

use serde::Serialize;
use std::time::Duration;

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum number of pooled connections
    pub max_size: usize,
    /// How long a request waits for a free connection
    pub wait_timeout: Duration,
    /// Timeout for opening a single connection
    pub connect_timeout: Duration,
    /// Run `SELECT 1` before the pool is handed out
    pub validate_on_connect: bool,
    /// Application name sent to PostgreSQL
    pub application_name: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 16,
            wait_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            validate_on_connect: true,
            application_name: "novakey".to_string(),
        }
    }
}

impl PoolSettings {
    /// Set the maximum pool size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Enable or disable the connect-time `SELECT 1`.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_on_connect = validate;
        self
    }
}

/// Connection pool status.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStatus {
    /// Maximum pool capacity
    pub max_size: usize,
    /// Current connections (idle + active)
    pub size: usize,
    /// Idle connections
    pub available: usize,
    /// Tasks waiting for connections
    pub waiting: usize,
}

impl PoolStatus {
    /// Check if the pool is healthy.
    pub fn is_healthy(&self) -> bool {
        self.waiting == 0
    }

    /// Get the number of active (in-use) connections.
    pub fn active(&self) -> usize {
        self.size.saturating_sub(self.available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_status_active() {
        let status = PoolStatus { max_size: 16, size: 5, available: 2, waiting: 0 };
        assert_eq!(status.active(), 3);
        assert!(status.is_healthy());

        let starved = PoolStatus { max_size: 2, size: 2, available: 0, waiting: 4 };
        assert!(!starved.is_healthy());
    }
}
