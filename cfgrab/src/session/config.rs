//! Engine tunables.

use std::time::Duration;

/// Default idle timeout for a step.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of trailing bytes kept for pattern search.
pub const DEFAULT_SEARCH_DEPTH: usize = 1000;

/// Default grace period for best-effort termination and close.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a step may go without receiving output before it times out.
    pub timeout: Duration,

    /// Bytes of unconsumed output kept for pattern matching.
    pub search_depth: usize,

    /// Bound on each write of the termination sequence and on closing.
    pub close_timeout: Duration,

    /// Bound on the whole session, if any.
    pub deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            search_depth: DEFAULT_SEARCH_DEPTH,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            deadline: None,
        }
    }
}

impl EngineConfig {
    /// Set the per-step idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the search depth.
    pub fn with_search_depth(mut self, depth: usize) -> Self {
        self.search_depth = depth;
        self
    }

    /// Set the termination grace period.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Bound the whole session.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.search_depth, 1000);
        assert_eq!(config.close_timeout, Duration::from_secs(5));
        assert!(config.deadline.is_none());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::default()
            .with_timeout(Duration::from_secs(90))
            .with_search_depth(4096)
            .with_deadline(Duration::from_secs(600));
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert_eq!(config.search_depth, 4096);
        assert_eq!(config.deadline, Some(Duration::from_secs(600)));
    }
}
