//! Channel configuration for server-internal communication

/// Buffer sizes of the mpsc channels between connection tasks and the
/// single task that owns each server's state
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Readiness events (connection handlers -> coordinator loop)
    pub control_buffer: usize,

    /// Log events (connection readers -> multiplexer loop)
    pub log_buffer: usize,

    /// Log records forwarded to an external observer
    pub sink_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            control_buffer: 1_024,
            log_buffer: 10_000,
            sink_buffer: 10_000,
        }
    }
}

impl ChannelConfig {
    /// Set the readiness event buffer size
    pub fn with_control_buffer(mut self, size: usize) -> Self {
        self.control_buffer = size.max(1);
        self
    }

    /// Set the log event buffer size
    pub fn with_log_buffer(mut self, size: usize) -> Self {
        self.log_buffer = size.max(1);
        self
    }

    /// Set the observer sink buffer size
    pub fn with_sink_buffer(mut self, size: usize) -> Self {
        self.sink_buffer = size.max(1);
        self
    }
}
