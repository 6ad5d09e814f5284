use std::time::Duration;

use crate::error::Error;

/// Configuration for connection tasks and the event-loop group.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of connections one [`CommLoop`](crate::CommLoop) holds.
    pub max_connections: u32,
    /// Initial capacity of each connection's read buffer.
    pub read_buffer_capacity: usize,
    /// Queued response bytes above which a connection stops parsing new
    /// requests until the peer drains its write queue.
    pub write_queue_soft_cap: usize,
    /// Maximum in-flight requests per connection for multiplexed protocols.
    /// Single-in-flight protocols always use 1.
    pub max_in_flight: usize,
    /// Close connections that stay idle this long. `None` disables it.
    /// A connection's own [`ConnectionInfo`](crate::ConnectionInfo) may override it.
    pub keep_alive_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_connections: 4096,
            read_buffer_capacity: 4096,
            write_queue_soft_cap: 4 * 1024 * 1024,
            max_in_flight: 64,
            keep_alive_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl Config {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_connections == 0 || self.max_connections >= (1 << 24) {
            return Err(Error::Config(
                "max_connections must be > 0 and < 2^24".into(),
            ));
        }
        if self.read_buffer_capacity == 0 {
            return Err(Error::Config("read_buffer_capacity must be > 0".into()));
        }
        if self.write_queue_soft_cap == 0 {
            return Err(Error::Config("write_queue_soft_cap must be > 0".into()));
        }
        if self.max_in_flight == 0 {
            return Err(Error::Config("max_in_flight must be > 0".into()));
        }
        if self.keep_alive_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "keep_alive_timeout must be non-zero (use None to disable)".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`Config`] with validation on [`build()`](Self::build).
///
/// ```
/// use std::time::Duration;
/// use wireline::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .max_connections(1024)
///     .max_in_flight(128)
///     .keep_alive_timeout(Some(Duration::from_secs(60)))
///     .build()
///     .expect("invalid config");
/// assert_eq!(config.max_in_flight, 128);
/// ```
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections per event-loop group.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.config.max_connections = n;
        self
    }

    /// Set the initial read buffer capacity per connection.
    pub fn read_buffer_capacity(mut self, bytes: usize) -> Self {
        self.config.read_buffer_capacity = bytes;
        self
    }

    /// Set the write queue soft cap in bytes.
    pub fn write_queue_soft_cap(mut self, bytes: usize) -> Self {
        self.config.write_queue_soft_cap = bytes;
        self
    }

    /// Set the in-flight request limit for multiplexed protocols.
    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.config.max_in_flight = n;
        self
    }

    /// Set the idle keep-alive timeout.
    pub fn keep_alive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    /// Validate and return the config.
    pub fn build(self) -> Result<Config, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}
