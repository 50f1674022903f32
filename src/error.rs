/// Crate-wide result type.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The monitor could not come up (log directory, resolver, sockets).
    #[error("startup failed: {0}")]
    Startup(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config file IO error: {0}")]
    ConfigIo(#[source] std::io::Error),

    #[error("{sink} write failed: {source}")]
    Sink {
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A single cycle failed; the loop keeps going.
    #[error("cycle fault: {0}")]
    Cycle(String),
}

impl MonitorError {
    pub fn sink(sink: &'static str, source: std::io::Error) -> Self {
        Self::Sink { sink, source }
    }

    /// Startup faults end the process; everything else is absorbed by the loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Startup(_) | Self::Config(_) | Self::ConfigIo(_))
    }
}
