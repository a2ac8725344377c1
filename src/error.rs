use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Error
///
/// Only `MalformedOutput` can come out of the parsing core. Everything else
/// belongs to the components that talk to processes, files or the network.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// the load generator output has no decodable payload
    ///
    #[error("malformed load generator output: {reason}\nraw output:\n{raw}")]
    MalformedOutput { raw: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// `hey` could not be spawned or exited unsuccessfully
    ///
    #[error("load generator failed ({status}): {stderr}")]
    LoadGenerator { status: String, stderr: String },

    #[error("scrape of {url} timed out after {timeout:?}")]
    ScrapeTimeout { url: String, timeout: Duration },

    #[error("exporter at {url} returned status {status}")]
    ScrapeStatus { url: String, status: u16 },

    #[error("failed to reach exporter at {url}: {source}")]
    ScrapeTransport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("exporter control failed: {0}")]
    Exporter(String),

    #[error("component is shut down")]
    Shutdown,
}

impl Error {
    pub fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
