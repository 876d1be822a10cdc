use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Data source error while expanding {key}: {source}")]
    Source {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("Node not in graph: {0}")]
    MissingNode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CrawlError {
    pub fn source_failure<E>(key: &str, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CrawlError::Source {
            key: key.to_string(),
            source: Box::new(error),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
