use thiserror::Error;
use tunedrop_ingest::metadata::CoverError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no search results for {0:?}")]
    NoResults(String),

    #[error("no usable song among ids {0:?}")]
    NoMatch(Vec<u64>),

    #[error("invalid cover reference: {0}")]
    Cover(#[from] CoverError),
}
