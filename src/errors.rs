use thiserror;

use crate::fastq::Origin;

pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error reading or writing \"{file}\": {source}")]
    FileIo { file: String, source: BoxError },

    #[error("Error reading or writing bytes: {0}")]
    BytesIo(BoxError),

    #[error("Error parsing record {idx} in {origin}: {source}")]
    ParseRecord {
        origin: Origin,
        idx: usize,
        source: BoxError,
    },

    #[error("Could not parse \"{string}\" in \"{context}\": {reason}")]
    Parse {
        string: String,
        context: String,
        reason: &'static str,
    },

    #[error("Error parsing configuration in {context}: {source}")]
    Config { context: String, source: BoxError },

    #[error("Invalid channel model: {0}")]
    Channel(String),

    #[error("No {0} primers were given")]
    EmptyPrimers(&'static str),

    #[error("Invalid primer \"{id}\": {reason}")]
    InvalidPrimer { id: String, reason: &'static str },

    #[error("A worker thread panicked while {0}")]
    WorkerPanicked(&'static str),
}

pub fn utf8(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}
