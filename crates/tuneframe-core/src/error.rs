use thiserror::Error;

#[derive(Error, Debug)]
pub enum TuneframeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot read table {}: {source}", path.display())]
    TableFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid table {name}: {source}")]
    InvalidTable {
        name: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid sequence {id}: {reason}")]
    InvalidSequence { id: i32, reason: String },

    #[error("Static tables have not been initialised")]
    TablesNotInitialised,

    #[error("Unknown sensor geometry id {0}")]
    UnknownGeometry(i32),

    #[error("Invalid frame archive: {0}")]
    InvalidArchive(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Kernel {kernel} failed: {reason}")]
    Kernel { kernel: String, reason: String },

    #[error("Frame source error: {0}")]
    Source(String),

    #[error("Product sink error: {0}")]
    Sink(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, TuneframeError>;
