use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Required storage or schema could not be prepared. Ends the run.
    #[error("Setup failed: {0}")]
    Setup(String),

    /// A root folder could not be enumerated. Ends the run.
    #[error("Discovery failed for root folder {root}: {message}")]
    Discovery { root: String, message: String },

    /// The provider could not supply metadata for one item.
    #[error("Scrape failed for {code}: {message}")]
    Scrape { code: String, message: String },

    /// A catalog write for one item failed.
    #[error("Persist failed for {code}: {message}")]
    Persist { code: String, message: String },

    /// One or more cover variants could not be downloaded or stored.
    #[error("Artwork failed for {code}: {message}")]
    Artwork { code: String, message: String },

    /// Cover deletion during cleanup failed for a reason other than absence.
    #[error("Could not delete covers of {code}: {message}")]
    CleanupArtifact { code: String, message: String },

    /// A submitted task panicked or was dropped before completing.
    #[error("Task aborted: {0}")]
    TaskAborted(String),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] core_metadata::MetadataError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
