mod archive;
mod config;
mod handler;
mod imports;
mod io;
mod location;
mod report;
mod scan;

pub use archive::ArchiveError;
pub use config::ConfigError;
pub use handler::{FeatureDisabled, HandlerError};
pub use imports::ImportError;
pub use io::IoError;
pub use location::LocationError;
pub use report::ReportError;
pub use scan::{ScanError, WalkError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

pub type Result<T> = std::result::Result<T, Error>;
