use std::io;
use thiserror::Error;

/// Errors reported while building or applying a patch.
#[derive(Error, Debug)]
pub enum Error {
    /// The patch violates the structure of the bsdiff 4.x container.
    #[error("corrupt patch: {0}")]
    Corrupt(&'static str),

    /// The output sink or the bzip2 codec failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Test if the error was caused by a malformed patch.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt(_))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Corrupt(reason) => io::Error::new(io::ErrorKind::InvalidData, reason),
            Error::Io(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
