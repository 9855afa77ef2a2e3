use std::io;

use flv::FlvError;
use thiserror::Error;

/// Errors reported by the demux engine and its streams.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Malformed FLV data: {0}")]
    Format(#[from] FlvError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("No playable audio or video stream")]
    NoStreams,
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("Another operation is still pending")]
    NotAccepting,
    #[error("End of stream")]
    EndOfStream,
    #[error("Source has been shut down")]
    Shutdown,
}

/// Flat view of [`SourceError`] for comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Io,
    UnsupportedCodec,
    NoStreams,
    InvalidRequest,
    NotAccepting,
    EndOfStream,
    Shutdown,
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Format(_) => ErrorKind::Format,
            SourceError::Io(_) => ErrorKind::Io,
            SourceError::UnsupportedCodec(_) => ErrorKind::UnsupportedCodec,
            SourceError::NoStreams => ErrorKind::NoStreams,
            SourceError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            SourceError::NotAccepting => ErrorKind::NotAccepting,
            SourceError::EndOfStream => ErrorKind::EndOfStream,
            SourceError::Shutdown => ErrorKind::Shutdown,
        }
    }
}
