use amf0::Amf0ReadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlvError {
    #[error("Invalid FLV header: {0}")]
    InvalidHeader(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("Tag data size {data_size} is smaller than its {sub_header} byte sub-header")]
    SubHeaderTooLarge { data_size: u32, sub_header: u32 },
    #[error("Error parsing script data: {0}")]
    Script(#[from] Amf0ReadError),
    #[error("Invalid AVC decoder configuration: {0}")]
    AvcConfig(std::io::Error),
    #[error("Invalid NAL unit framing: {0}")]
    Nalu(std::io::Error),
    #[error("No onMetaData script tag before the first media tag")]
    MissingMetadata,
}

impl FlvError {
    pub(crate) fn expect_len(expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::ShortRead { expected, actual })
        }
    }
}
