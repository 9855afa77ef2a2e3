//! # Source Events
//!
//! Everything the engine reports flows through one unbounded channel of
//! [`SourceEvent`]s, in the order it happened.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::descriptor::TrackKind;
use crate::error::SourceError;

/// Opaque value passed to a sample request and echoed back with the sample
/// that satisfies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(pub u64);

/// One access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// For the first AVC sample after a start, the codec config in start-code
    /// form comes first, the NAL units second.
    pub buffers: Vec<Bytes>,
    pub timestamp_hns: u64,
    /// Presentation minus decode time, AVC only
    pub composition_offset_hns: i64,
    pub key_frame: bool,
}

impl Sample {
    pub fn new(buffer: Bytes, timestamp_hns: u64) -> Self {
        Self {
            buffers: vec![buffer],
            timestamp_hns,
            composition_offset_hns: 0,
            key_frame: false,
        }
    }

    /// Total number of bytes across all buffers.
    pub fn len(&self) -> usize {
        self.buffers.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a start begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Continue from where the source is
    #[default]
    Current,
    /// Restart at the given time in 100 ns units, only 0 is accepted
    At(u64),
}

#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A stream became active on start
    NewStream(TrackKind),
    /// An already active stream was started again
    UpdatedStream(TrackKind),
    SourceStarted,
    SourcePaused,
    SourceStopped,
    StreamStarted(TrackKind),
    StreamPaused(TrackKind),
    StreamStopped(TrackKind),
    Sample {
        track: TrackKind,
        sample: Sample,
        token: Option<RequestToken>,
    },
    EndOfStream(TrackKind),
    EndOfPresentation,
    /// The source failed while streaming and has shut down
    Error(Arc<SourceError>),
}

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<SourceEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<SourceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn send(&self, event: SourceEvent) {
        if let Err(err) = self.tx.send(event) {
            trace!(event = ?err.0, "Event receiver dropped");
        }
    }
}
