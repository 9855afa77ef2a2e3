//! # Track Sink
//!
//! Per-track flow control. Each track holds a short queue of demuxed samples
//! and a FIFO of outstanding requests, and pairs them up in order while it is
//! started. A track tells the engine when it wants more data and when it has
//! drained after end of stream; the engine owns the tracks and calls into
//! them under its lock.
//!
//! Samples that arrive while the queue is full wait in an overflow list and
//! move into the queue as it drains. The engine only demuxes past a full
//! track while some other track still needs data, so the overflow is bounded
//! by how far the two tracks are interleaved apart in the file.

use std::collections::VecDeque;
use std::sync::Weak;

use tracing::trace;

use crate::descriptor::{StreamDescriptor, TrackKind};
use crate::error::SourceError;
use crate::event::{EventSink, RequestToken, Sample, SourceEvent, StartPosition};
use crate::source::SourceShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackState {
    Stopped,
    Paused,
    Started,
    Shutdown,
}

/// What the engine has to do after a track operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackSignal {
    None,
    /// The queue has room and the stream has not ended
    RequestData,
    /// The track drained after end of stream, reported once
    EndOfStream,
}

#[derive(Debug)]
pub(crate) struct Track {
    kind: TrackKind,
    state: TrackState,
    active: bool,
    end_of_stream: bool,
    eos_sent: bool,
    depth: usize,
    samples: VecDeque<Sample>,
    overflow: VecDeque<Sample>,
    requests: VecDeque<Option<RequestToken>>,
}

impl Track {
    pub(crate) fn new(kind: TrackKind, depth: usize) -> Self {
        Self {
            kind,
            state: TrackState::Stopped,
            active: false,
            end_of_stream: false,
            eos_sent: false,
            depth,
            samples: VecDeque::with_capacity(depth),
            overflow: VecDeque::new(),
            requests: VecDeque::new(),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn eos_sent(&self) -> bool {
        self.eos_sent
    }

    pub(crate) fn queued(&self) -> usize {
        self.samples.len()
    }

    /// Samples waiting behind a full queue.
    pub(crate) fn held(&self) -> usize {
        self.overflow.len()
    }

    pub(crate) fn needs_data(&self) -> bool {
        self.active
            && !self.end_of_stream
            && self.overflow.is_empty()
            && self.samples.len() < self.depth
    }

    fn clear_samples(&mut self) {
        self.samples.clear();
        self.overflow.clear();
    }

    /// Deactivating drops everything queued.
    pub(crate) fn activate(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        if !active {
            self.clear_samples();
            self.requests.clear();
        }
    }

    /// Restarting at a position discards queued samples but keeps requests.
    pub(crate) fn start(&mut self, position: StartPosition, events: &EventSink) -> TrackSignal {
        self.state = TrackState::Started;
        if let StartPosition::At(_) = position {
            self.clear_samples();
        }
        events.send(SourceEvent::StreamStarted(self.kind));
        self.dispatch(events)
    }

    pub(crate) fn pause(&mut self, events: &EventSink) {
        self.state = TrackState::Paused;
        if self.active {
            events.send(SourceEvent::StreamPaused(self.kind));
        }
    }

    pub(crate) fn stop(&mut self, events: &EventSink) {
        self.state = TrackState::Stopped;
        self.clear_samples();
        self.requests.clear();
        self.end_of_stream = false;
        self.eos_sent = false;
        if self.active {
            events.send(SourceEvent::StreamStopped(self.kind));
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.state = TrackState::Shutdown;
        self.active = false;
        self.clear_samples();
        self.requests.clear();
    }

    pub(crate) fn end_of_stream(&mut self, events: &EventSink) -> TrackSignal {
        self.end_of_stream = true;
        self.dispatch(events)
    }

    pub(crate) fn request_sample(
        &mut self,
        token: Option<RequestToken>,
        events: &EventSink,
    ) -> Result<TrackSignal, SourceError> {
        match self.state {
            TrackState::Shutdown => return Err(SourceError::Shutdown),
            TrackState::Stopped => {
                return Err(SourceError::InvalidRequest("stream is stopped"));
            }
            TrackState::Paused | TrackState::Started => {}
        }
        if !self.active {
            return Err(SourceError::InvalidRequest("stream is not selected"));
        }
        if self.end_of_stream && self.samples.is_empty() && self.overflow.is_empty() {
            return Err(SourceError::EndOfStream);
        }

        self.requests.push_back(token);
        Ok(self.dispatch(events))
    }

    pub(crate) fn deliver(&mut self, sample: Sample, events: &EventSink) -> TrackSignal {
        if !self.active {
            trace!(track = %self.kind, "Dropping sample for inactive track");
            return TrackSignal::None;
        }
        if self.samples.len() < self.depth && self.overflow.is_empty() {
            self.samples.push_back(sample);
        } else {
            trace!(
                track = %self.kind,
                held = self.overflow.len() + 1,
                "Track full, holding sample"
            );
            self.overflow.push_back(sample);
        }
        self.dispatch(events)
    }

    fn refill(&mut self) {
        while self.samples.len() < self.depth {
            match self.overflow.pop_front() {
                Some(sample) => self.samples.push_back(sample),
                None => break,
            }
        }
    }

    fn dispatch(&mut self, events: &EventSink) -> TrackSignal {
        if self.state != TrackState::Started {
            return TrackSignal::None;
        }

        self.refill();
        while !self.samples.is_empty() && !self.requests.is_empty() {
            if let (Some(sample), Some(token)) =
                (self.samples.pop_front(), self.requests.pop_front())
            {
                events.send(SourceEvent::Sample {
                    track: self.kind,
                    sample,
                    token,
                });
            }
            self.refill();
        }

        if self.samples.is_empty() && self.end_of_stream {
            if self.eos_sent {
                return TrackSignal::None;
            }
            self.eos_sent = true;
            events.send(SourceEvent::EndOfStream(self.kind));
            return TrackSignal::EndOfStream;
        }

        if self.needs_data() {
            TrackSignal::RequestData
        } else {
            TrackSignal::None
        }
    }
}

/// Caller-side handle to one track of an [`FlvSource`](crate::FlvSource).
///
/// The handle does not keep the source alive; once the source is gone every
/// request fails with [`SourceError::Shutdown`].
#[derive(Debug, Clone)]
pub struct MediaStream {
    source: Weak<SourceShared>,
    descriptor: StreamDescriptor,
}

impl MediaStream {
    pub(crate) fn new(source: Weak<SourceShared>, descriptor: StreamDescriptor) -> Self {
        Self { source, descriptor }
    }

    pub fn kind(&self) -> TrackKind {
        self.descriptor.kind
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    /// Asks for the next sample. It arrives as a [`SourceEvent::Sample`]
    /// carrying `token`, in request order.
    ///
    /// Must be called from within a Tokio runtime, since it may start a read.
    pub fn request_sample(&self, token: Option<RequestToken>) -> Result<(), SourceError> {
        let source = self.source.upgrade().ok_or(SourceError::Shutdown)?;
        source.request_sample(self.descriptor.kind, token)
    }
}
