//! # FLV Source
//!
//! The demux engine. An [`FlvSource`] walks an FLV byte stream one read at a
//! time, describes its tracks once enough of the file has been seen, and
//! then feeds samples to its [`MediaStream`]s as they ask for them.
//!
//! ## Lifecycle
//!
//! ```text
//! Invalid -> Opening -> Stopped <-> { Started, Paused } -> Shutdown
//! ```
//!
//! [`FlvSource::open`] scans the leading tags until every announced track
//! has its codec configuration, then resolves with the
//! [`PresentationDescriptor`]. Start, pause and stop are accepted
//! synchronously and carried out on a spawned task; their outcome is
//! reported on the event channel returned by [`FlvSource::new`].
//!
//! ## Reads
//!
//! At most one read is outstanding. Each read runs on its own task and
//! reports back through a single completion path that holds the engine lock
//! for the duration of the step. Reads remember the session ticket they were
//! issued under; a stop or a shutdown invalidates the ticket so that late
//! completions are dropped.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use flv::{AudioPacketHeader, Metadata, TagHeader, TagParser, VideoPacketHeader};
use h264::AvcConfig;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::byte_stream::ByteStream;
use crate::config::SourceConfig;
use crate::descriptor::{PresentationDescriptor, TrackKind};
use crate::discovery::FileHeaderState;
use crate::error::SourceError;
use crate::event::{EventSink, SourceEvent, StartPosition};
use crate::session::Session;
use crate::stream::{MediaStream, Track, TrackSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Created, not opened yet
    Invalid,
    /// Scanning the leading tags
    Opening,
    Stopped,
    Started,
    Paused,
    Shutdown,
}

/// What a caller may do with an open source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCharacteristics {
    pub can_pause: bool,
    /// Only a restart from the beginning is supported
    pub can_seek: bool,
}

/// The read a completion belongs to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ReadStep {
    FileHeader,
    TagHeader,
    ScriptPayload(TagHeader),
    AudioHeader(TagHeader),
    AacPacketType(AudioPacketHeader),
    AudioPayload(AudioPacketHeader),
    VideoHeader(TagHeader),
    AvcPacketHeader(VideoPacketHeader),
    VideoPayload(VideoPacketHeader),
}

pub(crate) type OpenReply = oneshot::Sender<Result<PresentationDescriptor, SourceError>>;

pub(crate) struct SourceInner {
    pub(crate) state: SourceState,
    pub(crate) stream: Option<Arc<dyn ByteStream>>,
    pub(crate) header: FileHeaderState,
    pub(crate) tracks: [Option<Track>; 2],
    pub(crate) presentation: Option<PresentationDescriptor>,
    pub(crate) read_in_flight: bool,
    pub(crate) pending: Option<ReadStep>,
    /// A start, pause or stop has been accepted and not yet carried out
    pub(crate) pending_op: bool,
    /// The next tag-header read seeks back to the first media tag
    pub(crate) rewind_pending: bool,
    /// The next tag-header read first skips a previous-tag-size field
    pub(crate) skip_prefix: bool,
    pub(crate) avc_config: Option<AvcConfig>,
    pub(crate) avc_config_sent: bool,
    /// Selected tracks that still have to report end of stream
    pub(crate) pending_eos: usize,
    pub(crate) eop_sent: bool,
    pub(crate) open_reply: Option<OpenReply>,
    pub(crate) scanned_tags: usize,
}

impl SourceInner {
    fn new() -> Self {
        Self {
            state: SourceState::Invalid,
            stream: None,
            header: FileHeaderState::default(),
            tracks: [None, None],
            presentation: None,
            read_in_flight: false,
            pending: None,
            pending_op: false,
            rewind_pending: false,
            skip_prefix: true,
            avc_config: None,
            avc_config_sent: false,
            pending_eos: 0,
            eop_sent: false,
            open_reply: None,
            scanned_tags: 0,
        }
    }

    pub(crate) fn track(&self, kind: TrackKind) -> Option<&Track> {
        self.tracks[kind.index()].as_ref()
    }

    pub(crate) fn track_mut(&mut self, kind: TrackKind) -> Option<&mut Track> {
        self.tracks[kind.index()].as_mut()
    }

    pub(crate) fn is_track_active(&self, kind: TrackKind) -> bool {
        self.track(kind).is_some_and(Track::is_active)
    }
}

pub(crate) struct SourceShared {
    pub(crate) inner: Mutex<SourceInner>,
    pub(crate) session: Session,
    pub(crate) events: EventSink,
    pub(crate) config: SourceConfig,
}

impl std::fmt::Debug for SourceShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceShared")
            .field("state", &self.inner.lock().state)
            .field("config", &self.config)
            .finish()
    }
}

impl SourceShared {
    /// Positions the stream and reads `len` bytes on a spawned task.
    pub(crate) fn issue_read(
        self: &Arc<Self>,
        inner: &mut SourceInner,
        step: ReadStep,
        seek: Option<SeekFrom>,
        len: usize,
    ) -> Result<(), SourceError> {
        let stream = inner.stream.clone().ok_or(SourceError::Shutdown)?;
        if let Some(pos) = seek {
            stream.seek(pos)?;
        }
        let offset = stream.position()?;

        inner.read_in_flight = true;
        inner.pending = Some(step);

        let ticket = self.session.ticket();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = stream.read(len).await;
            shared.resume(ticket, offset, result);
        });
        Ok(())
    }

    /// Reads the next tag header, skipping the size field of the previous tag
    /// unless the stream sits at the first media tag.
    pub(crate) fn read_tag_header(
        self: &Arc<Self>,
        inner: &mut SourceInner,
    ) -> Result<(), SourceError> {
        let seek = if inner.rewind_pending {
            inner.rewind_pending = false;
            Some(SeekFrom::Start(inner.header.first_media_offset()))
        } else if inner.skip_prefix {
            Some(SeekFrom::Current(TagParser::PREVIOUS_TAG_SIZE_LEN as i64))
        } else {
            None
        };
        inner.skip_prefix = true;

        self.issue_read(inner, ReadStep::TagHeader, seek, TagParser::TAG_HEADER_LEN)
    }

    /// Moves past `len` bytes of the current tag without reading them.
    pub(crate) fn skip(inner: &SourceInner, len: u32) -> Result<(), SourceError> {
        let stream = inner.stream.as_ref().ok_or(SourceError::Shutdown)?;
        stream.seek(SeekFrom::Current(len as i64))?;
        Ok(())
    }

    fn resume(self: &Arc<Self>, ticket: u64, offset: u64, result: std::io::Result<Bytes>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.read_in_flight = false;
        let step = inner.pending.take();

        if !self.session.is_current(ticket) {
            trace!(offset, "Discarding stale read completion");
            self.pump(inner);
            return;
        }
        let Some(step) = step else {
            return;
        };

        let outcome = result.map_err(SourceError::from).and_then(|data| match inner.state {
            SourceState::Opening => self.discover(inner, step, data, offset),
            SourceState::Started | SourceState::Paused => self.demux(inner, step, data, offset),
            _ => Ok(()),
        });

        if let Err(err) = outcome {
            self.fail(inner, err);
        }
    }

    /// Reports the error and shuts the source down.
    pub(crate) fn fail(self: &Arc<Self>, inner: &mut SourceInner, err: SourceError) {
        match inner.open_reply.take() {
            Some(reply) => {
                debug!(error = %err, "Open failed");
                let _ = reply.send(Err(err));
            }
            None => {
                warn!(error = %err, "Source failed while streaming");
                self.events.send(SourceEvent::Error(Arc::new(err)));
            }
        }
        self.shutdown_locked(inner);
    }

    pub(crate) fn shutdown_locked(&self, inner: &mut SourceInner) {
        if inner.state == SourceState::Shutdown {
            return;
        }
        debug!(state = ?inner.state, "Shutting down source");

        self.session.shutdown();
        inner.state = SourceState::Shutdown;
        for track in inner.tracks.iter_mut().flatten() {
            track.shutdown();
        }
        inner.stream = None;
        inner.header = FileHeaderState::default();
        inner.pending = None;
        inner.avc_config = None;

        if let Some(reply) = inner.open_reply.take() {
            let _ = reply.send(Err(SourceError::Shutdown));
        }
    }

    /// Accounts for a track that drained after end of stream.
    pub(crate) fn on_signal(&self, inner: &mut SourceInner, signal: TrackSignal) {
        if signal != TrackSignal::EndOfStream || inner.pending_eos == 0 {
            return;
        }
        inner.pending_eos -= 1;
        if inner.pending_eos == 0 && !inner.eop_sent {
            inner.eop_sent = true;
            debug!("All selected streams ended");
            self.events.send(SourceEvent::EndOfPresentation);
        }
    }

    pub(crate) fn request_sample(
        self: &Arc<Self>,
        kind: TrackKind,
        token: Option<crate::event::RequestToken>,
    ) -> Result<(), SourceError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state == SourceState::Shutdown {
            return Err(SourceError::Shutdown);
        }

        let track = inner
            .track_mut(kind)
            .ok_or(SourceError::InvalidRequest("no such stream"))?;
        let signal = track.request_sample(token, &self.events)?;
        self.on_signal(inner, signal);
        self.pump(inner);
        Ok(())
    }

    fn do_start(self: &Arc<Self>, selection: Vec<TrackKind>, position: StartPosition) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.pending_op = false;
        if inner.state == SourceState::Shutdown {
            return;
        }

        inner.pending_eos = 0;
        inner.eop_sent = false;
        let mut signals = Vec::with_capacity(TrackKind::ALL.len());
        for kind in TrackKind::ALL {
            let Some(track) = inner.tracks[kind.index()].as_mut() else {
                continue;
            };
            let selected = selection.contains(&kind);
            let was_active = track.is_active();
            track.activate(selected);
            if !selected {
                if was_active && kind == TrackKind::Video {
                    inner.avc_config_sent = false;
                }
                continue;
            }

            self.events.send(if was_active {
                SourceEvent::UpdatedStream(kind)
            } else {
                SourceEvent::NewStream(kind)
            });
            if !track.eos_sent() {
                inner.pending_eos += 1;
            }
            signals.push(track.start(position, &self.events));
        }

        debug!(?selection, ?position, "Source started");
        inner.state = SourceState::Started;
        self.events.send(SourceEvent::SourceStarted);

        for signal in signals {
            self.on_signal(inner, signal);
        }
        self.pump(inner);
    }

    fn do_pause(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.pending_op = false;
        if inner.state != SourceState::Started {
            return;
        }

        inner.state = SourceState::Paused;
        for track in inner.tracks.iter_mut().flatten() {
            track.pause(&self.events);
        }
        self.events.send(SourceEvent::SourcePaused);
    }

    fn do_stop(self: &Arc<Self>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.pending_op = false;
        if inner.state == SourceState::Shutdown {
            return;
        }

        let rewound = inner
            .stream
            .as_ref()
            .map(|stream| stream.seek(SeekFrom::Start(0)));
        if let Some(Err(err)) = rewound {
            self.fail(inner, err.into());
            return;
        }
        self.session.restart();

        for track in inner.tracks.iter_mut().flatten() {
            track.stop(&self.events);
        }
        inner.rewind_pending = true;
        inner.avc_config = inner.header.avc_config.clone();
        inner.avc_config_sent = false;
        inner.pending_eos = 0;
        inner.eop_sent = false;

        inner.state = SourceState::Stopped;
        debug!("Source stopped");
        self.events.send(SourceEvent::SourceStopped);
    }

    /// Claims the single control-operation slot.
    fn begin_operation(inner: &mut SourceInner) -> Result<(), SourceError> {
        if inner.pending_op {
            return Err(SourceError::NotAccepting);
        }
        inner.pending_op = true;
        Ok(())
    }
}

/// Demuxes an FLV byte stream into an audio and a video track.
///
/// Dropping the source shuts it down.
#[derive(Debug)]
pub struct FlvSource {
    shared: Arc<SourceShared>,
}

impl FlvSource {
    /// Creates a source together with the receiving end of its events.
    pub fn new(config: SourceConfig) -> (Self, mpsc::UnboundedReceiver<SourceEvent>) {
        let (events, rx) = EventSink::channel();
        let shared = Arc::new(SourceShared {
            inner: Mutex::new(SourceInner::new()),
            session: Session::default(),
            events,
            config,
        });
        (Self { shared }, rx)
    }

    /// Reads the file header and the leading tags and describes the tracks.
    ///
    /// On failure the source is shut down.
    pub async fn open(
        &self,
        stream: Arc<dyn ByteStream>,
    ) -> Result<PresentationDescriptor, SourceError> {
        let reply = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            match inner.state {
                SourceState::Invalid => {}
                SourceState::Shutdown => return Err(SourceError::Shutdown),
                _ => return Err(SourceError::InvalidRequest("source is already open")),
            }

            let capabilities = stream.capabilities();
            if !capabilities.seekable || !capabilities.readable {
                self.shared.shutdown_locked(inner);
                return Err(SourceError::InvalidRequest(
                    "byte stream must be seekable and readable",
                ));
            }

            debug!(config = %self.shared.config, "Opening FLV source");
            let (tx, rx) = oneshot::channel();
            inner.state = SourceState::Opening;
            inner.stream = Some(stream);
            inner.open_reply = Some(tx);

            if let Err(err) = self.shared.issue_read(
                inner,
                ReadStep::FileHeader,
                Some(SeekFrom::Start(0)),
                TagParser::FILE_HEADER_LEN,
            ) {
                self.shared.fail(inner, err);
            }
            rx
        };

        reply.await.unwrap_or(Err(SourceError::Shutdown))
    }

    /// Starts or resumes the selected streams.
    ///
    /// `StartPosition::At` only accepts 0 and only from the stopped state.
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        presentation: &PresentationDescriptor,
        position: StartPosition,
    ) -> Result<(), SourceError> {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        match inner.state {
            SourceState::Stopped | SourceState::Started | SourceState::Paused => {}
            SourceState::Shutdown => return Err(SourceError::Shutdown),
            SourceState::Invalid | SourceState::Opening => {
                return Err(SourceError::InvalidRequest("source is not open"));
            }
        }

        let known = inner
            .presentation
            .as_ref()
            .is_some_and(|current| current.same_streams(presentation));
        if !known {
            return Err(SourceError::InvalidRequest(
                "presentation does not belong to this source",
            ));
        }
        let selection: Vec<TrackKind> = presentation.selected().collect();
        if selection.is_empty() {
            return Err(SourceError::InvalidRequest("no stream selected"));
        }
        if let StartPosition::At(time) = position {
            if time != 0 || inner.state != SourceState::Stopped {
                return Err(SourceError::InvalidRequest(
                    "seeking is only supported to the start from the stopped state",
                ));
            }
        }

        SourceShared::begin_operation(inner)?;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.do_start(selection, position) });
        Ok(())
    }

    /// Must be called from within a Tokio runtime.
    pub fn pause(&self) -> Result<(), SourceError> {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        match inner.state {
            SourceState::Started => {}
            SourceState::Shutdown => return Err(SourceError::Shutdown),
            _ => return Err(SourceError::InvalidRequest("pause requires a started source")),
        }

        SourceShared::begin_operation(inner)?;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.do_pause() });
        Ok(())
    }

    /// Stops streaming and rewinds to the first media tag.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stop(&self) -> Result<(), SourceError> {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        match inner.state {
            SourceState::Stopped | SourceState::Started | SourceState::Paused => {}
            SourceState::Shutdown => return Err(SourceError::Shutdown),
            SourceState::Invalid | SourceState::Opening => {
                return Err(SourceError::InvalidRequest("source is not open"));
            }
        }

        SourceShared::begin_operation(inner)?;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.do_stop() });
        Ok(())
    }

    /// Releases the byte stream and fails every later call. Idempotent.
    pub fn shutdown(&self) {
        let mut guard = self.shared.inner.lock();
        self.shared.shutdown_locked(&mut guard);
    }

    pub fn state(&self) -> SourceState {
        self.shared.inner.lock().state
    }

    pub fn characteristics(&self) -> Result<SourceCharacteristics, SourceError> {
        match self.state() {
            SourceState::Shutdown => Err(SourceError::Shutdown),
            _ => Ok(SourceCharacteristics {
                can_pause: true,
                can_seek: false,
            }),
        }
    }

    /// Handle to one track, once the source is open.
    pub fn stream(&self, kind: TrackKind) -> Option<MediaStream> {
        let inner = self.shared.inner.lock();
        if inner.state == SourceState::Shutdown {
            return None;
        }
        let descriptor = inner.presentation.as_ref()?.stream(kind)?.clone();
        Some(MediaStream::new(Arc::downgrade(&self.shared), descriptor))
    }

    pub fn presentation_descriptor(&self) -> Result<PresentationDescriptor, SourceError> {
        let inner = self.shared.inner.lock();
        if inner.state == SourceState::Shutdown {
            return Err(SourceError::Shutdown);
        }
        inner
            .presentation
            .clone()
            .ok_or(SourceError::InvalidRequest("source is not open"))
    }

    /// The decoded `onMetaData` object, if the file has one.
    pub fn metadata(&self) -> Option<Metadata> {
        self.shared.inner.lock().header.metadata.clone()
    }

    pub fn config(&self) -> &SourceConfig {
        &self.shared.config
    }
}

impl Drop for FlvSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::time::Duration;

    use amf0::Amf0Value;
    use bytes::Bytes;
    use flv::{FlvError, FlvHeader, TagType};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use super::*;
    use crate::byte_stream::{FileByteStream, MemoryByteStream, StreamCapabilities};
    use crate::event::Sample;
    use crate::descriptor::{AudioCodec, MediaType};
    use crate::error::ErrorKind;
    use crate::event::RequestToken;
    use crate::config::MAX_SAMPLE_QUEUE_DEPTH;
    use crate::test_support::{
        AAC_LC_STEREO_44K, FlvFileBuilder, GatedByteStream, avc_config, synthetic_file,
    };

    const WAIT: Duration = Duration::from_secs(5);

    async fn next_event(rx: &mut UnboundedReceiver<SourceEvent>) -> SourceEvent {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Collects events up to and including the first one matching `done`.
    async fn events_until(
        rx: &mut UnboundedReceiver<SourceEvent>,
        done: impl Fn(&SourceEvent) -> bool,
    ) -> Vec<SourceEvent> {
        let mut seen = Vec::new();
        loop {
            let event = next_event(rx).await;
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
    }

    async fn open_memory(
        data: Bytes,
        config: SourceConfig,
    ) -> (
        FlvSource,
        UnboundedReceiver<SourceEvent>,
        Result<PresentationDescriptor, SourceError>,
    ) {
        let (source, rx) = FlvSource::new(config);
        let result = source.open(Arc::new(MemoryByteStream::new(data))).await;
        (source, rx, result)
    }

    fn samples(events: &[SourceEvent], kind: TrackKind) -> Vec<(Sample, Option<RequestToken>)> {
        events
            .iter()
            .filter_map(|event| match event {
                SourceEvent::Sample {
                    track,
                    sample,
                    token,
                } if *track == kind => Some((sample.clone(), *token)),
                _ => None,
            })
            .collect()
    }

    fn expected_nal_units() -> Bytes {
        Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00])
    }

    #[tokio::test]
    async fn test_open_describes_both_tracks() {
        init_test_tracing!();

        let (source, _rx, result) = open_memory(synthetic_file(), SourceConfig::default()).await;
        let presentation = result.unwrap();

        assert_eq!(source.state(), SourceState::Stopped);
        assert_eq!(presentation.len(), 2);
        assert_eq!(presentation.duration_hns(), 10_000_000);

        let MediaType::Video(video) = &presentation.stream(TrackKind::Video).unwrap().media_type
        else {
            panic!("expected a video stream");
        };
        assert_eq!((video.width, video.height), (640, 480));
        assert_eq!(video.profile, 0x42);
        assert_eq!(video.nal_length_size, 4);

        let MediaType::Audio(audio) = &presentation.stream(TrackKind::Audio).unwrap().media_type
        else {
            panic!("expected an audio stream");
        };
        assert_eq!(audio.codec, AudioCodec::Aac);
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channels, 2);
        assert_eq!(
            audio.audio_specific_config,
            Some(Bytes::from_static(&AAC_LC_STEREO_44K))
        );

        let metadata = source.metadata().unwrap();
        assert_eq!(metadata.video_codec_id, Some(7));
        assert_eq!(metadata.recognized_properties, 5);
    }

    #[tokio::test]
    async fn test_synthetic_playback() {
        init_test_tracing!();

        let (source, mut rx, result) = open_memory(synthetic_file(), SourceConfig::default()).await;
        let presentation = result.unwrap();

        source.start(&presentation, StartPosition::At(0)).unwrap();
        let started = events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;
        assert!(matches!(started[0], SourceEvent::NewStream(TrackKind::Video)));
        assert!(
            started
                .iter()
                .any(|e| matches!(e, SourceEvent::NewStream(TrackKind::Audio)))
        );
        assert_eq!(source.state(), SourceState::Started);

        let video = source.stream(TrackKind::Video).unwrap();
        let audio = source.stream(TrackKind::Audio).unwrap();
        video.request_sample(Some(RequestToken(1))).unwrap();
        audio.request_sample(Some(RequestToken(2))).unwrap();

        let events = events_until(&mut rx, |e| matches!(e, SourceEvent::EndOfPresentation)).await;

        let audio_samples = samples(&events, TrackKind::Audio);
        assert_eq!(audio_samples.len(), 1);
        assert_eq!(audio_samples[0].1, Some(RequestToken(2)));
        assert_eq!(
            audio_samples[0].0.buffers,
            vec![Bytes::from_static(&AAC_LC_STEREO_44K)]
        );

        let video_samples = samples(&events, TrackKind::Video);
        assert_eq!(video_samples.len(), 1);
        let (sample, token) = &video_samples[0];
        assert_eq!(*token, Some(RequestToken(1)));
        assert!(sample.key_frame);
        assert_eq!(sample.buffers.len(), 2);
        assert_eq!(sample.buffers[0], avc_config().code_private_data().unwrap());
        assert_eq!(sample.buffers[1], expected_nal_units());

        let ends = events
            .iter()
            .filter(|e| matches!(e, SourceEvent::EndOfStream(_)))
            .count();
        assert_eq!(ends, 2);

        let err = video.request_sample(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndOfStream);
    }

    #[tokio::test]
    async fn test_malformed_header_length() {
        let data = FlvFileBuilder::with_header(FlvHeader {
            has_video: true,
            data_offset: 12,
            ..FlvHeader::default()
        })
        .build();

        let (source, _rx, result) = open_memory(data, SourceConfig::default()).await;
        let err = result.unwrap_err();
        assert!(matches!(err, SourceError::Format(FlvError::InvalidHeader(_))));
        assert_eq!(source.state(), SourceState::Shutdown);
    }

    #[tokio::test]
    async fn test_truncated_file_header() {
        let (source, _rx, result) =
            open_memory(Bytes::from_static(b"FLV\x01"), SourceConfig::default()).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Format);
        assert_eq!(source.state(), SourceState::Shutdown);
    }

    #[tokio::test]
    async fn test_open_requires_seekable_stream() {
        let (source, _rx) = FlvSource::new(SourceConfig::default());
        let stream = MemoryByteStream::new(synthetic_file()).with_capabilities(StreamCapabilities {
            readable: true,
            seekable: false,
        });

        let err = source.open(Arc::new(stream)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(source.state(), SourceState::Shutdown);
    }

    #[tokio::test]
    async fn test_open_twice() {
        let (source, _rx, result) = open_memory(synthetic_file(), SourceConfig::default()).await;
        result.unwrap();

        let err = source
            .open(Arc::new(MemoryByteStream::new(synthetic_file())))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(source.state(), SourceState::Stopped);
    }

    #[tokio::test]
    async fn test_no_streams() {
        let data = FlvFileBuilder::new(false, false)
            .metadata(&[("duration", Amf0Value::Number(3.0))])
            .build();
        let (_source, _rx, result) = open_memory(data, SourceConfig::default()).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NoStreams);
    }

    #[tokio::test]
    async fn test_require_metadata() {
        let data = FlvFileBuilder::new(true, false)
            .aac_sequence_header(0, &AAC_LC_STEREO_44K)
            .aac_raw(23, &[0x21, 0x10])
            .build();

        let config = SourceConfig::builder().require_metadata(true).build();
        let (_source, _rx, result) = open_memory(data.clone(), config).await;
        assert!(matches!(
            result,
            Err(SourceError::Format(FlvError::MissingMetadata))
        ));

        let (_source, _rx, result) = open_memory(data, SourceConfig::default()).await;
        assert_eq!(result.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_audio_keeps_video() {
        let data = FlvFileBuilder::new(true, true)
            .avc_sequence_header(0, &avc_config())
            // Speex
            .audio(0, 0xB6, &[0x01, 0x02])
            .avc_nalu(0, true, 0, &[&[0x65, 0x88]])
            .build();

        let (source, _rx, result) = open_memory(data, SourceConfig::default()).await;
        let presentation = result.unwrap();
        assert_eq!(presentation.len(), 1);
        assert!(presentation.stream(TrackKind::Video).is_some());
        assert!(source.stream(TrackKind::Audio).is_none());
    }

    #[tokio::test]
    async fn test_unknown_video_codec_keeps_audio() {
        init_test_tracing!();

        // HEVC key frame as written by enhanced FLV muxers
        let data = FlvFileBuilder::new(true, true)
            .aac_sequence_header(0, &AAC_LC_STEREO_44K)
            .tag(TagType::Video, 0, &[0x1C, 0x00, 0x00, 0x00, 0x00, 0x01])
            .aac_raw(23, &[0x21, 0x10])
            .eof()
            .build();

        let (source, mut rx, result) = open_memory(data, SourceConfig::default()).await;
        let presentation = result.unwrap();
        assert_eq!(presentation.len(), 1);
        assert!(presentation.stream(TrackKind::Audio).is_some());
        assert!(source.stream(TrackKind::Video).is_none());

        source.start(&presentation, StartPosition::Current).unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;

        let audio = source.stream(TrackKind::Audio).unwrap();
        audio.request_sample(None).unwrap();
        audio.request_sample(None).unwrap();
        let events = events_until(&mut rx, |e| matches!(e, SourceEvent::EndOfPresentation)).await;

        let timestamps: Vec<_> = samples(&events, TrackKind::Audio)
            .into_iter()
            .map(|(sample, _)| sample.timestamp_hns)
            .collect();
        assert_eq!(timestamps, vec![0, 230_000]);
        assert!(samples(&events, TrackKind::Video).is_empty());
    }

    #[tokio::test]
    async fn test_empty_script_tag_is_skipped() {
        let data = FlvFileBuilder::new(true, false)
            .tag(TagType::ScriptData, 0, &[])
            .aac_sequence_header(0, &AAC_LC_STEREO_44K)
            .aac_raw(23, &[0x21, 0x10])
            .build();

        let (source, _rx, result) = open_memory(data, SourceConfig::default()).await;
        assert_eq!(result.unwrap().len(), 1);
        assert!(source.metadata().is_none());
    }

    #[tokio::test]
    async fn test_discovery_tag_limit() {
        // The header announces audio that never shows up.
        let data = FlvFileBuilder::new(true, true)
            .avc_sequence_header(0, &avc_config())
            .avc_nalu(0, true, 0, &[&[0x65]])
            .avc_nalu(40, false, 0, &[&[0x41]])
            .build();

        let config = SourceConfig::builder().discovery_tag_limit(1).build();
        let (source, _rx, result) = open_memory(data, config).await;
        assert_eq!(result.unwrap().len(), 1);
        assert_eq!(source.shared.inner.lock().scanned_tags, 1);
    }

    #[tokio::test]
    async fn test_control_operations_are_serialized() {
        let (source, mut rx, result) = open_memory(synthetic_file(), SourceConfig::default()).await;
        let presentation = result.unwrap();

        source.start(&presentation, StartPosition::Current).unwrap();
        let err = source.start(&presentation, StartPosition::Current).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAccepting);
        assert_eq!(source.stop().unwrap_err().kind(), ErrorKind::NotAccepting);

        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;
        source.pause().unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourcePaused)).await;
        assert_eq!(source.state(), SourceState::Paused);
    }

    #[tokio::test]
    async fn test_start_validation() {
        let (source, _rx, result) = open_memory(synthetic_file(), SourceConfig::default()).await;
        let mut presentation = result.unwrap();

        let err = source.pause().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err = source.start(&presentation, StartPosition::At(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        presentation.deselect(TrackKind::Video);
        presentation.deselect(TrackKind::Audio);
        let err = source.start(&presentation, StartPosition::Current).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let foreign = PresentationDescriptor::new(Vec::new(), 0);
        let err = source.start(&foreign, StartPosition::Current).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_request_before_start() {
        let (source, _rx, result) = open_memory(synthetic_file(), SourceConfig::default()).await;
        result.unwrap();

        let video = source.stream(TrackKind::Video).unwrap();
        let err = video.request_sample(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_deselected_track() {
        init_test_tracing!();

        let (source, mut rx, result) = open_memory(synthetic_file(), SourceConfig::default()).await;
        let mut presentation = result.unwrap();
        presentation.deselect(TrackKind::Audio);

        source.start(&presentation, StartPosition::Current).unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;

        let audio = source.stream(TrackKind::Audio).unwrap();
        assert_eq!(
            audio.request_sample(None).unwrap_err().kind(),
            ErrorKind::InvalidRequest
        );

        let video = source.stream(TrackKind::Video).unwrap();
        video.request_sample(None).unwrap();
        let events = events_until(&mut rx, |e| matches!(e, SourceEvent::EndOfPresentation)).await;

        assert_eq!(samples(&events, TrackKind::Video).len(), 1);
        assert!(samples(&events, TrackKind::Audio).is_empty());
        assert!(!events
            .iter()
            .any(|e| matches!(e, SourceEvent::EndOfStream(TrackKind::Audio))));
    }

    #[tokio::test]
    async fn test_queue_depth_and_token_order() {
        init_test_tracing!();

        let data = FlvFileBuilder::new(true, false)
            .aac_sequence_header(0, &AAC_LC_STEREO_44K)
            .aac_raw(23, &[0x01])
            .aac_raw(46, &[0x02])
            .aac_raw(69, &[0x03])
            .build();
        let config = SourceConfig::builder().sample_queue_depth(1).build();
        let (source, mut rx, result) = open_memory(data, config).await;
        let presentation = result.unwrap();

        source.start(&presentation, StartPosition::Current).unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let inner = source.shared.inner.lock();
            assert_eq!(inner.track(TrackKind::Audio).unwrap().queued(), 1);
            assert_eq!(inner.track(TrackKind::Audio).unwrap().held(), 0);
            assert!(!inner.read_in_flight);
        }

        let audio = source.stream(TrackKind::Audio).unwrap();
        for token in 1..=4 {
            audio.request_sample(Some(RequestToken(token))).unwrap();
        }
        let events = events_until(&mut rx, |e| matches!(e, SourceEvent::EndOfPresentation)).await;

        let delivered: Vec<_> = samples(&events, TrackKind::Audio)
            .into_iter()
            .map(|(sample, token)| (sample.timestamp_hns, token))
            .collect();
        assert_eq!(
            delivered,
            vec![
                (0, Some(RequestToken(1))),
                (230_000, Some(RequestToken(2))),
                (460_000, Some(RequestToken(3))),
                (690_000, Some(RequestToken(4))),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_track_does_not_starve_the_other() {
        init_test_tracing!();

        // Audio runs eight tags ahead of the only picture.
        let mut builder = FlvFileBuilder::new(true, true)
            .avc_sequence_header(0, &avc_config())
            .aac_sequence_header(0, &AAC_LC_STEREO_44K);
        for frame in 1..=8u8 {
            builder = builder.aac_raw(u32::from(frame) * 23, &[frame]);
        }
        let data = builder.avc_nalu(200, true, 0, &[&[0x65]]).eof().build();

        let (source, mut rx, result) = open_memory(data, SourceConfig::default()).await;
        let presentation = result.unwrap();
        source.start(&presentation, StartPosition::Current).unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;

        let video = source.stream(TrackKind::Video).unwrap();
        video.request_sample(Some(RequestToken(1))).unwrap();
        let events = events_until(&mut rx, |e| {
            matches!(e, SourceEvent::Sample { track: TrackKind::Video, .. })
        })
        .await;
        let (sample, token) = samples(&events, TrackKind::Video).remove(0);
        assert_eq!(token, Some(RequestToken(1)));
        assert_eq!(sample.timestamp_hns, 2_000_000);

        {
            let inner = source.shared.inner.lock();
            let audio = inner.track(TrackKind::Audio).unwrap();
            assert_eq!(audio.queued(), MAX_SAMPLE_QUEUE_DEPTH);
            assert_eq!(audio.held(), 5);
        }

        let audio = source.stream(TrackKind::Audio).unwrap();
        for token in 1..=9 {
            audio.request_sample(Some(RequestToken(token))).unwrap();
        }
        let events = events_until(&mut rx, |e| matches!(e, SourceEvent::EndOfPresentation)).await;

        let delivered: Vec<_> = samples(&events, TrackKind::Audio)
            .into_iter()
            .map(|(sample, token)| (sample.timestamp_hns, token))
            .collect();
        let expected: Vec<_> = (0..=8u64)
            .map(|frame| (frame * 230_000, Some(RequestToken(frame + 1))))
            .collect();
        assert_eq!(delivered, expected);
    }

    #[tokio::test]
    async fn test_stop_discards_read_in_flight() {
        init_test_tracing!();

        let stream = Arc::new(GatedByteStream::new(synthetic_file()));
        let (source, mut rx) = FlvSource::new(SourceConfig::default());
        let presentation = source.open(stream.clone()).await.unwrap();

        stream.close_gate();
        source.start(&presentation, StartPosition::Current).unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;
        timeout(WAIT, stream.read_held()).await.unwrap();

        source.stop().unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStopped)).await;
        assert!(source.shared.inner.lock().read_in_flight);

        // The held read now completes against the rewound stream.
        stream.open_gate();
        source.start(&presentation, StartPosition::At(0)).unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;

        source
            .stream(TrackKind::Video)
            .unwrap()
            .request_sample(Some(RequestToken(1)))
            .unwrap();
        source
            .stream(TrackKind::Audio)
            .unwrap()
            .request_sample(Some(RequestToken(2)))
            .unwrap();
        let events = events_until(&mut rx, |e| matches!(e, SourceEvent::EndOfPresentation)).await;

        assert!(!events.iter().any(|e| matches!(e, SourceEvent::Error(_))));
        let video_samples = samples(&events, TrackKind::Video);
        assert_eq!(video_samples.len(), 1);
        assert_eq!(video_samples[0].0.buffers.len(), 2);
        assert_eq!(video_samples[0].0.buffers[1], expected_nal_units());

        let audio_samples = samples(&events, TrackKind::Audio);
        assert_eq!(audio_samples.len(), 1);
        assert_eq!(
            audio_samples[0].0.buffers,
            vec![Bytes::from_static(&AAC_LC_STEREO_44K)]
        );
        assert_eq!(source.state(), SourceState::Started);
    }

    #[tokio::test]
    async fn test_stop_and_replay() {
        init_test_tracing!();

        let (source, mut rx, result) = open_memory(synthetic_file(), SourceConfig::default()).await;
        let presentation = result.unwrap();
        let video = source.stream(TrackKind::Video).unwrap();
        let audio = source.stream(TrackKind::Audio).unwrap();

        for round in 0..2 {
            source.start(&presentation, StartPosition::At(0)).unwrap();
            let started = events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;
            let expected = if round == 0 {
                SourceEvent::NewStream(TrackKind::Video)
            } else {
                SourceEvent::UpdatedStream(TrackKind::Video)
            };
            assert_eq!(
                std::mem::discriminant(&started[0]),
                std::mem::discriminant(&expected)
            );

            video.request_sample(None).unwrap();
            audio.request_sample(None).unwrap();
            let events =
                events_until(&mut rx, |e| matches!(e, SourceEvent::EndOfPresentation)).await;

            let video_samples = samples(&events, TrackKind::Video);
            assert_eq!(video_samples.len(), 1);
            assert_eq!(video_samples[0].0.buffers.len(), 2);

            source.stop().unwrap();
            let stopped = events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStopped)).await;
            assert!(
                stopped
                    .iter()
                    .any(|e| matches!(e, SourceEvent::StreamStopped(TrackKind::Video)))
            );
            assert_eq!(source.state(), SourceState::Stopped);
        }
    }

    #[tokio::test]
    async fn test_changed_sequence_header_is_resent() {
        let mut changed = avc_config();
        changed.level = 0x28;

        let data = FlvFileBuilder::new(false, true)
            .avc_sequence_header(0, &avc_config())
            .avc_nalu(0, true, 0, &[&[0x65]])
            .avc_nalu(40, false, 40, &[&[0x41]])
            .avc_sequence_header(80, &changed)
            .avc_nalu(80, true, 0, &[&[0x65]])
            .avc_end_of_sequence(120)
            .build();

        let (source, mut rx, result) = open_memory(data, SourceConfig::default()).await;
        let presentation = result.unwrap();
        source.start(&presentation, StartPosition::Current).unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;

        let video = source.stream(TrackKind::Video).unwrap();
        for _ in 0..3 {
            video.request_sample(None).unwrap();
        }
        let events = events_until(&mut rx, |e| matches!(e, SourceEvent::EndOfPresentation)).await;

        let video_samples = samples(&events, TrackKind::Video);
        let buffer_counts: Vec<_> = video_samples.iter().map(|(s, _)| s.buffers.len()).collect();
        assert_eq!(buffer_counts, vec![2, 1, 2]);
        assert_eq!(video_samples[1].0.composition_offset_hns, 400_000);
        assert!(!video_samples[1].0.key_frame);
        assert_eq!(
            video_samples[2].0.buffers[0],
            changed.code_private_data().unwrap()
        );
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (source, mut rx, result) = open_memory(synthetic_file(), SourceConfig::default()).await;
        let presentation = result.unwrap();
        let video = source.stream(TrackKind::Video).unwrap();

        let characteristics = source.characteristics().unwrap();
        assert!(characteristics.can_pause);
        assert!(!characteristics.can_seek);

        source.shutdown();
        source.shutdown();
        assert_eq!(source.state(), SourceState::Shutdown);
        assert_eq!(
            source.characteristics().unwrap_err().kind(),
            ErrorKind::Shutdown
        );
        assert!(source.stream(TrackKind::Video).is_none());
        assert!(source.metadata().is_none());

        assert_eq!(video.request_sample(None).unwrap_err().kind(), ErrorKind::Shutdown);
        assert_eq!(
            source.start(&presentation, StartPosition::Current).unwrap_err().kind(),
            ErrorKind::Shutdown
        );
        assert_eq!(source.stop().unwrap_err().kind(), ErrorKind::Shutdown);
        assert_eq!(source.pause().unwrap_err().kind(), ErrorKind::Shutdown);
        assert_eq!(
            source.presentation_descriptor().unwrap_err().kind(),
            ErrorKind::Shutdown
        );

        drop(source);
        assert_eq!(video.request_sample(None).unwrap_err().kind(), ErrorKind::Shutdown);
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, SourceEvent::Sample { .. }));
        }
    }

    #[tokio::test]
    async fn test_streaming_error_is_reported() {
        init_test_tracing!();

        // The NAL unit length prefix runs past the end of the tag.
        let data = FlvFileBuilder::new(false, true)
            .avc_sequence_header(0, &avc_config())
            .avc_nalu(0, true, 0, &[&[0x65]])
            .tag(
                TagType::Video,
                40,
                &[0x27, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09, 0x41],
            )
            .build();

        let (source, mut rx, result) = open_memory(data, SourceConfig::default()).await;
        let presentation = result.unwrap();
        source.start(&presentation, StartPosition::Current).unwrap();

        let events = events_until(&mut rx, |e| matches!(e, SourceEvent::Error(_))).await;
        let Some(SourceEvent::Error(err)) = events.last() else {
            panic!("expected an error event");
        };
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(source.state(), SourceState::Shutdown);
    }

    #[tokio::test]
    async fn test_file_backed_open() {
        init_test_tracing!();

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), synthetic_file()).unwrap();

        let (source, mut rx) = FlvSource::new(SourceConfig::default());
        let stream = FileByteStream::open(file.path()).unwrap();
        let presentation = source.open(Arc::new(stream)).await.unwrap();
        assert_eq!(presentation.len(), 2);

        source.start(&presentation, StartPosition::Current).unwrap();
        events_until(&mut rx, |e| matches!(e, SourceEvent::SourceStarted)).await;

        let video = source.stream(TrackKind::Video).unwrap();
        video.request_sample(Some(RequestToken(9))).unwrap();
        let events = events_until(&mut rx, |e| {
            matches!(e, SourceEvent::Sample { track: TrackKind::Video, .. })
        })
        .await;

        let (sample, token) = samples(&events, TrackKind::Video).remove(0);
        assert_eq!(token, Some(RequestToken(9)));
        assert_eq!(sample.buffers[1], expected_nal_units());
    }
}
