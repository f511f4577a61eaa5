//! Ingest and publish activities.
//!
//! ```text
//!                ingest (arrival-driven)                     publish (fixed tick)
//! bytes → FrameDecoder → payload ─┬→ capture sink
//!                                 └→ SpectrumTransform → handoff slot → Waterfall → RenderConsumer
//! ```
//!
//! Ingestion runs as fast as bytes arrive and overwrites the handoff slot
//! with every new spectrum frame. The publisher wakes on a fixed interval,
//! takes whatever frame is newest, pushes it into the waterfall and hands
//! both to the render consumer. Frames computed between two ticks are
//! dropped, never queued.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::capture::{CaptureFile, PayloadSink};
use crate::dsp::{DEFAULT_WATERFALL_HEIGHT, DbRange, SpectrumFrame, SpectrumTransform, Waterfall};
use crate::error::{Error, Result};
use crate::handoff::{self, FrameReader, FrameWriter};
use crate::protocol::{DEFAULT_MAX_PAYLOAD_SIZE, DecoderStats};
use crate::source::{DEFAULT_READ_SIZE, PayloadStream, SourceConfig};

/// Default publish period (about 30 renders per second).
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(33);

/**
 * Pipeline Configuration
 */
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Ceiling for a declared payload length.
    pub max_payload_size: u32,
    /// Size of a single read from the byte source.
    pub read_buffer_size: usize,
    /// Period of the publish tick.
    pub publish_interval: Duration,
    /// Number of rows kept in the waterfall.
    pub waterfall_height: usize,
    /// Display range used to clamp waterfall rows.
    pub db_range: DbRange,
    /// Start capturing into this directory as soon as the pipeline runs.
    pub capture_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            read_buffer_size: DEFAULT_READ_SIZE,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            waterfall_height: DEFAULT_WATERFALL_HEIGHT,
            db_range: DbRange::default(),
            capture_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.publish_interval.is_zero() {
            return Err(Error::config("publish interval must be positive"));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::config("read buffer size must be positive"));
        }
        if self.waterfall_height == 0 {
            return Err(Error::config("waterfall height must be at least 1"));
        }
        DbRange::new(self.db_range.min, self.db_range.max)?;
        Ok(())
    }

    /// Settings for a [`PayloadStream`] matching this pipeline.
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            max_payload_size: self.max_payload_size,
            read_size: self.read_buffer_size,
        }
    }
}

/// Receives each published spectrum frame together with the waterfall it
/// was just pushed into. Called from the publish task only.
pub trait RenderConsumer: Send {
    fn render(&mut self, spectrum: &SpectrumFrame, waterfall: &Waterfall);
}

impl<F> RenderConsumer for F
where
    F: FnMut(&SpectrumFrame, &Waterfall) + Send,
{
    fn render(&mut self, spectrum: &SpectrumFrame, waterfall: &Waterfall) {
        self(spectrum, waterfall)
    }
}

/// Why ingestion stopped.
#[derive(Debug)]
pub enum Disconnect {
    /// The byte source closed in an orderly way.
    EndOfStream,
    /// Reading from the byte source failed.
    ReadError(io::Error),
    /// [`PipelineHandle::shutdown`] was called.
    Shutdown,
    /// The publish task ended first, usually because the render consumer
    /// panicked. [`Pipeline::run`] reports the panic as [`Error::Task`].
    PublisherStopped,
}

/// Summary returned once both activities have stopped.
#[derive(Debug)]
pub struct PipelineReport {
    pub disconnect: Disconnect,
    /// Payloads decoded and transformed.
    pub payloads: u64,
    pub decoder: DecoderStats,
    /// Capture files that could not be opened or written.
    pub capture_failures: u64,
    /// Publish ticks that rendered a frame.
    pub renders: u64,
    /// Final waterfall state.
    pub waterfall: Waterfall,
}

#[derive(Debug)]
enum Command {
    StartCapture(PathBuf),
    StopCapture,
    Shutdown,
}

/// Cloneable control handle for a running pipeline.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl PipelineHandle {
    /// Open a new capture file in `dir`, closing the current one first.
    ///
    /// Returns `false` if the pipeline has already stopped.
    pub fn start_capture<P: Into<PathBuf>>(&self, dir: P) -> bool {
        self.commands.send(Command::StartCapture(dir.into())).is_ok()
    }

    /// Flush and close the current capture file, if any.
    pub fn stop_capture(&self) -> bool {
        self.commands.send(Command::StopCapture).is_ok()
    }

    /// Stop ingestion; undecoded bytes are dropped.
    pub fn shutdown(&self) -> bool {
        self.commands.send(Command::Shutdown).is_ok()
    }
}

/// Receiver pipeline: ingest, transform, publish.
pub struct Pipeline {
    config: PipelineConfig,
    sink: Option<Box<dyn PayloadSink>>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            sink: None,
            commands_tx,
            commands_rx,
        })
    }

    /// Tee payloads into `sink` from the start, instead of a capture file.
    pub fn with_sink(mut self, sink: Box<dyn PayloadSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            commands: self.commands_tx.clone(),
        }
    }

    /// Run until the source closes, fails, or the pipeline is shut down.
    ///
    /// Ingestion runs on the calling task and publishing on a spawned tokio
    /// task, so this must be called from within a tokio runtime. A
    /// disconnect is reported in the [`PipelineReport`], not as an error.
    pub async fn run<R, C>(
        self,
        mut stream: PayloadStream<R>,
        consumer: C,
    ) -> Result<(PipelineReport, C)>
    where
        R: AsyncRead + Unpin,
        C: RenderConsumer + 'static,
    {
        let Pipeline {
            config,
            sink,
            commands_tx,
            commands_rx,
        } = self;
        drop(commands_tx);

        let waterfall = Waterfall::new(config.waterfall_height, config.db_range)?;
        let capture = match (sink, &config.capture_dir) {
            (Some(sink), _) => Some(sink),
            (None, Some(dir)) => {
                Some(Box::new(CaptureFile::create_in(dir)?) as Box<dyn PayloadSink>)
            }
            (None, None) => None,
        };

        info!(
            "pipeline started: publish every {:?}, waterfall {} rows",
            config.publish_interval, config.waterfall_height
        );

        let (writer, reader) = handoff::channel();
        let publisher = tokio::spawn(publish(
            reader,
            waterfall,
            consumer,
            config.publish_interval,
        ));

        let mut ingest = Ingest {
            transform: SpectrumTransform::new(),
            capture,
            payloads: 0,
            capture_failures: 0,
        };
        let disconnect = ingest.run(&mut stream, commands_rx, writer).await;

        let (renders, consumer, waterfall) = publisher.await?;

        let report = PipelineReport {
            disconnect,
            payloads: ingest.payloads,
            decoder: stream.stats(),
            capture_failures: ingest.capture_failures,
            renders,
            waterfall,
        };
        info!(
            "pipeline stopped ({:?}): {} payloads, {} renders",
            report.disconnect, report.payloads, report.renders
        );
        Ok((report, consumer))
    }
}

struct Ingest {
    transform: SpectrumTransform,
    capture: Option<Box<dyn PayloadSink>>,
    payloads: u64,
    capture_failures: u64,
}

impl Ingest {
    /// Dropping `writer` on return is what tells the publisher to stop. A
    /// publisher that dies first drops its reader, which ends ingestion.
    async fn run<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut PayloadStream<R>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut writer: FrameWriter,
    ) -> Disconnect {
        let disconnect = loop {
            tokio::select! {
                biased;
                Some(command) = commands.recv() => match command {
                    Command::StartCapture(dir) => self.start_capture(dir),
                    Command::StopCapture => self.stop_capture(),
                    Command::Shutdown => {
                        info!("shutdown requested");
                        break Disconnect::Shutdown;
                    }
                },
                _ = writer.closed() => {
                    warn!("publisher stopped, ending ingestion");
                    break Disconnect::PublisherStopped;
                }
                item = stream.next() => match item {
                    Some(Ok(payload)) => {
                        let frame = self.handle_payload(&payload);
                        writer.publish(frame);
                    }
                    Some(Err(Error::Io(e))) => {
                        warn!("source read failed: {}", e);
                        break Disconnect::ReadError(e);
                    }
                    Some(Err(e)) => {
                        warn!("source failed: {}", e);
                        break Disconnect::ReadError(io::Error::other(e));
                    }
                    None => {
                        info!("source closed");
                        break Disconnect::EndOfStream;
                    }
                },
            }
        };
        self.stop_capture();
        disconnect
    }

    /// Tee `payload` into the capture sink and compute its spectrum.
    fn handle_payload(&mut self, payload: &[u8]) -> SpectrumFrame {
        self.payloads += 1;
        if let Some(sink) = self.capture.as_mut()
            && let Err(e) = sink.write_payload(payload)
        {
            self.capture_failures += 1;
            warn!("capture write failed, capture stopped: {}", e);
            self.stop_capture();
        }

        let frame = self.transform.transform(payload);
        trace!("payload #{}: {} bytes, {} bins", self.payloads, payload.len(), frame.len());
        frame
    }

    fn start_capture(&mut self, dir: PathBuf) {
        self.stop_capture();
        match CaptureFile::create_in(&dir) {
            Ok(file) => self.capture = Some(Box::new(file)),
            Err(e) => {
                self.capture_failures += 1;
                warn!("{}", e);
            }
        }
    }

    fn stop_capture(&mut self) {
        if let Some(mut sink) = self.capture.take()
            && let Err(e) = sink.close()
        {
            warn!("capture close failed: {}", e);
        }
    }
}

async fn publish<C: RenderConsumer>(
    mut reader: FrameReader,
    mut waterfall: Waterfall,
    mut consumer: C,
    period: Duration,
) -> (u64, C, Waterfall) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut renders = 0;

    loop {
        ticker.tick().await;
        // Once ingestion is over, only a frame never rendered is worth a
        // final tick.
        let closed = reader.is_closed();
        let frame = if closed {
            reader.take_fresh()
        } else {
            reader.latest()
        };
        if let Some(frame) = frame {
            waterfall.push(&frame);
            consumer.render(&frame, &waterfall);
            renders += 1;
        }
        if closed {
            break;
        }
    }

    debug!("publisher stopped after {} renders", renders);
    (renders, consumer, waterfall)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.waterfall_height, 512);
        assert_eq!(config.db_range, DbRange::default());
    }

    #[test]
    fn test_rejects_bad_config() {
        let zero_interval = PipelineConfig {
            publish_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(Pipeline::new(zero_interval), Err(Error::Config(_))));

        let zero_height = PipelineConfig {
            waterfall_height: 0,
            ..Default::default()
        };
        assert!(matches!(Pipeline::new(zero_height), Err(Error::Config(_))));

        let inverted = PipelineConfig {
            db_range: DbRange {
                min: 10.0,
                max: -10.0,
            },
            ..Default::default()
        };
        assert!(matches!(Pipeline::new(inverted), Err(Error::Config(_))));
    }

    #[test]
    fn test_source_config_follows_pipeline() {
        let config = PipelineConfig {
            max_payload_size: 4096,
            read_buffer_size: 512,
            ..Default::default()
        };
        let source = config.source_config();
        assert_eq!(source.max_payload_size, 4096);
        assert_eq!(source.read_size, 512);
    }

    #[test]
    fn test_handle_reports_stopped_pipeline() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let handle = pipeline.handle();
        assert!(handle.stop_capture());
        drop(pipeline);
        assert!(!handle.shutdown());
    }
}
