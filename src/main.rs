//! Framed I/Q spectrum receiver
//!
//! Connects to a producer sending `SPRD` frames of signed 8-bit I/Q samples,
//! computes one spectrum per frame and publishes the latest spectrum to a
//! scrolling waterfall at a fixed rate.
//!
//! # Usage Examples
//!
//! ## Live TCP producer
//! ```bash
//! iqscope --host 127.0.0.1 --port 12345 -v
//! ```
//!
//! ## Capture raw samples while receiving
//! ```bash
//! iqscope --capture-dir ~/captures --snapshot waterfall.png
//! ```
//!
//! ## Replay a recorded framed stream
//! ```bash
//! iqscope --source file --file session.sprd --snapshot waterfall.png
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use tracing::{info, warn};

use iqscope::pipeline::Disconnect;
use iqscope::snapshot::{SnapshotConsumer, write_waterfall_png};
use iqscope::{ByteSource, DbRange, PayloadStream, Pipeline, PipelineConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceType {
    Tcp,
    File,
    Stdin,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Spectrum and waterfall receiver for framed I/Q streams", long_about = None)]
struct Args {
    /// Source type: tcp, file, or stdin
    #[arg(long, default_value = "tcp")]
    source: SourceType,

    /// Producer host (source=tcp)
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Producer port (source=tcp)
    #[arg(short, long, default_value_t = 12345)]
    port: u16,

    /// Recorded framed stream (required when source=file)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Capture raw payload bytes into a timestamped file in this directory
    #[arg(long)]
    capture_dir: Option<PathBuf>,

    /// Publish rate in frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Largest accepted payload length in bytes
    #[arg(long, default_value_t = iqscope::protocol::DEFAULT_MAX_PAYLOAD_SIZE)]
    max_payload: u32,

    /// Waterfall height in rows
    #[arg(long, default_value_t = iqscope::dsp::DEFAULT_WATERFALL_HEIGHT)]
    height: usize,

    /// Lower bound of the display range in dB
    #[arg(long, default_value_t = -150.0, allow_hyphen_values = true)]
    min_db: f32,

    /// Upper bound of the display range in dB
    #[arg(long, default_value_t = 10.0, allow_hyphen_values = true)]
    max_db: f32,

    /// Write the final waterfall to this PNG file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn pipeline_config(&self) -> iqscope::Result<PipelineConfig> {
        if self.fps == 0 {
            return Err(iqscope::Error::config("--fps must be at least 1"));
        }
        Ok(PipelineConfig {
            max_payload_size: self.max_payload,
            publish_interval: Duration::from_secs(1) / self.fps,
            waterfall_height: self.height,
            db_range: DbRange::new(self.min_db, self.max_db)?,
            capture_dir: self.capture_dir.clone(),
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> iqscope::Result<()> {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    let config = args.pipeline_config()?;
    let pipeline = Pipeline::new(config)?;

    let source = match args.source {
        SourceType::Tcp => ByteSource::connect_tcp(&args.host, args.port).await?,
        SourceType::File => {
            let Some(path) = args.file.as_ref() else {
                return Err(iqscope::Error::config("--file is required when source=file"));
            };
            ByteSource::open_file(path).await?
        }
        SourceType::Stdin => ByteSource::stdin(),
    };
    let stream = PayloadStream::new(source, pipeline.config().source_config());

    let handle = pipeline.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, shutting down");
            handle.shutdown();
        }
    });

    // Log a summary about once per second
    let consumer = SnapshotConsumer::new(u64::from(args.fps));
    let (report, consumer) = pipeline.run(stream, consumer).await?;

    match &report.disconnect {
        Disconnect::EndOfStream => info!("producer disconnected"),
        Disconnect::Shutdown | Disconnect::PublisherStopped => {}
        Disconnect::ReadError(e) => warn!("connection lost: {}", e),
    }
    info!(
        "{} payloads ({} bytes), {} renders, {} bytes discarded while resynchronizing, {} oversize headers",
        report.payloads,
        report.decoder.payload_bytes,
        consumer.renders(),
        report.decoder.discarded_bytes,
        report.decoder.oversize_headers
    );
    if report.capture_failures > 0 {
        warn!("{} capture failures", report.capture_failures);
    }

    if let Some(path) = args.snapshot.as_ref() {
        write_waterfall_png(path, &report.waterfall)?;
    }

    Ok(())
}
