#![doc = include_str!("../readme.md")]

use std::path::PathBuf;

pub mod capture;
pub mod dsp;
pub mod error;
pub mod handoff;
pub mod pipeline;
pub mod protocol;
pub mod snapshot;
pub mod source;

pub use capture::{CaptureFile, PayloadSink};
pub use dsp::{DbRange, SpectrumFrame, SpectrumTransform, Waterfall};
pub use error::{Error, Result};
pub use pipeline::{
    Disconnect, Pipeline, PipelineConfig, PipelineHandle, PipelineReport, RenderConsumer,
};
pub use protocol::FrameDecoder;
pub use source::{ByteSource, PayloadReader, PayloadStream, SourceConfig};

pub(crate) fn expanduser(path: PathBuf) -> PathBuf {
    // Check if the path starts with "~"
    if let Some(stripped) = path.to_str().and_then(|p| p.strip_prefix("~"))
        && let Some(home_dir) = dirs::home_dir()
    {
        // Join the home directory with the rest of the path
        return home_dir.join(stripped.trim_start_matches('/'));
    }
    path
}
