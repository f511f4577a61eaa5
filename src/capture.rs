//! Raw payload capture.
//!
//! Payload bytes are written verbatim (Cs8 I/Q, no frame headers), one file
//! per capture session. Files are named after the local time the session
//! started, e.g. `20240131_235959_042.iq`, and are never truncated: if the
//! name is taken a `-N` suffix is tried instead.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::error::{Error, Result};
use crate::expanduser;

/// Give up after this many name collisions within the same millisecond.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Destination for raw payload bytes.
///
/// The pipeline tees every payload into its sink before the transform.
/// Errors are reported to the caller, which decides whether to keep going.
pub trait PayloadSink: Send {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Flush and release the underlying resource.
    fn close(&mut self) -> io::Result<()>;
}

/// Buffered capture file.
pub struct CaptureFile {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl CaptureFile {
    /// Open a new timestamped capture file inside `dir`, creating `dir` if
    /// needed. A leading `~` is expanded to the home directory.
    pub fn create_in<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = expanduser(dir.as_ref().to_path_buf());
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::capture(format!("cannot create directory {}: {e}", dir.display()))
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = match attempt {
                0 => format!("{stamp}.iq"),
                n => format!("{stamp}-{n}.iq"),
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    info!("capture started: {}", path.display());
                    return Ok(Self {
                        path,
                        writer: BufWriter::new(file),
                        bytes_written: 0,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(Error::capture(format!(
                        "cannot create {}: {e}",
                        path.display()
                    )));
                }
            }
        }
        Err(Error::capture(format!(
            "no free capture file name for {stamp} in {}",
            dir.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl PayloadSink for CaptureFile {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(payload)?;
        self.bytes_written += payload.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        info!(
            "capture closed: {} ({} bytes)",
            self.path.display(),
            self.bytes_written
        );
        Ok(())
    }
}
