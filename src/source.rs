//! Payload sources
//!
//! This module turns byte sources (TCP socket, file, standard input, or any
//! reader) into sequences of decoded frame payloads. It provides both a
//! synchronous [`Iterator`] interface over [`std::io::Read`] and an
//! asynchronous [`Stream`] interface over [`tokio::io::AsyncRead`].
//!
//! End of input ends the sequence. A read error is yielded once as
//! [`Error::Io`](crate::Error::Io) and then the sequence ends. Bytes still
//! waiting in the decoder when the source closes are dropped.

use std::io::Read;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, info};

use crate::error::{self, Error};
use crate::expanduser;
use crate::protocol::{DEFAULT_MAX_PAYLOAD_SIZE, DecoderStats, FrameDecoder};

/// Default size of a single read from the byte source.
pub const DEFAULT_READ_SIZE: usize = 64 * 1024;

/**
 * Payload Source Configuration
 */
#[derive(Debug, Clone, Copy)]
pub struct SourceConfig {
    pub max_payload_size: u32,
    pub read_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            read_size: DEFAULT_READ_SIZE,
        }
    }
}

fn discard_leftover(decoder: &mut FrameDecoder) {
    let pending = decoder.clear();
    if pending > 0 {
        debug!("source closed with {} undecoded bytes, discarding", pending);
    }
}

/**
 * Synchronous Payload Reader
 */
pub struct PayloadReader<R: Read> {
    reader: R,
    decoder: FrameDecoder,
    buffer: Vec<u8>,
    done: bool,
}

impl<R: Read> PayloadReader<R> {
    pub fn new(reader: R, config: SourceConfig) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::with_max_payload(config.max_payload_size),
            buffer: vec![0u8; config.read_size.max(1)],
            done: false,
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

impl PayloadReader<std::io::BufReader<std::fs::File>> {
    /// Read a recorded framed stream from a file (`~` is expanded).
    pub fn from_file<P: AsRef<Path>>(path: P, config: SourceConfig) -> error::Result<Self> {
        let path = expanduser(path.as_ref().to_path_buf());
        let file = std::fs::File::open(path)?;
        Ok(Self::new(std::io::BufReader::new(file), config))
    }
}

impl<R: Read> Iterator for PayloadReader<R> {
    type Item = error::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(payload) = self.decoder.next_payload() {
                return Some(Ok(payload));
            }
            if self.done {
                return None;
            }
            match self.reader.read(&mut self.buffer) {
                Ok(0) => {
                    self.done = true;
                    discard_leftover(&mut self.decoder);
                    return None;
                }
                Ok(n) => self.decoder.extend(&self.buffer[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    discard_leftover(&mut self.decoder);
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

/**
 * Asynchronous byte source (TCP, file or stdin)
 */
pub enum ByteSource {
    /// TCP connection to a sample producer
    Tcp(tokio::net::TcpStream),
    /// Recorded framed stream
    File(tokio::fs::File),
    /// Framed stream piped on standard input
    Stdin(tokio::io::Stdin),
}

impl ByteSource {
    /// Connect to a producer at `address:port`
    pub async fn connect_tcp(address: &str, port: u16) -> error::Result<Self> {
        let stream = tokio::net::TcpStream::connect((address, port)).await?;
        info!("connected to {}:{}", address, port);
        Ok(ByteSource::Tcp(stream))
    }

    /// Open a recorded framed stream (`~` is expanded)
    pub async fn open_file<P: AsRef<Path>>(path: P) -> error::Result<Self> {
        let path = expanduser(path.as_ref().to_path_buf());
        let file = tokio::fs::File::open(&path).await?;
        info!("reading frames from {}", path.display());
        Ok(ByteSource::File(file))
    }

    pub fn stdin() -> Self {
        ByteSource::Stdin(tokio::io::stdin())
    }
}

impl AsyncRead for ByteSource {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ByteSource::Tcp(source) => Pin::new(source).poll_read(cx, buf),
            ByteSource::File(source) => Pin::new(source).poll_read(cx, buf),
            ByteSource::Stdin(source) => Pin::new(source).poll_read(cx, buf),
        }
    }
}

/**
 * Asynchronous Payload Stream
 */
pub struct PayloadStream<R: AsyncRead + Unpin> {
    reader: R,
    decoder: FrameDecoder,
    buffer: Vec<u8>,
    done: bool,
}

impl<R: AsyncRead + Unpin> PayloadStream<R> {
    pub fn new(reader: R, config: SourceConfig) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::with_max_payload(config.max_payload_size),
            buffer: vec![0u8; config.read_size.max(1)],
            done: false,
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Bytes received but not decoded yet.
    pub fn pending(&self) -> usize {
        self.decoder.len()
    }
}

impl PayloadStream<ByteSource> {
    /// Connect to a producer and decode its frames
    pub async fn from_tcp(address: &str, port: u16, config: SourceConfig) -> error::Result<Self> {
        Ok(Self::new(ByteSource::connect_tcp(address, port).await?, config))
    }

    /// Decode frames from a recorded stream
    pub async fn from_file<P: AsRef<Path>>(path: P, config: SourceConfig) -> error::Result<Self> {
        Ok(Self::new(ByteSource::open_file(path).await?, config))
    }

    /// Decode frames piped on standard input
    pub fn from_stdin(config: SourceConfig) -> Self {
        Self::new(ByteSource::stdin(), config)
    }
}

impl<R: AsyncRead + Unpin> Stream for PayloadStream<R> {
    type Item = error::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(payload) = this.decoder.next_payload() {
                return Poll::Ready(Some(Ok(payload)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            let mut read_buf = ReadBuf::new(&mut this.buffer);
            match Pin::new(&mut this.reader).poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => {
                    let filled = read_buf.filled().len();
                    if filled == 0 {
                        this.done = true;
                        discard_leftover(&mut this.decoder);
                        return Poll::Ready(None);
                    }
                    this.decoder.extend(&this.buffer[..filled]);
                }
                Poll::Ready(Err(e)) => {
                    this.done = true;
                    discard_leftover(&mut this.decoder);
                    return Poll::Ready(Some(Err(Error::Io(e))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
