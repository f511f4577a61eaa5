//! Single-slot handoff of the latest spectrum frame.
//!
//! The ingest side publishes every frame it computes; the publish side only
//! ever sees the newest one. Publishing replaces the slot contents instead
//! of queueing, so a slow reader costs memory for exactly one frame.
//!
//! Built on [`tokio::sync::watch`], which gives whole-value swaps (a reader
//! never observes a half-written frame) and works from both async tasks and
//! plain threads.

use std::sync::Arc;

use tokio::sync::watch;

use crate::dsp::SpectrumFrame;

#[derive(Debug, Clone)]
struct Published {
    sequence: u64,
    frame: Arc<SpectrumFrame>,
}

/// Create a connected writer/reader pair with an empty slot.
pub fn channel() -> (FrameWriter, FrameReader) {
    let (tx, rx) = watch::channel(None);
    (
        FrameWriter { tx, sequence: 0 },
        FrameReader { rx, seen: 0 },
    )
}

/// Writing half; there is exactly one per slot.
#[derive(Debug)]
pub struct FrameWriter {
    tx: watch::Sender<Option<Published>>,
    sequence: u64,
}

impl FrameWriter {
    /// Replace the slot contents with `frame`, returning its sequence number.
    ///
    /// Succeeds even when no reader is left.
    pub fn publish(&mut self, frame: SpectrumFrame) -> u64 {
        self.sequence += 1;
        self.tx.send_replace(Some(Published {
            sequence: self.sequence,
            frame: Arc::new(frame),
        }));
        self.sequence
    }

    /// Sequence number of the last published frame (0 before the first).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Completes once every reader is gone.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn subscribe(&self) -> FrameReader {
        FrameReader {
            rx: self.tx.subscribe(),
            seen: 0,
        }
    }
}

/// Reading half; tracks which frame it has already handed out.
#[derive(Debug, Clone)]
pub struct FrameReader {
    rx: watch::Receiver<Option<Published>>,
    seen: u64,
}

impl FrameReader {
    /// The newest frame, whether or not it was returned before.
    pub fn latest(&mut self) -> Option<Arc<SpectrumFrame>> {
        let published = self.rx.borrow_and_update().clone()?;
        self.seen = published.sequence;
        Some(published.frame)
    }

    /// The newest frame only if this reader has not returned it yet.
    pub fn take_fresh(&mut self) -> Option<Arc<SpectrumFrame>> {
        let published = self.rx.borrow_and_update().clone()?;
        if published.sequence <= self.seen {
            return None;
        }
        self.seen = published.sequence;
        Some(published.frame)
    }

    /// Sequence number of the last frame this reader returned.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// True once the writer is gone. The last frame stays readable.
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: f32) -> SpectrumFrame {
        SpectrumFrame::from_bins(vec![value])
    }

    #[test]
    fn test_empty_slot() {
        let (_writer, mut reader) = channel();
        assert!(reader.latest().is_none());
        assert!(reader.take_fresh().is_none());
        assert!(!reader.is_closed());
    }

    #[test]
    fn test_latest_wins() {
        let (mut writer, mut reader) = channel();
        writer.publish(frame(1.0));
        writer.publish(frame(2.0));
        let last = writer.publish(frame(3.0));

        assert_eq!(last, 3);
        assert_eq!(reader.latest().unwrap().bins(), &[3.0]);
        assert_eq!(reader.seen(), 3);
    }

    #[test]
    fn test_take_fresh_only_once() {
        let (mut writer, mut reader) = channel();
        writer.publish(frame(1.0));

        assert!(reader.take_fresh().is_some());
        assert!(reader.take_fresh().is_none());
        // `latest` still repeats the current frame
        assert_eq!(reader.latest().unwrap().bins(), &[1.0]);

        writer.publish(frame(2.0));
        assert_eq!(reader.take_fresh().unwrap().bins(), &[2.0]);
    }

    #[test]
    fn test_frame_survives_writer_drop() {
        let (mut writer, mut reader) = channel();
        writer.publish(frame(7.0));
        drop(writer);

        assert!(reader.is_closed());
        assert_eq!(reader.take_fresh().unwrap().bins(), &[7.0]);
        assert_eq!(reader.latest().unwrap().bins(), &[7.0]);
    }

    #[tokio::test]
    async fn test_writer_sees_reader_drop() {
        let (writer, reader) = channel();
        drop(reader);
        tokio::time::timeout(std::time::Duration::from_secs(1), writer.closed())
            .await
            .expect("Writer did not notice the reader was gone");
    }

    #[test]
    fn test_cross_thread_handoff() {
        let (mut writer, mut reader) = channel();
        let producer = std::thread::spawn(move || {
            for i in 0..1000 {
                writer.publish(frame(i as f32));
            }
        });
        producer.join().unwrap();

        assert!(reader.is_closed());
        assert_eq!(reader.latest().unwrap().bins(), &[999.0]);
    }
}
