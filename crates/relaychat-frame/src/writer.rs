use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use relaychat_transport::RelayStream;
use tracing::debug;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::kind::MessageType;
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Each frame is encoded into an internal buffer and written in full before
/// the call returns, so a writer behind a lock never leaves half a frame on
/// the wire for another sender to interleave with.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.kind, frame.routing_id, frame.body.as_ref())
    }

    /// Encode and send one frame.
    ///
    /// A timed-out write (`WouldBlock`/`TimedOut` with a write timeout set)
    /// is reported as an I/O error; the stream is unusable afterwards since
    /// part of the frame may already be on the wire.
    pub fn send(&mut self, kind: MessageType, routing_id: i32, body: &[u8]) -> Result<()> {
        if body.len() > self.config.max_body_size {
            return Err(FrameError::BodyTooLarge {
                size: body.len(),
                max: self.config.max_body_size,
            });
        }

        self.buf.clear();
        encode_frame(kind, routing_id, body, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
                        debug!(
                            written = offset,
                            total = self.buf.len(),
                            "frame write timed out"
                        );
                    }
                    return Err(FrameError::Io(err));
                }
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<RelayStream> {
    /// Create a frame writer for `RelayStream` and apply write timeout from config.
    pub fn with_config_tcp(inner: RelayStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_frame, Frame};

    fn written_frames(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<Frame> {
        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let mut frames = Vec::new();
        while let Some(frame) = decode_frame(&mut wire, usize::MAX).unwrap() {
            frames.push(frame);
        }
        assert!(wire.is_empty(), "trailing bytes after last frame");
        frames
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(MessageType::Text, 2, b"hello").unwrap();

        let frames = written_frames(writer);
        assert_eq!(frames, vec![Frame::text(2, "hello")]);
    }

    #[test]
    fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(MessageType::Text, 0, b"one").unwrap();
        writer.send(MessageType::CallEnd, 3, b"").unwrap();
        writer
            .write_frame(&Frame::new(MessageType::Audio, 1, vec![1u8, 2, 3]))
            .unwrap();

        let frames = written_frames(writer);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].body.as_ref(), b"one");
        assert_eq!(frames[1], Frame::signal(MessageType::CallEnd, 3));
        assert_eq!(frames[2].body.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn body_too_large_rejected() {
        let cfg = FrameConfig {
            max_body_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send(MessageType::Image, 1, b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::BodyTooLarge { .. }));
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send(MessageType::Text, 1, b"x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = FaultyWriter {
            write_fault: Some(ErrorKind::Interrupted),
            flush_fault: Some(ErrorKind::Interrupted),
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.send(MessageType::Text, 5, b"retry").unwrap();

        let inner = writer.into_inner();
        assert_eq!(inner.data.len(), crate::codec::HEADER_SIZE + 5);
    }

    #[test]
    fn write_timeout_is_reported() {
        let writer_impl = FaultyWriter {
            write_fault: Some(ErrorKind::WouldBlock),
            flush_fault: None,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        let err = writer.send(MessageType::Text, 6, b"late").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(MessageType::Text, 1, b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn written_bytes_decode_with_reader() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(MessageType::GroupCallRequest, 0, b"").unwrap();

        let wire = writer.into_inner().into_inner();
        let mut framed = crate::reader::FrameReader::new(Cursor::new(wire));
        let frame = framed.read_frame().unwrap();
        assert_eq!(frame, Frame::signal(MessageType::GroupCallRequest, 0));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FaultyWriter {
        write_fault: Option<ErrorKind>,
        flush_fault: Option<ErrorKind>,
        data: Vec<u8>,
    }

    impl Write for FaultyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.write_fault.take() {
                return Err(std::io::Error::from(kind));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if let Some(kind) = self.flush_fault.take() {
                return Err(std::io::Error::from(kind));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
