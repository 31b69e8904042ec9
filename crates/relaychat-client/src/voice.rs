use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use relaychat_frame::MessageType;
use tracing::{debug, warn};

use crate::client::ClientSender;
use crate::error::{ClientError, Result};

/// Bytes of raw PCM per voice frame.
pub const VOICE_CHUNK_SIZE: usize = 4096;

/// Sends voice chunks from a PCM source on a background thread.
///
/// Audio capture is outside this crate: anything that implements [`Read`]
/// can feed the stream, whether a microphone adapter, a file or a pipe.
/// The loop ends when the source is exhausted, a send fails or
/// [`VoiceStreamer::stop`] is called.
pub struct VoiceStreamer {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<u64>>>,
}

impl VoiceStreamer {
    /// Start streaming `source` to `target` (0 for everyone).
    pub fn start<R>(sender: ClientSender, target: i32, source: R) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("relay-voice".to_string())
            .spawn(move || stream_chunks(&sender, target, source, &flag))
            .map_err(ClientError::Spawn)?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// False once the loop has ended or been asked to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop after the chunk in flight and return how many chunks were sent.
    ///
    /// A source blocked in `read` delays the stop until it returns.
    pub fn stop(mut self) -> Result<u64> {
        self.running.store(false, Ordering::SeqCst);
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            },
            None => Ok(0),
        }
    }
}

impl Drop for VoiceStreamer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn stream_chunks<R: Read>(
    sender: &ClientSender,
    target: i32,
    mut source: R,
    running: &AtomicBool,
) -> Result<u64> {
    let mut chunk = vec![0u8; VOICE_CHUNK_SIZE];
    let mut sent = 0u64;

    while running.load(Ordering::SeqCst) {
        let len = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(error = %err, "voice source failed");
                running.store(false, Ordering::SeqCst);
                return Err(ClientError::VoiceSource(err));
            }
        };

        if let Err(err) = sender.send(MessageType::VoiceStreamChunk, target, &chunk[..len]) {
            running.store(false, Ordering::SeqCst);
            return Err(err);
        }
        sent += 1;
    }

    running.store(false, Ordering::SeqCst);
    debug!(target, chunks = sent, "voice stream ended");
    Ok(sent)
}
