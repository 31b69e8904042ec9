use std::io::Read;

use relaychat_frame::Frame;
use tracing::{info, warn};

use crate::call::{CallAction, CallSession, CallState};
use crate::client::ClientSender;
use crate::error::{ClientError, Result};
use crate::voice::VoiceStreamer;

/// Opens a fresh PCM source each time a call starts streaming.
pub type SourceFactory = Box<dyn FnMut() -> std::io::Result<Box<dyn Read + Send>> + Send>;

/// Drives a [`CallSession`] against a live connection.
///
/// Every transition's actions are carried out immediately: signals go out
/// through the shared sender and the voice loop is started or stopped.
pub struct CallController {
    session: CallSession,
    sender: ClientSender,
    open_source: SourceFactory,
    streamer: Option<VoiceStreamer>,
}

impl CallController {
    pub fn new(sender: ClientSender, open_source: SourceFactory) -> Self {
        Self {
            session: CallSession::new(),
            sender,
            open_source,
            streamer: None,
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn state(&self) -> CallState {
        self.session.state()
    }

    pub fn is_streaming(&self) -> bool {
        self.streamer.as_ref().is_some_and(VoiceStreamer::is_running)
    }

    pub fn dial(&mut self, target: i32) -> Result<()> {
        let actions = self.session.dial(target)?;
        self.apply(actions)
    }

    pub fn dial_group(&mut self) -> Result<()> {
        let actions = self.session.dial_group()?;
        self.apply(actions)
    }

    pub fn answer(&mut self) -> Result<()> {
        let actions = self.session.answer()?;
        self.apply(actions)
    }

    pub fn reject(&mut self) -> Result<()> {
        let actions = self.session.reject()?;
        self.apply(actions)
    }

    pub fn hang_up(&mut self) -> Result<()> {
        let actions = self.session.hang_up()?;
        self.apply(actions)
    }

    /// Feed a received frame through the session.
    pub fn on_frame(&mut self, frame: &Frame) -> Result<()> {
        let actions = self.session.on_frame(frame);
        self.apply(actions)
    }

    fn apply(&mut self, actions: Vec<CallAction>) -> Result<()> {
        for action in actions {
            match action {
                CallAction::Signal { kind, target } => self.sender.send_signal(kind, target)?,
                CallAction::StartStreaming { target } => {
                    self.stop_streaming();
                    let source = (self.open_source)().map_err(ClientError::VoiceSource)?;
                    self.streamer = Some(VoiceStreamer::start(self.sender.clone(), target, source)?);
                    info!(target, "voice streaming started");
                }
                CallAction::StopStreaming => self.stop_streaming(),
            }
        }
        Ok(())
    }

    fn stop_streaming(&mut self) {
        if let Some(streamer) = self.streamer.take() {
            match streamer.stop() {
                Ok(chunks) => info!(chunks, "voice streaming stopped"),
                Err(err) => warn!(error = %err, "voice stream ended with error"),
            }
        }
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use relaychat_frame::{FrameReader, MessageType};
    use relaychat_transport::{RelayStream, TcpTransport};

    use super::*;
    use crate::client::Client;

    fn pair() -> (Client, FrameReader<RelayStream>) {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let client = Client::connect(listener.local_addr()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        (client, FrameReader::new(stream))
    }

    fn one_chunk() -> SourceFactory {
        Box::new(|| Ok(Box::new(Cursor::new(vec![3u8; 64])) as Box<dyn Read + Send>))
    }

    #[test]
    fn answering_sends_accept_then_streams() {
        let (client, mut relay) = pair();
        let mut controller = CallController::new(client.sender(), one_chunk());

        controller
            .on_frame(&Frame::signal(MessageType::CallRequest, 4))
            .unwrap();
        assert_eq!(controller.state(), CallState::Ringing);
        controller.answer().unwrap();

        assert_eq!(
            relay.read_frame().unwrap(),
            Frame::signal(MessageType::CallAccept, 4)
        );
        let chunk = relay.read_frame().unwrap();
        assert_eq!(chunk.kind, MessageType::VoiceStreamChunk);
        assert_eq!(chunk.routing_id, 4);
        assert_eq!(chunk.body.len(), 64);

        controller
            .on_frame(&Frame::signal(MessageType::CallEnd, 4))
            .unwrap();
        assert_eq!(controller.state(), CallState::Idle);
        assert!(!controller.is_streaming());
    }

    #[test]
    fn dial_then_hang_up_sends_request_and_end() {
        let (client, mut relay) = pair();
        let mut controller = CallController::new(client.sender(), one_chunk());

        controller.dial(2).unwrap();
        controller.hang_up().unwrap();

        assert_eq!(
            relay.read_frame().unwrap(),
            Frame::signal(MessageType::CallRequest, 2)
        );
        assert_eq!(
            relay.read_frame().unwrap(),
            Frame::signal(MessageType::CallEnd, 2)
        );
        assert!(controller.answer().is_err());
    }

    #[test]
    fn source_failure_is_reported() {
        let (client, _relay) = pair();
        let failing: SourceFactory = Box::new(|| Err(std::io::ErrorKind::NotFound.into()));
        let mut controller = CallController::new(client.sender(), failing);

        assert!(matches!(
            controller.dial_group(),
            Err(ClientError::VoiceSource(_))
        ));
    }
}
