//! Client-side call signalling.
//!
//! [`CallSession`] does no I/O. Local actions and incoming call-control
//! frames move it between states and return the [`CallAction`]s the caller
//! must carry out: frames to send and when to start or stop the voice loop.
//!
//! Incoming signals never fail. A signal that does not fit the current
//! state (a duplicate accept, an end for a call already over, a request
//! while busy) is ignored, so the relay's at-most-once, possibly repeated
//! delivery cannot corrupt the session.

use std::fmt;

use relaychat_frame::{Frame, MessageType, BROADCAST};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Where a session is in the call lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// We sent a call request and wait for an answer.
    Calling,
    /// Someone called us and we have not answered.
    Ringing,
    InCall,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "idle",
            CallState::Calling => "calling",
            CallState::Ringing => "ringing",
            CallState::InCall => "in a call",
        };
        f.write_str(name)
    }
}

/// Side effect requested by a [`CallSession`] transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    /// Send an empty-bodied call-control frame to `target`.
    Signal { kind: MessageType, target: i32 },
    /// Start sending voice chunks to `target` (0 streams to everyone).
    StartStreaming { target: i32 },
    StopStreaming,
}

/// A call offered to us and not yet answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingCall {
    pub caller: i32,
    pub group: bool,
}

/// Call state for one client.
#[derive(Debug, Clone)]
pub struct CallSession {
    state: CallState,
    current_target: i32,
    incoming: Option<IncomingCall>,
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            state: CallState::Idle,
            current_target: BROADCAST,
            incoming: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Peer the active or pending call is with; 0 for a group call or when
    /// idle.
    pub fn current_target(&self) -> i32 {
        self.current_target
    }

    /// The unanswered call while [`CallState::Ringing`].
    pub fn incoming(&self) -> Option<IncomingCall> {
        self.incoming
    }

    /// Call one peer.
    pub fn dial(&mut self, target: i32) -> Result<Vec<CallAction>> {
        self.require(CallState::Idle, "dial")?;
        if target <= 0 {
            return Err(ClientError::InvalidTarget(target));
        }
        self.enter(CallState::Calling, target);
        Ok(vec![signal(MessageType::CallRequest, target)])
    }

    /// Start a group call. The caller streams to everyone right away and
    /// does not wait for anyone to accept.
    pub fn dial_group(&mut self) -> Result<Vec<CallAction>> {
        self.require(CallState::Idle, "start a group call")?;
        self.enter(CallState::InCall, BROADCAST);
        Ok(vec![
            signal(MessageType::GroupCallRequest, BROADCAST),
            CallAction::StartStreaming { target: BROADCAST },
        ])
    }

    /// Accept the ringing call.
    pub fn answer(&mut self) -> Result<Vec<CallAction>> {
        let incoming = self.ringing("answer")?;
        let target = if incoming.group {
            BROADCAST
        } else {
            incoming.caller
        };
        self.enter(CallState::InCall, target);
        Ok(vec![
            signal(MessageType::CallAccept, incoming.caller),
            CallAction::StartStreaming { target },
        ])
    }

    /// Decline the ringing call.
    pub fn reject(&mut self) -> Result<Vec<CallAction>> {
        let incoming = self.ringing("reject")?;
        self.enter(CallState::Idle, BROADCAST);
        Ok(vec![signal(MessageType::CallDecline, incoming.caller)])
    }

    /// End an outgoing or active call.
    pub fn hang_up(&mut self) -> Result<Vec<CallAction>> {
        let was_streaming = match self.state {
            CallState::Calling => false,
            CallState::InCall => true,
            state => {
                return Err(ClientError::InvalidCallState {
                    action: "hang up",
                    state,
                })
            }
        };
        let target = self.current_target;
        self.enter(CallState::Idle, BROADCAST);

        let mut actions = vec![signal(MessageType::CallEnd, target)];
        if was_streaming {
            actions.push(CallAction::StopStreaming);
        }
        Ok(actions)
    }

    /// Apply a frame received from the relay.
    ///
    /// Frames that are not call control are ignored.
    pub fn on_frame(&mut self, frame: &Frame) -> Vec<CallAction> {
        self.on_signal(frame.kind, frame.routing_id)
    }

    /// Apply a call-control signal sent by `from`.
    pub fn on_signal(&mut self, kind: MessageType, from: i32) -> Vec<CallAction> {
        let before = self.state;
        let actions = match (kind, self.state) {
            (MessageType::CallRequest, CallState::Idle) => {
                self.ring(from, false);
                Vec::new()
            }
            (MessageType::GroupCallRequest, CallState::Idle) => {
                self.ring(from, true);
                Vec::new()
            }
            (MessageType::CallAccept, CallState::Calling) if from == self.current_target => {
                self.state = CallState::InCall;
                vec![CallAction::StartStreaming {
                    target: self.current_target,
                }]
            }
            (MessageType::CallDecline, CallState::Calling) if from == self.current_target => {
                self.enter(CallState::Idle, BROADCAST);
                Vec::new()
            }
            (MessageType::CallEnd, CallState::Calling) if from == self.current_target => {
                self.enter(CallState::Idle, BROADCAST);
                Vec::new()
            }
            (MessageType::CallEnd, CallState::Ringing) if self.is_incoming_from(from) => {
                self.enter(CallState::Idle, BROADCAST);
                Vec::new()
            }
            // In a group call any participant hanging up ends it for us too.
            (MessageType::CallDecline | MessageType::CallEnd, CallState::InCall)
                if self.current_target == from
                    || (self.current_target == BROADCAST && kind == MessageType::CallEnd) =>
            {
                self.enter(CallState::Idle, BROADCAST);
                vec![CallAction::StopStreaming]
            }
            _ => Vec::new(),
        };

        if self.state != before {
            debug!(signal = %kind, from, from_state = %before, to_state = %self.state, "call state changed");
        }
        actions
    }

    fn require(&self, state: CallState, action: &'static str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(ClientError::InvalidCallState {
                action,
                state: self.state,
            })
        }
    }

    fn ringing(&self, action: &'static str) -> Result<IncomingCall> {
        match (self.state, self.incoming) {
            (CallState::Ringing, Some(incoming)) => Ok(incoming),
            (state, _) => Err(ClientError::InvalidCallState { action, state }),
        }
    }

    fn ring(&mut self, caller: i32, group: bool) {
        self.state = CallState::Ringing;
        self.current_target = if group { BROADCAST } else { caller };
        self.incoming = Some(IncomingCall { caller, group });
    }

    fn is_incoming_from(&self, from: i32) -> bool {
        self.incoming.is_some_and(|incoming| incoming.caller == from)
    }

    fn enter(&mut self, state: CallState, target: i32) {
        self.state = state;
        self.current_target = target;
        self.incoming = None;
    }
}

fn signal(kind: MessageType, target: i32) -> CallAction {
    CallAction::Signal { kind, target }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ringing_from(caller: i32, group: bool) -> CallSession {
        let mut session = CallSession::new();
        let kind = if group {
            MessageType::GroupCallRequest
        } else {
            MessageType::CallRequest
        };
        assert!(session.on_signal(kind, caller).is_empty());
        assert_eq!(session.state(), CallState::Ringing);
        session
    }

    #[test]
    fn direct_call_happy_path() {
        let mut caller = CallSession::new();
        assert_eq!(
            caller.dial(2).unwrap(),
            vec![signal(MessageType::CallRequest, 2)]
        );
        assert_eq!(caller.state(), CallState::Calling);
        assert_eq!(caller.current_target(), 2);

        let mut callee = ringing_from(1, false);
        assert_eq!(
            callee.incoming(),
            Some(IncomingCall {
                caller: 1,
                group: false
            })
        );
        assert_eq!(
            callee.answer().unwrap(),
            vec![
                signal(MessageType::CallAccept, 1),
                CallAction::StartStreaming { target: 1 },
            ]
        );
        assert_eq!(callee.state(), CallState::InCall);

        assert_eq!(
            caller.on_signal(MessageType::CallAccept, 2),
            vec![CallAction::StartStreaming { target: 2 }]
        );
        assert_eq!(caller.state(), CallState::InCall);

        assert_eq!(
            caller.hang_up().unwrap(),
            vec![
                signal(MessageType::CallEnd, 2),
                CallAction::StopStreaming
            ]
        );
        assert_eq!(
            callee.on_signal(MessageType::CallEnd, 1),
            vec![CallAction::StopStreaming]
        );
        assert_eq!(caller.state(), CallState::Idle);
        assert_eq!(callee.state(), CallState::Idle);
        assert_eq!(callee.current_target(), 0);
    }

    #[test]
    fn declined_call_returns_caller_to_idle() {
        let mut caller = CallSession::new();
        caller.dial(5).unwrap();

        let mut callee = ringing_from(1, false);
        assert_eq!(
            callee.reject().unwrap(),
            vec![signal(MessageType::CallDecline, 1)]
        );
        assert_eq!(callee.state(), CallState::Idle);
        assert_eq!(callee.incoming(), None);

        assert!(caller.on_signal(MessageType::CallDecline, 5).is_empty());
        assert_eq!(caller.state(), CallState::Idle);
        assert_eq!(caller.current_target(), 0);
    }

    #[test]
    fn group_caller_streams_immediately() {
        let mut session = CallSession::new();
        assert_eq!(
            session.dial_group().unwrap(),
            vec![
                signal(MessageType::GroupCallRequest, 0),
                CallAction::StartStreaming { target: 0 },
            ]
        );
        assert_eq!(session.state(), CallState::InCall);

        // Accepts from participants arrive after streaming began.
        assert!(session.on_signal(MessageType::CallAccept, 2).is_empty());
        assert!(session.on_signal(MessageType::CallAccept, 3).is_empty());
        assert_eq!(session.state(), CallState::InCall);
    }

    #[test]
    fn answering_group_call_streams_to_everyone() {
        let mut session = ringing_from(4, true);
        assert_eq!(
            session.answer().unwrap(),
            vec![
                signal(MessageType::CallAccept, 4),
                CallAction::StartStreaming { target: 0 },
            ]
        );
        assert_eq!(session.current_target(), 0);

        // Someone else declining does not end a group call.
        assert!(session.on_signal(MessageType::CallDecline, 7).is_empty());
        assert_eq!(session.state(), CallState::InCall);

        assert_eq!(
            session.on_signal(MessageType::CallEnd, 9),
            vec![CallAction::StopStreaming]
        );
        assert_eq!(session.state(), CallState::Idle);
    }

    #[test]
    fn duplicate_signals_are_idempotent() {
        let mut session = CallSession::new();
        session.dial(2).unwrap();

        let first = session.on_signal(MessageType::CallAccept, 2);
        assert_eq!(first, vec![CallAction::StartStreaming { target: 2 }]);
        assert!(session.on_signal(MessageType::CallAccept, 2).is_empty());

        assert_eq!(
            session.on_signal(MessageType::CallEnd, 2),
            vec![CallAction::StopStreaming]
        );
        assert!(session.on_signal(MessageType::CallEnd, 2).is_empty());
        assert!(session.on_signal(MessageType::CallDecline, 2).is_empty());
        assert_eq!(session.state(), CallState::Idle);
    }

    #[test]
    fn busy_session_ignores_new_requests() {
        let mut session = CallSession::new();
        session.dial(2).unwrap();
        assert!(session.on_signal(MessageType::CallRequest, 3).is_empty());
        assert!(session.on_signal(MessageType::GroupCallRequest, 4).is_empty());
        assert_eq!(session.state(), CallState::Calling);
        assert_eq!(session.current_target(), 2);

        let mut ringing = ringing_from(1, false);
        assert!(ringing.on_signal(MessageType::CallRequest, 3).is_empty());
        assert_eq!(ringing.incoming().unwrap().caller, 1);
    }

    #[test]
    fn signals_from_other_peers_do_not_affect_direct_call() {
        let mut session = CallSession::new();
        session.dial(2).unwrap();
        assert!(session.on_signal(MessageType::CallAccept, 3).is_empty());
        assert!(session.on_signal(MessageType::CallDecline, 3).is_empty());
        assert_eq!(session.state(), CallState::Calling);

        session.on_signal(MessageType::CallAccept, 2);
        assert!(session.on_signal(MessageType::CallEnd, 3).is_empty());
        assert_eq!(session.state(), CallState::InCall);
    }

    #[test]
    fn caller_giving_up_stops_ringing() {
        let mut session = ringing_from(6, false);
        assert!(session.on_signal(MessageType::CallEnd, 8).is_empty());
        assert_eq!(session.state(), CallState::Ringing);

        assert!(session.on_signal(MessageType::CallEnd, 6).is_empty());
        assert_eq!(session.state(), CallState::Idle);
        assert!(session.answer().is_err());
    }

    #[test]
    fn local_actions_check_state() {
        let mut session = CallSession::new();
        assert!(matches!(
            session.answer(),
            Err(ClientError::InvalidCallState {
                state: CallState::Idle,
                ..
            })
        ));
        assert!(session.reject().is_err());
        assert!(session.hang_up().is_err());
        assert!(matches!(session.dial(0), Err(ClientError::InvalidTarget(0))));
        assert!(matches!(session.dial(-3), Err(ClientError::InvalidTarget(-3))));

        session.dial(2).unwrap();
        assert!(session.dial(3).is_err());
        assert!(session.dial_group().is_err());

        // Hanging up before an answer sends the end without stopping a stream.
        assert_eq!(
            session.hang_up().unwrap(),
            vec![signal(MessageType::CallEnd, 2)]
        );
    }

    #[test]
    fn non_call_frames_are_ignored() {
        let mut session = ringing_from(1, false);
        assert!(session.on_frame(&Frame::text(1, "hello")).is_empty());
        assert!(session.on_frame(&Frame::system_text("notice")).is_empty());
        assert_eq!(session.state(), CallState::Ringing);

        assert!(session
            .on_frame(&Frame::signal(MessageType::CallEnd, 1))
            .is_empty());
        assert_eq!(session.state(), CallState::Idle);
    }

    #[test]
    fn invalid_state_error_reads_naturally() {
        let err = CallSession::new().hang_up().unwrap_err();
        assert_eq!(err.to_string(), "cannot hang up while idle");
    }
}
