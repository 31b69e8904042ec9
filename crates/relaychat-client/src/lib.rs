//! Blocking client for a relaychat relay.
//!
//! [`Client`] sends and receives frames. [`CallSession`] tracks call
//! signalling without doing I/O, and [`CallController`] wires it to a
//! connection and a [`VoiceStreamer`].

pub mod call;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod voice;

pub use call::{CallAction, CallSession, CallState, IncomingCall};
pub use client::{connect, Client, ClientReceiver, ClientSender};
pub use config::{ClientConfig, DEFAULT_CONNECT_TIMEOUT};
pub use controller::{CallController, SourceFactory};
pub use error::{ClientError, Result};
pub use voice::{VoiceStreamer, VOICE_CHUNK_SIZE};
