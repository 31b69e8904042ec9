use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Args, Subcommand, ValueEnum};
use relaychat_client::{ClientConfig, ClientError};
use relaychat_frame::{FrameConfig, FrameError, MessageType, DEFAULT_MAX_BODY};
use relaychat_transport::DEFAULT_BIND_ADDR;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod listen;
pub mod send;
pub mod serve;
pub mod version;

/// How often blocking receive loops wake up to check for Ctrl-C.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Connect and print received frames.
    Listen(ListenArgs),
    /// Place a call and print signalling until it ends.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "RELAYCHAT_BIND", default_value = DEFAULT_BIND_ADDR)]
    pub bind: String,
    /// Drop connections that send nothing for this long (e.g. 30s, 500ms).
    #[arg(long, env = "RELAYCHAT_READ_TIMEOUT")]
    pub read_timeout: Option<String>,
    /// Drop connections whose writes stall for this long.
    #[arg(long, env = "RELAYCHAT_WRITE_TIMEOUT")]
    pub write_timeout: Option<String>,
    /// Largest accepted frame body in bytes. Larger frames disconnect the
    /// sender; the protocol allows up to 2147483647.
    #[arg(long, env = "RELAYCHAT_MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY)]
    pub max_body_size: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FileKind {
    Image,
    Audio,
}

impl From<FileKind> for MessageType {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Image => MessageType::Image,
            FileKind::Audio => MessageType::Audio,
        }
    }
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("body").required(true).args(["text", "file"])))]
pub struct SendArgs {
    /// Relay address (host:port).
    pub addr: String,
    /// Recipient identity; 0 sends to everyone.
    #[arg(long, default_value_t = 0)]
    pub to: i32,
    /// Text message.
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,
    /// Send a file as an image or voice clip.
    #[arg(long, conflicts_with = "text")]
    pub file: Option<PathBuf>,
    /// Message type for --file.
    #[arg(long, value_enum, default_value = "image", requires = "file")]
    pub kind: FileKind,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Relay address (host:port).
    pub addr: String,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["to", "group"])))]
pub struct CallArgs {
    /// Relay address (host:port).
    pub addr: String,
    /// Identity to call.
    #[arg(long, conflicts_with = "group")]
    pub to: Option<i32>,
    /// Start a group call with everyone connected.
    #[arg(long)]
    pub group: bool,
    /// Raw 16 kHz mono PCM to stream once the call connects.
    #[arg(long, value_name = "FILE")]
    pub pcm: Option<PathBuf>,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn parse_optional_duration(input: Option<&str>) -> CliResult<Option<Duration>> {
    input.map(parse_duration).transpose()
}

/// Client settings for commands that sit in a receive loop: reads wake up
/// every [`POLL_INTERVAL`] so Ctrl-C is noticed.
pub(crate) fn polling_client_config(connect_timeout: &str) -> CliResult<ClientConfig> {
    Ok(ClientConfig {
        frame: FrameConfig {
            read_timeout: Some(POLL_INTERVAL),
            ..FrameConfig::default()
        },
        connect_timeout: parse_duration(connect_timeout)?,
    })
}

/// True for a read that timed out with nothing received.
pub(crate) fn is_idle(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::Frame(FrameError::Io(io))
            if matches!(io.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
    )
}

/// Clears the returned flag on Ctrl-C.
pub(crate) fn install_ctrlc_handler(
    on_signal: impl Fn() + Send + 'static,
) -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
        on_signal();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}
