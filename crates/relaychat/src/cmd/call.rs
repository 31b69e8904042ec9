use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use relaychat_client::{CallController, CallState, Client, ClientError, SourceFactory};
use relaychat_frame::{Frame, MessageType};
use tracing::{info, trace};

use crate::cmd::{install_ctrlc_handler, is_idle, polling_client_config, CallArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let config = polling_client_config(&args.timeout)?;
    let mut client = Client::connect_with_config(args.addr.as_str(), &config)
        .map_err(|err| client_error("connect failed", err))?;

    let mut controller = CallController::new(client.sender(), pcm_source(args.pcm.clone()));
    let running = install_ctrlc_handler(|| {})?;

    let placed = match args.to {
        Some(target) if !args.group => controller.dial(target),
        _ => controller.dial_group(),
    };
    placed.map_err(|err| client_error("call failed", err))?;
    info!(target = args.to.unwrap_or(0), "call placed");

    while running.load(Ordering::SeqCst) {
        let frame = match client.recv() {
            Ok(frame) => frame,
            Err(err) if is_idle(&err) => continue,
            Err(ClientError::Disconnected) => {
                return Err(CliError::new(FAILURE, "relay closed the connection"));
            }
            Err(err) => return Err(client_error("receive failed", err)),
        };

        if frame.kind == MessageType::VoiceStreamChunk {
            trace!(from = frame.routing_id, size = frame.body.len(), "voice chunk");
        } else {
            print_frame(&frame, format);
        }

        let before = controller.state();
        controller
            .on_frame(&frame)
            .map_err(|err| client_error("call failed", err))?;

        if let Some(outcome) = call_outcome(before, controller.state(), &frame) {
            return outcome;
        }
    }

    if matches!(controller.state(), CallState::Calling | CallState::InCall) {
        controller
            .hang_up()
            .map_err(|err| client_error("hang up failed", err))?;
        info!("call ended locally");
    }
    Ok(SUCCESS)
}

/// Exit status once a received frame has ended the call.
fn call_outcome(before: CallState, after: CallState, frame: &Frame) -> Option<CliResult<i32>> {
    if before == after || after != CallState::Idle {
        return None;
    }
    if before == CallState::Calling && frame.kind == MessageType::CallDecline {
        return Some(Err(CliError::new(
            FAILURE,
            format!("User {} declined the call", frame.routing_id),
        )));
    }
    info!(from = frame.routing_id, "call ended");
    Some(Ok(SUCCESS))
}

fn pcm_source(path: Option<PathBuf>) -> SourceFactory {
    Box::new(move || {
        let source: Box<dyn Read + Send> = match &path {
            Some(path) => Box::new(File::open(path)?),
            None => Box::new(io::empty()),
        };
        Ok(source)
    })
}
