use std::sync::atomic::Ordering;

use relaychat_client::{Client, ClientError};

use crate::cmd::{install_ctrlc_handler, is_idle, polling_client_config, ListenArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = polling_client_config(&args.timeout)?;
    let mut client = Client::connect_with_config(args.addr.as_str(), &config)
        .map_err(|err| client_error("connect failed", err))?;

    let running = install_ctrlc_handler(|| {})?;
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let frame = match client.recv() {
            Ok(frame) => frame,
            Err(err) if is_idle(&err) => continue,
            Err(ClientError::Disconnected) => break,
            Err(err) => return Err(client_error("receive failed", err)),
        };

        print_frame(&frame, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    Ok(SUCCESS)
}
