use std::fs;

use relaychat_client::{Client, ClientConfig};
use relaychat_frame::MessageType;
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{client_error, io_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let (kind, body) = resolve_body(&args)?;
    let config = ClientConfig {
        connect_timeout: parse_duration(&args.timeout)?,
        ..ClientConfig::default()
    };

    let client = Client::connect_with_config(args.addr.as_str(), &config)
        .map_err(|err| client_error("connect failed", err))?;
    client
        .send(kind, args.to, &body)
        .map_err(|err| client_error("send failed", err))?;
    debug!(kind = %kind, target = args.to, size = body.len(), "frame sent");

    client
        .close()
        .map_err(|err| client_error("close failed", err))?;
    Ok(SUCCESS)
}

fn resolve_body(args: &SendArgs) -> CliResult<(MessageType, Vec<u8>)> {
    if let Some(text) = &args.text {
        return Ok((MessageType::Text, text.as_bytes().to_vec()));
    }
    if let Some(path) = &args.file {
        let body = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return Ok((args.kind.into(), body));
    }
    Err(CliError::new(USAGE, "one of --text or --file is required"))
}
