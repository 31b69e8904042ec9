use relaychat_frame::FrameConfig;
use relaychat_server::{RelayServer, ServerConfig};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_optional_duration, ServeArgs};
use crate::exit::{server_error, CliResult, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let config = server_config(&args)?;
    let server = RelayServer::bind(config).map_err(|err| server_error("bind failed", err))?;

    let handle = server.shutdown_handle();
    install_ctrlc_handler(move || handle.shutdown())?;

    info!(addr = %server.local_addr(), "listening");
    server
        .run()
        .map_err(|err| server_error("relay failed", err))?;

    Ok(SUCCESS)
}

fn server_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    Ok(ServerConfig {
        frame: FrameConfig {
            max_body_size: args.max_body_size,
            read_timeout: parse_optional_duration(args.read_timeout.as_deref())?,
            write_timeout: parse_optional_duration(args.write_timeout.as_deref())?,
        },
        ..ServerConfig::with_bind_addr(args.bind.clone())
    })
}
