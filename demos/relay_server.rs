//! Relay server example
//!
//! Run with: cargo run --example relay_server [LISTENER_PORT] [WRITER_PORT] [WRITERS]
//!
//! Examples:
//!   cargo run --example relay_server                         # readers on 7000, writers on 7001
//!   cargo run --example relay_server 9000 9001               # custom ports
//!   cargo run --example relay_server 9000 9001 host:5000,host:5001
//!
//! ## Try it
//!
//!   nc localhost 7001            # subscriber, prints everything relayed
//!   nc localhost 7000            # reader, type lines to relay them
//!
//! Set `UPPERCASE=1` to relay every chunk upper-cased.

use bytes::Bytes;

use splitter::server::parse_writer_list;
use splitter::{RelayConfig, RelayServer};

const DEFAULT_LISTENER_PORT: u16 = 7000;
const DEFAULT_WRITER_PORT: u16 = 7001;

fn parse_port(arg: Option<&String>, default: u16) -> Result<u16, String> {
    match arg {
        Some(value) => value
            .parse::<u16>()
            .map_err(|_| format!("Invalid port: '{}'", value)),
        None => Ok(default),
    }
}

fn print_usage() {
    eprintln!("Usage: relay_server [LISTENER_PORT] [WRITER_PORT] [WRITERS]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  LISTENER_PORT  Port accepting reader connections (default: 7000)");
    eprintln!("  WRITER_PORT    Port accepting subscriber connections (default: 7001)");
    eprintln!("  WRITERS        Comma-separated host:port list dialed at startup");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let ports = parse_port(args.get(1), DEFAULT_LISTENER_PORT)
        .and_then(|listener| Ok((listener, parse_port(args.get(2), DEFAULT_WRITER_PORT)?)));
    let (listener_port, writer_port) = match ports {
        Ok(ports) => ports,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };
    let writers = args
        .get(3)
        .map(|list| parse_writer_list(list))
        .unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("splitter=info".parse()?)
                .add_directive("relay_server=info".parse()?),
        )
        .init();

    tracing::info!(version = splitter::VERSION, "Splitter booting");

    let config = RelayConfig::with_ports(listener_port, writer_port).default_writers(writers);

    let server = match RelayServer::bind(config).await {
        Ok(server) => server,
        Err(e) if e.is_fatal() => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let server = if std::env::var_os("UPPERCASE").is_some() {
        server.with_transform(|chunk: Bytes| Bytes::from(chunk.to_ascii_uppercase()))
    } else {
        server
    };

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to install ctrl-c handler");
            }
        })
        .await?;

    Ok(())
}
