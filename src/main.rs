use clap::Parser;
use gribi::{DeviceOptions, GribiDevice};
use slog::Drain;
use std::error::Error;
use std::net::SocketAddr;

/// Runs a standalone gRIBI device that clients can program.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:9340")]
    listen: SocketAddr,

    #[arg(long, default_value = "DEFAULT")]
    default_network_instance: String,

    /// Acknowledge operations one by one, in reverse order.
    #[arg(long)]
    reorder_acks: bool,

    /// Log every message on the wire.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let logger = create_root_logger(args.verbose);

    let options = DeviceOptions {
        default_network_instance: args.default_network_instance,
        reorder_acknowledgements: args.reorder_acks,
    };
    let device = GribiDevice::spawn(logger.clone(), args.listen, options).await?;
    slog::info!(logger, "Device ready at {}", device.target());

    tokio::signal::ctrl_c().await?;
    slog::info!(logger, "Shutting down");
    drop(device);

    Ok(())
}

fn create_root_logger(verbose: bool) -> slog::Logger {
    let level = if verbose { slog::Level::Debug } else { slog::Level::Info };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
