//! Stock price TCP server.
//!
//! Parses the command line, starts a [`StockServer`] and runs until Ctrl+C. See
//! `stock_server --help` for the options; `RUST_LOG` is honored on top of `--log-level`.
use clap::Parser;
use crossbeam_channel::bounded;
use log::{LevelFilter, info};
use stock_common::{Result, StockError};
use stock_server::{Args, StockServer};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);
    log::debug!("Command line options: {:?}", args);

    let mut server = StockServer::new(args.into_config()).start()?;

    let (stop_tx, stop_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .map_err(|e| StockError::Signal(e.to_string()))?;

    info!("Press Ctrl+C to stop");
    let _ = stop_rx.recv();
    server.shutdown();
    Ok(())
}

fn init_logger(level: &str) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}
