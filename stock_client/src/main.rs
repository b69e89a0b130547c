//! Stock Client — a TCP client that subscribes to live stock prices and prints every
//! message the server pushes to stdout. Symbols come from `--symbols`, from a text file
//! given with `--path`, or both. The client keeps the connection alive with periodic
//! `Ping`s and runs until the server closes the connection or Ctrl+C is pressed.
//!
//! Usage example (CLI):
//! ```bash
//! stock_client --server 192.168.0.10:8080 --symbols AAPL,MSFT --list
//! ```
//!
//! The symbols file should contain symbols separated by commas, spaces, or new lines.
#![warn(missing_docs)]
mod args;
mod model;
mod sender;

use crate::args::Args;
use crate::model::display::render;
use crate::sender::CommandSender;
use chrono::Local;
use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::{Shutdown, TcpStream};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use stock_common::symbol::{SymbolParser, parse_symbol_list};
use stock_common::{Request, Result, ServerMessage, Status, StockError, Symbol};

/// Reads server lines from `stream` and prints them until the connection closes or
/// `shutdown` is set.
fn start_receiver_loop(stream: TcpStream, shutdown: Arc<AtomicBool>) -> Result<()> {
    info!("Receiving from {}", stream.peer_addr()?);
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) if shutdown.load(Ordering::Relaxed) => {
                debug!("Read interrupted by shutdown: {}", e);
                break;
            }
            Err(e) => {
                error!("Receive data error: {}", e);
                return Err(StockError::Io(e));
            }
        };
        match ServerMessage::from_line(&line) {
            // Acks of Subscribe and Ping carry nothing worth printing.
            Ok(message) if message == ServerMessage::ok(Status::Ok) => {
                debug!("{}", render(&message, &Local::now()));
            }
            Ok(message) => println!("{}", render(&message, &Local::now())),
            Err(_) => debug!("Received non-JSON message: {}", line),
        }
    }
    info!("Receiver loop stopping...");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);

    let symbols = collect_symbols(&args)?;
    if symbols.is_empty() && !args.list {
        warn!("Nothing to do: pass --symbols, --path or --list");
        return Ok(());
    }
    info!("Symbols: {:?}", symbols);

    info!("Connecting to TCP server at {}", args.server);
    let mut stream = TcpStream::connect(&args.server)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let stream = stream.try_clone()?;
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down client...");
            shutdown.store(true, Ordering::SeqCst);
            let _ = stream.shutdown(Shutdown::Both);
        })
        .map_err(|e| StockError::Signal(e.to_string()))?;
    }

    if args.list {
        CommandSender::send_request(&mut stream, &Request::ListAll)?;
    }
    for symbol in &symbols {
        CommandSender::send_request(
            &mut stream,
            &Request::Subscribe {
                symbol: symbol.clone(),
            },
        )?;
    }

    if args.ping_interval_ms > 0 {
        CommandSender::start_ping_thread(
            stream.try_clone()?,
            Duration::from_millis(args.ping_interval_ms),
            shutdown.clone(),
        );
    }

    info!("Client is running. Press Ctrl+C to exit.");
    start_receiver_loop(stream, shutdown)
}

fn init_logger(level: &str) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Symbols from `--symbols` followed by those from `--path`, without duplicates.
fn collect_symbols(args: &Args) -> Result<Vec<Symbol>> {
    let mut symbols = match &args.symbols {
        Some(raw) => parse_symbol_list(raw)?,
        None => Vec::new(),
    };
    if let Some(path) = args.normalized_path() {
        if !path.is_file() {
            return Err(StockError::ParseSymbolsFile(format!(
                "{} is not a file",
                path.display()
            )));
        }
        let file = File::open(&path)?;
        for symbol in Symbol::parse_from_file(BufReader::new(file))? {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
    }
    Ok(symbols)
}
