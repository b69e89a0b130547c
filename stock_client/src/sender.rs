//! Sending requests to the stock server over TCP.
//!
//! This module provides a small helper for encoding and sending `Request` lines and for
//! running a background `Ping` loop that keeps the connection alive on servers that
//! enforce a keep-alive timeout.
use log::{debug, error, info};
use std::io::Write;
use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use stock_common::{Request, Result};

/// Helper type for sending requests to the server.
pub struct CommandSender;

impl CommandSender {
    /// Write `request` as one JSON line.
    pub fn send_request(stream: &mut TcpStream, request: &Request) -> Result<()> {
        let line = request.to_json_line()?;
        debug!("Sending request: {}", String::from_utf8_lossy(&line).trim_end());
        stream.write_all(&line)?;
        stream.flush()?;
        Ok(())
    }

    /// Send `Request::Ping` on `stream` every `interval` until `shutdown` is set or a
    /// write fails.
    pub fn start_ping_thread(
        mut stream: TcpStream,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        info!("Ping thread started, every {:?}", interval);
        thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = Self::send_request(&mut stream, &Request::Ping) {
                    if !shutdown.load(Ordering::Relaxed) {
                        error!("Failed to send Ping: {}", e);
                    }
                    break;
                }
            }
            info!("Ping thread stopping...");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use stock_common::Symbol;

    #[test]
    fn test_send_request_writes_json_line() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let request = Request::Subscribe {
            symbol: Symbol::parse("aapl").unwrap(),
        };
        CommandSender::send_request(&mut client, &request).unwrap();
        CommandSender::send_request(&mut client, &Request::Ping).unwrap();

        let mut lines = BufReader::new(server).lines();
        let first = lines.next().unwrap().unwrap();
        assert_eq!(Request::from_line(&first).unwrap(), request);
        let second = lines.next().unwrap().unwrap();
        assert_eq!(Request::from_line(&second).unwrap(), Request::Ping);
    }

    #[test]
    fn test_ping_thread_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle =
            CommandSender::start_ping_thread(client, Duration::from_millis(10), shutdown.clone());

        let mut lines = BufReader::new(server).lines();
        let ping = lines.next().unwrap().unwrap();
        assert_eq!(Request::from_line(&ping).unwrap(), Request::Ping);

        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
