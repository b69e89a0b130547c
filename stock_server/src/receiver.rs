use log::{debug, error, info, warn};
use std::io::{self, BufRead, BufReader, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use stock_common::{Request, ServerMessage, StockError};

use crate::connection;
use crate::model::ping_monitor::PingMonitor;
use crate::model::stock_service::StockService;

/// Longest accepted request line, newline excluded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// TCP receiver that accepts client connections.
///
/// Every accepted connection is registered with the router and served by two threads:
/// a reader that parses one JSON `Request` per line and queues the reply, and a writer
/// (see [`connection::write_loop`]) that sends replies and push events back. A failing
/// client only ends its own threads; the accept loop keeps serving others.
pub struct CommandReceiver {
    /// The underlying TCP listening socket.
    pub(crate) socket: TcpListener,
}

impl CommandReceiver {
    /// Bind a new TCP receiver to the provided `bind_addr` (e.g., `0.0.0.0:8080`).
    pub fn new(bind_addr: &str) -> Result<Self, StockError> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, StockError> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking loop that accepts connections until `shutdown` is set.
    ///
    /// The flag is checked after every accept, so whoever sets it must also make one
    /// connection to the listener to wake the loop up.
    pub fn receive_loop(
        self,
        service: Arc<StockService>,
        monitor: Option<Arc<Mutex<PingMonitor>>>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(), StockError> {
        info!("Command TCP server is started on {}", self.socket.local_addr()?);

        for stream in self.socket.incoming() {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let service = Arc::clone(&service);
                    let monitor = monitor.clone();
                    thread::spawn(move || {
                        let peer = stream
                            .peer_addr()
                            .map(|a| a.to_string())
                            .unwrap_or_else(|_| "unknown".to_string());
                        if let Err(e) = handle_connection(stream, &service, monitor) {
                            warn!("Connection handler error for {}: {}", peer, e);
                        }
                    });
                }
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
        info!("Command TCP server stopped");
        Ok(())
    }
}

/// Serve one client until it disconnects, then remove it from every group.
fn handle_connection(
    stream: TcpStream,
    service: &StockService,
    monitor: Option<Arc<Mutex<PingMonitor>>>,
) -> Result<(), StockError> {
    let peer = stream.peer_addr()?;
    let router = service.router();
    let (id, outbound) = router.register()?;
    info!("Client {} connected as {}", peer, id);

    let writer_stream = stream.try_clone()?;
    thread::spawn(move || connection::write_loop(writer_stream, id, outbound));

    if let Some(monitor) = &monitor {
        monitor.lock()?.update_ping(id);
    }

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        let line = match read_request_line(&mut reader, &mut buf) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("Read from {} failed: {}", id, e);
                break;
            }
        };
        let request = match line {
            Ok(text) if text.trim().is_empty() => continue,
            Ok(text) => Request::from_line(&text),
            Err(e) => Err(e),
        };
        if let Some(monitor) = &monitor {
            monitor.lock()?.update_ping(id);
        }

        let reply = match request {
            Ok(request) => service.handle(id, request),
            Err(e) => {
                warn!("Rejected line from {}: {}", id, e);
                ServerMessage::error(&e)
            }
        };
        if let Err(e) = router.send_to(id, reply) {
            warn!("Dropping connection {}: {}", id, e);
            break;
        }
    }

    if let Some(monitor) = &monitor {
        monitor.lock()?.remove(id);
    }
    router.on_disconnect(id)?;
    info!("Client {} ({}) disconnected", peer, id);
    Ok(())
}

/// Read the next request line into `buf`, without its line terminator.
///
/// Returns `None` at end of stream. A line that is not UTF-8 or longer than
/// [`MAX_LINE_LEN`] yields an `InvalidArgument` error; the rest of that line is
/// discarded so the next one can still be read.
fn read_request_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<Result<String, StockError>>> {
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') && buf.len() > MAX_LINE_LEN {
        discard_line(reader)?;
        return Ok(Some(Err(StockError::InvalidArgument(format!(
            "request line longer than {} bytes",
            MAX_LINE_LEN
        )))));
    }

    while matches!(buf.last(), Some(&(b'\n' | b'\r'))) {
        buf.pop();
    }
    Ok(Some(String::from_utf8(std::mem::take(buf)).map_err(|_| {
        StockError::InvalidArgument("request line is not valid UTF-8".to_string())
    })))
}

/// Skip input up to and including the next newline.
fn discard_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|b| *b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn next_line(reader: &mut impl BufRead) -> Option<Result<String, StockError>> {
        read_request_line(reader, &mut Vec::new()).unwrap()
    }

    #[test]
    fn test_reads_lines_until_eof() {
        let mut reader = Cursor::new(b"first\r\nsecond".to_vec());
        assert_eq!(next_line(&mut reader).unwrap().unwrap(), "first");
        assert_eq!(next_line(&mut reader).unwrap().unwrap(), "second");
        assert!(next_line(&mut reader).is_none());
    }

    #[test]
    fn test_invalid_utf8_is_rejected_and_skipped() {
        let mut reader = Cursor::new(b"\xff\xfe\n{\"type\":\"Ping\"}\n".to_vec());
        assert!(matches!(
            next_line(&mut reader),
            Some(Err(StockError::InvalidArgument(_)))
        ));
        assert_eq!(next_line(&mut reader).unwrap().unwrap(), "{\"type\":\"Ping\"}");
    }

    #[test]
    fn test_oversized_line_is_rejected_and_skipped() {
        let mut input = vec![b'x'; MAX_LINE_LEN * 3];
        input.extend_from_slice(b"\nnext\n");
        let mut reader = BufReader::with_capacity(1024, Cursor::new(input));

        assert!(matches!(
            next_line(&mut reader),
            Some(Err(StockError::InvalidArgument(_)))
        ));
        assert_eq!(next_line(&mut reader).unwrap().unwrap(), "next");
        assert!(next_line(&mut reader).is_none());
    }

    #[test]
    fn test_line_at_the_limit_is_accepted() {
        let mut input = vec![b'a'; MAX_LINE_LEN];
        input.push(b'\n');
        let mut reader = Cursor::new(input);
        assert_eq!(next_line(&mut reader).unwrap().unwrap().len(), MAX_LINE_LEN);
    }
}
