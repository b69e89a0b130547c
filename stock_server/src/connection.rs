use crossbeam_channel::Receiver;
use log::{debug, error};
use std::io::{BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use stock_common::{ServerMessage, StockError};

use crate::model::ConnectionId;

/// Writer task for a single connection.
///
/// Drains `outbound` (replies and push events queued by the router) and writes each
/// message as a JSON line. The task ends when the router drops the connection (the
/// channel disconnects) or a write fails; either way the socket is shut down so the
/// reader side of the connection unblocks and runs the disconnect cleanup.
pub fn write_loop(stream: TcpStream, id: ConnectionId, outbound: Receiver<ServerMessage>) {
    if let Err(e) = write_messages(&stream, &outbound) {
        debug!("Writer of connection {} stopped: {}", id, e);
    }
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!("Shutdown of connection {} failed: {}", id, e);
    }
    debug!("Writer of connection {} finished", id);
}

fn write_messages(stream: &TcpStream, outbound: &Receiver<ServerMessage>) -> Result<(), StockError> {
    let mut writer = BufWriter::new(stream);
    for message in outbound.iter() {
        let line = match message.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize message to JSON: {}", e);
                continue;
            }
        };
        writer.write_all(&line)?;
        if outbound.is_empty() {
            writer.flush()?;
        }
    }
    writer.flush()?;
    Ok(())
}
