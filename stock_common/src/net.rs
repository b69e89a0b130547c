//! Shared networking constants and helpers used by client and server.

/// TCP port for the request/push channel.
pub const COMMAND_PORT: u16 = 8080;

/// Interval between keep-alive `Ping` requests sent by clients, in milliseconds.
pub const PING_INTERVAL_MS: u64 = 2000;

/// Helper to format an address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}
