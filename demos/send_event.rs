//! Connect to a local WebSocket server, push one typed JSON event, and close.

use std::time::Duration;

use beacon_websocket::{CloseReason, Connection};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let host = "127.0.0.1";
    let port = 8080;
    let max_frame_size = 4096;

    // The crate never opens sockets; the transport is ours to supply.
    let stream = TcpStream::connect((host, port)).await?;
    let mut conn = Connection::client(
        stream,
        host,
        port,
        max_frame_size,
        Some(Duration::from_secs(10)),
    )
    .await?;

    conn.send_envelope("status", "deployment finished").await?;
    conn.send_close(Some(CloseReason::NormalClosure)).await?;

    Ok(())
}
