//! Accept one WebSocket connection and echo every message back.

use std::time::Duration;

use beacon_websocket::{Connection, WebsocketMessage};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:8080").await?;
    let (stream, peer) = listener.accept().await?;
    println!("accepted connection from {peer}");

    let mut conn = Connection::server(stream, 1 << 20, Some(Duration::from_secs(10))).await?;
    while let Some(message) = conn.next_message().await {
        match message? {
            WebsocketMessage::Text(text) => {
                println!("text: {text}");
                conn.send_text(&text).await?;
            }
            WebsocketMessage::Binary(data) => {
                println!("binary: {} bytes", data.len());
                conn.send_binary(&data).await?;
            }
            WebsocketMessage::Close(reason) => {
                println!("closed: {reason:?}");
                break;
            }
            WebsocketMessage::Ping(_) | WebsocketMessage::Pong(_) => {}
        }
    }

    Ok(())
}
