//! Send a few messages to an echo server and print the replies.
//!
//! Run: cargo run --example echo_client -- ws://127.0.0.1:9001/

use std::error::Error;

use tokio::sync::mpsc;
use ws13::{Client, ClientConfig, CloseCode, CloseFrame, ErrorKind, Handler, Message};

struct Printer(mpsc::UnboundedSender<Message>);

impl Handler for Printer {
    fn on_open(&mut self, protocol: Option<&str>) {
        println!("connected (protocol: {protocol:?})");
    }

    fn on_message(&mut self, message: Message) {
        let _ = self.0.send(message);
    }

    fn on_close(&mut self, close: &CloseFrame) {
        println!("closed: {} {:?}", close.code, close.reason);
    }

    fn on_error(&mut self, kind: ErrorKind, error: &ws13::Error) {
        eprintln!("{kind:?} error: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001/".to_string());

    let (tx, mut replies) = mpsc::unbounded_channel();
    let client = Client::connect(ClientConfig::new(url), Printer(tx)).await?;

    for text in ["Hello, WebSocket!", "second", "third"] {
        println!("sending: {text}");
        client.send_text(text).await?;
        match replies.recv().await {
            Some(Message::Text(reply)) => println!("received: {reply}"),
            Some(other) => println!("received: {other:?}"),
            None => break,
        }
    }

    client.close(CloseCode::Normal, "goodbye").await?;
    client.closed().await;
    Ok(())
}
