//! Drive the sans-IO engine over a blocking `std::net::TcpStream`.
//!
//! Run: cargo run --example blocking_client -- ws://127.0.0.1:9001/

use std::error::Error;
use std::io::{Read, Write};
use std::net::TcpStream;

use url::Url;
use ws13::{ClientConfig, CloseCode, Connection, ConnectionState, Event};

fn main() -> Result<(), Box<dyn Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001/".to_string());
    let parsed = Url::parse(&url)?;
    let host = parsed.host_str().ok_or("missing host")?;
    let port = parsed.port_or_known_default().unwrap_or(80);

    let mut stream = TcpStream::connect((host, port))?;
    let mut conn = Connection::client(&ClientConfig::new(url.as_str()))?;
    let mut buf = [0u8; 4096];
    let mut sent = false;

    while conn.state() != ConnectionState::Closed {
        if let Some(bytes) = conn.take_outgoing() {
            stream.write_all(&bytes)?;
        }

        while let Some(event) = conn.poll_event() {
            match event {
                Event::Open { .. } => println!("connected"),
                Event::Message(message) => {
                    println!("received: {message:?}");
                    conn.close(CloseCode::Normal, "done")?;
                }
                Event::Close(close) => println!("closed: {} {:?}", close.code, close.reason),
                Event::Error(err) => eprintln!("error: {err}"),
                other => println!("{other:?}"),
            }
        }
        if conn.state() == ConnectionState::Open && !sent {
            conn.send_text("Hello from a blocking socket")?;
            sent = true;
            continue;
        }
        if conn.state() == ConnectionState::Closed {
            break;
        }

        match stream.read(&mut buf)? {
            0 => conn.transport_closed(),
            n => conn.receive(&buf[..n]),
        }
    }

    if let Some(bytes) = conn.take_outgoing() {
        stream.write_all(&bytes)?;
    }
    Ok(())
}
