//! Performance benchmarks for the ws13 engine.
//!
//! Run with: `cargo bench`

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use ws13::config::{ClientConfig, Config, Limits};
use ws13::connection::{Connection, Role};
use ws13::protocol::assembler::MessageAssembler;
use ws13::protocol::frame::{Decoded, Frame, FrameDecoder, encode};
use ws13::protocol::handshake::{HandshakeContext, compute_accept_key, validate_response};
use ws13::protocol::mask::{apply_mask, apply_mask_fast};
use ws13::protocol::OpCode;

// =============================================================================
// Frame Decoding Benchmarks
// =============================================================================

fn server_frame(payload_size: usize) -> Vec<u8> {
    Frame::binary(vec![0xAB; payload_size]).to_bytes(None).to_vec()
}

fn client_frame(payload_size: usize) -> Vec<u8> {
    Frame::binary(vec![0xAB; payload_size])
        .to_bytes(Some([0x37, 0xfa, 0x21, 0x3d]))
        .to_vec()
}

fn bench_frame_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decoding");
    let client = FrameDecoder::for_role(Role::Client, Limits::default());
    let server = FrameDecoder::for_role(Role::Server, Limits::default());

    for (name, size) in [("10b", 10), ("1kb", 1024), ("64kb", 65536)] {
        let unmasked = server_frame(size);
        let masked = client_frame(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("{name}_unmasked"), |b| {
            b.iter(|| client.decode(black_box(&unmasked)))
        });
        group.bench_function(format!("{name}_masked"), |b| {
            b.iter(|| server.decode(black_box(&masked)))
        });
    }

    // Header only: how quickly a partial frame is turned away.
    let partial = server_frame(65536);
    group.bench_function("need_more_bytes", |b| {
        b.iter(|| {
            let result = client.decode(black_box(&partial[..20]));
            debug_assert!(matches!(result, Ok(Decoded::NeedMoreBytes { .. })));
            result
        })
    });

    group.finish();
}

// =============================================================================
// Frame Encoding Benchmarks
// =============================================================================

fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");

    for (name, size) in [("10b", 10), ("1kb", 1024), ("64kb", 65536)] {
        let payload = vec![0xAB; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("{name}_unmasked"), |b| {
            b.iter(|| encode(OpCode::Binary, black_box(&payload), false))
        });
        group.bench_function(format!("{name}_masked"), |b| {
            b.iter(|| encode(OpCode::Binary, black_box(&payload), true))
        });
    }

    group.finish();
}

// =============================================================================
// Masking Benchmarks
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");
    let key = [0x37, 0xfa, 0x21, 0x3d];

    for (name, size) in [("1kb", 1024), ("64kb", 65536), ("1mb", 1024 * 1024)] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("apply_mask_{name}"), |b| {
            let mut data = vec![0xAB; size];
            b.iter(|| apply_mask(black_box(&mut data), key))
        });
        group.bench_function(format!("apply_mask_fast_{name}"), |b| {
            let mut data = vec![0xAB; size];
            b.iter(|| apply_mask_fast(black_box(&mut data), key))
        });
    }

    group.finish();
}

// =============================================================================
// Handshake Benchmarks
// =============================================================================

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");

    let key = "dGhlIHNhbXBsZSBub25jZQ==";
    group.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box(key)))
    });

    let context = HandshakeContext::with_key(
        key,
        "server.example.com",
        80,
        "/chat",
        false,
        Some("chat".to_string()),
    );
    group.bench_function("build_request", |b| {
        b.iter(|| black_box(&context).request(&[]))
    });

    let response = b"HTTP/1.1 101 Switching Protocols\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
        Sec-WebSocket-Protocol: chat\r\n\
        \r\n";
    group.bench_function("validate_response", |b| {
        b.iter(|| validate_response(black_box(response), &context))
    });

    group.finish();
}

// =============================================================================
// Message Reassembly Benchmarks
// =============================================================================

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");
    group.throughput(Throughput::Bytes(65536));

    group.bench_function("single_frame_64kb", |b| {
        b.iter(|| {
            let mut assembler = MessageAssembler::new(Limits::default());
            assembler.push(Frame::binary(vec![0xAB; 65536]))
        })
    });

    group.bench_function("16_fragments_64kb", |b| {
        b.iter(|| {
            let mut assembler = MessageAssembler::new(Limits::default());
            for i in 0..15 {
                let opcode = if i == 0 {
                    OpCode::Binary
                } else {
                    OpCode::Continuation
                };
                let _ = assembler.push(Frame::new(false, opcode, vec![0xAB; 4096]));
            }
            assembler.push(Frame::new(true, OpCode::Continuation, vec![0xAB; 4096]))
        })
    });

    group.finish();
}

// =============================================================================
// Engine Benchmarks
// =============================================================================

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    // 100 small text messages split at arbitrary boundaries.
    let mut wire = Vec::new();
    for _ in 0..100 {
        wire.extend_from_slice(&Frame::text("hello, websocket").to_bytes(None));
    }
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("receive_100_messages", |b| {
        b.iter(|| {
            let mut conn = Connection::open(Role::Client, Config::client());
            for chunk in black_box(&wire).chunks(37) {
                conn.receive(chunk);
            }
            let mut count = 0;
            while conn.poll_event().is_some() {
                count += 1;
            }
            count
        })
    });

    group.bench_function("send_100_messages", |b| {
        b.iter(|| {
            let mut conn = Connection::open(Role::Client, Config::client());
            for _ in 0..100 {
                let _ = conn.send_text(black_box("hello, websocket"));
            }
            conn.take_outgoing()
        })
    });

    group.bench_function("client_request", |b| {
        let config = ClientConfig::new("ws://server.example.com/chat");
        b.iter(|| Connection::client(black_box(&config)).map(|mut conn| conn.take_outgoing()))
    });

    group.finish();
}

// =============================================================================
// Criterion Setup
// =============================================================================

criterion_group!(
    benches,
    bench_frame_decoding,
    bench_frame_encoding,
    bench_masking,
    bench_handshake,
    bench_reassembly,
    bench_engine
);

criterion_main!(benches);
