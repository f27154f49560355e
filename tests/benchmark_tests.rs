//! Performance benchmarks for the hot messaging paths

use shared::{
    decode, encode, outbound_channel, AckProcessor, Message, MessageOption, OutgoingMessage,
    ReliableUdpSender, SendOutcome, Value,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

fn destination() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

fn game_update(i: i64) -> Message {
    Message::new("MOVE")
        .with_option(MessageOption::Game)
        .with_params([Value::Int(i), Value::Float(1.25), Value::Text("north".into())])
        .with_concealed(["session1", "game1", "alice"])
}

/// Benchmarks encoding a typical game update
#[test]
fn benchmark_encode() {
    let msg = game_update(42);
    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = encode(&msg);
    }

    let duration = start.elapsed();
    println!(
        "Encode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 5);
}

/// Benchmarks decoding, including the parameter typing heuristic
#[test]
fn benchmark_decode() {
    let wire = encode(&game_update(42));
    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let msg = decode(&wire).unwrap();
        assert_eq!(msg.parameters.len(), 3);
    }

    let duration = start.elapsed();
    println!(
        "Decode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 5);
}

/// Benchmarks reliable send followed by ACK, keeping the window full
#[test]
fn benchmark_reliable_send_and_ack() {
    let (tx, mut rx) = outbound_channel();
    let window = 64;
    let sender = ReliableUdpSender::new(window, Duration::from_secs(60), tx);

    let iterations = 20_000;
    let start = Instant::now();

    for i in 0..iterations {
        let outcome = sender.send(OutgoingMessage::new(game_update(i), destination()));
        assert!(matches!(outcome, SendOutcome::Sent { .. }));

        if sender.pending_count() == window {
            while let Ok(outgoing) = rx.try_recv() {
                let id = outgoing.message().id.clone().unwrap();
                sender.acknowledge(&id);
            }
        }
    }

    let duration = start.elapsed();
    println!(
        "Reliable send+ack: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(sender.pending_count() <= window);
    assert!(duration.as_secs() < 5);
}

/// Benchmarks timeout scanning over a full window
#[test]
fn benchmark_timeout_scan() {
    let (tx, _rx) = outbound_channel();
    let sender = ReliableUdpSender::new(1024, Duration::ZERO, tx);
    for i in 0..1024 {
        sender.send(OutgoingMessage::new(game_update(i), destination()));
    }

    let iterations = 1_000;
    let start = Instant::now();

    for i in 1..=iterations {
        let overdue = sender.scan_timeouts(start + Duration::from_millis(i));
        assert_eq!(overdue.len(), 1024);
    }

    let duration = start.elapsed();
    println!(
        "Timeout scan of 1024 entries: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 10);
}

/// Benchmarks staging and flushing ACK batches
#[test]
fn benchmark_ack_flush() {
    let (tx, mut rx) = outbound_channel();
    let acks = AckProcessor::new();
    acks.bind(tx).unwrap();

    let batches = 1_000;
    let start = Instant::now();

    for batch in 0..batches {
        for i in 0..32 {
            acks.enqueue(destination(), format!("{}-{}", batch, i));
        }
        assert_eq!(acks.flush(), 32);
        while rx.try_recv().is_ok() {}
    }

    let duration = start.elapsed();
    println!(
        "ACK flush: {} batches of 32 in {:?} ({:.2} μs/batch)",
        batches,
        duration,
        duration.as_micros() as f64 / batches as f64
    );

    assert!(duration.as_secs() < 5);
}
