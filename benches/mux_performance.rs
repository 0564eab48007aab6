//! Multiplexer performance benchmarks
//!
//! This benchmark suite measures:
//! - Frame header encoding/decoding
//! - Header set encoding/decoding
//! - Body chunk framing throughput
//! - Incremental decode of mixed frame sequences
//!
//! Run with: cargo bench --bench mux_performance

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use muxlink::mux::{
    codec::FrameCodec,
    frames::{DataFrame, FrameFlags, FrameType, HeadersFrame},
    headers::HeaderSet,
};

// ========== Frame Header Benchmarks ==========

fn bench_frame_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_header");

    group.bench_function("encode", |b| {
        b.iter(|| {
            let header = FrameCodec::encode_header(
                black_box(FrameType::Data),
                black_box(FrameFlags::from_u8(0x01)),
                black_box(1),
                black_box(1024),
            );
            black_box(header);
        });
    });

    group.bench_function("decode", |b| {
        let header = FrameCodec::encode_header(FrameType::Data, FrameFlags::from_u8(0x01), 1, 1024);
        b.iter(|| {
            let decoded = FrameCodec::decode_header(black_box(&header));
            black_box(decoded);
        });
    });

    group.finish();
}

// ========== Header Set Benchmarks ==========

fn typical_request() -> HeaderSet {
    let mut headers = HeaderSet::request("GET", "/api/v1/resource", "http", "example.com");
    headers.insert("accept", "application/json");
    headers.insert("accept-encoding", "gzip");
    headers.insert("user-agent", "muxlink-bench/1.0");
    headers.insert("x-request-id", "0123456789abcdef");
    headers
}

fn bench_headers_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("headers_frame");

    group.bench_function("encode", |b| {
        let frame = HeadersFrame::new(1, typical_request(), false);
        b.iter(|| {
            let encoded = FrameCodec::encode_headers_frame(black_box(&frame));
            black_box(encoded);
        });
    });

    group.bench_function("decode", |b| {
        let encoded = FrameCodec::encode_headers_frame(&HeadersFrame::new(1, typical_request(), false));
        b.iter(|| {
            let mut codec = FrameCodec::new();
            codec.feed(black_box(&encoded));
            let frame = codec.next_frame().unwrap().unwrap();
            black_box(frame);
        });
    });

    group.finish();
}

// ========== Body Chunk Benchmarks ==========

fn bench_data_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_frames");

    for size in [1024usize, 16 * 1024, 256 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &size, |b, &size| {
            let payload = Bytes::from(vec![0xAB; size]);
            b.iter(|| {
                let frame = DataFrame::new(1, payload.clone(), false);
                let encoded = FrameCodec::encode_data_frame(black_box(&frame));
                black_box(encoded);
            });
        });

        group.bench_with_input(BenchmarkId::new("decode", size), &size, |b, &size| {
            let encoded =
                FrameCodec::encode_data_frame(&DataFrame::new(1, Bytes::from(vec![0xAB; size]), false));
            b.iter(|| {
                let mut codec = FrameCodec::new();
                codec.feed(black_box(&encoded));
                let frame = codec.next_frame().unwrap().unwrap();
                black_box(frame);
            });
        });
    }

    group.finish();
}

// ========== Mixed Stream Benchmarks ==========

fn bench_mixed_frame_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_stream");

    // A realistic exchange: headers then a handful of body chunks per stream
    let mut wire = Vec::new();
    for stream_id in [1u32, 3, 5, 7] {
        wire.extend_from_slice(&FrameCodec::encode_headers_frame(&HeadersFrame::new(
            stream_id,
            typical_request(),
            false,
        )));
        for _ in 0..4 {
            wire.extend_from_slice(&FrameCodec::encode_data_frame(&DataFrame::new(
                stream_id,
                Bytes::from(vec![0x55; 4096]),
                false,
            )));
        }
        wire.extend_from_slice(&FrameCodec::encode_data_frame(&DataFrame::new(
            stream_id,
            Bytes::new(),
            true,
        )));
    }

    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("decode_exchange", |b| {
        b.iter(|| {
            let mut codec = FrameCodec::new();
            codec.feed(black_box(&wire));
            let mut frames = 0;
            while let Some(decoded) = codec.next_frame().unwrap() {
                black_box(&decoded);
                frames += 1;
            }
            assert_eq!(frames, 24);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_header,
    bench_headers_frame,
    bench_data_frames,
    bench_mixed_frame_stream
);
criterion_main!(benches);
