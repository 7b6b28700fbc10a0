// ABOUTME: Benchmark suite for the CQL frame codec: encode, decode, and a round-trip
// ABOUTME: Exercises request shapes ranging from the trivial (Options) to paged Rows

use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, black_box, Criterion};
use cqlconn::codec::Codec;
use cqlconn::frame::Request;
use cqlconn::value::{QueryParams, Value};
use std::time::Duration;

fn sample_query() -> Request {
    Request::Query {
        cql: "SELECT id, name, email FROM users WHERE id = ?".to_string(),
        params: QueryParams {
            values: vec![Some(Bytes::from_static(&[0u8; 16]))],
            skip_metadata: true,
            ..QueryParams::default()
        },
    }
}

fn sample_execute() -> Request {
    Request::Execute {
        id: Bytes::from_static(b"prepared-statement-id"),
        params: QueryParams {
            values: vec![
                Some(Bytes::from_static(b"alice")) as Value,
                Some(Bytes::from_static(&42i32.to_be_bytes())),
            ],
            skip_metadata: true,
            ..QueryParams::default()
        },
    }
}

fn rows_response_bytes(row_count: u32, column_count: u32) -> BytesMut {
    use bytes::BufMut;
    let mut body = BytesMut::new();
    body.put_i32(0x0002); // Result kind: Rows
    body.put_i32(0x0004); // flags: NO_METADATA
    body.put_u32(column_count);
    body.put_u32(row_count);
    for _ in 0..row_count {
        for _ in 0..column_count {
            body.put_i32(4);
            body.put_i32(7);
        }
    }

    let mut frame = BytesMut::with_capacity(9 + body.len());
    frame.put_u8(0x84);
    frame.put_u8(0);
    frame.put_i16(2);
    frame.put_u8(0x08); // Opcode::Result
    frame.put_u32(body.len() as u32);
    frame.extend_from_slice(&body);
    frame
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("options", |b| {
        b.iter(|| Codec::encode(black_box(&Request::Options), 2))
    });

    let query = sample_query();
    group.bench_function("query", |b| b.iter(|| Codec::encode(black_box(&query), 2)));

    let execute = sample_execute();
    group.bench_function("execute", |b| {
        b.iter(|| Codec::encode(black_box(&execute), 2))
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.measurement_time(Duration::from_secs(10));

    let small_rows = rows_response_bytes(10, 3);
    group.bench_function("rows_small", |b| {
        b.iter(|| {
            let mut buf = black_box(small_rows.clone());
            Codec::decode(&mut buf).unwrap()
        })
    });

    let large_rows = rows_response_bytes(500, 8);
    group.bench_function("rows_large", |b| {
        b.iter(|| {
            let mut buf = black_box(large_rows.clone());
            Codec::decode(&mut buf).unwrap()
        })
    });

    group.finish();
}

fn bench_fragmented_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragmented_decode");
    group.measurement_time(Duration::from_secs(10));

    let frame = rows_response_bytes(50, 4);
    group.bench_function("one_byte_at_a_time", |b| {
        b.iter(|| {
            let mut buf = BytesMut::new();
            let mut result = None;
            for byte in frame.iter() {
                buf.extend_from_slice(std::slice::from_ref(byte));
                if let Some(f) = Codec::decode(black_box(&mut buf)).unwrap() {
                    result = Some(f);
                }
            }
            result
        })
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_fragmented_decode);
criterion_main!(benches);
