// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hot-path benchmarks
//!
//! Topic-name validation runs on every publisher build and discovery query;
//! payload encode/decode runs on every publish and every delivered frame.

#![allow(clippy::uninlined_format_args)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ezmqx::{is_valid_topic, Codec, DataObject, JsonModelCodec};
use serde_json::json;

fn bench_topic_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_validation");
    let cases = [
        ("short", "/robot".to_string()),
        ("nested", "/factory/line-3/robot_arm/joint.2".to_string()),
        ("invalid", "/factory//robot/".to_string()),
        ("deep", (0..32).map(|i| format!("/level{}", i)).collect::<String>()),
    ];
    for (label, topic) in &cases {
        group.bench_with_input(BenchmarkId::from_parameter(label), topic, |b, topic| {
            b.iter(|| is_valid_topic(black_box(topic)));
        });
    }
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let codec = JsonModelCodec::new("GTC_Robot_0.0.1", vec!["Model".into(), "Sample".into()]);
    let object = DataObject::new("GTC001", "1700000000")
        .with_data("Model", json!({"ctname": "Model_107.113.97.248", "con": "Robot"}))
        .with_data("Sample", json!({"Appearance": "Red", "Weight": 3.5, "Size": [1, 2, 3]}));
    let bytes = codec.encode(&object).expect("encode");

    c.bench_function("codec_encode", |b| {
        b.iter(|| codec.encode(black_box(&object)).expect("encode"));
    });
    c.bench_function("codec_decode", |b| {
        b.iter(|| codec.decode(black_box(&bytes)).expect("decode"));
    });
}

criterion_group!(benches, bench_topic_validation, bench_codec);
criterion_main!(benches);
