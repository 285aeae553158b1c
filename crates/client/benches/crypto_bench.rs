use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use caredesk_client::EncryptionGateway;

const SECRET: &str = "Benchmark-Secret-2024!";

fn benchmark_payload_crypto(c: &mut Criterion) {
    let gateway =
        EncryptionGateway::new(SECRET, vec!["/messages/".to_string()]).expect("gateway init");

    let small = "x".repeat(256);
    let large = "x".repeat(64 * 1024);
    let small_sealed = gateway.encrypt(&small).expect("encrypt");
    let large_sealed = gateway.encrypt(&large).expect("encrypt");

    let mut group = c.benchmark_group("payload_crypto");

    group.bench_function("encrypt_256b", |b| {
        b.iter(|| gateway.encrypt(black_box(&small)).expect("encrypt"));
    });
    group.bench_function("encrypt_64kb", |b| {
        b.iter(|| gateway.encrypt(black_box(&large)).expect("encrypt"));
    });
    group.bench_function("decrypt_256b", |b| {
        b.iter(|| gateway.decrypt(black_box(&small_sealed)).expect("decrypt"));
    });
    group.bench_function("decrypt_64kb", |b| {
        b.iter(|| gateway.decrypt(black_box(&large_sealed)).expect("decrypt"));
    });

    group.finish();
}

fn benchmark_envelope_round_trip(c: &mut Criterion) {
    let gateway =
        EncryptionGateway::new(SECRET, vec!["/messages/".to_string()]).expect("gateway init");
    let body = json!({
        "subject": "Follow-up",
        "text": "Lab results attached for review.",
        "attachments": [1, 2, 3],
    });
    let sealed = gateway.seal_body(&body).expect("seal");

    let mut group = c.benchmark_group("envelope");

    group.bench_function("seal_body", |b| {
        b.iter(|| gateway.seal_body(black_box(&body)).expect("seal"));
    });
    group.bench_function("open_body", |b| {
        b.iter(|| gateway.open_body(black_box(&sealed)).expect("open"));
    });
    group.bench_function("hmac_sha256", |b| {
        b.iter(|| gateway.generate_hmac(black_box("audit-record-512"), None).expect("hmac"));
    });

    group.finish();
}

criterion_group!(benches, benchmark_payload_crypto, benchmark_envelope_round_trip);
criterion_main!(benches);
