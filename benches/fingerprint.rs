use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fixtape::fingerprint::fingerprint_request;
use fixtape::storage::{FixtureStore, Headers, RequestRecord};
use serde_json::json;

fn request_with_body(size: usize) -> RequestRecord {
    let mut headers = Headers::new();
    headers.insert("content-type", "application/json");
    headers.insert("accept", "application/json");

    RequestRecord {
        method: "POST".to_string(),
        href: "https://api.example.com/v1/widgets?page=2".to_string(),
        headers,
        body: json!({ "payload": "x".repeat(size) }),
        body_encoding: None,
    }
}

fn bench_fingerprint_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let request = request_with_body(size);
            b.iter(|| fingerprint_request(black_box(&request)));
        });
    }

    group.finish();
}

fn bench_fixture_address(c: &mut Criterion) {
    let store = FixtureStore::new("__fixtures__");
    let request = request_with_body(1_000);

    c.bench_function("path_for", |b| {
        b.iter(|| store.path_for(black_box(&request), black_box(Some("alice"))));
    });
}

criterion_group!(benches, bench_fingerprint_sizes, bench_fixture_address);
criterion_main!(benches);
