use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use jenrich_codec::{write_events, EventParser, PathExpression, WriterOptions};
use serde_json::json;

fn create_document(clients: usize) -> String {
    let clients: Vec<_> = (0..clients)
        .map(|i| {
            json!({
                "ClientID": format!("C{}", i),
                "ClaimID": i * 7,
                "variableName": "placeholder",
                "notes": ["alpha", "beta", {"nested": i % 3 == 0}]
            })
        })
        .collect();
    json!({ "Clients": clients, "generated": 1_600_000_000u64 }).to_string()
}

fn bench_event_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_parsing");

    for clients in [100, 1000, 10000] {
        let text = create_document(clients);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(clients), &text, |b, text| {
            b.iter(|| {
                let count = EventParser::from_text(black_box(text))
                    .map(|event| event.unwrap())
                    .count();
                black_box(count);
            });
        });
    }

    group.finish();
}

fn bench_materializing(c: &mut Criterion) {
    let mut group = c.benchmark_group("materializing");
    let text = create_document(1000);
    let patterns = vec![
        PathExpression::parse("$.Clients[*].ClientID").unwrap(),
        PathExpression::parse("$.Clients[*].ClaimID").unwrap(),
    ];

    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("two_scalar_paths", |b| {
        b.iter(|| {
            let count = EventParser::from_text(black_box(&text))
                .materializing(patterns.clone())
                .map(|event| event.unwrap())
                .count();
            black_box(count);
        });
    });
    group.bench_function("whole_clients", |b| {
        let clients = vec![PathExpression::parse("$.Clients[*]").unwrap()];
        b.iter(|| {
            let count = EventParser::from_text(black_box(&text))
                .materializing(clients.clone())
                .map(|event| event.unwrap())
                .count();
            black_box(count);
        });
    });

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    let text = create_document(1000);

    for pretty in [false, true] {
        group.bench_with_input(
            BenchmarkId::from_parameter(if pretty { "pretty" } else { "compact" }),
            &pretty,
            |b, &pretty| {
                b.iter(|| {
                    let out = write_events(
                        EventParser::from_text(black_box(&text)),
                        Vec::with_capacity(text.len()),
                        WriterOptions { pretty },
                    )
                    .unwrap();
                    black_box(out);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_event_parsing, bench_materializing, bench_round_trip);
criterion_main!(benches);
