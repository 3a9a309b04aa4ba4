use chrono::NaiveDate;
use collision_analytics::processor::engine::{SHARD_ROWS, execute_sharded};
use collision_analytics::{
    AccidentRecord, AggregationRequest, CollisionDataset, Field, FilterPredicate, Statistic,
    YearPolicy,
};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::Rng;
use std::hint::black_box;

const ROWS: usize = 1_000_000;

fn synthetic_records(rows: usize) -> Vec<AccidentRecord> {
    let streets = ["ROCKAWAY PARKWAY", "ATLANTIC AVENUE", "FLATBUSH AVENUE", "BROADWAY"];
    let zips = ["11236", "11234", "11212", "11207", "11233"];
    let mut rng = rand::rng();

    (0..rows)
        .map(|_| {
            let date = NaiveDate::from_ymd_opt(
                rng.random_range(2012..=2024),
                rng.random_range(1..=12),
                rng.random_range(1..=28),
            )
            .unwrap();
            AccidentRecord {
                on_street_name: Some(streets[rng.random_range(0..streets.len())].to_string()),
                zip_code: Some(zips[rng.random_range(0..zips.len())].to_string()),
                persons_killed: Some(u32::from(rng.random_bool(0.01))),
                persons_injured: Some(rng.random_range(0..3)),
                ..AccidentRecord::on(date)
            }
        })
        .collect()
}

fn aggregate(c: &mut Criterion) {
    let records = synthetic_records(ROWS);
    let dataset = CollisionDataset::from_records(records.clone());

    let mut group = c.benchmark_group("CollisionDataset");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ROWS as u64));

    let by_zip = AggregationRequest::new(vec![Field::ZipCode], Statistic::Count).with_limit(10);
    group.bench_function("count_by_zip_top10", |b| {
        b.iter(|| dataset.aggregate(black_box(&by_zip)).unwrap())
    });

    let deaths = AggregationRequest::new(vec![Field::Year], Statistic::SumPersonsKilled);
    group.bench_function("deaths_by_year", |b| {
        b.iter(|| dataset.aggregate(black_box(&deaths)).unwrap())
    });

    let street = AggregationRequest::new(vec![Field::Year], Statistic::Count)
        .with_filter(FilterPredicate::street_contains("rockaway"));
    group.bench_function("street_substring_by_year", |b| {
        b.iter(|| dataset.aggregate(black_box(&street)).unwrap())
    });

    let factors = AggregationRequest::new(vec![Field::Year, Field::Month], Statistic::Count);
    group.bench_function("year_month_sequential_shard", |b| {
        b.iter(|| execute_sharded(&records, black_box(&factors), YearPolicy::default(), ROWS))
    });
    group.bench_function("year_month_parallel_shards", |b| {
        b.iter(|| {
            execute_sharded(&records, black_box(&factors), YearPolicy::default(), SHARD_ROWS)
        })
    });

    group.finish();
}

criterion_group!(benches, aggregate);
criterion_main!(benches);
