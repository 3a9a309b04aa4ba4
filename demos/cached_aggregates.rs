use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use collision_analytics::{CollisionDataset, Field, Normalizer, QueryCache, Statistic};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/collisions.csv"));

    let (dataset, _) = CollisionDataset::open(&path, &Normalizer::default())?;
    let dataset = Rc::new(dataset);
    let cache = Rc::new(QueryCache::new());

    // First run (grouping + ranking)
    let start = Instant::now();
    let result = dataset
        .query_with_cache(&cache)
        .group_by(Field::ZipCode)
        .statistic(Statistic::SumPersonsKilled)
        .limit(10)
        .execute()?;
    println!(
        "First run: {:?}, elapsed: {:?}",
        result.to_table(),
        start.elapsed()
    );

    // Second run (should be cached)
    let start = Instant::now();
    let cached = dataset
        .query_with_cache(&cache)
        .group_by(Field::ZipCode)
        .statistic(Statistic::SumPersonsKilled)
        .limit(10)
        .execute()?;
    println!(
        "Cached run: {:?}, elapsed: {:?}",
        cached.to_table(),
        start.elapsed()
    );

    Ok(())
}
