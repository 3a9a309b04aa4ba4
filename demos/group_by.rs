use collision_analytics::{AggregationRequest, CollisionDataset, Field, Normalizer, Statistic};
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/collisions.csv"));

    let (dataset, _) = CollisionDataset::open(&path, &Normalizer::default())?;

    // Top contributing factors within each year
    let request = AggregationRequest::new(
        vec![Field::Year, Field::ContributingFactor],
        Statistic::Count,
    );
    let grouped = dataset.aggregate(&request)?.top_per_leading_key(3);
    for row in grouped.rows() {
        println!("{} => {}", row.label(), row.value);
    }

    Ok(())
}
