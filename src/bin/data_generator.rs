use rand::Rng;
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};

const STREETS: [&str; 8] = [
    "ROCKAWAY PARKWAY",
    "ROCKAWAY AVENUE",
    "ATLANTIC AVENUE",
    "FLATBUSH AVENUE",
    "LINDEN BOULEVARD",
    "REMSEN AVENUE",
    "BROADWAY",
    "",
];
const ZIPS: [&str; 7] = ["11236", "11234", "11212", "11207", "11233", "11226", ""];
const BOROUGHS: [&str; 5] = ["BROOKLYN", "QUEENS", "MANHATTAN", "BRONX", ""];
const FACTORS: [&str; 6] = [
    "Unspecified",
    "Driver Inattention/Distraction",
    "Failure to Yield Right-of-Way",
    "Following Too Closely",
    "Passing or Lane Usage Improper",
    "",
];

fn main() -> std::io::Result<()> {
    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "data/collisions.csv".to_string());
    let rows: usize = args.next().and_then(|n| n.parse().ok()).unwrap_or(1_000_000);

    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);

    writeln!(
        writer,
        "CRASH DATE,CRASH TIME,BOROUGH,ZIP CODE,LATITUDE,LONGITUDE,ON STREET NAME,\
         NUMBER OF PERSONS INJURED,NUMBER OF PERSONS KILLED,CONTRIBUTING FACTOR VEHICLE 1"
    )?;

    let mut rng = rand::rng();
    for _ in 0..rows {
        let month = rng.random_range(1..=12);
        let day = rng.random_range(1..=28);
        let year = rng.random_range(2012..=2024);
        let hour = rng.random_range(0..24);
        let minute = rng.random_range(0..60);
        let (lat, lon) = if rng.random_bool(0.9) {
            (
                format!("{:.6}", rng.random_range(40.57..40.74)),
                format!("{:.6}", rng.random_range(-74.03..-73.85)),
            )
        } else {
            (String::new(), String::new())
        };
        let injured = if rng.random_bool(0.25) { rng.random_range(1..4) } else { 0 };
        let killed = u32::from(rng.random_bool(0.002));

        writeln!(
            writer,
            "{:02}/{:02}/{},{}:{:02},{},{},{},{},{},{},{},{}",
            month,
            day,
            year,
            hour,
            minute,
            BOROUGHS[rng.random_range(0..BOROUGHS.len())],
            ZIPS[rng.random_range(0..ZIPS.len())],
            lat,
            lon,
            STREETS[rng.random_range(0..STREETS.len())],
            injured,
            killed,
            FACTORS[rng.random_range(0..FACTORS.len())],
        )?;
    }
    writer.flush()?;

    println!("Sample collision CSV generated: {} ({} rows)", path, rows);
    Ok(())
}
