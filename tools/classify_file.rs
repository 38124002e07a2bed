use std::env;
use std::fs;

use common::CatalogTrack;
use grouping::{Classifier, TagClassifier};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var("TRACKS_PATH").ok())
        .ok_or("TRACKS_PATH not set and no path argument")?;

    let contents = fs::read_to_string(&path)?;
    let tracks: Vec<CatalogTrack> = serde_json::from_str(&contents)?;
    let snapshot = TagClassifier::new().classify(&tracks)?;
    info!(
        "Classified {} tracks into {} genres",
        snapshot.track_count(),
        snapshot.bucket_count()
    );

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
