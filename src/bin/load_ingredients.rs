//! Loads ingredients from a CSV file with a `name,measurement_unit` header.
//! Rows whose (name, measurement_unit) pair already exists are skipped.
//!
//! Usage: `load_ingredients [path]` (defaults to `ingredients.csv`).

use tracing::{info, warn};

use foodgram::settings::Settings;
use foodgram::store::Store;
use foodgram::types::ingredient::IngredientRecord;

const DEFAULT_PATH: &str = "ingredients.csv";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let config = Settings::load()?;

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_filter());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_PATH.to_string());
    let store = Store::new(&config.database_url()).await?;

    let mut reader = csv::Reader::from_path(&path)?;
    let (mut added, mut skipped) = (0, 0);
    for (line, record) in reader.deserialize::<IngredientRecord>().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping row {} of {}: {}", line + 2, path, e);
                skipped += 1;
                continue;
            }
        };
        let name = record.name.trim();
        let unit = record.measurement_unit.trim();
        if name.is_empty() || unit.is_empty() {
            skipped += 1;
            continue;
        }
        if store.add_ingredient_if_missing(name, unit).await? {
            added += 1;
        } else {
            skipped += 1;
        }
    }

    info!("Loaded ingredients from {}: {} added, {} skipped", path, added, skipped);
    Ok(())
}
