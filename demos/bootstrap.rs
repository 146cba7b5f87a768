//! Seed a registry with bootstrap data, then run an overlap query.
//!
//! Run with `RUST_LOG=info cargo run --example bootstrap [log-path]`.
//! Without a path the registry lives in memory.

use geocell::prelude::*;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let builder = match std::env::args().nth(1) {
        Some(path) => Registry::builder().path(path),
        None => Registry::builder().in_memory(),
    };
    let registry = builder.build()?;

    registry.subscribe(|event: &DataUpdated| {
        log::info!(
            "DataUpdated geohash={} id={} replaced={}",
            event.geohash,
            event.id,
            event.replaced
        );
    });

    log::info!("Inserting bootstrap data...");
    let geohashes = ["s2fd125", "s2fd126"];
    let start_time = now_secs();
    let end_time = start_time + 24 * 60 * 60;

    // The second call repeats the id and replaces in place.
    for _ in 0..2 {
        let receipt = registry.upsert_polygon_data(
            &geohashes,
            90,
            200,
            start_time,
            end_time,
            "example1.com",
            1,
            1,
        )?;
        log::info!(
            "upsert id={} inserted={} replaced={}",
            receipt.id,
            receipt.inserted(),
            receipt.replaced()
        );
    }

    let geohash = "s2fd125";
    let (min_height, max_height) = (100, 200);
    let query_end = start_time + 48 * 60 * 60;
    log::info!(
        "Querying geohash {} with height {}-{} and time {}..{}",
        geohash,
        min_height,
        max_height,
        start_time,
        query_end
    );

    match registry.get_data(geohash, min_height, max_height, start_time, query_end) {
        Ok(result) => {
            log::info!("URLs: {:?}", result.urls);
            log::info!("EntityNumbers: {:?}", result.entity_numbers);
            log::info!("IDs: {:?}", result.ids);
        }
        Err(e) => log::error!("Query failed: {}", e),
    }

    log::info!("{}", serde_json::to_string_pretty(&registry.stats())?);
    registry.close()?;
    Ok(())
}
