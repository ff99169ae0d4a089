use anyhow::{Context, Result};
use std::path::Path;

use sonance_core::schema::FingerprintStore;
use sonance_etl::{Config, Fingerprinter};
use sonance_search::{QueryEngine, QueryOptions, SimilarTrack};

pub fn run_query(
    config: &Config,
    path: &Path,
    top_k: usize,
    threshold: Option<u32>,
    json: bool,
) -> Result<()> {
    let fingerprinter = Fingerprinter::new(config.fingerprint.clone())?;
    let store = FingerprintStore::open(&config.database_path, fingerprinter.tables())
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;

    let options = QueryOptions {
        threshold_votes: threshold.unwrap_or(config.threshold_votes),
    };
    let engine = QueryEngine::new(&store, &fingerprinter, options)?;
    let results = engine
        .find_similar_file(path, top_k)
        .with_context(|| format!("Failed to query {}", path.display()))?;

    if json {
        print_json(&results)?;
    } else {
        print_table(path, &results);
    }

    Ok(())
}

fn print_json(results: &[SimilarTrack]) -> Result<()> {
    let rows: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "track": r.track,
                "score": r.score,
                "votes": r.votes,
                "matched_fingerprints": r.matched_fingerprints,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn print_table(path: &Path, results: &[SimilarTrack]) {
    println!("\n🔎 Matches for {}\n", path.display());

    if results.is_empty() {
        println!("  No similar tracks found.");
        return;
    }

    for (rank, r) in results.iter().enumerate() {
        let artist = r.track.artist.as_deref().unwrap_or("Unknown artist");
        println!(
            "  {:>2}. {:.3}  {} - {}  [{} votes, {} fingerprints]",
            rank + 1,
            r.score,
            artist,
            r.track.title,
            r.votes,
            r.matched_fingerprints
        );
        println!("      {}", r.track.id);
    }
}
