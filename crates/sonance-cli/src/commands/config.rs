use anyhow::{Context, Result};
use sonance_etl::{config, Config};

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    let fp = &config.fingerprint;
    println!("Settings:");
    println!("  database_path: {}", config.database_path.display());
    println!("  threshold_votes: {}", config.threshold_votes);
    println!("  fingerprint.sample_rate: {}", fp.sample_rate);
    println!("  fingerprint.frame_size: {}", fp.frame_size);
    println!("  fingerprint.hop_size: {}", fp.hop_size);
    println!("  fingerprint.window: {:?}", fp.window);
    println!(
        "  fingerprint.bands: {} ({} Hz - {} Hz)",
        fp.bands, fp.min_frequency, fp.max_frequency
    );
    println!("  fingerprint.image_frames: {}", fp.image_frames);
    println!("  fingerprint.stride: {:?}", fp.stride);
    println!("  fingerprint.query_stride: {:?}", fp.query_stride);
    println!("  fingerprint.top_wavelets: {}", fp.top_wavelets);
    println!(
        "  fingerprint.hashing: {} tables x {} keys (seed {})",
        fp.hashing.tables, fp.hashing.keys_per_table, fp.hashing.seed
    );
    println!(
        "  pool: {}..={} fingerprinters, {} waiting",
        config.pool.min_size, config.pool.max_size, config.pool.max_waiting
    );

    println!("\nPriority: CLI args > ENV vars (SONANCE_*) > Config file > Defaults");

    Ok(())
}

/// Get a specific config value.
///
/// Keys are dotted paths into the configuration, e.g. `threshold_votes`,
/// `pool.max_size` or `fingerprint.hashing.tables`. A leading
/// `fingerprint.` may be left off.
pub fn get_config(key: Option<String>) -> Result<()> {
    if let Some(key) = key {
        let config = Config::load()?;
        let tree = serde_json::to_value(&config).context("Failed to serialize configuration")?;

        let value = lookup(&tree, &key)
            .or_else(|| lookup(&tree, &format!("fingerprint.{key}")))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown config key: {}\n\nExamples: database_path, threshold_votes, \
                     pool.max_size, hashing.tables",
                    key
                )
            })?;

        match value {
            serde_json::Value::String(s) => println!("{}", s),
            other => println!("{}", other),
        }
    } else {
        // No key provided, show entire config file contents
        let config_path = config::config_file_path();

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            print!("{}", contents);
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'sonance config init' to create it.");
        }
    }

    Ok(())
}

fn lookup<'a>(tree: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    key.split('.').try_fold(tree, |node, part| node.get(part))
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to tune fingerprinting and search.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_dotted_keys() {
        let tree = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(lookup(&tree, "threshold_votes"), Some(&serde_json::json!(5)));
        assert_eq!(
            lookup(&tree, "fingerprint.hashing.tables"),
            Some(&serde_json::json!(25))
        );
        assert!(lookup(&tree, "fingerprint.nope").is_none());
        assert!(lookup(&tree, "threshold_votes.deeper").is_none());
    }
}
