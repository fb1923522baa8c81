use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::db::Database;

pub const DATA_DIR: &str = ".tutorlink";
pub const DB_FILE: &str = "tutoring.db";
pub const CONFIG_FILE: &str = "config.toml";

pub fn run(cwd: &Path) -> Result<()> {
    let data_dir = cwd.join(DATA_DIR);
    if data_dir.exists() {
        bail!("Already initialized at {}", data_dir.display());
    }

    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let db_path = data_dir.join(DB_FILE);
    Database::open(&db_path).context("Failed to initialize database")?;

    let config_path = data_dir.join(CONFIG_FILE);
    Config::default().save(&config_path)?;

    println!("Initialized tutorlink in {}", data_dir.display());
    println!("Edit {} to set your timezone and scoring policy.", config_path.display());
    Ok(())
}
