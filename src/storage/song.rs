use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::song::Song;

/// Writes `song` as YAML.
pub fn save(song: &Song, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let data = serde_yaml::to_string(song).context("serializing song")?;
    fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

/// Reads a YAML song. Missing fields take their defaults; every value is
/// clamped to its valid range.
pub fn open(path: impl AsRef<Path>) -> Result<Song> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let song: Song = serde_yaml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(song.clamped())
}
