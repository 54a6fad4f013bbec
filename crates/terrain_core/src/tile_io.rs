//! Tile save/load on disk.
//!
//! One text file per tile, named `<tile-id>.tile` under the map's save
//! directory. Writes go to `<tile-id>.tile.tmp` first and are renamed into
//! place, so a reader never observes a partially written tile.
//!
//! # Example
//!
//! ```ignore
//! use terrain_core::tile_io::{save_tile, load_tile};
//!
//! save_tile("saved_tiles", id, &tile)?;
//! let loaded = load_tile("saved_tiles", id)?; // Option<Tile>
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::TerrainResult;
use crate::tile::Tile;
use crate::tile_id::TileId;

/// File extension for persisted tiles.
pub const TILE_EXTENSION: &str = "tile";

/// Path of the persisted file for `id` under `dir`.
pub fn tile_path<P: AsRef<Path>>(dir: P, id: TileId) -> PathBuf {
    dir.as_ref().join(format!("{}.{}", id, TILE_EXTENSION))
}

/// Write a tile atomically (temp file + rename).
pub fn save_tile<P: AsRef<Path>>(dir: P, id: TileId, tile: &Tile) -> TerrainResult<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let final_path = tile_path(dir, id);
    let tmp_path = final_path.with_extension(format!("{}.tmp", TILE_EXTENSION));
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(tile.to_text().as_bytes())?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

/// Load a persisted tile, or `None` if nothing is stored for `id`.
///
/// A file that exists but does not parse is an error; callers decide whether
/// to discard it.
pub fn load_tile<P: AsRef<Path>>(dir: P, id: TileId) -> TerrainResult<Option<Tile>> {
    let path = tile_path(dir, id);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(Tile::from_text(&text)?))
}

/// Delete the persisted file for `id`, if any.
pub fn remove_tile<P: AsRef<Path>>(dir: P, id: TileId) -> TerrainResult<()> {
    match fs::remove_file(tile_path(dir, id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Ids of every tile persisted under `dir`. A missing directory is empty.
pub fn list_persisted<P: AsRef<Path>>(dir: P) -> TerrainResult<Vec<TileId>> {
    let entries = match fs::read_dir(dir.as_ref()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(TILE_EXTENSION) {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            ids.push(TileId(id));
        }
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TerrainError;
    use crate::particle::Particle;
    use crate::tile_id::TileCoord;
    use bevy::math::DVec3;
    use tempfile::TempDir;

    fn test_tile() -> Tile {
        Tile {
            position: DVec3::new(-3.0, 4.0, 0.0),
            particles: vec![
                Particle::new(DVec3::new(-2.5, 4.5, 1.25), 0.01),
                Particle::new(DVec3::new(-2.1, 4.9, 1.0), 0.01),
            ],
            dirty: true,
        }
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let id = TileCoord::new(-3, 4).id();

        save_tile(dir.path(), id, &test_tile()).unwrap();
        let loaded = load_tile(dir.path(), id).unwrap().unwrap();

        assert_eq!(loaded.position, test_tile().position);
        assert_eq!(loaded.particles, test_tile().particles);
        assert!(!loaded.dirty);
        assert!(!tile_path(dir.path(), id).with_extension("tile.tmp").exists());
    }

    #[test]
    fn test_missing_tile_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_tile(dir.path(), TileId(42)).unwrap().is_none());
        assert!(list_persisted(dir.path().join("nowhere")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(tile_path(dir.path(), TileId(5)), "not a tile\n").unwrap();
        assert!(matches!(
            load_tile(dir.path(), TileId(5)),
            Err(TerrainError::MalformedTile { .. })
        ));
    }

    #[test]
    fn test_list_and_remove() {
        let dir = TempDir::new().unwrap();
        save_tile(dir.path(), TileId(9), &test_tile()).unwrap();
        save_tile(dir.path(), TileId(3), &test_tile()).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(list_persisted(dir.path()).unwrap(), vec![TileId(3), TileId(9)]);

        remove_tile(dir.path(), TileId(9)).unwrap();
        remove_tile(dir.path(), TileId(9)).unwrap();
        assert_eq!(list_persisted(dir.path()).unwrap(), vec![TileId(3)]);
    }
}
