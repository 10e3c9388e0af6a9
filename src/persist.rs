//! On-disk form of the vector index.
//!
//! Every save writes a complete generation directory holding two artifacts:
//!
//! - `index.bin`: magic `HQIX`, format version (`u32`), dimension (`u32`),
//!   vector count (`u64`), then `count × dims` little-endian `f32`s.
//! - `metadata.json`: the positional chunk list; entry `i` describes vector `i`.
//!
//! The generation becomes live when the `CURRENT` pointer file, written to a
//! `.tmp` sibling and synced, is renamed over the old one. That rename is the
//! single commit point, so a crash leaves either the old pair or the new pair
//! live, never one of each. Older generations are removed afterwards.
//!
//! ```text
//! index/
//!   CURRENT            "gen-000003"
//!   gen-000003/
//!     index.bin
//!     metadata.json
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use hybrid_query_core::embedding::{blob_to_vec, vec_to_blob};
use hybrid_query_core::index::FlatIndex;
use hybrid_query_core::models::Chunk;

pub const CURRENT_FILE: &str = "CURRENT";
pub const INDEX_FILE: &str = "index.bin";
pub const METADATA_FILE: &str = "metadata.json";

const GENERATION_PREFIX: &str = "gen-";
const MAGIC: &[u8; 4] = b"HQIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("index I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt index: {0}")]
    Corrupt(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn generation_name(n: u64) -> String {
    format!("{}{:06}", GENERATION_PREFIX, n)
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

/// The live generation number, if a pair has ever been committed.
fn current_generation(dir: &Path) -> Result<Option<u64>, PersistError> {
    let pointer = dir.join(CURRENT_FILE);
    let name = match fs::read_to_string(&pointer) {
        Ok(name) => name,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(&pointer)(e)),
    };
    parse_generation(name.trim())
        .map(Some)
        .ok_or_else(|| PersistError::Corrupt(format!("bad {} pointer {:?}", CURRENT_FILE, name)))
}

/// Path of the live generation directory, if any.
pub fn live_dir(dir: &Path) -> Result<Option<PathBuf>, PersistError> {
    Ok(current_generation(dir)?.map(|n| dir.join(generation_name(n))))
}

/// Write `index` and `metadata` into `dir` as a new generation and make it
/// live.
pub fn save(dir: &Path, index: &FlatIndex, metadata: &[Chunk]) -> Result<(), PersistError> {
    if index.len() != metadata.len() {
        return Err(PersistError::Corrupt(format!(
            "refusing to save {} vectors with {} metadata entries",
            index.len(),
            metadata.len()
        )));
    }
    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let next = current_generation(dir)?.map_or(1, |n| n + 1);
    let name = generation_name(next);
    let gen_dir = dir.join(&name);
    if gen_dir.exists() {
        // Left over from a save that never committed.
        fs::remove_dir_all(&gen_dir).map_err(io_err(&gen_dir))?;
    }
    fs::create_dir_all(&gen_dir).map_err(io_err(&gen_dir))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + index.as_raw().len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(index.dims() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&vec_to_blob(index.as_raw()));
    write_synced(&gen_dir.join(INDEX_FILE), &bytes)?;

    let json = serde_json::to_vec(metadata)?;
    write_synced(&gen_dir.join(METADATA_FILE), &json)?;

    let pointer = dir.join(CURRENT_FILE);
    let pointer_tmp = dir.join(format!("{}.tmp", CURRENT_FILE));
    write_synced(&pointer_tmp, name.as_bytes())?;
    fs::rename(&pointer_tmp, &pointer).map_err(io_err(&pointer))?;

    remove_stale_generations(dir, next);
    debug!(dir = %dir.display(), generation = next, vectors = index.len(), "index persisted");
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let mut file = fs::File::create(path).map_err(io_err(path))?;
    file.write_all(bytes).map_err(io_err(path))?;
    file.sync_all().map_err(io_err(path))?;
    Ok(())
}

/// Best effort: a generation that cannot be removed is only wasted space.
fn remove_stale_generations(dir: &Path, live: u64) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(n) = name.to_str().and_then(parse_generation) else {
            continue;
        };
        if n != live {
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!(path = %entry.path().display(), error = %e, "failed to remove old index generation");
            }
        }
    }
}

/// Load the live pair from `dir`.
///
/// `Ok(None)` when nothing was ever committed. A committed generation is
/// always complete, so a missing artifact, a count disagreement or a
/// malformed file is an error rather than an empty index.
pub fn load(dir: &Path) -> Result<Option<(FlatIndex, Vec<Chunk>)>, PersistError> {
    let Some(gen_dir) = live_dir(dir)? else {
        if dir.join(INDEX_FILE).exists() || dir.join(METADATA_FILE).exists() {
            warn!(dir = %dir.display(), "index artifacts without a {} pointer; ignoring", CURRENT_FILE);
        }
        return Ok(None);
    };

    let index_path = gen_dir.join(INDEX_FILE);
    let bytes = fs::read(&index_path).map_err(io_err(&index_path))?;
    let index = decode_index(&bytes)?;

    let metadata_path = gen_dir.join(METADATA_FILE);
    let json = fs::read(&metadata_path).map_err(io_err(&metadata_path))?;
    let metadata: Vec<Chunk> = serde_json::from_slice(&json)?;

    if metadata.len() != index.len() {
        return Err(PersistError::Corrupt(format!(
            "{} vectors but {} metadata entries in {}",
            index.len(),
            metadata.len(),
            gen_dir.display()
        )));
    }
    Ok(Some((index, metadata)))
}

fn decode_index(bytes: &[u8]) -> Result<FlatIndex, PersistError> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
        return Err(PersistError::Corrupt("bad magic".into()));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(PersistError::Corrupt(format!("unsupported version {}", version)));
    }
    let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let body = &bytes[HEADER_LEN..];
    let expected = count
        .checked_mul(dims)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| PersistError::Corrupt("header overflow".into()))?;
    if body.len() != expected {
        return Err(PersistError::Corrupt(format!(
            "expected {} bytes of vectors, found {}",
            expected,
            body.len()
        )));
    }

    FlatIndex::from_raw(dims, blob_to_vec(body)).map_err(|e| PersistError::Corrupt(e.to_string()))
}
