#![deny(warnings)]

//! Persistence layer: the append-only score log and save-game files.
//!
//! Scores are stored one JSON object per line, so appending never rewrites
//! earlier records. Save games are written either as pretty JSON or as a
//! tagged bincode blob, chosen by file extension.

use budget_engine::SaveGame;
use budget_score::{leaderboard, PlayerScore};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Magic bytes opening a binary save.
const MAGIC: &[u8; 4] = b"BQSV";

/// Binary save format version.
const VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("score log line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("not a binary save file")]
    BadMagic,
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u8),
}

/// Default location of the local score log.
pub fn default_scores_path() -> PathBuf {
    PathBuf::from("./saves/scores.jsonl")
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Append-only log of finished games.
#[derive(Clone, Debug)]
pub struct ScoreLog {
    path: PathBuf,
}

impl ScoreLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file and its directory if needed.
    pub fn append(&self, record: &PlayerScore) -> Result<(), PersistenceError> {
        ensure_parent(&self.path)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        info!(player = %record.player_name, score = record.score, path = %self.path.display(), "score recorded");
        Ok(())
    }

    /// Every record in write order. A missing log is empty.
    pub fn load_all(&self) -> Result<Vec<PlayerScore>, PersistenceError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|source| PersistenceError::Record {
                line: idx + 1,
                source,
            })?;
            records.push(record);
        }
        debug!(count = records.len(), "score log loaded");
        Ok(records)
    }

    /// Best `limit` records, ranked.
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerScore>, PersistenceError> {
        let mut ranked = leaderboard(self.load_all()?);
        ranked.truncate(limit);
        Ok(ranked)
    }
}

/// Encode a save as a tagged bincode blob.
pub fn encode_save(save: &SaveGame) -> Result<Vec<u8>, PersistenceError> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend(bincode::serialize(save)?);
    Ok(out)
}

pub fn decode_save(bytes: &[u8]) -> Result<SaveGame, PersistenceError> {
    let body = bytes.strip_prefix(MAGIC).ok_or(PersistenceError::BadMagic)?;
    match body.split_first() {
        Some((&VERSION, rest)) => Ok(bincode::deserialize(rest)?),
        Some((&v, _)) => Err(PersistenceError::UnsupportedVersion(v)),
        None => Err(PersistenceError::BadMagic),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Write a save game; `.json` paths get JSON, anything else bincode.
pub fn write_save(path: &Path, save: &SaveGame) -> Result<(), PersistenceError> {
    ensure_parent(path)?;
    if is_json(path) {
        fs::write(path, serde_json::to_vec_pretty(save)?)?;
    } else {
        fs::write(path, encode_save(save)?)?;
    }
    info!(path = %path.display(), month = save.state.current_month, "game saved");
    Ok(())
}

pub fn read_save(path: &Path) -> Result<SaveGame, PersistenceError> {
    let bytes = fs::read(path)?;
    if is_json(path) {
        Ok(serde_json::from_slice(&bytes)?)
    } else {
        decode_save(&bytes)
    }
}
