//! Per-block checkpoint files for resumable collection
//!
//! Every block's fetched details are written as soon as the block finishes,
//! one JSON array of detail payloads per file:
//!
//! ```text
//! checkpoints/
//!   block_0000.json
//!   block_0001.json
//!   block_0002.json
//! ```
//!
//! Files are written to a temporary path and renamed into place, so a crash
//! mid-write never leaves a truncated checkpoint behind.
//!
//! # Example
//!
//! ```no_run
//! use gather::models::RecordSchema;
//! use gather::storage::checkpoint::CheckpointWriter;
//!
//! # fn example() -> Result<(), gather::error::CheckpointError> {
//! let writer = CheckpointWriter::new("./checkpoints", "block", RecordSchema::default())?;
//!
//! if let Some(details) = writer.load(0)? {
//!     println!("Block 0 already holds {} records", details.len());
//! }
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::{DetailRecord, RecordId, RecordSchema};
use crate::utils::error::CheckpointError;

/// Writes and reads block checkpoint files in one directory
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    dir: PathBuf,
    prefix: String,
    schema: RecordSchema,
}

impl CheckpointWriter {
    /// Create a writer, creating `dir` if needed
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        schema: RecordSchema,
    ) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CheckpointError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        Ok(Self {
            dir,
            prefix: prefix.into(),
            schema,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Storage key of a block: `{prefix}_{index:04}.json`
    pub fn key(&self, block_index: usize) -> String {
        format!("{}_{:04}.json", self.prefix, block_index)
    }

    pub fn path(&self, block_index: usize) -> PathBuf {
        self.dir.join(self.key(block_index))
    }

    /// Write a block's details, replacing any previous file for the block
    pub fn persist(
        &self,
        block_index: usize,
        details: &[DetailRecord],
    ) -> Result<PathBuf, CheckpointError> {
        // Ids are read back from the payload on load
        if let Some(detail) = details
            .iter()
            .find(|d| self.schema.id_of(&d.payload).as_ref() != Some(&d.id))
        {
            return Err(CheckpointError::Unkeyed {
                id: detail.id.to_string(),
                field: self.schema.id_field.clone(),
            });
        }

        let path = self.path(block_index);
        let temp_path = self.dir.join(format!("{}.tmp", self.key(block_index)));

        let io_err = |source: io::Error| CheckpointError::Io {
            path: temp_path.clone(),
            source,
        };

        let file = File::create(&temp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        let payloads: Vec<&Value> = details.iter().map(|d| &d.payload).collect();
        serde_json::to_writer_pretty(&mut writer, &payloads)
            .map_err(|e| io_err(io::Error::from(e)))?;
        writer.flush().map_err(io_err)?;
        drop(writer);

        fs::rename(&temp_path, &path).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), records = details.len(), "Checkpoint saved");
        Ok(path)
    }

    /// Load a block's stored details; `None` when the block was never written
    ///
    /// Stored payloads without a readable id are skipped.
    pub fn load(&self, block_index: usize) -> Result<Option<Vec<DetailRecord>>, CheckpointError> {
        let path = self.path(block_index);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;

        let payloads: Vec<Value> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| CheckpointError::Corrupt {
                path: path.clone(),
                source,
            })?;

        let total = payloads.len();
        let details: Vec<DetailRecord> = payloads
            .into_iter()
            .filter_map(|payload| DetailRecord::from_payload(payload, &self.schema))
            .collect();

        if details.len() < total {
            tracing::warn!(
                path = %path.display(),
                skipped = total - details.len(),
                id_field = %self.schema.id_field,
                "Checkpoint entries without an id were skipped"
            );
        }

        tracing::debug!(path = %path.display(), records = details.len(), "Checkpoint loaded");
        Ok(Some(details))
    }

    /// Indices of all stored blocks, ascending
    pub fn list_blocks(&self) -> Result<Vec<usize>, CheckpointError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut indices = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CheckpointError::Io {
                path: self.dir.clone(),
                source,
            })?;

            if let Some(index) = entry.file_name().to_str().and_then(|n| self.parse_key(n)) {
                indices.push(index);
            }
        }

        indices.sort_unstable();
        Ok(indices)
    }

    /// Every stored detail keyed by id; later blocks win on repeated ids
    pub fn load_all(&self) -> Result<BTreeMap<RecordId, DetailRecord>, CheckpointError> {
        let mut merged = BTreeMap::new();
        for index in self.list_blocks()? {
            if let Some(details) = self.load(index)? {
                for detail in details {
                    merged.insert(detail.id.clone(), detail);
                }
            }
        }
        Ok(merged)
    }

    /// Delete one block file if it exists
    pub fn remove(&self, block_index: usize) -> Result<(), CheckpointError> {
        let path = self.path(block_index);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "Checkpoint deleted");
        }
        Ok(())
    }

    /// Delete every block file of this prefix; returns how many were removed
    pub fn clear(&self) -> Result<usize, CheckpointError> {
        let indices = self.list_blocks()?;
        for index in &indices {
            self.remove(*index)?;
        }
        Ok(indices.len())
    }

    fn parse_key(&self, file_name: &str) -> Option<usize> {
        file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn writer(dir: &TempDir) -> CheckpointWriter {
        CheckpointWriter::new(dir.path(), "block", RecordSchema::default()).unwrap()
    }

    fn detail(id: u64) -> DetailRecord {
        DetailRecord::new(id.into(), json!({"numero": id, "valor_total": "10.00"}))
    }

    #[test]
    fn test_key_is_zero_padded() {
        let dir = TempDir::new().unwrap();
        let writer = writer(&dir);
        assert_eq!(writer.key(0), "block_0000.json");
        assert_eq!(writer.key(17), "block_0017.json");
        assert_eq!(writer.key(12345), "block_12345.json");
    }

    #[test]
    fn test_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let writer = CheckpointWriter::new(&nested, "block", RecordSchema::default()).unwrap();
        assert!(writer.dir().is_dir());
    }

    #[test]
    fn test_load_absent_block() {
        let dir = TempDir::new().unwrap();
        assert!(writer(&dir).load(3).unwrap().is_none());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = TempDir::new().unwrap();
        let writer = writer(&dir);
        let details = vec![detail(1), detail(2), detail(3)];

        let path = writer.persist(0, &details).unwrap();
        assert!(path.ends_with("block_0000.json"));
        assert!(!dir.path().join("block_0000.json.tmp").exists());

        assert_eq!(writer.load(0).unwrap(), Some(details));
    }

    #[test]
    fn test_persist_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let writer = writer(&dir);
        let details = vec![detail(5), detail(6)];

        let first = writer.persist(2, &details).unwrap();
        let first_bytes = fs::read(&first).unwrap();
        let second = writer.persist(2, &details).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(&second).unwrap(), first_bytes);
        assert_eq!(writer.list_blocks().unwrap(), vec![2]);
    }

    #[test]
    fn test_persist_rejects_record_without_its_id() {
        let dir = TempDir::new().unwrap();
        let writer = writer(&dir);
        let unkeyed = DetailRecord::new("5".into(), json!({"id": 5, "valor_total": "1.00"}));
        let renumbered = DetailRecord::new("7".into(), json!({"numero": 8}));

        for record in [unkeyed, renumbered] {
            let err = writer.persist(0, &[detail(1), record]).unwrap_err();
            assert!(matches!(err, CheckpointError::Unkeyed { .. }));
        }
        assert!(writer.load(0).unwrap().is_none());
    }

    #[test]
    fn test_load_skips_entries_without_id() {
        let dir = TempDir::new().unwrap();
        let writer = writer(&dir);
        fs::write(
            writer.path(1),
            r#"[{"numero": 1}, {"sem_numero": true}, {"numero": "2"}]"#,
        )
        .unwrap();

        let loaded = writer.load(1).unwrap().unwrap();
        let ids: Vec<_> = loaded.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let writer = writer(&dir);
        fs::write(writer.path(0), "{not json").unwrap();
        assert!(matches!(
            writer.load(0),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_list_load_all_and_clear() {
        let dir = TempDir::new().unwrap();
        let writer = writer(&dir);
        writer.persist(1, &[detail(3)]).unwrap();
        writer.persist(0, &[detail(1), detail(2)]).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("other_0000.json"), "[]").unwrap();

        assert_eq!(writer.list_blocks().unwrap(), vec![0, 1]);

        let all = writer.load_all().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains_key(&RecordId::from("3")));

        writer.remove(1).unwrap();
        assert_eq!(writer.list_blocks().unwrap(), vec![0]);

        assert_eq!(writer.clear().unwrap(), 1);
        assert!(writer.list_blocks().unwrap().is_empty());
        assert!(dir.path().join("other_0000.json").exists());
    }
}
