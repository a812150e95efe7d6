//! Append-only JSONL persistence shared by the audit stores.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use ifox_domain::Result;

pub struct JsonlFile {
    path: PathBuf,
}

impl JsonlFile {
    pub fn new(dir: &Path, name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(name),
        })
    }

    /// Append one record. Each record is a single line; a torn trailing
    /// line from a crash is skipped at load time.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Replay every parseable record in file order.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "skipping corrupt jsonl line");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Row {
        id: u32,
        name: String,
    }

    #[test]
    fn append_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonlFile::new(dir.path(), "rows.jsonl").unwrap();
        file.append(&Row { id: 1, name: "a".into() }).unwrap();
        file.append(&Row { id: 2, name: "b".into() }).unwrap();
        let rows: Vec<Row> = file.load().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, 2);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonlFile::new(dir.path(), "rows.jsonl").unwrap();
        file.append(&Row { id: 1, name: "a".into() }).unwrap();
        std::fs::write(
            dir.path().join("rows.jsonl"),
            "{\"id\":1,\"name\":\"a\"}\nnot json\n",
        )
        .unwrap();
        let rows: Vec<Row> = file.load().unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonlFile::new(dir.path(), "rows.jsonl").unwrap();
        let rows: Vec<Row> = file.load().unwrap();
        assert!(rows.is_empty());
    }
}
