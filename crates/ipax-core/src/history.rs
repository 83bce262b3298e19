use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::command::Action;
use crate::runner::RunOutcome;

const HISTORY_FILE: &str = "runs.jsonl";
const MAX_HISTORY_BYTES: u64 = 2 * 1024 * 1024;

/// One finished action. Credentials are never recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub at_unix_millis: i64,
    pub action: Action,
    pub host: String,
    pub exit_code: Option<i32>,
    pub elapsed_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn finished(action: Action, host: &str, outcome: &RunOutcome) -> Self {
        Self {
            at_unix_millis: ipax_util::now_millis(),
            action,
            host: host.to_string(),
            exit_code: Some(outcome.exit_code),
            elapsed_millis: outcome.elapsed.as_millis() as u64,
            error: None,
        }
    }

    pub fn failed(action: Action, host: &str, error: &str) -> Self {
        Self {
            at_unix_millis: ipax_util::now_millis(),
            action,
            host: host.to_string(),
            exit_code: None,
            elapsed_millis: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Append-only JSON lines journal of finished actions.
#[derive(Clone, Debug)]
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(HISTORY_FILE),
        }
    }

    pub fn default_location() -> Self {
        Self::new(&ipax_util::history_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &RunRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        rotate_if_needed(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record).map_err(io::Error::other)?;
        writeln!(file, "{line}")
    }

    /// Newest last, reading the rotated journal before the live one.
    /// Unparseable lines are skipped.
    pub fn recent(&self, limit: usize) -> io::Result<Vec<RunRecord>> {
        let mut records = read_records(&rotated_path(&self.path))?;
        records.extend(read_records(&self.path)?);
        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        Ok(records)
    }
}

fn rotated_path(path: &Path) -> PathBuf {
    path.with_extension("jsonl.1")
}

fn read_records(path: &Path) -> io::Result<Vec<RunRecord>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    Ok(bytes
        .split(|byte| *byte == b'\n')
        .filter_map(|line| serde_json::from_slice(line).ok())
        .collect())
}

fn rotate_if_needed(path: &Path) -> io::Result<()> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() >= MAX_HISTORY_BYTES {
            let rotated = rotated_path(path);
            let _ = fs::remove_file(&rotated);
            fs::rename(path, rotated)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_back_newest_last() {
        let temp = tempdir().unwrap();
        let history = RunHistory::new(temp.path());
        let outcome = RunOutcome {
            stdout: "Connected\n".into(),
            stderr: String::new(),
            exit_code: 0,
            elapsed: Duration::from_millis(321),
        };

        history
            .append(&RunRecord::finished(Action::Probe, "10.0.0.2", &outcome))
            .unwrap();
        history
            .append(&RunRecord::failed(
                Action::Download,
                "10.0.0.2",
                "rsync not found",
            ))
            .unwrap();

        let records = history.recent(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, Action::Probe);
        assert_eq!(records[0].elapsed_millis, 321);
        assert_eq!(records[1].exit_code, None);
        assert_eq!(records[1].error.as_deref(), Some("rsync not found"));

        let last_only = history.recent(1).unwrap();
        assert_eq!(last_only[0].action, Action::Download);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let temp = tempdir().unwrap();
        let history = RunHistory::new(&temp.path().join("none"));
        assert!(history.recent(5).unwrap().is_empty());
    }

    #[test]
    fn oversized_journal_is_rotated() {
        let temp = tempdir().unwrap();
        let history = RunHistory::new(temp.path());
        fs::write(history.path(), vec![b'x'; MAX_HISTORY_BYTES as usize]).unwrap();

        history
            .append(&RunRecord::failed(Action::Probe, "h", "boom"))
            .unwrap();

        assert!(history.path().with_extension("jsonl.1").exists());
        assert_eq!(history.recent(10).unwrap().len(), 1);
    }

    #[test]
    fn corrupt_lines_do_not_hide_later_records() {
        let temp = tempdir().unwrap();
        let history = RunHistory::new(temp.path());
        history
            .append(&RunRecord::failed(Action::Probe, "h", "first"))
            .unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(history.path())
            .unwrap();
        file.write_all(b"{\"truncated\xff\xfe\n").unwrap();
        file.write_all(b"not json\n").unwrap();
        drop(file);
        history
            .append(&RunRecord::failed(Action::Download, "h", "last"))
            .unwrap();

        let records = history.recent(10).unwrap();
        let errors: Vec<_> = records.iter().map(|r| r.error.as_deref()).collect();
        assert_eq!(errors, vec![Some("first"), Some("last")]);
    }

    #[test]
    fn rotated_records_stay_visible() {
        let temp = tempdir().unwrap();
        let history = RunHistory::new(temp.path());
        history
            .append(&RunRecord::failed(Action::Probe, "h", "old"))
            .unwrap();
        fs::rename(history.path(), history.path().with_extension("jsonl.1")).unwrap();
        history
            .append(&RunRecord::failed(Action::Execute, "h", "new"))
            .unwrap();

        let records = history.recent(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].error.as_deref(), Some("old"));
        assert_eq!(records[1].error.as_deref(), Some("new"));
        assert_eq!(history.recent(1).unwrap()[0].action, Action::Execute);
    }
}
