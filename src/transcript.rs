//! Turn records and the append-only transcript log.
//!
//! A replay emits [`TurnRecord`]s with `turn_index` 0, 1, 2, ... and no gaps.
//! Each record goes to a [`TurnSink`] before the next replay step runs:
//!
//! - [`TranscriptWriter`] appends one JSON line per turn to
//!   `transcript.jsonl` and fsyncs before returning, so a run that dies
//!   mid-replay leaves a valid, strictly ordered prefix on disk.
//! - [`TurnLog`] is the in-memory form, used by the analysis stages and as a
//!   sink in tests.
//!
//! Both sinks reject a record whose index is not exactly the next one.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the per-run transcript.
pub const TRANSCRIPT_FILE: &str = "transcript.jsonl";

// ---------------------------------------------------------------------------
// TurnRecord
// ---------------------------------------------------------------------------

/// Who authored a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The initial system prompt.
    System,
    /// Scripted user text.
    User,
    /// Generated assistant text.
    Assistant,
}

impl TurnRole {
    /// Lowercase name, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded turn. Field order matches the on-disk JSON line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Position in the run, from 0.
    pub turn_index: u64,
    /// Who authored the turn.
    pub role: TurnRole,
    /// Verbatim text.
    pub content: String,
    /// Scenario node that produced the turn (`"system"` for the system prompt).
    pub node_id: Option<String>,
    /// Phase tag copied from the node.
    pub phase: Option<String>,
}

// ---------------------------------------------------------------------------
// TranscriptError
// ---------------------------------------------------------------------------

/// Errors writing or reading a transcript.
#[derive(Debug)]
pub enum TranscriptError {
    /// A record arrived with the wrong index.
    OutOfOrder {
        /// The index the sink expected next.
        expected: u64,
        /// The index it was given.
        got: u64,
    },

    /// A line in a transcript file is not a valid record.
    Malformed {
        /// File being read.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Parser message.
        detail: String,
    },

    /// Serializing a record failed.
    Serialize(serde_json::Error),

    /// File system error.
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

impl fmt::Display for TranscriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder { expected, got } => write!(
                f,
                "turn index {got} out of order (expected {expected}); transcripts are append-only"
            ),
            Self::Malformed { path, line, detail } => {
                write!(f, "{}:{line}: malformed turn record: {detail}", path.display())
            }
            Self::Serialize(e) => write!(f, "failed to serialize turn record: {e}"),
            Self::Io { path, source } => write!(f, "I/O error on {}: {source}", path.display()),
        }
    }
}

impl std::error::Error for TranscriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialize(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Somewhere turn records are appended during a replay.
pub trait TurnSink {
    /// Index the next record must carry.
    fn next_index(&self) -> u64;

    /// Append `record`, making it durable before returning.
    ///
    /// # Errors
    /// Returns [`TranscriptError::OutOfOrder`] if `record.turn_index` is not
    /// [`TurnSink::next_index`], or an I/O error from the backing store.
    fn append(&mut self, record: &TurnRecord) -> Result<(), TranscriptError>;
}

/// An ordered, gap-free sequence of turn records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TurnLog {
    records: Vec<TurnRecord>,
}

impl TurnLog {
    /// An empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Build a log from records, checking the index sequence.
    ///
    /// # Errors
    /// Returns [`TranscriptError::OutOfOrder`] at the first bad index.
    pub fn from_records(records: Vec<TurnRecord>) -> Result<Self, TranscriptError> {
        let mut log = Self::new();
        for record in records {
            log.append(&record)?;
        }
        Ok(log)
    }

    /// Records in turn order.
    #[must_use]
    pub fn records(&self) -> &[TurnRecord] {
        &self.records
    }

    /// Iterate records in turn order.
    pub fn iter(&self) -> std::slice::Iter<'_, TurnRecord> {
        self.records.iter()
    }

    /// Record with the given index.
    #[must_use]
    pub fn get(&self, turn_index: u64) -> Option<&TurnRecord> {
        usize::try_from(turn_index)
            .ok()
            .and_then(|i| self.records.get(i))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a TurnLog {
    type Item = &'a TurnRecord;
    type IntoIter = std::slice::Iter<'a, TurnRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl TurnSink for TurnLog {
    fn next_index(&self) -> u64 {
        self.records.len() as u64
    }

    fn append(&mut self, record: &TurnRecord) -> Result<(), TranscriptError> {
        check_order(self.next_index(), record)?;
        self.records.push(record.clone());
        Ok(())
    }
}

/// Append-only, fsync-per-turn JSONL writer.
#[derive(Debug)]
pub struct TranscriptWriter {
    path: PathBuf,
    file: File,
    next_index: u64,
}

impl TranscriptWriter {
    /// Create a new transcript at `path`. Fails if the file already exists:
    /// each run owns a fresh transcript.
    ///
    /// # Errors
    /// Returns [`TranscriptError::Io`] if the file exists or cannot be created.
    pub fn create(path: &Path) -> Result<Self, TranscriptError> {
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)
            .map_err(|source| TranscriptError::Io {
                path: path.to_owned(),
                source,
            })?;
        Ok(Self {
            path: path.to_owned(),
            file,
            next_index: 0,
        })
    }

    /// Path of the transcript file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TurnSink for TranscriptWriter {
    fn next_index(&self) -> u64 {
        self.next_index
    }

    fn append(&mut self, record: &TurnRecord) -> Result<(), TranscriptError> {
        check_order(self.next_index, record)?;

        let mut line = serde_json::to_vec(record).map_err(TranscriptError::Serialize)?;
        line.push(b'\n');

        let io = |source| TranscriptError::Io {
            path: self.path.clone(),
            source,
        };
        self.file.write_all(&line).map_err(io)?;
        self.file.sync_data().map_err(io)?;

        self.next_index += 1;
        Ok(())
    }
}

fn check_order(expected: u64, record: &TurnRecord) -> Result<(), TranscriptError> {
    if record.turn_index == expected {
        Ok(())
    } else {
        Err(TranscriptError::OutOfOrder {
            expected,
            got: record.turn_index,
        })
    }
}

/// Read a `transcript.jsonl` file back into a [`TurnLog`].
///
/// Blank lines are skipped. A partially written run is fine as long as every
/// line present is complete.
///
/// # Errors
/// Returns [`TranscriptError::Malformed`] for an unparseable line,
/// [`TranscriptError::OutOfOrder`] for an index gap or repeat, or
/// [`TranscriptError::Io`] if the file cannot be read.
pub fn read_transcript(path: &Path) -> Result<TurnLog, TranscriptError> {
    let io = |source| TranscriptError::Io {
        path: path.to_owned(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io)?);

    let mut log = TurnLog::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(io)?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TurnRecord =
            serde_json::from_str(&line).map_err(|e| TranscriptError::Malformed {
                path: path.to_owned(),
                line: i + 1,
                detail: e.to_string(),
            })?;
        log.append(&record)?;
    }
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(turn_index: u64, role: TurnRole, content: &str) -> TurnRecord {
        TurnRecord {
            turn_index,
            role,
            content: content.to_owned(),
            node_id: None,
            phase: None,
        }
    }

    #[test]
    fn record_serializes_with_null_fields() {
        let json = serde_json::to_string(&rec(0, TurnRole::System, "be nice")).unwrap();
        assert_eq!(
            json,
            r#"{"turn_index":0,"role":"system","content":"be nice","node_id":null,"phase":null}"#
        );
    }

    #[test]
    fn writer_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRANSCRIPT_FILE);
        let mut w = TranscriptWriter::create(&path).unwrap();
        w.append(&rec(0, TurnRole::User, "hi")).unwrap();
        w.append(&rec(1, TurnRole::Assistant, "hello\nthere")).unwrap();
        assert_eq!(w.next_index(), 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2, "one line per turn: {raw:?}");

        let log = read_transcript(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(1).unwrap().content, "hello\nthere");
    }

    #[test]
    fn writer_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRANSCRIPT_FILE);
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            TranscriptWriter::create(&path),
            Err(TranscriptError::Io { .. })
        ));
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let mut log = TurnLog::new();
        log.append(&rec(0, TurnRole::User, "a")).unwrap();
        let err = log.append(&rec(2, TurnRole::User, "c")).unwrap_err();
        assert!(matches!(err, TranscriptError::OutOfOrder { expected: 1, got: 2 }));
        let err = log.append(&rec(0, TurnRole::User, "again")).unwrap_err();
        assert!(matches!(err, TranscriptError::OutOfOrder { expected: 1, got: 0 }));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn reader_reports_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRANSCRIPT_FILE);
        std::fs::write(
            &path,
            "{\"turn_index\":0,\"role\":\"user\",\"content\":\"x\",\"node_id\":null,\"phase\":null}\n\n{oops\n",
        )
        .unwrap();
        match read_transcript(&path).unwrap_err() {
            TranscriptError::Malformed { line, .. } => assert_eq!(line, 3),
            other => panic!("expected Malformed, got {other}"),
        }
    }

    #[test]
    fn reader_rejects_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRANSCRIPT_FILE);
        let lines = [rec(0, TurnRole::User, "a"), rec(2, TurnRole::Assistant, "b")]
            .iter()
            .map(|r| serde_json::to_string(r).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(&path, lines).unwrap();
        assert!(matches!(
            read_transcript(&path),
            Err(TranscriptError::OutOfOrder { expected: 1, got: 2 })
        ));
    }
}
