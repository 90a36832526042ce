use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Number of completed moves kept for display
pub const MAX_RECENT_MOVES: usize = 10;

/// One completed move; never mutated after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMoveRecord {
    pub id: Uuid,
    pub file_name: String,
    /// Directory the file was moved out of
    pub from_path: Utf8PathBuf,
    /// Final resolved path, including any collision suffix
    pub to_path: Utf8PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl FileMoveRecord {
    pub fn new(
        file_name: impl Into<String>,
        from_path: impl Into<Utf8PathBuf>,
        to_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            from_path: from_path.into(),
            to_path: to_path.into(),
            timestamp: Utc::now(),
        }
    }

    /// Last component of the source directory, e.g. `Downloads`
    pub fn source_folder(&self) -> &str {
        self.from_path.file_name().unwrap_or(self.from_path.as_str())
    }

    /// Name of the rule folder the file landed in, e.g. `Documents`
    pub fn destination_folder(&self) -> &str {
        self.to_path
            .parent()
            .and_then(Utf8Path::file_name)
            .unwrap_or(self.to_path.as_str())
    }

    /// Final file name after collision resolution
    pub fn final_name(&self) -> &str {
        self.to_path.file_name().unwrap_or(self.file_name.as_str())
    }
}

/// Bounded, most-recent-first record of completed moves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveHistory {
    entries: VecDeque<FileMoveRecord>,
    capacity: usize,
}

impl Default for MoveHistory {
    fn default() -> Self {
        Self::with_capacity(MAX_RECENT_MOVES)
    }
}

impl MoveHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is raised to one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Insert at index 0, evicting the oldest entry once over capacity
    pub fn record(&mut self, record: FileMoveRecord) {
        self.entries.push_front(record);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, index: usize) -> Option<&FileMoveRecord> {
        self.entries.get(index)
    }

    pub fn latest(&self) -> Option<&FileMoveRecord> {
        self.entries.front()
    }

    /// Newest first
    pub fn iter(&self) -> impl Iterator<Item = &FileMoveRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
