//! Durable round-robin position for cycle mode.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::fsutil;

#[derive(Debug, Serialize, Deserialize)]
struct CycleRecord {
    last_index: i64,
}

/// Index of the last model tested in cycle mode, persisted as
/// `{"last_index": n}`. Starts at `-1`.
#[derive(Debug)]
pub struct CycleState {
    path: PathBuf,
    last_index: i64,
}

impl CycleState {
    /// Load the state, starting over when the file is missing or unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_index = match fs::read(&path) {
            Ok(raw) => match serde_json::from_slice::<CycleRecord>(&raw) {
                Ok(record) => record.last_index,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Resetting corrupt cycle state"
                    );
                    -1
                }
            },
            Err(_) => -1,
        };
        Self { path, last_index }
    }

    pub fn last_index(&self) -> i64 {
        self.last_index
    }

    /// Advance by one modulo `count` and persist. `None` when `count` is 0.
    pub fn advance(&mut self, count: usize) -> Result<Option<usize>, StoreError> {
        if count == 0 {
            return Ok(None);
        }
        let next = (self.last_index + 1).rem_euclid(count as i64);
        self.last_index = next;

        let json = serde_json::to_vec(&CycleRecord { last_index: next })?;
        fsutil::write_atomic(&self.path, &json)?;
        Ok(Some(next as usize))
    }

    /// Pick the next item in round-robin order.
    pub fn next_item<'a, T>(&mut self, items: &'a [T]) -> Result<Option<&'a T>, StoreError> {
        Ok(self.advance(items.len())?.map(|i| &items[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_minus_one_and_wraps() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(".cycle_state.json");
        let items = ["a", "b", "c"];

        let mut state = CycleState::load(&path);
        assert_eq!(state.last_index(), -1);

        let picked: Vec<&str> = (0..4)
            .map(|_| *state.next_item(&items).expect("advance").expect("non-empty"))
            .collect();
        assert_eq!(picked, ["a", "b", "c", "a"]);
    }

    #[test]
    fn persists_across_loads() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(".cycle_state.json");

        CycleState::load(&path).advance(5).expect("advance");
        CycleState::load(&path).advance(5).expect("advance");
        assert_eq!(CycleState::load(&path).last_index(), 1);
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            r#"{"last_index":1}"#
        );
    }

    #[test]
    fn shrinking_candidate_list_stays_in_range() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(".cycle_state.json");
        fs::write(&path, r#"{"last_index": 7}"#).expect("write");

        let mut state = CycleState::load(&path);
        assert_eq!(state.advance(3).expect("advance"), Some(2));
        assert_eq!(state.advance(0).expect("advance"), None);
    }

    #[test]
    fn corrupt_state_restarts() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(".cycle_state.json");
        fs::write(&path, "garbage").expect("write");
        assert_eq!(CycleState::load(&path).last_index(), -1);
    }
}
