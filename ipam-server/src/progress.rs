//! In-memory generation progress board

use chrono::Utc;
use dashmap::DashMap;
use ipam_common::protocol::{GenerationProgress, GenerationState};
use uuid::Uuid;

/// Latest generation progress per subnet
#[derive(Debug, Default)]
pub struct ProgressBoard {
    entries: DashMap<Uuid, GenerationProgress>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the subnet's entry for a new run of `total` addresses
    pub fn start(&self, subnet_id: Uuid, total: u64, regenerate: bool) {
        let now = Utc::now();
        self.entries.insert(
            subnet_id,
            GenerationProgress {
                subnet_id,
                state: GenerationState::Running,
                written: 0,
                inserted: 0,
                total,
                batches: 0,
                regenerate,
                started_at: now,
                updated_at: now,
            },
        );
    }

    /// Record a committed batch
    pub fn advance(&self, subnet_id: Uuid, written: u64, inserted: u64, batches: u32) {
        if let Some(mut entry) = self.entries.get_mut(&subnet_id) {
            entry.written = written;
            entry.inserted = inserted;
            entry.batches = batches;
            entry.updated_at = Utc::now();
        }
    }

    /// Close the running entry; `false` if no run is in flight
    pub fn finish(&self, subnet_id: Uuid, state: GenerationState) -> bool {
        match self.entries.get_mut(&subnet_id) {
            Some(mut entry) if entry.state == GenerationState::Running => {
                entry.state = state;
                entry.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Record a run that failed before writing anything
    pub fn reject(&self, subnet_id: Uuid, regenerate: bool) {
        self.start(subnet_id, 0, regenerate);
        self.finish(subnet_id, GenerationState::Failed);
    }

    pub fn get(&self, subnet_id: Uuid) -> Option<GenerationProgress> {
        self.entries.get(&subnet_id).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_lifecycle() {
        let board = ProgressBoard::new();
        let subnet_id = Uuid::new_v4();
        assert!(board.get(subnet_id).is_none());

        board.start(subnet_id, 1_000, false);
        board.advance(subnet_id, 500, 480, 1);

        let progress = board.get(subnet_id).unwrap();
        assert_eq!(progress.state, GenerationState::Running);
        assert_eq!((progress.written, progress.inserted, progress.batches), (500, 480, 1));

        assert!(board.finish(subnet_id, GenerationState::Failed));
        assert_eq!(board.get(subnet_id).unwrap().state, GenerationState::Failed);
        assert!(!board.finish(subnet_id, GenerationState::Completed));

        // A new run starts from zero
        board.start(subnet_id, 1_000, true);
        let progress = board.get(subnet_id).unwrap();
        assert_eq!(progress.written, 0);
        assert!(progress.regenerate);
    }

    #[test]
    fn test_reject_replaces_finished_run() {
        let board = ProgressBoard::new();
        let subnet_id = Uuid::new_v4();

        board.start(subnet_id, 254, false);
        board.advance(subnet_id, 254, 254, 1);
        board.finish(subnet_id, GenerationState::Completed);

        board.reject(subnet_id, true);
        let progress = board.get(subnet_id).unwrap();
        assert_eq!(progress.state, GenerationState::Failed);
        assert_eq!((progress.written, progress.total), (0, 0));
        assert!(progress.regenerate);
    }
}
