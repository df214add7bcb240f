use std::path::PathBuf;

use growpromise_shared::domain::{AssignmentId, DependentId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::AppError;
use crate::remote::Remote;

/// One captured offline action. A tagged variant per action type keeps
/// replay dispatch exhaustive when new actions are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingAction {
    SubmitVerification {
        dependent_id: DependentId,
        assignment_id: AssignmentId,
        image_ref: String,
        note: Option<String>,
    },
}

impl PendingAction {
    pub fn describe(&self) -> String {
        match self {
            PendingAction::SubmitVerification { assignment_id, .. } => {
                format!("submit verification for assignment {assignment_id}")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub seq: u64,
    pub enqueued_at: String, // RFC3339 UTC
    pub action: PendingAction,
}

#[derive(Debug)]
pub enum ReplayOutcome {
    /// The server accepted the action; the entry was removed.
    Replayed,
    /// The server answered with a domain refusal; the entry stays queued
    /// until the user drops it or the state changes.
    Rejected {
        kind: Option<String>,
        message: String,
    },
    /// The server was unreachable; the entry stays queued for the next
    /// drain attempt.
    Transport { message: String },
}

#[derive(Debug)]
pub struct ReplayReport {
    pub seq: u64,
    pub action: PendingAction,
    pub outcome: ReplayOutcome,
}

impl ReplayReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ReplayOutcome::Replayed)
    }
}

/// Durable, order-preserving queue of actions captured while offline.
/// Entries are removed one at a time as they replay, so a partial drain
/// preserves exactly the entries that have not succeeded yet.
#[derive(Debug)]
pub struct PendingQueue {
    path: PathBuf,
    entries: Vec<QueueEntry>,
    next_seq: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueFile {
    next_seq: u64,
    entries: Vec<QueueEntry>,
}

impl PendingQueue {
    pub fn open(path: PathBuf) -> Result<Self, AppError> {
        let file = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str::<QueueFile>(&data)
                .map_err(|e| AppError::Queue(format!("parse {} failed: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => QueueFile::default(),
            Err(e) => {
                return Err(AppError::Queue(format!(
                    "read {} failed: {e}",
                    path.display()
                )));
            }
        };
        // Monotonic even if the tail of the file was enqueued long ago.
        let max_seq = file.entries.iter().map(|e| e.seq).max().unwrap_or(0);
        Ok(Self {
            path,
            next_seq: file.next_seq.max(max_seq + 1),
            entries: file.entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Appends with a monotonically increasing sequence and persists
    /// before returning.
    pub fn enqueue(&mut self, action: PendingAction) -> Result<u64, AppError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(QueueEntry {
            seq,
            enqueued_at: chrono::Utc::now().to_rfc3339(),
            action,
        });
        self.persist()?;
        debug!(seq, "action enqueued");
        Ok(seq)
    }

    /// Manual removal of a poisoned entry.
    pub fn drop_entry(&mut self, seq: u64) -> Result<bool, AppError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.seq != seq);
        let dropped = self.entries.len() != before;
        if dropped {
            self.persist()?;
        }
        Ok(dropped)
    }

    /// Replays entries in enqueue order. Each success is removed and
    /// persisted individually; a failing entry never aborts the drain of
    /// the entries behind it. Failures are reported, not thrown.
    pub async fn drain(&mut self, remote: &dyn Remote) -> Result<Vec<ReplayReport>, AppError> {
        let pending: Vec<QueueEntry> = self.entries.clone();
        let mut reports = Vec::with_capacity(pending.len());
        for entry in pending {
            let result = match &entry.action {
                PendingAction::SubmitVerification {
                    dependent_id,
                    assignment_id,
                    image_ref,
                    note,
                } => {
                    remote
                        .submit_verification(
                            &dependent_id.0,
                            &assignment_id.0,
                            image_ref,
                            note.as_deref(),
                        )
                        .await
                }
            };
            let outcome = match result {
                Ok(()) => {
                    self.entries.retain(|e| e.seq != entry.seq);
                    self.persist()?;
                    info!(seq = entry.seq, "queued action replayed");
                    ReplayOutcome::Replayed
                }
                Err(e) if e.is_transport() => {
                    warn!(seq = entry.seq, error = %e, "replay failed; server unreachable");
                    ReplayOutcome::Transport {
                        message: e.to_string(),
                    }
                }
                Err(e) => {
                    warn!(seq = entry.seq, error = %e, "replay rejected by server");
                    ReplayOutcome::Rejected {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };
            reports.push(ReplayReport {
                seq: entry.seq,
                action: entry.action,
                outcome,
            });
        }
        Ok(reports)
    }

    fn persist(&self) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = QueueFile {
            next_seq: self.next_seq,
            entries: self.entries.clone(),
        };
        let data = serde_json::to_string_pretty(&file)
            .map_err(|e| AppError::Queue(format!("serialize queue failed: {e}")))?;
        std::fs::write(&self.path, data)
            .map_err(|e| AppError::Queue(format!("write {} failed: {e}", self.path.display())))
    }
}
