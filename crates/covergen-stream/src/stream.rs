use crate::accumulator::GeneratedLetter;
use crate::errors::RunFailure;
use crate::event::TokenUsage;

/// Typed events exposed by `GenerationStream`.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationEvent {
    /// First event for every run.
    Started {
        run_id: uuid::Uuid,
        session_id: uuid::Uuid,
    },
    /// Server progress update, percent in `0..=100`.
    Progress {
        run_id: uuid::Uuid,
        percent: u8,
        message: String,
    },
    /// Token accounting update.
    Usage {
        run_id: uuid::Uuid,
        usage: TokenUsage,
    },
    /// Terminal success with the finalized letter and analysis.
    Completed {
        run_id: uuid::Uuid,
        result: GeneratedLetter,
    },
    /// Terminal failure.
    Failed {
        run_id: uuid::Uuid,
        error: RunFailure,
    },
}

impl GenerationEvent {
    /// True for `Completed` and `Failed`; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
