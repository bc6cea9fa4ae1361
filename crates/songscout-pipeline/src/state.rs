// SPDX-License-Identifier: GPL-3.0-or-later
use std::fmt;

use serde::Serialize;

/// Stage of a pipeline run.
///
/// Runs move strictly forward through
/// `Idle -> Extracting -> Fragmenting -> Recognizing -> Aggregating -> Done`.
/// `Failed` and `Cancelled` can be entered from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Extracting,
    Fragmenting,
    Recognizing,
    Aggregating,
    Done,
    Failed,
    Cancelled,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Idle => "idle",
            RunStage::Extracting => "extracting",
            RunStage::Fragmenting => "fragmenting",
            RunStage::Recognizing => "recognizing",
            RunStage::Aggregating => "aggregating",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
            RunStage::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Done | RunStage::Failed | RunStage::Cancelled)
    }

    fn successor(&self) -> Option<RunStage> {
        match self {
            RunStage::Idle => Some(RunStage::Extracting),
            RunStage::Extracting => Some(RunStage::Fragmenting),
            RunStage::Fragmenting => Some(RunStage::Recognizing),
            RunStage::Recognizing => Some(RunStage::Aggregating),
            RunStage::Aggregating => Some(RunStage::Done),
            RunStage::Done | RunStage::Failed | RunStage::Cancelled => None,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid run transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: RunStage,
    pub to: RunStage,
}

/// Tracks the current stage of one run and rejects transitions that go
/// backwards, skip a stage, or leave a terminal stage.
#[derive(Debug, Clone)]
pub struct RunState {
    current: RunStage,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            current: RunStage::Idle,
        }
    }

    pub fn current(&self) -> RunStage {
        self.current
    }

    pub fn advance(&mut self, next: RunStage) -> Result<(), InvalidTransition> {
        let allowed = match next {
            RunStage::Failed | RunStage::Cancelled => !self.current.is_terminal(),
            _ => self.current.successor() == Some(next),
        };

        if !allowed {
            return Err(InvalidTransition {
                from: self.current,
                to: next,
            });
        }

        self.current = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_strictly_sequential() {
        let mut state = RunState::new();
        for stage in [
            RunStage::Extracting,
            RunStage::Fragmenting,
            RunStage::Recognizing,
            RunStage::Aggregating,
            RunStage::Done,
        ] {
            state.advance(stage).unwrap();
            assert_eq!(state.current(), stage);
        }
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let mut state = RunState::new();
        state.advance(RunStage::Extracting).unwrap();
        let err = state.advance(RunStage::Recognizing).unwrap_err();
        assert_eq!(err.from, RunStage::Extracting);
        assert_eq!(state.current(), RunStage::Extracting);
    }

    #[test]
    fn stages_are_never_revisited() {
        let mut state = RunState::new();
        state.advance(RunStage::Extracting).unwrap();
        state.advance(RunStage::Fragmenting).unwrap();
        assert!(state.advance(RunStage::Extracting).is_err());
        assert!(state.advance(RunStage::Fragmenting).is_err());
    }

    #[test]
    fn failure_and_cancellation_from_any_active_stage() {
        for stage in [RunStage::Extracting, RunStage::Recognizing] {
            let mut state = RunState::new();
            state.advance(RunStage::Extracting).unwrap();
            if stage == RunStage::Recognizing {
                state.advance(RunStage::Fragmenting).unwrap();
                state.advance(RunStage::Recognizing).unwrap();
            }
            let mut cancelled = state.clone();
            state.advance(RunStage::Failed).unwrap();
            cancelled.advance(RunStage::Cancelled).unwrap();
        }

        let mut idle = RunState::new();
        idle.advance(RunStage::Cancelled).unwrap();
    }

    #[test]
    fn terminal_stages_are_final() {
        let mut state = RunState::new();
        state.advance(RunStage::Failed).unwrap();
        assert!(state.advance(RunStage::Cancelled).is_err());
        assert!(state.advance(RunStage::Extracting).is_err());
        assert!(state.advance(RunStage::Failed).is_err());
    }
}
