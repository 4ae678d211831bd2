//! Workflow state machine transition rules.

use crate::core::types::WorkflowState;

/// Whether the orchestrator may move from `from` to `to`.
///
/// `Aborted` is reachable from every non-terminal state. `Paused -> Paused`
/// is allowed so a resume that still finds no solution is recorded.
pub fn can_transition(from: WorkflowState, to: WorkflowState) -> bool {
    use WorkflowState as S;

    if is_terminal(from) {
        return false;
    }
    if to == S::Aborted {
        return true;
    }
    matches!(
        (from, to),
        (S::Init, S::Extracted)
            | (S::Extracted, S::PromptReady)
            | (S::PromptReady, S::Paused)
            | (S::PromptReady, S::AiInvoking)
            | (S::PromptReady, S::SolutionReady)
            | (S::AiInvoking, S::SolutionReady)
            | (S::AiInvoking, S::Paused)
            | (S::Paused, S::Paused)
            | (S::Paused, S::SolutionReady)
            | (S::SolutionReady, S::Executed)
            | (S::Executed, S::Cleaned)
    )
}

pub fn is_terminal(state: WorkflowState) -> bool {
    matches!(state, WorkflowState::Cleaned | WorkflowState::Aborted)
}

/// Progress rank of durable checkpoints. Transient states have none.
pub fn checkpoint_rank(state: WorkflowState) -> Option<u8> {
    match state {
        WorkflowState::Init => Some(0),
        WorkflowState::Extracted => Some(1),
        WorkflowState::PromptReady => Some(2),
        WorkflowState::SolutionReady => Some(3),
        WorkflowState::Executed => Some(4),
        WorkflowState::Cleaned => Some(5),
        WorkflowState::Paused | WorkflowState::AiInvoking | WorkflowState::Aborted => None,
    }
}

/// True when a persisted checkpoint already covers preparation
/// (extraction, organization, prompt).
pub fn preparation_done(checkpoint: WorkflowState) -> bool {
    const PROMPT_READY_RANK: u8 = 2;
    checkpoint_rank(checkpoint).is_some_and(|rank| rank >= PROMPT_READY_RANK)
}
