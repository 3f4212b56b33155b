//! The A2A task lifecycle state machine.
//!
//! A pure transition check with no storage: callers consult it before
//! recording any new task state, so every illegal transition is caught at
//! the single choke point instead of scattered `if` checks.

use crate::a2a::TaskState;
use crate::error::{AgentError, AgentResult};

/// Allowed `(from, to)` pairs. Everything else is an invalid transition;
/// terminal states have no outgoing edges at all.
const ALLOWED: &[(TaskState, TaskState)] = &[
    (TaskState::Submitted, TaskState::Working),
    (TaskState::Submitted, TaskState::Canceled),
    (TaskState::Submitted, TaskState::Rejected),
    (TaskState::Working, TaskState::Working),
    (TaskState::Working, TaskState::InputRequired),
    (TaskState::Working, TaskState::AuthRequired),
    (TaskState::Working, TaskState::Completed),
    (TaskState::Working, TaskState::Failed),
    (TaskState::Working, TaskState::Canceled),
    (TaskState::InputRequired, TaskState::Working),
    (TaskState::InputRequired, TaskState::Canceled),
    (TaskState::InputRequired, TaskState::Failed),
    (TaskState::AuthRequired, TaskState::Working),
    (TaskState::AuthRequired, TaskState::Canceled),
    (TaskState::AuthRequired, TaskState::Failed),
];

/// Check whether `from -> to` is a legal task transition.
///
/// Returns [`AgentError::InvalidTransition`] with full context otherwise.
pub fn ensure_transition(task_id: &str, from: TaskState, to: TaskState) -> AgentResult<()> {
    if ALLOWED.contains(&(from, to)) {
        Ok(())
    } else {
        Err(AgentError::InvalidTransition {
            task_id: task_id.to_string(),
            from,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskState; 8] = [
        TaskState::Submitted,
        TaskState::Working,
        TaskState::InputRequired,
        TaskState::AuthRequired,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::Canceled,
        TaskState::Rejected,
    ];

    #[test]
    fn submitted_transitions() {
        assert!(ensure_transition("t", TaskState::Submitted, TaskState::Working).is_ok());
        assert!(ensure_transition("t", TaskState::Submitted, TaskState::Canceled).is_ok());
        assert!(ensure_transition("t", TaskState::Submitted, TaskState::Rejected).is_ok());
        assert!(ensure_transition("t", TaskState::Submitted, TaskState::Completed).is_err());
        assert!(ensure_transition("t", TaskState::Submitted, TaskState::InputRequired).is_err());
    }

    #[test]
    fn working_may_stay_working() {
        assert!(ensure_transition("t", TaskState::Working, TaskState::Working).is_ok());
    }

    #[test]
    fn working_reaches_every_pause_and_terminal_except_rejected() {
        assert!(ensure_transition("t", TaskState::Working, TaskState::InputRequired).is_ok());
        assert!(ensure_transition("t", TaskState::Working, TaskState::AuthRequired).is_ok());
        assert!(ensure_transition("t", TaskState::Working, TaskState::Completed).is_ok());
        assert!(ensure_transition("t", TaskState::Working, TaskState::Failed).is_ok());
        assert!(ensure_transition("t", TaskState::Working, TaskState::Canceled).is_ok());
        assert!(ensure_transition("t", TaskState::Working, TaskState::Rejected).is_err());
        assert!(ensure_transition("t", TaskState::Working, TaskState::Submitted).is_err());
    }

    #[test]
    fn paused_states_resume_cancel_or_fail() {
        for paused in [TaskState::InputRequired, TaskState::AuthRequired] {
            assert!(ensure_transition("t", paused, TaskState::Working).is_ok());
            assert!(ensure_transition("t", paused, TaskState::Canceled).is_ok());
            assert!(ensure_transition("t", paused, TaskState::Failed).is_ok());
            assert!(ensure_transition("t", paused, TaskState::Completed).is_err());
            assert!(ensure_transition("t", paused, TaskState::Rejected).is_err());
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for terminal in [
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
            TaskState::Rejected,
        ] {
            for to in ALL {
                assert!(
                    ensure_transition("t", terminal, to).is_err(),
                    "{terminal} -> {to} should be rejected"
                );
            }
        }
    }

    #[test]
    fn error_carries_full_context() {
        let err = ensure_transition("task-42", TaskState::Completed, TaskState::Working)
            .expect_err("terminal transition must fail");
        match err {
            AgentError::InvalidTransition { task_id, from, to } => {
                assert_eq!(task_id, "task-42");
                assert_eq!(from, TaskState::Completed);
                assert_eq!(to, TaskState::Working);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
