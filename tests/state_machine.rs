//! Task state machine transition tests.
//!
//! Covers the full 5x5 transition matrix: 5 valid transitions, 5
//! self-transition rejections, and the remaining invalid moves, plus the
//! mapping from task status to `get_task_result` outcome.

// ─── is_terminal Tests ──────────────────────────────────────────────────────

mod is_terminal {
    use teaclave_client::TaskStatus;

    #[test]
    fn created_is_not_terminal() {
        assert!(!TaskStatus::Created.is_terminal());
    }

    #[test]
    fn running_is_not_terminal() {
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn finished_failed_canceled_are_terminal() {
        assert!(TaskStatus::Finished.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
    }
}

// ─── Valid Transitions (5 total) ────────────────────────────────────────────

mod valid_transitions {
    use teaclave_client::TaskStatus;

    fn assert_valid(from: TaskStatus, to: TaskStatus) {
        assert!(from.can_transition_to(&to), "{from} -> {to}");
        assert!(from.validate_transition("task-1", &to).is_ok());
    }

    #[test]
    fn created_to_running() {
        assert_valid(TaskStatus::Created, TaskStatus::Running);
    }

    #[test]
    fn created_to_canceled() {
        assert_valid(TaskStatus::Created, TaskStatus::Canceled);
    }

    #[test]
    fn running_to_finished() {
        assert_valid(TaskStatus::Running, TaskStatus::Finished);
    }

    #[test]
    fn running_to_failed() {
        assert_valid(TaskStatus::Running, TaskStatus::Failed);
    }

    #[test]
    fn running_to_canceled() {
        assert_valid(TaskStatus::Running, TaskStatus::Canceled);
    }
}

// ─── Invalid Transitions ────────────────────────────────────────────────────

mod invalid_transitions {
    use teaclave_client::{Error, TaskStatus};

    const ALL: [TaskStatus; 5] = [
        TaskStatus::Created,
        TaskStatus::Running,
        TaskStatus::Finished,
        TaskStatus::Failed,
        TaskStatus::Canceled,
    ];

    #[test]
    fn self_transitions_rejected() {
        for status in ALL {
            assert!(!status.can_transition_to(&status), "{status} -> {status}");
        }
    }

    #[test]
    fn created_cannot_skip_running() {
        assert!(!TaskStatus::Created.can_transition_to(&TaskStatus::Finished));
        assert!(!TaskStatus::Created.can_transition_to(&TaskStatus::Failed));
    }

    #[test]
    fn running_cannot_return_to_created() {
        assert!(!TaskStatus::Running.can_transition_to(&TaskStatus::Created));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for from in ALL.into_iter().filter(TaskStatus::is_terminal) {
            for to in ALL {
                assert!(!from.can_transition_to(&to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn rejection_names_the_task() {
        let err = TaskStatus::Finished
            .validate_transition("task-42", &TaskStatus::Running)
            .unwrap_err();
        assert!(matches!(&err, Error::Invocation(_)));
        let message = err.to_string();
        assert!(message.contains("task-42"));
        assert!(message.contains("finished"));
    }

    #[test]
    fn valid_transition_count() {
        let valid = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(to))
            .count();
        assert_eq!(valid, 5);
    }
}

// ─── Result Availability ────────────────────────────────────────────────────

mod result_availability {
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use teaclave_client::types::{TaskFailure, TaskOutcome, TaskOutputs};
    use teaclave_client::{
        Error, ExecutorType, FunctionArguments, FunctionId, TaskId, TaskInfo, TaskStatus,
    };

    fn task(status: TaskStatus, result: Option<TaskOutcome>) -> TaskInfo {
        TaskInfo {
            task_id: TaskId::generate(),
            creator: "test_id".to_string(),
            function_id: FunctionId::generate(),
            function_arguments: FunctionArguments::new(),
            executor: ExecutorType::Builtin,
            status,
            result,
        }
    }

    #[test]
    fn not_ready_before_terminal() {
        for status in [TaskStatus::Created, TaskStatus::Running] {
            let err = task(status, None).into_result().unwrap_err();
            assert!(err.is_retryable());
            match err {
                Error::ResultNotReady { status: reported, .. } => assert_eq!(reported, status),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn finished_yields_return_value() {
        let outputs = TaskOutputs {
            return_value: b"Hello, Teaclave!".to_vec(),
            output_file_hashes: BTreeMap::new(),
        };
        let result = task(TaskStatus::Finished, Some(TaskOutcome::Ok(outputs)))
            .into_result()
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "Hello, Teaclave!");
    }

    #[test]
    fn failed_and_canceled_are_terminal_errors() {
        let failure = TaskOutcome::Err(TaskFailure {
            reason: "invalid echo arguments".to_string(),
        });
        let err = task(TaskStatus::Failed, Some(failure))
            .into_result()
            .unwrap_err();
        assert!(err.is_terminal());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("invalid echo arguments"));

        let err = task(TaskStatus::Canceled, None).into_result().unwrap_err();
        assert!(err.is_terminal());
    }
}
