use casegen_kernel::prelude::*;
use casegen_kernel::{allowed_transitions, validate_transition, KernelError, StateMachineError};
use proptest::prelude::*;

fn any_phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Init),
        Just(Phase::Requirement),
        Just(Phase::Analysis),
        Just(Phase::Pretestcase),
        Just(Phase::Testcase),
        Just(Phase::Commit),
        Just(Phase::Failed),
    ]
}

async fn seeded_store() -> (MemoryStore, SessionKey) {
    let store = MemoryStore::new();
    let session = Session::new(SessionKey::generate("ws"), "TCG-1", "set-1", LocaleSettings::default());
    let key = session.key.clone();
    store.create_session(session).await.unwrap();
    (store, key)
}

#[test]
fn test_init_transitions() {
    assert!(validate_transition(Phase::Init, Phase::Requirement).is_ok());
    assert!(validate_transition(Phase::Init, Phase::Init).is_ok());

    // Invalid
    assert!(validate_transition(Phase::Init, Phase::Commit).is_err());
    assert!(validate_transition(Phase::Init, Phase::Testcase).is_err());
}

#[test]
fn test_failed_recovers_into_any_active_phase() {
    for to in [
        Phase::Requirement,
        Phase::Analysis,
        Phase::Pretestcase,
        Phase::Testcase,
        Phase::Commit,
    ] {
        assert!(validate_transition(Phase::Failed, to).is_ok(), "{to}");
    }
}

#[tokio::test]
async fn happy_path_through_every_phase() {
    let (store, key) = seeded_store().await;
    let machine = PhaseMachine::new(&store);

    for phase in [
        Phase::Requirement,
        Phase::Analysis,
        Phase::Pretestcase,
        Phase::Testcase,
        Phase::Commit,
    ] {
        let s = machine.enter(&key, phase, TransitionMode::Checked).await.unwrap();
        assert_eq!(s.phase_status, PhaseStatus::Running);
        machine.complete(&key).await.unwrap();
    }

    let s = store.load_session(&key).await.unwrap();
    assert_eq!(s.status, SessionStatus::Completed);

    // Terminal: checked transitions refused, administrative reset allowed.
    let err = machine
        .enter(&key, Phase::Requirement, TransitionMode::Checked)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KernelError::StateMachine(StateMachineError::Terminal { .. })
    ));
    let s = machine
        .enter(&key, Phase::Requirement, TransitionMode::Administrative)
        .await
        .unwrap();
    assert_eq!(s.status, SessionStatus::Active);
}

#[tokio::test]
async fn checked_transition_uses_stored_phase() {
    let (store, key) = seeded_store().await;
    let machine = PhaseMachine::new(&store);

    let err = machine
        .enter(&key, Phase::Analysis, TransitionMode::Checked)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KernelError::StateMachine(StateMachineError::IllegalTransition {
            from: Phase::Init,
            to: Phase::Analysis
        })
    ));
    // Rejection leaves the row untouched.
    assert_eq!(store.load_session(&key).await.unwrap().phase, Phase::Init);
}

#[tokio::test]
async fn failure_then_retry() {
    let (store, key) = seeded_store().await;
    let machine = PhaseMachine::new(&store);

    machine.enter(&key, Phase::Requirement, TransitionMode::Checked).await.unwrap();
    machine.complete(&key).await.unwrap();
    machine.enter(&key, Phase::Analysis, TransitionMode::Checked).await.unwrap();
    let s = machine.fail(&key, "coverage incomplete").await.unwrap();
    assert_eq!(s.phase, Phase::Analysis);
    assert_eq!(s.status, SessionStatus::Failed);

    let s = machine.enter(&key, Phase::Analysis, TransitionMode::Checked).await.unwrap();
    assert_eq!(s.status, SessionStatus::Active);
    assert!(s.last_error.is_none());
}

#[tokio::test]
async fn cancelled_sessions_refuse_checked_transitions() {
    let (store, key) = seeded_store().await;
    let machine = PhaseMachine::new(&store);
    machine.cancel(&key).await.unwrap();
    assert!(machine
        .enter(&key, Phase::Requirement, TransitionMode::Checked)
        .await
        .is_err());
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_phase(), to in any_phase()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_every_active_phase_can_revise_requirement(from in any_phase()) {
        if from != Phase::Init {
            prop_assert!(validate_transition(from, Phase::Requirement).is_ok());
        }
    }
}
