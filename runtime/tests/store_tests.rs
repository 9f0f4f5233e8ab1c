//! Integration tests for the Store: reduction, selectors, handlers, shutdown.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use caption_client_core::composition::{combine_reducers, scope_reducer};
use caption_client_core::{
    Effect, EffectHandler, Reducer, SmallVec, StateInvariantViolation, delay, slice, smallvec,
};
use caption_client_runtime::{Store, StoreConfig, StoreError};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TestAction {
    Click,
    Rename(String),
    /// Rejected by the label reducer
    Corrupt,
    /// Recognised by nobody
    Noise,
    /// Handled by the delayed handler
    Slow,
}

#[derive(Debug, Clone, Default)]
struct TestState {
    clicks: Arc<u32>,
    label: Arc<String>,
}

struct Clicks;

impl Reducer for Clicks {
    type State = Arc<u32>;
    type Action = TestAction;

    fn reduce(&self, s: &mut Arc<u32>, a: &TestAction) -> Result<(), StateInvariantViolation> {
        if let TestAction::Click = a {
            slice::update(s, |n| *n += 1);
        }
        Ok(())
    }
}

struct Label;

impl Reducer for Label {
    type State = Arc<String>;
    type Action = TestAction;

    fn reduce(&self, s: &mut Arc<String>, a: &TestAction) -> Result<(), StateInvariantViolation> {
        match a {
            TestAction::Rename(name) => slice::replace(s, name.clone()),
            TestAction::Corrupt => {
                return Err(StateInvariantViolation::new("label", "corrupt payload"));
            },
            _ => {},
        }
        Ok(())
    }
}

fn root_reducer() -> Box<dyn Reducer<State = TestState, Action = TestAction> + Send + Sync> {
    Box::new(combine_reducers(vec![
        Box::new(scope_reducer(
            Clicks,
            |r: &TestState| &r.clicks,
            |r: &mut TestState, s| r.clicks = s,
        )),
        Box::new(scope_reducer(
            Label,
            |r: &TestState| &r.label,
            |r: &mut TestState, s| r.label = s,
        )),
    ]))
}

fn store(strict: bool) -> Store<TestState, TestAction, ()> {
    Store::builder(TestState::default(), root_reducer(), ())
        .with_config(StoreConfig::default().with_strict_invariants(strict))
        .build()
}

/// Renames the label after every click.
struct RenameOnClick {
    calls: Arc<AtomicUsize>,
}

impl EffectHandler for RenameOnClick {
    type State = TestState;
    type Action = TestAction;
    type Environment = ();

    fn name(&self) -> &'static str {
        "rename_on_click"
    }

    fn accepts(&self, action: &TestAction) -> bool {
        matches!(action, TestAction::Click)
    }

    fn handle(
        &self,
        _action: &TestAction,
        state: &TestState,
        _env: &(),
    ) -> SmallVec<[Effect<TestAction>; 4]> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        smallvec![Effect::send(TestAction::Rename(format!(
            "clicked {}",
            state.clicks
        )))]
    }
}

/// Schedules a long delay, used to keep an effect running.
struct SlowEffect;

impl EffectHandler for SlowEffect {
    type State = TestState;
    type Action = TestAction;
    type Environment = ();

    fn name(&self) -> &'static str {
        "slow"
    }

    fn accepts(&self, action: &TestAction) -> bool {
        matches!(action, TestAction::Slow)
    }

    fn handle(&self, _: &TestAction, _: &TestState, _: &()) -> SmallVec<[Effect<TestAction>; 4]> {
        smallvec![delay! {
            duration: Duration::from_secs(60),
            action: TestAction::Noise
        }]
    }
}

/// Records the click count of the state it is handed for each click.
struct RecordClicks {
    seen: Arc<Mutex<Vec<u32>>>,
}

impl EffectHandler for RecordClicks {
    type State = TestState;
    type Action = TestAction;
    type Environment = ();

    fn name(&self) -> &'static str {
        "record_clicks"
    }

    fn accepts(&self, action: &TestAction) -> bool {
        matches!(action, TestAction::Click)
    }

    fn handle(&self, _: &TestAction, state: &TestState, _: &()) -> SmallVec<[Effect<TestAction>; 4]> {
        self.seen.lock().unwrap().push(*state.clicks);
        SmallVec::new()
    }
}

/// Environment without a `Debug` implementation.
struct OpaqueEnvironment;

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_dispatch_replaces_only_touched_slice() {
    let store = store(true);
    let before = store.snapshot();

    store.dispatch(TestAction::Click).unwrap();

    let after = store.snapshot();
    assert_eq!(*after.clicks, 1);
    assert!(!Arc::ptr_eq(&before.clicks, &after.clicks));
    assert!(Arc::ptr_eq(&before.label, &after.label));
}

#[tokio::test]
async fn test_unrecognised_action_keeps_every_reference() {
    let store = store(true);
    let mut observed = store.actions(|_| true);
    let before = store.snapshot();

    store.dispatch(TestAction::Noise).unwrap();

    let after = store.snapshot();
    assert!(Arc::ptr_eq(&before.clicks, &after.clicks));
    assert!(Arc::ptr_eq(&before.label, &after.label));
    // Still published
    assert_eq!(observed.try_recv(), Some(TestAction::Noise));
}

#[tokio::test]
async fn test_actions_are_published_in_dispatch_order() {
    let store = store(true);
    let mut observed = store.actions(|_| true);

    store.dispatch(TestAction::Click).unwrap();
    store.dispatch(TestAction::Rename("a".into())).unwrap();
    store.dispatch(TestAction::Click).unwrap();

    let seen: Vec<TestAction> = (&mut observed).take(3).collect().await;
    assert_eq!(
        seen,
        vec![
            TestAction::Click,
            TestAction::Rename("a".into()),
            TestAction::Click
        ]
    );
}

// ============================================================================
// Invariants
// ============================================================================

#[tokio::test]
async fn test_strict_invariant_violation_fails_dispatch() {
    let store = store(true);
    let mut observed = store.actions(|_| true);
    store.dispatch(TestAction::Click).unwrap();
    observed.try_recv();
    let before = store.snapshot();

    let result = store.dispatch(TestAction::Corrupt);

    assert!(matches!(
        result,
        Err(StoreError::InvariantViolation(StateInvariantViolation { slice: "label", .. }))
    ));
    let after = store.snapshot();
    assert!(Arc::ptr_eq(&before.clicks, &after.clicks));
    assert!(Arc::ptr_eq(&before.label, &after.label));
    assert_eq!(observed.try_recv(), None);
}

#[tokio::test]
async fn test_lenient_invariant_violation_is_ignored() {
    let store = store(false);
    let mut observed = store.actions(|_| true);
    let before = store.snapshot();

    store.dispatch(TestAction::Corrupt).unwrap();

    assert!(Arc::ptr_eq(&before.label, &store.snapshot().label));
    assert_eq!(observed.try_recv(), None);
}

// ============================================================================
// Reentrancy
// ============================================================================

struct Reentrant {
    store: Arc<OnceLock<Store<TestState, TestAction, ()>>>,
    outcome: Arc<Mutex<Option<Result<(), StoreError>>>>,
}

impl Reducer for Reentrant {
    type State = TestState;
    type Action = TestAction;

    fn reduce(&self, _: &mut TestState, action: &TestAction) -> Result<(), StateInvariantViolation> {
        if let (TestAction::Click, Some(store)) = (action, self.store.get()) {
            *self.outcome.lock().unwrap() = Some(store.dispatch(TestAction::Noise));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_dispatch_from_reducer_is_rejected() {
    let cell = Arc::new(OnceLock::new());
    let outcome = Arc::new(Mutex::new(None));
    let store = Store::new(
        TestState::default(),
        Box::new(Reentrant {
            store: Arc::clone(&cell),
            outcome: Arc::clone(&outcome),
        }),
        (),
    );
    cell.set(store.clone()).unwrap();

    store.dispatch(TestAction::Click).unwrap();

    assert_eq!(
        *outcome.lock().unwrap(),
        Some(Err(StoreError::ReentrantDispatch))
    );
}

#[tokio::test]
async fn test_dispatch_from_bus_predicate_is_rejected() {
    let store = store(true);
    let inner = store.clone();
    let outcome = Arc::new(Mutex::new(None));
    let record = Arc::clone(&outcome);
    let _subscription = store.actions(move |action| {
        if matches!(action, TestAction::Click) {
            *record.lock().unwrap() = Some(inner.dispatch(TestAction::Noise));
        }
        false
    });

    store.dispatch(TestAction::Click).unwrap();

    assert_eq!(
        *outcome.lock().unwrap(),
        Some(Err(StoreError::ReentrantDispatch))
    );
}

// ============================================================================
// Selectors
// ============================================================================

#[tokio::test]
async fn test_select_emits_current_then_only_on_reference_change() {
    let store = store(true);
    let mut clicks = store.select(|s| Arc::clone(&s.clicks));

    assert_eq!(*clicks.next().await.unwrap(), 0);

    store.dispatch(TestAction::Rename("unrelated".into())).unwrap();
    let quiet = tokio::time::timeout(Duration::from_millis(50), clicks.next()).await;
    assert!(quiet.is_err(), "label change must not re-emit clicks");

    store.dispatch(TestAction::Click).unwrap();
    assert_eq!(*clicks.next().await.unwrap(), 1);
}

#[tokio::test]
async fn test_select_value_deduplicates_by_value() {
    let store = store(true);
    let mut label = store.select_value(|s| s.label.as_str().to_owned());

    assert_eq!(label.next().await.unwrap(), "");

    // New reference, same value
    store.dispatch(TestAction::Rename(String::new())).unwrap();
    let quiet = tokio::time::timeout(Duration::from_millis(50), label.next()).await;
    assert!(quiet.is_err());

    store.dispatch(TestAction::Rename("x".into())).unwrap();
    assert_eq!(label.next().await.unwrap(), "x");
}

// ============================================================================
// Effect handlers
// ============================================================================

#[tokio::test]
async fn test_handler_follow_up_is_dispatched() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Store::builder(TestState::default(), root_reducer(), ())
        .with_effect(RenameOnClick {
            calls: Arc::clone(&calls),
        })
        .build();

    let follow_up = store
        .dispatch_and_wait_for(
            TestAction::Click,
            |a| matches!(a, TestAction::Rename(_)),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(follow_up, TestAction::Rename("clicked 1".into()));
    assert_eq!(store.state(|s| s.label.as_str().to_owned()), "clicked 1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_sees_only_accepted_actions() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Store::builder(TestState::default(), root_reducer(), ())
        .with_effect(RenameOnClick {
            calls: Arc::clone(&calls),
        })
        .build();

    store.dispatch(TestAction::Noise).unwrap();
    store.dispatch(TestAction::Rename("a".into())).unwrap();
    store
        .dispatch_and_wait_for(
            TestAction::Click,
            |a| matches!(a, TestAction::Rename(n) if n.starts_with("clicked")),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_gets_the_state_its_action_produced() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let store = Store::builder(TestState::default(), root_reducer(), ())
        .with_effect(RecordClicks {
            seen: Arc::clone(&seen),
        })
        .build();

    // All three reductions land before the handler task gets to run
    store.dispatch(TestAction::Click).unwrap();
    store.dispatch(TestAction::Click).unwrap();
    store.dispatch(TestAction::Click).unwrap();
    assert_eq!(*store.snapshot().clicks, 3);

    for _ in 0..100 {
        if seen.lock().unwrap().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_dispatch_and_wait_for_times_out() {
    let store = store(true);

    let result = store
        .dispatch_and_wait_for(
            TestAction::Click,
            |a| matches!(a, TestAction::Rename(_)),
            Duration::from_millis(20),
        )
        .await;

    assert_eq!(result, Err(StoreError::Timeout));
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_rejects_new_actions() {
    let store = store(true);
    store.shutdown(Duration::from_millis(100)).await.unwrap();

    assert_eq!(
        store.dispatch(TestAction::Click),
        Err(StoreError::ShutdownInProgress)
    );
}

#[tokio::test]
async fn test_shutdown_times_out_on_running_effects() {
    let store = Store::builder(TestState::default(), root_reducer(), ())
        .with_effect(SlowEffect)
        .build();
    store.dispatch(TestAction::Slow).unwrap();

    // Wait until the handler task picked the action up
    for _ in 0..100 {
        if store.pending_effects() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let result = store.shutdown(Duration::from_millis(30)).await;
    assert_eq!(result, Err(StoreError::ShutdownTimeout(1)));
}

// ============================================================================
// Formatting
// ============================================================================

#[tokio::test]
async fn test_debug_output_needs_no_debug_parameters() {
    let store: Store<TestState, TestAction, OpaqueEnvironment> =
        Store::new(TestState::default(), root_reducer(), OpaqueEnvironment);

    let rendered = format!("{store:?}");

    assert!(rendered.starts_with("Store"));
    assert!(rendered.contains("pending_effects: 0"));
}
