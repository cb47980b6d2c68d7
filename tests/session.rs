//! Filter session state machine tests.
//!
//! Runs against a scripted store: each search answers with the rows and
//! latency registered for its first bind parameter.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sift::prelude::*;
use sift::session::Wakeup;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Default)]
struct ScriptedStore {
    responses: Mutex<HashMap<String, (Vec<i64>, Duration)>>,
    failing: Mutex<bool>,
    calls: AtomicUsize,
}

impl ScriptedStore {
    fn respond(&self, first_param: &str, rows: &[i64], latency_ms: u64) {
        self.responses.lock().unwrap().insert(
            first_param.to_string(),
            (rows.to_vec(), Duration::from_millis(latency_ms)),
        );
    }

    fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for ScriptedStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, fragment: &SqlFragment) -> Result<Vec<RecordId>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(StoreError::Execution("disk I/O error".to_string()));
        }
        let (rows, latency) = fragment
            .params
            .first()
            .and_then(|p| self.responses.lock().unwrap().get(p).cloned())
            .unwrap_or_default();
        tokio::time::sleep(latency).await;
        Ok(rows.into_iter().map(RecordId).collect())
    }
}

fn animal_index() -> Arc<EntityTypeIndex> {
    Arc::new(
        EntityTypeIndex::build(
            "Animal",
            "animals",
            "id",
            vec![
                FieldIndexSpec::new("Name", IndexingMode::QUERY_OR_FILTER, PersistenceMode::Plain),
                FieldIndexSpec::new(
                    "Tags",
                    IndexingMode::QUERY_LIKE_TERM | IndexingMode::TAG_MATCH_TERM,
                    PersistenceMode::Json,
                ),
            ],
        )
        .unwrap(),
    )
}

fn session_with(store: &Arc<ScriptedStore>) -> FilterSession {
    let config = SessionConfig {
        debounce: Duration::from_millis(250),
        event_capacity: 64,
    };
    FilterSession::new(animal_index(), Arc::clone(store) as Arc<dyn Store>, config)
}

fn ids(raw: &[i64]) -> Vec<RecordId> {
    raw.iter().copied().map(RecordId).collect()
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Commit `text` in Query mode and wait for the result.
async fn query(session: &mut FilterSession, text: &str) {
    session.set_input_text(text);
    session.commit();
    session.run_until_idle().await;
}

#[tokio::test(start_paused = true)]
async fn test_text_entered_arms_session() {
    let store = Arc::new(ScriptedStore::default());
    let mut session = session_with(&store);
    assert_eq!(session.filtering_state(), FilteringState::Ineligible);
    assert_eq!(session.search_entry_state(), SearchEntryState::Cleared);

    session.set_input_text("cat");
    assert_eq!(session.filtering_state(), FilteringState::Armed);
    assert_eq!(
        session.search_entry_state(),
        SearchEntryState::QueryEnteredNotCommitted
    );
    assert!(!session.is_busy());
    assert_eq!(store.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_typing_coalesces_into_one_evaluation() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%ca%", &[1], 0);
    let mut session = session_with(&store);

    session.set_input_text("c");
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.set_input_text("ca");
    assert_eq!(store.calls(), 0);

    session.run_until_idle().await;
    assert_eq!(store.calls(), 1);
    assert_eq!(session.committed_text(), "ca");
    assert_eq!(session.results(), ids(&[1]).as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_commit_bypasses_debounce() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1, 2], 50);
    let mut session = session_with(&store);

    session.set_input_text("cat");
    let generation = session.commit();
    assert_eq!(generation, Some(1));
    assert!(session.is_busy());
    assert_eq!(
        session.search_entry_state(),
        SearchEntryState::QueryEnteredCommitting
    );

    session.run_until_idle().await;
    assert_eq!(store.calls(), 1);
    assert!(!session.is_busy());
    assert_eq!(session.filtering_state(), FilteringState::Active);
    assert_eq!(
        session.search_entry_state(),
        SearchEntryState::QueryCompleteWithResults
    );
    assert_eq!(session.results(), ids(&[1, 2]).as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_later_commit_wins_over_slower_earlier_one() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%slow%", &[1], 500);
    store.respond("%fast%", &[2], 10);
    let mut session = session_with(&store);

    session.set_input_text("slow");
    session.commit();
    session.set_input_text("fast");
    session.commit();
    session.run_until_idle().await;

    assert_eq!(store.calls(), 2);
    assert_eq!(session.generation(), 2);
    assert_eq!(session.committed_text(), "fast");
    assert_eq!(session.results(), ids(&[2]).as_slice());
    assert!(!session.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_query_without_rows_stays_armed() {
    let store = Arc::new(ScriptedStore::default());
    let mut session = session_with(&store);

    query(&mut session, "unicorn").await;
    assert_eq!(session.filtering_state(), FilteringState::Armed);
    assert_eq!(
        session.search_entry_state(),
        SearchEntryState::QueryCompleteNoResults
    );
    assert!(session.results().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unsatisfiable_text_skips_store() {
    let index = Arc::new(
        EntityTypeIndex::build(
            "Note",
            "notes",
            "id",
            vec![FieldIndexSpec::new(
                "Title",
                IndexingMode::QUERY_LIKE_TERM,
                PersistenceMode::Plain,
            )],
        )
        .unwrap(),
    );
    let store = Arc::new(ScriptedStore::default());
    let mut session = FilterSession::new(
        index,
        Arc::clone(&store) as Arc<dyn Store>,
        SessionConfig::default(),
    );

    query(&mut session, "[mineral]").await;
    assert_eq!(store.calls(), 0);
    assert_eq!(
        session.search_entry_state(),
        SearchEntryState::QueryCompleteNoResults
    );
    assert_eq!(
        session.diagnostics(),
        &[Diagnostic::NoEligibleFieldsForToken {
            token: SearchToken::bracketed("mineral"),
            mode: SearchMode::Query,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_typing_while_active_filters_committed_results() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1, 2, 3], 0);
    // The store knows nothing of the committed query; filtering intersects.
    store.respond("%black%", &[3, 2, 9], 0);
    let mut session = session_with(&store);
    let mut events = session.subscribe();

    query(&mut session, "cat").await;
    assert_eq!(session.mode(), SearchMode::Filter);
    drain(&mut events);

    session.set_input_text("black");
    session.run_until_idle().await;

    assert_eq!(session.filtering_state(), FilteringState::Active);
    assert_eq!(session.committed_text(), "cat");
    assert_eq!(session.results(), ids(&[2, 3]).as_slice());

    let filter = drain(&mut events)
        .into_iter()
        .find_map(|event| match event {
            SessionEvent::Collection(change) => Some(change),
            _ => None,
        })
        .unwrap();
    assert_eq!(filter.action, CollectionAction::ApplyFilter);
    assert_eq!(filter.new_items, Some(ids(&[2, 3])));
    assert_eq!(filter.old_items, Some(ids(&[1])));
}

#[tokio::test(start_paused = true)]
async fn test_filter_without_matches_stays_active() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1, 2], 0);
    let mut session = session_with(&store);

    query(&mut session, "cat").await;
    session.set_input_text("zebra");
    session.run_until_idle().await;

    assert_eq!(session.filtering_state(), FilteringState::Active);
    assert_eq!(
        session.search_entry_state(),
        SearchEntryState::QueryCompleteNoResults
    );
    assert!(session.results().is_empty());

    // Emptying the filter shows the query result again.
    session.set_input_text("");
    session.run_until_idle().await;
    assert_eq!(session.results(), ids(&[1, 2]).as_slice());
    assert_eq!(store.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_filter_mode_ignores_query_only_fields() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1], 0);
    let mut session = session_with(&store);
    query(&mut session, "cat").await;

    // Tags is Query-only, so a bare word in Filter mode reaches Name alone.
    session.set_input_text("fur");
    session.commit();
    session.run_until_idle().await;
    assert!(session.diagnostics().is_empty());
    assert_eq!(store.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_all_from_active() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1, 2], 0);
    let mut session = session_with(&store);
    let mut events = session.subscribe();

    query(&mut session, "cat").await;
    assert_eq!(session.filtering_state(), FilteringState::Active);
    drain(&mut events);

    session.clear(true);
    assert_eq!(session.filtering_state(), FilteringState::Ineligible);
    assert_eq!(session.search_entry_state(), SearchEntryState::Cleared);
    assert_eq!(session.input_text(), "");
    assert_eq!(session.committed_text(), "");
    assert!(session.results().is_empty());

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::Property(PropertyChanged::InputText(
        String::new()
    ))));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Collection(change) if change.action == CollectionAction::Reset
    )));
}

#[tokio::test(start_paused = true)]
async fn test_clear_all_supersedes_in_flight_evaluation() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1, 2], 100);
    let mut session = session_with(&store);

    session.set_input_text("cat");
    session.commit();
    session.clear(true);
    session.run_until_idle().await;

    assert_eq!(session.filtering_state(), FilteringState::Ineligible);
    assert!(session.results().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_clear_keeps_input_as_query_seed() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1, 2], 0);
    store.respond("%black%", &[5], 0);
    let mut session = session_with(&store);

    query(&mut session, "cat").await;
    session.set_input_text("black");
    session.run_until_idle().await;

    session.clear(false);
    assert_eq!(session.filtering_state(), FilteringState::Armed);
    assert_eq!(session.input_text(), "black");
    assert_eq!(session.committed_text(), "");
    assert!(session.results().is_empty());

    // The kept text is now a query over the whole store.
    session.commit();
    session.run_until_idle().await;
    assert_eq!(session.committed_text(), "black");
    assert_eq!(session.results(), ids(&[5]).as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_is_recoverable() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1], 0);
    store.fail(true);
    let mut session = session_with(&store);
    let mut events = session.subscribe();

    query(&mut session, "cat").await;
    assert_eq!(
        session.search_entry_state(),
        SearchEntryState::QueryCompleteNoResults
    );
    assert_eq!(
        session.last_error(),
        Some(&StoreError::Execution("disk I/O error".to_string()))
    );
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::Error(_))));

    store.fail(false);
    session.commit();
    session.run_until_idle().await;
    assert!(session.last_error().is_none());
    assert_eq!(session.results(), ids(&[1]).as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_blank_query_is_not_evaluated() {
    let store = Arc::new(ScriptedStore::default());
    let mut session = session_with(&store);

    session.set_input_text("cat");
    session.set_input_text("   ");
    assert_eq!(session.search_entry_state(), SearchEntryState::QueryEmpty);
    session.run_until_idle().await;
    assert_eq!(session.commit(), None);
    assert_eq!(store.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_query_result_notification() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[4, 7], 0);
    let mut session = session_with(&store);
    let mut events = session.subscribe();

    query(&mut session, "cat").await;
    let events = drain(&mut events);

    let change = events
        .iter()
        .find_map(|event| match event {
            SessionEvent::Collection(change) => Some(change.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(change.action, CollectionAction::QueryResult);
    assert_eq!(change.new_items, Some(ids(&[4, 7])));

    assert!(events.contains(&SessionEvent::Property(PropertyChanged::Busy(true))));
    assert!(events.contains(&SessionEvent::Property(PropertyChanged::FilteringState(
        FilteringState::Active
    ))));
}

#[tokio::test(start_paused = true)]
async fn test_incremental_record_changes() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1, 2], 0);
    let mut session = session_with(&store);
    query(&mut session, "cat").await;
    let mut events = session.subscribe();

    session.record_added(RecordId(3));
    session.record_moved(RecordId(3), 0);
    session.record_replaced(RecordId(1), RecordId(9));
    session.record_removed(RecordId(2));
    assert_eq!(session.results(), ids(&[3, 9]).as_slice());

    let actions: Vec<CollectionAction> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Collection(change) => Some(change.action),
            _ => None,
        })
        .collect();
    assert_eq!(
        actions,
        vec![
            CollectionAction::Add,
            CollectionAction::Move,
            CollectionAction::Replace,
            CollectionAction::Remove,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_typing_clears_busy_during_evaluation() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1, 2], 100);
    store.respond("%cats%", &[2], 0);
    let mut session = session_with(&store);
    let mut events = session.subscribe();

    session.set_input_text("cat");
    session.commit();
    assert!(session.is_busy());
    drain(&mut events);

    session.set_input_text("cats");
    assert!(!session.is_busy());
    assert_eq!(
        drain(&mut events),
        vec![
            SessionEvent::Property(PropertyChanged::InputText("cats".to_string())),
            SessionEvent::Property(PropertyChanged::Busy(false)),
            SessionEvent::Property(PropertyChanged::SearchEntryState(
                SearchEntryState::QueryEnteredNotCommitted
            )),
        ]
    );

    // The query still lands, and the newer text then filters it.
    session.run_until_idle().await;
    assert_eq!(store.calls(), 2);
    assert!(!session.is_busy());
    assert_eq!(session.filtering_state(), FilteringState::Active);
    assert_eq!(session.committed_text(), "cat");
    assert_eq!(session.results(), ids(&[2]).as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_queued_debounce_expiry_is_superseded_by_typing() {
    let store = Arc::new(ScriptedStore::default());
    store.respond("%c%", &[1], 0);
    store.respond("%ca%", &[2], 0);
    let mut session = session_with(&store);

    session.set_input_text("c");
    // Let the timer fire without consuming its expiry.
    tokio::time::sleep(Duration::from_millis(300)).await;
    session.set_input_text("ca");

    let wakeup = session.try_next_wakeup().unwrap();
    assert!(matches!(wakeup, Wakeup::DebounceElapsed(_)));
    session.handle(wakeup);
    assert_eq!(store.calls(), 0);
    assert_eq!(
        session.search_entry_state(),
        SearchEntryState::QueryEnteredNotCommitted
    );

    session.run_until_idle().await;
    assert_eq!(store.calls(), 1);
    assert_eq!(session.committed_text(), "ca");
    assert_eq!(session.results(), ids(&[2]).as_slice());
}

#[test]
fn test_mutators_work_outside_runtime() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let store = Arc::new(ScriptedStore::default());
    store.respond("%cat%", &[1, 2], 0);
    let mut session = FilterSession::with_handle(
        animal_index(),
        Arc::clone(&store) as Arc<dyn Store>,
        SessionConfig::default(),
        runtime.handle().clone(),
    );

    session.set_input_text("cat");
    session.commit();
    runtime.block_on(session.run_until_idle());
    assert_eq!(session.filtering_state(), FilteringState::Active);
    assert_eq!(session.results(), ids(&[1, 2]).as_slice());

    session.clear(true);
    assert_eq!(session.filtering_state(), FilteringState::Ineligible);
}

#[tokio::test(start_paused = true)]
async fn test_record_added_needs_committed_results() {
    let store = Arc::new(ScriptedStore::default());
    let mut session = session_with(&store);
    let mut events = session.subscribe();

    session.record_added(RecordId(1));
    query(&mut session, "unicorn").await;
    session.record_added(RecordId(2));

    assert_eq!(session.filtering_state(), FilteringState::Armed);
    assert!(session.results().is_empty());
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::Collection(c) if c.action == CollectionAction::Add)));
}
