//! Integration tests for `QueryResults` — the pagination/fetch engine.

use std::sync::{Arc, Mutex};

use live_query::db::{
    DocQuery, Document, MemoryCollection, MemoryDatabase, QueryEmission, QuerySpec,
    ReactiveCollection,
};
use live_query::emitter::Unsubscribe;
use live_query::live::{FetchState, Pagination, QueryOptions, QueryResults, ResultDocs};
use serde_json::json;

// ============================================================================
// Helpers
// ============================================================================

const CHARACTERS: [(&str, &str); 5] = [
    ("1", "Darth Vader"),
    ("2", "Yoda"),
    ("3", "Darth Sidius"),
    ("4", "Obi-Wan Kenobi"),
    ("5", "Qui-Gon Jin"),
];

fn seeded_collection() -> Arc<MemoryCollection> {
    let db = MemoryDatabase::new();
    let collection = db.create_collection("characters");
    for (id, name) in CHARACTERS {
        collection.insert(id, json!({ "id": id, "name": name }));
    }
    collection
}

fn names(result: &ResultDocs) -> Vec<String> {
    match result {
        ResultDocs::Documents(docs) => docs
            .iter()
            .map(|d| d.get("name").unwrap().as_str().unwrap().to_string())
            .collect(),
        ResultDocs::Snapshots(snaps) => snaps
            .iter()
            .map(|s| s["name"].as_str().unwrap().to_string())
            .collect(),
    }
}

fn all_of(collection: &Arc<MemoryCollection>) -> DocQuery {
    DocQuery::observable(
        Arc::clone(collection) as Arc<dyn ReactiveCollection>,
        QuerySpec::new(),
    )
}

fn attach(collection: &Arc<MemoryCollection>, options: QueryOptions) -> QueryResults {
    let results = QueryResults::new(options);
    results.set_query(Some(all_of(collection)));
    results
}

fn event_log(results: &QueryResults) -> (Arc<Mutex<Vec<FetchState>>>, Unsubscribe) {
    let log: Arc<Mutex<Vec<FetchState>>> = Arc::new(Mutex::new(Vec::new()));
    let log2 = Arc::clone(&log);
    let unsub = results.on_change(move |state| log2.lock().unwrap().push(state.clone()));
    (log, unsub)
}

/// A collection whose queries never emit — keeps consumers loading forever.
struct PendingCollection;

impl ReactiveCollection for PendingCollection {
    fn name(&self) -> &str {
        "pending"
    }

    fn observe(
        &self,
        _spec: QuerySpec,
        _callback: Arc<dyn Fn(&QueryEmission) + Send + Sync>,
    ) -> Unsubscribe {
        Box::new(|| {})
    }
}

/// A collection whose queries emit a single-document result.
struct SingleCollection {
    doc: Option<Document>,
}

impl ReactiveCollection for SingleCollection {
    fn name(&self) -> &str {
        "single"
    }

    fn observe(
        &self,
        _spec: QuerySpec,
        callback: Arc<dyn Fn(&QueryEmission) + Send + Sync>,
    ) -> Unsubscribe {
        callback(&QueryEmission::One(self.doc.clone()));
        Box::new(|| {})
    }
}

async fn settled(results: &QueryResults) -> FetchState {
    for _ in 0..100 {
        let state = results.state();
        if !state.is_fetching {
            return state;
        }
        tokio::task::yield_now().await;
    }
    panic!("query never settled");
}

// ============================================================================
// Unpaginated
// ============================================================================

#[test]
fn unpaginated_settles_exhausted_after_one_fetch() {
    let collection = seeded_collection();
    let results = attach(&collection, QueryOptions::default());

    let state = results.state();
    assert!(!state.is_fetching);
    assert!(state.is_exhausted, "single unpaginated fetch is complete");
    assert_eq!(state.result.len(), 5);
    assert_eq!(state.page, None);
}

#[test]
fn unpaginated_ignores_pagination_controls() {
    let collection = seeded_collection();
    let results = attach(&collection, QueryOptions::default());
    let (log, _unsub) = event_log(&results);

    results.fetch_more();
    results.fetch_page(2);
    results.reset();

    assert!(log.lock().unwrap().is_empty(), "controls must be no-ops");
    assert_eq!(results.state().result.len(), 5);
}

#[test]
fn zero_page_size_is_unpaginated() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            page_size: Some(0),
            ..Default::default()
        },
    );

    let state = results.state();
    assert!(state.is_exhausted);
    assert_eq!(state.result.len(), 5);
}

// ============================================================================
// Uninitialized / absent query
// ============================================================================

#[test]
fn no_query_stays_loading_forever() {
    let results = QueryResults::new(QueryOptions::default());
    let state = results.state();
    assert!(state.is_fetching);
    assert!(state.result.is_empty());

    results.set_query(None);
    assert!(results.state().is_fetching);
}

#[test]
fn silent_subscription_stays_fetching_and_blocks_fetch_more() {
    let collection: Arc<dyn ReactiveCollection> = Arc::new(PendingCollection);
    let results = QueryResults::new(QueryOptions {
        page_size: Some(2),
        ..Default::default()
    });
    results.set_query(Some(DocQuery::observable(collection, QuerySpec::new())));

    assert!(results.state().is_fetching);
    results.fetch_more();
    assert_eq!(results.state().page, Some(1), "fetch_more while fetching is a no-op");
}

// ============================================================================
// Infinite mode
// ============================================================================

#[test]
fn infinite_walkthrough_two_four_five() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            page_size: Some(2),
            pagination: Pagination::Infinite,
            ..Default::default()
        },
    );

    let state = results.state();
    assert_eq!(names(&state.result), vec!["Darth Vader", "Yoda"]);
    assert!(!state.is_exhausted);
    assert_eq!(state.page, Some(1));

    results.fetch_more();
    let state = results.state();
    assert_eq!(state.result.len(), 4);
    assert!(!state.is_exhausted);
    assert_eq!(state.page, Some(2));

    results.fetch_more();
    let state = results.state();
    assert_eq!(state.result.len(), 5);
    assert!(state.is_exhausted, "short batch (5 < 6) exhausts the list");
    assert_eq!(state.page, Some(3));
}

#[test]
fn infinite_fetch_more_noop_once_exhausted() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            page_size: Some(4),
            ..Default::default()
        },
    );

    results.fetch_more();
    assert!(results.state().is_exhausted);
    let page_before = results.state().page;

    results.fetch_more();
    assert_eq!(results.state().page, page_before);
}

#[test]
fn infinite_reset_returns_to_first_window() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            page_size: Some(2),
            ..Default::default()
        },
    );

    results.fetch_more();
    results.fetch_more();
    assert_eq!(results.state().result.len(), 5);

    results.reset();
    let state = results.state();
    assert_eq!(names(&state.result), vec!["Darth Vader", "Yoda"]);
    assert_eq!(state.page, Some(1));
    assert!(!state.is_exhausted);
}

#[test]
fn infinite_reset_noop_on_page_one() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            page_size: Some(2),
            ..Default::default()
        },
    );
    let (log, _unsub) = event_log(&results);

    results.reset();
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn infinite_window_tracks_later_writes() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            page_size: Some(2),
            ..Default::default()
        },
    );

    // The bounded window re-emits when the underlying data changes.
    collection.insert("0", json!({ "id": "0", "name": "Ahsoka Tano" }));
    let state = results.state();
    assert_eq!(names(&state.result), vec!["Ahsoka Tano", "Darth Vader"]);
}

// ============================================================================
// Traditional mode
// ============================================================================

fn traditional(collection: &Arc<MemoryCollection>) -> QueryResults {
    attach(
        collection,
        QueryOptions {
            page_size: Some(2),
            pagination: Pagination::Traditional,
            starting_page: Some(1),
            ..Default::default()
        },
    )
}

#[test]
fn traditional_counts_pages_and_jumps() {
    let collection = seeded_collection();
    let results = traditional(&collection);

    let state = results.state();
    assert_eq!(state.page_count, 3, "ceil(5 / 2)");
    assert_eq!(names(&state.result), vec!["Darth Vader", "Yoda"]);
    assert!(!state.is_exhausted, "exhaustion is not a traditional concept");

    results.fetch_page(3);
    let state = results.state();
    assert_eq!(names(&state.result), vec!["Qui-Gon Jin"]);
    assert_eq!(state.page, Some(3));
}

#[test]
fn traditional_out_of_range_pages_are_noops() {
    let collection = seeded_collection();
    let results = traditional(&collection);

    results.fetch_page(3);
    let before = results.state();

    results.fetch_page(4);
    results.fetch_page(0);
    let after = results.state();
    assert_eq!(after, before, "page stays on 3 with the same content");
}

#[test]
fn traditional_page_count_stable_across_page_changes() {
    let collection = seeded_collection();
    let results = traditional(&collection);

    results.fetch_page(2);
    results.fetch_page(3);
    assert_eq!(results.state().page_count, 3);
}

#[test]
fn traditional_page_count_recomputed_on_writes() {
    let collection = seeded_collection();
    let results = traditional(&collection);
    assert_eq!(results.state().page_count, 3);

    collection.insert("6", json!({ "id": "6", "name": "Mace Windu" }));
    collection.insert("7", json!({ "id": "7", "name": "Count Dooku" }));
    assert_eq!(results.state().page_count, 4, "ceil(7 / 2)");
}

#[test]
fn traditional_reset_is_always_noop() {
    let collection = seeded_collection();
    let results = traditional(&collection);
    results.fetch_page(2);
    let before = results.state();

    results.reset();
    assert_eq!(results.state(), before);
}

#[test]
fn traditional_ignores_infinite_controls() {
    let collection = seeded_collection();
    let results = traditional(&collection);
    let before = results.state();

    results.fetch_more();
    results.reset();
    assert_eq!(results.state(), before);
}

#[test]
fn infinite_ignores_fetch_page() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            page_size: Some(2),
            ..Default::default()
        },
    );
    let before = results.state();

    results.fetch_page(2);
    assert_eq!(results.state(), before);
}

#[test]
fn infinite_mode_never_counts_pages() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            page_size: Some(2),
            ..Default::default()
        },
    );
    assert_eq!(results.state().page_count, 0);
}

// ============================================================================
// Query identity changes
// ============================================================================

#[test]
fn query_change_refetches_without_flicker() {
    let collection = seeded_collection();
    let results = attach(&collection, QueryOptions::default());
    let settled_names = names(&results.state().result);
    assert_eq!(settled_names.len(), 5);

    let (log, _unsub) = event_log(&results);
    results.set_query(Some(DocQuery::observable(
        Arc::clone(&collection) as Arc<dyn ReactiveCollection>,
        QuerySpec::new().filter(json!({ "name": "Yoda" })),
    )));

    let events = log.lock().unwrap().clone();
    assert_eq!(events.len(), 2, "one fetching event, one settle event");
    assert!(events[0].is_fetching, "transiently fetching");
    assert_eq!(
        names(&events[0].result),
        settled_names,
        "previous result kept while refetching"
    );
    assert!(!events[1].is_fetching);
    assert_eq!(names(&events[1].result), vec!["Yoda"]);
}

#[test]
fn detach_freezes_state() {
    let collection = seeded_collection();
    let results = attach(&collection, QueryOptions::default());
    assert_eq!(results.state().result.len(), 5);

    results.set_query(None);
    collection.insert("6", json!({ "id": "6", "name": "Mace Windu" }));

    let state = results.state();
    assert_eq!(state.result.len(), 5, "no subscription, no update");
    assert!(!state.is_fetching);
}

#[test]
fn dropped_engine_stops_observing() {
    let collection = seeded_collection();
    let results = attach(&collection, QueryOptions::default());
    drop(results);

    // Writing after the drop must not reach any dangling engine state.
    collection.insert("6", json!({ "id": "6", "name": "Mace Windu" }));
}

// ============================================================================
// Normalization and conversion
// ============================================================================

#[test]
fn single_document_emission_is_wrapped() {
    let doc = Document::new("1", json!({ "id": "1", "name": "Yoda" }));
    let collection: Arc<dyn ReactiveCollection> = Arc::new(SingleCollection {
        doc: Some(doc.clone()),
    });
    let results = QueryResults::new(QueryOptions::default());
    results.set_query(Some(DocQuery::observable(collection, QuerySpec::new())));

    let state = results.state();
    assert_eq!(state.result, ResultDocs::Documents(vec![doc]));
}

#[test]
fn single_document_miss_is_empty() {
    let collection: Arc<dyn ReactiveCollection> = Arc::new(SingleCollection { doc: None });
    let results = QueryResults::new(QueryOptions::default());
    results.set_query(Some(DocQuery::observable(collection, QuerySpec::new())));

    let state = results.state();
    assert!(!state.is_fetching);
    assert!(state.result.is_empty());
}

#[test]
fn json_mode_yields_snapshots() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            json: true,
            ..Default::default()
        },
    );

    match results.state().result {
        ResultDocs::Snapshots(snaps) => {
            assert_eq!(snaps.len(), 5);
            assert_eq!(snaps[0], json!({ "id": "1", "name": "Darth Vader" }));
        }
        other => panic!("expected snapshots, got {other:?}"),
    }
}

#[test]
fn engine_sort_overrides_query_sort() {
    let collection = seeded_collection();
    let results = attach(
        &collection,
        QueryOptions {
            page_size: Some(2),
            sort: Some(live_query::db::SortEntry::desc("name")),
            ..Default::default()
        },
    );

    assert_eq!(
        names(&results.state().result),
        vec!["Yoda", "Qui-Gon Jin"]
    );
}

// ============================================================================
// Promise-form queries
// ============================================================================

#[tokio::test]
async fn promise_lookup_settles_with_keyed_docs() {
    let collection = seeded_collection();
    let results = QueryResults::new(QueryOptions::default());
    results.set_query(Some(collection.find_by_ids(&["2", "5"])));

    let state = settled(&results).await;
    assert_eq!(names(&state.result), vec!["Yoda", "Qui-Gon Jin"]);
    assert!(state.is_exhausted);
}

#[tokio::test]
async fn promise_lookup_skips_missing_ids() {
    let collection = seeded_collection();
    let results = QueryResults::new(QueryOptions::default());
    results.set_query(Some(collection.find_by_ids(&["2", "nope"])));

    let state = settled(&results).await;
    assert_eq!(names(&state.result), vec!["Yoda"]);
}

#[tokio::test]
async fn promise_canceled_on_detach_never_lands() {
    let collection = seeded_collection();
    let (trigger, gate) = tokio::sync::oneshot::channel();

    let results = QueryResults::new(QueryOptions::default());
    results.set_query(Some(collection.find_by_ids_when(&["1"], gate)));
    assert!(results.state().is_fetching);

    // Detach while the lookup is in flight, then let it resolve.
    results.set_query(None);
    let _ = trigger.send(());
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    let state = results.state();
    assert!(state.is_fetching, "late resolution must be dropped");
    assert!(state.result.is_empty());
}

#[tokio::test]
async fn promise_late_resolution_after_drop_is_harmless() {
    let collection = seeded_collection();
    let (trigger, gate) = tokio::sync::oneshot::channel();

    let results = QueryResults::new(QueryOptions::default());
    results.set_query(Some(collection.find_by_ids_when(&["1"], gate)));
    drop(results);

    let _ = trigger.send(());
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn promise_rejection_surfaces_on_error_channel() {
    let collection = seeded_collection();
    let (trigger, gate) = tokio::sync::oneshot::channel::<()>();

    let results = QueryResults::new(QueryOptions::default());
    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let errors2 = Arc::clone(&errors);
    let _unsub = results.on_error(move |err| errors2.lock().unwrap().push(err.to_string()));

    results.set_query(Some(collection.find_by_ids_when(&["1"], gate)));
    drop(trigger);

    for _ in 0..100 {
        if !errors.lock().unwrap().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Lookup failed"), "got: {}", errors[0]);
    assert!(results.state().is_fetching, "errors leave the state loading");
}
