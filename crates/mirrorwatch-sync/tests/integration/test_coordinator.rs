//! Watch coordinator: definition validation, dispatch, isolation, live watching

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mirrorwatch_core::domain::WatchDefinition;
use mirrorwatch_sync::{ChangeEvent, EventDispatcher, WatchCoordinator};
use tempfile::TempDir;

use crate::common::{local_pipeline, pipeline_with, FlakyFileSystem, Trees};

fn dispatcher_for(def: WatchDefinition) -> EventDispatcher {
    EventDispatcher::new(Arc::new(def), local_pipeline())
}

/// Polls until `path` is a file or `timeout` elapses
async fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if path.is_file() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    path.is_file()
}

/// Writes a file outside the watched tree, then moves it in
///
/// The move makes the file appear complete in a single event.
fn stage_into(staging: &TempDir, target_dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let staged = staging.path().join(name);
    std::fs::write(&staged, content).unwrap();
    let target = target_dir.join(name);
    std::fs::rename(&staged, &target).unwrap();
    target
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_dispatch_created_copies_file() {
    let trees = Trees::new();
    let source = trees.write_src("note.txt", b"dispatched");
    let dispatcher = dispatcher_for(trees.definition());

    let handle = dispatcher
        .dispatch(ChangeEvent::Created(source))
        .expect("event accepted");
    handle.await.unwrap();

    assert_eq!(
        std::fs::read(trees.dst().join("note.txt")).unwrap(),
        b"dispatched"
    );
}

#[tokio::test]
async fn test_dispatch_duplicate_event_is_debounced() {
    let trees = Trees::new();
    let source = trees.write_src("note.txt", b"x");
    let dispatcher = dispatcher_for(trees.definition());

    let first = dispatcher.dispatch(ChangeEvent::Changed(source.clone()));
    let second = dispatcher.dispatch(ChangeEvent::Changed(source));

    assert!(first.is_some());
    assert!(second.is_none());
    first.unwrap().await.unwrap();
}

#[tokio::test]
async fn test_dispatch_after_window_is_accepted() {
    let trees = Trees::new();
    let source = trees.write_src("note.txt", b"v1");
    let dispatcher = dispatcher_for(trees.definition());

    dispatcher
        .dispatch(ChangeEvent::Changed(source.clone()))
        .unwrap()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    std::fs::write(&source, b"v2").unwrap();

    dispatcher
        .dispatch(ChangeEvent::Changed(source))
        .expect("accepted after the window")
        .await
        .unwrap();
    assert_eq!(std::fs::read(trees.dst().join("note.txt")).unwrap(), b"v2");
}

#[tokio::test]
async fn test_dispatch_different_paths_are_independent() {
    let trees = Trees::new();
    let a = trees.write_src("a.txt", b"a");
    let b = trees.write_src("b.txt", b"b");
    let dispatcher = dispatcher_for(trees.definition());

    let first = dispatcher.dispatch(ChangeEvent::Created(a));
    let second = dispatcher.dispatch(ChangeEvent::Created(b));

    first.unwrap().await.unwrap();
    second.unwrap().await.unwrap();
    assert!(trees.dst().join("a.txt").is_file());
    assert!(trees.dst().join("b.txt").is_file());
}

#[tokio::test]
async fn test_dispatch_renamed_moves_counterpart() {
    let trees = Trees::new();
    let old_dst = trees.write_dst("before.txt", b"x");
    let old = trees.src().join("before.txt");
    let new = trees.write_src("after.txt", b"x");
    let dispatcher = dispatcher_for(trees.definition());

    dispatcher
        .dispatch(ChangeEvent::Renamed { old, new })
        .expect("rename accepted")
        .await
        .unwrap();

    assert!(!old_dst.exists());
    assert!(trees.dst().join("after.txt").is_file());
}

#[tokio::test]
async fn test_dispatch_error_is_only_logged() {
    let trees = Trees::new();
    let dispatcher = dispatcher_for(trees.definition());

    let handle = dispatcher.dispatch(ChangeEvent::Error("queue overflow".to_string()));

    assert!(handle.is_none());
}

#[tokio::test]
async fn test_panicking_handler_does_not_affect_other_events() {
    let trees = Trees::new();
    let poison = trees.write_src("poison.txt", b"boom");
    let good = trees.write_src("good.txt", b"fine");
    let fs = Arc::new(FlakyFileSystem::new().with_panic_on("poison.txt"));
    let dispatcher = EventDispatcher::new(Arc::new(trees.definition()), pipeline_with(fs));

    // The outer task absorbs the panic and still completes normally
    dispatcher
        .dispatch(ChangeEvent::Created(poison))
        .expect("event accepted")
        .await
        .expect("panic contained to the handler task");

    dispatcher
        .dispatch(ChangeEvent::Created(good))
        .expect("event accepted")
        .await
        .unwrap();

    assert!(trees.dst().join("good.txt").is_file());
}

// ============================================================================
// Coordinator
// ============================================================================

#[tokio::test]
async fn test_invalid_definitions_are_skipped() {
    let valid = Trees::new();
    let missing_source = Trees::new();
    let missing_destination = Trees::new();

    let definitions = vec![
        WatchDefinition::new(missing_source.src().join("nope"), missing_source.dst()),
        valid.definition(),
        WatchDefinition::new(missing_destination.src(), missing_destination.dst().join("nope")),
    ];

    let coordinator = WatchCoordinator::start(definitions, local_pipeline());

    assert_eq!(coordinator.session_count(), 1);
    assert_eq!(
        coordinator.watched_roots().collect::<Vec<_>>(),
        vec![valid.src()]
    );
    coordinator.shutdown();
}

#[tokio::test]
async fn test_no_valid_definitions_starts_nothing() {
    let trees = Trees::new();
    let definitions = vec![WatchDefinition::new(
        trees.src().join("missing"),
        trees.dst(),
    )];

    let coordinator = WatchCoordinator::start(definitions, local_pipeline());

    assert_eq!(coordinator.session_count(), 0);
    coordinator.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_watch_mirrors_new_files() {
    let trees = Trees::new();
    let staging = TempDir::new().unwrap();
    let def = trees.definition().with_extensions([".txt"]);

    let coordinator = WatchCoordinator::start(vec![def], local_pipeline());
    assert_eq!(coordinator.session_count(), 1);

    // Give the OS watch a moment to register
    tokio::time::sleep(Duration::from_millis(200)).await;

    stage_into(&staging, trees.src(), "image.png", b"\x89PNG");
    stage_into(&staging, trees.src(), "note.txt", b"live mirror");

    let mirrored = trees.dst().join("note.txt");
    assert!(
        wait_for_file(&mirrored, Duration::from_secs(10)).await,
        "note.txt was not mirrored"
    );
    assert_eq!(std::fs::read(&mirrored).unwrap(), b"live mirror");
    assert!(!trees.dst().join("image.png").exists());

    coordinator.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_rename_replaces_destination_name() {
    let trees = Trees::new();
    let staging = TempDir::new().unwrap();

    let coordinator = WatchCoordinator::start(vec![trees.definition()], local_pipeline());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let original = stage_into(&staging, trees.src(), "a.txt", b"renamed content");
    let old_dst = trees.dst().join("a.txt");
    assert!(wait_for_file(&old_dst, Duration::from_secs(10)).await);

    // Let the debounce window for the first copy close
    tokio::time::sleep(Duration::from_millis(700)).await;
    std::fs::rename(&original, trees.src().join("b.txt")).unwrap();

    let new_dst = trees.dst().join("b.txt");
    assert!(
        wait_for_file(&new_dst, Duration::from_secs(10)).await,
        "b.txt was not mirrored"
    );
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while old_dst.exists() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!old_dst.exists(), "old name still present in destination");
    assert_eq!(std::fs::read(&new_dst).unwrap(), b"renamed content");

    coordinator.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_watch_sessions_are_independent() {
    let first = Trees::new();
    let second = Trees::new();
    let staging = TempDir::new().unwrap();

    let coordinator = WatchCoordinator::start(
        vec![first.definition(), second.definition()],
        local_pipeline(),
    );
    assert_eq!(coordinator.session_count(), 2);
    tokio::time::sleep(Duration::from_millis(200)).await;

    stage_into(&staging, first.src(), "one.txt", b"1");
    stage_into(&staging, second.src(), "two.txt", b"2");

    assert!(wait_for_file(&first.dst().join("one.txt"), Duration::from_secs(10)).await);
    assert!(wait_for_file(&second.dst().join("two.txt"), Duration::from_secs(10)).await);
    assert!(!first.dst().join("two.txt").exists());
    assert!(!second.dst().join("one.txt").exists());

    coordinator.shutdown();
}
