//! Copy pipeline: filtering, path mapping, pre-copy removal, retries

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use mirrorwatch_core::domain::DebounceKey;
use mirrorwatch_sync::CopyOutcome;
use tracing_test::traced_test;

use crate::common::{local_pipeline, pipeline_with, FlakyFileSystem, FsOp, Trees};

#[tokio::test]
async fn test_copies_file_with_identical_bytes() {
    let trees = Trees::new();
    let def = trees.definition().with_extensions([".txt"]);
    let source = trees.write_src("note.txt", b"hello mirror");

    let outcome = local_pipeline().copy(&source, &def).await;

    let expected = trees.dst().join("note.txt");
    assert_eq!(
        outcome,
        CopyOutcome::Copied {
            destination: expected.clone(),
            bytes: 12,
            attempts: 1,
        }
    );
    assert_eq!(std::fs::read(expected).unwrap(), b"hello mirror");
}

#[tokio::test]
async fn test_filtered_extension_never_writes() {
    let trees = Trees::new();
    let def = trees.definition().with_extensions([".txt"]);
    let source = trees.write_src("image.png", b"\x89PNG");

    let outcome = local_pipeline().copy(&source, &def).await;

    assert_eq!(outcome, CopyOutcome::Filtered);
    assert_eq!(std::fs::read_dir(trees.dst()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_extension_filter_is_case_insensitive() {
    let trees = Trees::new();
    let def = trees.definition().with_extensions([".log"]);
    let source = trees.write_src("SERVER.LOG", b"boot ok");

    let outcome = local_pipeline().copy(&source, &def).await;

    assert!(outcome.is_copied());
    assert!(trees.dst().join("SERVER.LOG").is_file());
}

#[tokio::test]
async fn test_preserves_subdirectories_and_creates_parents() {
    let trees = Trees::new();
    let def = trees.definition();
    let source = trees.write_src("a/b/c/deep.bin", &[1, 2, 3, 4]);

    let outcome = local_pipeline().copy(&source, &def).await;

    assert!(outcome.is_copied());
    let expected = trees.dst().join("a").join("b").join("c").join("deep.bin");
    assert_eq!(std::fs::read(expected).unwrap(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_missing_source_is_noop() {
    let trees = Trees::new();
    let def = trees.definition();
    let source = trees.src().join("already-gone.txt");

    let outcome = local_pipeline().copy(&source, &def).await;

    assert_eq!(outcome, CopyOutcome::SourceUnavailable);
    assert_eq!(std::fs::read_dir(trees.dst()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_directory_source_is_noop() {
    let trees = Trees::new();
    let def = trees.definition();
    let dir = trees.src().join("subdir");
    std::fs::create_dir(&dir).unwrap();

    let outcome = local_pipeline().copy(&dir, &def).await;

    assert_eq!(outcome, CopyOutcome::SourceUnavailable);
    assert!(!trees.dst().join("subdir").exists());
}

#[tokio::test]
async fn test_path_outside_source_root_is_rejected() {
    let trees = Trees::new();
    let other = Trees::new();
    let def = trees.definition();
    let stray = other.write_src("stray.txt", b"x");

    let outcome = local_pipeline().copy(&stray, &def).await;

    assert_eq!(outcome, CopyOutcome::OutsideSourceRoot);
}

#[tokio::test]
async fn test_remove_before_copy_replaces_existing_file() {
    let trees = Trees::new();
    let def = trees.definition().with_remove_before_copy(true);
    let source = trees.write_src("report.csv", b"new");
    let destination = trees.write_dst("report.csv", b"OLD-MARKER-WITH-LONGER-CONTENT");

    let fs = Arc::new(FlakyFileSystem::new());
    let outcome = pipeline_with(fs.clone()).copy(&source, &def).await;

    assert!(outcome.is_copied());
    assert_eq!(std::fs::read(&destination).unwrap(), b"new");
    assert_eq!(
        fs.ops(),
        vec![
            FsOp::Remove(destination.clone()),
            FsOp::Copy {
                from: source,
                to: destination,
            },
        ]
    );
}

#[tokio::test]
async fn test_overwrite_without_remove_before_copy() {
    let trees = Trees::new();
    let def = trees.definition();
    let source = trees.write_src("report.csv", b"new");
    let destination = trees.write_dst("report.csv", b"OLD-MARKER-WITH-LONGER-CONTENT");

    let fs = Arc::new(FlakyFileSystem::new());
    let outcome = pipeline_with(fs.clone()).copy(&source, &def).await;

    assert!(outcome.is_copied());
    assert_eq!(std::fs::read(&destination).unwrap(), b"new");
    assert_eq!(fs.removes(), 0);
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let trees = Trees::new();
    let def = trees.definition();
    let source = trees.write_src("locked.txt", b"final content");

    let fs = Arc::new(FlakyFileSystem::failing_copies(3, io::ErrorKind::WouldBlock));
    let outcome = pipeline_with(fs.clone()).copy(&source, &def).await;

    match outcome {
        CopyOutcome::Copied { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected a copy, got {other:?}"),
    }
    assert_eq!(fs.copy_attempts(), 4);
    assert_eq!(
        std::fs::read(trees.dst().join("locked.txt")).unwrap(),
        b"final content"
    );
}

#[tokio::test]
#[traced_test]
async fn test_all_attempts_fail() {
    let trees = Trees::new();
    let def = trees.definition();
    let source = trees.write_src("locked.txt", b"never lands");

    let fs = Arc::new(FlakyFileSystem::failing_copies(5, io::ErrorKind::WouldBlock));
    let outcome = pipeline_with(fs.clone()).copy(&source, &def).await;

    assert_eq!(outcome, CopyOutcome::Exhausted { attempts: 5 });
    assert_eq!(fs.copy_attempts(), 5);
    assert!(!trees.dst().join("locked.txt").exists());
    assert!(logs_contain("IO error while copying"));
    assert!(logs_contain("Failed to copy after exhausting all attempts"));
}

#[tokio::test]
async fn test_permanent_failure_aborts_immediately() {
    let trees = Trees::new();
    let def = trees.definition();
    let source = trees.write_src("secret.txt", b"x");

    let fs = Arc::new(FlakyFileSystem::failing_copies(
        5,
        io::ErrorKind::PermissionDenied,
    ));
    let outcome = pipeline_with(fs.clone()).copy(&source, &def).await;

    assert_eq!(outcome, CopyOutcome::Aborted { attempts: 1 });
    assert_eq!(fs.copy_attempts(), 1);
}

#[tokio::test]
async fn test_settle_delay_applies_once() {
    let trees = Trees::new();
    let def = trees.definition().with_settle_delay_seconds(1);
    let source = trees.write_src("slow.txt", b"done");

    let fs = Arc::new(FlakyFileSystem::failing_copies(2, io::ErrorKind::WouldBlock));
    let started = Instant::now();
    let outcome = pipeline_with(fs.clone()).copy(&source, &def).await;
    let elapsed = started.elapsed();

    assert!(outcome.is_copied());
    assert!(elapsed >= Duration::from_secs(1), "settle delay skipped: {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(1900),
        "settle delay repeated on retry: {elapsed:?}"
    );
}

#[tokio::test]
async fn test_remove_before_copy_repeats_on_every_attempt() {
    // Each failed copy leaves a partial file, which the next attempt deletes again
    let trees = Trees::new();
    let def = trees.definition().with_remove_before_copy(true);
    let source = trees.write_src("build.out", b"complete");
    trees.write_dst("build.out", b"stale");

    let fs = Arc::new(
        FlakyFileSystem::failing_copies(2, io::ErrorKind::WouldBlock).with_partial_copies(),
    );
    let outcome = pipeline_with(fs.clone()).copy(&source, &def).await;

    assert!(outcome.is_copied());
    assert_eq!(fs.removes(), 3);
    assert_eq!(
        std::fs::read(trees.dst().join("build.out")).unwrap(),
        b"complete"
    );
}

#[tokio::test]
async fn test_successful_copy_refreshes_debounce_entry() {
    let trees = Trees::new();
    let def = trees.definition();
    let source = trees.write_src("note.txt", b"x");
    let pipeline = local_pipeline();
    let key = DebounceKey::new(&def, &source);

    let before = Utc::now();
    assert!(pipeline.copy(&source, &def).await.is_copied());

    let last = pipeline.debouncer().last_seen(&key).expect("key recorded");
    assert!(last >= before);
    // The write events caused by the copy itself fall inside the window
    assert!(pipeline.debouncer().should_suppress(&key, Utc::now()));
}

#[tokio::test]
async fn test_failed_copy_does_not_record_debounce_entry() {
    let trees = Trees::new();
    let def = trees.definition();
    let source = trees.write_src("note.txt", b"x");
    let fs = Arc::new(FlakyFileSystem::failing_copies(5, io::ErrorKind::WouldBlock));
    let pipeline = pipeline_with(fs);

    pipeline.copy(&source, &def).await;

    assert!(pipeline
        .debouncer()
        .last_seen(&DebounceKey::new(&def, &source))
        .is_none());
}

#[tokio::test]
async fn test_definitions_map_to_their_own_destinations() {
    let a = Trees::new();
    let b = Trees::new();
    let pipeline = local_pipeline();
    let source_a = a.write_src("same-name.txt", b"from a");
    let source_b = b.write_src("same-name.txt", b"from b");

    assert!(pipeline.copy(&source_a, &a.definition()).await.is_copied());
    assert!(pipeline.copy(&source_b, &b.definition()).await.is_copied());

    let read = |p: PathBuf| std::fs::read(p).unwrap();
    assert_eq!(read(a.dst().join("same-name.txt")), b"from a");
    assert_eq!(read(b.dst().join("same-name.txt")), b"from b");
}
