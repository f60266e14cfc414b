//! Integration tests: pre-extraction stage feeding the tracker.
//!
//! Uses the JSONL-backed sources so the same fixtures double as examples of
//! the diff and span record formats.

use genea_core::config::{ExtractConfig, TrackerConfig};
use genea_core::dag::GraphDistance;
use genea_core::event::ModKind;
use genea_core::extract::{ExtractError, Extractor};
use genea_core::genealogy::{FunctionTable, Genealogies, GenealogyTracker};
use genea_core::io::{RecordedDiffs, RecordedSpans, read_commits, read_jsonl, write_changes};
use genea_core::model::{CommitGraph, FunctionId};

const COMMITS: &str = r#"{"hash":"r","timestamp":10,"parents":[]}
{"hash":"a","timestamp":20,"parents":["r"]}
{"hash":"b","timestamp":30,"parents":["a"]}
"#;

/// r adds two functions; a edits `one`; b renames `util.c` to `lib.c`
/// and changes the signature of `two`.
const DIFFS: &str = r#"{"commit":"r","files":[{"new_path":"util.c","hunks":[{"old_start":0,"old_lines":0,"new_start":1,"new_lines":12}]}]}
{"commit":"a","parent":"r","files":[{"old_path":"util.c","new_path":"util.c","hunks":[{"old_start":2,"old_lines":1,"new_start":2,"new_lines":2}]}]}
{"commit":"b","parent":"a","files":[{"old_path":"util.c","new_path":"lib.c","hunks":[{"old_start":8,"old_lines":1,"new_start":8,"new_lines":1}]}]}
"#;

const SPANS: &str = r#"{"commit":"r","path":"util.c","spans":[{"signature":"int one(void)","start_line":1,"end_line":5},{"signature":"int two(void)","start_line":7,"end_line":12}]}
{"commit":"a","path":"util.c","spans":[{"signature":"int one(void)","start_line":1,"end_line":6},{"signature":"int two(void)","start_line":8,"end_line":13}]}
{"commit":"b","path":"lib.c","spans":[{"signature":"int one(void)","start_line":1,"end_line":6},{"signature":"long two(int)","start_line":8,"end_line":13}]}
"#;

fn config(workers: usize) -> ExtractConfig {
    ExtractConfig {
        workers,
        queue_capacity: 1,
    }
}

fn extractor(workers: usize) -> Extractor<RecordedDiffs, RecordedSpans> {
    Extractor::new(
        RecordedDiffs::read(DIFFS.as_bytes()).expect("diffs"),
        RecordedSpans::read(SPANS.as_bytes()).expect("spans"),
        config(workers),
    )
}

fn graph() -> CommitGraph {
    read_commits(COMMITS.as_bytes()).expect("commits")
}

#[test]
fn extraction_emits_expected_events() {
    let graph = graph();
    let index = extractor(4).run(&graph).expect("extraction");

    let at = |hash: &str| {
        index
            .for_commit(graph.key_of(hash).expect("known"))
            .iter()
            .map(|e| (e.kind, e.function.signature.clone(), e.new_function.clone()))
            .collect::<Vec<_>>()
    };

    assert_eq!(
        at("r"),
        vec![
            (ModKind::Add, "int one(void)".to_string(), None),
            (ModKind::Add, "int two(void)".to_string(), None),
        ]
    );
    assert_eq!(at("a"), vec![(ModKind::Mod, "int one(void)".to_string(), None)]);
    assert_eq!(
        at("b"),
        vec![
            (
                ModKind::Move,
                "int one(void)".to_string(),
                Some(FunctionId::new("int one(void)", "lib.c"))
            ),
            (
                ModKind::Move,
                "int two(void)".to_string(),
                Some(FunctionId::new("long two(int)", "lib.c"))
            ),
        ]
    );
}

#[test]
fn worker_count_does_not_change_the_result() {
    let graph = graph();
    let single = extractor(1).run(&graph).expect("one worker");
    let many = extractor(8).run(&graph).expect("eight workers");
    assert_eq!(single.iter().collect::<Vec<_>>(), many.iter().collect::<Vec<_>>());
}

#[test]
fn shared_file_versions_are_parsed_once() {
    let graph = graph();
    let extractor = extractor(1);
    extractor.run(&graph).expect("extraction");

    // util.c@r and util.c@a are each read as a new side, then again as an old side.
    assert_eq!(extractor.span_cache().len(), 3);
    let (hits, misses) = extractor.span_cache().hit_counts();
    assert_eq!(misses, 3);
    assert_eq!(hits, 2);
}

#[test]
fn missing_span_record_fails_the_whole_run() {
    let graph = graph();
    let spans = RecordedSpans::read(SPANS.lines().take(2).collect::<Vec<_>>().join("\n").as_bytes())
        .expect("spans");
    let extractor = Extractor::new(RecordedDiffs::read(DIFFS.as_bytes()).expect("diffs"), spans, config(3));

    let err = extractor.run(&graph).expect_err("lib.c@b has no spans");
    assert!(matches!(err, ExtractError::Spans { ref path, .. } if path == "lib.c"));
}

#[test]
fn extracted_events_replay_into_one_genealogy_per_function() {
    let graph = graph();
    let index = extractor(4).run(&graph).expect("extraction");

    let mut rows = Vec::new();
    write_changes(&mut rows, &index, &graph).expect("write changes");
    let written: Vec<(usize, serde_json::Value)> = read_jsonl(rows.as_slice()).expect("valid JSONL");
    assert_eq!(written.len(), index.event_count());

    let distance = GraphDistance::new(&graph);
    let outcome = GenealogyTracker::new(&graph, &index, &distance, TrackerConfig::default())
        .run()
        .expect("replay");
    let tip = outcome.branch_at(graph.key_of("b").expect("b")).expect("tip");
    let live: Vec<FunctionId> = tip.table.sorted_live().into_iter().map(|(id, _)| id).collect();
    assert_eq!(
        live,
        vec![FunctionId::new("int one(void)", "lib.c"), FunctionId::new("long two(int)", "lib.c")]
    );

    let genealogies = Genealogies::collect(&outcome, &graph, &distance).expect("collect");
    assert_eq!(genealogies.len(), 2);
    let original = FunctionId::new("int one(void)", "util.c");
    let one = genealogies.with_alias(&original).next().expect("one");
    assert_eq!(one.kinds(), vec![ModKind::Add, ModKind::Mod, ModKind::Move]);
    assert_eq!(one.lines_added, 5 + 2);
    assert_eq!(one.lines_deleted, 1);
}
