//! Derive function-level change events from one file diff.
//!
//! Functions are matched across the two file versions by signature:
//!
//! | old side        | new side        | condition                   | event |
//! |-----------------|-----------------|-----------------------------|-------|
//! | (file added)    | any             |                             | ADD   |
//! | any             | (file deleted)  |                             | DEL   |
//! | `sig` @ `p`     | `sig` @ `q`     | `p != q`                    | MOVE  |
//! | `sig` @ `p`     | `sig` @ `p`     | a hunk overlaps either span | MOD   |
//! | `a` vanished    | `b` appeared    | only pair in the same hunk  | MOVE  |
//! | `a` vanished    | -               |                             | DEL   |
//! | -               | `b` appeared    |                             | ADD   |
//!
//! An event's hunk number is the index of the first hunk overlapping the
//! function, or 0 when none does.

use std::collections::BTreeMap;

use super::source::{FileDiff, FunctionSpan, Hunk};
use crate::event::{ChangeEvent, ModKind};
use crate::model::{CommitKey, FunctionId};

/// Change events of `commit` for one file diffed against `parent`.
///
/// `old_spans` are the functions of the parent's version of the file and
/// `new_spans` those of the commit's version; either is ignored when the
/// diff says that side does not exist.
#[must_use]
pub fn derive_changes(
    commit: CommitKey,
    parent: Option<CommitKey>,
    diff: &FileDiff,
    old_spans: &[FunctionSpan],
    new_spans: &[FunctionSpan],
) -> Vec<ChangeEvent> {
    let emit = Emitter {
        commit,
        parent,
        hunks: &diff.hunks,
    };

    match (diff.old_path.as_deref(), diff.new_path.as_deref()) {
        (None, None) => Vec::new(),
        (None, Some(path)) => by_signature(new_spans)
            .into_values()
            .map(|span| emit.added(span, path))
            .collect(),
        (Some(path), None) => by_signature(old_spans)
            .into_values()
            .map(|span| emit.deleted(span, path))
            .collect(),
        (Some(old_path), Some(new_path)) => emit.modified(old_path, new_path, old_spans, new_spans),
    }
}

/// Spans keyed by signature. The first definition of a signature wins.
fn by_signature(spans: &[FunctionSpan]) -> BTreeMap<&str, &FunctionSpan> {
    let mut map = BTreeMap::new();
    for span in spans {
        map.entry(span.signature.as_str()).or_insert(span);
    }
    map
}

fn hunk_number(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

struct Emitter<'d> {
    commit: CommitKey,
    parent: Option<CommitKey>,
    hunks: &'d [Hunk],
}

impl Emitter<'_> {
    fn old_hunk(&self, span: &FunctionSpan) -> Option<usize> {
        self.hunks
            .iter()
            .position(|h| h.old_range().is_some_and(|r| span.overlap(r) > 0))
    }

    fn new_hunk(&self, span: &FunctionSpan) -> Option<usize> {
        self.hunks
            .iter()
            .position(|h| h.new_range().is_some_and(|r| span.overlap(r) > 0))
    }

    fn lines_deleted(&self, span: &FunctionSpan) -> u32 {
        self.hunks
            .iter()
            .filter_map(Hunk::old_range)
            .map(|r| span.overlap(r))
            .sum()
    }

    fn lines_added(&self, span: &FunctionSpan) -> u32 {
        self.hunks
            .iter()
            .filter_map(Hunk::new_range)
            .map(|r| span.overlap(r))
            .sum()
    }

    fn event(
        &self,
        kind: ModKind,
        function: FunctionId,
        new_function: Option<FunctionId>,
        hunk: Option<usize>,
    ) -> ChangeEvent {
        ChangeEvent {
            commit: self.commit,
            hunk: hunk.map_or(0, hunk_number),
            kind,
            function,
            new_function,
            previous_revision: self.parent,
            lines_added: 0,
            lines_deleted: 0,
        }
    }

    fn added(&self, span: &FunctionSpan, path: &str) -> ChangeEvent {
        ChangeEvent {
            lines_added: self.lines_added(span),
            ..self.event(ModKind::Add, FunctionId::new(&span.signature, path), None, self.new_hunk(span))
        }
    }

    fn deleted(&self, span: &FunctionSpan, path: &str) -> ChangeEvent {
        ChangeEvent {
            lines_deleted: self.lines_deleted(span),
            ..self.event(ModKind::Del, FunctionId::new(&span.signature, path), None, self.old_hunk(span))
        }
    }

    fn pair(
        &self,
        kind: ModKind,
        old: (&FunctionSpan, &str),
        new: (&FunctionSpan, &str),
        hunk: Option<usize>,
    ) -> ChangeEvent {
        let function = FunctionId::new(&old.0.signature, old.1);
        let new_function = (kind == ModKind::Move).then(|| FunctionId::new(&new.0.signature, new.1));
        ChangeEvent {
            lines_added: self.lines_added(new.0),
            lines_deleted: self.lines_deleted(old.0),
            ..self.event(kind, function, new_function, hunk)
        }
    }

    fn modified(
        &self,
        old_path: &str,
        new_path: &str,
        old_spans: &[FunctionSpan],
        new_spans: &[FunctionSpan],
    ) -> Vec<ChangeEvent> {
        let old = by_signature(old_spans);
        let new = by_signature(new_spans);
        let mut events = Vec::new();

        let mut vanished: BTreeMap<Option<usize>, Vec<&FunctionSpan>> = BTreeMap::new();
        for (signature, old_span) in &old {
            let Some(new_span) = new.get(signature) else {
                vanished.entry(self.old_hunk(old_span)).or_default().push(*old_span);
                continue;
            };
            let hunk = match (self.old_hunk(old_span), self.new_hunk(new_span)) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            if old_path != new_path {
                events.push(self.pair(ModKind::Move, (*old_span, old_path), (*new_span, new_path), hunk));
            } else if hunk.is_some() {
                events.push(self.pair(ModKind::Mod, (*old_span, old_path), (*new_span, new_path), hunk));
            }
        }

        let mut appeared: BTreeMap<Option<usize>, Vec<&FunctionSpan>> = BTreeMap::new();
        for (signature, new_span) in &new {
            if !old.contains_key(signature) {
                appeared.entry(self.new_hunk(new_span)).or_default().push(*new_span);
            }
        }

        for (hunk, gone) in &mut vanished {
            let Some(hunk) = *hunk else { continue };
            let Some(came) = appeared.get_mut(&Some(hunk)) else {
                continue;
            };
            if let ([old_span], [new_span]) = (gone.as_slice(), came.as_slice()) {
                events.push(self.pair(
                    ModKind::Move,
                    (*old_span, old_path),
                    (*new_span, new_path),
                    Some(hunk),
                ));
                came.clear();
                gone.clear();
            }
        }

        events.extend(vanished.values().flatten().map(|span| self.deleted(span, old_path)));
        events.extend(appeared.values().flatten().map(|span| self.added(span, new_path)));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(signature: &str, start_line: u32, end_line: u32) -> FunctionSpan {
        FunctionSpan {
            signature: signature.to_string(),
            start_line,
            end_line,
        }
    }

    fn hunk(old_start: u32, old_lines: u32, new_start: u32, new_lines: u32) -> Hunk {
        Hunk {
            old_start,
            old_lines,
            new_start,
            new_lines,
        }
    }

    fn diff(old: Option<&str>, new: Option<&str>, hunks: Vec<Hunk>) -> FileDiff {
        FileDiff {
            old_path: old.map(str::to_string),
            new_path: new.map(str::to_string),
            hunks,
        }
    }

    fn derive(diff: &FileDiff, old: &[FunctionSpan], new: &[FunctionSpan]) -> Vec<ChangeEvent> {
        derive_changes(CommitKey(1), Some(CommitKey(0)), diff, old, new)
    }

    fn kinds(events: &[ChangeEvent]) -> Vec<(ModKind, &str)> {
        events
            .iter()
            .map(|e| (e.kind, e.function.signature.as_str()))
            .collect()
    }

    #[test]
    fn added_file_adds_every_function() {
        let d = diff(None, Some("new.c"), vec![hunk(0, 0, 1, 20)]);
        let events = derive(&d, &[], &[span("int b(void)", 10, 20), span("int a(void)", 1, 5)]);

        assert_eq!(kinds(&events), vec![(ModKind::Add, "int a(void)"), (ModKind::Add, "int b(void)")]);
        assert_eq!(events[0].function.file, "new.c");
        assert_eq!(events[0].lines_added, 5);
        assert_eq!(events[1].lines_added, 11);
        assert_eq!(events[0].previous_revision, Some(CommitKey(0)));
    }

    #[test]
    fn deleted_file_deletes_every_function() {
        let d = diff(Some("old.c"), None, vec![hunk(1, 9, 0, 0)]);
        let events = derive(&d, &[span("int a(void)", 2, 4)], &[]);

        assert_eq!(kinds(&events), vec![(ModKind::Del, "int a(void)")]);
        assert_eq!(events[0].lines_deleted, 3);
        assert_eq!(events[0].lines_added, 0);
    }

    #[test]
    fn only_functions_touched_by_a_hunk_are_modified() {
        let d = diff(Some("f.c"), Some("f.c"), vec![hunk(3, 1, 3, 2), hunk(20, 0, 21, 1)]);
        let old = [span("int a(void)", 1, 5), span("int b(void)", 10, 15), span("int c(void)", 18, 25)];
        let new = [span("int a(void)", 1, 6), span("int b(void)", 11, 16), span("int c(void)", 19, 27)];

        let events = derive(&d, &old, &new);

        assert_eq!(kinds(&events), vec![(ModKind::Mod, "int a(void)"), (ModKind::Mod, "int c(void)")]);
        assert_eq!((events[0].hunk, events[0].lines_added, events[0].lines_deleted), (0, 2, 1));
        assert_eq!((events[1].hunk, events[1].lines_added, events[1].lines_deleted), (1, 1, 0));
    }

    #[test]
    fn renamed_file_moves_every_function() {
        let d = diff(Some("old.c"), Some("new.c"), vec![]);
        let events = derive(&d, &[span("int a(void)", 1, 5)], &[span("int a(void)", 1, 5)]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ModKind::Move);
        assert_eq!(events[0].function, FunctionId::new("int a(void)", "old.c"));
        assert_eq!(events[0].new_function, Some(FunctionId::new("int a(void)", "new.c")));
        assert_eq!(events[0].hunk, 0);
    }

    #[test]
    fn signature_change_in_one_hunk_is_a_move() {
        let d = diff(Some("f.c"), Some("f.c"), vec![hunk(1, 1, 1, 1)]);
        let events = derive(&d, &[span("int a(void)", 1, 5)], &[span("long a(void)", 1, 5)]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ModKind::Move);
        assert_eq!(events[0].function.signature, "int a(void)");
        assert_eq!(
            events[0].new_function.as_ref().map(|f| f.signature.as_str()),
            Some("long a(void)")
        );
        assert_eq!((events[0].lines_added, events[0].lines_deleted), (1, 1));
    }

    #[test]
    fn ambiguous_hunk_falls_back_to_delete_and_add() {
        let d = diff(Some("f.c"), Some("f.c"), vec![hunk(1, 20, 1, 10)]);
        let old = [span("int a(void)", 1, 5), span("int b(void)", 10, 20)];
        let new = [span("int c(void)", 1, 10)];

        let events = derive(&d, &old, &new);

        assert_eq!(
            kinds(&events),
            vec![(ModKind::Del, "int a(void)"), (ModKind::Del, "int b(void)"), (ModKind::Add, "int c(void)")]
        );
    }

    #[test]
    fn vanished_and_new_in_different_hunks_are_not_paired() {
        let d = diff(Some("f.c"), Some("f.c"), vec![hunk(1, 5, 1, 0), hunk(30, 0, 26, 5)]);
        let events = derive(&d, &[span("int a(void)", 1, 5)], &[span("int b(void)", 26, 30)]);

        assert_eq!(kinds(&events), vec![(ModKind::Del, "int a(void)"), (ModKind::Add, "int b(void)")]);
        assert_eq!(events[1].hunk, 1);
    }

    #[test]
    fn root_commit_has_no_previous_revision() {
        let d = diff(None, Some("f.c"), vec![hunk(0, 0, 1, 3)]);
        let events = derive_changes(CommitKey(0), None, &d, &[], &[span("int a(void)", 1, 3)]);
        assert_eq!(events[0].previous_revision, None);
    }
}
