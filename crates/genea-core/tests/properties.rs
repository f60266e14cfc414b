//! Property tests over randomly generated commit DAGs and change streams.

use std::collections::{HashMap, HashSet};

use genea_core::dag::{CommitWalker, VisitState};
use genea_core::genealogy::FunctionTable;
use genea_core::model::CommitKey;
use proptest::prelude::*;

use generators::*;

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    /// Every commit is handed out once, after all of its parents, and is
    /// done afterwards.
    #[test]
    fn walker_visits_each_commit_once((graph, _) in arb_history(40)) {
        let mut walker = CommitWalker::new(&graph);
        let mut seen = HashSet::new();

        while let Some(commit) = walker.next_commit().expect("generated graphs are walkable") {
            for parent in &commit.parents {
                prop_assert_eq!(walker.state(*parent), VisitState::Done);
            }
            prop_assert!(seen.insert(commit.key), "commit {} handed out twice", commit.key);
            walker.mark_done(commit.key);
            prop_assert_eq!(walker.state(commit.key), VisitState::Done);
        }
        prop_assert_eq!(seen.len(), graph.len());
    }

    /// Every commit sits on exactly one branch, and a branch's commits form
    /// a single-parent, single-child chain.
    #[test]
    fn branches_partition_commits((graph, index) in arb_history(40)) {
        let outcome = track(&graph, &index);

        let mut owners: HashMap<CommitKey, usize> = HashMap::new();
        for branch in outcome.branches.iter() {
            if branch.is_shadow() {
                prop_assert!(branch.commits.is_empty());
                continue;
            }
            prop_assert_eq!(branch.commits.first().copied(), Some(branch.first_commit));
            prop_assert_eq!(branch.commits.last().copied(), Some(branch.last_commit));
            for &commit in &branch.commits {
                *owners.entry(commit).or_default() += 1;
                prop_assert_eq!(outcome.branches.branch_of(commit), Some(branch.id));
            }
            for pair in branch.commits.windows(2) {
                let (earlier, later) = (graph.get(pair[0]).expect("known"), graph.get(pair[1]).expect("known"));
                prop_assert_eq!(&later.parents, &vec![earlier.key]);
                prop_assert_eq!(&earlier.children, &vec![later.key]);
            }
        }
        prop_assert_eq!(owners.len(), graph.len());
        prop_assert!(owners.values().all(|n| *n == 1));
    }

    /// No branch ever holds an identity that is both live and actively
    /// deleted. Shadows are frozen mid-replay snapshots, so this covers
    /// intermediate states too.
    #[test]
    fn active_deletions_exclude_live_ids((graph, index) in arb_history(40)) {
        let outcome = track(&graph, &index);

        for branch in outcome.branches.iter() {
            let mut ids = HashSet::new();
            for (id, record) in branch.table.sorted_deletions() {
                prop_assert!(ids.insert(id.clone()));
                if record.active {
                    prop_assert!(
                        branch.table.lookup(&id).is_none(),
                        "{} is live and deleted on {}", id, branch.id
                    );
                }
            }
        }
    }

    /// Replaying the same input twice gives the same result.
    #[test]
    fn replay_is_deterministic((graph, index) in arb_history(30)) {
        let first = track(&graph, &index);
        let second = track(&graph, &index);

        prop_assert_eq!(&first.order, &second.order);
        prop_assert_eq!(
            serde_json::to_value(&first.stats).expect("stats"),
            serde_json::to_value(&second.stats).expect("stats")
        );
        for (a, b) in first.branches.iter().zip(second.branches.iter()) {
            prop_assert_eq!(a.table.sorted_live(), b.table.sorted_live());
        }
    }
}
