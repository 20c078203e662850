//! Property-based tests for the versioned-memory algebra
//!
//! These verify the algebraic laws the engine relies on: commit idempotence,
//! pull being a no-op on equal views, and prefix-compatibility being what
//! separates fast-forwards from conflicts.

use gitmem_engine::{commit, conflict, pull, CommitHistory, CommitId, Global, Globals};
use proptest::prelude::*;
use std::sync::Arc;

fn history_strategy() -> impl Strategy<Value = CommitHistory> {
    prop::collection::vec(0u64..32, 0..8)
        .prop_map(|ids| ids.into_iter().map(CommitId).collect())
}

fn global_strategy() -> impl Strategy<Value = Global> {
    (
        any::<i64>(),
        prop::option::of(100u64..200),
        history_strategy(),
    )
        .prop_map(|(value, pending, history)| Global {
            value,
            pending: pending.map(CommitId),
            history,
        })
}

fn globals_strategy() -> impl Strategy<Value = Globals> {
    prop::collection::btree_map("[a-d]", global_strategy(), 0..4).prop_map(|map| {
        map.into_iter()
            .map(|(name, global)| (Arc::from(name.as_str()), global))
            .collect()
    })
}

proptest! {
    #[test]
    fn commit_twice_equals_commit_once(mut globals in globals_strategy()) {
        commit(&mut globals);
        let once = globals.clone();
        commit(&mut globals);
        prop_assert_eq!(globals, once);
    }

    #[test]
    fn commit_preserves_values(globals in globals_strategy()) {
        let mut committed = globals.clone();
        commit(&mut committed);
        for (var, global) in globals.iter() {
            prop_assert_eq!(committed.get(var).unwrap().value, global.value);
        }
    }

    #[test]
    fn pull_from_equal_view_is_noop(globals in globals_strategy()) {
        let mut dst = globals.clone();
        prop_assert_eq!(pull(&mut dst, &globals), None);
        prop_assert_eq!(dst, globals);
    }

    #[test]
    fn conflict_is_none_iff_prefix(h1 in history_strategy(), h2 in history_strategy()) {
        let shorter = h1.len().min(h2.len());
        let is_prefix = h1[..shorter] == h2[..shorter];
        prop_assert_eq!(conflict(&h1, &h2).is_none(), is_prefix);
    }

    #[test]
    fn conflict_detection_is_symmetric(h1 in history_strategy(), h2 in history_strategy()) {
        let forward = conflict(&h1, &h2);
        let backward = conflict(&h2, &h1);
        prop_assert_eq!(forward.is_none(), backward.is_none());
        if let (Some((a, b)), Some((c, d))) = (forward, backward) {
            prop_assert_eq!((a, b), (d, c));
        }
    }

    #[test]
    fn extension_fast_forwards(h in history_strategy(), extra in 200u64..220) {
        // A strictly longer compatible history wins the merge
        let mut longer = h.clone();
        longer.push(CommitId(extra));

        let mut dst = Globals::new();
        dst.insert(Arc::from("x"), Global { value: 1, pending: None, history: h });
        let mut src = Globals::new();
        src.insert(Arc::from("x"), Global { value: 2, pending: None, history: longer.clone() });

        prop_assert_eq!(pull(&mut dst, &src), None);
        let x = dst.get("x").unwrap();
        prop_assert_eq!(x.value, 2);
        prop_assert_eq!(x.history.clone(), longer);
    }

    #[test]
    fn pull_never_touches_dst_only_variables(
        dst_globals in globals_strategy(),
        src_globals in globals_strategy(),
    ) {
        let mut dst = dst_globals.clone();
        let _ = pull(&mut dst, &src_globals);
        for (var, global) in dst_globals.iter() {
            if src_globals.get(var).is_none() {
                prop_assert_eq!(dst.get(var).unwrap(), global);
            }
        }
    }
}
