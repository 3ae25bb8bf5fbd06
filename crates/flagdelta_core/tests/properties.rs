//! Property tests for fold, compaction and resolution.

use flagdelta_core::{fold, materialize, resolve, Resolution, RevisionLog};
use flagdelta_protocol::{FeatureFilter, Revision};
use flagdelta_testkit::prelude::*;
use proptest::prelude::*;

/// Builds a log whose base is the first revision.
fn log_from(revisions: &[Revision], capacity: usize) -> RevisionLog {
    let mut log = RevisionLog::new(revisions[0].clone(), capacity);
    for revision in &revisions[1..] {
        log.append(revision.clone()).unwrap();
    }
    log
}

fn filtered(revisions: &[Revision], filter: &FeatureFilter) -> Vec<Revision> {
    revisions.iter().map(|r| r.filtered(filter)).collect()
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    /// Applying the fold equals applying each revision in turn, from any
    /// starting view.
    #[test]
    fn fold_equals_sequential_application(
        revisions in revision_sequence_strategy(1, 12),
        split in 0usize..12,
    ) {
        let split = split.min(revisions.len() - 1);
        let (prefix, suffix) = revisions.split_at(split);

        let start = sequential_view(prefix);
        let mut sequential = start.clone();
        sequential.apply_all(suffix);

        let mut folded = start;
        folded.apply_revision(&fold(suffix).unwrap());

        prop_assert_eq!(folded.features, sequential.features);
    }

    /// The last operation on a name decides which side of the fold it lands on.
    #[test]
    fn cancellation_law(revisions in revision_sequence_strategy(1, 12)) {
        let folded = fold(&revisions).unwrap();
        for name in NAME_POOL {
            let last = revisions.iter().rev().find_map(|r| {
                if r.updated.contains_key(*name) {
                    Some(true)
                } else if r.removed.contains_key(*name) {
                    Some(false)
                } else {
                    None
                }
            });
            match last {
                Some(true) => {
                    prop_assert!(folded.updated.contains_key(*name));
                    prop_assert!(!folded.removed.contains_key(*name));
                }
                Some(false) => {
                    prop_assert!(folded.removed.contains_key(*name));
                    prop_assert!(!folded.updated.contains_key(*name));
                }
                None => {
                    prop_assert!(!folded.updated.contains_key(*name));
                    prop_assert!(!folded.removed.contains_key(*name));
                }
            }
        }
    }

    /// Compaction is transparent to the materialized state under any filter,
    /// including features that move between projects.
    #[test]
    fn compaction_preserves_filtered_view(
        revisions in revision_sequence_strategy(2, 12),
        filter in filter_strategy(),
    ) {
        let mut log = log_from(&revisions, 64);
        let before = materialize(&log, &filter);
        while log.len() > 1 {
            log.compact();
        }
        prop_assert_eq!(materialize(&log, &filter), before);
    }

    /// Compacting never changes the net effect of folding the whole log.
    #[test]
    fn compaction_preserves_net_effect(revisions in revision_sequence_strategy(2, 12)) {
        let mut log = log_from(&revisions, 64);
        let before = fold(log.snapshot().iter().map(|r| r.as_ref())).unwrap();
        log.compact();
        let after = fold(log.snapshot().iter().map(|r| r.as_ref())).unwrap();
        prop_assert_eq!(before, after);
    }

    /// A small-capacity log materializes the same state as the full history:
    /// the filter applies to where each feature ended up, not where it was.
    #[test]
    fn bounded_log_materializes_full_history(
        revisions in revision_sequence_strategy(1, 20),
        capacity in 2usize..6,
        filter in filter_strategy(),
    ) {
        let log = log_from(&revisions, capacity);
        prop_assert!(log.len() <= capacity);

        let state = materialize(&log, &filter);
        prop_assert!(state.removed.is_empty());

        let mut expected = sequential_view(&revisions).features;
        expected.retain(|name, feature| filter.accepts(name, &feature.project));
        prop_assert_eq!(state.updated, expected);
    }

    /// A client holding revision k converges on the full filtered history.
    #[test]
    fn delta_brings_client_to_head(
        revisions in revision_sequence_strategy(2, 12),
        k in 0usize..12,
        filter in filter_strategy(),
    ) {
        let k = k.min(revisions.len() - 2);
        let log = log_from(&revisions, 64);
        let token = revisions[k].revision_id;

        let visible = filtered(&revisions, &filter);
        let mut client = sequential_view(&visible[..=k]);
        let expected = sequential_view(&visible);

        match resolve(&log, Some(token), &filter) {
            Resolution::Delta(delta) => {
                prop_assert_eq!(delta.revision_id, log.head_revision_id());
                client.apply_revision(&delta);
            }
            other => prop_assert!(false, "expected delta, got {:?}", other),
        }
        prop_assert_eq!(client.features, expected.features);
    }

    /// The wildcard sees a superset of what any single project sees.
    ///
    /// Names are compared across both sides: when a feature moves project
    /// inside the range, a single-project client may see an update where
    /// the wildcard sees the later tombstone.
    #[test]
    fn project_filter_monotonicity(
        revisions in revision_sequence_strategy(2, 12),
        project in project_strategy(),
    ) {
        let log = log_from(&revisions, 64);
        let token = revisions[0].revision_id;

        let all = resolve(&log, Some(token), &FeatureFilter::all());
        let one = resolve(&log, Some(token), &FeatureFilter::projects([project]));
        match (all, one) {
            (Resolution::Delta(all), Resolution::Delta(one)) => {
                for name in one.updated.keys() {
                    prop_assert!(all.updated.contains_key(name) || all.removed.contains_key(name));
                }
                for name in one.removed.keys() {
                    prop_assert!(all.removed.contains_key(name) || all.updated.contains_key(name));
                }
            }
            (all, one) => prop_assert!(false, "expected deltas, got {:?} / {:?}", all, one),
        }
    }

    /// Resolving the same token twice without a refresh is identical.
    #[test]
    fn idempotent_resend(
        revisions in revision_sequence_strategy(1, 12),
        token in 0u64..40,
        filter in filter_strategy(),
    ) {
        let log = log_from(&revisions, 4);
        prop_assert_eq!(
            resolve(&log, Some(token), &filter),
            resolve(&log, Some(token), &filter)
        );
    }

    /// The head token is a fixed point.
    #[test]
    fn head_is_unchanged(
        revisions in revision_sequence_strategy(1, 12),
        filter in filter_strategy(),
    ) {
        let log = log_from(&revisions, 4);
        prop_assert_eq!(
            resolve(&log, Some(log.head_revision_id()), &filter),
            Resolution::Unchanged
        );
    }
}
