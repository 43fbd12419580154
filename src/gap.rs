//! Merge and gap bookkeeping shared by the persisted store and in-memory lists.
//!
//! A placeholder marks a stretch of the timeline, directly below its newer
//! neighbour, that may hold statuses we never fetched. Filling a gap always
//! fetches downward from that neighbour until the fetched page runs into
//! statuses that were already known.

use crate::api::{Status, StatusId};
use crate::config::SessionConfig;
use crate::error::*;

/// An ordered, newest-first collection of entries.
///
/// Implementations keep ids unique and never leave two placeholders next to
/// each other.
pub trait EntryTable {
    /// Removes every entry between the oldest and newest of `statuses`
    /// (inclusive), then inserts `statuses`. Returns how many concrete
    /// entries the range removal dropped.
    fn merge_statuses(&mut self, statuses: &[Status], config: &SessionConfig) -> Result<usize>;

    /// Inserts a placeholder unless an entry with that id exists or the
    /// placeholder would sit directly below another one. An older placeholder
    /// directly below the new one is dropped.
    fn insert_placeholder_if_absent(&mut self, id: StatusId) -> bool;

    fn remove_placeholder(&mut self, id: &StatusId) -> bool;

    /// Records the upper bound the next fill of the placeholder at `id`
    /// starts from. No-op unless `id` is a placeholder.
    fn set_retry_anchor(&mut self, id: &StatusId, anchor: StatusId) -> bool;

    fn retry_anchor(&self, id: &StatusId) -> Option<StatusId>;

    /// Closest concrete entry newer than `id`.
    fn newer_concrete_id(&self, id: &StatusId) -> Option<StatusId>;

    fn contains(&self, id: &StatusId) -> bool;
}

/// Result of an explicit gap fill.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GapOutcome {
    /// The fetched statuses reached already known ones; no gap remains.
    Closed,
    /// Statuses were fetched but the gap continues below them.
    Narrowed(StatusId),
    /// Nothing came back. The placeholder was replaced by the returned one,
    /// whose next fill starts one id lower than this one did.
    Unresolvable(StatusId),
    /// A fill for the same placeholder is already running.
    AlreadyLoading,
}

/// Upper bound for the request that fills the gap at `placeholder`.
pub fn gap_anchor<T: EntryTable>(table: &T, placeholder: &StatusId) -> StatusId {
    table
        .retry_anchor(placeholder)
        .or_else(|| table.newer_concrete_id(placeholder))
        .unwrap_or_else(|| placeholder.inc())
}

/// Marks the stretch between a freshly merged newest page and the previous
/// head, if the server's `next` hint shows the page did not reach it.
///
/// Returns the id of the inserted placeholder.
pub fn mark_refresh_gap<T: EntryTable>(
    table: &mut T,
    previous_head: Option<&StatusId>,
    next_hint: Option<&StatusId>,
) -> Option<StatusId> {
    let (head, hint) = match (previous_head, next_hint) {
        (Some(head), Some(hint)) if head < hint => (head, hint),
        _ => return None,
    };

    // Mastodon's `next` hint is the oldest id of the page itself
    let id = if table.contains(hint) {
        hint.dec()
    } else {
        hint.clone()
    };

    if &id <= head || !table.insert_placeholder_if_absent(id.clone()) {
        return None;
    }

    debug!("refresh left a gap between {} and {}, placeholder at {}", hint, head, id);
    Some(id)
}

/// Replaces the placeholder at `placeholder` with the statuses fetched below
/// `anchor`.
pub fn fill_gap<T: EntryTable>(
    table: &mut T,
    placeholder: &StatusId,
    anchor: &StatusId,
    statuses: &[Status],
    limit: usize,
    config: &SessionConfig,
) -> Result<GapOutcome> {
    table.remove_placeholder(placeholder);

    let oldest = match statuses.iter().map(|s| &s.id).min() {
        Some(oldest) => oldest.clone(),
        None => {
            let retry = anchor.dec();
            if table.insert_placeholder_if_absent(retry.clone()) {
                table.set_retry_anchor(&retry, retry.clone());
            }
            info!("gap at {} returned no statuses, retrying from {}", placeholder, retry);
            return Ok(GapOutcome::Unresolvable(retry));
        }
    };

    let overlapped = table.merge_statuses(statuses, config)?;

    let below = oldest.dec();
    if overlapped == 0 && statuses.len() >= limit &&
        table.insert_placeholder_if_absent(below.clone())
    {
        debug!("gap at {} narrowed to {}", placeholder, below);
        Ok(GapOutcome::Narrowed(below))
    } else {
        debug!("gap at {} closed ({} overlapping)", placeholder, overlapped);
        Ok(GapOutcome::Closed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pager::EntryList;
    use crate::store::Rows;
    use crate::testing::*;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;
    use std::fmt::Debug;

    #[derive(Clone, Debug)]
    enum Op {
        Merge(Vec<u32>),
        Placeholder(u32),
        Delete(u32),
        Fill { pick: usize, ids: Vec<u32> },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec(1u32..300, 0..8).prop_map(Op::Merge),
            (1u32..300).prop_map(Op::Placeholder),
            (1u32..300).prop_map(Op::Delete),
            (any::<usize>(), prop::collection::vec(1u32..300, 0..6))
                .prop_map(|(pick, ids)| Op::Fill { pick, ids }),
        ]
    }

    /// The parts of both backings the sequences drive.
    trait Table: EntryTable + Clone + Debug + PartialEq {
        fn delete(&mut self, id: &StatusId);
        /// Ids newest first, with whether each is a placeholder.
        fn listing(&self) -> Vec<(StatusId, bool)>;
    }

    impl Table for Rows {
        fn delete(&mut self, id: &StatusId) {
            self.delete_entry(id);
        }

        fn listing(&self) -> Vec<(StatusId, bool)> {
            self.window(None, usize::max_value())
                .unwrap()
                .iter()
                .map(|entry| (entry.id().clone(), entry.is_placeholder()))
                .collect()
        }
    }

    impl Table for EntryList {
        fn delete(&mut self, id: &StatusId) {
            self.delete_entry(id);
        }

        fn listing(&self) -> Vec<(StatusId, bool)> {
            self.entries()
                .iter()
                .map(|entry| (entry.id().clone(), entry.is_placeholder()))
                .collect()
        }
    }

    fn fetched(ids: &[u32], below: Option<&StatusId>) -> Vec<Status> {
        let ids: Vec<String> = ids.iter()
            .map(|id| id.to_string())
            .filter(|id| below.map_or(true, |below| StatusId::new(id.as_str()) < *below))
            .collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        statuses(&ids)
    }

    fn check_invariants<T: Table>(table: &T) -> std::result::Result<(), TestCaseError> {
        let listing = table.listing();
        for pair in listing.windows(2) {
            prop_assert!(pair[0].0 > pair[1].0, "out of order: {:?}", listing);
            prop_assert!(!(pair[0].1 && pair[1].1), "adjacent placeholders: {:?}", listing);
        }
        Ok(())
    }

    fn run<T: Table>(mut table: T, ops: &[Op]) -> std::result::Result<(), TestCaseError> {
        let config = SessionConfig::default();

        for op in ops {
            match *op {
                Op::Merge(ref ids) => {
                    let page = fetched(ids, None);
                    table.merge_statuses(&page, &config).unwrap();

                    let mut again = table.clone();
                    again.merge_statuses(&page, &config).unwrap();
                    prop_assert_eq!(&again, &table);
                }
                Op::Placeholder(id) => {
                    table.insert_placeholder_if_absent(StatusId::new(id.to_string()));
                }
                Op::Delete(id) => table.delete(&StatusId::new(id.to_string())),
                Op::Fill { pick, ref ids } => {
                    let placeholders: Vec<StatusId> = table
                        .listing()
                        .into_iter()
                        .filter(|&(_, placeholder)| placeholder)
                        .map(|(id, _)| id)
                        .collect();
                    if placeholders.is_empty() {
                        continue;
                    }

                    let placeholder = &placeholders[pick % placeholders.len()];
                    let anchor = gap_anchor(&table, placeholder);
                    let page = fetched(ids, Some(&anchor));
                    fill_gap(&mut table, placeholder, &anchor, &page, 3, &config).unwrap();
                }
            }

            check_invariants(&table)?;
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn stored_rows_keep_their_shape(ops in prop::collection::vec(op(), 1..40)) {
            run(Rows::default(), &ops)?;
        }

        #[test]
        fn memory_lists_keep_their_shape(ops in prop::collection::vec(op(), 1..40)) {
            run(EntryList::new(), &ops)?;
        }
    }

    #[test]
    fn empty_fills_keep_moving_down() {
        let mut list = EntryList::new();
        let config = SessionConfig::default();
        list.merge_statuses(&statuses(&["60", "40"]), &config).unwrap();
        list.insert_placeholder_if_absent("50".into());

        let mut anchors = Vec::new();
        let mut placeholder = StatusId::new("50");
        for _ in 0..3 {
            let anchor = gap_anchor(&list, &placeholder);
            anchors.push(anchor.to_string());
            placeholder = match fill_gap(&mut list, &placeholder, &anchor, &[], 20, &config).unwrap() {
                GapOutcome::Unresolvable(next) => next,
                other => panic!("unexpected {:?}", other),
            };
        }

        assert_eq!(anchors, vec!["60", "59", "58"]);
        assert_eq!(list.retry_anchor(&placeholder), Some(StatusId::new("57")));
    }
}
