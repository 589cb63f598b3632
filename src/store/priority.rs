//! Priority allocation
//!
//! Resolves the final priority of a new or moved rule, shifting neighbours
//! so that priorities stay unique. The allocator only sees a
//! [`PriorityIndex`]; the store is responsible for running it inside its
//! write lock (or transaction) so that concurrent writers cannot both claim
//! the same slot.

use crate::error::{RuleError, RuleResult};
use crate::model::RuleId;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Where a new rule is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "offset")]
pub enum InsertPosition {
    /// Use the rule's own priority; 0 appends after the last rule
    #[default]
    Fixed,
    /// 0-based position counted from the lowest priority
    FromStart(usize),
    /// 0-based position counted from the highest priority
    FromEnd(usize),
}

/// Ordered view over the priorities held by a store
pub trait PriorityIndex {
    fn min_priority(&self) -> Option<i64>;

    fn max_priority(&self) -> Option<i64>;

    fn is_occupied(&self, priority: i64) -> bool;

    /// Priority at 0-based index `n` in ascending order
    fn nth_ascending(&self, n: usize) -> Option<i64>;

    /// Priority at 0-based index `n` in descending order
    fn nth_descending(&self, n: usize) -> Option<i64>;

    /// Add `delta` to every priority in `from..=to` (`to = None` is unbounded).
    ///
    /// Returns the ids of the moved rules. Fails without touching the index
    /// if any shifted priority would overflow.
    fn shift_range(&mut self, from: i64, to: Option<i64>, delta: i64) -> RuleResult<Vec<RuleId>>;
}

/// Resolved slot plus the rules moved to free it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub priority: i64,
    pub shifted: Vec<RuleId>,
}

impl Placement {
    fn at(priority: i64) -> Self {
        Self {
            priority,
            shifted: Vec::new(),
        }
    }
}

/// `priority + delta`, or a validation error if it leaves the i64 range
pub fn offset_priority(priority: i64, delta: i64) -> RuleResult<i64> {
    priority
        .checked_add(delta)
        .ok_or(RuleError::PriorityOverflow { priority, delta })
}

fn next_free(index: &impl PriorityIndex) -> RuleResult<i64> {
    index
        .max_priority()
        .map_or(Ok(1), |max| offset_priority(max, 1))
}

/// Open the slot at `priority` by moving it and everything above up by one
fn open_slot(index: &mut impl PriorityIndex, priority: i64) -> RuleResult<Placement> {
    let shifted = if index.is_occupied(priority) {
        index.shift_range(priority, None, 1)?
    } else {
        Vec::new()
    };
    Ok(Placement { priority, shifted })
}

/// Resolve the priority of a rule about to be inserted.
///
/// `requested` is the rule's own priority and is only consulted for
/// [`InsertPosition::Fixed`].
pub fn place_insert(
    index: &mut impl PriorityIndex,
    position: InsertPosition,
    requested: i64,
) -> RuleResult<Placement> {
    let placement = match position {
        InsertPosition::Fixed if requested == 0 => Placement::at(next_free(index)?),
        InsertPosition::Fixed => open_slot(index, requested)?,
        InsertPosition::FromStart(n) => match index.nth_ascending(n) {
            Some(priority) => open_slot(index, priority)?,
            None if n == 0 => Placement::at(1),
            None => Placement::at(next_free(index)?),
        },
        InsertPosition::FromEnd(0) => Placement::at(next_free(index)?),
        InsertPosition::FromEnd(n) => match index.nth_descending(n - 1) {
            Some(priority) => open_slot(index, priority)?,
            None => match index.min_priority() {
                Some(min) => open_slot(index, min)?,
                None => Placement::at(1),
            },
        },
    };

    trace!(
        ?position,
        requested,
        priority = placement.priority,
        shifted = placement.shifted.len(),
        "Resolved insert priority"
    );
    Ok(placement)
}

/// Resolve the priority of a rule moving from `current` to `requested`.
///
/// The index must no longer contain the moving rule: its old slot counts as
/// free. Callers handle the `requested == current` no-op before vacating.
pub fn place_update(
    index: &mut impl PriorityIndex,
    current: i64,
    requested: i64,
) -> RuleResult<Placement> {
    let placement = if requested == 0 {
        Placement::at(next_free(index)?)
    } else if !index.is_occupied(requested) {
        Placement::at(requested)
    } else if requested < current {
        let shifted = index.shift_range(requested, Some(current - 1), 1)?;
        Placement {
            priority: requested,
            shifted,
        }
    } else {
        let shifted = index.shift_range(current + 1, Some(requested), -1)?;
        Placement {
            priority: requested,
            shifted,
        }
    };

    trace!(
        current,
        requested,
        priority = placement.priority,
        shifted = placement.shifted.len(),
        "Resolved update priority"
    );
    Ok(placement)
}
