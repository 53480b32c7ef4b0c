//! Dense position allocation for columns and tasks.
//!
//! Positions are always re-indexed to `0..n` within the destination list
//! rather than using fractional gaps, so values stay small and never grow
//! from repeated inserts at the same slot. The cost is a handful of extra
//! sibling writes, reported as [`Shift`]s.

use uuid::Uuid;

use super::models::{Column, Task};

/// Anything ordered by an integer position among its siblings.
pub trait Positioned {
    fn id(&self) -> Uuid;
    fn position(&self) -> i64;
}

impl Positioned for Column {
    fn id(&self) -> Uuid {
        self.id
    }

    fn position(&self) -> i64 {
        self.position
    }
}

impl Positioned for Task {
    fn id(&self) -> Uuid {
        self.id
    }

    fn position(&self) -> i64 {
        self.position
    }
}

impl<T: Positioned + ?Sized> Positioned for &T {
    fn id(&self) -> Uuid {
        (**self).id()
    }

    fn position(&self) -> i64 {
        (**self).position()
    }
}

/// A sibling whose position has to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub id: Uuid,
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Position the inserted or moved entity receives.
    pub position: i64,
    /// Siblings that must be renumbered, in display order.
    pub shifts: Vec<Shift>,
}

/// Place an entity at `target_index` among `siblings`.
///
/// `moving` is excluded from the sibling list first, so a move within the
/// same list never collides with its own old slot. The index clamps to the
/// end of the list.
pub fn allocate<T: Positioned>(
    siblings: &[T],
    moving: Option<Uuid>,
    target_index: usize,
) -> Placement {
    let order = ordered(siblings, moving);
    let index = target_index.min(order.len());

    let shifts = order
        .iter()
        .enumerate()
        .filter_map(|(slot, &(id, from))| {
            let to = (if slot < index { slot } else { slot + 1 }) as i64;
            (from != to).then_some(Shift { id, from, to })
        })
        .collect();

    Placement {
        position: index as i64,
        shifts,
    }
}

/// Renumber `siblings` densely, e.g. after one of them was removed.
pub fn compact<T: Positioned>(siblings: &[T]) -> Vec<Shift> {
    ordered(siblings, None)
        .into_iter()
        .enumerate()
        .filter_map(|(slot, (id, from))| {
            let to = slot as i64;
            (from != to).then_some(Shift { id, from, to })
        })
        .collect()
}

fn ordered<T: Positioned>(siblings: &[T], exclude: Option<Uuid>) -> Vec<(Uuid, i64)> {
    let mut order: Vec<(Uuid, i64)> = siblings
        .iter()
        .filter(|s| Some(s.id()) != exclude)
        .map(|s| (s.id(), s.position()))
        .collect();
    order.sort_by_key(|&(id, position)| (position, id));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Item {
        id: Uuid,
        position: i64,
    }

    impl Positioned for Item {
        fn id(&self) -> Uuid {
            self.id
        }

        fn position(&self) -> i64 {
            self.position
        }
    }

    fn items(positions: &[i64]) -> Vec<Item> {
        positions
            .iter()
            .map(|&position| Item {
                id: Uuid::new_v4(),
                position,
            })
            .collect()
    }

    /// Apply a placement and return ids in resulting display order.
    fn apply(siblings: &[Item], moving: Uuid, placement: &Placement) -> Vec<(Uuid, i64)> {
        let mut result: Vec<(Uuid, i64)> = siblings
            .iter()
            .filter(|s| s.id != moving)
            .map(|s| {
                let to = placement
                    .shifts
                    .iter()
                    .find(|shift| shift.id == s.id)
                    .map(|shift| shift.to)
                    .unwrap_or(s.position);
                (s.id, to)
            })
            .collect();
        result.push((moving, placement.position));
        result.sort_by_key(|&(_, p)| p);
        result
    }

    #[test]
    fn test_empty_list_gets_position_zero() {
        let placement = allocate::<Item>(&[], None, 0);
        assert_eq!(placement.position, 0);
        assert!(placement.shifts.is_empty());
    }

    #[test]
    fn test_index_past_end_clamps() {
        let siblings = items(&[0, 1]);
        let placement = allocate(&siblings, None, 10);
        assert_eq!(placement.position, 2);
        assert!(placement.shifts.is_empty());
    }

    #[test]
    fn test_insert_at_front_shifts_everyone() {
        let siblings = items(&[0, 1, 2]);
        let placement = allocate(&siblings, None, 0);
        assert_eq!(placement.position, 0);
        let to: Vec<i64> = placement.shifts.iter().map(|s| s.to).collect();
        assert_eq!(to, vec![1, 2, 3]);
    }

    #[test]
    fn test_move_last_to_front_within_same_list() {
        let siblings = items(&[0, 1, 2]);
        let (t1, t2, t3) = (siblings[0].id, siblings[1].id, siblings[2].id);
        let placement = allocate(&siblings, Some(t3), 0);
        assert_eq!(placement.position, 0);

        let result = apply(&siblings, t3, &placement);
        assert_eq!(result, vec![(t3, 0), (t1, 1), (t2, 2)]);
    }

    #[test]
    fn test_move_first_to_end_within_same_list() {
        let siblings = items(&[0, 1, 2]);
        let (t1, t2, t3) = (siblings[0].id, siblings[1].id, siblings[2].id);
        let placement = allocate(&siblings, Some(t1), 2);
        assert_eq!(placement.position, 2);

        let result = apply(&siblings, t1, &placement);
        assert_eq!(result, vec![(t2, 0), (t3, 1), (t1, 2)]);
    }

    #[test]
    fn test_move_to_same_slot_needs_no_shifts() {
        let siblings = items(&[0, 1, 2]);
        let placement = allocate(&siblings, Some(siblings[1].id), 1);
        assert_eq!(placement.position, 1);
        assert!(placement.shifts.is_empty());
    }

    #[test]
    fn test_gaps_are_closed_on_insert() {
        let siblings = items(&[0, 4, 9]);
        let placement = allocate(&siblings, None, 1);
        assert_eq!(placement.position, 1);
        let shifts: Vec<(i64, i64)> = placement.shifts.iter().map(|s| (s.from, s.to)).collect();
        assert_eq!(shifts, vec![(4, 2), (9, 3)]);
    }

    #[test]
    fn test_repeated_front_inserts_stay_small() {
        let mut siblings: Vec<Item> = Vec::new();
        for _ in 0..50 {
            let placement = allocate(&siblings, None, 0);
            for shift in &placement.shifts {
                if let Some(s) = siblings.iter_mut().find(|s| s.id == shift.id) {
                    s.position = shift.to;
                }
            }
            siblings.push(Item {
                id: Uuid::new_v4(),
                position: placement.position,
            });
        }
        let max = siblings.iter().map(|s| s.position).max().unwrap();
        assert_eq!(max, 49);
    }

    #[test]
    fn test_compact_closes_gaps() {
        let siblings = items(&[0, 2, 3]);
        let shifts = compact(&siblings);
        let to: Vec<(i64, i64)> = shifts.iter().map(|s| (s.from, s.to)).collect();
        assert_eq!(to, vec![(2, 1), (3, 2)]);
        assert!(compact(&items(&[0, 1])).is_empty());
    }
}
