//! Solver batches
//!
//! Contact slots are resolved in fixed-size batches. Every member of a
//! batch reads the velocities from before the batch; the batch's deltas are
//! applied together, in member order, before the next batch runs.

/// Slot indices grouped into batches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    batches: Vec<Vec<usize>>,
}

impl BatchPlan {
    /// Lay out one batch plan for a manifold array
    ///
    /// Slots are ordered inactive-first, then active, each group in slot
    /// order. With `n` batches, batch `b` takes positions `b, b + n, ...` of
    /// that ordering.
    pub fn new(active: &[bool], batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let total = active.len();
        let ordering: Vec<usize> = (0..total)
            .filter(|&i| !active[i])
            .chain((0..total).filter(|&i| active[i]))
            .collect();

        let n_batches = total.div_ceil(batch_size);
        let batches = (0..n_batches)
            .map(|b| {
                (0..batch_size)
                    .filter_map(|i| ordering.get(i * n_batches + b).copied())
                    .filter(|&slot| active[slot])
                    .collect()
            })
            .collect();
        Self { batches }
    }

    /// Batches in resolution order, inactive slots dropped
    pub fn batches(&self) -> impl Iterator<Item = &[usize]> {
        self.batches.iter().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Evaluate `f` for every member of a batch, preserving member order
#[cfg(feature = "parallel")]
pub fn map_batch<T, F>(members: &[usize], f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    use rayon::prelude::*;
    members.par_iter().map(|&slot| f(slot)).collect()
}

/// Evaluate `f` for every member of a batch, preserving member order
#[cfg(not(feature = "parallel"))]
pub fn map_batch<T, F>(members: &[usize], f: F) -> Vec<T>
where
    F: Fn(usize) -> T,
{
    members.iter().map(|&slot| f(slot)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strided_layout() {
        let plan = BatchPlan::new(&[true; 5], 2);
        let batches: Vec<&[usize]> = plan.batches().collect();
        assert_eq!(batches, vec![&[0, 3][..], &[1, 4][..], &[2][..]]);
    }

    #[test]
    fn test_inactive_slots_lead_and_are_skipped() {
        let active = [true, false, true, false];
        let plan = BatchPlan::new(&active, 2);
        // Ordering is [1, 3, 0, 2]; batch 0 holds positions 0 and 2.
        let batches: Vec<&[usize]> = plan.batches().collect();
        assert_eq!(batches, vec![&[0][..], &[2][..]]);
    }

    #[test]
    fn test_empty_plan() {
        let plan = BatchPlan::new(&[], 16);
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
    }

    #[test]
    fn test_map_batch_keeps_order() {
        assert_eq!(map_batch(&[3, 1, 2], |slot| slot * 10), vec![30, 10, 20]);
    }
}
