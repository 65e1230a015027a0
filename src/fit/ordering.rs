//! Greedy allocation orderings.
//!
//! Allocating one signature shrinks the headroom left for every other
//! signature sharing its buckets, so the order of allocation matters. Six
//! candidate orders are simulated and the one allocating the most is used:
//!
//! | # | Order |
//! |---|-------|
//! | 0 | index |
//! | 1 | reverse index |
//! | 2 | descending independent gain |
//! | 3 | ascending independent gain |
//! | 4 | required first, then descending gain |
//! | 5 | required first, then ascending gain |
//!
//! Ties between orders go to the earlier one.

/// Per-bucket headroom against which allocations are simulated.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Capacity<'a> {
    /// Bucket ceilings (count + noise).
    pub ceilings: &'a [f64],
    /// Signature ratios, one row per signature.
    pub ratios: &'a [Vec<f64>],
    /// Sample total; contributions may never sum above it.
    pub total: f64,
}

impl Capacity<'_> {
    /// Largest amount of signature `sig` that fits on top of `allocated`.
    pub fn max_alloc(&self, sig: usize, allocated: &[f64], contrib_total: f64) -> f64 {
        let mut limit = (self.total - contrib_total).max(0.0);
        let mut touches = false;
        for ((&r, &ceiling), &used) in self.ratios[sig]
            .iter()
            .zip(self.ceilings)
            .zip(allocated)
        {
            if r > 0.0 {
                touches = true;
                limit = limit.min((ceiling - used).max(0.0) / r);
            }
        }
        if touches {
            limit
        } else {
            0.0
        }
    }

    /// Allocate each signature in `order` greedily. Returns the per-signature
    /// additions and their total.
    pub fn simulate(
        &self,
        order: &[usize],
        allocated: &[f64],
        contrib_total: f64,
    ) -> (Vec<f64>, f64) {
        let mut allocated = allocated.to_vec();
        let mut contrib_total = contrib_total;
        let mut additions = vec![0.0; self.ratios.len()];
        let mut gain = 0.0;

        for &sig in order {
            let amount = self.max_alloc(sig, &allocated, contrib_total);
            if amount <= 0.0 {
                continue;
            }
            for (a, &r) in allocated.iter_mut().zip(&self.ratios[sig]) {
                *a += amount * r;
            }
            contrib_total += amount;
            additions[sig] += amount;
            gain += amount;
        }

        (additions, gain)
    }

    /// Simulate every candidate order over `active` and keep the best.
    pub fn best_allocation(
        &self,
        active: &[usize],
        required: Option<usize>,
        allocated: &[f64],
        contrib_total: f64,
    ) -> Allocation {
        let gains: Vec<f64> = active
            .iter()
            .map(|&k| self.max_alloc(k, allocated, contrib_total))
            .collect();

        let mut best = Allocation::default();
        for (index, order) in candidate_orders(active, &gains, required).iter().enumerate() {
            let (additions, gain) = self.simulate(order, allocated, contrib_total);
            if index == 0 || gain > best.gain {
                best = Allocation {
                    additions,
                    gain,
                    ordering: index,
                };
            }
        }
        best
    }
}

/// Result of the best simulated ordering.
#[derive(Debug, Clone, Default)]
pub(crate) struct Allocation {
    /// Amount to add per signature (indexed by signature).
    pub additions: Vec<f64>,
    /// Sum of `additions`.
    pub gain: f64,
    /// Which of the six orders won.
    pub ordering: usize,
}

/// The six candidate orders over `active`, whose independent gains are
/// `gains` (parallel to `active`).
pub(crate) fn candidate_orders(
    active: &[usize],
    gains: &[f64],
    required: Option<usize>,
) -> [Vec<usize>; 6] {
    let index: Vec<usize> = active.to_vec();
    let reverse: Vec<usize> = active.iter().rev().copied().collect();

    // stable sorts keep index order among equal gains
    let mut by_gain: Vec<(usize, f64)> = active
        .iter()
        .copied()
        .zip(gains.iter().copied())
        .collect();
    by_gain.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let descending: Vec<usize> = by_gain.iter().map(|&(k, _)| k).collect();
    by_gain.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    let ascending: Vec<usize> = by_gain.iter().map(|&(k, _)| k).collect();

    let required_first = |order: &[usize]| -> Vec<usize> {
        match required.filter(|r| order.contains(r)) {
            Some(r) => std::iter::once(r)
                .chain(order.iter().copied().filter(|&k| k != r))
                .collect(),
            None => order.to_vec(),
        }
    };
    let required_desc = required_first(&descending);
    let required_asc = required_first(&ascending);

    [index, reverse, descending, ascending, required_desc, required_asc]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders() {
        let orders = candidate_orders(&[0, 1, 2], &[5.0, 1.0, 3.0], Some(1));
        assert_eq!(orders[0], vec![0, 1, 2]);
        assert_eq!(orders[1], vec![2, 1, 0]);
        assert_eq!(orders[2], vec![0, 2, 1]);
        assert_eq!(orders[3], vec![1, 2, 0]);
        assert_eq!(orders[4], vec![1, 0, 2]);
        assert_eq!(orders[5], vec![1, 2, 0]);
    }

    #[test]
    fn test_required_outside_active_is_ignored() {
        let orders = candidate_orders(&[0, 2], &[1.0, 2.0], Some(1));
        assert_eq!(orders[4], orders[2]);
        assert_eq!(orders[5], orders[3]);
    }

    #[test]
    fn test_max_alloc_respects_ceiling_and_total() {
        let ratios = vec![vec![0.5, 0.5], vec![1.0, 0.0], vec![0.0, 0.0]];
        let cap = Capacity {
            ceilings: &[100.0, 40.0],
            ratios: &ratios,
            total: 120.0,
        };
        assert_eq!(cap.max_alloc(0, &[0.0, 0.0], 0.0), 80.0);
        assert_eq!(cap.max_alloc(1, &[0.0, 0.0], 0.0), 100.0);
        assert_eq!(cap.max_alloc(1, &[0.0, 0.0], 50.0), 70.0);
        // a signature with no ratios allocates nothing
        assert_eq!(cap.max_alloc(2, &[0.0, 0.0], 0.0), 0.0);
    }

    #[test]
    fn test_order_changes_outcome() {
        // sig 0 spreads across both buckets, sig 1 only needs bucket 0
        let ratios = vec![vec![0.5, 0.5], vec![1.0, 0.0]];
        let cap = Capacity {
            ceilings: &[100.0, 10.0],
            ratios: &ratios,
            total: 110.0,
        };
        let (_, sig0_first) = cap.simulate(&[0, 1], &[0.0, 0.0], 0.0);
        let (_, sig1_first) = cap.simulate(&[1, 0], &[0.0, 0.0], 0.0);
        assert_eq!(sig0_first, 110.0);
        assert_eq!(sig1_first, 100.0);

        let best = cap.best_allocation(&[0, 1], None, &[0.0, 0.0], 0.0);
        assert_eq!(best.ordering, 0);
        assert_eq!(best.additions, vec![20.0, 90.0]);
        assert_eq!(best.gain, 110.0);
    }
}
