//! Prefix sums over row heights.
//!
//! A Fenwick tree over `count` rows where every row defaults to one estimated
//! height. Only rows whose measured height differs from the estimate are
//! stored, so memory grows with the number of measurements rather than the
//! number of rows.

use std::collections::HashMap;

fn lowbit(i: usize) -> usize {
    i & i.wrapping_neg()
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeightIndex {
    count: usize,
    estimate: f64,
    /// 1-indexed; `tree[0]` is unused
    tree: Vec<f64>,
    overrides: HashMap<usize, f64>,
}

impl HeightIndex {
    /// Uniform index built in O(n)
    pub fn new(count: usize, estimate: f64) -> Self {
        let estimate = if estimate.is_finite() && estimate > 0.0 {
            estimate
        } else {
            0.0
        };
        let tree = (0..=count)
            .map(|i| if i == 0 { 0.0 } else { estimate * lowbit(i) as f64 })
            .collect();
        Self {
            count,
            estimate,
            tree,
            overrides: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Rows whose height differs from the estimate
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    /// Add `delta` to row `index`
    pub fn add(&mut self, index: usize, delta: f64) {
        if index >= self.count {
            return;
        }
        let mut i = index + 1;
        while i <= self.count {
            self.tree[i] += delta;
            i += lowbit(i);
        }
    }

    /// Total height of the first `k` rows
    pub fn prefix(&self, k: usize) -> f64 {
        let mut i = k.min(self.count);
        let mut sum = 0.0;
        while i > 0 {
            sum += self.tree[i];
            i -= lowbit(i);
        }
        sum
    }

    pub fn total(&self) -> f64 {
        self.prefix(self.count)
    }

    pub fn height(&self, index: usize) -> f64 {
        self.overrides.get(&index).copied().unwrap_or(self.estimate)
    }

    /// Record a measured height; returns the change applied
    pub fn set(&mut self, index: usize, height: f64) -> f64 {
        if index >= self.count || !height.is_finite() {
            return 0.0;
        }
        let height = height.max(0.0);
        let delta = height - self.height(index);
        if delta == 0.0 {
            return 0.0;
        }
        self.add(index, delta);
        if height == self.estimate {
            self.overrides.remove(&index);
        } else {
            self.overrides.insert(index, height);
        }
        delta
    }

    fn top_step(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            1 << (usize::BITS - 1 - self.count.leading_zeros())
        }
    }

    /// Smallest `k` with `prefix(k) >= target`, or `len()` when no prefix
    /// reaches it
    pub fn lower_bound(&self, target: f64) -> usize {
        if target <= 0.0 {
            return 0;
        }
        let mut position = 0;
        let mut remaining = target;
        let mut step = self.top_step();
        while step > 0 {
            let next = position + step;
            if next <= self.count && self.tree[next] < remaining {
                position = next;
                remaining -= self.tree[next];
            }
            step >>= 1;
        }
        (position + 1).min(self.count)
    }

    /// Row covering `offset`: the `i` with `prefix(i) <= offset < prefix(i + 1)`,
    /// clamped to the last row
    pub fn index_at_offset(&self, offset: f64) -> usize {
        if self.count == 0 || offset <= 0.0 {
            return 0;
        }
        let mut position = 0;
        let mut remaining = offset;
        let mut step = self.top_step();
        while step > 0 {
            let next = position + step;
            if next <= self.count && self.tree[next] <= remaining {
                position = next;
                remaining -= self.tree[next];
            }
            step >>= 1;
        }
        position.min(self.count - 1)
    }

    /// Rebuild for a new row sequence, carrying measured heights over by key
    pub fn remap(&mut self, old_keys: &[String], new_keys: &[String]) {
        let measured: HashMap<&str, f64> = self
            .overrides
            .iter()
            .filter_map(|(index, height)| {
                old_keys.get(*index).map(|key| (key.as_str(), *height))
            })
            .collect();

        let mut next = HeightIndex::new(new_keys.len(), self.estimate);
        if !measured.is_empty() {
            for (index, key) in new_keys.iter().enumerate() {
                if let Some(height) = measured.get(key.as_str()) {
                    next.set(index, *height);
                }
            }
        }
        *self = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_build() {
        let index = HeightIndex::new(5, 20.0);
        assert_eq!(index.total(), 100.0);
        for k in 0..=5 {
            assert_eq!(index.prefix(k), 20.0 * k as f64);
        }
        assert_eq!(index.prefix(99), 100.0);
    }

    #[test]
    fn test_measured_row_shifts_offsets() {
        let mut index = HeightIndex::new(5, 20.0);
        assert_eq!(index.set(2, 50.0), 30.0);
        assert_eq!(index.total(), 130.0);
        assert_eq!(index.index_at_offset(70.0), 2);
        assert_eq!(index.index_at_offset(90.0), 3);
        assert_eq!(index.index_at_offset(1e9), 4);
        assert_eq!(index.override_count(), 1);

        index.set(2, 20.0);
        assert_eq!(index.override_count(), 0);
        assert_eq!(index.total(), 100.0);
    }

    #[test]
    fn test_lower_bound() {
        let mut index = HeightIndex::new(4, 10.0);
        index.set(1, 30.0);
        // prefixes: 0, 10, 40, 50, 60
        assert_eq!(index.lower_bound(0.0), 0);
        assert_eq!(index.lower_bound(10.0), 1);
        assert_eq!(index.lower_bound(11.0), 2);
        assert_eq!(index.lower_bound(40.0), 2);
        assert_eq!(index.lower_bound(59.0), 4);
        assert_eq!(index.lower_bound(500.0), 4);
    }

    #[test]
    fn test_prefix_and_inverse_agree_under_updates() {
        let count = 37;
        let mut index = HeightIndex::new(count, 24.0);
        let mut heights = vec![24.0; count];
        for step in 0..200usize {
            let row = (step * 7 + 3) % count;
            let height = ((step * 13) % 60) as f64;
            index.set(row, height);
            heights[row] = height;
        }

        let mut running = 0.0;
        for k in 0..=count {
            assert!((index.prefix(k) - running).abs() < 1e-9);
            if k < count {
                running += heights[k];
            }
        }

        for k in 0..count {
            let offset = index.prefix(k);
            let i = index.index_at_offset(offset);
            assert!(index.prefix(i) <= offset + 1e-9);
            if i + 1 <= count && offset < index.total() {
                assert!(offset < index.prefix(i + 1) + 1e-9);
            }
        }
    }

    #[test]
    fn test_remap_keeps_heights_by_key() {
        let keys = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let old = keys(&["a", "b", "c"]);
        let mut index = HeightIndex::new(3, 10.0);
        index.set(0, 40.0);
        index.set(2, 5.0);

        let new = keys(&["x", "c", "a", "b"]);
        index.remap(&old, &new);
        assert_eq!(index.len(), 4);
        assert_eq!(index.height(0), 10.0);
        assert_eq!(index.height(1), 5.0);
        assert_eq!(index.height(2), 40.0);
        assert_eq!(index.total(), 65.0);
    }

    #[test]
    fn test_empty_index() {
        let index = HeightIndex::new(0, 20.0);
        assert!(index.is_empty());
        assert_eq!(index.total(), 0.0);
        assert_eq!(index.index_at_offset(50.0), 0);
        assert_eq!(index.lower_bound(1.0), 0);
    }
}
