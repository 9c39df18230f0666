use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A closed integer interval [start, end] owned by a reachability tree node.
/// A node is a chain ancestor of another iff its interval contains the
/// other's. An interval with `end < start` is empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

impl Interval {
    pub fn new(start: u64, end: u64) -> Self {
        Interval { start, end }
    }

    pub fn empty() -> Self {
        Self::new(1, 0)
    }

    /// The capacity handed to the tree origin. Leaves slack at both domain
    /// edges so size arithmetic can never overflow.
    pub fn maximal() -> Self {
        Self::new(1, u64::MAX - 1)
    }

    pub fn size(&self) -> u64 {
        if self.start > self.end {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, other: Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn strictly_contains(&self, other: Self) -> bool {
        self.contains(other) && *self != other
    }

    /// Splits into (left, right) where left gets the ceiling half
    pub fn split_half(&self) -> (Self, Self) {
        let left_size = self.size() - self.size() / 2;
        (Self::new(self.start, self.start + left_size - 1), Self::new(self.start + left_size, self.end))
    }

    /// Splits into consecutive sub-intervals of exactly the given sizes.
    /// The sizes must sum to this interval's size.
    pub fn split_exact(&self, sizes: &[u64]) -> Vec<Self> {
        debug_assert_eq!(sizes.iter().sum::<u64>(), self.size(), "sizes must fill the interval exactly");
        let mut start = self.start;
        sizes
            .iter()
            .map(|size| {
                let interval = Self::new(start, start + size - 1);
                start += size;
                interval
            })
            .collect()
    }

    /// Splits into sub-intervals of at least the given sizes, distributing
    /// the spare capacity with an exponential bias toward larger sizes.
    pub fn split_exponential(&self, sizes: &[u64]) -> Vec<Self> {
        let interval_size = self.size();
        let sizes_sum: u64 = sizes.iter().sum();
        assert!(interval_size >= sizes_sum, "interval of size {interval_size} cannot fit sizes summing to {sizes_sum}");
        if interval_size == sizes_sum {
            return self.split_exact(sizes);
        }

        let mut remaining_bias = interval_size - sizes_sum;
        let total_bias = remaining_bias as f64;
        let fractions = exponential_fractions(sizes);
        let mut biased_sizes = Vec::with_capacity(sizes.len());
        for (i, fraction) in fractions.iter().enumerate() {
            let bias = if i == fractions.len() - 1 {
                remaining_bias
            } else {
                remaining_bias.min((total_bias * fraction).round() as u64)
            };
            biased_sizes.push(sizes[i] + bias);
            remaining_bias -= bias;
        }
        self.split_exact(&biased_sizes)
    }
}

/// Returns fractions proportional to 2^size, normalized by the maximum size
/// to stay within f64 range
fn exponential_fractions(sizes: &[u64]) -> Vec<f64> {
    let max_size = sizes.iter().copied().max().unwrap_or_default();
    let mut fractions: Vec<f64> = sizes.iter().map(|s| 2f64.powf(*s as f64 - max_size as f64)).collect();
    let sum: f64 = fractions.iter().sum();
    for fraction in fractions.iter_mut() {
        *fraction /= sum;
    }
    fractions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_and_emptiness() {
        assert_eq!(Interval::new(1, 5).size(), 5);
        assert_eq!(Interval::new(5, 5).size(), 1);
        assert!(Interval::empty().is_empty());
        assert_eq!(Interval::empty().size(), 0);
    }

    #[test]
    fn test_containment() {
        let outer = Interval::new(1, 100);
        assert!(outer.contains(Interval::new(1, 100)));
        assert!(!outer.strictly_contains(Interval::new(1, 100)));
        assert!(outer.strictly_contains(Interval::new(50, 51)));
        assert!(!outer.contains(Interval::new(0, 3)));
        assert!(!outer.contains(Interval::new(99, 101)));
    }

    #[test]
    fn test_split_half() {
        let (left, right) = Interval::new(1, 5).split_half();
        assert_eq!(left, Interval::new(1, 3));
        assert_eq!(right, Interval::new(4, 5));

        let (left, right) = Interval::new(4, 4).split_half();
        assert_eq!(left, Interval::new(4, 4));
        assert!(right.is_empty());
    }

    #[test]
    fn test_split_exact() {
        let intervals = Interval::new(1, 10).split_exact(&[2, 5, 3]);
        assert_eq!(intervals, vec![Interval::new(1, 2), Interval::new(3, 7), Interval::new(8, 10)]);
    }

    #[test]
    fn test_split_exponential_preserves_sizes_and_coverage() {
        let interval = Interval::new(1, 100);
        let sizes = [3u64, 12, 5];
        let splits = interval.split_exponential(&sizes);
        assert_eq!(splits.len(), sizes.len());
        for (split, size) in splits.iter().zip(sizes) {
            assert!(split.size() >= size);
        }
        assert_eq!(splits.iter().map(|s| s.size()).sum::<u64>(), interval.size());
        assert_eq!(splits.first().unwrap().start, interval.start);
        assert_eq!(splits.last().unwrap().end, interval.end);
        for pair in splits.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        // The largest subtree receives the largest share of the slack
        assert!(splits[1].size() > splits[0].size() + splits[2].size());
    }
}
