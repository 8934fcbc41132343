//! Height sources.

/// Produces the ordered heights one run processes.
pub trait Source: Send {
    /// First height of the run (inclusive).
    fn start_height(&self) -> u64;

    /// Last height of the run (inclusive).
    fn end_height(&self) -> u64;

    /// Next height to process, `None` when exhausted.
    fn next_height(&mut self) -> Option<u64>;

    /// Number of heights this source yields in total.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered heights: either a dense inclusive range or a sorted sparse whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heights {
    Range { start: u64, end: u64, next: Option<u64> },
    List { heights: Vec<u64>, cursor: usize },
}

impl Heights {
    /// Dense `[start, end]`. Empty when `end < start`.
    pub fn range(start: u64, end: u64) -> Self {
        Heights::Range {
            start,
            end,
            next: (end >= start).then_some(start),
        }
    }

    /// Sparse heights; sorted ascending and deduplicated.
    pub fn list(mut heights: Vec<u64>) -> Self {
        heights.sort_unstable();
        heights.dedup();
        Heights::List { heights, cursor: 0 }
    }

    pub fn start(&self) -> u64 {
        match self {
            Heights::Range { start, .. } => *start,
            Heights::List { heights, .. } => heights.first().copied().unwrap_or_default(),
        }
    }

    pub fn end(&self) -> u64 {
        match self {
            Heights::Range { end, .. } => *end,
            Heights::List { heights, .. } => heights.last().copied().unwrap_or_default(),
        }
    }

    pub fn total(&self) -> usize {
        match self {
            Heights::Range { start, end, .. } if end >= start => (end - start + 1) as usize,
            Heights::Range { .. } => 0,
            Heights::List { heights, .. } => heights.len(),
        }
    }
}

impl Iterator for Heights {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        match self {
            Heights::Range { end, next, .. } => {
                let h = (*next)?;
                *next = (h < *end).then(|| h + 1);
                Some(h)
            }
            Heights::List { heights, cursor } => {
                let h = heights.get(*cursor).copied()?;
                *cursor += 1;
                Some(h)
            }
        }
    }
}

impl Source for Heights {
    fn start_height(&self) -> u64 {
        self.start()
    }

    fn end_height(&self) -> u64 {
        self.end()
    }

    fn next_height(&mut self) -> Option<u64> {
        self.next()
    }

    fn len(&self) -> usize {
        self.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive() {
        let h: Vec<u64> = Heights::range(3, 6).collect();
        assert_eq!(h, vec![3, 4, 5, 6]);
        assert_eq!(Heights::range(3, 6).total(), 4);
    }

    #[test]
    fn empty_range() {
        let mut h = Heights::range(5, 4);
        assert_eq!(h.total(), 0);
        assert!(Source::is_empty(&h));
        assert_eq!(h.next(), None);
    }

    #[test]
    fn list_is_sorted_and_deduped() {
        let h = Heights::list(vec![9, 2, 5, 2]);
        assert_eq!(h.start(), 2);
        assert_eq!(h.end(), 9);
        assert_eq!(h.total(), 3);
        assert_eq!(h.collect::<Vec<_>>(), vec![2, 5, 9]);
    }

    #[test]
    fn single_height_range() {
        let mut h = Heights::range(10, 10);
        assert_eq!(h.next_height(), Some(10));
        assert_eq!(h.next_height(), None);
    }
}
