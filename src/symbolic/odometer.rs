//! A finite mixed-radix counter.

/// Iterates over all digit tuples `0..=maxima[k]` per position.
///
/// The first digit spins fastest and carries propagate rightward, so
/// `[1, 2]` yields `(0,0), (1,0), (0,1), (1,1), (0,2), (1,2)`. Restart
/// by constructing a fresh counter.
#[derive(Debug, Clone)]
pub struct MixedRadix {
    maxima: Vec<u64>,
    current: Vec<u64>,
    exhausted: bool,
}

impl MixedRadix {
    /// A counter with per-digit inclusive maxima. No digits means an
    /// empty iteration.
    pub fn new(maxima: impl Into<Vec<u64>>) -> Self {
        let maxima = maxima.into();
        let exhausted = maxima.is_empty();
        let current = vec![0; maxima.len()];
        MixedRadix {
            maxima,
            current,
            exhausted,
        }
    }

    /// All digits share one inclusive maximum.
    pub fn uniform(digits: usize, maximum: u64) -> Self {
        MixedRadix::new(vec![maximum; digits])
    }

    /// Number of tuples a full iteration produces.
    pub fn cardinality(&self) -> u64 {
        if self.maxima.is_empty() {
            return 0;
        }
        self.maxima.iter().map(|m| m + 1).product()
    }
}

impl Iterator for MixedRadix {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Vec<u64>> {
        if self.exhausted {
            return None;
        }
        let out = self.current.clone();
        self.current[0] += 1;
        for k in 0..self.maxima.len() - 1 {
            if self.current[k] > self.maxima[k] {
                self.current[k] = 0;
                self.current[k + 1] += 1;
            }
        }
        if let (Some(&last), Some(&max_last)) = (self.current.last(), self.maxima.last()) {
            if last > max_last {
                self.exhausted = true;
            }
        }
        Some(out)
    }
}
