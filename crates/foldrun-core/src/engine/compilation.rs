use tracing::debug;

/// Default granularity, in residues, of compilation buckets.
pub const COMPILATION_INTERVAL: usize = 50;

/// Rounds a sequence length up to the next multiple of `interval`.
///
/// A length that is already a multiple is its own bucket; zero stays zero.
pub fn round_up_seqlen(len: usize, interval: usize) -> usize {
    if interval == 0 {
        return len;
    }
    len.div_ceil(interval) * interval
}

/// Tracks the largest sequence-length bucket the current model has been compiled for.
///
/// The cache is owned by the batch driver and reset whenever a new model starts.
/// Because targets are processed in ascending length order, each model is compiled
/// at most once per distinct bucket; out-of-order input only costs extra compilations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompilationCache {
    largest: Option<usize>,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.largest = None;
    }

    /// True only when `bucket` strictly exceeds every bucket compiled so far.
    pub fn should_recompile(&self, bucket: usize) -> bool {
        match self.largest {
            Some(largest) => bucket > largest,
            None => true,
        }
    }

    pub fn record(&mut self, bucket: usize) {
        debug!(bucket, previous = ?self.largest, "Recording compiled bucket.");
        self.largest = Some(self.largest.map_or(bucket, |l| l.max(bucket)));
    }

    pub fn largest(&self) -> Option<usize> {
        self.largest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_seqlen_targets_interval_multiples() {
        assert_eq!(round_up_seqlen(0, 50), 0);
        assert_eq!(round_up_seqlen(1, 50), 50);
        assert_eq!(round_up_seqlen(50, 50), 50);
        assert_eq!(round_up_seqlen(51, 50), 100);
        assert_eq!(round_up_seqlen(37, 10), 40);
    }

    #[test]
    fn ascending_buckets_trigger_one_compilation_each() {
        let mut cache = CompilationCache::new();
        let lengths = [12, 37, 50, 51, 99, 100, 130];
        let mut compiled = Vec::new();

        for len in lengths {
            let bucket = round_up_seqlen(len, COMPILATION_INTERVAL);
            if cache.should_recompile(bucket) {
                cache.record(bucket);
                compiled.push(bucket);
            }
        }

        assert_eq!(compiled, vec![50, 100, 150]);
    }

    #[test]
    fn smaller_buckets_reuse_the_larger_compilation() {
        let mut cache = CompilationCache::new();
        cache.record(150);
        assert!(!cache.should_recompile(100));
        assert!(!cache.should_recompile(150));
        assert!(cache.should_recompile(200));
    }

    #[test]
    fn reset_forgets_previous_model() {
        let mut cache = CompilationCache::new();
        cache.record(100);
        cache.reset();
        assert_eq!(cache.largest(), None);
        assert!(cache.should_recompile(50));
    }
}
