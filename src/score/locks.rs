use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use parking_lot::{Mutex, MutexGuard};

const DEFAULT_STRIPES: usize = 64;

/// Striped per-product write locks.
///
/// Every read-modify-write of a product's counters (click or decay) runs
/// while holding the stripe for that id, so two writers on the same product
/// never interleave. Different products may share a stripe; that only costs
/// some contention.
pub struct CounterLocks {
    stripes: Vec<Mutex<()>>,
}

impl CounterLocks {
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    pub fn with_stripes(n: usize) -> Self {
        let n = n.max(1);
        Self {
            stripes: (0..n).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn lock(&self, product_id: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(product_id)].lock()
    }

    fn stripe_of(&self, product_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        product_id.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for CounterLocks {
    fn default() -> Self {
        Self::new()
    }
}
