use std::sync::atomic::{AtomicU64, Ordering};

/// Progress counters bumped as a side effect of each sweep.
#[derive(Debug, Default)]
pub struct SweepCounters {
    pub users: AtomicU64,
    pub items: AtomicU64,
    pub skipped_users: AtomicU64,
    pub skipped_items: AtomicU64,
    pub theta_trainable: AtomicU64,
    pub theta_total: AtomicU64,
    pub beta_trainable: AtomicU64,
    pub beta_total: AtomicU64,
}

impl SweepCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            users: load(&self.users),
            items: load(&self.items),
            skipped_users: load(&self.skipped_users),
            skipped_items: load(&self.skipped_items),
            theta_trainable: load(&self.theta_trainable),
            theta_total: load(&self.theta_total),
            beta_trainable: load(&self.beta_trainable),
            beta_total: load(&self.beta_total),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub users: u64,
    pub items: u64,
    pub skipped_users: u64,
    pub skipped_items: u64,
    pub theta_trainable: u64,
    pub theta_total: u64,
    pub beta_trainable: u64,
    pub beta_total: u64,
}

/// No-op when the counter is absent.
#[inline]
pub(crate) fn bump(counter: Option<&AtomicU64>, n: u64) {
    if let Some(c) = counter {
        if n > 0 {
            c.fetch_add(n, Ordering::Relaxed);
        }
    }
}

/// Per-entity feature accounting filled in by the closed-form updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureTally {
    pub total: u64,
    pub trainable: u64,
    pub skipped: u64,
}

impl FeatureTally {
    #[inline]
    pub(crate) fn hit(&mut self) {
        self.total += 1;
        self.trainable += 1;
    }

    #[inline]
    pub(crate) fn miss(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }

    pub fn merge(&mut self, other: FeatureTally) {
        self.total += other.total;
        self.trainable += other.trainable;
        self.skipped += other.skipped;
    }
}

/// β updates read two kinds of references: raters (users) and SPPMI
/// neighbors (items).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BetaTally {
    pub raters: FeatureTally,
    pub neighbors: FeatureTally,
}

impl BetaTally {
    pub fn total(&self) -> u64 {
        self.raters.total + self.neighbors.total
    }

    pub fn trainable(&self) -> u64 {
        self.raters.trainable + self.neighbors.trainable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_counter_is_noop() {
        bump(None, 5);
        let c = SweepCounters::new();
        bump(Some(&c.users), 2);
        bump(Some(&c.users), 3);
        assert_eq!(c.snapshot().users, 5);
        assert_eq!(c.snapshot().items, 0);
    }

    #[test]
    fn tally_merges() {
        let mut a = FeatureTally::default();
        a.hit();
        a.miss();
        let mut b = FeatureTally::default();
        b.hit();
        a.merge(b);
        assert_eq!(
            a,
            FeatureTally {
                total: 3,
                trainable: 2,
                skipped: 1
            }
        );
    }
}
