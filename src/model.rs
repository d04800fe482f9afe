use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::debug;

use crate::config::{CofactorConfig, ValidationMetric};
use crate::counters::{bump, BetaTally, FeatureTally, SweepCounters};
use crate::error::{ensure_finite, Result};
use crate::gram::weighted_gram;
use crate::init::RankInitScheme;
use crate::loss::{auc, embed_loss, mf_loss, sample_negatives};
use crate::math::dot;
use crate::sample::{Adjacency, SppmiTable, TrainingSample};
use crate::updates::{
    new_beta_bias, new_beta_vector, new_gamma_bias, new_gamma_vector, new_global_bias,
    new_theta_vector, BetaContext,
};
use crate::weights::{BiasTable, EntityKey, Weights};

/// Alternating-least-squares engine fitting user factors (theta), item
/// factors (beta) and item embeddings (gamma) on one data partition.
///
/// All state is owned by the instance; separate partitions get separate
/// engines.
pub struct CofactorModel<K> {
    config: CofactorConfig,
    init: RankInitScheme,
    rng: StdRng,

    theta: Weights<K>,
    beta: Weights<K>,
    gamma: Weights<K>,
    beta_bias: BiasTable<K>,
    gamma_bias: BiasTable<K>,
    global_bias: f64,

    counters: Option<Arc<SweepCounters>>,
}

impl<K: EntityKey> CofactorModel<K> {
    /// Validates `config` and seeds the random source from `config.seed`.
    pub fn new(config: CofactorConfig) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: CofactorConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let k = config.factor;
        Ok(Self {
            init: config.init_scheme(),
            rng,
            theta: Weights::new(k),
            beta: Weights::new(k),
            gamma: Weights::new(k),
            beta_bias: BiasTable::new(),
            gamma_bias: BiasTable::new(),
            global_bias: config.global_bias,
            counters: None,
            config,
        })
    }

    pub fn with_counters(mut self, counters: Arc<SweepCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn config(&self) -> &CofactorConfig {
        &self.config
    }

    // ── Registration ───────────────────────────────────────────────

    pub fn register_users<I: IntoIterator<Item = K>>(&mut self, keys: I) {
        for key in keys {
            self.theta.register(key, &self.init, &mut self.rng);
        }
    }

    /// Every item gets an MF vector, an embedding vector and zero biases.
    pub fn register_items<I: IntoIterator<Item = K>>(&mut self, keys: I) {
        for key in keys {
            self.beta.register(key.clone(), &self.init, &mut self.rng);
            self.gamma.register(key.clone(), &self.init, &mut self.rng);
            self.beta_bias.register(key.clone(), 0.0);
            self.gamma_bias.register(key, 0.0);
        }
    }

    // ── Sweeps ─────────────────────────────────────────────────────

    /// Re-solves every registered user against the current item vectors.
    pub fn update_with_users(&mut self, user_to_items: &Adjacency<K>) -> Result<()> {
        let c0 = self.config.c0;
        let c1 = self.config.c1;
        let background = weighted_gram(&self.beta, c0).with_ridge(self.config.lambda_theta);
        let empty: Vec<K> = Vec::new();
        let mut tally = FeatureTally::default();

        for row in 0..self.theta.len() {
            let rated = user_to_items.get(self.theta.key(row)).unwrap_or(&empty);
            let x = new_theta_vector(rated, &self.beta, &background, c0, c1, &mut tally)?;
            self.theta.set_row(row, &x)?;
        }

        let unregistered = user_to_items
            .keys()
            .filter(|u| !self.theta.contains(u))
            .count() as u64;

        let counters = self.counters.as_deref();
        bump(counters.map(|c| &c.users), self.theta.len() as u64);
        bump(counters.map(|c| &c.skipped_users), unregistered);
        bump(counters.map(|c| &c.skipped_items), tally.skipped);
        bump(counters.map(|c| &c.theta_trainable), tally.trainable);
        bump(counters.map(|c| &c.theta_total), tally.total);

        debug!(
            users = self.theta.len(),
            unregistered,
            skipped_features = tally.skipped,
            "theta sweep done"
        );
        Ok(())
    }

    /// Re-solves every registered item: beta, then gamma, then (when the
    /// bias clause is on) both item biases. The global bias is refreshed
    /// once at the end of the sweep.
    pub fn update_with_items(
        &mut self,
        item_to_users: &Adjacency<K>,
        sppmi: &SppmiTable<K>,
    ) -> Result<()> {
        let c0 = self.config.c0;
        let c1 = self.config.c1;
        let background = weighted_gram(&self.theta, c0).with_ridge(self.config.lambda_beta);
        let no_users: Vec<K> = Vec::new();
        let mut tally = BetaTally::default();

        for row in 0..self.beta.len() {
            let item = self.beta.key(row).clone();
            let raters = item_to_users.get(&item).unwrap_or(&no_users);
            let neighbors = sppmi.get(&item).map(Vec::as_slice).unwrap_or(&[]);

            let ctx = BetaContext {
                theta: &self.theta,
                gamma: &self.gamma,
                beta_bias: &self.beta_bias,
                gamma_bias: &self.gamma_bias,
                global_bias: self.global_bias,
                background: &background,
                c0,
                c1,
            };
            let b = new_beta_vector(&item, raters, neighbors, &ctx, &mut tally)?;
            self.beta.set_row(row, &b)?;

            if let Some(g) = new_gamma_vector(
                &item,
                neighbors,
                &self.beta,
                &self.gamma_bias,
                &self.beta_bias,
                self.config.lambda_gamma,
                self.global_bias,
            )? {
                self.gamma.insert(item.clone(), &g)?;
            }

            if self.config.use_bias {
                if let Some(bb) = new_beta_bias(
                    &item,
                    neighbors,
                    &self.beta,
                    &self.gamma,
                    &self.gamma_bias,
                    self.global_bias,
                ) {
                    self.beta_bias.insert(item.clone(), bb);
                }
                if let Some(gb) = new_gamma_bias(
                    &item,
                    neighbors,
                    &self.beta,
                    &self.gamma,
                    &self.beta_bias,
                    self.global_bias,
                ) {
                    self.gamma_bias.insert(item, gb);
                }
            }
        }

        if self.config.update_global_bias {
            if let Some(g) = new_global_bias(
                self.beta.keys(),
                sppmi,
                &self.beta,
                &self.gamma,
                &self.beta_bias,
                &self.gamma_bias,
            ) {
                self.global_bias = ensure_finite(g)?;
            }
        }

        let unregistered = item_to_users
            .keys()
            .filter(|i| !self.beta.contains(i))
            .count() as u64;

        let counters = self.counters.as_deref();
        bump(counters.map(|c| &c.items), self.beta.len() as u64);
        bump(counters.map(|c| &c.skipped_items), unregistered + tally.neighbors.skipped);
        bump(counters.map(|c| &c.skipped_users), tally.raters.skipped);
        bump(counters.map(|c| &c.beta_trainable), tally.trainable());
        bump(counters.map(|c| &c.beta_total), tally.total());

        debug!(
            items = self.beta.len(),
            unregistered,
            skipped_raters = tally.raters.skipped,
            skipped_neighbors = tally.neighbors.skipped,
            global_bias = self.global_bias,
            "beta/gamma sweep done"
        );
        Ok(())
    }

    // ── Scoring & validation ───────────────────────────────────────

    pub fn predict(&self, user: &K, item: &K) -> Option<f64> {
        Some(dot(self.theta.get(user)?, self.beta.get(item)?))
    }

    /// Held-out loss of one (user, item) pair, or `None` when either side
    /// was never registered or no negative could be drawn.
    pub fn validate(&mut self, user: &K, item: &K) -> Result<Option<f64>> {
        let (Some(t), Some(b)) = (self.theta.get(user), self.beta.get(item)) else {
            return Ok(None);
        };
        let loss = match self.config.validation_metric {
            ValidationMetric::Objective => {
                let err = 1.0 - dot(t, b);
                self.config.c1 * err * err
            }
            ValidationMetric::Auc => {
                let num_neg = self.config.num_validation_examples_per_record;
                let mut probes = vec![item.clone(); 1 + num_neg];
                let filled =
                    sample_negatives(1, num_neg, &mut probes, self.beta.keys(), &mut self.rng);
                let negatives: Vec<f64> = probes[1..1 + filled]
                    .iter()
                    .filter_map(|neg| self.beta.get(neg).map(|v| dot(t, v)))
                    .collect();
                match auc(dot(t, b), &negatives) {
                    Some(a) => 1.0 - a,
                    None => return Ok(None),
                }
            }
        };
        ensure_finite(loss).map(Some)
    }

    /// MF loss + embedding loss + ridge penalties over item-context samples.
    /// Every block update of a sweep minimizes this exactly for its block.
    pub fn objective(&self, samples: &[TrainingSample<K>]) -> Result<f64> {
        let mf = mf_loss(samples, &self.beta, &self.theta, self.config.c0, self.config.c1);
        let embed = embed_loss(
            samples,
            &self.beta,
            &self.gamma,
            &self.beta_bias,
            &self.gamma_bias,
            self.global_bias,
        );
        let ridge = self.config.lambda_theta * self.theta.squared_norm()
            + self.config.lambda_beta * self.beta.squared_norm()
            + self.config.lambda_gamma * self.gamma.squared_norm();
        ensure_finite(mf + embed + ridge)
    }

    // ── Readout ────────────────────────────────────────────────────

    pub fn theta(&self) -> &Weights<K> {
        &self.theta
    }

    pub fn beta(&self) -> &Weights<K> {
        &self.beta
    }

    pub fn gamma(&self) -> &Weights<K> {
        &self.gamma
    }

    pub fn beta_bias(&self) -> &BiasTable<K> {
        &self.beta_bias
    }

    pub fn gamma_bias(&self) -> &BiasTable<K> {
        &self.gamma_bias
    }

    pub fn global_bias(&self) -> f64 {
        self.global_bias
    }

    /// Consumes the engine, yielding `(theta, beta, gamma, global_bias)`.
    pub fn into_factors(self) -> (Weights<K>, Weights<K>, Weights<K>, f64) {
        (self.theta, self.beta, self.gamma, self.global_bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::SweepCounters;
    use crate::error::CofactorError;
    use crate::sample::Feature;

    fn config() -> CofactorConfig {
        CofactorConfig {
            factor: 3,
            ..Default::default()
        }
    }

    fn corpus() -> (Adjacency<&'static str>, Adjacency<&'static str>, SppmiTable<&'static str>) {
        let mut u2i = Adjacency::new();
        u2i.insert("u1", vec!["a", "b"]);
        u2i.insert("u2", vec!["b"]);
        let mut i2u = Adjacency::new();
        i2u.insert("a", vec!["u1"]);
        i2u.insert("b", vec!["u1", "u2"]);
        let mut sppmi = SppmiTable::new();
        sppmi.insert("a", vec![Feature::new("b", 0.8)]);
        sppmi.insert("b", vec![Feature::new("a", 0.8), Feature::new("stale", 2.0)]);
        (u2i, i2u, sppmi)
    }

    #[test]
    fn rejects_invalid_config_before_any_data() {
        let err = CofactorModel::<u32>::new(CofactorConfig {
            factor: 0,
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, CofactorError::InvalidConfig(_)));
    }

    #[test]
    fn registration_initializes_every_table() {
        let mut m = CofactorModel::new(config()).unwrap();
        m.register_users(["u1", "u2"]);
        m.register_items(["a", "b", "a"]);
        assert_eq!(m.theta().len(), 2);
        assert_eq!(m.beta().len(), 2);
        assert_eq!(m.gamma().len(), 2);
        assert_eq!(m.beta_bias().get(&"a"), Some(0.0));
        assert_eq!(m.gamma_bias().get(&"b"), Some(0.0));
        assert_eq!(m.beta().keys(), &["a", "b"]);
    }

    #[test]
    fn sweeps_count_stale_references() {
        let (u2i, i2u, sppmi) = corpus();
        let counters = Arc::new(SweepCounters::new());
        let mut m = CofactorModel::new(config())
            .unwrap()
            .with_counters(counters.clone());
        m.register_users(["u1", "u2"]);
        m.register_items(["a", "b"]);

        m.update_with_users(&u2i).unwrap();
        m.update_with_items(&i2u, &sppmi).unwrap();

        let snap = counters.snapshot();
        assert_eq!(snap.users, 2);
        assert_eq!(snap.items, 2);
        assert_eq!(snap.theta_total, 3);
        assert_eq!(snap.theta_trainable, 3);
        // raters (3) + trainable neighbors (2) + the stale one
        assert_eq!(snap.beta_total, 6);
        assert_eq!(snap.beta_trainable, 5);
        assert_eq!(snap.skipped_items, 1);
        assert!(m.theta().as_flat().iter().all(|v| v.is_finite()));
        assert!(m.gamma().as_flat().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn validate_unregistered_pair_is_not_applicable() {
        let mut m = CofactorModel::new(config()).unwrap();
        m.register_users(["u1"]);
        m.register_items(["a"]);
        assert_eq!(m.validate(&"ghost", &"a").unwrap(), None);
        assert_eq!(m.validate(&"u1", &"ghost").unwrap(), None);
    }

    #[test]
    fn auc_validation_needs_a_negative() {
        let mut m = CofactorModel::new(config()).unwrap();
        m.register_users(["u1"]);
        m.register_items(["a"]);
        assert_eq!(m.validate(&"u1", &"a").unwrap(), None);

        m.register_items(["b", "c"]);
        let loss = m.validate(&"u1", &"a").unwrap().unwrap();
        assert!((0.0..=1.0).contains(&loss));
    }

    #[test]
    fn objective_metric_is_squared_error() {
        let mut m = CofactorModel::new(CofactorConfig {
            validation_metric: ValidationMetric::Objective,
            ..config()
        })
        .unwrap();
        m.register_users(["u1"]);
        m.register_items(["a"]);
        let p = m.predict(&"u1", &"a").unwrap();
        let loss = m.validate(&"u1", &"a").unwrap().unwrap();
        assert!((loss - (1.0 - p).powi(2)).abs() < 1e-12);
    }

    #[test]
    fn global_bias_stays_fixed_unless_enabled() {
        let (u2i, i2u, sppmi) = corpus();
        let mut m = CofactorModel::new(CofactorConfig {
            global_bias: 0.25,
            ..config()
        })
        .unwrap();
        m.register_users(["u1", "u2"]);
        m.register_items(["a", "b"]);
        m.update_with_users(&u2i).unwrap();
        m.update_with_items(&i2u, &sppmi).unwrap();
        assert_eq!(m.global_bias(), 0.25);
    }

    #[test]
    fn biases_frozen_without_bias_clause() {
        let (u2i, i2u, sppmi) = corpus();
        let mut m = CofactorModel::new(CofactorConfig {
            use_bias: false,
            ..config()
        })
        .unwrap();
        m.register_users(["u1", "u2"]);
        m.register_items(["a", "b"]);
        m.update_with_users(&u2i).unwrap();
        m.update_with_items(&i2u, &sppmi).unwrap();
        assert_eq!(m.beta_bias().get(&"a"), Some(0.0));
        assert_eq!(m.gamma_bias().get(&"b"), Some(0.0));
    }
}
