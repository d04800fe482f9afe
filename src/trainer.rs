use ahash::AHashSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{CofactorConfig, ValidationMetric};
use crate::convergence::ConvergenceState;
use crate::counters::SweepCounters;
use crate::error::{ensure_finite, Result};
use crate::model::CofactorModel;
use crate::sample::{Adjacency, Feature, SppmiTable, TrainingSample};
use crate::weights::{EntityKey, Weights};

/// Factors read out of a finished run.
#[derive(Debug, Clone)]
pub struct TrainedModel<K> {
    pub theta: Weights<K>,
    pub beta: Weights<K>,
    pub gamma: Weights<K>,
    pub global_bias: f64,
    pub sweeps: usize,
    /// Per-sweep average loss; `None` for a sweep where no held-out pair
    /// could be scored.
    pub loss_history: Vec<Option<f64>>,
}

/// Collects (user, item) interactions for one partition and drives the
/// sweep loop over them.
pub struct CofactorTrainer<K> {
    config: CofactorConfig,
    split_rng: StdRng,

    users: Vec<K>,
    items: Vec<K>,
    seen: AHashSet<(K, K)>,
    user_to_items: Adjacency<K>,
    item_to_users: Adjacency<K>,
    sppmi: SppmiTable<K>,
    validation: Vec<(K, K)>,

    counters: Option<Arc<SweepCounters>>,
}

impl<K: EntityKey> CofactorTrainer<K> {
    pub fn new(config: CofactorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            split_rng: StdRng::seed_from_u64(config.seed),
            config,
            users: Vec::new(),
            items: Vec::new(),
            seen: AHashSet::new(),
            user_to_items: Adjacency::new(),
            item_to_users: Adjacency::new(),
            sppmi: SppmiTable::new(),
            validation: Vec::new(),
            counters: None,
        })
    }

    pub fn with_counters(mut self, counters: Arc<SweepCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Records one interaction. The first SPPMI vector seen for an item is
    /// kept; later ones are ignored. A `validation_ratio` share of pairs is
    /// held out instead of trained on.
    pub fn record(&mut self, user: K, item: K, sppmi: Option<Vec<Feature<K>>>) {
        if let Some(neighbors) = sppmi {
            self.sppmi.entry(item.clone()).or_insert(neighbors);
        }
        if self.split_rng.random::<f64>() < self.config.validation_ratio {
            self.validation.push((user, item));
            return;
        }
        if !self.seen.insert((user.clone(), item.clone())) {
            return;
        }
        push_adjacent(&mut self.user_to_items, &mut self.users, user.clone(), item.clone());
        push_adjacent(&mut self.item_to_users, &mut self.items, item, user);
    }

    pub fn num_training(&self) -> usize {
        self.seen.len()
    }

    pub fn num_validation(&self) -> usize {
        self.validation.len()
    }

    pub fn user_to_items(&self) -> &Adjacency<K> {
        &self.user_to_items
    }

    pub fn item_to_users(&self) -> &Adjacency<K> {
        &self.item_to_users
    }

    pub fn sppmi(&self) -> &SppmiTable<K> {
        &self.sppmi
    }

    /// Registers every recorded entity in first-seen order and sweeps until
    /// convergence or `max_iters`.
    pub fn fit(self) -> Result<TrainedModel<K>> {
        let mut model = CofactorModel::new(self.config.clone())?;
        if let Some(c) = &self.counters {
            model = model.with_counters(c.clone());
        }
        model.register_users(self.users.iter().cloned());
        model.register_items(self.items.iter().cloned());

        let samples = TrainingSample::items_from_adjacency(
            model.beta().keys(),
            &self.item_to_users,
            &self.sppmi,
        );
        let metric = self.config.validation_metric;

        let mut state =
            ConvergenceState::new(self.config.convergence_check, self.config.convergence_rate);
        let mut loss_history = Vec::with_capacity(self.config.max_iters);

        for iteration in 0..self.config.max_iters {
            state.next();
            model.update_with_users(&self.user_to_items)?;
            model.update_with_items(&self.item_to_users, &self.sppmi)?;

            let observations = match metric {
                ValidationMetric::Objective => {
                    state.incr_loss(model.objective(&samples)?);
                    samples.len() as u64
                }
                ValidationMetric::Auc => {
                    let mut n = 0u64;
                    for (user, item) in &self.validation {
                        if let Some(loss) = model.validate(user, item)? {
                            state.incr_loss(loss);
                            n += 1;
                        }
                    }
                    n
                }
            };
            if observations == 0 {
                warn!(
                    iteration = iteration + 1,
                    validation = self.validation.len(),
                    "no applicable validation pairs; sweep loss not reported"
                );
                loss_history.push(None);
                continue;
            }
            let avg = ensure_finite(state.average_loss(observations))?;
            loss_history.push(Some(avg));

            info!(
                iteration = iteration + 1,
                max_iters = self.config.max_iters,
                average_loss = avg,
                training = self.seen.len(),
                validation = self.validation.len(),
                "sweep finished"
            );

            if state.is_converged(observations) {
                break;
            }
        }

        let sweeps = loss_history.len();
        let (theta, beta, gamma, global_bias) = model.into_factors();
        info!(
            users = theta.len(),
            items = beta.len(),
            sweeps,
            "model ready"
        );
        Ok(TrainedModel {
            theta,
            beta,
            gamma,
            global_bias,
            sweeps,
            loss_history,
        })
    }
}

fn push_adjacent<K: EntityKey>(map: &mut Adjacency<K>, order: &mut Vec<K>, key: K, value: K) {
    match map.get_mut(&key) {
        Some(values) => values.push(value),
        None => {
            order.push(key.clone());
            map.insert(key, vec![value]);
        }
    }
}

/// Fits independent partitions in parallel. Engines share no state and
/// their outputs are returned unmerged, in input order.
pub fn fit_partitions<K>(trainers: Vec<CofactorTrainer<K>>) -> Vec<Result<TrainedModel<K>>>
where
    K: EntityKey + Send + Sync,
{
    trainers.into_par_iter().map(CofactorTrainer::fit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CofactorConfig {
        CofactorConfig {
            factor: 2,
            validation_ratio: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn record_builds_both_adjacencies_in_first_seen_order() {
        let mut t = CofactorTrainer::new(config()).unwrap();
        t.record("u2", "b", None);
        t.record("u1", "a", Some(vec![Feature::new("b", 1.0)]));
        t.record("u1", "b", None);
        t.record("u1", "b", None);
        assert_eq!(t.users, vec!["u2", "u1"]);
        assert_eq!(t.items, vec!["b", "a"]);
        assert_eq!(t.user_to_items()[&"u1"], vec!["a", "b"]);
        assert_eq!(t.item_to_users()[&"b"], vec!["u2", "u1"]);
        assert_eq!(t.num_training(), 3);
    }

    #[test]
    fn first_sppmi_vector_wins() {
        let mut t = CofactorTrainer::new(config()).unwrap();
        t.record("u1", "a", Some(vec![Feature::new("b", 1.0)]));
        t.record("u2", "a", Some(vec![Feature::new("c", 9.0)]));
        assert_eq!(t.sppmi()[&"a"], vec![Feature::new("b", 1.0)]);
    }

    #[test]
    fn full_ratio_sends_everything_to_validation() {
        let mut t = CofactorTrainer::new(CofactorConfig {
            validation_ratio: 1.0,
            ..config()
        })
        .unwrap();
        t.record("u1", "a", None);
        t.record("u2", "b", None);
        assert_eq!(t.num_validation(), 2);
        assert_eq!(t.num_training(), 0);
    }

    #[test]
    fn fit_runs_without_validation_pairs() {
        let mut t = CofactorTrainer::new(CofactorConfig {
            max_iters: 3,
            ..config()
        })
        .unwrap();
        t.record("u1", "a", None);
        t.record("u2", "a", None);
        let fitted = t.fit().unwrap();
        assert_eq!(fitted.sweeps, 3);
        assert_eq!(fitted.loss_history, vec![None; 3]);
        assert_eq!(fitted.theta.len(), 2);
        assert_eq!(fitted.beta.len(), 1);
    }
}
