use ahash::AHashSet;
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::gram::{weighted_gram, Gram};
use crate::math::dot;
use crate::sample::{Context, Feature, TrainingSample};
use crate::weights::{BiasTable, EntityKey, Weights};

// ── Objective terms ────────────────────────────────────────────────

/// Weighted MF loss over item-context samples.
///
/// Rated users contribute `c1·(observed - predict)²`, every other user
/// `c0·predict²`. Users without a vector are skipped, as are item contexts
/// whose item was never registered.
pub fn mf_loss<K: EntityKey>(
    samples: &[TrainingSample<K>],
    beta: &Weights<K>,
    theta: &Weights<K>,
    c0: f64,
    c1: f64,
) -> f64 {
    let theta_gram = weighted_gram(theta, 1.0);
    samples
        .iter()
        .filter_map(|s| match &s.context {
            Context::Item { key, .. } => beta
                .get(key)
                .map(|b| item_mf_loss(b, &s.features, theta, &theta_gram, c0, c1)),
            Context::User(_) => None,
        })
        .sum()
}

/// Background over all users via `c0·bᵀ(ΘᵀΘ)b`, then the rated users'
/// share is swapped from `c0` to `c1`.
pub(crate) fn item_mf_loss<K: EntityKey>(
    b: &[f64],
    rated: &[Feature<K>],
    theta: &Weights<K>,
    theta_gram: &Gram,
    c0: f64,
    c1: f64,
) -> f64 {
    let mut loss = c0 * theta_gram.quadratic_form(b);
    for f in rated {
        if let Some(t) = theta.get(&f.key) {
            let p = dot(t, b);
            let err = f.value - p;
            loss += c1 * err * err - c0 * p * p;
        }
    }
    loss
}

/// Squared SPPMI residuals
/// `(w_ij - beta[i]·gamma[j] - betaBias[i] - gammaBias[j] - global)²`
/// over item-context samples.
pub fn embed_loss<K: EntityKey>(
    samples: &[TrainingSample<K>],
    beta: &Weights<K>,
    gamma: &Weights<K>,
    beta_bias: &BiasTable<K>,
    gamma_bias: &BiasTable<K>,
    global_bias: f64,
) -> f64 {
    let mut loss = 0.0;
    for s in samples {
        let Context::Item { key, sppmi } = &s.context else {
            continue;
        };
        let (Some(b), Some(bb)) = (beta.get(key), beta_bias.get(key)) else {
            continue;
        };
        for f in sppmi {
            if let (Some(g), Some(gb)) = (gamma.get(&f.key), gamma_bias.get(&f.key)) {
                let r = f.value - dot(b, g) - bb - gb - global_bias;
                loss += r * r;
            }
        }
    }
    loss
}

// ── Ranking validation ─────────────────────────────────────────────

/// Fills `probes[num_pos..num_pos + num_neg]` with distinct keys drawn from
/// `candidates`, never repeating one of the positives. Returns how many
/// placeholders were filled, which is less than `num_neg` only when the
/// candidate universe runs out.
pub fn sample_negatives<K: EntityKey, R: Rng + ?Sized>(
    num_pos: usize,
    num_neg: usize,
    probes: &mut [K],
    candidates: &[K],
    rng: &mut R,
) -> usize {
    let num_pos = num_pos.min(probes.len());
    let end = (num_pos + num_neg).min(probes.len());
    let taken: AHashSet<&K> = probes[..num_pos].iter().collect();
    let pool: Vec<&K> = candidates.iter().filter(|k| !taken.contains(k)).collect();
    let chosen: Vec<K> = pool
        .choose_multiple(rng, end.saturating_sub(num_pos))
        .map(|k| (*k).clone())
        .collect();
    let filled = chosen.len();
    for (slot, key) in probes[num_pos..num_pos + filled].iter_mut().zip(chosen) {
        *slot = key;
    }
    filled
}

/// Share of negatives ranked strictly below the positive; ties count half.
pub fn auc(positive: f64, negatives: &[f64]) -> Option<f64> {
    if negatives.is_empty() {
        return None;
    }
    let wins: f64 = negatives
        .iter()
        .map(|&n| {
            if positive > n {
                1.0
            } else if positive == n {
                0.5
            } else {
                0.0
            }
        })
        .sum();
    Some(wins / negatives.len() as f64)
}
