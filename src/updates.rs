//! Closed-form per-entity updates.
//!
//! Every vector update solves `(background + correction + ridge) x = rhs`
//! where `background` is shared by the whole sweep and borrowed read-only
//! here. References to entities without a vector are skipped and tallied.

use crate::counters::{BetaTally, FeatureTally};
use crate::error::Result;
use crate::gram::{weighted_gram_subset, Gram};
use crate::math::{add_in_place, axpy, dot};
use crate::sample::{Feature, SppmiTable};
use crate::weights::{BiasTable, EntityKey, Weights};

// ── MF side ────────────────────────────────────────────────────────

/// New user vector from the items the user rated.
///
/// `background` is `c0·BᵀB + λ_theta·I` over every item vector.
pub fn new_theta_vector<K: EntityKey>(
    rated: &[K],
    beta: &Weights<K>,
    background: &Gram,
    c0: f64,
    c1: f64,
    tally: &mut FeatureTally,
) -> Result<Vec<f64>> {
    let mut rhs = vec![0.0; beta.factor()];
    for item in rated {
        match beta.get(item) {
            Some(b) => {
                tally.hit();
                axpy(c1, b, &mut rhs);
            }
            None => tally.miss(),
        }
    }
    let correction = weighted_gram_subset(rated, beta, c1 - c0);
    background.corrected(&correction).solve(&rhs)
}

// ── Embedding side ─────────────────────────────────────────────────

/// Embedding pull on `beta[item]`:
/// `Σ_j (w_ij - betaBias[i] - gammaBias[j] - global) · gamma[j]`.
pub fn rsd<K: EntityKey>(
    item: &K,
    neighbors: &[Feature<K>],
    gamma: &Weights<K>,
    beta_bias: &BiasTable<K>,
    gamma_bias: &BiasTable<K>,
    global_bias: f64,
) -> Vec<f64> {
    let mut out = vec![0.0; gamma.factor()];
    let own_bias = beta_bias.get(item).unwrap_or(0.0);
    for f in neighbors {
        if let (Some(g), Some(gb)) = (gamma.get(&f.key), gamma_bias.get(&f.key)) {
            add_in_place(&mut out, g, f.value - own_bias - gb - global_bias);
        }
    }
    out
}

/// Inputs shared by every β update of one item sweep.
pub struct BetaContext<'a, K> {
    pub theta: &'a Weights<K>,
    pub gamma: &'a Weights<K>,
    pub beta_bias: &'a BiasTable<K>,
    pub gamma_bias: &'a BiasTable<K>,
    pub global_bias: f64,
    /// `c0·ΘᵀΘ + λ_beta·I` over every user vector.
    pub background: &'a Gram,
    pub c0: f64,
    pub c1: f64,
}

/// New item vector: MF pull from the item's raters plus the embedding pull
/// from its SPPMI neighbors, both folded into one ridge system.
pub fn new_beta_vector<K: EntityKey>(
    item: &K,
    raters: &[K],
    neighbors: &[Feature<K>],
    ctx: &BetaContext<'_, K>,
    tally: &mut BetaTally,
) -> Result<Vec<f64>> {
    let theta = ctx.theta;
    let mut rhs = vec![0.0; theta.factor()];
    for user in raters {
        match theta.get(user) {
            Some(t) => {
                tally.raters.hit();
                axpy(ctx.c1, t, &mut rhs);
            }
            None => tally.raters.miss(),
        }
    }

    let mut correction = weighted_gram_subset(raters, theta, ctx.c1 - ctx.c0);
    let own_bias = ctx.beta_bias.get(item).unwrap_or(0.0);
    for f in neighbors {
        match (ctx.gamma.get(&f.key), ctx.gamma_bias.get(&f.key)) {
            (Some(g), Some(gb)) => {
                tally.neighbors.hit();
                axpy(f.value - own_bias - gb - ctx.global_bias, g, &mut rhs);
                correction.add_outer(1.0, g);
            }
            _ => tally.neighbors.miss(),
        }
    }

    ctx.background.corrected(&correction).solve(&rhs)
}

/// New embedding vector for `item`, regressed against SPPMI residuals only.
/// `None` when no neighbor is trainable. Neighbor misses are already
/// tallied by the β update of the same item.
pub fn new_gamma_vector<K: EntityKey>(
    item: &K,
    neighbors: &[Feature<K>],
    beta: &Weights<K>,
    gamma_bias: &BiasTable<K>,
    beta_bias: &BiasTable<K>,
    lambda_gamma: f64,
    global_bias: f64,
) -> Result<Option<Vec<f64>>> {
    let k = beta.factor();
    let own_bias = gamma_bias.get(item).unwrap_or(0.0);
    let mut a = Gram::zeros(k);
    let mut rhs = vec![0.0; k];
    let mut trainable = 0usize;

    for f in neighbors {
        if let (Some(b), Some(bb)) = (beta.get(&f.key), beta_bias.get(&f.key)) {
            trainable += 1;
            axpy(f.value - bb - own_bias - global_bias, b, &mut rhs);
            a.add_outer(1.0, b);
        }
    }
    if trainable == 0 {
        return Ok(None);
    }
    a.with_ridge(lambda_gamma).solve(&rhs).map(Some)
}

// ── Biases ─────────────────────────────────────────────────────────

/// Mean residual `w_ij - beta[i]·gamma[j] - gammaBias[j] - global` over the
/// trainable neighbors of `item`.
pub fn new_beta_bias<K: EntityKey>(
    item: &K,
    neighbors: &[Feature<K>],
    beta: &Weights<K>,
    gamma: &Weights<K>,
    gamma_bias: &BiasTable<K>,
    global_bias: f64,
) -> Option<f64> {
    let b = beta.get(item)?;
    let mut sum = 0.0;
    let mut n = 0usize;
    for f in neighbors {
        if let (Some(g), Some(gb)) = (gamma.get(&f.key), gamma_bias.get(&f.key)) {
            sum += f.value - dot(b, g) - gb - global_bias;
            n += 1;
        }
    }
    (n > 0).then(|| sum / n as f64)
}

/// Mirror of [`new_beta_bias`] for the embedding side:
/// mean of `w_ij - beta[j]·gamma[i] - betaBias[j] - global`.
pub fn new_gamma_bias<K: EntityKey>(
    item: &K,
    neighbors: &[Feature<K>],
    beta: &Weights<K>,
    gamma: &Weights<K>,
    beta_bias: &BiasTable<K>,
    global_bias: f64,
) -> Option<f64> {
    let g = gamma.get(item)?;
    let mut sum = 0.0;
    let mut n = 0usize;
    for f in neighbors {
        if let (Some(b), Some(bb)) = (beta.get(&f.key), beta_bias.get(&f.key)) {
            sum += f.value - dot(b, g) - bb - global_bias;
            n += 1;
        }
    }
    (n > 0).then(|| sum / n as f64)
}

/// Mean residual `w_ij - beta[i]·gamma[j] - betaBias[i] - gammaBias[j]` over
/// every trainable (item, neighbor) pair.
pub fn new_global_bias<'a, K: EntityKey + 'a>(
    items: impl IntoIterator<Item = &'a K>,
    sppmi: &SppmiTable<K>,
    beta: &Weights<K>,
    gamma: &Weights<K>,
    beta_bias: &BiasTable<K>,
    gamma_bias: &BiasTable<K>,
) -> Option<f64> {
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for item in items {
        let (Some(b), Some(bb), Some(neighbors)) =
            (beta.get(item), beta_bias.get(item), sppmi.get(item))
        else {
            continue;
        };
        for f in neighbors {
            if let (Some(g), Some(gb)) = (gamma.get(&f.key), gamma_bias.get(&f.key)) {
                sum += f.value - dot(b, g) - bb - gb;
                pairs += 1;
            }
        }
    }
    (pairs > 0).then(|| sum / pairs as f64)
}
