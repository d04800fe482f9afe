use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CofactorError;

/// How fresh factor vectors are drawn at registration time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RankInitScheme {
    /// Each coordinate ~ U[-max_init_value, +max_init_value].
    Random { max_init_value: f64 },
    /// Each coordinate ~ N(0, std_dev).
    Gaussian { std_dev: f64 },
}

/// Scheme name as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankInitKind {
    Random,
    #[default]
    Gaussian,
}

impl FromStr for RankInitKind {
    type Err = CofactorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "gaussian" => Ok(Self::Gaussian),
            other => Err(CofactorError::InvalidConfig(format!(
                "{other} is not a supported rank init scheme"
            ))),
        }
    }
}

impl RankInitScheme {
    /// Builds the scheme for `factor` latent dimensions. The gaussian spread
    /// never drops below `1/factor` so the first Gram matrices stay well
    /// conditioned.
    pub fn resolve(kind: RankInitKind, max_init_value: f64, min_init_stddev: f64, factor: usize) -> Self {
        match kind {
            RankInitKind::Random => Self::Random { max_init_value },
            RankInitKind::Gaussian => {
                let floor = 1.0 / factor.max(1) as f64;
                Self::Gaussian {
                    std_dev: min_init_stddev.max(floor),
                }
            }
        }
    }

    pub fn new_vector<R: Rng + ?Sized>(&self, factor: usize, rng: &mut R) -> Vec<f64> {
        let mut out = vec![0.0; factor];
        match *self {
            Self::Random { max_init_value } => {
                for v in out.iter_mut() {
                    *v = (rng.random::<f64>() * 2.0 - 1.0) * max_init_value;
                }
            }
            Self::Gaussian { std_dev } => {
                // Box-Muller, two normals per pair of uniforms
                for i in (0..factor).step_by(2) {
                    let mut u1: f64 = rng.random();
                    while u1 == 0.0 {
                        u1 = rng.random();
                    }
                    let u2: f64 = rng.random();
                    let r = (-2.0 * u1.ln()).sqrt();
                    let theta = 2.0 * std::f64::consts::PI * u2;
                    out[i] = r * theta.cos() * std_dev;
                    if i + 1 < factor {
                        out[i + 1] = r * theta.sin() * std_dev;
                    }
                }
            }
        }
        out
    }
}
