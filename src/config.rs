use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{CofactorError, Result};
use crate::init::{RankInitKind, RankInitScheme};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMetric {
    #[default]
    Auc,
    #[serde(alias = "loss")]
    Objective,
}

impl FromStr for ValidationMetric {
    type Err = CofactorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auc" => Ok(Self::Auc),
            "objective" | "loss" => Ok(Self::Objective),
            other => Err(CofactorError::InvalidConfig(format!(
                "{other} is not a supported validation metric"
            ))),
        }
    }
}

/// Hyperparameters of one co-factorization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CofactorConfig {
    /// Number of latent factors F.
    pub factor: usize,
    /// Confidence of unobserved user-item cells.
    pub c0: f64,
    /// Confidence of observed user-item cells.
    pub c1: f64,
    pub lambda_theta: f64,
    pub lambda_beta: f64,
    pub lambda_gamma: f64,
    /// Initial global bias of the embedding objective.
    pub global_bias: f64,
    pub update_global_bias: bool,
    /// Learn per-item biases on both embedding sides.
    pub use_bias: bool,
    pub rank_init: RankInitKind,
    pub max_init_value: f64,
    pub min_init_stddev: f64,
    pub max_iters: usize,
    pub convergence_check: bool,
    pub convergence_rate: f64,
    pub validation_metric: ValidationMetric,
    /// Share of recorded pairs held out for validation.
    pub validation_ratio: f64,
    /// Negatives drawn per AUC probe.
    pub num_validation_examples_per_record: usize,
    pub seed: u64,
}

impl Default for CofactorConfig {
    fn default() -> Self {
        Self {
            factor: 10,
            c0: 0.1,
            c1: 1.0,
            lambda_theta: 1e-5,
            lambda_beta: 1e-5,
            lambda_gamma: 1.0,
            global_bias: 0.0,
            update_global_bias: false,
            use_bias: true,
            rank_init: RankInitKind::Gaussian,
            max_init_value: 1.0,
            min_init_stddev: 0.01,
            max_iters: 1,
            convergence_check: true,
            convergence_rate: 0.005,
            validation_metric: ValidationMetric::Auc,
            validation_ratio: 0.125,
            num_validation_examples_per_record: 10,
            seed: 31,
        }
    }
}

impl CofactorConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CofactorError::InvalidConfig(msg));

        if self.factor == 0 {
            return invalid("factor must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.validation_ratio) {
            return invalid(format!(
                "validation_ratio must be between 0.0 and 1.0: {}",
                self.validation_ratio
            ));
        }
        if self.update_global_bias && !self.use_bias {
            return invalid("cannot update the global bias with the bias clause disabled".into());
        }
        for (name, c) in [("c0", self.c0), ("c1", self.c1)] {
            if !c.is_finite() || c < 0.0 {
                return invalid(format!("{name} must be finite and non-negative: {c}"));
            }
        }
        for (name, l) in [
            ("lambda_theta", self.lambda_theta),
            ("lambda_beta", self.lambda_beta),
            ("lambda_gamma", self.lambda_gamma),
        ] {
            if !l.is_finite() || l <= 0.0 {
                return invalid(format!("{name} must be finite and positive: {l}"));
            }
        }
        if !self.global_bias.is_finite() {
            return invalid(format!("global_bias must be finite: {}", self.global_bias));
        }
        if self.max_iters == 0 {
            return invalid("max_iters must be greater than or equal to 1".into());
        }
        if !self.convergence_rate.is_finite() || self.convergence_rate < 0.0 {
            return invalid(format!(
                "convergence_rate must be finite and non-negative: {}",
                self.convergence_rate
            ));
        }
        if self.validation_metric == ValidationMetric::Auc
            && self.num_validation_examples_per_record == 0
        {
            return invalid(
                "num_validation_examples_per_record must be at least 1 for AUC validation".into(),
            );
        }
        if !self.max_init_value.is_finite() || !self.min_init_stddev.is_finite() {
            return invalid("initialization parameters must be finite".into());
        }
        Ok(())
    }

    pub fn init_scheme(&self) -> RankInitScheme {
        RankInitScheme::resolve(
            self.rank_init,
            self.max_init_value,
            self.min_init_stddev,
            self.factor,
        )
    }
}
