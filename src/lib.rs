//! Co-factorization of implicit feedback: alternating least squares over a
//! weighted user-item matrix factorization and an SPPMI item-embedding
//! objective that share the item vectors.

pub mod config;
pub mod convergence;
pub mod counters;
pub mod error;
pub mod gram;
pub mod init;
pub mod loss;
pub mod math;
pub mod model;
pub mod sample;
pub mod trainer;
pub mod updates;
pub mod weights;

#[cfg(feature = "python")]
mod python;

pub use config::{CofactorConfig, ValidationMetric};
pub use convergence::ConvergenceState;
pub use counters::{CounterSnapshot, SweepCounters};
pub use error::{CofactorError, Result};
pub use gram::{weighted_gram, weighted_gram_subset, Gram};
pub use init::{RankInitKind, RankInitScheme};
pub use model::CofactorModel;
pub use sample::{Adjacency, Context, Feature, SppmiTable, TrainingSample};
pub use trainer::{fit_partitions, CofactorTrainer, TrainedModel};
pub use weights::{BiasTable, EntityKey, Weights};

#[cfg(feature = "python")]
use mimalloc::MiMalloc;
#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[cfg(feature = "python")]
#[pymodule]
fn _cofactor(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(python::cofactor_fit, m)?)?;
    Ok(())
}
