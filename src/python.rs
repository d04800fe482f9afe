use numpy::{PyArray1, PyArray2, PyArrayMethods};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{CofactorConfig, ValidationMetric};
use crate::init::RankInitKind;
use crate::sample::{Feature, SppmiTable};
use crate::trainer::CofactorTrainer;
use crate::weights::Weights;

fn to_py_err(e: crate::error::CofactorError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn to_matrix<'py>(py: Python<'py>, w: &Weights<String>) -> PyResult<Py<PyArray2<f64>>> {
    let arr = PyArray1::from_vec(py, w.as_flat().to_vec());
    Ok(arr.reshape([w.len(), w.factor()])?.into())
}

/// Trains on parallel `(users[i], items[i])` interaction arrays plus an
/// SPPMI table given as `(sppmi_items[j], sppmi_neighbors[j], sppmi_weights[j])`
/// triplets. Returns `(user_keys, theta, item_keys, beta, global_bias)`.
#[pyfunction]
#[pyo3(signature = (users, items, sppmi_items, sppmi_neighbors, sppmi_weights, factors=10, c0=0.1, c1=1.0, lambda_theta=1e-5, lambda_beta=1e-5, lambda_gamma=1.0, global_bias=0.0, update_global_bias=false, use_bias=true, rank_init="gaussian", max_iters=1, convergence_rate=0.005, validation_metric="auc", validation_ratio=0.125, num_validation=10, seed=31))]
#[allow(clippy::too_many_arguments, clippy::type_complexity)]
pub fn cofactor_fit<'py>(
    py: Python<'py>,
    users: Vec<String>,
    items: Vec<String>,
    sppmi_items: Vec<String>,
    sppmi_neighbors: Vec<String>,
    sppmi_weights: Vec<f64>,
    factors: usize,
    c0: f64,
    c1: f64,
    lambda_theta: f64,
    lambda_beta: f64,
    lambda_gamma: f64,
    global_bias: f64,
    update_global_bias: bool,
    use_bias: bool,
    rank_init: &str,
    max_iters: usize,
    convergence_rate: f64,
    validation_metric: &str,
    validation_ratio: f64,
    num_validation: usize,
    seed: u64,
) -> PyResult<(Vec<String>, Py<PyArray2<f64>>, Vec<String>, Py<PyArray2<f64>>, f64)> {
    if users.len() != items.len() {
        return Err(PyValueError::new_err(
            "users and items must have the same length",
        ));
    }
    if sppmi_items.len() != sppmi_neighbors.len() || sppmi_items.len() != sppmi_weights.len() {
        return Err(PyValueError::new_err(
            "sppmi_items, sppmi_neighbors and sppmi_weights must have the same length",
        ));
    }

    let config = CofactorConfig {
        factor: factors,
        c0,
        c1,
        lambda_theta,
        lambda_beta,
        lambda_gamma,
        global_bias,
        update_global_bias,
        use_bias,
        rank_init: rank_init.parse::<RankInitKind>().map_err(to_py_err)?,
        max_iters,
        convergence_rate,
        validation_metric: validation_metric
            .parse::<ValidationMetric>()
            .map_err(to_py_err)?,
        validation_ratio,
        num_validation_examples_per_record: num_validation,
        seed,
        ..Default::default()
    };

    let fitted = py.detach(|| {
        let mut sppmi: SppmiTable<String> = SppmiTable::new();
        for ((item, neighbor), w) in sppmi_items.into_iter().zip(sppmi_neighbors).zip(sppmi_weights) {
            sppmi.entry(item).or_default().push(Feature::new(neighbor, w));
        }

        let mut trainer = CofactorTrainer::new(config)?;
        for (user, item) in users.into_iter().zip(items) {
            let neighbors = sppmi.remove(&item);
            trainer.record(user, item, neighbors);
        }
        trainer.fit()
    });
    let fitted = fitted.map_err(to_py_err)?;

    let theta = to_matrix(py, &fitted.theta)?;
    let beta = to_matrix(py, &fitted.beta)?;
    Ok((
        fitted.theta.keys().to_vec(),
        theta,
        fitted.beta.keys().to_vec(),
        beta,
        fitted.global_bias,
    ))
}
