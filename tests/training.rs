use std::sync::Arc;

use cofactor::{
    fit_partitions, CofactorConfig, CofactorError, CofactorTrainer, Feature, SweepCounters,
    TrainedModel, ValidationMetric,
};

const INTERACTIONS: &[(&str, &str)] = &[
    ("u0", "a"),
    ("u0", "b"),
    ("u1", "a"),
    ("u1", "c"),
    ("u2", "b"),
    ("u2", "c"),
    ("u2", "d"),
    ("u3", "d"),
    ("u3", "e"),
    ("u4", "a"),
    ("u4", "e"),
    ("u5", "c"),
    ("u5", "d"),
    ("u5", "e"),
];

/// Symmetric SPPMI over five items.
const SPPMI: &[(&str, &str, f64)] = &[
    ("a", "b", 1.4),
    ("a", "c", 0.6),
    ("b", "c", 0.9),
    ("c", "d", 1.1),
    ("d", "e", 1.7),
    ("a", "e", 0.3),
];

fn neighbors(item: &str) -> Vec<Feature<&'static str>> {
    SPPMI
        .iter()
        .filter_map(|&(i, j, w)| {
            if i == item {
                Some(Feature::new(j, w))
            } else if j == item {
                Some(Feature::new(i, w))
            } else {
                None
            }
        })
        .collect()
}

fn trainer(config: CofactorConfig) -> CofactorTrainer<&'static str> {
    let mut t = CofactorTrainer::new(config).unwrap();
    for &(user, item) in INTERACTIONS {
        t.record(user, item, Some(neighbors(item)));
    }
    t
}

/// Same corpus with the symmetric (a, b) SPPMI weight replaced.
fn trainer_with_ab_weight(config: CofactorConfig, weight: f64) -> CofactorTrainer<&'static str> {
    let mut t = CofactorTrainer::new(config).unwrap();
    for &(user, item) in INTERACTIONS {
        let mut row = neighbors(item);
        for f in &mut row {
            if (item, f.key) == ("a", "b") || (item, f.key) == ("b", "a") {
                f.value = weight;
            }
        }
        t.record(user, item, Some(row));
    }
    t
}

fn scored(fitted: &TrainedModel<&'static str>) -> Vec<f64> {
    fitted
        .loss_history
        .iter()
        .map(|l| l.expect("every sweep scored"))
        .collect()
}

fn objective_config() -> CofactorConfig {
    CofactorConfig {
        factor: 2,
        validation_ratio: 0.0,
        validation_metric: ValidationMetric::Objective,
        update_global_bias: true,
        ..Default::default()
    }
}

#[test]
fn objective_never_increases_across_sweeps() {
    let fitted = trainer(CofactorConfig {
        max_iters: 15,
        convergence_check: false,
        ..objective_config()
    })
    .fit()
    .unwrap();

    assert_eq!(fitted.sweeps, 15);
    for pair in scored(&fitted).windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        assert!(
            curr <= prev + 1e-9 * prev.abs().max(1.0),
            "objective rose from {prev} to {curr}"
        );
    }
    assert!(fitted.global_bias.is_finite());
}

#[test]
fn stops_early_once_improvement_stalls() {
    let max_iters = 100;
    let fitted = trainer(CofactorConfig {
        max_iters,
        convergence_rate: 0.2,
        ..objective_config()
    })
    .fit()
    .unwrap();

    assert!(fitted.sweeps >= 2);
    assert!(fitted.sweeps < max_iters);
    assert_eq!(fitted.loss_history.len(), fitted.sweeps);
}

#[test]
fn same_seed_gives_identical_factors() {
    let config = CofactorConfig {
        max_iters: 4,
        ..objective_config()
    };
    let a = trainer(config.clone()).fit().unwrap();
    let b = trainer(config).fit().unwrap();
    assert_eq!(a.theta.as_flat(), b.theta.as_flat());
    assert_eq!(a.beta.as_flat(), b.beta.as_flat());
    assert_eq!(a.gamma.as_flat(), b.gamma.as_flat());
    assert_eq!(a.loss_history, b.loss_history);
}

#[test]
fn auc_validation_reports_losses_in_unit_range() {
    let fitted = trainer(CofactorConfig {
        factor: 2,
        max_iters: 3,
        validation_ratio: 0.3,
        num_validation_examples_per_record: 2,
        ..Default::default()
    })
    .fit()
    .unwrap();

    assert_eq!(fitted.sweeps, fitted.loss_history.len());
    assert!(fitted
        .loss_history
        .iter()
        .flatten()
        .all(|l| (0.0..=1.0).contains(l)));
}

#[test]
fn cold_validation_pairs_report_no_loss() {
    let mut t = CofactorTrainer::new(CofactorConfig {
        factor: 2,
        max_iters: 3,
        validation_ratio: 0.5,
        ..Default::default()
    })
    .unwrap();
    let items = ["a", "b", "c", "d"];
    for n in 0..40 {
        // every user appears once, so held-out users never get a vector
        t.record(format!("user{n}"), items[n % items.len()].to_string(), None);
    }
    assert!(t.num_validation() > 0);
    assert!(t.num_training() > 0);

    let fitted = t.fit().unwrap();
    assert_eq!(fitted.sweeps, 3);
    assert_eq!(fitted.loss_history, vec![None; 3]);
}

#[test]
fn nan_sppmi_weight_aborts_the_run() {
    for metric in [ValidationMetric::Objective, ValidationMetric::Auc] {
        let err = trainer_with_ab_weight(
            CofactorConfig {
                max_iters: 3,
                validation_metric: metric,
                ..objective_config()
            },
            f64::NAN,
        )
        .fit()
        .unwrap_err();
        assert_eq!(err, CofactorError::NonFiniteSolution, "metric {metric:?}");
    }
}

#[test]
fn overflowing_sppmi_weight_aborts_on_the_system_matrix() {
    let err = trainer_with_ab_weight(
        CofactorConfig {
            max_iters: 3,
            ..objective_config()
        },
        1e300,
    )
    .fit()
    .unwrap_err();
    assert_eq!(err, CofactorError::NotPositiveDefinite { dim: 2 });
}

#[test]
fn counters_accumulate_over_sweeps() {
    let counters = Arc::new(SweepCounters::new());
    let fitted = trainer(CofactorConfig {
        max_iters: 2,
        convergence_check: false,
        ..objective_config()
    })
    .with_counters(counters.clone())
    .fit()
    .unwrap();

    let snap = counters.snapshot();
    assert_eq!(snap.users, 2 * fitted.theta.len() as u64);
    assert_eq!(snap.items, 2 * fitted.beta.len() as u64);
    assert_eq!(snap.theta_total, 2 * INTERACTIONS.len() as u64);
    assert_eq!(snap.skipped_items, 0);
    assert_eq!(snap.skipped_users, 0);
}

#[test]
fn partitions_fit_independently_in_input_order() {
    let config = CofactorConfig {
        max_iters: 3,
        ..objective_config()
    };
    let mut small = CofactorTrainer::new(config.clone()).unwrap();
    small.record("solo", "a", Some(vec![Feature::new("b", 1.0)]));
    small.record("solo", "b", Some(vec![Feature::new("a", 1.0)]));

    let results = fit_partitions(vec![trainer(config), small]);
    assert_eq!(results.len(), 2);

    let full = results[0].as_ref().unwrap();
    let tiny = results[1].as_ref().unwrap();
    assert_eq!(full.theta.len(), 6);
    assert_eq!(full.beta.len(), 5);
    assert_eq!(tiny.theta.keys(), &["solo"]);
    assert_eq!(tiny.beta.keys(), &["a", "b"]);
}
