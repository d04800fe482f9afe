use std::time::Instant;

use cofactor::{
    Adjacency, CofactorConfig, CofactorModel, Feature, SppmiTable, TrainingSample,
    ValidationMetric,
};

fn synthetic_corpus(
    n_users: u32,
    n_items: u32,
    nnz_per_user: u32,
    neighbors_per_item: u32,
) -> (Adjacency<u32>, Adjacency<u32>, SppmiTable<u32>) {
    let mut user_to_items = Adjacency::new();
    let mut item_to_users: Adjacency<u32> = Adjacency::new();
    for u in 0..n_users {
        let items: Vec<u32> = (0..nnz_per_user).map(|j| (u + j * 97) % n_items).collect();
        for &i in &items {
            item_to_users.entry(i).or_default().push(u);
        }
        user_to_items.insert(u, items);
    }

    let mut sppmi = SppmiTable::new();
    for i in 0..n_items {
        let neighbors = (1..=neighbors_per_item)
            .flat_map(|d| [(i + d) % n_items, (i + n_items - d) % n_items])
            .map(|j| Feature::new(j, 1.0 + ((i ^ j) % 7) as f64 * 0.1))
            .collect();
        sppmi.insert(i, neighbors);
    }
    (user_to_items, item_to_users, sppmi)
}

fn main() {
    let n_users = 5_000;
    let n_items = 2_000;
    let k = 32;

    let (user_to_items, item_to_users, sppmi) = synthetic_corpus(n_users, n_items, 50, 10);

    let mut model = CofactorModel::new(CofactorConfig {
        factor: k,
        update_global_bias: true,
        validation_metric: ValidationMetric::Objective,
        ..Default::default()
    })
    .unwrap();
    model.register_users(0..n_users);
    model.register_items(0..n_items);
    let samples = TrainingSample::items_from_adjacency(model.beta().keys(), &item_to_users, &sppmi);

    let mut total_users = 0.0;
    let mut total_items = 0.0;
    let mut total_objective = 0.0;

    let s0 = Instant::now();
    for sweep in 0..3 {
        let t = Instant::now();
        model.update_with_users(&user_to_items).unwrap();
        total_users += t.elapsed().as_secs_f64();

        let t = Instant::now();
        model.update_with_items(&item_to_users, &sppmi).unwrap();
        total_items += t.elapsed().as_secs_f64();

        let t = Instant::now();
        let objective = model.objective(&samples).unwrap();
        total_objective += t.elapsed().as_secs_f64();
        println!("sweep {}: objective {:.4}", sweep + 1, objective);
    }
    let total = s0.elapsed().as_secs_f64();
    println!("Total time: {:.3}s", total);
    println!("  -> theta sweep: {:.3}s ({:.1}%)", total_users, total_users / total * 100.0);
    println!("  -> beta/gamma sweep: {:.3}s ({:.1}%)", total_items, total_items / total * 100.0);
    println!("  -> objective: {:.3}s ({:.1}%)", total_objective, total_objective / total * 100.0);
}
