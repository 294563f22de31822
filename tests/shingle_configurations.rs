//! Table-driven coverage across shingle configurations.

use streaming_rcf::Forest;

fn run_shingled_forest(shingle_size: usize, internal_rotation: bool, sample_size: usize) {
    let base_dim = 2;
    let mut forest = Forest::builder()
        .dimensions(base_dim * shingle_size)
        .shingle_size(shingle_size)
        .internal_shingling_enabled(true)
        .internal_rotation_enabled(internal_rotation)
        .number_of_trees(6)
        .sample_size(sample_size)
        .random_seed(101)
        .build()
        .unwrap();

    for seq in 0..500u64 {
        let tuple = [(seq % 17) as f64, ((seq * 3) % 11) as f64];
        forest.update(&tuple, seq).unwrap();
    }

    assert!(forest.total_updates() == 500);
    let score = forest.score(&vec![0.0; base_dim * shingle_size]).unwrap();
    assert!(score.is_finite() && score >= 0.0);
}

#[cfg(test)]
parameterized_test::create! { shingle_configuration, (shingle_size, internal_rotation, sample_size), {
    run_shingled_forest(shingle_size, internal_rotation, sample_size);
}}

shingle_configuration! {
    no_shingling: (1, false, 64),
    sliding_shingle: (4, false, 128),
    rotated_shingle: (4, true, 128),
    large_sliding_shingle: (8, false, 256),
}
