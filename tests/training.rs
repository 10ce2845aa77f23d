use std::num::NonZeroUsize;

use rand::{Rng, SeedableRng, rngs::StdRng};

use nndep_classifier::{
    Classifier, Config,
    arch::{CacheKey, WeightStore},
    dataset::Dataset,
    training::Trainer,
};

const VOCAB: usize = 12;
const LABELS: usize = 3;

fn config(seed: u64) -> Config {
    Config {
        embedding_size: 4,
        hidden_size: 16,
        num_tokens: 3,
        batch_size: 64,
        learning_rate: 0.1,
        ada_eps: 1e-8,
        reg_parameter: 1e-6,
        drop_prob: 0.0,
        num_pre_computed: 8,
        init_range: 0.5,
        max_iter: 100,
        training_threads: NonZeroUsize::new(2),
        seed: Some(seed),
    }
}

/// Every label is feasible and the gold one is a function of the first token.
fn separable_dataset(rng: &mut StdRng) -> Dataset {
    let mut dataset = Dataset::new(3, LABELS);

    for _ in 0..300 {
        let feature: Vec<usize> = (0..3).map(|_| rng.random_range(0..VOCAB)).collect();
        let mut label = [0; LABELS];
        label[feature[0] % LABELS] = 1;

        dataset.add_example(feature, &label).unwrap();
    }

    dataset
}

fn trainer(seed: u64) -> Trainer {
    let config = config(seed);
    let mut rng = StdRng::seed_from_u64(seed);
    let dataset = separable_dataset(&mut rng);
    let weights = WeightStore::random(&config, VOCAB, LABELS, &mut rng).unwrap();
    let keys = (0..VOCAB).map(|row| CacheKey::new(row, 0));

    let classifier = Classifier::new(config, weights, keys).unwrap();
    Trainer::new(classifier, dataset).unwrap()
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

#[test]
fn training_reduces_the_cost_of_a_separable_task() {
    let mut trainer = trainer(3);

    let stats = trainer.train().unwrap();
    let costs: Vec<f64> = stats.iter().map(|s| s.cost()).collect();

    assert_eq!(stats.len(), 100);
    assert!(costs.iter().all(|c| c.is_finite()));
    assert!(mean(&costs[90..]) < mean(&costs[..10]));
    assert!(stats.iter().all(|s| s.cached_keys() <= 8));

    // train() leaves the cache ready for scoring
    let classifier = trainer.into_classifier();
    assert!(classifier.score(&[0, 1, 2]).is_ok());
}

#[test]
fn seeded_training_is_reproducible() {
    let run = |seed| {
        let mut trainer = trainer(seed);
        let params = trainer.classifier().config().step_params();
        for _ in 0..5 {
            trainer.step(params).unwrap();
        }
        trainer.into_classifier().into_weights().into_parts()
    };

    assert_eq!(run(17), run(17));
}
