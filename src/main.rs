use std::{collections::HashMap, env};

use anyhow::Context;
use log::info;
use nndep_classifier::{
    Classifier, Config,
    arch::{CacheKey, WeightStore},
    dataset::Dataset,
    training::Trainer,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const VOCAB_SIZE: usize = 64;
const NUM_LABELS: usize = 5;
const NUM_EXAMPLES: usize = 2000;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {path}"))?,
        None => Config {
            embedding_size: 8,
            hidden_size: 32,
            num_tokens: 6,
            batch_size: 256,
            learning_rate: 0.05,
            num_pre_computed: 64,
            init_range: 0.1,
            max_iter: 200,
            seed: Some(42),
            ..Config::default()
        },
    };
    info!("{config:?}");

    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_default());
    let dataset = synthetic_dataset(&config, &mut rng)?;
    let keys = frequent_keys(&dataset);
    let weights = WeightStore::random(&config, VOCAB_SIZE, NUM_LABELS, &mut rng)?;

    let classifier = Classifier::new(config.clone(), weights, keys)?;
    let mut trainer = Trainer::new(classifier, dataset)?;
    info!(
        workers = trainer.num_workers().get(),
        examples = trainer.dataset().len();
        "training"
    );

    let params = config.step_params();
    for iter in 1..=config.max_iter {
        let stats = trainer.step(params)?;

        if iter % 10 == 0 || iter == config.max_iter {
            info!(
                iter = iter,
                cost = stats.cost(),
                accuracy = stats.accuracy(),
                cached = stats.cached_keys();
                "step"
            );
        }
    }

    let mut classifier = trainer.into_classifier();
    classifier.precompute()?;

    let correct = (0..NUM_EXAMPLES)
        .filter_map(|_| {
            let (feature, gold) = synthetic_example(&config, &mut rng);
            let scores = classifier.score(&feature).ok()?;
            let best = scores
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)?;
            (best == gold).then_some(())
        })
        .count();

    info!(
        "held out accuracy: {:.3}",
        correct as f64 / NUM_EXAMPLES as f64
    );
    Ok(())
}

/// Draws a random feature vector whose gold label depends on its first two tokens.
fn synthetic_example<R: Rng>(config: &Config, rng: &mut R) -> (Vec<usize>, usize) {
    let feature: Vec<usize> = (0..config.num_tokens)
        .map(|_| rng.random_range(0..VOCAB_SIZE))
        .collect();
    let gold = (feature[0] + feature.get(1).copied().unwrap_or(0)) % NUM_LABELS;

    (feature, gold)
}

fn synthetic_dataset<R: Rng>(config: &Config, rng: &mut R) -> nndep_classifier::Result<Dataset> {
    let mut dataset = Dataset::new(config.num_tokens, NUM_LABELS);

    for _ in 0..NUM_EXAMPLES {
        let (feature, gold) = synthetic_example(config, rng);
        // one random label is infeasible unless it's the gold one
        let blocked = rng.random_range(0..NUM_LABELS);
        let label: Vec<i32> = (0..NUM_LABELS)
            .map(|i| match i {
                i if i == gold => 1,
                i if i == blocked => -1,
                _ => 0,
            })
            .collect();

        dataset.add_example(feature, &label)?;
    }

    Ok(dataset)
}

/// Returns every (row, slot) pair of `dataset`, most frequent first.
fn frequent_keys(dataset: &Dataset) -> Vec<CacheKey> {
    let mut counts: HashMap<CacheKey, usize> = HashMap::new();
    for example in dataset.examples() {
        for (slot, &row) in example.feature().iter().enumerate() {
            *counts.entry(CacheKey::new(row, slot)).or_default() += 1;
        }
    }

    let mut keys: Vec<_> = counts.into_iter().collect();
    keys.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    keys.into_iter().map(|(key, _)| key).collect()
}
