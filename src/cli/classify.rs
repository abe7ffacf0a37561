//! Classify command implementation

use anyhow::Result;

use crate::classifier::{Classifier, ClassifierKind};
use crate::config::Config;
use crate::similarity::{
    extract_discretized_features, extract_features, extract_normalized_distances,
};

pub fn run(config: &Config, q1: &str, q2: &str, strategy: Option<ClassifierKind>) -> Result<()> {
    let classifier = match strategy {
        Some(kind) => Classifier::new(kind).with_thresholds(
            config.classifier.same_task_threshold,
            config.classifier.related_threshold,
        ),
        None => config.classifier(),
    };

    let raw = extract_features(q1, q2);
    let distances = extract_normalized_distances(q1, q2);
    let bins = extract_discretized_features(q1, q2);
    let score = classifier.classify(q1, q2);

    println!("{:<14} {:>10} {:>10} {:>6}", "Feature", "Raw", "Distance", "Bin");
    println!("{}", "-".repeat(44));
    println!(
        "{:<14} {:>10.4} {:>10.4} {:>6}",
        "term jaccard", raw.jaccard, distances.jaccard, bins.jaccard
    );
    println!(
        "{:<14} {:>10} {:>10.4} {:>6}",
        "3-gram overlap", raw.overlap, distances.overlap, bins.overlap
    );
    println!(
        "{:<14} {:>10} {:>10.4} {:>6}",
        "levenshtein", raw.levenshtein, distances.levenshtein, bins.levenshtein
    );
    println!();

    let verdict = if score >= classifier.same_task_threshold() {
        "same task"
    } else if score >= classifier.related_threshold() {
        "related"
    } else {
        "different tasks"
    };
    println!(
        "{} score: {:.4} ({})",
        classifier.strategy_name(),
        score,
        verdict
    );

    Ok(())
}
