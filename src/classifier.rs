//! Same-task classification of query pairs
//!
//! A [`Classifier`] wraps one [`SameTaskClassifier`] strategy and adds the
//! exact-text shortcut: identical texts always score 1.0 without consulting
//! the strategy.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::similarity::{extract_discretized_features, extract_normalized_distances};

/// Minimum score for two queries to be placed in the same task
pub const SAME_TASK_THRESHOLD: f64 = 0.25;

/// Minimum score for two queries to be considered related
pub const RELATED_THRESHOLD: f64 = 0.10;

/// Scores a pair of query texts in [0, 1]; higher means more likely the same task.
pub trait SameTaskClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, q1: &str, q2: &str) -> f64;
}

/// Logistic regression over discretized trigram overlap and term Jaccard.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticClassifier;

impl LogisticClassifier {
    const INTERCEPT: f64 = 2.0156;
    const OVERLAP_WEIGHT: f64 = 1.2243;
    const JACCARD_WEIGHT: f64 = 0.6781;
}

impl SameTaskClassifier for LogisticClassifier {
    fn name(&self) -> &str {
        "logistic"
    }

    fn score(&self, q1: &str, q2: &str) -> f64 {
        let features = extract_discretized_features(q1, q2);
        let z = Self::INTERCEPT
            - Self::OVERLAP_WEIGHT * f64::from(features.overlap)
            - Self::JACCARD_WEIGHT * f64::from(features.jaccard);
        let prob_not_same = 1.0 / (1.0 + (-z).exp());
        1.0 - prob_not_same
    }
}

/// One minus the mean of the normalized term, trigram and edit distances.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageDistanceClassifier;

impl SameTaskClassifier for AverageDistanceClassifier {
    fn name(&self) -> &str {
        "average_distance"
    }

    fn score(&self, q1: &str, q2: &str) -> f64 {
        // extract_normalized_distances lowercases both sides
        1.0 - extract_normalized_distances(q1, q2).mean()
    }
}

/// Built-in strategies selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    Logistic,
    #[default]
    AverageDistance,
}

impl ClassifierKind {
    pub fn strategy(self) -> Box<dyn SameTaskClassifier> {
        match self {
            ClassifierKind::Logistic => Box::new(LogisticClassifier),
            ClassifierKind::AverageDistance => Box::new(AverageDistanceClassifier),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::Logistic => "logistic",
            ClassifierKind::AverageDistance => "average_distance",
        }
    }
}

impl std::str::FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logistic" => Ok(ClassifierKind::Logistic),
            "average_distance" | "average-distance" => Ok(ClassifierKind::AverageDistance),
            other => Err(format!("unknown classifier strategy: {}", other)),
        }
    }
}

/// The active same-task classifier and its thresholds
pub struct Classifier {
    strategy: Box<dyn SameTaskClassifier>,
    same_task_threshold: f64,
    related_threshold: f64,
}

impl Classifier {
    pub fn new(kind: ClassifierKind) -> Self {
        Self::with_strategy(kind.strategy())
    }

    /// Use a custom strategy with the default thresholds
    pub fn with_strategy(strategy: Box<dyn SameTaskClassifier>) -> Self {
        Self {
            strategy,
            same_task_threshold: SAME_TASK_THRESHOLD,
            related_threshold: RELATED_THRESHOLD,
        }
    }

    pub fn with_thresholds(mut self, same_task: f64, related: f64) -> Self {
        self.same_task_threshold = same_task;
        self.related_threshold = related;
        self
    }

    /// Score two query texts; identical texts short-circuit to 1.0.
    pub fn classify(&self, q1: &str, q2: &str) -> f64 {
        if q1 == q2 {
            return 1.0;
        }
        self.strategy.score(q1, q2)
    }

    pub fn same_task_threshold(&self) -> f64 {
        self.same_task_threshold
    }

    pub fn related_threshold(&self) -> f64 {
        self.related_threshold
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierKind::default())
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("strategy", &self.strategy.name())
            .field("same_task_threshold", &self.same_task_threshold)
            .field("related_threshold", &self.related_threshold)
            .finish()
    }
}
