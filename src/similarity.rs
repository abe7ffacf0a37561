//! String similarity features for pairs of query texts
//!
//! Three families of features are computed:
//! - term-level Jaccard coefficient over whitespace-delimited terms
//! - character n-gram overlap (multiset) and Jaccard (set)
//! - Levenshtein edit distance
//!
//! Raw features feed the logistic classifier after discretization; the
//! normalized distance bundle feeds the averaged-distance classifier.

use std::collections::{HashMap, HashSet};

/// Size of the character grams used by both feature bundles
pub const CHAR_NGRAM_SIZE: usize = 3;

/// Frequency-counted character n-grams
pub type NGramCounts = HashMap<String, usize>;

/// Unnormalized similarity features
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFeatures {
    /// Term Jaccard coefficient in [0, 1]
    pub jaccard: f64,
    /// Shared character trigrams, counted with multiplicity
    pub overlap: usize,
    /// Edit distance between the two texts
    pub levenshtein: usize,
}

/// Distances normalized to [0, 1]; higher means more different
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedDistances {
    pub jaccard: f64,
    pub overlap: f64,
    pub levenshtein: f64,
}

impl NormalizedDistances {
    pub fn mean(&self) -> f64 {
        (self.jaccard + self.overlap + self.levenshtein) / 3.0
    }
}

/// Raw features mapped into bins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscretizedFeatures {
    pub jaccard: u8,
    pub overlap: u8,
    pub levenshtein: u8,
}

fn term_set(s: &str) -> HashSet<&str> {
    s.split_whitespace().collect()
}

fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Jaccard coefficient of the whitespace-delimited term sets of `s1` and `s2`.
/// Returns 0.0 when neither string has any terms.
pub fn term_jaccard(s1: &str, s2: &str) -> f64 {
    jaccard(&term_set(s1), &term_set(s2))
}

/// All length-`n` character substrings of `s` with their frequencies.
///
/// `"cold beer"` with `n = 3` yields `col, old, "ld ", "d b", " be", bee, eer`,
/// each once. Strings shorter than `n` produce no grams.
pub fn char_ngrams(s: &str, n: usize) -> NGramCounts {
    let mut grams = NGramCounts::new();
    if n == 0 {
        return grams;
    }

    let chars: Vec<char> = s.chars().collect();
    for window in chars.windows(n) {
        *grams.entry(window.iter().collect()).or_insert(0) += 1;
    }
    grams
}

/// Number of shared n-grams, each gram contributing the smaller of its two
/// frequencies.
pub fn ngram_overlap(s1: &str, s2: &str, n: usize) -> usize {
    let grams1 = char_ngrams(s1, n);
    let grams2 = char_ngrams(s2, n);

    grams1
        .iter()
        .filter_map(|(gram, &freq1)| grams2.get(gram).map(|&freq2| freq1.min(freq2)))
        .sum()
}

/// Jaccard coefficient over the sets of distinct n-grams (frequencies ignored).
pub fn ngram_jaccard(s1: &str, s2: &str, n: usize) -> f64 {
    let grams1 = char_ngrams(s1, n);
    let grams2 = char_ngrams(s2, n);
    let set1: HashSet<&String> = grams1.keys().collect();
    let set2: HashSet<&String> = grams2.keys().collect();
    jaccard(&set1, &set2)
}

/// Edit distance with unit cost insert, delete and substitute, over chars.
pub fn levenshtein(s: &str, t: &str) -> usize {
    let s: Vec<char> = s.chars().collect();
    let t: Vec<char> = t.chars().collect();

    if s.is_empty() {
        return t.len();
    }
    if t.is_empty() {
        return s.len();
    }

    // Two rolling rows of the (|s|+1) x (|t|+1) table.
    let mut prev: Vec<usize> = (0..=t.len()).collect();
    let mut curr = vec![0; t.len() + 1];

    for (i, sc) in s.iter().enumerate() {
        curr[0] = i + 1;
        for (j, tc) in t.iter().enumerate() {
            let cost = if sc == tc { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[t.len()]
}

/// Raw feature bundle: term Jaccard, trigram overlap and edit distance.
pub fn extract_features(q1: &str, q2: &str) -> RawFeatures {
    RawFeatures {
        jaccard: term_jaccard(q1, q2),
        overlap: ngram_overlap(q1, q2, CHAR_NGRAM_SIZE),
        levenshtein: levenshtein(q1, q2),
    }
}

/// Normalized distance bundle. Inputs are lowercased first.
pub fn extract_normalized_distances(q1: &str, q2: &str) -> NormalizedDistances {
    let q1 = q1.to_lowercase();
    let q2 = q2.to_lowercase();

    let longest = q1.chars().count().max(q2.chars().count());
    let levenshtein = if longest == 0 {
        0.0
    } else {
        levenshtein(&q1, &q2) as f64 / longest as f64
    };

    NormalizedDistances {
        jaccard: 1.0 - term_jaccard(&q1, &q2),
        overlap: 1.0 - ngram_jaccard(&q1, &q2, CHAR_NGRAM_SIZE),
        levenshtein,
    }
}

/// Raw features passed through the three discretizers.
pub fn extract_discretized_features(q1: &str, q2: &str) -> DiscretizedFeatures {
    let features = extract_features(q1, q2);
    DiscretizedFeatures {
        jaccard: discretize_jaccard(features.jaccard),
        overlap: discretize_overlap(features.overlap),
        levenshtein: discretize_levenshtein(features.levenshtein),
    }
}

/// Bins: `< 0.3` → 0, `< 0.7` → 1, otherwise 2.
pub fn discretize_jaccard(coefficient: f64) -> u8 {
    if coefficient < 0.3 {
        0
    } else if coefficient < 0.7 {
        1
    } else {
        2
    }
}

/// Bins: `< 2` → 0, `< 5` → 1, `< 10` → 2, otherwise 3.
pub fn discretize_overlap(overlap: usize) -> u8 {
    match overlap {
        0..=1 => 0,
        2..=4 => 1,
        5..=9 => 2,
        _ => 3,
    }
}

/// Bins: `< 2` → 0, `< 5` → 1, `< 10` → 2, otherwise 3.
///
/// Four bins, not three; the logistic model was fit against this binning.
pub fn discretize_levenshtein(distance: usize) -> u8 {
    match distance {
        0..=1 => 0,
        2..=4 => 1,
        5..=9 => 2,
        _ => 3,
    }
}
