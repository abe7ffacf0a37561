//! Property tests for the similarity features, the classifier and the
//! recently-accessed list

use proptest::prelude::*;

use tasktrail::classifier::{Classifier, ClassifierKind};
use tasktrail::model::RecentSearches;
use tasktrail::similarity::{levenshtein, ngram_overlap, term_jaccard};

fn query() -> impl Strategy<Value = String> {
    "[a-z]{1,8}( [a-z]{1,8}){0,4}"
}

proptest! {
    #[test]
    fn prop_identical_queries_score_one(q in query()) {
        for kind in [ClassifierKind::Logistic, ClassifierKind::AverageDistance] {
            prop_assert_eq!(Classifier::new(kind).classify(&q, &q), 1.0);
        }
    }

    #[test]
    fn prop_classifier_is_symmetric_and_bounded(q1 in query(), q2 in query()) {
        for kind in [ClassifierKind::Logistic, ClassifierKind::AverageDistance] {
            let classifier = Classifier::new(kind);
            let forward = classifier.classify(&q1, &q2);
            let backward = classifier.classify(&q2, &q1);
            prop_assert!((forward - backward).abs() < 1e-12);
            prop_assert!((0.0..=1.0).contains(&forward));
        }
    }

    #[test]
    fn prop_term_jaccard_symmetric(q1 in query(), q2 in query()) {
        let j = term_jaccard(&q1, &q2);
        prop_assert_eq!(j, term_jaccard(&q2, &q1));
        prop_assert!((0.0..=1.0).contains(&j));
    }

    #[test]
    fn prop_ngram_overlap_symmetric(q1 in query(), q2 in query()) {
        prop_assert_eq!(ngram_overlap(&q1, &q2, 3), ngram_overlap(&q2, &q1, 3));
    }

    #[test]
    fn prop_levenshtein_is_a_metric(a in "\\PC{0,12}", b in "\\PC{0,12}", c in "\\PC{0,12}") {
        prop_assert_eq!(levenshtein(&a, &a), 0);
        prop_assert_eq!(levenshtein(&a, &b), levenshtein(&b, &a));
        prop_assert!(levenshtein(&a, &c) <= levenshtein(&a, &b) + levenshtein(&b, &c));
        prop_assert!(levenshtein(&a, &b) <= a.chars().count().max(b.chars().count()));
    }

    #[test]
    fn prop_recent_searches_bounded(
        capacity in 1usize..8,
        touches in prop::collection::vec(0u64..16, 0..64)
    ) {
        let mut recent = RecentSearches::new(capacity);
        for &id in &touches {
            recent.touch(id);
            prop_assert_eq!(recent.current(1), vec![id]);
        }
        prop_assert!(recent.len() <= capacity);

        let ids = recent.current(capacity);
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), ids.len());
    }
}
