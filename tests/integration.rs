//! End-to-end tests: train, score and retract through the public API.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tokenbayes::classifier::{Classifier, Evidence, Verdict};
use tokenbayes::config::ClassifierConfig;
use tokenbayes::error::{ClassifierError, StoreError};
use tokenbayes::store::{DurableStore, MemStore, TokenStore};

const SPAM: &[&[&str]] = &[
    &["buy", "cheap", "pills", "now", "offer"],
    &["cheap", "viagra", "offer", "click", "now"],
    &["winner", "claim", "prize", "click", "now"],
    &["buy", "viagra", "discount", "offer"],
];

const HAM: &[&[&str]] = &[
    &["meeting", "tomorrow", "agenda", "notes"],
    &["lunch", "tomorrow", "team", "notes"],
    &["review", "patch", "agenda", "team"],
    &["release", "notes", "patch", "review", "now"],
];

fn train<S: TokenStore>(classifier: &Classifier<S>) {
    for message in SPAM {
        classifier.add_spam(message.iter()).unwrap();
    }
    for message in HAM {
        classifier.add_ham(message.iter()).unwrap();
    }
}

fn check_trained<S: TokenStore>(classifier: &Classifier<S>) {
    let spam = classifier
        .spam_probability(["cheap", "viagra", "offer", "click"])
        .unwrap();
    let ham = classifier
        .spam_probability(["agenda", "meeting", "notes", "team"])
        .unwrap();
    assert!(spam > 0.9, "spam scored {spam}");
    assert!(ham < 0.1, "ham scored {ham}");

    assert_eq!(
        classifier.classify(["buy", "cheap", "pills", "offer"]).unwrap(),
        Verdict::Spam
    );
    assert_eq!(
        classifier.classify(["review", "patch", "team", "tomorrow"]).unwrap(),
        Verdict::Ham
    );

    // Unseen words say nothing.
    assert_eq!(classifier.spam_probability(["zebra", "quokka"]).unwrap(), 0.5);
    assert_eq!(classifier.classify(["zebra"]).unwrap(), Verdict::Unsure);
}

#[test]
fn volatile_store_end_to_end() {
    let classifier = Classifier::new(MemStore::new());
    train(&classifier);
    check_trained(&classifier);

    let globals = classifier.store().global_counts().unwrap();
    assert_eq!((globals.nspam, globals.nham), (4, 4));
}

#[test]
fn durable_store_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    let classifier = Classifier::new(DurableStore::open(dir.path()).unwrap());
    train(&classifier);
    check_trained(&classifier);
}

#[test]
fn both_stores_agree_on_every_score() {
    let dir = tempfile::TempDir::new().unwrap();
    let mem = Classifier::new(MemStore::new());
    let durable = Classifier::new(DurableStore::open(dir.path()).unwrap());
    train(&mem);
    train(&durable);

    for message in SPAM.iter().chain(HAM) {
        let a = mem.spam_probability_with_evidence(message.iter()).unwrap();
        let b = durable.spam_probability_with_evidence(message.iter()).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn untraining_restores_previous_scores() {
    let classifier = Classifier::new(MemStore::new());
    train(&classifier);
    let probe = ["cheap", "agenda", "click", "lunch", "mystery"];
    let before = classifier.spam_probability(probe).unwrap();

    let extra = ["cheap", "lunch", "mystery", "mystery"];
    classifier.add_spam(extra).unwrap();
    assert_ne!(classifier.spam_probability(probe).unwrap(), before);

    classifier.remove_spam(extra).unwrap();
    assert_eq!(classifier.spam_probability(probe).unwrap(), before);
}

#[test]
fn invalid_untraining_is_rejected_and_harmless() {
    let dir = tempfile::TempDir::new().unwrap();
    let classifier = Classifier::new(DurableStore::open(dir.path()).unwrap());

    let err = classifier.remove_ham(["meeting"]).unwrap_err();
    assert!(matches!(
        err,
        ClassifierError::Store(StoreError::NothingTrained { .. })
    ));

    train(&classifier);
    let before = classifier.store().global_counts().unwrap();

    // "viagra" was only ever trained as spam.
    let err = classifier.remove_ham(["viagra", "meeting"]).unwrap_err();
    assert!(matches!(
        err,
        ClassifierError::Store(StoreError::Inconsistent { .. })
    ));
    assert_eq!(classifier.store().global_counts().unwrap(), before);
    let counts = classifier
        .store()
        .token_counts(&tokenbayes::store::token_set(["meeting"]))
        .unwrap();
    assert_eq!(counts["meeting"].ham, 1);
}

#[test]
fn differently_tuned_classifiers_share_one_store() {
    let store = Arc::new(MemStore::new());
    let strict = Classifier::with_config(
        Arc::clone(&store),
        ClassifierConfig {
            ham_cutoff: 0.05,
            spam_cutoff: 0.99,
            ..Default::default()
        },
    )
    .unwrap();
    let loose = Classifier::with_config(
        Arc::clone(&store),
        ClassifierConfig {
            ham_cutoff: 0.4,
            spam_cutoff: 0.6,
            ..Default::default()
        },
    )
    .unwrap();

    // Training through one classifier is visible to the other.
    train(&strict);

    let message = ["cheap", "offer", "notes"];
    let a = strict.spam_probability(message).unwrap();
    let b = loose.spam_probability(message).unwrap();
    assert_eq!(a, b);
    assert!(a > 0.6 && a < 0.99, "score {a} should split the two tunings");
    assert_eq!(strict.verdict(a), Verdict::Unsure);
    assert_eq!(loose.verdict(a), Verdict::Spam);
}

#[test]
fn concurrent_scoring_and_training() {
    let classifier = Arc::new(Classifier::new(MemStore::new()));
    train(&*classifier);

    // Writers train "notes" while everyone scores it.
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let classifier = Arc::clone(&classifier);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let token = format!("filler{i}");
                    classifier.add_ham([token.as_str(), "notes"]).unwrap();
                    let score = classifier
                        .spam_probability(["cheap", "viagra", "notes"])
                        .unwrap();
                    assert!((0.0..=1.0).contains(&score));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let globals = classifier.store().global_counts().unwrap();
    assert_eq!(globals.nham, 4 + 4 * 50);
}

#[test]
fn scoring_while_memory_store_retrains() {
    let classifier = Arc::new(Classifier::new(MemStore::new()));
    classifier.add_spam(["t"]).unwrap();
    classifier.add_ham(["h"]).unwrap();

    let writer = {
        let classifier = Arc::clone(&classifier);
        std::thread::spawn(move || {
            for _ in 0..2000 {
                classifier.add_spam(["t"]).unwrap();
                classifier.remove_spam(["t"]).unwrap();
            }
        })
    };

    for _ in 0..2000 {
        match classifier.spam_probability(["t", "h"]) {
            Ok(score) => assert!((0.0..=1.0).contains(&score)),
            Err(e) => panic!("scoring a consistent store failed: {e}"),
        }
    }
    writer.join().unwrap();
    assert_eq!(
        classifier.store().global_counts().unwrap(),
        tokenbayes::store::GlobalCounts::new(1, 1)
    );
}

fn assert_well_formed(evidence: &Evidence, score: f64, limit: usize) {
    assert!((0.0..=1.0).contains(&score));
    assert!(evidence.clues.len() <= limit);
    for pair in evidence.clues.windows(2) {
        assert!(
            pair[0].probability < pair[1].probability
                || (pair[0].probability == pair[1].probability && pair[0].token < pair[1].token),
            "clues out of order: {pair:?}"
        );
    }

    let entries = evidence.entries();
    assert_eq!(entries.len(), evidence.clues.len() + 2);
    assert_eq!(entries[0], (Evidence::HAM_LABEL, evidence.ham_statistic));
    assert_eq!(entries[1], (Evidence::SPAM_LABEL, evidence.spam_statistic));

    if evidence.clues.is_empty() {
        assert_eq!(score, 0.5);
    }
}

#[test]
fn random_messages_produce_well_formed_evidence() {
    let mut rng = StdRng::seed_from_u64(7);
    let vocabulary: Vec<String> = (0..60).map(|i| format!("w{i}")).collect();
    let config = ClassifierConfig {
        max_discriminators: 8,
        ..Default::default()
    };
    let classifier = Classifier::with_config(MemStore::new(), config).unwrap();

    // Low words lean spam, high words lean ham.
    for _ in 0..40 {
        let len = rng.gen_range(3..12);
        let spam: Vec<&String> = (0..len).map(|_| &vocabulary[rng.gen_range(0..40)]).collect();
        classifier.add_spam(spam).unwrap();
        let ham: Vec<&String> = (0..len).map(|_| &vocabulary[rng.gen_range(20..60)]).collect();
        classifier.add_ham(ham).unwrap();
    }

    for _ in 0..100 {
        let len = rng.gen_range(0..30);
        let message: Vec<&String> = (0..len)
            .map(|_| &vocabulary[rng.gen_range(0..vocabulary.len())])
            .collect();
        let (score, evidence) = classifier
            .spam_probability_with_evidence(message.iter())
            .unwrap();
        assert_well_formed(&evidence, score, 8);
        assert_eq!(classifier.spam_probability(message).unwrap(), score);
    }
}
