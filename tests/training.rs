//! End-to-end training scenarios on tiny corpora.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use sensevec::math::{self, Matrix};
use sensevec::model::{Model, TrainingOptions};
use sensevec::real;
use sensevec::vocab::{Pos, Vocab};

fn base_opts() -> TrainingOptions {
    TrainingOptions {
        epochs: 1,
        embedding_layer_size: 10,
        window_size: 2,
        negative_sample: 0,
        dict_sample: 0,
        thread_num: 1,
        sub_sampling_factor: 0.0,
        unigram_table_size: 1_000_000,
        ..TrainingOptions::default()
    }
}

fn write_corpus(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("corpus.txt");
    fs::write(&path, text).unwrap();
    path
}

fn row_changed(before: &Matrix, after: &Matrix, i: usize) -> bool {
    before.row(i) != after.row(i)
}

#[test]
fn trains_only_the_rows_that_occur() {
    let mut vocab = Vocab::default();
    let alpha = vocab.add_word("alpha", 10);
    let beta = vocab.add_word("beta", 10);
    let gamma = vocab.add_word("gamma", 10);
    vocab.add_sense(alpha, Pos::Noun, "alpha%1:01:00", 1.0, &[]);
    let alpha_sense = vocab.lookup("alpha%1:01:00").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(
        &dir,
        "<doc>\n\
         alpha beta alpha beta alpha\n\
         beta alpha beta alpha beta\n\
         </doc>\n",
    );

    let mut model = Model::new(base_opts(), vocab, &corpus);
    model.initialize().unwrap();
    let in_before = model.embedding_in_weight.snapshot();
    let out_before = model.embedding_out_weight.snapshot();
    let sense_w_before = model.sense_selection_out_weight.snapshot();
    let sense_b_before = model.sense_selection_out_bias.snapshot();

    model.train().unwrap();

    let in_after = model.embedding_in_weight.snapshot();
    let out_after = model.embedding_out_weight.snapshot();

    // the trained words and alpha's sense move
    assert!(row_changed(&in_before, &in_after, alpha));
    assert!(row_changed(&in_before, &in_after, beta));
    assert!(row_changed(&in_before, &in_after, alpha_sense));
    assert!(row_changed(&out_before, &out_after, alpha));
    assert!(row_changed(&out_before, &out_after, beta));

    // a word that never occurs is untouched
    assert!(!row_changed(&in_before, &in_after, gamma));
    assert!(!row_changed(&out_before, &out_after, gamma));

    // with a single sense both softmaxes are exactly [1.0], so the
    // sense-selection gradient is exactly zero
    assert_eq!(model.sense_selection_out_weight.snapshot(), sense_w_before);
    assert_eq!(model.sense_selection_out_bias.snapshot(), sense_b_before);
}

fn pair_affinity(m_in: &Matrix, m_out: &Matrix, pairs: &[(usize, usize)]) -> real {
    pairs
        .iter()
        .map(|&(a, b)| math::dot(m_in.row(a), m_out.row(b)) + math::dot(m_in.row(b), m_out.row(a)))
        .sum::<real>()
        / pairs.len() as real
}

#[test]
fn converges_with_one_and_four_threads() {
    for thread_num in [1, 4] {
        let mut vocab = Vocab::default();
        let words: Vec<usize> = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|w| vocab.add_word(w, 80))
            .collect();
        let pairs = [
            (words[0], words[1]),
            (words[2], words[3]),
            (words[4], words[5]),
        ];

        let dir = tempfile::tempdir().unwrap();
        let mut text = String::new();
        for i in 0..40 {
            let (x, y) = [("a", "b"), ("c", "d"), ("e", "f")][i % 3];
            text.push_str(&format!("<doc>\n{x} {y} {x} {y} {x} {y} {x} {y}\n</doc>\n"));
        }
        let corpus = write_corpus(&dir, &text);

        let opts = TrainingOptions {
            epochs: 3,
            negative_sample: 2,
            thread_num,
            ..base_opts()
        };
        let mut model = Model::new(opts, vocab, &corpus);
        model.initialize().unwrap();
        let before = pair_affinity(
            &model.embedding_in_weight.snapshot(),
            &model.embedding_out_weight.snapshot(),
            &pairs,
        );

        model.train().unwrap();

        let after = pair_affinity(
            &model.embedding_in_weight.snapshot(),
            &model.embedding_out_weight.snapshot(),
            &pairs,
        );
        assert!(
            after > before,
            "{thread_num} threads: affinity {before} -> {after}"
        );
    }
}

#[test]
fn senseless_words_skip_sense_training() {
    let mut vocab = Vocab::default();
    for w in ["s1", "s2", "s3", "s4", "s5"] {
        vocab.add_word(w, 10);
    }
    let sensed = vocab.add_word("sensed", 10);
    vocab.add_sense(sensed, Pos::Verb, "sensed%2:30:00", 1.0, &[]);
    let sense_row = vocab.lookup("sensed%2:30:00").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(
        &dir,
        "<doc>\n\
         s1 s2 s3 s4 s5\n\
         s5 s4 s3 s2 s1\n\
         </doc>\n",
    );

    let mut model = Model::new(base_opts(), vocab, &corpus);
    model.initialize().unwrap();
    let in_before = model.embedding_in_weight.snapshot();
    let sense_w_before = model.sense_selection_out_weight.snapshot();
    let sense_b_before = model.sense_selection_out_bias.snapshot();

    model.train().unwrap();

    let in_after = model.embedding_in_weight.snapshot();
    assert!(row_changed(&in_before, &in_after, 0)); // word-level training ran
    assert!(!row_changed(&in_before, &in_after, sensed));
    assert!(!row_changed(&in_before, &in_after, sense_row));
    assert_eq!(model.sense_selection_out_weight.snapshot(), sense_w_before);
    assert_eq!(model.sense_selection_out_bias.snapshot(), sense_b_before);
}

fn two_sense_fixture(dir: &TempDir) -> (Vocab, PathBuf, usize, usize, Vec<usize>) {
    let mut vocab = Vocab::default();
    let poly = vocab.add_word("poly", 30);
    vocab.add_word("w1", 10);
    vocab.add_word("w2", 10);
    vocab.add_sense(poly, Pos::Noun, "poly%1:01:00", 0.6, &[]);
    vocab.add_sense(poly, Pos::Noun, "poly%1:02:00", 0.4, &[]);
    let sense_a = vocab.lookup("poly%1:01:00").unwrap();
    let sense_b = vocab.lookup("poly%1:02:00").unwrap();
    let all_words: Vec<usize> = (0..vocab.word_count()).collect();

    let corpus = write_corpus(
        dir,
        "<doc>\n\
         poly w1 poly w2 poly\n\
         w2 poly w1 poly w1\n\
         </doc>\n",
    );
    (vocab, corpus, sense_a, sense_b, all_words)
}

#[test]
fn stop_word_targets_freeze_the_sense_classifier() {
    let dir = tempfile::tempdir().unwrap();
    let (vocab, corpus, sense_a, sense_b, all_words) = two_sense_fixture(&dir);

    let mut model = Model::new(base_opts(), vocab, &corpus);
    model.initialize().unwrap();
    model.set_stop_words(all_words);
    let in_before = model.embedding_in_weight.snapshot();
    let sense_w_before = model.sense_selection_out_weight.snapshot();
    let sense_b_before = model.sense_selection_out_bias.snapshot();

    model.train().unwrap();

    // sense embeddings still learn, the classifier does not
    let in_after = model.embedding_in_weight.snapshot();
    assert!(row_changed(&in_before, &in_after, sense_a));
    assert!(row_changed(&in_before, &in_after, sense_b));
    assert_eq!(model.sense_selection_out_weight.snapshot(), sense_w_before);
    assert_eq!(model.sense_selection_out_bias.snapshot(), sense_b_before);
}

#[test]
fn sense_classifier_learns_without_stop_words() {
    let dir = tempfile::tempdir().unwrap();
    let (vocab, corpus, sense_a, sense_b, _) = two_sense_fixture(&dir);

    let mut model = Model::new(base_opts(), vocab, &corpus);
    model.initialize().unwrap();
    let in_before = model.embedding_in_weight.snapshot();
    let sense_w_before = model.sense_selection_out_weight.snapshot();
    let sense_b_before = model.sense_selection_out_bias.snapshot();

    model.train().unwrap();

    let in_after = model.embedding_in_weight.snapshot();
    assert!(row_changed(&in_before, &in_after, sense_a));
    assert!(row_changed(&in_before, &in_after, sense_b));
    assert_ne!(model.sense_selection_out_weight.snapshot(), sense_w_before);
    assert_ne!(model.sense_selection_out_bias.snapshot(), sense_b_before);
}

#[test]
fn saved_weights_reload_into_a_fresh_model() {
    let dir = tempfile::tempdir().unwrap();
    let (vocab, corpus, ..) = two_sense_fixture(&dir);
    let (vocab2, ..) = two_sense_fixture(&dir);

    let mut model = Model::new(base_opts(), vocab, &corpus);
    model.initialize().unwrap();
    model.train().unwrap();
    model.save(dir.path(), true).unwrap();

    let fresh = Model::new(base_opts(), vocab2, &corpus);
    fresh.load_weights(dir.path(), true).unwrap();
    assert_eq!(
        fresh.embedding_in_weight.snapshot(),
        model.embedding_in_weight.snapshot()
    );
    assert_eq!(
        fresh.embedding_out_weight.snapshot(),
        model.embedding_out_weight.snapshot()
    );
    assert_eq!(
        fresh.sense_selection_out_weight.snapshot(),
        model.sense_selection_out_weight.snapshot()
    );
    assert_eq!(
        fresh.sense_selection_out_bias.snapshot(),
        model.sense_selection_out_bias.snapshot()
    );
}

#[test]
fn dictionary_pairs_update_output_vectors_only() {
    let mut vocab = Vocab::default();
    let poly = vocab.add_word("poly", 30);
    vocab.add_word("w1", 10);
    vocab.add_word("w2", 10);
    let pair_word = vocab.add_word("confirm", 0); // dictionary-only word
    vocab.add_sense(poly, Pos::Noun, "poly%1:01:00", 1.0, &[pair_word]);

    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(
        &dir,
        "<doc>\n\
         poly w1 poly w2 poly\n\
         w2 poly w1 poly w1\n\
         </doc>\n",
    );

    let opts = TrainingOptions {
        dict_sample: 1,
        ..base_opts()
    };
    let mut model = Model::new(opts, vocab, &corpus);
    model.initialize().unwrap();
    let in_before = model.embedding_in_weight.snapshot();
    let out_before = model.embedding_out_weight.snapshot();

    model.train().unwrap();

    // the pair never occurs in the corpus, so only its output vector moves
    let in_after = model.embedding_in_weight.snapshot();
    let out_after = model.embedding_out_weight.snapshot();
    assert!(row_changed(&out_before, &out_after, pair_word));
    assert!(!row_changed(&in_before, &in_after, pair_word));
}
