//! The training engine.
//!
//! `Model` owns the four weight matrices and runs Hogwild SGD over a
//! `<doc>`-sharded corpus: every worker thread streams its own byte range
//! and applies gradient updates to the shared weights with no locking.
//! Three objectives are trained jointly per position: skip-gram word
//! prediction, sense selection supervised by a dictionary-pair reward, and
//! the dictionary-pair embedding updates themselves.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use anyhow::{ensure, Context, Result};
use rand::rngs::{SmallRng, StdRng};
use rand::{Rng, SeedableRng};

use crate::corpus::{Document, ShardReader};
use crate::hogwild::{self, SharedMatrix, SharedVector};
use crate::math::{sigmoid, Vector};
use crate::real;
use crate::sampling::{SubsamplingTable, UnigramTable};
use crate::vocab::Vocab;
use crate::weights;

pub const EMBEDDING_IN_FILE: &str = "embedding_in.txt";
pub const EMBEDDING_OUT_FILE: &str = "embedding_out.txt";
pub const SENSE_WEIGHT_FILE: &str = "sense_selection_weight.txt";
pub const SENSE_BIAS_FILE: &str = "sense_selection_bias.txt";

const PROGRESS_INTERVAL: u64 = 10_000;

#[derive(Clone, Debug)]
pub struct TrainingOptions {
    pub epochs: u32,
    pub embedding_layer_size: usize,
    pub window_size: usize,
    pub negative_sample: usize,
    pub dict_sample: usize,
    pub thread_num: usize,
    pub sub_sampling_factor: f64,
    pub learning_rate: real,
    pub min_learning_rate: real,
    pub temperature: real,
    pub min_temperature: real,
    pub beta_dict: real,
    pub min_beta_dict: real,
    pub beta_reward: real,
    pub min_beta_reward: real,
    pub unigram_table_size: usize,
    pub seed: u64,
    pub verbose: bool,
}

impl Default for TrainingOptions {
    fn default() -> TrainingOptions {
        TrainingOptions {
            epochs: 10,
            embedding_layer_size: 300,
            window_size: 5,
            negative_sample: 5,
            dict_sample: 3,
            thread_num: 1,
            sub_sampling_factor: 1e-4,
            learning_rate: 0.025,
            min_learning_rate: 1e-4,
            temperature: 1.0,
            min_temperature: 0.01,
            beta_dict: 0.8,
            min_beta_dict: 0.35,
            beta_reward: 0.8,
            min_beta_reward: 0.35,
            unigram_table_size: 100_000_000,
            seed: 495,
            verbose: false,
        }
    }
}

pub struct Model {
    pub vocab: Vocab,
    opts: TrainingOptions,
    training_corpus: PathBuf,
    file_size: u64,

    /// Input-side vectors for both plain words and senses, row = synset id.
    pub embedding_in_weight: SharedMatrix,
    /// Output-side (context-prediction) vectors, row = word id.
    pub embedding_out_weight: SharedMatrix,
    /// Sense-selection classifier over the 3x-dim feature vector, row = lemma id.
    pub sense_selection_out_weight: SharedMatrix,
    pub sense_selection_out_bias: SharedVector,

    unigram_table: UnigramTable,
    subsampling: SubsamplingTable,
    /// Target word ids too generic to supervise sense selection.
    stop_words: HashSet<usize>,

    trained_word_count: AtomicU64,
    start: Instant,
}

impl Model {
    pub fn new(opts: TrainingOptions, vocab: Vocab, training_corpus: &Path) -> Model {
        let dim = opts.embedding_layer_size;
        Model {
            embedding_in_weight: SharedMatrix::zeros(vocab.synset_count(), dim),
            embedding_out_weight: SharedMatrix::zeros(vocab.word_count(), dim),
            sense_selection_out_weight: SharedMatrix::zeros(vocab.lemma_count(), dim * 3),
            sense_selection_out_bias: SharedVector::zeros(vocab.lemma_count()),
            unigram_table: UnigramTable::default(),
            subsampling: SubsamplingTable::default(),
            stop_words: HashSet::new(),
            trained_word_count: AtomicU64::new(0),
            start: Instant::now(),
            file_size: 0,
            training_corpus: training_corpus.to_path_buf(),
            vocab,
            opts,
        }
    }

    /// Randomizes the weights and builds the sampling tables. Must be
    /// called once before `train`.
    pub fn initialize(&mut self) -> Result<()> {
        ensure!(self.opts.embedding_layer_size >= 1, "embedding layer size must be at least 1");
        ensure!(self.opts.window_size >= 1, "window size must be at least 1");
        ensure!(self.opts.thread_num >= 1, "thread count must be at least 1");
        ensure!(self.vocab.word_count() > 0, "vocabulary is empty");
        ensure!(
            self.opts.negative_sample == 0 || self.opts.unigram_table_size > 0,
            "negative sampling requires a non-empty unigram table"
        );

        let mut rng = StdRng::seed_from_u64(self.opts.seed);
        let bound = 0.5 / self.opts.embedding_layer_size as real;
        self.embedding_in_weight.set_random_uniform(&mut rng, -bound, bound);
        self.embedding_out_weight.set_random_uniform(&mut rng, -bound, bound);
        self.sense_selection_out_weight.set_glorot_uniform(&mut rng);
        // the sense-selection bias starts at zero

        self.unigram_table =
            UnigramTable::new(&self.vocab.word_freq, self.opts.unigram_table_size);
        self.subsampling = SubsamplingTable::new(
            &self.vocab.word_freq,
            self.opts.sub_sampling_factor,
            self.vocab.total_word_count(),
        );
        self.file_size = fs::metadata(&self.training_corpus)
            .context("cannot stat training data file")?
            .len();
        Ok(())
    }

    /// Reads one stop word per whitespace-separated token; words missing
    /// from the vocabulary are ignored.
    pub fn load_stop_words(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path).context("cannot open stop word file")?;
        for token in text.split_whitespace() {
            if let Some(widx) = self.vocab.lookup(token) {
                self.stop_words.insert(widx);
            }
        }
        Ok(())
    }

    pub fn set_stop_words(&mut self, words: impl IntoIterator<Item = usize>) {
        self.stop_words = words.into_iter().collect();
    }

    /// Runs the full training schedule: `thread_num` workers, each making
    /// `epochs` passes over its own shard of the corpus.
    pub fn train(&mut self) -> Result<()> {
        self.start = Instant::now();
        self.trained_word_count.store(0, Ordering::Relaxed);

        let this: &Model = self;
        thread::scope(|scope| -> Result<()> {
            let handles: Vec<_> = (0..this.opts.thread_num)
                .map(|id| scope.spawn(move || this.training_thread(id)))
                .collect();
            for handle in handles {
                handle.join().unwrap()?;
            }
            Ok(())
        })?;

        if self.opts.verbose {
            println!();
        }
        Ok(())
    }

    fn training_thread(&self, id: usize) -> Result<()> {
        let mut worker = Worker::new(self, id);
        for _ in 0..self.opts.epochs {
            let mut reader =
                ShardReader::open(&self.training_corpus, self.file_size, id, self.opts.thread_num)?;
            while let Some(doc) = reader.next_document(&self.vocab)? {
                worker.train_document(&doc);
            }
        }
        Ok(())
    }

    /// Writes the four weight files into `dir`.
    pub fn save(&self, dir: &Path, binary: bool) -> Result<()> {
        let v = &self.vocab;
        weights::save_rows(
            &dir.join(EMBEDDING_IN_FILE),
            &v.sidx2synset,
            &self.embedding_in_weight,
            binary,
        )?;
        weights::save_rows(
            &dir.join(EMBEDDING_OUT_FILE),
            &v.sidx2synset[..v.word_count()],
            &self.embedding_out_weight,
            binary,
        )?;
        weights::save_rows(
            &dir.join(SENSE_WEIGHT_FILE),
            &v.lidx2lemma,
            &self.sense_selection_out_weight,
            binary,
        )?;
        weights::save_bias(
            &dir.join(SENSE_BIAS_FILE),
            &v.lidx2lemma,
            &self.sense_selection_out_bias,
            binary,
        )?;
        Ok(())
    }

    /// Reloads previously saved weight files, matching rows by key.
    pub fn load_weights(&self, dir: &Path, binary: bool) -> Result<()> {
        let v = &self.vocab;
        weights::load_rows(
            &dir.join(EMBEDDING_IN_FILE),
            &v.synset_vocab,
            &self.embedding_in_weight,
            binary,
        )?;
        weights::load_rows(
            &dir.join(EMBEDDING_OUT_FILE),
            &v.synset_vocab,
            &self.embedding_out_weight,
            binary,
        )?;
        weights::load_rows(
            &dir.join(SENSE_WEIGHT_FILE),
            &v.lemma_vocab,
            &self.sense_selection_out_weight,
            binary,
        )?;
        weights::load_bias(
            &dir.join(SENSE_BIAS_FILE),
            &v.lemma_vocab,
            &self.sense_selection_out_bias,
            binary,
        )?;
        Ok(())
    }
}

/// Per-thread training context: RNG, sampling cursors, annealed
/// hyperparameters and scratch buffers, reused across every position.
struct Worker<'a> {
    model: &'a Model,
    rng: SmallRng,
    negative_pos: usize,
    /// Rotating cursor into each synset's dictionary-pair list.
    dict_pair_pos: HashMap<usize, usize>,

    learning_rate: real,
    temperature: real,
    beta_dict: real,
    beta_reward: real,

    document_vector: Vector,
    sentence_vector: Vector,
    context_vector: Vector,
    /// `[context | sentence | document]`, the sense-selection input.
    feature_vector: Vector,
    in_buf: Vector,
    out_buf: Vector,
    kept: Vec<bool>,
    candidates: Vec<usize>,

    words_since_report: u64,
}

impl<'a> Worker<'a> {
    fn new(model: &'a Model, id: usize) -> Worker<'a> {
        let dim = model.opts.embedding_layer_size;
        let mut rng = SmallRng::seed_from_u64(model.opts.seed.wrapping_add(id as u64));
        let negative_pos = if model.unigram_table.is_empty() {
            0
        } else {
            rng.gen_range(0..model.unigram_table.len())
        };
        Worker {
            model,
            rng,
            negative_pos,
            dict_pair_pos: HashMap::new(),
            learning_rate: model.opts.learning_rate,
            temperature: model.opts.temperature,
            beta_dict: model.opts.beta_dict,
            beta_reward: model.opts.beta_reward,
            document_vector: Vector::zeros(dim),
            sentence_vector: Vector::zeros(dim),
            context_vector: Vector::zeros(dim),
            feature_vector: Vector::zeros(dim * 3),
            in_buf: Vector::zeros(dim),
            out_buf: Vector::zeros(dim),
            kept: Vec::new(),
            candidates: Vec::new(),
            words_since_report: 0,
        }
    }

    fn train_document(&mut self, doc: &Document) {
        let model = self.model;
        let dim = model.opts.embedding_layer_size;

        // document vector: mean input embedding over every token
        self.document_vector.set_zero();
        let mut token_count = 0usize;
        for sentence in &doc.sentences {
            for &widx in sentence {
                hogwild::add_into(
                    self.document_vector.as_mut_slice(),
                    model.embedding_in_weight.row(widx),
                );
                token_count += 1;
            }
        }
        if token_count > 0 {
            self.document_vector /= token_count as real;
            self.feature_vector.as_mut_slice()[dim * 2..]
                .copy_from_slice(self.document_vector.as_slice());
            for sentence in &doc.sentences {
                self.train_sentence(sentence);
            }
        }
        self.finish_document(doc);
    }

    fn train_sentence(&mut self, sentence: &[usize]) {
        let model = self.model;
        let dim = model.opts.embedding_layer_size;
        let window = model.opts.window_size;

        self.sentence_vector.set_zero();
        for &widx in sentence {
            hogwild::add_into(
                self.sentence_vector.as_mut_slice(),
                model.embedding_in_weight.row(widx),
            );
        }
        self.sentence_vector /= sentence.len() as real;
        self.feature_vector.as_mut_slice()[dim..dim * 2]
            .copy_from_slice(self.sentence_vector.as_slice());

        // subsampling decisions, drawn once per position
        self.kept.clear();
        for &widx in sentence {
            let draw = self.rng.gen::<real>();
            self.kept.push(model.subsampling.keep(widx, draw));
        }

        for pos in 0..sentence.len() {
            if !self.kept[pos] {
                continue;
            }

            // skip-gram target: a kept token within a reduced window
            let reduced = window - self.rng.gen_range(0..window);
            self.candidates.clear();
            let mut found = 0;
            for p in (0..pos).rev() {
                if self.kept[p] {
                    self.candidates.push(p);
                    found += 1;
                    if found == reduced {
                        break;
                    }
                }
            }
            found = 0;
            for p in pos + 1..sentence.len() {
                if self.kept[p] {
                    self.candidates.push(p);
                    found += 1;
                    if found == reduced {
                        break;
                    }
                }
            }
            if self.candidates.is_empty() {
                continue;
            }
            let pick = self.rng.gen_range(0..self.candidates.len());
            let output_widx = sentence[self.candidates[pick]];

            // context vector: every token within the full window
            self.context_vector.set_zero();
            let lo = pos.saturating_sub(window);
            let hi = (pos + window).min(sentence.len() - 1);
            let mut rows = 0;
            for p in lo..=hi {
                if p == pos {
                    continue;
                }
                hogwild::add_into(
                    self.context_vector.as_mut_slice(),
                    model.embedding_in_weight.row(sentence[p]),
                );
                rows += 1;
            }
            self.context_vector /= rows as real;
            self.feature_vector.as_mut_slice()[..dim]
                .copy_from_slice(self.context_vector.as_slice());

            self.train_position(sentence[pos], output_widx);
        }
    }

    fn train_position(&mut self, input_widx: usize, output_widx: usize) {
        // positive updates to the target's output vector are buffered so
        // that every pair in this position sees the pre-update value
        self.out_buf.set_zero();
        self.train_senses(input_widx, output_widx);
        self.train_word(input_widx, output_widx);
        hogwild::axpy_dense(
            self.model.embedding_out_weight.row(output_widx),
            self.out_buf.as_slice(),
            1.0,
        );
    }

    /// Joint sense-embedding and sense-selection update for one position.
    fn train_senses(&mut self, input_widx: usize, output_widx: usize) {
        let model = self.model;
        let valid_pos = model.vocab.valid_parts_of_speech(input_widx);
        if valid_pos.is_empty() {
            return;
        }
        let pos = valid_pos[self.rng.gen_range(0..valid_pos.len())];
        let senses = model.vocab.senses_of_word(input_widx, pos);
        let sense_num = senses.len();

        let mut logits = Vector::zeros(sense_num);
        for (i, &lidx) in senses.iter().enumerate() {
            logits[i] = hogwild::dot_dense(
                model.sense_selection_out_weight.row(lidx),
                self.feature_vector.as_slice(),
            ) + model.sense_selection_out_bias.get(lidx);
        }
        let sense_prob = logits.softmax(self.temperature);
        let mut reward_logits = Vector::zeros(sense_num);

        let v_out = model.embedding_out_weight.row(output_widx);
        for (i, &lidx) in senses.iter().enumerate() {
            let sidx = model.vocab.synset_of_lemma(lidx);
            let v_in = model.embedding_in_weight.row(sidx);
            self.in_buf.set_zero();

            // positive pair against the skip-gram target
            let f = hogwild::dot(v_in, v_out);
            reward_logits[i] += f;
            let g = sigmoid(-f) * sense_prob[i] * self.learning_rate;
            hogwild::add_scaled_into(self.in_buf.as_mut_slice(), v_out, g);
            hogwild::add_scaled_into(self.out_buf.as_mut_slice(), v_in, g);

            // negative samples; dictionary pairs are never penalized
            let dict_pairs = model.vocab.dictionary_pairs(sidx);
            for _ in 0..model.opts.negative_sample {
                let sample = model.unigram_table.sample(&mut self.negative_pos);
                if sample == output_widx || dict_pairs.contains(&sample) {
                    continue;
                }
                let v_neg = model.embedding_out_weight.row(sample);
                let g = -sigmoid(hogwild::dot(v_in, v_neg)) * sense_prob[i] * self.learning_rate;
                hogwild::add_scaled_into(self.in_buf.as_mut_slice(), v_neg, g);
                hogwild::axpy(v_neg, v_in, g);
            }

            // dictionary-pair reward
            if !dict_pairs.is_empty() && model.opts.dict_sample > 0 {
                let cursor = self.dict_pair_pos.entry(sidx).or_insert(0);
                for _ in 0..model.opts.dict_sample {
                    let pair = dict_pairs[*cursor % dict_pairs.len()];
                    *cursor += 1;
                    let v_pair = model.embedding_out_weight.row(pair);
                    let f = hogwild::dot(v_in, v_pair);
                    reward_logits[i] += f * self.beta_reward;
                    let w = sigmoid(-f) * self.learning_rate * self.beta_dict / sense_num as real;
                    hogwild::add_scaled_into(self.in_buf.as_mut_slice(), v_pair, w);
                    hogwild::axpy(v_pair, v_in, w);
                }
            }

            hogwild::axpy_dense(v_in, self.in_buf.as_slice(), 1.0);
        }

        // sense-selection parameter update, skipped for stop-word targets
        if model.stop_words.contains(&output_widx) {
            return;
        }
        let reward_prob = reward_logits.softmax(1.0);
        for (i, &lidx) in senses.iter().enumerate() {
            let g = (reward_prob[i] - sense_prob[i]) * self.learning_rate;
            hogwild::axpy_dense(
                model.sense_selection_out_weight.row(lidx),
                self.feature_vector.as_slice(),
                g,
            );
            model.sense_selection_out_bias.add(lidx, g);
        }
    }

    /// Plain skip-gram update on the word's own input vector.
    fn train_word(&mut self, input_widx: usize, output_widx: usize) {
        let model = self.model;
        let wsidx = model.vocab.synset_of_lemma(model.vocab.word_lemma_of(input_widx));
        let v_in = model.embedding_in_weight.row(wsidx);
        let v_out = model.embedding_out_weight.row(output_widx);
        self.in_buf.set_zero();

        let g = sigmoid(-hogwild::dot(v_in, v_out)) * self.learning_rate;
        hogwild::add_scaled_into(self.in_buf.as_mut_slice(), v_out, g);
        hogwild::add_scaled_into(self.out_buf.as_mut_slice(), v_in, g);

        for _ in 0..model.opts.negative_sample {
            let sample = model.unigram_table.sample(&mut self.negative_pos);
            if sample == output_widx {
                continue;
            }
            let v_neg = model.embedding_out_weight.row(sample);
            let g = -sigmoid(hogwild::dot(v_in, v_neg)) * self.learning_rate;
            hogwild::add_scaled_into(self.in_buf.as_mut_slice(), v_neg, g);
            hogwild::axpy(v_neg, v_in, g);
        }

        hogwild::axpy_dense(v_in, self.in_buf.as_slice(), 1.0);
    }

    /// Advances the shared progress counter and anneals the per-thread
    /// hyperparameters: linear decay to a floor over the whole schedule.
    fn finish_document(&mut self, doc: &Document) {
        let model = self.model;
        let trained = model
            .trained_word_count
            .fetch_add(doc.words_read, Ordering::Relaxed)
            + doc.words_read;

        let denom = model.opts.epochs as f64 * model.vocab.total_word_count() as f64 + 1.0;
        let rate = (1.0 - trained as f64 / denom).max(0.0) as real;
        let o = &model.opts;
        self.learning_rate = (o.learning_rate * rate).max(o.min_learning_rate);
        self.temperature = (o.temperature * rate).max(o.min_temperature);
        self.beta_dict = (o.beta_dict * rate).max(o.min_beta_dict);
        self.beta_reward = (o.beta_reward * rate).max(o.min_beta_reward);

        self.words_since_report += doc.words_read;
        if o.verbose && self.words_since_report >= PROGRESS_INTERVAL {
            self.words_since_report = 0;
            let secs = model.start.elapsed().as_secs_f64();
            print!(
                "\rLearning rate: {:.6}  Progress: {:.2}%  Words/sec: {:.2}k  ",
                self.learning_rate,
                trained as f64 / denom * 100.0,
                trained as f64 / secs / 1000.0,
            );
            let _ = io::stdout().flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: &[real], b: &[real]) -> SharedMatrix {
        let m = SharedMatrix::zeros(2, a.len());
        for (cell, &v) in m.row(0).iter().zip(a) {
            cell.set(v);
        }
        for (cell, &v) in m.row(1).iter().zip(b) {
            cell.set(v);
        }
        m
    }

    #[test]
    fn positive_update_increases_dot_product() {
        let m = pair(&[0.6, 0.8, 0.0], &[0.0, 0.6, 0.8]);
        let before = hogwild::dot(m.row(0), m.row(1));

        let in_pre = m.snapshot().row(0).to_vec();
        let g = sigmoid(-before) * 0.05;
        hogwild::axpy(m.row(0), m.row(1), g);
        hogwild::axpy_dense(m.row(1), &in_pre, g);

        assert!(hogwild::dot(m.row(0), m.row(1)) > before);
    }

    #[test]
    fn negative_update_decreases_dot_product() {
        let m = pair(&[0.6, 0.8, 0.0], &[0.0, 0.6, 0.8]);
        let before = hogwild::dot(m.row(0), m.row(1));

        let in_pre = m.snapshot().row(0).to_vec();
        let g = -sigmoid(before) * 0.05;
        hogwild::axpy(m.row(0), m.row(1), g);
        hogwild::axpy_dense(m.row(1), &in_pre, g);

        assert!(hogwild::dot(m.row(0), m.row(1)) < before);
    }
}
