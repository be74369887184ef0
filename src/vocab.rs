//! The vocabulary: surface words, senses (lemmas) and synsets.
//!
//! Words and synsets share one index space: word `widx` also owns input
//! embedding row `widx`, and synsets created from the dictionary get the
//! rows above `word_vocab_size`. Every word has a "self" lemma
//! (`word|*|*`) used for plain word-level training.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::real;

/// Part of speech of a sense entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pos {
    Noun,
    Verb,
    Adjective,
    Adverb,
}

impl Pos {
    pub const ALL: [Pos; 4] = [Pos::Noun, Pos::Verb, Pos::Adjective, Pos::Adverb];

    pub fn from_tag(tag: &str) -> Option<Pos> {
        match tag {
            "n" => Some(Pos::Noun),
            "v" => Some(Pos::Verb),
            "a" => Some(Pos::Adjective),
            "r" => Some(Pos::Adverb),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Pos::Noun => "n",
            Pos::Verb => "v",
            Pos::Adjective => "a",
            Pos::Adverb => "r",
        }
    }
}

/// Sense bookkeeping for one surface word.
#[derive(Clone, Debug, Default)]
pub struct SynsetData {
    /// Parts of speech this word has at least one dictionary sense for.
    pub valid_pos: Vec<Pos>,
    sense_lemmas: [Vec<usize>; 4],
    /// Lemma id of the word's own `word|*|*` entry.
    pub word_lemma: usize,
}

impl SynsetData {
    pub fn senses(&self, pos: Pos) -> &[usize] {
        &self.sense_lemmas[pos as usize]
    }
}

#[derive(Debug, Default)]
pub struct Vocab {
    pub lemma_vocab: HashMap<String, usize>,
    /// Words and synset names, sharing one index space.
    pub synset_vocab: HashMap<String, usize>,

    pub word_vocab_size: usize,
    pub synset_vocab_size: usize,
    pub lemma_vocab_size: usize,

    /// Corpus frequency per `widx`; zero for dictionary-only words.
    pub word_freq: Vec<u64>,
    /// Sense prior per `lidx`.
    pub lemma_prob: Vec<real>,

    pub lidx2sidx: Vec<usize>,
    pub sidx2synset: Vec<String>,
    pub lidx2lemma: Vec<String>,

    /// Per-word sense groupings, indexed by `widx`.
    pub word_senses: Vec<SynsetData>,
    /// Dictionary pairs per synset id: word ids considered confirmatory.
    pub dict_pairs: HashMap<usize, Vec<usize>>,

    pub total_words: u64,
}

const NO_PAIRS: &[usize] = &[];

impl Vocab {
    pub fn word_count(&self) -> usize {
        self.word_vocab_size
    }

    pub fn synset_count(&self) -> usize {
        self.synset_vocab_size
    }

    pub fn lemma_count(&self) -> usize {
        self.lemma_vocab_size
    }

    pub fn total_word_count(&self) -> u64 {
        self.total_words
    }

    pub fn word_frequency(&self, widx: usize) -> u64 {
        self.word_freq[widx]
    }

    /// Looks up a surface token (or synset name) in the shared index space.
    pub fn lookup(&self, token: &str) -> Option<usize> {
        self.synset_vocab.get(token).copied()
    }

    pub fn senses_of_word(&self, widx: usize, pos: Pos) -> &[usize] {
        self.word_senses[widx].senses(pos)
    }

    pub fn valid_parts_of_speech(&self, widx: usize) -> &[Pos] {
        &self.word_senses[widx].valid_pos
    }

    pub fn synset_of_lemma(&self, lidx: usize) -> usize {
        self.lidx2sidx[lidx]
    }

    pub fn word_lemma_of(&self, widx: usize) -> usize {
        self.word_senses[widx].word_lemma
    }

    pub fn dictionary_pairs(&self, sidx: usize) -> &[usize] {
        self.dict_pairs.get(&sidx).map_or(NO_PAIRS, Vec::as_slice)
    }

    /// Adds a surface word, giving it an input-embedding row and its
    /// `word|*|*` lemma. Words must be added before any senses.
    pub fn add_word(&mut self, word: &str, freq: u64) -> usize {
        let widx = self.sidx2synset.len();
        let lidx = self.lidx2lemma.len();

        self.synset_vocab.insert(word.to_string(), widx);
        self.sidx2synset.push(word.to_string());
        self.word_freq.push(freq);

        let lemma = format!("{word}|*|*");
        self.lemma_vocab.insert(lemma.clone(), lidx);
        self.lidx2lemma.push(lemma);
        self.lemma_prob.push(1.0);
        self.lidx2sidx.push(widx);

        self.word_senses.push(SynsetData {
            word_lemma: lidx,
            ..SynsetData::default()
        });

        self.word_vocab_size += 1;
        self.synset_vocab_size = self.sidx2synset.len();
        self.lemma_vocab_size = self.lidx2lemma.len();
        self.total_words += freq;
        widx
    }

    /// Adds a sense of an existing word. The synset gets an embedding row
    /// (and its dictionary-pair list) the first time it is seen; further
    /// lemmas of the same synset share that row.
    pub fn add_sense(
        &mut self,
        widx: usize,
        pos: Pos,
        synset: &str,
        prob: real,
        dict_pair: &[usize],
    ) -> usize {
        let sidx = match self.synset_vocab.get(synset) {
            Some(&sidx) => sidx,
            None => {
                let sidx = self.sidx2synset.len();
                self.synset_vocab.insert(synset.to_string(), sidx);
                self.sidx2synset.push(synset.to_string());
                if !dict_pair.is_empty() {
                    self.dict_pairs.insert(sidx, dict_pair.to_vec());
                }
                sidx
            }
        };

        let word = &self.sidx2synset[widx];
        let lemma = format!("{word}|{}|{synset}", pos.tag());
        let lidx = self.lidx2lemma.len();
        self.lemma_vocab.insert(lemma.clone(), lidx);
        self.lidx2lemma.push(lemma);
        self.lemma_prob.push(prob);
        self.lidx2sidx.push(sidx);

        let senses = &mut self.word_senses[widx];
        if !senses.valid_pos.contains(&pos) {
            senses.valid_pos.push(pos);
        }
        senses.sense_lemmas[pos as usize].push(lidx);

        self.synset_vocab_size = self.sidx2synset.len();
        self.lemma_vocab_size = self.lidx2lemma.len();
        lidx
    }

    /// Builds the vocabulary from a corpus scan plus a synset data file
    /// (`word|pos|synset prob dict_word1,dict_word2,...` per line).
    pub fn build(
        training_corpus: &Path,
        synset_data_file: &Path,
        min_count: u64,
        max_dict_pair: usize,
    ) -> Result<Vocab> {
        let mut vocab = Vocab::default();

        // corpus frequency scan
        let fin = BufReader::new(
            File::open(training_corpus).context("cannot open training data file")?,
        );
        let mut word_stats: HashMap<String, u64> = HashMap::new();
        for line in fin.lines() {
            let line = line.context("error reading training data file")?;
            let line = line.trim();
            if line.is_empty() || line == crate::corpus::DOC_START || line == crate::corpus::DOC_END
            {
                continue;
            }
            for token in line.split_whitespace() {
                *word_stats.entry(token.to_string()).or_insert(0) += 1;
            }
        }

        let mut sorted: Vec<(String, u64)> = word_stats.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (word, freq) in sorted {
            if freq < min_count {
                break;
            }
            vocab.add_word(&word, freq);
        }

        // dictionary words missing from the corpus get zero-frequency rows
        let fin = BufReader::new(
            File::open(synset_data_file).context("cannot open synset data file")?,
        );
        let mut lines = Vec::new();
        for (line_num, line) in fin.lines().enumerate() {
            let line = line.context("error reading synset data file")?;
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            let entry = SynsetEntry::parse(&line)
                .with_context(|| format!("synset data file syntax error on line {}", line_num + 1))?;
            if vocab.lookup(&entry.word).is_none() {
                vocab.add_word(&entry.word, 0);
            }
            lines.push(entry);
        }

        // sense entries
        for entry in lines {
            let widx = vocab.synset_vocab[&entry.word];
            let mut pairs = Vec::new();
            if !vocab.synset_vocab.contains_key(&entry.synset) {
                for word in entry.dict_words.split(',') {
                    let Some(&pair) = vocab.synset_vocab.get(word) else {
                        continue;
                    };
                    pairs.push(pair);
                    if pairs.len() >= max_dict_pair {
                        break;
                    }
                }
            }
            vocab.add_sense(widx, entry.pos, &entry.synset, entry.prob, &pairs);
        }

        Ok(vocab)
    }

    /// Writes the whole vocabulary as one text file:
    /// `lemma lidx prob widx freq sidx pairs` per line.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut fout =
            BufWriter::new(File::create(path).context("cannot create vocabulary file")?);
        writeln!(
            fout,
            "{} {} {}",
            self.lemma_vocab_size, self.word_vocab_size, self.synset_vocab_size
        )
        .context("error writing vocabulary file")?;

        for (lidx, lemma) in self.lidx2lemma.iter().enumerate() {
            let word = lemma.split('|').next().unwrap_or(lemma);
            let widx = self.synset_vocab[word];
            let sidx = self.lidx2sidx[lidx];
            let pairs = match self.dict_pairs.get(&sidx) {
                None => "-1".to_string(),
                Some(pairs) => pairs
                    .iter()
                    .map(usize::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            };
            writeln!(
                fout,
                "{} {} {} {} {} {} {}",
                lemma, lidx, self.lemma_prob[lidx], widx, self.word_freq[widx], sidx, pairs
            )
            .context("error writing vocabulary file")?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Vocab> {
        let fin = BufReader::new(File::open(path).context("cannot open vocabulary file")?);
        let mut lines = fin.lines();

        let header = match lines.next() {
            Some(line) => line.context("error reading vocabulary file")?,
            None => bail!("vocabulary file is empty"),
        };
        let sizes: Vec<usize> = header
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .context("malformed vocabulary file header")?;
        let [lemma_vocab_size, word_vocab_size, synset_vocab_size] = sizes[..] else {
            bail!("malformed vocabulary file header");
        };

        let mut vocab = Vocab {
            word_vocab_size,
            synset_vocab_size,
            lemma_vocab_size,
            word_freq: vec![0; word_vocab_size],
            lemma_prob: vec![0.0; lemma_vocab_size],
            lidx2sidx: vec![0; lemma_vocab_size],
            sidx2synset: vec![String::new(); synset_vocab_size],
            lidx2lemma: vec![String::new(); lemma_vocab_size],
            word_senses: vec![SynsetData::default(); word_vocab_size],
            ..Vocab::default()
        };

        for (line_num, line) in lines.enumerate() {
            let line = line.context("error reading vocabulary file")?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let err = || format!("vocabulary file syntax error on line {}", line_num + 2);
            if fields.len() != 7 {
                bail!(err());
            }
            let lemma = fields[0];
            let lidx: usize = fields[1].parse().with_context(err)?;
            let prob: real = fields[2].parse().with_context(err)?;
            let widx: usize = fields[3].parse().with_context(err)?;
            let freq: u64 = fields[4].parse().with_context(err)?;
            let sidx: usize = fields[5].parse().with_context(err)?;

            let parts: Vec<&str> = lemma.split('|').collect();
            let [word, pos_tag, synset] = parts[..] else {
                bail!(err());
            };

            vocab.lemma_vocab.insert(lemma.to_string(), lidx);
            vocab.lidx2lemma[lidx] = lemma.to_string();
            vocab.lemma_prob[lidx] = prob;
            vocab.lidx2sidx[lidx] = sidx;

            if !vocab.synset_vocab.contains_key(word) {
                vocab.synset_vocab.insert(word.to_string(), widx);
                vocab.sidx2synset[widx] = word.to_string();
                vocab.word_freq[widx] = freq;
                vocab.total_words += freq;
            }

            if pos_tag == "*" {
                vocab.word_senses[widx].word_lemma = lidx;
                continue;
            }

            let Some(pos) = Pos::from_tag(pos_tag) else {
                bail!(err());
            };
            if !vocab.synset_vocab.contains_key(synset) {
                vocab.synset_vocab.insert(synset.to_string(), sidx);
                vocab.sidx2synset[sidx] = synset.to_string();
                if fields[6] != "-1" {
                    let pairs: Vec<usize> = fields[6]
                        .split(',')
                        .map(str::parse)
                        .collect::<Result<_, _>>()
                        .with_context(err)?;
                    vocab.dict_pairs.insert(sidx, pairs);
                }
            }

            let senses = &mut vocab.word_senses[widx];
            if !senses.valid_pos.contains(&pos) {
                senses.valid_pos.push(pos);
            }
            senses.sense_lemmas[pos as usize].push(lidx);
        }

        Ok(vocab)
    }
}

struct SynsetEntry {
    word: String,
    pos: Pos,
    synset: String,
    prob: real,
    dict_words: String,
}

impl SynsetEntry {
    fn parse(line: &str) -> Result<SynsetEntry> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [lemma, prob, dict_words] = fields[..] else {
            bail!("expected `word|pos|synset prob dict_words`");
        };
        let parts: Vec<&str> = lemma.split('|').collect();
        let [word, pos_tag, synset] = parts[..] else {
            bail!("malformed lemma field {lemma:?}");
        };
        let Some(pos) = Pos::from_tag(pos_tag) else {
            bail!("unknown part-of-speech tag {pos_tag:?}");
        };
        Ok(SynsetEntry {
            word: word.to_string(),
            pos,
            synset: synset.to_string(),
            prob: prob.parse().context("bad probability")?,
            dict_words: dict_words.to_string(),
        })
    }
}
