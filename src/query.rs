//! Interactive nearest-neighbour queries over trained embeddings.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use ordered_float::OrderedFloat;

use crate::hogwild::SharedMatrix;
use crate::math::{normalize, Matrix};
use crate::real;
use crate::vocab::Vocab;

/// A read-only, row-normalized copy of an embedding matrix, so that dot
/// products are cosine similarities.
pub struct NormalizedEmbeddings {
    m: Matrix,
}

impl NormalizedEmbeddings {
    pub fn new(weights: &SharedMatrix) -> NormalizedEmbeddings {
        let mut m = weights.snapshot();
        for i in 0..m.rows() {
            normalize(m.row_mut(i));
        }
        NormalizedEmbeddings { m }
    }

    /// The `n` most similar rows to `row`, best first, excluding `row`
    /// itself.
    pub fn nearest(&self, row: usize, n: usize) -> Vec<(usize, real)> {
        self.nearest_among(row, self.m.rows(), n)
    }

    /// Like `nearest`, but only rows below `candidates` compete. Used to
    /// restrict a query to the word part of the shared index space.
    pub fn nearest_among(&self, row: usize, candidates: usize, n: usize) -> Vec<(usize, real)> {
        let query = self.m.row(row);
        let mut scored: Vec<(usize, real)> = (0..candidates)
            .filter(|&i| i != row)
            .map(|i| (i, crate::math::dot(query, self.m.row(i))))
            .collect();
        scored.sort_by_key(|&(_, sim)| std::cmp::Reverse(OrderedFloat(sim)));
        scored.truncate(n);
        scored
    }
}

const WORD_NEIGHBOURS: usize = 40;
const SYNSET_NEIGHBOURS: usize = 20;

/// Prompts for words and prints the nearest words by input-embedding
/// cosine similarity.
pub fn word_repl(vocab: &Vocab, embeddings: &NormalizedEmbeddings) -> Result<()> {
    let stdin = io::stdin();
    loop {
        print!("Enter word (EXIT to break): ");
        io::stdout().flush().context("error writing to stdout")?;
        let mut line = String::new();
        if stdin
            .lock()
            .read_line(&mut line)
            .context("error reading stdin")?
            == 0
        {
            return Ok(());
        }
        let word = line.trim();
        if word == "EXIT" {
            return Ok(());
        }
        let Some(widx) = vocab.lookup(word).filter(|&w| w < vocab.word_count()) else {
            println!("Out of dictionary word!");
            continue;
        };

        println!("\n{:>50}{:>20}", "Word", "Similarity");
        println!("{}", "-".repeat(72));
        for (i, sim) in embeddings.nearest_among(widx, vocab.word_count(), WORD_NEIGHBOURS) {
            println!("{:>50}{:>20.6}", vocab.sidx2synset[i], sim);
        }
        println!();
    }
}

/// Prompts for words and prints, for each sense of the word, the nearest
/// words and synsets by input-embedding cosine similarity.
pub fn synset_repl(vocab: &Vocab, embeddings: &NormalizedEmbeddings) -> Result<()> {
    let stdin = io::stdin();
    loop {
        print!("Enter word (EXIT to break): ");
        io::stdout().flush().context("error writing to stdout")?;
        let mut line = String::new();
        if stdin
            .lock()
            .read_line(&mut line)
            .context("error reading stdin")?
            == 0
        {
            return Ok(());
        }
        let word = line.trim();
        if word == "EXIT" {
            return Ok(());
        }
        let Some(widx) = vocab.lookup(word).filter(|&w| w < vocab.word_count()) else {
            println!("Out of dictionary word!");
            continue;
        };

        for pos in crate::vocab::Pos::ALL {
            for &lidx in vocab.senses_of_word(widx, pos) {
                let sidx = vocab.synset_of_lemma(lidx);
                println!("\n{}", vocab.lidx2lemma[lidx]);
                println!("{:>50}{:>20}", "Synset", "Similarity");
                println!("{}", "-".repeat(72));
                for (i, sim) in embeddings.nearest(sidx, SYNSET_NEIGHBOURS) {
                    println!("{:>50}{:>20.6}", vocab.sidx2synset[i], sim);
                }
            }
        }
        println!();
    }
}
