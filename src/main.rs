//! Command-line driver: vocabulary construction, training and the
//! nearest-neighbour query shells, all working out of one model directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use sensevec::hogwild::SharedMatrix;
use sensevec::model::{Model, TrainingOptions, EMBEDDING_IN_FILE};
use sensevec::query::{self, NormalizedEmbeddings};
use sensevec::real;
use sensevec::vocab::Vocab;
use sensevec::weights;

const VOCAB_FILE: &str = "vocab.txt";

#[derive(Parser)]
#[command(name = "sensevec", about = "Sense-aware word and synset embedding trainer")]
struct Cli {
    /// Directory holding the vocabulary and weight files.
    #[arg(long, default_value = ".")]
    model_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the vocabulary from a corpus scan and a synset data file.
    BuildVocab {
        #[arg(long)]
        training_corpus: PathBuf,
        /// `word|pos|synset prob dict_word1,dict_word2,...` per line.
        #[arg(long)]
        synset_data_file: PathBuf,
        /// Discard words seen fewer times than this.
        #[arg(long, default_value_t = 5)]
        min_count: u64,
        /// Keep at most this many dictionary pairs per synset.
        #[arg(long, default_value_t = 10)]
        max_dict_pair: usize,
    },
    /// Train embeddings against a previously built vocabulary.
    Training(TrainingArgs),
    /// Interactively query the nearest words to a word.
    WordNearestNeighbour(QueryArgs),
    /// Interactively query the nearest synsets to each sense of a word.
    SynsetNearestNeighbour(QueryArgs),
}

#[derive(Args)]
struct TrainingArgs {
    #[arg(long)]
    training_corpus: PathBuf,
    /// Target words excluded from sense-selection supervision.
    #[arg(long)]
    stop_words_file: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    epochs: u32,
    #[arg(long, default_value_t = 300)]
    embedding_layer_size: usize,
    #[arg(long, default_value_t = 5)]
    window_size: usize,
    #[arg(long, default_value_t = 5)]
    negative_sample: usize,
    #[arg(long, default_value_t = 3)]
    dict_sample: usize,
    #[arg(long, default_value_t = 1)]
    thread_num: usize,
    #[arg(long, default_value_t = 1e-4)]
    sub_sampling_factor: f64,
    #[arg(long, default_value_t = 0.025)]
    learning_rate: real,
    #[arg(long, default_value_t = 1e-4)]
    min_learning_rate: real,
    #[arg(long, default_value_t = 1.0)]
    temperature: real,
    #[arg(long, default_value_t = 0.01)]
    min_temperature: real,
    #[arg(long, default_value_t = 0.8)]
    beta_dict: real,
    #[arg(long, default_value_t = 0.35)]
    min_beta_dict: real,
    #[arg(long, default_value_t = 0.8)]
    beta_reward: real,
    #[arg(long, default_value_t = 0.35)]
    min_beta_reward: real,
    #[arg(long, default_value_t = 100_000_000)]
    unigram_table_size: usize,
    #[arg(long, default_value_t = 495)]
    seed: u64,
    /// Write weight payloads as raw binary floats.
    #[arg(long)]
    binary: bool,
    /// Print progress while training.
    #[arg(long)]
    verbose: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Weight files were written with `--binary`.
    #[arg(long)]
    binary: bool,
    #[arg(long, default_value_t = 300)]
    embedding_layer_size: usize,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::BuildVocab {
            training_corpus,
            synset_data_file,
            min_count,
            max_dict_pair,
        } => {
            let vocab = Vocab::build(&training_corpus, &synset_data_file, min_count, max_dict_pair)?;
            fs::create_dir_all(&cli.model_dir).context("cannot create model directory")?;
            vocab.save(&cli.model_dir.join(VOCAB_FILE))
        }
        Command::Training(args) => training(&cli.model_dir, args),
        Command::WordNearestNeighbour(args) => {
            let (vocab, embeddings) = load_embeddings(&cli.model_dir, &args)?;
            query::word_repl(&vocab, &embeddings)
        }
        Command::SynsetNearestNeighbour(args) => {
            let (vocab, embeddings) = load_embeddings(&cli.model_dir, &args)?;
            query::synset_repl(&vocab, &embeddings)
        }
    }
}

fn training(model_dir: &Path, args: TrainingArgs) -> Result<()> {
    let vocab = Vocab::load(&model_dir.join(VOCAB_FILE))?;
    let opts = TrainingOptions {
        epochs: args.epochs,
        embedding_layer_size: args.embedding_layer_size,
        window_size: args.window_size,
        negative_sample: args.negative_sample,
        dict_sample: args.dict_sample,
        thread_num: args.thread_num,
        sub_sampling_factor: args.sub_sampling_factor,
        learning_rate: args.learning_rate,
        min_learning_rate: args.min_learning_rate,
        temperature: args.temperature,
        min_temperature: args.min_temperature,
        beta_dict: args.beta_dict,
        min_beta_dict: args.min_beta_dict,
        beta_reward: args.beta_reward,
        min_beta_reward: args.min_beta_reward,
        unigram_table_size: args.unigram_table_size,
        seed: args.seed,
        verbose: args.verbose,
    };

    let mut model = Model::new(opts, vocab, &args.training_corpus);
    model.initialize()?;
    if let Some(path) = &args.stop_words_file {
        model.load_stop_words(path)?;
    }
    model.train()?;
    model.save(model_dir, args.binary)
}

fn load_embeddings(model_dir: &Path, args: &QueryArgs) -> Result<(Vocab, NormalizedEmbeddings)> {
    let vocab = Vocab::load(&model_dir.join(VOCAB_FILE))?;
    let matrix = SharedMatrix::zeros(vocab.synset_count(), args.embedding_layer_size);
    weights::load_rows(
        &model_dir.join(EMBEDDING_IN_FILE),
        &vocab.synset_vocab,
        &matrix,
        args.binary,
    )?;
    Ok((vocab, NormalizedEmbeddings::new(&matrix)))
}
