//! Streaming of `<doc>`-delimited corpus shards.
//!
//! Thread `i` of `N` reads the byte range `[size*i/N, size*(i+1)/N)`. A
//! reader that lands mid-document discards input up to the next `<doc>`
//! marker; a document that straddles the end of the range is finished by
//! the thread that started it. Documents are therefore processed exactly
//! once per epoch without any cross-thread coordination.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};

use crate::vocab::Vocab;

pub const DOC_START: &str = "<doc>";
pub const DOC_END: &str = "</doc>";

/// Sentences with fewer surviving tokens carry too little context to train on.
const MIN_SENTENCE_LEN: usize = 5;

/// One document: the kept sentences as vocabulary ids, plus the raw
/// in-vocabulary token count (which drives progress and annealing even when
/// short sentences are dropped).
pub struct Document {
    pub sentences: Vec<Vec<usize>>,
    pub words_read: u64,
}

pub struct ShardReader {
    reader: BufReader<File>,
    /// Current byte position, tracked by counting line bytes so the hot
    /// loop never re-seeks.
    pos: u64,
    end: u64,
    line: String,
}

impl ShardReader {
    /// Opens shard `id` of `num_shards`, seeking to its byte range and
    /// discarding the partial line the seek lands in.
    pub fn open(path: &Path, file_size: u64, id: usize, num_shards: usize) -> Result<ShardReader> {
        let start = file_size / num_shards as u64 * id as u64;
        let end = file_size / num_shards as u64 * (id as u64 + 1);
        let file = File::open(path).context("cannot open training data file")?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(start))
            .context("error seeking within training data file")?;

        let mut shard = ShardReader {
            reader,
            pos: start,
            end,
            line: String::new(),
        };
        if start > 0 {
            shard.read_line()?;
        }
        Ok(shard)
    }

    /// Reads the next document, or `None` once the shard is exhausted. A
    /// document already begun when the shard end is passed is completed.
    pub fn next_document(&mut self, vocab: &Vocab) -> Result<Option<Document>> {
        // scan to the next document boundary
        loop {
            if self.pos > self.end {
                return Ok(None);
            }
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line == DOC_START => break,
                Some(_) => {}
            }
        }

        let mut sentences = Vec::new();
        let mut words_read = 0;
        loop {
            match self.read_line()? {
                None => break,
                Some(line) => {
                    if line == DOC_END {
                        break;
                    }
                    if line.is_empty() || line == DOC_START {
                        continue;
                    }
                    let mut sentence = Vec::new();
                    for token in line.split_whitespace() {
                        let Some(widx) = vocab.lookup(token) else {
                            continue;
                        };
                        if widx >= vocab.word_count() || vocab.word_frequency(widx) == 0 {
                            continue;
                        }
                        sentence.push(widx);
                    }
                    words_read += sentence.len() as u64;
                    if sentence.len() >= MIN_SENTENCE_LEN {
                        sentences.push(sentence);
                    }
                }
            }
        }
        Ok(Some(Document {
            sentences,
            words_read,
        }))
    }

    fn read_line(&mut self) -> Result<Option<&str>> {
        self.line.clear();
        let n = self
            .reader
            .read_line(&mut self.line)
            .context("error reading training data file")?;
        if n == 0 {
            return Ok(None);
        }
        self.pos += n as u64;
        Ok(Some(self.line.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    fn test_vocab() -> Vocab {
        let mut vocab = Vocab::default();
        for word in ["a", "b", "c", "d", "e", "f"] {
            vocab.add_word(word, 10);
        }
        vocab.add_word("ghost", 0); // zero-frequency: dropped from sentences
        vocab
    }

    fn write_corpus(dir: &TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("corpus.txt");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn parses_documents_and_filters_sentences() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_corpus(
            &dir,
            "<doc>\n\
             a b c d e\n\
             \n\
             a b\n\
             a xyz b ghost c d e f\n\
             </doc>\n\
             <doc>\n\
             f e d c b a\n\
             </doc>\n",
        );
        let vocab = test_vocab();
        let size = fs::metadata(&path).unwrap().len();
        let mut reader = ShardReader::open(&path, size, 0, 1).unwrap();

        let doc = reader.next_document(&vocab).unwrap().unwrap();
        // "a b" is too short to keep; "xyz" and "ghost" are dropped
        assert_eq!(doc.sentences.len(), 2);
        assert_eq!(doc.sentences[0].len(), 5);
        assert_eq!(doc.sentences[1].len(), 6);
        assert_eq!(doc.words_read, 13);

        let doc = reader.next_document(&vocab).unwrap().unwrap();
        assert_eq!(doc.sentences.len(), 1);

        assert!(reader.next_document(&vocab).unwrap().is_none());
    }

    #[test]
    fn shards_cover_every_document_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut text = String::new();
        for i in 0..8 {
            let w = ["a", "b", "c", "d", "e", "f"][i % 6];
            text.push_str(&format!("<doc>\n{w} {w} {w} {w} {w}\n</doc>\n"));
        }
        let path = write_corpus(&dir, &text);
        let vocab = test_vocab();
        let size = fs::metadata(&path).unwrap().len();

        for num_shards in [1, 2, 3] {
            let mut seen = Vec::new();
            for id in 0..num_shards {
                let mut reader = ShardReader::open(&path, size, id, num_shards).unwrap();
                while let Some(doc) = reader.next_document(&vocab).unwrap() {
                    seen.push(doc.sentences[0][0]);
                }
            }
            seen.sort_unstable();
            let mut expected: Vec<usize> = (0..8).map(|i| i % 6).collect();
            expected.sort_unstable();
            assert_eq!(seen, expected, "{num_shards} shards");
        }
    }
}
