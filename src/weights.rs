//! Weight file persistence.
//!
//! Every weight file starts with a `<rowCount> <colCount>` header line,
//! followed by one row per line: a key, a space, then the row payload
//! (space-separated decimal floats in text mode, raw little-endian
//! IEEE-754 bytes in binary mode). Loading maps keys through a lookup table
//! and silently skips rows whose key is unknown, so weights can be reloaded
//! into a vocabulary built from a different corpus.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{anyhow, ensure, Context, Result};

use crate::hogwild::{Real, SharedMatrix, SharedVector};
use crate::real;

pub fn save_rows(path: &Path, keys: &[String], matrix: &SharedMatrix, binary: bool) -> Result<()> {
    let mut fout = BufWriter::new(File::create(path).context("cannot create weight file")?);
    writeln!(fout, "{} {}", matrix.rows(), matrix.cols()).context("error writing weight file")?;
    for (i, key) in keys.iter().enumerate() {
        write!(fout, "{key} ").context("error writing weight file")?;
        let row: Vec<real> = matrix.row(i).iter().map(Real::get).collect();
        write_payload(&mut fout, &row, binary)?;
    }
    Ok(())
}

pub fn load_rows(
    path: &Path,
    lookup: &HashMap<String, usize>,
    matrix: &SharedMatrix,
    binary: bool,
) -> Result<()> {
    let mut fin = BufReader::new(File::open(path).context("cannot open weight file")?);
    let (rows, cols) = read_header(&mut fin)?;
    ensure!(
        cols == matrix.cols(),
        "weight file has {} columns, expected {}",
        cols,
        matrix.cols()
    );

    let mut row = vec![0.0; cols];
    for _ in 0..rows {
        let Some(key) = read_key(&mut fin)? else {
            break;
        };
        read_payload(&mut fin, &mut row, binary)?;
        if let Some(&target) = lookup.get(&key) {
            ensure!(
                target < matrix.rows(),
                "weight file row {key:?} does not fit the target matrix"
            );
            for (cell, &value) in matrix.row(target).iter().zip(row.iter()) {
                cell.set(value);
            }
        }
    }
    Ok(())
}

pub fn save_bias(path: &Path, keys: &[String], bias: &SharedVector, binary: bool) -> Result<()> {
    let mut fout = BufWriter::new(File::create(path).context("cannot create weight file")?);
    writeln!(fout, "{} {}", bias.len(), 1).context("error writing weight file")?;
    for (i, key) in keys.iter().enumerate() {
        write!(fout, "{key} ").context("error writing weight file")?;
        write_payload(&mut fout, &[bias.get(i)], binary)?;
    }
    Ok(())
}

pub fn load_bias(
    path: &Path,
    lookup: &HashMap<String, usize>,
    bias: &SharedVector,
    binary: bool,
) -> Result<()> {
    let mut fin = BufReader::new(File::open(path).context("cannot open weight file")?);
    let (rows, cols) = read_header(&mut fin)?;
    ensure!(cols == 1, "weight file has {} columns, expected 1", cols);

    let mut value = [0.0];
    for _ in 0..rows {
        let Some(key) = read_key(&mut fin)? else {
            break;
        };
        read_payload(&mut fin, &mut value, binary)?;
        if let Some(&target) = lookup.get(&key) {
            ensure!(
                target < bias.len(),
                "weight file row {key:?} does not fit the target vector"
            );
            bias.set(target, value[0]);
        }
    }
    Ok(())
}

fn write_payload(fout: &mut BufWriter<File>, row: &[real], binary: bool) -> Result<()> {
    if binary {
        fout.write_all(bytemuck::cast_slice::<real, u8>(row))
            .context("error writing weight file")?;
    } else {
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                write!(fout, " ").context("error writing weight file")?;
            }
            write!(fout, "{value}").context("error writing weight file")?;
        }
    }
    writeln!(fout).context("error writing weight file")?;
    Ok(())
}

fn read_header(fin: &mut BufReader<File>) -> Result<(usize, usize)> {
    let mut line = String::new();
    fin.read_line(&mut line).context("error reading weight file")?;
    let mut fields = line.split_whitespace();
    let rows = fields
        .next()
        .ok_or_else(|| anyhow!("malformed weight file header"))?
        .parse()
        .context("malformed weight file header")?;
    let cols = fields
        .next()
        .ok_or_else(|| anyhow!("malformed weight file header"))?
        .parse()
        .context("malformed weight file header")?;
    Ok((rows, cols))
}

fn read_key(fin: &mut BufReader<File>) -> Result<Option<String>> {
    let mut key = Vec::new();
    let count = fin
        .read_until(b' ', &mut key)
        .context("error reading weight file")?;
    if count == 0 {
        return Ok(None);
    }
    if key.last() == Some(&b' ') {
        key.pop();
    }
    key.retain(|c| *c != b'\n');
    Ok(Some(
        String::from_utf8(key).context("invalid key in weight file")?,
    ))
}

fn read_payload(fin: &mut BufReader<File>, row: &mut [real], binary: bool) -> Result<()> {
    if binary {
        fin.read_exact(bytemuck::cast_slice_mut::<real, u8>(row))
            .context("error reading weight file")?;
        let mut newline = [0u8; 1];
        fin.read_exact(&mut newline)
            .context("error reading weight file")?;
    } else {
        let mut line = String::new();
        fin.read_line(&mut line).context("error reading weight file")?;
        let mut fields = line.split_whitespace();
        for value in row.iter_mut() {
            *value = fields
                .next()
                .ok_or_else(|| anyhow!("truncated weight row"))?
                .parse()
                .context("invalid float in weight file")?;
        }
    }
    Ok(())
}
