//! Lock-free shared weight storage.
//!
//! Weight matrices are mutated in place by every worker thread with no
//! synchronization. Rows never move or resize after allocation, so plain
//! index-based slice access is safe; the individual cells are `f32` bits in
//! relaxed atomics, which makes the races data-race-free without changing
//! the performance profile of unsynchronized SGD.

use std::sync::atomic::{AtomicU32, Ordering};

use aligned_box::AlignedBox;
use rand::Rng;

use crate::math::Matrix;
use crate::real;

/// An `f32` cell that any thread may read or write at any time.
#[derive(Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

impl Real {
    pub fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn add(&self, x: real) {
        let a = self.get();
        self.set(a + x);
    }
}

const WEIGHT_ALIGNMENT: usize = 128;

/// A row-major weight matrix shared across worker threads.
pub struct SharedMatrix {
    data: AlignedBox<[Real]>,
    rows: usize,
    cols: usize,
}

impl SharedMatrix {
    pub fn zeros(rows: usize, cols: usize) -> SharedMatrix {
        SharedMatrix {
            data: AlignedBox::slice_from_default(WEIGHT_ALIGNMENT, rows * cols)
                .expect("memory allocation failed"),
            rows,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[Real] {
        &self.data[i * self.cols..][..self.cols]
    }

    pub fn set_random_uniform(&self, rng: &mut impl Rng, min: real, max: real) {
        for cell in self.data.iter() {
            cell.set(rng.gen_range(min..max));
        }
    }

    /// Uniform fill over `±sqrt(6 / (rows + cols))`.
    pub fn set_glorot_uniform(&self, rng: &mut impl Rng) {
        let bound = (6.0 / (self.rows + self.cols) as real).sqrt();
        self.set_random_uniform(rng, -bound, bound);
    }

    /// A plain `f32` copy for readers that run after training (queries,
    /// serialization, tests).
    pub fn snapshot(&self) -> Matrix {
        let mut m = Matrix::zeros(self.rows, self.cols);
        for i in 0..self.rows {
            for (dst, src) in m.row_mut(i).iter_mut().zip(self.row(i)) {
                *dst = src.get();
            }
        }
        m
    }
}

/// A shared weight vector (one cell per row key).
pub struct SharedVector {
    data: AlignedBox<[Real]>,
}

impl SharedVector {
    pub fn zeros(n: usize) -> SharedVector {
        SharedVector {
            data: AlignedBox::slice_from_default(WEIGHT_ALIGNMENT, n)
                .expect("memory allocation failed"),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, i: usize) -> real {
        self.data[i].get()
    }

    pub fn set(&self, i: usize, value: real) {
        self.data[i].set(value);
    }

    pub fn add(&self, i: usize, x: real) {
        self.data[i].add(x);
    }

    pub fn snapshot(&self) -> Vec<real> {
        self.data.iter().map(Real::get).collect()
    }
}

pub fn dot(a: &[Real], b: &[Real]) -> real {
    a.iter().zip(b.iter()).map(|(a, b)| a.get() * b.get()).sum()
}

pub fn dot_dense(a: &[Real], b: &[real]) -> real {
    a.iter().zip(b.iter()).map(|(a, &b)| a.get() * b).sum()
}

/// `dst += src * k`, both shared.
pub fn axpy(dst: &[Real], src: &[Real], k: real) {
    for (d, s) in dst.iter().zip(src.iter()) {
        d.add(s.get() * k);
    }
}

/// `dst += src * k` from a thread-local buffer into shared storage.
pub fn axpy_dense(dst: &[Real], src: &[real], k: real) {
    for (d, &s) in dst.iter().zip(src.iter()) {
        d.add(s * k);
    }
}

/// `out += src * k` from shared storage into a thread-local buffer.
pub fn add_scaled_into(out: &mut [real], src: &[Real], k: real) {
    for (o, s) in out.iter_mut().zip(src.iter()) {
        *o += s.get() * k;
    }
}

/// `out += src` from shared storage into a thread-local buffer.
pub fn add_into(out: &mut [real], src: &[Real]) {
    for (o, s) in out.iter_mut().zip(src.iter()) {
        *o += s.get();
    }
}
