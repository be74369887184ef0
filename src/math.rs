//! Dense numeric primitives: fixed-length vectors, a row-major matrix, and
//! the precomputed sigmoid table used on every gradient step.

use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Sub, SubAssign};
use std::sync::OnceLock;

use rand::Rng;

use crate::real;

const SIGMOID_TABLE_SIZE: usize = 10_000;
const MAX_SIGMOID: real = 10.0;

fn sigmoid_table() -> &'static [real] {
    static TABLE: OnceLock<Vec<real>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..=SIGMOID_TABLE_SIZE)
            .map(|i| {
                let x = (i as real * 2.0 * MAX_SIGMOID) / SIGMOID_TABLE_SIZE as real - MAX_SIGMOID;
                1.0 / (1.0 + (-x).exp())
            })
            .collect()
    })
}

/// Table-based sigmoid, saturating to 0/1 outside `[-10, 10]`.
pub fn sigmoid(x: real) -> real {
    if x < -MAX_SIGMOID {
        0.0
    } else if x > MAX_SIGMOID {
        1.0
    } else {
        let i = ((x + MAX_SIGMOID) * (SIGMOID_TABLE_SIZE as real / MAX_SIGMOID / 2.0)) as usize;
        sigmoid_table()[i]
    }
}

pub fn dot(a: &[real], b: &[real]) -> real {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&a, &b)| a * b).sum()
}

pub fn norm(v: &[real]) -> real {
    v.iter().copied().map(|e| e * e).sum::<real>().sqrt()
}

pub fn normalize(v: &mut [real]) {
    let len = norm(v);
    for e in v {
        *e /= len;
    }
}

/// A fixed-length dense vector of `f32`, initialized to zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vector {
    data: Vec<real>,
}

impl Vector {
    pub fn zeros(n: usize) -> Vector {
        Vector { data: vec![0.0; n] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[real] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [real] {
        &mut self.data
    }

    pub fn set_zero(&mut self) {
        self.data.fill(0.0);
    }

    pub fn set_random_uniform(&mut self, rng: &mut impl Rng, min: real, max: real) {
        for x in &mut self.data {
            *x = rng.gen_range(min..max);
        }
    }

    pub fn sum(&self) -> real {
        self.data.iter().sum()
    }

    pub fn dot(&self, other: &Vector) -> real {
        dot(&self.data, &other.data)
    }

    /// Elementwise sigmoid, through the lookup table.
    pub fn sigmoid(&self) -> Vector {
        Vector {
            data: self.data.iter().map(|&x| sigmoid(x)).collect(),
        }
    }

    /// Temperature softmax. Logits are divided by `temperature`, shifted by
    /// their maximum for stability, exponentiated and normalized.
    ///
    /// A single-element input yields exactly `[1.0]`.
    pub fn softmax(&self, temperature: real) -> Vector {
        if self.data.len() == 1 {
            return Vector { data: vec![1.0] };
        }
        let mut out: Vec<real> = self.data.iter().map(|&x| x / temperature).collect();
        let max = out.iter().copied().fold(real::NEG_INFINITY, real::max);
        let mut sum = 0.0;
        for x in &mut out {
            *x = (*x - max).exp();
            sum += *x;
        }
        for x in &mut out {
            *x /= sum;
        }
        Vector { data: out }
    }

    pub fn clip_by_value(&mut self, min: real, max: real) {
        for x in &mut self.data {
            *x = x.clamp(min, max);
        }
    }

    /// `self += other * k` without a temporary vector.
    pub fn fused_multiply_add(&mut self, other: &Vector, k: real) {
        assert_eq!(self.data.len(), other.data.len());
        for (x, &o) in self.data.iter_mut().zip(other.data.iter()) {
            *x += o * k;
        }
    }
}

impl From<Vec<real>> for Vector {
    fn from(data: Vec<real>) -> Vector {
        Vector { data }
    }
}

impl Index<usize> for Vector {
    type Output = real;

    fn index(&self, i: usize) -> &real {
        &self.data[i]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, i: usize) -> &mut real {
        &mut self.data[i]
    }
}

macro_rules! vector_binop {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<&Vector> for &Vector {
            type Output = Vector;

            fn $method(self, other: &Vector) -> Vector {
                assert_eq!(self.data.len(), other.data.len());
                Vector {
                    data: self
                        .data
                        .iter()
                        .zip(other.data.iter())
                        .map(|(&a, &b)| a $op b)
                        .collect(),
                }
            }
        }

        impl $trait<real> for &Vector {
            type Output = Vector;

            fn $method(self, value: real) -> Vector {
                Vector {
                    data: self.data.iter().map(|&a| a $op value).collect(),
                }
            }
        }
    };
}

vector_binop!(Add, add, +);
vector_binop!(Sub, sub, -);
vector_binop!(Mul, mul, *);
vector_binop!(Div, div, /);

macro_rules! vector_assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<&Vector> for Vector {
            fn $method(&mut self, other: &Vector) {
                assert_eq!(self.data.len(), other.data.len());
                for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
                    *a $op b;
                }
            }
        }

        impl $trait<real> for Vector {
            fn $method(&mut self, value: real) {
                for a in &mut self.data {
                    *a $op value;
                }
            }
        }
    };
}

vector_assign_op!(AddAssign, add_assign, +=);
vector_assign_op!(SubAssign, sub_assign, -=);
vector_assign_op!(MulAssign, mul_assign, *=);
vector_assign_op!(DivAssign, div_assign, /=);

/// A row-major dense matrix backed by one contiguous buffer. Rows are
/// accessed by index; no long-lived row references are handed out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Matrix {
    data: Vec<real>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            data: vec![0.0; rows * cols],
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

    pub fn row(&self, i: usize) -> &[real] {
        &self.data[i * self.cols..][..self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [real] {
        &mut self.data[i * self.cols..][..self.cols]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn sigmoid_saturates_and_matches_direct_form() {
        assert_eq!(sigmoid(-11.0), 0.0);
        assert_eq!(sigmoid(11.0), 1.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-3);
        for &x in &[-4.0, -0.7, 0.3, 2.5] {
            let direct = 1.0 / (1.0 + (-x as real).exp());
            assert!((sigmoid(x) - direct).abs() < 1e-3, "sigmoid({x})");
        }
    }

    #[test]
    fn softmax_sums_to_one() {
        let v = Vector::from(vec![0.5, -2.0, 3.0, 0.0]);
        for &t in &[0.1, 1.0, 5.0] {
            let p = v.softmax(t);
            assert!((p.sum() - 1.0).abs() < 1e-6, "temperature {t}");
            assert!(p.as_slice().iter().all(|&x| x > 0.0));
        }
    }

    #[test]
    fn softmax_of_singleton_is_exactly_one() {
        let v = Vector::from(vec![-7.25]);
        assert_eq!(v.softmax(0.5).as_slice(), &[1.0]);
    }

    #[test]
    fn softmax_sharpens_with_low_temperature() {
        let v = Vector::from(vec![1.0, 2.0]);
        let cold = v.softmax(0.1);
        let warm = v.softmax(10.0);
        assert!(cold[1] > warm[1]);
    }

    #[test]
    fn fused_multiply_add_matches_scaled_addition() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut v = Vector::zeros(16);
        let mut u = Vector::zeros(16);
        v.set_random_uniform(&mut rng, -1.0, 1.0);
        u.set_random_uniform(&mut rng, -1.0, 1.0);

        let expected = &v + &(&u * 0.37);
        v.fused_multiply_add(&u, 0.37);
        for i in 0..v.len() {
            assert!((v[i] - expected[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn elementwise_ops_and_clipping() {
        let a = Vector::from(vec![1.0, -2.0, 4.0]);
        let b = Vector::from(vec![2.0, 2.0, 2.0]);
        assert_eq!((&a + &b).as_slice(), &[3.0, 0.0, 6.0]);
        assert_eq!((&a - &b).as_slice(), &[-1.0, -4.0, 2.0]);
        assert_eq!((&a * &b).as_slice(), &[2.0, -4.0, 8.0]);
        assert_eq!((&a / 2.0).as_slice(), &[0.5, -1.0, 2.0]);

        let mut c = a.clone();
        c += &b;
        assert_eq!(c.as_slice(), &[3.0, 0.0, 6.0]);
        c /= 3.0;
        assert_eq!(c.as_slice(), &[1.0, 0.0, 2.0]);

        let mut d = Vector::from(vec![-5.0, 0.25, 9.0]);
        d.clip_by_value(-1.0, 1.0);
        assert_eq!(d.as_slice(), &[-1.0, 0.25, 1.0]);

        assert_eq!(a.dot(&b), 6.0);
        let s = Vector::from(vec![0.0, 100.0]).sigmoid();
        assert_eq!(s.as_slice(), &[0.5, 1.0]);
    }

    #[test]
    fn matrix_rows_are_disjoint_slices() {
        let mut m = Matrix::zeros(3, 4);
        m.row_mut(1).fill(2.0);
        assert_eq!(m.row(0), &[0.0; 4]);
        assert_eq!(m.row(1), &[2.0; 4]);
        assert_eq!(m.row(2), &[0.0; 4]);
    }

    #[test]
    fn normalize_produces_unit_vectors() {
        let mut v = [3.0, 4.0];
        normalize(&mut v);
        assert!((norm(&v) - 1.0).abs() < 1e-6);
    }
}
