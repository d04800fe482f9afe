use ahash::AHashMap;
use rand::Rng;
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{CofactorError, Result};
use crate::init::RankInitScheme;

/// Opaque identifier of a user or item. Only equality and hashing matter.
pub trait EntityKey: Clone + Eq + Hash + Debug {}

impl<T: Clone + Eq + Hash + Debug> EntityKey for T {}

/// Key → F-dimensional factor vector.
///
/// Vectors live in one row-major buffer (`len() * factor()` values) so the
/// whole table can be handed to the Gram matrix kernel without copying.
/// Rows are kept in registration order; a key that was never registered has
/// no vector at all, which is different from a zero vector.
#[derive(Debug, Clone)]
pub struct Weights<K> {
    factor: usize,
    keys: Vec<K>,
    index: AHashMap<K, usize>,
    data: Vec<f64>,
}

impl<K: EntityKey> Weights<K> {
    pub fn new(factor: usize) -> Self {
        Self {
            factor,
            keys: Vec::new(),
            index: AHashMap::new(),
            data: Vec::new(),
        }
    }

    pub fn with_capacity(factor: usize, capacity: usize) -> Self {
        Self {
            factor,
            keys: Vec::with_capacity(capacity),
            index: AHashMap::with_capacity(capacity),
            data: Vec::with_capacity(capacity * factor),
        }
    }

    /// Draws a fresh vector for `key` unless it is already present.
    /// Returns whether a new row was created.
    pub fn register<R: Rng + ?Sized>(
        &mut self,
        key: K,
        init: &RankInitScheme,
        rng: &mut R,
    ) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        let v = init.new_vector(self.factor, rng);
        self.push_row(key, &v);
        true
    }

    /// Inserts or overwrites the vector for `key`.
    pub fn insert(&mut self, key: K, v: &[f64]) -> Result<()> {
        self.check_len(v)?;
        match self.index.get(&key) {
            Some(&row) => self.row_mut(row).copy_from_slice(v),
            None => self.push_row(key, v),
        }
        Ok(())
    }

    pub fn get(&self, key: &K) -> Option<&[f64]> {
        self.index.get(key).map(|&row| self.row(row))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn key(&self, row: usize) -> &K {
        &self.keys[row]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.factor..(row + 1) * self.factor]
    }

    pub(crate) fn set_row(&mut self, row: usize, v: &[f64]) -> Result<()> {
        self.check_len(v)?;
        self.row_mut(row).copy_from_slice(v);
        Ok(())
    }

    /// Row-major `len() x factor()` view of every vector.
    pub fn as_flat(&self) -> &[f64] {
        &self.data
    }

    /// Iterates `(key, vector)` in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &[f64])> + '_ {
        self.keys
            .iter()
            .zip(self.data.chunks_exact(self.factor.max(1)))
    }

    /// Sum of squared norms, the ridge penalty before scaling.
    pub fn squared_norm(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum()
    }

    fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.factor..(row + 1) * self.factor]
    }

    fn push_row(&mut self, key: K, v: &[f64]) {
        self.index.insert(key.clone(), self.keys.len());
        self.keys.push(key);
        self.data.extend_from_slice(v);
    }

    fn check_len(&self, v: &[f64]) -> Result<()> {
        if v.len() != self.factor {
            return Err(CofactorError::DimensionMismatch {
                expected: self.factor,
                actual: v.len(),
            });
        }
        Ok(())
    }
}

/// Key → scalar bias, same lazy-creation discipline as [`Weights`].
#[derive(Debug, Clone, Default)]
pub struct BiasTable<K> {
    values: AHashMap<K, f64>,
}

impl<K: EntityKey> BiasTable<K> {
    pub fn new() -> Self {
        Self {
            values: AHashMap::new(),
        }
    }

    /// Creates the entry at `initial` unless it exists.
    pub fn register(&mut self, key: K, initial: f64) -> bool {
        if self.values.contains_key(&key) {
            return false;
        }
        self.values.insert(key, initial);
        true
    }

    pub fn insert(&mut self, key: K, value: f64) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: EntityKey> FromIterator<(K, f64)> for BiasTable<K> {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
