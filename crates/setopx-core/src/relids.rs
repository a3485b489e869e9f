//! # Relation-Identifier Sets
//!
//! Small bitmap sets over relation ids and column ordinals. Filter clauses
//! carry several relid sets (`clause_rels`, `required_rels`, ...) that are
//! shared between the parent relation's clauses and the translated child
//! copies; `adjust_relid_set` substitutes one id for another with
//! copy-on-write semantics so that unaffected sets stay shared.

use crate::types::RelId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const BITS: usize = 64;

/// Word-based bitmap shared by [`RelIdSet`] and [`ColumnSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct Bitmap {
    words: Vec<u64>,
}

impl Bitmap {
    fn contains(&self, bit: u32) -> bool {
        let (w, b) = (bit as usize / BITS, bit as usize % BITS);
        self.words.get(w).map_or(false, |word| word & (1 << b) != 0)
    }

    fn insert(&mut self, bit: u32) {
        let (w, b) = (bit as usize / BITS, bit as usize % BITS);
        if self.words.len() <= w {
            self.words.resize(w + 1, 0);
        }
        self.words[w] |= 1 << b;
    }

    fn remove(&mut self, bit: u32) {
        let (w, b) = (bit as usize / BITS, bit as usize % BITS);
        if let Some(word) = self.words.get_mut(w) {
            *word &= !(1 << b);
        }
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }

    fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, word)| {
            (0..BITS).filter_map(move |b| {
                if word & (1 << b) != 0 {
                    Some((wi * BITS + b) as u32)
                } else {
                    None
                }
            })
        })
    }
}

/// A set of range-table relation ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelIdSet {
    bits: Bitmap,
}

impl RelIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(rel: RelId) -> Self {
        let mut s = Self::new();
        s.insert(rel);
        s
    }

    pub fn contains(&self, rel: RelId) -> bool {
        self.bits.contains(rel.0)
    }

    pub fn insert(&mut self, rel: RelId) {
        self.bits.insert(rel.0);
    }

    pub fn remove(&mut self, rel: RelId) {
        self.bits.remove(rel.0);
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = RelId> + '_ {
        self.bits.iter().map(RelId)
    }
}

impl FromIterator<RelId> for RelIdSet {
    fn from_iter<I: IntoIterator<Item = RelId>>(iter: I) -> Self {
        let mut s = Self::new();
        for rel in iter {
            s.insert(rel);
        }
        s
    }
}

/// Substitute `new` for `old` in a shared relid set.
///
/// When `old` is not a member, the input `Arc` is returned as-is (no copy);
/// otherwise a private copy is made with `old` removed and `new` inserted.
pub fn adjust_relid_set(set: &Arc<RelIdSet>, old: RelId, new: RelId) -> Arc<RelIdSet> {
    if !set.contains(old) {
        return Arc::clone(set);
    }
    let mut copy = RelIdSet::clone(set);
    copy.remove(old);
    copy.insert(new);
    Arc::new(copy)
}

/// A set of column ordinals for one relation (1-based), with bit 0 standing
/// for a whole-row reference. Used for per-column access permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSet {
    bits: Bitmap,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ordinal: u32) -> bool {
        self.bits.contains(ordinal)
    }

    pub fn insert(&mut self, ordinal: u32) {
        self.bits.insert(ordinal);
    }

    pub fn contains_whole_row(&self) -> bool {
        self.bits.contains(0)
    }

    pub fn insert_whole_row(&mut self) {
        self.bits.insert(0);
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter()
    }
}

impl FromIterator<u32> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut s = Self::new();
        for ordinal in iter {
            s.insert(ordinal);
        }
        s
    }
}
