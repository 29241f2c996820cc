use crate::core::description::{self, Describe, Description};
use crate::core::sizing::{Size, evenly_spaced_indices};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FusedIterator;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Range {start}..{end} out of bounds for dataset of length {len}")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },
    #[error("All datasets must have the same length, got: {lengths:?}")]
    LengthMismatch { lengths: Vec<usize> },
    #[error("Step must not be zero")]
    InvalidStep,
    #[error("Size {size} exceeds dataset length {len}")]
    SizeOutOfRange { size: usize, len: usize },
    #[error("Split supports at most one remainder (None) size")]
    MultipleRemainders,
    #[error("Sum of sizes must equal the dataset length. Got sum={sum}, length={len}")]
    SizeSumMismatch { sum: usize, len: usize },
    #[error("Sizes sum to {sum}, leaving a negative remainder for a dataset of length {len}")]
    NegativeRemainder { sum: usize, len: usize },
}

type Generator<T> = Arc<dyn Fn(usize) -> T + Send + Sync>;

/// Positions into an upstream dataset
#[derive(Clone)]
enum Index {
    Strided { start: usize, step: usize, len: usize },
    List(Arc<[usize]>),
}

impl Index {
    fn len(&self) -> usize {
        match self {
            Self::Strided { len, .. } => *len,
            Self::List(indices) => indices.len(),
        }
    }

    fn at(&self, position: usize) -> usize {
        match self {
            Self::Strided { start, step, .. } => start + position * step,
            Self::List(indices) => indices[position],
        }
    }

    /// The index selecting `outer` positions out of `self`
    fn compose(&self, outer: &Index) -> Index {
        match (self, outer) {
            (
                Self::Strided { start, step, .. },
                Self::Strided {
                    start: outer_start,
                    step: outer_step,
                    len,
                },
            ) => Self::Strided {
                start: start + outer_start * step,
                step: step * outer_step,
                len: *len,
            },
            _ => Self::List((0..outer.len()).map(|i| self.at(outer.at(i))).collect()),
        }
    }
}

enum Repr<T> {
    /// Materialized elements
    Store(Arc<[T]>),
    /// Elements computed on access
    Lazy { len: usize, get: Generator<T> },
    /// Reindexed view; `upstream` is never itself a view
    View { upstream: Arc<Repr<T>>, index: Index },
}

impl<T> Clone for Repr<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Store(items) => Self::Store(items.clone()),
            Self::Lazy { len, get } => Self::Lazy {
                len: *len,
                get: get.clone(),
            },
            Self::View { upstream, index } => Self::View {
                upstream: upstream.clone(),
                index: index.clone(),
            },
        }
    }
}

impl<T: Clone> Repr<T> {
    fn len(&self) -> usize {
        match self {
            Self::Store(items) => items.len(),
            Self::Lazy { len, .. } => *len,
            Self::View { index, .. } => index.len(),
        }
    }

    /// Callers guarantee `index < self.len()`
    fn fetch(&self, index: usize) -> T {
        match self {
            Self::Store(items) => items[index].clone(),
            Self::Lazy { get, .. } => get(index),
            Self::View {
                upstream,
                index: positions,
            } => upstream.fetch(positions.at(index)),
        }
    }
}

/// An immutable, indexable, lazily evaluated dataset of known length.
///
/// Every transformation returns a new dataset sharing upstream data by
/// reference. Element access goes through the composed index or mapping
/// function; nothing is materialized except where noted (`filter`).
pub struct SliceableDataset<T> {
    repr: Repr<T>,
}

impl<T> Clone for SliceableDataset<T> {
    fn clone(&self) -> Self {
        Self {
            repr: self.repr.clone(),
        }
    }
}

impl<T: Clone> fmt::Debug for SliceableDataset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceableDataset")
            .field("len", &self.repr.len())
            .finish_non_exhaustive()
    }
}

impl<T: Clone> SliceableDataset<T> {
    pub fn len(&self) -> usize {
        self.repr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SliceableDataset<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl SliceableDataset<i64> {
    /// Integers `start, start + step, ...` up to but excluding `stop`.
    ///
    /// With `stop = None` the range is `0..start`.
    pub fn range(start: i64, stop: Option<i64>, step: Option<i64>) -> Result<Self, Error> {
        let (start, stop) = match stop {
            Some(stop) => (start, stop),
            None => (0, start),
        };
        let step = step.unwrap_or(1);

        let (first, last, s) = (i128::from(start), i128::from(stop), i128::from(step));
        let len = match step {
            0 => return Err(Error::InvalidStep),
            _ if step > 0 && start < stop => (last - first + s - 1) / s,
            _ if step < 0 && start > stop => (first - last - s - 1) / -s,
            _ => 0,
        };

        // Modular arithmetic is exact here since every element fits in i64
        Ok(Self::from_fn(len as usize, move |i| {
            start.wrapping_add((i as i64).wrapping_mul(step))
        }))
    }
}

impl<T: Clone + Send + Sync + 'static> SliceableDataset<T> {
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            repr: Repr::Store(items.into()),
        }
    }

    /// A dataset whose `i`-th element is `f(i)`, computed on every access.
    pub fn from_fn<F>(len: usize, f: F) -> Self
    where
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        Self {
            repr: Repr::Lazy {
                len,
                get: Arc::new(f),
            },
        }
    }

    pub fn get(&self, index: usize) -> Result<T, Error> {
        self.check_index(index)?;
        Ok(self.repr.fetch(index))
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            dataset: self,
            front: 0,
            back: self.len(),
        }
    }

    /// Evaluate every element
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    pub fn apply<U, F>(&self, f: F) -> U
    where
        F: FnOnce(&Self) -> U,
    {
        f(self)
    }

    // ============================================================
    // Combinators
    // ============================================================

    pub fn zip<U>(&self, other: &SliceableDataset<U>) -> Result<SliceableDataset<(T, U)>, Error>
    where
        U: Clone + Send + Sync + 'static,
    {
        if self.len() != other.len() {
            return Err(Error::LengthMismatch {
                lengths: vec![self.len(), other.len()],
            });
        }

        let (left, right) = (self.clone(), other.clone());
        Ok(SliceableDataset::from_fn(self.len(), move |i| {
            (left.repr.fetch(i), right.repr.fetch(i))
        }))
    }

    /// Zip any number of equally long datasets into rows.
    pub fn zip_all(datasets: Vec<SliceableDataset<T>>) -> Result<SliceableDataset<Vec<T>>, Error> {
        let lengths: Vec<usize> = datasets.iter().map(SliceableDataset::len).collect();
        if lengths.windows(2).any(|w| w[0] != w[1]) {
            return Err(Error::LengthMismatch { lengths });
        }

        let len = lengths.first().copied().unwrap_or(0);
        Ok(SliceableDataset::from_fn(len, move |i| {
            datasets.iter().map(|ds| ds.repr.fetch(i)).collect()
        }))
    }

    pub fn concatenate(&self, other: &SliceableDataset<T>) -> SliceableDataset<T> {
        let current_length = self.len();
        let total_length = current_length + other.len();
        let (head, tail) = (self.clone(), other.clone());

        Self::from_fn(total_length, move |i| {
            if i < current_length {
                head.repr.fetch(i)
            } else {
                tail.repr.fetch(i - current_length)
            }
        })
    }

    pub fn enumerate(&self) -> SliceableDataset<(usize, T)> {
        let this = self.clone();
        SliceableDataset::from_fn(self.len(), move |i| (i, this.repr.fetch(i)))
    }

    /// Lazily apply `f` on access.
    pub fn map<U, F>(&self, f: F) -> SliceableDataset<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let this = self.clone();
        SliceableDataset::from_fn(self.len(), move |i| f(this.repr.fetch(i)))
    }

    /// Keep the elements matching `predicate`.
    ///
    /// Unlike the other transformations this evaluates every element once, at
    /// call time, since the resulting length is unknown otherwise. The kept
    /// positions are captured, so indexing the result stays O(1).
    pub fn filter<P>(&self, predicate: P) -> SliceableDataset<T>
    where
        P: Fn(&T) -> bool,
    {
        let kept: Vec<usize> = (0..self.len())
            .filter(|&i| predicate(&self.repr.fetch(i)))
            .collect();

        tracing::trace!(total = self.len(), kept = kept.len(), "Filtered dataset");

        self.view(Index::List(kept.into()))
    }

    /// A uniformly random permutation, drawn from the thread RNG.
    pub fn shuffle(&self) -> SliceableDataset<T> {
        self.shuffle_with(&mut rand::thread_rng())
    }

    /// A uniformly random permutation, drawn from `rng`.
    ///
    /// Pass a seeded RNG to make the permutation reproducible.
    pub fn shuffle_with<R: Rng + ?Sized>(&self, rng: &mut R) -> SliceableDataset<T> {
        let length = self.len();
        // sampling every index without replacement yields a full permutation
        let permutation = rand::seq::index::sample(rng, length, length).into_vec();
        self.view(Index::List(permutation.into()))
    }

    /// Keep the first `count` elements, or a proportion of evenly spaced ones.
    ///
    /// For `Size::Fraction(p)`, `round(p * len)` indices are selected, spread
    /// across the whole dataset instead of forming a contiguous head.
    pub fn take(&self, count: impl Into<Size>) -> Result<SliceableDataset<T>, Error> {
        let total = self.len();
        match count.into() {
            Size::Count(count) => {
                self.check_size(count)?;
                Ok(self.view(Index::Strided {
                    start: 0,
                    step: 1,
                    len: count,
                }))
            }
            Size::Fraction(fraction) => {
                let keep = fraction.round(total);
                Ok(self.view(Index::List(evenly_spaced_indices(total, keep).into())))
            }
        }
    }

    /// Drop the first `count` elements, or a proportion of the dataset.
    ///
    /// For `Size::Fraction(p)`, `len - round(p * len)` evenly spaced indices are
    /// kept.
    pub fn skip(&self, count: impl Into<Size>) -> Result<SliceableDataset<T>, Error> {
        let total = self.len();
        match count.into() {
            Size::Count(count) => {
                self.check_size(count)?;
                Ok(self.view(Index::Strided {
                    start: count,
                    step: 1,
                    len: total - count,
                }))
            }
            Size::Fraction(fraction) => {
                let keep = total - fraction.round(total);
                Ok(self.view(Index::List(evenly_spaced_indices(total, keep).into())))
            }
        }
    }

    /// Partition into consecutive, non-overlapping parts.
    ///
    /// Fractions resolve by truncation, `floor(p * len)`. At most one size may
    /// be `None`; it receives the remainder. Without a remainder the sizes must
    /// add up to exactly the dataset length.
    pub fn split(&self, sizes: &[Option<Size>]) -> Result<Vec<SliceableDataset<T>>, Error> {
        if sizes.iter().filter(|size| size.is_none()).count() > 1 {
            return Err(Error::MultipleRemainders);
        }

        let length = self.len();
        let resolved: Vec<Option<usize>> = sizes
            .iter()
            .map(|size| {
                size.map(|size| match size {
                    Size::Count(count) => count,
                    Size::Fraction(fraction) => fraction.truncate(length),
                })
            })
            .collect();
        let sum = resolved
            .iter()
            .flatten()
            .fold(0_usize, |sum, size| sum.saturating_add(*size));
        let has_remainder = resolved.iter().any(Option::is_none);

        if !has_remainder && sum != length {
            return Err(Error::SizeSumMismatch { sum, len: length });
        }
        if sum > length {
            return Err(Error::NegativeRemainder { sum, len: length });
        }

        let mut remaining = self.clone();
        let mut splits = Vec::with_capacity(resolved.len());
        for size in resolved {
            let size = size.unwrap_or(length - sum);
            splits.push(remaining.take(size)?);
            remaining = remaining.skip(size)?;
        }

        Ok(splits)
    }

    /// Split into train/validation/test parts.
    pub fn split_triplet(
        &self,
        splits: &DatasetSplits,
    ) -> Result<DatasetTriplet<SliceableDataset<T>>, Error> {
        let parts = self.split(&[splits.train, splits.val, splits.test])?;

        Ok(DatasetTriplet {
            train: parts[0].clone(),
            val: parts[1].clone(),
            test: parts[2].clone(),
        })
    }

    // ============================================================
    // Indexing
    // ============================================================

    /// The elements in `range`, which must lie within the dataset.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Result<SliceableDataset<T>, Error> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e + 1,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };

        if start > end || end > len {
            return Err(Error::RangeOutOfBounds { start, end, len });
        }

        Ok(self.view(Index::Strided {
            start,
            step: 1,
            len: end - start,
        }))
    }

    /// Every `step`-th element, starting with the first.
    pub fn step_by(&self, step: usize) -> Result<SliceableDataset<T>, Error> {
        if step == 0 {
            return Err(Error::InvalidStep);
        }

        Ok(self.view(Index::Strided {
            start: 0,
            step,
            len: self.len().div_ceil(step),
        }))
    }

    /// The elements at `indices`, in that order. Indices may repeat.
    pub fn select<I>(&self, indices: I) -> Result<SliceableDataset<T>, Error>
    where
        I: IntoIterator<Item = usize>,
    {
        let indices = indices
            .into_iter()
            .map(|index| self.check_index(index).map(|_| index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.view(Index::List(indices.into())))
    }

    /// The elements whose mask entry is `true`.
    pub fn mask(&self, mask: &[bool]) -> Result<SliceableDataset<T>, Error> {
        if mask.len() != self.len() {
            return Err(Error::LengthMismatch {
                lengths: vec![self.len(), mask.len()],
            });
        }

        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();

        Ok(self.view(Index::List(indices.into())))
    }

    fn view(&self, index: Index) -> SliceableDataset<T> {
        let repr = match &self.repr {
            Repr::View {
                upstream,
                index: inner,
            } => Repr::View {
                upstream: upstream.clone(),
                index: inner.compose(&index),
            },
            other => Repr::View {
                upstream: Arc::new(other.clone()),
                index,
            },
        };

        SliceableDataset { repr }
    }

    fn check_index(&self, index: usize) -> Result<(), Error> {
        if index < self.len() {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.len(),
            })
        }
    }

    fn check_size(&self, size: usize) -> Result<(), Error> {
        if size <= self.len() {
            Ok(())
        } else {
            Err(Error::SizeOutOfRange {
                size,
                len: self.len(),
            })
        }
    }
}

impl<T: Clone + Send + Sync + 'static> From<Vec<T>> for SliceableDataset<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: Clone + Send + Sync + 'static> FromIterator<T> for SliceableDataset<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<'a, T: Clone + Send + Sync + 'static> IntoIterator for &'a SliceableDataset<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Iter<'a, T> {
    dataset: &'a SliceableDataset<T>,
    front: usize,
    back: usize,
}

impl<T: Clone> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.front == self.back {
            return None;
        }
        let item = self.dataset.repr.fetch(self.front);
        self.front += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T: Clone> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<T> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        Some(self.dataset.repr.fetch(self.back))
    }
}

impl<T: Clone> ExactSizeIterator for Iter<'_, T> {}

impl<T: Clone> FusedIterator for Iter<'_, T> {}

// ============================================================
// Train / validation / test splits
// ============================================================

/// Sizes of the train, validation and test parts. At most one may be `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train: Option<Size>,
    pub val: Option<Size>,
    pub test: Option<Size>,
}

impl Describe for DatasetSplits {
    fn describe(&self) -> Result<Description, description::Error> {
        let mut map = serde_json::Map::new();
        map.insert("type".to_string(), "DatasetSplits".into());
        map.insert("train".to_string(), self.train.describe()?);
        map.insert("val".to_string(), self.val.describe()?);
        map.insert("test".to_string(), self.test.describe()?);
        Ok(Description::Object(map))
    }
}

#[derive(Debug, Clone)]
pub struct DatasetTriplet<D> {
    pub train: D,
    pub val: D,
    pub test: D,
}

impl<D> DatasetTriplet<D> {
    pub fn map<E, F: FnMut(D) -> E>(self, mut f: F) -> DatasetTriplet<E> {
        DatasetTriplet {
            train: f(self.train),
            val: f(self.val),
            test: f(self.test),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sizing::Fraction;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn range(n: i64) -> SliceableDataset<i64> {
        SliceableDataset::range(0, Some(n), None).unwrap()
    }

    fn half() -> Size {
        Fraction::new(1, 2).unwrap().into()
    }

    #[test]
    fn range_steps_towards_exclusive_stop() {
        assert_eq!(
            SliceableDataset::range(5, None, None).unwrap().to_vec(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(
            SliceableDataset::range(2, Some(10), Some(3)).unwrap().to_vec(),
            vec![2, 5, 8]
        );
        assert_eq!(
            SliceableDataset::range(10, Some(0), Some(-4)).unwrap().to_vec(),
            vec![10, 6, 2]
        );
        assert!(SliceableDataset::range(3, Some(1), None).unwrap().is_empty());
        assert_eq!(
            SliceableDataset::range(0, Some(3), Some(0)).unwrap_err(),
            Error::InvalidStep
        );
    }

    #[test]
    fn get_out_of_range_fails() {
        let ds = range(3);
        assert_eq!(ds.get(2), Ok(2));
        assert_eq!(
            ds.get(3),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn len_matches_iteration_count() {
        let ds = range(20).filter(|x| x % 3 == 0).skip(1_usize).unwrap();
        assert_eq!(ds.len(), ds.iter().count());
        assert_eq!(ds.iter().len(), 6);
        assert_eq!(ds.iter().rev().collect::<Vec<_>>(), vec![18, 15, 12, 9, 6, 3]);
    }

    #[test]
    fn map_is_lazy() {
        // Behavior: the mapping function runs on access, not when map is called.
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let ds = range(10).map(move |x| {
            counter.fetch_add(1, Ordering::SeqCst);
            x * 2
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ds.len(), 10);
        assert_eq!(ds.get(4), Ok(8));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn filter_then_take() {
        let ds = range(10).filter(|x| x % 2 == 0).take(2_usize).unwrap();
        assert_eq!(ds.to_vec(), vec![0, 2]);
    }

    #[test]
    fn filter_evaluates_eagerly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let ds = range(10).map(move |x| {
            counter.fetch_add(1, Ordering::SeqCst);
            x
        });

        let odd = ds.filter(|x| x % 2 == 1);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(odd.len(), 5);
    }

    #[test]
    fn zip_pairs_elements() {
        let a = range(4);
        let b = range(4).map(|x| x * 10);
        let zipped = a.zip(&b).unwrap();

        for i in 0..4 {
            assert_eq!(zipped.get(i).unwrap(), (a.get(i).unwrap(), b.get(i).unwrap()));
        }
    }

    #[test]
    fn zip_rejects_length_mismatch() {
        assert_eq!(
            range(3).zip(&range(4)).unwrap_err(),
            Error::LengthMismatch {
                lengths: vec![3, 4]
            }
        );
        assert!(SliceableDataset::zip_all(vec![range(2), range(2), range(1)]).is_err());
    }

    #[test]
    fn zip_all_builds_rows() {
        let rows = SliceableDataset::zip_all(vec![range(3), range(3).map(|x| -x)]).unwrap();
        assert_eq!(rows.to_vec(), vec![vec![0, 0], vec![1, -1], vec![2, -2]]);
        assert!(SliceableDataset::<i64>::zip_all(vec![]).unwrap().is_empty());
    }

    #[test]
    fn concatenate_appends() {
        let ds = range(3).concatenate(&range(2).map(|x| x + 100));
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.to_vec(), vec![0, 1, 2, 100, 101]);
        assert_eq!(
            ds.get(5),
            Err(Error::IndexOutOfRange { index: 5, len: 5 })
        );
    }

    #[test]
    fn enumerate_attaches_positions() {
        let ds = range(10).skip(7_usize).unwrap().enumerate();
        assert_eq!(ds.to_vec(), vec![(0, 7), (1, 8), (2, 9)]);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let ds = range(50);
        let shuffled = ds.shuffle();

        assert_eq!(shuffled.len(), 50);
        let mut items = shuffled.to_vec();
        items.sort();
        assert_eq!(items, ds.to_vec());
    }

    #[test]
    fn successive_shuffles_differ() {
        // Behavior: without a fixed seed two permutations of 100 elements collide
        // with probability 1/100!, which is negligible.
        let ds = range(100);
        assert_ne!(ds.shuffle().to_vec(), ds.shuffle().to_vec());
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let ds = range(30);
        let a = ds.shuffle_with(&mut StdRng::seed_from_u64(7)).to_vec();
        let b = ds.shuffle_with(&mut StdRng::seed_from_u64(7)).to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn take_and_skip_counts() {
        let ds = range(10);
        assert_eq!(ds.take(3_usize).unwrap().to_vec(), vec![0, 1, 2]);
        assert_eq!(ds.skip(7_usize).unwrap().to_vec(), vec![7, 8, 9]);
        assert!(ds.take(10_usize).is_ok());
        assert_eq!(
            ds.take(11_usize).unwrap_err(),
            Error::SizeOutOfRange { size: 11, len: 10 }
        );
        assert!(ds.skip(11_usize).is_err());
    }

    #[test]
    fn fractional_skip_spreads_kept_indices() {
        // Behavior: skipping half of the dataset keeps 5 evenly spaced elements
        // rather than the contiguous tail.
        let kept = range(10).skip(half()).unwrap().to_vec();
        assert_eq!(kept.len(), 5);
        assert_ne!(kept, vec![5, 6, 7, 8, 9]);
        assert_eq!(kept, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn fractional_take_rounds() {
        let ds = range(10);
        let two_thirds = Fraction::new(2, 3).unwrap();
        // round(6.67) = 7
        assert_eq!(ds.take(two_thirds).unwrap().len(), 7);
        // 10 - 7 = 3
        assert_eq!(ds.skip(two_thirds).unwrap().len(), 3);
        assert!(ds.take(Fraction::new(0, 1).unwrap()).unwrap().is_empty());
        assert_eq!(ds.take(Fraction::new(1, 1).unwrap()).unwrap().to_vec(), ds.to_vec());
    }

    #[test]
    fn split_partitions_exactly_once() {
        let ds = range(10).shuffle();
        let parts = ds
            .split(&[Some(Size::Count(2)), Some(Size::Count(3)), Some(Size::Count(5))])
            .unwrap();

        let lengths: Vec<usize> = parts.iter().map(SliceableDataset::len).collect();
        assert_eq!(lengths, vec![2, 3, 5]);

        let covered: Vec<i64> = parts.iter().flat_map(|p| p.to_vec()).collect();
        assert_eq!(covered, ds.to_vec());
        let unique: HashSet<i64> = covered.into_iter().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn split_fraction_and_remainder() {
        let parts = range(10).split(&[Some(half()), None]).unwrap();
        assert_eq!(parts[0].to_vec(), vec![0, 1, 2, 3, 4]);
        assert_eq!(parts[1].to_vec(), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn split_truncates_fractions() {
        // Behavior: split resolves 2/3 of 10 to 6 (truncation), whereas take would keep 7.
        let two_thirds = Fraction::new(2, 3).unwrap();
        let parts = range(10).split(&[Some(two_thirds.into()), None]).unwrap();
        assert_eq!(parts[0].len(), 6);
        assert_eq!(parts[1].len(), 4);
    }

    #[test]
    fn split_validates_sizes() {
        let ds = range(10);
        assert_eq!(ds.split(&[None, None]).unwrap_err(), Error::MultipleRemainders);
        assert_eq!(
            ds.split(&[Some(Size::Count(3)), Some(Size::Count(3))])
                .unwrap_err(),
            Error::SizeSumMismatch { sum: 6, len: 10 }
        );
        assert_eq!(
            ds.split(&[Some(Size::Count(8)), Some(Size::Count(3)), None])
                .unwrap_err(),
            Error::NegativeRemainder { sum: 11, len: 10 }
        );
    }

    #[test]
    fn split_rejects_sizes_whose_sum_overflows() {
        let ds = range(10);
        assert!(matches!(
            ds.split(&[Some(Size::Count(usize::MAX)), Some(Size::Count(1))]),
            Err(Error::SizeSumMismatch { len: 10, .. })
        ));
        assert!(matches!(
            ds.split(&[Some(Size::Count(usize::MAX)), Some(Size::Count(1)), None]),
            Err(Error::NegativeRemainder { len: 10, .. })
        ));
    }

    #[test]
    fn range_reaches_elements_across_the_full_i64_span() {
        // Behavior: start + i * step may exceed i64 midway even when the element itself fits.
        let wide = SliceableDataset::range(i64::MIN, Some(i64::MAX), None).unwrap();
        assert_eq!(wide.get(1 << 63).unwrap(), 0);
        assert_eq!(wide.get(usize::MAX - 1).unwrap(), i64::MAX - 1);

        let descending = SliceableDataset::range(i64::MAX, Some(i64::MIN), Some(-1)).unwrap();
        assert_eq!(descending.get(1 << 63).unwrap(), -1);
    }

    #[test]
    fn split_triplet_assigns_parts() {
        let splits = DatasetSplits {
            train: Some(Fraction::new(70, 100).unwrap().into()),
            val: Some(Fraction::new(15, 100).unwrap().into()),
            test: None,
        };

        let triplet = range(20).split_triplet(&splits).unwrap();
        assert_eq!(triplet.train.len(), 14);
        assert_eq!(triplet.val.len(), 3);
        assert_eq!(triplet.test.len(), 3);
        assert_eq!(triplet.test.to_vec(), vec![17, 18, 19]);
    }

    #[test]
    fn slicing_and_selection() {
        let ds = range(10);
        assert_eq!(ds.slice(2..5).unwrap().to_vec(), vec![2, 3, 4]);
        assert_eq!(ds.slice(..=1).unwrap().to_vec(), vec![0, 1]);
        assert_eq!(ds.slice(8..).unwrap().to_vec(), vec![8, 9]);
        assert!(ds.slice(5..11).is_err());

        assert_eq!(ds.step_by(4).unwrap().to_vec(), vec![0, 4, 8]);
        assert_eq!(ds.step_by(0).unwrap_err(), Error::InvalidStep);

        assert_eq!(ds.select([9, 0, 9]).unwrap().to_vec(), vec![9, 0, 9]);
        assert!(ds.select([10]).is_err());

        let mask: Vec<bool> = (0..10).map(|i| i < 2).collect();
        assert_eq!(ds.mask(&mask).unwrap().to_vec(), vec![0, 1]);
        assert!(ds.mask(&[true]).is_err());
    }

    #[test]
    fn nested_views_compose() {
        // Behavior: views of views index straight into the underlying data.
        let ds = range(100)
            .slice(10..90)
            .unwrap()
            .step_by(2)
            .unwrap()
            .skip(5_usize)
            .unwrap()
            .select([0, 3])
            .unwrap();
        assert_eq!(ds.to_vec(), vec![20, 26]);
    }

    #[test]
    fn apply_passes_dataset() {
        let total: i64 = range(5).apply(|ds| ds.iter().sum());
        assert_eq!(total, 10);
    }

    #[test]
    fn splits_describe_structurally() {
        let splits = DatasetSplits {
            train: Some(Size::Count(3)),
            val: None,
            test: Some(half()),
        };
        let description = splits.describe().unwrap();
        assert_eq!(description["train"], serde_json::json!(3));
        assert_eq!(description["val"], serde_json::Value::Null);
        assert_eq!(description["test"]["denominator"], serde_json::json!(2));
    }
}
