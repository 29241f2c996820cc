use crate::core::sizing::Size;
use crate::core::sliceable::{DatasetSplits, DatasetTriplet, Error, Iter, SliceableDataset};
use rand::Rng;

/// A lazy dataset of `(feature, target)` pairs.
///
/// For every index `i`, `features().get(i)` and `targets().get(i)` are the
/// two halves of `get(i)`. Every operation below preserves that pairing.
pub struct SupervisedDataset<X, Y> {
    pairs: SliceableDataset<(X, Y)>,
}

impl<X, Y> Clone for SupervisedDataset<X, Y> {
    fn clone(&self) -> Self {
        Self {
            pairs: self.pairs.clone(),
        }
    }
}

impl<X: Clone, Y: Clone> std::fmt::Debug for SupervisedDataset<X, Y> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedDataset")
            .field("len", &self.pairs.len())
            .finish_non_exhaustive()
    }
}

impl<X, Y> SupervisedDataset<X, Y>
where
    X: Clone + Send + Sync + 'static,
    Y: Clone + Send + Sync + 'static,
{
    pub fn from_pairs(pairs: SliceableDataset<(X, Y)>) -> Self {
        Self { pairs }
    }

    pub fn from_features_and_targets(
        features: &SliceableDataset<X>,
        targets: &SliceableDataset<Y>,
    ) -> Result<Self, Error> {
        Ok(Self::from_pairs(features.zip(targets)?))
    }

    pub fn pairs(&self) -> &SliceableDataset<(X, Y)> {
        &self.pairs
    }

    pub fn into_pairs(self) -> SliceableDataset<(X, Y)> {
        self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<(X, Y), Error> {
        self.pairs.get(index)
    }

    pub fn iter(&self) -> Iter<'_, (X, Y)> {
        self.pairs.iter()
    }

    pub fn features(&self) -> SliceableDataset<X> {
        self.pairs.map(|(feature, _)| feature)
    }

    pub fn targets(&self) -> SliceableDataset<Y> {
        self.pairs.map(|(_, target)| target)
    }

    pub fn unzip(&self) -> (SliceableDataset<X>, SliceableDataset<Y>) {
        (self.features(), self.targets())
    }

    pub fn swap(&self) -> SupervisedDataset<Y, X> {
        SupervisedDataset::from_pairs(self.pairs.map(|(feature, target)| (target, feature)))
    }

    pub fn map<U, V, F>(&self, f: F) -> SupervisedDataset<U, V>
    where
        U: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(X, Y) -> (U, V) + Send + Sync + 'static,
    {
        SupervisedDataset::from_pairs(self.pairs.map(move |(feature, target)| f(feature, target)))
    }

    pub fn map_features<U, F>(&self, f: F) -> SupervisedDataset<U, Y>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(X) -> U + Send + Sync + 'static,
    {
        SupervisedDataset::from_pairs(self.pairs.map(move |(feature, target)| (f(feature), target)))
    }

    pub fn map_targets<V, F>(&self, f: F) -> SupervisedDataset<X, V>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(Y) -> V + Send + Sync + 'static,
    {
        SupervisedDataset::from_pairs(self.pairs.map(move |(feature, target)| (feature, f(target))))
    }

    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(&X, &Y) -> bool,
    {
        Self::from_pairs(self.pairs.filter(|(feature, target)| predicate(feature, target)))
    }

    /// Keep pairs whose feature matches; targets follow their features
    pub fn filter_features<P>(&self, predicate: P) -> Self
    where
        P: Fn(&X) -> bool,
    {
        self.filter(|feature, _| predicate(feature))
    }

    pub fn filter_targets<P>(&self, predicate: P) -> Self
    where
        P: Fn(&Y) -> bool,
    {
        self.filter(|_, target| predicate(target))
    }

    pub fn shuffle(&self) -> Self {
        Self::from_pairs(self.pairs.shuffle())
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        Self::from_pairs(self.pairs.shuffle_with(rng))
    }

    pub fn take(&self, count: impl Into<Size>) -> Result<Self, Error> {
        self.pairs.take(count).map(Self::from_pairs)
    }

    pub fn skip(&self, count: impl Into<Size>) -> Result<Self, Error> {
        self.pairs.skip(count).map(Self::from_pairs)
    }

    pub fn concatenate(&self, other: &Self) -> Self {
        Self::from_pairs(self.pairs.concatenate(&other.pairs))
    }

    pub fn split(&self, sizes: &[Option<Size>]) -> Result<Vec<Self>, Error> {
        Ok(self
            .pairs
            .split(sizes)?
            .into_iter()
            .map(Self::from_pairs)
            .collect())
    }

    pub fn split_triplet(&self, splits: &DatasetSplits) -> Result<DatasetTriplet<Self>, Error> {
        Ok(self.pairs.split_triplet(splits)?.map(Self::from_pairs))
    }
}

impl<X, Y> From<SliceableDataset<(X, Y)>> for SupervisedDataset<X, Y>
where
    X: Clone + Send + Sync + 'static,
    Y: Clone + Send + Sync + 'static,
{
    fn from(pairs: SliceableDataset<(X, Y)>) -> Self {
        Self::from_pairs(pairs)
    }
}

impl<X, Y> FromIterator<(X, Y)> for SupervisedDataset<X, Y>
where
    X: Clone + Send + Sync + 'static,
    Y: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (X, Y)>>(iter: I) -> Self {
        Self::from_pairs(iter.into_iter().collect())
    }
}
