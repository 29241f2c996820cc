use crate::core::sliceable::SliceableDataset;
use crate::core::supervised::SupervisedDataset;
use burn::data::dataset::Dataset;

impl<T> Dataset<T> for SliceableDataset<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self, index: usize) -> Option<T> {
        SliceableDataset::get(self, index).ok()
    }

    fn len(&self) -> usize {
        SliceableDataset::len(self)
    }
}

/// One supervised example, as handed to a burn batcher
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisedItem<X, Y> {
    pub feature: X,
    pub target: Y,
}

impl<X, Y> Dataset<SupervisedItem<X, Y>> for SupervisedDataset<X, Y>
where
    X: Clone + Send + Sync + 'static,
    Y: Clone + Send + Sync + 'static,
{
    fn get(&self, index: usize) -> Option<SupervisedItem<X, Y>> {
        let (feature, target) = SupervisedDataset::get(self, index).ok()?;
        Some(SupervisedItem { feature, target })
    }

    fn len(&self) -> usize {
        SupervisedDataset::len(self)
    }
}

/// Copy every item of a burn dataset into a sliceable one
pub fn materialize<T, D>(dataset: &D) -> SliceableDataset<T>
where
    T: Clone + Send + Sync + 'static,
    D: Dataset<T> + ?Sized,
{
    (0..dataset.len())
        .filter_map(|index| dataset.get(index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;

    #[test]
    fn sliceable_dataset_is_a_burn_dataset() {
        let dataset = SliceableDataset::range(0, Some(5), None).unwrap().map(|x| x * 2);

        assert_eq!(Dataset::len(&dataset), 5);
        assert_eq!(Dataset::get(&dataset, 4), Some(8));
        // Behavior: out-of-range access returns None rather than an error.
        assert_eq!(Dataset::get(&dataset, 5), None);
        assert_eq!(Dataset::iter(&dataset).collect::<Vec<_>>(), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn supervised_dataset_yields_items() {
        let dataset: SupervisedDataset<Vec<f32>, f32> =
            vec![(vec![0.0, 1.0], 0.5), (vec![2.0, 3.0], 2.5)].into_iter().collect();

        let item = Dataset::get(&dataset, 1).unwrap();
        assert_eq!(item.feature, vec![2.0, 3.0]);
        approx::assert_relative_eq!(item.target, 2.5);
        assert!(Dataset::get(&dataset, 2).is_none());
        assert!(!Dataset::is_empty(&dataset));
    }

    #[test]
    fn burn_datasets_can_be_materialized() {
        let source = InMemDataset::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        let dataset = materialize(&source);

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.skip(1_usize).unwrap().to_vec(), vec!["b", "c"]);
    }
}
