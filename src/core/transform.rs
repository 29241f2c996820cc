use crate::core::description::{self, Describe, Description, Pack};
use crate::core::sliceable::SliceableDataset;
use crate::core::supervised::SupervisedDataset;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type TransformFn<X, Y> = Arc<dyn Fn(X, &Pack) -> Y + Send + Sync>;

/// A named function with describable bound parameters.
///
/// Two transformers with the same name and pack describe identically, so
/// datasets produced by them share cache entries.
pub struct Transformer<X, Y> {
    name: String,
    pack: Pack,
    f: TransformFn<X, Y>,
}

impl<X, Y> Clone for Transformer<X, Y> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            pack: self.pack.clone(),
            f: self.f.clone(),
        }
    }
}

impl<X, Y> fmt::Debug for Transformer<X, Y> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("name", &self.name)
            .field("pack", &self.pack)
            .finish_non_exhaustive()
    }
}

impl<X, Y> Transformer<X, Y> {
    pub fn new<F>(name: &str, pack: Pack, f: F) -> Self
    where
        F: Fn(X, &Pack) -> Y + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            pack,
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pack(&self) -> &Pack {
        &self.pack
    }

    pub fn call(&self, input: X) -> Y {
        (self.f)(input, &self.pack)
    }

    fn describe_as(&self, type_name: &str) -> Result<Map<String, Value>, description::Error> {
        let mut map = Map::new();
        map.insert("type".to_string(), type_name.into());
        map.insert("name".to_string(), self.name.as_str().into());
        map.insert("pack".to_string(), self.pack.describe()?);
        Ok(map)
    }
}

impl<X, Y> Transformer<X, Y>
where
    X: Clone + Send + Sync + 'static,
    Y: Clone + Send + Sync + 'static,
{
    pub fn map_to_dataset(&self, dataset: &SliceableDataset<X>) -> SliceableDataset<Y> {
        let transformer = self.clone();
        dataset.map(move |x| transformer.call(x))
    }
}

impl<X, Y> Describe for Transformer<X, Y> {
    fn describe(&self) -> Result<Description, description::Error> {
        Ok(Value::Object(self.describe_as("Transformer")?))
    }
}

// ============================================================
// Supervised transformers
// ============================================================

/// Transforms the feature side of supervised pairs, leaving targets untouched
#[derive(Debug)]
pub struct FeatureTransformer<X1, X2> {
    inner: Transformer<X1, X2>,
}

impl<X1, X2> Clone for FeatureTransformer<X1, X2> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<X1, X2> FeatureTransformer<X1, X2> {
    pub fn new<F>(name: &str, pack: Pack, f: F) -> Self
    where
        F: Fn(X1, &Pack) -> X2 + Send + Sync + 'static,
    {
        Self {
            inner: Transformer::new(name, pack, f),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn transform_feature(&self, feature: X1) -> X2 {
        self.inner.call(feature)
    }

    pub fn as_transformer(&self) -> &Transformer<X1, X2> {
        &self.inner
    }
}

impl<X1, X2> FeatureTransformer<X1, X2>
where
    X1: Clone + Send + Sync + 'static,
    X2: Clone + Send + Sync + 'static,
{
    pub fn map_to_dataset<Y>(&self, dataset: &SupervisedDataset<X1, Y>) -> SupervisedDataset<X2, Y>
    where
        Y: Clone + Send + Sync + 'static,
    {
        let inner = self.inner.clone();
        dataset.map_features(move |feature| inner.call(feature))
    }
}

impl<X1, X2> Describe for FeatureTransformer<X1, X2> {
    fn describe(&self) -> Result<Description, description::Error> {
        Ok(Value::Object(self.inner.describe_as("FeatureTransformer")?))
    }
}

/// Transforms the target side of supervised pairs, leaving features untouched
pub struct TargetTransformer<Y1, Y2> {
    inner: Transformer<Y1, Y2>,
}

impl<Y1, Y2> Clone for TargetTransformer<Y1, Y2> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Y1, Y2> TargetTransformer<Y1, Y2> {
    pub fn new<F>(name: &str, pack: Pack, f: F) -> Self
    where
        F: Fn(Y1, &Pack) -> Y2 + Send + Sync + 'static,
    {
        Self {
            inner: Transformer::new(name, pack, f),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn transform_target(&self, target: Y1) -> Y2 {
        self.inner.call(target)
    }

    pub fn as_transformer(&self) -> &Transformer<Y1, Y2> {
        &self.inner
    }
}

impl<Y1, Y2> TargetTransformer<Y1, Y2>
where
    Y1: Clone + Send + Sync + 'static,
    Y2: Clone + Send + Sync + 'static,
{
    pub fn map_to_dataset<X>(&self, dataset: &SupervisedDataset<X, Y1>) -> SupervisedDataset<X, Y2>
    where
        X: Clone + Send + Sync + 'static,
    {
        let inner = self.inner.clone();
        dataset.map_targets(move |target| inner.call(target))
    }
}

impl<Y1, Y2> Describe for TargetTransformer<Y1, Y2> {
    fn describe(&self) -> Result<Description, description::Error> {
        Ok(Value::Object(self.inner.describe_as("TargetTransformer")?))
    }
}

/// Transforms whole `(feature, target)` pairs
pub struct PairTransformer<X1, Y1, X2, Y2> {
    inner: Transformer<(X1, Y1), (X2, Y2)>,
}

impl<X1, Y1, X2, Y2> Clone for PairTransformer<X1, Y1, X2, Y2> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<X1, Y1, X2, Y2> PairTransformer<X1, Y1, X2, Y2> {
    pub fn new<F>(name: &str, pack: Pack, f: F) -> Self
    where
        F: Fn((X1, Y1), &Pack) -> (X2, Y2) + Send + Sync + 'static,
    {
        Self {
            inner: Transformer::new(name, pack, f),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn call(&self, feature: X1, target: Y1) -> (X2, Y2) {
        self.inner.call((feature, target))
    }
}

impl<X1, Y1, X2, Y2> PairTransformer<X1, Y1, X2, Y2>
where
    X1: Clone + Send + Sync + 'static,
    Y1: Clone + Send + Sync + 'static,
    X2: Clone + Send + Sync + 'static,
    Y2: Clone + Send + Sync + 'static,
{
    pub fn map_to_dataset(&self, dataset: &SupervisedDataset<X1, Y1>) -> SupervisedDataset<X2, Y2> {
        let inner = self.inner.clone();
        dataset.map(move |feature, target| inner.call((feature, target)))
    }
}

impl<X1, Y1, X2, Y2> Describe for PairTransformer<X1, Y1, X2, Y2> {
    fn describe(&self) -> Result<Description, description::Error> {
        Ok(Value::Object(self.inner.describe_as("PairTransformer")?))
    }
}

// ============================================================
// Keyed feature transformer
// ============================================================

type KeyFn<Y> = Arc<dyn Fn(&Y) -> Option<String> + Send + Sync>;

/// A feature transformer whose bound parameters depend on the target.
///
/// The key extracted from each target selects a pack. Keys without a pack of
/// their own fall back to the default pack; with no default the feature passes
/// through unchanged.
pub struct KeyedFeatureTransformer<X, Y> {
    name: String,
    f: TransformFn<X, X>,
    packs: BTreeMap<String, Pack>,
    default: Option<Pack>,
    key: KeyFn<Y>,
}

impl<X, Y> Clone for KeyedFeatureTransformer<X, Y> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            f: self.f.clone(),
            packs: self.packs.clone(),
            default: self.default.clone(),
            key: self.key.clone(),
        }
    }
}

impl<X, Y> KeyedFeatureTransformer<X, Y> {
    pub fn new<F, K>(name: &str, f: F, key: K) -> Self
    where
        F: Fn(X, &Pack) -> X + Send + Sync + 'static,
        K: Fn(&Y) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            f: Arc::new(f),
            packs: BTreeMap::new(),
            default: None,
            key: Arc::new(key),
        }
    }

    /// Builder method to bind `pack` for targets keyed `key`
    pub fn with_pack(mut self, key: &str, pack: Pack) -> Self {
        self.packs.insert(key.to_string(), pack);
        self
    }

    /// Builder method to bind `pack` for keys without a pack of their own
    pub fn with_default(mut self, pack: Pack) -> Self {
        self.default = Some(pack);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pack_for(&self, key: Option<&str>) -> Option<&Pack> {
        key.and_then(|key| self.packs.get(key))
            .or(self.default.as_ref())
    }

    pub fn call(&self, feature: X, target: &Y) -> X {
        let key = (self.key)(target);
        match self.pack_for(key.as_deref()) {
            Some(pack) => (self.f)(feature, pack),
            None => feature,
        }
    }
}

impl<X, Y> KeyedFeatureTransformer<X, Y>
where
    X: Clone + Send + Sync + 'static,
    Y: Clone + Send + Sync + 'static,
{
    pub fn map_to_dataset(&self, dataset: &SupervisedDataset<X, Y>) -> SupervisedDataset<X, Y> {
        let transformer = self.clone();
        dataset.map(move |feature, target| {
            let feature = transformer.call(feature, &target);
            (feature, target)
        })
    }
}

impl<X, Y> Describe for KeyedFeatureTransformer<X, Y> {
    fn describe(&self) -> Result<Description, description::Error> {
        let mut packer = Map::new();
        for (key, pack) in &self.packs {
            packer.insert(key.clone(), pack.describe()?);
        }

        let mut map = Map::new();
        map.insert("type".to_string(), "KeyedFeatureTransformer".into());
        map.insert("name".to_string(), self.name.as_str().into());
        map.insert("packer".to_string(), Value::Object(packer));
        map.insert("default".to_string(), self.default.describe()?);
        Ok(Value::Object(map))
    }
}

// ============================================================
// Per-key feature transformers
// ============================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error("No pack bound for key \"{key}\" and no default defined")]
    MissingPack { key: String },
}

type PackerFn = Arc<dyn Fn(&str) -> Pack + Send + Sync>;

#[derive(Clone)]
enum Fallback {
    Missing,
    Identity,
    Pack(Pack),
}

#[derive(Clone)]
enum Packer {
    Table {
        packs: BTreeMap<String, Pack>,
        fallback: Fallback,
    },
    Function {
        name: String,
        f: PackerFn,
    },
}

/// A family of named [`FeatureTransformer`]s sharing one function.
///
/// `get(key)` builds the transformer `"<name>_<key>"` with the pack bound for
/// `key`. Packs come either from a table (with an optional default, which may
/// be the identity) or from a named packer function.
pub struct FeatureTransformerMap<X> {
    name: String,
    f: TransformFn<X, X>,
    packer: Packer,
}

impl<X> Clone for FeatureTransformerMap<X> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            f: self.f.clone(),
            packer: self.packer.clone(),
        }
    }
}

impl<X: 'static> FeatureTransformerMap<X> {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(X, &Pack) -> X + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            f: Arc::new(f),
            packer: Packer::Table {
                packs: BTreeMap::new(),
                fallback: Fallback::Missing,
            },
        }
    }

    /// Builder method to bind `pack` for `key`; replaces a packer function
    pub fn with_pack(mut self, key: &str, pack: Pack) -> Self {
        if let Packer::Table { packs, .. } = &mut self.packer {
            packs.insert(key.to_string(), pack);
        } else {
            self.packer = Packer::Table {
                packs: BTreeMap::from([(key.to_string(), pack)]),
                fallback: Fallback::Missing,
            };
        }
        self
    }

    /// Builder method to bind `pack` for keys without a pack of their own
    pub fn with_default(self, pack: Pack) -> Self {
        self.with_fallback(Fallback::Pack(pack))
    }

    /// Builder method to pass features of unbound keys through unchanged
    pub fn with_identity_default(self) -> Self {
        self.with_fallback(Fallback::Identity)
    }

    /// Builder method to derive every key's pack from `f`
    pub fn with_packer<P>(mut self, packer_name: &str, f: P) -> Self
    where
        P: Fn(&str) -> Pack + Send + Sync + 'static,
    {
        self.packer = Packer::Function {
            name: packer_name.to_string(),
            f: Arc::new(f),
        };
        self
    }

    fn with_fallback(mut self, fallback: Fallback) -> Self {
        if let Packer::Table { fallback: current, .. } = &mut self.packer {
            *current = fallback;
        } else {
            self.packer = Packer::Table {
                packs: BTreeMap::new(),
                fallback,
            };
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys with a pack of their own
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let packs = match &self.packer {
            Packer::Table { packs, .. } => Some(packs.keys().map(String::as_str)),
            Packer::Function { .. } => None,
        };
        packs.into_iter().flatten()
    }

    pub fn get(&self, key: &str) -> Result<FeatureTransformer<X, X>, Error> {
        let name = format!("{}_{}", self.name, key);
        let pack = match &self.packer {
            Packer::Function { f, .. } => f(key),
            Packer::Table { packs, fallback } => match (packs.get(key), fallback) {
                (Some(pack), _) => pack.clone(),
                (None, Fallback::Pack(pack)) => pack.clone(),
                (None, Fallback::Identity) => {
                    return Ok(FeatureTransformer::new(&name, Pack::new(), |x: X, _: &Pack| x));
                }
                (None, Fallback::Missing) => {
                    return Err(Error::MissingPack {
                        key: key.to_string(),
                    });
                }
            },
        };

        let f = self.f.clone();
        Ok(FeatureTransformer::new(&name, pack, move |x, pack| f(x, pack)))
    }
}

impl<X> Describe for FeatureTransformerMap<X> {
    fn describe(&self) -> Result<Description, description::Error> {
        let mut map = Map::new();
        map.insert("type".to_string(), "FeatureTransformerMap".into());
        map.insert("name".to_string(), self.name.as_str().into());

        match &self.packer {
            Packer::Function { name, .. } => {
                map.insert("packer".to_string(), name.as_str().into());
            }
            Packer::Table { packs, fallback } => {
                let mut packer = Map::new();
                for (key, pack) in packs {
                    packer.insert(key.clone(), pack.describe()?);
                }
                map.insert("packer".to_string(), Value::Object(packer));
                match fallback {
                    Fallback::Missing => {}
                    Fallback::Identity => {
                        map.insert("default".to_string(), Value::Null);
                    }
                    Fallback::Pack(pack) => {
                        map.insert("default".to_string(), pack.describe()?);
                    }
                }
            }
        }

        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::description::{canonical_json, describe};
    use serde_json::json;

    fn scale(factor: f64) -> FeatureTransformer<f64, f64> {
        FeatureTransformer::new(
            "scale",
            Pack::new().kwarg("factor", &factor).unwrap(),
            |x, pack| x * pack.kwargs()["factor"].as_f64().unwrap_or(1.0),
        )
    }

    fn dataset() -> SupervisedDataset<f64, String> {
        vec![
            (1.0, "case-a".to_string()),
            (2.0, "case-b".to_string()),
            (3.0, "case-c".to_string()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn transformer_binds_pack() {
        let offset = Transformer::new(
            "offset",
            Pack::new().arg(&10_i64).unwrap(),
            |x: i64, pack| x + pack.args()[0].as_i64().unwrap_or(0),
        );
        assert_eq!(offset.call(5), 15);
        assert_eq!(
            offset
                .map_to_dataset(&SliceableDataset::from_vec(vec![1, 2]))
                .to_vec(),
            vec![11, 12]
        );
    }

    #[test]
    fn transformer_descriptions_are_stable() {
        // Behavior: descriptions depend on name and bound parameters only.
        let a = describe(&scale(2.0)).unwrap();
        let b = describe(&scale(2.0)).unwrap();
        let c = describe(&scale(3.0)).unwrap();

        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_ne!(a, c);
        assert_eq!(
            a,
            json!({
                "type": "FeatureTransformer",
                "name": "scale",
                "pack": {"args": [], "kwargs": {"factor": 2.0}}
            })
        );
    }

    #[test]
    fn feature_transformer_leaves_targets() {
        let scaled = scale(10.0).map_to_dataset(&dataset());

        let (feature, target) = scaled.get(1).unwrap();
        approx::assert_relative_eq!(feature, 20.0);
        assert_eq!(target, "case-b");
    }

    #[test]
    fn target_transformer_leaves_features() {
        let upper = TargetTransformer::new("upper", Pack::new(), |y: String, _| y.to_uppercase());
        let mapped = upper.map_to_dataset(&dataset());

        assert_eq!(mapped.targets().to_vec(), vec!["CASE-A", "CASE-B", "CASE-C"]);
        assert_eq!(mapped.features().to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(describe(&upper).unwrap()["type"], json!("TargetTransformer"));
    }

    #[test]
    fn pair_transformer_maps_both_sides() {
        let tag = PairTransformer::new("tag", Pack::new(), |(x, y): (f64, String), _| {
            (y.len() as f64, format!("{}:{}", y, x))
        });
        let mapped = tag.map_to_dataset(&dataset());

        let (feature, target) = mapped.get(0).unwrap();
        approx::assert_relative_eq!(feature, 6.0);
        assert_eq!(target, "case-a:1");
    }

    #[test]
    fn keyed_transformer_picks_pack_by_target() {
        let crop = KeyedFeatureTransformer::new(
            "shift",
            |x: f64, pack: &Pack| x + pack.kwargs()["by"].as_f64().unwrap_or(0.0),
            |y: &String| Some(y.clone()),
        )
        .with_pack("case-a", Pack::new().kwarg("by", &100.0).unwrap());

        let mapped = crop.map_to_dataset(&dataset());
        // case-b and case-c have no pack and no default, so they pass through
        assert_eq!(mapped.features().to_vec(), vec![101.0, 2.0, 3.0]);

        let with_default = crop.with_default(Pack::new().kwarg("by", &-1.0).unwrap());
        let mapped = with_default.map_to_dataset(&dataset());
        assert_eq!(mapped.features().to_vec(), vec![101.0, 1.0, 2.0]);

        let description = describe(&with_default).unwrap();
        assert_eq!(description["packer"]["case-a"]["kwargs"]["by"], json!(100.0));
        assert_eq!(description["default"]["kwargs"]["by"], json!(-1.0));
    }

    fn shift_map() -> FeatureTransformerMap<f64> {
        FeatureTransformerMap::new("shift", |x: f64, pack: &Pack| {
            x + pack.kwargs()["by"].as_f64().unwrap_or(0.0)
        })
        .with_pack("case-a", Pack::new().kwarg("by", &100.0).unwrap())
    }

    #[test]
    fn transformer_map_names_transformers_by_key() {
        let shift = shift_map().get("case-a").unwrap();
        assert_eq!(shift.name(), "shift_case-a");
        approx::assert_relative_eq!(shift.transform_feature(1.0), 101.0);
        assert_eq!(shift_map().keys().collect::<Vec<_>>(), vec!["case-a"]);
    }

    #[test]
    fn transformer_map_falls_back_per_default() {
        // Behavior: unbound keys fail without a default, use the default pack, or pass through.
        assert_eq!(
            shift_map().get("case-b").unwrap_err(),
            Error::MissingPack {
                key: "case-b".to_string()
            }
        );

        let with_default = shift_map().with_default(Pack::new().kwarg("by", &-1.0).unwrap());
        approx::assert_relative_eq!(with_default.get("case-b").unwrap().transform_feature(2.0), 1.0);

        let identity = shift_map().with_identity_default();
        let passthrough = identity.get("case-b").unwrap();
        approx::assert_relative_eq!(passthrough.transform_feature(2.0), 2.0);
        assert_eq!(passthrough.as_transformer().pack(), &Pack::new());

        let mapped = passthrough.map_to_dataset(&dataset());
        assert_eq!(mapped.features().to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn transformer_map_with_packer_function() {
        let scaled = FeatureTransformerMap::new("scale", |x: f64, pack: &Pack| {
            x * pack.args()[0].as_f64().unwrap_or(1.0)
        })
        .with_packer("by_key_length", |key| Pack::new().arg(&(key.len() as f64)).unwrap_or_default());

        approx::assert_relative_eq!(scaled.get("abc").unwrap().transform_feature(2.0), 6.0);
        assert_eq!(
            describe(&scaled).unwrap(),
            json!({"type": "FeatureTransformerMap", "name": "scale", "packer": "by_key_length"})
        );
    }

    #[test]
    fn transformer_map_descriptions_include_default() {
        let description = describe(&shift_map().with_identity_default()).unwrap();
        assert_eq!(description["packer"]["case-a"]["kwargs"]["by"], json!(100.0));
        assert_eq!(description["default"], Value::Null);

        let strict = describe(&shift_map()).unwrap();
        assert!(strict.get("default").is_none());
    }
}
