use crate::core::sliceable::SliceableDataset;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sidecar file naming the category an artifact was saved as
pub const METADATA_FILE: &str = "__boiling_learning_save_meta__.json";
/// Directory holding the category payload
pub const DATA_DIR: &str = "__data__";

pub const JSON_CATEGORY: &str = "json";
pub const F32_ARRAY_CATEGORY: &str = "f32-array";

const JSON_FILE: &str = "data.json";
const ARRAY_FILE: &str = "array.bin";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("No category is registered for type {type_name}")]
    UnsupportedCategory { type_name: &'static str },
    #[error("Category \"{0}\" is unknown or has no loader")]
    UnknownCategory(String),
    #[error("Corrupted metadata at {}: {reason}", path.display())]
    CorruptedMetadata { path: PathBuf, reason: String },
    #[error("Expected a value of type {expected}, found category \"{found}\"")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid payload: {0}")]
    Payload(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
        move |source| Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The underlying I/O error kind, if this is an I/O failure
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    #[serde(rename = "type")]
    category: String,
}

// ============================================================
// Capability interfaces
// ============================================================

/// Types with a structural, format-preserving on-disk form.
///
/// `serialize` writes into the artifact's payload directory, which already
/// exists; `deserialize` reads from it.
pub trait Serializable: Sized + 'static {
    const CATEGORY: &'static str;

    fn serialize(&self, data_dir: &Path) -> Result<(), Error>;
    fn deserialize(data_dir: &Path) -> Result<Self, Error>;
}

/// Types persisted through an opaque strategy of their own.
pub trait Saveable: Sized + 'static {
    const CATEGORY: &'static str;

    fn save(&self, data_dir: &Path) -> Result<(), Error>;
    fn load(data_dir: &Path) -> Result<Self, Error>;
}

impl Serializable for serde_json::Value {
    const CATEGORY: &'static str = JSON_CATEGORY;

    fn serialize(&self, data_dir: &Path) -> Result<(), Error> {
        let path = data_dir.join(JSON_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(&path, json).map_err(Error::io(&path))
    }

    fn deserialize(data_dir: &Path) -> Result<Self, Error> {
        let path = data_dir.join(JSON_FILE);
        let json = fs::read(&path).map_err(Error::io(&path))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Serializable for Vec<f32> {
    const CATEGORY: &'static str = F32_ARRAY_CATEGORY;

    fn serialize(&self, data_dir: &Path) -> Result<(), Error> {
        let path = data_dir.join(ARRAY_FILE);
        let bytes: Vec<u8> = self.iter().flat_map(|x| x.to_le_bytes()).collect();
        fs::write(&path, bytes).map_err(Error::io(&path))
    }

    fn deserialize(data_dir: &Path) -> Result<Self, Error> {
        let path = data_dir.join(ARRAY_FILE);
        let bytes = fs::read(&path).map_err(Error::io(&path))?;

        if bytes.len() % 4 != 0 {
            return Err(Error::Payload(
                format!("array payload of {} bytes is not a whole number of f32", bytes.len())
                    .into(),
            ));
        }

        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

// ============================================================
// Registry
// ============================================================

type AnyValue = Box<dyn Any>;
type SaveFn = Box<dyn Fn(&dyn Any, &Path) -> Result<(), Error> + Send + Sync>;
type LoadFn = Box<dyn Fn(&Path) -> Result<AnyValue, Error> + Send + Sync>;
type UpcastFn = Box<dyn Fn(&dyn Any) -> Result<AnyValue, Error> + Send + Sync>;
type DowncastFn = Box<dyn Fn(AnyValue) -> Result<AnyValue, Error> + Send + Sync>;

struct Handler {
    save: SaveFn,
    load: LoadFn,
}

struct Parent {
    name: String,
    upcast: UpcastFn,
    downcast: DowncastFn,
}

struct Category {
    type_name: &'static str,
    parent: Option<Parent>,
    serializer: Option<Handler>,
    saver: Option<Handler>,
}

/// Maps Rust types to named categories and persists values through them.
///
/// Every registered type has exactly one most-specific category. A category
/// may name a parent and convert to and from it, so a type without a handler
/// of its own is stored through the nearest ancestor that has one. At every
/// level a saver wins over a serializer.
#[derive(Default)]
pub struct Registry {
    categories: HashMap<String, Category>,
    by_type: HashMap<TypeId, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing the built-in `json` and `f32-array` categories
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register_serializable::<serde_json::Value>()
            .register_serializable::<Vec<f32>>();
        registry
    }

    pub fn register_serializable<T: Serializable>(&mut self) -> &mut Self {
        self.register_serializer::<T, _, _>(
            T::CATEGORY,
            <T as Serializable>::serialize,
            <T as Serializable>::deserialize,
        )
    }

    pub fn register_saveable<T: Saveable>(&mut self) -> &mut Self {
        self.register_saver::<T, _, _>(T::CATEGORY, <T as Saveable>::save, <T as Saveable>::load)
    }

    pub fn register_serializer<T, S, D>(&mut self, category: &str, serialize: S, deserialize: D) -> &mut Self
    where
        T: 'static,
        S: Fn(&T, &Path) -> Result<(), Error> + Send + Sync + 'static,
        D: Fn(&Path) -> Result<T, Error> + Send + Sync + 'static,
    {
        let handler = handler::<T, _, _>(category, serialize, deserialize);
        self.category_mut::<T>(category).serializer = Some(handler);
        self
    }

    pub fn register_saver<T, S, L>(&mut self, category: &str, save: S, load: L) -> &mut Self
    where
        T: 'static,
        S: Fn(&T, &Path) -> Result<(), Error> + Send + Sync + 'static,
        L: Fn(&Path) -> Result<T, Error> + Send + Sync + 'static,
    {
        let handler = handler::<T, _, _>(category, save, load);
        self.category_mut::<T>(category).saver = Some(handler);
        self
    }

    /// Declare `category` (for type `C`) a child of `parent` (for type `P`).
    ///
    /// `upcast` converts a child value into its parent representation before
    /// saving through an ancestor, `downcast` reverses it after loading.
    pub fn register_subcategory<C, P, U, D>(
        &mut self,
        category: &str,
        parent: &str,
        upcast: U,
        downcast: D,
    ) -> &mut Self
    where
        C: 'static,
        P: 'static,
        U: Fn(&C) -> Result<P, Error> + Send + Sync + 'static,
        D: Fn(P) -> Result<C, Error> + Send + Sync + 'static,
    {
        let child_name = category.to_string();
        let parent_name = parent.to_string();

        let upcast: UpcastFn = Box::new(move |value| {
            let value = downcast_ref::<C>(value, &child_name)?;
            Ok(Box::new(upcast(value)?) as AnyValue)
        });
        let downcast: DowncastFn = Box::new(move |value| {
            let value = downcast_box::<P>(value, &parent_name)?;
            Ok(Box::new(downcast(*value)?) as AnyValue)
        });

        self.category_mut::<C>(category).parent = Some(Parent {
            name: parent.to_string(),
            upcast,
            downcast,
        });
        self
    }

    /// Store `T` as a child of `json` through its serde representation
    pub fn register_json<T>(&mut self, category: &str) -> &mut Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.register_subcategory::<T, serde_json::Value, _, _>(
            category,
            JSON_CATEGORY,
            |value| Ok(serde_json::to_value(value)?),
            |json| Ok(serde_json::from_value(json)?),
        )
    }

    /// Store `SliceableDataset<T>` as a child of `json` by materializing it
    pub fn register_dataset<T>(&mut self, category: &str) -> &mut Self
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.register_subcategory::<SliceableDataset<T>, serde_json::Value, _, _>(
            category,
            JSON_CATEGORY,
            |dataset| Ok(serde_json::to_value(dataset.to_vec())?),
            |json| Ok(SliceableDataset::from_vec(serde_json::from_value(json)?)),
        )
    }

    /// Most specific category registered for `T`
    pub fn category_of<T: 'static>(&self) -> Option<&str> {
        self.by_type.get(&TypeId::of::<T>()).map(String::as_str)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn save<T: 'static>(&self, value: &T, path: &Path) -> Result<(), Error> {
        let category = self
            .category_of::<T>()
            .ok_or(Error::UnsupportedCategory {
                type_name: type_name::<T>(),
            })?;

        let staging = sibling_path(path, "partial");
        let result = self.write_artifact(category, value, &staging).and_then(|handled_by| {
            replace(&staging, path)?;
            Ok(handled_by)
        });

        match result {
            Ok(handled_by) => {
                tracing::debug!(
                    path = %path.display(),
                    category,
                    handled_by,
                    "Saved artifact"
                );
                Ok(())
            }
            Err(err) => {
                if staging.exists() {
                    // cleanup failures are secondary to the save error
                    let _ = fs::remove_dir_all(&staging);
                }
                Err(err)
            }
        }
    }

    pub fn load<T: 'static>(&self, path: &Path) -> Result<T, Error> {
        let category = read_category(path)?;
        let value = self.load_as(&category, &path.join(DATA_DIR))?;

        tracing::debug!(path = %path.display(), category, "Loaded artifact");

        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| Error::TypeMismatch {
                expected: type_name::<T>(),
                found: category,
            })
    }

    fn write_artifact<'a>(&'a self, category: &'a str, value: &dyn Any, staging: &Path) -> Result<&'a str, Error> {
        let data_dir = staging.join(DATA_DIR);
        fs::create_dir_all(&data_dir).map_err(Error::io(&data_dir))?;

        let handled_by = self.save_as(category, value, &data_dir)?;

        let metadata_path = staging.join(METADATA_FILE);
        let metadata = serde_json::to_vec(&Metadata {
            category: category.to_string(),
        })?;
        fs::write(&metadata_path, metadata).map_err(Error::io(&metadata_path))?;

        Ok(handled_by)
    }

    fn save_as<'a>(&'a self, category: &'a str, value: &dyn Any, data_dir: &Path) -> Result<&'a str, Error> {
        let entry = self.categories.get(category).ok_or(Error::UnsupportedCategory {
            type_name: "<unregistered>",
        })?;

        if let Some(handler) = entry.saver.as_ref().or(entry.serializer.as_ref()) {
            (handler.save)(value, data_dir)?;
            return Ok(category);
        }

        match &entry.parent {
            Some(parent) => {
                let upcast = (parent.upcast)(value)?;
                self.save_as(&parent.name, &*upcast, data_dir)
            }
            None => Err(Error::UnsupportedCategory {
                type_name: entry.type_name,
            }),
        }
    }

    fn load_as(&self, category: &str, data_dir: &Path) -> Result<AnyValue, Error> {
        let entry = self
            .categories
            .get(category)
            .ok_or_else(|| Error::UnknownCategory(category.to_string()))?;

        if let Some(handler) = entry.saver.as_ref().or(entry.serializer.as_ref()) {
            return (handler.load)(data_dir);
        }

        match &entry.parent {
            Some(parent) => {
                let value = self.load_as(&parent.name, data_dir)?;
                (parent.downcast)(value)
            }
            None => Err(Error::UnknownCategory(category.to_string())),
        }
    }

    fn category_mut<T: 'static>(&mut self, category: &str) -> &mut Category {
        self.by_type.insert(TypeId::of::<T>(), category.to_string());
        self.categories
            .entry(category.to_string())
            .or_insert_with(|| Category {
                type_name: type_name::<T>(),
                parent: None,
                serializer: None,
                saver: None,
            })
    }
}

/// Category recorded in the sidecar of the artifact at `path`.
pub fn read_category(path: &Path) -> Result<String, Error> {
    let metadata = fs::metadata(path).map_err(Error::io(path))?;
    if !metadata.is_dir() {
        return Err(Error::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotADirectory, "artifact path is not a directory"),
        });
    }

    let metadata_path = path.join(METADATA_FILE);
    let bytes = match fs::read(&metadata_path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(Error::CorruptedMetadata {
                path: metadata_path,
                reason: "metadata file is missing".to_string(),
            });
        }
        Err(err) => return Err(Error::io(&metadata_path)(err)),
    };

    let metadata: Metadata =
        serde_json::from_slice(&bytes).map_err(|err| Error::CorruptedMetadata {
            path: metadata_path,
            reason: err.to_string(),
        })?;

    Ok(metadata.category)
}

fn handler<T, S, L>(category: &str, save: S, load: L) -> Handler
where
    T: 'static,
    S: Fn(&T, &Path) -> Result<(), Error> + Send + Sync + 'static,
    L: Fn(&Path) -> Result<T, Error> + Send + Sync + 'static,
{
    let name = category.to_string();
    Handler {
        save: Box::new(move |value, data_dir| save(downcast_ref::<T>(value, &name)?, data_dir)),
        load: Box::new(move |data_dir| Ok(Box::new(load(data_dir)?) as AnyValue)),
    }
}

fn downcast_ref<'a, T: 'static>(value: &'a dyn Any, category: &str) -> Result<&'a T, Error> {
    value.downcast_ref::<T>().ok_or_else(|| Error::TypeMismatch {
        expected: type_name::<T>(),
        found: category.to_string(),
    })
}

fn downcast_box<T: 'static>(value: AnyValue, category: &str) -> Result<Box<T>, Error> {
    value.downcast::<T>().map_err(|_| Error::TypeMismatch {
        expected: type_name::<T>(),
        found: category.to_string(),
    })
}

/// Hidden, uniquely named sibling of `path`
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.{}", name, uuid::Uuid::new_v4(), suffix))
}

/// Move the staged artifact into place, replacing whatever was there.
///
/// An existing artifact is moved aside first and only removed once the staged
/// one is in place; if that move fails it is restored.
fn replace(staging: &Path, path: &Path) -> Result<(), Error> {
    let previous = match fs::symlink_metadata(path) {
        Ok(existing) => {
            let aside = sibling_path(path, "previous");
            fs::rename(path, &aside).map_err(Error::io(path))?;
            Some((aside, existing.is_dir()))
        }
        Err(_) => None,
    };

    if let Err(source) = fs::rename(staging, path) {
        if let Some((aside, _)) = &previous {
            if let Err(err) = fs::rename(aside, path) {
                tracing::warn!(
                    path = %path.display(),
                    aside = %aside.display(),
                    error = %err,
                    "Failed to restore previous artifact"
                );
            }
        }
        return Err(Error::io(path)(source));
    }

    if let Some((aside, is_dir)) = previous {
        let removed = if is_dir {
            fs::remove_dir_all(&aside)
        } else {
            fs::remove_file(&aside)
        };
        if let Err(err) = removed {
            tracing::warn!(aside = %aside.display(), error = %err, "Failed to remove previous artifact");
        }
    }

    Ok(())
}
