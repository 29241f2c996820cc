use crate::core::allocator::{self, Allocator};
use crate::core::description::{self, Pack, ToPack};
use crate::core::storage::{self, Registry};
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// I/O error kinds treated as a cache miss by default
pub const DEFAULT_MISS_KINDS: [io::ErrorKind; 2] =
    [io::ErrorKind::NotFound, io::ErrorKind::NotADirectory];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] storage::Error),
    #[error("Allocation error: {0}")]
    Allocation(#[from] allocator::Error),
    #[error("Description error: {0}")]
    Description(#[from] description::Error),
    #[error("Creator failed: {0}")]
    Creator(#[source] BoxError),
}

/// Persists and restores values of type `R` at artifact paths.
pub trait Store<R>: Send + Sync {
    fn save(&self, value: &R, path: &Path) -> Result<(), storage::Error>;
    fn load(&self, path: &Path) -> Result<R, storage::Error>;
}

impl<R: 'static> Store<R> for Registry {
    fn save(&self, value: &R, path: &Path) -> Result<(), storage::Error> {
        Registry::save(self, value, path)
    }

    fn load(&self, path: &Path) -> Result<R, storage::Error> {
        Registry::load(self, path)
    }
}

/// Load-or-create for a single artifact path.
pub struct Provider<R> {
    store: Arc<dyn Store<R>>,
    miss_kinds: Vec<io::ErrorKind>,
    autosave: bool,
}

impl<R> Clone for Provider<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            miss_kinds: self.miss_kinds.clone(),
            autosave: self.autosave,
        }
    }
}

impl<R> Provider<R> {
    pub fn new(store: Arc<dyn Store<R>>) -> Self {
        Self {
            store,
            miss_kinds: DEFAULT_MISS_KINDS.to_vec(),
            autosave: true,
        }
    }

    /// Builder method to replace the I/O error kinds treated as a miss
    pub fn with_miss_kinds(mut self, miss_kinds: impl IntoIterator<Item = io::ErrorKind>) -> Self {
        self.miss_kinds = miss_kinds.into_iter().collect();
        self
    }

    /// Builder method to toggle persisting freshly created values
    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn autosave(&self) -> bool {
        self.autosave
    }

    pub fn miss_kinds(&self) -> &[io::ErrorKind] {
        &self.miss_kinds
    }

    /// Load the artifact at `path`, or create it with `creator` on a miss.
    ///
    /// Only load failures whose I/O kind is whitelisted count as a miss; every
    /// other failure propagates and `creator` is not called. A failing creator
    /// persists nothing.
    pub fn provide<F, E>(&self, creator: F, path: &Path) -> Result<R, Error>
    where
        F: FnOnce() -> Result<R, E>,
        E: Into<BoxError>,
    {
        match self.store.load(path) {
            Ok(value) => {
                tracing::debug!(path = %path.display(), "Cache hit");
                Ok(value)
            }
            Err(err) if self.is_miss(&err) => {
                tracing::info!(path = %path.display(), reason = %err, "Cache miss, creating artifact");

                let value = creator().map_err(|err| Error::Creator(err.into()))?;
                if self.autosave {
                    self.store.save(&value, path)?;
                }
                Ok(value)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn is_miss(&self, err: &storage::Error) -> bool {
        err.io_kind()
            .is_some_and(|kind| self.miss_kinds.contains(&kind))
    }
}

/// Content-addressed compute-or-load cache.
///
/// Arguments are described into a [`Pack`], the pack is allocated a stable
/// path, and the value at that path is provided through a [`Provider`].
pub struct Cacher<R> {
    allocator: Arc<dyn Allocator>,
    provider: Provider<R>,
}

impl<R> Clone for Cacher<R> {
    fn clone(&self) -> Self {
        Self {
            allocator: self.allocator.clone(),
            provider: self.provider.clone(),
        }
    }
}

impl<R> Cacher<R> {
    pub fn new(allocator: Arc<dyn Allocator>, store: Arc<dyn Store<R>>) -> Self {
        Self {
            allocator,
            provider: Provider::new(store),
        }
    }

    pub fn with_miss_kinds(mut self, miss_kinds: impl IntoIterator<Item = io::ErrorKind>) -> Self {
        self.provider = self.provider.with_miss_kinds(miss_kinds);
        self
    }

    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.provider = self.provider.with_autosave(autosave);
        self
    }

    pub fn provider(&self) -> &Provider<R> {
        &self.provider
    }

    pub fn allocate(&self, pack: &Pack) -> Result<PathBuf, Error> {
        tracing::debug!(?pack, "Allocating path");
        let path = self.allocator.allocate_pack(pack)?;
        tracing::debug!(path = %path.display(), "Allocated path");
        Ok(path)
    }

    pub fn provide<F, E>(&self, creator: F, path: &Path) -> Result<R, Error>
    where
        F: FnOnce() -> Result<R, E>,
        E: Into<BoxError>,
    {
        self.provider.provide(creator, path)
    }

    /// Wrap `function` so its results are cached by argument description.
    pub fn decorate<A, E, F>(&self, function: F) -> CachedFunction<A, R, F>
    where
        A: ToPack,
        F: Fn(A) -> Result<R, E>,
        E: Into<BoxError>,
    {
        CachedFunction {
            function,
            cacher: self.clone(),
            _args: PhantomData,
        }
    }
}

pub struct CachedFunction<A, R, F> {
    function: F,
    cacher: Cacher<R>,
    _args: PhantomData<fn(A)>,
}

impl<A, R, F> fmt::Debug for CachedFunction<A, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFunction")
            .field("function", &std::any::type_name::<F>())
            .finish_non_exhaustive()
    }
}

impl<A, R, E, F> CachedFunction<A, R, F>
where
    A: ToPack,
    F: Fn(A) -> Result<R, E>,
    E: Into<BoxError>,
{
    pub fn call(&self, args: A) -> Result<R, Error> {
        let path = self.allocate(&args)?;
        self.cacher.provide(|| (self.function)(args), &path)
    }

    /// Path the result for `args` is stored at
    pub fn allocate(&self, args: &A) -> Result<PathBuf, Error> {
        self.cacher.allocate(&args.to_pack()?)
    }

    pub fn cacher(&self) -> &Cacher<R> {
        &self.cacher
    }
}
