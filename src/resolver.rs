use crate::error::ResolveError;
use crate::value::{ClassHandle, ClassKind, FastMap};
use lru::LruCache;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Module that bare names resolve against.
pub const BUILTIN_MODULE: &str = "__builtin__";

const BUILTIN_NAMES: &[&str] = &[
    "object", "set", "frozenset", "dict", "list", "tuple", "str", "unicode", "int", "long",
    "float", "bool", "buffer",
];

/// A host-provided module namespace.
pub trait Namespace: Send + Sync {
    /// Fetch `attr` from `module`, `None` when either does not exist.
    fn lookup(&self, module: &str, attr: &str) -> Option<ClassHandle>;
}

/// Last-resort resolver, called with `(module, attribute)` for dotted names
/// and `(name, name)` for bare ones.
pub type FallbackResolver = dyn Fn(&str, &str) -> Result<ClassHandle, String> + Send + Sync;

// ─── GlobalResolver ─────────────────────────────────────────────────────────

/// Resolves global names to class handles.
///
/// Lookups go cache, internal namespace, host namespace, then the fallback
/// resolver. Successful lookups are memoized. Concurrent decoders may race on
/// a miss and resolve the same name twice; both store the same handle.
pub struct GlobalResolver {
    cache: RwLock<LruCache<SmolStr, ClassHandle>>,
    internal: FastMap<SmolStr, ClassHandle>,
    host: Option<Arc<dyn Namespace>>,
    fallback: RwLock<Option<Arc<FallbackResolver>>>,
}

impl std::fmt::Debug for GlobalResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalResolver")
            .field("cached", &self.cache.read().len())
            .field("internal", &self.internal.len())
            .field("host", &self.host.is_some())
            .field("fallback", &self.fallback.read().is_some())
            .finish()
    }
}

impl GlobalResolver {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let mut resolver = Self {
            cache: RwLock::new(LruCache::new(capacity)),
            internal: FastMap::default(),
            host: None,
            fallback: RwLock::new(None),
        };
        resolver.register("blue.DBRowDescriptor", ClassKind::RowDescriptor);
        resolver.register("blue.DBRow", ClassKind::Row);
        for name in BUILTIN_NAMES {
            resolver.register(format!("{BUILTIN_MODULE}.{name}"), ClassKind::Builtin);
        }
        resolver
    }

    /// Attach a general host namespace consulted after the internal one.
    pub fn with_namespace(mut self, namespace: Arc<dyn Namespace>) -> Self {
        self.host = Some(namespace);
        self
    }

    /// Add a name to the internal namespace.
    pub fn register(&mut self, path: impl Into<SmolStr>, kind: ClassKind) {
        let path = path.into();
        self.internal.insert(path.clone(), ClassHandle::new(path, kind));
    }

    pub fn register_fallback_resolver<F>(&self, resolver: F)
    where
        F: Fn(&str, &str) -> Result<ClassHandle, String> + Send + Sync + 'static,
    {
        *self.fallback.write() = Some(Arc::new(resolver));
    }

    pub fn clear_fallback_resolver(&self) {
        *self.fallback.write() = None;
    }

    /// Number of memoized names.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    pub fn resolve(&self, name: &str) -> Result<ClassHandle, ResolveError> {
        if let Some(hit) = self.cache.read().peek(name) {
            return Ok(hit.clone());
        }

        let handle = match self.lookup(name) {
            Some(handle) => handle,
            None => self.fall_back(name)?,
        };

        tracing::debug!(name, path = handle.path(), "resolver cache miss");
        self.cache.write().put(SmolStr::new(name), handle.clone());
        Ok(handle)
    }

    fn lookup(&self, name: &str) -> Option<ClassHandle> {
        match name.split_once('.') {
            Some((module, attr)) => self
                .internal
                .get(name)
                .cloned()
                .or_else(|| self.host.as_ref()?.lookup(module, attr)),
            None => self
                .internal
                .get(format!("{BUILTIN_MODULE}.{name}").as_str())
                .cloned()
                .or_else(|| self.host.as_ref()?.lookup(BUILTIN_MODULE, name)),
        }
    }

    fn fall_back(&self, name: &str) -> Result<ClassHandle, ResolveError> {
        let Some(fallback) = self.fallback.read().clone() else {
            return Err(ResolveError::NoResolverConfigured(name.into()));
        };
        // the module is everything before the first dot
        let (module, attr) = name.split_once('.').unwrap_or((name, name));
        fallback(module, attr).map_err(|reason| {
            tracing::debug!(name, %reason, "fallback resolver failed");
            ResolveError::NameResolutionFailed {
                name: name.into(),
                reason,
            }
        })
    }
}

impl Default for GlobalResolver {
    fn default() -> Self {
        Self::new(crate::marshal::MarshalConfig::default().resolver_cache_capacity)
    }
}
