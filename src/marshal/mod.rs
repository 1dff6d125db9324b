//! The marshal stream decoder.
//!
//! A decode runs as a single pass over the token area with an explicit frame
//! stack. Nothing is shared between decode calls except the [`Decoder`]'s
//! resolver cache.

mod decoder;
mod frame;
pub mod graph;
mod reader;
mod shared;


pub use graph::{MATERIALIZE_LIMIT, MATERIALIZE_MAX_DEPTH, ObjectGraph};
pub use shared::SharedTable;

use crate::builder::{DefaultBuilder, ObjectBuilder};
use crate::error::MarshalError;
use crate::legacy::LegacyDecoder;
use crate::resolver::{GlobalResolver, Namespace};
use crate::string_table::StringTable;
use crate::types::{HEADER_SIZE, MIN_STREAM_SIZE, PROTOCOL_ID};
use decoder::Session;
use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};

// ─── Config ─────────────────────────────────────────────────────────────────

/// Configuration for [`Decoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalConfig {
    /// Whether `CHECKSUM` tokens are verified.
    ///
    /// Default: `true`.
    pub verify_checksum: bool,
    /// Maximum number of global names memoized by the resolver.
    ///
    /// Default: 4096 names.
    pub resolver_cache_capacity: NonZeroUsize,
}

const DEFAULT_RESOLVER_CACHE: NonZeroUsize = match NonZeroUsize::new(4096) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            resolver_cache_capacity: DEFAULT_RESOLVER_CACHE,
        }
    }
}

// ─── Decoder ────────────────────────────────────────────────────────────────

/// Decodes marshal streams into [`ObjectGraph`]s.
///
/// A `Decoder` is `Send + Sync`; independent buffers may be decoded from
/// several threads at once.
pub struct Decoder {
    config: MarshalConfig,
    pub(crate) resolver: Arc<GlobalResolver>,
    pub(crate) strings: Arc<StringTable>,
    pub(crate) builder: Arc<dyn ObjectBuilder>,
    legacy: Option<Arc<dyn LegacyDecoder>>,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("strings", &self.strings.len())
            .field("legacy", &self.legacy.is_some())
            .finish()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        DecoderBuilder::default().build()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> DecoderBuilder {
        DecoderBuilder::default()
    }

    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    pub fn resolver(&self) -> &GlobalResolver {
        &self.resolver
    }

    pub fn string_table(&self) -> &StringTable {
        &self.strings
    }

    /// Decode with the configured checksum policy.
    pub fn decode(&self, buffer: &[u8]) -> Result<ObjectGraph, MarshalError> {
        self.decode_with_options(buffer, self.config.verify_checksum)
    }

    pub fn decode_with_options(
        &self,
        buffer: &[u8],
        verify_checksum: bool,
    ) -> Result<ObjectGraph, MarshalError> {
        if buffer.len() < MIN_STREAM_SIZE || buffer[0] != PROTOCOL_ID {
            return self.decode_legacy(buffer);
        }

        let map = read_shared_map(buffer)?;
        let end = buffer.len() - map.len() * 4;
        tracing::debug!(
            size = buffer.len(),
            shared = map.len(),
            verify_checksum,
            "decoding marshal stream"
        );

        let session = Session::new(
            self,
            buffer,
            HEADER_SIZE,
            end,
            SharedTable::new(map),
            verify_checksum,
        );
        match session.run() {
            Ok((root, shared)) => Ok(ObjectGraph::new(root, shared.into_slots())),
            Err(e) => {
                tracing::debug!(error = %e, "marshal decode failed");
                Err(e)
            }
        }
    }

    fn decode_legacy(&self, buffer: &[u8]) -> Result<ObjectGraph, MarshalError> {
        let Some(legacy) = &self.legacy else {
            return Err(MarshalError::NoLegacyDecoder);
        };
        tracing::debug!(size = buffer.len(), "handing stream to legacy decoder");
        let root = legacy
            .decode_legacy(buffer, 0)
            .map_err(MarshalError::Legacy)?;
        Ok(ObjectGraph::new(root, Vec::new()))
    }
}

/// Parse and validate the shared index map at the tail of `buffer`.
///
/// `buffer` is known to be at least [`MIN_STREAM_SIZE`] bytes.
fn read_shared_map(buffer: &[u8]) -> Result<Vec<u32>, MarshalError> {
    let size = buffer.len();
    let count = i32::from_le_bytes([buffer[1], buffer[2], buffer[3], buffer[4]]);
    let malformed = |reason| MarshalError::MalformedSharedMap {
        reason,
        count: i64::from(count),
        size,
    };

    let Ok(count) = usize::try_from(count) else {
        return Err(malformed("negative object count"));
    };
    let map_bytes = count
        .checked_mul(4)
        .filter(|n| HEADER_SIZE + n <= size)
        .ok_or_else(|| malformed("map exceeds stream"))?;

    buffer[size - map_bytes..]
        .chunks_exact(4)
        .map(|raw| {
            let index = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            match u32::try_from(index) {
                Ok(i) if i >= 1 && (i as usize) <= count => Ok(i),
                _ => Err(malformed("index out of range")),
            }
        })
        .collect()
}

// ─── DecoderBuilder ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct DecoderBuilder {
    config: MarshalConfig,
    resolver: Option<Arc<GlobalResolver>>,
    namespace: Option<Arc<dyn Namespace>>,
    strings: Option<Arc<StringTable>>,
    builder: Option<Arc<dyn ObjectBuilder>>,
    legacy: Option<Arc<dyn LegacyDecoder>>,
}

impl DecoderBuilder {
    pub fn config(mut self, config: MarshalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn verify_checksum(mut self, verify: bool) -> Self {
        self.config.verify_checksum = verify;
        self
    }

    /// Share a resolver between decoders. Takes precedence over
    /// [`DecoderBuilder::namespace`] and the configured cache capacity.
    pub fn resolver(mut self, resolver: Arc<GlobalResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Host namespace for the resolver this builder creates.
    pub fn namespace(mut self, namespace: Arc<dyn Namespace>) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn string_table(mut self, strings: impl Into<Arc<StringTable>>) -> Self {
        self.strings = Some(strings.into());
        self
    }

    pub fn object_builder(mut self, builder: impl ObjectBuilder + 'static) -> Self {
        self.builder = Some(Arc::new(builder));
        self
    }

    pub fn legacy_decoder(mut self, legacy: impl LegacyDecoder + 'static) -> Self {
        self.legacy = Some(Arc::new(legacy));
        self
    }

    pub fn build(self) -> Decoder {
        let config = self.config;
        let namespace = self.namespace;
        let resolver = self.resolver.unwrap_or_else(|| {
            let resolver = GlobalResolver::new(config.resolver_cache_capacity);
            Arc::new(match namespace {
                Some(ns) => resolver.with_namespace(ns),
                None => resolver,
            })
        });
        Decoder {
            config,
            resolver,
            strings: self.strings.unwrap_or_default(),
            builder: self.builder.unwrap_or_else(|| Arc::new(DefaultBuilder)),
            legacy: self.legacy,
        }
    }
}

// ─── Free function ──────────────────────────────────────────────────────────

/// Decode with a process-wide default [`Decoder`].
///
/// The default decoder carries no host hooks. Globals outside the built-in
/// namespace fail to resolve, and a buffer without the protocol marker
/// fails with [`MarshalError::NoLegacyDecoder`]. Build a [`Decoder`] to
/// supply them.
pub fn decode(buffer: &[u8], verify_checksum: bool) -> Result<ObjectGraph, MarshalError> {
    static DEFAULT: OnceLock<Decoder> = OnceLock::new();
    DEFAULT
        .get_or_init(Decoder::default)
        .decode_with_options(buffer, verify_checksum)
}
