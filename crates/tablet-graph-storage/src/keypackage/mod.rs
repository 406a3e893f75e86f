//! Key packages: the on-disk layout variants.
//!
//! A key package bundles the four pieces that together define one layout:
//! element⇄key converter, range factory, iterator-settings factory and the
//! bloom key functor. Two interchangeable layouts exist:
//!
//! - **byte-entity** (the reference layout): entity rows carry a trailing
//!   `delimiter ‖ 0x01` marker so entity and edge rows for one vertex are
//!   distinguishable purely from the row bytes.
//! - **classic**: entity rows are the bare escaped vertex.
//!
//! Edge rows are identical in both: `esc(first) ‖ 0x00 ‖ esc(other) ‖ 0x00 ‖
//! marker`, written twice per edge (source-first and destination-first) so a
//! single range scan per seed vertex finds every touching edge.
//!
//! Layouts are resolved through an explicit identifier registry, never
//! dynamically loaded.

pub mod converter;
pub mod escape;
pub mod ranges;
pub mod settings;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tablet_graph_core::schema::Schema;

use crate::error::{CodecError, ConfigError};

pub use converter::ElementConverter;
pub use ranges::RangeFactory;
pub use settings::IteratorSettingsFactory;

/// Row marker byte for an entity row (byte-entity layout).
pub const ENTITY_MARKER: u8 = 0x01;

/// Trailing marker of an edge row: directedness plus which end came first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeMarker {
    DirectedSourceFirst,
    DirectedDestinationFirst,
    Undirected,
}

impl EdgeMarker {
    pub const fn byte(&self) -> u8 {
        match self {
            EdgeMarker::DirectedSourceFirst => 0x02,
            EdgeMarker::DirectedDestinationFirst => 0x03,
            EdgeMarker::Undirected => 0x04,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            0x02 => Ok(EdgeMarker::DirectedSourceFirst),
            0x03 => Ok(EdgeMarker::DirectedDestinationFirst),
            0x04 => Ok(EdgeMarker::Undirected),
            other => Err(CodecError::malformed_key(format!(
                "unknown edge marker byte {other:#04x}"
            ))),
        }
    }

    pub fn directed(&self) -> bool {
        !matches!(self, EdgeMarker::Undirected)
    }
}

/// What a row's bytes describe, with its escaped vertex part(s).
#[derive(Debug, PartialEq, Eq)]
pub enum RowKind<'a> {
    Entity { vertex: &'a [u8] },
    Edge {
        first: &'a [u8],
        second: &'a [u8],
        marker: EdgeMarker,
    },
}

/// The two known layouts. Carried inside iterator configuration so
/// server-side iterators reconstruct the right codec.
///
/// # Example
/// ```rust
/// use tablet_graph_storage::LayoutKind;
///
/// assert_eq!(LayoutKind::from_id("classic").unwrap(), LayoutKind::Classic);
/// assert!(LayoutKind::from_id("com.example.Custom").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutKind {
    /// The reference layout; entity rows carry a trailing marker.
    ByteEntity,
    /// Entity rows are the bare escaped vertex.
    Classic,
}

impl LayoutKind {
    pub const BYTE_ENTITY_ID: &'static str = "byte-entity";
    pub const CLASSIC_ID: &'static str = "classic";

    pub fn id(&self) -> &'static str {
        match self {
            LayoutKind::ByteEntity => Self::BYTE_ENTITY_ID,
            LayoutKind::Classic => Self::CLASSIC_ID,
        }
    }

    /// Registry lookup by identifier string.
    pub fn from_id(id: &str) -> Result<Self, ConfigError> {
        match id {
            Self::BYTE_ENTITY_ID => Ok(LayoutKind::ByteEntity),
            Self::CLASSIC_ID => Ok(LayoutKind::Classic),
            other => Err(ConfigError::UnknownKeyPackage {
                id: other.to_string(),
                known: format!("{}, {}", Self::BYTE_ENTITY_ID, Self::CLASSIC_ID),
            }),
        }
    }
}

/// Extracts the bloom-filter key from a stored row: the escaped vertex
/// prefix, i.e. the bytes every key touching that vertex shares.
#[derive(Debug, Clone, Copy)]
pub struct KeyFunctor {
    layout: LayoutKind,
}

impl KeyFunctor {
    pub fn new(layout: LayoutKind) -> Self {
        KeyFunctor { layout }
    }

    pub fn vertex_prefix<'a>(&self, row: &'a [u8]) -> &'a [u8] {
        match row.iter().position(|&b| b == escape::DELIMITER) {
            Some(pos) => &row[..pos],
            // A classic-layout entity row is the bare escaped vertex.
            None => row,
        }
    }

    pub fn layout(&self) -> LayoutKind {
        self.layout
    }
}

/// One layout's full bundle, bound to a schema.
///
/// The store resolves one of these at initialisation and every read and
/// write flows through its four components: the converter (element⇄key),
/// the range factory (seed⇄row ranges), the iterator-settings factory
/// (view⇄server-side stack) and the key functor (row⇄bloom key).
///
/// # Example
/// ```rust
/// use std::sync::Arc;
///
/// use tablet_graph_core::schema::Schema;
/// use tablet_graph_storage::KeyPackage;
///
/// let schema = Arc::new(Schema::default());
/// let package = KeyPackage::create("byte-entity", schema).unwrap();
/// assert_eq!(package.layout().id(), "byte-entity");
/// ```
pub struct KeyPackage {
    layout: LayoutKind,
    converter: Arc<ElementConverter>,
    ranges: RangeFactory,
    settings: IteratorSettingsFactory,
    functor: KeyFunctor,
}

impl KeyPackage {
    /// Resolves a layout identifier and binds the bundle to the schema.
    ///
    /// # Errors
    /// [`ConfigError::UnknownKeyPackage`] when the identifier is not in the
    /// registry; the message lists the known identifiers.
    pub fn create(id: &str, schema: Arc<Schema>) -> Result<KeyPackage, ConfigError> {
        let layout = LayoutKind::from_id(id)?;
        Ok(KeyPackage::for_layout(layout, schema))
    }

    pub fn for_layout(layout: LayoutKind, schema: Arc<Schema>) -> KeyPackage {
        let converter = Arc::new(ElementConverter::new(layout, Arc::clone(&schema)));
        KeyPackage {
            layout,
            ranges: RangeFactory::new(layout, schema.vertex_serialiser()),
            settings: IteratorSettingsFactory::new(layout, schema),
            functor: KeyFunctor::new(layout),
            converter,
        }
    }

    pub fn layout(&self) -> LayoutKind {
        self.layout
    }

    pub fn converter(&self) -> &Arc<ElementConverter> {
        &self.converter
    }

    pub fn range_factory(&self) -> &RangeFactory {
        &self.ranges
    }

    pub fn iterator_settings(&self) -> &IteratorSettingsFactory {
        &self.settings
    }

    pub fn key_functor(&self) -> &KeyFunctor {
        &self.functor
    }
}
