//! Fixed table definitions for the store engine.
//!
//! The store has exactly 5 tables, all known at compile time.
//! This enables type-safe access and eliminates dynamic table lookup overhead.

use crate::types::KeyType;

/// Compile-time table identifier. All tables are statically defined; dynamic creation is not
/// supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TableId {
    /// Target rows: {target_id} -> postcard `TargetData`
    Targets = 0,

    /// Query index: {canonical_id}{target_id} -> empty marker
    TargetQueries = 1,

    /// Forward references: {target_id}{document_path} -> empty marker
    TargetDocuments = 2,

    /// Reverse references and sentinels: {document_path}{target_id} -> empty or sequence number
    DocumentTargets = 3,

    /// Singleton records keyed by name (the target metadata record).
    TargetGlobal = 4,
}

impl TableId {
    /// Total number of tables.
    pub const COUNT: usize = 5;

    /// Returns the key type for this table.
    #[inline]
    pub const fn key_type(self) -> KeyType {
        match self {
            Self::TargetGlobal => KeyType::Str,
            Self::Targets | Self::TargetQueries | Self::TargetDocuments | Self::DocumentTargets => {
                KeyType::Bytes
            },
        }
    }

    /// Returns the human-readable name for this table.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Targets => "targets",
            Self::TargetQueries => "target_queries",
            Self::TargetDocuments => "target_documents",
            Self::DocumentTargets => "document_targets",
            Self::TargetGlobal => "target_global",
        }
    }

    /// Returns all table IDs.
    pub const fn all() -> [TableId; Self::COUNT] {
        [
            Self::Targets,
            Self::TargetQueries,
            Self::TargetDocuments,
            Self::DocumentTargets,
            Self::TargetGlobal,
        ]
    }

    /// Converts from u8 to TableId.
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Targets),
            1 => Some(Self::TargetQueries),
            2 => Some(Self::TargetDocuments),
            3 => Some(Self::DocumentTargets),
            4 => Some(Self::TargetGlobal),
            _ => None,
        }
    }
}

// ============================================================================
// Type-Safe Table Trait
// ============================================================================

/// Trait for compile-time type-safe table access.
///
/// Each table struct implements this trait with its specific key and value types.
/// Serialization is handled by the `Key`/`Value` traits in types.rs.
pub trait Table {
    /// The table identifier.
    const ID: TableId;

    /// Key type marker for this table.
    type KeyType;

    /// Value type marker for this table.
    type ValueType;
}

// ============================================================================
// Table Definitions
// ============================================================================

/// Targets table: one row per listened-to target.
pub struct Targets;

impl Table for Targets {
    const ID: TableId = TableId::Targets;
    type KeyType = Vec<u8>;
    type ValueType = Vec<u8>;
}

/// Query index table: canonical query id to target id.
pub struct TargetQueries;

impl Table for TargetQueries {
    const ID: TableId = TableId::TargetQueries;
    type KeyType = Vec<u8>;
    type ValueType = Vec<u8>;
}

/// Target-to-document reference index.
pub struct TargetDocuments;

impl Table for TargetDocuments {
    const ID: TableId = TableId::TargetDocuments;
    type KeyType = Vec<u8>;
    type ValueType = Vec<u8>;
}

/// Document-to-target reference index, including per-document sentinel rows.
pub struct DocumentTargets;

impl Table for DocumentTargets {
    const ID: TableId = TableId::DocumentTargets;
    type KeyType = Vec<u8>;
    type ValueType = Vec<u8>;
}

/// Global singleton records.
pub struct TargetGlobal;

impl Table for TargetGlobal {
    const ID: TableId = TableId::TargetGlobal;
    type KeyType = String;
    type ValueType = Vec<u8>;
}
