//! Relationship metadata.
//!
//! Relationships are derived from record descriptors (not from runtime reflection) and
//! stored on `TableMetadata`, so statement compilation can create join tables and
//! resolve foreign keys without inspecting the related shapes again.

use crate::shape::RecordShape;
use crate::types::SqlType;

/// The type of relationship between two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// The owner holds the foreign key: `Email` belongs to `User` through `user_id`.
    BelongsTo,
    /// The related record holds the foreign key: `User` has one `Profile`.
    HasOne,
    /// One-to-many: `User` has many `Email`s.
    HasMany,
    /// Many-to-many through a join table: `User`s speak many `Language`s.
    ManyToMany,
}

impl RelationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::HasOne => "has_one",
            RelationKind::HasMany => "has_many",
            RelationKind::ManyToMany => "many_to_many",
        }
    }
}

/// Join table used by a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableInfo {
    /// The join table name (e.g., `"user_languages"`).
    pub table_name: String,
    /// Column pointing at the owner (e.g., `"user_id"`).
    pub owner_column: String,
    /// Column pointing at the related record (e.g., `"language_id"`).
    pub related_column: String,
    /// Storage type of the owner's key.
    pub owner_type: SqlType,
    /// Storage type of the related record's key.
    pub related_type: SqlType,
}

impl JoinTableInfo {
    pub fn new(
        table_name: impl Into<String>,
        owner_column: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            owner_column: owner_column.into(),
            related_column: related_column.into(),
            owner_type: SqlType::Int64,
            related_type: SqlType::Int64,
        }
    }

    /// Set the key column types (both default to `Int64`).
    pub fn types(mut self, owner: SqlType, related: SqlType) -> Self {
        self.owner_type = owner;
        self.related_type = related;
        self
    }
}

/// Metadata about a relationship between two record shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    /// Name of the relationship field on the owner.
    pub field: String,
    /// Kind of relationship.
    pub kind: RelationKind,
    /// Identity of the related shape.
    pub related: RecordShape,
    /// The related record's table name.
    pub related_table: String,
    /// Foreign key column(s). On the owner for `BelongsTo`, on the related table
    /// for `HasOne`/`HasMany`, on the join table for `ManyToMany`.
    pub foreign_keys: Vec<String>,
    /// Column(s) the foreign keys reference.
    pub association_keys: Vec<String>,
    /// Join table for `ManyToMany` relations.
    pub join_table: Option<JoinTableInfo>,
}

impl RelationInfo {
    pub fn new(
        field: impl Into<String>,
        kind: RelationKind,
        related: RecordShape,
        related_table: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            kind,
            related,
            related_table: related_table.into(),
            foreign_keys: Vec::new(),
            association_keys: Vec::new(),
            join_table: None,
        }
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_keys.push(column.into());
        self
    }

    pub fn association_key(mut self, column: impl Into<String>) -> Self {
        self.association_keys.push(column.into());
        self
    }

    pub fn join_table(mut self, join: JoinTableInfo) -> Self {
        self.join_table = Some(join);
        self
    }
}
