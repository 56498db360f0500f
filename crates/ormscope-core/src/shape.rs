//! Record shapes and their descriptors.
//!
//! A record kind describes itself once through `Record::describe`, producing a
//! `ShapeDescriptor`: the declared fields, their types and an annotation map. Metadata
//! derivation works on the descriptor alone, so no runtime type introspection is needed.
//!
//! # Example
//!
//! ```
//! use ormscope_core::shape::{DeclaredType, FieldDescriptor, Record, ShapeDescriptor};
//! use ormscope_core::Value;
//!
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! impl Record for User {
//!     fn describe() -> ShapeDescriptor {
//!         ShapeDescriptor::new("User")
//!             .field(FieldDescriptor::new("ID", DeclaredType::U64))
//!             .field(FieldDescriptor::new("Name", DeclaredType::String).tag("size:64;not_null"))
//!     }
//!
//!     fn values(&self) -> Vec<(String, Value)> {
//!         vec![
//!             ("ID".to_string(), Value::from(self.id)),
//!             ("Name".to_string(), Value::from(self.name.clone())),
//!         ]
//!     }
//! }
//!
//! assert_eq!(User::describe().fields.len(), 2);
//! ```

use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::value::Value;

/// Recognised annotation keys.
pub mod annotations {
    pub const COLUMN: &str = "column";
    pub const TYPE: &str = "type";
    pub const SIZE: &str = "size";
    pub const PRIMARY_KEY: &str = "primary_key";
    pub const AUTO_INCREMENT: &str = "auto_increment";
    pub const NOT_NULL: &str = "not_null";
    pub const NULLABLE: &str = "nullable";
    pub const UNIQUE: &str = "unique";
    pub const DEFAULT: &str = "default";
    pub const INDEX: &str = "index";
    pub const UNIQUE_INDEX: &str = "unique_index";
    pub const IGNORE: &str = "ignore";
    pub const EMBEDDED: &str = "embedded";
    pub const EMBEDDED_PREFIX: &str = "embedded_prefix";
    pub const FOREIGN_KEY: &str = "foreign_key";
    pub const ASSOCIATION_FOREIGN_KEY: &str = "association_foreign_key";
    pub const MANY2MANY: &str = "many2many";
}

/// Identity of a record type. Used only as a cache key.
#[derive(Clone, Copy)]
pub struct RecordShape {
    id: TypeId,
    name: &'static str,
}

impl RecordShape {
    /// Identity of `T`, labelled with its short type name.
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full = std::any::type_name::<T>();
        let name = full.rsplit("::").next().unwrap_or(full);
        Self {
            id: TypeId::of::<T>(),
            name,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for RecordShape {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecordShape {}

impl Hash for RecordShape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RecordShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordShape").field(&self.name).finish()
    }
}

/// A record kind that can describe itself and expose its field values.
pub trait Record: 'static {
    /// Describe the record's declared fields. Must return the same descriptor every call.
    fn describe() -> ShapeDescriptor;

    /// Field values keyed by declared field name (`outer.inner` for embedded fields).
    /// Relation fields are omitted.
    fn values(&self) -> Vec<(String, Value)>;

    fn shape() -> RecordShape
    where
        Self: Sized,
    {
        RecordShape::of::<Self>()
    }

    fn record_ref() -> RecordRef
    where
        Self: Sized,
    {
        RecordRef::of::<Self>()
    }
}

/// Copyable handle to a record kind: its identity plus how to describe it.
#[derive(Clone, Copy)]
pub struct RecordRef {
    shape: RecordShape,
    describe: fn() -> ShapeDescriptor,
}

impl RecordRef {
    pub fn of<T: Record>() -> Self {
        Self {
            shape: RecordShape::of::<T>(),
            describe: T::describe,
        }
    }

    /// Build a handle from an explicit identity and descriptor function.
    pub fn new(shape: RecordShape, describe: fn() -> ShapeDescriptor) -> Self {
        Self { shape, describe }
    }

    pub const fn shape(&self) -> RecordShape {
        self.shape
    }

    pub fn describe(&self) -> ShapeDescriptor {
        (self.describe)()
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape
    }
}

impl Eq for RecordRef {}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordRef").field(&self.shape.name).finish()
    }
}

/// Declared type of a field, independent of any backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Bytes,
    Timestamp,
    Json,
    Decimal { precision: u8, scale: u8 },
    /// A value that may be absent; maps to a nullable column.
    Optional(Box<DeclaredType>),
    /// A single nested record: embedded, belongs-to or has-one.
    Record(RecordRef),
    /// A collection; has-many or many-to-many when the element is a record.
    List(Box<DeclaredType>),
}

impl DeclaredType {
    pub fn optional(inner: DeclaredType) -> Self {
        DeclaredType::Optional(Box::new(inner))
    }

    pub fn list(inner: DeclaredType) -> Self {
        DeclaredType::List(Box::new(inner))
    }

    pub fn record<T: Record>() -> Self {
        DeclaredType::Record(RecordRef::of::<T>())
    }

    /// The type with any `Optional` wrappers removed.
    pub fn unwrap_optional(&self) -> &DeclaredType {
        match self {
            DeclaredType::Optional(inner) => inner.unwrap_optional(),
            other => other,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, DeclaredType::Optional(_))
    }
}

/// One declared field of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub declared: DeclaredType,
    pub annotations: BTreeMap<String, String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, declared: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared,
            annotations: BTreeMap::new(),
        }
    }

    /// Add a `key = value` annotation.
    pub fn annotate(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(normalize_key(&key.into()), value.into());
        self
    }

    /// Add a valueless annotation such as `primary_key`.
    pub fn flag(self, key: impl Into<String>) -> Self {
        self.annotate(key, String::new())
    }

    /// Parse a tag string of `key:value` / `key` entries separated by `;`.
    ///
    /// `-` on its own marks the field ignored. Keys are case-insensitive and
    /// spaces inside keys become underscores (`NOT NULL` == `not_null`).
    pub fn tag(mut self, tag: &str) -> Self {
        for entry in tag.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if entry == "-" {
                self.annotations
                    .insert(annotations::IGNORE.to_string(), String::new());
                continue;
            }
            let (key, value) = match entry.split_once(':') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (entry, ""),
            };
            self.annotations
                .insert(normalize_key(key), value.to_string());
        }
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.annotations.contains_key(key)
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

/// Description of a record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDescriptor {
    pub name: String,
    /// Explicit table name; bypasses naming conventions when set.
    pub table_name: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl ShapeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            fields: Vec::new(),
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}
