//! Table metadata derivation and the shared metadata cache.
//!
//! `derive_table_metadata` is a pure function of a record descriptor and the naming
//! configuration. `MetadataCache` memoizes it per `RecordShape` and is the only piece
//! of ormscope state shared between concurrent operations.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::FieldMetadata;
use crate::identifiers::{is_valid_identifier, pluralize, to_snake_case};
use crate::relationship::{JoinTableInfo, RelationInfo, RelationKind};
use crate::shape::{
    DeclaredType, FieldDescriptor, Record, RecordRef, RecordShape, ShapeDescriptor, annotations,
};
use crate::types::SqlType;

/// Embedded records nested deeper than this are rejected.
const MAX_EMBED_DEPTH: usize = 8;

/// Naming conventions applied during derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Use `user` instead of `users` for a `User` record.
    pub singular_table: bool,
}

impl NamingConfig {
    pub fn singular() -> Self {
        Self {
            singular_table: true,
        }
    }

    /// Table name for a shape name under this configuration.
    pub fn table_name(&self, shape_name: &str) -> String {
        let base = to_snake_case(shape_name);
        if self.singular_table {
            base
        } else {
            pluralize(&base)
        }
    }
}

/// An index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Derived description of the table backing a record shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub shape: RecordShape,
    pub shape_name: String,
    pub table_name: String,
    /// Stored columns in declaration order (embedded records flattened in place).
    pub fields: Vec<FieldMetadata>,
    /// Primary key column names in key order.
    pub primary_keys: Vec<String>,
    pub relations: Vec<RelationInfo>,
    pub indexes: Vec<IndexMetadata>,
}

impl TableMetadata {
    pub fn field_by_name(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.column_name == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.field_by_column(column).is_some()
    }

    /// Primary key fields in key order.
    pub fn primary_fields(&self) -> Vec<&FieldMetadata> {
        self.primary_keys
            .iter()
            .filter_map(|c| self.field_by_column(c))
            .collect()
    }

    pub fn relation(&self, field: &str) -> Option<&RelationInfo> {
        self.relations.iter().find(|r| r.field == field)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.column_name.as_str()).collect()
    }
}

/// Column under construction, with the bits of annotation state resolved later.
struct ColumnDraft {
    meta: FieldMetadata,
    pk_order: Option<String>,
    auto_increment_annotation: Option<bool>,
}

struct PendingRelation<'d> {
    field: &'d FieldDescriptor,
    related: RecordRef,
    many: bool,
}

/// Derive table metadata for a record. Pure: the same input always yields the same output.
pub fn derive_table_metadata(record: &RecordRef, naming: &NamingConfig) -> Result<TableMetadata> {
    let desc = record.describe();
    let shape_name = desc.name.clone();
    let table_name = desc
        .table_name
        .clone()
        .unwrap_or_else(|| naming.table_name(&desc.name));
    if !is_valid_identifier(&table_name) {
        return Err(Error::shape(
            &shape_name,
            format!("invalid table name {:?}", table_name),
        ));
    }

    let mut drafts = Vec::new();
    let mut pending = Vec::new();
    collect_columns(
        &desc,
        &desc.fields,
        &table_name,
        None,
        0,
        &mut drafts,
        &mut pending,
    )?;

    if drafts.is_empty() {
        return Err(Error::shape(&shape_name, "record has no usable fields"));
    }

    let mut seen = HashSet::new();
    for draft in &drafts {
        if !seen.insert(draft.meta.column_name.as_str()) {
            return Err(Error::shape(
                &shape_name,
                format!("duplicate column {:?}", draft.meta.column_name),
            ));
        }
    }

    let primary_keys = resolve_primary_key(&shape_name, &mut drafts)?;
    let fields: Vec<FieldMetadata> = drafts.into_iter().map(|d| d.meta).collect();
    let indexes = collect_indexes(&fields);

    let mut table = TableMetadata {
        shape: record.shape(),
        shape_name,
        table_name,
        fields,
        primary_keys,
        relations: Vec::new(),
        indexes,
    };

    for rel in pending {
        let info = resolve_relation(&desc, &table, &rel, naming)?;
        table.relations.push(info);
    }

    tracing::debug!(
        shape = %table.shape_name,
        table = %table.table_name,
        columns = table.fields.len(),
        relations = table.relations.len(),
        "Derived table metadata"
    );

    Ok(table)
}

fn collect_columns<'d>(
    owner: &ShapeDescriptor,
    fields: &'d [FieldDescriptor],
    table_name: &str,
    embedded: Option<(&str, &str)>,
    depth: usize,
    drafts: &mut Vec<ColumnDraft>,
    pending: &mut Vec<PendingRelation<'d>>,
) -> Result<()> {
    for fd in fields {
        if fd.has(annotations::IGNORE) {
            continue;
        }
        match fd.declared.unwrap_optional() {
            DeclaredType::Record(related) if fd.has(annotations::EMBEDDED) => {
                if depth >= MAX_EMBED_DEPTH {
                    return Err(Error::shape(
                        &owner.name,
                        format!("embedded field {} nests too deeply", fd.name),
                    ));
                }
                let inner = related.describe();
                let prefix = match embedded {
                    Some((_, outer_prefix)) => format!(
                        "{}{}",
                        outer_prefix,
                        fd.annotation(annotations::EMBEDDED_PREFIX).unwrap_or("")
                    ),
                    None => fd
                        .annotation(annotations::EMBEDDED_PREFIX)
                        .unwrap_or("")
                        .to_string(),
                };
                let path = match embedded {
                    Some((outer, _)) => format!("{}.{}", outer, fd.name),
                    None => fd.name.clone(),
                };
                // Relation fields inside an embedded record are rejected by the recursive call.
                let mut nested = Vec::new();
                collect_columns(
                    owner,
                    &inner.fields,
                    table_name,
                    Some((&path, &prefix)),
                    depth + 1,
                    drafts,
                    &mut nested,
                )?;
            }
            DeclaredType::Record(related) => {
                if embedded.is_some() {
                    return Err(Error::shape(
                        &owner.name,
                        format!("embedded field {} declares a relation", fd.name),
                    ));
                }
                pending.push(PendingRelation {
                    field: fd,
                    related: *related,
                    many: false,
                });
            }
            DeclaredType::List(inner) => match inner.unwrap_optional() {
                DeclaredType::Record(related) if embedded.is_none() => {
                    pending.push(PendingRelation {
                        field: fd,
                        related: *related,
                        many: true,
                    });
                }
                _ => {
                    return Err(Error::shape(
                        &owner.name,
                        format!("field {} has an unmappable list type", fd.name),
                    ));
                }
            },
            _ => drafts.push(column_draft(owner, fd, table_name, embedded)?),
        }
    }
    Ok(())
}

fn scalar_type(declared: &DeclaredType) -> Option<SqlType> {
    let ty = match declared {
        DeclaredType::Bool => SqlType::Bool,
        DeclaredType::I8 => SqlType::Int8,
        DeclaredType::I16 => SqlType::Int16,
        DeclaredType::I32 => SqlType::Int32,
        DeclaredType::I64 => SqlType::Int64,
        DeclaredType::U8 => SqlType::UInt8,
        DeclaredType::U16 => SqlType::UInt16,
        DeclaredType::U32 => SqlType::UInt32,
        DeclaredType::U64 => SqlType::UInt64,
        DeclaredType::F32 => SqlType::Float32,
        DeclaredType::F64 => SqlType::Float64,
        DeclaredType::String => SqlType::Text,
        DeclaredType::Bytes => SqlType::Bytes,
        DeclaredType::Timestamp => SqlType::Timestamp,
        DeclaredType::Json => SqlType::Json,
        DeclaredType::Decimal { precision, scale } => SqlType::Decimal {
            precision: *precision,
            scale: *scale,
        },
        DeclaredType::Optional(inner) => return scalar_type(inner),
        DeclaredType::Record(_) | DeclaredType::List(_) => return None,
    };
    Some(ty)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn column_draft(
    owner: &ShapeDescriptor,
    fd: &FieldDescriptor,
    table_name: &str,
    embedded: Option<(&str, &str)>,
) -> Result<ColumnDraft> {
    let sql_type = scalar_type(&fd.declared).ok_or_else(|| {
        Error::shape(
            &owner.name,
            format!("field {} has an unmappable type", fd.name),
        )
    })?;

    let base_column = non_empty(fd.annotation(annotations::COLUMN))
        .map_or_else(|| to_snake_case(&fd.name), str::to_string);
    let (name, column_name) = match embedded {
        Some((outer, prefix)) => (
            format!("{}.{}", outer, fd.name),
            format!("{}{}", prefix, base_column),
        ),
        None => (fd.name.clone(), base_column),
    };
    if !is_valid_identifier(&column_name) {
        return Err(Error::shape(
            &owner.name,
            format!("invalid column name {:?} for field {}", column_name, fd.name),
        ));
    }

    let mut meta = FieldMetadata::new(name, column_name, sql_type);
    meta.nullable = fd.declared.is_optional();
    if fd.has(annotations::NOT_NULL) {
        meta.nullable = false;
    }
    if fd.has(annotations::NULLABLE) {
        meta.nullable = true;
    }
    if let Some(ty) = non_empty(fd.annotation(annotations::TYPE)) {
        meta.type_override = Some(ty.to_string());
    }
    if let Some(size) = non_empty(fd.annotation(annotations::SIZE)) {
        let parsed = size.parse::<u32>().map_err(|_| {
            Error::shape(
                &owner.name,
                format!("field {} has invalid size {:?}", fd.name, size),
            )
        })?;
        meta.size = Some(parsed);
    }
    meta.primary_key = fd.has(annotations::PRIMARY_KEY);
    meta.unique = fd.has(annotations::UNIQUE);
    meta.default = non_empty(fd.annotation(annotations::DEFAULT)).map(str::to_string);
    if fd.has(annotations::INDEX) {
        meta.index = Some(
            non_empty(fd.annotation(annotations::INDEX)).map_or_else(
                || format!("idx_{}_{}", table_name, meta.column_name),
                str::to_string,
            ),
        );
    }
    if fd.has(annotations::UNIQUE_INDEX) {
        meta.unique_index = Some(
            non_empty(fd.annotation(annotations::UNIQUE_INDEX)).map_or_else(
                || format!("uix_{}_{}", table_name, meta.column_name),
                str::to_string,
            ),
        );
    }
    if let Some((outer, _)) = embedded {
        meta.embedded_from = Some(outer.to_string());
    }

    let auto_increment_annotation = fd
        .annotation(annotations::AUTO_INCREMENT)
        .map(|v| !v.trim().eq_ignore_ascii_case("false"));
    if let Some(auto) = auto_increment_annotation {
        meta.auto_increment = auto;
    }

    Ok(ColumnDraft {
        meta,
        pk_order: fd
            .annotation(annotations::PRIMARY_KEY)
            .map(|v| v.trim().to_string()),
        auto_increment_annotation,
    })
}

fn resolve_primary_key(shape_name: &str, drafts: &mut [ColumnDraft]) -> Result<Vec<String>> {
    let marked: Vec<usize> = drafts
        .iter()
        .enumerate()
        .filter(|(_, d)| d.meta.primary_key)
        .map(|(i, _)| i)
        .collect();

    let ordered: Vec<usize> = match marked.len() {
        0 => match drafts.iter().position(|d| d.meta.column_name == "id") {
            Some(idx) => {
                drafts[idx].meta.primary_key = true;
                vec![idx]
            }
            None => Vec::new(),
        },
        1 => marked,
        _ => {
            let mut keyed = Vec::with_capacity(marked.len());
            for idx in &marked {
                let order = drafts[*idx]
                    .pk_order
                    .as_deref()
                    .and_then(|v| v.parse::<u32>().ok());
                match order {
                    Some(o) => keyed.push((o, *idx)),
                    None => {
                        let names: Vec<&str> = marked
                            .iter()
                            .map(|i| drafts[*i].meta.name.as_str())
                            .collect();
                        return Err(Error::shape(
                            shape_name,
                            format!(
                                "ambiguous primary key: {} are all marked primary without an ordinal",
                                names.join(", ")
                            ),
                        ));
                    }
                }
            }
            keyed.sort_unstable();
            if keyed.windows(2).any(|w| w[0].0 == w[1].0) {
                return Err(Error::shape(
                    shape_name,
                    "ambiguous primary key: duplicate ordinals",
                ));
            }
            keyed.into_iter().map(|(_, idx)| idx).collect()
        }
    };

    for idx in &ordered {
        drafts[*idx].meta.nullable = false;
    }
    if let [only] = ordered.as_slice() {
        let draft = &mut drafts[*only];
        if draft.auto_increment_annotation.is_none() && draft.meta.sql_type.is_integer() {
            draft.meta.auto_increment = true;
        }
    }

    Ok(ordered
        .into_iter()
        .map(|idx| drafts[idx].meta.column_name.clone())
        .collect())
}

fn collect_indexes(fields: &[FieldMetadata]) -> Vec<IndexMetadata> {
    let mut indexes: Vec<IndexMetadata> = Vec::new();
    let mut add = |name: &str, column: &str, unique: bool| {
        if let Some(existing) = indexes
            .iter_mut()
            .find(|i| i.name == name && i.unique == unique)
        {
            existing.columns.push(column.to_string());
        } else {
            indexes.push(IndexMetadata {
                name: name.to_string(),
                columns: vec![column.to_string()],
                unique,
            });
        }
    };
    for field in fields {
        if let Some(name) = &field.index {
            add(name, &field.column_name, false);
        }
        if let Some(name) = &field.unique_index {
            add(name, &field.column_name, true);
        }
    }
    indexes
}

/// Column names and primary key of a related shape, without following its relations.
struct ShallowShape {
    columns: Vec<(String, SqlType)>,
    primary: Option<(String, SqlType)>,
    table_name: String,
    singular: String,
}

fn shallow_shape(desc: &ShapeDescriptor, naming: &NamingConfig) -> ShallowShape {
    let mut columns = Vec::new();
    let mut primary = None;
    for fd in &desc.fields {
        if fd.has(annotations::IGNORE) || fd.has(annotations::EMBEDDED) {
            continue;
        }
        let Some(ty) = scalar_type(&fd.declared) else {
            continue;
        };
        let column = non_empty(fd.annotation(annotations::COLUMN))
            .map_or_else(|| to_snake_case(&fd.name), str::to_string);
        if fd.has(annotations::PRIMARY_KEY) && primary.is_none() {
            primary = Some((column.clone(), ty));
        }
        columns.push((column, ty));
    }
    if primary.is_none() {
        primary = columns.iter().find(|(c, _)| c == "id").cloned();
    }
    ShallowShape {
        columns,
        primary,
        table_name: desc
            .table_name
            .clone()
            .unwrap_or_else(|| naming.table_name(&desc.name)),
        singular: to_snake_case(&desc.name),
    }
}

fn resolve_relation(
    owner: &ShapeDescriptor,
    table: &TableMetadata,
    rel: &PendingRelation<'_>,
    naming: &NamingConfig,
) -> Result<RelationInfo> {
    let fd = rel.field;
    let related_desc = rel.related.describe();
    let related = shallow_shape(&related_desc, naming);
    let owner_singular = to_snake_case(&owner.name);
    let foreign_key = non_empty(fd.annotation(annotations::FOREIGN_KEY)).map(to_snake_case);
    let association_key =
        non_empty(fd.annotation(annotations::ASSOCIATION_FOREIGN_KEY)).map(to_snake_case);
    let owner_pk = table.primary_fields().first().map(|f| (f.column_name.clone(), f.sql_type));

    let unresolved = |why: &str| {
        Error::shape(
            &owner.name,
            format!("cannot resolve relation {}: {}", fd.name, why),
        )
    };

    if rel.many {
        if let Some(join_name) = fd.annotation(annotations::MANY2MANY) {
            let (owner_key, owner_type) =
                owner_pk.ok_or_else(|| unresolved("owner has no primary key"))?;
            let (related_key, related_type) = related
                .primary
                .clone()
                .ok_or_else(|| unresolved("related shape has no primary key"))?;
            let join_table = non_empty(Some(join_name)).map_or_else(
                || format!("{}_{}", owner_singular, pluralize(&related.singular)),
                str::to_string,
            );
            let owner_column = foreign_key.unwrap_or_else(|| format!("{}_id", owner_singular));
            let mut related_column =
                association_key.unwrap_or_else(|| format!("{}_id", related.singular));
            if related_column == owner_column {
                related_column = format!("related_{}", related_column);
            }
            for ident in [&join_table, &owner_column, &related_column] {
                if !is_valid_identifier(ident) {
                    return Err(unresolved(&format!("invalid join identifier {:?}", ident)));
                }
            }
            return Ok(RelationInfo::new(
                &fd.name,
                RelationKind::ManyToMany,
                rel.related.shape(),
                &related.table_name,
            )
            .foreign_key(&owner_column)
            .association_key(&owner_key)
            .association_key(&related_key)
            .join_table(
                JoinTableInfo::new(join_table, owner_column, related_column)
                    .types(owner_type, related_type),
            ));
        }

        let fk = foreign_key.unwrap_or_else(|| format!("{}_id", owner_singular));
        if !related.columns.iter().any(|(c, _)| *c == fk) {
            return Err(unresolved(&format!(
                "{} has no column {}",
                related_desc.name, fk
            )));
        }
        let (owner_key, _) = owner_pk.ok_or_else(|| unresolved("owner has no primary key"))?;
        return Ok(RelationInfo::new(
            &fd.name,
            RelationKind::HasMany,
            rel.related.shape(),
            &related.table_name,
        )
        .foreign_key(fk)
        .association_key(association_key.unwrap_or(owner_key)));
    }

    let belongs_column = foreign_key
        .clone()
        .unwrap_or_else(|| format!("{}_id", to_snake_case(&fd.name)));
    if table.has_column(&belongs_column) {
        let (related_key, _) = related
            .primary
            .clone()
            .ok_or_else(|| unresolved("related shape has no primary key"))?;
        return Ok(RelationInfo::new(
            &fd.name,
            RelationKind::BelongsTo,
            rel.related.shape(),
            &related.table_name,
        )
        .foreign_key(belongs_column)
        .association_key(association_key.unwrap_or(related_key)));
    }

    let has_one_column = foreign_key.unwrap_or_else(|| format!("{}_id", owner_singular));
    if related.columns.iter().any(|(c, _)| *c == has_one_column) {
        let (owner_key, _) = owner_pk.ok_or_else(|| unresolved("owner has no primary key"))?;
        return Ok(RelationInfo::new(
            &fd.name,
            RelationKind::HasOne,
            rel.related.shape(),
            &related.table_name,
        )
        .foreign_key(has_one_column)
        .association_key(association_key.unwrap_or(owner_key)));
    }

    Err(unresolved("no foreign key found on either side"))
}

/// Thread-safe cache of derived table metadata, keyed by record shape.
///
/// Lookups take a read lock. A miss derives outside any lock and then inserts with
/// `entry().or_insert`, so when several threads race on the same shape exactly one
/// result is stored and every caller gets that same `Arc`.
#[derive(Debug, Default)]
pub struct MetadataCache {
    naming: NamingConfig,
    entries: RwLock<HashMap<RecordShape, Arc<TableMetadata>>>,
}

impl MetadataCache {
    pub fn new(naming: NamingConfig) -> Self {
        Self {
            naming,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn naming(&self) -> &NamingConfig {
        &self.naming
    }

    /// Metadata for a record, deriving and caching it on first use.
    pub fn get(&self, record: &RecordRef) -> Result<Arc<TableMetadata>> {
        let shape = record.shape();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(meta) = entries.get(&shape) {
                return Ok(Arc::clone(meta));
            }
        }

        let derived = Arc::new(derive_table_metadata(record, &self.naming)?);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let stored = entries.entry(shape).or_insert(derived);
        Ok(Arc::clone(stored))
    }

    pub fn get_for<T: Record>(&self) -> Result<Arc<TableMetadata>> {
        self.get(&RecordRef::of::<T>())
    }

    pub fn contains(&self, shape: &RecordShape) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(shape)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
