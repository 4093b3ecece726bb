//! Reference resolution for decoded version fields.
//!
//! # Responsibility
//! - Answer "which of these ids of type X still exist" with one
//!   `id IN (...)` query per call.
//!
//! # Invariants
//! - Results keep the caller's id order; missing ids are left out and
//!   repeated ids are returned once.
//! - Soft-deleted notes do not resolve.

use crate::repo::{RepoError, RepoResult};
use crate::version::field::ResolvedRef;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::{HashMap, HashSet};

/// Store-side lookup used by the field codec.
pub trait ReferenceResolver {
    /// Returns the subset of `ids` of `entity_type` that exist, labeled with
    /// each entity's display name.
    fn resolve(&self, entity_type: &str, ids: &[String]) -> RepoResult<Vec<ResolvedRef>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Integer,
    Text,
}

#[derive(Debug, Clone, Copy)]
struct ReferenceTable {
    entity_type: &'static str,
    table: &'static str,
    key: KeyKind,
    label_column: &'static str,
    active_filter: &'static str,
}

const REFERENCE_TABLES: &[ReferenceTable] = &[
    ReferenceTable {
        entity_type: "user",
        table: "users",
        key: KeyKind::Integer,
        label_column: "username",
        active_filter: "",
    },
    ReferenceTable {
        entity_type: "tag",
        table: "tags",
        key: KeyKind::Integer,
        label_column: "name",
        active_filter: "",
    },
    ReferenceTable {
        entity_type: "note",
        table: "notes",
        key: KeyKind::Text,
        label_column: "title",
        active_filter: " AND is_deleted = 0",
    },
];

/// SQLite-backed resolver over the core tables.
pub struct SqliteReferenceResolver<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReferenceResolver<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ReferenceResolver for SqliteReferenceResolver<'_> {
    fn resolve(&self, entity_type: &str, ids: &[String]) -> RepoResult<Vec<ResolvedRef>> {
        let table = REFERENCE_TABLES
            .iter()
            .find(|table| table.entity_type == entity_type)
            .ok_or_else(|| RepoError::UnsupportedEntityType(entity_type.to_string()))?;

        // Ids that cannot be keys of this table can never resolve; repeats
        // collapse onto their first occurrence.
        let mut seen = HashSet::with_capacity(ids.len());
        let mut wanted = Vec::with_capacity(ids.len());
        let mut bind_values = Vec::with_capacity(ids.len());
        for id in ids {
            let (key, value) = match table.key {
                KeyKind::Integer => match id.trim().parse::<i64>() {
                    Ok(value) => (value.to_string(), Value::Integer(value)),
                    Err(_) => continue,
                },
                KeyKind::Text => (id.clone(), Value::Text(id.clone())),
            };
            if seen.insert(key.clone()) {
                wanted.push(key);
                bind_values.push(value);
            }
        }
        if bind_values.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; bind_values.len()].join(", ");
        let sql = format!(
            "SELECT CAST(id AS TEXT), {label}
             FROM {table}
             WHERE id IN ({placeholders}){filter};",
            label = table.label_column,
            table = table.table,
            filter = table.active_filter,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut found = HashMap::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let label: String = row.get(1)?;
            found.insert(id, label);
        }

        Ok(wanted
            .into_iter()
            .filter_map(|id| {
                let label = found.get(&id)?.clone();
                Some(ResolvedRef::labeled(id, label))
            })
            .collect())
    }
}
