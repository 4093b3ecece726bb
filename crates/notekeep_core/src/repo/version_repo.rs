//! Version record repository.
//!
//! # Invariants
//! - Records are append-only: no update path exists and the schema ignores
//!   `UPDATE`/`DELETE` on the `versions` table.
//! - `(entity_type, entity_id, version_number)` is unique; a duplicate insert
//!   surfaces as `RepoError::Conflict`.

use crate::model::entity::EntityRef;
use crate::model::user::UserId;
use crate::repo::{from_micros, map_unique_violation, to_micros, RepoError, RepoResult};
use crate::version::codec::EncodedFields;
use crate::version::record::{NewVersion, VersionRecord};
use rusqlite::{params, Connection, OptionalExtension, Row};

const VERSION_SELECT_SQL: &str = "SELECT
    id,
    entity_type,
    entity_id,
    version_number,
    fields,
    creator_id,
    comment,
    created_us
FROM versions";

pub trait VersionRepository {
    /// Highest stored version number for `entity`, if any.
    fn highest_version_number(&self, entity: &EntityRef) -> RepoResult<Option<u32>>;
    /// Inserts one record in a single statement and returns it as stored.
    fn insert_version(&self, version: &NewVersion) -> RepoResult<VersionRecord>;
    fn get_version(
        &self,
        entity: &EntityRef,
        version_number: u32,
    ) -> RepoResult<Option<VersionRecord>>;
    /// All records of `entity`, ascending by version number.
    fn list_versions(&self, entity: &EntityRef) -> RepoResult<Vec<VersionRecord>>;
}

pub struct SqliteVersionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteVersionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl VersionRepository for SqliteVersionRepository<'_> {
    fn highest_version_number(&self, entity: &EntityRef) -> RepoResult<Option<u32>> {
        let highest = self.conn.query_row(
            "SELECT MAX(version_number)
             FROM versions
             WHERE entity_type = ?1
               AND entity_id = ?2;",
            params![entity.entity_type, entity.entity_id],
            |row| row.get::<_, Option<u32>>(0),
        )?;
        Ok(highest)
    }

    fn insert_version(&self, version: &NewVersion) -> RepoResult<VersionRecord> {
        let fields_json = serde_json::to_string(&version.fields).map_err(|err| {
            RepoError::InvalidData(format!("version fields are not serializable: {err}"))
        })?;

        self.conn
            .execute(
                "INSERT INTO versions (
                    entity_type,
                    entity_id,
                    version_number,
                    fields,
                    creator_id,
                    comment,
                    created_us
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    version.entity_ref.entity_type,
                    version.entity_ref.entity_id,
                    version.version_number,
                    fields_json,
                    version.creator.0,
                    version.comment.as_deref(),
                    to_micros(version.created_at),
                ],
            )
            .map_err(|err| {
                map_unique_violation(err, || {
                    format!(
                        "version {} already exists for {}",
                        version.version_number, version.entity_ref
                    )
                })
            })?;

        Ok(VersionRecord::from_stored(
            self.conn.last_insert_rowid(),
            version.clone(),
        ))
    }

    fn get_version(
        &self,
        entity: &EntityRef,
        version_number: u32,
    ) -> RepoResult<Option<VersionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE entity_type = ?1
               AND entity_id = ?2
               AND version_number = ?3;"
        ))?;
        let row_values = stmt
            .query_row(
                params![entity.entity_type, entity.entity_id, version_number],
                read_version_row,
            )
            .optional()?;
        row_values.map(parse_version_row).transpose()
    }

    fn list_versions(&self, entity: &EntityRef) -> RepoResult<Vec<VersionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE entity_type = ?1
               AND entity_id = ?2
             ORDER BY version_number ASC;"
        ))?;
        let mut rows = stmt.query(params![entity.entity_type, entity.entity_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_version_row(read_version_row(row)?)?);
        }
        Ok(records)
    }
}

/// Raw column values of one `versions` row.
struct VersionRow {
    id: i64,
    entity_type: String,
    entity_id: String,
    version_number: u32,
    fields: String,
    creator_id: i64,
    comment: Option<String>,
    created_us: i64,
}

fn read_version_row(row: &Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok(VersionRow {
        id: row.get("id")?,
        entity_type: row.get("entity_type")?,
        entity_id: row.get("entity_id")?,
        version_number: row.get("version_number")?,
        fields: row.get("fields")?,
        creator_id: row.get("creator_id")?,
        comment: row.get("comment")?,
        created_us: row.get("created_us")?,
    })
}

fn parse_version_row(row: VersionRow) -> RepoResult<VersionRecord> {
    let fields: EncodedFields = serde_json::from_str(&row.fields).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid fields json in versions row {}: {err}",
            row.id
        ))
    })?;
    let created_at = from_micros("versions.created_us", row.created_us)?;

    Ok(VersionRecord::from_stored(
        row.id,
        NewVersion {
            entity_ref: EntityRef::new(row.entity_type, row.entity_id),
            version_number: row.version_number,
            fields,
            creator: UserId(row.creator_id),
            comment: row.comment,
            created_at,
        },
    ))
}
