//! Note/tag repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist notes together with their tag links.
//! - Own shared tag rows (`find_or_create_tag`).
//!
//! # Invariants
//! - Note writes replace the whole tag link set in the same transaction as
//!   the note row, so a failed write leaves no partial state.
//! - Tag links are returned in attachment order.
//! - Soft-deleted notes are hidden unless explicitly requested.
//! - `created_us` is written once on insert and never updated.

use crate::model::entity::{EntityRef, Lifecycle, SoftDeleteState};
use crate::model::note::{normalize_tag_name, Note, NoteId, Tag};
use crate::model::user::UserId;
use crate::repo::{
    bool_to_int, from_micros, int_to_bool, to_micros, AggregateStore, RepoError, RepoResult,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction};
use uuid::Uuid;

const NOTE_SELECT_SQL: &str = "SELECT
    notes.id,
    notes.author_id,
    notes.title,
    notes.body,
    notes.is_public,
    notes.created_us,
    notes.modified_us,
    notes.is_deleted,
    notes.deleted_us,
    notes.deleted_by
FROM notes";

/// Filters for note listing. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteListQuery {
    pub author: Option<UserId>,
    /// Matches the author's username exactly.
    pub username: Option<String>,
    pub include_deleted: bool,
}

/// Repository interface for notes/tags operations.
pub trait NoteRepository {
    /// Inserts a note and its tag links; returns its stable id.
    fn create_note(&self, note: &Note) -> RepoResult<NoteId>;
    /// Replaces every mutable column and the full tag link set.
    fn update_note(&self, note: &Note) -> RepoResult<()>;
    fn get_note(&self, id: NoteId, include_deleted: bool) -> RepoResult<Option<Note>>;
    fn list_notes(&self, query: &NoteListQuery) -> RepoResult<Vec<Note>>;
    /// Returns the shared tag named `name`, creating it on first use.
    fn find_or_create_tag(&self, name: &str) -> RepoResult<Tag>;
    /// Returns all known tags sorted by name.
    fn list_tags(&self) -> RepoResult<Vec<Tag>>;
    /// Tombstones a note. Repeated calls keep the first tombstone.
    fn soft_delete_note(&self, id: NoteId, by: UserId, at: DateTime<Utc>) -> RepoResult<()>;
}

/// SQLite-backed notes/tags repository.
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoteRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn create_note(&self, note: &Note) -> RepoResult<NoteId> {
        note.validate()?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO notes (
                id,
                author_id,
                title,
                body,
                is_public,
                created_us,
                modified_us,
                is_deleted,
                deleted_us,
                deleted_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                note.id.to_string(),
                note.author.map(|author| author.0),
                note.title.as_str(),
                note.body.as_str(),
                bool_to_int(note.public),
                to_micros(note.lifecycle.created),
                note.lifecycle.modified.map(to_micros),
                bool_to_int(note.deletion.is_deleted),
                note.deletion.deleted_at.map(to_micros),
                note.deletion.deleted_by.map(|user| user.0),
            ],
        )?;
        replace_tag_links(&tx, note)?;
        tx.commit()?;

        Ok(note.id)
    }

    fn update_note(&self, note: &Note) -> RepoResult<()> {
        note.validate()?;

        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE notes
             SET
                author_id = ?2,
                title = ?3,
                body = ?4,
                is_public = ?5,
                modified_us = ?6
             WHERE id = ?1
               AND is_deleted = 0;",
            params![
                note.id.to_string(),
                note.author.map(|author| author.0),
                note.title.as_str(),
                note.body.as_str(),
                bool_to_int(note.public),
                note.lifecycle.modified.map(to_micros),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(note_ref(note.id)));
        }
        replace_tag_links(&tx, note)?;
        tx.commit()?;

        Ok(())
    }

    fn get_note(&self, id: NoteId, include_deleted: bool) -> RepoResult<Option<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTE_SELECT_SQL}
             WHERE notes.id = ?1
               AND (?2 = 1 OR notes.is_deleted = 0);"
        ))?;

        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            let mut note = parse_note_row(row)?;
            note.tags = load_tags_for_note(self.conn, &note.id.to_string())?;
            return Ok(Some(note));
        }

        Ok(None)
    }

    fn list_notes(&self, query: &NoteListQuery) -> RepoResult<Vec<Note>> {
        let mut sql = String::from(NOTE_SELECT_SQL);
        let mut bind_values: Vec<Value> = Vec::new();

        if query.username.is_some() {
            sql.push_str(" INNER JOIN users ON users.id = notes.author_id");
        }
        sql.push_str(" WHERE 1 = 1");

        if !query.include_deleted {
            sql.push_str(" AND notes.is_deleted = 0");
        }
        if let Some(author) = query.author {
            sql.push_str(" AND notes.author_id = ?");
            bind_values.push(Value::Integer(author.0));
        }
        if let Some(username) = query.username.as_ref() {
            sql.push_str(" AND users.username = ?");
            bind_values.push(Value::Text(username.clone()));
        }

        sql.push_str(" ORDER BY notes.created_us DESC, notes.id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            let mut note = parse_note_row(row)?;
            note.tags = load_tags_for_note(self.conn, &note.id.to_string())?;
            notes.push(note);
        }

        Ok(notes)
    }

    fn find_or_create_tag(&self, name: &str) -> RepoResult<Tag> {
        let name = normalize_tag_name(name)?;
        self.conn
            .execute("INSERT OR IGNORE INTO tags (name) VALUES (?1);", [&name])?;
        let tag = self.conn.query_row(
            "SELECT id, name FROM tags WHERE name = ?1;",
            [&name],
            |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )?;
        Ok(tag)
    }

    fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM tags ORDER BY name ASC, id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
            });
        }
        Ok(tags)
    }

    fn soft_delete_note(&self, id: NoteId, by: UserId, at: DateTime<Utc>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET
                is_deleted = 1,
                deleted_us = ?2,
                deleted_by = ?3
             WHERE id = ?1
               AND is_deleted = 0;",
            params![id.to_string(), to_micros(at), by.0],
        )?;

        if changed == 0 && self.get_note(id, true)?.is_none() {
            return Err(RepoError::NotFound(note_ref(id)));
        }

        Ok(())
    }
}

impl AggregateStore<Note> for SqliteNoteRepository<'_> {
    fn load(&self, entity_id: &str) -> RepoResult<Option<Note>> {
        match Uuid::parse_str(entity_id) {
            Ok(id) => self.get_note(id, false),
            Err(_) => Ok(None),
        }
    }

    fn save(&self, entity: &Note) -> RepoResult<()> {
        self.update_note(entity)
    }
}

fn note_ref(id: NoteId) -> EntityRef {
    EntityRef::new("note", id.to_string())
}

fn replace_tag_links(tx: &Transaction<'_>, note: &Note) -> RepoResult<()> {
    let note_id = note.id.to_string();
    tx.execute("DELETE FROM note_tags WHERE note_id = ?1;", [&note_id])?;
    for tag in &note.tags {
        tx.execute(
            "INSERT INTO note_tags (note_id, tag_id) VALUES (?1, ?2);",
            params![note_id, tag.id],
        )?;
    }
    Ok(())
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in notes.id"))
    })?;

    let created = from_micros("notes.created_us", row.get("created_us")?)?;
    let modified = row
        .get::<_, Option<i64>>("modified_us")?
        .map(|value| from_micros("notes.modified_us", value))
        .transpose()?;
    let deleted_at = row
        .get::<_, Option<i64>>("deleted_us")?
        .map(|value| from_micros("notes.deleted_us", value))
        .transpose()?;

    Ok(Note {
        id,
        author: row.get::<_, Option<i64>>("author_id")?.map(UserId),
        title: row.get("title")?,
        body: row.get("body")?,
        tags: Vec::new(),
        public: int_to_bool("notes.is_public", row.get("is_public")?)?,
        lifecycle: Lifecycle { created, modified },
        deletion: SoftDeleteState {
            is_deleted: int_to_bool("notes.is_deleted", row.get("is_deleted")?)?,
            deleted_at,
            deleted_by: row.get::<_, Option<i64>>("deleted_by")?.map(UserId),
        },
    })
}

fn load_tags_for_note(conn: &Connection, note_id: &str) -> RepoResult<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name
         FROM note_tags nt
         INNER JOIN tags t ON t.id = nt.tag_id
         WHERE nt.note_id = ?1
         ORDER BY nt.id ASC;",
    )?;
    let mut rows = stmt.query([note_id])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
        });
    }
    Ok(tags)
}
