//! User mirror repository.
//!
//! Rows here only give references a target; credentials never reach the
//! core.

use crate::model::entity::EntityRef;
use crate::model::user::{validate_user_fields, User, UserId};
use crate::repo::{map_unique_violation, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub trait UserRepository {
    fn create_user(&self, username: &str, email: &str) -> RepoResult<User>;
    fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    /// Hard-deletes the identity; authored notes keep a `NULL` author.
    fn delete_user(&self, id: UserId) -> RepoResult<()>;
}

pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&self, username: &str, email: &str) -> RepoResult<User> {
        validate_user_fields(username, email)?;

        self.conn
            .execute(
                "INSERT INTO users (username, email) VALUES (?1, ?2);",
                params![username, email],
            )
            .map_err(|err| {
                map_unique_violation(err, || {
                    "username or email has already been used".to_string()
                })
            })?;

        Ok(User {
            id: UserId(self.conn.last_insert_rowid()),
            username: username.to_string(),
            email: email.to_string(),
        })
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, email FROM users WHERE id = ?1;",
                [id.0],
                parse_user_row,
            )
            .optional()?;
        Ok(user)
    }

    fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, email FROM users WHERE username = ?1;",
                [username],
                parse_user_row,
            )
            .optional()?;
        Ok(user)
    }

    fn delete_user(&self, id: UserId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1;", [id.0])?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::new("user", id.to_string())));
        }
        Ok(())
    }
}

fn parse_user_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get("id")?),
        username: row.get("username")?,
        email: row.get("email")?,
    })
}
