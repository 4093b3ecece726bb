//! Note use-case service.
//!
//! # Responsibility
//! - Provide note create/update/get/soft-delete and tag APIs.
//! - Provide the author listing projections (by id, by username, overview).
//!
//! # Invariants
//! - Every read-modify-write on one note runs under that note's entity lock.
//! - `add_tag` never attaches two tags with the same name to one note.
//! - Soft-deleted notes are invisible to every read here.
//! - Author listings are sorted `created DESC`.
//! - Authorship is not checked here; callers use `Note::is_authored_by`.

use crate::context::CoreContext;
use crate::model::entity::EntityRef;
use crate::model::note::{normalize_tag_name, Note, NoteId, NoteValidationError, Tag};
use crate::model::user::{User, UserId};
use crate::repo::note_repo::{NoteListQuery, NoteRepository};
use crate::repo::RepoError;
use crate::version::field::Versionable;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for note use-cases.
#[derive(Debug)]
pub enum NoteServiceError {
    /// Note fields violate domain rules.
    Validation(NoteValidationError),
    /// Target note does not exist or is soft-deleted.
    NoteNotFound(NoteId),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::NoteNotFound(_) => None,
        }
    }
}

impl From<NoteValidationError> for NoteServiceError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NoteValidation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

pub type NoteServiceResult<T> = Result<T, NoteServiceError>;

/// Input for a new note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub body: String,
    pub public: bool,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            public: false,
        }
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub public: Option<bool>,
}

impl NoteUpdate {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.public.is_none()
    }
}

/// Author page projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorOverview {
    pub user: User,
    /// Active notes, newest first.
    pub notes: Vec<Note>,
    /// Whether any listed note is public.
    pub has_public: bool,
}

/// Note service facade over repository implementations.
pub struct NoteService<R: NoteRepository> {
    repo: R,
    context: CoreContext,
}

impl<R: NoteRepository> NoteService<R> {
    /// Creates a service using the provided repository and shared context.
    pub fn new(repo: R, context: CoreContext) -> Self {
        Self { repo, context }
    }

    pub fn create_note(&self, author: UserId, draft: NoteDraft) -> NoteServiceResult<Note> {
        let mut note = Note::new(author, draft.title, draft.body, self.context.clock.now());
        note.public = draft.public;
        note.validate()?;

        self.repo.create_note(&note)?;
        info!(
            "event=note_create module=note status=ok note_id={} author_id={}",
            note.id, author
        );
        Ok(note)
    }

    /// Applies the provided fields and stamps `modified`.
    ///
    /// An empty update returns the note unchanged.
    pub fn update_note(&self, id: NoteId, update: NoteUpdate) -> NoteServiceResult<Note> {
        self.with_note(id, |note| {
            if update.is_empty() {
                return Ok(false);
            }
            if let Some(title) = update.title {
                note.title = title;
            }
            if let Some(body) = update.body {
                note.body = body;
            }
            if let Some(public) = update.public {
                note.public = public;
            }
            note.validate()?;
            Ok(true)
        })
    }

    pub fn get_note(&self, id: NoteId) -> NoteServiceResult<Option<Note>> {
        Ok(self.repo.get_note(id, false)?)
    }

    /// Tombstones a note. Deleting an already deleted note is a no-op.
    pub fn soft_delete_note(&self, id: NoteId, actor: UserId) -> NoteServiceResult<()> {
        let now = self.context.clock.now();
        self.context
            .locks
            .with_lock(&note_ref(id), || self.repo.soft_delete_note(id, actor, now))
            .map_err(|err| match err {
                RepoError::NotFound(_) => NoteServiceError::NoteNotFound(id),
                other => other.into(),
            })?;
        info!(
            "event=note_delete module=note status=ok note_id={} actor_id={}",
            id, actor
        );
        Ok(())
    }

    /// Attaches the shared tag `name`, creating it on first use.
    ///
    /// A note that already carries a tag with this exact (trimmed) name is
    /// left unchanged.
    pub fn add_tag(&self, id: NoteId, name: &str) -> NoteServiceResult<Note> {
        let name = normalize_tag_name(name).map_err(RepoError::from)?;
        self.with_note(id, |note| {
            if note.has_tag(&name) {
                return Ok(false);
            }
            let tag = self.repo.find_or_create_tag(&name)?;
            Ok(note.attach_tag(tag))
        })
    }

    /// Detaches the tag `name`; absent tags are a no-op.
    pub fn remove_tag(&self, id: NoteId, name: &str) -> NoteServiceResult<Note> {
        let name = name.trim().to_string();
        self.with_note(id, |note| Ok(note.detach_tag(&name)))
    }

    pub fn has_tag(&self, id: NoteId, name: &str) -> NoteServiceResult<bool> {
        let note = self.require_note(id)?;
        Ok(note.has_tag(name.trim()))
    }

    pub fn list_notes_for_author(&self, author: UserId) -> NoteServiceResult<Vec<Note>> {
        Ok(self.repo.list_notes(&NoteListQuery {
            author: Some(author),
            ..NoteListQuery::default()
        })?)
    }

    pub fn list_notes_for_username(&self, username: &str) -> NoteServiceResult<Vec<Note>> {
        Ok(self.repo.list_notes(&NoteListQuery {
            username: Some(username.to_string()),
            ..NoteListQuery::default()
        })?)
    }

    pub fn author_overview(&self, user: &User) -> NoteServiceResult<AuthorOverview> {
        let notes = self.list_notes_for_author(user.id)?;
        let has_public = notes.iter().any(|note| note.public);
        Ok(AuthorOverview {
            user: user.clone(),
            notes,
            has_public,
        })
    }

    pub fn list_tags(&self) -> NoteServiceResult<Vec<Tag>> {
        Ok(self.repo.list_tags()?)
    }

    fn require_note(&self, id: NoteId) -> NoteServiceResult<Note> {
        self.repo
            .get_note(id, false)?
            .ok_or(NoteServiceError::NoteNotFound(id))
    }

    /// Load-mutate-save under the note's lock. `mutate` reports whether it
    /// changed anything; unchanged notes are not written.
    fn with_note(
        &self,
        id: NoteId,
        mutate: impl FnOnce(&mut Note) -> NoteServiceResult<bool>,
    ) -> NoteServiceResult<Note> {
        self.context
            .locks
            .with_lock(&note_ref(id), || -> NoteServiceResult<Note> {
                let mut note = self.require_note(id)?;
                if !mutate(&mut note)? {
                    return Ok(note);
                }
                note.touch(self.context.clock.now());
                self.repo.update_note(&note).map_err(|err| match err {
                    RepoError::NotFound(_) => NoteServiceError::NoteNotFound(id),
                    other => other.into(),
                })?;
                info!(
                    "event=note_update module=note status=ok note_id={} tags={}",
                    id,
                    note.tags.len()
                );
                Ok(note)
            })
    }
}

fn note_ref(id: NoteId) -> EntityRef {
    EntityRef::new(Note::ENTITY_TYPE, id.to_string())
}

#[cfg(test)]
mod tests {
    use super::{NoteDraft, NoteUpdate};

    #[test]
    fn draft_defaults_to_private() {
        let draft = NoteDraft::new("Shopping", "eggs");
        assert!(!draft.public);
        assert!(NoteDraft::new("a", "b").public(true).public);
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(NoteUpdate::default().is_empty());
        assert!(!NoteUpdate {
            public: Some(true),
            ..NoteUpdate::default()
        }
        .is_empty());
    }
}
