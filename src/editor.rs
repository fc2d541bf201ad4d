//! What happens to the note collection when the user leaves the editor.
//!
//! [`plan`] looks at the collection and the draft and decides; [`apply`]
//! performs that decision on a collection. Keeping the two apart lets the
//! session persist the result before it touches in-memory state.

use chrono::{DateTime, Utc};

use crate::models::{Note, NoteDraft, NEW_NOTE_ID};

/// Which note an editor session was opened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    /// The placeholder `"new"` id.
    New,
    Existing(String),
}

impl EditTarget {
    pub fn parse(id: &str) -> Self {
        if id == NEW_NOTE_ID {
            Self::New
        } else {
            Self::Existing(id.to_string())
        }
    }
}

impl std::fmt::Display for EditTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => f.write_str(NEW_NOTE_ID),
            Self::Existing(id) => f.write_str(id),
        }
    }
}

/// Outcome of saving a draft.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// A new note goes to the front of the collection.
    Created(Note),
    /// A new note with no title and no content; nothing is stored.
    Discarded,
    /// An existing note was rewritten and moves to the front.
    Updated(Note),
    /// An existing note was emptied and is now a tombstone in place.
    SoftDeleted(Note),
    /// The draft matches the stored note.
    Unchanged,
    /// The target id is not in the collection.
    Missing,
}

impl EditOutcome {
    /// Whether this outcome changes the collection.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Created(_) | Self::Updated(_) | Self::SoftDeleted(_)
        )
    }

    pub fn note(&self) -> Option<&Note> {
        match self {
            Self::Created(note) | Self::Updated(note) | Self::SoftDeleted(note) => Some(note),
            _ => None,
        }
    }
}

pub fn plan(notes: &[Note], target: &EditTarget, draft: &NoteDraft, now: DateTime<Utc>) -> EditOutcome {
    match target {
        EditTarget::New if draft.is_blank() => EditOutcome::Discarded,
        EditTarget::New => EditOutcome::Created(Note::create(draft, now)),
        EditTarget::Existing(id) => {
            let Some(current) = notes.iter().find(|n| n.id() == id) else {
                return EditOutcome::Missing;
            };
            if draft.is_blank() {
                EditOutcome::SoftDeleted(current.tombstone(now))
            } else if draft.differs_from(current) {
                EditOutcome::Updated(current.revised(draft, now))
            } else {
                EditOutcome::Unchanged
            }
        }
    }
}

/// Soft-delete by id, the same way an emptied note is.
pub fn plan_delete(notes: &[Note], id: &str, now: DateTime<Utc>) -> EditOutcome {
    match notes.iter().find(|n| n.id() == id) {
        Some(current) => EditOutcome::SoftDeleted(current.tombstone(now)),
        None => EditOutcome::Missing,
    }
}

pub fn apply(notes: &mut Vec<Note>, outcome: &EditOutcome) {
    match outcome {
        EditOutcome::Created(note) => notes.insert(0, note.clone()),
        EditOutcome::Updated(note) => {
            notes.retain(|n| n.id() != note.id());
            notes.insert(0, note.clone());
        }
        EditOutcome::SoftDeleted(note) => {
            for existing in notes.iter_mut().filter(|n| n.id() == note.id()) {
                *existing = note.clone();
            }
        }
        EditOutcome::Discarded | EditOutcome::Unchanged | EditOutcome::Missing => {}
    }
}
