use chrono::{DateTime, SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Editor placeholder id meaning "this note does not exist yet".
pub const NEW_NOTE_ID: &str = "new";

/// Background color given to notes that never picked one.
pub const DEFAULT_COLOR: &str = "#171717";

/// A client-owned note.
///
/// The note is the JSON object itself, exactly as it was created locally or
/// received from the server. Accessors read the known fields and fall back to
/// neutral values when a field is missing, `null` or of another type; nothing
/// is written back unless a local edit sets it. A sync therefore stores the
/// server's notes unchanged.
///
/// Notes are never removed from the local collection. Deleting one sets
/// `deleted` and the tombstone keeps travelling to the server with every sync.
/// `updatedAt` is refreshed on each local mutation but nothing orders by it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Note {
    fields: Map<String, Value>,
}

/// Lifecycle status carried on every note.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoteStatus {
    #[default]
    Active,
    Archived,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// The fields an editor session lets the user change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub color: String,
    pub pinned: bool,
}

impl Default for NoteDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            color: DEFAULT_COLOR.to_string(),
            pinned: false,
        }
    }
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Start a draft from the stored state of an existing note.
    pub fn from_note(note: &Note) -> Self {
        Self {
            title: note.title().to_string(),
            content: note.content().to_string(),
            color: note.color().to_string(),
            pinned: note.pinned(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    /// Both text fields are empty. Whitespace counts as content.
    pub fn is_blank(&self) -> bool {
        self.title.is_empty() && self.content.is_empty()
    }

    /// Whether saving this draft over `note` would change anything visible.
    pub fn differs_from(&self, note: &Note) -> bool {
        self.title != note.title()
            || self.content != note.content()
            || self.color != note.color()
            || self.pinned != note.pinned()
    }
}

impl Note {
    /// Build a brand-new active note with a fresh random id.
    pub fn create(draft: &NoteDraft, now: DateTime<Utc>) -> Self {
        let mut note = Self::default();
        note.set("id", generate_note_id());
        note.apply_draft(draft);
        note.set("deleted", false);
        note.set("status", NoteStatus::Active.as_str());
        note.touch(now);
        note
    }

    /// Copy of this note carrying the draft's fields, revived if it was deleted.
    /// Fields the draft does not cover are kept as they are.
    pub fn revised(&self, draft: &NoteDraft, now: DateTime<Utc>) -> Self {
        let mut note = self.clone();
        note.apply_draft(draft);
        note.set("deleted", false);
        note.touch(now);
        note
    }

    /// Copy of this note marked as a tombstone.
    pub fn tombstone(&self, now: DateTime<Utc>) -> Self {
        let mut note = self.clone();
        note.set("deleted", true);
        note.touch(now);
        note
    }

    fn apply_draft(&mut self, draft: &NoteDraft) {
        self.set("title", draft.title.as_str());
        self.set("content", draft.content.as_str());
        self.set("color", draft.color.as_str());
        self.set("pinned", draft.pinned);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.set("updatedAt", now.to_rfc3339_opts(SecondsFormat::Millis, true));
    }

    fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    fn bool_field(&self, key: &str) -> bool {
        self.fields
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Empty when the note carries no string id.
    pub fn id(&self) -> &str {
        self.str_field("id").unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.str_field("title").unwrap_or_default()
    }

    pub fn content(&self) -> &str {
        self.str_field("content").unwrap_or_default()
    }

    pub fn color(&self) -> &str {
        self.str_field("color").unwrap_or(DEFAULT_COLOR)
    }

    pub fn pinned(&self) -> bool {
        self.bool_field("pinned")
    }

    pub fn is_deleted(&self) -> bool {
        self.bool_field("deleted")
    }

    pub fn status(&self) -> NoteStatus {
        self.str_field("status")
            .and_then(NoteStatus::parse)
            .unwrap_or_default()
    }

    /// `None` when absent or not an RFC 3339 timestamp.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.str_field("updatedAt")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Raw value of any field, including ones this client does not model.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Random opaque id of the form `note-xxxxxxxxxx-xxxxxxxxxx-xxxxxxxxxx`.
pub fn generate_note_id() -> String {
    let mut rng = rand::thread_rng();
    let mut segment = || -> String {
        (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect()
    };
    format!("note-{}-{}-{}", segment(), segment(), segment())
}

/// Non-deleted notes split the way the note list shows them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteListing {
    pub pinned: Vec<Note>,
    pub others: Vec<Note>,
}

impl NoteListing {
    /// Drop tombstones and group the rest, keeping collection order.
    pub fn from_notes(notes: &[Note]) -> Self {
        let (pinned, others): (Vec<Note>, Vec<Note>) = notes
            .iter()
            .filter(|n| !n.is_deleted())
            .cloned()
            .partition(|n| n.pinned());
        Self { pinned, others }
    }

    pub fn len(&self) -> usize {
        self.pinned.len() + self.others.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_have_expected_shape() {
        let id = generate_note_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "note");
        for part in &parts[1..] {
            assert_eq!(part.len(), 10);
            assert!(part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
        assert_ne!(id, generate_note_id());
    }

    #[test]
    fn sparse_note_reads_neutral_values_without_inventing_fields() {
        let raw = json!({ "id": "n1", "title": "srv" });
        let note: Note = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(note.title(), "srv");
        assert_eq!(note.content(), "");
        assert_eq!(note.color(), DEFAULT_COLOR);
        assert!(!note.pinned());
        assert!(!note.is_deleted());
        assert_eq!(note.status(), NoteStatus::Active);
        assert!(note.updated_at().is_none());

        assert_eq!(serde_json::to_value(&note).unwrap(), raw);
    }

    #[test]
    fn null_fields_are_accepted_and_kept() {
        let raw = json!({
            "id": "n2",
            "title": "t",
            "content": null,
            "color": null,
            "pinned": null,
            "updatedAt": null
        });
        let note: Note = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(note.content(), "");
        assert_eq!(note.color(), DEFAULT_COLOR);
        assert!(!note.pinned());
        assert_eq!(serde_json::to_value(&note).unwrap(), raw);
    }

    #[test]
    fn full_note_round_trips_unchanged() {
        let raw = json!({
            "id": "note-1",
            "title": "t",
            "content": "c",
            "color": "#fff",
            "pinned": true,
            "deleted": false,
            "status": "archived",
            "updatedAt": "2024-05-01T10:00:00Z",
            "_id": "6650c0ffee",
            "owner": "alice"
        });
        let note: Note = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(note.status(), NoteStatus::Archived);
        assert_eq!(note.get("owner"), Some(&json!("alice")));
        assert_eq!(
            note.updated_at().map(|t| t.to_rfc3339()),
            Some("2024-05-01T10:00:00+00:00".to_string())
        );
        assert_eq!(serde_json::to_value(&note).unwrap(), raw);
    }

    #[test]
    fn create_writes_every_known_field() {
        let now = Utc::now();
        let note = Note::create(&NoteDraft::new("a", "b").pinned(true), now);

        assert!(note.id().starts_with("note-"));
        assert_eq!(note.get("deleted"), Some(&json!(false)));
        assert_eq!(note.get("status"), Some(&json!("active")));
        assert_eq!(note.color(), DEFAULT_COLOR);
        assert!(note.pinned());
        assert_eq!(
            note.updated_at().map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
    }

    #[test]
    fn revising_keeps_fields_the_draft_does_not_cover() {
        let note: Note =
            serde_json::from_value(json!({ "id": "n1", "title": "old", "owner": "alice" })).unwrap();
        let revised = note.revised(&NoteDraft::new("new", ""), Utc::now());

        assert_eq!(revised.id(), "n1");
        assert_eq!(revised.title(), "new");
        assert_eq!(revised.get("owner"), Some(&json!("alice")));
        assert!(!revised.is_deleted());
    }

    #[test]
    fn listing_hides_tombstones_and_groups_pinned() {
        let now = Utc::now();
        let a = Note::create(&NoteDraft::new("a", "").pinned(true), now);
        let b = Note::create(&NoteDraft::new("b", ""), now);
        let c = Note::create(&NoteDraft::new("c", "").pinned(true), now).tombstone(now);
        let d = Note::create(&NoteDraft::new("d", ""), now);

        let listing = NoteListing::from_notes(&[a.clone(), b.clone(), c, d.clone()]);
        assert_eq!(listing.pinned, vec![a]);
        assert_eq!(listing.others, vec![b, d]);
        assert_eq!(listing.len(), 3);
    }

    #[test]
    fn draft_blank_ignores_color_and_pin() {
        assert!(NoteDraft::default().pinned(true).with_color("#ff0000").is_blank());
        assert!(!NoteDraft::new(" ", "").is_blank());
    }
}
