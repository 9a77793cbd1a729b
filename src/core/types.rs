use super::{DataType, MirrorError, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Field name to value mapping of a record.
pub type Fields = BTreeMap<String, Value>;

/// Stable, never reused identifier of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| MirrorError::TypeMismatch(format!("invalid record id '{}': {}", s, e)))
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        Value::Text(id.to_string())
    }
}

/// Entity kinds known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Category,
    Audio,
    Video,
    Transcription,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Category,
        EntityKind::Audio,
        EntityKind::Video,
        EntityKind::Transcription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "Category",
            Self::Audio => "Audio",
            Self::Video => "Video",
            Self::Transcription => "Transcription",
        }
    }

    /// Plural table name, also the prefix of the gateway channel names.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Audio => "audios",
            Self::Video => "videos",
            Self::Transcription => "transcriptions",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s) || kind.table_name() == s)
            .ok_or_else(|| MirrorError::TypeMismatch(format!("unknown entity kind '{}'", s)))
    }
}

/// A serialized copy of one stored entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub kind: EntityKind,
    pub fields: Fields,
}

impl Record {
    pub fn new(kind: EntityKind, id: RecordId, fields: Fields) -> Self {
        Self { id, kind, fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field value, treating a missing field as NULL.
    pub fn value(&self, field: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(field).unwrap_or(&NULL)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.text("name")
    }

    /// Field-wise overwrite; fields absent from `patch` are kept.
    pub fn merge(&mut self, patch: &Fields) {
        for (field, value) in patch {
            self.fields.insert(field.clone(), value.clone());
        }
    }
}

/// Referential action taken on dependents when the referenced record is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    SetNull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub references: EntityKind,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub unique: bool,
    pub length: Option<(usize, usize)>,
    pub allowed: Option<&'static [&'static str]>,
    pub foreign_key: Option<ForeignKey>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            unique: false,
            length: None,
            allowed: None,
            foreign_key: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Inclusive bounds on the trimmed character count of a text value.
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.length = Some((min, max));
        self
    }

    pub fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn references(mut self, kind: EntityKind) -> Self {
        self.foreign_key = Some(ForeignKey {
            references: kind,
            on_delete: OnDelete::SetNull,
        });
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(MirrorError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(MirrorError::TypeMismatch(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        if let (Some((min, max)), Some(text)) = (self.length, value.as_str()) {
            let len = text.trim().chars().count();
            if len < min || len > max {
                return Err(MirrorError::ConstraintViolation(format!(
                    "Column '{}' must be between {} and {} characters, got {}",
                    self.name, min, max, len
                )));
            }
        }

        if let (Some(allowed), Some(text)) = (self.allowed, value.as_str())
            && !allowed.contains(&text)
        {
            return Err(MirrorError::ConstraintViolation(format!(
                "Column '{}' must be one of {:?}, got '{}'",
                self.name, allowed, text
            )));
        }

        Ok(())
    }
}
