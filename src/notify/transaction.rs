use crate::core::{EntityKind, Fields, MirrorError, Record, RecordId, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the broadcast that carries transaction records to display surfaces.
pub const TRANSACTION_CHANNEL: &str = "db-on-transaction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Destroy,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

/// Notification describing one committed mutation.
///
/// Wire form: `{"kind": "Audio", "action": "update", "id": "...", "fields": {...}}`.
/// `fields` is the full post-mutation snapshot for create and update; for
/// destroy only `id` is guaranteed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub kind: EntityKind,
    pub action: Action,
    pub id: RecordId,
    #[serde(default)]
    pub fields: Fields,
}

impl TransactionRecord {
    pub fn new(kind: EntityKind, action: Action, id: RecordId, fields: Fields) -> Self {
        Self {
            kind,
            action,
            id,
            fields,
        }
    }

    pub fn created(record: &Record) -> Self {
        Self::new(record.kind, Action::Create, record.id, record.fields.clone())
    }

    pub fn updated(record: &Record) -> Self {
        Self::new(record.kind, Action::Update, record.id, record.fields.clone())
    }

    pub fn destroyed(kind: EntityKind, id: RecordId) -> Self {
        Self::new(kind, Action::Destroy, id, Fields::new())
    }

    /// The record snapshot carried by a create or update.
    pub fn to_record(&self) -> Record {
        Record::new(self.kind, self.id, self.fields.clone())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Rejects records whose embedded `fields.id` contradicts `id`.
    pub fn validate(&self) -> Result<()> {
        match self.fields.get("id") {
            None => Ok(()),
            Some(Value::Text(embedded)) if *embedded == self.id.to_string() => Ok(()),
            Some(other) => Err(MirrorError::MalformedRecord(format!(
                "{} {} '{}' carries conflicting fields.id {}",
                self.kind, self.action, self.id, other
            ))),
        }
    }

    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_wire(payload: &str) -> Result<Self> {
        let record: Self = serde_json::from_str(payload)?;
        record.validate()?;
        Ok(record)
    }
}
