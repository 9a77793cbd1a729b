use crate::core::{EntityKind, Fields, MirrorError, Record, RecordId, Result};
use crate::query::FindQuery;
use serde::{Deserialize, Serialize};

/// Every request the gateway understands. Dispatch matches on this
/// exhaustively; there is no string-keyed handler table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    Create { kind: EntityKind, payload: Fields },
    Update { kind: EntityKind, id: RecordId, patch: Fields },
    Destroy { kind: EntityKind, id: RecordId },
    FindAll { kind: EntityKind, query: FindQuery },
    FindOne { kind: EntityKind, query: FindQuery },
}

impl Operation {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Create { kind, .. }
            | Self::Update { kind, .. }
            | Self::Destroy { kind, .. }
            | Self::FindAll { kind, .. }
            | Self::FindOne { kind, .. } => *kind,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Destroy { .. } => "destroy",
            Self::FindAll { .. } => "find-all",
            Self::FindOne { .. } => "find-one",
        }
    }

    /// Stable request channel name, e.g. `audios-find-all`.
    pub fn channel(&self) -> String {
        format!("{}-{}", self.kind().table_name(), self.verb())
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create { .. } | Self::Update { .. } | Self::Destroy { .. })
    }

    pub fn target(&self) -> Option<RecordId> {
        match self {
            Self::Update { id, .. } | Self::Destroy { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Result of a dispatched [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Record(Record),
    Records(Vec<Record>),
    Optional(Option<Record>),
}

impl Reply {
    pub fn into_record(self) -> Result<Record> {
        match self {
            Self::Record(record) => Ok(record),
            other => Err(unexpected("a record", &other)),
        }
    }

    pub fn into_records(self) -> Result<Vec<Record>> {
        match self {
            Self::Records(records) => Ok(records),
            other => Err(unexpected("a record list", &other)),
        }
    }

    pub fn into_optional(self) -> Result<Option<Record>> {
        match self {
            Self::Optional(record) => Ok(record),
            other => Err(unexpected("an optional record", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &Reply) -> MirrorError {
    let shape = match got {
        Reply::Record(_) => "record",
        Reply::Records(_) => "record list",
        Reply::Optional(_) => "optional record",
    };
    MirrorError::Unknown(format!("expected {} reply, got {}", expected, shape))
}
