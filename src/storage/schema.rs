use crate::core::{Column, DataType, EntityKind, Fields, ForeignKey, MirrorError, Result};

/// Timestamps maintained by the gateway; never accepted from callers.
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
pub const MANAGED_FIELDS: [&str; 3] = ["id", CREATED_AT, UPDATED_AT];

pub const TRANSCRIPTION_STATES: &[&str] = &["pending", "processing", "finished"];

/// Column declarations of one entity kind.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    kind: EntityKind,
    columns: Vec<Column>,
    search_columns: Vec<&'static str>,
}

impl EntitySchema {
    pub fn new(kind: EntityKind, columns: Vec<Column>) -> Self {
        Self {
            kind,
            columns,
            search_columns: vec!["name"],
        }
    }

    pub fn searching(mut self, columns: Vec<&'static str>) -> Self {
        self.search_columns = columns;
        self
    }

    /// Built-in declaration for each entity kind.
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Category => Self::new(
                kind,
                vec![Column::new("name", DataType::Text).not_null().unique().length(1, 255)],
            ),
            EntityKind::Audio | EntityKind::Video => Self::new(kind, media_columns())
                .searching(vec!["name", "description"]),
            EntityKind::Transcription => Self::new(
                kind,
                vec![
                    Column::new("targetId", DataType::Text).not_null(),
                    Column::new("targetType", DataType::Text).one_of(&["Audio", "Video"]),
                    Column::new("state", DataType::Text).one_of(TRANSCRIPTION_STATES),
                    Column::new("language", DataType::Text),
                ],
            )
            .searching(vec!["language"]),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn search_columns(&self) -> &[&'static str] {
        &self.search_columns
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.unique)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (&str, &ForeignKey)> {
        self.columns
            .iter()
            .filter_map(|column| column.foreign_key.as_ref().map(|fk| (column.name.as_str(), fk)))
    }

    /// True for declared columns and the managed timestamps.
    pub fn knows(&self, field: &str) -> bool {
        MANAGED_FIELDS.contains(&field) || self.column(field).is_some()
    }

    /// Validates caller-supplied fields. A full payload must satisfy NOT NULL
    /// on every column; a patch only validates what it mentions.
    pub fn validate_payload(&self, fields: &Fields, partial: bool) -> Result<()> {
        for (field, value) in fields {
            if MANAGED_FIELDS.contains(&field.as_str()) {
                return Err(MirrorError::ConstraintViolation(format!(
                    "Field '{}' of {} is managed by the store",
                    field, self.kind
                )));
            }
            let column = self.column(field).ok_or_else(|| {
                MirrorError::ConstraintViolation(format!(
                    "Unknown field '{}' for {}",
                    field, self.kind
                ))
            })?;
            column.validate(value)?;
        }

        if !partial {
            for column in self.columns.iter().filter(|c| !c.nullable) {
                if !fields.contains_key(&column.name) {
                    return Err(MirrorError::ConstraintViolation(format!(
                        "Column '{}' of {} cannot be NULL",
                        column.name, self.kind
                    )));
                }
            }
        }
        Ok(())
    }
}

fn media_columns() -> Vec<Column> {
    vec![
        Column::new("name", DataType::Text).not_null().length(3, 50),
        Column::new("description", DataType::Text),
        Column::new("categoryId", DataType::Text).references(EntityKind::Category),
        Column::new("source", DataType::Text),
        Column::new("duration", DataType::Float),
        Column::new("recordingsCount", DataType::Integer),
        Column::new("recordingsDuration", DataType::Integer),
        Column::new("transcribing", DataType::Boolean),
        Column::new("transcribed", DataType::Boolean),
    ]
}
