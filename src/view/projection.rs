//! Cross-entity projection.
//!
//! A view only folds records of its own kind. Records of other kinds reach it
//! through a declared table of `(source kind, action, view kind) → effect`
//! rules; anything without a rule is dropped.

use crate::core::{EntityKind, Fields, RecordId, Value};
use crate::notify::{Action, TransactionRecord};
use std::str::FromStr;
use tracing::debug;

/// Turns the fields of a source record into the patch applied to the target.
pub type DeriveFields = fn(&Fields) -> Fields;

#[derive(Debug, Clone, Copy)]
pub enum Effect {
    /// Rewrite into an `update` of the view kind. The target id is read from
    /// `link_field`; when the source also carries `kind_field`, it must name
    /// the view kind.
    Rewrite {
        link_field: &'static str,
        kind_field: Option<&'static str>,
        derive: DeriveFields,
    },
    /// The view's cached list of this kind must be reloaded.
    MarkLookupStale(EntityKind),
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectionRule {
    pub source: EntityKind,
    /// `None` matches every action.
    pub action: Option<Action>,
    pub view: EntityKind,
    pub effect: Effect,
}

impl ProjectionRule {
    fn matches(&self, record: &TransactionRecord, view: EntityKind) -> bool {
        self.source == record.kind
            && self.view == view
            && self.action.is_none_or(|action| action == record.action)
    }
}

/// What a transaction record means for one view.
#[derive(Debug, Clone, PartialEq)]
pub enum Projected {
    /// Record of the view's own kind, or a rewrite targeting it.
    Apply(TransactionRecord),
    LookupStale(EntityKind),
}

#[derive(Debug, Clone)]
pub struct ProjectionTable {
    rules: Vec<ProjectionRule>,
}

impl Default for ProjectionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProjectionTable {
    pub fn new(rules: Vec<ProjectionRule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Transcription progress onto media rows, category changes onto the
    /// category lookup of media views.
    pub fn builtin() -> Self {
        let mut rules = Vec::new();
        for view in [EntityKind::Audio, EntityKind::Video] {
            rules.push(ProjectionRule {
                source: EntityKind::Transcription,
                action: Some(Action::Update),
                view,
                effect: Effect::Rewrite {
                    link_field: "targetId",
                    kind_field: Some("targetType"),
                    derive: transcription_progress,
                },
            });
            rules.push(ProjectionRule {
                source: EntityKind::Category,
                action: None,
                view,
                effect: Effect::MarkLookupStale(EntityKind::Category),
            });
        }
        Self::new(rules)
    }

    pub fn with_rule(mut self, rule: ProjectionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[ProjectionRule] {
        &self.rules
    }

    /// Lookup kinds a view of `view` kind keeps cached.
    pub fn lookups_for(&self, view: EntityKind) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self
            .rules
            .iter()
            .filter(|rule| rule.view == view)
            .filter_map(|rule| match rule.effect {
                Effect::MarkLookupStale(kind) => Some(kind),
                Effect::Rewrite { .. } => None,
            })
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub fn project(&self, record: &TransactionRecord, view: EntityKind) -> Vec<Projected> {
        if record.kind == view {
            return vec![Projected::Apply(record.clone())];
        }

        self.rules
            .iter()
            .filter(|rule| rule.matches(record, view))
            .filter_map(|rule| match rule.effect {
                Effect::MarkLookupStale(kind) => Some(Projected::LookupStale(kind)),
                Effect::Rewrite {
                    link_field,
                    kind_field,
                    derive,
                } => rewrite(record, view, link_field, kind_field, derive).map(Projected::Apply),
            })
            .collect()
    }
}

fn rewrite(
    record: &TransactionRecord,
    view: EntityKind,
    link_field: &str,
    kind_field: Option<&str>,
    derive: DeriveFields,
) -> Option<TransactionRecord> {
    if let Some(Value::Text(target_kind)) = kind_field.and_then(|field| record.field(field))
        && target_kind != view.as_str()
    {
        return None;
    }

    let target = record.field(link_field).and_then(Value::as_str)?;
    let Ok(id) = RecordId::from_str(target) else {
        debug!(kind = %record.kind, link_field, target, "projection link is not a record id");
        return None;
    };
    Some(TransactionRecord::new(view, Action::Update, id, derive(&record.fields)))
}

fn transcription_progress(fields: &Fields) -> Fields {
    let state = fields.get("state").and_then(Value::as_str);
    Fields::from([
        ("transcribing".to_string(), Value::Boolean(state == Some("processing"))),
        ("transcribed".to_string(), Value::Boolean(state == Some("finished"))),
    ])
}
