// ============================================================================
// Query controller
// ============================================================================
//
// Owns one view's state and decides when to fetch.
//
//   Idle ──invalidate / load_more──> Fetching ──complete──> Idle
//
// - At most one fetch is in flight. Requests made meanwhile are suppressed;
//   an invalidating one is remembered and issued when the in-flight fetch
//   lands, and that fetch's result is discarded.
// - Every fetch carries a generation number; results for any other
//   generation are ignored.
// - Records applied while a fetch is in flight are replayed onto the page
//   when it lands, since the page may have been read before they committed.
// - Lookup fetches carry their own per-kind generation; only the newest
//   result for a kind is installed.
//
// ============================================================================

use super::{ProjectionTable, SortOption, ViewState, reducer};
use crate::core::{EntityKind, MirrorError, Record, RecordId, Result, Value};
use crate::notify::TransactionRecord;
use crate::query::{Collator, FindQuery, SortDirection};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
}

/// A fetch the caller must run against the gateway and hand back through
/// [`QueryController::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub kind: EntityKind,
    pub query: FindQuery,
    pub append: bool,
}

/// A lookup fetch; hand the result back through
/// [`QueryController::set_lookup`] with the same generation.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTicket {
    pub generation: u64,
    pub kind: EntityKind,
    pub query: FindQuery,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    generation: u64,
    append: bool,
}

pub struct QueryController {
    state: ViewState,
    table: Arc<ProjectionTable>,
    search_columns: Vec<&'static str>,
    collator: Collator,
    generation: u64,
    in_flight: Option<InFlight>,
    refetch_pending: bool,
    replay: Vec<TransactionRecord>,
    lookups: BTreeMap<EntityKind, Vec<Record>>,
    lookup_generations: BTreeMap<EntityKind, u64>,
    last_error: Option<MirrorError>,
}

impl QueryController {
    pub fn new(state: ViewState, table: Arc<ProjectionTable>, search_columns: Vec<&'static str>) -> Self {
        let mut state = state;
        state.stale_lookups.extend(table.lookups_for(state.kind));
        Self {
            state,
            table,
            search_columns,
            collator: Collator::new(),
            generation: 0,
            in_flight: None,
            refetch_pending: false,
            replay: Vec::new(),
            lookups: BTreeMap::new(),
            lookup_generations: BTreeMap::new(),
            last_error: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight.is_some() {
            Phase::Fetching
        } else {
            Phase::Idle
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == Phase::Fetching
    }

    pub fn last_error(&self) -> Option<&MirrorError> {
        self.last_error.as_ref()
    }

    pub fn lookups(&self) -> &BTreeMap<EntityKind, Vec<Record>> {
        &self.lookups
    }

    /// Reloads the first page with the current filters.
    pub fn refresh(&mut self) -> Option<FetchTicket> {
        self.invalidate()
    }

    pub fn set_query(&mut self, query: impl Into<String>) -> Option<FetchTicket> {
        let query = query.into();
        if self.state.filters.query == query {
            return None;
        }
        self.state.filters.query = query;
        self.invalidate()
    }

    pub fn set_filter(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<FetchTicket> {
        let field = field.into();
        let value = value.into();
        if self.state.filters.equality.get(&field) == Some(&value) {
            return None;
        }
        self.state.filters.equality.insert(field, value);
        self.invalidate()
    }

    pub fn clear_filter(&mut self, field: &str) -> Option<FetchTicket> {
        self.state.filters.equality.remove(field)?;
        self.invalidate()
    }

    pub fn set_sort(&mut self, sort: SortOption) -> Option<FetchTicket> {
        if self.state.filters.sort == sort {
            return None;
        }
        self.state.filters.sort = sort;
        self.invalidate()
    }

    /// Next page, if there is one and nothing is in flight.
    pub fn load_more(&mut self) -> Option<FetchTicket> {
        if !self.state.has_more || self.in_flight.is_some() {
            return None;
        }
        Some(self.begin(true))
    }

    /// Hands back the result of a fetch. Returns the follow-up fetch to run
    /// when an invalidation was suppressed meanwhile.
    pub fn complete(&mut self, generation: u64, result: Result<Vec<Record>>) -> Option<FetchTicket> {
        let in_flight = match self.in_flight {
            Some(in_flight) if in_flight.generation == generation => in_flight,
            _ => {
                debug!(view = %self.state.kind, generation, "ignoring stale fetch result");
                return None;
            }
        };
        self.in_flight = None;

        if self.refetch_pending {
            self.refetch_pending = false;
            debug!(view = %self.state.kind, generation, "discarding result fetched with stale filters");
            return Some(self.begin(false));
        }

        match result {
            Ok(page) => {
                let page = self.collate(page);
                let returned = page.len();
                if in_flight.append {
                    let known: HashSet<RecordId> = self.state.ids().into_iter().collect();
                    self.state
                        .items
                        .extend(page.into_iter().filter(|record| !known.contains(&record.id)));
                } else {
                    self.state.items = page;
                }
                let replayed = self.replay.len();
                for record in std::mem::take(&mut self.replay) {
                    self.fold(&record);
                }
                self.state.offset = self.state.items.len();
                self.state.has_more = returned >= self.state.limit;
                self.last_error = None;
                debug!(view = %self.state.kind, returned, replayed, total = self.state.items.len(),
                    has_more = self.state.has_more, "fetch completed");
            }
            Err(err) => {
                self.replay.clear();
                warn!(view = %self.state.kind, error = %err, "fetch failed");
                self.last_error = Some(err);
            }
        }
        None
    }

    /// Folds a transaction record, then drops created or updated items the
    /// filters no longer admit.
    pub fn apply(&mut self, record: &TransactionRecord) {
        if self.in_flight.is_some() {
            self.replay.push(record.clone());
        }
        self.fold(record);
    }

    fn fold(&mut self, record: &TransactionRecord) {
        let touched = match reducer::try_apply(&mut self.state, record, &self.table) {
            Ok(touched) => touched,
            Err(err) => {
                warn!(view = %self.state.kind, error = %err, "dropping transaction record");
                return;
            }
        };

        for id in touched {
            let admitted = self
                .state
                .get(&id)
                .is_none_or(|item| self.state.filters.admits(item, &self.search_columns));
            if !admitted {
                self.state.items.retain(|item| item.id != id);
            }
        }
    }

    /// Fetches for the lookup kinds that must be re-read; clears the stale set.
    /// Each supersedes any earlier lookup fetch of the same kind.
    pub fn take_stale_lookups(&mut self) -> Vec<LookupTicket> {
        std::mem::take(&mut self.state.stale_lookups)
            .into_iter()
            .map(|kind| {
                let generation = self.lookup_generations.entry(kind).or_default();
                *generation += 1;
                LookupTicket {
                    generation: *generation,
                    kind,
                    query: FindQuery::new().order_by("name", SortDirection::Asc),
                }
            })
            .collect()
    }

    pub fn set_lookup(&mut self, kind: EntityKind, generation: u64, result: Result<Vec<Record>>) {
        if self.lookup_generations.get(&kind) != Some(&generation) {
            debug!(view = %self.state.kind, lookup = %kind, generation, "ignoring superseded lookup");
            return;
        }
        match result {
            Ok(mut records) => {
                self.collator
                    .sort_by_key(&mut records, false, |record| record.name().unwrap_or_default());
                self.lookups.insert(kind, records);
            }
            Err(err) => {
                warn!(view = %self.state.kind, lookup = %kind, error = %err, "lookup refresh failed");
                self.last_error = Some(err);
            }
        }
    }

    fn invalidate(&mut self) -> Option<FetchTicket> {
        self.state.items.clear();
        self.state.offset = 0;
        self.state.has_more = false;

        if self.in_flight.is_some() {
            self.refetch_pending = true;
            return None;
        }
        Some(self.begin(false))
    }

    fn begin(&mut self, append: bool) -> FetchTicket {
        self.generation += 1;
        self.in_flight = Some(InFlight {
            generation: self.generation,
            append,
        });

        let offset = if append { self.state.items.len() } else { 0 };
        let query = self.state.filters.to_find_query(offset, self.state.limit);
        debug!(view = %self.state.kind, generation = self.generation, offset, append, "fetch issued");

        FetchTicket {
            generation: self.generation,
            kind: self.state.kind,
            query,
            append,
        }
    }

    fn collate(&self, mut page: Vec<Record>) -> Vec<Record> {
        let sort = self.state.filters.sort;
        if sort.is_client_collated() {
            self.collator
                .sort_by_key(&mut page, sort.is_descending(), |record| record.name().unwrap_or_default());
        }
        page
    }
}
