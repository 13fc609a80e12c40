pub mod catalog;
pub mod coercion;
pub mod config;
pub mod error;
mod lib_helpers;
pub mod migration;
pub mod mutation;
pub mod permission;
pub mod persist;
pub mod source;
pub mod store;
pub mod template;
pub mod view;

use crate::catalog::dates::DateFormat;
use crate::catalog::schema::TableSchema;
use crate::catalog::types::CellValue;
use crate::coercion::{CoercionContext, sanitize};
use crate::config::{IfMissing, RuntimeConfig, TableConfig};
use crate::error::PowerTableError;
use crate::lib_helpers::*;
use crate::migration::{MigrationReport, default_row, migrate_rows};
use crate::mutation::{
    MutationOutcome, RejectReason, ensure_live_rows, generate_row_id, next_cycle_value,
    prune_missing, stepped_number, write_cell,
};
use crate::permission::{
    Principal, PrincipalResolver, StaticPrincipal, column_editable, table_editable,
};
use crate::persist::{PendingSave, SaveDispatcher, SaveHook, SaveReason};
use crate::source::{
    AttributeSource, EntityStoreReader, HostStates, LiveRecord, LiveSource, NoSource,
};
use crate::store::{
    LAST_UPDATED_KEY, OverrideStore, StoreReader, StoreWriter, decode_document, encode_document,
    normalize_for_save,
};
use crate::template::TemplateContext;
use crate::view::{TableView, ViewContext, compute_with_schema};
use chrono::{Local, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub use crate::catalog::schema::{Column, ColumnKind};
pub use crate::view::ViewRow;

/// Source of "now" for defaults, templates and save timestamps.
pub trait Clock: Send + Sync {
    /// Local wall-clock time.
    fn now(&self) -> NaiveDateTime;
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// The human confirmation a row deletion waits for.
pub trait ConfirmDelete: Send + Sync {
    fn confirm_delete(&self, item_id: &str) -> bool;
}

/// Confirmation answered up front, e.g. by a `--yes` flag.
#[derive(Debug, Clone, Copy)]
pub struct PresetConfirmation(pub bool);

impl ConfirmDelete for PresetConfirmation {
    fn confirm_delete(&self, _item_id: &str) -> bool {
        self.0
    }
}

/// Collaborators supplied by the host.
#[derive(Clone)]
pub struct HostAdapters {
    pub source: Arc<dyn LiveSource>,
    pub reader: Arc<dyn StoreReader>,
    pub writer: Arc<dyn StoreWriter>,
    pub principal: Arc<dyn PrincipalResolver>,
    pub states: Option<Arc<dyn HostStates>>,
    pub confirmation: Option<Arc<dyn ConfirmDelete>>,
    pub clock: Arc<dyn Clock>,
}

impl HostAdapters {
    pub fn new(
        source: Arc<dyn LiveSource>,
        reader: Arc<dyn StoreReader>,
        writer: Arc<dyn StoreWriter>,
    ) -> Self {
        Self {
            source,
            reader,
            writer,
            principal: Arc::new(StaticPrincipal::anonymous()),
            states: None,
            confirmation: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Adapters reading both the live feed and the persisted document from
    /// host entity states.
    pub fn from_states(states: Arc<dyn HostStates>, writer: Arc<dyn StoreWriter>) -> Self {
        Self::new(
            Arc::new(AttributeSource::new(Arc::clone(&states))),
            Arc::new(EntityStoreReader::new(Arc::clone(&states))),
            writer,
        )
        .with_states(states)
    }

    /// Adapters for standalone tables: no live source at all.
    pub fn standalone(reader: Arc<dyn StoreReader>, writer: Arc<dyn StoreWriter>) -> Self {
        Self::new(Arc::new(NoSource), reader, writer)
    }

    pub fn with_principal(mut self, principal: Arc<dyn PrincipalResolver>) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_states(mut self, states: Arc<dyn HostStates>) -> Self {
        self.states = Some(states);
        self
    }

    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmDelete>) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Result of one read of live data and store.
#[derive(Debug)]
pub struct TableSnapshot {
    pub records: Vec<LiveRecord>,
    /// Store after migration to the current columns.
    pub store: OverrideStore,
    pub migration: MigrationReport,
    /// Deferred re-save scheduled because the read migrated rows.
    pub resave: Option<PendingSave>,
}

/// Everything one mutation works against, read once.
struct EditState {
    now: NaiveDateTime,
    records: Vec<LiveRecord>,
    store: OverrideStore,
    view: TableView,
}

pub struct PowerTable {
    config: TableConfig,
    schema: TableSchema,
    date_format: DateFormat,
    runtime: RuntimeConfig,
    host: HostAdapters,
    saves: SaveDispatcher,
}

impl PowerTable {
    /// Validates the configuration and wires the collaborators.
    pub fn new(config: TableConfig, host: HostAdapters) -> Result<Self, PowerTableError> {
        config.validate()?;
        let schema = config.schema();
        let date_format = config.date_format();
        let saves = SaveDispatcher::new(Arc::clone(&host.writer));
        debug!(
            columns = schema.columns().len(),
            slots = schema.slot_count(),
            standalone = config.standalone_mode,
            "power table configured"
        );
        Ok(Self {
            config,
            schema,
            date_format,
            runtime: RuntimeConfig::default(),
            host,
            saves,
        })
    }

    pub fn with_runtime_config(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn add_save_hook(&self, hook: Arc<dyn SaveHook>) {
        self.saves.add_hook(hook);
    }

    pub fn remove_save_hook(&self, hook: &Arc<dyn SaveHook>) {
        self.saves.remove_hook(hook);
    }

    pub fn is_pure_readonly(&self) -> bool {
        self.config.is_pure_readonly()
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.host.principal.current_principal()
    }

    pub fn is_table_editable(&self) -> bool {
        table_editable(&self.config.editable, self.current_principal().as_ref())
    }

    /// Whether the visible column at `col_index` accepts edits from the
    /// current principal.
    pub fn is_column_editable(&self, col_index: usize) -> bool {
        let principal = self.current_principal();
        self.schema
            .display_column(col_index)
            .is_some_and(|(_, column)| {
                column_editable(column, &self.config.editable, principal.as_ref())
            })
    }

    /// Column editability plus the row rule: missing rows are read-only
    /// under `if_missing: disable`.
    pub fn is_cell_editable(&self, item_id: &str, col_index: usize) -> bool {
        if !self.is_column_editable(col_index) {
            return false;
        }
        if self.disables_missing_rows() {
            // Read without scheduling a migration re-save.
            return match self.read_for_edit() {
                Ok(state) => !state.view.row_by_id(item_id).is_some_and(|row| row.is_missing),
                Err(err) => {
                    debug!(code = err.code_str(), error = %err, "store unreadable, cell not editable");
                    false
                }
            };
        }
        true
    }

    /// Reads live records and the store, migrating stale rows. A migration
    /// schedules a delayed re-save of the corrected store.
    pub fn snapshot(&self) -> TableSnapshot {
        let now = self.host.clock.now();
        let ctx = self.coercion(now);
        let records = self.fetch_records();
        let (store, migration) = match self.load_store(&ctx) {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(code = err.code_str(), error = %err, "store unreadable, rendering without overrides");
                (OverrideStore::new(), MigrationReport::default())
            }
        };
        let resave = if migration.is_empty() {
            None
        } else {
            self.schedule_migration_resave(&store, &ctx)
        };
        TableSnapshot {
            records,
            store,
            migration,
            resave,
        }
    }

    /// Current table view: live data merged with the store, sorted.
    pub fn table_view(&self) -> TableView {
        let now = self.host.clock.now();
        let snapshot = self.snapshot();
        let ctx = self.coercion(now);
        compute_with_schema(
            &self.config,
            &self.schema,
            &snapshot.records,
            &snapshot.store,
            &ViewContext::new(ctx, &self.runtime.missing_placeholder),
        )
    }

    /// The view with every cell sanitized for its column type.
    pub fn sanitized_view(&self) -> TableView {
        let now = self.host.clock.now();
        self.table_view().sanitized(&self.coercion(now))
    }

    /// Validates, sanitizes and writes one cell, then persists the store.
    pub fn update_cell(
        &self,
        row_index: usize,
        col_index: usize,
        item_id: &str,
        value: CellValue,
    ) -> Result<MutationOutcome, PowerTableError> {
        if self.is_pure_readonly() {
            return Ok(MutationOutcome::Rejected(RejectReason::ReadOnlyTable));
        }
        let state = self.read_for_edit()?;
        debug!(row = row_index, col = col_index, item_id, "cell update requested");
        self.commit_cell(state, col_index, item_id, value)
    }

    /// Flips a checkbox cell.
    pub fn toggle_checkbox(
        &self,
        row_index: usize,
        col_index: usize,
        item_id: &str,
    ) -> Result<MutationOutcome, PowerTableError> {
        self.edit_with(row_index, col_index, item_id, |_, current| {
            Ok(CellValue::Bool(!current.truthy()))
        })
    }

    /// Moves a number cell by `delta` steps, clamped to the column bounds.
    pub fn step_number(
        &self,
        row_index: usize,
        col_index: usize,
        item_id: &str,
        delta: f64,
    ) -> Result<MutationOutcome, PowerTableError> {
        self.edit_with(row_index, col_index, item_id, |column, current| {
            let (min, max, step) = match column.kind {
                ColumnKind::Number { min, max, step } => (min, max, step),
                _ => (None, None, None),
            };
            Ok(CellValue::Number(stepped_number(current, delta, min, max, step)))
        })
    }

    /// Advances a cycle (or dropdown) cell to its next option.
    pub fn cycle_value(
        &self,
        row_index: usize,
        col_index: usize,
        item_id: &str,
    ) -> Result<MutationOutcome, PowerTableError> {
        self.edit_with(row_index, col_index, item_id, |column, current| {
            next_cycle_value(column.options(), current).ok_or(RejectReason::NoOptions)
        })
    }

    /// Inserts a defaulted row after store position `row_index`, or at the
    /// end when `None`. Standalone only.
    pub fn add_row_below(
        &self,
        row_index: Option<usize>,
    ) -> Result<MutationOutcome, PowerTableError> {
        if let Some(reason) = self.row_structure_rejection() {
            return Ok(MutationOutcome::Rejected(reason));
        }
        let now = self.host.clock.now();
        let ctx = self.coercion(now);
        let (mut store, _) = self.load_store(&ctx)?;
        let row_id = generate_row_id(self.host.clock.now_millis());
        let at = row_index.map_or(store.len(), |idx| idx.saturating_add(1));
        store.insert_at(at, row_id.as_str(), default_row(&self.schema, &ctx));
        debug!(item_id = %row_id, position = at, "row added");
        self.persist(store, &ctx, SaveReason::RowStructure)
            .map(MutationOutcome::Applied)
    }

    /// Swaps store rows `row_index - 1` and `row_index`. Standalone only.
    pub fn swap_rows_up(&self, row_index: usize) -> Result<MutationOutcome, PowerTableError> {
        if row_index == 0 {
            return Ok(MutationOutcome::Rejected(RejectReason::RowOutOfRange));
        }
        self.swap_rows(row_index - 1, row_index)
    }

    /// Swaps store rows `row_index` and `row_index + 1`. Standalone only.
    pub fn swap_rows_down(&self, row_index: usize) -> Result<MutationOutcome, PowerTableError> {
        self.swap_rows(row_index, row_index.saturating_add(1))
    }

    /// Deletes a stored row once the host confirms it. Standalone only.
    pub fn delete_row(&self, item_id: &str) -> Result<MutationOutcome, PowerTableError> {
        if let Some(reason) = self.row_structure_rejection() {
            return Ok(MutationOutcome::Rejected(reason));
        }
        let confirmed = self
            .host
            .confirmation
            .as_ref()
            .is_some_and(|confirm| confirm.confirm_delete(item_id));
        if !confirmed {
            debug!(item_id, "row deletion not confirmed");
            return Ok(MutationOutcome::Rejected(RejectReason::NotConfirmed));
        }
        let now = self.host.clock.now();
        let ctx = self.coercion(now);
        let (mut store, _) = self.load_store(&ctx)?;
        if store.remove(item_id).is_none() {
            return Ok(MutationOutcome::Rejected(RejectReason::UnknownRow));
        }
        self.persist(store, &ctx, SaveReason::RowStructure)
            .map(MutationOutcome::Applied)
    }

    /// Expands `{{ ... }}` expressions against the current user and states.
    pub fn expand_template(&self, text: &str) -> String {
        let principal = self.current_principal();
        let mut ctx = TemplateContext::new(self.host.clock.now())
            .with_user(principal.as_ref().map(|p| p.id.as_str()));
        if let Some(states) = self.host.states.as_deref() {
            ctx = ctx.with_states(states);
        }
        template::expand(text, &ctx)
    }

    fn coercion(&self, now: NaiveDateTime) -> CoercionContext<'_> {
        CoercionContext::new(&self.date_format, now)
    }

    fn disables_missing_rows(&self) -> bool {
        !self.config.standalone_mode && self.config.if_missing == IfMissing::Disable
    }

    fn fetch_records(&self) -> Vec<LiveRecord> {
        if self.config.standalone_mode {
            return Vec::new();
        }
        let Some(source) = &self.config.data_source else {
            return Vec::new();
        };
        match self.host.source.fetch(source) {
            Ok(records) => {
                debug!(entity_id = %source.entity_id, records = records.len(), "live records fetched");
                records
            }
            Err(err) => {
                warn!(
                    entity_id = %source.entity_id,
                    code = err.code_str(),
                    error = %err,
                    "live source unavailable, treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn load_store(
        &self,
        ctx: &CoercionContext<'_>,
    ) -> Result<(OverrideStore, MigrationReport), PowerTableError> {
        if self.is_pure_readonly() {
            return Ok((OverrideStore::new(), MigrationReport::default()));
        }
        let Some(entity) = self.config.entity.as_deref() else {
            return Ok((OverrideStore::new(), MigrationReport::default()));
        };
        let document = self
            .host
            .reader
            .read_store(entity)
            .map_err(|err| store_unavailable(entity, err))?;
        let raw = document.as_ref().map(decode_document).unwrap_or_default();
        Ok(migrate_rows(raw, &self.schema, ctx))
    }

    fn read_for_edit(&self) -> Result<EditState, PowerTableError> {
        let now = self.host.clock.now();
        let ctx = self.coercion(now);
        let records = self.fetch_records();
        let (store, _) = self.load_store(&ctx)?;
        let view = compute_with_schema(
            &self.config,
            &self.schema,
            &records,
            &store,
            &ViewContext::new(ctx, &self.runtime.missing_placeholder),
        );
        Ok(EditState {
            now,
            records,
            store,
            view,
        })
    }

    /// Shared path of the cell helpers: resolves the current value from the
    /// view and lets `next` compute the new one.
    fn edit_with(
        &self,
        row_index: usize,
        col_index: usize,
        item_id: &str,
        next: impl FnOnce(&Column, &CellValue) -> Result<CellValue, RejectReason>,
    ) -> Result<MutationOutcome, PowerTableError> {
        if self.is_pure_readonly() {
            return Ok(MutationOutcome::Rejected(RejectReason::ReadOnlyTable));
        }
        let Some((_, column)) = self.schema.display_column(col_index) else {
            return Ok(MutationOutcome::Rejected(RejectReason::UnknownColumn));
        };
        if let Some(reason) = self.column_rejection(column) {
            return Ok(MutationOutcome::Rejected(reason));
        }
        let state = self.read_for_edit()?;
        let current = current_cell(&state.view, row_index, col_index, item_id)
            .cloned()
            .unwrap_or_default();
        match next(column, &current) {
            Ok(value) => self.commit_cell(state, col_index, item_id, value),
            Err(reason) => Ok(MutationOutcome::Rejected(reason)),
        }
    }

    fn column_rejection(&self, column: &Column) -> Option<RejectReason> {
        if column.is_content() {
            return Some(RejectReason::ContentColumn);
        }
        let principal = self.current_principal();
        if !column_editable(column, &self.config.editable, principal.as_ref()) {
            return Some(RejectReason::NotEditable);
        }
        None
    }

    fn commit_cell(
        &self,
        state: EditState,
        col_index: usize,
        item_id: &str,
        value: CellValue,
    ) -> Result<MutationOutcome, PowerTableError> {
        let EditState {
            now,
            records,
            mut store,
            view,
        } = state;
        let Some((full_idx, column)) = self.schema.display_column(col_index) else {
            return Ok(MutationOutcome::Rejected(RejectReason::UnknownColumn));
        };
        if let Some(reason) = self.column_rejection(column) {
            warn!(column = %column.name, reason = reason.as_str(), "edit rejected");
            return Ok(MutationOutcome::Rejected(reason));
        }
        if item_id == LAST_UPDATED_KEY {
            warn!(item_id, "edit rejected for reserved identity");
            return Ok(MutationOutcome::Rejected(RejectReason::ReservedIdentity));
        }
        if self.disables_missing_rows()
            && view.row_by_id(item_id).is_some_and(|row| row.is_missing)
        {
            warn!(item_id, "edit rejected for missing row");
            return Ok(MutationOutcome::Rejected(RejectReason::MissingRowDisabled));
        }

        let ctx = self.coercion(now);
        let value = sanitize(value, &column.kind, &ctx);
        write_cell(&mut store, &self.schema, item_id, full_idx, value, &ctx);

        if !self.config.standalone_mode {
            let primary_key = self.config.primary_key().unwrap_or_default();
            let live = live_ids_in_order(&records, primary_key);
            if self.config.if_missing == IfMissing::Remove {
                let live_set: HashSet<String> = live.iter().cloned().collect();
                let removed = prune_missing(&mut store, &live_set);
                if !removed.is_empty() {
                    debug!(removed = removed.len(), "pruned rows without live records");
                }
            }
            ensure_live_rows(&mut store, live.iter().map(String::as_str), &self.schema, &ctx);
        }
        self.persist(store, &ctx, SaveReason::Edit)
            .map(MutationOutcome::Applied)
    }

    fn row_structure_rejection(&self) -> Option<RejectReason> {
        if !self.config.standalone_mode {
            return Some(RejectReason::NotStandalone);
        }
        if !self.is_table_editable() {
            return Some(RejectReason::NotEditable);
        }
        None
    }

    fn swap_rows(&self, a: usize, b: usize) -> Result<MutationOutcome, PowerTableError> {
        if let Some(reason) = self.row_structure_rejection() {
            return Ok(MutationOutcome::Rejected(reason));
        }
        let now = self.host.clock.now();
        let ctx = self.coercion(now);
        let (mut store, _) = self.load_store(&ctx)?;
        if !store.swap_positions(a, b) {
            return Ok(MutationOutcome::Rejected(RejectReason::RowOutOfRange));
        }
        self.persist(store, &ctx, SaveReason::RowStructure)
            .map(MutationOutcome::Applied)
    }

    fn persist(
        &self,
        mut store: OverrideStore,
        ctx: &CoercionContext<'_>,
        reason: SaveReason,
    ) -> Result<PendingSave, PowerTableError> {
        let entity = self.storage_entity()?;
        normalize_for_save(&mut store, &self.schema, ctx);
        let document = encode_document(&store, self.host.clock.now_millis());
        Ok(self
            .saves
            .dispatch(entity, document, reason, store.len(), None))
    }

    fn schedule_migration_resave(
        &self,
        store: &OverrideStore,
        ctx: &CoercionContext<'_>,
    ) -> Option<PendingSave> {
        let entity = self.storage_entity().ok()?;
        let mut store = store.clone();
        normalize_for_save(&mut store, &self.schema, ctx);
        let document = encode_document(&store, self.host.clock.now_millis());
        Some(self.saves.dispatch(
            entity,
            document,
            SaveReason::Migration,
            store.len(),
            Some(self.runtime.migration_resave_delay),
        ))
    }

    fn storage_entity(&self) -> Result<&str, PowerTableError> {
        self.config
            .entity
            .as_deref()
            .filter(|entity| !entity.trim().is_empty())
            .ok_or_else(|| PowerTableError::invalid_config("storage entity is not set"))
    }
}
