//! Owns the search index definition for a run.
//!
//! The manager keeps a local view of the live schema so duplicate aliases are
//! caught before a request is sent. The view only grows.

use crate::CoreError;
use indexquake_schema::{FieldDescriptor, FieldType, IndexName, IndexSchema, Namespace};
use indexquake_store::{ConnectionPool, StoreConnection, StoreError};
use rand::{Rng, RngCore};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub const RANDOM_FIELD_RANGE: u32 = 1000;

const RANDOM_FIELD_TYPES: [FieldType; 3] = [FieldType::Text, FieldType::Numeric, FieldType::Tag];

pub struct SchemaManager {
    index: IndexName,
    namespace: Namespace,
    view: Mutex<IndexSchema>,
}

impl SchemaManager {
    pub fn new(index: IndexName, namespace: Namespace, schema: IndexSchema) -> Self {
        Self {
            index,
            namespace,
            view: Mutex::new(schema),
        }
    }

    pub fn index(&self) -> &IndexName {
        &self.index
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Create the index over the namespace prefix unless it already exists.
    ///
    /// Returns `true` if this call created the index. When the index exists,
    /// fields it declares beyond the local view are merged into the view.
    pub fn ensure_index(&self, pool: &ConnectionPool) -> Result<bool, CoreError> {
        let mut conn = pool.acquire()?;
        let result = self.ensure_index_on(&mut *conn);
        if let Err(e) = &result {
            warn!(index = %self.index, "ensure index failed: {e}");
        }
        result
    }

    fn ensure_index_on(&self, conn: &mut dyn StoreConnection) -> Result<bool, CoreError> {
        match conn.index_info(self.index.as_str()) {
            Ok(info) => {
                let mut view = self.lock_view()?;
                let mut merged = 0;
                for attr in &info.attributes {
                    if view.contains_alias(&attr.alias) {
                        continue;
                    }
                    let Ok(kind) = attr.kind.parse::<FieldType>() else {
                        debug!(alias = %attr.alias, kind = %attr.kind, "skipping attribute of unknown type");
                        continue;
                    };
                    if view
                        .push(FieldDescriptor::new(attr.identifier.clone(), attr.alias.clone(), kind))
                        .is_ok()
                    {
                        merged += 1;
                    }
                }
                info!(
                    index = %self.index,
                    fields = view.len(),
                    merged,
                    "search index already exists"
                );
                Ok(false)
            }
            Err(StoreError::IndexNotFound(_)) => {
                let schema = self.schema()?;
                conn.create_index(
                    self.index.as_str(),
                    &self.namespace.index_prefix(),
                    &schema,
                )
                .map_err(|e| schema_error(&self.index, "create", e))?;
                info!(index = %self.index, fields = schema.len(), "created search index");
                Ok(true)
            }
            Err(e) => Err(schema_error(&self.index, "inspect", e)),
        }
    }

    /// Append one field to the live index.
    pub fn alter_add(&self, pool: &ConnectionPool, field: FieldDescriptor) -> Result<(), CoreError> {
        let mut conn = pool.acquire()?;
        self.alter_add_on(&mut *conn, field)
    }

    /// Same as [`SchemaManager::alter_add`] on an already-acquired connection.
    pub fn alter_add_on(
        &self,
        conn: &mut dyn StoreConnection,
        field: FieldDescriptor,
    ) -> Result<(), CoreError> {
        field.validate()?;
        if self.lock_view()?.contains_alias(&field.alias) {
            return Err(CoreError::Schema(format!(
                "field '{}' already declared on {}",
                field.alias, self.index
            )));
        }
        conn.alter_index(self.index.as_str(), &field)
            .map_err(|e| schema_error(&self.index, "alter", e))?;

        let mut view = self.lock_view()?;
        // Another worker may have added the same alias in the meantime.
        if !view.contains_alias(&field.alias) {
            view.push(field)?;
        }
        Ok(())
    }

    /// Add `random_field_{1..=1000}` as text, numeric or tag.
    pub fn alter_random_field_on(
        &self,
        conn: &mut dyn StoreConnection,
        rng: &mut dyn RngCore,
    ) -> Result<FieldDescriptor, CoreError> {
        let name = format!("random_field_{}", rng.gen_range(1..=RANDOM_FIELD_RANGE));
        let kind = RANDOM_FIELD_TYPES[rng.gen_range(0..RANDOM_FIELD_TYPES.len())];
        let field = FieldDescriptor::new(format!("$.{name}"), name, kind);
        self.alter_add_on(conn, field.clone())?;
        debug!(alias = %field.alias, kind = %field.kind, "added random field");
        Ok(field)
    }

    pub fn schema(&self) -> Result<IndexSchema, CoreError> {
        Ok(self.lock_view()?.clone())
    }

    pub fn field_count(&self) -> usize {
        self.view.lock().map(|v| v.len()).unwrap_or(0)
    }

    fn lock_view(&self) -> Result<MutexGuard<'_, IndexSchema>, CoreError> {
        self.view
            .lock()
            .map_err(|e| CoreError::Schema(format!("schema view mutex poisoned: {e}")))
    }
}

fn schema_error(index: &IndexName, action: &str, e: StoreError) -> CoreError {
    if e.is_connectivity() {
        CoreError::Connectivity(e.to_string())
    } else {
        CoreError::Schema(format!("failed to {action} index {index}: {e}"))
    }
}
