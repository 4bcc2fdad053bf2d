//! Consistency orchestrator.
//!
//! Runs the per-request pipeline that keeps the primary store, the search
//! index and the event stream describing the same aggregate:
//!
//! ```text
//! Validated ─► Decomposed ─► PrimaryWritten ─► Indexed ─► Published ─► Done
//!     │             │              │              │
//!     └─────────────┴──────────────┴──────────────┴──► Aborted(last completed step)
//! ```
//!
//! A store failure aborts the remaining steps and surfaces as
//! [`PlanError::StoreUnavailable`] carrying the last completed step. Steps
//! that already ran are not undone. Publishing never aborts: a failed
//! publish is logged and the request still succeeds.
//!
//! All collaborators are injected as long-lived handles, so one
//! orchestrator serves every concurrent request.

use crate::metrics::PlanMetrics;
use crate::publisher::EventPublisher;
use futures::future::try_join_all;
use plan_registry_core::decompose::{EntityKey, EntityKind, SubEntityRecord, decompose};
use plan_registry_core::environment::Clock;
use plan_registry_core::error::{Operation, PipelineStep, PlanError};
use plan_registry_core::event::PlanEvent;
use plan_registry_core::index::{CascadeFilter, IndexProjector, ProjectedDocument};
use plan_registry_core::plan::PlanAggregate;
use plan_registry_core::query::SearchQuery;
use plan_registry_core::store::{IndexStore, PrimaryStore, SearchHit, StoreError};
use plan_registry_core::validation::{FieldError, Validator};
use plan_registry_core::version::{self, Freshness, VersionToken};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Result of a create.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Root objectId.
    pub object_id: String,
    /// Token of the stored aggregate.
    pub token: VersionToken,
}

/// Result of a conditional read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The caller's token is current.
    Unchanged {
        /// Current token.
        token: VersionToken,
    },
    /// The stored aggregate.
    Found {
        /// The aggregate.
        aggregate: PlanAggregate,
        /// Current token.
        token: VersionToken,
    },
}

/// Result of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct Updated {
    /// The merged aggregate as stored.
    pub aggregate: PlanAggregate,
    /// Its new token.
    pub token: VersionToken,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deleted {
    /// Primary-store keys removed.
    pub primary_keys_removed: u64,
    /// Index documents removed.
    pub index_documents_removed: u64,
}

/// Tracks the pipeline position of one request.
struct Pipeline {
    operation: Operation,
    last_completed: PipelineStep,
}

impl Pipeline {
    const fn start(operation: Operation) -> Self {
        Self {
            operation,
            last_completed: PipelineStep::Validated,
        }
    }

    fn advance(&mut self, step: PipelineStep) {
        self.last_completed = step;
        tracing::debug!(step = %step, "Pipeline step completed");
    }

    fn abort(&self, source: StoreError) -> PlanError {
        tracing::error!(
            last_completed = %self.last_completed,
            error = %source,
            "Pipeline aborted; completed steps are not rolled back"
        );
        PlanError::StoreUnavailable {
            operation: self.operation,
            last_completed: self.last_completed,
            source,
        }
    }
}

/// Coordinates both stores and the event stream for plan operations.
pub struct ConsistencyOrchestrator {
    primary: Arc<dyn PrimaryStore>,
    index: Arc<dyn IndexStore>,
    publisher: Arc<EventPublisher>,
    validator: Arc<dyn Validator>,
    clock: Arc<dyn Clock>,
}

impl ConsistencyOrchestrator {
    /// Create an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        index: Arc<dyn IndexStore>,
        publisher: Arc<EventPublisher>,
        validator: Arc<dyn Validator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            primary,
            index,
            publisher,
            validator,
            clock,
        }
    }

    /// Create (or fully replace) a plan.
    ///
    /// Replacing an existing plan removes its sub-entities that `input` no
    /// longer contains from both stores.
    ///
    /// # Errors
    ///
    /// - [`PlanError::ValidationFailed`] if `input` breaks the contract
    /// - [`PlanError::Conflict`] if an objectId of `input` belongs to another
    ///   plan (nothing is written)
    /// - [`PlanError::StoreUnavailable`] if a store fails mid-pipeline
    pub async fn create(&self, input: Value) -> Result<Created, PlanError> {
        let object_id = input.get("objectId").and_then(Value::as_str).unwrap_or_default().to_string();
        let span = tracing::info_span!("plan_create", object_id = %object_id);
        Self::measured(Operation::Create, self.create_inner(input).instrument(span))
            .await
    }

    async fn create_inner(&self, input: Value) -> Result<Created, PlanError> {
        let aggregate = self.validate(input)?;
        let mut pipeline = Pipeline::start(Operation::Create);

        let records = decompose(&aggregate);
        pipeline.advance(PipelineStep::Decomposed);

        let previous = self
            .fetch(&aggregate.object_id, &pipeline)
            .await?
            .map(|existing| decompose(&existing))
            .unwrap_or_default();
        self.check_ownership(&records, &previous, &pipeline).await?;

        self.replace_tree(&aggregate, &records, &previous, &mut pipeline)
            .await?;

        let event = PlanEvent::created(&aggregate.object_id, aggregate.to_value(), self.clock.now());
        self.publisher.publish(&event).await;
        pipeline.advance(PipelineStep::Published);

        let token = version::current_token(&aggregate);
        pipeline.advance(PipelineStep::Done);
        tracing::info!(records = records.len(), "Plan created");
        Ok(Created {
            object_id: aggregate.object_id,
            token,
        })
    }

    /// Read a plan, honouring the caller's cached token.
    ///
    /// # Errors
    ///
    /// - [`PlanError::NotFound`] if no such plan exists
    /// - [`PlanError::StoreUnavailable`] if the primary store fails
    /// - [`PlanError::InvalidAggregate`] if the stored value is corrupt
    pub async fn read(&self, object_id: &str, if_none_match: Option<&str>) -> Result<ReadOutcome, PlanError> {
        let span = tracing::info_span!("plan_read", object_id = %object_id);
        Self::measured(Operation::Read, self.read_inner(object_id, if_none_match).instrument(span))
            .await
    }

    async fn read_inner(&self, object_id: &str, if_none_match: Option<&str>) -> Result<ReadOutcome, PlanError> {
        let pipeline = Pipeline::start(Operation::Read);
        let aggregate = self
            .fetch(object_id, &pipeline)
            .await?
            .ok_or_else(|| PlanError::not_found(object_id))?;
        let token = version::current_token(&aggregate);

        Ok(match version::check_read(&token, if_none_match) {
            Freshness::Unchanged => ReadOutcome::Unchanged { token },
            Freshness::Modified => ReadOutcome::Found { aggregate, token },
        })
    }

    /// Patch a plan: shallow-merge `patch` into the stored root.
    ///
    /// Top-level fields of `patch` replace the stored ones wholesale, so a
    /// patched `linkedPlanServices` replaces the whole list. Sub-entities
    /// that are no longer part of the merged aggregate are removed from
    /// both stores.
    ///
    /// # Errors
    ///
    /// - [`PlanError::NotFound`] if no such plan exists
    /// - [`PlanError::PreconditionFailed`] if `if_match` is stale (nothing is
    ///   written)
    /// - [`PlanError::ValidationFailed`] if the merged aggregate breaks the
    ///   contract or the patch changes `objectId`
    /// - [`PlanError::Conflict`] if the patch adds an objectId owned by
    ///   another plan (nothing is written)
    /// - [`PlanError::StoreUnavailable`] if a store fails mid-pipeline
    pub async fn update(
        &self,
        object_id: &str,
        patch: Value,
        if_match: Option<&str>,
    ) -> Result<Updated, PlanError> {
        let span = tracing::info_span!("plan_update", object_id = %object_id);
        Self::measured(
            Operation::Update,
            self.update_inner(object_id, patch, if_match).instrument(span),
        )
        .await
    }

    async fn update_inner(
        &self,
        object_id: &str,
        patch: Value,
        if_match: Option<&str>,
    ) -> Result<Updated, PlanError> {
        let mut pipeline = Pipeline::start(Operation::Update);
        let existing = self
            .fetch(object_id, &pipeline)
            .await?
            .ok_or_else(|| PlanError::not_found(object_id))?;

        version::check_write(&version::current_token(&existing), if_match)?;

        let Value::Object(patch) = patch else {
            return Err(single_field_error("/", "patch must be an object"));
        };
        let Value::Object(mut merged) = existing.to_value() else {
            return Err(PlanError::InvalidAggregate(format!("stored plan {object_id} is not an object")));
        };
        merged.extend(patch);
        if merged.get("objectId").and_then(Value::as_str) != Some(object_id) {
            return Err(single_field_error("/objectId", "cannot be changed"));
        }
        let aggregate = self.validate(Value::Object(merged))?;

        let records = decompose(&aggregate);
        let previous = decompose(&existing);
        pipeline.advance(PipelineStep::Decomposed);

        self.check_ownership(&records, &previous, &pipeline).await?;
        self.replace_tree(&aggregate, &records, &previous, &mut pipeline)
            .await?;

        let event = PlanEvent::updated(object_id, aggregate.to_value(), self.clock.now());
        self.publisher.publish(&event).await;
        pipeline.advance(PipelineStep::Published);

        let token = version::current_token(&aggregate);
        pipeline.advance(PipelineStep::Done);
        Ok(Updated { aggregate, token })
    }

    /// Delete a plan and every descendant from both stores.
    ///
    /// # Errors
    ///
    /// - [`PlanError::NotFound`] if no such plan exists
    /// - [`PlanError::StoreUnavailable`] if a store fails mid-pipeline
    pub async fn delete(&self, object_id: &str) -> Result<Deleted, PlanError> {
        let span = tracing::info_span!("plan_delete", object_id = %object_id);
        Self::measured(Operation::Delete, self.delete_inner(object_id).instrument(span))
            .await
    }

    async fn delete_inner(&self, object_id: &str) -> Result<Deleted, PlanError> {
        let mut pipeline = Pipeline::start(Operation::Delete);
        let existing = self
            .fetch(object_id, &pipeline)
            .await?
            .ok_or_else(|| PlanError::not_found(object_id))?;

        let records = decompose(&existing);
        pipeline.advance(PipelineStep::Decomposed);

        let mut primary_keys_removed = 0;
        for record in &records {
            primary_keys_removed += self
                .primary
                .delete(&record.key().to_string())
                .await
                .map_err(|e| pipeline.abort(e))?;
        }
        pipeline.advance(PipelineStep::PrimaryWritten);

        let documents = IndexProjector::for_root(object_id).project_all(&records);
        let index_documents_removed = if self.index.supports_filtered_delete() {
            let filter = CascadeFilter::for_tree(object_id, &documents);
            self.index
                .delete_by_query(&filter.to_query())
                .await
                .map_err(|e| pipeline.abort(e))?
        } else {
            self.delete_documents(&documents)
                .await
                .map_err(|e| pipeline.abort(e))?
        };
        pipeline.advance(PipelineStep::Indexed);

        self.publisher
            .publish(&PlanEvent::deleted(object_id, self.clock.now()))
            .await;
        pipeline.advance(PipelineStep::Published);
        pipeline.advance(PipelineStep::Done);

        tracing::info!(primary_keys_removed, index_documents_removed, "Plan deleted");
        Ok(Deleted {
            primary_keys_removed,
            index_documents_removed,
        })
    }

    /// Search the index with Elasticsearch query DSL.
    ///
    /// # Errors
    ///
    /// - [`PlanError::InvalidQuery`] if `query` is not a supported query
    /// - [`PlanError::StoreUnavailable`] if the index fails
    pub async fn search(&self, query: &Value) -> Result<Vec<SearchHit>, PlanError> {
        let span = tracing::info_span!("plan_search");
        Self::measured(Operation::Search, self.search_inner(query).instrument(span))
            .await
    }

    async fn search_inner(&self, query: &Value) -> Result<Vec<SearchHit>, PlanError> {
        let query = SearchQuery::from_dsl(query).map_err(|e| PlanError::InvalidQuery(e.to_string()))?;
        let pipeline = Pipeline::start(Operation::Search);
        let hits = self.index.search(&query).await.map_err(|e| pipeline.abort(e))?;
        tracing::debug!(hits = hits.len(), "Search completed");
        Ok(hits)
    }

    async fn measured<T>(
        operation: Operation,
        work: impl std::future::Future<Output = Result<T, PlanError>>,
    ) -> Result<T, PlanError> {
        let started = Instant::now();
        let result = work.await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(error) => error.kind().as_str(),
        };
        PlanMetrics::record_operation(operation, outcome, started.elapsed());
        result
    }

    fn validate(&self, input: Value) -> Result<PlanAggregate, PlanError> {
        self.validator
            .validate(&input)
            .into_result()
            .map_err(|errors| PlanError::ValidationFailed { errors })?;
        PlanAggregate::from_value(input).map_err(|e| single_field_error("/", &e.to_string()))
    }

    /// Load and parse the stored root.
    async fn fetch(&self, object_id: &str, pipeline: &Pipeline) -> Result<Option<PlanAggregate>, PlanError> {
        let key = EntityKey::plan(object_id).to_string();
        let Some(raw) = self.primary.get(&key).await.map_err(|e| pipeline.abort(e))? else {
            return Ok(None);
        };
        serde_json::from_str::<Value>(&raw)
            .and_then(PlanAggregate::from_value)
            .map(Some)
            .map_err(|e| PlanError::InvalidAggregate(format!("{key}: {e}")))
    }

    /// Reject `records` if any of their objectIds is stored, under any kind,
    /// outside the tree being replaced.
    async fn check_ownership(
        &self,
        records: &[SubEntityRecord],
        previous: &[SubEntityRecord],
        pipeline: &Pipeline,
    ) -> Result<(), PlanError> {
        let owned: HashSet<EntityKey> = previous.iter().map(SubEntityRecord::key).collect();
        for record in records {
            for kind in EntityKind::ALL {
                let key = EntityKey::new(kind, record.object_id.as_str());
                if owned.contains(&key) {
                    continue;
                }
                let key = key.to_string();
                if self.primary.get(&key).await.map_err(|e| pipeline.abort(e))?.is_some() {
                    tracing::warn!(object_id = %record.object_id, key = %key, "objectId owned by another plan");
                    return Err(PlanError::Conflict {
                        object_id: record.object_id.clone(),
                        key,
                    });
                }
            }
        }
        Ok(())
    }

    /// Write `records` to both stores and remove every entity of `previous`
    /// that is not part of them.
    async fn replace_tree(
        &self,
        aggregate: &PlanAggregate,
        records: &[SubEntityRecord],
        previous: &[SubEntityRecord],
        pipeline: &mut Pipeline,
    ) -> Result<(), PlanError> {
        let current_keys: HashSet<EntityKey> = records.iter().map(SubEntityRecord::key).collect();
        let orphans: Vec<SubEntityRecord> = previous
            .iter()
            .filter(|r| !current_keys.contains(&r.key()))
            .cloned()
            .collect();

        self.write_primary(aggregate, records)
            .await
            .map_err(|e| pipeline.abort(e))?;
        for orphan in &orphans {
            self.primary
                .delete(&orphan.key().to_string())
                .await
                .map_err(|e| pipeline.abort(e))?;
        }
        pipeline.advance(PipelineStep::PrimaryWritten);

        // An id that moved to another kind keeps its (rewritten) document.
        let projector = IndexProjector::for_root(aggregate.object_id.as_str());
        let documents = projector.project_all(records);
        let current_ids: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let stale: Vec<ProjectedDocument> = projector
            .project_all(&orphans)
            .into_iter()
            .filter(|d| !current_ids.contains(d.id.as_str()))
            .collect();

        self.upsert_index(&documents).await.map_err(|e| pipeline.abort(e))?;
        self.delete_documents(&stale).await.map_err(|e| pipeline.abort(e))?;
        pipeline.advance(PipelineStep::Indexed);

        if !orphans.is_empty() {
            tracing::info!(pruned = orphans.len(), "Removed sub-entities no longer in the plan");
        }
        Ok(())
    }

    /// The root key holds the full nested aggregate; other keys hold the
    /// record's own attributes plus `parentId`.
    async fn write_primary(&self, aggregate: &PlanAggregate, records: &[SubEntityRecord]) -> Result<(), StoreError> {
        for record in records {
            let value = if record.is_root() {
                aggregate.to_value()
            } else {
                Value::Object(record.stored_attributes())
            };
            self.primary.set(&record.key().to_string(), value.to_string()).await?;
        }
        Ok(())
    }

    async fn upsert_index(&self, documents: &[ProjectedDocument]) -> Result<(), StoreError> {
        try_join_all(
            documents
                .iter()
                .map(|doc| self.index.upsert(&doc.id, &doc.routing_key, doc.document.clone())),
        )
        .await?;
        Ok(())
    }

    /// Delete documents one by one; documents already gone are logged and
    /// skipped.
    async fn delete_documents(&self, documents: &[ProjectedDocument]) -> Result<u64, StoreError> {
        let mut removed = 0;
        let mut missing = Vec::new();
        for doc in documents {
            match self.index.delete_by_id(&doc.id, &doc.routing_key).await {
                Ok(()) => removed += 1,
                Err(StoreError::NotFound(_)) => missing.push(doc.id.as_str()),
                Err(e) => return Err(e),
            }
        }
        if !missing.is_empty() {
            tracing::warn!(?missing, "Index documents already absent");
        }
        Ok(removed)
    }
}

fn single_field_error(path: &str, message: &str) -> PlanError {
    PlanError::ValidationFailed {
        errors: vec![FieldError {
            path: path.to_string(),
            message: message.to_string(),
        }],
    }
}
