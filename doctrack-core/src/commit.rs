//! The write side of a session.
//!
//! Pending entries are classified into [`WriteOperation`]s (`Added` creates, `Modified`
//! replaces, `Removed` deletes; replaces and deletes carry the tracked etag as `if_match`).
//! Domain events of a written entity follow as separate records in the same container and
//! partition:
//!
//! ```json
//! { "id": "1718000000000001", "<partition key name>": "<partition key>", "domainEvent": { ... } }
//! ```
//!
//! An entity is only settled once all of its event records are stored. When an event write
//! fails after the entity was written, the entry keeps its state and the remaining records;
//! the next commit writes those records without writing the entity again.
//!
//! Committing never changes lifecycle state by itself; persisted entries are flagged and
//! settled by [`Session::reset`].

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    client::{StoreClient, WriteOperation, WriteResponse},
    configuration::{ETAG_FIELD, ID_FIELD},
    entity::EntityKey,
    error::{CommitFailure, DocumentStoreError, DocumentStoreResult},
    session::{Session, ensure_not_cancelled},
    shadow::ShadowStore,
    tracking::{EntityEntry, EntityState, TrackedEntity},
};

/// Wire name of the event payload inside a domain-event record.
pub const DOMAIN_EVENT_FIELD: &str = "domainEvent";

/// Summary of a successful commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    /// Entities persisted.
    pub entities: usize,
    /// Store operations applied, domain-event records included.
    pub operations: usize,
    /// Total request charge reported by the store.
    pub request_charge: f64,
}

impl CommitReport {
    fn record(&mut self, response: &WriteResponse) {
        self.operations += 1;
        self.request_charge += response.request_charge;
    }
}

/// One classified entry, ready to be written.
struct PlannedWrite {
    key: EntityKey,
    id: String,
    container: String,
    partition_key: String,
    partition_key_name: String,
    /// `None` when the entity is already written and only its events remain.
    operation: Option<WriteOperation>,
    /// Outstanding events of an earlier commit followed by the events read from the entity.
    events: Vec<Value>,
    /// Whether `events` includes events still recorded on the entity.
    captured_events: bool,
    slot: Arc<dyn TrackedEntity>,
}

impl PlannedWrite {
    fn classify(entry: &EntityEntry, shadows: &ShadowStore) -> DocumentStoreResult<Self> {
        let slot = Arc::clone(entry.slot());
        let mut events = entry.outstanding_events().to_vec();

        if entry.is_written() {
            return Ok(Self {
                key: entry.key(),
                id: entry.id().to_string(),
                container: entry.container().to_string(),
                partition_key: entry.partition_key().to_string(),
                partition_key_name: entry.partition_key_name().to_string(),
                operation: None,
                events,
                captured_events: false,
                slot,
            });
        }

        let (id, partition_key) = slot.keys()?;

        if id != entry.id() || partition_key != entry.partition_key() {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "{} {} changed its id or partition key while tracked",
                entry.type_name(),
                entry.id()
            )));
        }

        let if_match = shadows
            .get(entry.key(), ETAG_FIELD)
            .and_then(|etag| etag.as_str().map(str::to_string));

        let operation = match entry.state() {
            EntityState::Added => WriteOperation::Create {
                document: slot.encode(shadows)?,
            },
            EntityState::Modified => WriteOperation::Replace {
                id: id.clone(),
                document: slot.encode(shadows)?,
                if_match,
            },
            EntityState::Removed => WriteOperation::Delete {
                id: id.clone(),
                if_match,
            },
            EntityState::Unchanged => {
                return Err(DocumentStoreError::TrackingState(format!(
                    "{} {} has nothing to commit",
                    entry.type_name(),
                    entry.id()
                )));
            }
        };

        let captured = slot.domain_events()?;
        let captured_events = !captured.is_empty();

        events.extend(captured);

        Ok(Self {
            key: entry.key(),
            id,
            container: entry.container().to_string(),
            partition_key,
            partition_key_name: entry.partition_key_name().to_string(),
            operation: Some(operation),
            events,
            captured_events,
            slot,
        })
    }
}

fn event_record(partition_key_name: &str, partition_key: &str, id: String, event: Value) -> Value {
    let mut record = Map::with_capacity(3);

    record.insert(ID_FIELD.to_string(), Value::String(id));
    record.insert(partition_key_name.to_string(), Value::String(partition_key.to_string()));
    record.insert(DOMAIN_EVENT_FIELD.to_string(), event);

    Value::Object(record)
}

impl<C: StoreClient> Session<'_, C> {
    /// Writes every pending entry independently.
    ///
    /// All entries are attempted. Persisted entries are flagged for [`Session::reset`]; the
    /// store's new etag is recorded for creates and replaces.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::PartialCommit`] listing every entry that failed (those
    /// keep their state and are retried by the next commit), or
    /// [`DocumentStoreError::Cancelled`] as soon as cancellation is observed.
    pub async fn commit(&mut self, cancel: &CancellationToken) -> DocumentStoreResult<CommitReport> {
        let mut report = CommitReport::default();
        let mut failures = Vec::new();

        for key in self.tracker.pending_keys() {
            let Some(entry) = self.tracker.entry(key) else {
                continue;
            };
            let id = entry.id().to_string();
            let container = entry.container().to_string();

            let outcome = match PlannedWrite::classify(entry, self.database.shadows()) {
                Ok(planned) => self.write(planned, cancel, &mut report).await,
                Err(error) => Err(error),
            };

            match outcome {
                Ok(()) => report.entities += 1,
                Err(DocumentStoreError::Cancelled) => return Err(DocumentStoreError::Cancelled),
                Err(error) => {
                    warn!(
                        database = %self.database.options().database_id,
                        container = %container,
                        id = %id,
                        error = %error,
                        "commit of entry failed"
                    );

                    failures.push(CommitFailure {
                        id,
                        container,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(DocumentStoreError::PartialCommit(failures))
        }
    }

    /// Writes every pending entry, and their domain-event records, as one atomic batch.
    ///
    /// # Errors
    ///
    /// Returns a precondition error, before any store call, when the pending entries span
    /// more than one container or partition key. Any store error means nothing was applied
    /// and no state changed.
    pub async fn commit_transaction(
        &mut self,
        cancel: &CancellationToken,
    ) -> DocumentStoreResult<CommitReport> {
        let shadows = self.database.shadows();
        let planned = self
            .tracker
            .pending_keys()
            .into_iter()
            .filter_map(|key| self.tracker.entry(key))
            .map(|entry| PlannedWrite::classify(entry, shadows))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        let Some(first) = planned.first() else {
            return Ok(CommitReport::default());
        };
        let container = first.container.clone();
        let partition_key = first.partition_key.clone();

        if let Some(other) = planned.iter().find(|p| p.container != container) {
            return Err(DocumentStoreError::Precondition(format!(
                "a transaction cannot span containers {container} and {}",
                other.container
            )));
        }

        if let Some(other) = planned.iter().find(|p| p.partition_key != partition_key) {
            return Err(DocumentStoreError::Precondition(format!(
                "a transaction cannot span partition keys {partition_key} and {}",
                other.partition_key
            )));
        }

        let mut operations = Vec::with_capacity(planned.len());
        let mut written = Vec::with_capacity(planned.len());

        for write in planned {
            let records = write
                .events
                .into_iter()
                .map(|event| WriteOperation::Create {
                    document: event_record(
                        &write.partition_key_name,
                        &write.partition_key,
                        self.database.event_ids().next_id(),
                        event,
                    ),
                })
                .collect::<Vec<_>>();

            let position = write.operation.as_ref().map(|_| operations.len());

            written.push((write.key, position, write.slot, write.captured_events));
            operations.extend(write.operation);
            operations.extend(records);
        }

        ensure_not_cancelled(cancel)?;

        let count = operations.len();
        let responses = self
            .database
            .client()
            .execute_batch(&container, &partition_key, operations)
            .await?;

        if responses.len() != count {
            return Err(DocumentStoreError::Backend(format!(
                "batch of {count} operations returned {} responses",
                responses.len()
            )));
        }

        let mut report = CommitReport::default();

        for response in &responses {
            report.record(response);
        }

        debug!(
            database = %self.database.options().database_id,
            container = %container,
            partition_key = %partition_key,
            operations = count,
            request_charge = report.request_charge,
            "executed batch"
        );

        for (key, position, slot, captured_events) in written {
            if let Some(etag) = position
                .and_then(|position| responses.get(position))
                .and_then(|response| response.etag.clone())
            {
                shadows.set(key, ETAG_FIELD, Value::String(etag));
            }

            if captured_events {
                slot.clear_domain_events();
            }

            self.tracker.mark_pending_reset(key);
            report.entities += 1;
        }

        Ok(report)
    }

    /// Commits every pending entry and settles the persisted ones.
    ///
    /// Entries persisted before a failure are settled even when an error is returned.
    pub async fn save_changes(&mut self, cancel: &CancellationToken) -> DocumentStoreResult<CommitReport> {
        let result = self.commit(cancel).await;

        self.reset();

        result
    }

    /// Atomic counterpart of [`Session::save_changes`].
    pub async fn save_changes_transaction(
        &mut self,
        cancel: &CancellationToken,
    ) -> DocumentStoreResult<CommitReport> {
        let result = self.commit_transaction(cancel).await;

        self.reset();

        result
    }

    async fn write(
        &mut self,
        planned: PlannedWrite,
        cancel: &CancellationToken,
        report: &mut CommitReport,
    ) -> DocumentStoreResult<()> {
        let client = self.database.client();
        let shadows = self.database.shadows();

        if let Some(operation) = planned.operation {
            ensure_not_cancelled(cancel)?;

            let kind = operation.kind();
            let response = operation
                .execute(client, &planned.container, &planned.partition_key)
                .await?;

            debug!(
                database = %self.database.options().database_id,
                operation = kind,
                container = %planned.container,
                id = %planned.id,
                status = response.status,
                request_charge = response.request_charge,
                "wrote item"
            );

            report.record(&response);

            if let Some(etag) = &response.etag {
                shadows.set(planned.key, ETAG_FIELD, Value::String(etag.clone()));
            }

            if planned.captured_events {
                planned.slot.clear_domain_events();
            }

            if planned.events.is_empty() {
                self.tracker.mark_pending_reset(planned.key);

                return Ok(());
            }

            // Events written from here on are retried one by one, never with the entity.
            self.tracker.mark_written(planned.key, planned.events.clone());
        }

        for event in &planned.events {
            ensure_not_cancelled(cancel)?;

            let record = event_record(
                &planned.partition_key_name,
                &planned.partition_key,
                self.database.event_ids().next_id(),
                event.clone(),
            );
            let response = client
                .create_item(&planned.container, &planned.partition_key, record)
                .await?;

            report.record(&response);
            self.tracker.complete_event(planned.key);
        }

        debug!(
            container = %planned.container,
            id = %planned.id,
            events = planned.events.len(),
            "wrote domain events"
        );

        self.tracker.mark_pending_reset(planned.key);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{STATUS_CREATED, STATUS_NO_CONTENT, STATUS_OK},
        database::Database,
        model::ModelBuilder,
        options::DatabaseOptions,
        query::SqlQuery,
    };
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct AccountPlan {
        id: String,
        name: String,
        #[serde(skip)]
        events: Vec<String>,
    }

    fn plan(id: &str) -> AccountPlan {
        AccountPlan {
            id: id.to_string(),
            name: "Test".to_string(),
            events: Vec::new(),
        }
    }

    /// Records every call and fails creates of the listed ids.
    ///
    /// Event records are logged as `event <name>`. Each name in `failing_events` fails once.
    /// `cancel_on_create` is cancelled by every successful entity create.
    #[derive(Debug, Default)]
    struct RecordingClient {
        calls: Mutex<Vec<String>>,
        batches: Mutex<Vec<Vec<WriteOperation>>>,
        failing: Vec<String>,
        failing_events: Mutex<Vec<String>>,
        cancel_on_create: Option<CancellationToken>,
    }

    impl RecordingClient {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing: ids.iter().map(|id| id.to_string()).collect(),
                ..Self::default()
            }
        }

        fn failing_events_once(names: &[&str]) -> Self {
            Self {
                failing_events: Mutex::new(names.iter().map(|name| name.to_string()).collect()),
                ..Self::default()
            }
        }

        fn cancelling(cancel: &CancellationToken) -> Self {
            Self {
                cancel_on_create: Some(cancel.clone()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn response(status: u16) -> WriteResponse {
            WriteResponse {
                status,
                request_charge: 1.5,
                etag: (status != STATUS_NO_CONTENT).then(|| format!("etag-{}", status)),
            }
        }
    }

    #[async_trait]
    impl StoreClient for RecordingClient {
        async fn read_item(&self, _: &str, id: &str, _: &str) -> DocumentStoreResult<Option<Value>> {
            self.calls.lock().push(format!("read {id}"));
            Ok(None)
        }

        async fn create_item(&self, container: &str, _: &str, document: Value) -> DocumentStoreResult<WriteResponse> {
            if let Some(event) = document.get(DOMAIN_EVENT_FIELD) {
                let name = event.as_str().unwrap_or_default().to_string();

                self.calls.lock().push(format!("event {name}"));

                let mut failing = self.failing_events.lock();

                if let Some(position) = failing.iter().position(|failing| *failing == name) {
                    failing.remove(position);
                    return Err(DocumentStoreError::Backend(format!("event {name} rejected")));
                }

                return Ok(Self::response(STATUS_CREATED));
            }

            let id = document[ID_FIELD].as_str().unwrap_or_default().to_string();

            self.calls.lock().push(format!("create {id}"));

            if self.failing.contains(&id) {
                return Err(DocumentStoreError::DocumentAlreadyExists(id, container.to_string()));
            }

            if let Some(cancel) = &self.cancel_on_create {
                cancel.cancel();
            }

            Ok(Self::response(STATUS_CREATED))
        }

        async fn replace_item(
            &self,
            _: &str,
            id: &str,
            _: &str,
            _: Value,
            if_match: Option<&str>,
        ) -> DocumentStoreResult<WriteResponse> {
            self.calls.lock().push(format!("replace {id} {}", if_match.unwrap_or("*")));
            Ok(Self::response(STATUS_OK))
        }

        async fn delete_item(&self, _: &str, id: &str, _: &str, _: Option<&str>) -> DocumentStoreResult<WriteResponse> {
            self.calls.lock().push(format!("delete {id}"));
            Ok(Self::response(STATUS_NO_CONTENT))
        }

        async fn execute_batch(
            &self,
            _: &str,
            partition_key: &str,
            operations: Vec<WriteOperation>,
        ) -> DocumentStoreResult<Vec<WriteResponse>> {
            self.calls.lock().push(format!("batch {partition_key} {}", operations.len()));

            let responses = operations
                .iter()
                .map(|operation| match operation {
                    WriteOperation::Create { .. } => Self::response(STATUS_CREATED),
                    WriteOperation::Replace { .. } => Self::response(STATUS_OK),
                    WriteOperation::Delete { .. } => Self::response(STATUS_NO_CONTENT),
                })
                .collect();

            self.batches.lock().push(operations);

            Ok(responses)
        }

        fn query_items(&self, _: &str, _: &str, _: SqlQuery) -> BoxStream<'static, DocumentStoreResult<Value>> {
            Box::pin(stream::empty())
        }
    }

    fn database(client: RecordingClient) -> Database<RecordingClient> {
        let options = DatabaseOptions::new("test");
        let registry = ModelBuilder::new(options.clone())
            .define_entity::<AccountPlan>(|plan| {
                plan.container("plans")
                    .id(|p| p.id.clone())
                    .shadow_partition_key("tenant", |_| "t1".to_string())
                    .domain_events(|p| p.events.clone(), |p| p.events.clear())
            })
            .build()
            .unwrap();

        Database::new(client, registry, options)
    }

    #[tokio::test]
    async fn classifies_entries_into_operations() {
        let database = database(RecordingClient::default());
        let cancel = CancellationToken::new();
        let mut session = database.session();

        let first = session.track(plan("a")).unwrap();
        session.commit(&cancel).await.unwrap();
        session.reset();

        first.write().name = "Renamed".to_string();
        session.mark_modified(&first).unwrap();
        let second = session.track(plan("b")).unwrap();
        let report = session.save_changes(&cancel).await.unwrap();

        assert_eq!(report.entities, 2);
        assert_eq!(report.operations, 2);
        assert_eq!(report.request_charge, 3.0);

        session.mark_removed(&second).unwrap();
        session.save_changes(&cancel).await.unwrap();

        assert_eq!(
            database.client().calls(),
            vec!["create a", "replace a etag-201", "create b", "delete b"]
        );
        assert_eq!(session.state_of(&first), Some(EntityState::Unchanged));
        assert_eq!(session.state_of(&second), None);
    }

    #[tokio::test]
    async fn partial_commit_keeps_failed_entries_pending() {
        let database = database(RecordingClient::failing(&["b"]));
        let cancel = CancellationToken::new();
        let mut session = database.session();

        let a = session.track(plan("a")).unwrap();
        let b = session.track(plan("b")).unwrap();
        let c = session.track(plan("c")).unwrap();

        let error = session.save_changes(&cancel).await.unwrap_err();

        match error {
            DocumentStoreError::PartialCommit(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].id, "b");
                assert_eq!(failures[0].container, "plans");
            }
            other => panic!("unexpected error {other}"),
        }

        assert_eq!(session.state_of(&a), Some(EntityState::Unchanged));
        assert_eq!(session.state_of(&b), Some(EntityState::Added));
        assert_eq!(session.state_of(&c), Some(EntityState::Unchanged));
        assert_eq!(session.concurrency_token(&a).as_deref(), Some("etag-201"));
        assert_eq!(session.concurrency_token(&b), None);
    }

    #[tokio::test]
    async fn domain_events_follow_the_entity() {
        let database = database(RecordingClient::default());
        let cancel = CancellationToken::new();
        let mut session = database.session();
        let mut entity = plan("a");

        entity.events = vec!["created".to_string(), "named".to_string()];

        let handle = session.track(entity).unwrap();
        let report = session.save_changes(&cancel).await.unwrap();
        let calls = database.client().calls();

        assert_eq!(report.operations, 3);
        assert_eq!(calls, vec!["create a", "event created", "event named"]);
        assert!(handle.read().events.is_empty());
    }

    #[tokio::test]
    async fn failed_event_write_is_resumed_without_rewriting_the_entity() {
        let database = database(RecordingClient::failing_events_once(&["second"]));
        let cancel = CancellationToken::new();
        let mut session = database.session();
        let mut entity = plan("a");

        entity.events = vec!["first".to_string(), "second".to_string()];

        let handle = session.track(entity).unwrap();
        let error = session.save_changes(&cancel).await.unwrap_err();

        assert!(matches!(
            error,
            DocumentStoreError::PartialCommit(ref failures)
                if failures.len() == 1 && failures[0].id == "a"
        ));
        assert_eq!(session.state_of(&handle), Some(EntityState::Added));
        assert!(session.has_changes());
        assert!(handle.read().events.is_empty());
        assert_eq!(session.concurrency_token(&handle).as_deref(), Some("etag-201"));
        assert_eq!(
            session.entries()[0].outstanding_events(),
            &[json!("second")]
        );

        let report = session.save_changes(&cancel).await.unwrap();

        assert_eq!(report.entities, 1);
        assert_eq!(report.operations, 1);
        assert_eq!(session.state_of(&handle), Some(EntityState::Unchanged));
        assert!(!session.has_changes());
        assert_eq!(
            database.client().calls(),
            vec!["create a", "event first", "event second", "event second"]
        );
    }

    #[tokio::test]
    async fn outstanding_events_are_batched_without_the_entity() {
        let database = database(RecordingClient::failing_events_once(&["first"]));
        let cancel = CancellationToken::new();
        let mut session = database.session();
        let mut entity = plan("a");

        entity.events = vec!["first".to_string()];

        let handle = session.track(entity).unwrap();

        assert!(session.save_changes(&cancel).await.is_err());

        let report = session.save_changes_transaction(&cancel).await.unwrap();

        assert_eq!(report.entities, 1);
        assert_eq!(report.operations, 1);
        assert_eq!(session.state_of(&handle), Some(EntityState::Unchanged));
        assert_eq!(
            database.client().calls(),
            vec!["create a", "event first", "batch t1 1"]
        );

        let batches = database.client().batches.lock();

        assert!(matches!(
            &batches[0][0],
            WriteOperation::Create { document } if document[DOMAIN_EVENT_FIELD] == json!("first")
        ));
    }

    #[tokio::test]
    async fn modifying_an_entity_with_outstanding_events_writes_both() {
        let database = database(RecordingClient::failing_events_once(&["first"]));
        let cancel = CancellationToken::new();
        let mut session = database.session();
        let mut entity = plan("a");

        entity.events = vec!["first".to_string()];

        let handle = session.track(entity).unwrap();

        assert!(session.save_changes(&cancel).await.is_err());

        {
            let mut plan = handle.write();
            plan.name = "Renamed".to_string();
            plan.events.push("renamed".to_string());
        }

        session.mark_modified(&handle).unwrap();
        session.save_changes(&cancel).await.unwrap();

        assert_eq!(
            database.client().calls(),
            vec![
                "create a",
                "event first",
                "replace a etag-201",
                "event first",
                "event renamed"
            ]
        );
        assert_eq!(session.state_of(&handle), Some(EntityState::Unchanged));
    }

    #[tokio::test]
    async fn transaction_batches_entities_and_events() {
        let database = database(RecordingClient::default());
        let cancel = CancellationToken::new();
        let mut session = database.session();
        let mut entity = plan("a");

        entity.events = vec!["created".to_string()];

        let a = session.track(entity).unwrap();
        let b = session.track(plan("b")).unwrap();
        let report = session.save_changes_transaction(&cancel).await.unwrap();

        assert_eq!(report.entities, 2);
        assert_eq!(report.operations, 3);
        assert_eq!(database.client().calls(), vec!["batch t1 3"]);

        let batches = database.client().batches.lock();
        let WriteOperation::Create { document } = &batches[0][1] else {
            panic!("expected the event record after its entity");
        };

        assert_eq!(document["tenant"], json!("t1"));
        assert_eq!(document[DOMAIN_EVENT_FIELD], json!("created"));
        assert_eq!(session.state_of(&a), Some(EntityState::Unchanged));
        assert_eq!(session.state_of(&b), Some(EntityState::Unchanged));
        assert!(a.read().events.is_empty());
    }

    #[tokio::test]
    async fn cancelled_commit_issues_no_calls() {
        let database = database(RecordingClient::default());
        let cancel = CancellationToken::new();
        let mut session = database.session();

        let handle = session.track(plan("a")).unwrap();

        cancel.cancel();

        assert!(matches!(session.commit(&cancel).await, Err(DocumentStoreError::Cancelled)));
        assert!(matches!(
            session.commit_transaction(&cancel).await,
            Err(DocumentStoreError::Cancelled)
        ));
        assert!(database.client().calls().is_empty());
        assert_eq!(session.state_of(&handle), Some(EntityState::Added));
    }

    #[tokio::test]
    async fn cancellation_between_writes_settles_what_was_written() {
        let cancel = CancellationToken::new();
        let database = database(RecordingClient::cancelling(&cancel));
        let mut session = database.session();

        let a = session.track(plan("a")).unwrap();
        let b = session.track(plan("b")).unwrap();

        assert!(matches!(session.commit(&cancel).await, Err(DocumentStoreError::Cancelled)));
        assert_eq!(database.client().calls(), vec!["create a"]);
        assert_eq!(session.reset(), 1);
        assert_eq!(session.state_of(&a), Some(EntityState::Unchanged));
        assert_eq!(session.state_of(&b), Some(EntityState::Added));
        assert_eq!(session.concurrency_token(&a).as_deref(), Some("etag-201"));
    }

    #[tokio::test]
    async fn empty_commits_do_nothing() {
        let database = database(RecordingClient::default());
        let cancel = CancellationToken::new();
        let mut session = database.session();

        assert_eq!(session.commit(&cancel).await.unwrap(), CommitReport::default());
        assert_eq!(session.commit_transaction(&cancel).await.unwrap(), CommitReport::default());
        assert!(database.client().calls().is_empty());
    }

    #[tokio::test]
    async fn changing_the_id_of_a_tracked_entity_is_rejected() {
        let database = database(RecordingClient::default());
        let cancel = CancellationToken::new();
        let mut session = database.session();

        let handle = session.track(plan("a")).unwrap();
        handle.write().id = "z".to_string();

        let error = session.commit(&cancel).await.unwrap_err();

        assert!(matches!(
            error,
            DocumentStoreError::PartialCommit(ref failures)
                if matches!(failures[0].error, DocumentStoreError::InvalidDocument(_))
        ));
        assert!(database.client().calls().is_empty());
    }

    #[tokio::test]
    async fn dropping_a_session_releases_shadow_values() {
        let database = database(RecordingClient::default());
        let cancel = CancellationToken::new();

        {
            let mut session = database.session();

            session.track(plan("a")).unwrap();
            session.save_changes(&cancel).await.unwrap();

            assert_eq!(database.shadow_entries(), 1);
        }

        assert_eq!(database.shadow_entries(), 0);
    }
}
