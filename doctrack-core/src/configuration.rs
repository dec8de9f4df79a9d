//! Per-type persistence metadata and the frozen registry that serves it.
//!
//! An [`EntityConfiguration`] describes how one entity type maps onto the store: its
//! container, how to compute its id and partition key, which non-serde values travel with it,
//! and which shadow properties it declares. Configurations are produced by the
//! [`ModelBuilder`](crate::model::ModelBuilder) and collected into an
//! [`EntityConfigurationRegistry`], which is immutable and cheap to share across sessions.

use serde_json::Value;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use crate::{
    entity::Entity,
    error::{DocumentStoreError, DocumentStoreResult},
    schema::EntityShape,
    selector::{Accessor, StringSelector},
    serialization::{Decoded, DocumentPipeline, EncodeContext},
};

/// Wire name of the document id.
pub const ID_FIELD: &str = "id";
/// Wire name of the optimistic-concurrency token.
pub const ETAG_FIELD: &str = "_etag";
/// Wire name of the server-side modification timestamp.
pub const TIMESTAMP_FIELD: &str = "_ts";
/// Wire name of the type discriminator.
pub const TYPE_FIELD: &str = "_type";

type DomainEventsFn<T> = Arc<dyn Fn(&T) -> DocumentStoreResult<Vec<Value>> + Send + Sync>;
type ClearEventsFn<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// Where the partition key of an entity lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKeyPlacement {
    /// The key is one of the entity's own serialized fields.
    Entity,
    /// The key is computed and only exists on the wire.
    Shadow,
}

/// A shadow property declared for an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowPropertyDefinition {
    /// Wire name of the property.
    pub name: String,
    /// Name of the Rust type the value was declared with.
    pub type_name: &'static str,
    /// Value written for newly added entities.
    pub default_value: Value,
}

/// Reads and clears the pending domain events of an entity.
pub struct DomainEventAccessor<T> {
    events: DomainEventsFn<T>,
    clear: ClearEventsFn<T>,
}

impl<T> DomainEventAccessor<T> {
    pub(crate) fn new(events: DomainEventsFn<T>, clear: ClearEventsFn<T>) -> Self {
        Self { events, clear }
    }

    /// Serializes the events currently recorded on the entity.
    pub fn events(&self, entity: &T) -> DocumentStoreResult<Vec<Value>> {
        (self.events)(entity)
    }

    /// Clears the recorded events once they are persisted.
    pub fn clear(&self, entity: &mut T) {
        (self.clear)(entity)
    }
}

/// Persistence metadata for entity type `T`.
///
/// Names stored here are wire names: the naming policy has already been applied by the
/// model builder.
pub struct EntityConfiguration<T> {
    pub(crate) type_name: String,
    pub(crate) container_name: String,
    pub(crate) id_selector: StringSelector<T>,
    pub(crate) partition_key_name: String,
    pub(crate) partition_key_selector: StringSelector<T>,
    pub(crate) partition_key_placement: PartitionKeyPlacement,
    pub(crate) fields: Vec<(String, Accessor<T>)>,
    pub(crate) properties: Vec<(String, Accessor<T>)>,
    pub(crate) shadow_properties: Vec<ShadowPropertyDefinition>,
    pub(crate) domain_events: Option<DomainEventAccessor<T>>,
    pub(crate) emit_type_discriminator: bool,
    pub(crate) shape: EntityShape,
    pub(crate) pipeline: DocumentPipeline<T>,
}

impl<T: Entity> EntityConfiguration<T> {
    /// The discriminator written to `_type`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The container documents of this type are stored in.
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Wire name of the partition key.
    pub fn partition_key_name(&self) -> &str {
        &self.partition_key_name
    }

    /// Returns `true` when the partition key is one of the entity's own fields.
    pub fn is_partition_key_in_entity(&self) -> bool {
        self.partition_key_placement == PartitionKeyPlacement::Entity
    }

    /// Declared shadow properties, in declaration order.
    pub fn shadow_properties(&self) -> &[ShadowPropertyDefinition] {
        &self.shadow_properties
    }

    /// Returns `true` when the `_type` discriminator is emitted for this type.
    pub fn emits_type_discriminator(&self) -> bool {
        self.emit_type_discriminator
    }

    /// The entity's own serialized field names.
    pub fn shape(&self) -> &EntityShape {
        &self.shape
    }

    /// Computes the id of an entity.
    pub fn id_of(&self, entity: &T) -> String {
        self.id_selector.select(entity)
    }

    /// Computes the partition key of an entity.
    pub fn partition_key_of(&self, entity: &T) -> String {
        self.partition_key_selector.select(entity)
    }

    /// Computes id and partition key, rejecting empty values.
    pub fn keys_of(&self, entity: &T) -> DocumentStoreResult<(String, String)> {
        let id = self.id_of(entity);
        let partition_key = self.partition_key_of(entity);

        if id.trim().is_empty() {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "{} has an empty id",
                self.type_name
            )));
        }

        if partition_key.trim().is_empty() {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "{} {} has an empty partition key",
                self.type_name, id
            )));
        }

        Ok((id, partition_key))
    }

    /// Encodes an entity into its store document.
    pub fn encode(&self, entity: &T, context: &EncodeContext<'_>) -> DocumentStoreResult<Value> {
        self.pipeline.encode(self, entity, context)
    }

    /// Decodes a store document into an entity and its shadow values.
    pub fn decode(&self, document: Value) -> DocumentStoreResult<Decoded<T>> {
        self.pipeline.decode(self, document)
    }

    /// The rewrite rules applied to this type, in order.
    pub fn pipeline(&self) -> &DocumentPipeline<T> {
        &self.pipeline
    }

    pub(crate) fn domain_events(&self) -> Option<&DomainEventAccessor<T>> {
        self.domain_events.as_ref()
    }
}

impl<T> fmt::Debug for EntityConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityConfiguration")
            .field("type_name", &self.type_name)
            .field("container_name", &self.container_name)
            .field("partition_key_name", &self.partition_key_name)
            .field("partition_key_placement", &self.partition_key_placement)
            .field("fields", &self.fields)
            .field("properties", &self.properties)
            .field("shadow_properties", &self.shadow_properties)
            .field("domain_events", &self.domain_events.is_some())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// A type-erased configuration as stored in the registry.
#[derive(Clone)]
pub(crate) struct RegisteredConfiguration {
    pub(crate) type_name: String,
    pub(crate) container_name: String,
    pub(crate) configuration: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for RegisteredConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredConfiguration")
            .field("type_name", &self.type_name)
            .field("container_name", &self.container_name)
            .finish()
    }
}

/// Immutable lookup from entity type to its configuration.
///
/// The registry is built once by [`ModelBuilder::build`](crate::model::ModelBuilder::build)
/// and exposes no way to register further types, so it can be shared freely (typically
/// behind an `Arc`) by every session.
#[derive(Debug, Clone, Default)]
pub struct EntityConfigurationRegistry {
    configurations: HashMap<TypeId, RegisteredConfiguration>,
}

impl EntityConfigurationRegistry {
    pub(crate) fn new(configurations: HashMap<TypeId, RegisteredConfiguration>) -> Self {
        Self { configurations }
    }

    /// Returns the configuration of `T`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `T` was never registered.
    pub fn get<T: Entity>(&self) -> DocumentStoreResult<Arc<EntityConfiguration<T>>> {
        self.try_get::<T>().ok_or_else(|| {
            DocumentStoreError::Configuration(format!(
                "no configuration has been registered for type {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Returns the configuration of `T`, or `None` when it was never registered.
    pub fn try_get<T: Entity>(&self) -> Option<Arc<EntityConfiguration<T>>> {
        self.configurations
            .get(&TypeId::of::<T>())
            .and_then(|registered| {
                Arc::clone(&registered.configuration)
                    .downcast::<EntityConfiguration<T>>()
                    .ok()
            })
    }

    /// Returns `true` when `T` has a configuration.
    pub fn contains<T: Entity>(&self) -> bool {
        self.configurations.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Names of all containers used by the model, sorted and deduplicated.
    pub fn container_names(&self) -> Vec<String> {
        let mut names = self
            .configurations
            .values()
            .map(|registered| registered.container_name.clone())
            .collect::<Vec<_>>();

        names.sort();
        names.dedup();
        names
    }

    /// Discriminators of all registered types, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names = self
            .configurations
            .values()
            .map(|registered| registered.type_name.clone())
            .collect::<Vec<_>>();

        names.sort();
        names
    }
}
