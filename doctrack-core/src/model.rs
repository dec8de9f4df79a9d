//! Fluent configuration of entity types.
//!
//! # Example
//!
//! ```ignore
//! use doctrack::model::ModelBuilder;
//!
//! let registry = ModelBuilder::new(DatabaseOptions::new("todo"))
//!     .define_entity::<AccountPlan>(|plan| {
//!         plan.container("plans")
//!             .id(|p| p.id.clone())
//!             .partition_key("id", |p| p.id.clone())
//!     })
//!     .define_entity::<TodoItem>(|item| {
//!         item.container("todos")
//!             .id(|t| t.id.clone())
//!             .shadow_partition_key("ownerListKey", |t| format!("{}_{}", t.owner, t.list))
//!             .shadow_property("createdBy", String::from("system"))
//!     })
//!     .build()?;
//! ```

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    any::{TypeId, type_name},
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::debug;

use crate::{
    configuration::{
        DomainEventAccessor, ETAG_FIELD, EntityConfiguration, EntityConfigurationRegistry,
        ID_FIELD, PartitionKeyPlacement, RegisteredConfiguration, ShadowPropertyDefinition,
        TIMESTAMP_FIELD, TYPE_FIELD,
    },
    entity::{Entity, short_type_name},
    error::{DocumentStoreError, DocumentStoreResult},
    options::{DatabaseOptions, NamingPolicy},
    schema::EntityShape,
    selector::{Accessor, StringSelector},
    serialization::{DocumentPipeline, DocumentRule},
};

/// Configuration being accumulated for entity type `T`.
pub struct EntityBuilder<T> {
    type_name: Option<String>,
    container_name: Option<String>,
    id_selector: Option<StringSelector<T>>,
    partition_key: Option<(String, StringSelector<T>, PartitionKeyPlacement)>,
    stray_partition_key_parts: usize,
    fields: Vec<Accessor<T>>,
    properties: Vec<Accessor<T>>,
    shadow_properties: Vec<(String, &'static str, DocumentStoreResult<Value>)>,
    domain_events: Option<DomainEventAccessor<T>>,
    rules: Vec<Box<dyn DocumentRule<T>>>,
}

impl<T: Entity> EntityBuilder<T> {
    fn new() -> Self {
        Self {
            type_name: None,
            container_name: None,
            id_selector: None,
            partition_key: None,
            stray_partition_key_parts: 0,
            fields: Vec::new(),
            properties: Vec::new(),
            shadow_properties: Vec::new(),
            domain_events: None,
            rules: Vec::new(),
        }
    }

    /// Binds the entity to a container.
    pub fn container(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    /// Overrides the `_type` discriminator (defaults to the unqualified type name).
    pub fn type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    /// Sets the id selector.
    pub fn id<F>(mut self, selector: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.id_selector = Some(StringSelector::single(selector));
        self
    }

    /// Uses one of the entity's own fields as partition key.
    ///
    /// `name` is the wire name of that field.
    pub fn partition_key<F>(mut self, name: impl Into<String>, selector: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.partition_key = Some((
            name.into(),
            StringSelector::single(selector),
            PartitionKeyPlacement::Entity,
        ));
        self
    }

    /// Uses a computed value as partition key. The value is written to the wire under
    /// `name` but never becomes entity state.
    pub fn shadow_partition_key<F>(mut self, name: impl Into<String>, selector: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.partition_key = Some((
            name.into(),
            StringSelector::single(selector),
            PartitionKeyPlacement::Shadow,
        ));
        self
    }

    /// Uses several entity values joined with `_`, followed by `suffix`, as a shadow
    /// partition key. Each value is added with [`EntityBuilder::partition_key_part`].
    ///
    /// ```ignore
    /// item.composite_partition_key("ownerList", "")
    ///     .partition_key_part(|t| t.owner_id.clone())
    ///     .partition_key_part(|t| t.position.to_string())
    /// ```
    pub fn composite_partition_key(mut self, name: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.partition_key = Some((
            name.into(),
            StringSelector::composite(suffix),
            PartitionKeyPlacement::Shadow,
        ));
        self
    }

    /// Appends a value to the composite partition key declared before it.
    pub fn partition_key_part<F>(mut self, part: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        let appended = match &mut self.partition_key {
            Some((_, selector, _)) => selector.push_part(part),
            None => false,
        };

        if !appended {
            self.stray_partition_key_parts += 1;
        }

        self
    }

    /// Declares a backing field that serde does not see (for example a `#[serde(skip)]`
    /// field). It is written from `getter` on encode and restored with `setter` on decode.
    pub fn field<V, G, S>(mut self, name: impl Into<String>, getter: G, setter: S) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.fields.push(Accessor::read_write(name, getter, setter));
        self
    }

    /// Declares a computed property that is persisted but not read back.
    pub fn property<V, G>(mut self, name: impl Into<String>, getter: G) -> Self
    where
        V: Serialize + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.properties.push(Accessor::read_only(name, getter));
        self
    }

    /// Declares a persisted property with a setter used on decode.
    pub fn property_with_setter<V, G, S>(
        mut self,
        name: impl Into<String>,
        getter: G,
        setter: S,
    ) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.properties
            .push(Accessor::read_write(name, getter, setter));
        self
    }

    /// Declares a shadow property persisted with the entity but kept out of it.
    ///
    /// Newly added entities start with `default`; materialized entities take the stored value.
    pub fn shadow_property<V>(mut self, name: impl Into<String>, default: V) -> Self
    where
        V: Serialize + 'static,
    {
        self.shadow_properties.push((
            name.into(),
            type_name::<V>(),
            serde_json::to_value(default).map_err(DocumentStoreError::from),
        ));
        self
    }

    /// Declares how domain events are read from and cleared on the entity.
    ///
    /// After each successful write the events are persisted as separate records in the
    /// entity's container and partition, then cleared.
    pub fn domain_events<E, G, C>(mut self, events: G, clear: C) -> Self
    where
        E: Serialize + 'static,
        G: Fn(&T) -> Vec<E> + Send + Sync + 'static,
        C: Fn(&mut T) + Send + Sync + 'static,
    {
        self.domain_events = Some(DomainEventAccessor::new(
            Arc::new(move |entity: &T| {
                events(entity)
                    .iter()
                    .map(|event| serde_json::to_value(event).map_err(DocumentStoreError::from))
                    .collect::<DocumentStoreResult<Vec<Value>>>()
            }),
            Arc::new(clear),
        ));
        self
    }

    /// Appends a custom rewrite rule after the standard serialization rules.
    pub fn rule(mut self, rule: impl DocumentRule<T> + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    fn into_configuration(self, options: &DatabaseOptions) -> DocumentStoreResult<EntityConfiguration<T>> {
        let naming = options.naming_policy;
        let type_name = self
            .type_name
            .unwrap_or_else(|| short_type_name::<T>().to_string());

        let container_name = self
            .container_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| missing(&type_name, "container"))?;
        let id_selector = self
            .id_selector
            .ok_or_else(|| missing(&type_name, "id selector"))?;
        let (partition_key_name, partition_key_selector, partition_key_placement) = self
            .partition_key
            .ok_or_else(|| missing(&type_name, "partition key selector"))?;

        if self.stray_partition_key_parts > 0 {
            return Err(DocumentStoreError::Configuration(format!(
                "{type_name}: partition key parts need a preceding composite partition key"
            )));
        }

        if partition_key_selector.part_count() == 0 {
            return Err(missing(&type_name, "composite partition key part"));
        }

        let shape = EntityShape::of::<T>();
        let partition_key_name = naming.convert_name(&partition_key_name);

        if partition_key_name.is_empty() {
            return Err(missing(&type_name, "partition key name"));
        }

        // Event records carry their own id next to the entity's partition key.
        if self.domain_events.is_some() && partition_key_name == ID_FIELD {
            return Err(DocumentStoreError::Configuration(format!(
                "{type_name}: domain events require a partition key other than '{ID_FIELD}'"
            )));
        }

        let mut names = NameSet::new(&type_name, &shape);

        match partition_key_placement {
            PartitionKeyPlacement::Entity => {
                if shape.is_known() && !shape.has_field(&partition_key_name) {
                    return Err(DocumentStoreError::Configuration(format!(
                        "{type_name}: partition key '{partition_key_name}' is not a field of the entity"
                    )));
                }
            }
            PartitionKeyPlacement::Shadow => names.claim(&partition_key_name, "partition key")?,
        }

        let fields = named_accessors(self.fields, naming, &mut names, "field")?;
        let properties = named_accessors(self.properties, naming, &mut names, "property")?;

        let mut shadow_properties = Vec::with_capacity(self.shadow_properties.len());

        for (name, declared_type, default_value) in self.shadow_properties {
            let name = naming.convert_name(&name);

            names.claim(&name, "shadow property")?;

            shadow_properties.push(ShadowPropertyDefinition {
                name,
                type_name: declared_type,
                default_value: default_value?,
            });
        }

        let mut pipeline = DocumentPipeline::standard();

        for rule in self.rules {
            pipeline.push(rule);
        }

        Ok(EntityConfiguration {
            type_name,
            container_name,
            id_selector,
            partition_key_name,
            partition_key_selector,
            partition_key_placement,
            fields,
            properties,
            shadow_properties,
            domain_events: self.domain_events,
            emit_type_discriminator: options.emit_type_discriminator,
            shape,
            pipeline,
        })
    }
}

fn missing(type_name: &str, what: &str) -> DocumentStoreError {
    DocumentStoreError::Configuration(format!("{type_name}: missing {what}"))
}

fn named_accessors<T>(
    accessors: Vec<Accessor<T>>,
    naming: NamingPolicy,
    names: &mut NameSet<'_>,
    kind: &str,
) -> DocumentStoreResult<Vec<(String, Accessor<T>)>> {
    accessors
        .into_iter()
        .map(|accessor| {
            let wire_name = naming.convert_name(accessor.name());

            names.claim(&wire_name, kind)?;

            Ok((wire_name, accessor))
        })
        .collect()
}

/// Wire names generated by the model for one type, checked against the entity's own fields
/// and the reserved system names.
struct NameSet<'a> {
    type_name: &'a str,
    shape: &'a EntityShape,
    claimed: HashSet<String>,
}

impl<'a> NameSet<'a> {
    fn new(type_name: &'a str, shape: &'a EntityShape) -> Self {
        Self {
            type_name,
            shape,
            claimed: HashSet::new(),
        }
    }

    fn claim(&mut self, name: &str, kind: &str) -> DocumentStoreResult<()> {
        let type_name = self.type_name;

        if name.trim().is_empty() {
            return Err(DocumentStoreError::Configuration(format!(
                "{type_name}: {kind} name is empty"
            )));
        }

        if [ID_FIELD, ETAG_FIELD, TIMESTAMP_FIELD, TYPE_FIELD].contains(&name) {
            return Err(DocumentStoreError::Configuration(format!(
                "{type_name}: {kind} '{name}' uses a reserved name"
            )));
        }

        if self.shape.has_field(name) {
            return Err(DocumentStoreError::Configuration(format!(
                "{type_name}: {kind} '{name}' collides with a field of the entity"
            )));
        }

        if !self.claimed.insert(name.to_string()) {
            return Err(DocumentStoreError::Configuration(format!(
                "{type_name}: {kind} '{name}' is declared more than once"
            )));
        }

        Ok(())
    }
}

trait PendingEntity {
    fn entity_type_id(&self) -> TypeId;
    fn rust_type_name(&self) -> &'static str;
    fn build(self: Box<Self>, options: &DatabaseOptions) -> DocumentStoreResult<RegisteredConfiguration>;
}

impl<T: Entity> PendingEntity for EntityBuilder<T> {
    fn entity_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn rust_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn build(self: Box<Self>, options: &DatabaseOptions) -> DocumentStoreResult<RegisteredConfiguration> {
        let configuration = (*self).into_configuration(options)?;

        Ok(RegisteredConfiguration {
            type_name: configuration.type_name.clone(),
            container_name: configuration.container_name.clone(),
            configuration: Arc::new(configuration),
        })
    }
}

/// Accumulates entity configurations and freezes them into an
/// [`EntityConfigurationRegistry`].
///
/// Every problem in the model (duplicate types, missing selectors, colliding names) is
/// reported by [`ModelBuilder::build`], before any session exists.
pub struct ModelBuilder {
    options: DatabaseOptions,
    pending: Vec<Box<dyn PendingEntity>>,
}

impl ModelBuilder {
    /// Creates a builder for a database with the given options.
    ///
    /// The options must match the ones the database is opened with, since the naming policy
    /// and discriminator setting are baked into the configurations.
    pub fn new(options: DatabaseOptions) -> Self {
        Self {
            options,
            pending: Vec::new(),
        }
    }

    /// Defines the mapping of entity type `T`.
    pub fn define_entity<T: Entity>(
        mut self,
        configure: impl FnOnce(EntityBuilder<T>) -> EntityBuilder<T>,
    ) -> Self {
        self.pending.push(Box::new(configure(EntityBuilder::new())));
        self
    }

    /// Validates every definition and freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for the first invalid definition, or when a type is
    /// defined more than once.
    pub fn build(self) -> DocumentStoreResult<EntityConfigurationRegistry> {
        let mut configurations = HashMap::with_capacity(self.pending.len());

        for pending in self.pending {
            let type_id = pending.entity_type_id();
            let rust_type_name = pending.rust_type_name();

            if configurations.contains_key(&type_id) {
                return Err(DocumentStoreError::Configuration(format!(
                    "type {rust_type_name} is defined more than once"
                )));
            }

            let registered = pending.build(&self.options)?;

            debug!(
                entity = rust_type_name,
                container = %registered.container_name,
                "registered entity configuration"
            );

            configurations.insert(type_id, registered);
        }

        Ok(EntityConfigurationRegistry::new(configurations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct AccountPlan {
        id: String,
        name: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct TodoItem {
        id: String,
        owner_id: String,
        list_name: String,
    }

    fn options() -> DatabaseOptions {
        DatabaseOptions::new("test")
    }

    fn plan_model(builder: ModelBuilder) -> ModelBuilder {
        builder.define_entity::<AccountPlan>(|plan| {
            plan.container("plans")
                .id(|p| p.id.clone())
                .partition_key("id", |p| p.id.clone())
        })
    }

    #[test]
    fn build_freezes_lookup_by_type() {
        let registry = plan_model(ModelBuilder::new(options())).build().unwrap();

        let configuration = registry.get::<AccountPlan>().unwrap();

        assert_eq!(configuration.container_name(), "plans");
        assert_eq!(configuration.type_name(), "AccountPlan");
        assert!(configuration.is_partition_key_in_entity());
        assert!(registry.contains::<AccountPlan>());
        assert!(registry.try_get::<TodoItem>().is_none());
        assert!(matches!(
            registry.get::<TodoItem>(),
            Err(DocumentStoreError::Configuration(_))
        ));
    }

    #[test]
    fn duplicate_registration_fails_at_build() {
        let result = plan_model(plan_model(ModelBuilder::new(options()))).build();

        assert!(matches!(result, Err(DocumentStoreError::Configuration(message)) if message.contains("more than once")));
    }

    #[test]
    fn missing_selectors_fail_at_build() {
        let no_container = ModelBuilder::new(options())
            .define_entity::<AccountPlan>(|plan| {
                plan.id(|p| p.id.clone())
                    .partition_key("id", |p| p.id.clone())
            })
            .build();
        let no_partition_key = ModelBuilder::new(options())
            .define_entity::<AccountPlan>(|plan| plan.container("plans").id(|p| p.id.clone()))
            .build();

        assert!(matches!(no_container, Err(DocumentStoreError::Configuration(m)) if m.contains("container")));
        assert!(matches!(no_partition_key, Err(DocumentStoreError::Configuration(m)) if m.contains("partition key")));
    }

    #[test]
    fn shadow_property_colliding_with_entity_field_fails() {
        let result = ModelBuilder::new(options())
            .define_entity::<AccountPlan>(|plan| {
                plan.container("plans")
                    .id(|p| p.id.clone())
                    .partition_key("id", |p| p.id.clone())
                    .shadow_property("name", "x")
            })
            .build();

        assert!(matches!(result, Err(DocumentStoreError::Configuration(m)) if m.contains("collides")));
    }

    #[test]
    fn reserved_names_are_rejected() {
        let result = ModelBuilder::new(options())
            .define_entity::<AccountPlan>(|plan| {
                plan.container("plans")
                    .id(|p| p.id.clone())
                    .partition_key("id", |p| p.id.clone())
                    .shadow_property("_etag", "x")
            })
            .build();

        assert!(matches!(result, Err(DocumentStoreError::Configuration(m)) if m.contains("reserved")));
    }

    #[test]
    fn domain_events_need_a_partition_key_other_than_id() {
        let result = ModelBuilder::new(options())
            .define_entity::<AccountPlan>(|plan| {
                plan.container("plans")
                    .id(|p| p.id.clone())
                    .partition_key("id", |p| p.id.clone())
                    .domain_events(|_| Vec::<String>::new(), |_| {})
            })
            .build();

        assert!(matches!(result, Err(DocumentStoreError::Configuration(m)) if m.contains("domain events")));
    }

    #[test]
    fn entity_partition_key_must_be_an_entity_field() {
        let result = ModelBuilder::new(options())
            .define_entity::<AccountPlan>(|plan| {
                plan.container("plans")
                    .id(|p| p.id.clone())
                    .partition_key("tenant", |p| p.id.clone())
            })
            .build();

        assert!(matches!(result, Err(DocumentStoreError::Configuration(m)) if m.contains("not a field")));
    }

    #[test]
    fn shadow_partition_key_name_uses_naming_policy() {
        let registry = ModelBuilder::new(options())
            .define_entity::<TodoItem>(|item| {
                item.container("todos")
                    .id(|t| t.id.clone())
                    .shadow_partition_key("owner_list_key", |t| format!("{}_{}", t.owner_id, t.list_name))
                    .shadow_property("createdBy", "system")
            })
            .build()
            .unwrap();

        let configuration = registry.get::<TodoItem>().unwrap();

        assert_eq!(configuration.partition_key_name(), "ownerListKey");
        assert!(!configuration.is_partition_key_in_entity());
        assert_eq!(configuration.shadow_properties()[0].default_value, Value::from("system"));
        assert_eq!(configuration.shadow_properties()[0].type_name, "&str");
        assert_eq!(registry.container_names(), vec!["todos".to_string()]);
    }

    #[test]
    fn shadow_property_names_use_naming_policy() {
        let define = |options: DatabaseOptions| {
            ModelBuilder::new(options)
                .define_entity::<TodoItem>(|item| {
                    item.container("todos")
                        .id(|t| t.id.clone())
                        .shadow_partition_key("pk", |t| t.owner_id.clone())
                        .shadow_property("created_by", "system")
                })
                .build()
                .unwrap()
        };

        let camel = define(options());
        let as_is = define(options().with_naming_policy(NamingPolicy::AsIs));

        assert_eq!(camel.get::<TodoItem>().unwrap().shadow_properties()[0].name, "createdBy");
        assert_eq!(as_is.get::<TodoItem>().unwrap().shadow_properties()[0].name, "created_by");
    }

    #[test]
    fn shadow_property_colliding_after_conversion_fails() {
        let result = ModelBuilder::new(options())
            .define_entity::<TodoItem>(|item| {
                item.container("todos")
                    .id(|t| t.id.clone())
                    .shadow_partition_key("pk", |t| t.owner_id.clone())
                    .shadow_property("owner_id", "x")
            })
            .build();

        assert!(matches!(result, Err(DocumentStoreError::Configuration(m)) if m.contains("collides")));
    }

    #[test]
    fn composite_partition_key_takes_parts_of_any_closure_type() {
        let registry = ModelBuilder::new(options())
            .define_entity::<TodoItem>(|item| {
                item.container("todos")
                    .id(|t| t.id.clone())
                    .composite_partition_key("owner_list", "-open")
                    .partition_key_part(|t| t.owner_id.clone())
                    .partition_key_part(|t| format!("{}{}", t.list_name, t.id.len()))
            })
            .build()
            .unwrap();

        let configuration = registry.get::<TodoItem>().unwrap();
        let (_, partition_key) = configuration
            .keys_of(&TodoItem {
                id: "t1".into(),
                owner_id: "alice".into(),
                list_name: "groceries".into(),
            })
            .unwrap();

        assert_eq!(configuration.partition_key_name(), "ownerList");
        assert_eq!(partition_key, "alice_groceries2-open");
    }

    #[test]
    fn misplaced_partition_key_parts_fail_at_build() {
        let stray = ModelBuilder::new(options())
            .define_entity::<TodoItem>(|item| {
                item.container("todos")
                    .id(|t| t.id.clone())
                    .partition_key_part(|t| t.owner_id.clone())
                    .shadow_partition_key("pk", |t| t.owner_id.clone())
            })
            .build();

        let empty = ModelBuilder::new(options())
            .define_entity::<TodoItem>(|item| {
                item.container("todos")
                    .id(|t| t.id.clone())
                    .composite_partition_key("pk", "")
            })
            .build();

        assert!(matches!(stray, Err(DocumentStoreError::Configuration(m)) if m.contains("preceding composite")));
        assert!(matches!(empty, Err(DocumentStoreError::Configuration(m)) if m.contains("composite partition key part")));
    }

    #[test]
    fn shadow_partition_key_colliding_with_field_fails() {
        let result = ModelBuilder::new(options())
            .define_entity::<TodoItem>(|item| {
                item.container("todos")
                    .id(|t| t.id.clone())
                    .shadow_partition_key("ownerId", |t| t.owner_id.clone())
            })
            .build();

        assert!(matches!(result, Err(DocumentStoreError::Configuration(m)) if m.contains("collides")));
    }

    #[test]
    fn empty_partition_key_is_invalid() {
        let registry = plan_model(ModelBuilder::new(options())).build().unwrap();
        let configuration = registry.get::<AccountPlan>().unwrap();

        let result = configuration.keys_of(&AccountPlan {
            id: String::new(),
            name: "Test".into(),
        });

        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }
}
