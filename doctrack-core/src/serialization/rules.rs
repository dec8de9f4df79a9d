//! The standard rewrite rules.

use serde_json::Value;

use super::{DecodeContext, DocumentMap, DocumentRule, EncodeContext, insert_generated};
use crate::{
    configuration::{ETAG_FIELD, EntityConfiguration, ID_FIELD, TIMESTAMP_FIELD, TYPE_FIELD},
    entity::Entity,
    error::DocumentStoreResult,
};

/// Store-maintained fields that never belong to an entity. `_etag` and `_ts` are kept as
/// shadow values; the rest is dropped.
const SYSTEM_FIELDS: [&str; 3] = ["_rid", "_self", "_attachments"];

/// Writes `id` for entities whose own shape has no `id` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRule;

impl<T: Entity> DocumentRule<T> for IdentityRule {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn encode(
        &self,
        configuration: &EntityConfiguration<T>,
        entity: &T,
        _context: &EncodeContext<'_>,
        document: &mut DocumentMap,
    ) -> DocumentStoreResult<()> {
        if !document.contains_key(ID_FIELD) {
            document.insert(ID_FIELD.to_string(), Value::String(configuration.id_of(entity)));
        }

        Ok(())
    }

    fn extract(
        &self,
        configuration: &EntityConfiguration<T>,
        document: &mut DocumentMap,
        _context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        let shape = configuration.shape();

        if shape.is_known() && !shape.has_field(ID_FIELD) {
            document.remove(ID_FIELD);
        }

        Ok(())
    }
}

/// Round-trips backing fields declared with `EntityBuilder::field`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackingFieldRule;

impl<T: Entity> DocumentRule<T> for BackingFieldRule {
    fn name(&self) -> &'static str {
        "backing-field"
    }

    fn encode(
        &self,
        configuration: &EntityConfiguration<T>,
        entity: &T,
        _context: &EncodeContext<'_>,
        document: &mut DocumentMap,
    ) -> DocumentStoreResult<()> {
        for (name, accessor) in &configuration.fields {
            insert_generated(document, &configuration.type_name, name, accessor.get(entity)?)?;
        }

        Ok(())
    }

    fn extract(
        &self,
        configuration: &EntityConfiguration<T>,
        document: &mut DocumentMap,
        context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        for (name, _) in &configuration.fields {
            if let Some(value) = document.remove(name) {
                context.deferred.insert(name.clone(), value);
            }
        }

        Ok(())
    }

    fn populate(
        &self,
        configuration: &EntityConfiguration<T>,
        entity: &mut T,
        context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        for (name, accessor) in &configuration.fields {
            if let Some(value) = context.deferred.remove(name) {
                accessor.set(entity, value)?;
            }
        }

        Ok(())
    }
}

/// Persists properties declared with `EntityBuilder::property`.
///
/// Read-only properties are dropped on decode; properties with a setter are written back.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredPropertyRule;

impl<T: Entity> DocumentRule<T> for DeclaredPropertyRule {
    fn name(&self) -> &'static str {
        "declared-property"
    }

    fn encode(
        &self,
        configuration: &EntityConfiguration<T>,
        entity: &T,
        _context: &EncodeContext<'_>,
        document: &mut DocumentMap,
    ) -> DocumentStoreResult<()> {
        for (name, accessor) in &configuration.properties {
            insert_generated(document, &configuration.type_name, name, accessor.get(entity)?)?;
        }

        Ok(())
    }

    fn extract(
        &self,
        configuration: &EntityConfiguration<T>,
        document: &mut DocumentMap,
        context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        for (name, accessor) in &configuration.properties {
            match document.remove(name) {
                Some(value) if accessor.is_writable() => {
                    context.deferred.insert(name.clone(), value);
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn populate(
        &self,
        configuration: &EntityConfiguration<T>,
        entity: &mut T,
        context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        for (name, accessor) in &configuration.properties {
            if let Some(value) = context.deferred.remove(name) {
                accessor.set(entity, value)?;
            }
        }

        Ok(())
    }
}

/// Writes computed partition keys, which are not fields of the entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionKeyRule;

impl<T: Entity> DocumentRule<T> for PartitionKeyRule {
    fn name(&self) -> &'static str {
        "partition-key"
    }

    fn encode(
        &self,
        configuration: &EntityConfiguration<T>,
        entity: &T,
        _context: &EncodeContext<'_>,
        document: &mut DocumentMap,
    ) -> DocumentStoreResult<()> {
        if configuration.is_partition_key_in_entity() {
            return Ok(());
        }

        insert_generated(
            document,
            &configuration.type_name,
            &configuration.partition_key_name,
            Value::String(configuration.partition_key_of(entity)),
        )
    }

    fn extract(
        &self,
        configuration: &EntityConfiguration<T>,
        document: &mut DocumentMap,
        _context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        if !configuration.is_partition_key_in_entity() {
            document.remove(&configuration.partition_key_name);
        }

        Ok(())
    }
}

/// Moves declared shadow properties between the shadow store and the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShadowPropertyRule;

impl<T: Entity> DocumentRule<T> for ShadowPropertyRule {
    fn name(&self) -> &'static str {
        "shadow-property"
    }

    fn encode(
        &self,
        configuration: &EntityConfiguration<T>,
        _entity: &T,
        context: &EncodeContext<'_>,
        document: &mut DocumentMap,
    ) -> DocumentStoreResult<()> {
        for property in &configuration.shadow_properties {
            let value = context
                .shadows
                .get(context.key, &property.name)
                .unwrap_or_else(|| property.default_value.clone());

            insert_generated(document, &configuration.type_name, &property.name, value)?;
        }

        Ok(())
    }

    fn extract(
        &self,
        configuration: &EntityConfiguration<T>,
        document: &mut DocumentMap,
        context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        for property in &configuration.shadow_properties {
            if let Some(value) = document.remove(&property.name) {
                context.shadow_values.insert(property.name.clone(), value);
            }
        }

        Ok(())
    }
}

/// Carries the concurrency token and strips other store metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPropertyRule;

impl<T: Entity> DocumentRule<T> for SystemPropertyRule {
    fn name(&self) -> &'static str {
        "system-property"
    }

    fn encode(
        &self,
        configuration: &EntityConfiguration<T>,
        _entity: &T,
        context: &EncodeContext<'_>,
        document: &mut DocumentMap,
    ) -> DocumentStoreResult<()> {
        match context.shadows.get(context.key, ETAG_FIELD) {
            Some(Value::Null) | None => Ok(()),
            Some(etag) => insert_generated(document, &configuration.type_name, ETAG_FIELD, etag),
        }
    }

    fn extract(
        &self,
        _configuration: &EntityConfiguration<T>,
        document: &mut DocumentMap,
        context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        for name in [ETAG_FIELD, TIMESTAMP_FIELD] {
            if let Some(value) = document.remove(name) {
                context.shadow_values.insert(name.to_string(), value);
            }
        }

        for name in SYSTEM_FIELDS {
            document.remove(name);
        }

        Ok(())
    }
}

/// Writes the `_type` discriminator used by typed queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeDiscriminatorRule;

impl<T: Entity> DocumentRule<T> for TypeDiscriminatorRule {
    fn name(&self) -> &'static str {
        "type-discriminator"
    }

    fn encode(
        &self,
        configuration: &EntityConfiguration<T>,
        _entity: &T,
        _context: &EncodeContext<'_>,
        document: &mut DocumentMap,
    ) -> DocumentStoreResult<()> {
        if !configuration.emits_type_discriminator() {
            return Ok(());
        }

        insert_generated(
            document,
            &configuration.type_name,
            TYPE_FIELD,
            Value::String(configuration.type_name.clone()),
        )
    }

    fn extract(
        &self,
        _configuration: &EntityConfiguration<T>,
        document: &mut DocumentMap,
        _context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        document.remove(TYPE_FIELD);

        Ok(())
    }
}
