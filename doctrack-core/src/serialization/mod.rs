//! Encoding and decoding of entities as store documents.
//!
//! `serde_json` produces the entity's own fields. A [`DocumentPipeline`] of
//! [`DocumentRule`]s then rewrites that object: each rule contributes one category of
//! out-of-band field on encode and takes it back out on decode. The standard chain, in
//! order, is:
//!
//! 1. [`IdentityRule`](rules::IdentityRule) - `id` for entities without an `id` field
//! 2. [`BackingFieldRule`](rules::BackingFieldRule) - fields declared with `field(..)`
//! 3. [`DeclaredPropertyRule`](rules::DeclaredPropertyRule) - properties declared with `property(..)`
//! 4. [`PartitionKeyRule`](rules::PartitionKeyRule) - computed partition keys
//! 5. [`ShadowPropertyRule`](rules::ShadowPropertyRule) - declared shadow properties
//! 6. [`SystemPropertyRule`](rules::SystemPropertyRule) - `_etag` and other store metadata
//! 7. [`TypeDiscriminatorRule`](rules::TypeDiscriminatorRule) - `_type`
//!
//! Custom rules registered with [`EntityBuilder::rule`](crate::model::EntityBuilder::rule)
//! run after the standard chain.
//!
//! Decoding is two-phase: every rule first extracts its fields from the raw document, the
//! remainder is deserialized into the entity, and rules then populate values serde could
//! not see. Extracted shadow values are returned next to the entity and never touch it.

pub mod rules;

use serde_json::{Map, Value};
use std::{collections::HashMap, fmt};
use tracing::trace;

use crate::{
    configuration::EntityConfiguration,
    entity::{Entity, EntityKey},
    error::{DocumentStoreError, DocumentStoreResult},
    shadow::{ShadowStore, ShadowValues},
};

use self::rules::{
    BackingFieldRule, DeclaredPropertyRule, IdentityRule, PartitionKeyRule, ShadowPropertyRule,
    SystemPropertyRule, TypeDiscriminatorRule,
};

/// A JSON object as written to the store.
pub type DocumentMap = Map<String, Value>;

/// State available to rules while encoding one entity.
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext<'a> {
    /// Identity of the entity being encoded.
    pub key: EntityKey,
    /// Shadow values shared by the database.
    pub shadows: &'a ShadowStore,
}

/// State threaded through the phases of decoding one document.
#[derive(Debug, Default)]
pub struct DecodeContext {
    /// Values destined for the shadow store.
    pub shadow_values: ShadowValues,
    /// Values taken out of the document to be written onto the entity after deserialization,
    /// keyed by wire name.
    pub deferred: HashMap<String, Value>,
}

/// An entity freshly decoded from a document, with the shadow values found next to it.
#[derive(Debug)]
pub struct Decoded<T> {
    /// The materialized entity.
    pub entity: T,
    /// Shadow values to hand to the shadow store.
    pub shadow_values: ShadowValues,
}

/// One rewrite step of the pipeline.
pub trait DocumentRule<T>: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Adds this rule's fields to an encoded entity.
    fn encode(
        &self,
        configuration: &EntityConfiguration<T>,
        entity: &T,
        context: &EncodeContext<'_>,
        document: &mut DocumentMap,
    ) -> DocumentStoreResult<()>;

    /// Removes this rule's fields from a raw document before it is deserialized.
    fn extract(
        &self,
        configuration: &EntityConfiguration<T>,
        document: &mut DocumentMap,
        context: &mut DecodeContext,
    ) -> DocumentStoreResult<()>;

    /// Writes deferred values onto the deserialized entity.
    fn populate(
        &self,
        _configuration: &EntityConfiguration<T>,
        _entity: &mut T,
        _context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// An ordered chain of rules.
pub struct DocumentPipeline<T> {
    rules: Vec<Box<dyn DocumentRule<T>>>,
}

impl<T: Entity> DocumentPipeline<T> {
    /// The standard chain of rules.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Box::new(IdentityRule),
                Box::new(BackingFieldRule),
                Box::new(DeclaredPropertyRule),
                Box::new(PartitionKeyRule),
                Box::new(ShadowPropertyRule),
                Box::new(SystemPropertyRule),
                Box::new(TypeDiscriminatorRule),
            ],
        }
    }

    /// Appends a rule to the chain.
    pub fn push(&mut self, rule: Box<dyn DocumentRule<T>>) {
        self.rules.push(rule);
    }

    /// Names of the rules, in order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Encodes an entity into a store document.
    pub fn encode(
        &self,
        configuration: &EntityConfiguration<T>,
        entity: &T,
        context: &EncodeContext<'_>,
    ) -> DocumentStoreResult<Value> {
        let mut document = into_object(serde_json::to_value(entity)?, configuration)?;

        for rule in &self.rules {
            rule.encode(configuration, entity, context, &mut document)?;
        }

        trace!(
            entity = configuration.type_name(),
            key = %context.key,
            fields = document.len(),
            "encoded document"
        );

        Ok(Value::Object(document))
    }

    /// Decodes a store document into an entity and its shadow values.
    pub fn decode(
        &self,
        configuration: &EntityConfiguration<T>,
        document: Value,
    ) -> DocumentStoreResult<Decoded<T>> {
        let mut document = into_object(document, configuration)?;
        let mut context = DecodeContext::default();

        for rule in &self.rules {
            rule.extract(configuration, &mut document, &mut context)?;
        }

        let mut entity = serde_json::from_value::<T>(Value::Object(document))?;

        for rule in &self.rules {
            rule.populate(configuration, &mut entity, &mut context)?;
        }

        trace!(
            entity = configuration.type_name(),
            shadow_values = context.shadow_values.len(),
            "decoded document"
        );

        Ok(Decoded {
            entity,
            shadow_values: context.shadow_values,
        })
    }
}

impl<T> fmt::Debug for DocumentPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

fn into_object<T>(value: Value, configuration: &EntityConfiguration<T>) -> DocumentStoreResult<DocumentMap> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "{} must be a JSON object, found {}",
            configuration.type_name,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Inserts a generated field, refusing to overwrite a field the entity already produced.
pub fn insert_generated(
    document: &mut DocumentMap,
    type_name: &str,
    name: &str,
    value: Value,
) -> DocumentStoreResult<()> {
    if document.contains_key(name) {
        return Err(DocumentStoreError::Serialization(format!(
            "{type_name}: generated field '{name}' collides with an existing field"
        )));
    }

    document.insert(name.to_string(), value);

    Ok(())
}

#[cfg(test)]
mod tests;
