//! Selectors and accessors that read persistence values out of entities.
//!
//! The model builder turns the closures handed to it into these types. A [`StringSelector`]
//! produces an id or partition key; an [`Accessor`] exposes a named value that serde does not
//! see on its own (a private backing field or a computed property).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{fmt, sync::Arc};

use crate::error::{DocumentStoreError, DocumentStoreResult};

type SelectorFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;
type GetterFn<T> = Arc<dyn Fn(&T) -> DocumentStoreResult<Value> + Send + Sync>;
type SetterFn<T> = Arc<dyn Fn(&mut T, Value) -> DocumentStoreResult<()> + Send + Sync>;

/// Produces a string key (id or partition key) from an entity.
pub enum StringSelector<T> {
    /// A single value read from the entity.
    Single(SelectorFn<T>),
    /// Several values joined with `_`, followed by a literal suffix.
    Composite {
        /// The parts, in order.
        parts: Vec<SelectorFn<T>>,
        /// Appended verbatim after the joined parts.
        suffix: String,
    },
}

impl<T> StringSelector<T> {
    /// Creates a selector reading one value.
    pub fn single<F>(selector: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        StringSelector::Single(Arc::new(selector))
    }

    /// Creates a composite selector without parts; add them with [`StringSelector::push_part`].
    pub fn composite(suffix: impl Into<String>) -> Self {
        StringSelector::Composite {
            parts: Vec::new(),
            suffix: suffix.into(),
        }
    }

    /// Appends a part to a composite selector. Returns `false` for a single selector.
    pub fn push_part<F>(&mut self, part: F) -> bool
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        match self {
            StringSelector::Single(_) => false,
            StringSelector::Composite { parts, .. } => {
                parts.push(Arc::new(part));
                true
            }
        }
    }

    /// Number of values the selector reads.
    pub fn part_count(&self) -> usize {
        match self {
            StringSelector::Single(_) => 1,
            StringSelector::Composite { parts, .. } => parts.len(),
        }
    }

    /// Evaluates the selector.
    pub fn select(&self, entity: &T) -> String {
        match self {
            StringSelector::Single(selector) => selector(entity),
            StringSelector::Composite { parts, suffix } => {
                let mut key = parts
                    .iter()
                    .map(|part| part(entity))
                    .collect::<Vec<_>>()
                    .join("_");

                key.push_str(suffix);
                key
            }
        }
    }
}

impl<T> Clone for StringSelector<T> {
    fn clone(&self) -> Self {
        match self {
            StringSelector::Single(selector) => StringSelector::Single(Arc::clone(selector)),
            StringSelector::Composite { parts, suffix } => StringSelector::Composite {
                parts: parts.iter().map(Arc::clone).collect(),
                suffix: suffix.clone(),
            },
        }
    }
}

impl<T> fmt::Debug for StringSelector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringSelector::Single(_) => f.write_str("StringSelector::Single"),
            StringSelector::Composite { parts, suffix } => f
                .debug_struct("StringSelector::Composite")
                .field("parts", &parts.len())
                .field("suffix", suffix)
                .finish(),
        }
    }
}

/// Named read/write access to a value that is not part of the entity's serde shape.
pub struct Accessor<T> {
    name: String,
    getter: GetterFn<T>,
    setter: Option<SetterFn<T>>,
}

impl<T: 'static> Accessor<T> {
    /// Creates a read-only accessor.
    pub fn read_only<V, G>(name: impl Into<String>, getter: G) -> Self
    where
        V: Serialize + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            getter: typed_getter(getter),
            setter: None,
        }
    }

    /// Creates an accessor that can also write decoded values back.
    pub fn read_write<V, G, S>(name: impl Into<String>, getter: G, setter: S) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let name = name.into();
        let field = name.clone();

        Self {
            name,
            getter: typed_getter(getter),
            setter: Some(Arc::new(move |entity: &mut T, value: Value| {
                let value = serde_json::from_value::<V>(value).map_err(|err| {
                    DocumentStoreError::Serialization(format!("field {field}: {err}"))
                })?;

                setter(entity, value);

                Ok(())
            })),
        }
    }
}

impl<T> Accessor<T> {
    /// The configured (not yet policy-converted) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when decoded values can be written back to the entity.
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    /// Reads the value from the entity.
    pub fn get(&self, entity: &T) -> DocumentStoreResult<Value> {
        (self.getter)(entity)
    }

    /// Writes a decoded value to the entity. Read-only accessors ignore the value.
    pub fn set(&self, entity: &mut T, value: Value) -> DocumentStoreResult<()> {
        match &self.setter {
            Some(setter) => setter(entity, value),
            None => Ok(()),
        }
    }
}

fn typed_getter<T, V, G>(getter: G) -> GetterFn<T>
where
    T: 'static,
    V: Serialize + 'static,
    G: Fn(&T) -> V + Send + Sync + 'static,
{
    Arc::new(move |entity: &T| Ok(serde_json::to_value(getter(entity))?))
}

impl<T> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("name", &self.name)
            .field("writable", &self.is_writable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Item {
        owner: String,
        list: String,
        count: u32,
    }

    fn item() -> Item {
        Item {
            owner: "alice".into(),
            list: "groceries".into(),
            count: 3,
        }
    }

    #[test]
    fn composite_selector_joins_parts_and_suffix() {
        let mut selector = StringSelector::<Item>::composite("-items");

        assert!(selector.push_part(|item: &Item| item.owner.clone()));
        assert!(selector.push_part(|item: &Item| item.count.to_string()));
        assert!(selector.push_part(|item: &Item| item.list.clone()));
        assert_eq!(selector.part_count(), 3);
        assert_eq!(selector.select(&item()), "alice_3_groceries-items");
    }

    #[test]
    fn single_selector_takes_no_parts() {
        let mut selector = StringSelector::<Item>::single(|item| item.owner.clone());

        assert!(!selector.push_part(|item: &Item| item.list.clone()));
        assert_eq!(selector.part_count(), 1);
        assert_eq!(selector.select(&item()), "alice");
    }

    #[test]
    fn read_write_accessor_round_trips() {
        let accessor = Accessor::<Item>::read_write("count", |item| item.count, |item, count| item.count = count);
        let mut target = item();

        assert_eq!(accessor.get(&target).unwrap(), json!(3));

        accessor.set(&mut target, json!(7)).unwrap();

        assert_eq!(target.count, 7);
    }

    #[test]
    fn setter_rejects_mistyped_values() {
        let accessor = Accessor::<Item>::read_write("count", |item| item.count, |item, count| item.count = count);
        let mut target = item();

        let result = accessor.set(&mut target, json!("seven"));

        assert!(matches!(result, Err(DocumentStoreError::Serialization(_))));
        assert_eq!(target.count, 3);
    }

    #[test]
    fn read_only_accessor_ignores_writes() {
        let accessor = Accessor::<Item>::read_only("label", |item| format!("{}:{}", item.owner, item.list));
        let mut target = item();

        assert!(!accessor.is_writable());
        assert_eq!(accessor.get(&target).unwrap(), json!("alice:groceries"));
        assert!(accessor.set(&mut target, json!("x")).is_ok());
    }
}
