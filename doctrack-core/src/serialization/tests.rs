use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::*;
use crate::{
    configuration::EntityConfigurationRegistry,
    model::ModelBuilder,
    options::DatabaseOptions,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountPlan {
    id: String,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodoItem {
    id: String,
    owner_id: String,
    list_name: String,
    title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    #[serde(skip)]
    first_name: String,
    #[serde(skip)]
    last_name: String,
    #[serde(skip)]
    revision: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tag(String);

fn registry() -> EntityConfigurationRegistry {
    registry_with(DatabaseOptions::new("test"))
}

fn registry_with(options: DatabaseOptions) -> EntityConfigurationRegistry {
    ModelBuilder::new(options)
        .define_entity::<AccountPlan>(|plan| {
            plan.container("plans")
                .id(|p| p.id.clone())
                .partition_key("id", |p| p.id.clone())
        })
        .define_entity::<TodoItem>(|item| {
            item.container("todos")
                .id(|t| t.id.clone())
                .composite_partition_key("owner_list", "")
                .partition_key_part(|t| t.owner_id.clone())
                .partition_key_part(|t| t.list_name.clone())
                .shadow_property("created_by", "system")
                .property("titleLength", |t| t.title.len())
        })
        .define_entity::<Person>(|person| {
            person
                .container("people")
                .id(|p| format!("{}.{}", p.first_name, p.last_name))
                .shadow_partition_key("pk", |p| p.last_name.clone())
                .field("_firstName", |p| p.first_name.clone(), |p, v| p.first_name = v)
                .field("_lastName", |p| p.last_name.clone(), |p, v| p.last_name = v)
                .property_with_setter("revision", |p| p.revision, |p, v| p.revision = v)
        })
        .define_entity::<Tag>(|tag| {
            tag.container("tags")
                .id(|t| t.0.clone())
                .partition_key("tag", |t| t.0.clone())
        })
        .build()
        .unwrap()
}

fn object(value: &Value) -> &DocumentMap {
    value.as_object().unwrap()
}

#[test]
fn standard_rule_order() {
    let registry = registry();
    let configuration = registry.get::<AccountPlan>().unwrap();

    assert_eq!(
        configuration.pipeline().rule_names(),
        vec![
            "identity",
            "backing-field",
            "declared-property",
            "partition-key",
            "shadow-property",
            "system-property",
            "type-discriminator",
        ]
    );
}

#[test]
fn encodes_entity_fields_and_discriminator() {
    let registry = registry();
    let configuration = registry.get::<AccountPlan>().unwrap();
    let shadows = ShadowStore::new();
    let plan = AccountPlan {
        id: "p1".into(),
        name: "Test".into(),
    };

    let document = configuration
        .encode(&plan, &EncodeContext { key: EntityKey::next(), shadows: &shadows })
        .unwrap();

    assert_eq!(document, json!({ "id": "p1", "name": "Test", "_type": "AccountPlan" }));
}

#[test]
fn discriminator_can_be_disabled() {
    let registry = registry_with(DatabaseOptions::new("test").with_type_discriminator(false));
    let configuration = registry.get::<AccountPlan>().unwrap();
    let shadows = ShadowStore::new();
    let plan = AccountPlan {
        id: "p1".into(),
        name: "Test".into(),
    };

    let document = configuration
        .encode(&plan, &EncodeContext { key: EntityKey::next(), shadows: &shadows })
        .unwrap();

    assert!(!object(&document).contains_key("_type"));
}

#[test]
fn shadow_partition_key_is_written_but_never_decoded() {
    let registry = registry();
    let configuration = registry.get::<TodoItem>().unwrap();
    let shadows = ShadowStore::new();
    let item = TodoItem {
        id: "t1".into(),
        owner_id: "alice".into(),
        list_name: "groceries".into(),
        title: "milk".into(),
    };

    let document = configuration
        .encode(&item, &EncodeContext { key: EntityKey::next(), shadows: &shadows })
        .unwrap();

    assert_eq!(object(&document)["ownerList"], json!("alice_groceries"));
    assert_eq!(object(&document)["titleLength"], json!(4));

    let decoded = configuration.decode(document).unwrap();

    assert_eq!(decoded.entity, item);
    assert!(!decoded.shadow_values.contains_key("ownerList"));
    assert!(!decoded.shadow_values.contains_key("titleLength"));
}

#[test]
fn shadow_properties_come_from_the_store_and_go_back_to_it() {
    let registry = registry();
    let configuration = registry.get::<TodoItem>().unwrap();
    let shadows = ShadowStore::new();
    let key = EntityKey::next();
    let item = TodoItem {
        id: "t1".into(),
        owner_id: "alice".into(),
        list_name: "groceries".into(),
        title: "milk".into(),
    };

    let with_default = configuration
        .encode(&item, &EncodeContext { key, shadows: &shadows })
        .unwrap();

    assert_eq!(object(&with_default)["createdBy"], json!("system"));

    shadows.set(key, "createdBy", json!("bob"));

    let with_stored = configuration
        .encode(&item, &EncodeContext { key, shadows: &shadows })
        .unwrap();

    assert_eq!(object(&with_stored)["createdBy"], json!("bob"));

    let decoded = configuration.decode(with_stored).unwrap();

    assert_eq!(decoded.shadow_values.get("createdBy"), Some(&json!("bob")));
    assert_eq!(decoded.entity, item);
}

#[test]
fn backing_fields_round_trip() {
    let registry = registry();
    let configuration = registry.get::<Person>().unwrap();
    let shadows = ShadowStore::new();
    let person = Person {
        first_name: "Michael".into(),
        last_name: "Scott".into(),
        revision: 3,
    };

    let document = configuration
        .encode(&person, &EncodeContext { key: EntityKey::next(), shadows: &shadows })
        .unwrap();

    assert_eq!(
        document,
        json!({
            "id": "Michael.Scott",
            "_firstName": "Michael",
            "_lastName": "Scott",
            "revision": 3,
            "pk": "Scott",
            "_type": "Person",
        })
    );

    let decoded = configuration.decode(document).unwrap();

    assert_eq!(decoded.entity, person);
}

#[test]
fn system_properties_are_captured_as_shadow_values() {
    let registry = registry();
    let configuration = registry.get::<AccountPlan>().unwrap();

    let decoded = configuration
        .decode(json!({
            "id": "p1",
            "name": "Test",
            "_type": "AccountPlan",
            "_etag": "\"0001\"",
            "_ts": 1700000000,
            "_rid": "abc",
            "_self": "dbs/abc",
        }))
        .unwrap();

    assert_eq!(
        decoded.entity,
        AccountPlan {
            id: "p1".into(),
            name: "Test".into(),
        }
    );
    assert_eq!(decoded.shadow_values.get("_etag"), Some(&json!("\"0001\"")));
    assert_eq!(decoded.shadow_values.get("_ts"), Some(&json!(1700000000)));
    assert!(!decoded.shadow_values.contains_key("_rid"));
}

#[test]
fn etag_is_written_only_when_known() {
    let registry = registry();
    let configuration = registry.get::<AccountPlan>().unwrap();
    let shadows = ShadowStore::new();
    let key = EntityKey::next();
    let plan = AccountPlan {
        id: "p1".into(),
        name: "Test".into(),
    };

    let without = configuration
        .encode(&plan, &EncodeContext { key, shadows: &shadows })
        .unwrap();

    shadows.set(key, "_etag", json!("v1"));

    let with = configuration
        .encode(&plan, &EncodeContext { key, shadows: &shadows })
        .unwrap();

    assert!(!object(&without).contains_key("_etag"));
    assert_eq!(object(&with)["_etag"], json!("v1"));
}

#[test]
fn non_object_entities_are_rejected() {
    let registry = registry();
    let configuration = registry.get::<Tag>().unwrap();
    let shadows = ShadowStore::new();

    let result = configuration.encode(
        &Tag("rust".into()),
        &EncodeContext { key: EntityKey::next(), shadows: &shadows },
    );

    assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(m)) if m.contains("a string")));
}

#[test]
fn generated_fields_never_overwrite() {
    let mut document = DocumentMap::new();
    document.insert("pk".into(), json!("entity"));

    let result = insert_generated(&mut document, "Thing", "pk", json!("generated"));

    assert!(matches!(result, Err(DocumentStoreError::Serialization(_))));
    assert_eq!(document["pk"], json!("entity"));
}

struct AuditRule;

impl DocumentRule<AccountPlan> for AuditRule {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn encode(
        &self,
        _configuration: &EntityConfiguration<AccountPlan>,
        _entity: &AccountPlan,
        _context: &EncodeContext<'_>,
        document: &mut DocumentMap,
    ) -> DocumentStoreResult<()> {
        insert_generated(document, "AccountPlan", "schemaVersion", json!(2))
    }

    fn extract(
        &self,
        _configuration: &EntityConfiguration<AccountPlan>,
        document: &mut DocumentMap,
        context: &mut DecodeContext,
    ) -> DocumentStoreResult<()> {
        if let Some(version) = document.remove("schemaVersion") {
            context.shadow_values.insert("schemaVersion".into(), version);
        }

        Ok(())
    }
}

#[test]
fn custom_rules_run_after_the_standard_chain() {
    let registry = ModelBuilder::new(DatabaseOptions::new("test"))
        .define_entity::<AccountPlan>(|plan| {
            plan.container("plans")
                .id(|p| p.id.clone())
                .partition_key("id", |p| p.id.clone())
                .rule(AuditRule)
        })
        .build()
        .unwrap();
    let configuration = registry.get::<AccountPlan>().unwrap();
    let shadows = ShadowStore::new();
    let plan = AccountPlan {
        id: "p1".into(),
        name: "Test".into(),
    };

    let document = configuration
        .encode(&plan, &EncodeContext { key: EntityKey::next(), shadows: &shadows })
        .unwrap();

    assert_eq!(configuration.pipeline().rule_names().last(), Some(&"audit"));
    assert_eq!(object(&document)["schemaVersion"], json!(2));

    let decoded = configuration.decode(document).unwrap();

    assert_eq!(decoded.shadow_values.get("schemaVersion"), Some(&json!(2)));
}

proptest! {
    #[test]
    fn round_trip_preserves_tracked_values(
        owner in "[a-z]{1,12}",
        list in "[a-z]{1,12}",
        title in ".{0,40}",
        created_by in "[a-z]{0,8}",
    ) {
        let registry = registry();
        let configuration = registry.get::<TodoItem>().unwrap();
        let shadows = ShadowStore::new();
        let key = EntityKey::next();
        let item = TodoItem {
            id: format!("{owner}-{list}"),
            owner_id: owner,
            list_name: list,
            title,
        };

        shadows.set(key, "createdBy", json!(created_by));

        let document = configuration.encode(&item, &EncodeContext { key, shadows: &shadows }).unwrap();
        let decoded = configuration.decode(document).unwrap();

        prop_assert_eq!(decoded.entity, item);
        prop_assert_eq!(decoded.shadow_values.get("createdBy"), Some(&json!(created_by)));
        prop_assert_eq!(decoded.shadow_values.len(), 1);
    }
}
