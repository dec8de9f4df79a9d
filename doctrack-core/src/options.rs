//! Database-wide options.
//!
//! Options are plain data that can be deserialized from any serde source and refined with the
//! `with_*` builder methods.
//!
//! # Example
//!
//! ```ignore
//! use doctrack::options::{DatabaseOptions, NamingPolicy};
//!
//! let options = DatabaseOptions::new("todo")
//!     .with_naming_policy(NamingPolicy::AsIs)
//!     .with_type_discriminator(false);
//! ```

use serde::{Deserialize, Serialize};

/// How configured names (partition key, accessor names) are written on the wire.
///
/// Entity fields themselves are named by their serde attributes; the policy only applies to
/// the names the model builder introduces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NamingPolicy {
    /// `owner_id` and `OwnerId` become `ownerId`. Leading underscores are kept.
    #[default]
    CamelCase,
    /// Names are written exactly as configured.
    AsIs,
}

impl NamingPolicy {
    /// Converts a configured name into its wire name.
    pub fn convert_name(&self, name: &str) -> String {
        match self {
            NamingPolicy::AsIs => name.to_string(),
            NamingPolicy::CamelCase => to_camel_case(name),
        }
    }
}

fn to_camel_case(name: &str) -> String {
    let body = name.trim_start_matches('_');
    let mut converted = String::with_capacity(name.len());

    converted.push_str(&name[..name.len() - body.len()]);

    for (index, segment) in body.split('_').filter(|s| !s.is_empty()).enumerate() {
        let mut chars = segment.chars();

        if let Some(first) = chars.next() {
            if index == 0 {
                converted.extend(first.to_lowercase());
            } else {
                converted.extend(first.to_uppercase());
            }

            converted.push_str(chars.as_str());
        }
    }

    converted
}

/// Options shared by every session of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseOptions {
    /// Logical name of the database, used in diagnostics.
    pub database_id: String,
    /// Naming policy for configured names.
    pub naming_policy: NamingPolicy,
    /// Whether encoded documents carry the `_type` discriminator and typed queries filter on it.
    pub emit_type_discriminator: bool,
}

impl DatabaseOptions {
    /// Creates options for the named database with default settings.
    pub fn new(database_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            ..Self::default()
        }
    }

    /// Sets the naming policy.
    pub fn with_naming_policy(mut self, naming_policy: NamingPolicy) -> Self {
        self.naming_policy = naming_policy;
        self
    }

    /// Enables or disables the type discriminator.
    pub fn with_type_discriminator(mut self, enabled: bool) -> Self {
        self.emit_type_discriminator = enabled;
        self
    }
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            database_id: String::new(),
            naming_policy: NamingPolicy::CamelCase,
            emit_type_discriminator: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_conversion() {
        let policy = NamingPolicy::CamelCase;

        assert_eq!(policy.convert_name("owner_id"), "ownerId");
        assert_eq!(policy.convert_name("OwnerId"), "ownerId");
        assert_eq!(policy.convert_name("id"), "id");
        assert_eq!(policy.convert_name("_firstName"), "_firstName");
        assert_eq!(policy.convert_name("_first_name"), "_firstName");
        assert_eq!(policy.convert_name("list__name"), "listName");
    }

    #[test]
    fn as_is_keeps_names() {
        assert_eq!(NamingPolicy::AsIs.convert_name("Owner_Id"), "Owner_Id");
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: DatabaseOptions =
            serde_json::from_str(r#"{ "databaseId": "todo", "namingPolicy": "asIs" }"#).unwrap();

        assert_eq!(options.database_id, "todo");
        assert_eq!(options.naming_policy, NamingPolicy::AsIs);
        assert!(options.emit_type_discriminator);
    }
}
