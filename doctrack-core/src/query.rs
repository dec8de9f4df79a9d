//! Parameterized SQL queries over a single partition.
//!
//! Queries are passed to the store client as text plus named parameters. The text is the
//! store's own SQL dialect; the mapping layer only ever appends equality conditions to it.
//! An appended condition applies to every row the existing predicate selects: predicates
//! containing `OR` are parenthesized first, and a trailing `ORDER BY` stays last.
//!
//! # Example
//!
//! ```ignore
//! use doctrack::query::SqlQuery;
//!
//! let query = SqlQuery::all()
//!     .where_eq("name", "Test")
//!     .where_eq("owner.id", "alice");
//!
//! assert_eq!(
//!     query.text(),
//!     "SELECT * FROM c WHERE c.name = @p0 AND c.owner.id = @p1"
//! );
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The alias every query uses for the queried document.
pub const DOCUMENT_ALIAS: &str = "c";

/// A named query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    /// Parameter name including the leading `@`.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

/// Query text with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    text: String,
    parameters: Vec<SqlParameter>,
}

impl SqlQuery {
    /// Creates a query from raw text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    /// `SELECT * FROM c`
    pub fn all() -> Self {
        Self::new(format!("SELECT * FROM {DOCUMENT_ALIAS}"))
    }

    /// Binds a parameter. A leading `@` is added when missing; binding the same name twice
    /// replaces the earlier value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = parameter_name(name.into());
        let value = value.into();

        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.parameters.push(SqlParameter { name, value }),
        }

        self
    }

    /// Appends `c.<path> = @pN` with a generated parameter name.
    pub fn where_eq(self, path: &str, value: impl Into<Value>) -> Self {
        let parameter = format!("@p{}", self.parameters.len());

        self.and_where(path, parameter, value)
    }

    /// Appends `c.<path> = <parameter>` and binds `parameter`.
    pub fn and_where(
        mut self,
        path: &str,
        parameter: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let parameter = parameter_name(parameter.into());
        let condition = format!("{DOCUMENT_ALIAS}.{path} = {parameter}");

        let words = words(&self.text);
        let order_by = words
            .windows(2)
            .find(|pair| pair[0].1.eq_ignore_ascii_case("ORDER") && pair[1].1.eq_ignore_ascii_case("BY"))
            .map_or(self.text.len(), |pair| pair[0].0);
        let where_end = words
            .iter()
            .find(|(offset, word)| *offset < order_by && word.eq_ignore_ascii_case("WHERE"))
            .map(|(offset, word)| offset + word.len());

        let (body, tail) = self.text.split_at(order_by);
        let mut text = match where_end {
            Some(end) => {
                let predicate = body[end..].trim();
                let predicate = if has_or(predicate) {
                    format!("({predicate})")
                } else {
                    predicate.to_string()
                };

                format!("{} {predicate} AND {condition}", body[..end].trim_end())
            }
            None => format!("{} WHERE {condition}", body.trim_end()),
        };

        let tail = tail.trim();

        if !tail.is_empty() {
            text.push(' ');
            text.push_str(tail);
        }

        self.text = text;
        self.with_parameter(parameter, value)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[SqlParameter] {
        &self.parameters
    }

    /// Value bound to `name` (with or without the leading `@`).
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        let name = parameter_name(name.to_string());

        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

impl Default for SqlQuery {
    fn default() -> Self {
        Self::all()
    }
}

fn parameter_name(name: String) -> String {
    if name.starts_with('@') {
        name
    } else {
        format!("@{name}")
    }
}

/// Whitespace-separated words of `text` with their byte offsets.
fn words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;

    for (index, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (false, None) => start = Some(index),
            (true, Some(begin)) => {
                words.push((begin, &text[begin..index]));
                start = None;
            }
            _ => {}
        }
    }

    if let Some(begin) = start {
        words.push((begin, &text[begin..]));
    }

    words
}

fn has_or(predicate: &str) -> bool {
    words(predicate)
        .iter()
        .any(|(_, word)| word.trim_matches(|c| c == '(' || c == ')').eq_ignore_ascii_case("OR"))
}
