//! Query evaluation for in-memory document filtering.
//!
//! This module understands the subset of the store's SQL dialect the mapping layer
//! produces:
//!
//! ```sql
//! SELECT * FROM c [WHERE c.path <op> <operand> [AND c.path <op> <operand> ...]]
//! ```
//!
//! where `<op>` is one of `=`, `!=`, `<>`, `<`, `<=`, `>`, `>=` and `<operand>` is a named
//! parameter (`@name`), a quoted string, a number, `true`, `false` or `null`.

use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap};

use doctrack_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::SqlQuery,
};

/// Comparable representation of JSON values.
///
/// Numbers are normalized to `f64` so that `1` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// String value
    String(&'a str),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(value) => value
                .as_f64()
                .map(Comparable::Number)
                .unwrap_or(Comparable::Null),
            Value::String(value) => Comparable::String(value),
            Value::Array(array) => Comparable::Array(array.iter().map(Comparable::from).collect()),
            Value::Object(map) => Comparable::Map(
                map.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(Operator::Eq),
            "!=" | "<>" => Some(Operator::Ne),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            _ => None,
        }
    }

    fn holds(&self, left: &Comparable<'_>, right: &Comparable<'_>) -> bool {
        match self {
            Operator::Eq => left == right,
            Operator::Ne => left != right,
            Operator::Lt => left.partial_cmp(right) == Some(Ordering::Less),
            Operator::Lte => matches!(left.partial_cmp(right), Some(Ordering::Less | Ordering::Equal)),
            Operator::Gt => left.partial_cmp(right) == Some(Ordering::Greater),
            Operator::Gte => matches!(left.partial_cmp(right), Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    path: Vec<String>,
    operator: Operator,
    operand: Value,
}

/// A parsed query, ready to be matched against documents.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DocumentFilter {
    conditions: Vec<Condition>,
}

impl DocumentFilter {
    /// Parses a query and binds its parameters.
    pub fn parse(query: &SqlQuery) -> DocumentStoreResult<Self> {
        let tokens = tokenize(query.text())?;
        let mut tokens = tokens.iter().map(String::as_str);

        expect_keyword(&mut tokens, "SELECT")?;
        expect(&mut tokens, "*")?;
        expect_keyword(&mut tokens, "FROM")?;

        let alias = tokens
            .next()
            .ok_or_else(|| invalid("missing document alias after FROM"))?
            .to_string();
        let mut conditions = Vec::new();

        match tokens.next() {
            None => return Ok(Self { conditions }),
            Some(word) if word.eq_ignore_ascii_case("WHERE") => {}
            Some(other) => return Err(invalid(format!("unexpected '{other}' after FROM {alias}"))),
        }

        loop {
            let path = tokens.next().ok_or_else(|| invalid("missing condition after WHERE"))?;
            let path = parse_path(&alias, path)?;
            let operator = tokens
                .next()
                .and_then(Operator::parse)
                .ok_or_else(|| invalid("expected a comparison operator"))?;
            let operand = tokens.next().ok_or_else(|| invalid("missing operand"))?;
            let operand = parse_operand(query, operand)?;

            conditions.push(Condition {
                path,
                operator,
                operand,
            });

            match tokens.next() {
                None => break,
                Some(word) if word.eq_ignore_ascii_case("AND") => continue,
                Some(other) => return Err(invalid(format!("unsupported token '{other}'"))),
            }
        }

        Ok(Self { conditions })
    }

    /// Returns `true` when the document satisfies every condition.
    ///
    /// A condition on a missing path never holds.
    pub fn matches(&self, document: &Value) -> bool {
        self.conditions.iter().all(|condition| {
            lookup(document, &condition.path).is_some_and(|value| {
                condition
                    .operator
                    .holds(&Comparable::from(value), &Comparable::from(&condition.operand))
            })
        })
    }

    /// Filters documents, cloning the matches.
    pub fn filter_documents<'a>(&self, documents: impl IntoIterator<Item = &'a Value>) -> Vec<Value> {
        documents
            .into_iter()
            .filter(|document| self.matches(document))
            .cloned()
            .collect()
    }
}

fn lookup<'a>(document: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(document, |value, segment| value.as_object()?.get(segment))
}

fn invalid(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidQuery(message.into())
}

fn expect<'a>(tokens: &mut impl Iterator<Item = &'a str>, expected: &str) -> DocumentStoreResult<()> {
    match tokens.next() {
        Some(token) if token == expected => Ok(()),
        Some(token) => Err(invalid(format!("expected '{expected}', found '{token}'"))),
        None => Err(invalid(format!("expected '{expected}'"))),
    }
}

fn expect_keyword<'a>(tokens: &mut impl Iterator<Item = &'a str>, keyword: &str) -> DocumentStoreResult<()> {
    match tokens.next() {
        Some(token) if token.eq_ignore_ascii_case(keyword) => Ok(()),
        Some(token) => Err(invalid(format!("expected {keyword}, found '{token}'"))),
        None => Err(invalid(format!("expected {keyword}"))),
    }
}

fn parse_path(alias: &str, token: &str) -> DocumentStoreResult<Vec<String>> {
    let mut segments = token.split('.');

    if segments.next() != Some(alias) {
        return Err(invalid(format!("'{token}' does not start with '{alias}.'")));
    }

    let path = segments.map(str::to_string).collect::<Vec<_>>();

    if path.is_empty() || path.iter().any(String::is_empty) {
        return Err(invalid(format!("invalid property path '{token}'")));
    }

    Ok(path)
}

fn parse_operand(query: &SqlQuery, token: &str) -> DocumentStoreResult<Value> {
    if token.starts_with('@') {
        return query
            .parameter(token)
            .cloned()
            .ok_or_else(|| invalid(format!("parameter {token} is not bound")));
    }

    if let Some(quoted) = token
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .or_else(|| token.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')))
    {
        return Ok(Value::String(quoted.to_string()));
    }

    match token {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "null" => Ok(Value::Null),
        number => serde_json::from_str::<serde_json::Number>(number)
            .map(Value::Number)
            .map_err(|_| invalid(format!("unsupported operand '{number}'"))),
    }
}

/// Splits query text into words, operators and quoted strings (quotes kept).
fn tokenize(text: &str) -> DocumentStoreResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                let quote = c;
                let mut token = String::from(quote);

                chars.next();

                loop {
                    match chars.next() {
                        Some(next) if next == quote => break,
                        Some(next) => token.push(next),
                        None => return Err(invalid("unterminated string literal")),
                    }
                }

                token.push(quote);
                tokens.push(token);
            }
            '=' | '!' | '<' | '>' => {
                let mut token = String::from(c);

                chars.next();

                if let Some(&next) = chars.peek() {
                    if next == '=' || (c == '<' && next == '>') {
                        token.push(next);
                        chars.next();
                    }
                }

                tokens.push(token);
            }
            _ => {
                let mut token = String::new();

                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '=' | '!' | '<' | '>' | '\'' | '"') {
                        break;
                    }

                    token.push(next);
                    chars.next();
                }

                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "id": "t1",
            "title": "buy milk",
            "done": false,
            "priority": 2,
            "owner": { "id": "alice" },
            "_type": "TodoItem",
        })
    }

    #[test]
    fn select_all_matches_everything() {
        let filter = DocumentFilter::parse(&SqlQuery::all()).unwrap();

        assert!(filter.matches(&document()));
    }

    #[test]
    fn parameters_and_nested_paths() {
        let query = SqlQuery::all()
            .where_eq("owner.id", "alice")
            .and_where("_type", "@__type", "TodoItem");
        let filter = DocumentFilter::parse(&query).unwrap();

        assert!(filter.matches(&document()));

        let other = SqlQuery::all().where_eq("owner.id", "bob");

        assert!(!DocumentFilter::parse(&other).unwrap().matches(&document()));
    }

    #[test]
    fn literals_and_comparisons() {
        let matching = [
            "SELECT * FROM c WHERE c.title = 'buy milk'",
            "select * from c where c.done = false AND c.priority >= 2",
            "SELECT * FROM c WHERE c.priority < 2.5 AND c.priority <> 3",
            "SELECT * FROM c WHERE c.priority=2.0",
        ];

        for text in matching {
            let filter = DocumentFilter::parse(&SqlQuery::new(text)).unwrap();

            assert!(filter.matches(&document()), "{text}");
        }

        let filter = DocumentFilter::parse(&SqlQuery::new("SELECT * FROM c WHERE c.missing = null")).unwrap();

        assert!(!filter.matches(&document()));
    }

    #[test]
    fn unsupported_queries_are_rejected() {
        let rejected = [
            "DELETE FROM c",
            "SELECT c.id FROM c",
            "SELECT * FROM c WHERE d.id = 1",
            "SELECT * FROM c WHERE c.id = @unbound",
            "SELECT * FROM c WHERE c.id = 'open",
            "SELECT * FROM c WHERE c.id = 1 OR c.id = 2",
            "SELECT * FROM c ORDER BY c.id",
        ];

        for text in rejected {
            assert!(
                matches!(
                    DocumentFilter::parse(&SqlQuery::new(text)),
                    Err(DocumentStoreError::InvalidQuery(_))
                ),
                "{text}"
            );
        }
    }
}
