//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific table and runs the
//! SQLite or Postgres flavour of each query depending on the pool.

pub mod communication;
pub mod import_draft;
pub mod lead;
pub mod listing;
pub mod note;
pub mod session;

pub use communication::{CommunicationRepository, SqlxCommunicationRepository};
pub use import_draft::{ImportDraftRepository, SqlxImportDraftRepository};
pub use lead::{LeadRepository, SqlxLeadRepository};
pub use listing::{ListingRepository, SqlxListingRepository};
pub use note::{NoteRepository, SqlxNoteRepository};
pub use session::{SessionRepository, SqlxSessionRepository};

use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

/// A value bound into a dynamically built query
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlValue {
    Int(i64),
    Text(String),
    Bool(bool),
}

/// WHERE clause builder using `$N` placeholders, which both SQLite and
/// Postgres accept.
#[derive(Debug, Default)]
pub(crate) struct Conditions {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition without parameters
    pub fn push(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    /// Add a condition; `{}` in the template is replaced by the placeholder
    pub fn push_value(&mut self, template: &str, value: SqlValue) {
        let placeholder = self.bind(value);
        self.clauses.push(template.replace("{}", &placeholder));
    }

    /// Add `(a OR b OR ...)` where every template binds its own copy of `value`
    pub fn push_any(&mut self, templates: &[&str], value: SqlValue) {
        let parts: Vec<String> = templates
            .iter()
            .map(|template| {
                let placeholder = self.bind(value.clone());
                template.replace("{}", &placeholder)
            })
            .collect();
        self.clauses.push(format!("({})", parts.join(" OR ")));
    }

    /// Register a value and return its placeholder
    pub fn bind(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    /// ` WHERE ...` or an empty string
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

pub(crate) fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

pub(crate) fn bind_postgres<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

/// Decode a JSON string array column, treating bad data as empty
pub(crate) fn decode_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub(crate) fn encode_string_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions_number_placeholders_in_order() {
        let mut conditions = Conditions::new();
        conditions.push("status IN ('active', 'pending')");
        conditions.push_value("price >= {}", SqlValue::Int(100));
        conditions.push_any(&["name LIKE {}", "email LIKE {}"], SqlValue::Text("%a%".into()));
        let limit = conditions.bind(SqlValue::Int(10));

        assert_eq!(
            conditions.where_sql(),
            " WHERE status IN ('active', 'pending') AND price >= $1 AND (name LIKE $2 OR email LIKE $3)"
        );
        assert_eq!(limit, "$4");
        assert_eq!(conditions.values().len(), 4);
    }

    #[test]
    fn test_empty_conditions() {
        assert_eq!(Conditions::new().where_sql(), "");
    }

    #[test]
    fn test_string_list_codec() {
        let items = vec!["pool".to_string(), "garage".to_string()];
        assert_eq!(decode_string_list(&encode_string_list(&items)), items);
        assert!(decode_string_list("not json").is_empty());
    }
}
