//! Operation descriptors: one CRUD operation described as data.
//!
//! A [`Descriptor`] names the operation kind, the table, the projection for
//! reads, the values a write stores and the equality conditions to match.
//! [`Descriptor::build`] turns it into a parameterized [`Statement`] using the
//! fixed templates below; no database is touched.
//!
//! # Argument order
//!
//! For updates the `SET` arguments come first and the `WHERE` arguments
//! follow, matching the placeholder order in the SQL text. PostgreSQL
//! placeholders are numbered continuously across both clauses.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Fields, KeyValue, Statement};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conditions are always combined with AND.
const CONDITION_SEPARATOR: &str = " AND ";

/// CRUD operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Read,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Read => "read",
            Self::Delete => "delete",
        }
    }

    /// Whether the operation modifies rows.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric op codes: 0 create, 1 update, 2 read, 3 delete.
impl TryFrom<u8> for Operation {
    type Error = DbError;

    fn try_from(code: u8) -> DbResult<Self> {
        match code {
            0 => Ok(Self::Create),
            1 => Ok(Self::Update),
            2 => Ok(Self::Read),
            3 => Ok(Self::Delete),
            other => Err(DbError::invalid_operation(format!("op code {}", other))),
        }
    }
}

impl FromStr for Operation {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "create" | "insert" => Ok(Self::Create),
            "u" | "update" => Ok(Self::Update),
            "r" | "read" | "select" => Ok(Self::Read),
            "d" | "delete" => Ok(Self::Delete),
            _ => Err(DbError::invalid_operation(s)),
        }
    }
}

/// Projection options for reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Columns to select; empty selects `*`.
    #[serde(default)]
    pub fields: Fields,
    /// Return a row cursor instead of a single row.
    #[serde(default)]
    pub batch: bool,
}

/// Description of one CRUD operation prior to SQL generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    /// `None` is reported as [`DbError::InvalidOperation`] at dispatch.
    #[serde(default)]
    pub kind: Option<Operation>,
    pub table: String,
    #[serde(default)]
    pub query: Query,
    #[serde(default)]
    pub values: KeyValue,
    #[serde(default)]
    pub conditions: KeyValue,
}

impl Descriptor {
    /// A descriptor for `table` with no operation kind set yet.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn create(table: impl Into<String>, values: KeyValue) -> Self {
        Self::new(table).kind(Operation::Create).values(values)
    }

    pub fn update(table: impl Into<String>, values: KeyValue, conditions: KeyValue) -> Self {
        Self::new(table)
            .kind(Operation::Update)
            .values(values)
            .conditions(conditions)
    }

    pub fn read(table: impl Into<String>, conditions: KeyValue) -> Self {
        Self::new(table).kind(Operation::Read).conditions(conditions)
    }

    pub fn delete(table: impl Into<String>, conditions: KeyValue) -> Self {
        Self::new(table)
            .kind(Operation::Delete)
            .conditions(conditions)
    }

    pub fn kind(mut self, kind: Operation) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn values(mut self, values: KeyValue) -> Self {
        self.values = values;
        self
    }

    pub fn conditions(mut self, conditions: KeyValue) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.fields = Fields::new(fields);
        self
    }

    pub fn batch(mut self, batch: bool) -> Self {
        self.query.batch = batch;
        self
    }

    /// Build the statement for this descriptor in the given SQL flavor.
    pub fn build(&self, db_type: DatabaseType) -> DbResult<Statement> {
        let kind = self
            .kind
            .ok_or_else(|| DbError::invalid_operation("no operation kind set"))?;
        self.validate_names()?;

        match kind {
            Operation::Create => {
                if self.values.is_empty() {
                    return Err(DbError::empty_value_map(&self.table));
                }
                let (split, args) = self.values.split_for(db_type, 1);
                let sql = format!(
                    "INSERT INTO {}({}) VALUES({})",
                    self.table, split.fields, split.placeholders
                );
                Ok(Statement::new(sql, args))
            }
            Operation::Update => {
                if self.values.is_empty() {
                    return Err(DbError::empty_value_map(&self.table));
                }
                if self.conditions.is_empty() {
                    return Err(DbError::empty_condition_map(&self.table));
                }
                let (assignments, mut args) = self.values.split_assignments_for(db_type, 1, ",");
                let (conditions, condition_args) = self.conditions.split_assignments_for(
                    db_type,
                    args.len() + 1,
                    CONDITION_SEPARATOR,
                );
                args.extend(condition_args);
                let sql = format!(
                    "UPDATE {} SET {} WHERE {}",
                    self.table, assignments, conditions
                );
                Ok(Statement::new(sql, args))
            }
            Operation::Read => {
                let projection = if self.query.fields.is_empty() {
                    "*".to_string()
                } else {
                    self.query.fields.join(db_type)
                };
                if self.conditions.is_empty() {
                    let sql = format!("SELECT {} FROM {}", projection, self.table);
                    return Ok(Statement::raw(sql));
                }
                let (conditions, args) =
                    self.conditions
                        .split_assignments_for(db_type, 1, CONDITION_SEPARATOR);
                let sql = format!(
                    "SELECT {} FROM {} WHERE {}",
                    projection, self.table, conditions
                );
                Ok(Statement::new(sql, args))
            }
            Operation::Delete => {
                if self.conditions.is_empty() {
                    return Err(DbError::empty_condition_map(&self.table));
                }
                let (conditions, args) =
                    self.conditions
                        .split_assignments_for(db_type, 1, CONDITION_SEPARATOR);
                let sql = format!("DELETE FROM {} WHERE {}", self.table, conditions);
                Ok(Statement::new(sql, args))
            }
        }
    }

    /// Tables are emitted unquoted, so only plain (optionally schema-qualified)
    /// names are accepted. Column names are quoted but must be non-empty.
    fn validate_names(&self) -> DbResult<()> {
        if self.table.is_empty() {
            return Err(DbError::invalid_input("Table name cannot be empty"));
        }
        let valid_table = self
            .table
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'));
        if !valid_table {
            return Err(DbError::invalid_input(format!(
                "Table name contains invalid characters: {}",
                self.table
            )));
        }

        let empty_column = self
            .values
            .columns()
            .chain(self.conditions.columns())
            .chain(self.query.fields.iter().map(String::as_str))
            .any(str::is_empty);
        if empty_column {
            return Err(DbError::invalid_input("Column name cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    #[test]
    fn test_create_profile_example() {
        let descriptor = Descriptor::create(
            "profile",
            KeyValue::from([("first_name", "foo"), ("last_name", "bar")]),
        );
        let stmt = descriptor.build(DatabaseType::MySQL).unwrap();
        assert_eq!(
            stmt.sql(),
            "INSERT INTO profile(`first_name`,`last_name`) VALUES(?,?)"
        );
        assert_eq!(stmt.args(), &[Value::from("foo"), Value::from("bar")]);
    }

    #[test]
    fn test_update_puts_value_args_before_condition_args() {
        let descriptor = Descriptor::update(
            "profile",
            KeyValue::from([("first_name", "Tomi"), ("last_name", "Dog")]),
            KeyValue::from([("id", 1)]),
        );
        let stmt = descriptor.build(DatabaseType::MySQL).unwrap();
        assert_eq!(
            stmt.sql(),
            "UPDATE profile SET `first_name`=?,`last_name`=? WHERE `id`=?"
        );
        assert_eq!(
            stmt.args(),
            &[Value::from("Tomi"), Value::from("Dog"), Value::Int(1)]
        );
    }

    #[test]
    fn test_update_postgres_numbers_across_clauses() {
        let descriptor = Descriptor::update(
            "profile",
            KeyValue::from([("last_name", "Dog")]),
            KeyValue::from([("id", 1), ("shard", 2)]),
        );
        let stmt = descriptor.build(DatabaseType::PostgreSQL).unwrap();
        assert_eq!(
            stmt.sql(),
            "UPDATE profile SET \"last_name\"=$1 WHERE \"id\"=$2 AND \"shard\"=$3"
        );
        assert_eq!(stmt.args(), &[Value::from("Dog"), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_read_defaults_to_star() {
        let descriptor = Descriptor::read("profile", KeyValue::from([("id", 1)]));
        let stmt = descriptor.build(DatabaseType::MySQL).unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM profile WHERE `id`=?");
        assert_eq!(stmt.args(), &[Value::Int(1)]);
    }

    #[test]
    fn test_read_quotes_projection() {
        let descriptor = Descriptor::read(
            "profile",
            KeyValue::new().with("first_name", "Tony").with("id", 3),
        )
        .fields(["id", "first_name"])
        .batch(true);
        let stmt = descriptor.build(DatabaseType::SQLite).unwrap();
        assert_eq!(
            stmt.sql(),
            "SELECT `id`,`first_name` FROM profile WHERE `first_name`=? AND `id`=?"
        );
        assert!(descriptor.query.batch);
    }

    #[test]
    fn test_read_without_conditions_has_no_where() {
        let stmt = Descriptor::read("profile", KeyValue::new())
            .build(DatabaseType::MySQL)
            .unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM profile");
        assert!(stmt.args().is_empty());
    }

    #[test]
    fn test_delete() {
        let stmt = Descriptor::delete("profile", KeyValue::from([("id", 101)]))
            .build(DatabaseType::MySQL)
            .unwrap();
        assert_eq!(stmt.sql(), "DELETE FROM profile WHERE `id`=?");
        assert_eq!(stmt.args(), &[Value::Int(101)]);
    }

    #[test]
    fn test_missing_kind_is_invalid_operation() {
        let err = Descriptor::new("profile")
            .values(KeyValue::from([("id", 1)]))
            .build(DatabaseType::MySQL)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidOperation { .. }));
    }

    #[test]
    fn test_empty_maps_rejected_for_writes() {
        let err = Descriptor::create("profile", KeyValue::new())
            .build(DatabaseType::MySQL)
            .unwrap_err();
        assert!(matches!(err, DbError::EmptyValueMap { .. }));

        let err = Descriptor::update("profile", KeyValue::from([("a", 1)]), KeyValue::new())
            .build(DatabaseType::MySQL)
            .unwrap_err();
        assert!(matches!(err, DbError::EmptyConditionMap { .. }));

        let err = Descriptor::update("profile", KeyValue::new(), KeyValue::from([("id", 1)]))
            .build(DatabaseType::MySQL)
            .unwrap_err();
        assert!(matches!(err, DbError::EmptyValueMap { .. }));

        let err = Descriptor::delete("profile", KeyValue::new())
            .build(DatabaseType::MySQL)
            .unwrap_err();
        assert!(matches!(err, DbError::EmptyConditionMap { .. }));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let err = Descriptor::create("", KeyValue::from([("a", 1)]))
            .build(DatabaseType::MySQL)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));

        let err = Descriptor::create("profile; DROP TABLE x", KeyValue::from([("a", 1)]))
            .build(DatabaseType::MySQL)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));

        let err = Descriptor::create("profile", KeyValue::from([("", 1)]))
            .build(DatabaseType::MySQL)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));

        assert!(
            Descriptor::delete("game.profile", KeyValue::from([("id", 1)]))
                .build(DatabaseType::MySQL)
                .is_ok()
        );
    }

    #[test]
    fn test_operation_codes() {
        assert_eq!(Operation::try_from(0).unwrap(), Operation::Create);
        assert_eq!(Operation::try_from(3).unwrap(), Operation::Delete);
        assert!(matches!(
            Operation::try_from(4),
            Err(DbError::InvalidOperation { .. })
        ));
        assert_eq!("SELECT".parse::<Operation>().unwrap(), Operation::Read);
        assert!("upsert".parse::<Operation>().is_err());
        assert!(Operation::Delete.is_write());
        assert!(!Operation::Read.is_write());
    }
}
