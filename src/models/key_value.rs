//! Column/value maps and their conversion into SQL fragments.
//!
//! A [`KeyValue`] is used both for the values a write stores and for the
//! equality conditions a statement matches on. Splitting it yields the SQL
//! fragment and the positional arguments in one pass, so the field list,
//! placeholder list and argument vector of a single split always line up.
//! Never combine fragments and arguments from two different splits.

use crate::models::{DatabaseType, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Fragments produced by [`KeyValue::split`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSplit {
    /// `` `a`,`b` ``
    pub fields: String,
    /// `?,?`
    pub placeholders: String,
}

/// Mapping from column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValue(BTreeMap<String, Value>);

impl KeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Insert a column, returning the previous value if the column was present.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(column.into(), value.into())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Split into a quoted field list, a `?` placeholder list and the arguments.
    pub fn split(&self) -> (String, String, Vec<Value>) {
        let (split, args) = self.split_for(DatabaseType::MySQL, 1);
        (split.fields, split.placeholders, args)
    }

    /// Split into `` `a`=?,`b`=? `` assignments and the arguments.
    pub fn split_assignments(&self) -> (String, Vec<Value>) {
        self.split_assignments_for(DatabaseType::MySQL, 1, ",")
    }

    /// Dialect-aware [`split`](Self::split). Placeholders are numbered from
    /// `first_index` where the dialect numbers them.
    pub fn split_for(&self, db_type: DatabaseType, first_index: usize) -> (ColumnSplit, Vec<Value>) {
        let mut split = ColumnSplit::default();
        let mut args = Vec::with_capacity(self.0.len());

        for (i, (column, value)) in self.0.iter().enumerate() {
            if i > 0 {
                split.fields.push(',');
                split.placeholders.push(',');
            }
            split.fields.push_str(&db_type.quote_ident(column));
            db_type.push_placeholder(&mut split.placeholders, first_index + i);
            args.push(value.clone());
        }

        (split, args)
    }

    /// Dialect-aware [`split_assignments`](Self::split_assignments), joining
    /// the `column=placeholder` pairs with `separator`.
    pub fn split_assignments_for(
        &self,
        db_type: DatabaseType,
        first_index: usize,
        separator: &str,
    ) -> (String, Vec<Value>) {
        let mut assignments = String::new();
        let mut args = Vec::with_capacity(self.0.len());

        for (i, (column, value)) in self.0.iter().enumerate() {
            if i > 0 {
                assignments.push_str(separator);
            }
            assignments.push_str(&db_type.quote_ident(column));
            assignments.push('=');
            db_type.push_placeholder(&mut assignments, first_index + i);
            args.push(value.clone());
        }

        (assignments, args)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for KeyValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for KeyValue {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a KeyValue {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Column list for a projection, always emitted quoted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(Vec<String>);

impl Fields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// `` `a`,`b` ``, or an empty string for no fields.
    pub fn join(&self, db_type: DatabaseType) -> String {
        self.0
            .iter()
            .map(|f| db_type.quote_ident(f))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::distributions::Alphanumeric;

    #[test]
    fn test_split_profile_example() {
        let kv = KeyValue::from([("first_name", "foo"), ("last_name", "bar")]);
        let (fields, placeholders, args) = kv.split();
        assert_eq!(fields, "`first_name`,`last_name`");
        assert_eq!(placeholders, "?,?");
        assert_eq!(args, vec![Value::from("foo"), Value::from("bar")]);
    }

    #[test]
    fn test_split_assignments() {
        let kv = KeyValue::new()
            .with("Field1", 1)
            .with("Field2", "2")
            .with("Field3", 0.1);
        let (assignments, args) = kv.split_assignments();
        assert_eq!(assignments, "`Field1`=?,`Field2`=?,`Field3`=?");
        assert_eq!(
            args,
            vec![Value::Int(1), Value::from("2"), Value::Float(0.1)]
        );
    }

    #[test]
    fn test_split_empty_map() {
        let kv = KeyValue::new();
        let (fields, placeholders, args) = kv.split();
        assert!(fields.is_empty());
        assert!(placeholders.is_empty());
        assert!(args.is_empty());

        let (assignments, args) = kv.split_assignments();
        assert!(assignments.is_empty());
        assert!(args.is_empty());
    }

    #[test]
    fn test_split_single_entry_has_no_separator() {
        let kv = KeyValue::from([("id", 1)]);
        let (fields, placeholders, _) = kv.split();
        assert_eq!(fields, "`id`");
        assert_eq!(placeholders, "?");
        assert_eq!(kv.split_assignments().0, "`id`=?");
    }

    #[test]
    fn test_split_quotes_hostile_identifiers() {
        let kv = KeyValue::from([("na`me", 1)]);
        let (fields, _, _) = kv.split();
        assert_eq!(fields, "`na``me`");
    }

    #[test]
    fn test_split_postgres_numbers_from_offset() {
        let kv = KeyValue::from([("a", 1), ("b", 2)]);
        let (split, _) = kv.split_for(DatabaseType::PostgreSQL, 1);
        assert_eq!(split.fields, "\"a\",\"b\"");
        assert_eq!(split.placeholders, "$1,$2");

        let (assignments, _) = kv.split_assignments_for(DatabaseType::PostgreSQL, 3, " AND ");
        assert_eq!(assignments, "\"a\"=$3 AND \"b\"=$4");
    }

    #[test]
    fn test_split_positional_correspondence() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let n = rng.gen_range(1..12);
            let kv: KeyValue = (0..n)
                .map(|_| {
                    let column: String = (&mut rng)
                        .sample_iter(&Alphanumeric)
                        .take(8)
                        .map(char::from)
                        .collect();
                    let value = rng.gen_range(-1000i64..1000);
                    (column, value)
                })
                .collect();

            let (fields, placeholders, args) = kv.split();
            let fields: Vec<&str> = fields.split(',').collect();
            let placeholders: Vec<&str> = placeholders.split(',').collect();
            assert_eq!(fields.len(), kv.len());
            assert_eq!(placeholders.len(), kv.len());
            assert_eq!(args.len(), kv.len());

            for (field, arg) in fields.iter().zip(&args) {
                let column = field.trim_matches('`');
                assert_eq!(kv.get(column), Some(arg));
            }

            let (assignments, args) = kv.split_assignments();
            for (assignment, arg) in assignments.split(',').zip(&args) {
                let column = assignment.trim_end_matches("=?").trim_matches('`');
                assert_eq!(kv.get(column), Some(arg));
            }
        }
    }

    #[test]
    fn test_fields_join() {
        let fields = Fields::new(["first_name", "last_name"]);
        assert_eq!(fields.join(DatabaseType::MySQL), "`first_name`,`last_name`");
        assert_eq!(Fields::default().join(DatabaseType::MySQL), "");
    }
}
