//! Plugin data-model registration
//!
//! Plugins declare their own persisted entities as a list of typed
//! attributes. Each model becomes a `SQLite` table namespaced by the owning
//! plugin's id, so one plugin cannot address another plugin's tables.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::{DbPool, connection};
use crate::{Error, Result};

/// A row as a JSON object keyed by attribute name
pub type Record = Map<String, Value>;

/// Attribute storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    /// Arbitrary JSON, stored as text
    Json,
}

impl ColumnType {
    const fn sql(self) -> &'static str {
        match self {
            Self::Text | Self::Json => "TEXT",
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

/// A single model attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAttribute {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_true")]
    pub allow_null: bool,
}

const fn default_true() -> bool {
    true
}

impl ModelAttribute {
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            allow_null: true,
        }
    }

    /// Mark as the primary key (implies not null)
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.allow_null = false;
        self
    }

    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    fn to_sql(&self, value: &Value) -> Result<SqlValue> {
        let mismatch = || {
            Error::Model(format!(
                "attribute `{}` expects {:?}, got {value}",
                self.name, self.column_type
            ))
        };

        if value.is_null() {
            return if self.allow_null {
                Ok(SqlValue::Null)
            } else {
                Err(Error::Model(format!("attribute `{}` must not be null", self.name)))
            };
        }

        match self.column_type {
            ColumnType::Text => value
                .as_str()
                .map(|s| SqlValue::Text(s.to_string()))
                .ok_or_else(mismatch),
            ColumnType::Integer => value.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
            ColumnType::Real => value.as_f64().map(SqlValue::Real).ok_or_else(mismatch),
            ColumnType::Boolean => value
                .as_bool()
                .map(|b| SqlValue::Integer(i64::from(b)))
                .ok_or_else(mismatch),
            ColumnType::Json => Ok(SqlValue::Text(serde_json::to_string(value)?)),
        }
    }

    fn from_sql(&self, value: SqlValue) -> Value {
        match (self.column_type, value) {
            (ColumnType::Boolean, SqlValue::Integer(i)) => Value::Bool(i != 0),
            (_, SqlValue::Integer(i)) => Value::from(i),
            (_, SqlValue::Real(f)) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            (ColumnType::Json, SqlValue::Text(s)) => {
                serde_json::from_str(&s).unwrap_or(Value::String(s))
            }
            (_, SqlValue::Text(s)) => Value::String(s),
            (_, SqlValue::Null | SqlValue::Blob(_)) => Value::Null,
        }
    }
}

/// A model declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub attributes: Vec<ModelAttribute>,
}

impl ModelDefinition {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn attribute(mut self, attribute: ModelAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    fn primary_key(&self) -> Option<&ModelAttribute> {
        self.attributes.iter().find(|a| a.primary_key)
    }

    fn validate(&self, model_name: &str) -> Result<()> {
        if self.attributes.is_empty() {
            return Err(Error::Model(format!("model `{model_name}` has no attributes")));
        }
        let mut seen = std::collections::HashSet::new();
        for attr in &self.attributes {
            if !is_identifier(&attr.name) {
                return Err(Error::Model(format!("invalid attribute name `{}`", attr.name)));
            }
            if !seen.insert(attr.name.as_str()) {
                return Err(Error::Model(format!("duplicate attribute `{}`", attr.name)));
            }
        }
        match self.attributes.iter().filter(|a| a.primary_key).count() {
            1 => Ok(()),
            n => Err(Error::Model(format!(
                "model `{model_name}` must declare exactly one primary key, found {n}"
            ))),
        }
    }

    fn create_table_sql(&self, table: &str) -> String {
        let columns: Vec<String> = self
            .attributes
            .iter()
            .map(|a| {
                let mut col = format!("\"{}\" {}", a.name, a.column_type.sql());
                if a.primary_key {
                    col.push_str(" PRIMARY KEY");
                } else if !a.allow_null {
                    col.push_str(" NOT NULL");
                }
                col
            })
            .collect();
        format!("CREATE TABLE IF NOT EXISTS \"{table}\" ({})", columns.join(", "))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Table for a plugin's model
///
/// Every byte of the plugin id other than an ASCII letter or digit is
/// written as `_` plus two hex digits, so the escaped id never contains
/// `__` and the first `__` always separates it from the model name.
fn table_name(plugin_id: &str, model_name: &str) -> String {
    let mut name = String::from("plugin_");
    for byte in plugin_id.bytes() {
        if byte.is_ascii_alphanumeric() {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("_{byte:02x}"));
        }
    }
    name.push_str("__");
    name.push_str(model_name);
    name
}

/// Creates and tracks plugin-declared tables
#[derive(Clone)]
pub struct ModelRegistry {
    pool: DbPool,
}

impl ModelRegistry {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Declare a model for a plugin, creating its table if needed
    ///
    /// Redefining an existing model keeps the existing table; only new
    /// tables are created.
    ///
    /// # Errors
    ///
    /// Returns error if the definition is invalid or the table cannot be created
    pub fn define(
        &self,
        plugin_id: &str,
        model_name: &str,
        definition: ModelDefinition,
    ) -> Result<Model> {
        if !is_identifier(model_name) {
            return Err(Error::Model(format!("invalid model name `{model_name}`")));
        }
        definition.validate(model_name)?;

        let table = table_name(plugin_id, model_name);
        let conn = connection(&self.pool)?;
        let owner: Option<(String, String)> = conn
            .query_row(
                "SELECT plugin_id, model_name FROM plugin_models WHERE table_name = ?1",
                [&table],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((owner_id, owner_model)) =
            owner.filter(|(id, model)| id != plugin_id || model != model_name)
        {
            return Err(Error::Model(format!(
                "table `{table}` already belongs to model `{owner_model}` of plugin `{owner_id}`"
            )));
        }
        conn.execute_batch(&definition.create_table_sql(&table))?;
        conn.execute(
            "INSERT OR REPLACE INTO plugin_models (plugin_id, model_name, table_name, definition)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                plugin_id,
                model_name,
                &table,
                serde_json::to_string(&definition)?
            ],
        )?;

        tracing::debug!(plugin_id = %plugin_id, model = %model_name, table = %table, "model defined");

        Ok(Model {
            pool: self.pool.clone(),
            name: model_name.to_string(),
            table,
            definition: Arc::new(definition),
        })
    }

    /// Names of models a plugin has declared
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self, plugin_id: &str) -> Result<Vec<String>> {
        let conn = connection(&self.pool)?;
        let mut stmt = conn.prepare(
            "SELECT model_name FROM plugin_models WHERE plugin_id = ?1 ORDER BY model_name",
        )?;
        let names = stmt
            .query_map([plugin_id], |row| row.get(0))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(names)
    }
}

/// Handle to a declared model's table
#[derive(Clone)]
pub struct Model {
    pool: DbPool,
    name: String,
    table: String,
    definition: Arc<ModelDefinition>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl Model {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    fn pk(&self) -> Result<&ModelAttribute> {
        self.definition
            .primary_key()
            .ok_or_else(|| Error::Model(format!("model `{}` has no primary key", self.name)))
    }

    fn column_list(&self) -> String {
        self.definition
            .attributes
            .iter()
            .map(|a| format!("\"{}\"", a.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn record_from_row(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
        let mut record = Record::new();
        for (i, attr) in self.definition.attributes.iter().enumerate() {
            let raw: SqlValue = row.get(i)?;
            record.insert(attr.name.clone(), attr.from_sql(raw));
        }
        Ok(record)
    }

    fn row_values(&self, record: &Record) -> Result<Vec<SqlValue>> {
        if let Some(unknown) = record
            .keys()
            .find(|k| !self.definition.attributes.iter().any(|a| &a.name == *k))
        {
            return Err(Error::Model(format!(
                "model `{}` has no attribute `{unknown}`",
                self.name
            )));
        }
        self.definition
            .attributes
            .iter()
            .map(|a| a.to_sql(record.get(&a.name).unwrap_or(&Value::Null)))
            .collect()
    }

    fn write(&self, verb: &str, record: &Record) -> Result<()> {
        let values = self.row_values(record)?;
        let placeholders = (1..=values.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{verb} INTO \"{}\" ({}) VALUES ({placeholders})",
            self.table,
            self.column_list()
        );
        let conn = connection(&self.pool)?;
        conn.execute(&sql, rusqlite::params_from_iter(values.iter()))
            .map_err(|e| Error::Model(format!("{} write failed: {e}", self.name)))?;
        Ok(())
    }

    /// Insert a new record
    ///
    /// # Errors
    ///
    /// Returns error on type mismatch, unknown attributes, or a duplicate key
    pub fn insert(&self, record: &Record) -> Result<()> {
        self.write("INSERT", record)
    }

    /// Insert or replace a record by primary key
    ///
    /// # Errors
    ///
    /// Returns error on type mismatch or unknown attributes
    pub fn upsert(&self, record: &Record) -> Result<()> {
        self.write("INSERT OR REPLACE", record)
    }

    /// Find a record by primary key
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find(&self, key: &Value) -> Result<Option<Record>> {
        let pk = self.pk()?;
        let key = pk.to_sql(key)?;
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE \"{}\" = ?1",
            self.column_list(),
            self.table,
            pk.name
        );
        let conn = connection(&self.pool)?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map([key], |row| self.record_from_row(row))?;
        Ok(rows.next().transpose()?)
    }

    /// All records, ordered by primary key
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_all(&self) -> Result<Vec<Record>> {
        let pk = self.pk()?;
        let sql = format!(
            "SELECT {} FROM \"{}\" ORDER BY \"{}\"",
            self.column_list(),
            self.table,
            pk.name
        );
        let conn = connection(&self.pool)?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([], |row| self.record_from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Delete a record by primary key, returning whether it existed
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete(&self, key: &Value) -> Result<bool> {
        let pk = self.pk()?;
        let key = pk.to_sql(key)?;
        let sql = format!("DELETE FROM \"{}\" WHERE \"{}\" = ?1", self.table, pk.name);
        let conn = connection(&self.pool)?;
        let affected = conn.execute(&sql, [key])?;
        Ok(affected > 0)
    }

    /// Number of stored records
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self) -> Result<usize> {
        let conn = connection(&self.pool)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::init_memory;

    fn device_model() -> ModelDefinition {
        ModelDefinition::new()
            .attribute(ModelAttribute::new("id", ColumnType::Text).primary_key())
            .attribute(ModelAttribute::new("owner", ColumnType::Text).not_null())
            .attribute(ModelAttribute::new("active", ColumnType::Boolean))
            .attribute(ModelAttribute::new("score", ColumnType::Real))
            .attribute(ModelAttribute::new("meta", ColumnType::Json))
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn define_and_query() {
        let registry = ModelRegistry::new(init_memory().unwrap());
        let model = registry.define("audit-plugin", "devices", device_model()).unwrap();
        assert_eq!(model.table_name(), "plugin_audit_2dplugin__devices");

        model
            .insert(&record(json!({
                "id": "d1",
                "owner": "alice",
                "active": true,
                "score": 1.5,
                "meta": {"os": "linux"}
            })))
            .unwrap();
        model
            .insert(&record(json!({"id": "d2", "owner": "bob"})))
            .unwrap();

        let d1 = model.find(&json!("d1")).unwrap().unwrap();
        assert_eq!(d1["active"], json!(true));
        assert_eq!(d1["meta"]["os"], json!("linux"));
        assert_eq!(d1["score"], json!(1.5));

        let all = model.find_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1]["active"], Value::Null);
        assert_eq!(model.count().unwrap(), 2);

        assert!(model.delete(&json!("d1")).unwrap());
        assert!(!model.delete(&json!("d1")).unwrap());
        assert!(model.find(&json!("d1")).unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_fails_but_upsert_replaces() {
        let registry = ModelRegistry::new(init_memory().unwrap());
        let model = registry.define("p", "devices", device_model()).unwrap();

        let row = record(json!({"id": "d1", "owner": "alice"}));
        model.insert(&row).unwrap();
        assert!(model.insert(&row).is_err());

        model
            .upsert(&record(json!({"id": "d1", "owner": "carol"})))
            .unwrap();
        let d1 = model.find(&json!("d1")).unwrap().unwrap();
        assert_eq!(d1["owner"], json!("carol"));
    }

    #[test]
    fn rejects_bad_records() {
        let registry = ModelRegistry::new(init_memory().unwrap());
        let model = registry.define("p", "devices", device_model()).unwrap();

        let missing_owner = record(json!({"id": "d1"}));
        assert!(model.insert(&missing_owner).is_err());

        let wrong_type = record(json!({"id": "d1", "owner": 7}));
        assert!(model.insert(&wrong_type).is_err());

        let unknown = record(json!({"id": "d1", "owner": "a", "color": "red"}));
        assert!(model.insert(&unknown).is_err());
    }

    #[test]
    fn rejects_bad_definitions() {
        let registry = ModelRegistry::new(init_memory().unwrap());

        let no_pk = ModelDefinition::new().attribute(ModelAttribute::new("a", ColumnType::Text));
        assert!(registry.define("p", "items", no_pk).is_err());

        assert!(registry.define("p", "drop table", device_model()).is_err());

        let bad_attr = ModelDefinition::new()
            .attribute(ModelAttribute::new("id\"; --", ColumnType::Text).primary_key());
        assert!(registry.define("p", "items", bad_attr).is_err());
    }

    #[test]
    fn models_are_namespaced_per_plugin() {
        let registry = ModelRegistry::new(init_memory().unwrap());
        let a = registry.define("plugin-a", "items", device_model()).unwrap();
        let b = registry.define("plugin-b", "items", device_model()).unwrap();

        a.insert(&record(json!({"id": "x", "owner": "a"}))).unwrap();
        assert_eq!(b.count().unwrap(), 0);

        assert_eq!(registry.list("plugin-a").unwrap(), vec!["items"]);
        assert!(registry.list("plugin-c").unwrap().is_empty());
    }

    #[test]
    fn punctuated_ids_do_not_share_tables() {
        let registry = ModelRegistry::new(init_memory().unwrap());
        let keyed = ModelDefinition::new()
            .attribute(ModelAttribute::new("id", ColumnType::Text).primary_key());

        let dashed = registry.define("a-b", "c", keyed.clone()).unwrap();
        let plain = registry.define("a", "b_c", keyed.clone()).unwrap();
        let underscored = registry.define("a_b", "c", keyed).unwrap();
        assert_ne!(dashed.table_name(), plain.table_name());
        assert_ne!(dashed.table_name(), underscored.table_name());
        assert_ne!(plain.table_name(), underscored.table_name());

        dashed.insert(&record(json!({"id": "secret-of-a-b"}))).unwrap();
        assert!(plain.find_all().unwrap().is_empty());
        assert!(underscored.find_all().unwrap().is_empty());
        assert_eq!(dashed.count().unwrap(), 1);
    }

    #[test]
    fn table_owned_by_another_model_is_refused() {
        let pool = init_memory().unwrap();
        let registry = ModelRegistry::new(pool.clone());
        let table = table_name("x", "items");
        connection(&pool)
            .unwrap()
            .execute(
                "INSERT INTO plugin_models (plugin_id, model_name, table_name, definition)
                 VALUES ('other', 'things', ?1, '{}')",
                [&table],
            )
            .unwrap();

        let err = registry.define("x", "items", device_model()).unwrap_err();
        assert!(err.to_string().contains("already belongs"));
        assert!(registry.list("x").unwrap().is_empty());
        assert_eq!(registry.list("other").unwrap(), vec!["things"]);

        // Redefining one's own model is still allowed
        registry.define("y", "items", device_model()).unwrap();
        registry.define("y", "items", device_model()).unwrap();
    }
}
