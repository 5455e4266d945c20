use sqlx::postgres::PgRow;
use sqlx::{Column as _, Row as _, TypeInfo as _};

use crate::{Error, Value};

/// A result row as an ordered column-name to [`Value`] mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }

    /// Value of the first column with the given name, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn column(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub(crate) fn from_pg(row: &PgRow) -> Result<Self, Error> {
        let mut columns = Vec::with_capacity(row.len());
        for (index, column) in row.columns().iter().enumerate() {
            let name = column.name().to_string();
            let value = decode_column(row, index, column.type_info().name())
                .map_err(|err| Error::Value(format!("could not decode column `{name}`: {err}")))?;
            columns.push((name, value));
        }
        Ok(Self { columns })
    }
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)?
            .map_or(Value::Null, Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map_or(Value::Null, |v| Value::Int(i64::from(v))),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map_or(Value::Null, |v| Value::Int(i64::from(v))),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)?
            .map_or(Value::Null, Value::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map_or(Value::Null, |v| Value::Float(f64::from(v))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)?
            .map_or(Value::Null, Value::Float),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
            .try_get::<Option<String>, _>(index)?
            .map_or(Value::Null, Value::Text),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)?
            .map_or(Value::Null, Value::Uuid),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
            .map_or(Value::Null, Value::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map_or(Value::Null, |v| Value::Timestamp(v.and_utc())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map_or(Value::Null, Value::Json),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map_or(Value::Null, Value::Bytes),
        // Anything else is asked for as text and surfaced as a decode
        // failure when the driver cannot oblige.
        _ => row
            .try_get::<Option<String>, _>(index)?
            .map_or(Value::Null, Value::Text),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_position() {
        let row = Row::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::Text("alice".to_string())),
        ]);
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.column(1), Some(&Value::Text("alice".to_string())));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 2);
        assert!(!row.is_empty());
    }

    #[test]
    fn first_match_wins_for_duplicate_names() {
        let row = Row::from_pairs([("n", Value::Int(1)), ("n", Value::Int(2))]);
        assert_eq!(row.get("n"), Some(&Value::Int(1)));
    }
}
