use crate::{Connection, Error, Expression, Row, Value};

#[derive(Debug, Clone)]
enum WhereClause {
    Binding { column: String, operator: String },
    Null { column: String },
    Raw(String),
}

/// Fluent query handle scoped to one table, created by
/// [`Connection::table`]. Chainers collect projections, conditions and
/// bindings; terminals compile the statement and run it on the owning
/// connection with `$n` placeholders.
pub struct QueryBuilder<'a, C: Connection> {
    connection: &'a C,
    table: String,
    selects: Vec<String>,
    wheres: Vec<WhereClause>,
    bindings: Vec<Value>,
    orders: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'a, C: Connection> QueryBuilder<'a, C> {
    pub(crate) fn new(connection: &'a C, table: impl Into<String>) -> Self {
        Self {
            connection,
            table: table.into(),
            selects: vec![],
            wheres: vec![],
            bindings: vec![],
            orders: vec![],
            limit: None,
            offset: None,
        }
    }

    pub fn select(mut self, column: impl Into<String>) -> Self {
        self.selects.push(column.into());
        self
    }

    pub fn select_raw(mut self, expression: Expression) -> Self {
        self.selects.push(expression.value().to_string());
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_op(column, "=", value)
    }

    pub fn where_op(
        mut self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.wheres.push(WhereClause::Binding {
            column: column.into(),
            operator: operator.into(),
        });
        self.bindings.push(value.into());
        self
    }

    pub fn where_null(mut self, column: impl Into<String>) -> Self {
        self.wheres.push(WhereClause::Null {
            column: column.into(),
        });
        self
    }

    pub fn where_raw(mut self, expression: Expression) -> Self {
        self.wheres
            .push(WhereClause::Raw(expression.value().to_string()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.orders.push(column.into());
        self
    }

    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.orders.push(format!("{} DESC", column.into()));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The select statement this builder compiles to.
    pub fn to_sql(&self) -> String {
        let columns = if self.selects.is_empty() {
            "*".to_string()
        } else {
            self.selects.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", columns, self.table);
        sql.push_str(&self.render_wheres(1));
        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }

    pub async fn get(self) -> Result<Vec<Row>, Error> {
        let sql = self.to_sql();
        self.connection.fetch(&sql, &self.bindings).await
    }

    pub async fn first(mut self) -> Result<Option<Row>, Error> {
        self.limit = Some(1);
        let sql = self.to_sql();
        self.connection.fetch_one(&sql, &self.bindings).await
    }

    pub async fn count(self) -> Result<i64, Error> {
        let sql = format!(
            "SELECT COUNT(*) AS aggregate FROM {}{}",
            self.table,
            self.render_wheres(1)
        );
        match self.connection.fetch_one(&sql, &self.bindings).await? {
            Some(row) => Ok(row.get("aggregate").and_then(Value::as_i64).unwrap_or(0)),
            None => Ok(0),
        }
    }

    pub async fn exists(self) -> Result<bool, Error> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {}{}) AS present",
            self.table,
            self.render_wheres(1)
        );
        match self.connection.fetch_one(&sql, &self.bindings).await? {
            Some(row) => Ok(row.get("present").and_then(Value::as_bool).unwrap_or(false)),
            None => Ok(false),
        }
    }

    pub async fn insert<K, V, I>(self, values: I) -> Result<bool, Error>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let (columns, row_values): (Vec<String>, Vec<Value>) = values
            .into_iter()
            .map(|(column, value)| (column.into(), value.into()))
            .unzip();
        if columns.is_empty() {
            return Ok(true);
        }
        let placeholders = (1..=row_values.len())
            .map(|n| format!("${n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders
        );
        self.connection.execute(&sql, &row_values).await
    }

    pub async fn update<K, V, I>(self, values: I) -> Result<u64, Error>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let (columns, set_values): (Vec<String>, Vec<Value>) = values
            .into_iter()
            .map(|(column, value)| (column.into(), value.into()))
            .unzip();
        if columns.is_empty() {
            return Ok(0);
        }
        let assignments = columns
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{} = ${}", column, index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {} SET {}", self.table, assignments);
        sql.push_str(&self.render_wheres(columns.len() + 1));

        let mut bindings = set_values;
        bindings.extend(self.bindings.iter().cloned());
        self.connection.affecting_statement(&sql, &bindings).await
    }

    pub async fn delete(self) -> Result<u64, Error> {
        let mut sql = format!("DELETE FROM {}", self.table);
        sql.push_str(&self.render_wheres(1));
        self.connection.affecting_statement(&sql, &self.bindings).await
    }

    fn render_wheres(&self, mut placeholder: usize) -> String {
        if self.wheres.is_empty() {
            return String::new();
        }
        let mut parts = Vec::with_capacity(self.wheres.len());
        for clause in &self.wheres {
            parts.push(match clause {
                WhereClause::Binding { column, operator } => {
                    let part = format!("{column} {operator} ${placeholder}");
                    placeholder += 1;
                    part
                }
                WhereClause::Null { column } => format!("{column} IS NULL"),
                WhereClause::Raw(sql) => sql.clone(),
            });
        }
        format!(" WHERE {}", parts.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::RecordingConnection;
    use crate::{Connection, Expression, Row, Value};

    #[test]
    fn selects_default_to_star() {
        let conn = RecordingConnection::new();
        assert_eq!(conn.table("users").to_sql(), "SELECT * FROM users");
    }

    #[test]
    fn select_where_order_limit() {
        let conn = RecordingConnection::new();
        let sql = conn
            .table("users")
            .select("name")
            .select("email")
            .where_eq("active", true)
            .where_op("age", ">", 18)
            .order_by_desc("created_at")
            .limit(10)
            .offset(20)
            .to_sql();
        assert_eq!(
            sql,
            "SELECT name, email FROM users WHERE active = $1 AND age > $2 \
             ORDER BY created_at DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn raw_fragments_skip_binding() {
        let conn = RecordingConnection::new();
        let sql = conn
            .table("users")
            .select_raw(Expression::new("count(*) as total"))
            .where_raw(Expression::new("deleted_at IS NULL"))
            .where_null("banned_at")
            .to_sql();
        assert_eq!(
            sql,
            "SELECT count(*) as total FROM users WHERE deleted_at IS NULL AND banned_at IS NULL"
        );
    }

    #[tokio::test]
    async fn get_passes_where_bindings_in_order() {
        let conn = RecordingConnection::new();
        conn.table("users")
            .where_eq("name", "alice")
            .where_op("age", ">=", 30)
            .get()
            .await
            .unwrap();

        let recorded = conn.recorded();
        assert_eq!(
            recorded[0].query,
            "SELECT * FROM users WHERE name = $1 AND age >= $2"
        );
        assert_eq!(
            recorded[0].bindings,
            vec![Value::Text("alice".to_string()), Value::Int(30)]
        );
    }

    #[tokio::test]
    async fn first_applies_limit_one() {
        let conn = RecordingConnection::new();
        conn.push_rows(vec![Row::from_pairs([("id", Value::Int(1))])]);
        let row = conn
            .table("users")
            .where_eq("id", 1)
            .first()
            .await
            .unwrap();
        assert!(row.is_some());
        assert_eq!(
            conn.recorded_queries(),
            vec!["SELECT * FROM users WHERE id = $1 LIMIT 1"]
        );
    }

    #[tokio::test]
    async fn insert_numbers_placeholders_per_column() {
        let conn = RecordingConnection::new();
        conn.table("users")
            .insert(vec![
                ("name", Value::from("alice")),
                ("age", Value::from(30)),
            ])
            .await
            .unwrap();

        let recorded = conn.recorded();
        assert_eq!(
            recorded[0].query,
            "INSERT INTO users (name, age) VALUES ($1, $2)"
        );
        assert_eq!(
            recorded[0].bindings,
            vec![Value::Text("alice".to_string()), Value::Int(30)]
        );
    }

    #[tokio::test]
    async fn insert_with_no_values_does_not_touch_the_connection() {
        let conn = RecordingConnection::new();
        let ok = conn
            .table("users")
            .insert(Vec::<(&str, Value)>::new())
            .await
            .unwrap();
        assert!(ok);
        assert!(conn.recorded().is_empty());
    }

    #[tokio::test]
    async fn update_numbers_set_bindings_before_where_bindings() {
        let conn = RecordingConnection::new();
        conn.push_affected(3);
        let affected = conn
            .table("users")
            .where_eq("active", false)
            .update(vec![("name", Value::from("bob")), ("age", Value::from(40))])
            .await
            .unwrap();

        assert_eq!(affected, 3);
        let recorded = conn.recorded();
        assert_eq!(
            recorded[0].query,
            "UPDATE users SET name = $1, age = $2 WHERE active = $3"
        );
        assert_eq!(
            recorded[0].bindings,
            vec![
                Value::Text("bob".to_string()),
                Value::Int(40),
                Value::Bool(false)
            ]
        );
    }

    #[tokio::test]
    async fn delete_scopes_to_the_where_clauses() {
        let conn = RecordingConnection::new();
        conn.table("sessions")
            .where_op("expires_at", "<", "2024-01-01")
            .delete()
            .await
            .unwrap();
        assert_eq!(
            conn.recorded_queries(),
            vec!["DELETE FROM sessions WHERE expires_at < $1"]
        );
    }

    #[tokio::test]
    async fn count_reads_the_aggregate_column() {
        let conn = RecordingConnection::new();
        conn.push_rows(vec![Row::from_pairs([("aggregate", Value::Int(12))])]);
        let count = conn.table("users").count().await.unwrap();
        assert_eq!(count, 12);
        assert_eq!(
            conn.recorded_queries(),
            vec!["SELECT COUNT(*) AS aggregate FROM users"]
        );
    }

    #[tokio::test]
    async fn exists_wraps_the_scope_in_a_subquery() {
        let conn = RecordingConnection::new();
        conn.push_rows(vec![Row::from_pairs([("present", Value::Bool(true))])]);
        let present = conn
            .table("users")
            .where_eq("id", 5)
            .exists()
            .await
            .unwrap();
        assert!(present);
        assert_eq!(
            conn.recorded_queries(),
            vec!["SELECT EXISTS(SELECT 1 FROM users WHERE id = $1) AS present"]
        );
    }
}
