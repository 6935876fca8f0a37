// SPDX-License-Identifier: MIT

use crate::adk::error::FlowError;
use crate::adk::tool::Tool;
use crate::flowkit::workflow::context::DataSource;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const TOOL_NAME: &str = "query_database";

/// Rows returned per query
pub const MAX_ROWS: usize = 100;

static DATABASE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "A read-only SQL SELECT statement"
            },
            "source": {
                "type": "string",
                "description": "Name of the data source (defaults to the first one)"
            }
        },
        "required": ["query"]
    })
});

#[derive(Debug, Deserialize)]
struct QueryArgs {
    query: String,
    #[serde(default)]
    source: Option<String>,
}

/// Read-only queries against the data sources attached to an agent
///
/// SQLite sources are opened read-only and queried directly. Other engines
/// answer with their configured schema and query guidance so the model can
/// still reason about them.
pub struct DatabaseQueryTool {
    sources: Vec<DataSource>,
}

impl DatabaseQueryTool {
    pub fn new(sources: Vec<DataSource>) -> Self {
        Self { sources }
    }

    fn source(&self, name: Option<&str>) -> Result<&DataSource, FlowError> {
        match name {
            Some(name) => self
                .sources
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| FlowError::tool(TOOL_NAME, format!("Unknown data source '{}'", name))),
            None => self
                .sources
                .first()
                .ok_or_else(|| FlowError::tool(TOOL_NAME, "No data source is attached")),
        }
    }
}

fn is_sqlite(source: &DataSource) -> bool {
    matches!(source.db_type.to_lowercase().as_str(), "sqlite" | "sqlite3")
}

/// `sqlite://path`, `sqlite:path` or a bare path
fn sqlite_path(connection_string: &str) -> &str {
    connection_string
        .strip_prefix("sqlite://")
        .or_else(|| connection_string.strip_prefix("sqlite:"))
        .unwrap_or(connection_string)
}

/// Accept a single SELECT (or WITH ... SELECT) statement
fn check_read_only(query: &str) -> Result<String, FlowError> {
    let statement = query.trim().trim_end_matches(';').trim();
    let lowered = statement.to_lowercase();
    if !(lowered.starts_with("select") || lowered.starts_with("with")) {
        return Err(FlowError::tool(TOOL_NAME, "Only SELECT queries are allowed"));
    }
    if statement.contains(';') {
        return Err(FlowError::tool(TOOL_NAME, "Only a single statement is allowed"));
    }
    Ok(statement.to_string())
}

fn describe(source: &DataSource) -> String {
    let mut text = format!(
        "Data source '{}' ({}) cannot be queried directly.",
        source.name, source.db_type
    );
    if let Some(schema) = source.schema.as_deref().filter(|s| !s.is_empty()) {
        text.push_str(&format!("\nSchema:\n{}", schema));
    }
    if let Some(context) = source.query_context.as_deref().filter(|s| !s.is_empty()) {
        text.push_str(&format!("\nContext:\n{}", context));
    }
    text
}

fn sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

fn run_select(path: &str, statement: &str) -> Result<Vec<Value>, rusqlite::Error> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut stmt = conn.prepare(statement)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let rows = stmt.query_map([], |row| {
        let mut record = Map::new();
        for (i, column) in columns.iter().enumerate() {
            record.insert(column.clone(), sql_value(row.get_ref(i)?));
        }
        Ok(Value::Object(record))
    })?;

    rows.take(MAX_ROWS).collect()
}

#[async_trait]
impl Tool for DatabaseQueryTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Runs a read-only SQL SELECT against the databases attached to this agent."
    }

    fn schema(&self) -> &Value {
        &DATABASE_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, FlowError> {
        let args: QueryArgs = serde_json::from_value(input)
            .map_err(|e| FlowError::tool(TOOL_NAME, format!("Invalid arguments: {}", e)))?;
        let source = self.source(args.source.as_deref())?;

        if !is_sqlite(source) {
            return Ok(Value::String(describe(source)));
        }

        let statement = check_read_only(&args.query)?;
        let path = sqlite_path(&source.connection_string).to_string();
        log::debug!("Querying '{}': {}", source.name, statement);

        let rows = tokio::task::spawn_blocking(move || run_select(&path, &statement))
            .await
            .map_err(|e| FlowError::tool(TOOL_NAME, e.to_string()))?
            .map_err(|e| FlowError::tool(TOOL_NAME, e.to_string()))?;

        Ok(json!({
            "source": source.name,
            "rowCount": rows.len(),
            "rows": rows,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_source(path: &str) -> DataSource {
        DataSource {
            name: "shop".to_string(),
            db_type: "sqlite".to_string(),
            connection_string: format!("sqlite://{}", path),
            schema: None,
            query_context: None,
        }
    }

    fn seeded_db() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT, price REAL);
             INSERT INTO products (name, price) VALUES ('kettle', 24.5), ('mug', 6.0);",
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn test_select_rows() {
        let db = seeded_db();
        let tool = DatabaseQueryTool::new(vec![sqlite_source(db.path().to_str().unwrap())]);

        let out = tool
            .execute(json!({"query": "SELECT name, price FROM products ORDER BY price;"}))
            .await
            .unwrap();

        assert_eq!(out["rowCount"], 2);
        assert_eq!(out["rows"][0], json!({"name": "mug", "price": 6.0}));
    }

    #[tokio::test]
    async fn test_writes_are_rejected() {
        let db = seeded_db();
        let tool = DatabaseQueryTool::new(vec![sqlite_source(db.path().to_str().unwrap())]);

        for query in ["DELETE FROM products", "SELECT 1; DROP TABLE products"] {
            let err = tool.execute(json!({"query": query})).await.unwrap_err();
            assert!(matches!(err, FlowError::ToolExecution { .. }), "{}", query);
        }
    }

    #[tokio::test]
    async fn test_other_engines_describe_themselves() {
        let tool = DatabaseQueryTool::new(vec![DataSource {
            name: "warehouse".to_string(),
            db_type: "postgres".to_string(),
            connection_string: "postgres://localhost/wh".to_string(),
            schema: Some("orders(id, total)".to_string()),
            query_context: None,
        }]);

        let out = tool.execute(json!({"query": "SELECT * FROM orders"})).await.unwrap();
        let text = out.as_str().unwrap();
        assert!(text.contains("'warehouse' (postgres)"));
        assert!(text.contains("orders(id, total)"));
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let tool = DatabaseQueryTool::new(vec![sqlite_source("unused.db")]);
        let err = tool
            .execute(json!({"query": "SELECT 1", "source": "other"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown data source"));
    }

    #[test]
    fn test_sqlite_path() {
        assert_eq!(sqlite_path("sqlite:///tmp/a.db"), "/tmp/a.db");
        assert_eq!(sqlite_path("sqlite:a.db"), "a.db");
        assert_eq!(sqlite_path("a.db"), "a.db");
    }
}
