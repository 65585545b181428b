//! Read-only database explorer: catalog listing, ad-hoc SELECTs and the
//! filtered table browser.
//!
//! User SQL is screened by [`check_read_only`] and then executed inside a
//! transaction that is always rolled back.

use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, Column, Executor, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::{AppError, Result};

/// Column metadata for the browser
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

/// Tabular result of a query
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "is null")]
    IsNull,
    #[serde(rename = "is not null")]
    IsNotNull,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowseFilter {
    pub column: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowseRequest {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub filters: Vec<BrowseFilter>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowseResult {
    pub sql: String,
    #[serde(flatten)]
    pub result: QueryResult,
}

pub fn default_schema() -> String {
    "main".to_string()
}

pub fn default_table() -> String {
    "saved_texts".to_string()
}

const DEFAULT_BROWSE_LIMIT: i64 = 50;
const MAX_BROWSE_LIMIT: i64 = 1000;

pub struct ExplorerRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ExplorerRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Attached database names (`main`, `temp`, ...).
    pub async fn schemas(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("PRAGMA database_list").fetch_all(self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(AppError::from))
            .collect()
    }

    /// User tables, optionally restricted to one schema.
    pub async fn tables(&self, schema: Option<&str>) -> Result<Vec<TableRef>> {
        let schemas = match schema {
            Some(s) => vec![self.require_schema(s).await?],
            None => self.schemas().await?,
        };

        let mut tables = Vec::new();
        for schema in schemas {
            let sql = format!(
                "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                quote_ident(&schema)
            );
            let names = sqlx::query_scalar::<_, String>(&sql)
                .fetch_all(self.pool)
                .await?;
            tables.extend(names.into_iter().map(|table| TableRef {
                schema: schema.clone(),
                table,
            }));
        }

        Ok(tables)
    }

    /// Columns of `schema.table` in ordinal order; empty if the table does not exist.
    pub async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(
            r#"SELECT name, type, "notnull" FROM pragma_table_info(?1, ?2) ORDER BY cid"#,
        )
        .bind(table)
        .bind(schema)
        .fetch_all(self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ColumnInfo> {
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                    nullable: row.try_get::<i64, _>("notnull")? == 0,
                })
            })
            .collect()
    }

    /// Run user-supplied SQL without letting it change anything.
    pub async fn raw_query(&self, sql: &str) -> Result<QueryResult> {
        let sql = check_read_only(sql)?;
        info!("Running read-only query ({} chars)", sql.len());
        self.run(sql, SqliteArguments::default()).await
    }

    /// Build and run a filtered `SELECT *` over one table.
    ///
    /// `contains` filters are applied to the fetched rows with Unicode case
    /// folding, so they never appear in the generated SQL and the `LIMIT`
    /// moves after them.
    pub async fn browse(&self, req: &BrowseRequest) -> Result<BrowseResult> {
        let schema = self.require_schema(&req.schema).await?;
        let columns = self.columns(&schema, &req.table).await?;
        if columns.is_empty() {
            return Err(AppError::bad_request(format!(
                "Unknown table: {}.{}",
                schema, req.table
            )));
        }

        let mut conditions = Vec::new();
        let mut contains = Vec::new();
        let mut args = SqliteArguments::default();

        if let Some(project_id) = req.project_id {
            if columns.iter().any(|c| c.name == "project_id") {
                conditions.push(format!("{} = ?", quote_ident("project_id")));
                args.add(project_id);
            }
        }

        for filter in &req.filters {
            if !columns.iter().any(|c| c.name == filter.column) {
                return Err(AppError::bad_request(format!(
                    "Unknown column: {}",
                    filter.column
                )));
            }
            let column = quote_ident(&filter.column);
            let value = filter.value.clone().unwrap_or_default();
            match filter.op {
                FilterOp::Contains => contains.push((filter.column.clone(), value.to_lowercase())),
                FilterOp::Eq => {
                    conditions.push(format!("{} = ?", column));
                    args.add(value);
                }
                FilterOp::NotEq => {
                    conditions.push(format!("{} != ?", column));
                    args.add(value);
                }
                FilterOp::IsNull => conditions.push(format!("{} IS NULL", column)),
                FilterOp::IsNotNull => conditions.push(format!("{} IS NOT NULL", column)),
            }
        }

        let limit = req
            .limit
            .unwrap_or(DEFAULT_BROWSE_LIMIT)
            .clamp(1, MAX_BROWSE_LIMIT);
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let mut sql = format!(
            "SELECT * FROM {}.{}{} ORDER BY 1 DESC",
            quote_ident(&schema),
            quote_ident(&req.table),
            where_clause
        );
        if contains.is_empty() {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        debug!("Browse query: {}", sql);
        let mut result = self.run(&sql, args).await?;
        if !contains.is_empty() {
            let needles: Vec<(Option<usize>, String)> = contains
                .into_iter()
                .map(|(column, needle)| (result.columns.iter().position(|c| *c == column), needle))
                .collect();
            result.rows.retain(|row| {
                needles.iter().all(|(idx, needle)| {
                    idx.and_then(|i| row.get(i))
                        .is_some_and(|cell| cell_contains(cell, needle))
                })
            });
            result.rows.truncate(limit as usize);
        }
        Ok(BrowseResult { sql, result })
    }

    async fn require_schema(&self, schema: &str) -> Result<String> {
        self.schemas()
            .await?
            .into_iter()
            .find(|s| s == schema)
            .ok_or_else(|| AppError::bad_request(format!("Unknown schema: {}", schema)))
    }

    /// Execute inside a transaction that is rolled back on every path.
    async fn run<'q>(&self, sql: &'q str, args: SqliteArguments<'q>) -> Result<QueryResult> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_with(sql, args)
            .fetch_all(&mut *tx)
            .await
            .map_err(invalid_query)?;

        // Column names come from the rows; an empty result needs the statement description.
        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => (&mut *tx)
                .describe(sql)
                .await
                .map(|d| d.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default(),
        };

        tx.rollback().await?;

        let rows = rows
            .iter()
            .map(row_to_json)
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryResult { columns, rows })
    }
}

fn invalid_query(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(db) => AppError::InvalidQuery(db.message().to_string()),
        other => AppError::Database(other),
    }
}

/// Convert one row into JSON values by the storage class of each cell.
fn row_to_json(row: &SqliteRow) -> Result<Vec<Value>> {
    (0..row.columns().len())
        .map(|i| -> Result<Value> {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let value = match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(i)?),
                "REAL" | "NUMERIC" => Value::from(row.try_get::<f64, _>(i)?),
                "BLOB" => Value::from(BASE64.encode(row.try_get::<Vec<u8>, _>(i)?)),
                _ => Value::from(row.try_get::<String, _>(i)?),
            };
            Ok(value)
        })
        .collect()
}

/// Case-insensitive substring test on a JSON cell; `needle` is already lowercase.
fn cell_contains(cell: &Value, needle: &str) -> bool {
    match cell {
        Value::Null => false,
        Value::String(s) => s.to_lowercase().contains(needle),
        other => other.to_string().to_lowercase().contains(needle),
    }
}

/// Double-quote an identifier, doubling embedded quotes.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn leading_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(select|with|values|explain)\b").expect("valid regex"))
}

fn forbidden_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(insert|update|delete|create|drop|alter|attach|detach|pragma|vacuum|reindex|replace\s+into)\b",
        )
        .expect("valid regex")
    })
}

/// Validate that `sql` is a single read-only statement and return it without
/// the optional trailing semicolon.
pub fn check_read_only(sql: &str) -> Result<&str> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidQuery("Query must not be empty".to_string()));
    }

    let code = strip_literals_and_comments(trimmed)?;
    let code_trimmed = code.trim_end();
    let body = code_trimmed.strip_suffix(';').unwrap_or(code_trimmed);
    if body.contains(';') {
        return Err(AppError::InvalidQuery(
            "Only a single statement is allowed".to_string(),
        ));
    }

    if !leading_keyword().is_match(body) {
        return Err(AppError::InvalidQuery(
            "Only read-only queries (SELECT, WITH, VALUES, EXPLAIN) are allowed".to_string(),
        ));
    }
    if let Some(m) = forbidden_keyword().find(body) {
        return Err(AppError::InvalidQuery(format!(
            "Statement contains a forbidden keyword: {}",
            m.as_str().to_uppercase()
        )));
    }

    // `code` has the same byte offsets as `trimmed`, so the code semicolon
    // cuts the original text at the same place.
    Ok(if code_trimmed.ends_with(';') {
        trimmed[..code_trimmed.len() - 1].trim_end()
    } else {
        trimmed
    })
}

/// Replace string literals, quoted identifiers and comments with spaces so
/// keyword checks only see SQL code. Every skipped byte becomes one space.
fn strip_literals_and_comments(sql: &str) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                let close = c;
                let mut closed = false;
                while let Some((_, n)) = chars.next() {
                    if n == close {
                        // doubled quote is an escaped quote
                        if matches!(chars.peek(), Some(&(_, p)) if p == close) {
                            chars.next();
                            continue;
                        }
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(AppError::InvalidQuery("Unterminated quoted string".to_string()));
                }
            }
            '[' => {
                if !chars.by_ref().any(|(_, n)| n == ']') {
                    return Err(AppError::InvalidQuery("Unterminated identifier".to_string()));
                }
            }
            '-' if matches!(chars.peek(), Some(&(_, '-'))) => {
                for (_, n) in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some(&(_, '*'))) => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        closed = true;
                        break;
                    }
                    prev = n;
                }
                if !closed {
                    return Err(AppError::InvalidQuery("Unterminated comment".to_string()));
                }
            }
            _ => {
                out.push(c);
                continue;
            }
        }
        let end = chars.peek().map_or(sql.len(), |&(i, _)| i);
        out.extend(std::iter::repeat(' ').take(end - start));
    }

    Ok(out)
}
