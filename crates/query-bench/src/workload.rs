//! Work item generation.
//!
//! Work items are produced lazily so that large inputs (repeated statements,
//! JSON records streamed from a file) never have to be held in memory at once.

use std::io::BufRead;
use std::iter;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// One request to the query service: a statement plus optional parameters.
///
/// Serializes to the request body, e.g. `{"stmt": "...", "args": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItem {
    stmt: Arc<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bulk_args: Option<Vec<Vec<Value>>>,
}

impl WorkItem {
    pub fn statement(stmt: impl Into<Arc<str>>) -> Self {
        Self {
            stmt: stmt.into(),
            args: None,
            bulk_args: None,
        }
    }

    /// A parameterized request. Empty `args` are omitted from the payload.
    pub fn with_args(stmt: impl Into<Arc<str>>, args: Vec<Value>) -> Self {
        Self {
            stmt: stmt.into(),
            args: (!args.is_empty()).then_some(args),
            bulk_args: None,
        }
    }

    /// A batched request executing `stmt` once per parameter row.
    pub fn bulk(stmt: impl Into<Arc<str>>, bulk_args: Vec<Vec<Value>>) -> Self {
        Self {
            stmt: stmt.into(),
            args: None,
            bulk_args: Some(bulk_args),
        }
    }

    pub fn stmt(&self) -> &str {
        &self.stmt
    }

    /// Number of parameter rows carried by a bulk request, 1 otherwise.
    pub fn row_count(&self) -> usize {
        self.bulk_args.as_ref().map_or(1, Vec::len)
    }
}

/// The same statement `times` times.
pub fn repeat(stmt: &str, times: u64) -> impl Iterator<Item = WorkItem> {
    let item = WorkItem::statement(stmt);
    iter::repeat(item).take(times as usize)
}

/// Number of bulk requests produced for `num_records` rows, for progress display.
pub fn bulk_total_hint(num_records: Option<u64>, bulk_size: usize) -> Option<u64> {
    num_records.map(|n| (n / bulk_size.max(1) as u64).max(1))
}

/// Groups single-row requests into bulk requests of at most `bulk_size` rows.
///
/// Only consecutive rows sharing a statement end up in the same batch.
pub fn bulk_batches<I>(items: I, bulk_size: usize) -> BulkBatches<I::IntoIter>
where
    I: IntoIterator<Item = (Arc<str>, Vec<Value>)>,
{
    BulkBatches {
        inner: items.into_iter().peekable(),
        bulk_size: bulk_size.max(1),
    }
}

pub struct BulkBatches<I: Iterator<Item = (Arc<str>, Vec<Value>)>> {
    inner: iter::Peekable<I>,
    bulk_size: usize,
}

impl<I> Iterator for BulkBatches<I>
where
    I: Iterator<Item = (Arc<str>, Vec<Value>)>,
{
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        let (stmt, first) = self.inner.next()?;
        let mut rows = Vec::with_capacity(self.bulk_size.min(1024));
        rows.push(first);
        while rows.len() < self.bulk_size {
            match self.inner.next_if(|(next_stmt, _)| *next_stmt == stmt) {
                Some((_, row)) => rows.push(row),
                None => break,
            }
        }
        Some(WorkItem::bulk(stmt, rows))
    }
}

/// Converts a JSON object into a parameterized insert into `table`.
///
/// Columns follow the key order of the input object; values become
/// positional args.
pub fn to_insert(table: &str, record: &Map<String, Value>) -> (String, Vec<Value>) {
    let columns: Vec<String> = record.keys().map(|k| quote_ident(k)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let stmt = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    );
    (stmt, record.values().cloned().collect())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Insert requests for every JSON object read line by line from `reader`.
///
/// Blank lines are skipped; lines that are not JSON objects are skipped with a
/// warning. Reading stops at the first I/O error.
pub fn inserts_from_json_lines<R: BufRead>(
    reader: R,
    table: String,
) -> impl Iterator<Item = (Arc<str>, Vec<Value>)> {
    let mut last_stmt: Option<Arc<str>> = None;
    reader
        .lines()
        .enumerate()
        .map_while(|(lineno, line)| match line {
            Ok(line) => Some((lineno, line)),
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "Stopped reading input");
                None
            }
        })
        .filter_map(move |(lineno, line)| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(record)) => {
                    let (stmt, args) = to_insert(&table, &record);
                    // Reuse the previous allocation so batching can compare cheaply.
                    let stmt = match &last_stmt {
                        Some(prev) if **prev == *stmt => prev.clone(),
                        _ => {
                            let stmt: Arc<str> = stmt.into();
                            last_stmt = Some(stmt.clone());
                            stmt
                        }
                    };
                    Some((stmt, args))
                }
                Ok(_) => {
                    warn!(line = lineno + 1, "Skipping non-object JSON line");
                    None
                }
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "Skipping malformed JSON line");
                    None
                }
            }
        })
}

/// Non-empty, trimmed lines of `reader`, each one statement.
pub fn statements_from_lines<R: BufRead>(reader: R) -> impl Iterator<Item = String> {
    reader
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().trim_end_matches(';').trim().to_string())
        .filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_shapes() {
        let plain = serde_json::to_value(WorkItem::statement("select 1")).unwrap();
        assert_eq!(plain, json!({"stmt": "select 1"}));

        let args = WorkItem::with_args("select ?", vec![json!(1)]);
        assert_eq!(
            serde_json::to_value(&args).unwrap(),
            json!({"stmt": "select ?", "args": [1]})
        );

        let empty_args = WorkItem::with_args("select 1", Vec::new());
        assert_eq!(
            serde_json::to_value(&empty_args).unwrap(),
            json!({"stmt": "select 1"})
        );

        let bulk = WorkItem::bulk("insert into t (a) values (?)", vec![vec![json!(1)], vec![json!(2)]]);
        assert_eq!(
            serde_json::to_value(&bulk).unwrap(),
            json!({"stmt": "insert into t (a) values (?)", "bulk_args": [[1], [2]]})
        );
        assert_eq!(bulk.row_count(), 2);
    }

    #[test]
    fn test_repeat_is_lazy_and_exact() {
        let items: Vec<_> = repeat("select 1", 3).collect();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.stmt() == "select 1"));
        assert_eq!(repeat("select 1", 0).count(), 0);
    }

    #[test]
    fn test_bulk_batches_respect_size_and_statement() {
        let a: Arc<str> = "insert a".into();
        let b: Arc<str> = "insert b".into();
        let rows = vec![
            (a.clone(), vec![json!(1)]),
            (a.clone(), vec![json!(2)]),
            (a.clone(), vec![json!(3)]),
            (b.clone(), vec![json!(4)]),
            (a.clone(), vec![json!(5)]),
        ];
        let batches: Vec<WorkItem> = bulk_batches(rows, 2).collect();
        let summary: Vec<(&str, usize)> = batches.iter().map(|b| (b.stmt(), b.row_count())).collect();
        assert_eq!(
            summary,
            vec![("insert a", 2), ("insert a", 1), ("insert b", 1), ("insert a", 1)]
        );
    }

    #[test]
    fn test_bulk_total_hint() {
        assert_eq!(bulk_total_hint(Some(10_000), 5000), Some(2));
        assert_eq!(bulk_total_hint(Some(10), 5000), Some(1));
        assert_eq!(bulk_total_hint(None, 5000), None);
    }

    #[test]
    fn test_inserts_from_json_lines() {
        let input = "{\"id\": 1, \"name\": \"a\"}\n\nnot json\n[1,2]\n{\"id\": 2, \"name\": \"b\"}\n";
        let rows: Vec<_> = inserts_from_json_lines(input.as_bytes(), "doc.t".to_string()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            &*rows[0].0,
            "INSERT INTO doc.t (\"id\", \"name\") VALUES (?, ?)"
        );
        assert!(Arc::ptr_eq(&rows[0].0, &rows[1].0));
        assert_eq!(rows[1].1, vec![json!(2), json!("b")]);
    }

    #[test]
    fn test_insert_columns_keep_input_order() {
        let input = "{\"name\": \"a\", \"id\": 1, \"active\": true}\n";
        let rows: Vec<_> = inserts_from_json_lines(input.as_bytes(), "t".to_string()).collect();
        assert_eq!(
            &*rows[0].0,
            "INSERT INTO t (\"name\", \"id\", \"active\") VALUES (?, ?, ?)"
        );
        assert_eq!(rows[0].1, vec![json!("a"), json!(1), json!(true)]);
    }

    #[test]
    fn test_statements_from_lines() {
        let input = "select 1;\n\n  select 2  \n";
        let stmts: Vec<_> = statements_from_lines(input.as_bytes()).collect();
        assert_eq!(stmts, vec!["select 1", "select 2"]);
    }
}
