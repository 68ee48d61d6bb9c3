use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::elapsed_ms;
use crate::monitor::Monitor;

/// Longest statement text kept on a record.
const MAX_STATEMENT_CHARS: usize = 500;

/// Keywords after which the target table is expected.
const TABLE_KEYWORDS: [&str; 5] = ["FROM", "INTO", "UPDATE", "TABLE", "JOIN"];

/// Wraps a datastore client and reports the timing of every call made
/// through it. The client itself is never modified.
pub struct InstrumentedStore<C> {
    inner: C,
    monitor: Arc<Monitor>,
}

/// Rows affected by a datastore call, when the result type knows it.
pub trait RowCount {
    fn row_count(&self) -> Option<u64>;
}

impl RowCount for u64 {
    fn row_count(&self) -> Option<u64> {
        Some(*self)
    }
}

impl RowCount for usize {
    fn row_count(&self) -> Option<u64> {
        Some(*self as u64)
    }
}

impl RowCount for () {
    fn row_count(&self) -> Option<u64> {
        None
    }
}

impl<T> RowCount for Vec<T> {
    fn row_count(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

impl<T> RowCount for Option<T> {
    fn row_count(&self) -> Option<u64> {
        Some(u64::from(self.is_some()))
    }
}

impl<C> InstrumentedStore<C> {
    pub fn new(inner: C, monitor: Arc<Monitor>) -> Self {
        Self { inner, monitor }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Runs `op` against the wrapped client. The call is recorded whether it
    /// succeeds or fails; its result is returned untouched.
    pub async fn execute<'a, T, E, F, Fut>(&'a self, statement: &str, op: F) -> Result<T, E>
    where
        F: FnOnce(&'a C) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: RowCount,
    {
        let start = Instant::now();
        let result = op(&self.inner).await;
        self.report(statement, start, &result);
        result
    }

    /// Blocking counterpart of [`execute`](Self::execute).
    pub fn execute_blocking<T, E, F>(&self, statement: &str, op: F) -> Result<T, E>
    where
        F: FnOnce(&C) -> Result<T, E>,
        T: RowCount,
    {
        let start = Instant::now();
        let result = op(&self.inner);
        self.report(statement, start, &result);
        result
    }

    fn report<T: RowCount, E>(&self, statement: &str, start: Instant, result: &Result<T, E>) {
        let duration_ms = elapsed_ms(start);
        let rows = result.as_ref().ok().and_then(RowCount::row_count);
        self.monitor
            .record_datastore(statement, duration_ms, rows, result.is_ok());
    }
}

/// Collapses whitespace runs and caps the length.
pub fn normalize_statement(statement: &str) -> String {
    let collapsed = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(MAX_STATEMENT_CHARS) {
        Some((cut, _)) => collapsed[..cut].to_owned(),
        None => collapsed,
    }
}

/// Leading verb of the statement, upper-cased.
pub fn parse_operation(statement: &str) -> String {
    statement
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_ascii_alphabetic()).to_ascii_uppercase())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| "UNKNOWN".into())
}

/// Best-effort table name: the identifier after the first FROM / INTO /
/// UPDATE / TABLE / JOIN keyword, with quoting stripped.
pub fn parse_table(statement: &str) -> String {
    let mut words = statement.split_whitespace();
    while let Some(word) = words.next() {
        if !TABLE_KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k)) {
            continue;
        }
        let Some(mut candidate) = words.next() else {
            break;
        };
        // CREATE TABLE IF NOT EXISTS foo
        if candidate.eq_ignore_ascii_case("IF") {
            let mut rest = words.by_ref().skip_while(|w| {
                w.eq_ignore_ascii_case("NOT") || w.eq_ignore_ascii_case("EXISTS")
            });
            match rest.next() {
                Some(w) => candidate = w,
                None => break,
            }
        }
        let name: String = candidate
            .chars()
            .take_while(|c| *c != '(' && *c != ',' && *c != ';')
            .filter(|c| !matches!(c, '"' | '`' | '[' | ']'))
            .collect();
        // Sub-selects ("FROM (SELECT ...") have no name here
        if !name.is_empty() {
            return name;
        }
    }
    "unknown".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use std::collections::HashMap;

    #[test]
    fn table_parsing_covers_common_statements() {
        assert_eq!(parse_table("SELECT id FROM users WHERE x = 1"), "users");
        assert_eq!(parse_table("insert into `audit_log`(id) values (1)"), "audit_log");
        assert_eq!(parse_table("UPDATE public.orders SET a = 1"), "public.orders");
        assert_eq!(parse_table("DELETE FROM sessions;"), "sessions");
        assert_eq!(parse_table("CREATE TABLE IF NOT EXISTS \"events\" (id int)"), "events");
        assert_eq!(parse_table("SELECT 1"), "unknown");
    }

    #[test]
    fn operation_is_leading_verb() {
        assert_eq!(parse_operation("select * from t"), "SELECT");
        assert_eq!(parse_operation("  "), "UNKNOWN");
    }

    #[test]
    fn long_statements_are_truncated() {
        let long = format!("SELECT {} FROM t", "x, ".repeat(400));
        assert_eq!(normalize_statement(&long).chars().count(), MAX_STATEMENT_CHARS);
    }

    #[tokio::test]
    async fn failed_query_is_recorded_and_error_returned() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let db = InstrumentedStore::new(HashMap::from([("a", 1u64)]), monitor.clone());

        let ok: Result<u64, String> = db
            .execute("SELECT v FROM kv WHERE k = 'a'", |c| async move {
                c.get("a").copied().ok_or_else(|| "missing".to_string())
            })
            .await;
        assert_eq!(ok, Ok(1));

        let err: Result<u64, String> = db
            .execute("SELECT v FROM kv WHERE k = 'b'", |c| async move {
                c.get("b").copied().ok_or_else(|| "missing".to_string())
            })
            .await;
        assert_eq!(err, Err("missing".to_string()));

        let records = monitor.stores().datastore.snapshot();
        assert_eq!(records.len(), 2);
        assert!(records[0].success);
        assert_eq!(records[0].rows_affected, Some(1));
        assert!(!records[1].success);
        assert_eq!(records[1].rows_affected, None);
        assert_eq!(records[1].table, "kv");
    }

    #[test]
    fn blocking_execute_records_rows() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let db = InstrumentedStore::new(vec![1, 2, 3], monitor.clone());
        let rows: Result<Vec<i32>, ()> =
            db.execute_blocking("SELECT n FROM numbers", |v| Ok(v.clone()));
        assert_eq!(rows.unwrap().len(), 3);
        assert_eq!(monitor.stores().datastore.snapshot()[0].rows_affected, Some(3));
    }
}
