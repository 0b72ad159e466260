//! SELECT-to-pipeline translation: SQL in, LogsQL out.
//!
//! SQL text is parsed with [`sqlparser`]'s `GenericDialect`; the resulting
//! `SELECT` AST is lowered in a single pass into a LogsQL program: a source
//! (a filter expression or an upstream pipeline) followed by `|`-separated
//! pipes. Table, view and CTE names resolve through a
//! [`sqlogs_store::Provider`].
#![forbid(unsafe_code)]

pub type TranslateResult<T> = sqlogs_result::Result<T>;

pub mod jsonpath;
pub mod render;
mod select;

use rustc_hash::FxHashMap;
use sqlogs_result::Error;
use sqlogs_store::Provider;
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Translate a single SQL `SELECT` statement into LogsQL.
pub fn translate_sql(sql: &str, provider: &Provider) -> TranslateResult<String> {
    let dialect = GenericDialect {};
    let mut statements = Parser::parse_sql(&dialect, sql)?;
    if statements.len() != 1 {
        return Err(Error::Unsupported(
            "expected exactly one SQL statement".into(),
        ));
    }
    match statements.remove(0) {
        Statement::Query(query) => translate_query(&query, provider),
        other => Err(Error::Unsupported(format!(
            "unsupported SQL statement: {other}"
        ))),
    }
}

/// Translate an already parsed query AST into LogsQL.
pub fn translate_query(query: &Query, provider: &Provider) -> TranslateResult<String> {
    tracing::debug!(%query, "translating SELECT statement");
    let logsql = select::translate_query_with_ctes(query, provider, &FxHashMap::default())?;
    tracing::debug!(%logsql, "translation complete");
    Ok(logsql)
}
