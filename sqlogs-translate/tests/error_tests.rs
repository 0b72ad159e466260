use sqlogs_store::{MemoryTableStore, Provider};
use sqlogs_translate::translate_sql;

fn provider() -> Provider {
    let mut tables = MemoryTableStore::new();
    tables.insert("logs", "*");
    tables.insert("t", "*");
    Provider::new(tables)
}

#[test]
fn unknown_table_lists_available_tables() {
    let err = translate_sql("SELECT * FROM nope", &provider()).expect_err("missing table");
    assert_eq!(err.status_code(), 404);
    let message = format!("{err}");
    assert!(message.contains("table \"nope\" is not configured"), "{message}");
    assert!(message.contains("available: logs, t"), "{message}");
}

#[test]
fn non_select_statements_are_rejected() {
    let err = translate_sql("INSERT INTO t VALUES (1)", &provider()).expect_err("insert");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("unsupported SQL statement"),
        "{err}"
    );
}

#[test]
fn multiple_statements_are_rejected() {
    let err = translate_sql("SELECT 1; SELECT 2", &provider()).expect_err("two statements");
    assert_eq!(err.status_code(), 400);
}

#[test]
fn unparsable_sql_reports_parse_error() {
    let err = translate_sql("SELEC msg FRM logs", &provider()).expect_err("parse error");
    assert_eq!(err.status_code(), 400);
    assert!(format!("{err}").contains("failed to parse SQL"), "{err}");
}

#[test]
fn select_without_from_is_rejected() {
    let err = translate_sql("SELECT 1", &provider()).expect_err("no FROM");
    assert_eq!(err.status_code(), 400);
    assert!(format!("{err}").contains("FROM clause is required"), "{err}");
}

#[test]
fn limit_requires_numeric_literal() {
    let err = translate_sql("SELECT msg FROM logs LIMIT lots", &provider()).expect_err("limit");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("LIMIT expects numeric literal"),
        "{err}"
    );
}

#[test]
fn null_comparison_is_rejected() {
    let err = translate_sql("SELECT msg FROM logs WHERE x = NULL", &provider()).expect_err("null");
    assert_eq!(err.status_code(), 400);
    assert!(format!("{err}").contains("unsupported literal"), "{err}");
}

#[test]
fn in_subquery_is_rejected() {
    let err = translate_sql(
        "SELECT msg FROM logs WHERE host IN (SELECT host FROM t)",
        &provider(),
    )
    .expect_err("in subquery");
    assert_eq!(err.status_code(), 400);
    assert!(format!("{err}").contains("IN subqueries"), "{err}");
}

#[test]
fn string_concat_operator_is_rejected() {
    let err = translate_sql(
        "SELECT msg FROM logs WHERE a || b = 'ab'",
        &provider(),
    )
    .expect_err("string concat");
    assert_eq!(err.status_code(), 400);
}

#[test]
fn star_mixed_with_columns_is_rejected() {
    let err = translate_sql("SELECT *, host FROM logs", &provider()).expect_err("mixed star");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("SELECT * cannot be mixed with other columns"),
        "{err}"
    );
}

#[test]
fn distinct_star_is_rejected() {
    let err = translate_sql("SELECT DISTINCT * FROM logs", &provider()).expect_err("distinct star");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("DISTINCT requires explicit column list"),
        "{err}"
    );
}

#[test]
fn distinct_with_aggregates_is_rejected() {
    let err =
        translate_sql("SELECT DISTINCT COUNT(*) FROM logs", &provider()).expect_err("distinct agg");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("DISTINCT with aggregates"),
        "{err}"
    );
}

#[test]
fn order_by_function_requires_aggregation() {
    let err = translate_sql("SELECT msg FROM logs ORDER BY UPPER(msg)", &provider())
        .expect_err("order by function");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("ORDER BY function requires aggregation"),
        "{err}"
    );
}

#[test]
fn like_requires_string_pattern() {
    let err = translate_sql("SELECT msg FROM logs WHERE msg LIKE 5", &provider())
        .expect_err("numeric like");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("LIKE expects string literal"),
        "{err}"
    );
}

#[test]
fn aggregate_in_where_is_rejected() {
    let err = translate_sql("SELECT msg FROM logs WHERE COUNT(*) > 1", &provider())
        .expect_err("aggregate in where");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("is not supported in this context"),
        "{err}"
    );
}

#[test]
fn multiple_from_tables_are_rejected() {
    let err = translate_sql("SELECT msg FROM logs, t", &provider()).expect_err("cross join");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("multiple base tables"),
        "{err}"
    );
}
