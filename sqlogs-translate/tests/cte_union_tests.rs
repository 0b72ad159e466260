use sqlogs_store::{MemoryTableStore, MemoryViewStore, Provider};
use sqlogs_translate::translate_sql;

fn provider() -> Provider {
    let mut tables = MemoryTableStore::new();
    tables.insert("logs", "*");
    tables.insert("t", "*");
    Provider::new(tables)
}

fn provider_with_views() -> Provider {
    let mut tables = MemoryTableStore::new();
    tables.insert("logs", "*");
    let mut views = MemoryViewStore::new();
    views.insert("recent_errors", "_time:1h | filter level:error");
    Provider::new(tables).with_views(views)
}

#[test]
fn cte_becomes_the_base_pipeline() {
    let logsql = translate_sql(
        "WITH errs AS (SELECT msg FROM logs WHERE level = 'error') SELECT * FROM errs",
        &provider(),
    )
    .expect("translate");
    assert_eq!(logsql, "* | filter level:error | fields msg");
}

#[test]
fn outer_filter_applies_after_cte_pipeline() {
    let logsql = translate_sql(
        "WITH errs AS (SELECT msg, host FROM logs WHERE level = 'error') \
         SELECT * FROM errs WHERE host = 'h1'",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | filter level:error | fields msg, host | filter host:h1"
    );
}

#[test]
fn recursive_ctes_are_rejected() {
    let err = translate_sql(
        "WITH RECURSIVE r AS (SELECT * FROM logs) SELECT * FROM r",
        &provider(),
    )
    .expect_err("recursive");
    assert_eq!(err.status_code(), 400);
    assert!(format!("{err}").contains("recursive CTEs"), "{err}");
}

#[test]
fn duplicate_cte_names_are_rejected() {
    let err = translate_sql(
        "WITH x AS (SELECT * FROM logs), x AS (SELECT * FROM logs) SELECT * FROM x",
        &provider(),
    )
    .expect_err("duplicate cte");
    assert_eq!(err.status_code(), 400);
    assert!(format!("{err}").contains("duplicate CTE name"), "{err}");
}

#[test]
fn subquery_table_becomes_base_pipeline() {
    let logsql = translate_sql(
        "SELECT msg FROM (SELECT msg FROM logs WHERE level = 'e') sub",
        &provider(),
    )
    .expect("translate");
    assert_eq!(logsql, "* | filter level:e | fields msg | fields msg");
}

#[test]
fn union_all_appends_union_pipe() {
    let logsql = translate_sql(
        "SELECT msg FROM logs UNION ALL SELECT msg FROM t",
        &provider(),
    )
    .expect("translate");
    assert_eq!(logsql, "* | fields msg | union (* | fields msg)");
}

#[test]
fn union_all_chains_left_to_right() {
    let logsql = translate_sql(
        "SELECT msg FROM logs UNION ALL SELECT msg FROM t UNION ALL SELECT msg FROM logs",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | fields msg | union (* | fields msg) | union (* | fields msg)"
    );
}

#[test]
fn union_without_all_is_rejected() {
    let err = translate_sql(
        "SELECT msg FROM logs UNION SELECT msg FROM t",
        &provider(),
    )
    .expect_err("union distinct");
    assert_eq!(err.status_code(), 400);
    assert!(format!("{err}").contains("UNION without ALL"), "{err}");
}

#[test]
fn ctes_are_visible_to_union_branches() {
    let logsql = translate_sql(
        "WITH e AS (SELECT msg FROM logs) SELECT msg FROM e UNION ALL SELECT msg FROM e",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | fields msg | fields msg | union (* | fields msg | fields msg)"
    );
}

#[test]
fn views_resolve_to_stored_pipelines() {
    let logsql =
        translate_sql("SELECT * FROM recent_errors", &provider_with_views()).expect("translate");
    assert_eq!(logsql, "_time:1h | filter level:error");
}

#[test]
fn missing_relation_reports_view_not_found_when_views_configured() {
    let err = translate_sql("SELECT * FROM nope", &provider_with_views()).expect_err("missing");
    assert_eq!(err.status_code(), 404);
    assert!(format!("{err}").contains("view nope not found"), "{err}");
}

#[test]
fn cte_shadows_table_of_the_same_name() {
    let logsql = translate_sql(
        "WITH logs AS (SELECT msg FROM t WHERE level = 'x') SELECT * FROM logs",
        &provider(),
    )
    .expect("translate");
    assert_eq!(logsql, "* | filter level:x | fields msg");
}
