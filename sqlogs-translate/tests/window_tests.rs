use sqlogs_store::{MemoryTableStore, Provider};
use sqlogs_translate::translate_sql;

fn provider() -> Provider {
    let mut tables = MemoryTableStore::new();
    tables.insert("t", "*");
    Provider::new(tables)
}

#[test]
fn partitioned_running_sum() {
    let logsql = translate_sql(
        "SELECT host, SUM(bytes) OVER (PARTITION BY host) AS total FROM t",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | running_stats by (host) sum(bytes) as total | fields host, total"
    );
}

#[test]
fn over_order_by_emits_sort_first() {
    let logsql = translate_sql(
        "SELECT SUM(bytes) OVER (PARTITION BY host ORDER BY _time) AS total FROM t",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | sort by (_time) | running_stats by (host) sum(bytes) as total | fields total"
    );
}

#[test]
fn unpartitioned_count_star() {
    let logsql =
        translate_sql("SELECT COUNT(*) OVER () AS n FROM t", &provider()).expect("translate");
    assert_eq!(logsql, "* | running_stats count() as n | fields n");
}

#[test]
fn constant_window_argument_is_materialized() {
    let logsql = translate_sql(
        "SELECT SUM(1) OVER (PARTITION BY host) AS ones FROM t",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | format 1 as __const_1 | running_stats by (host) sum(__const_1) as ones | fields ones"
    );
}

#[test]
fn window_alias_defaults_from_argument() {
    let logsql = translate_sql(
        "SELECT MIN(latency) OVER (PARTITION BY host) FROM t",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | running_stats by (host) min(latency) as min_latency | fields min_latency"
    );
}

#[test]
fn window_functions_reject_group_by() {
    let err = translate_sql(
        "SELECT host, COUNT(*), SUM(x) OVER () FROM t GROUP BY host",
        &provider(),
    )
    .expect_err("window with group");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("window functions are not supported with GROUP BY"),
        "{err}"
    );
}

#[test]
fn unsupported_window_function_is_rejected() {
    let err =
        translate_sql("SELECT AVG(x) OVER () AS a FROM t", &provider()).expect_err("avg window");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("window function AVG is not supported"),
        "{err}"
    );
}

#[test]
fn partition_by_requires_identifiers() {
    let err = translate_sql(
        "SELECT SUM(x) OVER (PARTITION BY host + 1) AS s FROM t",
        &provider(),
    )
    .expect_err("partition expr");
    assert_eq!(err.status_code(), 400);
    assert!(
        format!("{err}").contains("PARTITION BY only supports identifiers"),
        "{err}"
    );
}
