use sqlogs_store::{MemoryTableStore, Provider};
use sqlogs_translate::translate_sql;

fn provider() -> Provider {
    let mut tables = MemoryTableStore::new();
    tables.insert("logs", "*");
    tables.insert("t", "*");
    Provider::new(tables)
}

#[test]
fn ordered_comparisons() {
    let cases = [
        ("SELECT x FROM t WHERE x > 5", "* | filter x:>5 | fields x"),
        ("SELECT x FROM t WHERE x >= 5", "* | filter x:>=5 | fields x"),
        ("SELECT x FROM t WHERE x < 5", "* | filter x:<5 | fields x"),
        ("SELECT x FROM t WHERE x <= 5", "* | filter x:<=5 | fields x"),
    ];
    for (sql, expected) in cases {
        assert_eq!(
            translate_sql(sql, &provider()).expect("translate"),
            expected,
            "for {sql}"
        );
    }
}

#[test]
fn inequality_negates_the_clause() {
    let logsql = translate_sql("SELECT x FROM t WHERE x != 'a'", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter -x:a | fields x");
    let logsql = translate_sql("SELECT x FROM t WHERE x <> 'a'", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter -x:a | fields x");
}

#[test]
fn flipped_equality_is_normalized() {
    let logsql = translate_sql("SELECT x FROM t WHERE 'a' = x", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter x:a | fields x");
}

#[test]
fn flipped_ordered_comparison_is_rejected() {
    let err = translate_sql("SELECT x FROM t WHERE 5 < x", &provider()).expect_err("flipped");
    assert_eq!(err.status_code(), 400);
    assert!(format!("{err}").contains("identifier on left side"), "{err}");
}

#[test]
fn boolean_literals_render_bare() {
    let logsql =
        translate_sql("SELECT x FROM t WHERE active = true", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter active:true | fields x");
}

#[test]
fn quoted_literal_with_spaces() {
    let logsql =
        translate_sql("SELECT x FROM t WHERE msg = 'two words'", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter msg:\"two words\" | fields x");
}

#[test]
fn and_or_compose_with_parentheses() {
    let logsql = translate_sql(
        "SELECT x FROM t WHERE a = 1 AND (b = 2 OR c = 3)",
        &provider(),
    )
    .expect("translate");
    assert_eq!(logsql, "* | filter (a:1 AND (b:2 OR c:3)) | fields x");
}

#[test]
fn not_wraps_with_negation() {
    let logsql =
        translate_sql("SELECT x FROM t WHERE NOT level = 'debug'", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter -(level:debug) | fields x");
}

#[test]
fn in_list_renders_or_alternatives() {
    let logsql = translate_sql(
        "SELECT x FROM t WHERE level IN ('warn', 'error')",
        &provider(),
    )
    .expect("translate");
    assert_eq!(logsql, "* | filter level:(warn OR error) | fields x");

    let logsql = translate_sql(
        "SELECT x FROM t WHERE level NOT IN ('warn', 'error')",
        &provider(),
    )
    .expect("translate");
    assert_eq!(logsql, "* | filter -level:(warn OR error) | fields x");
}

#[test]
fn between_renders_range() {
    let logsql =
        translate_sql("SELECT a FROM t WHERE a BETWEEN 1 AND 10", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter a:[1, 10] | fields a");

    let logsql = translate_sql(
        "SELECT a FROM t WHERE a NOT BETWEEN 1 AND 10",
        &provider(),
    )
    .expect("translate");
    assert_eq!(logsql, "* | filter -a:[1, 10] | fields a");
}

#[test]
fn like_prefix_becomes_wildcard() {
    let logsql =
        translate_sql("SELECT x FROM t WHERE x LIKE 'foo%'", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter x:foo* | fields x");
}

#[test]
fn like_suffix_and_contains() {
    let logsql =
        translate_sql("SELECT x FROM t WHERE x LIKE '%foo'", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter x:*foo | fields x");

    let logsql =
        translate_sql("SELECT x FROM t WHERE x NOT LIKE '%foo%'", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter -x:*foo* | fields x");
}

#[test]
fn like_with_underscore_falls_back_to_regex() {
    let logsql =
        translate_sql("SELECT x FROM t WHERE x LIKE 'a_c'", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter x:~\"^a.c$\" | fields x");
}

#[test]
fn is_null_checks_empty_value() {
    let logsql = translate_sql("SELECT x FROM t WHERE x IS NULL", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter x:\"\" | fields x");

    let logsql =
        translate_sql("SELECT x FROM t WHERE x IS NOT NULL", &provider()).expect("translate");
    assert_eq!(logsql, "* | filter x:* | fields x");
}

#[test]
fn field_to_field_comparisons() {
    let cases = [
        ("SELECT x FROM t WHERE a = b", "a:eq_field(b)"),
        ("SELECT x FROM t WHERE a != b", "-a:eq_field(b)"),
        ("SELECT x FROM t WHERE a < b", "a:lt_field(b)"),
        ("SELECT x FROM t WHERE a <= b", "a:le_field(b)"),
        ("SELECT x FROM t WHERE a > b", "-a:le_field(b)"),
        ("SELECT x FROM t WHERE a >= b", "-a:lt_field(b)"),
    ];
    for (sql, clause) in cases {
        assert_eq!(
            translate_sql(sql, &provider()).expect("translate"),
            format!("* | filter {clause} | fields x"),
            "for {sql}"
        );
    }
}

#[test]
fn scalar_function_in_where_synthesizes_scratch_field() {
    let logsql = translate_sql(
        "SELECT msg FROM logs WHERE UPPER(level) = 'ERROR'",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | format \"<uc:level>\" as __filter_expr_1 | filter __filter_expr_1:ERROR \
         | delete __filter_expr_1 | fields msg"
    );
}

#[test]
fn repeated_filter_functions_are_deduplicated() {
    let logsql = translate_sql(
        "SELECT msg FROM logs WHERE UPPER(level) = 'A' OR UPPER(level) = 'B'",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | format \"<uc:level>\" as __filter_expr_1 \
         | filter (__filter_expr_1:A OR __filter_expr_1:B) \
         | delete __filter_expr_1 | fields msg"
    );
}

#[test]
fn distinct_filter_functions_each_get_scratch_fields() {
    let logsql = translate_sql(
        "SELECT msg FROM logs WHERE TRIM(a) = 'x' AND UPPER(b) = 'Y'",
        &provider(),
    )
    .expect("translate");
    assert_eq!(
        logsql,
        "* | extract_regexp '(?s)^\\s*(?P<__filter_expr_1>.*?\\S)?\\s*$' from a \
         | format \"<uc:b>\" as __filter_expr_2 \
         | filter (__filter_expr_1:x AND __filter_expr_2:Y) \
         | delete __filter_expr_1, __filter_expr_2 | fields msg"
    );
}
