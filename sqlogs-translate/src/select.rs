//! Single-pass translation of a `SELECT` AST into a LogsQL pipeline.
//!
//! One [`SelectTranslator`] instance owns the state of one `SELECT`
//! translation. Nested selects (CTE bodies, FROM subqueries, UNION branches)
//! recurse through [`translate_query_with_ctes`] with a fresh translator
//! that inherits a read-only snapshot of the CTE registry.
//!
//! Scratch fields synthesized along the way (`__const_*`, `__filter_expr_*`,
//! `group_*`, scalar-function aliases) are either surfaced in the final
//! `fields` projection or removed by a `delete` pipe before the translation
//! returns.

use rustc_hash::{FxHashMap, FxHashSet};
use sqlogs_result::{Error, Result};
use sqlogs_store::Provider;
use sqlparser::ast::{
    BinaryOperator, CeilFloorKind, DateTimeField, Distinct, DuplicateTreatment, Expr, Function,
    FunctionArg, FunctionArgExpr, FunctionArguments, Ident, Join, JoinConstraint, JoinOperator,
    LimitClause, ObjectName, ObjectNamePart, OrderBy, OrderByExpr, OrderByKind, Query, Select,
    SelectItem, SetExpr, SetOperator, SetQuantifier, TableAlias, TableFactor, TableWithJoins,
    TrimWhereField, UnaryOperator, Value, ValueWithSpan, WindowType,
};

use crate::jsonpath::JsonPath;
use crate::render::{
    convert_like_pattern, escape_format_pattern, escape_single_quotes, format_field_name,
    format_string, is_bare_literal, is_format_field,
};

pub(crate) fn translate_query_with_ctes(
    query: &Query,
    provider: &Provider,
    inherited_ctes: &FxHashMap<String, String>,
) -> Result<String> {
    if query.fetch.is_some() {
        return Err(Error::Unsupported("FETCH is not supported".into()));
    }

    let mut ctes = inherited_ctes.clone();
    if let Some(with) = &query.with {
        if with.recursive {
            return Err(Error::Unsupported("recursive CTEs are not supported".into()));
        }
        for cte in &with.cte_tables {
            let name = cte.alias.name.value.trim().to_lowercase();
            if name.is_empty() {
                return Err(Error::Invalid("CTE missing name".into()));
            }
            if ctes.contains_key(&name) {
                return Err(Error::Invalid(format!("duplicate CTE name \"{name}\"")));
            }
            let translated = translate_query_with_ctes(&cte.query, provider, &ctes)
                .map_err(|err| Error::Invalid(format!("failed to translate CTE {name}: {err}")))?;
            tracing::debug!(cte = %name, "registered CTE pipeline");
            ctes.insert(name, translated);
        }
    }

    translate_body(
        &query.body,
        provider,
        &ctes,
        query.order_by.as_ref(),
        query.limit_clause.as_ref(),
    )
}

fn translate_body(
    body: &SetExpr,
    provider: &Provider,
    ctes: &FxHashMap<String, String>,
    order_by: Option<&OrderBy>,
    limit: Option<&LimitClause>,
) -> Result<String> {
    match body {
        SetExpr::Select(select) => {
            SelectTranslator::new(provider, ctes.clone()).translate_simple_select(
                select, order_by, limit,
            )
        }
        SetExpr::Query(inner) => {
            if order_by.is_some() || limit.is_some() {
                return Err(Error::Unsupported(
                    "ORDER BY and LIMIT around a parenthesized query are not supported".into(),
                ));
            }
            translate_query_with_ctes(inner, provider, ctes)
        }
        SetExpr::SetOperation {
            op,
            set_quantifier,
            left,
            right,
        } => {
            if *op != SetOperator::Union {
                return Err(Error::Unsupported(format!(
                    "set operator {op} is not supported"
                )));
            }
            if !matches!(set_quantifier, SetQuantifier::All) {
                return Err(Error::Unsupported(
                    "UNION without ALL is not supported".into(),
                ));
            }
            let base = translate_body(left, provider, ctes, order_by, limit)?;
            let rhs = translate_body(right, provider, ctes, None, None)?;
            Ok(format!("{base} | union ({rhs})"))
        }
        other => Err(Error::Unsupported(format!(
            "unsupported query body {other}"
        ))),
    }
}

// Alias bindings are presence-checked during qualifier resolution; the
// stored metadata documents what each key stands for.
#[allow(dead_code)]
struct TableBinding {
    alias: String,
    is_base: bool,
}

#[derive(Debug, Clone)]
struct TableSpec {
    filter: String,
    pipeline: String,
}

impl TableSpec {
    fn new(expr: &str) -> Self {
        let value = expr.trim();
        if value.is_empty() || value == "*" {
            return TableSpec {
                filter: "*".to_string(),
                pipeline: String::new(),
            };
        }
        if value.contains('|') {
            return TableSpec {
                filter: String::new(),
                pipeline: value.to_string(),
            };
        }
        TableSpec {
            filter: value.to_string(),
            pipeline: String::new(),
        }
    }
}

struct FilterComputation {
    alias: String,
    pipes: Vec<String>,
}

struct AggItem {
    key: String,
    stats_call: String,
    result_name: String,
    pre_pipes: Vec<String>,
    selected: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Comparison {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

#[derive(Clone, Copy, PartialEq)]
enum LiteralKind {
    String,
    Number,
    Boolean,
}

struct LiteralValue {
    kind: LiteralKind,
    value: String,
}

impl LiteralValue {
    fn format(&self) -> String {
        match self.kind {
            LiteralKind::String => format_string(&self.value),
            LiteralKind::Number | LiteralKind::Boolean => self.value.clone(),
        }
    }
}

enum FuncArg<'a> {
    Star,
    Expr(&'a Expr),
}

#[derive(Clone, Copy, PartialEq)]
enum JoinKind {
    Inner,
    Left,
}

struct SelectTranslator<'a> {
    provider: &'a Provider,
    available_ctes: FxHashMap<String, String>,

    bindings: FxHashMap<String, TableBinding>,
    auto_alias_counter: usize,
    base_alias: String,
    base_uses_pipeline: bool,
    base_pipeline: String,
    base_filter: String,
    pending_left_filter: Vec<Expr>,

    // Scalar functions referenced by WHERE/ON, materialized before the
    // filter pipe and deleted right after it.
    filter_computations: FxHashMap<String, FilterComputation>,
    filter_order: Vec<String>,
    filter_delete: Vec<String>,
    filter_delete_set: FxHashSet<String>,

    constant_fields: FxHashMap<String, String>,
    constant_field_count: usize,

    // Populated by the stats builder; `Some` marks the aggregated context
    // that HAVING and ORDER BY resolve aggregate references against.
    agg_results: Option<FxHashMap<String, String>>,
    agg_temp_deletes: FxHashMap<String, String>,
    agg_preserve: FxHashSet<String>,
    group_expr_aliases: Option<FxHashMap<String, String>>,
}

impl<'a> SelectTranslator<'a> {
    fn new(provider: &'a Provider, available_ctes: FxHashMap<String, String>) -> Self {
        SelectTranslator {
            provider,
            available_ctes,
            bindings: FxHashMap::default(),
            auto_alias_counter: 0,
            base_alias: String::new(),
            base_uses_pipeline: false,
            base_pipeline: String::new(),
            base_filter: String::new(),
            pending_left_filter: Vec::new(),
            filter_computations: FxHashMap::default(),
            filter_order: Vec::new(),
            filter_delete: Vec::new(),
            filter_delete_set: FxHashSet::default(),
            constant_fields: FxHashMap::default(),
            constant_field_count: 0,
            agg_results: None,
            agg_temp_deletes: FxHashMap::default(),
            agg_preserve: FxHashSet::default(),
            group_expr_aliases: None,
        }
    }

    fn translate_simple_select(
        mut self,
        select: &Select,
        order_by: Option<&OrderBy>,
        limit: Option<&LimitClause>,
    ) -> Result<String> {
        let distinct = match &select.distinct {
            None => false,
            Some(Distinct::Distinct) => true,
            Some(_) => {
                return Err(Error::Unsupported("DISTINCT ON is not supported".into()));
            }
        };

        let order_items = order_items(order_by)?;
        let join_pipes = self.process_from(&select.from)?;

        let mut filters: Vec<String> = Vec::new();
        if let Some(where_expr) = &select.selection {
            self.ensure_base_aliases_only(where_expr)?;
            filters.push(self.translate_expr(where_expr)?);
        }
        let pending = std::mem::take(&mut self.pending_left_filter);
        for left_filter in &pending {
            self.ensure_base_aliases_only(left_filter)?;
            filters.push(self.translate_expr(left_filter)?);
        }

        let filter = match filters.len() {
            0 => "*".to_string(),
            1 => filters.swap_remove(0),
            _ => format!("({})", filters.join(" AND ")),
        };

        let base = if self.base_uses_pipeline {
            self.base_pipeline.clone()
        } else {
            let base_filter = self.base_filter.trim();
            if base_filter.is_empty() {
                "*".to_string()
            } else {
                base_filter.to_string()
            }
        };

        let mut pipes: Vec<String> = Vec::new();
        pipes.extend(self.collect_filter_prefilters());
        if filter != "*" {
            pipes.push(format!("filter {filter}"));
        }
        pipes.extend(self.collect_filter_cleanup());
        pipes.extend(join_pipes);

        let having = select.having.as_ref();
        let (stats_pipes, aggregated) = self.build_stats_pipe(select, having)?;
        pipes.extend(stats_pipes);

        if let Some(having_expr) = having {
            if !aggregated {
                return Err(Error::Invalid(
                    "HAVING requires GROUP BY with aggregates".into(),
                ));
            }
            let having_str = self.translate_expr(having_expr)?;
            pipes.push(format!("filter {having_str}"));
            if !self.agg_temp_deletes.is_empty() {
                for item in order_items {
                    let Expr::Function(func) = unwrap_nested(&item.expr) else {
                        continue;
                    };
                    if !is_aggregate_function(func) {
                        continue;
                    }
                    let key = self.aggregate_key_from_func(func)?;
                    self.agg_preserve.insert(key);
                }
                let mut keys: Vec<&String> = self
                    .agg_temp_deletes
                    .keys()
                    .filter(|key| !self.agg_preserve.contains(*key))
                    .collect();
                keys.sort();
                if !keys.is_empty() {
                    let delete_vals: Vec<&str> = keys
                        .iter()
                        .filter_map(|key| self.agg_temp_deletes.get(*key))
                        .map(String::as_str)
                        .collect();
                    pipes.push(format!("delete {}", delete_vals.join(", ")));
                }
            }
        }

        let (projection_pipes, projection_fields) =
            self.build_projection_pipes(&select.projection, aggregated)?;
        pipes.extend(projection_pipes);

        if distinct {
            pipes.push(self.build_distinct_pipe(&projection_fields, aggregated)?);
        }

        if !order_items.is_empty() {
            pipes.push(self.translate_order_by(order_items, aggregated)?);
        }

        if let Some(limit_clause) = limit {
            pipes.extend(self.translate_limit(limit_clause)?);
        }

        if pipes.is_empty() {
            return Ok(base);
        }
        Ok(format!("{} | {}", base, pipes.join(" | ")))
    }

    fn collect_filter_prefilters(&self) -> Vec<String> {
        let mut pipes = Vec::new();
        for key in &self.filter_order {
            if let Some(comp) = self.filter_computations.get(key) {
                pipes.extend(comp.pipes.iter().cloned());
            }
        }
        pipes
    }

    fn collect_filter_cleanup(&self) -> Vec<String> {
        if self.filter_delete.is_empty() {
            return Vec::new();
        }
        vec![format!("delete {}", self.filter_delete.join(", "))]
    }

    fn build_distinct_pipe(&self, fields: &[String], aggregated: bool) -> Result<String> {
        if aggregated {
            return Err(Error::Unsupported(
                "DISTINCT with aggregates is not supported".into(),
            ));
        }
        if fields.is_empty() {
            return Err(Error::Invalid(
                "DISTINCT requires explicit column list".into(),
            ));
        }
        Ok(format!("uniq by ({})", fields.join(", ")))
    }

    // ---- FROM / JOIN ----

    fn process_from(&mut self, from: &[TableWithJoins]) -> Result<Vec<String>> {
        let item = match from {
            [] => return Err(Error::Invalid("FROM clause is required".into())),
            [item] => item,
            _ => {
                return Err(Error::Unsupported(
                    "multiple base tables are not supported".into(),
                ));
            }
        };
        match item.joins.as_slice() {
            [] => {
                self.register_base_relation(&item.relation)?;
                Ok(Vec::new())
            }
            [join] => self.process_join(&item.relation, join),
            _ => Err(Error::Unsupported(
                "multiple JOIN clauses are not supported".into(),
            )),
        }
    }

    fn register_base_relation(&mut self, relation: &TableFactor) -> Result<()> {
        match relation {
            TableFactor::Table { name, alias, .. } => {
                self.register_base_table(name, alias.as_ref())
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
            } => {
                if *lateral {
                    return Err(Error::Unsupported(
                        "LATERAL subqueries are not supported".into(),
                    ));
                }
                self.register_base_subquery(subquery, alias.as_ref())
            }
            other => Err(Error::Unsupported(format!(
                "unsupported FROM clause {other}"
            ))),
        }
    }

    fn register_base_table(&mut self, name: &ObjectName, alias: Option<&TableAlias>) -> Result<()> {
        let parts = object_name_parts(name)?;
        let table_name = parts[parts.len() - 1].clone();
        let name_lower = table_name.to_lowercase();

        let alias_text = alias
            .map(|a| a.name.value.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| table_name.clone());
        let alias_lower = alias_text.to_lowercase();

        if !self.base_alias.is_empty() && self.base_alias != alias_lower {
            return Err(Error::Unsupported(
                "multiple base tables are not supported".into(),
            ));
        }

        if let Some(query) = self.available_ctes.get(&name_lower).cloned() {
            self.base_alias = alias_lower.clone();
            self.base_uses_pipeline = true;
            self.base_pipeline = query;
            self.register_binding(&alias_lower, true);
            self.register_binding(&name_lower, true);
            return Ok(());
        }

        let mut view_attempted = false;
        if let Some(view_store) = self.provider.view_store() {
            view_attempted = true;
            if let Some(view) = view_store.load(&parts)? {
                self.base_alias = alias_lower.clone();
                self.base_uses_pipeline = true;
                self.base_pipeline = view.query;
                self.base_filter.clear();
                self.register_binding(&alias_lower, true);
                self.register_binding(&name_lower, true);
                return Ok(());
            }
        }

        match self.lookup_table_spec(&name_lower) {
            Some(spec) => {
                self.base_alias = alias_lower.clone();
                self.base_filter = spec.filter;
                self.base_uses_pipeline = !spec.pipeline.is_empty();
                self.base_pipeline = spec.pipeline;
                self.register_binding(&alias_lower, true);
                self.register_binding(&name_lower, true);
                Ok(())
            }
            None => Err(self.relation_not_found(&parts, view_attempted, false)),
        }
    }

    fn relation_not_found(&self, parts: &[String], view_attempted: bool, joined: bool) -> Error {
        if view_attempted {
            return Error::NotFound(format!("view {} not found", parts.join(".")));
        }
        let available = self.provider.table_store().list();
        let kind = if joined { "JOIN table" } else { "table" };
        Error::NotFound(format!(
            "{kind} \"{}\" is not configured (available: {})",
            parts.join("."),
            available.join(", ")
        ))
    }

    fn register_base_subquery(
        &mut self,
        subquery: &Query,
        alias: Option<&TableAlias>,
    ) -> Result<()> {
        let alias_text = alias
            .map(|a| a.name.value.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| self.generate_subquery_alias("base"));
        let alias_lower = alias_text.to_lowercase();

        if !self.base_alias.is_empty() && self.base_alias != alias_lower {
            return Err(Error::Unsupported(
                "multiple base tables are not supported".into(),
            ));
        }

        let sub_query = translate_query_with_ctes(subquery, self.provider, &self.available_ctes)
            .map_err(|err| Error::Invalid(format!("failed to translate subquery: {err}")))?;

        self.base_alias = alias_lower.clone();
        self.base_uses_pipeline = true;
        self.base_pipeline = sub_query;
        self.base_filter.clear();
        self.register_binding(&alias_lower, true);
        Ok(())
    }

    fn register_binding(&mut self, alias: &str, is_base: bool) {
        let key = alias.to_lowercase();
        if key.is_empty() {
            return;
        }
        self.bindings.insert(
            key.clone(),
            TableBinding {
                alias: key,
                is_base,
            },
        );
    }

    fn generate_subquery_alias(&mut self, prefix: &str) -> String {
        let mut base = prefix.trim().to_lowercase();
        if base.is_empty() {
            base = "subquery".to_string();
        }
        loop {
            self.auto_alias_counter += 1;
            let candidate = format!("__{}_{}", base, self.auto_alias_counter);
            if !self.bindings.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn lookup_table_spec(&self, name_lower: &str) -> Option<TableSpec> {
        let expr = self.provider.table_store().get(name_lower)?;
        Some(TableSpec::new(&expr))
    }

    fn process_join(&mut self, left: &TableFactor, join: &Join) -> Result<Vec<String>> {
        let (join_kind, constraint) = match &join.join_operator {
            JoinOperator::Inner(constraint) | JoinOperator::Join(constraint) => {
                (JoinKind::Inner, constraint)
            }
            JoinOperator::Left(constraint) | JoinOperator::LeftOuter(constraint) => {
                (JoinKind::Left, constraint)
            }
            _ => {
                return Err(Error::Unsupported(
                    "only INNER and LEFT JOIN are supported".into(),
                ));
            }
        };

        match left {
            TableFactor::Table { name, alias, .. } => {
                self.register_base_table(name, alias.as_ref())?;
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
            } => {
                if *lateral {
                    return Err(Error::Unsupported(
                        "LATERAL subqueries are not supported".into(),
                    ));
                }
                self.register_base_subquery(subquery, alias.as_ref())?;
            }
            _ => {
                return Err(Error::Unsupported(
                    "JOIN left side must be a table reference".into(),
                ));
            }
        }

        let right_alias: String;
        let mut right_query = String::new();
        let mut right_simple = false;
        let mut right_base_filters: Vec<String> = Vec::new();

        match &join.relation {
            TableFactor::Table { name, alias, .. } => {
                let parts = object_name_parts(name)?;
                let table_name = parts[parts.len() - 1].clone();
                let name_lower = table_name.to_lowercase();
                let alias_text = alias
                    .as_ref()
                    .map(|a| a.name.value.trim().to_string())
                    .filter(|a| !a.is_empty());
                let effective_alias = alias_text.clone().unwrap_or_else(|| table_name.clone());
                right_alias = effective_alias.to_lowercase();
                if self.bindings.contains_key(&right_alias) {
                    return Err(Error::Invalid(format!(
                        "duplicate table alias \"{effective_alias}\""
                    )));
                }

                if let Some(query) = self.available_ctes.get(&name_lower).cloned() {
                    right_query = query;
                    self.register_binding(&right_alias, false);
                    self.register_binding(&name_lower, false);
                } else {
                    let mut view_attempted = false;
                    let mut resolved_view = false;
                    if let Some(view_store) = self.provider.view_store() {
                        view_attempted = true;
                        if let Some(view) = view_store.load(&parts)? {
                            right_query = view.query;
                            self.register_binding(&right_alias, false);
                            self.register_binding(&name_lower, false);
                            resolved_view = true;
                        }
                    }
                    if !resolved_view {
                        let Some(spec) = self.lookup_table_spec(&name_lower) else {
                            return Err(self.relation_not_found(&parts, view_attempted, true));
                        };
                        if alias_text.is_none() {
                            return Err(Error::Invalid("JOINed table requires alias".into()));
                        }
                        self.register_binding(&right_alias, false);
                        self.register_binding(&name_lower, false);
                        if !spec.pipeline.is_empty() {
                            right_query = spec.pipeline;
                        } else {
                            right_simple = true;
                            if !spec.filter.is_empty() && spec.filter != "*" {
                                right_base_filters.push(spec.filter);
                            }
                        }
                    }
                }
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
            } => {
                if *lateral {
                    return Err(Error::Unsupported(
                        "LATERAL subqueries are not supported".into(),
                    ));
                }
                let alias_text = alias
                    .as_ref()
                    .map(|a| a.name.value.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| self.generate_subquery_alias("join"));
                right_alias = alias_text.to_lowercase();
                if self.bindings.contains_key(&right_alias) {
                    return Err(Error::Invalid(format!(
                        "duplicate table alias \"{alias_text}\""
                    )));
                }
                self.register_binding(&right_alias, false);
                right_query =
                    translate_query_with_ctes(subquery, self.provider, &self.available_ctes)
                        .map_err(|err| {
                            Error::Invalid(format!("failed to translate JOIN subquery: {err}"))
                        })?;
            }
            other => {
                return Err(Error::Unsupported(format!(
                    "unsupported JOIN right side {other}"
                )));
            }
        }

        let on_expr = match constraint {
            JoinConstraint::On(expr) => expr,
            _ => return Err(Error::Invalid("JOIN must include ON clause".into())),
        };

        let (join_keys, left_filters, right_filters) =
            self.extract_join_spec(on_expr, &right_alias)?;
        if join_keys.is_empty() {
            return Err(Error::Invalid(
                "JOIN requires equality condition between tables".into(),
            ));
        }

        self.pending_left_filter
            .extend(left_filters.into_iter().cloned());

        let mut parts: Vec<String> = right_base_filters;
        for expr in right_filters {
            let mut allowed = FxHashSet::default();
            allowed.insert(right_alias.clone());
            self.ensure_aliases(expr, &allowed)?;
            parts.push(self.translate_expr(expr)?);
        }
        let combined = match parts.len() {
            0 => "*".to_string(),
            1 => parts.swap_remove(0),
            _ => format!("({})", parts.join(" AND ")),
        };
        if right_simple {
            right_query = combined;
        } else if combined != "*" {
            right_query = format!("{right_query} | filter {combined}");
        }

        let suffix = if join_kind == JoinKind::Inner {
            " inner"
        } else {
            ""
        };
        Ok(vec![format!(
            "join by ({}) ({}){}",
            join_keys.join(", "),
            right_query,
            suffix
        )])
    }

    fn extract_join_spec<'e>(
        &self,
        on: &'e Expr,
        right_alias: &str,
    ) -> Result<(Vec<String>, Vec<&'e Expr>, Vec<&'e Expr>)> {
        let conjuncts = flatten_and(on);
        let mut join_keys: Vec<String> = Vec::new();
        let mut left_filters: Vec<&Expr> = Vec::new();
        let mut right_filters: Vec<&Expr> = Vec::new();

        for conjunct in conjuncts {
            let Expr::BinaryOp { left, op, right } = conjunct else {
                return Err(Error::Unsupported(format!(
                    "unsupported JOIN condition {conjunct}"
                )));
            };

            if matches!(op, BinaryOperator::Eq) {
                if let (Some(left_parts), Some(right_parts)) =
                    (identifier_parts(left), identifier_parts(right))
                {
                    let left_qual = self.qualifier_with_default(&left_parts, &self.base_alias);
                    let right_qual = self.qualifier_with_default(&right_parts, right_alias);
                    let straight = left_qual == self.base_alias && right_qual == right_alias;
                    let swapped = left_qual == right_alias && right_qual == self.base_alias;
                    if straight || swapped {
                        let left_field = self.normalize_identifier(&left_parts)?;
                        let right_field = self.normalize_identifier(&right_parts)?;
                        if left_field != right_field {
                            return Err(Error::Invalid(format!(
                                "JOIN keys must use identical field names ({left_field} vs {right_field})"
                            )));
                        }
                        join_keys.push(left_field);
                        continue;
                    }
                }
            }

            let left_aliases = self.aliases_for_expr_with_default(left, &self.base_alias);
            let right_aliases = self.aliases_for_expr_with_default(right, right_alias);

            if is_alias_only(&left_aliases, &self.base_alias) && right_aliases.is_empty() {
                left_filters.push(conjunct);
                continue;
            }
            if is_alias_only(&right_aliases, &self.base_alias) && left_aliases.is_empty() {
                left_filters.push(conjunct);
                continue;
            }
            if is_alias_only(&left_aliases, right_alias) && right_aliases.is_empty() {
                right_filters.push(conjunct);
                continue;
            }
            if is_alias_only(&right_aliases, right_alias) && left_aliases.is_empty() {
                right_filters.push(conjunct);
                continue;
            }
            if is_alias_only(&left_aliases, &self.base_alias)
                && is_alias_only(&right_aliases, right_alias)
            {
                return Err(Error::Unsupported(format!(
                    "JOIN condition {conjunct} must be simple equality between tables"
                )));
            }
            return Err(Error::Unsupported(format!(
                "unsupported JOIN condition {conjunct}"
            )));
        }

        Ok((join_keys, left_filters, right_filters))
    }

    // ---- identifier and alias resolution ----

    fn qualifier_with_default(&self, parts: &[&Ident], fallback: &str) -> String {
        let Some(first) = parts.first() else {
            return fallback.to_string();
        };
        let first = first.value.to_lowercase();
        if self.bindings.contains_key(&first) {
            first
        } else {
            fallback.to_string()
        }
    }

    fn aliases_for_expr_with_default(&self, expr: &Expr, fallback: &str) -> FxHashSet<String> {
        let mut aliases = FxHashSet::default();
        walk_expr(expr, &mut |e| {
            if let Some(parts) = identifier_parts(e) {
                aliases.insert(self.qualifier_with_default(&parts, fallback));
            }
        });
        aliases.remove("");
        aliases
    }

    fn ensure_base_aliases_only(&self, expr: &Expr) -> Result<()> {
        let mut allowed = FxHashSet::default();
        allowed.insert(self.base_alias.clone());
        self.ensure_aliases(expr, &allowed)
    }

    fn ensure_aliases(&self, expr: &Expr, allowed: &FxHashSet<String>) -> Result<()> {
        let fallback = match allowed.iter().next() {
            Some(alias) if allowed.len() == 1 => alias.clone(),
            _ => self.base_alias.clone(),
        };
        for alias in self.aliases_for_expr_with_default(expr, &fallback) {
            if alias.is_empty() {
                continue;
            }
            if !allowed.contains(&alias) {
                return Err(Error::Invalid(format!(
                    "expression references unsupported alias \"{alias}\""
                )));
            }
        }
        Ok(())
    }

    fn normalize_identifier(&self, parts: &[&Ident]) -> Result<String> {
        if parts.is_empty() {
            return Err(Error::Invalid("invalid identifier".into()));
        }
        let mut names: Vec<&str> = parts.iter().map(|p| p.value.as_str()).collect();
        if names.len() > 1 {
            let first = names[0].to_lowercase();
            if self.bindings.contains_key(&first) {
                names.remove(0);
            }
        }
        let field = names.join(".");
        if field.is_empty() {
            return Err(Error::Invalid("invalid identifier".into()));
        }
        Ok(format_field_name(&field))
    }

    /// Like [`Self::normalize_identifier`], but restricted to the
    /// format-field class since the result is embedded in `format` patterns
    /// and regexp bodies.
    fn raw_field_name(&self, parts: &[&Ident]) -> Result<String> {
        if parts.is_empty() {
            return Err(Error::Invalid("invalid identifier".into()));
        }
        let mut names: Vec<&str> = parts.iter().map(|p| p.value.as_str()).collect();
        if names.len() > 1 {
            let first = names[0].to_lowercase();
            if self.bindings.contains_key(&first) {
                names.remove(0);
            }
        }
        let field = names.join(".");
        if !is_format_field(&field) {
            return Err(Error::Invalid(format!(
                "field {field} cannot be used in scalar function"
            )));
        }
        Ok(field)
    }

    // ---- expression translation (WHERE / ON / HAVING atoms) ----

    fn translate_expr(&mut self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Nested(inner) => self.translate_expr(inner),
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And | BinaryOperator::Or => {
                    let word = if matches!(op, BinaryOperator::And) {
                        "AND"
                    } else {
                        "OR"
                    };
                    let left_str = self.translate_expr(left)?;
                    let right_str = self.translate_expr(right)?;
                    Ok(format!("({left_str} {word} {right_str})"))
                }
                BinaryOperator::Eq => self.translate_comparison(left, right, Comparison::Equal),
                BinaryOperator::NotEq => {
                    self.translate_comparison(left, right, Comparison::NotEqual)
                }
                BinaryOperator::Gt => self.translate_comparison(left, right, Comparison::Greater),
                BinaryOperator::GtEq => {
                    self.translate_comparison(left, right, Comparison::GreaterEqual)
                }
                BinaryOperator::Lt => self.translate_comparison(left, right, Comparison::Less),
                BinaryOperator::LtEq => {
                    self.translate_comparison(left, right, Comparison::LessEqual)
                }
                other => Err(Error::Unsupported(format!(
                    "unsupported operator \"{other}\""
                ))),
            },
            Expr::UnaryOp { op, expr: inner } => {
                if matches!(op, UnaryOperator::Not) {
                    let inner_str = self.translate_expr(inner)?;
                    Ok(format!("-({inner_str})"))
                } else {
                    Err(Error::Unsupported(format!(
                        "unsupported unary operator \"{op}\""
                    )))
                }
            }
            Expr::InList {
                expr: inner,
                list,
                negated,
            } => self.translate_in_list(inner, list, *negated),
            Expr::InSubquery { .. } => Err(Error::Unsupported(
                "IN subqueries are not supported yet".into(),
            )),
            Expr::Between {
                expr: inner,
                negated,
                low,
                high,
            } => self.translate_between(inner, low, high, *negated),
            Expr::Like {
                negated,
                any,
                expr: inner,
                pattern,
                escape_char,
                ..
            } => {
                if *any {
                    return Err(Error::Unsupported("LIKE ANY is not supported".into()));
                }
                if escape_char.is_some() {
                    return Err(Error::Unsupported("LIKE ESCAPE is not supported".into()));
                }
                self.translate_like(inner, pattern, *negated)
            }
            Expr::IsNull(inner) => {
                let field = self.filter_field_from_expr(inner)?;
                Ok(format!("{field}:\"\""))
            }
            Expr::IsNotNull(inner) => {
                let field = self.filter_field_from_expr(inner)?;
                Ok(format!("{field}:*"))
            }
            Expr::Function(func) => {
                if self.agg_results.is_some() {
                    let key = self.aggregate_key_from_func(func)?;
                    if let Some(name) = self.agg_results.as_ref().and_then(|m| m.get(&key)) {
                        return Ok(format_field_name(name));
                    }
                }
                Err(Error::Unsupported(
                    "unsupported function expression in filter".into(),
                ))
            }
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                let parts = identifier_parts(expr)
                    .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                self.normalize_identifier(&parts)
            }
            Expr::Value(value) => translate_value(value),
            other => Err(Error::Unsupported(format!(
                "unsupported expression {other}"
            ))),
        }
    }

    fn translate_comparison(&mut self, left: &Expr, right: &Expr, cmp: Comparison) -> Result<String> {
        let left_field = self.field_name_from_expr(left)?;
        let right_field = self.field_name_from_expr(right)?;
        match (left_field, right_field) {
            (Some(left_name), Some(right_name)) => field_comparison(&left_name, &right_name, cmp),
            (Some(left_name), None) => {
                let lit = literal_from_expr(right)?;
                field_literal_comparison(&left_name, &lit, false, cmp)
            }
            (None, Some(right_name)) => {
                let lit = literal_from_expr(left)?;
                field_literal_comparison(&right_name, &lit, true, cmp)
            }
            (None, None) => Err(Error::Invalid(
                "comparison requires identifier and literal".into(),
            )),
        }
    }

    fn translate_in_list(&mut self, expr: &Expr, list: &[Expr], negated: bool) -> Result<String> {
        let field = self.filter_field_from_expr(expr)?;
        if list.is_empty() {
            return Err(Error::Invalid("IN list cannot be empty".into()));
        }
        let mut values = Vec::with_capacity(list.len());
        for item in list {
            values.push(literal_from_expr(item)?.format());
        }
        let clause = format!("{field}:({})", values.join(" OR "));
        Ok(if negated { format!("-{clause}") } else { clause })
    }

    fn translate_between(
        &mut self,
        expr: &Expr,
        low: &Expr,
        high: &Expr,
        negated: bool,
    ) -> Result<String> {
        let field = self.filter_field_from_expr(expr)?;
        let lower = literal_from_expr(low)?;
        let upper = literal_from_expr(high)?;
        let clause = format!("{field}:[{}, {}]", lower.format(), upper.format());
        Ok(if negated { format!("-{clause}") } else { clause })
    }

    fn translate_like(&mut self, expr: &Expr, pattern: &Expr, negated: bool) -> Result<String> {
        let field = self.filter_field_from_expr(expr)?;
        let lit = literal_from_expr(pattern)?;
        if lit.kind != LiteralKind::String {
            return Err(Error::Invalid("LIKE expects string literal".into()));
        }
        let translated = convert_like_pattern(&lit.value);
        let clause = format!("{field}:{translated}");
        Ok(if negated { format!("-{clause}") } else { clause })
    }

    fn filter_field_from_expr(&mut self, expr: &Expr) -> Result<String> {
        match self.field_name_from_expr(expr)? {
            Some(field) => Ok(field),
            None => Err(Error::Invalid(format!("expected identifier, got {expr}"))),
        }
    }

    /// Classify an operand as a field reference, yielding its rendered name.
    /// Scalar functions referenced outside an aggregated context synthesize
    /// a `__filter_expr_N` scratch alias; inside one they resolve through
    /// the stats results or the GROUP BY expression table.
    fn field_name_from_expr(&mut self, expr: &Expr) -> Result<Option<String>> {
        match expr {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                let parts = identifier_parts(expr)
                    .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                Ok(Some(self.normalize_identifier(&parts)?))
            }
            Expr::Function(func) => {
                if self.agg_results.is_some() {
                    if is_aggregate_function(func) {
                        let key = self.aggregate_key_from_func(func)?;
                        match self.agg_results.as_ref().and_then(|m| m.get(&key)) {
                            Some(name) => Ok(Some(format_field_name(name))),
                            None => Err(Error::Invalid("unknown aggregate referenced".into())),
                        }
                    } else if let Some(group_field) = self.lookup_group_expr(expr) {
                        Ok(Some(format_field_name(&group_field)))
                    } else {
                        Err(Error::Unsupported(format!(
                            "function {expr} is not supported in aggregated context"
                        )))
                    }
                } else {
                    Ok(Some(self.ensure_filter_function_alias(expr)?))
                }
            }
            Expr::Trim { .. } | Expr::Substring { .. } => {
                if self.agg_results.is_some() {
                    if let Some(group_field) = self.lookup_group_expr(expr) {
                        Ok(Some(format_field_name(&group_field)))
                    } else {
                        Err(Error::Unsupported(format!(
                            "function {expr} is not supported in aggregated context"
                        )))
                    }
                } else {
                    Ok(Some(self.ensure_filter_function_alias(expr)?))
                }
            }
            _ => Ok(None),
        }
    }

    fn ensure_filter_function_alias(&mut self, expr: &Expr) -> Result<String> {
        if let Expr::Function(func) = expr {
            if is_aggregate_function(func) {
                return Err(Error::Unsupported(format!(
                    "aggregate function {} is not supported in this context",
                    function_name(func)?.to_lowercase()
                )));
            }
        }
        let key = expr.to_string();
        if let Some(comp) = self.filter_computations.get(&key) {
            return Ok(comp.alias.clone());
        }
        let alias_base = format!("__filter_expr_{}", self.filter_order.len() + 1);
        let Some((pipes, alias_name)) = self.translate_string_function(expr, &alias_base)? else {
            let name = match expr {
                Expr::Function(func) => function_name(func)?.to_lowercase(),
                other => other.to_string(),
            };
            return Err(Error::Unsupported(format!(
                "function {name} is not supported in filter"
            )));
        };
        let formatted = format_field_name(&alias_name);
        self.filter_computations.insert(
            key.clone(),
            FilterComputation {
                alias: formatted.clone(),
                pipes,
            },
        );
        self.filter_order.push(key);
        if self.filter_delete_set.insert(alias_name.clone()) {
            self.filter_delete.push(alias_name);
        }
        Ok(formatted)
    }

    // ---- aggregation & grouping ----

    fn build_stats_pipe(
        &mut self,
        select: &Select,
        having: Option<&Expr>,
    ) -> Result<(Vec<String>, bool)> {
        let group_exprs: &[Expr] = match &select.group_by {
            sqlparser::ast::GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    return Err(Error::Unsupported(
                        "GROUP BY modifiers are not supported".into(),
                    ));
                }
                exprs
            }
            sqlparser::ast::GroupByExpr::All(_) => {
                return Err(Error::Unsupported("GROUP BY ALL is not supported".into()));
            }
        };
        let has_group = !group_exprs.is_empty();

        let mut aggregates: Vec<AggItem> = Vec::new();
        let mut agg_index: FxHashMap<String, usize> = FxHashMap::default();
        let mut group_fields: Vec<String> = Vec::new();
        let mut group_lookup: FxHashSet<String> = FxHashSet::default();
        let mut pre_group_pipes: Vec<String> = Vec::new();
        let alias_sources = collect_group_aliases(&select.projection);

        if has_group {
            let mut group_aliases: FxHashMap<String, String> = FxHashMap::default();
            for (index, expr) in group_exprs.iter().enumerate() {
                let resolved = unwrap_nested(resolve_group_by_alias(expr, &alias_sources));
                let expr_key = resolved.to_string();
                if let Some(existing) = group_aliases.get(&expr_key) {
                    group_fields.push(existing.clone());
                    group_lookup.insert(existing.clone());
                    continue;
                }
                let (field_name, pipes) = self.prepare_group_by_field(resolved, index)?;
                group_fields.push(field_name.clone());
                group_lookup.insert(field_name.clone());
                pre_group_pipes.extend(pipes);
                group_aliases.insert(expr_key, field_name);
            }
            self.group_expr_aliases = Some(group_aliases);
        } else {
            self.group_expr_aliases = None;
        }

        for item in &select.projection {
            let (expr, alias) = match item {
                SelectItem::Wildcard(_) => {
                    if select.projection.len() > 1 {
                        return Err(Error::Invalid(
                            "SELECT * cannot be mixed with other columns".into(),
                        ));
                    }
                    if has_group {
                        return Err(Error::Invalid(
                            "SELECT * not supported with GROUP BY".into(),
                        ));
                    }
                    return Ok((Vec::new(), false));
                }
                SelectItem::QualifiedWildcard(..) => {
                    return Err(Error::Unsupported(
                        "qualified wildcard projections are not supported".into(),
                    ));
                }
                SelectItem::UnnamedExpr(expr) => (expr, None),
                SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias)),
            };
            match unwrap_nested(expr) {
                Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                    if !has_group {
                        continue;
                    }
                    let inner = unwrap_nested(expr);
                    let parts = identifier_parts(inner)
                        .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                    let field = self.normalize_identifier(&parts)?;
                    if !group_lookup.contains(&field) {
                        let mut label = field;
                        if let Some(alias) = alias {
                            label.push_str(&format!(
                                " (with alias: {})",
                                format_field_name(alias.value.trim())
                            ));
                        }
                        return Err(Error::Invalid(format!(
                            "column {label} must appear in GROUP BY"
                        )));
                    }
                }
                Expr::Function(func) => {
                    if func.over.is_some() {
                        if has_group {
                            return Err(Error::Unsupported(
                                "window functions are not supported with GROUP BY".into(),
                            ));
                        }
                        continue;
                    }
                    if is_aggregate_function(func) {
                        let mut agg = self.analyze_aggregate(func, alias_text(alias))?;
                        agg.selected = true;
                        add_aggregate(&mut aggregates, &mut agg_index, agg);
                    } else if has_group && self.lookup_group_expr(expr).is_none() {
                        let mut rendered = unwrap_nested(expr).to_string();
                        if let Some(alias) = alias {
                            rendered.push_str(&format!(
                                " (with alias: {})",
                                format_field_name(alias.value.trim())
                            ));
                        }
                        return Err(Error::Invalid(format!(
                            "non-aggregate function {rendered} must appear in GROUP BY"
                        )));
                    }
                }
                Expr::Trim { .. } | Expr::Substring { .. } => {
                    if has_group && self.lookup_group_expr(expr).is_none() {
                        let mut rendered = unwrap_nested(expr).to_string();
                        if let Some(alias) = alias {
                            rendered.push_str(&format!(
                                " (with alias: {})",
                                format_field_name(alias.value.trim())
                            ));
                        }
                        return Err(Error::Invalid(format!(
                            "non-aggregate function {rendered} must appear in GROUP BY"
                        )));
                    }
                }
                Expr::BinaryOp { .. }
                | Expr::UnaryOp { .. }
                | Expr::Ceil { .. }
                | Expr::Floor { .. }
                | Expr::Value(ValueWithSpan {
                    value: Value::Number(..),
                    ..
                }) => {
                    if has_group && self.lookup_group_expr(expr).is_none() {
                        let mut rendered = unwrap_nested(expr).to_string();
                        if let Some(alias) = alias {
                            rendered.push_str(&format!(
                                " (with alias: {})",
                                format_field_name(alias.value.trim())
                            ));
                        }
                        return Err(Error::Invalid(format!(
                            "expression {rendered} must appear in GROUP BY"
                        )));
                    }
                }
                other => {
                    if has_group {
                        return Err(Error::Unsupported(format!(
                            "unsupported select expression {other}"
                        )));
                    }
                }
            }
        }

        if let Some(having_expr) = having {
            self.collect_aggregates_from_expr(having_expr, &mut aggregates, &mut agg_index)?;
        }

        if aggregates.is_empty() {
            if has_group {
                return Err(Error::Invalid(
                    "GROUP BY requires aggregate expressions".into(),
                ));
            }
            return Ok((Vec::new(), false));
        }

        let mut stats = String::from("stats");
        if !group_fields.is_empty() {
            stats.push_str(" by (");
            stats.push_str(&group_fields.join(", "));
            stats.push(')');
        }

        let mut pipes = pre_group_pipes;
        let mut calls: Vec<String> = Vec::with_capacity(aggregates.len());
        let mut agg_results: FxHashMap<String, String> = FxHashMap::default();
        let mut delete_targets: FxHashMap<String, String> = FxHashMap::default();
        for agg in aggregates {
            pipes.extend(agg.pre_pipes);
            calls.push(agg.stats_call);
            agg_results.insert(agg.key.clone(), agg.result_name.clone());
            if !agg.selected {
                delete_targets.insert(agg.key, format_field_name(&agg.result_name));
            }
        }
        stats.push(' ');
        stats.push_str(&calls.join(", "));
        pipes.push(stats);

        self.agg_results = Some(agg_results);
        self.agg_temp_deletes = delete_targets;
        Ok((pipes, true))
    }

    fn collect_aggregates_from_expr(
        &mut self,
        expr: &Expr,
        aggregates: &mut Vec<AggItem>,
        agg_index: &mut FxHashMap<String, usize>,
    ) -> Result<()> {
        let mut funcs: Vec<&Function> = Vec::new();
        walk_expr(expr, &mut |e| {
            if let Expr::Function(func) = e {
                if is_aggregate_function(func) {
                    funcs.push(func);
                }
            }
        });
        for func in funcs {
            if func.over.is_some() {
                return Err(Error::Unsupported(
                    "window functions are not supported in HAVING".into(),
                ));
            }
            let item = self.analyze_aggregate(func, "")?;
            add_aggregate(aggregates, agg_index, item);
        }
        Ok(())
    }

    fn prepare_group_by_field(&mut self, expr: &Expr, index: usize) -> Result<(String, Vec<String>)> {
        match expr {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                let parts = identifier_parts(expr)
                    .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                Ok((self.normalize_identifier(&parts)?, Vec::new()))
            }
            Expr::Function(func) if is_aggregate_function(func) => Err(Error::Invalid(
                "aggregate functions are not allowed in GROUP BY".into(),
            )),
            Expr::Function(_) | Expr::Trim { .. } | Expr::Substring { .. } => {
                let alias = format!("group_{}", index + 1);
                if let Some((pipes, alias_name)) = self.translate_string_function(expr, &alias)? {
                    return Ok((alias_name, pipes));
                }
                let (pipe, alias_name) = self.translate_math_projection(expr, &alias)?;
                Ok((alias_name, vec![pipe]))
            }
            Expr::BinaryOp { .. }
            | Expr::UnaryOp { .. }
            | Expr::Ceil { .. }
            | Expr::Floor { .. }
            | Expr::Value(ValueWithSpan {
                value: Value::Number(..),
                ..
            }) => {
                let alias = format!("group_{}", index + 1);
                let (pipe, alias_name) = self.translate_math_projection(expr, &alias)?;
                Ok((alias_name, vec![pipe]))
            }
            other => Err(Error::Unsupported(format!(
                "unsupported GROUP BY expression {other}"
            ))),
        }
    }

    fn lookup_group_expr(&self, expr: &Expr) -> Option<String> {
        let aliases = self.group_expr_aliases.as_ref()?;
        aliases.get(&unwrap_nested(expr).to_string()).cloned()
    }

    fn analyze_aggregate(&mut self, func: &Function, alias: &str) -> Result<AggItem> {
        if function_distinct(func) {
            return Err(Error::Unsupported(
                "DISTINCT aggregates are not supported".into(),
            ));
        }
        let name = function_name(func)?.to_uppercase();
        let lower = name.to_lowercase();
        let args = function_args(func)?;

        let mut pre_pipes: Vec<String> = Vec::new();
        let (key_arg, call_arg) = match name.as_str() {
            "COUNT" => match args.as_slice() {
                [] | [FuncArg::Star] => ("*".to_string(), "*".to_string()),
                [FuncArg::Expr(arg)] => match arg {
                    Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                        let parts = identifier_parts(arg)
                            .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                        let field = self.normalize_identifier(&parts)?;
                        (field.clone(), field)
                    }
                    Expr::Value(ValueWithSpan {
                        value: Value::Number(text, _),
                        ..
                    }) => {
                        let (field, pipe) = self.ensure_constant_field(text)?;
                        pre_pipes.extend(pipe);
                        (text.clone(), field)
                    }
                    _ => {
                        return Err(Error::Unsupported(
                            "COUNT only supports identifiers, numeric literals, or *".into(),
                        ));
                    }
                },
                _ => {
                    return Err(Error::Invalid("COUNT expects single argument".into()));
                }
            },
            "SUM" | "AVG" | "MIN" | "MAX" => match args.as_slice() {
                [FuncArg::Expr(arg)] => match arg {
                    Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                        let parts = identifier_parts(arg)
                            .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                        let field = self.normalize_identifier(&parts)?;
                        (field.clone(), field)
                    }
                    Expr::Value(ValueWithSpan {
                        value: Value::Number(text, _),
                        ..
                    }) => {
                        let (field, pipe) = self.ensure_constant_field(text)?;
                        pre_pipes.extend(pipe);
                        (text.clone(), field)
                    }
                    _ => {
                        return Err(Error::Unsupported(format!(
                            "{lower} only supports identifiers or numeric literals"
                        )));
                    }
                },
                _ => {
                    return Err(Error::Invalid(format!("{lower} expects single argument")));
                }
            },
            other => {
                return Err(Error::Unsupported(format!("unsupported aggregate {other}")));
            }
        };

        let key = aggregate_key(&name, &key_arg);
        let fn_call = format!("{lower}({})", format_aggregate_arg(&call_arg));
        let alias = alias.trim();
        if alias.is_empty() {
            return Ok(AggItem {
                key,
                stats_call: fn_call.clone(),
                result_name: fn_call,
                pre_pipes,
                selected: false,
            });
        }
        let formatted_alias = format_field_name(alias);
        Ok(AggItem {
            key,
            stats_call: format!("{fn_call} {formatted_alias}"),
            result_name: formatted_alias,
            pre_pipes,
            selected: false,
        })
    }

    /// Aggregate key for lookups from HAVING and ORDER BY. Unlike
    /// [`Self::analyze_aggregate`] this never materializes constant fields.
    fn aggregate_key_from_func(&self, func: &Function) -> Result<String> {
        let name = function_name(func)?.to_uppercase();
        let lower = name.to_lowercase();
        let args = function_args(func)?;
        let arg = match name.as_str() {
            "COUNT" => match args.as_slice() {
                [] | [FuncArg::Star] => "*".to_string(),
                [FuncArg::Expr(arg)] => match arg {
                    Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                        let parts = identifier_parts(arg)
                            .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                        self.normalize_identifier(&parts)?
                    }
                    Expr::Value(ValueWithSpan {
                        value: Value::Number(text, _),
                        ..
                    }) => text.clone(),
                    _ => {
                        return Err(Error::Unsupported(
                            "COUNT only supports identifiers, numeric literals, or *".into(),
                        ));
                    }
                },
                _ => return Err(Error::Invalid("COUNT expects single argument".into())),
            },
            "SUM" | "AVG" | "MIN" | "MAX" => match args.as_slice() {
                [FuncArg::Expr(arg)] => match arg {
                    Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                        let parts = identifier_parts(arg)
                            .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                        self.normalize_identifier(&parts)?
                    }
                    Expr::Value(ValueWithSpan {
                        value: Value::Number(text, _),
                        ..
                    }) => text.clone(),
                    _ => {
                        return Err(Error::Unsupported(format!(
                            "{lower} only supports identifiers or numeric literals"
                        )));
                    }
                },
                _ => return Err(Error::Invalid(format!("{lower} expects single argument"))),
            },
            other => {
                return Err(Error::Unsupported(format!("unsupported aggregate {other}")));
            }
        };
        Ok(aggregate_key(&name, &arg))
    }

    fn ensure_constant_field(&mut self, value: &str) -> Result<(String, Option<String>)> {
        if value.trim().is_empty() {
            return Err(Error::Invalid(
                "constant aggregate requires non-empty numeric literal".into(),
            ));
        }
        if let Some(field) = self.constant_fields.get(value) {
            return Ok((field.clone(), None));
        }
        self.constant_field_count += 1;
        let field = format!("__const_{}", self.constant_field_count);
        let pipe = format!("format {value} as {field}");
        self.constant_fields.insert(value.to_string(), field.clone());
        Ok((field, Some(pipe)))
    }

    // ---- scalar-function synthesis ----

    /// Try to synthesize `expr` as a string-producing scalar function.
    /// `Ok(None)` means the expression is not one of the supported string
    /// functions (callers typically fall back to a `math` projection).
    fn translate_string_function(
        &mut self,
        expr: &Expr,
        alias: &str,
    ) -> Result<Option<(Vec<String>, String)>> {
        match expr {
            Expr::Trim {
                expr: inner,
                trim_where,
                trim_what,
                trim_characters,
                ..
            } => {
                if trim_what.is_some() || trim_characters.as_ref().is_some_and(|c| !c.is_empty()) {
                    return Err(Error::Unsupported(
                        "TRIM with explicit characters is not supported".into(),
                    ));
                }
                let kind = match trim_where {
                    None | Some(TrimWhereField::Both) => "TRIM",
                    Some(TrimWhereField::Leading) => "LTRIM",
                    Some(TrimWhereField::Trailing) => "RTRIM",
                };
                let Some(parts) = identifier_parts(inner) else {
                    return Err(Error::Unsupported(format!(
                        "{} only supports identifiers",
                        kind.to_lowercase()
                    )));
                };
                Ok(Some(self.translate_trim_function(kind, &parts, alias)?))
            }
            Expr::Substring {
                expr: inner,
                substring_from,
                substring_for,
                ..
            } => Ok(Some(self.translate_substring_function(
                inner,
                substring_from.as_deref(),
                substring_for.as_deref(),
                alias,
            )?)),
            Expr::Function(func) => {
                let name = function_name(func)?.to_uppercase();
                match name.as_str() {
                    "UPPER" | "LOWER" => {
                        Ok(Some(self.translate_case_function(func, &name, alias)?))
                    }
                    "TRIM" | "LTRIM" | "RTRIM" => {
                        let args = function_args(func)?;
                        let arg = single_expr_arg(&args, &name.to_lowercase())?;
                        let Some(parts) = identifier_parts(arg) else {
                            return Err(Error::Unsupported(format!(
                                "{} only supports identifiers",
                                name.to_lowercase()
                            )));
                        };
                        Ok(Some(self.translate_trim_function(&name, &parts, alias)?))
                    }
                    "SUBSTR" | "SUBSTRING" => {
                        let args = function_args(func)?;
                        if args.len() < 2 || args.len() > 3 {
                            return Err(Error::Invalid(
                                "substr expects two or three arguments".into(),
                            ));
                        }
                        let field_expr = expr_arg(&args[0])?;
                        let start_expr = expr_arg(&args[1])?;
                        let length_expr = match args.get(2) {
                            Some(arg) => Some(expr_arg(arg)?),
                            None => None,
                        };
                        Ok(Some(self.translate_substring_function(
                            field_expr,
                            Some(start_expr),
                            length_expr,
                            alias,
                        )?))
                    }
                    "CONCAT" => Ok(Some(self.translate_concat_function(func, alias)?)),
                    "REPLACE" => Ok(Some(self.translate_replace_function(func, alias)?)),
                    "JSON_VALUE" => Ok(Some(self.translate_json_value_function(func, alias)?)),
                    "CURRENT_TIMESTAMP" => Ok(Some(self.translate_current_timestamp(alias)?)),
                    "CURRENT_DATE" => Ok(Some(self.translate_current_date(alias)?)),
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    fn translate_case_function(
        &mut self,
        func: &Function,
        name: &str,
        alias: &str,
    ) -> Result<(Vec<String>, String)> {
        let lower = name.to_lowercase();
        let args = function_args(func)?;
        let arg = single_expr_arg(&args, &lower)?;
        let Some(parts) = identifier_parts(arg) else {
            return Err(Error::Unsupported(format!(
                "{lower} only supports identifiers"
            )));
        };
        let raw_field = self.raw_field_name(&parts)?;
        let alias_name = make_projection_alias(alias, &lower, &raw_field)?;
        let modifier = if name == "LOWER" { "lc" } else { "uc" };
        let pattern = format!("<{modifier}:{raw_field}>");
        let pipe = format!(
            "format \"{}\" as {}",
            escape_format_pattern(&pattern),
            alias_name
        );
        Ok((vec![pipe], alias_name))
    }

    fn translate_trim_function(
        &mut self,
        kind: &str,
        parts: &[&Ident],
        alias: &str,
    ) -> Result<(Vec<String>, String)> {
        let raw_field = self.raw_field_name(parts)?;
        let alias_name = make_projection_alias(alias, &kind.to_lowercase(), &raw_field)?;
        let pattern = build_trim_pattern(kind, &alias_name)?;
        let pipe = format!(
            "extract_regexp '{}' from {}",
            escape_single_quotes(&pattern),
            raw_field
        );
        Ok((vec![pipe], alias_name))
    }

    fn translate_substring_function(
        &mut self,
        field_expr: &Expr,
        start: Option<&Expr>,
        length: Option<&Expr>,
        alias: &str,
    ) -> Result<(Vec<String>, String)> {
        let Some(parts) = identifier_parts(field_expr) else {
            return Err(Error::Unsupported(
                "substr only supports identifiers as first argument".into(),
            ));
        };
        let raw_field = self.raw_field_name(&parts)?;
        let Some(start_expr) = start else {
            return Err(Error::Invalid("substr expects two or three arguments".into()));
        };
        let start = parse_substring_int_arg(start_expr, "start")?;
        if start < 1 {
            return Err(Error::Invalid("substr start must be >= 1".into()));
        }
        let alias_name = make_projection_alias(alias, "substr", &raw_field)?;
        let start_index = start - 1;
        let pattern = match length {
            Some(length_expr) => {
                let length = parse_substring_int_arg(length_expr, "length")?;
                if length < 0 {
                    return Err(Error::Invalid("substr length must be >= 0".into()));
                }
                format!("(?s)^.{{{start_index}}}(?P<{alias_name}>.{{0,{length}}})")
            }
            None => format!("(?s)^.{{{start_index}}}(?P<{alias_name}>.*)$"),
        };
        let pipe = format!(
            "extract_regexp '{}' from {}",
            escape_single_quotes(&pattern),
            raw_field
        );
        Ok((vec![pipe], alias_name))
    }

    fn translate_concat_function(
        &mut self,
        func: &Function,
        alias: &str,
    ) -> Result<(Vec<String>, String)> {
        let args = function_args(func)?;
        if args.is_empty() {
            return Err(Error::Invalid("concat expects at least one argument".into()));
        }
        let alias_source = match &args[0] {
            FuncArg::Expr(first) => match identifier_parts(first) {
                Some(parts) => self.raw_field_name(&parts)?,
                None => "expr".to_string(),
            },
            FuncArg::Star => "expr".to_string(),
        };
        let alias_name = make_projection_alias(alias, "concat", &alias_source)?;
        let mut pattern = String::new();
        for arg in &args {
            let expr = expr_arg(arg)?;
            pattern.push_str(&self.concat_segment(expr)?);
        }
        let pipe = format!(
            "format \"{}\" as {}",
            escape_format_pattern(&pattern),
            alias_name
        );
        Ok((vec![pipe], alias_name))
    }

    fn concat_segment(&self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Value(value) => match &value.value {
                Value::SingleQuotedString(text) | Value::DoubleQuotedString(text) => {
                    Ok(text.clone())
                }
                Value::Number(text, _) => Ok(text.clone()),
                Value::Boolean(flag) => Ok(if *flag { "true" } else { "false" }.to_string()),
                Value::Null => Ok(String::new()),
                other => Err(Error::Unsupported(format!(
                    "CONCAT argument {other} is not supported"
                ))),
            },
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                let parts = identifier_parts(expr)
                    .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                let field = self.raw_field_name(&parts)?;
                Ok(format!("<{field}>"))
            }
            other => Err(Error::Unsupported(format!(
                "CONCAT argument {other} is not supported"
            ))),
        }
    }

    fn translate_replace_function(
        &mut self,
        func: &Function,
        alias: &str,
    ) -> Result<(Vec<String>, String)> {
        let args = function_args(func)?;
        if args.len() != 3 {
            return Err(Error::Invalid("replace expects three arguments".into()));
        }
        let field_expr = expr_arg(&args[0])?;
        let Some(parts) = identifier_parts(field_expr) else {
            return Err(Error::Unsupported(
                "replace only supports identifiers as first argument".into(),
            ));
        };
        let raw_field = self.raw_field_name(&parts)?;
        let search = literal_from_expr(expr_arg(&args[1])?)?;
        let replacement = literal_from_expr(expr_arg(&args[2])?)?;
        let alias_name = make_projection_alias(alias, "replace", &raw_field)?;
        let pattern = format!("<{raw_field}>");
        let copy_pipe = format!(
            "format \"{}\" as {}",
            escape_format_pattern(&pattern),
            alias_name
        );
        let replace_pipe = format!(
            "replace ('{}', '{}') at {}",
            escape_single_quotes(&search.value),
            escape_single_quotes(&replacement.value),
            alias_name
        );
        Ok((vec![copy_pipe, replace_pipe], alias_name))
    }

    fn translate_json_value_function(
        &mut self,
        func: &Function,
        alias: &str,
    ) -> Result<(Vec<String>, String)> {
        let args = function_args(func)?;
        if args.len() != 2 {
            return Err(Error::Invalid("JSON_VALUE expects two arguments".into()));
        }
        let field_expr = expr_arg(&args[0])?;
        let Some(parts) = identifier_parts(field_expr) else {
            return Err(Error::Unsupported(
                "JSON_VALUE only supports identifiers as first argument".into(),
            ));
        };
        let raw_field = self.raw_field_name(&parts)?;
        let path_literal = literal_from_expr(expr_arg(&args[1])?)?;
        if path_literal.kind != LiteralKind::String {
            return Err(Error::Invalid("JSON_VALUE path must be string literal".into()));
        }
        let json_path = JsonPath::parse(&path_literal.value)?;
        let keys = match json_path.has_only_keys() {
            Some(keys) if !keys.is_empty() => keys,
            _ => {
                return Err(Error::Unsupported(
                    "JSON_VALUE path with arrays is not supported".into(),
                ));
            }
        };
        for key in &keys {
            if !is_format_field(key) {
                return Err(Error::Invalid(format!(
                    "JSON_VALUE path segment \"{key}\" contains unsupported characters"
                )));
            }
        }
        let path_expr = keys.join(".");
        let alias_source = format!("{raw_field}.{path_expr}");
        let alias_name = make_projection_alias(alias, "json_value", &alias_source)?;
        let mut pipes = vec![format!("unpack_json from {raw_field} fields ({path_expr})")];
        if alias_name != path_expr {
            pipes.push(format!(
                "rename {} as {}",
                format_field_name(&path_expr),
                format_field_name(&alias_name)
            ));
        }
        Ok((pipes, alias_name))
    }

    fn translate_current_timestamp(&self, alias: &str) -> Result<(Vec<String>, String)> {
        let alias_name = make_simple_alias(alias, "current_timestamp")?;
        let tmp_field = format!("{alias_name}_nanos");
        if !is_format_field(&tmp_field) {
            return Err(Error::Invalid(format!(
                "alias {alias_name} produces unsupported field name"
            )));
        }
        Ok((
            vec![
                format!("math now() as {tmp_field}"),
                format!("format '<time:{tmp_field}>' as {alias_name}"),
                format!("delete {tmp_field}"),
            ],
            alias_name,
        ))
    }

    fn translate_current_date(&self, alias: &str) -> Result<(Vec<String>, String)> {
        let alias_name = make_simple_alias(alias, "current_date")?;
        let nanos_field = format!("{alias_name}_nanos");
        let formatted_field = format!("{alias_name}_formatted");
        if !is_format_field(&nanos_field) || !is_format_field(&formatted_field) {
            return Err(Error::Invalid(format!(
                "alias {alias_name} produces unsupported field name"
            )));
        }
        let pattern = format!("^(?P<{alias_name}>[0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}})");
        Ok((
            vec![
                format!("math now() as {nanos_field}"),
                format!("format '<time:{nanos_field}>' as {formatted_field}"),
                format!(
                    "extract_regexp '{}' from {}",
                    escape_single_quotes(&pattern),
                    formatted_field
                ),
                format!("delete {nanos_field}, {formatted_field}"),
            ],
            alias_name,
        ))
    }

    // ---- math projections ----

    fn translate_math_projection(&mut self, expr: &Expr, alias: &str) -> Result<(String, String)> {
        let math_expr = self.math_expr_to_string(expr)?;
        let alias_name = make_projection_alias(alias, "expr", &math_expr)?;
        Ok((format!("math {math_expr} as {alias_name}"), alias_name))
    }

    fn math_expr_to_string(&self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Value(ValueWithSpan {
                value: Value::Number(text, _),
                ..
            }) => Ok(text.clone()),
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                let parts = identifier_parts(expr)
                    .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                self.raw_field_name(&parts)
            }
            Expr::Nested(inner) => self.math_expr_to_string(inner),
            Expr::UnaryOp { op, expr: inner } => {
                if !matches!(op, UnaryOperator::Minus) {
                    return Err(Error::Unsupported(format!(
                        "unsupported unary operator \"{op}\" in math expression"
                    )));
                }
                Ok(format!("-({})", self.math_expr_to_string(inner)?))
            }
            Expr::BinaryOp { left, op, right } => {
                let Some(symbol) = math_operator(op) else {
                    return Err(Error::Unsupported(format!(
                        "unsupported operator \"{op}\" in math expression"
                    )));
                };
                Ok(format!(
                    "({} {} {})",
                    self.math_expr_to_string(left)?,
                    symbol,
                    self.math_expr_to_string(right)?
                ))
            }
            Expr::Function(func) => self.math_func_to_string(func),
            Expr::Ceil { expr: inner, field } => {
                ensure_plain_ceil_floor(field)?;
                Ok(format!("ceil({})", self.math_expr_to_string(inner)?))
            }
            Expr::Floor { expr: inner, field } => {
                ensure_plain_ceil_floor(field)?;
                Ok(format!("floor({})", self.math_expr_to_string(inner)?))
            }
            other => Err(Error::Unsupported(format!(
                "unsupported math expression {other}"
            ))),
        }
    }

    fn math_func_to_string(&self, func: &Function) -> Result<String> {
        let name = function_name(func)?.to_uppercase();
        let lower = name.to_lowercase();
        let args = function_args(func)?;
        match name.as_str() {
            "ABS" | "CEIL" | "FLOOR" | "EXP" | "LN" => {
                let arg = single_expr_arg(&args, &lower)?;
                Ok(format!("{lower}({})", self.math_expr_to_string(arg)?))
            }
            "ROUND" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(Error::Invalid("round expects one or two arguments".into()));
                }
                let arg = self.math_expr_to_string(expr_arg(&args[0])?)?;
                if args.len() == 1 {
                    return Ok(format!("round({arg})"));
                }
                let nearest = self.math_expr_to_string(expr_arg(&args[1])?)?;
                Ok(format!("round({arg}, {nearest})"))
            }
            "POWER" | "POW" => {
                if args.len() != 2 {
                    return Err(Error::Invalid(format!("{lower} expects two arguments")));
                }
                let base = self.math_expr_to_string(expr_arg(&args[0])?)?;
                let exponent = self.math_expr_to_string(expr_arg(&args[1])?)?;
                Ok(format!("({base} ^ {exponent})"))
            }
            "MAX" | "MIN" | "GREATEST" | "LEAST" => {
                if args.is_empty() {
                    return Err(Error::Invalid(format!(
                        "{lower} expects at least one argument"
                    )));
                }
                let mut rendered = Vec::with_capacity(args.len());
                for arg in &args {
                    rendered.push(self.math_expr_to_string(expr_arg(arg)?)?);
                }
                let func_name = match name.as_str() {
                    "GREATEST" => "max",
                    "LEAST" => "min",
                    _ => lower.as_str(),
                };
                Ok(format!("{func_name}({})", rendered.join(", ")))
            }
            other => Err(Error::Unsupported(format!(
                "unsupported function {other} in math expression"
            ))),
        }
    }

    // ---- window functions ----

    fn translate_window_function(
        &mut self,
        func: &Function,
        alias: &str,
    ) -> Result<(Vec<String>, String)> {
        let Some(over) = &func.over else {
            return Err(Error::Invalid("invalid window function".into()));
        };
        let WindowType::WindowSpec(spec) = over else {
            return Err(Error::Unsupported("named windows are not supported".into()));
        };
        if spec.window_frame.is_some() {
            return Err(Error::Unsupported("window frames are not supported".into()));
        }
        if function_distinct(func) {
            return Err(Error::Unsupported(
                "DISTINCT window functions are not supported".into(),
            ));
        }
        let name = function_name(func)?.to_uppercase();
        let lower = name.to_lowercase();
        let args = function_args(func)?;

        let mut constant_pipe: Option<String> = None;
        let (stats_call, alias_source) = match name.as_str() {
            "SUM" | "MIN" | "MAX" => {
                let [FuncArg::Expr(arg)] = args.as_slice() else {
                    return Err(Error::Invalid(format!(
                        "{lower} window function expects single argument"
                    )));
                };
                self.ensure_base_aliases_only(arg)?;
                match arg {
                    Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                        let parts = identifier_parts(arg)
                            .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                        let field = self.normalize_identifier(&parts)?;
                        (format!("{lower}({field})"), field)
                    }
                    Expr::Value(ValueWithSpan {
                        value: Value::Number(text, _),
                        ..
                    }) => {
                        let (field, pipe) = self.ensure_constant_field(text)?;
                        constant_pipe = pipe;
                        (format!("{lower}({field})"), text.clone())
                    }
                    _ => {
                        return Err(Error::Unsupported(format!(
                            "{lower} window function requires identifier or numeric literal argument"
                        )));
                    }
                }
            }
            "COUNT" => match args.as_slice() {
                [] | [FuncArg::Star] => ("count()".to_string(), lower.clone()),
                [FuncArg::Expr(arg)] => match arg {
                    Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                        self.ensure_base_aliases_only(arg)?;
                        let parts = identifier_parts(arg)
                            .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                        let field = self.normalize_identifier(&parts)?;
                        (format!("count({field})"), field)
                    }
                    Expr::Value(ValueWithSpan {
                        value: Value::Number(text, _),
                        ..
                    }) => {
                        let (field, pipe) = self.ensure_constant_field(text)?;
                        constant_pipe = pipe;
                        (format!("count({field})"), text.clone())
                    }
                    _ => {
                        return Err(Error::Unsupported(
                            "COUNT window function only supports identifiers, numeric literals, or *"
                                .into(),
                        ));
                    }
                },
                _ => {
                    return Err(Error::Invalid(
                        "COUNT window function expects zero or one argument".into(),
                    ));
                }
            },
            other => {
                return Err(Error::Unsupported(format!(
                    "window function {other} is not supported"
                )));
            }
        };

        let alias_source = if alias_source.trim().is_empty() {
            lower.clone()
        } else {
            alias_source
        };
        let alias_name = make_projection_alias(alias, &lower, &alias_source)?;

        let mut partition_clause = String::new();
        if !spec.partition_by.is_empty() {
            let mut fields = Vec::with_capacity(spec.partition_by.len());
            for expr in &spec.partition_by {
                self.ensure_base_aliases_only(expr)?;
                let Some(parts) = identifier_parts(expr) else {
                    return Err(Error::Unsupported(
                        "PARTITION BY only supports identifiers".into(),
                    ));
                };
                fields.push(self.normalize_identifier(&parts)?);
            }
            partition_clause = format!(" by ({})", fields.join(", "));
        }

        let mut pipes = Vec::new();
        if !spec.order_by.is_empty() {
            for item in &spec.order_by {
                self.ensure_base_aliases_only(&item.expr)?;
            }
            pipes.push(self.translate_order_by(&spec.order_by, false)?);
        }
        if let Some(pipe) = constant_pipe {
            pipes.push(pipe);
        }
        pipes.push(format!(
            "running_stats{partition_clause} {stats_call} as {alias_name}"
        ));
        Ok((pipes, alias_name))
    }

    // ---- projection, sort, limit ----

    fn build_projection_pipes(
        &mut self,
        projection: &[SelectItem],
        aggregated: bool,
    ) -> Result<(Vec<String>, Vec<String>)> {
        if projection.len() == 1 && matches!(projection[0], SelectItem::Wildcard(_)) {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut computed_pipes: Vec<String> = Vec::new();
        let mut rename_pairs: Vec<String> = Vec::new();
        let mut fields: Vec<String> = Vec::new();

        for item in projection {
            let (expr, alias) = match item {
                SelectItem::Wildcard(_) => {
                    return Err(Error::Invalid(
                        "SELECT * cannot be combined with other projections".into(),
                    ));
                }
                SelectItem::QualifiedWildcard(..) => {
                    return Err(Error::Unsupported(
                        "qualified wildcard projections are not supported".into(),
                    ));
                }
                SelectItem::UnnamedExpr(expr) => (expr, ""),
                SelectItem::ExprWithAlias { expr, alias } => (expr, alias.value.as_str()),
            };
            let alias = alias.trim();
            let expr = unwrap_nested(expr);
            match expr {
                Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                    let parts = identifier_parts(expr)
                        .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                    let field = self.normalize_identifier(&parts)?;
                    let mut final_name = field.clone();
                    if !alias.is_empty() {
                        let formatted_alias = format_field_name(alias);
                        rename_pairs.push(format!("{field} as {formatted_alias}"));
                        final_name = formatted_alias;
                    }
                    fields.push(final_name);
                }
                Expr::Function(func) => {
                    if func.over.is_some() {
                        if aggregated {
                            return Err(Error::Unsupported(
                                "window functions are not supported with GROUP BY".into(),
                            ));
                        }
                        let (pipes, alias_name) = self.translate_window_function(func, alias)?;
                        computed_pipes.extend(pipes);
                        fields.push(format_field_name(&alias_name));
                        continue;
                    }
                    if aggregated && is_aggregate_function(func) {
                        if !alias.is_empty() {
                            fields.push(format_field_name(alias));
                        } else {
                            let key = self.aggregate_key_from_func(func)?;
                            match self.agg_results.as_ref().and_then(|m| m.get(&key)) {
                                Some(name) => fields.push(name.clone()),
                                None => fields.push(key),
                            }
                        }
                        continue;
                    }
                    if aggregated {
                        self.project_group_expr(expr, alias, &mut rename_pairs, &mut fields)
                            .map_err(|_| {
                                Error::Unsupported(format!(
                                    "unsupported function {expr} in aggregated select"
                                ))
                            })?;
                        continue;
                    }
                    if let Some((pipes, alias_name)) = self.translate_string_function(expr, alias)?
                    {
                        computed_pipes.extend(pipes);
                        fields.push(format_field_name(&alias_name));
                        continue;
                    }
                    let (pipe, alias_name) = self.translate_math_projection(expr, alias)?;
                    computed_pipes.push(pipe);
                    fields.push(format_field_name(&alias_name));
                }
                Expr::Trim { .. } | Expr::Substring { .. } => {
                    if aggregated {
                        self.project_group_expr(expr, alias, &mut rename_pairs, &mut fields)
                            .map_err(|_| {
                                Error::Unsupported(format!(
                                    "unsupported function {expr} in aggregated select"
                                ))
                            })?;
                        continue;
                    }
                    if let Some((pipes, alias_name)) = self.translate_string_function(expr, alias)?
                    {
                        computed_pipes.extend(pipes);
                        fields.push(format_field_name(&alias_name));
                    }
                }
                Expr::BinaryOp { .. }
                | Expr::UnaryOp { .. }
                | Expr::Ceil { .. }
                | Expr::Floor { .. }
                | Expr::Value(ValueWithSpan {
                    value: Value::Number(..),
                    ..
                }) => {
                    if aggregated {
                        self.project_group_expr(expr, alias, &mut rename_pairs, &mut fields)
                            .map_err(|_| {
                                Error::Unsupported(format!(
                                    "unsupported expression {expr} in aggregated select"
                                ))
                            })?;
                        continue;
                    }
                    let (pipe, alias_name) = self.translate_math_projection(expr, alias)?;
                    computed_pipes.push(pipe);
                    fields.push(format_field_name(&alias_name));
                }
                other => {
                    return Err(Error::Unsupported(format!(
                        "unsupported projection expression {other}"
                    )));
                }
            }
        }

        let mut pipes = computed_pipes;
        if !rename_pairs.is_empty() {
            pipes.push(format!("rename {}", rename_pairs.join(", ")));
        }
        if !fields.is_empty() && !aggregated {
            pipes.push(format!("fields {}", fields.join(", ")));
        }
        Ok((pipes, fields))
    }

    /// Project an expression that must resolve to a GROUP BY field.
    fn project_group_expr(
        &mut self,
        expr: &Expr,
        alias: &str,
        rename_pairs: &mut Vec<String>,
        fields: &mut Vec<String>,
    ) -> Result<()> {
        let Some(group_field) = self.lookup_group_expr(expr) else {
            return Err(Error::Invalid("expression is not a GROUP BY field".into()));
        };
        let mut final_name = group_field.clone();
        if !alias.is_empty() {
            let formatted_alias = format_field_name(alias);
            if formatted_alias != group_field {
                rename_pairs.push(format!("{group_field} as {formatted_alias}"));
            }
            final_name = formatted_alias;
        }
        fields.push(final_name);
        Ok(())
    }

    fn translate_order_by(&self, items: &[OrderByExpr], aggregated: bool) -> Result<String> {
        let mut clauses = Vec::with_capacity(items.len());
        for item in items {
            let field = match unwrap_nested(&item.expr) {
                expr @ (Expr::Identifier(_) | Expr::CompoundIdentifier(_)) => {
                    let parts = identifier_parts(expr)
                        .ok_or_else(|| Error::Invalid("invalid identifier".into()))?;
                    self.normalize_identifier(&parts)?
                }
                Expr::Function(func) => {
                    if !aggregated {
                        return Err(Error::Invalid(
                            "ORDER BY function requires aggregation".into(),
                        ));
                    }
                    let key = self.aggregate_key_from_func(func)?;
                    match self.agg_results.as_ref().and_then(|m| m.get(&key)) {
                        Some(name) => name.clone(),
                        None => {
                            return Err(Error::Invalid(
                                "ORDER BY references unknown aggregate".into(),
                            ));
                        }
                    }
                }
                other => {
                    return Err(Error::Unsupported(format!(
                        "ORDER BY expression {other} not supported"
                    )));
                }
            };
            if item.options.asc == Some(false) {
                clauses.push(format!("{field} desc"));
            } else {
                clauses.push(field);
            }
        }
        Ok(format!("sort by ({})", clauses.join(", ")))
    }

    fn translate_limit(&self, limit: &LimitClause) -> Result<Vec<String>> {
        let (limit_expr, offset_expr) = match limit {
            LimitClause::LimitOffset {
                limit,
                offset,
                limit_by,
            } => {
                if !limit_by.is_empty() {
                    return Err(Error::Unsupported("LIMIT BY is not supported".into()));
                }
                (limit.as_ref(), offset.as_ref().map(|o| &o.value))
            }
            LimitClause::OffsetCommaLimit { offset, limit } => (Some(limit), Some(offset)),
        };

        let mut pipes = Vec::with_capacity(2);
        if let Some(offset_expr) = offset_expr {
            let lit = literal_from_expr(offset_expr)
                .map_err(|err| Error::Invalid(format!("OFFSET expects numeric literal: {err}")))?;
            if lit.kind != LiteralKind::Number {
                return Err(Error::Invalid("OFFSET expects numeric literal".into()));
            }
            pipes.push(format!("offset {}", lit.value));
        }
        if let Some(limit_expr) = limit_expr {
            let lit = literal_from_expr(limit_expr)
                .map_err(|err| Error::Invalid(format!("LIMIT expects numeric literal: {err}")))?;
            if lit.kind != LiteralKind::Number {
                return Err(Error::Invalid("LIMIT expects numeric literal".into()));
            }
            pipes.push(format!("limit {}", lit.value));
        }
        if pipes.is_empty() {
            return Err(Error::Invalid("LIMIT/OFFSET clause is empty".into()));
        }
        Ok(pipes)
    }
}

// ---- free helpers ----

fn order_items(order_by: Option<&OrderBy>) -> Result<&[OrderByExpr]> {
    match order_by {
        None => Ok(&[]),
        Some(order_by) => {
            if order_by.interpolate.is_some() {
                return Err(Error::Unsupported(
                    "ORDER BY INTERPOLATE is not supported".into(),
                ));
            }
            match &order_by.kind {
                OrderByKind::Expressions(items) => Ok(items),
                OrderByKind::All(_) => {
                    Err(Error::Unsupported("ORDER BY ALL is not supported".into()))
                }
            }
        }
    }
}

fn add_aggregate(
    aggregates: &mut Vec<AggItem>,
    agg_index: &mut FxHashMap<String, usize>,
    item: AggItem,
) {
    if let Some(&idx) = agg_index.get(&item.key) {
        let existing = &mut aggregates[idx];
        existing.pre_pipes.extend(item.pre_pipes);
        if item.selected {
            existing.selected = true;
        }
        return;
    }
    agg_index.insert(item.key.clone(), aggregates.len());
    aggregates.push(item);
}

fn collect_group_aliases<'s>(projection: &'s [SelectItem]) -> FxHashMap<String, &'s Expr> {
    let mut aliases: FxHashMap<String, &Expr> = FxHashMap::default();
    for item in projection {
        let SelectItem::ExprWithAlias { expr, alias } = item else {
            continue;
        };
        let alias_text = alias.value.trim();
        if alias_text.is_empty() {
            continue;
        }
        aliases.entry(alias_text.to_lowercase()).or_insert(expr);
        let formatted = format_field_name(alias_text);
        aliases.entry(formatted.to_lowercase()).or_insert(expr);
        if formatted.starts_with('"') && formatted.ends_with('"') && formatted.len() >= 2 {
            let unquoted = &formatted[1..formatted.len() - 1];
            aliases.entry(unquoted.to_lowercase()).or_insert(expr);
        }
    }
    aliases
}

fn resolve_group_by_alias<'e>(expr: &'e Expr, aliases: &FxHashMap<String, &'e Expr>) -> &'e Expr {
    if aliases.is_empty() {
        return expr;
    }
    let Expr::Identifier(ident) = expr else {
        return expr;
    };
    aliases
        .get(&ident.value.to_lowercase())
        .copied()
        .unwrap_or(expr)
}

fn alias_text(alias: Option<&Ident>) -> &str {
    alias.map(|a| a.value.as_str()).unwrap_or("")
}

fn unwrap_nested(expr: &Expr) -> &Expr {
    let mut current = expr;
    while let Expr::Nested(inner) = current {
        current = inner;
    }
    current
}

fn flatten_and(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut out = flatten_and(left);
            out.extend(flatten_and(right));
            out
        }
        Expr::Nested(inner) => flatten_and(inner),
        other => vec![other],
    }
}

fn walk_expr<'e>(expr: &'e Expr, visit: &mut dyn FnMut(&'e Expr)) {
    visit(expr);
    match expr {
        Expr::BinaryOp { left, right, .. } => {
            walk_expr(left, visit);
            walk_expr(right, visit);
        }
        Expr::UnaryOp { expr: inner, .. }
        | Expr::Nested(inner)
        | Expr::IsNull(inner)
        | Expr::IsNotNull(inner) => walk_expr(inner, visit),
        Expr::InList {
            expr: inner, list, ..
        } => {
            walk_expr(inner, visit);
            for item in list {
                walk_expr(item, visit);
            }
        }
        Expr::InSubquery { expr: inner, .. } => walk_expr(inner, visit),
        Expr::Between {
            expr: inner,
            low,
            high,
            ..
        } => {
            walk_expr(inner, visit);
            walk_expr(low, visit);
            walk_expr(high, visit);
        }
        Expr::Like {
            expr: inner,
            pattern,
            ..
        } => {
            walk_expr(inner, visit);
            walk_expr(pattern, visit);
        }
        Expr::Function(func) => {
            if let FunctionArguments::List(list) = &func.args {
                for arg in &list.args {
                    if let FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) = arg {
                        walk_expr(e, visit);
                    }
                }
            }
        }
        Expr::Trim { expr: inner, .. } => walk_expr(inner, visit),
        Expr::Substring {
            expr: inner,
            substring_from,
            substring_for,
            ..
        } => {
            walk_expr(inner, visit);
            if let Some(from) = substring_from {
                walk_expr(from, visit);
            }
            if let Some(length) = substring_for {
                walk_expr(length, visit);
            }
        }
        Expr::Ceil { expr: inner, .. } | Expr::Floor { expr: inner, .. } => {
            walk_expr(inner, visit);
        }
        _ => {}
    }
}

fn identifier_parts(expr: &Expr) -> Option<Vec<&Ident>> {
    match expr {
        Expr::Identifier(ident) => Some(vec![ident]),
        Expr::CompoundIdentifier(parts) => Some(parts.iter().collect()),
        _ => None,
    }
}

fn is_alias_only(aliases: &FxHashSet<String>, alias: &str) -> bool {
    !alias.is_empty() && aliases.len() == 1 && aliases.contains(alias)
}

fn object_name_parts(name: &ObjectName) -> Result<Vec<String>> {
    let mut parts = Vec::with_capacity(name.0.len());
    for part in &name.0 {
        match part {
            ObjectNamePart::Identifier(ident) => parts.push(ident.value.clone()),
            other => {
                return Err(Error::Unsupported(format!(
                    "unsupported name part {other}"
                )));
            }
        }
    }
    if parts.is_empty() {
        return Err(Error::Invalid("invalid table reference".into()));
    }
    Ok(parts)
}

fn is_aggregate_function(func: &Function) -> bool {
    let Some(name) = func.name.0.last() else {
        return false;
    };
    let ObjectNamePart::Identifier(ident) = name else {
        return false;
    };
    matches!(
        ident.value.to_uppercase().as_str(),
        "COUNT" | "SUM" | "AVG" | "MIN" | "MAX"
    )
}

fn function_name(func: &Function) -> Result<String> {
    match func.name.0.last() {
        Some(ObjectNamePart::Identifier(ident)) => Ok(ident.value.clone()),
        _ => Err(Error::Invalid("invalid function name".into())),
    }
}

fn function_distinct(func: &Function) -> bool {
    matches!(
        &func.args,
        FunctionArguments::List(list)
            if matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct))
    )
}

fn function_args(func: &Function) -> Result<Vec<FuncArg<'_>>> {
    match &func.args {
        FunctionArguments::None => Ok(Vec::new()),
        FunctionArguments::Subquery(_) => Err(Error::Unsupported(
            "subquery function arguments are not supported".into(),
        )),
        FunctionArguments::List(list) => {
            if !list.clauses.is_empty() {
                return Err(Error::Unsupported(
                    "function argument clauses are not supported".into(),
                ));
            }
            let mut args = Vec::with_capacity(list.args.len());
            for arg in &list.args {
                match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => {
                        args.push(FuncArg::Expr(expr));
                    }
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => args.push(FuncArg::Star),
                    FunctionArg::Unnamed(FunctionArgExpr::QualifiedWildcard(_)) => {
                        return Err(Error::Unsupported(
                            "qualified wildcard function arguments are not supported".into(),
                        ));
                    }
                    _ => {
                        return Err(Error::Unsupported(
                            "named function arguments are not supported".into(),
                        ));
                    }
                }
            }
            Ok(args)
        }
    }
}

fn expr_arg<'a>(arg: &FuncArg<'a>) -> Result<&'a Expr> {
    match arg {
        FuncArg::Expr(expr) => Ok(expr),
        FuncArg::Star => Err(Error::Unsupported(
            "wildcard argument is not supported here".into(),
        )),
    }
}

fn single_expr_arg<'a>(args: &[FuncArg<'a>], name: &str) -> Result<&'a Expr> {
    match args {
        [FuncArg::Expr(expr)] => Ok(expr),
        _ => Err(Error::Invalid(format!("{name} expects single argument"))),
    }
}

fn aggregate_key(name: &str, arg: &str) -> String {
    if arg.is_empty() || arg == "*" {
        return format!("{}(*)", name.to_uppercase());
    }
    format!("{}({})", name.to_uppercase(), arg.to_lowercase())
}

fn format_aggregate_arg(arg: &str) -> &str {
    if arg.is_empty() || arg == "*" { "" } else { arg }
}

fn math_operator(op: &BinaryOperator) -> Option<&'static str> {
    match op {
        BinaryOperator::Plus => Some("+"),
        BinaryOperator::Minus => Some("-"),
        BinaryOperator::Multiply => Some("*"),
        BinaryOperator::Divide => Some("/"),
        BinaryOperator::Modulo => Some("%"),
        BinaryOperator::BitwiseXor => Some("^"),
        _ => None,
    }
}

fn ensure_plain_ceil_floor(field: &CeilFloorKind) -> Result<()> {
    match field {
        CeilFloorKind::DateTimeField(DateTimeField::NoDateTime) => Ok(()),
        _ => Err(Error::Unsupported(
            "CEIL/FLOOR TO field is not supported".into(),
        )),
    }
}

fn build_trim_pattern(kind: &str, alias: &str) -> Result<String> {
    match kind.to_uppercase().as_str() {
        "TRIM" => Ok(format!("(?s)^\\s*(?P<{alias}>.*?\\S)?\\s*$")),
        "LTRIM" => Ok(format!("(?s)^\\s*(?P<{alias}>.*)$")),
        "RTRIM" => Ok(format!("(?s)^(?P<{alias}>.*?\\S)?\\s*$")),
        other => Err(Error::Invalid(format!("unsupported trim function {other}"))),
    }
}

fn parse_substring_int_arg(expr: &Expr, name: &str) -> Result<i64> {
    let invalid = || Error::Invalid(format!("substr {name} must be integer literal"));
    let Expr::Value(ValueWithSpan {
        value: Value::Number(text, _),
        ..
    }) = unwrap_nested(expr)
    else {
        return Err(invalid());
    };
    let clean: String = text.trim().chars().filter(|c| *c != '_').collect();
    if clean.is_empty() {
        return Err(invalid());
    }
    if clean.contains(['.', 'e', 'E']) {
        return Err(invalid());
    }
    clean.parse::<i64>().map_err(|_| invalid())
}

fn make_projection_alias(provided: &str, prefix: &str, field: &str) -> Result<String> {
    let provided = provided.trim();
    if !provided.is_empty() {
        if !is_bare_literal(provided) {
            return Err(Error::Invalid(format!(
                "alias \"{provided}\" contains unsupported characters"
            )));
        }
        return Ok(provided.to_string());
    }
    let sanitized = sanitize_alias_from_field(field);
    let alias = format!("{prefix}_{sanitized}");
    if !is_bare_literal(&alias) {
        return Err(Error::Invalid(format!("failed to build alias for {field}")));
    }
    Ok(alias)
}

fn make_simple_alias(provided: &str, fallback: &str) -> Result<String> {
    let provided = provided.trim();
    if !provided.is_empty() {
        if !is_bare_literal(provided) {
            return Err(Error::Invalid(format!(
                "alias \"{provided}\" contains unsupported characters"
            )));
        }
        return Ok(provided.to_string());
    }
    let fallback = if fallback.is_empty() { "expr" } else { fallback };
    if !is_bare_literal(fallback) {
        return Err(Error::Invalid(format!(
            "alias \"{fallback}\" contains unsupported characters"
        )));
    }
    Ok(fallback.to_string())
}

fn sanitize_alias_from_field(field: &str) -> String {
    let mut value: String = field
        .chars()
        .map(|c| match c {
            '.' | '-' | ':' | '/' | '+' | '*' | '%' | '^' | '(' | ')' | ',' | ' ' | '\''
            | '"' => '_',
            other => other,
        })
        .collect();
    value = value.to_lowercase();
    while value.contains("__") {
        value = value.replace("__", "_");
    }
    let value = value.trim_matches('_');
    if value.is_empty() {
        "col".to_string()
    } else {
        value.to_string()
    }
}

fn translate_value(value: &ValueWithSpan) -> Result<String> {
    match &value.value {
        Value::SingleQuotedString(text) | Value::DoubleQuotedString(text) => {
            Ok(format_string(text))
        }
        Value::Number(text, _) => Ok(text.clone()),
        Value::Boolean(flag) => Ok(if *flag { "true" } else { "false" }.to_string()),
        Value::Null => Err(Error::Unsupported(
            "NULL literal is not supported in this context".into(),
        )),
        other => Err(Error::Unsupported(format!("unsupported literal {other}"))),
    }
}

fn literal_from_expr(expr: &Expr) -> Result<LiteralValue> {
    match unwrap_nested(expr) {
        Expr::Value(value) => match &value.value {
            Value::SingleQuotedString(text) | Value::DoubleQuotedString(text) => Ok(LiteralValue {
                kind: LiteralKind::String,
                value: text.clone(),
            }),
            Value::Number(text, _) => Ok(LiteralValue {
                kind: LiteralKind::Number,
                value: text.clone(),
            }),
            Value::Boolean(flag) => Ok(LiteralValue {
                kind: LiteralKind::Boolean,
                value: if *flag { "true" } else { "false" }.to_string(),
            }),
            other => Err(Error::Unsupported(format!("unsupported literal {other}"))),
        },
        other => Err(Error::Unsupported(format!("unsupported literal {other}"))),
    }
}

fn field_literal_comparison(
    field: &str,
    lit: &LiteralValue,
    flipped: bool,
    cmp: Comparison,
) -> Result<String> {
    match cmp {
        Comparison::Equal => Ok(format!("{field}:{}", lit.format())),
        Comparison::NotEqual => Ok(format!("-{field}:{}", lit.format())),
        Comparison::Greater | Comparison::GreaterEqual | Comparison::Less | Comparison::LessEqual => {
            if flipped {
                return Err(Error::Invalid(
                    "comparisons must have identifier on left side".into(),
                ));
            }
            let op = match cmp {
                Comparison::Greater => ">",
                Comparison::GreaterEqual => ">=",
                Comparison::Less => "<",
                _ => "<=",
            };
            Ok(format!("{field}:{op}{}", lit.format()))
        }
    }
}

fn field_comparison(left: &str, right: &str, cmp: Comparison) -> Result<String> {
    match cmp {
        Comparison::Equal => Ok(format!("{left}:eq_field({right})")),
        Comparison::NotEqual => Ok(format!("-{left}:eq_field({right})")),
        Comparison::Less => Ok(format!("{left}:lt_field({right})")),
        Comparison::LessEqual => Ok(format!("{left}:le_field({right})")),
        Comparison::Greater => Ok(format!("-{left}:le_field({right})")),
        Comparison::GreaterEqual => Ok(format!("-{left}:lt_field({right})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_spec_classification() {
        let star = TableSpec::new("  ");
        assert_eq!(star.filter, "*");
        assert!(star.pipeline.is_empty());

        let filter = TableSpec::new("app:nginx");
        assert_eq!(filter.filter, "app:nginx");
        assert!(filter.pipeline.is_empty());

        let pipeline = TableSpec::new("* | filter app:nginx");
        assert!(pipeline.filter.is_empty());
        assert_eq!(pipeline.pipeline, "* | filter app:nginx");
    }

    #[test]
    fn aggregate_keys_fold_case() {
        assert_eq!(aggregate_key("count", "*"), "COUNT(*)");
        assert_eq!(aggregate_key("Count", ""), "COUNT(*)");
        assert_eq!(aggregate_key("SUM", "Price"), "SUM(price)");
    }

    #[test]
    fn alias_sanitization() {
        assert_eq!(sanitize_alias_from_field("user.name"), "user_name");
        assert_eq!(sanitize_alias_from_field("(a + b) * 2"), "a_b_2");
        assert_eq!(sanitize_alias_from_field("***"), "col");
        assert_eq!(sanitize_alias_from_field("Host-Name"), "host_name");
    }

    #[test]
    fn trim_patterns_embed_alias_capture() {
        assert_eq!(
            build_trim_pattern("TRIM", "t").expect("pattern"),
            "(?s)^\\s*(?P<t>.*?\\S)?\\s*$"
        );
        assert_eq!(
            build_trim_pattern("LTRIM", "t").expect("pattern"),
            "(?s)^\\s*(?P<t>.*)$"
        );
        assert_eq!(
            build_trim_pattern("RTRIM", "t").expect("pattern"),
            "(?s)^(?P<t>.*?\\S)?\\s*$"
        );
    }

    #[test]
    fn projection_alias_validation() {
        assert_eq!(
            make_projection_alias("u", "upper", "name").expect("alias"),
            "u"
        );
        assert_eq!(
            make_projection_alias("", "upper", "user.name").expect("alias"),
            "upper_user_name"
        );
        assert!(make_projection_alias("bad alias", "upper", "name").is_err());
    }
}
