//! Lexical rendering of LogsQL tokens.
//!
//! Three character classes govern how a value is emitted:
//!
//! - bare: `[A-Za-z0-9_.:/-]+`, emitted verbatim
//! - wildcard: bare characters plus at most one `*`
//! - format-field: `[A-Za-z0-9_.-]+`, the subset safe inside `format`
//!   patterns and regexp capture-group names
//!
//! Anything outside its class is wrapped in double quotes with `\` and `"`
//! escaped. The quoting decisions here are load-bearing: tests compare the
//! rendered LogsQL byte for byte.

pub(crate) fn is_bare_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-')
}

/// `[A-Za-z0-9_.:/-]+`
pub fn is_bare_literal(value: &str) -> bool {
    !value.is_empty() && value.chars().all(is_bare_char)
}

/// Bare characters with at most one `*` anywhere. Matches the empty string.
pub fn is_wildcard_literal(value: &str) -> bool {
    value.chars().filter(|c| *c == '*').count() <= 1
        && value.chars().all(|c| c == '*' || is_bare_char(c))
}

/// `[A-Za-z0-9_.-]+`, the class allowed inside `format` patterns and as
/// regexp capture-group names.
pub fn is_format_field(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Wrap in double quotes, escaping `\` and `"`.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Render a string literal: bare and single-wildcard values pass through
/// unquoted, everything else is quoted. The empty string renders as `""`.
pub fn format_string(value: &str) -> String {
    if value.is_empty() {
        return quote_string(value);
    }
    if is_bare_literal(value) || is_wildcard_literal(value) {
        return value.to_string();
    }
    quote_string(value)
}

/// Render a field name: bare names pass through, the rest are quoted.
pub fn format_field_name(name: &str) -> String {
    if is_bare_literal(name) {
        return name.to_string();
    }
    quote_string(name)
}

/// Render a wildcard pattern, quoting when any character falls outside
/// `[A-Za-z0-9._:/*-]` plus `_`.
pub fn format_wildcard(value: &str) -> String {
    if needs_quote_for_pattern(value) {
        quote_string(value)
    } else {
        value.to_string()
    }
}

fn needs_quote_for_pattern(value: &str) -> bool {
    value.chars().any(|c| c != '*' && c != '_' && !is_bare_char(c))
}

/// Convert a SQL LIKE pattern into its LogsQL counterpart.
///
/// Patterns with no metacharacters become literal matches; a single leading
/// or trailing `%` becomes a wildcard; `%x%` becomes a contains wildcard.
/// Everything else falls back to an anchored regex where `%` maps to `.*`,
/// `_` to `.`, `\X` to the escaped literal `X`, and all other characters are
/// regex-quoted.
pub fn convert_like_pattern(pattern: &str) -> String {
    let percent_count = pattern.matches('%').count();
    let underscore = pattern.contains('_');

    if percent_count == 0 && !underscore {
        return format_string(pattern);
    }
    if percent_count == 1 && pattern.ends_with('%') && !underscore {
        let prefix = &pattern[..pattern.len() - 1];
        if prefix.is_empty() {
            return "*".to_string();
        }
        return format_wildcard(&format!("{prefix}*"));
    }
    if percent_count == 1 && pattern.starts_with('%') && !underscore {
        let suffix = &pattern[1..];
        if suffix.is_empty() {
            return "*".to_string();
        }
        return format_wildcard(&format!("*{suffix}"));
    }
    if percent_count == 2 && pattern.starts_with('%') && pattern.ends_with('%') && !underscore {
        let inner = &pattern[1..pattern.len() - 1];
        if !inner.contains('%') {
            if inner.is_empty() {
                return "*".to_string();
            }
            return format_wildcard(&format!("*{inner}*"));
        }
    }
    format!("~{}", quote_string(&like_to_regex(pattern)))
}

fn like_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                None => out.push('\\'),
            },
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Escape a `format` pipe pattern for embedding in double quotes.
pub fn escape_format_pattern(pattern: &str) -> String {
    pattern.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape a single-quoted body (regexp patterns, `replace` arguments).
pub fn escape_single_quotes(pattern: &str) -> String {
    pattern.replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_values_pass_through() {
        assert_eq!(format_string("error"), "error");
        assert_eq!(format_string("app.web:80/x-y"), "app.web:80/x-y");
        assert_eq!(format_field_name("_msg"), "_msg");
    }

    #[test]
    fn non_bare_values_are_quoted() {
        assert_eq!(format_string("two words"), "\"two words\"");
        assert_eq!(format_string("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(format_string(""), "\"\"");
        assert_eq!(format_field_name("a b"), "\"a b\"");
    }

    #[test]
    fn wildcard_values_stay_unquoted() {
        assert_eq!(format_string("foo*"), "foo*");
        assert_eq!(format_string("*foo*"), "\"*foo*\"");
        assert!(!is_wildcard_literal("*foo*"));
        assert!(is_wildcard_literal("foo*"));
    }

    #[test]
    fn formatting_is_idempotent_for_bare_values() {
        for value in ["error", "a.b", "x_y:z/1-2"] {
            let once = format_string(value);
            assert_eq!(format_string(&once), once);
            assert!(is_bare_literal(&format_field_name(value)));
        }
    }

    #[test]
    fn like_fast_paths() {
        assert_eq!(convert_like_pattern("exact"), "exact");
        assert_eq!(convert_like_pattern("foo%"), "foo*");
        assert_eq!(convert_like_pattern("%foo"), "*foo");
        assert_eq!(convert_like_pattern("%foo%"), "*foo*");
        assert_eq!(convert_like_pattern("%"), "*");
        assert_eq!(convert_like_pattern("%%"), "*");
    }

    #[test]
    fn like_regex_fallback() {
        assert_eq!(convert_like_pattern("a_c"), "~\"^a.c$\"");
        assert_eq!(convert_like_pattern("a%b%c"), "~\"^a.*b.*c$\"");
        assert_eq!(convert_like_pattern("50\\%%"), "~\"^50%.*$\"");
    }

    #[test]
    fn like_quotes_unsafe_wildcards() {
        assert_eq!(convert_like_pattern("a b%"), "\"a b*\"");
        assert_eq!(convert_like_pattern("a.b%"), "a.b*");
    }

    #[test]
    fn like_regexes_compile() {
        for pattern in ["a_c", "a%b%c", "x\\_y", "(parens)%"] {
            let converted = convert_like_pattern(pattern);
            let body = converted
                .strip_prefix("~\"")
                .and_then(|s| s.strip_suffix('"'))
                .expect("regex form");
            regex::Regex::new(&body.replace("\\\\", "\\")).expect("generated regex compiles");
        }
    }

    #[test]
    fn escapes() {
        assert_eq!(escape_format_pattern("<uc:a\"b>"), "<uc:a\\\"b>");
        assert_eq!(escape_format_pattern("a\\b"), "a\\\\b");
        assert_eq!(escape_single_quotes("it's"), "it\\'s");
    }
}
