//! Minimal JSON-path parsing for `JSON_VALUE`.
//!
//! Supports the dotted subset (`$.a.b`), bracketed keys (`$['a']`,
//! `$["a"]`), numeric indexes (`$.a[0]`) and wildcards (`$.a[*]`, `$.a.*`).
//! Only pure key paths can be mapped onto `unpack_json`; callers use
//! [`JsonPath::has_only_keys`] to reject everything else.

use sqlogs_result::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(u64),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::Invalid(format!("invalid JSON path \"{path}\": {reason}"));

        let mut chars = path.chars().peekable();
        if chars.next() != Some('$') {
            return Err(invalid("must start with '$'"));
        }

        let mut segments = Vec::new();
        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    if chars.peek() == Some(&'.') {
                        return Err(invalid("recursive descent is not supported"));
                    }
                    let mut key = String::new();
                    while let Some(&next) = chars.peek() {
                        if next == '.' || next == '[' {
                            break;
                        }
                        key.push(next);
                        chars.next();
                    }
                    if key.is_empty() {
                        return Err(invalid("empty key segment"));
                    }
                    if key == "*" {
                        segments.push(Segment::Wildcard);
                    } else {
                        segments.push(Segment::Key(key));
                    }
                }
                '[' => {
                    chars.next();
                    match chars.peek() {
                        Some(&quote) if quote == '\'' || quote == '"' => {
                            chars.next();
                            let mut key = String::new();
                            loop {
                                match chars.next() {
                                    Some(next) if next == quote => break,
                                    Some(next) => key.push(next),
                                    None => return Err(invalid("unterminated quoted key")),
                                }
                            }
                            if chars.next() != Some(']') {
                                return Err(invalid("missing ']' after quoted key"));
                            }
                            if key.is_empty() {
                                return Err(invalid("empty key segment"));
                            }
                            segments.push(Segment::Key(key));
                        }
                        Some('*') => {
                            chars.next();
                            if chars.next() != Some(']') {
                                return Err(invalid("missing ']' after '*'"));
                            }
                            segments.push(Segment::Wildcard);
                        }
                        _ => {
                            let mut digits = String::new();
                            while let Some(&next) = chars.peek() {
                                if next == ']' {
                                    break;
                                }
                                digits.push(next);
                                chars.next();
                            }
                            if chars.next() != Some(']') {
                                return Err(invalid("missing ']'"));
                            }
                            let index = digits
                                .parse::<u64>()
                                .map_err(|_| invalid("invalid array index"))?;
                            segments.push(Segment::Index(index));
                        }
                    }
                }
                _ => return Err(invalid("unexpected character")),
            }
        }
        Ok(JsonPath { segments })
    }

    /// The key segments of the path, or `None` when the path contains array
    /// indexes or wildcards.
    pub fn has_only_keys(&self) -> Option<Vec<&str>> {
        let mut keys = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Key(key) => keys.push(key.as_str()),
                Segment::Index(_) | Segment::Wildcard => return None,
            }
        }
        Some(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_keys() {
        let path = JsonPath::parse("$.a.b.c").expect("parse");
        assert_eq!(path.has_only_keys(), Some(vec!["a", "b", "c"]));
    }

    #[test]
    fn parses_bracketed_keys() {
        let path = JsonPath::parse("$['a'][\"b c\"]").expect("parse");
        assert_eq!(path.has_only_keys(), Some(vec!["a", "b c"]));
    }

    #[test]
    fn arrays_are_not_pure_key_paths() {
        let path = JsonPath::parse("$.a[0]").expect("parse");
        assert_eq!(path.has_only_keys(), None);
        let path = JsonPath::parse("$.a[*]").expect("parse");
        assert_eq!(path.has_only_keys(), None);
        let path = JsonPath::parse("$.a.*").expect("parse");
        assert_eq!(path.has_only_keys(), None);
    }

    #[test]
    fn root_only_path_has_no_keys() {
        let path = JsonPath::parse("$").expect("parse");
        assert_eq!(path.has_only_keys(), Some(Vec::new()));
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(JsonPath::parse("a.b").is_err());
        assert!(JsonPath::parse("$..a").is_err());
        assert!(JsonPath::parse("$.").is_err());
        assert!(JsonPath::parse("$['a'").is_err());
        assert!(JsonPath::parse("$[x]").is_err());
    }
}
