//! Path expressions addressing a field inside a record.
//!
//! Grammar:
//!
//! ```text
//! path    := segment ("." segment)*
//! segment := name | name "[" digits "]" | name "[{" key ":" value "}]"
//! ```
//!
//! `items[2]` and `items[{id:2}]` expand into a `Name` segment followed by an
//! `Index` or `Predicate` segment. A trailing dot (`prop.`) addresses the
//! children of `prop` rather than `prop` itself.

use super::error::{PathError, PathResult};
use std::fmt;
use std::str::FromStr;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member access
    Name(String),
    /// Zero-based array element
    Index(usize),
    /// Array element whose `key` member loosely equals `value`
    Predicate { key: String, value: String },
}

impl Segment {
    /// True for segments that pick one array element
    pub fn is_selector(&self) -> bool {
        matches!(self, Segment::Index(_) | Segment::Predicate { .. })
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Segment::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(name) => write!(f, "{}", name),
            Segment::Index(index) => write!(f, "[{}]", index),
            Segment::Predicate { key, value } => write!(f, "[{{{}:{}}}]", key, value),
        }
    }
}

/// An immutable, parsed path. Built fresh for every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
    descend: bool,
}

impl FieldPath {
    /// Parses `raw` using the path grammar.
    pub fn parse(raw: &str) -> PathResult<Self> {
        if raw.is_empty() {
            return Err(PathError::parse(raw, "path is empty"));
        }

        let pieces = split_top_level(raw)?;
        let last = pieces.len() - 1;
        let mut segments = Vec::with_capacity(pieces.len());
        let mut descend = false;

        for (position, piece) in pieces.iter().enumerate() {
            if piece.is_empty() {
                if position == last && position > 0 {
                    descend = true;
                    continue;
                }
                return Err(PathError::parse(raw, "empty segment"));
            }
            parse_piece(raw, piece, &mut segments)?;
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            descend,
        })
    }

    /// Parses `raw`, except that a string naming an existing top-level field
    /// addresses that field directly even if it contains path punctuation.
    pub fn parse_with<F>(raw: &str, is_field: F) -> PathResult<Self>
    where
        F: Fn(&str) -> bool,
    {
        if !raw.is_empty() && is_field(raw) {
            return Ok(Self::field(raw));
        }
        Self::parse(raw)
    }

    /// A single-segment path naming `name`
    pub fn field(name: &str) -> Self {
        Self {
            raw: name.to_string(),
            segments: vec![Segment::Name(name.to_string())],
            descend: false,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the path was written with a trailing dot
    pub fn descend(&self) -> bool {
        self.descend
    }

    /// Name of the top-level field the path starts from
    pub fn root_name(&self) -> &str {
        self.segments
            .first()
            .and_then(Segment::as_name)
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// True when the final segment picks an array element
    pub fn ends_with_selector(&self) -> bool {
        self.segments.last().is_some_and(Segment::is_selector)
    }

    /// True when the path addresses a top-level field and nothing below it
    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Splits on dots that sit outside brackets and quotes.
fn split_top_level(raw: &str) -> PathResult<Vec<&str>> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in raw.char_indices() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' if depth > 0 => quote = Some(ch),
            '[' => depth += 1,
            ']' => {
                if depth == 0 {
                    return Err(PathError::parse(raw, "unbalanced ']'"));
                }
                depth -= 1;
            }
            '.' if depth == 0 => {
                pieces.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return Err(PathError::parse(raw, "unterminated '['"));
    }
    pieces.push(&raw[start..]);
    Ok(pieces)
}

fn parse_piece(raw: &str, piece: &str, segments: &mut Vec<Segment>) -> PathResult<()> {
    let open = match piece.find('[') {
        None => {
            segments.push(Segment::Name(piece.to_string()));
            return Ok(());
        }
        Some(0) => {
            return Err(PathError::parse(
                raw,
                "segment must start with a field name",
            ))
        }
        Some(open) => open,
    };

    let selector = &piece[open..];
    if !selector.ends_with(']') {
        return Err(PathError::parse(raw, "unexpected characters after ']'"));
    }
    let inner = &selector[1..selector.len() - 1];
    if closes_early(inner) {
        return Err(PathError::parse(raw, "unexpected characters after ']'"));
    }

    segments.push(Segment::Name(piece[..open].to_string()));
    segments.push(parse_selector(raw, inner)?);
    Ok(())
}

/// Detects a `]` that closes the selector before its final character.
fn closes_early(inner: &str) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for ch in inner.chars() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '[' => depth += 1,
            ']' if depth == 0 => return true,
            ']' => depth -= 1,
            _ => {}
        }
    }
    false
}

fn parse_selector(raw: &str, inner: &str) -> PathResult<Segment> {
    let trimmed = inner.trim();
    if let Some(body) = trimmed.strip_prefix('{') {
        let body = body.strip_suffix('}').ok_or_else(|| {
            PathError::parse(raw, "predicate must be written as [{key:value}]")
        })?;
        return parse_predicate(raw, body);
    }

    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(PathError::parse(
            raw,
            format!("index '{}' is not a non-negative integer", inner),
        ));
    }
    trimmed
        .parse::<usize>()
        .map(Segment::Index)
        .map_err(|_| PathError::parse(raw, format!("index '{}' is too large", inner)))
}

fn parse_predicate(raw: &str, body: &str) -> PathResult<Segment> {
    let malformed = || PathError::parse(raw, "predicate must contain exactly one key:value pair");

    let (key, value) = body.split_once(':').ok_or_else(malformed)?;
    let key = key.trim();
    let key = unquote(key).unwrap_or(key);
    if key.is_empty() || key.contains(',') || key.contains('"') || key.contains('\'') {
        return Err(malformed());
    }

    let value = value.trim();
    let value = match unquote(value) {
        Some(inner) => inner,
        None => {
            if value.is_empty() {
                return Err(PathError::parse(raw, "predicate value is empty"));
            }
            if value.contains(',') || value.contains(':') {
                return Err(malformed());
            }
            value
        }
    };

    Ok(Segment::Predicate {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Strips one pair of matching quotes, if the whole string is quoted.
fn unquote(text: &str) -> Option<&str> {
    let mut chars = text.chars();
    let first = chars.next()?;
    if (first != '"' && first != '\'') || text.len() < 2 || !text.ends_with(first) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    if inner.contains(first) {
        return None;
    }
    Some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Segment {
        Segment::Name(n.to_string())
    }

    #[test]
    fn test_parse_dotted_names() {
        let path = FieldPath::parse("obj.sub.str").unwrap();
        assert_eq!(path.segments(), &[name("obj"), name("sub"), name("str")]);
        assert!(!path.descend());
        assert_eq!(path.root_name(), "obj");
    }

    #[test]
    fn test_parse_index_and_predicate() {
        let path = FieldPath::parse("objAry[0].age").unwrap();
        assert_eq!(
            path.segments(),
            &[name("objAry"), Segment::Index(0), name("age")]
        );

        let path = FieldPath::parse("subArray[{num:15}].name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                name("subArray"),
                Segment::Predicate {
                    key: "num".to_string(),
                    value: "15".to_string()
                },
                name("name")
            ]
        );
        assert!(!path.ends_with_selector());
        assert!(FieldPath::parse("tags[1]").unwrap().ends_with_selector());
    }

    #[test]
    fn test_predicate_value_may_be_quoted() {
        let path = FieldPath::parse("items[{name:\"a.b\"}]").unwrap();
        assert_eq!(
            path.last(),
            Some(&Segment::Predicate {
                key: "name".to_string(),
                value: "a.b".to_string()
            })
        );

        let path = FieldPath::parse("items[{ 'id' : '10:30' }]").unwrap();
        assert_eq!(
            path.last(),
            Some(&Segment::Predicate {
                key: "id".to_string(),
                value: "10:30".to_string()
            })
        );
    }

    #[test]
    fn test_trailing_dot_descends() {
        let path = FieldPath::parse("subArray.").unwrap();
        assert_eq!(path.segments(), &[name("subArray")]);
        assert!(path.descend());
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "",
            "[1]",
            "ary[h]",
            "ary[-1]",
            "ary[1",
            "ary]",
            "a..b",
            ".a",
            "ary[1]x",
            "ary[1][2]",
            "items[{id}]",
            "items[{:1}]",
            "items[{id:1,name:2}]",
            "items[{id:1}",
            "items[{id:}]",
        ] {
            let err = FieldPath::parse(bad).unwrap_err();
            assert!(
                matches!(err, PathError::Parse { .. }),
                "expected parse error for '{}'",
                bad
            );
        }
    }

    #[test]
    fn test_parse_with_prefers_existing_field() {
        let path = FieldPath::parse_with("a.b", |name| name == "a.b").unwrap();
        assert_eq!(path.segments(), &[name("a.b")]);

        let path = FieldPath::parse_with("a.b", |name| name == "a").unwrap();
        assert_eq!(path.segments(), &[name("a"), name("b")]);
    }

    #[test]
    fn test_parse_does_not_touch_input() {
        let raw = String::from("a[{k:v}].b");
        let path = FieldPath::parse(&raw).unwrap();
        assert_eq!(raw, "a[{k:v}].b");
        assert_eq!(path.to_string(), raw);
    }
}
