//! Path templates, the segment matcher, and host patterns.
//!
//! A path template is an ordered sequence of segment specifiers:
//!
//! - `users` — literal, matches iff the input segment is byte-equal
//! - `:name` — capture, matches any single segment
//! - `bar-:name` — prefixed capture, matches segments starting with `bar-`
//!   and binds only the part after the prefix
//! - `*name` — trailing glob, consumes one or more remaining segments and
//!   binds the ordered sequence
//! - `bar-*name` — prefixed trailing glob: the first remaining segment must
//!   start with `bar-`; the bound sequence keeps it unmodified
//! - `*` — trailing any-glob, consumes the rest without binding
//!
//! Captured values are percent-decoded; literal comparison happens on the
//! raw segment bytes. Glob segments are only valid in trailing position,
//! which [`PathSpec::parse`] enforces at build time.

use manifold_conn::{ParamValue, Params};
use thiserror::Error;

/// One element of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Exact segment.
    Literal(String),
    /// Named single-segment capture.
    Capture(String),
    /// Literal prefix followed by a named capture of the rest.
    PrefixCapture {
        /// The literal prefix, including its trailing `-`.
        prefix: String,
        /// Capture name bound to the segment with the prefix stripped.
        name: String,
    },
    /// Named capture of all remaining segments.
    Glob(String),
    /// Glob whose first segment must start with a literal prefix.
    PrefixGlob {
        /// The literal prefix, including its trailing `-`.
        prefix: String,
        /// Capture name bound to the remaining segments, first unmodified.
        name: String,
    },
    /// Unnamed glob: consumes the rest, binds nothing.
    GlobAny,
}

impl Segment {
    fn is_glob(&self) -> bool {
        matches!(
            self,
            Self::Glob(_) | Self::PrefixGlob { .. } | Self::GlobAny
        )
    }
}

/// Structurally invalid path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A glob segment appeared before the last position.
    #[error("glob segment `{0}` is only allowed in trailing position")]
    GlobNotTrailing(String),
    /// A capture or glob specifier with no name.
    #[error("empty capture name in segment `{0}`")]
    EmptyName(String),
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathSpec {
    segments: Vec<Segment>,
}

impl PathSpec {
    /// Parse a template like `/users/:id/files/*rest`.
    ///
    /// # Errors
    ///
    /// Fails fast on structurally invalid templates: globs before the
    /// trailing position, or captures without a name.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let parts: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (idx, part) in parts.iter().enumerate() {
            let segment = parse_segment(part)?;
            if segment.is_glob() && idx + 1 != parts.len() {
                return Err(TemplateError::GlobNotTrailing((*part).to_string()));
            }
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    /// The compiled segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the template ends in a glob.
    #[must_use]
    pub fn has_glob(&self) -> bool {
        self.segments.last().is_some_and(Segment::is_glob)
    }

    /// Match the template against a full path, consuming every segment.
    ///
    /// Returns the capture bindings on success. A trailing glob requires
    /// at least one remaining segment.
    #[must_use]
    pub fn matches(&self, input: &[String]) -> Option<Params> {
        let (params, consumed) = self.run(input)?;
        (consumed == input.len()).then_some(params)
    }

    /// Match the template as a leading prefix of the path.
    ///
    /// Returns the capture bindings and the number of input segments
    /// consumed; the leftover may be empty. Only meaningful for templates
    /// without globs (forward prefixes).
    #[must_use]
    pub fn match_prefix(&self, input: &[String]) -> Option<(Params, usize)> {
        self.run(input)
    }

    fn run(&self, input: &[String]) -> Option<(Params, usize)> {
        let mut params = Params::new();
        let mut idx = 0;
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    if input.get(idx)? != literal {
                        return None;
                    }
                    idx += 1;
                }
                Segment::Capture(name) => {
                    let value = input.get(idx)?;
                    params.insert(name.clone(), decode_segment(value));
                    idx += 1;
                }
                Segment::PrefixCapture { prefix, name } => {
                    let rest = input.get(idx)?.strip_prefix(prefix.as_str())?;
                    params.insert(name.clone(), decode_segment(rest));
                    idx += 1;
                }
                Segment::Glob(name) => {
                    if idx >= input.len() {
                        return None;
                    }
                    let rest: Vec<String> = input[idx..].iter().map(|s| decode_segment(s)).collect();
                    params.insert(name.clone(), ParamValue::Seq(rest));
                    idx = input.len();
                }
                Segment::PrefixGlob { prefix, name } => {
                    let first = input.get(idx)?;
                    if !first.starts_with(prefix.as_str()) {
                        return None;
                    }
                    // The first segment is bound unmodified: prefix retained.
                    let rest: Vec<String> = input[idx..].iter().map(|s| decode_segment(s)).collect();
                    params.insert(name.clone(), ParamValue::Seq(rest));
                    idx = input.len();
                }
                Segment::GlobAny => {
                    if idx >= input.len() {
                        return None;
                    }
                    idx = input.len();
                }
            }
        }
        Some((params, idx))
    }
}

fn parse_segment(part: &str) -> Result<Segment, TemplateError> {
    if part == "*" {
        return Ok(Segment::GlobAny);
    }
    if let Some(name) = part.strip_prefix(':') {
        if name.is_empty() {
            return Err(TemplateError::EmptyName(part.to_string()));
        }
        return Ok(Segment::Capture(name.to_string()));
    }
    if let Some(name) = part.strip_prefix('*') {
        if name.is_empty() {
            return Err(TemplateError::EmptyName(part.to_string()));
        }
        return Ok(Segment::Glob(name.to_string()));
    }
    if let Some(pos) = part.find("-:") {
        let name = &part[pos + 2..];
        if name.is_empty() {
            return Err(TemplateError::EmptyName(part.to_string()));
        }
        return Ok(Segment::PrefixCapture {
            prefix: part[..=pos].to_string(),
            name: name.to_string(),
        });
    }
    if let Some(pos) = part.find("-*") {
        let name = &part[pos + 2..];
        if name.is_empty() {
            return Err(TemplateError::EmptyName(part.to_string()));
        }
        return Ok(Segment::PrefixGlob {
            prefix: part[..=pos].to_string(),
            name: name.to_string(),
        });
    }
    Ok(Segment::Literal(part.to_string()))
}

/// Percent-decode a captured segment.
///
/// Invalid encodings bind the raw segment rather than failing the match.
fn decode_segment(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }
    let mut out = Vec::with_capacity(s.len());
    let mut bytes = s.bytes();
    while let Some(byte) = bytes.next() {
        if byte == b'%' {
            let (Some(hi), Some(lo)) = (bytes.next(), bytes.next()) else {
                return s.to_string();
            };
            let (Some(hi), Some(lo)) = (char::from(hi).to_digit(16), char::from(lo).to_digit(16))
            else {
                return s.to_string();
            };
            out.push((hi * 16 + lo) as u8);
        } else {
            out.push(byte);
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}

/// Host constraint of a route.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostSpec {
    /// No constraint: matches any host.
    #[default]
    Any,
    /// Exact host string.
    Exact(String),
    /// Pattern ending in `.`: matches any host starting with the prefix.
    Prefix(String),
}

impl HostSpec {
    /// Parse a host pattern: a trailing `.` makes it a prefix pattern.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        if pattern.ends_with('.') {
            Self::Prefix(pattern.to_string())
        } else {
            Self::Exact(pattern.to_string())
        }
    }

    /// Check a request host against this constraint.
    #[must_use]
    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(exact) => host == exact,
            Self::Prefix(prefix) => host.starts_with(prefix.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn literal_requires_byte_equality() {
        let spec = PathSpec::parse("/1/bar").unwrap();
        assert!(spec.matches(&segs(&["1", "bar"])).is_some());
        assert!(spec.matches(&segs(&["1", "baz"])).is_none());
        assert!(spec.matches(&segs(&["1"])).is_none());
        assert!(spec.matches(&segs(&["1", "bar", "extra"])).is_none());
    }

    #[test]
    fn capture_binds_single_segment() {
        let spec = PathSpec::parse("/2/:bar").unwrap();
        let params = spec.matches(&segs(&["2", "value"])).unwrap();
        assert_eq!(params.get_str("bar"), Some("value"));
    }

    #[test]
    fn prefix_capture_binds_suffix_only() {
        let spec = PathSpec::parse("/3/bar-:bar").unwrap();
        let params = spec.matches(&segs(&["3", "bar-value"])).unwrap();
        assert_eq!(params.get_str("bar"), Some("value"));
        assert!(spec.matches(&segs(&["3", "baz-value"])).is_none());
    }

    #[test]
    fn glob_binds_remaining_segments() {
        let spec = PathSpec::parse("/4/*bar").unwrap();
        let params = spec.matches(&segs(&["4", "value", "extra"])).unwrap();
        assert_eq!(
            params.get("bar").unwrap().as_seq().unwrap(),
            &["value".to_string(), "extra".to_string()]
        );
    }

    #[test]
    fn glob_requires_at_least_one_segment() {
        let spec = PathSpec::parse("/4/*bar").unwrap();
        assert!(spec.matches(&segs(&["4"])).is_none());
    }

    #[test]
    fn prefix_glob_keeps_first_segment_unmodified() {
        let spec = PathSpec::parse("/5/bar-*bar").unwrap();
        let params = spec.matches(&segs(&["5", "bar-value", "extra"])).unwrap();
        assert_eq!(
            params.get("bar").unwrap().as_seq().unwrap(),
            &["bar-value".to_string(), "extra".to_string()]
        );
        assert!(spec.matches(&segs(&["5", "baz-value"])).is_none());
    }

    #[test]
    fn any_glob_binds_nothing() {
        let spec = PathSpec::parse("/6/*").unwrap();
        let params = spec.matches(&segs(&["6", "a", "b"])).unwrap();
        assert!(params.is_empty());
        assert!(spec.matches(&segs(&["6"])).is_none());
    }

    #[test]
    fn glob_must_be_trailing() {
        let err = PathSpec::parse("/a/*rest/b").unwrap_err();
        assert_eq!(err, TemplateError::GlobNotTrailing("*rest".to_string()));
    }

    #[test]
    fn empty_capture_name_is_rejected() {
        assert_eq!(
            PathSpec::parse("/a/:").unwrap_err(),
            TemplateError::EmptyName(":".to_string())
        );
        assert_eq!(
            PathSpec::parse("/a/bar-:").unwrap_err(),
            TemplateError::EmptyName("bar-:".to_string())
        );
    }

    #[test]
    fn captures_are_percent_decoded() {
        let spec = PathSpec::parse("/f/:name").unwrap();
        let params = spec.matches(&segs(&["f", "caf%C3%A9"])).unwrap();
        assert_eq!(params.get_str("name"), Some("café"));
    }

    #[test]
    fn invalid_encoding_binds_raw() {
        let spec = PathSpec::parse("/f/:name").unwrap();
        let params = spec.matches(&segs(&["f", "bad%2"])).unwrap();
        assert_eq!(params.get_str("name"), Some("bad%2"));
    }

    #[test]
    fn literals_are_not_decoded() {
        // `%63at` decodes to `cat`, but literal matching is byte-equal.
        let spec = PathSpec::parse("/cat").unwrap();
        assert!(spec.matches(&segs(&["%63at"])).is_none());
    }

    #[test]
    fn prefix_match_allows_empty_leftover() {
        let spec = PathSpec::parse("/users").unwrap();
        let (_, consumed) = spec.match_prefix(&segs(&["users"])).unwrap();
        assert_eq!(consumed, 1);
        let (_, consumed) = spec.match_prefix(&segs(&["users", "42"])).unwrap();
        assert_eq!(consumed, 1);
        assert!(spec.match_prefix(&segs(&["items"])).is_none());
    }

    #[test]
    fn prefix_match_binds_captures() {
        let spec = PathSpec::parse("/tenants/:tenant").unwrap();
        let (params, consumed) = spec
            .match_prefix(&segs(&["tenants", "acme", "users"]))
            .unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(params.get_str("tenant"), Some("acme"));
    }

    #[test]
    fn host_exact_and_prefix() {
        assert!(HostSpec::Any.matches("anything.example.com"));

        let exact = HostSpec::parse("api.example.com");
        assert!(exact.matches("api.example.com"));
        assert!(!exact.matches("api.example.com.evil"));

        let prefix = HostSpec::parse("api.");
        assert_eq!(prefix, HostSpec::Prefix("api.".to_string()));
        assert!(prefix.matches("api.example.com"));
        assert!(prefix.matches("api.other.org"));
        assert!(!prefix.matches("www.example.com"));
        assert!(!prefix.matches("api"));
    }
}
