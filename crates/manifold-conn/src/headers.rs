//! Case-insensitive header map.

/// HTTP headers with case-insensitive name lookup.
///
/// Insertion order is preserved. Values are stored as strings; CR, LF and
/// NUL bytes are stripped on insertion so a header value can never smuggle
/// additional header lines onto the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Insert a header, replacing any existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = sanitize(value.into());
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Remove a header by name, returning its value if present.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    /// Check if a header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Strip CR, LF and NUL to prevent header injection.
fn sanitize(value: String) -> String {
    if value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
        value
            .chars()
            .filter(|&c| c != '\r' && c != '\n' && c != '\0')
            .collect()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn insert_replaces_same_name() {
        let mut headers = Headers::new();
        headers.insert("x-tag", "a");
        headers.insert("X-Tag", "b");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-tag"), Some("b"));
    }

    #[test]
    fn crlf_is_stripped() {
        let mut headers = Headers::new();
        headers.insert("x-evil", "ok\r\nInjected: yes");
        assert_eq!(headers.get("x-evil"), Some("okInjected: yes"));
    }

    #[test]
    fn remove_returns_value() {
        let mut headers = Headers::new();
        headers.insert("x-tag", "a");
        assert_eq!(headers.remove("X-TAG"), Some("a".to_string()));
        assert!(headers.is_empty());
    }
}
