//! Ordered header multimap.
//!
//! [`http::HeaderMap`] groups values by name, which loses the wire order of
//! interleaved fields. [`Headers`] keeps every field in the order it was
//! appended while still using the typed [`HeaderName`] and [`HeaderValue`]
//! from the `http` crate, so lookups stay case-insensitive.

use std::slice;

use http::{HeaderMap, HeaderName, HeaderValue};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a field, keeping any existing field with the same name.
    pub fn append(&mut self, name: HeaderName, value: HeaderValue) {
        self.entries.push((name, value));
    }

    /// Replaces every field named `name` with a single field at the position of the first one.
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        match self.entries.iter().position(|(n, _)| *n == name) {
            Some(index) => {
                self.entries[index].1 = value;
                let mut seen = 0usize;
                self.entries.retain(|(n, _)| {
                    if *n != name {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Removes every field named `name`, returning how many were removed.
    pub fn remove(&mut self, name: &HeaderName) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        before - self.entries.len()
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn first(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn last(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.entries.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_all<'a>(&'a self, name: &'a HeaderName) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        self.entries.iter().filter(move |(n, _)| n == name).map(|(_, v)| v)
    }

    /// Number of fields named `name`.
    pub fn count(&self, name: &HeaderName) -> usize {
        self.entries.iter().filter(|(n, _)| n == name).count()
    }

    /// Returns true if any comma separated element of any `name` field equals `token`,
    /// ignoring ASCII case.
    pub fn contains_token(&self, name: &HeaderName, token: &str) -> bool {
        self.tokens(name).any(|t| t.eq_ignore_ascii_case(token))
    }

    /// Iterates the trimmed comma separated elements of every `name` field.
    pub fn tokens<'a>(&'a self, name: &'a HeaderName) -> impl Iterator<Item = &'a str> + 'a {
        self.get_all(name)
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn iter(&self) -> slice::Iter<'_, (HeaderName, HeaderValue)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Converts into an [`HeaderMap`], grouping values by name.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            map.append(name.clone(), value.clone());
        }
        map
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = Headers::with_capacity(map.len());
        for (name, value) in map {
            headers.append(name.clone(), value.clone());
        }
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a (HeaderName, HeaderValue);
    type IntoIter = slice::Iter<'a, (HeaderName, HeaderValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(HeaderName, HeaderValue)> for Headers {
    fn from_iter<T: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    #[test]
    fn keeps_insertion_order_across_names() {
        let mut headers = Headers::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::HOST, HeaderValue::from_static("h"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let names: Vec<&str> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["set-cookie", "host", "set-cookie"]);
        assert_eq!(headers.count(&header::SET_COOKIE), 2);
        assert_eq!(headers.first(&header::SET_COOKIE).unwrap(), "a=1");
        assert_eq!(headers.last(&header::SET_COOKIE).unwrap(), "b=2");
    }

    #[test]
    fn set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.append(header::CONTENT_LENGTH, HeaderValue::from_static("1"));
        headers.append(header::HOST, HeaderValue::from_static("h"));
        headers.append(header::CONTENT_LENGTH, HeaderValue::from_static("2"));

        headers.set(header::CONTENT_LENGTH, HeaderValue::from_static("3"));

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.iter().next().unwrap().1, "3");
        assert_eq!(headers.remove(&header::CONTENT_LENGTH), 1);
        assert!(!headers.contains(&header::CONTENT_LENGTH));
    }

    #[test]
    fn token_lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.append(header::CONNECTION, HeaderValue::from_static("Keep-Alive, Upgrade"));
        headers.append(header::CONNECTION, HeaderValue::from_static("CLOSE"));

        assert!(headers.contains_token(&header::CONNECTION, "close"));
        assert!(headers.contains_token(&header::CONNECTION, "upgrade"));
        assert!(!headers.contains_token(&header::CONNECTION, "te"));
    }
}
