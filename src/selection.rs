use std::collections::BTreeMap;

use tracing::debug;

use crate::construct::Catalog;
use crate::error::{CatalogError, Result};
use crate::filter::Registry;

/// Keys submitted by the page controls rather than by any filter.
pub const CONTROL_KEYS: [&str; 3] = ["Apply", "page", "submit"];
// clears every selection
pub const RESET_KEY: &str = "Reset";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    params: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bounds {
    pub from: String,
    pub to: String,
}

impl Bounds {
    pub fn parse(token: &str) -> Result<Self> {
        let mut parts = token.split(';');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(from), Some(to), None) => Ok(Self { from: from.to_owned(), to: to.to_owned() }),
            _ => Err(CatalogError::Input(format!(
                "Malformed range selection '{token}', expected 'from;to'"
            ))),
        }
    }
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_query(query: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| CatalogError::Input(format!("Malformed query string: {e}")))?;
        Ok(Self::from_pairs(pairs))
    }
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut selection = Self::new();
        for (key, value) in pairs {
            selection.push(key, value);
        }
        selection
    }
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.entry(key.into()).or_default().push(value.into());
    }
    pub fn set_list(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.params.insert(key.into(), values);
    }
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.params.remove(key)
    }
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }
    pub fn get_list(&self, key: &str) -> &[String] {
        self.params.get(key).map(Vec::as_slice).unwrap_or_default()
    }
    /// The last token submitted under the key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.last()).map(String::as_str)
    }
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
    /// Reads the key as a slider range, `None` when the key is absent or blank.
    pub fn range(&self, key: &str) -> Result<Option<Bounds>> {
        match self.get(key) {
            Some(token) if !token.is_empty() => Bounds::parse(token).map(Some),
            _ => Ok(None),
        }
    }
    pub fn to_query(&self) -> Result<String> {
        let pairs: Vec<(&str, &str)> = self
            .params
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
            .collect();
        serde_urlencoded::to_string(pairs)
            .map_err(|e| CatalogError::Invariant(format!("Could not encode selection: {e}")))
    }

    /// Drops blank tokens, control keys and slider selections spanning the whole range.
    pub fn normalize(&self, catalog: &Catalog) -> Result<Selection> {
        if self.contains(RESET_KEY) {
            return Ok(Selection::new());
        }
        let mut normalized = Selection::new();
        for (key, values) in &self.params {
            if CONTROL_KEYS.contains(&key.as_str()) {
                continue;
            }
            let kept: Vec<String> = values.iter().filter(|v| !v.is_empty()).cloned().collect();
            if !kept.is_empty() {
                normalized.set_list(key.clone(), kept);
            }
        }
        let registry = Registry::new(catalog);
        for filter in catalog.active_filters(&normalized) {
            if !filter.widget().is_slider() {
                continue;
            }
            if let Some(bounds) = normalized.range(filter.name())? {
                if registry.is_full_range(filter, &bounds.from, &bounds.to)? {
                    debug!(filter = filter.name(), "dropping full range selection");
                    normalized.remove(filter.name());
                }
            }
        }
        Ok(normalized)
    }
}
