use serde::Serialize;

/// Specification attributes parsed from the retail product page.
///
/// Label order is significant: it defines the indices recorded in
/// [`AttributeMatch`] and the scan order of the literal-match strategy,
/// so the set is kept as an ordered list rather than a hash map.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceAttributes(Vec<(String, String)>);

impl SourceAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.0.push((label.into(), value.into()));
    }

    /// Value of the attribute with the given label, if present.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value.as_str())
    }

    /// Position of the label in page order.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.0.iter().position(|(name, _)| name == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for SourceAttributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Opaque reference to a selectable value on the procurement page.
///
/// Only the procurement adapter interprets the token; the matching core
/// passes it through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueHandle {
    pub row: usize,
    pub token: String,
}

/// One characteristic table row as scraped from the procurement page,
/// before any matching has been applied.
#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub name: String,
    /// Candidate values in page display order, lowercased at parse time.
    pub values: Vec<String>,
    /// Activation refs parallel to `values`.
    pub handles: Vec<ValueHandle>,
}

/// One catalog field after the matching pass.
///
/// `description` is the best-matched retail attribute label (empty when the
/// row found no counterpart); `default_value`, when set, is a member of
/// `values`.
#[derive(Debug, Clone, Serialize)]
pub struct TargetAttribute {
    pub name: String,
    pub values: Vec<String>,
    #[serde(skip)]
    pub refs: Vec<ValueHandle>,
    pub description: String,
    pub default_value: String,
}

impl TargetAttribute {
    pub fn unresolved(row: CatalogRow) -> Self {
        Self {
            name: row.name,
            values: row.values,
            refs: row.handles,
            description: String::new(),
            default_value: String::new(),
        }
    }
}

/// A confirmed semantic link between a retail attribute and a catalog field,
/// both identified by page-order index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeMatch {
    pub source: usize,
    pub target: usize,
}
