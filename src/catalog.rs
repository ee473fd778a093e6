//! Which structure labels are still free for new rectangles.

use std::collections::HashSet;

pub const DEFAULT_STRUCTURES: &[&str] = &[
    "Cisternae Magna",
    "Intracranial Translucency",
    "Nuchal Translucency",
    "Midbrain",
    "Nasal Bone",
    "Nasal Skin",
    "Nasal Tip",
    "Palate",
    "Thalami",
];

/// Shown in place of the selector once every label is in use.
pub const EXHAUSTED_TEXT: &str = "All structures annotated";

/// The ordered catalog plus the label currently picked for new rectangles.
///
/// Used labels are not stored here; they are passed in from the rectangle model
/// on every [`LabelCatalog::refresh`].
#[derive(Clone, Debug)]
pub struct LabelCatalog {
    all: Vec<String>,
    available: Vec<String>,
    selected: Option<String>,
}

impl LabelCatalog {
    pub fn new(structures: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut seen = HashSet::new();
        let all: Vec<String> = structures
            .into_iter()
            .map(Into::into)
            .filter(|s| seen.insert(s.clone()))
            .collect();
        let mut catalog = Self {
            available: all.clone(),
            selected: None,
            all,
        };
        catalog.selected = catalog.available.first().cloned();
        catalog
    }

    pub fn all(&self) -> &[String] {
        &self.all
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.available.is_empty()
    }

    /// Recomputes `all − used`. The selection survives while it is still free,
    /// otherwise it moves to the first free label (or none).
    pub fn refresh<'a>(&mut self, used: impl IntoIterator<Item = &'a str>) {
        let used: HashSet<&str> = used.into_iter().collect();
        self.available = self
            .all
            .iter()
            .filter(|s| !used.contains(s.as_str()))
            .cloned()
            .collect();
        let keep = self
            .selected
            .as_ref()
            .is_some_and(|s| self.available.contains(s));
        if !keep {
            self.selected = self.available.first().cloned();
        }
    }

    /// Selects `label` if it is available.
    pub fn select(&mut self, label: &str) -> bool {
        if !self.available.iter().any(|s| s == label) {
            return false;
        }
        self.selected = Some(label.to_string());
        true
    }
}

impl Default for LabelCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_STRUCTURES.iter().copied())
    }
}
