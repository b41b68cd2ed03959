use crate::types::Label;
use std::collections::HashMap;

/// Display name for faces that are unrecognized or whose label has no name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Confidence values at or above this are treated as unrecognized.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 150.0;

/// Label → display name lookup built from the catalog.
#[derive(Debug, Clone, Default)]
pub struct KnownNames(HashMap<Label, String>);

impl KnownNames {
    pub fn get(&self, label: Label) -> Option<&str> {
        self.0.get(&label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Label, String)> for KnownNames {
    fn from_iter<I: IntoIterator<Item = (Label, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Maps a recognizer prediction to the name shown on the frame.
#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver {
    threshold: f64,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl IdentityResolver {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Name for `label` when `confidence` is strictly below the threshold,
    /// otherwise [`UNKNOWN_NAME`]. A label with no catalog entry also
    /// resolves to [`UNKNOWN_NAME`].
    pub fn resolve(&self, label: Label, confidence: f64, names: &KnownNames) -> String {
        if confidence.is_nan() || confidence >= self.threshold {
            return UNKNOWN_NAME.to_string();
        }
        match names.get(label) {
            Some(name) => name.to_string(),
            None => {
                tracing::debug!(label, confidence, "label has no catalog name");
                UNKNOWN_NAME.to_string()
            }
        }
    }
}
