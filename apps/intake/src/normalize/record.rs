use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Confidence applied to any field the parser did not score. 0–100 scale.
pub const DEFAULT_CONFIDENCE: f64 = 95.0;
/// Confidence a field takes once a human has corrected it.
pub const MAX_CONFIDENCE: f64 = 100.0;
/// Fields at or below this score are flagged for review.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 70.0;

/// One flattened leaf of the parser's result tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedField {
    pub path: String,
    pub value: String,
    pub confidence: f64,
}

impl AnnotatedField {
    pub fn new(path: impl Into<String>, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
            confidence: clamp_confidence(confidence),
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence <= LOW_CONFIDENCE_THRESHOLD
    }
}

/// Keeps every confidence on the canonical 0–100 scale. NaN counts as unscored.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        DEFAULT_CONFIDENCE
    } else {
        confidence.clamp(0.0, MAX_CONFIDENCE)
    }
}

/// Flat mapping of dotted path → annotated field.
///
/// Backed by a `BTreeMap` so serialization is stable; the order itself has no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet(BTreeMap<String, AnnotatedField>);

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field under its own path. A later insert for the same path wins.
    pub fn insert(&mut self, field: AnnotatedField) {
        self.0.insert(field.path.clone(), field);
    }

    /// Plain union; entries from `other` overwrite on collision.
    pub fn merge(&mut self, other: RecordSet) {
        self.0.extend(other.0);
    }

    pub fn get(&self, path: &str) -> Option<&AnnotatedField> {
        self.0.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotatedField> {
        self.0.values()
    }

    /// Returns a new set in which `path` carries `value` at full confidence.
    /// Every other entry is carried over untouched. `None` if `path` is unknown.
    pub fn with_correction(&self, path: &str, value: &str) -> Option<RecordSet> {
        if !self.contains(path) {
            return None;
        }
        let mut next = self.clone();
        next.insert(AnnotatedField::new(path, value, MAX_CONFIDENCE));
        Some(next)
    }
}

impl FromIterator<AnnotatedField> for RecordSet {
    fn from_iter<I: IntoIterator<Item = AnnotatedField>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for field in iter {
            set.insert(field);
        }
        set
    }
}
