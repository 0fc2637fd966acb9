//! Label registry: class id -> class name, plus the set of names that must be redacted.
//!
//! Both are immutable values injected at construction (detector adapter, region
//! selector). There is no module-level label table.

use std::collections::BTreeSet;
use std::sync::Arc;

/// Class names emitted by the bundled exposure detector, indexed by class id.
pub const EXPOSURE_LABELS: [&str; 18] = [
    "FEMALE_GENITALIA_COVERED",
    "FACE_FEMALE",
    "BUTTOCKS_EXPOSED",
    "FEMALE_BREAST_EXPOSED",
    "FEMALE_GENITALIA_EXPOSED",
    "MALE_BREAST_EXPOSED",
    "ANUS_EXPOSED",
    "FEET_EXPOSED",
    "BELLY_COVERED",
    "FEET_COVERED",
    "ARMPITS_COVERED",
    "ARMPITS_EXPOSED",
    "FACE_MALE",
    "BELLY_EXPOSED",
    "MALE_GENITALIA_EXPOSED",
    "ANUS_COVERED",
    "FEMALE_BREAST_COVERED",
    "BUTTOCKS_COVERED",
];

/// Default redact set.
pub const DEFAULT_REDACT_CLASSES: [&str; 5] = [
    "BUTTOCKS_EXPOSED",
    "FEMALE_BREAST_EXPOSED",
    "FEMALE_GENITALIA_EXPOSED",
    "MALE_GENITALIA_EXPOSED",
    "ANUS_EXPOSED",
];

/// Immutable class id -> name table. Cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelRegistry {
    names: Arc<[String]>,
}

impl LabelRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Labels of the bundled exposure detector.
    pub fn exposure() -> Self {
        Self::new(EXPOSURE_LABELS)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.names.get(class_id as usize).map(String::as_str)
    }

    /// Name for a class id; ids outside the table resolve to `CLASS_<id>`.
    pub fn resolve(&self, class_id: u32) -> String {
        match self.get(class_id) {
            Some(name) => name.to_string(),
            None => format!("CLASS_{}", class_id),
        }
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|label| label == name)
            .map(|idx| idx as u32)
    }
}

impl Default for LabelRegistry {
    fn default() -> Self {
        Self::exposure()
    }
}

/// Set of class names that are candidates for redaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedactSet {
    classes: BTreeSet<String>,
}

impl RedactSet {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            classes: BTreeSet::new(),
        }
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains(class_name)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    /// Names in this set that the registry does not know.
    pub fn unknown_to<'a>(&'a self, labels: &'a LabelRegistry) -> Vec<&'a str> {
        self.iter()
            .filter(|name| labels.id_of(name).is_none())
            .collect()
    }
}

impl Default for RedactSet {
    fn default() -> Self {
        Self::new(DEFAULT_REDACT_CLASSES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_and_unknown_ids() {
        let labels = LabelRegistry::exposure();
        assert_eq!(labels.resolve(2), "BUTTOCKS_EXPOSED");
        assert_eq!(labels.resolve(14), "MALE_GENITALIA_EXPOSED");
        assert_eq!(labels.resolve(99), "CLASS_99");
        assert_eq!(labels.id_of("ANUS_EXPOSED"), Some(6));
    }

    #[test]
    fn default_redact_set_is_known_to_exposure_labels() {
        let labels = LabelRegistry::exposure();
        let set = RedactSet::default();
        assert_eq!(set.len(), 5);
        assert!(set.unknown_to(&labels).is_empty());
        assert!(!set.contains("FACE_FEMALE"));
    }

    #[test]
    fn alternate_label_sets_are_injectable() {
        let labels = LabelRegistry::new(["cat", "dog"]);
        let set = RedactSet::new(["dog", "ferret"]);
        assert_eq!(labels.resolve(1), "dog");
        assert_eq!(set.unknown_to(&labels), vec!["ferret"]);
    }
}
