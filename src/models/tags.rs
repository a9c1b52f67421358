//! Training tag registry
//!
//! Static enumeration of the tags the remote project is trained on.
//! The tag *names* here must match the tag names registered on the remote
//! training project; tag *ids* are resolved against the remote service on
//! every submission (the remote list is authoritative, never cached).

use serde::{Deserialize, Serialize};

/// A training tag the classifier distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingTag {
    /// Subject is wearing a helmet
    HelmetOn,
    /// Subject is not wearing a helmet
    HelmetOff,
}

impl TrainingTag {
    /// All registered tags, in prompt order
    pub const ALL: [TrainingTag; 2] = [TrainingTag::HelmetOn, TrainingTag::HelmetOff];

    /// Tag name as registered on the remote training project.
    ///
    /// Doubles as the voice phrase that selects this tag.
    pub fn name(&self) -> &'static str {
        match self {
            TrainingTag::HelmetOn => "helmet on",
            TrainingTag::HelmetOff => "helmet off",
        }
    }

    /// Look up a tag by its registered name (exact match)
    pub fn from_name(name: &str) -> Option<TrainingTag> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

impl std::fmt::Display for TrainingTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(TrainingTag::from_name("helmet on"), Some(TrainingTag::HelmetOn));
        assert_eq!(TrainingTag::from_name("helmet off"), Some(TrainingTag::HelmetOff));
        assert_eq!(TrainingTag::from_name("hard hat"), None);
        assert_eq!(TrainingTag::from_name(""), None);
    }

    #[test]
    fn test_name_is_exact() {
        // Lookup is exact match, not normalized
        assert_eq!(TrainingTag::from_name("Helmet On"), None);
        assert_eq!(TrainingTag::from_name("helmet on "), None);
    }

    #[test]
    fn test_all_names_distinct() {
        let names: Vec<&str> = TrainingTag::ALL.iter().map(|t| t.name()).collect();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names, deduped);
    }
}
