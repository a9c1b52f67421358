//! Voice command router
//!
//! Maps a recognized phrase to a pipeline action. The vocabulary is
//! static: one phrase per registered training tag plus "cancel". Phrases
//! outside the vocabulary are ignored, not errors — the spotting engine
//! forwards everything it recognizes.
//!
//! The router is armed only while the orchestrator is waiting for a tag
//! selection; phrases delivered while disarmed are dropped.

use crate::models::TrainingTag;

/// Phrase that cancels a pending tag selection
pub const CANCEL_PHRASE: &str = "cancel";

/// Action resolved from a recognized phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCommand {
    /// Submit the captured image with this tag
    SelectTag(TrainingTag),
    /// Abandon the capture and stop listening
    Cancel,
}

/// Static phrase → action router
pub struct VoiceCommandRouter {
    armed: bool,
}

impl VoiceCommandRouter {
    pub fn new() -> Self {
        Self { armed: false }
    }

    /// Start accepting phrases (keyword listening started)
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Stop accepting phrases (keyword listening stopped)
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// The full voice vocabulary, in prompt order
    pub fn vocabulary() -> Vec<&'static str> {
        TrainingTag::ALL
            .iter()
            .map(|t| t.name())
            .chain(std::iter::once(CANCEL_PHRASE))
            .collect()
    }

    /// Resolve a phrase; `None` while disarmed or for unknown phrases
    pub fn resolve(&self, phrase: &str) -> Option<VoiceCommand> {
        if !self.armed {
            tracing::debug!(phrase = %phrase, "Phrase dropped: router disarmed");
            return None;
        }

        if phrase == CANCEL_PHRASE {
            return Some(VoiceCommand::Cancel);
        }

        TrainingTag::from_name(phrase).map(VoiceCommand::SelectTag)
    }
}

impl Default for VoiceCommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_is_tags_plus_cancel() {
        let vocab = VoiceCommandRouter::vocabulary();
        assert_eq!(vocab, vec!["helmet on", "helmet off", "cancel"]);
    }

    #[test]
    fn test_disarmed_router_drops_everything() {
        let router = VoiceCommandRouter::new();
        assert_eq!(router.resolve("helmet on"), None);
        assert_eq!(router.resolve("cancel"), None);
    }

    #[test]
    fn test_armed_router_resolves_tags_and_cancel() {
        let mut router = VoiceCommandRouter::new();
        router.arm();

        assert_eq!(
            router.resolve("helmet on"),
            Some(VoiceCommand::SelectTag(TrainingTag::HelmetOn))
        );
        assert_eq!(
            router.resolve("helmet off"),
            Some(VoiceCommand::SelectTag(TrainingTag::HelmetOff))
        );
        assert_eq!(router.resolve("cancel"), Some(VoiceCommand::Cancel));
    }

    #[test]
    fn test_unknown_phrase_silently_ignored() {
        let mut router = VoiceCommandRouter::new();
        router.arm();
        assert_eq!(router.resolve("take photo"), None);
        assert_eq!(router.resolve(""), None);
    }

    #[test]
    fn test_disarm_stops_listening() {
        let mut router = VoiceCommandRouter::new();
        router.arm();
        router.disarm();
        assert!(!router.is_armed());
        assert_eq!(router.resolve("helmet on"), None);
    }
}
