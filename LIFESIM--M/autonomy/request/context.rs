use serde::{Deserialize, Serialize};

use crate::actor::AutonomyRandomization;

/// Who asked for the decision.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum InteractionSource {
    /// The actor's own autonomy.
    #[default]
    Autonomy,
    /// A direct player command.
    User,
    /// Scripted gameplay.
    Script,
}

/// Request-level randomization override.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RandomizationOverride {
    /// Use the actor's setting.
    #[default]
    Inherit,
    /// Force random selection.
    Enabled,
    /// Force best-score selection.
    Disabled,
}

impl RandomizationOverride {
    /// Explicit override wins, otherwise the actor's setting decides.
    #[must_use]
    pub const fn resolve(self, actor_setting: AutonomyRandomization) -> bool {
        match self {
            Self::Enabled => true,
            Self::Disabled => false,
            Self::Inherit => actor_setting.is_enabled(),
        }
    }

    /// Parses `on`/`off`/`inherit` and their common spellings.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "on" | "enabled" | "true" | "1" => Some(Self::Enabled),
            "off" | "disabled" | "false" | "0" => Some(Self::Disabled),
            "inherit" | "default" => Some(Self::Inherit),
            _ => None,
        }
    }
}

/// Origin and policy hints attached to a request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestContext {
    /// Source of the request.
    pub source: InteractionSource,
    /// Request issued programmatically rather than by the autonomy loop.
    pub is_script_request: bool,
    /// Randomization override.
    pub randomization_override: RandomizationOverride,
}

impl RequestContext {
    /// Context of a regular autonomy ping.
    #[must_use]
    pub fn autonomous() -> Self {
        Self::default()
    }

    /// Context of a player-directed request.
    #[must_use]
    pub fn user_directed() -> Self {
        Self {
            source: InteractionSource::User,
            ..Self::default()
        }
    }

    /// Context of a scripted request.
    #[must_use]
    pub fn scripted() -> Self {
        Self {
            source: InteractionSource::Script,
            is_script_request: true,
            ..Self::default()
        }
    }

    /// Replaces the randomization override.
    #[must_use]
    pub const fn with_randomization(mut self, randomization: RandomizationOverride) -> Self {
        self.randomization_override = randomization;
        self
    }

    /// Whether the autonomy loop itself produced the request.
    #[must_use]
    pub const fn is_autonomous(&self) -> bool {
        matches!(self.source, InteractionSource::Autonomy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins() {
        assert!(RandomizationOverride::Enabled.resolve(AutonomyRandomization::Disabled));
        assert!(!RandomizationOverride::Disabled.resolve(AutonomyRandomization::Enabled));
        assert!(RandomizationOverride::Inherit.resolve(AutonomyRandomization::Enabled));
        assert!(!RandomizationOverride::Inherit.resolve(AutonomyRandomization::Default));
    }

    #[test]
    fn parses_console_spellings() {
        assert_eq!(RandomizationOverride::parse("ON"), Some(RandomizationOverride::Enabled));
        assert_eq!(RandomizationOverride::parse("off"), Some(RandomizationOverride::Disabled));
        assert_eq!(RandomizationOverride::parse("default"), Some(RandomizationOverride::Inherit));
        assert_eq!(RandomizationOverride::parse("maybe"), None);
    }

    #[test]
    fn scripted_context_is_not_autonomous() {
        let ctx = RequestContext::scripted();
        assert!(ctx.is_script_request);
        assert!(!ctx.is_autonomous());
        assert!(RequestContext::autonomous().is_autonomous());
    }
}
