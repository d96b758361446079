//! Enforcement configuration

/// Environment variable read by [`EnforcementMode::from_env`]
pub const ENV_VAR: &str = "DBC_MODE";

/// How much of a contract is checked on each call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Invariants, preconditions and postconditions
    #[default]
    Full,
    /// Preconditions only; no snapshot, nothing checked after the call
    PreconditionsOnly,
    /// Wrappers call straight through
    Disabled,
}

impl EnforcementMode {
    /// Parse a mode name. Unknown names fall back to `Full`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "full" | "on" | "all" | "1" | "true" => EnforcementMode::Full,
            "pre" | "preconditions" | "preconditions_only" => EnforcementMode::PreconditionsOnly,
            "off" | "disabled" | "none" | "0" | "false" => EnforcementMode::Disabled,
            other => {
                tracing::warn!(mode = other, "unknown enforcement mode, using full");
                EnforcementMode::Full
            }
        }
    }

    /// Mode from `DBC_MODE`, `Full` when unset
    pub fn from_env() -> Self {
        match std::env::var(ENV_VAR) {
            Ok(name) => Self::from_name(&name),
            Err(_) => EnforcementMode::Full,
        }
    }

    pub fn is_disabled(self) -> bool {
        self == EnforcementMode::Disabled
    }

    /// Whether invariants and postconditions are checked
    pub fn checks_exit(self) -> bool {
        self == EnforcementMode::Full
    }
}

impl std::fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EnforcementMode::Full => write!(f, "full"),
            EnforcementMode::PreconditionsOnly => write!(f, "preconditions_only"),
            EnforcementMode::Disabled => write!(f, "disabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(EnforcementMode::from_name("full"), EnforcementMode::Full);
        assert_eq!(EnforcementMode::from_name(" PRE "), EnforcementMode::PreconditionsOnly);
        assert_eq!(EnforcementMode::from_name("off"), EnforcementMode::Disabled);
        assert_eq!(EnforcementMode::from_name("0"), EnforcementMode::Disabled);
    }

    #[test]
    fn test_unknown_defaults_to_full() {
        assert_eq!(EnforcementMode::from_name("sometimes"), EnforcementMode::Full);
        assert_eq!(EnforcementMode::from_name(""), EnforcementMode::Full);
    }

    #[test]
    fn test_display_round_trips_through_from_name() {
        for mode in [
            EnforcementMode::Full,
            EnforcementMode::PreconditionsOnly,
            EnforcementMode::Disabled,
        ] {
            assert_eq!(EnforcementMode::from_name(&mode.to_string()), mode);
        }
    }

    #[test]
    fn test_serde_names() {
        let mode: EnforcementMode = serde_json::from_str("\"preconditions_only\"").unwrap();
        assert_eq!(mode, EnforcementMode::PreconditionsOnly);
        assert_eq!(serde_json::to_string(&EnforcementMode::Disabled).unwrap(), "\"disabled\"");
    }
}
