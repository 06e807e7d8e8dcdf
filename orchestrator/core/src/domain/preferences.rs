// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Preferences
//!
//! Personalization profile derived from a user's latest `PreferenceRecord`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Typed view over free-form preference attributes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::investigation::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Brief,
    #[default]
    Standard,
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Text,
    #[default]
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceProfile {
    pub verbosity: Verbosity,
    pub format: ReportFormat,
    pub include_escalation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_contact: Option<String>,
    pub severity_threshold: Severity,
}

impl Default for PreferenceProfile {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Standard,
            format: ReportFormat::Markdown,
            include_escalation: true,
            escalation_contact: None,
            severity_threshold: Severity::High,
        }
    }
}

impl PreferenceProfile {
    pub const VERBOSITY: &'static str = "verbosity";
    pub const FORMAT: &'static str = "format";
    pub const INCLUDE_ESCALATION: &'static str = "include_escalation";
    pub const ESCALATION_CONTACT: &'static str = "escalation_contact";
    pub const SEVERITY_THRESHOLD: &'static str = "severity_threshold";

    /// Build a profile from stored attributes. Unknown keys are ignored and
    /// unrecognized values keep the default.
    pub fn from_attributes(attributes: &BTreeMap<String, String>) -> Self {
        let mut profile = Self::default();

        if let Some(raw) = attributes.get(Self::VERBOSITY) {
            match raw.trim().to_lowercase().as_str() {
                "brief" => profile.verbosity = Verbosity::Brief,
                "standard" => profile.verbosity = Verbosity::Standard,
                "detailed" => profile.verbosity = Verbosity::Detailed,
                other => warn!(value = other, "Unknown verbosity preference, using default"),
            }
        }

        if let Some(raw) = attributes.get(Self::FORMAT) {
            match raw.trim().to_lowercase().as_str() {
                "text" | "plain" => profile.format = ReportFormat::Text,
                "markdown" | "md" => profile.format = ReportFormat::Markdown,
                other => warn!(value = other, "Unknown format preference, using default"),
            }
        }

        if let Some(raw) = attributes.get(Self::INCLUDE_ESCALATION) {
            match raw.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => profile.include_escalation = true,
                "false" | "no" | "0" => profile.include_escalation = false,
                other => warn!(value = other, "Unknown include_escalation preference, using default"),
            }
        }

        if let Some(raw) = attributes.get(Self::ESCALATION_CONTACT) {
            let contact = raw.trim();
            if !contact.is_empty() {
                profile.escalation_contact = Some(contact.to_string());
            }
        }

        if let Some(raw) = attributes.get(Self::SEVERITY_THRESHOLD) {
            match Severity::parse(raw) {
                Some(severity) => profile.severity_threshold = severity,
                None => warn!(value = raw.as_str(), "Unknown severity_threshold preference, using default"),
            }
        }

        profile
    }

    pub fn to_attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        let verbosity = match self.verbosity {
            Verbosity::Brief => "brief",
            Verbosity::Standard => "standard",
            Verbosity::Detailed => "detailed",
        };
        let format = match self.format {
            ReportFormat::Text => "text",
            ReportFormat::Markdown => "markdown",
        };
        attributes.insert(Self::VERBOSITY.to_string(), verbosity.to_string());
        attributes.insert(Self::FORMAT.to_string(), format.to_string());
        attributes.insert(
            Self::INCLUDE_ESCALATION.to_string(),
            self.include_escalation.to_string(),
        );
        if let Some(contact) = &self.escalation_contact {
            attributes.insert(Self::ESCALATION_CONTACT.to_string(), contact.clone());
        }
        attributes.insert(
            Self::SEVERITY_THRESHOLD.to_string(),
            self.severity_threshold.to_string(),
        );
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_empty() {
        assert_eq!(
            PreferenceProfile::from_attributes(&BTreeMap::new()),
            PreferenceProfile::default()
        );
    }

    #[test]
    fn test_parses_known_values() {
        let profile = PreferenceProfile::from_attributes(&attrs(&[
            ("verbosity", "Detailed"),
            ("format", "text"),
            ("include_escalation", "no"),
            ("escalation_contact", "oncall@example.com"),
            ("severity_threshold", "medium"),
        ]));
        assert_eq!(profile.verbosity, Verbosity::Detailed);
        assert_eq!(profile.format, ReportFormat::Text);
        assert!(!profile.include_escalation);
        assert_eq!(profile.escalation_contact.as_deref(), Some("oncall@example.com"));
        assert_eq!(profile.severity_threshold, Severity::Medium);
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let profile = PreferenceProfile::from_attributes(&attrs(&[
            ("verbosity", "chatty"),
            ("severity_threshold", "sev0"),
            ("theme", "dark"),
        ]));
        assert_eq!(profile, PreferenceProfile::default());
    }

    #[test]
    fn test_attributes_reparse_to_same_profile() {
        let profile = PreferenceProfile {
            verbosity: Verbosity::Brief,
            format: ReportFormat::Text,
            include_escalation: false,
            escalation_contact: Some("sre".to_string()),
            severity_threshold: Severity::Critical,
        };
        assert_eq!(PreferenceProfile::from_attributes(&profile.to_attributes()), profile);
    }
}
