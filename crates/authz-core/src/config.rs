//! Startup configuration for components whose state is immutable after
//! process start (§5: "the action catalog and subject-detector config are
//! immutable after startup").

use std::time::Duration;

/// One entry of the Subject Detector's priority-ordered configuration (§4.E).
#[derive(Debug, Clone)]
pub struct SubjectTypeConfig {
    pub subject_type: String,
    pub display_name: String,
    pub priority: i64,
    pub claim: String,
    pub claim_display_name: String,
}

impl SubjectTypeConfig {
    #[must_use]
    pub fn new(
        subject_type: impl Into<String>,
        display_name: impl Into<String>,
        priority: i64,
        claim: impl Into<String>,
        claim_display_name: impl Into<String>,
    ) -> Self {
        Self {
            subject_type: subject_type.into(),
            display_name: display_name.into(),
            priority,
            claim: claim.into(),
            claim_display_name: claim_display_name.into(),
        }
    }
}

/// The write-through cache's tuning knobs (§4.B, §6).
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// The default, built-in Subject Detector configuration: a single `user`
/// entry reading the `groups` claim, matching the end-to-end scenarios in
/// §8 (all of which use claim `groups`).
#[must_use]
pub fn default_subject_type_configs() -> Vec<SubjectTypeConfig> {
    vec![SubjectTypeConfig::new("user", "User", 0, "groups", "Groups")]
}
