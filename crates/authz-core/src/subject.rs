//! Subject Detector (§4.E): extracts a `(subject_type, claim, values[])`
//! tuple from a bearer token's claims using a prioritized configuration.

use std::collections::HashMap;

use serde_json::Value;

use crate::config::SubjectTypeConfig;
use crate::error::SubjectError;

/// The extracted context: which subject type matched, which claim it read,
/// and the values found on that claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectContext {
    pub subject_type: String,
    pub claim: String,
    pub values: Vec<String>,
}

impl SubjectContext {
    /// `entitlement.claim` and `entitlement.values[]` must both be
    /// non-empty for any PDP/PAP operation to proceed (§4.G).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.claim.is_empty() && !self.values.is_empty()
    }
}

/// A claim's decoded shape (§9: "a sum type `ClaimValue = Single(string) |
/// Many([]string) | Empty`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimValue {
    Single(String),
    Many(Vec<String>),
    Empty,
}

/// Validate a Subject Detector configuration list (§4.E). Called once at
/// startup so the server can fail fast instead of panicking on first
/// request.
///
/// # Errors
/// Returns [`SubjectError::InvalidConfig`] describing the first violation
/// found.
pub fn validate_config(configs: &[SubjectTypeConfig]) -> Result<(), SubjectError> {
    if configs.is_empty() {
        return Err(SubjectError::InvalidConfig("subject type config list is empty".to_string()));
    }

    let mut seen_types = std::collections::HashSet::new();
    let mut seen_priorities = std::collections::HashSet::new();

    for config in configs {
        if config.subject_type.is_empty()
            || config.display_name.is_empty()
            || config.claim.is_empty()
            || config.claim_display_name.is_empty()
        {
            return Err(SubjectError::InvalidConfig(format!(
                "subject type entry for '{}' has an empty required field",
                config.subject_type
            )));
        }
        if !seen_types.insert(config.subject_type.clone()) {
            return Err(SubjectError::InvalidConfig(format!("duplicate subject_type '{}'", config.subject_type)));
        }
        if !seen_priorities.insert(config.priority) {
            return Err(SubjectError::InvalidConfig(format!("duplicate priority '{}'", config.priority)));
        }
    }

    Ok(())
}

/// Stable-sort a validated configuration by ascending priority.
#[must_use]
pub fn sorted_by_priority(mut configs: Vec<SubjectTypeConfig>) -> Vec<SubjectTypeConfig> {
    configs.sort_by_key(|c| c.priority);
    configs
}

/// Base64url-decode the unverified payload segment of a JWT and parse it as
/// a JSON claims map. Signature verification is the caller's responsibility
/// (§4.E).
///
/// # Errors
/// Returns [`SubjectError::MalformedToken`] if the token isn't
/// three-segment, the payload isn't valid base64url, or it doesn't decode
/// to a JSON object.
pub fn decode_claims(bearer_token: &str) -> Result<HashMap<String, Value>, SubjectError> {
    use base64::Engine;

    let mut segments = bearer_token.split('.');
    let _header = segments.next().ok_or_else(|| SubjectError::MalformedToken("missing header segment".to_string()))?;
    let payload = segments.next().ok_or_else(|| SubjectError::MalformedToken("missing payload segment".to_string()))?;

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| SubjectError::MalformedToken(format!("payload is not valid base64url: {err}")))?;

    let claims: HashMap<String, Value> =
        serde_json::from_slice(&decoded).map_err(|err| SubjectError::MalformedToken(format!("payload is not a JSON object: {err}")))?;

    Ok(claims)
}

fn claim_value(claims: &HashMap<String, Value>, claim: &str) -> Option<ClaimValue> {
    let value = claims.get(claim)?;
    match value {
        Value::String(s) if s.is_empty() => Some(ClaimValue::Empty),
        Value::String(s) => Some(ClaimValue::Single(s.clone())),
        Value::Array(items) => {
            let values: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str())
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
            Some(ClaimValue::Many(values))
        }
        _ => None,
    }
}

/// Detect a [`SubjectContext`] from a bearer token's claims against a
/// priority-sorted, validated configuration list (§4.E).
///
/// # Errors
/// Returns [`SubjectError::MalformedToken`] if the token can't be decoded,
/// or [`SubjectError::NoMatch`] if no configured entry's claim is present.
pub fn detect(bearer_token: &str, sorted_configs: &[SubjectTypeConfig]) -> Result<SubjectContext, SubjectError> {
    let claims = decode_claims(bearer_token)?;

    for config in sorted_configs {
        match claim_value(&claims, &config.claim) {
            None => continue,
            Some(ClaimValue::Empty) => {
                return Ok(SubjectContext {
                    subject_type: config.subject_type.clone(),
                    claim: config.claim.clone(),
                    values: Vec::new(),
                })
            }
            Some(ClaimValue::Single(value)) => {
                return Ok(SubjectContext {
                    subject_type: config.subject_type.clone(),
                    claim: config.claim.clone(),
                    values: vec![value],
                })
            }
            Some(ClaimValue::Many(values)) if !values.is_empty() => {
                return Ok(SubjectContext {
                    subject_type: config.subject_type.clone(),
                    claim: config.claim.clone(),
                    values,
                })
            }
            Some(ClaimValue::Many(_)) => continue,
        }
    }

    Err(SubjectError::NoMatch)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn token_for(claims: serde_json::Value) -> String {
        use base64::Engine;
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    fn configs() -> Vec<SubjectTypeConfig> {
        crate::config::default_subject_type_configs()
    }

    #[test]
    fn validate_rejects_empty_list() {
        assert!(validate_config(&[]).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_priority() {
        let dup = vec![
            SubjectTypeConfig::new("user", "User", 0, "groups", "Groups"),
            SubjectTypeConfig::new("service_account", "Service Account", 0, "sub", "Subject"),
        ];
        assert!(validate_config(&dup).is_err());
    }

    #[test]
    fn detect_string_claim() {
        let token = token_for(serde_json::json!({"groups": "admin"}));
        let ctx = detect(&token, &configs()).unwrap();
        assert_eq!(ctx.subject_type, "user");
        assert_eq!(ctx.values, vec!["admin".to_string()]);
    }

    #[test]
    fn detect_array_claim() {
        let token = token_for(serde_json::json!({"groups": ["devs", "", "ops"]}));
        let ctx = detect(&token, &configs()).unwrap();
        assert_eq!(ctx.values, vec!["devs".to_string(), "ops".to_string()]);
    }

    #[test]
    fn detect_empty_string_is_backward_compat_match() {
        let token = token_for(serde_json::json!({"groups": ""}));
        let ctx = detect(&token, &configs()).unwrap();
        assert!(ctx.values.is_empty());
    }

    #[test]
    fn detect_missing_claim_fails() {
        let token = token_for(serde_json::json!({"other": "x"}));
        assert!(matches!(detect(&token, &configs()), Err(SubjectError::NoMatch)));
    }

    #[test]
    fn detect_empty_array_continues_to_next_entry() {
        let token = token_for(serde_json::json!({"groups": []}));
        assert!(matches!(detect(&token, &configs()), Err(SubjectError::NoMatch)));
    }
}
