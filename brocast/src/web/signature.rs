//! Task invocation signatures.
//!
//! The dispatcher signs every call it makes to a task endpoint so that only
//! the task system can trigger a delivery. The signature is
//! `hex(HMAC-SHA256(key, timestamp + canonical_params))`, sent in
//! [`TIMESTAMP_HEADER`] and [`SIGNATURE_HEADER`].

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Task-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Task-Signature";

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `k=v` pairs sorted by key and joined with `&`.
pub fn canonical_params(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign a task invocation. Returns `None` if the key cannot seed an HMAC.
pub fn sign_task(
    signing_key: &str,
    timestamp: &str,
    params: &BTreeMap<String, String>,
) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(canonical_params(params).as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a task invocation signature.
///
/// Returns `true` only if every field is present, the timestamp is within
/// `max_age_seconds` of now and the signature matches.
pub fn verify_task_signature(
    signing_key: &str,
    timestamp: &str,
    params: &BTreeMap<String, String>,
    signature: &str,
    max_age_seconds: u64,
) -> bool {
    if signing_key.is_empty() || timestamp.is_empty() || signature.is_empty() {
        warn!(
            has_signing_key = !signing_key.is_empty(),
            has_timestamp = !timestamp.is_empty(),
            has_signature = !signature.is_empty(),
            "task_signature_missing_fields"
        );
        return false;
    }

    let task_time: u64 = match timestamp.parse() {
        Ok(t) => t,
        Err(_) => {
            warn!(timestamp = %timestamp, "task_signature_invalid_timestamp");
            return false;
        }
    };

    let current_time = unix_now();
    let age = current_time.abs_diff(task_time);

    if age > max_age_seconds {
        warn!(
            task_time = task_time,
            current_time = current_time,
            age_seconds = age,
            max_age_seconds = max_age_seconds,
            "task_signature_stale"
        );
        return false;
    }

    let expected_signature = match sign_task(signing_key, timestamp, params) {
        Some(s) => s,
        None => {
            warn!("task_signature_invalid_key");
            return false;
        }
    };

    let valid = constant_time_compare(&expected_signature, signature);

    if !valid {
        warn!(
            expected_length = expected_signature.len(),
            actual_length = signature.len(),
            "task_signature_mismatch"
        );
    }

    valid
}

/// Constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Check if task signature verification is enabled.
pub fn is_signature_verification_enabled(signing_key: &Option<String>) -> bool {
    signing_key
        .as_ref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("broadcast_key".to_string(), "42726f".to_string());
        params
    }

    #[test]
    fn test_canonical_params_sorted() {
        let mut params = params();
        params.insert("a".to_string(), "1".to_string());
        assert_eq!(canonical_params(&params), "a=1&broadcast_key=42726f");
        assert_eq!(canonical_params(&BTreeMap::new()), "");
    }

    #[test]
    fn test_verify_signature_missing_fields() {
        assert!(!verify_task_signature("", "123", &params(), "sig", 300));
        assert!(!verify_task_signature("key", "", &params(), "sig", 300));
        assert!(!verify_task_signature("key", "123", &params(), "", 300));
    }

    #[test]
    fn test_verify_signature_invalid_timestamp() {
        assert!(!verify_task_signature(
            "key",
            "not-a-number",
            &params(),
            "sig",
            300
        ));
    }

    #[test]
    fn test_verify_signature_stale() {
        let timestamp = "946684800"; // year 2000
        let signature = sign_task("key", timestamp, &params()).unwrap();
        assert!(!verify_task_signature(
            "key",
            timestamp,
            &params(),
            &signature,
            300
        ));
    }

    #[test]
    fn test_verify_signature_valid() {
        let timestamp = unix_now().to_string();
        let signature = sign_task("test-signing-key", &timestamp, &params()).unwrap();

        assert!(verify_task_signature(
            "test-signing-key",
            &timestamp,
            &params(),
            &signature,
            300
        ));
    }

    #[test]
    fn test_verify_signature_rejects_tampered_params() {
        let timestamp = unix_now().to_string();
        let signature = sign_task("test-signing-key", &timestamp, &params()).unwrap();

        let mut tampered = params();
        tampered.insert("broadcast_key".to_string(), "ffff".to_string());

        assert!(!verify_task_signature(
            "test-signing-key",
            &timestamp,
            &tampered,
            &signature,
            300
        ));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_is_signature_verification_enabled() {
        assert!(!is_signature_verification_enabled(&None));
        assert!(!is_signature_verification_enabled(&Some("".to_string())));
        assert!(!is_signature_verification_enabled(&Some("   ".to_string())));
        assert!(is_signature_verification_enabled(&Some("key123".to_string())));
    }
}
