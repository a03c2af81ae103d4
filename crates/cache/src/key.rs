//! Deterministic key derivation for producers and their cached variants
//!
//! Keys are plain string concatenations of caller-supplied identity strings.
//! Each component is wrapped in braces so that `("a.b", "c")` and `("a", "b.c")`
//! never collapse onto the same key.

use sha2::{Digest, Sha256};

/// Derive the key identifying a producer's named output.
///
/// Format: `Producer{<type>}.Output{<output>}`
#[must_use]
pub fn producer_key(producer_type: &str, output_name: &str) -> String {
    format!("Producer{{{producer_type}}}.Output{{{output_name}}}")
}

/// Derive the key identifying one configuration of a producer.
///
/// Format: `Inport{<inport>}.State{<state>}`
#[must_use]
pub fn variant_key(inport_fingerprint: &str, state_fingerprint: &str) -> String {
    format!("Inport{{{inport_fingerprint}}}.State{{{state_fingerprint}}}")
}

/// Join a producer key and a variant key into the key reported to callers.
#[must_use]
pub fn composite_key(producer_key: &str, variant_key: &str) -> String {
    format!("{producer_key}.{variant_key}")
}

/// Suggest a filesystem-safe payload file name for a variant.
///
/// The name is the first 16 bytes of the SHA-256 of the composite key, hex
/// encoded, followed by `extension` (without a leading dot). Callers are free
/// to pick their own names; the index never generates paths itself.
#[must_use]
pub fn payload_file_name(producer_key: &str, variant_key: &str, extension: &str) -> String {
    let digest = Sha256::digest(composite_key(producer_key, variant_key).as_bytes());
    let stem = hex::encode(&digest[..16]);
    if extension.is_empty() {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}
