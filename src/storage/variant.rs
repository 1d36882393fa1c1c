//! Storage type classification.

const EXTENDED_PREFIX: &str = "SX";

/// Returns `true` when the storage type code belongs to the extended family,
/// the only family that exposes an encryption attribute.
#[must_use]
pub fn is_extended(type_code: &str) -> bool {
    type_code.starts_with(EXTENDED_PREFIX)
}
