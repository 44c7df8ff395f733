use subtle::ConstantTimeEq;

/// Constant-time string comparison for the `X-API-Key` header.
/// Length mismatch returns early; only the length leaks.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
