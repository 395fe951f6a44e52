/// Deterministic fingerprint derived from source-native identifiers (I6).
///
/// Re-running discovery against an unchanged source must reproduce the same
/// `id`, so the parts fed in here must themselves be stable — cloud
/// resource ARNs, usernames, CVE ids — never randomly generated values or
/// anything that varies run to run (timestamps, request ids).
///
/// `label` is folded into the hash so that, e.g., a `Host` and a `Service`
/// that happen to share a coincidental natural key never collide.
pub fn fingerprint(label: &str, parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(label.as_bytes());
    for part in parts {
        hasher.update(b"\0");
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("Host", &["aws", "i-0123"]);
        let b = fingerprint("Host", &["aws", "i-0123"]);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_label() {
        let host = fingerprint("Host", &["same-key"]);
        let service = fingerprint("Service", &["same-key"]);
        assert_ne!(host, service);
    }

    #[test]
    fn fingerprint_distinguishes_part_boundaries() {
        let a = fingerprint("X", &["ab", "c"]);
        let b = fingerprint("X", &["a", "bc"]);
        assert_ne!(a, b);
    }
}
