use sha2::{Digest, Sha256};

/// Short, non-reversible tag for a secret value so it can appear in logs
pub fn fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = fingerprint("proof-token-123");
        let b = fingerprint("proof-token-123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert!(!a.contains("proof"));
        assert_ne!(a, fingerprint("proof-token-124"));
    }
}
