//! Masking of credentials for logs and error details.
//!
//! Access tokens, refresh tokens, client secrets and the worker key must
//! never appear in full anywhere we emit text. Everything that formats a
//! credential goes through [`mask_secret`] or [`redact`].

use std::fmt;

/// Characters kept at the start of a masked secret.
const KEEP_PREFIX: usize = 6;
/// Characters kept at the end of a masked secret.
const KEEP_SUFFIX: usize = 3;

/// Mask a secret, revealing only a short prefix and suffix
/// (`APP_US...x9z`). Short values are fully starred so nothing leaks.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= KEEP_PREFIX + KEEP_SUFFIX {
        return "*".repeat(chars.len().max(3));
    }
    let prefix: String = chars[..KEEP_PREFIX].iter().collect();
    let suffix: String = chars[chars.len() - KEEP_SUFFIX..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

/// Replace every occurrence of any of `secrets` in `text` with its masked form.
pub fn redact<'a, I>(text: &str, secrets: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = text.to_string();
    for secret in secrets {
        if secret.is_empty() {
            continue;
        }
        if out.contains(secret) {
            out = out.replace(secret, &mask_secret(secret));
        }
    }
    out
}

/// Display adapter that prints a masked secret (`tracing` field friendly).
pub struct Masked<'a>(pub &'a str);

impl fmt::Display for Masked<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&mask_secret(self.0))
    }
}

/// Masked rendering of an optional secret for `Debug` impls.
pub(crate) fn mask_opt(secret: &Option<String>) -> Option<String> {
    secret.as_deref().map(mask_secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_prefix_and_suffix() {
        let token = "APP_USR-1234567890-abcdef-xyz";
        assert_eq!(mask_secret(token), "APP_US...xyz");
    }

    #[test]
    fn short_secrets_are_fully_starred() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("123456789"), "*********");
        assert_eq!(mask_secret(""), "***");
    }

    #[test]
    fn redact_replaces_all_occurrences() {
        let secret = "TG-0123456789abcdef";
        let text = format!("refresh {} failed; retried {}", secret, secret);
        let out = redact(&text, [secret]);
        assert!(!out.contains(secret));
        assert_eq!(out.matches("TG-012...def").count(), 2);
    }

    #[test]
    fn redact_skips_empty_secrets() {
        assert_eq!(redact("nothing here", ["", "zzz"]), "nothing here");
    }

    #[test]
    fn masked_display() {
        assert_eq!(format!("{}", Masked("worker-key-000111")), "worker...111");
    }
}
