//! # Bootstrap Token
//!
//! The bootstrap token entity: an immutable id/secret pair plus mutable
//! timestamps and provenance annotations.
//!
//! The serialized wire form is `<id>.<secret>`. Parsing splits on the first
//! `.`, so token ids must never contain the separator themselves.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub mod generator;
pub mod renewal;

/// Separator between token id and token secret in the serialized form
pub const TOKEN_SEPARATOR: char = '.';

/// A Kubernetes bootstrap token
///
/// Constructed either by the token generator (new rotation) or by parsing a
/// value fetched from the cloud secret store. Timestamps are set by whichever
/// collaborator supplied the underlying record.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapToken {
    id: String,
    secret: String,
    creation_time: Option<DateTime<Utc>>,
    expiration_time: Option<DateTime<Utc>>,
    annotations: BTreeMap<String, String>,
}

impl BootstrapToken {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            creation_time: None,
            expiration_time: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Parse a token from its serialized `<id>.<secret>` form
    ///
    /// Returns `None` when the value contains no separator. A missing
    /// separator is a malformed record, not an error condition.
    pub fn parse(value: &str) -> Option<Self> {
        let (id, secret) = value.split_once(TOKEN_SEPARATOR)?;
        Some(Self::new(id, secret))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Serialized form: `<id>.<secret>`
    pub fn full_token(&self) -> String {
        format!("{}{}{}", self.id, TOKEN_SEPARATOR, self.secret)
    }

    pub fn set_creation_time(&mut self, val: DateTime<Utc>) {
        self.creation_time = Some(val);
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.creation_time
    }

    pub fn set_expiration_time(&mut self, val: DateTime<Utc>) {
        self.expiration_time = Some(val);
    }

    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.expiration_time
    }

    /// Human readable expiration for log output
    pub fn expiration_string(&self) -> String {
        match self.expiration_time {
            Some(expiration) => {
                let remaining = expiration.signed_duration_since(Utc::now());
                format!(
                    "{} ({}s remaining)",
                    expiration.to_rfc3339(),
                    remaining.num_seconds()
                )
            }
            None => "<not set>".to_string(),
        }
    }

    /// Attach provenance metadata (originating provider, backing secret identity, ...)
    pub fn set_annotation(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(name.into(), value.into());
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }
}

impl std::fmt::Debug for BootstrapToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose the secret in debug output
        f.debug_struct("BootstrapToken")
            .field("id", &self.id)
            .field("creation_time", &self.creation_time)
            .field("expiration_time", &self.expiration_time)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_full_token_round_trip() {
        let token = BootstrapToken::new("250812", "abcdef0123456789");
        assert_eq!(token.full_token(), "250812.abcdef0123456789");

        let parsed = BootstrapToken::parse(&token.full_token()).expect("token should parse");
        assert_eq!(parsed.id(), "250812");
        assert_eq!(parsed.secret(), "abcdef0123456789");
    }

    #[test]
    fn test_parse_splits_on_first_separator() {
        // Secrets may contain the separator; ids may not
        let parsed = BootstrapToken::parse("tokenid.secret.with.dots").expect("should parse");
        assert_eq!(parsed.id(), "tokenid");
        assert_eq!(parsed.secret(), "secret.with.dots");
    }

    #[test]
    fn test_parse_without_separator_returns_none() {
        assert!(BootstrapToken::parse("notavalidtoken").is_none());
        assert!(BootstrapToken::parse("").is_none());
    }

    #[test]
    fn test_timestamps_default_absent() {
        let token = BootstrapToken::new("id", "secret");
        assert!(token.creation_time().is_none());
        assert!(token.expiration_time().is_none());
        assert_eq!(token.expiration_string(), "<not set>");
    }

    #[test]
    fn test_timestamps_set_and_get() {
        let mut token = BootstrapToken::new("id", "secret");
        let created = Utc.with_ymd_and_hms(2025, 8, 12, 10, 0, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2026, 8, 12, 10, 0, 0).unwrap();
        token.set_creation_time(created);
        token.set_expiration_time(expires);
        assert_eq!(token.creation_time(), Some(created));
        assert_eq!(token.expiration_time(), Some(expires));
        assert!(token.expiration_string().starts_with("2026-08-12T10:00:00"));
    }

    #[test]
    fn test_annotations() {
        let mut token = BootstrapToken::new("id", "secret");
        token.set_annotation("bootstraptoken.kubernetes.io/provider", "azure");
        token.set_annotation("bootstraptoken.kubernetes.io/secretVersion", "abc123");
        assert_eq!(
            token
                .annotations()
                .get("bootstraptoken.kubernetes.io/provider")
                .map(String::as_str),
            Some("azure")
        );
        assert_eq!(token.annotations().len(), 2);
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let token = BootstrapToken::new("id", "supersecretvalue");
        let debug = format!("{token:?}");
        assert!(!debug.contains("supersecretvalue"));
        assert!(debug.contains("id"));
    }
}
