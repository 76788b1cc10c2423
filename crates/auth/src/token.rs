//! Signed, time-bounded session tokens (JWT, HS256).
//!
//! Tokens are stateless: validity depends only on the signature under the
//! configured key and on `exp` lying strictly in the future. Expiry is checked
//! here with zero leeway rather than by `jsonwebtoken`, so the boundary is
//! exact and testable with an injected clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use {
    jsonwebtoken::{
        Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
    },
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::{
    error::{AuthError, Result},
    model::IdentityClaims,
};

/// Default session lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    tenant_id: String,
    role: String,
    iat: i64,
    exp: i64,
}

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    Malformed,
    BadSignature,
    Expired,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Malformed => "malformed token",
            Self::BadSignature => "signature mismatch",
            Self::Expired => "token expired",
        })
    }
}

/// Outcome of validating a token. Invalid tokens are an ordinary result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid(IdentityClaims),
    Invalid(InvalidReason),
}

impl TokenStatus {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    #[must_use]
    pub fn claims(&self) -> Option<&IdentityClaims> {
        match self {
            Self::Valid(claims) => Some(claims),
            Self::Invalid(_) => None,
        }
    }

    #[must_use]
    pub fn into_claims(self) -> Option<IdentityClaims> {
        match self {
            Self::Valid(claims) => Some(claims),
            Self::Invalid(_) => None,
        }
    }
}

/// Issues and verifies session tokens under one symmetric key.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenCodec {
    /// Build a codec. An empty key or a zero lifetime is a deployment error.
    pub fn new(signing_key: &Secret<String>, ttl: Duration) -> Result<Self> {
        let key = signing_key.expose_secret();
        if key.trim().is_empty() {
            return Err(AuthError::Config("token signing key must not be empty".into()));
        }
        if ttl.is_zero() {
            return Err(AuthError::Config("token lifetime must be positive".into()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(key.as_bytes()),
            decoding: DecodingKey::from_secret(key.as_bytes()),
            validation,
            ttl,
        })
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: &str, tenant_id: &str, role: &str) -> Result<String> {
        self.issue_at(subject, tenant_id, role, now_unix())
    }

    /// Issue a token as if the current time were `now` (unix seconds).
    pub fn issue_at(&self, subject: &str, tenant_id: &str, role: &str, now: i64) -> Result<String> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = SessionClaims {
            sub: subject.to_owned(),
            tenant_id: tenant_id.to_owned(),
            role: role.to_owned(),
            iat: now,
            exp: now.saturating_add(ttl),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))
    }

    #[must_use]
    pub fn validate(&self, token: &str) -> TokenStatus {
        self.validate_at(token, now_unix())
    }

    /// Validate a token as if the current time were `now` (unix seconds).
    #[must_use]
    pub fn validate_at(&self, token: &str, now: i64) -> TokenStatus {
        let data = match jsonwebtoken::decode::<SessionClaims>(
            token,
            &self.decoding,
            &self.validation,
        ) {
            Ok(data) => data,
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                        InvalidReason::BadSignature
                    },
                    _ => InvalidReason::Malformed,
                };
                return TokenStatus::Invalid(reason);
            },
        };

        let claims = data.claims;
        if claims.exp <= now {
            return TokenStatus::Invalid(InvalidReason::Expired);
        }
        TokenStatus::Valid(IdentityClaims {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            role: claims.role,
        })
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const T0: i64 = 1_750_000_000;

    fn codec(key: &str) -> TokenCodec {
        TokenCodec::new(&Secret::new(key.into()), DEFAULT_TTL).unwrap()
    }

    #[test]
    fn issue_then_validate_projects_same_claims() {
        let c = codec("test-signing-key");
        for (sub, tenant, role) in [
            ("u-1", "default", "user"),
            ("0b6c7c9e-6f0e-4d7a-9d47-3f1f1b1a2c3d", "acme", "admin"),
            ("ü", "t with spaces", ""),
        ] {
            let token = c.issue(sub, tenant, role).unwrap();
            assert_eq!(
                c.validate(&token),
                TokenStatus::Valid(IdentityClaims {
                    user_id: sub.into(),
                    tenant_id: tenant.into(),
                    role: role.into(),
                })
            );
        }
    }

    #[test]
    fn expiry_boundary_is_exact() {
        let c = codec("test-signing-key");
        let w = i64::try_from(DEFAULT_TTL.as_secs()).unwrap();
        let token = c.issue_at("u", "t", "user", T0).unwrap();

        assert!(c.validate_at(&token, T0).is_valid());
        assert!(c.validate_at(&token, T0 + w - 1).is_valid());
        assert_eq!(
            c.validate_at(&token, T0 + w),
            TokenStatus::Invalid(InvalidReason::Expired)
        );
        assert_eq!(
            c.validate_at(&token, T0 + w + 1),
            TokenStatus::Invalid(InvalidReason::Expired)
        );
    }

    #[test]
    fn custom_ttl_is_honoured() {
        let c = TokenCodec::new(&Secret::new("k".into()), Duration::from_secs(60)).unwrap();
        let token = c.issue_at("u", "t", "r", T0).unwrap();
        assert!(c.validate_at(&token, T0 + 59).is_valid());
        assert!(!c.validate_at(&token, T0 + 61).is_valid());
    }

    #[test]
    fn other_key_is_bad_signature() {
        let token = codec("key-a").issue("u", "t", "user").unwrap();
        assert_eq!(
            codec("key-b").validate(&token),
            TokenStatus::Invalid(InvalidReason::BadSignature)
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let c = codec("test-signing-key");
        let token = c.issue("u", "t", "user").unwrap();
        let (head, sig) = token.rsplit_once('.').unwrap();
        let flipped = if sig.starts_with('A') {
            'B'
        } else {
            'A'
        };
        let forged = format!("{head}.{flipped}{}", &sig[1..]);
        assert!(!c.validate(&forged).is_valid());
    }

    #[test]
    fn swapped_payload_is_rejected() {
        let c = codec("test-signing-key");
        let user = c.issue("alice", "t", "user").unwrap();
        let admin = codec("attacker-key").issue("alice", "t", "admin").unwrap();

        let user_parts: Vec<&str> = user.split('.').collect();
        let admin_parts: Vec<&str> = admin.split('.').collect();
        let spliced = format!("{}.{}.{}", user_parts[0], admin_parts[1], user_parts[2]);

        assert_eq!(
            c.validate(&spliced),
            TokenStatus::Invalid(InvalidReason::BadSignature)
        );
    }

    #[test]
    fn garbage_is_malformed_not_an_error() {
        let c = codec("test-signing-key");
        for junk in ["", "abc", "a.b.c", "eyJhbGciOiJub25lIn0.eyJzdWIiOiJ4In0."] {
            let status = c.validate(junk);
            assert!(!status.is_valid(), "{junk:?} accepted");
            assert!(status.claims().is_none());
        }
    }

    #[test]
    fn other_hmac_algorithm_is_rejected() {
        let key = "test-signing-key";
        let claims = SessionClaims {
            sub: "u".into(),
            tenant_id: "t".into(),
            role: "admin".into(),
            iat: 0,
            exp: i64::MAX,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .unwrap();
        assert_eq!(
            codec(key).validate(&token),
            TokenStatus::Invalid(InvalidReason::BadSignature)
        );
    }

    #[test]
    fn empty_key_is_rejected() {
        for key in ["", "   "] {
            let err = TokenCodec::new(&Secret::new(key.into()), DEFAULT_TTL).unwrap_err();
            assert!(matches!(err, AuthError::Config(_)));
        }
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = TokenCodec::new(&Secret::new("k".into()), Duration::ZERO).unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn debug_redacts_key() {
        let shown = format!("{:?}", codec("super-secret-key"));
        assert!(!shown.contains("super-secret-key"));
    }
}
