use {
    secrecy::{ExposeSecret, Secret},
    tracing::warn,
};

use crate::error::{AuthError, Result};

/// Header carrying the backend shared secret, out of band from any token.
pub const SERVICE_KEY_HEADER: &str = "service-key";

#[derive(Clone)]
enum TrustMode {
    SharedSecret(Secret<String>),
    /// Every caller is trusted; the network boundary is the only control.
    Open,
}

/// Decides whether a backend caller is another trusted service.
#[derive(Clone)]
pub struct TrustGate {
    mode: TrustMode,
}

impl std::fmt::Debug for TrustGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.mode {
            TrustMode::SharedSecret(_) => "shared-secret",
            TrustMode::Open => "open",
        };
        f.debug_struct("TrustGate").field("mode", &mode).finish()
    }
}

impl TrustGate {
    #[must_use]
    pub fn shared_secret(secret: Secret<String>) -> Self {
        Self {
            mode: TrustMode::SharedSecret(secret),
        }
    }

    #[must_use]
    pub fn open() -> Self {
        Self {
            mode: TrustMode::Open,
        }
    }

    /// Build from config. Without a key, open mode must be requested
    /// explicitly; a key always takes precedence over `allow_open`.
    pub fn from_config(cfg: &idgate_config::TrustConfig) -> Result<Self> {
        let key = cfg
            .service_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty());

        match (key, cfg.allow_open) {
            (Some(key), allow_open) => {
                if allow_open {
                    warn!("trust.allow_open ignored because a service key is configured");
                }
                Ok(Self::shared_secret(key.clone()))
            },
            (None, true) => {
                warn!("backend trust gate is OPEN: service calls are not authenticated");
                Ok(Self::open())
            },
            (None, false) => Err(AuthError::Config(
                "no backend service key configured and trust.allow_open is not set".into(),
            )),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.mode, TrustMode::Open)
    }

    /// Check the secret a caller presented.
    pub fn check(&self, presented: Option<&str>) -> Result<()> {
        let TrustMode::SharedSecret(ref expected) = self.mode else {
            return Ok(());
        };
        match presented {
            Some(p) if safe_equal(p, expected.expose_secret()) => Ok(()),
            Some(_) => Err(AuthError::unauthenticated("invalid service key")),
            None => Err(AuthError::unauthenticated("missing service key")),
        }
    }
}

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}
