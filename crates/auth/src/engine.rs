//! The credential lifecycle: signup, login, token validation, identity lookup.
//!
//! Both transport surfaces call into a single [`CredentialEngine`], so input
//! rules, error semantics and token contents cannot drift between them.
//! The engine holds no mutable state and is shared behind an `Arc`.

use std::{future::Future, ops::RangeInclusive, sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    error::{AuthError, ConflictField, Result},
    model::{AuthSession, NewUser, Profile, PublicUser, SignupRequest, User},
    notify::{self, HttpNotificationSink, NotificationSink, UserCreated},
    password,
    store::UserStore,
    token::{TokenCodec, TokenStatus},
};

/// Longest password accepted, in bytes; bounds hashing cost per request.
const MAX_PASSWORD_BYTES: usize = 1024;
const MAX_EMAIL_LEN: usize = 254;

/// Rules applied to signup input, plus what new users are assigned.
#[derive(Debug, Clone)]
pub struct SignupPolicy {
    pub username_len: RangeInclusive<usize>,
    pub min_password_len: usize,
    pub default_tenant: String,
    pub default_role: String,
}

impl Default for SignupPolicy {
    fn default() -> Self {
        Self {
            username_len: 3..=50,
            min_password_len: 6,
            default_tenant: "default".into(),
            default_role: "user".into(),
        }
    }
}

impl SignupPolicy {
    #[must_use]
    pub fn from_config(cfg: &idgate_config::AuthConfig) -> Self {
        Self {
            min_password_len: cfg.min_password_len,
            default_tenant: cfg.default_tenant.clone(),
            default_role: cfg.default_role.clone(),
            ..Self::default()
        }
    }
}

pub struct CredentialEngine {
    store: Arc<dyn UserStore>,
    codec: TokenCodec,
    notifier: Option<Arc<dyn NotificationSink>>,
    notify_timeout: Duration,
    policy: SignupPolicy,
    store_timeout: Duration,
}

impl CredentialEngine {
    pub fn new(store: Arc<dyn UserStore>, codec: TokenCodec) -> Self {
        Self {
            store,
            codec,
            notifier: None,
            notify_timeout: Duration::from_secs(3),
            policy: SignupPolicy::default(),
            store_timeout: Duration::from_secs(5),
        }
    }

    /// Wire everything from config. Fails on a missing or empty signing key.
    pub fn from_config(store: Arc<dyn UserStore>, cfg: &idgate_config::IdgateConfig) -> Result<Self> {
        let key = cfg.auth.signing_key.clone().ok_or_else(|| {
            AuthError::Config("auth.signing_key is required (or set IDGATE_JWT_KEY)".into())
        })?;
        let codec = TokenCodec::new(&key, Duration::from_secs(cfg.auth.token_ttl_secs))?;

        let mut engine = Self::new(store, codec)
            .with_policy(SignupPolicy::from_config(&cfg.auth))
            .with_store_timeout(Duration::from_millis(cfg.auth.store_timeout_ms));
        if let Some(sink) = HttpNotificationSink::from_config(&cfg.notify) {
            engine = engine.with_notifier(
                Arc::new(sink),
                Duration::from_millis(cfg.notify.timeout_ms),
            );
        }
        Ok(engine)
    }

    #[must_use]
    pub fn with_notifier(mut self, sink: Arc<dyn NotificationSink>, timeout: Duration) -> Self {
        self.notifier = Some(sink);
        self.notify_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SignupPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    // ── Signup ───────────────────────────────────────────────────────────

    /// Register a user and issue their first token.
    pub async fn signup(&self, req: SignupRequest) -> Result<AuthSession> {
        let input = self.check_signup(req)?;

        // Cheap early exit before paying for a hash. The store re-checks
        // inside its transaction; that check is the authoritative one.
        if self.bounded(self.store.email_exists(&input.email)).await? {
            return Err(AuthError::Conflict {
                field: ConflictField::Email,
            });
        }
        if self.bounded(self.store.username_exists(&input.username)).await? {
            return Err(AuthError::Conflict {
                field: ConflictField::Username,
            });
        }

        let password_hash = password::hash_password_blocking(input.password).await?;
        let user = self
            .bounded(self.store.create_user(NewUser {
                email: input.email,
                username: input.username,
                password_hash,
                profile: input.profile,
                tenant_id: self.policy.default_tenant.clone(),
                role: self.policy.default_role.clone(),
            }))
            .await
            .inspect_err(|e| debug!(error = %e, "signup rejected by store"))?;

        let token = self.codec.issue(&user.id, &user.tenant_id, &user.role)?;
        info!(user_id = %user.id, tenant_id = %user.tenant_id, "user registered");

        if let Some(ref sink) = self.notifier {
            notify::dispatch(
                Arc::clone(sink),
                UserCreated::from(&user),
                self.notify_timeout,
            );
        }

        Ok(AuthSession {
            token,
            user: user.public(),
        })
    }

    fn check_signup(&self, req: SignupRequest) -> Result<CheckedSignup> {
        let email = normalize_email(&req.email);
        if !is_valid_email(&email) {
            return Err(AuthError::invalid_input("invalid email address"));
        }

        let username = req.username.trim().to_owned();
        if !self.policy.username_len.contains(&username.chars().count()) {
            return Err(AuthError::invalid_input(format!(
                "username must be between {} and {} characters",
                self.policy.username_len.start(),
                self.policy.username_len.end()
            )));
        }

        check_password(&req.password, self.policy.min_password_len)?;

        let profile = Profile {
            phone_number: required("phone_number", &req.profile.phone_number)?,
            first_name: required("first_name", &req.profile.first_name)?,
            last_name: required("last_name", &req.profile.last_name)?,
        };

        Ok(CheckedSignup {
            email,
            username,
            password: req.password,
            profile,
        })
    }

    // ── Login ────────────────────────────────────────────────────────────

    /// Verify credentials and issue a token. Unknown email and wrong
    /// password produce the same [`AuthError::InvalidCredentials`], and so
    /// does a failed lookup.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::invalid_input("email and password are required"));
        }
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::InvalidCredentials);
        }

        let email = normalize_email(email);
        let user = match self.bounded(self.store.get_by_email(&email)).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "login lookup failed");
                None
            },
        };

        let hash = user.as_ref().map(|u| u.password_hash.clone());
        let matched = password::verify_password_blocking(password.to_owned(), hash).await?;

        let user = match (user, matched) {
            (Some(user), true) => user,
            (found, _) => {
                debug!(known_account = found.is_some(), "login rejected");
                return Err(AuthError::InvalidCredentials);
            },
        };

        let token = self.codec.issue(&user.id, &user.tenant_id, &user.role)?;
        debug!(user_id = %user.id, "login succeeded");
        Ok(AuthSession {
            token,
            user: user.public(),
        })
    }

    // ── Validation / lookup ──────────────────────────────────────────────

    #[must_use]
    pub fn validate(&self, token: &str) -> TokenStatus {
        let status = self.codec.validate(token);
        if let TokenStatus::Invalid(reason) = status {
            debug!(%reason, "token rejected");
        }
        status
    }

    /// Public fields of a user by identifier.
    pub async fn lookup(&self, user_id: &str) -> Result<Option<PublicUser>> {
        let user: Option<User> = self.bounded(self.store.get_by_id(user_id)).await?;
        Ok(user.as_ref().map(User::public))
    }

    /// Run a store call under the configured deadline.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(AuthError::store)?
    }
}

struct CheckedSignup {
    email: String,
    username: String,
    password: String,
    profile: Profile,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Syntactic check only: one `@`, non-empty local part, dotted domain,
/// no whitespace.
fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

fn check_password(password: &str, min_len: usize) -> Result<()> {
    if password.chars().count() < min_len {
        return Err(AuthError::invalid_input(format!(
            "password must be at least {min_len} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::invalid_input(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

fn required(name: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::invalid_input(format!("{name} is required")));
    }
    Ok(value.to_owned())
}

/// An engine over a fresh in-memory store.
#[cfg(any(test, feature = "test-util"))]
pub async fn in_memory(signing_key: &str) -> Result<CredentialEngine> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = crate::store::SqliteUserStore::new(pool).await?;
    let codec = TokenCodec::new(
        &secrecy::Secret::new(signing_key.to_owned()),
        crate::token::DEFAULT_TTL,
    )?;
    Ok(CredentialEngine::new(Arc::new(store), codec))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::{model::IdentityClaims, store::tests::memory_store},
        async_trait::async_trait,
        secrecy::Secret,
        tokio::sync::mpsc,
    };

    const KEY: &str = "engine-test-signing-key";

    fn signup_req(email: &str, username: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            username: username.into(),
            password: password.into(),
            profile: Profile {
                phone_number: "+15550100".into(),
                first_name: "Alice".into(),
                last_name: "Liddell".into(),
            },
        }
    }

    async fn engine() -> CredentialEngine {
        in_memory(KEY).await.unwrap()
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let engine = engine().await;

        let created = engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .unwrap();
        let claims = engine.validate(&created.token).into_claims().unwrap();
        assert_eq!(claims.role, "user");
        assert_eq!(claims.user_id, created.user.id);

        let err = engine
            .signup(signup_req("a@x.com", "alice2", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict {
            field: ConflictField::Email
        }));

        let logged_in = engine.login("a@x.com", "secret1").await.unwrap();
        assert_eq!(logged_in.user, created.user);

        let err = engine.login("a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        assert_eq!(
            engine.validate(&logged_in.token),
            TokenStatus::Valid(IdentityClaims {
                user_id: created.user.id.clone(),
                tenant_id: "default".into(),
                role: "user".into(),
            })
        );

        let (head, _) = logged_in.token.rsplit_once('.').unwrap();
        let forged = format!("{head}.c2lnbmF0dXJlLW1pc21hdGNoLXNpZ25hdHVyZS1taXNtYXRjaA");
        assert!(!engine.validate(&forged).is_valid());
    }

    #[tokio::test]
    async fn username_conflict_is_named() {
        let engine = engine().await;
        engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .unwrap();
        let err = engine
            .signup(signup_req("b@x.com", "alice", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict {
            field: ConflictField::Username
        }));
        assert_eq!(err.to_string(), "username already exists");
    }

    #[tokio::test]
    async fn login_errors_do_not_reveal_account_existence() {
        let engine = engine().await;
        engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .unwrap();

        let unknown = engine.login("nobody@x.com", "secret1").await.unwrap_err();
        let wrong = engine.login("a@x.com", "secret2").await.unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn password_round_trip() {
        let engine = engine().await;
        let long = "x".repeat(200);
        for (i, pw) in ["secret1", "pässwörd-ünïcode", "    spaces   ", long.as_str()]
            .into_iter()
            .enumerate()
        {
            let email = format!("u{i}@x.com");
            engine
                .signup(signup_req(&email, &format!("user{i}"), pw))
                .await
                .unwrap();
            assert!(engine.login(&email, pw).await.is_ok());
            assert!(engine.login(&email, &format!("{pw}!")).await.is_err());
        }
    }

    #[tokio::test]
    async fn email_is_normalized() {
        let engine = engine().await;
        let created = engine
            .signup(signup_req("  Alice@Example.COM ", "alice", "secret1"))
            .await
            .unwrap();
        assert_eq!(created.user.email, "alice@example.com");
        assert!(engine.login("ALICE@example.com", "secret1").await.is_ok());

        let err = engine
            .signup(signup_req("alice@example.com", "other", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict { .. }));
    }

    #[tokio::test]
    async fn signup_input_rules() {
        let engine = engine().await;
        let cases = [
            (signup_req("not-an-email", "alice", "secret1"), "invalid email"),
            (signup_req("a@x", "alice", "secret1"), "invalid email"),
            (signup_req("a b@x.com", "alice", "secret1"), "invalid email"),
            (signup_req("a@x.com", "al", "secret1"), "username"),
            (signup_req("a@x.com", &"a".repeat(51), "secret1"), "username"),
            (signup_req("a@x.com", "alice", "short"), "password"),
        ];
        for (req, expected) in cases {
            let err = engine.signup(req).await.unwrap_err();
            assert!(
                matches!(err, AuthError::InvalidInput(ref m) if m.contains(expected)),
                "expected {expected:?}, got {err}"
            );
        }

        let mut req = signup_req("a@x.com", "alice", "secret1");
        req.profile.last_name = "  ".into();
        let err = engine.signup(req).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(ref m) if m == "last_name is required"));
    }

    #[tokio::test]
    async fn username_bounds_are_inclusive() {
        let engine = engine().await;
        engine
            .signup(signup_req("a@x.com", "abc", "secret1"))
            .await
            .unwrap();
        engine
            .signup(signup_req("b@x.com", &"b".repeat(50), "secret1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let engine = engine().await;
        assert!(matches!(
            engine.login("", "pw").await.unwrap_err(),
            AuthError::InvalidInput(_)
        ));
        assert!(matches!(
            engine.login("a@x.com", "").await.unwrap_err(),
            AuthError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn policy_sets_tenant_and_role() {
        let engine = engine().await.with_policy(SignupPolicy {
            default_tenant: "acme".into(),
            default_role: "member".into(),
            min_password_len: 10,
            ..SignupPolicy::default()
        });

        assert!(engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .is_err());

        let created = engine
            .signup(signup_req("a@x.com", "alice", "long-enough-pw"))
            .await
            .unwrap();
        assert_eq!(created.user.tenant_id, "acme");
        let claims = engine.validate(&created.token).into_claims().unwrap();
        assert_eq!(claims.tenant_id, "acme");
        assert_eq!(claims.role, "member");
    }

    #[tokio::test]
    async fn lookup_returns_public_fields() {
        let engine = engine().await;
        let created = engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .unwrap();
        assert_eq!(
            engine.lookup(&created.user.id).await.unwrap(),
            Some(created.user)
        );
        assert_eq!(engine.lookup("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_signups_same_email_one_winner() {
        let engine = Arc::new(engine().await);
        let a = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.signup(signup_req("a@x.com", "alice", "secret1")).await })
        };
        let b = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.signup(signup_req("a@x.com", "alicia", "secret1")).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(AuthError::Conflict {
            field: ConflictField::Email
        }))));
    }

    // ── Notifications ────────────────────────────────────────────────────

    struct Recording(mpsc::UnboundedSender<UserCreated>);

    #[async_trait]
    impl NotificationSink for Recording {
        async fn user_created(&self, event: &UserCreated) -> anyhow::Result<()> {
            let _ = self.0.send(event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationSink for Failing {
        async fn user_created(&self, _event: &UserCreated) -> anyhow::Result<()> {
            anyhow::bail!("core service down")
        }
    }

    #[tokio::test]
    async fn signup_notifies_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = engine()
            .await
            .with_notifier(Arc::new(Recording(tx)), Duration::from_secs(1));

        let created = engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_uuid, created.user.id);
        assert_eq!(event.username, "alice");

        // Failed signups notify nobody.
        let _ = engine.signup(signup_req("a@x.com", "bob", "secret1")).await;
        assert!(rx.try_recv().is_err());
    }

    struct Hanging;

    #[async_trait]
    impl NotificationSink for Hanging {
        async fn user_created(&self, _event: &UserCreated) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn hanging_sink_does_not_delay_signup() {
        let engine = engine()
            .await
            .with_notifier(Arc::new(Hanging), Duration::from_secs(30));

        let started = std::time::Instant::now();
        engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn failing_sink_does_not_fail_signup() {
        let engine = engine()
            .await
            .with_notifier(Arc::new(Failing), Duration::from_millis(100));
        assert!(engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .is_ok());
    }

    // ── Store deadline ───────────────────────────────────────────────────

    struct Stalled;

    #[async_trait]
    impl UserStore for Stalled {
        async fn create_user(&self, _user: NewUser) -> Result<User> {
            std::future::pending().await
        }

        async fn get_by_id(&self, _id: &str) -> Result<Option<User>> {
            std::future::pending().await
        }

        async fn get_by_email(&self, _email: &str) -> Result<Option<User>> {
            std::future::pending().await
        }

        async fn get_by_username(&self, _username: &str) -> Result<Option<User>> {
            std::future::pending().await
        }
    }

    struct Broken;

    #[async_trait]
    impl UserStore for Broken {
        async fn create_user(&self, _user: NewUser) -> Result<User> {
            Err(AuthError::store(sqlx::Error::PoolClosed))
        }

        async fn get_by_id(&self, _id: &str) -> Result<Option<User>> {
            Err(AuthError::store(sqlx::Error::PoolClosed))
        }

        async fn get_by_email(&self, _email: &str) -> Result<Option<User>> {
            Err(AuthError::store(sqlx::Error::PoolClosed))
        }

        async fn get_by_username(&self, _username: &str) -> Result<Option<User>> {
            Err(AuthError::store(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn login_lookup_failure_is_invalid_credentials() {
        let codec = TokenCodec::new(&Secret::new(KEY.into()), crate::token::DEFAULT_TTL).unwrap();
        let engine = CredentialEngine::new(Arc::new(Broken), codec);

        let err = engine.login("a@x.com", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials), "got {err}");

        let err = engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable { .. }), "got {err}");
    }

    #[tokio::test]
    async fn stalled_store_fails_login_and_signup() {
        let codec = TokenCodec::new(&Secret::new(KEY.into()), crate::token::DEFAULT_TTL).unwrap();
        let engine = CredentialEngine::new(Arc::new(Stalled), codec)
            .with_store_timeout(Duration::from_millis(20));

        assert!(matches!(
            engine.login("a@x.com", "secret1").await.unwrap_err(),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            engine
                .signup(signup_req("a@x.com", "alice", "secret1"))
                .await
                .unwrap_err(),
            AuthError::StoreUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn engine_over_explicit_store() {
        let store = Arc::new(memory_store().await);
        let codec = TokenCodec::new(&Secret::new(KEY.into()), crate::token::DEFAULT_TTL).unwrap();
        let engine = CredentialEngine::new(store.clone(), codec);

        engine
            .signup(signup_req("a@x.com", "alice", "secret1"))
            .await
            .unwrap();
        let row = store.get_by_username("alice").await.unwrap().unwrap();
        assert!(row.password_hash.starts_with("$argon2"));
        assert_ne!(row.password_hash, "secret1");
    }

    #[test]
    fn from_config_requires_signing_key() {
        let store: Arc<dyn UserStore> = Arc::new(Stalled);
        let cfg = idgate_config::IdgateConfig::default();
        assert!(matches!(
            CredentialEngine::from_config(store, &cfg),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn email_syntax() {
        for ok in ["a@x.com", "first.last+tag@sub.example.org"] {
            assert!(is_valid_email(ok), "{ok}");
        }
        for bad in ["", "@x.com", "a@", "a@x", "a@@x.com", "a@.x.com", "a@x.com.", "a@x..com"] {
            assert!(!is_valid_email(bad), "{bad}");
        }
    }
}
