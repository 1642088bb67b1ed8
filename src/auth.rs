//! Accounts, password hashing and bearer sessions.
//!
//! Passwords are PBKDF2-HMAC-SHA256, stored as
//! `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`. Session tokens are
//! 256 random bits; only their SHA-256 digest is kept server-side.
//! TOTP checking is delegated to an injected `TotpVerifier`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::db::{DatabaseError, RecordStore};
use crate::error::{CoreError, CoreResult};
use crate::models::{stored_now, User, UserProfile};

pub const HASH_SCHEME: &str = "pbkdf2-sha256";
pub const SALT_LENGTH: usize = 16;
pub const HASH_LENGTH: usize = 32;
pub const MIN_PASSWORD_CHARS: usize = 8;
pub const USERNAME_CHARS: std::ops::RangeInclusive<usize> = 3..=64;

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::Digest;
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; HASH_LENGTH]> {
    let mut out = Zeroizing::new([0u8; HASH_LENGTH]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out[..]);
    out
}

pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    let hash = derive(password, &salt, iterations);
    format!(
        "{HASH_SCHEME}${iterations}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(&hash[..])
    )
}

/// Constant-time check against an encoded hash. Malformed input never matches.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iterations.parse::<u32>(),
        STANDARD_NO_PAD.decode(salt),
        STANDARD_NO_PAD.decode(expected),
    ) else {
        return false;
    };
    if iterations == 0 || expected.len() != HASH_LENGTH {
        return false;
    }

    let actual = derive(password, &salt, iterations);
    actual[..].ct_eq(&expected[..]).into()
}

/// Second-factor check. Secret generation and the TOTP algorithm live
/// outside this crate.
pub trait TotpVerifier: Send + Sync {
    fn verify(&self, secret: &str, code: &str) -> bool;
}

struct Session {
    user_id: Uuid,
    expires_at: Instant,
}

/// Live bearer sessions keyed by token digest.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<[u8; 32], Session>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `user_id`. The plaintext is returned once and never stored.
    pub fn issue(&self, user_id: Uuid) -> CoreResult<String> {
        let expires_at = Instant::now()
            .checked_add(self.ttl)
            .ok_or_else(|| CoreError::Internal("session lifetime out of range".into()))?;
        let token = generate_token();
        self.lock()?.insert(hash_token(&token), Session { user_id, expires_at });
        Ok(token)
    }

    /// User id behind a live token. Expired entries are dropped on sight.
    pub fn validate(&self, token: &str) -> CoreResult<Option<Uuid>> {
        let key = hash_token(token);
        let mut sessions = self.lock()?;
        match sessions.get(&key) {
            Some(s) if s.expires_at > Instant::now() => Ok(Some(s.user_id)),
            Some(_) => {
                sessions.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn revoke(&self, token: &str) -> CoreResult<bool> {
        Ok(self.lock()?.remove(&hash_token(token)).is_some())
    }

    pub fn purge_expired(&self) -> CoreResult<usize> {
        let now = Instant::now();
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok(before - sessions.len())
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, HashMap<[u8; 32], Session>>> {
        self.sessions
            .lock()
            .map_err(|_| CoreError::Internal("session registry lock poisoned".into()))
    }
}

/// Returned on successful login.
#[derive(Debug, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: UserProfile,
}

pub struct AccountService {
    store: Arc<dyn RecordStore>,
    sessions: SessionRegistry,
    totp: Option<Arc<dyn TotpVerifier>>,
    password_iterations: u32,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        session_ttl: Duration,
        totp: Option<Arc<dyn TotpVerifier>>,
        password_iterations: u32,
    ) -> Self {
        Self {
            store,
            sessions: SessionRegistry::new(session_ttl),
            totp,
            password_iterations,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub async fn register(&self, username: &str, password: &str) -> CoreResult<UserProfile> {
        let username = validate_username(username)?;
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(CoreError::Validation(format!(
                "password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }
        if self.store.get_user_by_username(&username)?.is_some() {
            return Err(username_taken());
        }

        let password_hash = self.hash_blocking(password.to_string()).await?;
        let user = User {
            id: Uuid::new_v4(),
            username,
            password_hash,
            totp_secret: None,
            totp_enabled: false,
            totp_verified: false,
            created_at: stored_now(),
        };
        match self.store.insert_user(&user) {
            Ok(()) => {}
            Err(DatabaseError::ConstraintViolation(_)) => return Err(username_taken()),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user.id, "User registered");
        Ok(UserProfile::from(&user))
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        totp_code: Option<&str>,
    ) -> CoreResult<LoginOutcome> {
        let user = self.store.get_user_by_username(username.trim())?;

        // Unknown users still pay for one derivation.
        let encoded = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| placeholder_hash(self.password_iterations));
        let password_ok = self.verify_blocking(password.to_string(), encoded).await?;

        let Some(user) = user.filter(|_| password_ok) else {
            tracing::warn!("Login rejected");
            return Err(CoreError::Unauthorized);
        };

        if user.totp_enabled {
            let verified = match (&self.totp, user.totp_secret.as_deref(), totp_code) {
                (Some(verifier), Some(secret), Some(code)) => verifier.verify(secret, code.trim()),
                _ => false,
            };
            if !verified {
                tracing::warn!(user_id = %user.id, "Second factor rejected");
                return Err(CoreError::Unauthorized);
            }
        }

        let token = self.sessions.issue(user.id)?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome {
            token,
            token_type: "bearer",
            expires_in: self.sessions.ttl().as_secs(),
            user: UserProfile::from(&user),
        })
    }

    pub fn logout(&self, token: &str) -> CoreResult<()> {
        if self.sessions.revoke(token)? {
            tracing::info!("Session revoked");
        }
        Ok(())
    }

    /// Resolve a bearer token to its user.
    pub fn authenticate(&self, token: &str) -> CoreResult<User> {
        let user_id = self
            .sessions
            .validate(token)?
            .ok_or(CoreError::Unauthorized)?;
        self.store.get_user(&user_id)?.ok_or(CoreError::Unauthorized)
    }

    async fn hash_blocking(&self, password: String) -> CoreResult<String> {
        let iterations = self.password_iterations;
        let password = Zeroizing::new(password);
        tokio::task::spawn_blocking(move || hash_password(&password, iterations))
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    async fn verify_blocking(&self, password: String, encoded: String) -> CoreResult<bool> {
        let password = Zeroizing::new(password);
        tokio::task::spawn_blocking(move || verify_password(&password, &encoded))
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }
}

/// Well-formed hash that no password matches in practice.
fn placeholder_hash(iterations: u32) -> String {
    format!(
        "{HASH_SCHEME}${iterations}${}${}",
        STANDARD_NO_PAD.encode([0u8; SALT_LENGTH]),
        STANDARD_NO_PAD.encode([0u8; HASH_LENGTH])
    )
}

fn username_taken() -> CoreError {
    CoreError::Validation("username already taken".into())
}

fn validate_username(raw: &str) -> CoreResult<String> {
    let username = raw.trim();
    if !USERNAME_CHARS.contains(&username.chars().count()) {
        return Err(CoreError::Validation(format!(
            "username must be {} to {} characters",
            USERNAME_CHARS.start(),
            USERNAME_CHARS.end()
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
    {
        return Err(CoreError::Validation(
            "username may only contain letters, digits and _ - . @".into(),
        ));
    }
    Ok(username.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::db::MemoryStore;

    const FAST: u32 = 1_000;

    struct FixedCode(&'static str);

    impl TotpVerifier for FixedCode {
        fn verify(&self, _secret: &str, code: &str) -> bool {
            code == self.0
        }
    }

    fn service(totp: Option<Arc<dyn TotpVerifier>>) -> (AccountService, Arc<dyn RecordStore>) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        (
            AccountService::new(store.clone(), Duration::from_secs(60), totp, FAST),
            store,
        )
    }

    #[test]
    fn generate_token_is_random_and_url_safe() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
        assert_eq!(t1.len(), 43);
        assert!(t1.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn password_hash_round_trip() {
        let encoded = hash_password("correct horse", FAST);
        assert!(encoded.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify_password("correct horse", &encoded));
        assert!(!verify_password("wrong horse", &encoded));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        for bad in ["", "plain", "md5$1$a$b", "pbkdf2-sha256$x$AA$AA", "pbkdf2-sha256$0$AA$AA"] {
            assert!(!verify_password("anything", bad));
        }
    }

    #[test]
    fn unrepresentable_lifetime_fails_without_panicking() {
        let registry = SessionRegistry::new(Duration::MAX);
        assert!(matches!(registry.issue(Uuid::new_v4()), Err(CoreError::Internal(_))));
        assert_eq!(registry.purge_expired().unwrap(), 0);
    }

    #[tokio::test]
    async fn register_then_login_and_logout() {
        let (svc, _) = service(None);
        let profile = svc.register("maria", "s3cret-pass").await.unwrap();
        assert_eq!(profile.username, "maria");

        let outcome = svc.login("maria", "s3cret-pass", None).await.unwrap();
        assert_eq!(svc.authenticate(&outcome.token).unwrap().id, profile.id);

        svc.logout(&outcome.token).unwrap();
        assert!(matches!(svc.authenticate(&outcome.token), Err(CoreError::Unauthorized)));
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let (svc, _) = service(None);
        svc.register("maria", "s3cret-pass").await.unwrap();

        let wrong_pw = svc.login("maria", "nope-nope", None).await.unwrap_err();
        let unknown = svc.login("nobody", "s3cret-pass", None).await.unwrap_err();
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
        assert!(matches!(unknown, CoreError::Unauthorized));
    }

    #[tokio::test]
    async fn registration_validation() {
        let (svc, _) = service(None);
        assert!(matches!(svc.register("ab", "longenough").await, Err(CoreError::Validation(_))));
        assert!(matches!(svc.register("maria", "short").await, Err(CoreError::Validation(_))));
        assert!(matches!(svc.register("bad name", "longenough").await, Err(CoreError::Validation(_))));

        svc.register("maria", "longenough").await.unwrap();
        let dup = svc.register("maria", "longenough").await.unwrap_err();
        assert_eq!(dup.to_string(), "Invalid input: username already taken");
    }

    #[tokio::test]
    async fn totp_required_when_enabled() {
        let (svc, store) = service(Some(Arc::new(FixedCode("123456"))));
        let user = User {
            id: Uuid::new_v4(),
            username: "two-factor".into(),
            password_hash: hash_password("s3cret-pass", FAST),
            totp_secret: Some("JBSWY3DPEHPK3PXP".into()),
            totp_enabled: true,
            totp_verified: true,
            created_at: Utc::now(),
        };
        store.insert_user(&user).unwrap();

        assert!(svc.login("two-factor", "s3cret-pass", None).await.is_err());
        assert!(svc.login("two-factor", "s3cret-pass", Some("000000")).await.is_err());
        assert!(svc.login("two-factor", "s3cret-pass", Some("123456")).await.is_ok());
    }

    #[tokio::test]
    async fn totp_user_rejected_without_verifier() {
        let (svc, store) = service(None);
        store
            .insert_user(&User {
                id: Uuid::new_v4(),
                username: "two-factor".into(),
                password_hash: hash_password("s3cret-pass", FAST),
                totp_secret: Some("JBSWY3DPEHPK3PXP".into()),
                totp_enabled: true,
                totp_verified: true,
                created_at: Utc::now(),
            })
            .unwrap();
        assert!(matches!(
            svc.login("two-factor", "s3cret-pass", Some("123456")).await,
            Err(CoreError::Unauthorized)
        ));
    }

    #[test]
    fn expired_sessions_rejected() {
        let registry = SessionRegistry::new(Duration::ZERO);
        let token = registry.issue(Uuid::new_v4()).unwrap();
        assert_eq!(registry.validate(&token).unwrap(), None);

        let registry = SessionRegistry::new(Duration::from_secs(60));
        let user = Uuid::new_v4();
        let token = registry.issue(user).unwrap();
        assert_eq!(registry.validate(&token).unwrap(), Some(user));
        assert_eq!(registry.purge_expired().unwrap(), 0);
    }
}
