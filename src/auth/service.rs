use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::jwt::{self, JwtKeys, TokenError};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::reset;
use crate::auth::store::{Role, User, UserStore};
use crate::config::AuthConfig;
use crate::email::Mailer;
use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("You are not logged in. Please log in to get access")]
    MissingToken,

    #[error("Invalid token. Please log in again")]
    InvalidToken,

    #[error("Your token has expired. Please log in again")]
    ExpiredToken,

    #[error("The user belonging to this token no longer exists")]
    SubjectGone,

    #[error("Password was changed recently. Please log in again")]
    PasswordChanged,

    // One message for unknown email and wrong password alike, so a caller
    // cannot probe which accounts exist.
    #[error("Incorrect email or password")]
    BadCredentials,

    #[error("Your current password is wrong")]
    IncorrectPassword,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Token is invalid or has expired")]
    BadResetToken,

    #[error("There is no user with that email address")]
    UnknownEmail,

    #[error("There was an error sending the email. Please try again later")]
    EmailDispatch(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::Forbidden => ApiError::Forbidden(message),
            AuthError::BadResetToken => ApiError::BadRequest(message),
            AuthError::UnknownEmail => ApiError::NotFound(message),
            AuthError::EmailDispatch(source) => ApiError::Internal(source.context(message)),
            AuthError::Store(source) => ApiError::Internal(source),
            _ => ApiError::Unauthorized(message),
        }
    }
}

/// A freshly issued session: the token for the response body and the
/// `Set-Cookie` value mirroring it.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub cookie: String,
}

/// Issues, verifies, and invalidates sessions; owns the password-reset
/// token lifecycle. Stateless between requests: everything durable lives
/// behind the [`UserStore`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    keys: JwtKeys,
    reset_ttl: Duration,
    cookie_secure: bool,
    public_url: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>, config: &AuthConfig) -> Self {
        Self {
            store,
            mailer,
            keys: JwtKeys::from_config(config),
            reset_ttl: Duration::minutes(config.reset_ttl_minutes.max(1)),
            cookie_secure: config.cookie_secure,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    pub fn issue_session(&self, user_id: Uuid) -> Result<Session, AuthError> {
        let token = self.keys.sign(user_id)?;
        let cookie = jwt::session_cookie(&token, self.keys.ttl(), self.cookie_secure);
        Ok(Session { token, cookie })
    }

    pub fn logout_cookie(&self) -> String {
        jwt::logout_cookie()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, Session), AuthError> {
        let Some(user) = self.store.find_by_email(email).await? else {
            warn!(email = %email, "login with unknown email");
            return Err(AuthError::BadCredentials);
        };
        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login with wrong password");
            return Err(AuthError::BadCredentials);
        }
        let session = self.issue_session(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok((user, session))
    }

    /// Full bearer check: present, well-formed, unexpired, subject still
    /// exists, and no credential rotation since issuance.
    pub async fn verify_token(&self, token: Option<&str>) -> Result<User, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        let claims = self.keys.verify(token).map_err(|err| match err {
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::Invalid => AuthError::InvalidToken,
        })?;
        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::SubjectGone)?;
        if user.changed_password_after(claims.iat) {
            return Err(AuthError::PasswordChanged);
        }
        Ok(user)
    }

    /// Like [`verify_token`](Self::verify_token) but never fails the
    /// request; callers render anonymously instead.
    pub async fn optional_verify(&self, token: Option<&str>) -> Option<User> {
        self.verify_token(token).await.ok()
    }

    pub fn authorize(user: &User, allowed: &[Role]) -> Result<(), AuthError> {
        if allowed.contains(&user.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }

    /// Persists a one-time reset token and mails the raw value. A failed
    /// dispatch clears the persisted token before surfacing: a reset token
    /// nobody was told about must not stay live.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UnknownEmail)?;

        let token = reset::generate();
        let expires = OffsetDateTime::now_utc() + self.reset_ttl;
        self.store
            .set_reset_token(user.id, &token.hash, expires)
            .await?;

        let reset_url = format!(
            "{}/api/v1/users/resetPassword/{}",
            self.public_url, token.raw
        );
        let minutes = self.reset_ttl.whole_minutes();
        let subject = format!("Your password reset token (valid for {minutes} minutes)");
        let body = format!(
            "Forgot your password? Submit a PATCH request with your new password to: {reset_url}\n\
             If you didn't forget your password, please ignore this email."
        );

        if let Err(err) = self.mailer.send(&user.email, &subject, &body).await {
            self.store.clear_reset_token(user.id).await?;
            return Err(AuthError::EmailDispatch(err));
        }
        info!(user_id = %user.id, "password reset email dispatched");
        Ok(())
    }

    /// Consumes a reset token: one successful use re-hashes the password,
    /// clears the token, and logs the user straight in.
    pub async fn reset_password(
        &self,
        raw_token: &str,
        new_password: &str,
    ) -> Result<(User, Session), AuthError> {
        let now = OffsetDateTime::now_utc();
        let user = self
            .store
            .find_by_reset_hash(&reset::digest(raw_token), now)
            .await?
            .ok_or(AuthError::BadResetToken)?;

        let password_hash = hash_password(new_password)?;
        // Backdated one second so the session issued below is not seen as
        // pre-dating its own password change.
        self.store
            .update_password(user.id, &password_hash, now - Duration::seconds(1))
            .await?;

        let session = self.issue_session(user.id)?;
        let user = self
            .store
            .find_by_id(user.id)
            .await?
            .ok_or(AuthError::SubjectGone)?;
        info!(user_id = %user.id, "password reset completed");
        Ok((user, session))
    }

    /// Password change for a logged-in user; re-issues the session since
    /// the rotation invalidates every outstanding token.
    pub async fn update_password(
        &self,
        user: &User,
        current: &str,
        new_password: &str,
    ) -> Result<Session, AuthError> {
        if !verify_password(current, &user.password_hash)? {
            return Err(AuthError::IncorrectPassword);
        }
        let password_hash = hash_password(new_password)?;
        let changed_at = OffsetDateTime::now_utc() - Duration::seconds(1);
        self.store
            .update_password(user.id, &password_hash, changed_at)
            .await?;
        info!(user_id = %user.id, "password updated");
        self.issue_session(user.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;
    use crate::auth::jwt::Claims;
    use crate::auth::store::NewUser;
    use crate::email::Mailer;

    struct MemUserStore {
        users: Mutex<Vec<User>>,
    }

    impl MemUserStore {
        fn new() -> Self {
            Self {
                users: Mutex::new(Vec::new()),
            }
        }

        fn snapshot(&self, id: Uuid) -> User {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == id)
                .cloned()
                .expect("user present")
        }

        fn mutate<F: FnOnce(&mut User)>(&self, id: Uuid, f: F) {
            let mut users = self.users.lock().unwrap();
            let user = users.iter_mut().find(|u| u.id == id).expect("user present");
            f(user);
        }
    }

    #[async_trait]
    impl UserStore for MemUserStore {
        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.email == email && u.active)
                .cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == id && u.active)
                .cloned())
        }

        async fn create(&self, new: NewUser) -> anyhow::Result<User> {
            let user = User {
                id: Uuid::new_v4(),
                name: new.name,
                email: new.email,
                password_hash: new.password_hash,
                photo: new.photo,
                role: new.role,
                password_changed_at: None,
                password_reset_token: None,
                password_reset_expires: None,
                active: true,
                created_at: OffsetDateTime::now_utc(),
                row_version: 0,
            };
            self.users.lock().unwrap().push(user.clone());
            Ok(user)
        }

        async fn set_reset_token(
            &self,
            id: Uuid,
            token_hash: &str,
            expires: OffsetDateTime,
        ) -> anyhow::Result<()> {
            self.mutate(id, |u| {
                u.password_reset_token = Some(token_hash.to_string());
                u.password_reset_expires = Some(expires);
            });
            Ok(())
        }

        async fn clear_reset_token(&self, id: Uuid) -> anyhow::Result<()> {
            self.mutate(id, |u| {
                u.password_reset_token = None;
                u.password_reset_expires = None;
            });
            Ok(())
        }

        async fn find_by_reset_hash(
            &self,
            token_hash: &str,
            now: OffsetDateTime,
        ) -> anyhow::Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| {
                    u.active
                        && u.password_reset_token.as_deref() == Some(token_hash)
                        && u.password_reset_expires.is_some_and(|at| at > now)
                })
                .cloned())
        }

        async fn update_password(
            &self,
            id: Uuid,
            password_hash: &str,
            changed_at: OffsetDateTime,
        ) -> anyhow::Result<()> {
            self.mutate(id, |u| {
                u.password_hash = password_hash.to_string();
                u.password_changed_at = Some(changed_at);
                u.password_reset_token = None;
                u.password_reset_expires = None;
            });
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingMailer {
        fn last_body(&self) -> String {
            self.sent.lock().unwrap().last().expect("mail sent").2.clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("smtp relay unreachable")
        }
    }

    struct Harness {
        store: Arc<MemUserStore>,
        mailer: Arc<RecordingMailer>,
        auth: AuthService,
    }

    const PASSWORD: &str = "pass1234";

    async fn harness() -> (Harness, User) {
        let store = Arc::new(MemUserStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let auth = AuthService::new(store.clone(), mailer.clone(), &AuthConfig::for_tests());
        let user = store
            .create(NewUser {
                name: "Test User".into(),
                email: "test@example.com".into(),
                password_hash: hash_password(PASSWORD).unwrap(),
                photo: None,
                role: Role::User,
            })
            .await
            .unwrap();
        (
            Harness {
                store,
                mailer,
                auth,
            },
            user,
        )
    }

    fn raw_token_from(body: &str) -> String {
        let tail = body
            .split("resetPassword/")
            .nth(1)
            .expect("reset url in mail body");
        tail.chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect()
    }

    /// A structurally valid token signed with the test secret but issued
    /// in the past.
    fn token_issued_at(user_id: Uuid, iat: OffsetDateTime) -> String {
        let claims = Claims {
            sub: user_id,
            iat: iat.unix_timestamp() as usize,
            exp: (iat + Duration::hours(1)).unix_timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(AuthConfig::for_tests().jwt_secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let (h, _) = harness().await;
        let unknown = h.auth.login("nobody@example.com", PASSWORD).await.unwrap_err();
        let wrong = h.auth.login("test@example.com", "wrong-pass").await.unwrap_err();
        assert!(matches!(unknown, AuthError::BadCredentials));
        assert!(matches!(wrong, AuthError::BadCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn login_issues_a_verifiable_session() {
        let (h, user) = harness().await;
        let (_, session) = h.auth.login("test@example.com", PASSWORD).await.unwrap();
        let verified = h.auth.verify_token(Some(&session.token)).await.unwrap();
        assert_eq!(verified.id, user.id);
        assert!(session.cookie.starts_with("jwt="));
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let (h, _) = harness().await;
        let err = h.auth.verify_token(None).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let (h, _) = harness().await;
        let err = h.auth.verify_token(Some("loggedout")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn deactivated_subject_is_rejected() {
        let (h, user) = harness().await;
        let (_, session) = h.auth.login("test@example.com", PASSWORD).await.unwrap();
        h.store.mutate(user.id, |u| u.active = false);
        let err = h.auth.verify_token(Some(&session.token)).await.unwrap_err();
        assert!(matches!(err, AuthError::SubjectGone));
    }

    #[tokio::test]
    async fn password_change_kills_tokens_issued_before_it() {
        let (h, user) = harness().await;
        let stale = token_issued_at(user.id, OffsetDateTime::now_utc() - Duration::seconds(30));
        // Sanity: the stale token is fine until the password rotates.
        assert!(h.auth.verify_token(Some(&stale)).await.is_ok());

        let session = h
            .auth
            .update_password(&user, PASSWORD, "brand-new-pass")
            .await
            .unwrap();

        let err = h.auth.verify_token(Some(&stale)).await.unwrap_err();
        assert!(matches!(err, AuthError::PasswordChanged));
        // The replacement session from the same flow stays valid.
        assert!(h.auth.verify_token(Some(&session.token)).await.is_ok());
    }

    #[tokio::test]
    async fn update_password_requires_the_current_one() {
        let (h, user) = harness().await;
        let err = h
            .auth
            .update_password(&user, "not-the-password", "whatever-new")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IncorrectPassword));
    }

    #[tokio::test]
    async fn authorize_checks_the_role_whitelist() {
        let (_, user) = harness().await;
        let err = AuthService::authorize(&user, &[Role::Admin, Role::LeadGuide]).unwrap_err();
        assert!(matches!(err, AuthError::Forbidden));

        let mut admin = user.clone();
        admin.role = Role::Admin;
        assert!(AuthService::authorize(&admin, &[Role::Admin, Role::LeadGuide]).is_ok());
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_is_not_found() {
        let (h, _) = harness().await;
        let err = h.auth.forgot_password("nobody@example.com").await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownEmail));
    }

    #[tokio::test]
    async fn reset_token_is_consumed_exactly_once() {
        let (h, user) = harness().await;
        h.auth.forgot_password("test@example.com").await.unwrap();
        let raw = raw_token_from(&h.mailer.last_body());

        let (reset_user, session) = h.auth.reset_password(&raw, "new-password-1").await.unwrap();
        assert_eq!(reset_user.id, user.id);
        // Auto-login: the fresh session verifies despite the rotation.
        assert!(h.auth.verify_token(Some(&session.token)).await.is_ok());
        assert!(h
            .auth
            .login("test@example.com", "new-password-1")
            .await
            .is_ok());

        let err = h.auth.reset_password(&raw, "new-password-2").await.unwrap_err();
        assert!(matches!(err, AuthError::BadResetToken));
    }

    #[tokio::test]
    async fn only_the_hash_of_the_reset_token_is_stored() {
        let (h, user) = harness().await;
        h.auth.forgot_password("test@example.com").await.unwrap();
        let raw = raw_token_from(&h.mailer.last_body());
        let stored = h.store.snapshot(user.id).password_reset_token.unwrap();
        assert_ne!(stored, raw);
        assert_eq!(stored, reset::digest(&raw));
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let (h, user) = harness().await;
        h.auth.forgot_password("test@example.com").await.unwrap();
        let raw = raw_token_from(&h.mailer.last_body());
        h.store.mutate(user.id, |u| {
            u.password_reset_expires =
                Some(OffsetDateTime::now_utc() - Duration::minutes(1));
        });
        let err = h.auth.reset_password(&raw, "new-password").await.unwrap_err();
        assert!(matches!(err, AuthError::BadResetToken));
    }

    #[tokio::test]
    async fn failed_dispatch_rolls_back_the_reset_token() {
        let store = Arc::new(MemUserStore::new());
        let auth = AuthService::new(
            store.clone(),
            Arc::new(FailingMailer),
            &AuthConfig::for_tests(),
        );
        let user = store
            .create(NewUser {
                name: "Test User".into(),
                email: "test@example.com".into(),
                password_hash: hash_password(PASSWORD).unwrap(),
                photo: None,
                role: Role::User,
            })
            .await
            .unwrap();

        let err = auth.forgot_password("test@example.com").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailDispatch(_)));

        let after = store.snapshot(user.id);
        assert!(after.password_reset_token.is_none());
        assert!(after.password_reset_expires.is_none());
    }

    #[test]
    fn auth_errors_map_to_the_documented_statuses() {
        use axum::http::StatusCode;

        // Failed logins are a real 401, not a generic error.
        assert_eq!(
            ApiError::from(AuthError::BadCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::PasswordChanged).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::IncorrectPassword).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::Forbidden).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::BadResetToken).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AuthError::UnknownEmail).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn optional_verify_swallows_every_failure() {
        let (h, _) = harness().await;
        assert!(h.auth.optional_verify(None).await.is_none());
        assert!(h.auth.optional_verify(Some("garbage")).await.is_none());
        let (_, session) = h.auth.login("test@example.com", PASSWORD).await.unwrap();
        assert!(h.auth.optional_verify(Some(&session.token)).await.is_some());
    }
}
