use std::time::Duration;

use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::AuthConfig;

/// Name of the session cookie mirroring the bearer token.
pub const SESSION_COOKIE: &str = "jwt";

/// Stateless session claims: the subject and the issue/expiry instants are
/// all a token carries.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

/// Holds the signing and verification keys plus the fixed token TTL.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl: Duration::from_secs(config.jwt_ttl_minutes.max(1) as u64 * 60),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sign(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: user_id,
            iat: now as usize,
            exp: (now + self.ttl.as_secs() as i64) as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

/// `Set-Cookie` value mirroring a freshly issued token. HTTP-only so
/// scripts cannot read it; `Secure` only outside development.
pub fn session_cookie(token: &str, ttl: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; Max-Age={}",
        ttl.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Overwrites the session cookie with a short-lived sentinel.
pub fn logout_cookie() -> String {
    format!("{SESSION_COOKIE}=loggedout; HttpOnly; Path=/; Max-Age=10")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::from_config(&AuthConfig::for_tests())
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, keys.ttl().as_secs() as usize);
    }

    #[test]
    fn tampered_token_is_invalid() {
        let keys = keys();
        let mut token = keys.sign(Uuid::new_v4()).expect("sign");
        token.pop();
        assert_eq!(keys.verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = keys().sign(Uuid::new_v4()).expect("sign");
        let mut other_config = AuthConfig::for_tests();
        other_config.jwt_secret = "another-secret".into();
        let other = JwtKeys::from_config(&other_config);
        assert_eq!(other.verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let keys = keys();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: (now - 7200) as usize,
            exp: (now - 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(AuthConfig::for_tests().jwt_secret.as_bytes()),
        )
        .expect("encode");
        assert_eq!(keys.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn cookie_carries_ttl_and_secure_flag() {
        let cookie = session_cookie("abc", Duration::from_secs(120), false);
        assert_eq!(cookie, "jwt=abc; HttpOnly; Path=/; Max-Age=120");
        let secure = session_cookie("abc", Duration::from_secs(120), true);
        assert!(secure.ends_with("; Secure"));
    }

    #[test]
    fn logout_cookie_uses_sentinel_and_short_expiry() {
        assert_eq!(logout_cookie(), "jwt=loggedout; HttpOnly; Path=/; Max-Age=10");
    }
}
