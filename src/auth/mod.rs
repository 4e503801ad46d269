//! Authentication primitives: password hashing, the JWT access/refresh
//! token provider, and the role hierarchy used by the route guards.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// User roles, ordered: a higher role passes every lower gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    User,
    Manager,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    /// Whether a user holding this role may pass a gate requiring `required`
    pub fn satisfies(&self, required: Role) -> bool {
        *self >= required
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Signature invalid, token malformed, or expired
    #[error("token signature or expiry validation failed")]
    Invalid,
    /// A structurally valid token presented in the wrong role, e.g. an
    /// access token offered to the refresh endpoint
    #[error("token was issued for a different use")]
    WrongUse,
}

/// Discriminates access tokens from refresh tokens so one can never stand
/// in for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Unique token id; keeps two tokens minted in the same second from
    /// encoding to the same string
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub token_use: TokenUse,
}

/// An access/refresh token pair minted at login or refresh
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints and verifies the HMAC-signed JWTs used for authentication.
pub struct TokenProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenProvider {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn from_config(config: &crate::config::AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
        )
    }

    fn mint(&self, user_id: &str, token_use: TokenUse, ttl_secs: i64) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl_secs,
            token_use,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| TokenError::Invalid)
    }

    /// Mint a fresh access/refresh pair for a user
    pub fn create_pair(&self, user_id: &str) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.mint(user_id, TokenUse::Access, self.access_ttl_secs)?,
            refresh_token: self.mint(user_id, TokenUse::Refresh, self.refresh_ttl_secs)?,
        })
    }

    /// Validate signature and expiry, and that the token was minted for
    /// the expected use. Returns the claims on success.
    pub fn verify(&self, token: &str, expected_use: TokenUse) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| TokenError::Invalid)?;

        if data.claims.token_use != expected_use {
            return Err(TokenError::WrongUse);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> TokenProvider {
        TokenProvider::new("test-secret", 60, 3600)
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn test_verify_password_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::Admin.satisfies(Role::User));
        assert!(Role::Admin.satisfies(Role::Manager));
        assert!(Role::Admin.satisfies(Role::Admin));
        assert!(Role::Manager.satisfies(Role::User));
        assert!(!Role::Manager.satisfies(Role::Admin));
        assert!(Role::User.satisfies(Role::User));
        assert!(!Role::User.satisfies(Role::Manager));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("manager"), Some(Role::Manager));
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::Manager.as_str(), "manager");
    }

    #[test]
    fn test_token_pair_roundtrip() {
        let provider = provider();
        let pair = provider.create_pair("user-123").unwrap();

        let access = provider.verify(&pair.access_token, TokenUse::Access).unwrap();
        assert_eq!(access.sub, "user-123");
        assert_eq!(access.token_use, TokenUse::Access);

        let refresh = provider
            .verify(&pair.refresh_token, TokenUse::Refresh)
            .unwrap();
        assert_eq!(refresh.sub, "user-123");
        assert_eq!(refresh.token_use, TokenUse::Refresh);
    }

    #[test]
    fn test_access_token_rejected_as_refresh() {
        let provider = provider();
        let pair = provider.create_pair("user-123").unwrap();

        let err = provider
            .verify(&pair.access_token, TokenUse::Refresh)
            .unwrap_err();
        assert_eq!(err, TokenError::WrongUse);

        let err = provider
            .verify(&pair.refresh_token, TokenUse::Access)
            .unwrap_err();
        assert_eq!(err, TokenError::WrongUse);
    }

    #[test]
    fn test_expired_token_rejected() {
        let provider = TokenProvider::new("test-secret", -10, -10);
        let pair = provider.create_pair("user-123").unwrap();

        let err = provider
            .verify(&pair.access_token, TokenUse::Access)
            .unwrap_err();
        assert_eq!(err, TokenError::Invalid);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let pair = provider().create_pair("user-123").unwrap();

        let other = TokenProvider::new("other-secret", 60, 3600);
        let err = other
            .verify(&pair.access_token, TokenUse::Access)
            .unwrap_err();
        assert_eq!(err, TokenError::Invalid);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let provider = provider();
        let pair = provider.create_pair("user-123").unwrap();

        let mut tampered = pair.access_token.clone();
        tampered.pop();
        assert!(provider.verify(&tampered, TokenUse::Access).is_err());
    }
}
