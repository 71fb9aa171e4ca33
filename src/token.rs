//! Signed access/refresh token issuance and verification.
//!
//! Both kinds share one HS256 signing scheme and are scoped with issuer
//! and audience claims plus a `type` discriminator. Verification checks
//! signature, expiry, issuer, audience, and kind; a refresh token never
//! validates as an access token, nor the reverse. Every verification
//! failure collapses to the same uninformative error.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::model::Account;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
    /// Unique token id; present on refresh tokens for individual
    /// revocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// An issued access/refresh pair. `expires_at` is the access token's
/// expiry, which is what callers schedule refreshes against.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_token_jti: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.token_secret().expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer().to_string(),
            audience: config.audience().to_string(),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
        }
    }

    /// Issue an access/refresh pair for the account.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_pair(&self, account: &Account) -> Result<TokenPair> {
        let now = Utc::now();
        let access_token = self.issue(account, TokenKind::Access, self.access_ttl, None, now)?;
        let jti = Uuid::new_v4().to_string();
        let refresh_token = self.issue(
            account,
            TokenKind::Refresh,
            self.refresh_ttl,
            Some(jti.clone()),
            now,
        )?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_token_jti: jti,
            expires_at: now + self.access_ttl,
        })
    }

    /// Issue a fresh access token only (the refresh flow).
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_access(&self, account: &Account) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let token = self.issue(account, TokenKind::Access, self.access_ttl, None, now)?;
        Ok((token, now + self.access_ttl))
    }

    fn issue(
        &self,
        account: &Account,
        kind: TokenKind,
        ttl: Duration,
        jti: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let claims = Claims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            name: account.name.clone(),
            roles: account.roles.clone(),
            kind: kind.as_str().to_string(),
            jti,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to sign token")
    }

    /// Verify a token as the expected kind.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidToken` for any failure: bad signature,
    /// expiry, issuer, audience, or a kind mismatch.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        if data.claims.kind != expected.as_str() {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::{TokenKind, TokenService};
    use crate::config::AuthConfig;
    use crate::error::AuthError;
    use crate::model::Account;
    use chrono::Duration;

    fn account() -> Account {
        Account::new(
            "admin@example.com".to_string(),
            "Admin".to_string(),
            "$argon2id$stub".to_string(),
            vec!["admin".to_string()],
        )
    }

    fn service() -> TokenService {
        TokenService::new(&AuthConfig::development())
    }

    #[test]
    fn access_token_round_trip() {
        let service = service();
        let account = account();
        let pair = service.issue_pair(&account).unwrap();

        let claims = service.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.kind, "access");
        assert_eq!(claims.sub, account.id.to_string());
        assert_eq!(claims.email, "admin@example.com");
        assert_eq!(claims.roles, vec!["admin".to_string()]);
        assert_eq!(claims.jti, None);
    }

    #[test]
    fn refresh_token_carries_jti() {
        let service = service();
        let pair = service.issue_pair(&account()).unwrap();

        let claims = service.verify(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(claims.kind, "refresh");
        assert_eq!(claims.jti.as_deref(), Some(pair.refresh_token_jti.as_str()));
    }

    #[test]
    fn kinds_never_cross_validate() {
        let service = service();
        let pair = service.issue_pair(&account()).unwrap();

        assert!(matches!(
            service.verify(&pair.refresh_token, TokenKind::Access),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            service.verify(&pair.access_token, TokenKind::Refresh),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn foreign_audience_is_rejected() {
        let issuing = TokenService::new(
            &AuthConfig::development().with_audience("other-app".to_string()),
        );
        let pair = issuing.issue_pair(&account()).unwrap();

        assert!(matches!(
            service().verify(&pair.access_token, TokenKind::Access),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let issuing = TokenService::new(
            &AuthConfig::development().with_issuer("https://elsewhere.example".to_string()),
        );
        let pair = issuing.issue_pair(&account()).unwrap();

        assert!(matches!(
            service().verify(&pair.access_token, TokenKind::Access),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Issue with an already-elapsed TTL; leeway is 60 s, so go well past.
        let issuing = TokenService::new(
            &AuthConfig::development().with_access_token_ttl(Duration::minutes(-10)),
        );
        let pair = issuing.issue_pair(&account()).unwrap();

        assert!(matches!(
            service().verify(&pair.access_token, TokenKind::Access),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let service = service();
        let pair = service.issue_pair(&account()).unwrap();
        let mut tampered = pair.access_token.clone();
        tampered.pop();
        tampered.push('x');

        assert!(matches!(
            service.verify(&tampered, TokenKind::Access),
            Err(AuthError::InvalidToken)
        ));
    }
}
