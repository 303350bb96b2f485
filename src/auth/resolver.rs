//! # Identity Resolution
//!
//! Turns a bearer token into a [`SecurityContext`]. Verification is
//! stateless: signature, expiry, and optional audience/issuer checks only.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::config::JwtSettings;

use super::context::SecurityContext;
use super::errors::{AuthError, AuthResult};

/// Auth collaborator: verified token in, identity out
///
/// `Ok(None)` means the token is well-formed but names nobody the gateway
/// should serve.
#[async_trait]
pub trait AuthResolver: Send + Sync {
    async fn resolve_identity(&self, token: &str) -> AuthResult<Option<SecurityContext>>;
}

/// HS256 JWT resolver
#[derive(Clone)]
pub struct JwtAuthResolver {
    settings: JwtSettings,
    decoding_key: DecodingKey,
}

impl JwtAuthResolver {
    pub fn new(settings: JwtSettings) -> Self {
        let decoding_key = DecodingKey::from_secret(settings.secret.as_bytes());
        Self {
            settings,
            decoding_key,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        match &self.settings.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = &self.settings.issuer {
            validation.set_issuer(&[iss]);
        }
        validation
    }

    /// Verify `token` and build the context it describes
    pub fn verify(&self, token: &str) -> AuthResult<SecurityContext> {
        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidAudience => AuthError::InvalidClaims("aud".into()),
                ErrorKind::InvalidIssuer => AuthError::InvalidClaims("iss".into()),
                _ => AuthError::MalformedToken,
            })?;
        let claims = data.claims;

        let subject = match claims.get("sub") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(AuthError::InvalidClaims("sub".into())),
        };
        let role = match claims.get(&self.settings.role_claim) {
            None => self.settings.default_role.clone(),
            Some(Value::String(r)) if !r.is_empty() => r.clone(),
            Some(_) => return Err(AuthError::InvalidClaims(self.settings.role_claim.clone())),
        };

        Ok(SecurityContext::authenticated(subject, role, claims))
    }
}

#[async_trait]
impl AuthResolver for JwtAuthResolver {
    async fn resolve_identity(&self, token: &str) -> AuthResult<Option<SecurityContext>> {
        self.verify(token).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret-with-enough-bytes-000";

    fn sign(claims: Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn resolver() -> JwtAuthResolver {
        JwtAuthResolver::new(JwtSettings {
            secret: SECRET.into(),
            ..JwtSettings::default()
        })
    }

    fn exp(offset: i64) -> i64 {
        Utc::now().timestamp() + offset
    }

    #[test]
    fn test_valid_token() {
        let token = sign(json!({"sub": "u1", "role": "member", "exp": exp(600)}));
        let ctx = resolver().verify(&token).unwrap();
        assert_eq!(ctx.subject_id(), Some("u1"));
        assert_eq!(ctx.role(), "member");
        assert_eq!(ctx.claims()["sub"], "u1");
    }

    #[test]
    fn test_missing_role_uses_default() {
        let token = sign(json!({"sub": "u1", "exp": exp(600)}));
        assert_eq!(resolver().verify(&token).unwrap().role(), "authenticated");
    }

    #[test]
    fn test_expired() {
        let token = sign(json!({"sub": "u1", "exp": exp(-3600)}));
        assert_eq!(resolver().verify(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_wrong_secret() {
        let token = encode(
            &Header::default(),
            &json!({"sub": "u1", "exp": exp(600)}),
            &EncodingKey::from_secret(b"other-secret-other-secret-other!!"),
        )
        .unwrap();
        assert_eq!(resolver().verify(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_garbage() {
        assert_eq!(resolver().verify("not.a.jwt"), Err(AuthError::MalformedToken));
    }

    #[test]
    fn test_missing_subject() {
        let token = sign(json!({"role": "member", "exp": exp(600)}));
        assert!(matches!(
            resolver().verify(&token),
            Err(AuthError::InvalidClaims(_))
        ));
    }

    #[test]
    fn test_audience_checked_when_configured() {
        let resolver = JwtAuthResolver::new(JwtSettings {
            secret: SECRET.into(),
            audience: Some("gateway".into()),
            ..JwtSettings::default()
        });
        let token = sign(json!({"sub": "u1", "aud": "elsewhere", "exp": exp(600)}));
        assert!(matches!(
            resolver.verify(&token),
            Err(AuthError::InvalidClaims(_))
        ));
    }
}
