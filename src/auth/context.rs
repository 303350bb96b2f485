//! Resolved caller identity

use serde_json::{Map, Value};

/// Identity bound to one database session for one request
///
/// `claims` is what RLS policies read back through
/// `current_setting('request.jwt.claims')`. Anonymous callers carry an
/// empty claim set plus the configured anonymous role.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityContext {
    subject_id: Option<String>,
    role: String,
    claims: Map<String, Value>,
}

impl SecurityContext {
    pub fn anonymous(role: impl Into<String>) -> Self {
        let role = role.into();
        let mut claims = Map::new();
        claims.insert("role".to_string(), Value::String(role.clone()));
        Self {
            subject_id: None,
            role,
            claims,
        }
    }

    pub fn authenticated(
        subject_id: impl Into<String>,
        role: impl Into<String>,
        claims: Map<String, Value>,
    ) -> Self {
        Self {
            subject_id: Some(subject_id.into()),
            role: role.into(),
            claims,
        }
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn is_anonymous(&self) -> bool {
        self.subject_id.is_none()
    }

    /// Claims serialized for `request.jwt.claims`
    pub fn claims_json(&self) -> String {
        Value::Object(self.claims.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_anonymous() {
        let ctx = SecurityContext::anonymous("anon");
        assert!(ctx.is_anonymous());
        assert_eq!(ctx.role(), "anon");
        assert_eq!(ctx.claims_json(), r#"{"role":"anon"}"#);
    }

    #[test]
    fn test_authenticated_claims_round_trip() {
        let claims = json!({"sub": "u1", "role": "authenticated"});
        let ctx = SecurityContext::authenticated(
            "u1",
            "authenticated",
            claims.as_object().cloned().unwrap(),
        );
        assert_eq!(ctx.subject_id(), Some("u1"));
        let parsed: Value = serde_json::from_str(&ctx.claims_json()).unwrap();
        assert_eq!(parsed, claims);
    }
}
