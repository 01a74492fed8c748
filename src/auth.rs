//! Bearer-token verification and the declarative authorisation table.
//!
//! Tokens are compact HMAC-SHA256 JWTs signed with a shared secret. The
//! verifier is stateless after construction and safe for concurrent use.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::wire::Principal;

/// HMAC-SHA256 requires a key of at least the hash output size.
const MIN_SECRET_BYTES: usize = 32;

/// Path prefixes that never require authentication.
const PERMITTED_PREFIXES: &[&str] = &[
    "/api/auth/",
    "/actuator/",
    "/v3/api-docs",
    "/swagger-ui/",
];

/// Exact paths that never require authentication.
const PERMITTED_PATHS: &[&str] = &["/api/auth", "/api/health"];

/// Whether `path` may be served without a principal.
pub fn is_permitted(path: &str) -> bool {
    PERMITTED_PATHS.contains(&path) || PERMITTED_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Extract the token from an `Authorization` header value.
///
/// The `Bearer ` prefix is case-sensitive with a single space; anything else
/// is treated as no token.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header.and_then(|h| h.strip_prefix("Bearer "))
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validity_ms: u64,
}

impl TokenVerifier {
    /// Build a verifier from the shared secret (UTF-8 bytes) and the expiry
    /// applied to tokens this gateway signs itself.
    pub fn new(secret: &str, validity_ms: u64) -> Result<Self> {
        if secret.len() < MIN_SECRET_BYTES {
            anyhow::bail!(
                "jwt secret must be at least {} bytes, got {}",
                MIN_SECRET_BYTES,
                secret.len()
            );
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validity_ms,
        })
    }

    /// `true` iff the signature verifies and `exp` is strictly in the future.
    pub fn validate(&self, token: &str) -> bool {
        self.decode(token).is_ok()
    }

    /// Extract the authenticated identity from an already-validated token.
    ///
    /// Malformed claims yield an error; the auth filter surfaces it as 401.
    pub fn authenticate(&self, token: &str) -> Result<Principal> {
        let claims = self.decode(token).context("token rejected")?;
        Ok(Principal {
            account_id: claims.sub,
            email: claims.email,
            name: claims.name,
            roles: claims.roles.unwrap_or_default(),
        })
    }

    /// Sign a token for `principal` expiring after the configured validity.
    pub fn issue(&self, principal: &Principal) -> Result<String> {
        let exp = Utc::now().timestamp() + (self.validity_ms / 1000) as i64;
        let claims = Claims {
            sub: principal.account_id.clone(),
            exp,
            roles: if principal.roles.is_empty() {
                None
            } else {
                Some(principal.roles.clone())
            },
            email: principal.email.clone(),
            name: principal.name.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to sign token")
    }

    fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        // The library accepts exp == now; the contract is strictly-after.
        if data.claims.exp <= Utc::now().timestamp() {
            anyhow::bail!("token expired");
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(SECRET, 3_600_000).unwrap()
    }

    fn principal() -> Principal {
        Principal {
            account_id: "acct-42".to_string(),
            email: Some("cook@example.com".to_string()),
            name: Some("Cook".to_string()),
            roles: vec!["USER".to_string(), "ADMIN".to_string()],
        }
    }

    #[test]
    fn short_secret_is_rejected() {
        assert!(TokenVerifier::new("too-short", 1000).is_err());
    }

    #[test]
    fn well_formed_token_validates() {
        let v = verifier();
        let token = v.issue(&principal()).unwrap();
        assert!(v.validate(&token));
    }

    #[test]
    fn tampered_token_fails_validation() {
        let v = verifier();
        let token = v.issue(&principal()).unwrap();

        // Corrupt the signature.
        let mut sig_flipped = token.clone();
        let last = sig_flipped.pop().unwrap();
        sig_flipped.push(if last == 'A' { 'B' } else { 'A' });
        assert!(!v.validate(&sig_flipped));

        // Corrupt the payload.
        let mid = token.len() / 2;
        let mut payload_flipped = String::with_capacity(token.len());
        for (i, c) in token.chars().enumerate() {
            if i == mid {
                payload_flipped.push(if c == 'a' { 'b' } else { 'a' });
            } else {
                payload_flipped.push(c);
            }
        }
        assert!(!v.validate(&payload_flipped));
    }

    #[test]
    fn expired_token_fails_validation() {
        let v = TokenVerifier::new(SECRET, 0).unwrap();
        let token = v.issue(&principal()).unwrap();
        assert!(!v.validate(&token));
    }

    #[test]
    fn wrong_secret_fails_validation() {
        let token = verifier().issue(&principal()).unwrap();
        let other = TokenVerifier::new("ffffffffffffffffffffffffffffffff", 3_600_000).unwrap();
        assert!(!other.validate(&token));
    }

    #[test]
    fn authenticate_maps_claims() {
        let v = verifier();
        let token = v.issue(&principal()).unwrap();
        let p = v.authenticate(&token).unwrap();
        assert_eq!(p.account_id, "acct-42");
        assert_eq!(p.email.as_deref(), Some("cook@example.com"));
        assert_eq!(p.roles, vec!["USER".to_string(), "ADMIN".to_string()]);
    }

    #[test]
    fn roles_default_to_empty() {
        let v = verifier();
        let token = v
            .issue(&Principal {
                account_id: "bare".to_string(),
                email: None,
                name: None,
                roles: Vec::new(),
            })
            .unwrap();
        let p = v.authenticate(&token).unwrap();
        assert!(p.roles.is_empty());
        assert!(p.email.is_none());
    }

    #[test]
    fn bearer_prefix_is_exact() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(Some("bearer abc")), None);
        assert_eq!(bearer_token(Some("Bearer")), None);
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn permit_table() {
        assert!(is_permitted("/api/auth/login"));
        assert!(is_permitted("/api/auth"));
        assert!(is_permitted("/api/health"));
        assert!(is_permitted("/actuator/prometheus"));
        assert!(is_permitted("/v3/api-docs"));
        assert!(is_permitted("/swagger-ui/index.html"));
        assert!(!is_permitted("/api/recipes/42"));
        assert!(!is_permitted("/api/account"));
        assert!(!is_permitted("/"));
    }
}
