use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::UserId;

/// One week, matching the lifetime of the browser session cookie.
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60 * 24 * 7;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub fn mint_session_token(
    cfg: &SessionConfig,
    user_id: &UserId,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )
}

/// The user a token was issued to, or `None` for invalid or expired tokens.
pub fn verify_session_token(cfg: &SessionConfig, token: &str) -> Option<UserId> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| UserId(data.claims.sub))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(secret: &str, ttl_seconds: i64) -> SessionConfig {
        SessionConfig {
            secret: secret.to_string(),
            ttl_seconds,
        }
    }

    #[test]
    fn minted_token_verifies_to_same_user() {
        let cfg = cfg("secret", 60);
        let token = mint_session_token(&cfg, &UserId::new("u1")).expect("token");
        assert_eq!(verify_session_token(&cfg, &token), Some(UserId::new("u1")));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = mint_session_token(&cfg("a", 60), &UserId::new("u1")).expect("token");
        assert_eq!(verify_session_token(&cfg("b", 60), &token), None);
    }

    #[test]
    fn expired_token_is_rejected() {
        let cfg = cfg("secret", -3600);
        let token = mint_session_token(&cfg, &UserId::new("u1")).expect("token");
        assert_eq!(verify_session_token(&cfg, &token), None);
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert_eq!(verify_session_token(&cfg("secret", 60), "not-a-jwt"), None);
    }
}
