use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Role;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// The authenticated caller. The role comes from the token and is not
/// looked up again for the rest of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Signs an HS256 token for `user_id` and returns it with its expiry.
pub fn generate_jwt(
    user_id: &str,
    role: Role,
    secret: &str,
    ttl_minutes: i64,
) -> Result<(String, DateTime<Utc>), AppError> {
    let expiry = Utc::now() + TimeDelta::minutes(ttl_minutes);
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiry.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Config(format!("token encoding failed: {}", e)))?;

    Ok((token, expiry))
}

pub fn decode_jwt(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| AppError::Unauthorized)?;

    Ok(AuthUser {
        id: data.claims.sub,
        role: data.claims.role,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized)?;

        decode_jwt(bearer.token(), &state.config.jwt_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_round_trip_keeps_role() {
        let (token, expiry) = generate_jwt("user-1", Role::DeptHead, "secret", 5).unwrap();
        assert!(expiry > Utc::now());

        let user = decode_jwt(&token, "secret").unwrap();
        assert_eq!(user.id, "user-1");
        assert_eq!(user.role, Role::DeptHead);
    }

    #[test]
    fn test_jwt_rejects_wrong_secret_and_expired() {
        let (token, _) = generate_jwt("user-1", Role::Student, "secret", 5).unwrap();
        assert!(matches!(decode_jwt(&token, "other"), Err(AppError::Unauthorized)));

        let (expired, _) = generate_jwt("user-1", Role::Student, "secret", -10).unwrap();
        assert!(matches!(decode_jwt(&expired, "secret"), Err(AppError::Unauthorized)));
    }
}
