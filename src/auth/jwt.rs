use jsonwebtoken::{DecodingKey, Validation, decode, errors::Error};

use crate::auth::auth::{AuthError, AuthUser};
use crate::model::role::Role;
use crate::models::{Claims, TokenType};

/// Turns an opaque bearer credential into a caller identity.
pub trait IdentityProvider: Send + Sync {
    fn resolve_caller(&self, credential: &str) -> Result<AuthUser, AuthError>;
}

/// Verifies HS256 access tokens signed with a shared secret.
pub struct JwtIdentityProvider {
    secret: String,
}

impl JwtIdentityProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn resolve_caller(&self, credential: &str) -> Result<AuthUser, AuthError> {
        let claims = verify_token(credential, &self.secret).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AuthError::InvalidToken(e.to_string())
        })?;

        if claims.token_type != TokenType::Access {
            return Err(AuthError::WrongTokenType);
        }

        let role = Role::from_id(claims.role).ok_or(AuthError::UnknownRole(claims.role))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
        })
    }
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}
