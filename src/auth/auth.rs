use crate::auth::jwt::IdentityProvider;
use crate::model::leave_request::Actor;
use crate::model::role::Role;
use crate::utils::response::ApiResponse;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, dev::Payload, http::StatusCode, web::Data};
use derive_more::Display;
use futures::future::{Ready, ready};

/// Authenticated caller, resolved from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Display)]
pub enum AuthError {
    #[display(fmt = "Missing Authorization header")]
    MissingCredential,
    #[display(fmt = "Authorization header must start with Bearer")]
    MalformedHeader,
    #[display(fmt = "Invalid or expired token: {}", _0)]
    InvalidToken(String),
    #[display(fmt = "Only access tokens are accepted")]
    WrongTokenType,
    #[display(fmt = "Invalid role {}", _0)]
    UnknownRole(u8),
    #[display(fmt = "Identity provider is not configured")]
    ProviderMissing,
}

impl std::error::Error for AuthError {}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::ProviderMissing => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = match self {
            AuthError::ProviderMissing => "INTERNAL_ERROR",
            _ => "AUTHENTICATION_ERROR",
        };
        HttpResponse::build(self.status_code()).json(ApiResponse::failure(code, self.to_string()))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, AuthError> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or(AuthError::MissingCredential)?;

    let token = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MalformedHeader)?;

    let provider = req.app_data::<Data<dyn IdentityProvider>>().ok_or_else(|| {
        tracing::error!("Identity provider missing from app data");
        AuthError::ProviderMissing
    })?;

    provider.resolve_caller(token)
}

impl FromRequest for AuthUser {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            user_name: self.username.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::jwt::JwtIdentityProvider;
    use crate::auth::jwt::tests::{SECRET, access_token};
    use actix_web::test::TestRequest;
    use std::sync::Arc;

    pub fn named_caller(user_id: u64, username: &str, role: Role) -> AuthUser {
        AuthUser {
            user_id,
            username: username.to_string(),
            role,
        }
    }

    pub fn caller(user_id: u64, role: Role) -> AuthUser {
        named_caller(user_id, &format!("user{}", user_id), role)
    }

    pub fn provider() -> Data<dyn IdentityProvider> {
        Data::from(Arc::new(JwtIdentityProvider::new(SECRET)) as Arc<dyn IdentityProvider>)
    }

    #[actix_web::test]
    async fn bearer_header_is_resolved_through_the_provider() {
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", access_token(5, "kim", Role::Employee))))
            .app_data(provider())
            .to_http_request();

        let user = AuthUser::extract(&req).await.unwrap();
        assert_eq!(user.user_id, 5);
        assert!(!user.is_admin());
        assert_eq!(user.actor().user_name, "kim");
    }

    #[actix_web::test]
    async fn missing_or_malformed_header_is_unauthorized() {
        let req = TestRequest::default().app_data(provider()).to_http_request();
        let err = AuthUser::extract(&req).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredential));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic abc"))
            .app_data(provider())
            .to_http_request();
        let err = AuthUser::extract(&req).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader));
    }

    #[actix_web::test]
    async fn unauthenticated_body_uses_the_envelope() {
        let resp = AuthError::InvalidToken("expired".into()).error_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "AUTHENTICATION_ERROR");
    }
}
