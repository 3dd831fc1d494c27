use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{
    error::AppError,
    models::user::{Claims, Role, User},
    AppState,
};

/// Verified identity of the caller, carried through the request as a typed value.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.0.sub
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    pub fn is_admin(&self) -> bool {
        self.0.role == Role::Admin
    }

    /// Admin-or-self access to a record looked up by the handler.
    ///
    /// Admins see a missing record as 404. Everyone else gets 403 unless the
    /// record is their own, so they can't probe which npm values exist.
    pub fn authorize_owner(&self, target: Option<User>) -> Result<User, AppError> {
        match target {
            Some(user) if self.is_admin() || user.id == self.id() => Ok(user),
            None if self.is_admin() => Err(AppError::NotFound("User Not Found")),
            _ => Err(AppError::Forbidden("Access Denied, Admin or Owner Only")),
        }
    }
}

/// Reuses the identity placed by [`authenticate`] if present, otherwise
/// reads and verifies the bearer token itself.
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized)?;

        let app_state = AppState::from_ref(state);
        let claims = app_state.tokens.verify(bearer.token())?;
        Ok(AuthUser(claims))
    }
}

/// Authentication gate: 401 without a bearer token, 403 when the token
/// does not verify. On success the caller's [`AuthUser`] rides along in
/// the request extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    let user = AuthUser::from_request_parts(&mut parts, &state).await?;

    let mut req = Request::from_parts(parts, body);
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Role gate. Must be layered inside [`authenticate`].
pub async fn require_role(
    State(required): State<Role>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or(AppError::Unauthorized)?;

    if user.role() != required {
        tracing::warn!(user_id = user.id(), role = %user.role(), required = %required, "role gate denied");
        return Err(AppError::Forbidden("Access Denied, Admin Only"));
    }

    Ok(next.run(req).await)
}
