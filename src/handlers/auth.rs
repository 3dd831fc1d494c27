use axum::{
    extract::{Multipart, State},
    Json,
};
use axum_extra::extract::WithRejection;

use crate::{
    auth::AuthUser,
    credentials::{hash_password, verify_password},
    error::{AppError, UniqueField},
    models::user::{AuthResponse, LoginData, LoginPayload, RegisterForm, User, UserProfile},
    response::ApiResponse,
    uploads::{DocumentRefs, Submission, UploadedFiles},
    AppState,
};

/// POST /api/auth/register
///
/// Multipart body: the profile text fields plus up to one file per
/// document field. Responds with the created record (no password).
pub async fn register(
    State(state): State<AppState>,
    WithRejection(multipart, _): WithRejection<Multipart, AppError>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let Submission { mut fields, files } = state.uploads.receive(multipart).await?;
    let form = RegisterForm::from_fields(&mut fields);

    match create_user(&state, form, &files).await {
        Ok(user) => {
            tracing::info!(user_id = user.id, npm = %user.npm, "registered user");
            Ok(Json(ApiResponse::new("Success Registration", user)))
        }
        Err(err) => {
            files.discard().await;
            Err(err)
        }
    }
}

async fn create_user(
    state: &AppState,
    form: RegisterForm,
    files: &UploadedFiles,
) -> Result<User, AppError> {
    if let Err(errors) = form.check() {
        let echo = serde_json::to_value(&form).ok();
        return Err(AppError::from(errors).with_payload(echo));
    }

    let npm = form.npm.as_deref().unwrap_or_default();
    let email = form.email.as_deref().unwrap_or_default();
    if let Some(existing) = state
        .store
        .find_conflict(Some(npm), Some(email), None)
        .await?
    {
        let field = if existing.npm == npm {
            UniqueField::Npm
        } else {
            UniqueField::Email
        };
        return Err(AppError::Conflict(field));
    }

    let password_hash = hash_password(form.password.as_deref().unwrap_or_default())?;
    let documents = DocumentRefs::resolve(files, None);
    let new_user = form.into_new_user(password_hash, documents)?;

    state.store.create(new_user).await
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginPayload>, AppError>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state
        .store
        .find_by_email(&payload.email)
        .await?
        .ok_or(AppError::NotFound("User Not Found"))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        tracing::debug!(user_id = user.id, "password mismatch");
        return Err(AppError::LoginFail);
    }

    let token = state.tokens.issue(user.id, &user.email, user.role)?;

    Ok(Json(AuthResponse {
        message: "Success Login".to_string(),
        data: LoginData {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            role: user.role,
        },
        token,
    }))
}

/// GET /api/auth/profile
pub async fn profile(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    let user = state
        .store
        .find_by_id(caller.id())
        .await?
        .ok_or(AppError::NotFound("User Not Found"))?;

    Ok(Json(ApiResponse::new("User Profile", UserProfile::from(user))))
}
