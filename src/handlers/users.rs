use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use validator::Validate;

use crate::{
    auth::AuthUser,
    credentials::hash_password,
    error::{AppError, UniqueField},
    models::user::{UpdateForm, User},
    response::ApiResponse,
    uploads::{DocumentRefs, Submission, UploadedFiles},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
}

/// GET /api/users?search=
///
/// Document references are expanded to absolute URLs.
pub async fn list_users(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<ListQuery>, AppError>,
) -> Result<Json<Vec<User>>, AppError> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let users = state
        .store
        .list(search)
        .await?
        .into_iter()
        .map(|mut user| {
            user.documents = user.documents.to_urls(&state.public_base_url);
            user
        })
        .collect();

    Ok(Json(users))
}

/// GET /api/users/:npm (admin only)
pub async fn get_user(
    State(state): State<AppState>,
    WithRejection(Path(npm), _): WithRejection<Path<String>, AppError>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let user = state
        .store
        .find_by_npm(&npm)
        .await?
        .ok_or(AppError::NotFound("User Not Found"))?;

    Ok(Json(ApiResponse::new("User Detail", user)))
}

/// PUT /api/users/update/:npm
///
/// Multipart, every field optional. Document fields left out keep their
/// current file.
pub async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    WithRejection(Path(npm), _): WithRejection<Path<String>, AppError>,
    WithRejection(multipart, _): WithRejection<Multipart, AppError>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let Submission { mut fields, files } = state.uploads.receive(multipart).await?;
    let form = UpdateForm::from_fields(&mut fields);

    match apply_update(&state, &caller, &npm, form, &files).await {
        Ok(user) => {
            tracing::info!(user_id = user.id, by = caller.id(), "updated user");
            Ok(Json(ApiResponse::new("User updated successfully", user)))
        }
        Err(err) => {
            files.discard().await;
            Err(err)
        }
    }
}

async fn apply_update(
    state: &AppState,
    caller: &AuthUser,
    npm: &str,
    form: UpdateForm,
    files: &UploadedFiles,
) -> Result<User, AppError> {
    form.validate()?;

    let existing = caller.authorize_owner(state.store.find_by_npm(npm).await?)?;

    if let Some(role) = form.requested_role()? {
        if role != existing.role && !caller.is_admin() {
            return Err(AppError::Forbidden("Only admin can change role"));
        }
    }

    let new_npm = form.npm.as_deref().filter(|n| *n != existing.npm);
    let new_email = form.email.as_deref().filter(|e| *e != existing.email);
    if new_npm.is_some() || new_email.is_some() {
        if let Some(conflict) = state
            .store
            .find_conflict(new_npm, new_email, Some(existing.id))
            .await?
        {
            let field = if Some(conflict.npm.as_str()) == new_npm {
                UniqueField::Npm
            } else {
                UniqueField::Email
            };
            return Err(AppError::Conflict(field));
        }
    }

    let password_hash = form.password.as_deref().map(hash_password).transpose()?;
    let documents = DocumentRefs::resolve(files, Some(&existing.documents));
    let changes = form.into_changes(password_hash, documents)?;

    state
        .store
        .update(existing.id, changes)
        .await?
        .ok_or(AppError::NotFound("User Not Found"))
}

/// DELETE /api/users/delete/:npm
pub async fn delete_user(
    State(state): State<AppState>,
    caller: AuthUser,
    WithRejection(Path(npm), _): WithRejection<Path<String>, AppError>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let user = caller.authorize_owner(state.store.find_by_npm(&npm).await?)?;

    if !state.store.delete(user.id).await? {
        return Err(AppError::NotFound("User Not Found"));
    }

    tracing::info!(user_id = user.id, by = caller.id(), "deleted user");
    Ok(Json(ApiResponse::new("User deleted successfully", user)))
}
