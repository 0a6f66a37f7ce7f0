use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::error::{Error, Result};
use crate::schedule::types::{Role, Utilisateur};

const USER_KEY: &str = "user_id";

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// Resolves the signed-in staff profile, dropping stale sessions
pub async fn current_user(session: &Session, state: &AppState) -> Result<Utilisateur> {
    let user_id = session
        .get::<Uuid>(USER_KEY)
        .map_err(|e| Error::Session(e.to_string()))?
        .ok_or(Error::Unauthorized)?;

    match state.store.get_utilisateur(user_id).await? {
        Some(user) if user.actif => Ok(user),
        _ => {
            session.purge();
            Err(Error::Unauthorized)
        }
    }
}

pub async fn require_admin(session: &Session, state: &AppState) -> Result<Utilisateur> {
    let user = current_user(session, state).await?;
    if user.role != Role::Admin {
        return Err(Error::Forbidden);
    }
    Ok(user)
}

pub async fn login(
    state: web::Data<AppState>,
    session: Session,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let auth_user = match state.auth.sign_in(&req.email, &req.password).await {
        Ok(user) => user,
        Err(e) => {
            warn!(email = %req.email, "sign-in refused: {}", e);
            return Err(e.into());
        }
    };

    let profile = state
        .store
        .find_utilisateur_by_email(&auth_user.email)
        .await?
        .filter(|u| u.actif)
        .ok_or(Error::Forbidden)?;

    session.renew();
    session
        .insert(USER_KEY, profile.id)
        .map_err(|e| Error::Session(e.to_string()))?;
    info!(user = %profile.id, "staff signed in");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "user": profile,
    })))
}

pub async fn logout(session: Session) -> HttpResponse {
    session.purge();
    HttpResponse::Ok().json(serde_json::json!({"success": true}))
}

pub async fn current_session(state: web::Data<AppState>, session: Session) -> Result<HttpResponse> {
    let user = current_user(&session, &state).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "authenticated": true,
        "user": user,
    })))
}
