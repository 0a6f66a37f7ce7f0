use actix_session::Session;
use actix_web::{web, HttpResponse};
use tracing::info;
use uuid::Uuid;

use super::session::{current_user, require_admin};
use super::AppState;
use crate::error::{Error, Result};
use crate::relay::{provision_user, remove_user, EmailRequest, ProvisionRequest};

pub async fn send_email(
    state: web::Data<AppState>,
    session: Session,
    req: web::Json<EmailRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&session, &state).await?;
    let email = req.into_inner();
    email.validate()?;
    state.mailer.send(&email).await?;
    info!(user = %user.id, to = %email.to, "email sent");
    Ok(HttpResponse::Ok().json(serde_json::json!({"success": true})))
}

pub async fn create_user(
    state: web::Data<AppState>,
    session: Session,
    req: web::Json<ProvisionRequest>,
) -> Result<HttpResponse> {
    let admin = require_admin(&session, &state).await?;
    let user = provision_user(state.auth.as_ref(), state.store.as_ref(), req.into_inner()).await?;
    info!(admin = %admin.id, user = %user.id, "staff account created");
    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "user": user,
    })))
}

pub async fn delete_user(state: web::Data<AppState>, session: Session, path: web::Path<Uuid>) -> Result<HttpResponse> {
    let admin = require_admin(&session, &state).await?;
    let id = path.into_inner();
    if id == admin.id {
        return Err(Error::validation("An admin cannot delete their own account"));
    }
    remove_user(state.auth.as_ref(), state.store.as_ref(), id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"success": true})))
}

#[cfg(test)]
mod tests {
    use crate::platform::Store;
    use crate::web::test_support::{harness, init_app, sign_in, ADMIN_EMAIL, ADMIN_PASSWORD};
    use actix_web::{http::StatusCode, test};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn send_email_validates_and_forwards() {
        let h = harness().await;
        let app = init_app!(h.state.clone());
        let cookie = sign_in!(app, ADMIN_EMAIL, ADMIN_PASSWORD);

        let req = test::TestRequest::post()
            .uri("/api/send-email")
            .cookie(cookie.clone())
            .set_json(json!({"to": "pas-une-adresse", "subject": "Planning", "html": "<p>x</p>"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/send-email")
            .cookie(cookie)
            .set_json(json!({"to": "lina@exemple.fr", "subject": "Planning", "html": "<p>Demain 7h</p>"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let sent = h.mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "lina@exemple.fr");
    }

    #[actix_web::test]
    async fn only_admins_manage_users() {
        let h = harness().await;
        let app = init_app!(h.state.clone());
        let admin = sign_in!(app, ADMIN_EMAIL, ADMIN_PASSWORD);

        let req = test::TestRequest::post()
            .uri("/api/users")
            .cookie(admin.clone())
            .set_json(json!({
                "email": "claire@agence.fr",
                "password": "recrute2024",
                "nom": "Morel",
                "prenom": "Claire",
                "role": "recruteur",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        let claire_id = body["user"]["id"].as_str().unwrap().to_string();
        assert!(h.auth.contains("claire@agence.fr").await);

        let recruteur = sign_in!(app, "claire@agence.fr", "recrute2024");
        let req = test::TestRequest::delete()
            .uri(&format!("/api/users/{}", claire_id))
            .cookie(recruteur)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/users/{}", claire_id))
            .cookie(admin)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(!h.auth.contains("claire@agence.fr").await);
        assert!(h.store.find_utilisateur_by_email("claire@agence.fr").await.unwrap().is_none());
    }
}
