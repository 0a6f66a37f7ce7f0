pub mod api;
pub mod relay;
pub mod session;

use std::sync::Arc;

use actix_files::Files;
use actix_session::storage::CookieSessionStore;
use actix_session::SessionMiddleware;
use actix_web::cookie::Key;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use tracing::{info, warn};

use crate::config::{Backend, Config};
use crate::error::{Error, Result};
use crate::platform::{AuthAdmin, MemoryAuth, MemoryStore, PlatformClient, RestAuth, RestStore, Store};
use crate::relay::{provision_user, HttpMailer, Mailer, ProvisionRequest, RecordingMailer};
use crate::schedule::assign::AssignmentService;
use crate::schedule::types::Role;

/// Shared handles to the platform seams
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth: Arc<dyn AuthAdmin>,
    pub mailer: Arc<dyn Mailer>,
    pub assignments: AssignmentService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, auth: Arc<dyn AuthAdmin>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            assignments: AssignmentService::new(store.clone()),
            store,
            auth,
            mailer,
        }
    }

    /// Wires the adapters named by the configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (store, auth): (Arc<dyn Store>, Arc<dyn AuthAdmin>) = match &config.backend {
            Backend::Memory => {
                warn!("Using the in-memory platform; data is lost on restart");
                (Arc::new(MemoryStore::new()), Arc::new(MemoryAuth::new()))
            }
            Backend::Rest { url, service_key } => {
                info!("Using hosted platform at {}", url);
                let client = PlatformClient::new(url, service_key)?;
                (Arc::new(RestStore::new(client.clone())), Arc::new(RestAuth::new(client)))
            }
        };

        let mailer: Arc<dyn Mailer> = if config.mail.is_configured() {
            Arc::new(HttpMailer::new(config.mail.clone())?)
        } else {
            warn!("MAIL_RELAY_URL / MAIL_RELAY_API_KEY not set; emails are only recorded");
            Arc::new(RecordingMailer::new())
        };

        let state = Self::new(store, auth, mailer);
        if let (Backend::Memory, Some((email, password))) = (&config.backend, &config.seed_admin) {
            let admin = provision_user(
                state.auth.as_ref(),
                state.store.as_ref(),
                ProvisionRequest {
                    email: email.clone(),
                    password: Some(password.clone()),
                    nom: "Admin".to_string(),
                    prenom: "Planning".to_string(),
                    role: Role::Admin,
                },
            )
            .await?;
            info!("Seeded admin account {}", admin.email);
        }
        Ok(state)
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Registers every route; shared by the server and the handler tests
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/api/login", web::post().to(session::login))
        .route("/api/logout", web::post().to(session::logout))
        .route("/api/session", web::get().to(session::current_session))
        .route("/api/candidats", web::get().to(api::list_candidats))
        .route("/api/import/candidats", web::post().to(api::import_candidats))
        .route("/api/import/disponibilites", web::post().to(api::import_disponibilites))
        .route("/api/disponibilites", web::post().to(api::upsert_disponibilite))
        .route("/api/clients", web::post().to(api::create_client))
        .route("/api/interdictions", web::post().to(api::create_interdiction))
        .route("/api/commandes", web::post().to(api::create_commande))
        .route("/api/commandes", web::get().to(api::list_commandes))
        .route("/api/commandes/{id}/candidats", web::get().to(api::quick_candidates))
        .route("/api/commandes/{id}/assign", web::post().to(api::assign))
        .route("/api/commandes/{id}/unassign", web::post().to(api::unassign))
        .route("/api/commandes/{id}/statut", web::post().to(api::change_status))
        .route("/api/commandes/{id}/historique", web::get().to(api::history))
        .route("/api/planning", web::get().to(api::planning))
        .route("/api/planning/export", web::get().to(api::planning_export))
        .route("/api/stats", web::get().to(api::stats))
        .route("/api/changes", web::get().to(api::changes))
        .route("/api/send-email", web::post().to(relay::send_email))
        .route("/api/users", web::post().to(relay::create_user))
        .service(web::resource("/api/users/{id}").route(web::delete().to(relay::delete_user)));
}

pub async fn start_server(config: Config) -> Result<()> {
    let state = web::Data::new(AppState::from_config(&config).await?);

    let key = match &config.session_key {
        Some(bytes) => Key::from(bytes.as_slice()),
        None => {
            warn!("PLANNER_SESSION_KEY not set; sessions will not survive a restart");
            Key::generate()
        }
    };
    let cookie_secure = config.cookie_secure;
    let static_dir = config.static_dir.clone();

    info!("Starting web server on {}:{}", config.bind, config.port);
    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(8 * 1024 * 1024))
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
                    .cookie_secure(cookie_secure)
                    .build(),
            )
            .wrap(middleware::Logger::default())
            .configure(routes);
        if static_dir.is_dir() {
            app = app.service(Files::new("/static", &static_dir));
        }
        app
    })
    .bind((config.bind.as_str(), config.port))
    .map_err(Error::Io)?
    .run()
    .await
    .map_err(Error::Io)
}
