use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::platform::{AuthAdmin, Store};
use crate::schedule::types::{Role, Utilisateur};

const GENERATED_PASSWORD_LEN: usize = 16;

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionRequest {
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    pub nom: String,
    pub prenom: String,
    pub role: Role,
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Creates the auth user, then its profile row.
///
/// When the profile insert fails the auth user is deleted again; if that
/// cleanup also fails the orphan is logged and the profile error returned.
pub async fn provision_user(auth: &dyn AuthAdmin, store: &dyn Store, req: ProvisionRequest) -> Result<Utilisateur> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::validation(format!("Invalid email: {}", req.email)));
    }
    if req.nom.trim().is_empty() || req.prenom.trim().is_empty() {
        return Err(Error::validation("Last name and first name are required"));
    }
    let password = match req.password.filter(|p| !p.is_empty()) {
        Some(p) if p.len() < 8 => return Err(Error::validation("Password must be at least 8 characters")),
        Some(p) => p,
        None => generate_password(),
    };

    let auth_user = auth.create_user(&email, &password).await?;
    let profile = Utilisateur {
        id: auth_user.id,
        email: email.clone(),
        last_name: req.nom.trim().to_string(),
        first_name: req.prenom.trim().to_string(),
        role: req.role,
        actif: true,
    };

    match store.insert_utilisateur(profile).await {
        Ok(profile) => {
            info!(user = %profile.id, email = %profile.email, "user provisioned");
            Ok(profile)
        }
        Err(e) => {
            warn!(email = %email, "profile insert failed, rolling back auth user: {}", e);
            if let Err(rollback) = auth.delete_user(auth_user.id).await {
                error!(user = %auth_user.id, "auth user left without profile: {}", rollback);
            }
            Err(e.into())
        }
    }
}

/// Deletes the auth user, then its profile row
pub async fn remove_user(auth: &dyn AuthAdmin, store: &dyn Store, id: Uuid) -> Result<()> {
    let profile = store
        .get_utilisateur(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("utilisateur {}", id)))?;
    auth.delete_user(id).await?;
    if let Err(e) = store.delete_utilisateur(id).await {
        error!(user = %id, "auth user deleted but profile row remains: {}", e);
        return Err(e.into());
    }
    info!(user = %id, email = %profile.email, "user removed");
    Ok(())
}
