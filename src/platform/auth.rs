use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::PlatformClient;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("A user with email {0} already exists")]
    AlreadyExists(String),

    #[error("Auth user {0} not found")]
    NotFound(Uuid),

    #[error("Auth provider request failed: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Backend(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// The auth provider's admin user API plus password sign-in
#[async_trait]
pub trait AuthAdmin: Send + Sync {
    async fn create_user(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn delete_user(&self, id: Uuid) -> Result<(), AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
}

/// In-process auth double; passwords are kept as given
#[derive(Default)]
pub struct MemoryAuth {
    users: RwLock<HashMap<String, (AuthUser, String)>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, email: &str) -> bool {
        self.users.read().await.contains_key(&email.trim().to_lowercase())
    }
}

#[async_trait]
impl AuthAdmin for MemoryAuth {
    async fn create_user(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let key = email.trim().to_lowercase();
        let mut users = self.users.write().await;
        if users.contains_key(&key) {
            return Err(AuthError::AlreadyExists(key));
        }
        let user = AuthUser { id: Uuid::new_v4(), email: key.clone() };
        users.insert(key, (user.clone(), password.to_string()));
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let key = users
            .iter()
            .find(|(_, (user, _))| user.id == id)
            .map(|(key, _)| key.clone())
            .ok_or(AuthError::NotFound(id))?;
        users.remove(&key);
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let users = self.users.read().await;
        match users.get(&email.trim().to_lowercase()) {
            Some((user, stored)) if stored == password => Ok(user.clone()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

/// Adapter for the hosted auth endpoints
pub struct RestAuth {
    client: PlatformClient,
}

impl RestAuth {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct CreateUserBody<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    user: AuthUser,
}

#[async_trait]
impl AuthAdmin for RestAuth {
    async fn create_user(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .request(Method::POST, "auth/v1/admin/users")
            .json(&CreateUserBody { email, password, email_confirm: true })
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(response.json().await?),
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => Err(AuthError::AlreadyExists(email.to_string())),
            s => Err(AuthError::Backend(format!("{} {}", s, response.text().await.unwrap_or_default()))),
        }
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), AuthError> {
        let response = self
            .client
            .request(Method::DELETE, &format!("auth/v1/admin/users/{}", id))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(AuthError::NotFound(id)),
            s => Err(AuthError::Backend(format!("{} {}", s, response.text().await.unwrap_or_default()))),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .request(Method::POST, "auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant { email, password })
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(response.json::<TokenResponse>().await?.user),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(AuthError::InvalidCredentials),
            s => Err(AuthError::Backend(format!("{} {}", s, response.text().await.unwrap_or_default()))),
        }
    }
}
