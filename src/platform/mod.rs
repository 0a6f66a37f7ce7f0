//! Access to the hosted data platform.
//!
//! The platform owns storage, row filtering, the change feed and
//! authentication. `Store` and `AuthAdmin` are the only seams the rest of
//! the crate talks through; `memory` backs development and tests, `rest`
//! speaks to the hosted service.

pub mod auth;
pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::schedule::types::{
    Candidat, Client, Commande, CommandePatch, Disponibilite, Historique, InterdictionPriorite,
    Planification, Secteur, StatutCommande, Utilisateur,
};

pub use auth::{AuthAdmin, AuthError, AuthUser, MemoryAuth, RestAuth};
pub use memory::MemoryStore;
pub use rest::{PlatformClient, RestStore};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{table} row {id} not found")]
    NotFound { table: &'static str, id: String },

    /// The row changed under us (status guard failed, unique key taken)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Platform request failed: {0}")]
    Backend(String),

    #[error("Unexpected platform payload: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn not_found(table: &'static str, id: impl ToString) -> Self {
        Self::NotFound { table, id: id.to_string() }
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// Platform tables touched by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Candidats,
    Clients,
    Commandes,
    Disponibilites,
    Planification,
    InterdictionsPriorites,
    Historique,
    Utilisateurs,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Candidats => "candidats",
            Table::Clients => "clients",
            Table::Commandes => "commandes",
            Table::Disponibilites => "disponibilites",
            Table::Planification => "planification",
            Table::InterdictionsPriorites => "interdictions_priorites",
            Table::Historique => "historique",
            Table::Utilisateurs => "utilisateurs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Notification that a row changed; listeners re-fetch what they display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub id: Uuid,
}

/// Capacity of the change feed before slow listeners start lagging
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// Sends `event`; having no listener is not an error
pub(crate) fn notify(feed: &broadcast::Sender<ChangeEvent>, table: Table, kind: ChangeKind, id: Uuid) {
    let _ = feed.send(ChangeEvent { table, kind, id });
}

/// Table queries the application issues against the platform
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_candidats(&self, secteur: Option<Secteur>) -> StoreResult<Vec<Candidat>>;
    async fn get_candidat(&self, id: Uuid) -> StoreResult<Option<Candidat>>;
    async fn upsert_candidat(&self, candidat: Candidat) -> StoreResult<Candidat>;

    async fn get_client(&self, id: Uuid) -> StoreResult<Option<Client>>;
    async fn insert_client(&self, client: Client) -> StoreResult<Client>;

    async fn insert_commande(&self, commande: Commande) -> StoreResult<Commande>;
    async fn get_commande(&self, id: Uuid) -> StoreResult<Option<Commande>>;
    async fn list_commandes(&self, date: NaiveDate) -> StoreResult<Vec<Commande>>;
    /// Applies `patch` only while the order still has status `expected`
    async fn update_commande(
        &self,
        id: Uuid,
        expected: StatutCommande,
        patch: CommandePatch,
    ) -> StoreResult<Commande>;

    async fn list_disponibilites(&self, date: NaiveDate, secteur: Secteur) -> StoreResult<Vec<Disponibilite>>;
    /// Keyed on (candidat, date, secteur)
    async fn upsert_disponibilite(&self, dispo: Disponibilite) -> StoreResult<Disponibilite>;

    async fn list_planifications(&self, date: NaiveDate) -> StoreResult<Vec<Planification>>;
    async fn list_planifications_for_client(&self, client_id: Uuid) -> StoreResult<Vec<Planification>>;
    async fn planification_for_commande(&self, commande_id: Uuid) -> StoreResult<Option<Planification>>;
    /// Fails with `Conflict` when the order already has an assignment row
    async fn insert_planification(&self, planification: Planification) -> StoreResult<Planification>;
    async fn delete_planification(&self, id: Uuid) -> StoreResult<()>;

    async fn list_interdictions(&self, client_id: Uuid) -> StoreResult<Vec<InterdictionPriorite>>;
    async fn insert_interdiction(&self, flag: InterdictionPriorite) -> StoreResult<InterdictionPriorite>;

    async fn insert_historique(&self, entry: Historique) -> StoreResult<()>;
    async fn list_historique(&self, ligne_id: Uuid) -> StoreResult<Vec<Historique>>;

    async fn find_utilisateur_by_email(&self, email: &str) -> StoreResult<Option<Utilisateur>>;
    async fn get_utilisateur(&self, id: Uuid) -> StoreResult<Option<Utilisateur>>;
    async fn insert_utilisateur(&self, user: Utilisateur) -> StoreResult<Utilisateur>;
    async fn delete_utilisateur(&self, id: Uuid) -> StoreResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}
