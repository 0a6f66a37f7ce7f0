use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{notify, ChangeEvent, ChangeKind, Store, StoreError, StoreResult, Table, CHANGE_FEED_CAPACITY};
use crate::schedule::types::{
    Candidat, Client, Commande, CommandePatch, Disponibilite, Historique, InterdictionPriorite,
    Planification, Secteur, StatutCommande, Utilisateur,
};

/// HTTP client for the hosted platform, shared by the table and auth adapters
#[derive(Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl PlatformClient {
    pub fn new(base_url: &str, service_key: &str) -> StoreResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("staffing-planner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request carrying the service credentials
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn table(&self, method: Method, table: Table) -> RequestBuilder {
        self.request(method, &format!("rest/v1/{}", table.name()))
    }
}

/// `eq.` filter value for a query-string predicate
pub fn eq(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

/// `cs.` (array contains) filter value
pub fn contains(value: &str) -> String {
    format!("cs.{{\"{}\"}}", value.replace('"', "\\\""))
}

async fn check(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::CONFLICT => StoreError::Conflict(body),
        StatusCode::NOT_FOUND => StoreError::Backend(format!("404 {}", body)),
        _ => StoreError::Backend(format!("{} {}", status, body)),
    })
}

/// Table adapter speaking the platform's REST dialect.
///
/// The change feed only carries writes issued through this process.
pub struct RestStore {
    client: PlatformClient,
    feed: broadcast::Sender<ChangeEvent>,
}

impl RestStore {
    pub fn new(client: PlatformClient) -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { client, feed }
    }

    async fn select<T: DeserializeOwned>(&self, table: Table, filters: &[(&str, String)]) -> StoreResult<Vec<T>> {
        debug!(table = table.name(), ?filters, "select");
        let response = self
            .client
            .table(Method::GET, table)
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn select_one<T: DeserializeOwned>(&self, table: Table, filters: &[(&str, String)]) -> StoreResult<Option<T>> {
        let mut rows: Vec<T> = self.select(table, filters).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn insert<T: Serialize + DeserializeOwned>(
        &self,
        table: Table,
        row: &T,
        upsert_on: Option<&str>,
    ) -> StoreResult<T> {
        let mut request = self.client.table(Method::POST, table).json(row);
        request = match upsert_on {
            Some(columns) => request
                .query(&[("on_conflict", columns)])
                .header("Prefer", "resolution=merge-duplicates,return=representation"),
            None => request.header("Prefer", "return=representation"),
        };
        let mut rows: Vec<T> = check(request.send().await?).await?.json().await?;
        if rows.is_empty() {
            return Err(StoreError::Decode(format!("{} insert returned no row", table.name())));
        }
        Ok(rows.swap_remove(0))
    }

    async fn delete(&self, table: Table, id: Uuid) -> StoreResult<()> {
        let response = self
            .client
            .table(Method::DELETE, table)
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = check(response).await?.json().await?;
        if rows.is_empty() {
            return Err(StoreError::not_found(table.name(), id));
        }
        notify(&self.feed, table, ChangeKind::Delete, id);
        Ok(())
    }
}

#[async_trait]
impl Store for RestStore {
    async fn list_candidats(&self, secteur: Option<Secteur>) -> StoreResult<Vec<Candidat>> {
        let mut filters = vec![("order", "nom.asc,prenom.asc".to_string())];
        if let Some(secteur) = secteur {
            filters.push(("secteurs", contains(secteur.label())));
        }
        self.select(Table::Candidats, &filters).await
    }

    async fn get_candidat(&self, id: Uuid) -> StoreResult<Option<Candidat>> {
        self.select_one(Table::Candidats, &[("id", eq(id))]).await
    }

    async fn upsert_candidat(&self, candidat: Candidat) -> StoreResult<Candidat> {
        let row = self.insert(Table::Candidats, &candidat, Some("id")).await?;
        notify(&self.feed, Table::Candidats, ChangeKind::Update, row.id);
        Ok(row)
    }

    async fn get_client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        self.select_one(Table::Clients, &[("id", eq(id))]).await
    }

    async fn insert_client(&self, client: Client) -> StoreResult<Client> {
        let row = self.insert(Table::Clients, &client, None).await?;
        notify(&self.feed, Table::Clients, ChangeKind::Insert, row.id);
        Ok(row)
    }

    async fn insert_commande(&self, commande: Commande) -> StoreResult<Commande> {
        let row = self.insert(Table::Commandes, &commande, None).await?;
        notify(&self.feed, Table::Commandes, ChangeKind::Insert, row.id);
        Ok(row)
    }

    async fn get_commande(&self, id: Uuid) -> StoreResult<Option<Commande>> {
        self.select_one(Table::Commandes, &[("id", eq(id))]).await
    }

    async fn list_commandes(&self, date: NaiveDate) -> StoreResult<Vec<Commande>> {
        self.select(
            Table::Commandes,
            &[("date", eq(date)), ("order", "secteur.asc,created_at.asc".to_string())],
        )
        .await
    }

    async fn update_commande(
        &self,
        id: Uuid,
        expected: StatutCommande,
        patch: CommandePatch,
    ) -> StoreResult<Commande> {
        let response = self
            .client
            .table(Method::PATCH, Table::Commandes)
            .query(&[("id", eq(id)), ("statut", eq(expected.label()))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let mut rows: Vec<Commande> = check(response).await?.json().await?;
        if let Some(row) = rows.pop() {
            notify(&self.feed, Table::Commandes, ChangeKind::Update, id);
            return Ok(row);
        }
        // Nothing matched: either the row is gone or its status moved on
        match self.get_commande(id).await? {
            Some(current) => {
                warn!(%id, current = %current.statut, %expected, "status guard rejected update");
                Err(StoreError::conflict(format!(
                    "commande {} is {} (expected {})",
                    id, current.statut, expected
                )))
            }
            None => Err(StoreError::not_found("commandes", id)),
        }
    }

    async fn list_disponibilites(&self, date: NaiveDate, secteur: Secteur) -> StoreResult<Vec<Disponibilite>> {
        self.select(Table::Disponibilites, &[("date", eq(date)), ("secteur", eq(secteur.label()))])
            .await
    }

    async fn upsert_disponibilite(&self, dispo: Disponibilite) -> StoreResult<Disponibilite> {
        let row = self
            .insert(Table::Disponibilites, &dispo, Some("candidat_id,date,secteur"))
            .await?;
        notify(&self.feed, Table::Disponibilites, ChangeKind::Update, row.id);
        Ok(row)
    }

    async fn list_planifications(&self, date: NaiveDate) -> StoreResult<Vec<Planification>> {
        self.select(Table::Planification, &[("date", eq(date))]).await
    }

    async fn list_planifications_for_client(&self, client_id: Uuid) -> StoreResult<Vec<Planification>> {
        self.select(Table::Planification, &[("client_id", eq(client_id))]).await
    }

    async fn planification_for_commande(&self, commande_id: Uuid) -> StoreResult<Option<Planification>> {
        self.select_one(Table::Planification, &[("commande_id", eq(commande_id))]).await
    }

    async fn insert_planification(&self, planification: Planification) -> StoreResult<Planification> {
        let row = self.insert(Table::Planification, &planification, None).await?;
        notify(&self.feed, Table::Planification, ChangeKind::Insert, row.id);
        Ok(row)
    }

    async fn delete_planification(&self, id: Uuid) -> StoreResult<()> {
        self.delete(Table::Planification, id).await
    }

    async fn list_interdictions(&self, client_id: Uuid) -> StoreResult<Vec<InterdictionPriorite>> {
        self.select(Table::InterdictionsPriorites, &[("client_id", eq(client_id))]).await
    }

    async fn insert_interdiction(&self, flag: InterdictionPriorite) -> StoreResult<InterdictionPriorite> {
        let row = self.insert(Table::InterdictionsPriorites, &flag, None).await?;
        notify(&self.feed, Table::InterdictionsPriorites, ChangeKind::Insert, row.id);
        Ok(row)
    }

    async fn insert_historique(&self, entry: Historique) -> StoreResult<()> {
        let row = self.insert(Table::Historique, &entry, None).await?;
        notify(&self.feed, Table::Historique, ChangeKind::Insert, row.id);
        Ok(())
    }

    async fn list_historique(&self, ligne_id: Uuid) -> StoreResult<Vec<Historique>> {
        self.select(
            Table::Historique,
            &[("ligne_id", eq(ligne_id)), ("order", "created_at.asc".to_string())],
        )
        .await
    }

    async fn find_utilisateur_by_email(&self, email: &str) -> StoreResult<Option<Utilisateur>> {
        // Profiles are stored with lowercased emails; `eq.` keeps `%` and `_` literal
        let email = email.trim().to_lowercase();
        let mut rows: Vec<Utilisateur> = self.select(Table::Utilisateurs, &[("email", eq(&email))]).await?;
        if rows.len() > 1 {
            warn!(%email, matches = rows.len(), "several profiles share one email");
            return Err(StoreError::conflict(format!("{} profiles match {}", rows.len(), email)));
        }
        Ok(rows.pop())
    }

    async fn get_utilisateur(&self, id: Uuid) -> StoreResult<Option<Utilisateur>> {
        self.select_one(Table::Utilisateurs, &[("id", eq(id))]).await
    }

    async fn insert_utilisateur(&self, user: Utilisateur) -> StoreResult<Utilisateur> {
        let row = self.insert(Table::Utilisateurs, &user, None).await?;
        notify(&self.feed, Table::Utilisateurs, ChangeKind::Insert, row.id);
        Ok(row)
    }

    async fn delete_utilisateur(&self, id: Uuid) -> StoreResult<()> {
        self.delete(Table::Utilisateurs, id).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}
