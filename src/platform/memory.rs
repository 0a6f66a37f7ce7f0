use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{notify, ChangeEvent, ChangeKind, Store, StoreError, StoreResult, Table, CHANGE_FEED_CAPACITY};
use crate::schedule::types::{
    Candidat, Client, Commande, CommandePatch, Disponibilite, Historique, InterdictionPriorite,
    Planification, Secteur, StatutCommande, Utilisateur,
};

#[derive(Default)]
struct Tables {
    candidats: HashMap<Uuid, Candidat>,
    clients: HashMap<Uuid, Client>,
    commandes: HashMap<Uuid, Commande>,
    disponibilites: HashMap<Uuid, Disponibilite>,
    planifications: HashMap<Uuid, Planification>,
    interdictions: HashMap<Uuid, InterdictionPriorite>,
    historique: Vec<Historique>,
    utilisateurs: HashMap<Uuid, Utilisateur>,
}

/// In-process stand-in for the hosted platform, used in development and tests.
///
/// Enforces the same constraints the platform schema does: one assignment
/// row per order, one availability row per candidate/date/sector, unique
/// profile emails, and the status guard on order updates.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    feed: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { tables: RwLock::new(Tables::default()), feed }
    }

    fn changed(&self, table: Table, kind: ChangeKind, id: Uuid) {
        notify(&self.feed, table, kind, id);
    }
}

fn sorted_by_name(mut candidats: Vec<Candidat>) -> Vec<Candidat> {
    candidats.sort_by(|a, b| {
        a.last_name
            .to_lowercase()
            .cmp(&b.last_name.to_lowercase())
            .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
    });
    candidats
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_candidats(&self, secteur: Option<Secteur>) -> StoreResult<Vec<Candidat>> {
        let tables = self.tables.read().await;
        let rows = tables
            .candidats
            .values()
            .filter(|c| secteur.map_or(true, |s| c.secteurs.contains(&s)))
            .cloned()
            .collect();
        Ok(sorted_by_name(rows))
    }

    async fn get_candidat(&self, id: Uuid) -> StoreResult<Option<Candidat>> {
        Ok(self.tables.read().await.candidats.get(&id).cloned())
    }

    async fn upsert_candidat(&self, candidat: Candidat) -> StoreResult<Candidat> {
        let kind = {
            let mut tables = self.tables.write().await;
            let kind = if tables.candidats.contains_key(&candidat.id) {
                ChangeKind::Update
            } else {
                ChangeKind::Insert
            };
            tables.candidats.insert(candidat.id, candidat.clone());
            kind
        };
        self.changed(Table::Candidats, kind, candidat.id);
        Ok(candidat)
    }

    async fn get_client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        Ok(self.tables.read().await.clients.get(&id).cloned())
    }

    async fn insert_client(&self, client: Client) -> StoreResult<Client> {
        {
            let mut tables = self.tables.write().await;
            if tables.clients.contains_key(&client.id) {
                return Err(StoreError::conflict(format!("client {} already exists", client.id)));
            }
            tables.clients.insert(client.id, client.clone());
        }
        self.changed(Table::Clients, ChangeKind::Insert, client.id);
        Ok(client)
    }

    async fn insert_commande(&self, commande: Commande) -> StoreResult<Commande> {
        {
            let mut tables = self.tables.write().await;
            if tables.commandes.contains_key(&commande.id) {
                return Err(StoreError::conflict(format!("commande {} already exists", commande.id)));
            }
            tables.commandes.insert(commande.id, commande.clone());
        }
        self.changed(Table::Commandes, ChangeKind::Insert, commande.id);
        Ok(commande)
    }

    async fn get_commande(&self, id: Uuid) -> StoreResult<Option<Commande>> {
        Ok(self.tables.read().await.commandes.get(&id).cloned())
    }

    async fn list_commandes(&self, date: NaiveDate) -> StoreResult<Vec<Commande>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Commande> = tables.commandes.values().filter(|c| c.date == date).cloned().collect();
        rows.sort_by_key(|c| (c.secteur, c.created_at));
        Ok(rows)
    }

    async fn update_commande(
        &self,
        id: Uuid,
        expected: StatutCommande,
        patch: CommandePatch,
    ) -> StoreResult<Commande> {
        let updated = {
            let mut tables = self.tables.write().await;
            let commande = tables
                .commandes
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("commandes", id))?;
            if commande.statut != expected {
                return Err(StoreError::conflict(format!(
                    "commande {} is {} (expected {})",
                    id, commande.statut, expected
                )));
            }
            patch.apply(commande);
            commande.clone()
        };
        self.changed(Table::Commandes, ChangeKind::Update, id);
        Ok(updated)
    }

    async fn list_disponibilites(&self, date: NaiveDate, secteur: Secteur) -> StoreResult<Vec<Disponibilite>> {
        let tables = self.tables.read().await;
        Ok(tables
            .disponibilites
            .values()
            .filter(|d| d.date == date && d.secteur == secteur)
            .cloned()
            .collect())
    }

    async fn upsert_disponibilite(&self, dispo: Disponibilite) -> StoreResult<Disponibilite> {
        let (stored, kind) = {
            let mut tables = self.tables.write().await;
            let existing = tables
                .disponibilites
                .values()
                .find(|d| d.candidat_id == dispo.candidat_id && d.date == dispo.date && d.secteur == dispo.secteur)
                .map(|d| d.id);
            match existing {
                Some(id) => {
                    let row = Disponibilite { id, ..dispo };
                    tables.disponibilites.insert(id, row.clone());
                    (row, ChangeKind::Update)
                }
                None => {
                    tables.disponibilites.insert(dispo.id, dispo.clone());
                    (dispo, ChangeKind::Insert)
                }
            }
        };
        self.changed(Table::Disponibilites, kind, stored.id);
        Ok(stored)
    }

    async fn list_planifications(&self, date: NaiveDate) -> StoreResult<Vec<Planification>> {
        let tables = self.tables.read().await;
        Ok(tables.planifications.values().filter(|p| p.date == date).cloned().collect())
    }

    async fn list_planifications_for_client(&self, client_id: Uuid) -> StoreResult<Vec<Planification>> {
        let tables = self.tables.read().await;
        Ok(tables
            .planifications
            .values()
            .filter(|p| p.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn planification_for_commande(&self, commande_id: Uuid) -> StoreResult<Option<Planification>> {
        let tables = self.tables.read().await;
        Ok(tables.planifications.values().find(|p| p.commande_id == commande_id).cloned())
    }

    async fn insert_planification(&self, planification: Planification) -> StoreResult<Planification> {
        {
            let mut tables = self.tables.write().await;
            if tables.planifications.values().any(|p| p.commande_id == planification.commande_id) {
                return Err(StoreError::conflict(format!(
                    "commande {} already has an assignment",
                    planification.commande_id
                )));
            }
            tables.planifications.insert(planification.id, planification.clone());
        }
        self.changed(Table::Planification, ChangeKind::Insert, planification.id);
        Ok(planification)
    }

    async fn delete_planification(&self, id: Uuid) -> StoreResult<()> {
        let removed = self.tables.write().await.planifications.remove(&id);
        if removed.is_none() {
            return Err(StoreError::not_found("planification", id));
        }
        self.changed(Table::Planification, ChangeKind::Delete, id);
        Ok(())
    }

    async fn list_interdictions(&self, client_id: Uuid) -> StoreResult<Vec<InterdictionPriorite>> {
        let tables = self.tables.read().await;
        Ok(tables
            .interdictions
            .values()
            .filter(|i| i.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn insert_interdiction(&self, flag: InterdictionPriorite) -> StoreResult<InterdictionPriorite> {
        self.tables.write().await.interdictions.insert(flag.id, flag.clone());
        self.changed(Table::InterdictionsPriorites, ChangeKind::Insert, flag.id);
        Ok(flag)
    }

    async fn insert_historique(&self, entry: Historique) -> StoreResult<()> {
        let id = entry.id;
        self.tables.write().await.historique.push(entry);
        self.changed(Table::Historique, ChangeKind::Insert, id);
        Ok(())
    }

    async fn list_historique(&self, ligne_id: Uuid) -> StoreResult<Vec<Historique>> {
        let tables = self.tables.read().await;
        Ok(tables.historique.iter().filter(|h| h.ligne_id == ligne_id).cloned().collect())
    }

    async fn find_utilisateur_by_email(&self, email: &str) -> StoreResult<Option<Utilisateur>> {
        let tables = self.tables.read().await;
        Ok(tables
            .utilisateurs
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn get_utilisateur(&self, id: Uuid) -> StoreResult<Option<Utilisateur>> {
        Ok(self.tables.read().await.utilisateurs.get(&id).cloned())
    }

    async fn insert_utilisateur(&self, user: Utilisateur) -> StoreResult<Utilisateur> {
        {
            let mut tables = self.tables.write().await;
            if tables.utilisateurs.contains_key(&user.id)
                || tables.utilisateurs.values().any(|u| u.email.eq_ignore_ascii_case(&user.email))
            {
                return Err(StoreError::conflict(format!("profile for {} already exists", user.email)));
            }
            tables.utilisateurs.insert(user.id, user.clone());
        }
        self.changed(Table::Utilisateurs, ChangeKind::Insert, user.id);
        Ok(user)
    }

    async fn delete_utilisateur(&self, id: Uuid) -> StoreResult<()> {
        let removed = self.tables.write().await.utilisateurs.remove(&id);
        if removed.is_none() {
            return Err(StoreError::not_found("utilisateurs", id));
        }
        self.changed(Table::Utilisateurs, ChangeKind::Delete, id);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}
