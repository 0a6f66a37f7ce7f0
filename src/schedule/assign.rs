use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::filter::{filter_candidates, find_conflict, FilterInputs, FilterOutcome};
use super::types::{Commande, CommandePatch, Historique, Planification, StatutCommande};
use super::workflow::{manual_transition, transition, AssignmentEffect};
use crate::error::{Error, Result};
use crate::platform::Store;

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub commande: Commande,
    pub planification: Planification,
}

/// Runs the assignment and status workflows against the platform
pub struct AssignmentService {
    store: Arc<dyn Store>,
    /// Serialises check-then-write sequences issued from this process
    writes: Mutex<()>,
}

impl AssignmentService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, writes: Mutex::new(()) }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn load_commande(&self, id: Uuid) -> Result<Commande> {
        self.store
            .get_commande(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("commande {}", id)))
    }

    /// Appends an audit row; a failure here is logged and does not undo the change
    async fn audit(&self, commande: &Commande, action: &str, user_id: Option<Uuid>) {
        let snapshot = match serde_json::to_value(commande) {
            Ok(value) => value,
            Err(e) => {
                warn!(commande = %commande.id, "could not snapshot order for history: {}", e);
                serde_json::Value::Null
            }
        };
        let entry = Historique::new("commandes", commande.id, action, user_id, snapshot);
        if let Err(e) = self.store.insert_historique(entry).await {
            warn!(commande = %commande.id, action, "history insert failed: {}", e);
        }
    }

    /// Candidates for the quick-assignment list of an order
    pub async fn quick_candidates(&self, commande_id: Uuid) -> Result<FilterOutcome> {
        let commande = self.load_commande(commande_id).await?;
        let store = &self.store;
        let (candidats, disponibilites, planifications, interdictions, history) = tokio::try_join!(
            store.list_candidats(Some(commande.secteur)),
            store.list_disponibilites(commande.date, commande.secteur),
            store.list_planifications(commande.date),
            store.list_interdictions(commande.client_id),
            store.list_planifications_for_client(commande.client_id),
        )?;

        let outcome = filter_candidates(
            &commande,
            FilterInputs {
                candidats: &candidats,
                disponibilites: &disponibilites,
                planifications: &planifications,
                interdictions: &interdictions,
                history: &history,
            },
        );
        info!(
            commande = %commande.id,
            options = outcome.options.len(),
            excluded = outcome.excluded.len(),
            "quick assignment list built"
        );
        Ok(outcome)
    }

    /// Assigns `candidat_id` to an open order.
    ///
    /// Writes the assignment row, then moves the order to `Validé` guarded on
    /// its previous status, then appends history. The assignment row is
    /// removed again when the order update is rejected.
    pub async fn assign(&self, commande_id: Uuid, candidat_id: Uuid, user_id: Option<Uuid>) -> Result<Assignment> {
        let _guard = self.writes.lock().await;

        let commande = self.load_commande(commande_id).await?;
        transition(commande.statut, StatutCommande::Valide)?;

        let candidat = self
            .store
            .get_candidat(candidat_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("candidat {}", candidat_id)))?;
        if !candidat.is_qualified_for(commande.secteur) {
            return Err(Error::validation(format!(
                "{} {} is not active for {}",
                candidat.first_name, candidat.last_name, commande.secteur
            )));
        }

        let day = self.store.list_planifications(commande.date).await?;
        if let Some(conflict) = find_conflict(candidat_id, &commande, &commande.horaires, &day) {
            return Err(Error::conflict(format!(
                "{} {} is already booked on order {}",
                candidat.first_name, candidat.last_name, conflict.commande_id
            )));
        }

        let planification = self
            .store
            .insert_planification(Planification::for_commande(&commande, candidat_id))
            .await?;

        let patch = CommandePatch {
            statut: Some(StatutCommande::Valide),
            candidat_id: Some(Some(candidat_id)),
            motif: Some(None),
        };
        let updated = match self.store.update_commande(commande.id, StatutCommande::EnRecherche, patch).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(commande = %commande.id, "order update failed, removing assignment row: {}", e);
                if let Err(cleanup) = self.store.delete_planification(planification.id).await {
                    error!(
                        planification = %planification.id,
                        "could not remove orphan assignment row: {}", cleanup
                    );
                }
                return Err(e.into());
            }
        };

        self.audit(&updated, "planification", user_id).await;
        info!(commande = %updated.id, candidat = %candidat_id, "candidate assigned");
        Ok(Assignment { commande: updated, planification })
    }

    /// Puts a validated order back into search and frees its candidate
    pub async fn unassign(&self, commande_id: Uuid, user_id: Option<Uuid>) -> Result<Commande> {
        self.change_status(commande_id, StatutCommande::EnRecherche, None, user_id).await
    }

    /// Applies a staff-requested status change following the workflow table
    pub async fn change_status(
        &self,
        commande_id: Uuid,
        statut: StatutCommande,
        motif: Option<String>,
        user_id: Option<Uuid>,
    ) -> Result<Commande> {
        let _guard = self.writes.lock().await;

        let commande = self.load_commande(commande_id).await?;
        let effect = manual_transition(commande.statut, statut)?;

        // The assignment row goes first so a failure leaves the order untouched
        let removed = match effect {
            AssignmentEffect::None => None,
            AssignmentEffect::Release | AssignmentEffect::Close => {
                match self.store.planification_for_commande(commande.id).await? {
                    Some(planification) => {
                        if let Err(e) = self.store.delete_planification(planification.id).await {
                            error!(
                                commande = %commande.id,
                                planification = %planification.id,
                                "could not remove assignment row, order left as {}: {}", commande.statut, e
                            );
                            return Err(e.into());
                        }
                        Some(planification)
                    }
                    None => None,
                }
            }
        };

        let patch = CommandePatch {
            statut: Some(statut),
            candidat_id: (effect == AssignmentEffect::Release).then_some(None),
            motif: Some(motif),
        };
        let updated = match self.store.update_commande(commande.id, commande.statut, patch).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(planification) = removed {
                    warn!(commande = %commande.id, "order update failed, restoring assignment row: {}", e);
                    if let Err(restore) = self.store.insert_planification(planification.clone()).await {
                        error!(
                            commande = %commande.id,
                            planification = %planification.id,
                            "order is {} but its assignment row is gone: {}", commande.statut, restore
                        );
                    }
                }
                return Err(e.into());
            }
        };

        self.audit(&updated, "statut", user_id).await;
        info!(commande = %updated.id, from = %commande.statut, to = %statut, "order status changed");
        Ok(updated)
    }

    pub async fn history(&self, commande_id: Uuid) -> Result<Vec<Historique>> {
        self.load_commande(commande_id).await?;
        Ok(self.store.list_historique(commande_id).await?)
    }
}
