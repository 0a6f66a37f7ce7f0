use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::parser::parse_date;
use crate::schedule::creneau::{parse_window, Horaires};
use crate::schedule::types::{fold_label, Client, Commande, Secteur};

/// Order creation request from the frontend
#[derive(Debug, Clone, Deserialize)]
pub struct CommandeRequest {
    pub client_id: Uuid,
    pub date: String,
    pub secteur: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub heure_debut_matin: Option<String>,
    #[serde(default)]
    pub heure_fin_matin: Option<String>,
    #[serde(default)]
    pub heure_debut_soir: Option<String>,
    #[serde(default)]
    pub heure_fin_soir: Option<String>,
    #[serde(default)]
    pub heure_debut_nuit: Option<String>,
    #[serde(default)]
    pub heure_fin_nuit: Option<String>,
}

/// Validates an order request against its client and builds the order
pub fn validate_commande(req: &CommandeRequest, client: Option<&Client>) -> Result<Commande> {
    let client = client.ok_or_else(|| Error::not_found(format!("client {}", req.client_id)))?;
    if !client.actif {
        return Err(Error::validation(format!("Client {} is inactive", client.name)));
    }

    let date = parse_date(&req.date).ok_or_else(|| Error::validation(format!("Invalid date: {}", req.date)))?;
    let secteur: Secteur = req.secteur.parse().map_err(Error::Validation)?;
    if !client.secteurs.contains(&secteur) {
        return Err(Error::validation(format!("{} does not order {}", client.name, secteur)));
    }

    // Stored under the client's own spelling of the service
    let service = match req.service.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(wanted) => {
            let folded = fold_label(wanted);
            let known = client
                .services
                .iter()
                .find(|s| fold_label(s) == folded)
                .ok_or_else(|| Error::validation(format!("Unknown service for {}: {}", client.name, wanted)))?;
            Some(known.trim().to_string())
        }
        None => None,
    };

    let horaires = Horaires {
        matin: parse_window(req.heure_debut_matin.as_deref(), req.heure_fin_matin.as_deref())
            .map_err(|e| Error::validation(format!("Morning: {}", e)))?,
        soir: parse_window(req.heure_debut_soir.as_deref(), req.heure_fin_soir.as_deref())
            .map_err(|e| Error::validation(format!("Evening: {}", e)))?,
        nuit: parse_window(req.heure_debut_nuit.as_deref(), req.heure_fin_nuit.as_deref())
            .map_err(|e| Error::validation(format!("Night: {}", e)))?,
    };
    if horaires.nuit.is_some() && horaires.matin.is_some() {
        return Err(Error::validation("A night shift cannot be combined with a morning shift"));
    }

    let mut commande = Commande::new(client.id, date, secteur, horaires);
    commande.service = service;
    Ok(commande)
}
