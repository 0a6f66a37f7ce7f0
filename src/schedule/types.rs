use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::creneau::Horaires;

/// Job category used to qualify candidates, clients and orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Secteur {
    #[serde(rename = "Étages")]
    Etages,
    #[serde(rename = "Cuisine")]
    Cuisine,
    #[serde(rename = "Salle")]
    Salle,
    #[serde(rename = "Plonge")]
    Plonge,
    #[serde(rename = "Réception")]
    Reception,
}

impl Secteur {
    pub const ALL: [Secteur; 5] = [
        Secteur::Etages,
        Secteur::Cuisine,
        Secteur::Salle,
        Secteur::Plonge,
        Secteur::Reception,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Secteur::Etages => "Étages",
            Secteur::Cuisine => "Cuisine",
            Secteur::Salle => "Salle",
            Secteur::Plonge => "Plonge",
            Secteur::Reception => "Réception",
        }
    }
}

impl fmt::Display for Secteur {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lowercases and strips the accents that show up in sector and status labels
pub fn fold_label(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'à' | 'â' => 'a',
            'î' | 'ï' => 'i',
            'ô' => 'o',
            'ù' | 'û' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

impl FromStr for Secteur {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_label(s).as_str() {
            "etages" | "etage" | "menage" => Ok(Secteur::Etages),
            "cuisine" => Ok(Secteur::Cuisine),
            "salle" | "service" => Ok(Secteur::Salle),
            "plonge" => Ok(Secteur::Plonge),
            "reception" => Ok(Secteur::Reception),
            _ => Err(format!("Unknown secteur: {}", s.trim())),
        }
    }
}

/// A worker profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidat {
    pub id: Uuid,
    #[serde(rename = "nom")]
    pub last_name: String,
    #[serde(rename = "prenom")]
    pub first_name: String,
    pub secteurs: Vec<Secteur>,
    pub actif: bool,
    pub vehicule: bool,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Candidat {
    pub fn new(first_name: &str, last_name: &str, secteurs: Vec<Secteur>) -> Self {
        Self {
            id: Uuid::new_v4(),
            last_name: last_name.to_string(),
            first_name: first_name.to_string(),
            secteurs,
            actif: true,
            vehicule: false,
            telephone: None,
            email: None,
        }
    }

    pub fn is_qualified_for(&self, secteur: Secteur) -> bool {
        self.actif && self.secteurs.contains(&secteur)
    }
}

/// A client establishment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    #[serde(rename = "nom")]
    pub name: String,
    pub secteurs: Vec<Secteur>,
    #[serde(default)]
    pub services: Vec<String>,
    pub actif: bool,
}

impl Client {
    pub fn new(name: &str, secteurs: Vec<Secteur>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            secteurs,
            services: Vec::new(),
            actif: true,
        }
    }
}

/// Order status, wire labels match the values stored by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatutCommande {
    #[serde(rename = "En recherche")]
    EnRecherche,
    #[serde(rename = "Validé")]
    Valide,
    #[serde(rename = "Non pourvue")]
    NonPourvue,
    #[serde(rename = "Absence")]
    Absence,
    #[serde(rename = "Annule Client")]
    AnnuleClient,
    #[serde(rename = "Annule Int")]
    AnnuleInterimaire,
    #[serde(rename = "Annule ADA")]
    AnnuleAgence,
}

impl StatutCommande {
    pub const ALL: [StatutCommande; 7] = [
        StatutCommande::EnRecherche,
        StatutCommande::Valide,
        StatutCommande::NonPourvue,
        StatutCommande::Absence,
        StatutCommande::AnnuleClient,
        StatutCommande::AnnuleInterimaire,
        StatutCommande::AnnuleAgence,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatutCommande::EnRecherche => "En recherche",
            StatutCommande::Valide => "Validé",
            StatutCommande::NonPourvue => "Non pourvue",
            StatutCommande::Absence => "Absence",
            StatutCommande::AnnuleClient => "Annule Client",
            StatutCommande::AnnuleInterimaire => "Annule Int",
            StatutCommande::AnnuleAgence => "Annule ADA",
        }
    }
}

impl fmt::Display for StatutCommande {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A shift order for a client on a date/sector/service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commande {
    pub id: Uuid,
    pub client_id: Uuid,
    pub date: NaiveDate,
    pub secteur: Secteur,
    #[serde(default)]
    pub service: Option<String>,
    pub statut: StatutCommande,
    #[serde(flatten)]
    pub horaires: Horaires,
    #[serde(default)]
    pub candidat_id: Option<Uuid>,
    #[serde(default)]
    pub motif: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Commande {
    pub fn new(client_id: Uuid, date: NaiveDate, secteur: Secteur, horaires: Horaires) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            date,
            secteur,
            service: None,
            statut: StatutCommande::EnRecherche,
            horaires,
            candidat_id: None,
            motif: None,
            created_at: Utc::now(),
        }
    }
}

/// Fields of an order that status changes are allowed to touch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statut: Option<StatutCommande>,
    /// `Some(None)` clears the candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidat_id: Option<Option<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motif: Option<Option<String>>,
}

impl CommandePatch {
    pub fn apply(&self, commande: &mut Commande) {
        if let Some(statut) = self.statut {
            commande.statut = statut;
        }
        if let Some(candidat_id) = self.candidat_id {
            commande.candidat_id = candidat_id;
        }
        if let Some(motif) = &self.motif {
            commande.motif = motif.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispoStatut {
    #[serde(rename = "Dispo")]
    Dispo,
    #[serde(rename = "Non Dispo")]
    NonDispo,
    #[serde(rename = "Non Renseigné")]
    NonRenseigne,
}

impl FromStr for DispoStatut {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_label(s).as_str() {
            "dispo" | "disponible" | "oui" => Ok(DispoStatut::Dispo),
            "non dispo" | "indisponible" | "non" => Ok(DispoStatut::NonDispo),
            "" | "non renseigne" | "?" => Ok(DispoStatut::NonRenseigne),
            _ => Err(format!("Unknown availability status: {}", s.trim())),
        }
    }
}

/// A candidate's declared availability for a date/sector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disponibilite {
    pub id: Uuid,
    pub candidat_id: Uuid,
    pub date: NaiveDate,
    pub secteur: Secteur,
    pub statut: DispoStatut,
    #[serde(rename = "dispo_matin")]
    pub matin: bool,
    #[serde(rename = "dispo_soir")]
    pub soir: bool,
    #[serde(rename = "dispo_nuit")]
    pub nuit: bool,
}

/// Resolved assignment linking a validated order to a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Planification {
    pub id: Uuid,
    pub commande_id: Uuid,
    pub candidat_id: Uuid,
    pub client_id: Uuid,
    pub date: NaiveDate,
    pub secteur: Secteur,
    #[serde(flatten)]
    pub horaires: Horaires,
}

impl Planification {
    pub fn for_commande(commande: &Commande, candidat_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            commande_id: commande.id,
            candidat_id,
            client_id: commande.client_id,
            date: commande.date,
            secteur: commande.secteur,
            horaires: commande.horaires.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterdictionKind {
    #[serde(rename = "interdiction")]
    Interdiction,
    #[serde(rename = "priorite")]
    Priorite,
}

/// Per-candidate-per-client exclusion or preference flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterdictionPriorite {
    pub id: Uuid,
    pub candidat_id: Uuid,
    pub client_id: Uuid,
    #[serde(default)]
    pub secteur: Option<Secteur>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(rename = "type")]
    pub kind: InterdictionKind,
    #[serde(default)]
    pub commentaire: Option<String>,
}

impl InterdictionPriorite {
    /// Whether this flag covers an order for the given sector and service
    pub fn applies_to(&self, client_id: Uuid, secteur: Secteur, service: Option<&str>) -> bool {
        if self.client_id != client_id {
            return false;
        }
        if self.secteur.is_some_and(|s| s != secteur) {
            return false;
        }
        match (&self.service, service) {
            (None, _) => true,
            (Some(own), Some(wanted)) => fold_label(own) == fold_label(wanted),
            (Some(_), None) => false,
        }
    }
}

/// Append-only audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Historique {
    pub id: Uuid,
    #[serde(rename = "table_cible")]
    pub table: String,
    pub ligne_id: Uuid,
    pub action: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub apres: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Historique {
    pub fn new(table: &str, ligne_id: Uuid, action: &str, user_id: Option<Uuid>, apres: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.to_string(),
            ligne_id,
            action: action.to_string(),
            user_id,
            apres,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "recruteur")]
    Recruteur,
}

/// Staff profile, keyed on the auth provider's user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utilisateur {
    pub id: Uuid,
    pub email: String,
    #[serde(rename = "nom")]
    pub last_name: String,
    #[serde(rename = "prenom")]
    pub first_name: String,
    pub role: Role,
    pub actif: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secteur_parsing_ignores_case_and_accents() {
        assert_eq!("ÉTAGES".parse::<Secteur>(), Ok(Secteur::Etages));
        assert_eq!(" reception ".parse::<Secteur>(), Ok(Secteur::Reception));
        assert_eq!("Réception".parse::<Secteur>(), Ok(Secteur::Reception));
        assert!("Bar".parse::<Secteur>().is_err());
    }

    #[test]
    fn statut_uses_platform_labels_on_the_wire() {
        let json = serde_json::to_string(&StatutCommande::Valide).unwrap();
        assert_eq!(json, "\"Validé\"");
        let back: StatutCommande = serde_json::from_str("\"Annule Int\"").unwrap();
        assert_eq!(back, StatutCommande::AnnuleInterimaire);
    }

    #[test]
    fn interdiction_scope_matches_sector_and_service() {
        let client = Uuid::new_v4();
        let flag = InterdictionPriorite {
            id: Uuid::new_v4(),
            candidat_id: Uuid::new_v4(),
            client_id: client,
            secteur: Some(Secteur::Salle),
            service: Some("Petit-déjeuner".to_string()),
            kind: InterdictionKind::Interdiction,
            commentaire: None,
        };
        assert!(flag.applies_to(client, Secteur::Salle, Some("petit-déjeuner")));
        assert!(!flag.applies_to(client, Secteur::Salle, None));
        assert!(!flag.applies_to(client, Secteur::Cuisine, Some("Petit-déjeuner")));
        assert!(!flag.applies_to(Uuid::new_v4(), Secteur::Salle, Some("Petit-déjeuner")));
        assert!(flag.applies_to(client, Secteur::Salle, Some("PETIT-DÉJEUNER")));
        assert!(flag.applies_to(client, Secteur::Salle, Some("petit-dejeuner")));
    }

    #[test]
    fn patch_clears_candidate() {
        let mut commande = Commande::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Secteur::Cuisine,
            Horaires::default(),
        );
        commande.candidat_id = Some(Uuid::new_v4());
        CommandePatch {
            statut: Some(StatutCommande::EnRecherche),
            candidat_id: Some(None),
            motif: None,
        }
        .apply(&mut commande);
        assert_eq!(commande.candidat_id, None);
        assert_eq!(commande.statut, StatutCommande::EnRecherche);
    }
}
