use std::collections::HashMap;
use std::fs::File;
use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::schedule::types::{Candidat, Client, Commande, Secteur, StatutCommande};

/// Formats a candidate as "Prénom NOM"
pub fn format_candidate_name(first_name: &str, last_name: &str) -> String {
    if first_name.is_empty() {
        last_name.to_uppercase()
    } else {
        format!("{} {}", first_name, last_name.to_uppercase())
    }
}

/// One order as shown on the planning board
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanningRow {
    pub commande_id: Uuid,
    pub date: NaiveDate,
    pub secteur: Secteur,
    pub client: String,
    pub service: Option<String>,
    pub horaires: String,
    pub statut: StatutCommande,
    pub candidat: Option<String>,
}

/// Joins orders with client and candidate names, sorted by sector, client, start time
pub fn build_planning(commandes: &[Commande], clients: &HashMap<Uuid, Client>, candidats: &HashMap<Uuid, Candidat>) -> Vec<PlanningRow> {
    let mut sorted: Vec<&Commande> = commandes.iter().collect();
    let client_name = |id: &Uuid| clients.get(id).map(|c| c.name.clone()).unwrap_or_else(|| id.to_string());
    sorted.sort_by_key(|c| {
        let first_start = c.horaires.windows().first().map(|(_, w)| w.start);
        (c.secteur, client_name(&c.client_id).to_lowercase(), first_start)
    });

    sorted
        .into_iter()
        .map(|c| PlanningRow {
            commande_id: c.id,
            date: c.date,
            secteur: c.secteur,
            client: client_name(&c.client_id),
            service: c.service.clone(),
            horaires: c.horaires.to_string(),
            statut: c.statut,
            candidat: c
                .candidat_id
                .and_then(|id| candidats.get(&id))
                .map(|cand| format_candidate_name(&cand.first_name, &cand.last_name)),
        })
        .collect()
}

fn planning_line(row: &PlanningRow) -> String {
    let client = match &row.service {
        Some(service) => format!("{} ({})", row.client, service),
        None => row.client.clone(),
    };
    let who = row.candidat.as_deref().unwrap_or("[À POURVOIR]");
    format!("{} [{}] {} -> {} ({})", row.horaires, row.secteur, client, who, row.statut)
}

/// Writes a day's planning to a file, one order per line
pub fn write_planning_to_file(date: NaiveDate, rows: &[PlanningRow], filename: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = File::create(filename)?;
    writeln!(file, "** Planning du {} **", date.format("%d/%m/%Y"))?;
    for row in rows {
        writeln!(file, "{}", planning_line(row))?;
    }
    Ok(())
}

/// Prints a day's planning with a per-status summary
pub fn print_planning(date: NaiveDate, rows: &[PlanningRow]) {
    println!("\n=== Planning du {} ===", date.format("%d/%m/%Y"));
    println!("Total orders: {}", rows.len());

    let open: Vec<&PlanningRow> = rows.iter().filter(|r| r.statut == StatutCommande::EnRecherche).collect();
    if !open.is_empty() {
        println!("⚠️  Orders still searching ({}):", open.len());
        for row in &open {
            println!("  - {}", planning_line(row));
        }
    }

    for row in rows {
        println!("  {}", planning_line(row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::creneau::{parse_time, Horaires, TimeWindow};

    #[test]
    fn names_are_formatted_first_then_upper_last() {
        assert_eq!(format_candidate_name("Lina", "Morel"), "Lina MOREL");
        assert_eq!(format_candidate_name("", "Morel"), "MOREL");
    }

    #[test]
    fn planning_rows_are_sorted_and_named() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let parc = Client::new("Hôtel du Parc", vec![Secteur::Salle]);
        let abbaye = Client::new("Abbaye", vec![Secteur::Salle]);
        let lina = Candidat::new("Lina", "Morel", vec![Secteur::Salle]);
        let window = TimeWindow::new(parse_time("07:00").unwrap(), parse_time("11:00").unwrap());

        let mut staffed = Commande::new(parc.id, date, Secteur::Salle, Horaires::matin(window));
        staffed.statut = StatutCommande::Valide;
        staffed.candidat_id = Some(lina.id);
        let open = Commande::new(abbaye.id, date, Secteur::Salle, Horaires::default());

        let clients = HashMap::from([(parc.id, parc.clone()), (abbaye.id, abbaye.clone())]);
        let candidats = HashMap::from([(lina.id, lina.clone())]);
        let rows = build_planning(&[staffed.clone(), open.clone()], &clients, &candidats);

        assert_eq!(rows[0].client, "Abbaye");
        assert_eq!(rows[0].horaires, "journée");
        assert_eq!(rows[1].candidat.as_deref(), Some("Lina MOREL"));
        assert_eq!(planning_line(&rows[1]), "07:00-11:00 [Salle] Hôtel du Parc -> Lina MOREL (Validé)");
        assert!(planning_line(&rows[0]).contains("[À POURVOIR]"));
    }
}
