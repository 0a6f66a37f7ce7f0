use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::io::Read;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::schedule::types::{fold_label, Candidat, DispoStatut, Disponibilite, Secteur};

/// Rows that could not be imported, with the reason
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub merged: usize,
    pub skipped: Vec<String>,
}

/// Parses a boolean from the spellings staff use in spreadsheets
fn parse_bool(value: &str) -> bool {
    matches!(fold_label(value).as_str(), "oui" | "yes" | "true" | "1" | "x" | "o")
}

/// Splits a "Salle, Cuisine" cell; unknown labels are reported, not fatal
fn parse_secteurs(value: &str, line: usize, report: &mut ImportReport) -> Vec<Secteur> {
    let mut secteurs = Vec::new();
    for part in value.split([',', ';', '/']).map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<Secteur>() {
            Ok(s) if !secteurs.contains(&s) => secteurs.push(s),
            Ok(_) => {}
            Err(e) => report.skipped.push(format!("line {}: {}", line, e)),
        }
    }
    secteurs
}

/// Accepts ISO dates and the French day-first format
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .ok()
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Finds a column whose folded header contains any of `needles`
fn column(headers: &StringRecord, needles: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let folded = fold_label(h);
        needles.iter().any(|n| folded.contains(n))
    })
}

fn cell<'a>(record: &'a StringRecord, col: Option<usize>) -> &'a str {
    col.and_then(|c| record.get(c)).unwrap_or("").trim()
}

fn identity_key(candidat: &Candidat) -> String {
    match &candidat.email {
        Some(email) => email.to_lowercase(),
        None => format!(
            "{}|{}|{}",
            candidat.last_name.to_lowercase(),
            candidat.first_name.to_lowercase(),
            candidat.telephone.as_deref().unwrap_or("")
        ),
    }
}

/// Loads candidates from a CSV export.
///
/// Rows describing the same person (same email, or same name and phone when
/// there is no email) are merged, later rows winning. Existing candidates
/// passed in `known` keep their id so a re-import updates instead of
/// duplicating.
pub fn load_candidats<R: Read>(reader: R, known: &[Candidat]) -> Result<(Vec<Candidat>, ImportReport)> {
    let mut reader = ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();

    // "prenom" must be looked up before "nom" since one contains the other
    let first_name_col = column(&headers, &["prenom", "first name"]);
    let last_name_col = headers
        .iter()
        .enumerate()
        .position(|(i, h)| {
            let folded = fold_label(h);
            Some(i) != first_name_col && (folded.contains("nom") || folded.contains("last name"))
        });
    let secteur_col = column(&headers, &["secteur"]);
    let vehicule_col = column(&headers, &["vehicule", "permis"]);
    let phone_col = column(&headers, &["telephone", "portable", "tel"]);
    let email_col = column(&headers, &["email", "mail"]);
    let actif_col = column(&headers, &["actif"]);

    let known_by_key: HashMap<String, &Candidat> = known.iter().map(|c| (identity_key(c), c)).collect();
    let mut report = ImportReport::default();
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, Candidat> = HashMap::new();

    for (index, result) in reader.records().enumerate() {
        let record = result?;
        // Header is line 1
        let line = index + 2;

        let last_name = cell(&record, last_name_col).to_string();
        let first_name = cell(&record, first_name_col).to_string();
        if last_name.is_empty() || first_name.is_empty() {
            report.skipped.push(format!("line {}: missing name", line));
            continue;
        }

        let mut candidat = Candidat::new(&first_name, &last_name, parse_secteurs(cell(&record, secteur_col), line, &mut report));
        candidat.vehicule = parse_bool(cell(&record, vehicule_col));
        candidat.telephone = non_empty(cell(&record, phone_col));
        candidat.email = non_empty(cell(&record, email_col)).map(|e| e.to_lowercase());
        candidat.actif = actif_col.map_or(true, |_| parse_bool(cell(&record, actif_col)));

        let key = identity_key(&candidat);
        if let Some(existing) = known_by_key.get(&key) {
            candidat.id = existing.id;
        }
        match by_key.get_mut(&key) {
            Some(previous) => {
                candidat.id = previous.id;
                *previous = candidat;
                report.merged += 1;
                debug!(line, "merged candidate row");
            }
            None => {
                order.push(key.clone());
                by_key.insert(key, candidat);
            }
        }
    }

    let candidats: Vec<Candidat> = order.into_iter().filter_map(|k| by_key.remove(&k)).collect();
    report.imported = candidats.len();
    if !report.skipped.is_empty() {
        warn!(skipped = report.skipped.len(), "some candidate rows were not imported");
    }
    Ok((candidats, report))
}

/// Loads availability rows, resolving candidates by email
pub fn load_disponibilites<R: Read>(reader: R, candidats: &[Candidat]) -> Result<(Vec<Disponibilite>, ImportReport)> {
    let mut reader = ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();

    let email_col = column(&headers, &["email", "mail"]);
    let date_col = column(&headers, &["date"]);
    let secteur_col = column(&headers, &["secteur"]);
    let statut_col = column(&headers, &["statut", "dispo"]);
    let matin_col = column(&headers, &["matin"]);
    let soir_col = column(&headers, &["soir"]);
    let nuit_col = column(&headers, &["nuit"]);

    let by_email: HashMap<String, Uuid> = candidats
        .iter()
        .filter_map(|c| c.email.as_ref().map(|e| (e.to_lowercase(), c.id)))
        .collect();

    let mut report = ImportReport::default();
    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result?;
        let line = index + 2;

        let email = cell(&record, email_col).to_lowercase();
        let Some(&candidat_id) = by_email.get(&email) else {
            report.skipped.push(format!("line {}: unknown candidate {}", line, email));
            continue;
        };
        let Some(date) = parse_date(cell(&record, date_col)) else {
            report.skipped.push(format!("line {}: invalid date", line));
            continue;
        };
        let secteur = match cell(&record, secteur_col).parse::<Secteur>() {
            Ok(s) => s,
            Err(e) => {
                report.skipped.push(format!("line {}: {}", line, e));
                continue;
            }
        };
        let statut = match cell(&record, statut_col).parse::<DispoStatut>() {
            Ok(s) => s,
            Err(e) => {
                report.skipped.push(format!("line {}: {}", line, e));
                continue;
            }
        };

        rows.push(Disponibilite {
            id: Uuid::new_v4(),
            candidat_id,
            date,
            secteur,
            statut,
            matin: parse_bool(cell(&record, matin_col)),
            soir: parse_bool(cell(&record, soir_col)),
            nuit: parse_bool(cell(&record, nuit_col)),
        });
    }

    report.imported = rows.len();
    Ok((rows, report))
}
