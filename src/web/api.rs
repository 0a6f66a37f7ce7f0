use std::collections::{BTreeMap, HashMap, HashSet};
use std::convert::Infallible;

use actix_session::Session;
use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::session::current_user;
use super::AppState;
use crate::display::{build_planning, PlanningRow};
use crate::error::{Error, Result};
use crate::form::{export_planning_csv, validate_commande, CommandeRequest};
use crate::parser::{load_candidats, load_disponibilites, parse_date};
use crate::schedule::types::{
    Client, DispoStatut, Disponibilite, InterdictionKind, InterdictionPriorite, Secteur, StatutCommande,
};

#[derive(Deserialize)]
pub struct SecteurQuery {
    secteur: Option<String>,
}

#[derive(Deserialize)]
pub struct DayQuery {
    date: String,
    secteur: Option<String>,
}

impl DayQuery {
    fn date(&self) -> Result<NaiveDate> {
        parse_date(&self.date).ok_or_else(|| Error::validation(format!("Invalid date: {}", self.date)))
    }

    fn secteur(&self) -> Result<Option<Secteur>> {
        parse_secteur(self.secteur.as_deref())
    }
}

fn parse_secteur(value: Option<&str>) -> Result<Option<Secteur>> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some).map_err(Error::Validation),
        None => Ok(None),
    }
}

#[derive(Deserialize)]
pub struct ClientRequest {
    nom: String,
    secteurs: Vec<Secteur>,
    #[serde(default)]
    services: Vec<String>,
}

#[derive(Deserialize)]
pub struct InterdictionRequest {
    candidat_id: Uuid,
    client_id: Uuid,
    #[serde(default)]
    secteur: Option<Secteur>,
    #[serde(default)]
    service: Option<String>,
    #[serde(rename = "type")]
    kind: InterdictionKind,
    #[serde(default)]
    commentaire: Option<String>,
}

#[derive(Deserialize)]
pub struct DisponibiliteRequest {
    candidat_id: Uuid,
    date: String,
    secteur: Secteur,
    statut: DispoStatut,
    #[serde(default)]
    dispo_matin: bool,
    #[serde(default)]
    dispo_soir: bool,
    #[serde(default)]
    dispo_nuit: bool,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    candidat_id: Uuid,
}

#[derive(Deserialize)]
pub struct StatutRequest {
    statut: StatutCommande,
    #[serde(default)]
    motif: Option<String>,
}

pub async fn list_candidats(
    state: web::Data<AppState>,
    session: Session,
    query: web::Query<SecteurQuery>,
) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let secteur = parse_secteur(query.secteur.as_deref())?;
    let candidats = state.store.list_candidats(secteur).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "candidats": candidats,
    })))
}

/// Imports a candidate CSV; re-imported people keep their ids
pub async fn import_candidats(state: web::Data<AppState>, session: Session, body: web::Bytes) -> Result<HttpResponse> {
    let user = current_user(&session, &state).await?;
    let known = state.store.list_candidats(None).await?;
    let (candidats, report) = load_candidats(&body[..], &known)?;

    for candidat in candidats {
        state.store.upsert_candidat(candidat).await?;
    }
    info!(user = %user.id, imported = report.imported, merged = report.merged, "candidates imported");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "report": report,
    })))
}

pub async fn import_disponibilites(
    state: web::Data<AppState>,
    session: Session,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let user = current_user(&session, &state).await?;
    let candidats = state.store.list_candidats(None).await?;
    let (rows, report) = load_disponibilites(&body[..], &candidats)?;

    for row in rows {
        state.store.upsert_disponibilite(row).await?;
    }
    info!(user = %user.id, imported = report.imported, skipped = report.skipped.len(), "availability imported");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "report": report,
    })))
}

pub async fn upsert_disponibilite(
    state: web::Data<AppState>,
    session: Session,
    req: web::Json<DisponibiliteRequest>,
) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let req = req.into_inner();
    let date = parse_date(&req.date).ok_or_else(|| Error::validation(format!("Invalid date: {}", req.date)))?;
    if state.store.get_candidat(req.candidat_id).await?.is_none() {
        return Err(Error::not_found(format!("candidat {}", req.candidat_id)));
    }

    let dispo = state
        .store
        .upsert_disponibilite(Disponibilite {
            id: Uuid::new_v4(),
            candidat_id: req.candidat_id,
            date,
            secteur: req.secteur,
            statut: req.statut,
            matin: req.dispo_matin,
            soir: req.dispo_soir,
            nuit: req.dispo_nuit,
        })
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "disponibilite": dispo,
    })))
}

pub async fn create_client(
    state: web::Data<AppState>,
    session: Session,
    req: web::Json<ClientRequest>,
) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let req = req.into_inner();
    let name = req.nom.trim();
    if name.is_empty() {
        return Err(Error::validation("Client name is required"));
    }
    if req.secteurs.is_empty() {
        return Err(Error::validation("A client needs at least one sector"));
    }

    let mut client = Client::new(name, req.secteurs);
    client.services = req
        .services
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let client = state.store.insert_client(client).await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "client": client,
    })))
}

pub async fn create_interdiction(
    state: web::Data<AppState>,
    session: Session,
    req: web::Json<InterdictionRequest>,
) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let req = req.into_inner();
    if state.store.get_candidat(req.candidat_id).await?.is_none() {
        return Err(Error::not_found(format!("candidat {}", req.candidat_id)));
    }
    if state.store.get_client(req.client_id).await?.is_none() {
        return Err(Error::not_found(format!("client {}", req.client_id)));
    }

    let flag = state
        .store
        .insert_interdiction(InterdictionPriorite {
            id: Uuid::new_v4(),
            candidat_id: req.candidat_id,
            client_id: req.client_id,
            secteur: req.secteur,
            service: req.service.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            kind: req.kind,
            commentaire: req.commentaire,
        })
        .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "interdiction": flag,
    })))
}

pub async fn create_commande(
    state: web::Data<AppState>,
    session: Session,
    req: web::Json<CommandeRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&session, &state).await?;
    let client = state.store.get_client(req.client_id).await?;
    let commande = validate_commande(&req, client.as_ref())?;
    let commande = state.store.insert_commande(commande).await?;
    info!(user = %user.id, commande = %commande.id, date = %commande.date, "order created");

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "commande": commande,
    })))
}

pub async fn list_commandes(
    state: web::Data<AppState>,
    session: Session,
    query: web::Query<DayQuery>,
) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let date = query.date()?;
    let secteur = query.secteur()?;
    let mut commandes = state.store.list_commandes(date).await?;
    if let Some(secteur) = secteur {
        commandes.retain(|c| c.secteur == secteur);
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "commandes": commandes,
    })))
}

pub async fn quick_candidates(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let outcome = state.assignments.quick_candidates(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "options": outcome.options,
        "excluded": outcome.excluded,
    })))
}

pub async fn assign(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<Uuid>,
    req: web::Json<AssignRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&session, &state).await?;
    let assignment = state
        .assignments
        .assign(path.into_inner(), req.candidat_id, Some(user.id))
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "commande": assignment.commande,
        "planification": assignment.planification,
    })))
}

pub async fn unassign(state: web::Data<AppState>, session: Session, path: web::Path<Uuid>) -> Result<HttpResponse> {
    let user = current_user(&session, &state).await?;
    let commande = state.assignments.unassign(path.into_inner(), Some(user.id)).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "commande": commande,
    })))
}

pub async fn change_status(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<Uuid>,
    req: web::Json<StatutRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&session, &state).await?;
    let req = req.into_inner();
    let motif = req.motif.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());
    let commande = state
        .assignments
        .change_status(path.into_inner(), req.statut, motif, Some(user.id))
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "commande": commande,
    })))
}

pub async fn history(state: web::Data<AppState>, session: Session, path: web::Path<Uuid>) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let entries = state.assignments.history(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "historique": entries,
    })))
}

/// Joins a day's orders with their client and candidate names
pub async fn load_planning(state: &AppState, date: NaiveDate, secteur: Option<Secteur>) -> Result<Vec<PlanningRow>> {
    let mut commandes = state.store.list_commandes(date).await?;
    if let Some(secteur) = secteur {
        commandes.retain(|c| c.secteur == secteur);
    }

    let client_ids: HashSet<Uuid> = commandes.iter().map(|c| c.client_id).collect();
    let mut clients = HashMap::new();
    for id in client_ids {
        match state.store.get_client(id).await? {
            Some(client) => {
                clients.insert(id, client);
            }
            None => warn!(client = %id, "order references a missing client"),
        }
    }

    let candidats = state
        .store
        .list_candidats(None)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    Ok(build_planning(&commandes, &clients, &candidats))
}

pub async fn planning(
    state: web::Data<AppState>,
    session: Session,
    query: web::Query<DayQuery>,
) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let date = query.date()?;
    let rows = load_planning(&state, date, query.secteur()?).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "date": date,
        "planning": rows,
    })))
}

pub async fn planning_export(
    state: web::Data<AppState>,
    session: Session,
    query: web::Query<DayQuery>,
) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let date = query.date()?;
    let rows = load_planning(&state, date, query.secteur()?).await?;

    let mut csv = Vec::new();
    export_planning_csv(&rows, &mut csv)?;
    let filename = format!("planning-{}.csv", date.format("%Y-%m-%d"));
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(("Content-Disposition", format!("attachment; filename=\"{}\"", filename)))
        .body(csv))
}

/// Order counts for a day, per status and per sector
pub async fn stats(state: web::Data<AppState>, session: Session, query: web::Query<DayQuery>) -> Result<HttpResponse> {
    current_user(&session, &state).await?;
    let date = query.date()?;
    let commandes = state.store.list_commandes(date).await?;

    let mut by_status: BTreeMap<&'static str, usize> =
        StatutCommande::ALL.iter().map(|s| (s.label(), 0)).collect();
    let mut by_sector: BTreeMap<&'static str, (usize, usize)> = BTreeMap::new();
    for commande in &commandes {
        *by_status.entry(commande.statut.label()).or_default() += 1;
        let entry = by_sector.entry(commande.secteur.label()).or_default();
        entry.0 += 1;
        if commande.statut == StatutCommande::Valide {
            entry.1 += 1;
        }
    }

    let secteurs: BTreeMap<&str, serde_json::Value> = by_sector
        .into_iter()
        .map(|(label, (total, pourvues))| (label, serde_json::json!({"total": total, "pourvues": pourvues})))
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "date": date,
        "total": commandes.len(),
        "statuts": by_status,
        "secteurs": secteurs,
    })))
}

/// Server-sent events relaying the platform change feed
pub async fn changes(state: web::Data<AppState>, session: Session) -> Result<HttpResponse> {
    let user = current_user(&session, &state).await?;
    let receiver = state.store.subscribe();
    debug!(user = %user.id, "change feed listener attached");

    let events = stream::unfold(receiver, |mut receiver| async move {
        let frame = match receiver.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => format!("event: change\ndata: {}\n\n", json),
                Err(e) => {
                    warn!("could not encode change event: {}", e);
                    "event: resync\ndata: {}\n\n".to_string()
                }
            },
            // Missed events; the client reloads what it displays
            Err(RecvError::Lagged(skipped)) => format!("event: resync\ndata: {{\"skipped\":{}}}\n\n", skipped),
            Err(RecvError::Closed) => return None,
        };
        Some((Ok::<_, Infallible>(web::Bytes::from(frame)), receiver))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events))
}

#[cfg(test)]
mod tests {
    use crate::schedule::types::{Candidat, Commande, DispoStatut, Disponibilite, Secteur};
    use crate::web::test_support::{harness, init_app, sign_in, ADMIN_EMAIL, ADMIN_PASSWORD};
    use crate::platform::Store;
    use actix_web::{http::StatusCode, test};
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
    }

    async fn seed_candidat(store: &dyn Store, first: &str, last: &str) -> Candidat {
        let mut candidat = Candidat::new(first, last, vec![Secteur::Salle]);
        candidat.email = Some(format!("{}@exemple.fr", first.to_lowercase()));
        store.upsert_candidat(candidat).await.unwrap()
    }

    #[actix_web::test]
    async fn order_lifecycle_over_http() {
        let h = harness().await;
        let app = init_app!(h.state.clone());
        let cookie = sign_in!(app, ADMIN_EMAIL, ADMIN_PASSWORD);

        let req = test::TestRequest::post()
            .uri("/api/clients")
            .cookie(cookie.clone())
            .set_json(json!({"nom": "Hôtel du Parc", "secteurs": ["Salle"], "services": ["Petit déjeuner"]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        let client_id = body["client"]["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/commandes")
            .cookie(cookie.clone())
            .set_json(json!({
                "client_id": client_id,
                "date": "14/06/2024",
                "secteur": "salle",
                "service": "petit déjeuner",
                "heure_debut_matin": "07:00",
                "heure_fin_matin": "11:00",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        let commande_id = body["commande"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["commande"]["statut"], "En recherche");

        let lina = seed_candidat(h.store.as_ref(), "Lina", "Morel").await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/commandes/{}/candidats", commande_id))
            .cookie(cookie.clone())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["options"].as_array().unwrap().len(), 1);
        assert_eq!(body["options"][0]["availability"], "non_renseigne");

        let req = test::TestRequest::post()
            .uri(&format!("/api/commandes/{}/assign", commande_id))
            .cookie(cookie.clone())
            .set_json(json!({"candidat_id": lina.id}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["commande"]["statut"], "Validé");

        let req = test::TestRequest::post()
            .uri(&format!("/api/commandes/{}/statut", commande_id))
            .cookie(cookie.clone())
            .set_json(json!({"statut": "Absence", "motif": "pas venue"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["commande"]["statut"], "Absence");
        assert_eq!(body["commande"]["candidat_id"], lina.id.to_string());

        let req = test::TestRequest::get()
            .uri(&format!("/api/commandes/{}/historique", commande_id))
            .cookie(cookie.clone())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["historique"].as_array().unwrap().len(), 2);

        let req = test::TestRequest::get()
            .uri("/api/stats?date=2024-06-14")
            .cookie(cookie)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["statuts"]["Absence"], 1);
        assert_eq!(body["secteurs"]["Salle"]["total"], 1);
    }

    #[actix_web::test]
    async fn double_booking_is_a_conflict() {
        let h = harness().await;
        let app = init_app!(h.state.clone());
        let cookie = sign_in!(app, ADMIN_EMAIL, ADMIN_PASSWORD);

        let client = h
            .store
            .insert_client(crate::schedule::types::Client::new("Abbaye", vec![Secteur::Salle]))
            .await
            .unwrap();
        let horaires = crate::schedule::assign::tests::morning();
        let first = h.store.insert_commande(Commande::new(client.id, day(), Secteur::Salle, horaires.clone())).await.unwrap();
        let second = h.store.insert_commande(Commande::new(client.id, day(), Secteur::Salle, horaires)).await.unwrap();
        let lina = seed_candidat(h.store.as_ref(), "Lina", "Morel").await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/commandes/{}/assign", first.id))
            .cookie(cookie.clone())
            .set_json(json!({"candidat_id": lina.id}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri(&format!("/api/commandes/{}/assign", second.id))
            .cookie(cookie.clone())
            .set_json(json!({"candidat_id": lina.id}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri(&format!("/api/commandes/{}/candidats", second.id))
            .cookie(cookie)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["options"].as_array().unwrap().is_empty());
        assert_eq!(body["excluded"][0]["commande_id"], first.id.to_string());
    }

    #[actix_web::test]
    async fn csv_imports_feed_the_planning_export() {
        let h = harness().await;
        let app = init_app!(h.state.clone());
        let cookie = sign_in!(app, ADMIN_EMAIL, ADMIN_PASSWORD);

        let req = test::TestRequest::post()
            .uri("/api/import/candidats")
            .cookie(cookie.clone())
            .set_payload("Nom,Prénom,Secteurs,Email\nMorel,Lina,Salle,lina@exemple.fr\n,Sans,Salle,\n")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["report"]["imported"], 1);
        assert_eq!(body["report"]["skipped"].as_array().unwrap().len(), 1);

        let req = test::TestRequest::post()
            .uri("/api/import/disponibilites")
            .cookie(cookie.clone())
            .set_payload("email,date,secteur,statut,matin,soir,nuit\nlina@exemple.fr,2024-06-14,Salle,Dispo,oui,non,non\n")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["report"]["imported"], 1);

        let lina = h.store.list_candidats(None).await.unwrap().remove(0);
        let dispos = h.store.list_disponibilites(day(), Secteur::Salle).await.unwrap();
        assert_eq!(
            dispos,
            vec![Disponibilite { id: dispos[0].id, candidat_id: lina.id, date: day(), secteur: Secteur::Salle, statut: DispoStatut::Dispo, matin: true, soir: false, nuit: false }]
        );

        let client = h
            .store
            .insert_client(crate::schedule::types::Client::new("Abbaye", vec![Secteur::Salle]))
            .await
            .unwrap();
        h.store
            .insert_commande(Commande::new(client.id, day(), Secteur::Salle, crate::schedule::assign::tests::morning()))
            .await
            .unwrap();

        let req = test::TestRequest::get()
            .uri("/api/planning/export?date=2024-06-14")
            .cookie(cookie)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(text.starts_with("date,secteur,client"));
        assert!(text.contains("14/06/2024,Salle,Abbaye,,07:00-11:00,En recherche,"));
    }

    #[actix_web::test]
    async fn bad_dates_and_unknown_orders_are_reported() {
        let h = harness().await;
        let app = init_app!(h.state.clone());
        let cookie = sign_in!(app, ADMIN_EMAIL, ADMIN_PASSWORD);

        let req = test::TestRequest::get()
            .uri("/api/planning?date=demain")
            .cookie(cookie.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri(&format!("/api/commandes/{}/candidats", Uuid::new_v4()))
            .cookie(cookie)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
