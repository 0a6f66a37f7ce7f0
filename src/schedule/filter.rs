use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use super::creneau::{Horaires, Slot};
use super::types::{
    Candidat, Commande, DispoStatut, Disponibilite, InterdictionKind, InterdictionPriorite,
    Planification,
};

/// What a candidate's availability row says about the requested slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Disponible,
    Partielle,
    NonRenseigne,
    Indisponible,
}

/// An eligible candidate with its advisory badges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateOption {
    pub candidat: Candidat,
    pub availability: Availability,
    pub vehicule: bool,
    pub interdit: bool,
    pub prioritaire: bool,
    pub deja_travaille: bool,
}

/// A candidate removed from the list because they are already booked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub candidat_id: Uuid,
    pub commande_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOutcome {
    pub options: Vec<CandidateOption>,
    pub excluded: Vec<Exclusion>,
}

/// Rows fetched for one order, borrowed by the filter
#[derive(Debug, Clone, Copy)]
pub struct FilterInputs<'a> {
    pub candidats: &'a [Candidat],
    /// Availability rows for the order's date and sector
    pub disponibilites: &'a [Disponibilite],
    /// Assignment rows for the order's date, all sectors
    pub planifications: &'a [Planification],
    /// Interdiction and priority rows for the order's client
    pub interdictions: &'a [InterdictionPriorite],
    /// Past assignments at the order's client
    pub history: &'a [Planification],
}

/// Resolves a candidate's availability for the requested slots.
/// No row, or a row left unset, is `NonRenseigne`.
pub fn resolve_availability(row: Option<&Disponibilite>, requested: &BTreeSet<Slot>) -> Availability {
    let Some(row) = row else {
        return Availability::NonRenseigne;
    };
    match row.statut {
        DispoStatut::NonRenseigne => Availability::NonRenseigne,
        DispoStatut::NonDispo => Availability::Indisponible,
        DispoStatut::Dispo => {
            // A "Dispo" row without any sub-flag means the whole day
            if !row.matin && !row.soir && !row.nuit {
                return Availability::Disponible;
            }
            let covered = requested
                .iter()
                .filter(|slot| match slot {
                    Slot::Matin => row.matin,
                    Slot::Soir => row.soir,
                    Slot::Nuit => row.nuit,
                })
                .count();
            if covered == requested.len() {
                Availability::Disponible
            } else if covered == 0 {
                Availability::Indisponible
            } else {
                Availability::Partielle
            }
        }
    }
}

/// Returns the assignment that double-books `candidat_id` against `requested`, if any
pub fn find_conflict<'a>(
    candidat_id: Uuid,
    commande: &Commande,
    requested: &Horaires,
    planifications: &'a [Planification],
) -> Option<&'a Planification> {
    planifications.iter().find(|p| {
        p.candidat_id == candidat_id
            && p.date == commande.date
            && p.commande_id != commande.id
            && p.horaires.conflicts_with(requested)
    })
}

/// Filters and annotates candidates for `commande`.
///
/// Only double-booking excludes a candidate; availability, interdiction and
/// priority are advisory and surface as badges.
pub fn filter_candidates(commande: &Commande, inputs: FilterInputs<'_>) -> FilterOutcome {
    let requested = commande.horaires.slots();

    let dispo_by_candidat: HashMap<Uuid, &Disponibilite> = inputs
        .disponibilites
        .iter()
        .filter(|d| d.date == commande.date && d.secteur == commande.secteur)
        .map(|d| (d.candidat_id, d))
        .collect();

    let mut interdits = HashSet::new();
    let mut prioritaires = HashSet::new();
    for flag in inputs.interdictions {
        if !flag.applies_to(commande.client_id, commande.secteur, commande.service.as_deref()) {
            continue;
        }
        match flag.kind {
            InterdictionKind::Interdiction => interdits.insert(flag.candidat_id),
            InterdictionKind::Priorite => prioritaires.insert(flag.candidat_id),
        };
    }

    let worked_here: HashSet<Uuid> = inputs
        .history
        .iter()
        .filter(|p| p.client_id == commande.client_id && p.commande_id != commande.id && p.date < commande.date)
        .map(|p| p.candidat_id)
        .collect();

    let mut outcome = FilterOutcome::default();
    for candidat in inputs.candidats {
        if !candidat.is_qualified_for(commande.secteur) {
            continue;
        }

        if let Some(conflict) = find_conflict(candidat.id, commande, &commande.horaires, inputs.planifications) {
            outcome.excluded.push(Exclusion {
                candidat_id: candidat.id,
                commande_id: conflict.commande_id,
            });
            continue;
        }

        let interdit = interdits.contains(&candidat.id);
        outcome.options.push(CandidateOption {
            candidat: candidat.clone(),
            availability: resolve_availability(dispo_by_candidat.get(&candidat.id).copied(), &requested),
            vehicule: candidat.vehicule,
            interdit,
            // An interdiction outranks a priority on the same client
            prioritaire: !interdit && prioritaires.contains(&candidat.id),
            deja_travaille: worked_here.contains(&candidat.id),
        });
    }

    outcome.options.sort_by(compare_options);
    outcome
}

fn band(option: &CandidateOption) -> u8 {
    if option.prioritaire {
        0
    } else if option.interdit {
        2
    } else {
        1
    }
}

fn compare_options(a: &CandidateOption, b: &CandidateOption) -> Ordering {
    band(a)
        .cmp(&band(b))
        .then(a.availability.cmp(&b.availability))
        .then(b.deja_travaille.cmp(&a.deja_travaille))
        .then_with(|| a.candidat.last_name.to_lowercase().cmp(&b.candidat.last_name.to_lowercase()))
        .then_with(|| a.candidat.first_name.to_lowercase().cmp(&b.candidat.first_name.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::creneau::{parse_time, TimeWindow};
    use crate::schedule::types::Secteur;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn w(start: &str, end: &str) -> TimeWindow {
        TimeWindow::new(parse_time(start).unwrap(), parse_time(end).unwrap())
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
    }

    fn order(horaires: Horaires) -> Commande {
        Commande::new(Uuid::new_v4(), date(), Secteur::Salle, horaires)
    }

    fn booked(candidat: &Candidat, client_id: Uuid, horaires: Horaires) -> Planification {
        let other = Commande::new(client_id, date(), Secteur::Salle, horaires);
        Planification::for_commande(&other, candidat.id)
    }

    fn dispo(candidat: &Candidat, statut: DispoStatut, matin: bool, soir: bool) -> Disponibilite {
        Disponibilite {
            id: Uuid::new_v4(),
            candidat_id: candidat.id,
            date: date(),
            secteur: Secteur::Salle,
            statut,
            matin,
            soir,
            nuit: false,
        }
    }

    fn flag(candidat: &Candidat, client_id: Uuid, kind: InterdictionKind) -> InterdictionPriorite {
        InterdictionPriorite {
            id: Uuid::new_v4(),
            candidat_id: candidat.id,
            client_id,
            secteur: None,
            service: None,
            kind,
            commentaire: None,
        }
    }

    fn inputs<'a>(
        candidats: &'a [Candidat],
        disponibilites: &'a [Disponibilite],
        planifications: &'a [Planification],
        interdictions: &'a [InterdictionPriorite],
    ) -> FilterInputs<'a> {
        FilterInputs { candidats, disponibilites, planifications, interdictions, history: &[] }
    }

    #[test]
    fn morning_booking_excludes_candidate_from_morning_order() {
        let commande = order(Horaires::matin(w("07:00", "11:00")));
        let busy = Candidat::new("Lina", "Morel", vec![Secteur::Salle]);
        let planifs = vec![booked(&busy, Uuid::new_v4(), Horaires::matin(w("08:00", "12:00")))];
        let candidats = vec![busy.clone()];

        let outcome = filter_candidates(&commande, inputs(&candidats, &[], &planifs, &[]));
        assert!(outcome.options.is_empty());
        assert_eq!(outcome.excluded.len(), 1);
        assert_eq!(outcome.excluded[0].candidat_id, busy.id);
    }

    #[test]
    fn evening_booking_leaves_morning_order_open() {
        let commande = order(Horaires::matin(w("07:00", "11:00")));
        let c = Candidat::new("Lina", "Morel", vec![Secteur::Salle]);
        let planifs = vec![booked(&c, Uuid::new_v4(), Horaires::soir(w("18:00", "22:00")))];
        let candidats = vec![c];

        let outcome = filter_candidates(&commande, inputs(&candidats, &[], &planifs, &[]));
        assert_eq!(outcome.options.len(), 1);
        assert!(outcome.excluded.is_empty());
    }

    #[test]
    fn own_assignment_is_not_a_conflict() {
        let commande = order(Horaires::matin(w("07:00", "11:00")));
        let c = Candidat::new("Lina", "Morel", vec![Secteur::Salle]);
        let planifs = vec![Planification::for_commande(&commande, c.id)];
        let candidats = vec![c];

        let outcome = filter_candidates(&commande, inputs(&candidats, &[], &planifs, &[]));
        assert_eq!(outcome.options.len(), 1);
    }

    #[test]
    fn inactive_and_unqualified_candidates_are_skipped() {
        let commande = order(Horaires::default());
        let mut inactive = Candidat::new("Paul", "Roux", vec![Secteur::Salle]);
        inactive.actif = false;
        let cook = Candidat::new("Ana", "Diaz", vec![Secteur::Cuisine]);
        let candidats = vec![inactive, cook];

        let outcome = filter_candidates(&commande, inputs(&candidats, &[], &[], &[]));
        assert!(outcome.options.is_empty());
        assert!(outcome.excluded.is_empty());
    }

    #[test]
    fn missing_rows_mean_not_declared_but_eligible() {
        let commande = order(Horaires::matin(w("07:00", "11:00")));
        let candidats = vec![Candidat::new("Lina", "Morel", vec![Secteur::Salle])];

        let outcome = filter_candidates(&commande, inputs(&candidats, &[], &[], &[]));
        assert_eq!(outcome.options.len(), 1);
        assert_eq!(outcome.options[0].availability, Availability::NonRenseigne);
    }

    #[test]
    fn morning_order_with_interdicted_and_available_candidates() {
        let client = Uuid::new_v4();
        let mut commande = order(Horaires::matin(w("07:00", "11:00")));
        commande.client_id = client;
        let banned = Candidat::new("Marc", "Blanc", vec![Secteur::Salle]);
        let mut free = Candidat::new("Sofia", "Arnaud", vec![Secteur::Salle]);
        free.vehicule = true;
        let dispos = vec![dispo(&free, DispoStatut::Dispo, true, false)];
        let flags = vec![flag(&banned, client, InterdictionKind::Interdiction)];
        let candidats = vec![banned.clone(), free.clone()];

        let outcome = filter_candidates(&commande, inputs(&candidats, &dispos, &[], &flags));
        assert_eq!(outcome.options.len(), 2);

        let first = &outcome.options[0];
        assert_eq!(first.candidat.id, free.id);
        assert_eq!(first.availability, Availability::Disponible);
        assert!(first.vehicule);
        assert!(!first.interdit);

        let second = &outcome.options[1];
        assert_eq!(second.candidat.id, banned.id);
        assert!(second.interdit);
        assert_eq!(second.availability, Availability::NonRenseigne);
    }

    #[test]
    fn partial_and_unavailable_rows() {
        let commande = order(Horaires::coupure(w("07:00", "11:00"), w("18:00", "22:00")));
        let half = Candidat::new("A", "Alpha", vec![Secteur::Salle]);
        let none = Candidat::new("B", "Bravo", vec![Secteur::Salle]);
        let whole = Candidat::new("C", "Charlie", vec![Secteur::Salle]);
        let dispos = vec![
            dispo(&half, DispoStatut::Dispo, true, false),
            dispo(&none, DispoStatut::NonDispo, false, false),
            dispo(&whole, DispoStatut::Dispo, false, false),
        ];
        let candidats = vec![none.clone(), half.clone(), whole.clone()];

        let outcome = filter_candidates(&commande, inputs(&candidats, &dispos, &[], &[]));
        let order: Vec<(Uuid, Availability)> =
            outcome.options.iter().map(|o| (o.candidat.id, o.availability)).collect();
        assert_eq!(
            order,
            vec![
                (whole.id, Availability::Disponible),
                (half.id, Availability::Partielle),
                (none.id, Availability::Indisponible),
            ]
        );
    }

    #[test]
    fn priority_candidates_come_first_and_worked_here_breaks_ties() {
        let client = Uuid::new_v4();
        let mut commande = order(Horaires::soir(w("18:00", "22:00")));
        commande.client_id = client;
        let regular = Candidat::new("A", "Aubert", vec![Secteur::Salle]);
        let veteran = Candidat::new("B", "Bertin", vec![Secteur::Salle]);
        let favourite = Candidat::new("Z", "Zola", vec![Secteur::Salle]);
        let flags = vec![flag(&favourite, client, InterdictionKind::Priorite)];
        let mut past = booked(&veteran, client, Horaires::soir(w("18:00", "22:00")));
        past.date = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let history = vec![past];
        let candidats = vec![regular.clone(), veteran.clone(), favourite.clone()];

        let outcome = filter_candidates(
            &commande,
            FilterInputs {
                candidats: &candidats,
                disponibilites: &[],
                planifications: &[],
                interdictions: &flags,
                history: &history,
            },
        );
        let ids: Vec<Uuid> = outcome.options.iter().map(|o| o.candidat.id).collect();
        assert_eq!(ids, vec![favourite.id, veteran.id, regular.id]);
        assert!(outcome.options[0].prioritaire);
        assert!(outcome.options[1].deja_travaille);
    }

    #[test]
    fn future_booking_at_client_is_not_past_work() {
        let client = Uuid::new_v4();
        let mut commande = order(Horaires::matin(w("07:00", "11:00")));
        commande.client_id = client;
        let c = Candidat::new("Lina", "Morel", vec![Secteur::Salle]);
        let mut next_month = booked(&c, client, Horaires::matin(w("07:00", "11:00")));
        next_month.date = NaiveDate::from_ymd_opt(2024, 7, 14).unwrap();
        let same_day = booked(&c, client, Horaires::soir(w("18:00", "22:00")));
        let history = vec![next_month, same_day];
        let candidats = vec![c];

        let outcome = filter_candidates(
            &commande,
            FilterInputs {
                candidats: &candidats,
                disponibilites: &[],
                planifications: &[],
                interdictions: &[],
                history: &history,
            },
        );
        assert_eq!(outcome.options.len(), 1);
        assert!(!outcome.options[0].deja_travaille);
    }

    #[test]
    fn interdiction_for_other_service_does_not_apply() {
        let client = Uuid::new_v4();
        let mut commande = order(Horaires::default());
        commande.client_id = client;
        commande.service = Some("Banquets".to_string());
        let c = Candidat::new("A", "Aubert", vec![Secteur::Salle]);
        let mut scoped = flag(&c, client, InterdictionKind::Interdiction);
        scoped.service = Some("Restaurant".to_string());
        let candidats = vec![c];
        let flags = vec![scoped];

        let outcome = filter_candidates(&commande, inputs(&candidats, &[], &[], &flags));
        assert!(!outcome.options[0].interdit);
    }

    fn arb_slots() -> impl Strategy<Value = (bool, bool, bool)> {
        (any::<bool>(), any::<bool>(), any::<bool>())
    }

    fn horaires_from((m, s, n): (bool, bool, bool)) -> Horaires {
        Horaires {
            matin: m.then(|| w("07:00", "11:00")),
            soir: s.then(|| w("18:00", "22:00")),
            nuit: n.then(|| w("22:00", "06:00")),
        }
    }

    fn arb_dispo_statut() -> impl Strategy<Value = Option<DispoStatut>> {
        prop_oneof![
            Just(None),
            Just(Some(DispoStatut::Dispo)),
            Just(Some(DispoStatut::NonDispo)),
            Just(Some(DispoStatut::NonRenseigne)),
        ]
    }

    proptest! {
        #[test]
        fn overlapping_morning_booking_always_excludes(
            other in arb_slots(),
            statut in arb_dispo_statut(),
            interdit in any::<bool>(),
        ) {
            let client = Uuid::new_v4();
            let mut commande = order(Horaires::matin(w("07:00", "11:00")));
            commande.client_id = client;
            let c = Candidat::new("Lina", "Morel", vec![Secteur::Salle]);
            let (_, soir, nuit) = other;
            let planifs = vec![booked(&c, Uuid::new_v4(), horaires_from((true, soir, nuit)))];
            let dispos: Vec<Disponibilite> =
                statut.map(|s| dispo(&c, s, true, true)).into_iter().collect();
            let flags: Vec<InterdictionPriorite> = interdit
                .then(|| flag(&c, client, InterdictionKind::Interdiction))
                .into_iter()
                .collect();
            let candidats = vec![c.clone()];

            let outcome = filter_candidates(&commande, inputs(&candidats, &dispos, &planifs, &flags));
            prop_assert!(outcome.options.is_empty());
            prop_assert_eq!(outcome.excluded.len(), 1);
        }

        #[test]
        fn interdiction_is_surfaced_whatever_the_availability(
            requested in arb_slots(),
            statut in arb_dispo_statut(),
            matin in any::<bool>(),
            soir in any::<bool>(),
        ) {
            let client = Uuid::new_v4();
            let mut commande = order(horaires_from(requested));
            commande.client_id = client;
            let c = Candidat::new("Marc", "Blanc", vec![Secteur::Salle]);
            let dispos: Vec<Disponibilite> =
                statut.map(|s| dispo(&c, s, matin, soir)).into_iter().collect();
            let flags = vec![flag(&c, client, InterdictionKind::Interdiction)];
            let candidats = vec![c.clone()];

            let outcome = filter_candidates(&commande, inputs(&candidats, &dispos, &[], &flags));
            prop_assert_eq!(outcome.options.len(), 1);
            prop_assert!(outcome.options[0].interdit);
        }

        #[test]
        fn no_rows_means_included(requested in arb_slots()) {
            let commande = order(horaires_from(requested));
            let candidats = vec![Candidat::new("A", "Aubert", vec![Secteur::Salle])];
            let outcome = filter_candidates(&commande, inputs(&candidats, &[], &[], &[]));
            prop_assert_eq!(outcome.options.len(), 1);
            prop_assert_eq!(outcome.options[0].availability, Availability::NonRenseigne);
        }
    }
}
