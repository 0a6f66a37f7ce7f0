use thiserror::Error;

use super::types::StatutCommande;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Order is already {0}")]
    Unchanged(StatutCommande),
    #[error("Cannot move an order from {from} to {to}")]
    Forbidden { from: StatutCommande, to: StatutCommande },
    #[error("{0} orders are closed")]
    Terminal(StatutCommande),
    #[error("Use the assignment endpoint to validate an order")]
    AssignmentRequired,
}

/// What a status change does to the order's assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentEffect {
    None,
    /// Delete the assignment row and clear the candidate reference
    Release,
    /// Delete the assignment row but keep the candidate on the order
    Close,
}

impl StatutCommande {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StatutCommande::Absence
                | StatutCommande::AnnuleClient
                | StatutCommande::AnnuleInterimaire
                | StatutCommande::AnnuleAgence
        )
    }

    pub fn is_cancellation(self) -> bool {
        matches!(
            self,
            StatutCommande::AnnuleClient | StatutCommande::AnnuleInterimaire | StatutCommande::AnnuleAgence
        )
    }

    pub fn can_transition_to(self, next: StatutCommande) -> bool {
        use StatutCommande::*;
        if next.is_cancellation() {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (EnRecherche, Valide) | (EnRecherche, NonPourvue) | (Valide, EnRecherche) | (Valide, Absence) | (NonPourvue, EnRecherche)
        )
    }
}

/// Checks a status change and reports what it does to the assignment
pub fn transition(from: StatutCommande, to: StatutCommande) -> Result<AssignmentEffect, TransitionError> {
    if from == to {
        return Err(TransitionError::Unchanged(from));
    }
    if from.is_terminal() {
        return Err(TransitionError::Terminal(from));
    }
    if !from.can_transition_to(to) {
        return Err(TransitionError::Forbidden { from, to });
    }
    Ok(match (from, to) {
        (StatutCommande::Valide, StatutCommande::EnRecherche) => AssignmentEffect::Release,
        (StatutCommande::Valide, _) => AssignmentEffect::Close,
        _ => AssignmentEffect::None,
    })
}

/// Status change requested directly by staff; validation goes through assignment
pub fn manual_transition(from: StatutCommande, to: StatutCommande) -> Result<AssignmentEffect, TransitionError> {
    if to == StatutCommande::Valide && from != StatutCommande::Valide {
        return Err(TransitionError::AssignmentRequired);
    }
    transition(from, to)
}
