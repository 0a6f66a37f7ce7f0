pub mod types;
pub mod creneau;
pub mod filter;
pub mod workflow;
pub mod assign;

pub use assign::{Assignment, AssignmentService};
pub use creneau::{Horaires, Slot, TimeWindow};
pub use filter::{filter_candidates, Availability, CandidateOption, FilterInputs, FilterOutcome};
pub use workflow::{manual_transition, transition, AssignmentEffect, TransitionError};
