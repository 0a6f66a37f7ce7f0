pub mod commande;
pub mod export;

pub use commande::{validate_commande, CommandeRequest};
pub use export::export_planning_csv;
