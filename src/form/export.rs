use csv::WriterBuilder;
use std::io::Write;

use crate::display::PlanningRow;
use crate::error::Result;

/// Writes planning rows as CSV with a header line
pub fn export_planning_csv<W: Write>(rows: &[PlanningRow], writer: W) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(["date", "secteur", "client", "service", "horaires", "statut", "candidat"])?;

    for row in rows {
        let date = row.date.format("%d/%m/%Y").to_string();
        wtr.write_record([
            date.as_str(),
            row.secteur.label(),
            row.client.as_str(),
            row.service.as_deref().unwrap_or(""),
            row.horaires.as_str(),
            row.statut.label(),
            row.candidat.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
