// CSV export of the AI-system inventory with each system's latest tier.

use std::io::Write;

use chrono::SecondsFormat;
use serde::Serialize;

use aiact_core::{AppError, AppResult};

use crate::service::AnalysisService;

#[derive(Debug, Serialize)]
struct InventoryRow<'a> {
    name: &'a str,
    id: &'a str,
    sector: &'a str,
    risk_level: &'a str,
    compliance_score: Option<u8>,
    assessed_at: Option<String>,
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::Internal(format!("CSV export failed: {e}"))
}

impl AnalysisService {
    /// Write one row per registered system, ordered by name. Systems never
    /// assessed get empty risk columns. Returns the number of rows written.
    pub fn export_inventory_csv<W: Write>(&self, writer: W) -> AppResult<usize> {
        let systems = self.db().list_systems()?;
        let mut wtr = csv::Writer::from_writer(writer);

        for system in &systems {
            let latest = self.db().latest_assessment(&system.id)?;
            wtr.serialize(InventoryRow {
                name: &system.name,
                id: &system.id,
                sector: system.sector.as_deref().unwrap_or(""),
                risk_level: latest.as_ref().map(|a| a.risk_level.as_str()).unwrap_or(""),
                compliance_score: latest.as_ref().map(|a| a.compliance_score),
                assessed_at: latest
                    .as_ref()
                    .map(|a| a.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            })
            .map_err(csv_error)?;
        }

        if systems.is_empty() {
            // serialize() writes the header with the first row only.
            wtr.write_record([
                "name",
                "id",
                "sector",
                "risk_level",
                "compliance_score",
                "assessed_at",
            ])
            .map_err(csv_error)?;
        }

        wtr.flush()
            .map_err(|e| AppError::Internal(format!("CSV export failed: {e}")))?;
        Ok(systems.len())
    }
}
