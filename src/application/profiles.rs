//! Read-only access to printer, filament and billing records.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::jobs::PrintMetadata;
use crate::domain::profiles::{BillingSettings, CostBreakdown, FilamentProfile, PrinterProfile};

use super::cost::estimate_cost;

#[derive(Debug, Error)]
pub enum ProfileStoreError {
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid profile data: {message}")]
    Invalid { message: String },
}

impl ProfileStoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Profile lookups. Implementations never mutate the records they return.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn printer(&self, id: i64) -> Result<Option<PrinterProfile>, ProfileStoreError>;

    async fn filament(&self, id: i64) -> Result<Option<FilamentProfile>, ProfileStoreError>;

    async fn billing(&self) -> Result<BillingSettings, ProfileStoreError>;
}

/// Look up the referenced profiles and price a sliced job.
///
/// Returns `Ok(None)` when either reference is absent or does not resolve, or when
/// the metadata cannot be priced.
pub async fn estimate_job_cost<S>(
    store: &S,
    printer_id: Option<i64>,
    filament_id: Option<i64>,
    metadata: &PrintMetadata,
) -> Result<Option<CostBreakdown>, ProfileStoreError>
where
    S: ProfileStore + ?Sized,
{
    let printer = match printer_id {
        Some(id) => store.printer(id).await?,
        None => None,
    };
    let filament = match filament_id {
        Some(id) => store.filament(id).await?,
        None => None,
    };
    let billing = store.billing().await?;

    Ok(estimate_cost(
        &metadata.filament_used,
        &metadata.estimated_time,
        filament.as_ref(),
        printer.as_ref(),
        &billing,
    ))
}
