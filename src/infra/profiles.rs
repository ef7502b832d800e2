//! Profile store backed by a TOML document.
//!
//! ```toml
//! [billing]
//! electricity_cost_per_kwh = 0.15
//! vat_rate_percent = 20.0
//! currency_symbol = "$"
//!
//! [[printers]]
//! id = 1
//! name = "MK4"
//! power_watts = 200.0
//!
//! [[filaments]]
//! id = 1
//! name = "PLA"
//! density_g_per_cm3 = 1.24
//! cost_per_kg = 20.0
//! diameter_mm = 1.75
//! ```

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::application::profiles::{ProfileStore, ProfileStoreError};
use crate::domain::profiles::{BillingSettings, FilamentProfile, PrinterProfile};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileDocument {
    billing: BillingSettings,
    printers: Vec<PrinterProfile>,
    filaments: Vec<FilamentProfile>,
}

/// Immutable in-memory profile records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileStore {
    printers: HashMap<i64, PrinterProfile>,
    filaments: HashMap<i64, FilamentProfile>,
    billing: BillingSettings,
}

impl InMemoryProfileStore {
    pub fn new(
        printers: Vec<PrinterProfile>,
        filaments: Vec<FilamentProfile>,
        billing: BillingSettings,
    ) -> Result<Self, ProfileStoreError> {
        billing
            .validate()
            .map_err(|err| ProfileStoreError::invalid(err.to_string()))?;

        let mut printer_map = HashMap::with_capacity(printers.len());
        for printer in printers {
            printer
                .validate()
                .map_err(|err| ProfileStoreError::invalid(err.to_string()))?;
            if printer_map.insert(printer.id, printer).is_some() {
                return Err(ProfileStoreError::invalid("duplicate printer id"));
            }
        }

        let mut filament_map = HashMap::with_capacity(filaments.len());
        for filament in filaments {
            filament
                .validate()
                .map_err(|err| ProfileStoreError::invalid(err.to_string()))?;
            if filament_map.insert(filament.id, filament).is_some() {
                return Err(ProfileStoreError::invalid("duplicate filament id"));
            }
        }

        Ok(Self {
            printers: printer_map,
            filaments: filament_map,
            billing,
        })
    }

    /// Parse a TOML profile document.
    pub fn from_toml(document: &str) -> Result<Self, ProfileStoreError> {
        let parsed: ProfileDocument = toml::from_str(document)
            .map_err(|err| ProfileStoreError::invalid(format!("failed to parse profiles: {err}")))?;
        Self::new(parsed.printers, parsed.filaments, parsed.billing)
    }

    /// Read and parse a TOML profile file.
    pub async fn load(path: &Path) -> Result<Self, ProfileStoreError> {
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| ProfileStoreError::unavailable(format!("{}: {err}", path.display())))?;
        let store = Self::from_toml(&data)?;
        info!(
            target = "infra::profiles",
            path = %path.display(),
            printers = store.printers.len(),
            filaments = store.filaments.len(),
            "Profile store loaded"
        );
        Ok(store)
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn printer(&self, id: i64) -> Result<Option<PrinterProfile>, ProfileStoreError> {
        Ok(self.printers.get(&id).cloned())
    }

    async fn filament(&self, id: i64) -> Result<Option<FilamentProfile>, ProfileStoreError> {
        Ok(self.filaments.get(&id).cloned())
    }

    async fn billing(&self) -> Result<BillingSettings, ProfileStoreError> {
        Ok(self.billing.clone())
    }
}
