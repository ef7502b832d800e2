//! Printer, filament and billing records consumed by cost estimation.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

pub const DEFAULT_ELECTRICITY_COST_PER_KWH: f64 = 0.15;
pub const DEFAULT_VAT_RATE_PERCENT: f64 = 20.0;
pub const DEFAULT_CURRENCY_SYMBOL: &str = "$";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterProfile {
    pub id: i64,
    pub name: String,
    pub power_watts: f64,
    /// Slicer configuration text used instead of the default config file.
    #[serde(default)]
    pub slice_config_override: Option<String>,
}

impl PrinterProfile {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(self.power_watts.is_finite() && self.power_watts > 0.0) {
            return Err(DomainError::validation(format!(
                "printer `{}` power_watts must be greater than zero",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentProfile {
    pub id: i64,
    pub name: String,
    pub density_g_per_cm3: f64,
    pub cost_per_kg: f64,
    pub diameter_mm: f64,
}

impl FilamentProfile {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(self.density_g_per_cm3.is_finite() && self.density_g_per_cm3 > 0.0) {
            return Err(DomainError::validation(format!(
                "filament `{}` density must be greater than zero",
                self.name
            )));
        }
        if !(self.cost_per_kg.is_finite() && self.cost_per_kg >= 0.0) {
            return Err(DomainError::validation(format!(
                "filament `{}` cost_per_kg must not be negative",
                self.name
            )));
        }
        if !(self.diameter_mm.is_finite() && self.diameter_mm > 0.0) {
            return Err(DomainError::validation(format!(
                "filament `{}` diameter must be greater than zero",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    pub electricity_cost_per_kwh: f64,
    pub vat_rate_percent: f64,
    pub currency_symbol: String,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            electricity_cost_per_kwh: DEFAULT_ELECTRICITY_COST_PER_KWH,
            vat_rate_percent: DEFAULT_VAT_RATE_PERCENT,
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
        }
    }
}

impl BillingSettings {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(self.electricity_cost_per_kwh.is_finite() && self.electricity_cost_per_kwh >= 0.0) {
            return Err(DomainError::validation(
                "electricity_cost_per_kwh must not be negative",
            ));
        }
        if !(self.vat_rate_percent.is_finite() && self.vat_rate_percent >= 0.0) {
            return Err(DomainError::validation("vat_rate_percent must not be negative"));
        }
        Ok(())
    }
}

/// Monetary amounts formatted with two decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub material: String,
    pub electricity: String,
    pub net: String,
    pub vat: String,
    pub gross: String,
    pub currency: String,
}
