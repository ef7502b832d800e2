//! Print cost estimation from slicer metadata and stored profiles. No I/O.

use std::f64::consts::PI;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::profiles::{BillingSettings, CostBreakdown, FilamentProfile, PrinterProfile};

static DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)d").expect("valid regex"));
static HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)h").expect("valid regex"));
static MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)m").expect("valid regex"));
static SECONDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)s").expect("valid regex"));

/// Convert a free-form `"7h 55m 57s"` duration into fractional hours.
///
/// Each unit that is present contributes; absent or unparsable units count as zero.
pub fn parse_print_hours(value: &str) -> f64 {
    let component = |pattern: &Regex| -> f64 {
        pattern
            .captures(value)
            .and_then(|captures| captures.get(1))
            .and_then(|digits| digits.as_str().parse::<u64>().ok())
            .map(|amount| amount as f64)
            .unwrap_or(0.0)
    };

    component(&DAYS) * 24.0
        + component(&HOURS)
        + component(&MINUTES) / 60.0
        + component(&SECONDS) / 3600.0
}

/// Parse a filament length such as `"1234.5mm"`.
pub fn parse_filament_length_mm(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let digits = trimmed.strip_suffix("mm").unwrap_or(trimmed).trim();
    digits
        .parse::<f64>()
        .ok()
        .filter(|length| length.is_finite() && *length >= 0.0)
}

/// Price a print. Returns `None` when a profile is missing or the filament length
/// cannot be read.
pub fn estimate_cost(
    filament_used: &str,
    estimated_time: &str,
    filament: Option<&FilamentProfile>,
    printer: Option<&PrinterProfile>,
    billing: &BillingSettings,
) -> Option<CostBreakdown> {
    let (filament, printer) = (filament?, printer?);
    let length_mm = parse_filament_length_mm(filament_used)?;
    let hours = parse_print_hours(estimated_time);

    let radius_mm = filament.diameter_mm / 2.0;
    let volume_cm3 = length_mm * PI * radius_mm * radius_mm / 1000.0;
    let mass_g = volume_cm3 * filament.density_g_per_cm3;
    let material = mass_g * (filament.cost_per_kg / 1000.0);

    let energy_kwh = (printer.power_watts / 1000.0) * hours;
    let electricity = energy_kwh * billing.electricity_cost_per_kwh;

    let net = material + electricity;
    let vat = net * (billing.vat_rate_percent / 100.0);
    let gross = net + vat;

    Some(CostBreakdown {
        material: money(material),
        electricity: money(electricity),
        net: money(net),
        vat: money(vat),
        gross: money(gross),
        currency: billing.currency_symbol.clone(),
    })
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}
