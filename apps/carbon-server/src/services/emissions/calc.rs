/// Grid emission factor, kilograms of CO2-equivalent per kilowatt-hour.
pub const EMISSION_FACTOR_KG_PER_KWH: f64 = 0.4;

const WATTS_PER_KILOWATT: f64 = 1000.0;

pub fn kilowatt_hours(power_watts: f64, usage_hours: f64) -> f64 {
    power_watts * usage_hours / WATTS_PER_KILOWATT
}

/// Unrounded kg CO2e for one usage record.
pub fn emission(power_watts: f64, usage_hours: f64) -> f64 {
    kilowatt_hours(power_watts, usage_hours) * EMISSION_FACTOR_KG_PER_KWH
}

/// Rounds to three decimal places. Only applied to finished totals.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
