//! The aggregate outcome of simulating one plan.

use std::io::Write;

use crate::protocol::{Command, Encoder, ProtocolError};

/// Everything a `PRED` response carries, plus a few diagnostics that stay
/// on the engine side.
#[derive(Clone, Debug)]
pub struct Prediction {
    /// Plan cost over the recorded horizon, seeded with today's cost.
    pub final_metric: f64,

    /// Grid import routed into the battery (inside charge windows).
    pub import_kwh_battery: f64,

    /// Grid import consumed by the house.
    pub import_kwh_house: f64,

    pub export_kwh: f64,
    pub soc_min: f64,
    pub final_soc: f64,

    /// Absolute minute at which the minimum SOC was reached.
    pub soc_min_minute: i64,

    /// Total battery throughput in kWh.
    pub final_battery_cycle: f64,

    pub final_metric_keep: f64,
    pub final_iboost_kwh: f64,
    pub final_carbon_g: f64,

    /// SOC before each 5-minute slot of the forecast.
    pub soc_trace: Vec<f64>,

    /// Per-car SOC after the first simulated step.
    pub car_soc_next: Vec<f64>,

    pub iboost_next: f64,
    pub iboost_running: bool,
    pub iboost_running_solar: bool,
    pub iboost_running_full: bool,

    /// Diagnostics, not on the wire:
    pub first_charge_soc: f64,
    pub clipped_kwh: f64,
}

impl Prediction {
    /// Write the `PRED … DONE` response frame.
    pub fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), ProtocolError> {
        encoder.write_command(Command::PRED)?;
        encoder.write_scalar(self.final_metric)?;
        encoder.write_scalar(self.import_kwh_battery)?;
        encoder.write_scalar(self.import_kwh_house)?;
        encoder.write_scalar(self.export_kwh)?;
        encoder.write_scalar(self.soc_min)?;
        encoder.write_scalar(self.final_soc)?;
        // The one raw integer in the bundle:
        encoder.write_int(self.soc_min_minute)?;
        encoder.write_scalar(self.final_battery_cycle)?;
        encoder.write_scalar(self.final_metric_keep)?;
        encoder.write_scalar(self.final_iboost_kwh)?;
        encoder.write_scalar(self.final_carbon_g)?;
        encoder.write_array(&self.soc_trace)?;
        encoder.write_array(&self.car_soc_next)?;
        encoder.write_scalar(self.iboost_next)?;
        encoder.write_bool(self.iboost_running)?;
        encoder.write_bool(self.iboost_running_solar)?;
        encoder.write_bool(self.iboost_running_full)?;
        encoder.write_command(Command::DONE)
    }
}
