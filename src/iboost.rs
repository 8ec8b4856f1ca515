//! iBoost solar-diverter sub-model.
//!
//! The diverter burns surplus or cheap energy for hot water. It runs in
//! two places within a step: as extra household load before dispatch
//! (gas-price, planned and charge-window modes) and as a sink for
//! export-bound PV surplus after dispatch (solar modes).

use crate::{params::IboostParams, rounding::dp3};

/// How often the planner re-runs, in minutes; scales the "next" estimate.
const RUN_EVERY: f64 = 5.0;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Per-prediction mutable diverter state.
#[derive(Clone, Debug)]
pub struct IboostState {
    /// kWh delivered today when the prediction started.
    initial: f64,

    /// Running kWh delivered today; resets at midnight.
    pub today: f64,

    /// Projected total by the planner's next run.
    pub next: f64,

    pub running: bool,
    pub running_solar: bool,
    pub running_full: bool,
}

impl IboostState {
    pub fn new(params: &IboostParams, today: f64) -> Self {
        Self {
            initial: today,
            today,
            next: params.next,
            running: params.running,
            running_solar: params.running_solar,
            running_full: params.running_full,
        }
    }
}

/// Tariffs and window state the diverter decisions depend on.
#[derive(Copy, Clone, Debug, Default)]
pub struct IboostConditions {
    pub import_rate: f64,
    pub export_rate: f64,
    pub gas_rate: f64,
    pub plan_value: f64,
    pub charge_window_active: bool,
    pub export_window_active: bool,
}

pub struct IboostModel<'a> {
    params: &'a IboostParams,
}

impl<'a> IboostModel<'a> {
    pub const fn new(params: &'a IboostParams) -> Self {
        Self { params }
    }

    /// Common gating: enabled, tariffs below the thresholds, budget left,
    /// and not inside an export window unless explicitly allowed there.
    fn gate(&self, state: &IboostState, conditions: &IboostConditions) -> bool {
        self.params.enable
            && (self.params.on_export || !conditions.export_window_active)
            && conditions.import_rate <= self.params.rate_threshold
            && conditions.export_rate <= self.params.rate_threshold_export
            && state.today < self.params.max_energy
    }

    /// Most the diverter may take this step.
    fn budget(&self, state: &IboostState, step: f64) -> f64 {
        (self.params.max_energy - state.today).min(self.params.max_power * step).max(0.0)
    }

    /// Load-side boost in kWh, added to household load before dispatch.
    pub fn load_boost(
        &self,
        state: &IboostState,
        conditions: &IboostConditions,
        step: f64,
    ) -> f64 {
        if !self.gate(state, conditions) {
            return 0.0;
        }
        if self.params.gas {
            // Heat with electricity only while it undercuts gas:
            let gas_rate = conditions.gas_rate * self.params.gas_scale;
            let undercuts = conditions.import_rate <= gas_rate
                || (self.params.gas_export && conditions.export_rate <= gas_rate);
            if undercuts && (conditions.charge_window_active || !self.params.charging) {
                return self.budget(state, step);
            }
        } else if conditions.plan_value > 0.0 {
            return self.budget(state, step);
        } else if self.params.charging && conditions.charge_window_active {
            return self.budget(state, step);
        }
        0.0
    }

    /// Solar diversion in kWh, taken out of the export-bound surplus.
    pub fn solar_divert(
        &self,
        state: &IboostState,
        conditions: &IboostConditions,
        surplus: f64,
        soc_percent: f64,
        battery_headroom: f64,
        step: f64,
    ) -> f64 {
        if !self.params.solar || !self.gate(state, conditions) {
            return 0.0;
        }
        if surplus <= self.params.min_power * step || soc_percent < self.params.min_soc {
            return 0.0;
        }
        if self.params.solar_excess && battery_headroom > 0.0 {
            return 0.0;
        }
        surplus.min(self.budget(state, step))
    }

    /// Accumulate this step's delivery, capture the planner-facing flags on
    /// the first step and reset the daily total at midnight.
    #[expect(clippy::cast_precision_loss)]
    pub fn finish_step(
        &self,
        state: &mut IboostState,
        load_amount: f64,
        solar_amount: f64,
        minute: i64,
        minute_absolute: i64,
        step: i64,
    ) {
        if !self.params.enable {
            return;
        }
        let amount = load_amount + solar_amount;
        state.today += amount;
        state.running_full = state.today >= self.params.max_energy;
        if minute == 0 {
            state.next = dp3(state.initial + amount / step as f64 * RUN_EVERY);
            state.running = amount > 0.0;
            state.running_solar = solar_amount > 0.0;
        }
        if minute_absolute % MINUTES_PER_DAY == MINUTES_PER_DAY - step {
            state.today = 0.0;
        }
    }
}
