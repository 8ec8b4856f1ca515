//! Car-charging sub-model.
//!
//! Cars follow per-car minute series of planned draw (kW). Charging adds
//! household load; a car configured to charge from the grid only freezes
//! battery discharge while it draws.

use crate::{params::CarParams, rounding::dp3};

/// Per-prediction mutable car state.
#[derive(Clone, Debug)]
pub struct CarState {
    /// Current per-car SOC in kWh.
    pub soc: Vec<f64>,
}

impl CarState {
    pub fn new(params: &CarParams) -> Self {
        Self { soc: params.soc.clone() }
    }
}

/// What one simulation step of car charging did.
#[derive(Copy, Clone, Debug, Default)]
pub struct CarStep {
    /// Extra household load in kWh, measured before the charging loss.
    pub load: f64,

    /// The battery must not back-fill a grid-only charger.
    pub freeze_discharge: bool,
}

pub struct CarModel<'a> {
    params: &'a CarParams,
}

impl<'a> CarModel<'a> {
    pub const fn new(params: &'a CarParams) -> Self {
        Self { params }
    }

    /// Advance every car by one step of `step` minutes.
    #[expect(clippy::cast_precision_loss)]
    pub fn step(&self, state: &mut CarState, absolute_index: usize, step: i64) -> CarStep {
        let mut outcome = CarStep::default();
        for (car, soc) in state.soc.iter_mut().enumerate() {
            let draw_kw = self.params.slots[car].at(absolute_index);
            if draw_kw <= 0.0 {
                continue;
            }
            let headroom = (self.params.limit[car] - *soc).max(0.0);
            let stored = (draw_kw * step as f64 / 60.0 * self.params.loss).clamp(0.0, headroom);
            *soc = dp3(*soc + stored);
            if self.params.loss > 0.0 {
                outcome.load += stored / self.params.loss;
            }
            if !self.params.from_battery {
                outcome.freeze_discharge = true;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Series;

    fn one_car(draw_kw: f64, limit: f64, loss: f64) -> CarParams {
        CarParams {
            count: 1,
            soc: vec![0.0],
            soc_next: vec![0.0],
            loss,
            slots: vec![Series::from(vec![draw_kw; 24])],
            limit: vec![limit],
            from_battery: false,
            battery_size: vec![limit],
        }
    }

    #[test]
    fn test_charges_to_the_limit() {
        let params = one_car(7.0, 10.0, 1.0);
        let model = CarModel::new(&params);
        let mut state = CarState::new(&params);

        let mut total_load = 0.0;
        for index in 0..24 {
            total_load += model.step(&mut state, index, 5).load;
        }

        // 7 kW × 2 h = 14 kWh on offer, but the car tops out at 10:
        assert!((state.soc[0] - 10.0).abs() < 1e-9);
        assert!((total_load - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_loss_inflates_household_load() {
        let params = one_car(6.0, 100.0, 0.8);
        let model = CarModel::new(&params);
        let mut state = CarState::new(&params);

        let outcome = model.step(&mut state, 0, 5);

        // 0.5 kWh drawn from the grid, 0.4 kWh stored:
        assert!((outcome.load - 0.5).abs() < 1e-9);
        assert!((state.soc[0] - 0.4).abs() < 1e-9);
        assert!(outcome.freeze_discharge);
    }

    #[test]
    fn test_idle_outside_slots() {
        let params = {
            let mut params = one_car(0.0, 10.0, 1.0);
            params.slots = vec![Series::from(vec![0.0; 24])];
            params
        };
        let model = CarModel::new(&params);
        let mut state = CarState::new(&params);

        let outcome = model.step(&mut state, 3, 5);
        assert_eq!(outcome.load, 0.0);
        assert!(!outcome.freeze_discharge);
    }
}
