//! Battery power curves, temperature derating and charge-rate selection.
//!
//! All rates are kWh per minute; multiplying a rate by the step length in
//! minutes yields the per-step energy budget.

use std::io::Read;

use crate::{
    params::BatteryParams,
    plan::Window,
    protocol::{Decoder, ProtocolError},
    rounding::dp2,
};

/// 1 kWh/minute expressed in watts, for the rate search grid.
const WATTS_PER_KWH_MINUTE: f64 = 60_000.0;

/// SOC-dependent power scaling: one factor per SOC percent, 0..=99.
#[derive(Clone, Debug)]
pub struct PowerCurve([f64; 100]);

impl PowerCurve {
    pub fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, ProtocolError> {
        let mut factors = [0.0; 100];
        for factor in &mut factors {
            *factor = decoder.read_scalar()?;
        }
        Ok(Self(factors))
    }

    fn factor(&self, index: usize) -> f64 {
        self.0[index.min(99)]
    }

    #[cfg(test)]
    pub fn flat() -> Self {
        Self([1.0; 100])
    }

    #[cfg(test)]
    pub fn from_fn(factor: impl Fn(usize) -> f64) -> Self {
        let mut factors = [0.0; 100];
        for (index, value) in factors.iter_mut().enumerate() {
            *value = factor(index);
        }
        Self(factors)
    }
}

/// Temperature-dependent capacity scaling: one factor per °C over −20..=19.
#[derive(Clone, Debug)]
pub struct TemperatureCurve([f64; 40]);

impl TemperatureCurve {
    pub fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, ProtocolError> {
        let mut factors = [0.0; 40];
        for factor in &mut factors {
            *factor = decoder.read_scalar()?;
        }
        Ok(Self(factors))
    }

    /// Capacity factor for a temperature, clamped to the curve bounds.
    ///
    /// A zero entry means the table has a hole there; fall back to the
    /// warmest entry above freezing, or to the 0 °C entry below it.
    #[expect(clippy::cast_possible_truncation)]
    fn factor(&self, temperature: f64) -> f64 {
        let degree = (temperature as i64).clamp(-20, 20);
        let index = usize::try_from(degree + 20).unwrap_or(0).min(39);
        let factor = self.0[index];
        if factor != 0.0 {
            factor
        } else if degree > 0 {
            self.0[39]
        } else {
            self.0[20]
        }
    }

    #[cfg(test)]
    pub fn unlimited() -> Self {
        // A factor of 60 caps at one full capacity per hour-minute, which
        // no realistic rate setting reaches.
        Self([60.0; 40])
    }

    #[cfg(test)]
    pub fn from_fn(factor: impl Fn(usize) -> f64) -> Self {
        let mut factors = [0.0; 40];
        for (index, value) in factors.iter_mut().enumerate() {
            *value = factor(index);
        }
        Self(factors)
    }
}

/// SOC as a percent limit: `min(soc/max × 100 + 0.5, 100)`.
///
/// Kept exactly as the planner computes it, including the missing floor:
/// an almost-empty battery yields 0.5 which truncates to percent 0.
pub fn percent_limit(soc: f64, soc_max: f64) -> f64 {
    if soc_max <= 0.0 { 0.0 } else { (soc / soc_max * 100.0 + 0.5).min(100.0) }
}

/// The chosen charge rate: the setpoint to program and the curve-scaled
/// rate the battery will actually achieve at the present SOC.
#[derive(Copy, Clone, Debug)]
pub struct ChargeRate {
    pub setting: f64,
    pub real: f64,
}

/// Curve-aware view over the battery parameters.
#[derive(Copy, Clone)]
pub struct Battery<'a> {
    params: &'a BatteryParams,
    soc_max: f64,
}

impl<'a> Battery<'a> {
    pub const fn new(params: &'a BatteryParams, soc_max: f64) -> Self {
        Self { params, soc_max }
    }

    /// Achievable charge rate after the SOC power curve and temperature cap.
    pub fn charge_rate(&self, soc: f64, setting: f64, temperature: f64) -> f64 {
        self.rate_after_curve(
            soc,
            setting,
            temperature,
            self.params.rate_max_charge,
            &self.params.charge_power_curve,
            &self.params.temperature_charge_curve,
        )
    }

    /// Discharge counterpart of [`Battery::charge_rate`].
    pub fn discharge_rate(&self, soc: f64, setting: f64, temperature: f64) -> f64 {
        self.rate_after_curve(
            soc,
            setting,
            temperature,
            self.params.rate_max_discharge,
            &self.params.discharge_power_curve,
            &self.params.temperature_discharge_curve,
        )
    }

    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn rate_after_curve(
        &self,
        soc: f64,
        setting: f64,
        temperature: f64,
        rate_max: f64,
        power_curve: &PowerCurve,
        temperature_curve: &TemperatureCurve,
    ) -> f64 {
        let percent = percent_limit(soc, self.soc_max);
        let index = (percent as i64).clamp(0, 99) as usize;
        let curve_capped = rate_max * power_curve.factor(index);
        let temperature_capped =
            (self.soc_max * temperature_curve.factor(temperature) / 60.0).min(rate_max);
        setting.min(curve_capped).min(temperature_capped).max(self.params.rate_min)
    }
}

#[bon::bon]
impl Battery<'_> {
    /// Pick the slowest charge rate that still reaches the target SOC by
    /// the window end, less a margin.
    ///
    /// Candidate setpoints run from the maximum rate downward in 100 W
    /// decrements (never below 400 W or the average rate needed), each
    /// simulated forward in 5-minute sub-steps through the charge curve.
    /// When low-power charging is off, or the target is unreachable
    /// anyway, the maximum rate wins.
    #[builder]
    #[expect(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn find_charge_rate(
        &self,
        minute_absolute: i64,
        soc: f64,
        window: Window,
        target_soc: f64,
        temperature: f64,
        low_power: bool,
        margin: f64,
        current_rate: f64,
    ) -> ChargeRate {
        let max_rate = self.params.rate_max_charge;
        let scaling = self.params.rate_max_scaling;
        let target_soc = dp2(target_soc);
        let max_rate_real = self.charge_rate(soc, max_rate, temperature) * scaling;
        let at_max = ChargeRate { setting: max_rate, real: max_rate_real };

        if !low_power {
            return at_max;
        }

        let abs_minutes_left = window.end - minute_absolute;
        let minutes_left = abs_minutes_left - margin as i64;

        // Out of time, already done, or unreachable even flat out:
        if abs_minutes_left < 0 || dp2(soc) >= target_soc {
            return at_max;
        }
        let charge_left = dp2(target_soc - soc);
        if dp2(max_rate_real * self.params.loss * abs_minutes_left as f64) <= charge_left {
            return at_max;
        }

        let min_rate_w = (charge_left / abs_minutes_left as f64 * WATTS_PER_KWH_MINUTE) as i64;
        let mut rate_w = (max_rate * WATTS_PER_KWH_MINUTE).round() as i64;

        let mut best_rate = max_rate;
        let mut best_rate_real = max_rate_real;
        let mut highest_achievable_rate: f64 = 0.0;

        while rate_w >= 400 {
            if rate_w < min_rate_w {
                break;
            }
            let rate = rate_w as f64 / WATTS_PER_KWH_MINUTE;
            let mut charge_now = soc;
            let mut rate_scale_max: f64 = 0.0;
            let mut minute = 0;
            while minute < minutes_left {
                let unscaled = self.charge_rate(charge_now, rate, temperature);
                highest_achievable_rate = highest_achievable_rate.max(unscaled);
                let rate_scale = unscaled * scaling;
                rate_scale_max = rate_scale_max.max(rate_scale);
                charge_now += rate_scale * 5.0 * self.params.loss;
                if dp2(charge_now) >= target_soc && rate_scale_max < best_rate_real {
                    best_rate = rate;
                    best_rate_real = rate_scale_max;
                    break;
                }
                minute += 5;
            }
            rate_w -= 100;
        }

        // Setpoint churn is pointless when the curve is the binding limit
        // either way, so keep the currently-programmed rate.
        if best_rate >= highest_achievable_rate && current_rate >= highest_achievable_rate {
            best_rate = current_rate;
        }

        ChargeRate {
            setting: best_rate,
            real: self.charge_rate(soc, best_rate, temperature) * scaling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BatteryParams {
        crate::params::testing::household().battery
    }

    #[test]
    fn test_percent_limit() {
        assert_eq!(percent_limit(5.0, 10.0), 50.5);
        assert_eq!(percent_limit(10.0, 10.0), 100.0);
        // Near-empty truncates to index 0, non-positive capacity to 0:
        assert!((percent_limit(0.001, 10.0) - 0.51).abs() < 1e-9);
        assert_eq!(percent_limit(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_charge_rate_follows_power_curve() {
        let mut params = params();
        params.rate_max_charge = 6.0 / 60.0;
        // Half power above 90%:
        params.charge_power_curve = PowerCurve::from_fn(|i| if i >= 90 { 0.5 } else { 1.0 });
        let battery = Battery::new(&params, 10.0);

        assert!((battery.charge_rate(5.0, 1.0, 20.0) - 6.0 / 60.0).abs() < 1e-12);
        assert!((battery.charge_rate(9.5, 1.0, 20.0) - 3.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_requested_rate_and_floor_are_respected() {
        let mut params = params();
        params.rate_max_charge = 6.0 / 60.0;
        params.rate_min = 0.5 / 60.0;
        let battery = Battery::new(&params, 10.0);

        // The setting caps the curve; the floor caps the setting:
        assert!((battery.charge_rate(5.0, 2.0 / 60.0, 20.0) - 2.0 / 60.0).abs() < 1e-12);
        assert!((battery.charge_rate(5.0, 0.0, 20.0) - 0.5 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_cap() {
        let mut params = params();
        params.rate_max_discharge = 10.0 / 60.0;
        // 0.05 capacity-per-minute cap below 0 °C:
        params.temperature_discharge_curve =
            TemperatureCurve::from_fn(|i| if i < 20 { 0.05 } else { 60.0 });
        let battery = Battery::new(&params, 10.0);

        // 10 kWh × 0.05 / 60 = 1/120 kWh per minute:
        assert!((battery.discharge_rate(5.0, 1.0, -5.0) - 10.0 * 0.05 / 60.0).abs() < 1e-12);
        assert!((battery.discharge_rate(5.0, 1.0, 15.0) - 10.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_extreme_temperatures_stay_in_bounds() {
        let mut params = params();
        params.rate_max_charge = 6.0 / 60.0;
        params.temperature_charge_curve = TemperatureCurve::from_fn(|i| match i {
            0 => 0.01,
            39 => 0.02,
            _ => 60.0,
        });
        let battery = Battery::new(&params, 10.0);

        // −30 clamps to the coldest entry, +30 to the warmest:
        assert!((battery.charge_rate(5.0, 1.0, -30.0) - 10.0 * 0.01 / 60.0).abs() < 1e-12);
        assert!((battery.charge_rate(5.0, 1.0, 30.0) - 10.0 * 0.02 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_hole_falls_back() {
        let mut params = params();
        params.rate_max_charge = 6.0 / 60.0;
        params.temperature_charge_curve = TemperatureCurve::from_fn(|i| match i {
            25 => 0.0, // hole at +5 °C
            39 => 0.3,
            _ => 60.0,
        });
        let battery = Battery::new(&params, 10.0);

        // The +5 °C hole falls back to the warmest entry:
        assert!((battery.charge_rate(5.0, 1.0, 5.0) - 10.0 * 0.3 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_find_charge_rate_prefers_low_power() {
        let params = {
            let mut params = params();
            params.rate_max_charge = 5.0 / 60.0;
            params
        };
        let battery = Battery::new(&params, 10.0);

        // 6 kWh to add over a 90-minute window at up to 5 kW:
        let chosen = battery
            .find_charge_rate()
            .minute_absolute(0)
            .soc(2.0)
            .window(Window { start: 0, end: 90 })
            .target_soc(8.0)
            .temperature(20.0)
            .low_power(true)
            .margin(10.0)
            .current_rate(5.0 / 60.0)
            .call();

        assert!(chosen.setting < 5.0 / 60.0);
        assert!((chosen.setting - 4500.0 / WATTS_PER_KWH_MINUTE).abs() < 1e-9);
        assert!(chosen.real < 5.0 / 60.0);
    }

    #[test]
    fn test_find_charge_rate_goes_flat_out_when_unreachable() {
        let params = {
            let mut params = params();
            params.rate_max_charge = 5.0 / 60.0;
            params
        };
        let battery = Battery::new(&params, 10.0);

        // Only 30 minutes for 6 kWh at 5 kW max — hopeless, stay at max:
        let chosen = battery
            .find_charge_rate()
            .minute_absolute(0)
            .soc(2.0)
            .window(Window { start: 0, end: 30 })
            .target_soc(8.0)
            .temperature(20.0)
            .low_power(true)
            .margin(10.0)
            .current_rate(5.0 / 60.0)
            .call();

        assert!((chosen.setting - 5.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_find_charge_rate_without_low_power() {
        let params = params();
        let battery = Battery::new(&params, 10.0);
        let chosen = battery
            .find_charge_rate()
            .minute_absolute(0)
            .soc(2.0)
            .window(Window { start: 0, end: 90 })
            .target_soc(8.0)
            .temperature(20.0)
            .low_power(false)
            .margin(10.0)
            .current_rate(0.5 / 60.0)
            .call();
        assert!((chosen.setting - params.rate_max_charge).abs() < 1e-12);
    }
}
