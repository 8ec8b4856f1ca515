//! The simulation kernel: minute-by-minute household energy flow for one
//! candidate plan.
//!
//! Each step picks exactly one battery mode, routes PV through the DC bus
//! or the inverter, applies the inverter and export limits, updates the
//! SOC and accumulates cost, carbon, cycle count and the keep penalty.

use crate::{
    battery::{Battery, percent_limit},
    cars::{CarModel, CarState},
    iboost::{IboostConditions, IboostModel, IboostState},
    outcome::Prediction,
    params::Params,
    plan::Plan,
    prelude::*,
    rounding::{dp3, dp6},
    windows,
};

/// Battery operating mode for one step, in strict precedence order.
#[derive(Copy, Clone, Debug, PartialEq, derive_more::Display)]
pub enum Mode {
    #[display("forced-export")]
    ForcedExport,

    #[display("charge-to-target")]
    ChargeToTarget {
        /// Index of the active charge window.
        window: usize,
    },

    #[display("eco")]
    Eco,
}

/// Net grid draw for a step: positive imports, negative exports.
///
/// The battery balance passes the inverter once — discharge shrinks by the
/// loss, charge grows by it.
fn energy_diff(battery_draw: f64, pv_dc: f64, pv_ac: f64, load: f64, inverter_loss: f64) -> f64 {
    let battery_balance = battery_draw + pv_dc;
    let battery_balance = if battery_balance > 0.0 {
        battery_balance * inverter_loss
    } else {
        battery_balance / inverter_loss
    };
    load - battery_balance - pv_ac
}

/// Inverter throughput for a step; on a hybrid, AC-side PV shares it.
fn total_inverted(battery_draw: f64, pv_dc: f64, pv_ac: f64, inverter_loss: f64, hybrid: bool) -> f64 {
    let battery_balance = battery_draw + pv_dc;
    let mut total = if battery_balance > 0.0 {
        battery_balance
    } else {
        battery_balance.abs() / inverter_loss
    };
    if hybrid {
        total += pv_ac / inverter_loss;
    }
    total
}

pub struct Kernel<'a> {
    params: &'a Params,
    plan: &'a Plan,
}

impl<'a> Kernel<'a> {
    pub const fn new(params: &'a Params, plan: &'a Plan) -> Self {
        Self { params, plan }
    }

    /// Simulate the plan over the forecast horizon.
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss,
        clippy::too_many_lines
    )]
    pub fn run(&self) -> Prediction {
        let p = self.params;
        let plan = self.plan;
        let step = plan.step;
        let step_f = step as f64;

        let battery = Battery::new(&p.battery, p.soc_max);
        let cars = CarModel::new(&p.cars);
        let iboost = IboostModel::new(&p.iboost);

        let (pv_series, load_series) = if plan.pv10 {
            (&p.pv_forecast10, &p.load_forecast10)
        } else {
            (&p.pv_forecast, &p.load_forecast)
        };

        let hybrid = p.inverter.hybrid;
        let inverter_loss = p.inverter.loss;
        let inverter_loss_ac = if hybrid { inverter_loss } else { 1.0 };
        let inverter_limit = p.inverter.limit * step_f;
        let export_limit = p.inverter.export_limit * step_f;
        let low_power_charging = p.set_charge_window && p.set_charge_low_power;

        let reserve = p.reserve;
        let soc_max = p.soc_max;
        let battery_loss = p.battery.loss;
        let battery_loss_discharge = p.battery.loss_discharge;

        let mut soc = p.soc_kw;
        let mut soc_min = p.soc_max;
        let mut soc_min_minute = p.minutes_now;
        let mut export_kwh = p.export_today_now;
        let mut import_kwh_house = 0.0;
        let mut import_kwh_battery = 0.0;
        let mut carbon_g = 0.0;
        let mut battery_cycle = 0.0;
        let mut metric_keep = 0.0;
        let mut metric = p.cost_today_sofar;
        let mut four_hour_rule = true;
        let mut record = true;
        let mut clipped_kwh = 0.0;

        let mut final_soc = soc;
        let mut final_metric = metric;
        let mut final_battery_cycle = battery_cycle;
        let mut final_metric_keep = metric_keep;
        let mut final_carbon_g = carbon_g;
        let mut final_iboost_kwh = p.iboost_today;

        let mut car_state = CarState::new(&p.cars);
        let mut car_soc_next = car_state.soc.clone();
        let mut iboost_state = IboostState::new(&p.iboost, p.iboost_today);

        let mut charge_rate_now = p.charge_rate_now;
        let mut discharge_rate_now = p.discharge_rate_now;

        let mut first_charge = plan.end_record;
        let mut first_charge_soc = soc;

        let mut soc_trace = vec![0.0; usize::try_from(p.forecast_minutes / 5).unwrap_or(0)];

        let mut minute = 0;
        while minute < p.forecast_minutes {
            let minute_absolute = minute + p.minutes_now;
            let minute_index = (minute / 5) as usize;
            let absolute_index = (minute_absolute / 5) as usize;
            let prev_soc = soc;
            let mut reserve_expected = reserve;

            let import_rate = p.rate_import.at(absolute_index);
            let export_rate = p.rate_export.at(absolute_index);
            let alert_keep = p.alert_active_keep.at(absolute_index);
            let battery_temperature = p.battery.temperature_prediction.at(minute_index);

            // Keep weighting ramps in over the first 256 minutes until the
            // first forced export; an active alert floors it and lifts the
            // keep level itself.
            let mut keep_weight = if four_hour_rule {
                (minute as f64 / 256.0).min(1.0) * p.best_soc_keep_weight
            } else {
                p.best_soc_keep_weight
            };
            let mut best_soc_keep = p.best_soc_keep;
            if alert_keep > 0.0 {
                keep_weight = keep_weight.max(2.0);
                best_soc_keep = best_soc_keep.max((alert_keep / 100.0 * soc_max).min(soc_max));
            }

            let charge_window_n = windows::active_charge_window(
                &plan.charge_window,
                &plan.charge_limit,
                minute_absolute,
            );
            let export_window_n = windows::active_export_window(
                &plan.export_window,
                &plan.export_limits,
                minute_absolute,
            );
            let charge_window_active = charge_window_n.is_some();
            let export_window_active = export_window_n.is_some();
            let export_limit_now = export_window_n.map_or(100.0, |n| plan.export_limits[n]);

            // Resolve the effective charge target:
            let mut charge_limit_n = 0.0;
            if let Some(n) = charge_window_n {
                charge_limit_n = plan.charge_limit[n];
                if p.set_charge_freeze && charge_limit_n == reserve {
                    charge_limit_n = soc.max(reserve);
                }
                if p.set_reserve_enable && soc >= charge_limit_n {
                    reserve_expected = charge_limit_n.max(reserve);
                }
            }

            if record && minute >= plan.end_record {
                record = false;
            }
            soc_trace[minute_index] = soc;

            // PV and load over the 5-minute buckets covering this step:
            let mut pv_now = 0.0;
            let mut load_yesterday = 0.0;
            for offset in (0..step).step_by(5) {
                pv_now += pv_series.at(minute_index + (offset / 5) as usize);
                load_yesterday += load_series.at(minute_index + (offset / 5) as usize);
            }

            // Window scheduling re-programs the rates every step:
            if p.set_charge_window || p.set_export_window {
                charge_rate_now = p.battery.rate_max_charge;
                discharge_rate_now = p.battery.rate_max_discharge;
            }

            // Cars charge first:
            let car_outcome = cars.step(&mut car_state, absolute_index, step);
            load_yesterday += car_outcome.load;

            // Load-side diverter boost:
            let iboost_conditions = IboostConditions {
                import_rate,
                export_rate,
                gas_rate: p.iboost.rate_gas.at(absolute_index),
                plan_value: p.iboost.plan.at(absolute_index),
                charge_window_active,
                export_window_active,
            };
            let iboost_load = iboost.load_boost(&iboost_state, &iboost_conditions, step_f);
            load_yesterday += iboost_load;

            // A grid-only car draw or a boost with prevent-discharge
            // freezes battery discharge for this step only; the modelled
            // rate is restored as soon as neither holds.
            if car_outcome.freeze_discharge
                || (iboost_load > 0.0 && p.iboost.prevent_discharge)
            {
                discharge_rate_now = p.battery.rate_min;
            } else {
                discharge_rate_now = p.battery.rate_max_discharge;
            }

            // Export freeze forces charging off:
            if p.set_export_freeze
                && export_window_active
                && export_limit_now < 100.0
                && (export_limit_now == 99.0 || p.set_export_freeze_only)
            {
                charge_rate_now = p.battery.rate_min;
            }

            // Discharge policy inside a charge window:
            if charge_window_active {
                if !p.set_discharge_during_charge {
                    discharge_rate_now = p.battery.rate_min;
                } else if p.set_charge_window
                    && soc >= charge_limit_n
                    && (percent_limit(soc, soc_max) - percent_limit(charge_limit_n, soc_max)).abs()
                        <= 1.0
                {
                    discharge_rate_now = p.battery.rate_min;
                }
            }

            // Curve-limited, step-scaled rates:
            let mut charge_rate_now_curve =
                battery.charge_rate(soc, charge_rate_now, battery_temperature)
                    * p.battery.rate_max_scaling;
            let mut charge_rate_step = charge_rate_now_curve * step_f;
            let mut discharge_rate_now_curve =
                battery.discharge_rate(soc, discharge_rate_now, battery_temperature)
                    * p.battery.rate_max_scaling_discharge;
            let mut discharge_rate_step = discharge_rate_now_curve * step_f;

            let battery_to_min = (soc - reserve_expected).max(0.0) * battery_loss_discharge;
            let battery_to_max = (soc_max - soc).max(0.0) * battery_loss;

            let discharge_min = if export_window_active {
                (soc_max * export_limit_now / 100.0).max(reserve).max(p.best_soc_min)
            } else {
                reserve
            };

            let mode = if !p.set_export_freeze_only
                && export_window_active
                && export_limit_now < 99.0
                && soc > discharge_min
            {
                Mode::ForcedExport
            } else if let Some(window) = charge_window_n
                && soc < charge_limit_n
            {
                Mode::ChargeToTarget { window }
            } else {
                Mode::Eco
            };

            let mut battery_draw = 0.0;
            let mut pv_ac = 0.0;
            let mut pv_dc = 0.0;

            match mode {
                Mode::ForcedExport => {
                    // A fractional export limit attenuates the discharge rate:
                    let export_rate_adjust = if low_power_charging {
                        1.0 - (export_limit_now - export_limit_now.floor())
                    } else {
                        1.0
                    };
                    discharge_rate_now = p.battery.rate_max_discharge * export_rate_adjust;
                    discharge_rate_now_curve =
                        battery.discharge_rate(soc, discharge_rate_now, battery_temperature)
                            * p.battery.rate_max_scaling_discharge;
                    discharge_rate_step = discharge_rate_now_curve * step_f;

                    battery_draw = discharge_rate_step.min(battery_to_min);
                    pv_ac = pv_now * inverter_loss_ac;
                    pv_dc = 0.0;

                    // Over the export limit: shed discharge, or flip to
                    // charging when the inverter supports it.
                    let diff =
                        energy_diff(battery_draw, pv_dc, pv_ac, load_yesterday, inverter_loss);
                    if diff < 0.0 && diff.abs() > export_limit {
                        let reduce_by = diff.abs() - export_limit;
                        clipped_kwh += reduce_by;
                        if reduce_by > battery_draw {
                            if p.inverter.can_charge_during_export {
                                let reduce_by = reduce_by - battery_draw;
                                battery_draw = (-reduce_by * inverter_loss)
                                    .max(-battery_to_min)
                                    .max(-charge_rate_step);
                            } else {
                                battery_draw = 0.0;
                            }
                        } else {
                            battery_draw -= reduce_by;
                        }
                        if hybrid && battery_draw < 0.0 {
                            pv_dc = battery_draw.abs().min(pv_now);
                            pv_ac = (pv_now - pv_dc) * inverter_loss_ac;
                        }
                    }

                    // Over the inverter limit: scale the discharge back.
                    let total =
                        total_inverted(battery_draw, pv_dc, pv_ac, inverter_loss, hybrid);
                    if hybrid {
                        if total > inverter_limit {
                            let over_limit = total - inverter_limit;
                            if over_limit > battery_draw {
                                let reduce_by = over_limit - battery_draw;
                                battery_draw = 0.0;
                                if p.inverter.can_charge_during_export {
                                    battery_draw = (-reduce_by * inverter_loss)
                                        .max(-battery_to_min)
                                        .max(-charge_rate_step);
                                }
                            } else {
                                battery_draw -= over_limit;
                            }
                            if battery_draw < 0.0 {
                                pv_dc = battery_draw.abs().min(pv_now);
                            }
                            pv_ac = (pv_now - pv_dc) * inverter_loss_ac;
                        }
                    } else if total > inverter_limit {
                        let over_limit = total - inverter_limit;
                        battery_draw = (battery_draw - over_limit * inverter_loss).max(0.0);
                    }

                    // The first forced export disables the four-hour rule
                    // for the rest of the prediction.
                    four_hour_rule = false;
                }

                Mode::ChargeToTarget { window } => {
                    let chosen = battery
                        .find_charge_rate()
                        .minute_absolute(minute_absolute)
                        .soc(soc)
                        .window(plan.charge_window[window])
                        .target_soc(charge_limit_n)
                        .temperature(battery_temperature)
                        .low_power(low_power_charging)
                        .margin(p.charge_low_power_margin)
                        .current_rate(charge_rate_now)
                        .call();
                    charge_rate_now = chosen.setting;
                    charge_rate_now_curve = chosen.real;
                    charge_rate_step = charge_rate_now_curve * step_f;

                    let amount =
                        charge_rate_step.min((charge_limit_n - soc).max(pv_now)).max(0.0);
                    battery_draw = -amount;
                    first_charge = first_charge.min(minute);

                    pv_dc = if hybrid { battery_draw.abs().min(pv_now) } else { 0.0 };
                    pv_ac = (pv_now - pv_dc) * inverter_loss_ac;

                    // The charger completes mid-step at full rate and then
                    // stops, so PV spread over the step will not cover it —
                    // model the resulting import as a keep contribution.
                    if (charge_limit_n - soc) < charge_rate_step {
                        let pv_compare = pv_dc + pv_ac;
                        if pv_dc >= (charge_limit_n - soc) && pv_compare < charge_rate_step {
                            let charge_time_remains = (charge_limit_n - soc) / charge_rate_now_curve;
                            let pv_in_period = pv_compare / step_f * charge_time_remains;
                            let potential_import = (charge_rate_now_curve * charge_time_remains
                                - pv_in_period)
                                .min(charge_limit_n - soc);
                            metric_keep += (potential_import * import_rate).max(0.0);
                        }
                    }
                }

                Mode::Eco => {
                    pv_ac = pv_now * inverter_loss_ac;
                    pv_dc = 0.0;
                    let required_for_load = load_yesterday / inverter_loss;
                    let potential_to_charge = if hybrid { pv_now } else { pv_ac };
                    let residual = required_for_load - potential_to_charge;

                    if residual > 0.0 {
                        battery_draw = residual
                            .min(discharge_rate_step)
                            .min(inverter_limit)
                            .min(battery_to_min);
                    } else {
                        battery_draw = residual
                            .max(-charge_rate_step)
                            .max(-inverter_limit)
                            .max(-battery_to_max);
                        pv_dc = if hybrid { battery_draw.abs().min(pv_now) } else { 0.0 };
                        pv_ac = (pv_now - pv_dc) * inverter_loss_ac;
                    }
                }
            }

            // Post-dispatch inverter clipping.
            if hybrid {
                // Battery throughput alone over the limit?
                let battery_inverted = total_inverted(battery_draw, pv_dc, 0.0, inverter_loss, hybrid);
                if battery_inverted > inverter_limit {
                    let over_limit = battery_inverted - inverter_limit;
                    if battery_draw + pv_dc > 0.0 {
                        battery_draw = (battery_draw - over_limit).max(0.0);
                    } else {
                        battery_draw = (battery_draw + over_limit * inverter_loss).min(0.0);
                    }
                    if battery_draw < 0.0 {
                        pv_dc = battery_draw.abs().min(pv_now);
                        pv_ac = (pv_now - pv_dc) * inverter_loss_ac;
                    }
                }

                // Clip battery discharge back, flipping the leftover to PV
                // charge when possible:
                let total = total_inverted(battery_draw, pv_dc, pv_ac, inverter_loss, hybrid);
                if total > inverter_limit && battery_draw + pv_dc > 0.0 {
                    let over_limit = total - inverter_limit;
                    battery_draw = (battery_draw - over_limit).max(0.0);

                    if battery_draw == 0.0 {
                        let total =
                            total_inverted(battery_draw, pv_dc, pv_ac, inverter_loss, hybrid);
                        let over_limit = (total - inverter_limit).max(0.0);
                        battery_draw = (-over_limit * inverter_loss)
                            .max(-charge_rate_step)
                            .max(-battery_to_max)
                            .max(-pv_ac);
                    }
                    if battery_draw < 0.0 {
                        pv_dc = battery_draw.abs().min(pv_now);
                        pv_ac = (pv_now - pv_dc) * inverter_loss_ac;
                    }
                }

                // Whatever still exceeds the limit is clipped solar:
                let total = total_inverted(battery_draw, pv_dc, pv_ac, inverter_loss, hybrid);
                if total > inverter_limit {
                    let over_limit = total - inverter_limit;
                    clipped_kwh += over_limit;
                    pv_ac = (pv_ac - over_limit * inverter_loss).max(0.0);
                }
            } else {
                let total = total_inverted(battery_draw, pv_dc, pv_ac, inverter_loss, hybrid);
                if total > inverter_limit {
                    let over_limit = total - inverter_limit;
                    if battery_draw > 0.0 {
                        battery_draw = (battery_draw - over_limit).max(0.0);
                    } else {
                        battery_draw = (battery_draw + over_limit * inverter_loss).min(0.0);
                    }
                }
            }

            // Export limit clips PV output:
            let diff = energy_diff(battery_draw, pv_dc, pv_ac, load_yesterday, inverter_loss);
            if diff < 0.0 && diff.abs() > export_limit {
                let over_limit = diff.abs() - export_limit;
                clipped_kwh += over_limit;
                pv_ac = (pv_ac - over_limit).max(0.0);
            }

            // Update the SOC:
            if battery_draw > 0.0 {
                soc = (soc - battery_draw / battery_loss_discharge).max(reserve_expected);
            } else {
                soc = (soc - battery_draw * battery_loss).min(soc_max);
            }
            soc = dp6(soc);

            battery_cycle += battery_draw.abs();

            // Final energy flow for the step:
            let mut diff = energy_diff(battery_draw, pv_dc, pv_ac, load_yesterday, inverter_loss);

            // The diverter may swallow export-bound surplus. Its SOC floor
            // compares the raw percentage, not the rounded curve index:
            let mut iboost_solar_amount = 0.0;
            if diff < 0.0 {
                let soc_percent = if soc_max > 0.0 { soc / soc_max * 100.0 } else { 0.0 };
                iboost_solar_amount = iboost.solar_divert(
                    &iboost_state,
                    &iboost_conditions,
                    -diff,
                    soc_percent,
                    (soc_max - soc).max(0.0),
                    step_f,
                );
                diff += iboost_solar_amount;
            }

            // Keep penalty, proportional to depth below the keep level:
            if best_soc_keep > 0.0 && soc <= best_soc_keep {
                metric_keep += (best_soc_keep - soc) * import_rate * keep_weight * step_f / 60.0;
            }

            if diff > 0.0 {
                if p.carbon_enable {
                    carbon_g += diff * p.carbon_intensity.at(absolute_index);
                }
                if charge_window_active {
                    import_kwh_battery += diff;
                } else {
                    import_kwh_house += diff;
                }
                metric += import_rate * diff;
            } else {
                let energy = -diff;
                export_kwh += energy;
                if p.carbon_enable {
                    carbon_g -= energy * p.carbon_intensity.at(absolute_index);
                }
                metric -= export_rate * energy;
            }

            iboost.finish_step(
                &mut iboost_state,
                iboost_load,
                iboost_solar_amount,
                minute,
                minute_absolute,
                step,
            );

            if p.debug_enable {
                trace!(minute, %mode, soc, diff, "step");
            }

            // Accumulators freeze past `end_record`; the trace does not.
            if record {
                final_soc = soc;
                if minute == 0 {
                    for (next, &car_soc) in car_soc_next.iter_mut().zip(&car_state.soc) {
                        *next = dp3(car_soc);
                    }
                }
                final_metric = metric;
                final_battery_cycle = battery_cycle;
                final_metric_keep = metric_keep;
                final_carbon_g = carbon_g;
                final_iboost_kwh = iboost_state.today;

                // SOC going into the first charge window:
                if minute <= first_charge {
                    first_charge_soc = prev_soc;
                }

                if soc < soc_min {
                    soc_min_minute = minute_absolute;
                }
                soc_min = soc_min.min(soc);
            }

            minute += step;
        }

        Prediction {
            final_metric,
            import_kwh_battery,
            import_kwh_house,
            export_kwh,
            soc_min,
            final_soc,
            soc_min_minute,
            final_battery_cycle,
            final_metric_keep,
            final_iboost_kwh,
            final_carbon_g,
            soc_trace,
            car_soc_next,
            iboost_next: iboost_state.next,
            iboost_running: iboost_state.running,
            iboost_running_solar: iboost_state.running_solar,
            iboost_running_full: iboost_state.running_full,
            first_charge_soc,
            clipped_kwh,
        }
    }
}
