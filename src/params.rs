//! Session parameter store: the household model sent once at `INIT` and
//! reused across every prediction of the session.

use std::io::Read;

use crate::{
    battery::{PowerCurve, TemperatureCurve},
    protocol::{Decoder, ProtocolError},
};

/// Forecast series sampled at one value per 5 minutes.
#[derive(Clone, Debug, Default)]
pub struct Series(Vec<f64>);

impl Series {
    /// Value at a 5-minute bucket index.
    ///
    /// Reads past the end yield zero — the planner may legitimately probe
    /// one step beyond the horizon.
    pub fn at(&self, index: usize) -> f64 {
        self.0.get(index).copied().unwrap_or(0.0)
    }

    fn decode<R: Read>(decoder: &mut Decoder<R>, minutes: i64) -> Result<Self, ProtocolError> {
        let len =
            usize::try_from(minutes / 5).map_err(|_| ProtocolError::InvalidLength(minutes))?;
        Ok(Self(decoder.read_array(len)?))
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Battery model: rates in kWh per minute, curves by SOC percent and by
/// temperature degree.
#[derive(Clone, Debug)]
pub struct BatteryParams {
    pub rate_min: f64,
    pub rate_max_charge: f64,
    pub rate_max_discharge: f64,
    pub rate_max_charge_scaled: f64,
    pub rate_max_discharge_scaled: f64,
    pub charge_power_curve: PowerCurve,
    pub discharge_power_curve: PowerCurve,
    pub temperature: f64,
    pub temperature_charge_curve: TemperatureCurve,
    pub temperature_discharge_curve: TemperatureCurve,
    pub temperature_prediction: Series,
    pub rate_max_scaling: f64,
    pub rate_max_scaling_discharge: f64,
    pub loss: f64,
    pub loss_discharge: f64,
}

#[derive(Clone, Debug)]
pub struct InverterParams {
    /// One-way conversion efficiency, 1.0 = lossless.
    pub loss: f64,

    /// Hybrid topology: PV can reach the battery over the DC bus.
    pub hybrid: bool,

    /// Inverter throughput limit, kWh per minute.
    pub limit: f64,

    /// Grid export limit, kWh per minute.
    pub export_limit: f64,

    pub can_charge_during_export: bool,
}

/// Per-car charging plans; all vectors have one entry per car.
#[derive(Clone, Debug, Default)]
pub struct CarParams {
    pub count: usize,
    pub soc: Vec<f64>,
    pub soc_next: Vec<f64>,
    pub loss: f64,

    /// Planned draw in kW, folded onto the 5-minute grid.
    pub slots: Vec<Series>,

    pub limit: Vec<f64>,
    pub from_battery: bool,
    pub battery_size: Vec<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct IboostParams {
    pub enable: bool,
    pub on_export: bool,
    pub prevent_discharge: bool,
    pub next: f64,
    pub max_energy: f64,
    pub max_power: f64,
    pub min_power: f64,
    pub min_soc: f64,
    pub solar: bool,
    pub solar_excess: bool,
    pub charging: bool,
    pub plan: Series,
    pub gas: bool,
    pub gas_export: bool,
    pub gas_scale: f64,
    pub rate_threshold: f64,
    pub rate_threshold_export: f64,
    pub rate_gas: Series,
    pub running: bool,
    pub running_solar: bool,
    pub running_full: bool,
}

/// Everything the `INIT` frame carries, immutable until `QUIT`.
#[derive(Clone, Debug)]
pub struct Params {
    pub minutes_now: i64,
    pub forecast_minutes: i64,
    pub midnight_utc: i64,

    pub soc_kw: f64,
    pub soc_max: f64,
    pub export_today_now: f64,
    pub import_today_now: f64,
    pub load_minutes_now: f64,
    pub pv_today_now: f64,
    pub iboost_today: f64,
    pub charge_rate_now: f64,
    pub discharge_rate_now: f64,
    pub cost_today_sofar: f64,
    pub carbon_today_sofar: f64,
    pub debug_enable: bool,

    pub cars: CarParams,

    pub reserve: f64,
    pub metric_standing_charge: f64,

    pub set_charge_freeze: bool,
    pub set_reserve_enable: bool,
    pub set_export_freeze: bool,
    pub set_export_freeze_only: bool,
    pub set_discharge_during_charge: bool,
    pub set_read_only: bool,
    pub set_charge_low_power: bool,
    pub set_export_low_power: bool,
    pub set_charge_window: bool,
    pub set_export_window: bool,
    pub charge_low_power_margin: f64,

    pub iboost: IboostParams,
    pub carbon_enable: bool,

    pub inverter: InverterParams,
    pub battery: BatteryParams,

    pub best_soc_keep: f64,
    pub best_soc_keep_weight: f64,
    pub best_soc_min: f64,

    pub rate_import: Series,
    pub rate_export: Series,
    pub pv_forecast: Series,
    pub pv_forecast10: Series,
    pub load_forecast: Series,
    pub load_forecast10: Series,
    pub carbon_intensity: Series,
    pub alert_active_keep: Series,
}

impl Params {
    /// Decode the `INIT` payload.
    ///
    /// The field order is a hard wire contract with the planner; array
    /// lengths are derived from the scalars read before them.
    #[expect(clippy::too_many_lines)]
    pub fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, ProtocolError> {
        let minutes_now = decoder.read_int()?;
        let forecast_minutes = decoder.read_int()?;
        let max_minutes = forecast_minutes + minutes_now;
        let midnight_utc = decoder.read_int()?;

        let soc_kw = decoder.read_scalar()?;
        let soc_max = decoder.read_scalar()?;
        let export_today_now = decoder.read_scalar()?;
        let import_today_now = decoder.read_scalar()?;
        let load_minutes_now = decoder.read_scalar()?;
        let pv_today_now = decoder.read_scalar()?;
        let iboost_today = decoder.read_scalar()?;
        let charge_rate_now = decoder.read_scalar()?;
        let discharge_rate_now = decoder.read_scalar()?;
        let cost_today_sofar = decoder.read_scalar()?;
        let carbon_today_sofar = decoder.read_scalar()?;
        let debug_enable = decoder.read_bool()?;

        let num_cars = decoder.read_len()?;
        let car_soc = decoder.read_array(num_cars)?;
        let car_soc_next = decoder.read_array(num_cars)?;
        let car_loss = decoder.read_scalar()?;

        let reserve = decoder.read_scalar()?;
        let metric_standing_charge = decoder.read_scalar()?;

        let set_charge_freeze = decoder.read_bool()?;
        let set_reserve_enable = decoder.read_bool()?;
        let set_export_freeze = decoder.read_bool()?;
        let set_export_freeze_only = decoder.read_bool()?;
        let set_discharge_during_charge = decoder.read_bool()?;
        let set_read_only = decoder.read_bool()?;
        let set_charge_low_power = decoder.read_bool()?;
        let set_export_low_power = decoder.read_bool()?;
        let set_charge_window = decoder.read_bool()?;
        let set_export_window = decoder.read_bool()?;
        let charge_low_power_margin = decoder.read_scalar()?;

        let car_slots = (0..num_cars)
            .map(|_| Series::decode(decoder, max_minutes))
            .collect::<Result<Vec<_>, _>>()?;
        let car_limit = decoder.read_array(num_cars)?;
        let car_from_battery = decoder.read_bool()?;

        let iboost_enable = decoder.read_bool()?;
        let iboost_on_export = decoder.read_bool()?;
        let iboost_prevent_discharge = decoder.read_bool()?;
        let carbon_enable = decoder.read_bool()?;
        let iboost_next = decoder.read_scalar()?;
        let iboost_max_energy = decoder.read_scalar()?;
        let iboost_max_power = decoder.read_scalar()?;
        let iboost_min_power = decoder.read_scalar()?;
        let iboost_min_soc = decoder.read_scalar()?;
        let iboost_solar = decoder.read_bool()?;
        let iboost_solar_excess = decoder.read_bool()?;
        let iboost_charging = decoder.read_bool()?;
        let iboost_plan = Series::decode(decoder, max_minutes)?;
        let iboost_gas = decoder.read_bool()?;
        let iboost_gas_export = decoder.read_bool()?;
        let iboost_gas_scale = decoder.read_scalar()?;
        let iboost_rate_threshold = decoder.read_scalar()?;
        let iboost_rate_threshold_export = decoder.read_scalar()?;
        let rate_gas = Series::decode(decoder, max_minutes)?;

        let inverter_loss = decoder.read_scalar()?;
        let inverter_hybrid = decoder.read_bool()?;
        let inverter_limit = decoder.read_scalar()?;
        let export_limit = decoder.read_scalar()?;

        let battery_rate_min = decoder.read_scalar()?;
        let battery_rate_max_charge = decoder.read_scalar()?;
        let battery_rate_max_discharge = decoder.read_scalar()?;
        let battery_rate_max_charge_scaled = decoder.read_scalar()?;
        let battery_rate_max_discharge_scaled = decoder.read_scalar()?;
        let charge_power_curve = PowerCurve::decode(decoder)?;
        let discharge_power_curve = PowerCurve::decode(decoder)?;
        let battery_temperature = decoder.read_scalar()?;
        let temperature_charge_curve = TemperatureCurve::decode(decoder)?;
        let temperature_discharge_curve = TemperatureCurve::decode(decoder)?;
        let temperature_prediction = Series::decode(decoder, max_minutes)?;
        let battery_rate_max_scaling = decoder.read_scalar()?;
        let battery_rate_max_scaling_discharge = decoder.read_scalar()?;
        let battery_loss = decoder.read_scalar()?;
        let battery_loss_discharge = decoder.read_scalar()?;

        let best_soc_keep = decoder.read_scalar()?;
        let best_soc_keep_weight = decoder.read_scalar()?;
        let best_soc_min = decoder.read_scalar()?;

        let car_battery_size = decoder.read_array(num_cars)?;

        let rate_import = Series::decode(decoder, max_minutes)?;
        let rate_export = Series::decode(decoder, max_minutes)?;
        let pv_forecast = Series::decode(decoder, max_minutes)?;
        let pv_forecast10 = Series::decode(decoder, max_minutes)?;
        let load_forecast = Series::decode(decoder, max_minutes)?;
        let load_forecast10 = Series::decode(decoder, max_minutes)?;
        let carbon_intensity = Series::decode(decoder, max_minutes)?;
        let alert_active_keep = Series::decode(decoder, max_minutes)?;

        let iboost_running = decoder.read_bool()?;
        let iboost_running_solar = decoder.read_bool()?;
        let iboost_running_full = decoder.read_bool()?;
        let inverter_can_charge_during_export = decoder.read_bool()?;

        Ok(Self {
            minutes_now,
            forecast_minutes,
            midnight_utc,
            soc_kw,
            soc_max,
            export_today_now,
            import_today_now,
            load_minutes_now,
            pv_today_now,
            iboost_today,
            charge_rate_now,
            discharge_rate_now,
            cost_today_sofar,
            carbon_today_sofar,
            debug_enable,
            cars: CarParams {
                count: num_cars,
                soc: car_soc,
                soc_next: car_soc_next,
                loss: car_loss,
                slots: car_slots,
                limit: car_limit,
                from_battery: car_from_battery,
                battery_size: car_battery_size,
            },
            reserve,
            metric_standing_charge,
            set_charge_freeze,
            set_reserve_enable,
            set_export_freeze,
            set_export_freeze_only,
            set_discharge_during_charge,
            set_read_only,
            set_charge_low_power,
            set_export_low_power,
            set_charge_window,
            set_export_window,
            charge_low_power_margin,
            iboost: IboostParams {
                enable: iboost_enable,
                on_export: iboost_on_export,
                prevent_discharge: iboost_prevent_discharge,
                next: iboost_next,
                max_energy: iboost_max_energy,
                max_power: iboost_max_power,
                min_power: iboost_min_power,
                min_soc: iboost_min_soc,
                solar: iboost_solar,
                solar_excess: iboost_solar_excess,
                charging: iboost_charging,
                plan: iboost_plan,
                gas: iboost_gas,
                gas_export: iboost_gas_export,
                gas_scale: iboost_gas_scale,
                rate_threshold: iboost_rate_threshold,
                rate_threshold_export: iboost_rate_threshold_export,
                rate_gas,
                running: iboost_running,
                running_solar: iboost_running_solar,
                running_full: iboost_running_full,
            },
            carbon_enable,
            inverter: InverterParams {
                loss: inverter_loss,
                hybrid: inverter_hybrid,
                limit: inverter_limit,
                export_limit,
                can_charge_during_export: inverter_can_charge_during_export,
            },
            battery: BatteryParams {
                rate_min: battery_rate_min,
                rate_max_charge: battery_rate_max_charge,
                rate_max_discharge: battery_rate_max_discharge,
                rate_max_charge_scaled: battery_rate_max_charge_scaled,
                rate_max_discharge_scaled: battery_rate_max_discharge_scaled,
                charge_power_curve,
                discharge_power_curve,
                temperature: battery_temperature,
                temperature_charge_curve,
                temperature_discharge_curve,
                temperature_prediction,
                rate_max_scaling: battery_rate_max_scaling,
                rate_max_scaling_discharge: battery_rate_max_scaling_discharge,
                loss: battery_loss,
                loss_discharge: battery_loss_discharge,
            },
            best_soc_keep,
            best_soc_keep_weight,
            best_soc_min,
            rate_import,
            rate_export,
            pv_forecast,
            pv_forecast10,
            load_forecast,
            load_forecast10,
            carbon_intensity,
            alert_active_keep,
        })
    }
}
