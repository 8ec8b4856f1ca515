//! A candidate plan: the payload of one `PRED` frame.

use std::io::Read;

use itertools::Itertools;

use crate::protocol::{Decoder, ProtocolError};

/// Half-open interval of absolute minutes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn contains(&self, minute: i64) -> bool {
        (self.start..self.end).contains(&minute)
    }
}

#[derive(Clone, Debug)]
pub struct Plan {
    /// Target SOC in kWh, one per charge window.
    pub charge_limit: Vec<f64>,
    pub charge_window: Vec<Window>,

    pub export_window: Vec<Window>,
    /// Export limit percent, one per export window: 0..=98 limit the
    /// discharge floor, 99 means freeze, 100 means inactive.
    pub export_limits: Vec<f64>,

    /// Use the 10th-percentile PV and load forecasts.
    pub pv10: bool,

    /// Absolute minute beyond which accounting stops.
    pub end_record: i64,

    /// Simulation step in minutes, a positive multiple of 5.
    pub step: i64,
}

impl Plan {
    pub fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, ProtocolError> {
        let charge_limit_len = decoder.read_len()?;
        let charge_limit = decoder.read_array(charge_limit_len)?;
        let charge_window_len = decoder.read_len()?;
        let charge_window = decode_windows(decoder, charge_window_len)?;
        let export_window_len = decoder.read_len()?;
        let export_window = decode_windows(decoder, export_window_len)?;
        let export_limits_len = decoder.read_len()?;
        let export_limits = decoder.read_array(export_limits_len)?;
        let pv10 = decoder.read_bool()?;
        let end_record = decoder.read_int()?;
        let step = decoder.read_int()?;
        if step <= 0 || step % 5 != 0 {
            return Err(ProtocolError::InvalidStep(step));
        }
        Ok(Self { charge_limit, charge_window, export_window, export_limits, pv10, end_record, step })
    }
}

/// Windows travel as a flat scalar sequence of (start, end) pairs.
#[expect(clippy::cast_possible_truncation)]
fn decode_windows<R: Read>(
    decoder: &mut Decoder<R>,
    len: usize,
) -> Result<Vec<Window>, ProtocolError> {
    Ok(decoder
        .read_array(len * 2)?
        .into_iter()
        .tuples()
        .map(|(start, end)| Window { start: start as i64, end: end as i64 })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Encoder;

    #[test]
    fn test_decode() {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer);
        encoder.write_int(1).unwrap(); // charge limits
        encoder.write_scalar(9.5).unwrap();
        encoder.write_int(1).unwrap(); // charge windows
        encoder.write_array(&[0.0, 60.0]).unwrap();
        encoder.write_int(2).unwrap(); // export windows
        encoder.write_array(&[60.0, 90.0, 90.0, 120.0]).unwrap();
        encoder.write_int(2).unwrap(); // export limits
        encoder.write_array(&[100.0, 4.0]).unwrap();
        encoder.write_bool(true).unwrap();
        encoder.write_int(120).unwrap();
        encoder.write_int(5).unwrap();

        let plan = Plan::decode(&mut Decoder::new(buffer.as_slice())).unwrap();
        assert_eq!(plan.charge_limit, [9.5]);
        assert_eq!(plan.charge_window, [Window { start: 0, end: 60 }]);
        assert_eq!(plan.export_window[1], Window { start: 90, end: 120 });
        assert_eq!(plan.export_limits, [100.0, 4.0]);
        assert!(plan.pv10);
        assert_eq!(plan.end_record, 120);
        assert_eq!(plan.step, 5);
    }

    #[test]
    fn test_window_contains() {
        let window = Window { start: 30, end: 60 };
        assert!(!window.contains(29));
        assert!(window.contains(30));
        assert!(window.contains(59));
        assert!(!window.contains(60));
    }
}
