//! Charge/export window lookup.

use crate::plan::Window;

/// Index of the charge window covering a minute, skipping windows whose
/// target is zero. First match wins.
pub fn active_charge_window(windows: &[Window], targets: &[f64], minute: i64) -> Option<usize> {
    windows
        .iter()
        .zip(targets)
        .position(|(window, &target)| window.contains(minute) && target > 0.0)
}

/// Index of the export window covering a minute, skipping windows at the
/// 100% "inactive" sentinel. First match wins.
pub fn active_export_window(windows: &[Window], limits: &[f64], minute: i64) -> Option<usize> {
    windows
        .iter()
        .zip(limits)
        .position(|(window, &limit)| window.contains(minute) && limit < 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_window_skips_zero_target() {
        let windows = [Window { start: 0, end: 60 }, Window { start: 30, end: 90 }];
        let targets = [0.0, 5.0];
        assert_eq!(active_charge_window(&windows, &targets, 15), None);
        assert_eq!(active_charge_window(&windows, &targets, 45), Some(1));
        assert_eq!(active_charge_window(&windows, &targets, 90), None);
    }

    #[test]
    fn test_export_window_sentinels() {
        let windows = [Window { start: 0, end: 60 }, Window { start: 60, end: 120 }];
        // 100 = inactive, 0 = export everything above the floor:
        let limits = [100.0, 0.0];
        assert_eq!(active_export_window(&windows, &limits, 30), None);
        assert_eq!(active_export_window(&windows, &limits, 60), Some(1));
    }

    #[test]
    fn test_first_match_wins() {
        let windows = [Window { start: 0, end: 60 }, Window { start: 0, end: 60 }];
        let limits = [50.0, 20.0];
        assert_eq!(active_export_window(&windows, &limits, 0), Some(0));
    }
}
