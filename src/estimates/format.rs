//! Display strings for estimates
//!
//! Flooring of negative values happens here only; stored estimates keep their sign.

pub const UNDEFINED: &str = "undefined";

fn floor_if(value: f64, non_negative: bool) -> f64 {
    if non_negative && value < 0.0 {
        0.0
    } else {
        value
    }
}

/// `"2.00 (0.96-3.68)"`
pub fn point_with_interval(point: f64, lower: f64, upper: f64, decimals: usize) -> String {
    format!(
        "{:.prec$} ({:.prec$}-{:.prec$})",
        point,
        lower,
        upper,
        prec = decimals
    )
}

pub fn format_smr(smr: Option<(f64, f64, f64)>, decimals: usize) -> String {
    match smr {
        Some((point, lower, upper)) => point_with_interval(point, lower, upper, decimals),
        None => UNDEFINED.to_string(),
    }
}

/// AER with its interval; with `non_negative` each bound is floored at zero for presentation
pub fn format_aer(aer: Option<(f64, f64, f64)>, decimals: usize, non_negative: bool) -> String {
    match aer {
        Some((point, lower, upper)) => point_with_interval(
            floor_if(point, non_negative),
            floor_if(lower, non_negative),
            floor_if(upper, non_negative),
            decimals,
        ),
        None => UNDEFINED.to_string(),
    }
}

/// Percentage of total excess deaths, floored at zero under the same policy as AER
pub fn format_share(share: Option<f64>, decimals: usize, non_negative: bool) -> String {
    match share {
        Some(value) => format!("{:.prec$}%", floor_if(value, non_negative), prec = decimals),
        None => UNDEFINED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smr_display() {
        assert_eq!(format_smr(Some((2.0, 0.9591, 3.6781)), 2), "2.00 (0.96-3.68)");
        assert_eq!(format_smr(None, 2), "undefined");
    }

    #[test]
    fn test_aer_floor_only_when_requested() {
        let aer = Some((-12.34, -30.0, 5.5));
        assert_eq!(format_aer(aer, 1, false), "-12.3 (-30.0-5.5)");
        assert_eq!(format_aer(aer, 1, true), "0.0 (0.0-5.5)");
    }

    #[test]
    fn test_share_display() {
        assert_eq!(format_share(Some(-4.0), 0, true), "0%");
        assert_eq!(format_share(Some(37.26), 1, false), "37.3%");
        assert_eq!(format_share(None, 1, false), "undefined");
    }
}
