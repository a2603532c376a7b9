//! Celestial coordinate formatting
//!
//! Plate solutions store right ascension and declination as decimal degrees;
//! these helpers render them the way observers read them.

/// Formats right ascension in degrees as `HHh MMm SS.Ss`
///
/// The angle is wrapped into `[0, 360)` first, so `-15.0` renders as
/// `23h 00m 00.0s`. Rounding that would produce `60.0s` or `60m` carries into
/// the next field.
pub fn ra_to_hms(ra_degrees: f64) -> String {
    let ra = ra_degrees.rem_euclid(360.0);
    // tenths of a second of time; 24h = 864_000
    let mut tenths = (ra / 15.0 * 36_000.0).round() as u64;
    tenths %= 864_000;

    let hours = tenths / 36_000;
    let minutes = (tenths % 36_000) / 600;
    let seconds = (tenths % 600) as f64 / 10.0;
    format!("{:02}h {:02}m {:04.1}s", hours, minutes, seconds)
}

/// Formats declination in degrees as `±DD° MM' SS"`
///
/// Values outside `[-90, 90]` are clamped.
pub fn dec_to_dms(dec_degrees: f64) -> String {
    let dec = dec_degrees.clamp(-90.0, 90.0);
    let sign = if dec < 0.0 { '-' } else { '+' };
    let total_seconds = (dec.abs() * 3600.0).round() as u64;

    let degrees = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    // -0.1" rounds to zero; print it as +00
    let sign = if total_seconds == 0 { '+' } else { sign };
    format!("{}{:02}° {:02}' {:02}\"", sign, degrees, minutes, seconds)
}
