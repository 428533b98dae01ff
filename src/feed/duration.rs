/// Parse an `itunes:duration` value into whole seconds.
///
/// Accepts plain seconds (`"1234"`, `"1234.5"`), `MM:SS` and `HH:MM:SS`.
/// Returns `None` for anything else.
pub fn parse_duration_secs(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.contains(':') {
        return parse_clock(raw);
    }

    parse_seconds(raw)
}

fn parse_seconds(raw: &str) -> Option<u64> {
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }

    // Fractional seconds are truncated
    let secs = raw.parse::<f64>().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| secs.trunc() as u64)
}

fn parse_clock(raw: &str) -> Option<u64> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();

    let (hours, mins, secs) = match parts.as_slice() {
        [m, s] => (0, m.parse::<u64>().ok()?, parse_seconds(s)?),
        [h, m, s] => (
            h.parse::<u64>().ok()?,
            m.parse::<u64>().ok()?,
            parse_seconds(s)?,
        ),
        _ => return None,
    };

    hours
        .checked_mul(3600)?
        .checked_add(mins.checked_mul(60)?)?
        .checked_add(secs)
}
