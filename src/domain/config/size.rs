/// Parses a human-readable size such as `10MB`, `1.5 GB` or `512` into bytes.
///
/// Units are binary (1 KB = 1024 bytes) and case-insensitive. A bare number is
/// a byte count.
pub fn parse_size(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("empty size expression".to_string());
    }

    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);

    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid size number in '{}'", value))?;

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024 * 1024 * 1024 * 1024,
        other => return Err(format!("unknown size unit '{}' in '{}'", other, value)),
    };

    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(format!("size out of range: '{}'", value));
    }

    Ok(bytes.round() as u64)
}
