//! Display formatting for DICOM date, time and person name values

/// `YYYYMMDD` to `YYYY-MM-DD`. Anything else is returned unchanged.
pub fn format_dicom_date(value: &str) -> String {
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &value[0..4], &value[4..6], &value[6..8])
    } else {
        value.to_string()
    }
}

/// `HHMMSS[.ffffff]` to `HH:MM:SS`; fractional seconds are dropped.
/// Values shorter than six characters are returned unchanged.
pub fn format_dicom_time(value: &str) -> String {
    match value.get(0..6) {
        Some(hms) if hms.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{}:{}:{}", &hms[0..2], &hms[2..4], &hms[4..6])
        }
        _ => value.to_string(),
    }
}

/// `Family^Given^...` to `Given Family`, trimmed
pub fn format_dicom_patient_name(value: &str) -> String {
    let mut components = value.split('^');
    let family = components.next().unwrap_or_default().trim();
    let given = components.next().unwrap_or_default().trim();
    format!("{} {}", given, family).trim().to_string()
}
