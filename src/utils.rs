pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Compact coefficient list for tables, e.g. `[2.000e0, 1.000e0, ...]`
pub fn format_coefficients(coefficients: &[f64]) -> String {
    if coefficients.is_empty() {
        return "-".to_string();
    }
    let parts: Vec<String> = coefficients.iter().map(|c| format!("{:.3e}", c)).collect();
    format!("[{}]", parts.join(", "))
}
