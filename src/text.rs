use unicode_normalization::UnicodeNormalization;

/// Canonical form of a report before it is sent for classification.
pub fn normalize_report(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n");
    let nfkc: String = unified.nfkc().collect();
    strip_control_chars(&nfkc).trim().to_string()
}

fn strip_control_chars(s: &str) -> String {
    s.chars()
        .filter(|&ch| {
            // Keep layout controls; reports rely on line structure.
            if ch == '\n' || ch == '\r' || ch == '\t' {
                return true;
            }
            !ch.is_ascii_control()
        })
        .collect()
}
