use crate::config::Config;
use anyhow::{Context, Result, bail};
use std::path::Path;

/// Built-in inclusion/exclusion criteria. Deployments normally point
/// `classification.instructions_path` at a reviewed copy of their own.
pub const DEFAULT_INSTRUCTIONS: &str = r#"You review radiology reports and decide whether the report carries an IMAGING-RELATED addendum.

An addendum is imaging-related when it adds clinical imaging content that the original report did not contain:
- a new finding that was missed or not previously reported (nodule, fracture, mass, effusion, hemorrhage, embolism, any anatomical finding);
- a significant correction of an existing finding (location, size, severity);
- a reinterpretation of a finding or a new diagnostic impression ("concerning for", "suspicious for", "consistent with").

An addendum is NOT imaging-related when it is only about:
- a transcription, dictation or typographical error, whatever the content of the correction;
- rewording or restating findings that were already reported;
- communication of results ("discussed with", "communicated to", "relayed to");
- technique, reformats, image or series numbers;
- administrative matters (signatures, billing, exam description);
- comparison updates without new findings.

If the report has no addendum section, the answer is "No".

Respond with a single JSON object and nothing else:
{"is_imaging_related": "Yes" or "No", "addendum_content": "<verbatim imaging-related addendum text, or None>"}"#;

pub fn load_instructions(cfg: &Config) -> Result<String> {
    let path = cfg.classification.instructions_path.trim();
    if path.is_empty() {
        return Ok(DEFAULT_INSTRUCTIONS.to_string());
    }
    let path = Path::new(path);
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading instructions: {}", path.display()))?;
    if raw.trim().is_empty() {
        bail!("instructions file is empty: {}", path.display());
    }
    Ok(raw)
}
