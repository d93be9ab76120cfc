//! Artifact filename construction and validation of the caller-supplied
//! fragments (labels, correlation id) that end up inside it.

use anyhow::{bail, Result};

/// Characters never allowed in a filename fragment, over and above
/// whitespace: the usual cross-platform offenders plus `_`, which is
/// reserved as the component separator in generated names.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '_'];

const MAX_FRAGMENT_LEN: usize = 100;

/// Validate one filename fragment (a label or a correlation id).
///
/// Rejects empty and over-long fragments, the reserved character set, and
/// any Unicode whitespace. Error messages are part of the submission API
/// and surfaced to clients verbatim.
pub fn validate_filename_fragment(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Invalid filename \"{}\": filename cannot be empty", name);
    }
    if name.chars().count() > MAX_FRAGMENT_LEN {
        bail!("Invalid filename \"{}\": filename exceeds 100 characters", name);
    }
    if name.chars().any(|c| INVALID_CHARS.contains(&c)) {
        bail!(
            "Invalid filename \"{}\": contains invalid characters: < > : \" / \\ | ? * _",
            name
        );
    }
    if name.chars().any(char::is_whitespace) {
        bail!("Invalid filename \"{}\": contains whitespace characters", name);
    }
    Ok(())
}

/// Build the artifact filename for a task. Deterministic: identical inputs
/// always produce the identical name.
///
/// Layout: `{taskId}[_{correlationId}][_{labels joined by "-"}].{ext}`
pub fn generate_filename(
    task_id: &str,
    correlation_id: Option<&str>,
    labels: &[String],
    extension: &str,
) -> String {
    let mut name = task_id.to_string();
    if let Some(correlation_id) = correlation_id {
        name.push('_');
        name.push_str(correlation_id);
    }
    if !labels.is_empty() {
        name.push('_');
        name.push_str(&labels.join("-"));
    }
    name.push('.');
    name.push_str(extension);
    name
}
