//! `sweeper check` command.

use std::fmt::Write;
use std::path::Path;

use crate::config::{Settings, SweepConfig};

/// Execute the `check` command.
///
/// # Errors
///
/// Returns an error string if the config cannot be loaded or resolved.
pub fn run(config: &Path) -> Result<(), String> {
    let settings = SweepConfig::load(config).and_then(|c| c.resolve()).map_err(|e| e.to_string())?;
    print!("{}", describe(&settings)?);
    Ok(())
}

/// Renders the effective settings as YAML preceded by run-wide options.
fn describe(settings: &Settings) -> Result<String, String> {
    let mut out = String::new();
    let options = &settings.options;
    let _ = writeln!(out, "# repository: {}", settings.repository.as_deref().unwrap_or("(any)"));
    let _ = writeln!(out, "# api-url: {}", settings.api_url);
    let _ = writeln!(out, "# operations-per-run: {}", options.operations_per_run);
    let _ = writeln!(out, "# remove-stale-when-updated: {}", options.remove_stale_when_updated);
    let _ = writeln!(out, "# remove-stale-when-exempt: {}", options.remove_stale_when_exempt);
    let _ = writeln!(out, "# stale-activity-grace-seconds: {}", options.activity_grace.num_seconds());
    let _ = writeln!(out, "# dry-run: {}", options.dry_run);
    let policies = serde_yaml::to_string(&settings.policies)
        .map_err(|e| format!("Failed to render policies: {e}"))?;
    out.push_str(&policies);
    Ok(out)
}
