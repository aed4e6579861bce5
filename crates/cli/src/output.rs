//! Saving the exported file and describing it to the user.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::info;

use pbi_export_core::{ExportArtifact, ExportFormat};

/// File name for an export finished at `at`, e.g. `powerbi_export_20240131_142501.pdf`.
pub fn export_file_name(format: ExportFormat, at: DateTime<Local>) -> String {
    format!(
        "powerbi_export_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Write the artifact into `directory`, creating it if needed.
pub async fn save_artifact(
    directory: &Path,
    format: ExportFormat,
    artifact: ExportArtifact,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(directory)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", directory))?;

    let path = directory.join(export_file_name(format, Local::now()));
    tokio::fs::write(&path, artifact.into_bytes())
        .await
        .with_context(|| format!("Failed to write export to {:?}", path))?;

    info!("File saved to: {}", path.display());
    Ok(path)
}

/// Format a count with comma thousands separators.
pub fn with_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
