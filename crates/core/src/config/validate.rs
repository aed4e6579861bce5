use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Tenant, client, secret, group and report ids are present
/// - Export format is one of PDF, PPTX, PNG
/// - Endpoints and scope are not blank
/// - Polling interval and max wait are non-zero
/// - Retry settings are usable
///
/// All problems are collected and reported together.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();
    let pbi = &config.powerbi;

    let required = [
        ("powerbi.tenant_id", &pbi.tenant_id),
        ("powerbi.client_id", &pbi.client_id),
        ("powerbi.client_secret", &pbi.client_secret),
        ("powerbi.group_id", &pbi.group_id),
        ("powerbi.report_id", &pbi.report_id),
        ("powerbi.scope", &pbi.scope),
        ("powerbi.authority_host", &pbi.authority_host),
        ("powerbi.base_url", &pbi.base_url),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            errors.push(format!("{} is required", key));
        }
    }

    if config.export.export_format().is_err() {
        errors.push(format!(
            "export.format '{}' is not valid. Supported formats: PDF, PPTX, PNG",
            config.export.format
        ));
    }

    if config.export.polling_interval_secs == 0 {
        errors.push("export.polling_interval_secs cannot be 0".to_string());
    }

    if config.export.max_wait_minutes == 0 {
        errors.push("export.max_wait_minutes cannot be 0".to_string());
    }

    if pbi.request_timeout_secs == 0 {
        errors.push("powerbi.request_timeout_secs cannot be 0".to_string());
    }

    if config.retry.max_attempts == 0 {
        errors.push("retry.max_attempts cannot be 0".to_string());
    }

    if config.retry.backoff_multiplier < 1.0 {
        errors.push("retry.backoff_multiplier must be at least 1.0".to_string());
    }

    if errors.is_empty() {
        return Ok(());
    }

    let listing = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::ValidationError(listing))
}
