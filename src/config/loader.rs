//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{ConduitConfig, PatientNotReadyPolicy};
use crate::domain::{ConduitError, RecordType, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ConduitConfig
/// 4. Applies environment variable overrides (CONDUIT_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - An override has an unparseable value
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use conduit::config::loader::load_config;
///
/// let config = load_config("conduit.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ConduitConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConduitError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ConduitError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses, overrides and validates configuration from TOML text
///
/// # Errors
///
/// Same as [`load_config`], minus the file access.
pub fn parse_config(contents: &str) -> Result<ConduitConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: ConduitConfig = toml::from_str(&contents)
        .map_err(|e| ConduitError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ConduitError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ConduitError::Configuration(format!("Invalid placeholder pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ConduitError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn parse_override<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        ConduitError::Configuration(format!("Invalid value '{value}' for {name}: {e}"))
    })
}

fn parse_disabled_types(value: &str) -> Result<Vec<RecordType>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            RecordType::from_str(name).map_err(|e| {
                ConduitError::Configuration(format!("CONDUIT_TRANSFORM_DISABLED_TYPES: {e}"))
            })
        })
        .collect()
}

fn parse_policy(value: &str) -> Result<PatientNotReadyPolicy> {
    match value.trim() {
        "skip_patient_scoped" => Ok(PatientNotReadyPolicy::SkipPatientScoped),
        "run_without_patient" => Ok(PatientNotReadyPolicy::RunWithoutPatient),
        other => Err(ConduitError::Configuration(format!(
            "Invalid value '{other}' for CONDUIT_TRANSFORM_PATIENT_NOT_READY. Must be one of: skip_patient_scoped, run_without_patient"
        ))),
    }
}

/// Applies environment variable overrides using CONDUIT_* prefix
///
/// Environment variables follow the pattern: CONDUIT_<SECTION>_<KEY>
/// For example: CONDUIT_TRANSFORM_SUB_BATCH_SIZE, CONDUIT_OUTPUT_DIRECTORY
fn apply_env_overrides(config: &mut ConduitConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("CONDUIT_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("CONDUIT_APPLICATION_DRY_RUN") {
        config.application.dry_run = parse_override("CONDUIT_APPLICATION_DRY_RUN", &val)?;
    }

    // Transform overrides
    if let Ok(val) = std::env::var("CONDUIT_TRANSFORM_SUB_BATCH_SIZE") {
        config.transform.sub_batch_size =
            parse_override("CONDUIT_TRANSFORM_SUB_BATCH_SIZE", &val)?;
    }
    if let Ok(val) = std::env::var("CONDUIT_TRANSFORM_MAX_WORKERS") {
        config.transform.max_workers = parse_override("CONDUIT_TRANSFORM_MAX_WORKERS", &val)?;
    }
    if let Ok(val) = std::env::var("CONDUIT_TRANSFORM_DISABLED_TYPES") {
        config.transform.disabled_types = parse_disabled_types(&val)?;
    }
    if let Ok(val) = std::env::var("CONDUIT_TRANSFORM_PATIENT_NOT_READY") {
        config.transform.patient_not_ready = parse_policy(&val)?;
    }

    // Patient overrides
    if let Ok(val) = std::env::var("CONDUIT_PATIENT_REQUIRE_NATIONAL_IDENTIFIER") {
        config.patient.require_national_identifier =
            parse_override("CONDUIT_PATIENT_REQUIRE_NATIONAL_IDENTIFIER", &val)?;
    }
    if let Ok(val) = std::env::var("CONDUIT_PATIENT_NATIONAL_IDENTIFIER_SYSTEM") {
        config.patient.national_identifier_system = val;
    }

    // Output and state overrides
    if let Ok(val) = std::env::var("CONDUIT_OUTPUT_DIRECTORY") {
        config.output.directory = val;
    }
    if let Ok(val) = std::env::var("CONDUIT_STATE_PATH") {
        config.state.path = val;
    }

    // Logging overrides
    if let Ok(val) = std::env::var("CONDUIT_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_override("CONDUIT_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("CONDUIT_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("CONDUIT_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("CONDUIT_LOADER_TEST_VAR", "test_value");
        let input = "directory = \"${CONDUIT_LOADER_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result.trim_end(), "directory = \"test_value\"");
        std::env::remove_var("CONDUIT_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("CONDUIT_LOADER_MISSING_VAR");
        let input = "directory = \"${CONDUIT_LOADER_MISSING_VAR}\"";
        let result = substitute_env_vars(input);
        assert!(result.is_err());
    }

    #[test]
    fn test_substitute_skips_comments() {
        let input = "# path = \"${CONDUIT_LOADER_COMMENTED_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("${CONDUIT_LOADER_COMMENTED_VAR}"));
    }

    #[test]
    fn test_parse_disabled_types() {
        let types = parse_disabled_types("Flag, Specimen,").unwrap();
        assert_eq!(types, vec![RecordType::Flag, RecordType::Specimen]);
        assert!(parse_disabled_types("Flag,Nope").is_err());
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!(
            parse_policy("run_without_patient").unwrap(),
            PatientNotReadyPolicy::RunWithoutPatient
        );
        assert!(parse_policy("stop").is_err());
    }

    #[test]
    fn test_parse_override_reports_name() {
        let err = parse_override::<usize>("CONDUIT_TRANSFORM_MAX_WORKERS", "many").unwrap_err();
        assert!(err.to_string().contains("CONDUIT_TRANSFORM_MAX_WORKERS"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"

[transform]
sub_batch_size = 10
max_workers = 4
disabled_types = ["Flag"]

[patient]
require_national_identifier = true

[output]
directory = "/tmp/conduit-out"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.transform.sub_batch_size, 10);
        assert_eq!(config.transform.disabled_types, vec![RecordType::Flag]);
        assert!(config.patient.require_national_identifier);
        assert_eq!(config.output.directory, "/tmp/conduit-out");
    }

    #[test]
    fn test_load_config_invalid_values() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[transform]\nsub_batch_size = 0\n")
            .unwrap();
        temp_file.flush().unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("sub_batch_size"));
    }
}
