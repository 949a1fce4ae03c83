use std::collections::HashMap;

use tracing::warn;

/// Property keys, shared by the properties file and the env-var mapping.
pub mod keys {
    pub const URL: &str = "url";
    pub const PRIVATE_TOKEN: &str = "privateToken";
    pub const PROJECT_ID: &str = "projectId";
    pub const CONFIGURATION_ID: &str = "configurationId";
    pub const TEST_RUN_ID: &str = "testRunId";
    pub const TEST_RUN_NAME: &str = "testRunName";
    pub const ADAPTER_MODE: &str = "adapterMode";
    pub const AUTOMATIC_CREATION_TEST_CASES: &str = "automaticCreationTestCases";
    pub const AUTOMATIC_UPDATION_LINKS_TO_TEST_CASES: &str = "automaticUpdationLinksToTestCases";
    pub const CERT_VALIDATION: &str = "certValidation";
    pub const TMS_INTEGRATION: &str = "testIt";
}

const ENV_VARS: &[(&str, &str)] = &[
    (keys::URL, "TMS_URL"),
    (keys::PRIVATE_TOKEN, "TMS_PRIVATE_TOKEN"),
    (keys::PROJECT_ID, "TMS_PROJECT_ID"),
    (keys::CONFIGURATION_ID, "TMS_CONFIGURATION_ID"),
    (keys::TEST_RUN_ID, "TMS_TEST_RUN_ID"),
    (keys::TEST_RUN_NAME, "TMS_TEST_RUN_NAME"),
    (keys::ADAPTER_MODE, "TMS_ADAPTER_MODE"),
    (
        keys::AUTOMATIC_CREATION_TEST_CASES,
        "TMS_AUTOMATIC_CREATION_TEST_CASES",
    ),
    (
        keys::AUTOMATIC_UPDATION_LINKS_TO_TEST_CASES,
        "TMS_AUTOMATIC_UPDATION_LINKS_TO_TEST_CASES",
    ),
    (keys::CERT_VALIDATION, "TMS_CERT_VALIDATION"),
    (keys::TMS_INTEGRATION, "TMS_TEST_IT"),
];

pub const CONFIG_FILE_ENV_VAR: &str = "TMS_CONFIG_FILE";

/// How the adapter treats the configured test run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdapterMode {
    /// Report into the configured run and filter tests by its plan.
    #[default]
    UseFilter,
    /// Report into the configured run, ignore its plan.
    RunAllTests,
    /// Always create a fresh run, even when one is configured.
    NewTestRun,
}

impl AdapterMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "0" => Some(AdapterMode::UseFilter),
            "1" => Some(AdapterMode::RunAllTests),
            "2" => Some(AdapterMode::NewTestRun),
            _ => None,
        }
    }
}

/// Connection-level configuration consumed by the writer and the client.
///
/// `test_run_id` is the one field that mutates after construction: it is
/// written exactly once when the run id is resolved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientConfig {
    pub url: Option<String>,
    pub private_token: Option<String>,
    pub project_id: Option<String>,
    pub configuration_id: Option<String>,
    pub test_run_id: Option<String>,
    pub test_run_name: Option<String>,
    pub cert_validation: bool,
    pub automatic_link_updates: bool,
}

/// Behavior switches for the lifecycle manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterConfig {
    pub mode: AdapterMode,
    pub automatic_creation_test_cases: bool,
    /// The single global feature gate: when false every lifecycle call is a
    /// no-op.
    pub tms_integration: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            mode: AdapterMode::UseFilter,
            automatic_creation_test_cases: false,
            tms_integration: true,
        }
    }
}

/// Parses `key=value` properties. Blank lines and `#`/`!` comments are
/// skipped; first occurrence of a key wins within one source.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!(line, "skipping malformed property line");
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if !key.is_empty() && !value.is_empty() {
            properties.entry(key.to_string()).or_insert_with(|| value.to_string());
        }
    }
    properties
}

/// The literal string "null" in any case marks an absent value.
fn coerce(value: Option<&String>) -> Option<String> {
    value
        .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("null"))
        .cloned()
}

fn parse_bool(value: Option<&String>, default: bool) -> bool {
    match value {
        Some(value) => value.eq_ignore_ascii_case("true") || (default && !value.eq_ignore_ascii_case("false")),
        None => default,
    }
}

/// Merges configuration sources (file properties, then environment) and
/// materializes the two config structs.
#[derive(Clone, Debug, Default)]
pub struct ConfigManager {
    properties: HashMap<String, String>,
}

impl ConfigManager {
    pub fn new(properties: HashMap<String, String>) -> Self {
        Self { properties }
    }

    /// Loads the properties file named by `TMS_CONFIG_FILE` (when set and
    /// readable), then overrides with `TMS_*` environment variables.
    pub fn from_env() -> Self {
        let mut properties = HashMap::new();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV_VAR) {
            match std::fs::read_to_string(&path) {
                Ok(content) => properties = parse_properties(&content),
                Err(error) => warn!(%path, %error, "cannot read TMS config file"),
            }
        }
        for (key, env_name) in ENV_VARS {
            if let Ok(value) = std::env::var(env_name) {
                if !value.is_empty() {
                    properties.insert((*key).to_string(), value);
                }
            }
        }
        Self { properties }
    }

    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig {
            url: coerce(self.properties.get(keys::URL))
                .map(|url| url.trim_end_matches('/').to_string()),
            private_token: coerce(self.properties.get(keys::PRIVATE_TOKEN)),
            project_id: coerce(self.properties.get(keys::PROJECT_ID)),
            configuration_id: coerce(self.properties.get(keys::CONFIGURATION_ID)),
            test_run_id: coerce(self.properties.get(keys::TEST_RUN_ID)),
            test_run_name: coerce(self.properties.get(keys::TEST_RUN_NAME)),
            cert_validation: parse_bool(self.properties.get(keys::CERT_VALIDATION), true),
            automatic_link_updates: parse_bool(
                self.properties.get(keys::AUTOMATIC_UPDATION_LINKS_TO_TEST_CASES),
                false,
            ),
        };
        if self.adapter_config().tms_integration {
            for (field, value) in [
                ("url", &config.url),
                ("privateToken", &config.private_token),
                ("projectId", &config.project_id),
                ("configurationId", &config.configuration_id),
            ] {
                if value.is_none() {
                    warn!(field, "required TMS property is missing; reporting will degrade");
                }
            }
        }
        config
    }

    pub fn adapter_config(&self) -> AdapterConfig {
        let mode = self
            .properties
            .get(keys::ADAPTER_MODE)
            .and_then(|value| AdapterMode::parse(value))
            .unwrap_or_default();
        AdapterConfig {
            mode,
            automatic_creation_test_cases: parse_bool(
                self.properties.get(keys::AUTOMATIC_CREATION_TEST_CASES),
                false,
            ),
            tms_integration: parse_bool(self.properties.get(keys::TMS_INTEGRATION), true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(pairs: &[(&str, &str)]) -> ConfigManager {
        ConfigManager::new(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    #[test]
    fn parse_properties_skips_comments_and_keeps_first_value() {
        let properties = parse_properties(
            "# comment\n! other comment\nurl = https://tms.example.com\nurl = ignored\n\nbroken line\nprojectId=p1\n",
        );
        assert_eq!(
            properties.get("url").map(String::as_str),
            Some("https://tms.example.com")
        );
        assert_eq!(properties.get("projectId").map(String::as_str), Some("p1"));
        assert_eq!(properties.len(), 2);
    }

    #[test]
    fn null_values_are_treated_as_absent() {
        let config = manager(&[
            ("url", "https://tms.example.com/"),
            ("testRunId", "null"),
            ("projectId", "NULL"),
        ])
        .client_config();
        assert_eq!(config.url.as_deref(), Some("https://tms.example.com"));
        assert_eq!(config.test_run_id, None);
        assert_eq!(config.project_id, None);
    }

    #[test]
    fn adapter_config_defaults_match_baseline() {
        let config = ConfigManager::default().adapter_config();
        assert_eq!(config.mode, AdapterMode::UseFilter);
        assert!(!config.automatic_creation_test_cases);
        assert!(config.tms_integration);
    }

    #[test]
    fn adapter_mode_and_gates_parse() {
        let config = manager(&[
            ("adapterMode", "2"),
            ("automaticCreationTestCases", "TRUE"),
            ("testIt", "false"),
        ])
        .adapter_config();
        assert_eq!(config.mode, AdapterMode::NewTestRun);
        assert!(config.automatic_creation_test_cases);
        assert!(!config.tms_integration);
    }

    #[test]
    fn invalid_adapter_mode_falls_back_to_default() {
        let config = manager(&[("adapterMode", "7")]).adapter_config();
        assert_eq!(config.mode, AdapterMode::UseFilter);
    }

    #[test]
    fn cert_validation_defaults_on_and_disables_explicitly() {
        assert!(manager(&[]).client_config().cert_validation);
        let config = manager(&[("certValidation", "false")]).client_config();
        assert!(!config.cert_validation);
    }
}
