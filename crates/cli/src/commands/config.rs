use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tabletalk_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let entries: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "TABLETALK_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "TABLETALK_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "TABLETALK_DATABASE_TIMEOUT_SECS",
        ),
        ("llm.provider", config.llm.provider.as_str().to_string(), "TABLETALK_LLM_PROVIDER"),
        ("llm.model", config.llm.model.clone(), "TABLETALK_LLM_MODEL"),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "TABLETALK_LLM_BASE_URL",
        ),
        ("llm.api_key", api_key.to_string(), "TABLETALK_LLM_API_KEY"),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), "TABLETALK_LLM_TIMEOUT_SECS"),
        ("llm.max_retries", config.llm.max_retries.to_string(), "TABLETALK_LLM_MAX_RETRIES"),
        (
            "router.confidence_threshold",
            config.router.confidence_threshold.to_string(),
            "TABLETALK_ROUTER_CONFIDENCE_THRESHOLD",
        ),
        (
            "router.query_timeout_secs",
            config.router.query_timeout_secs.to_string(),
            "TABLETALK_ROUTER_QUERY_TIMEOUT_SECS",
        ),
        (
            "router.max_result_rows",
            config.router.max_result_rows.to_string(),
            "TABLETALK_ROUTER_MAX_RESULT_ROWS",
        ),
        (
            "router.history_turns",
            config.router.history_turns.to_string(),
            "TABLETALK_ROUTER_HISTORY_TURNS",
        ),
        (
            "router.summary_max_chars",
            config.router.summary_max_chars.to_string(),
            "TABLETALK_ROUTER_SUMMARY_MAX_CHARS",
        ),
        (
            "router.on_missing_limit",
            config.router.on_missing_limit.as_str().to_string(),
            "TABLETALK_ROUTER_ON_MISSING_LIMIT",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "TABLETALK_SERVER_BIND_ADDRESS"),
        ("server.api_port", config.server.api_port.to_string(), "TABLETALK_SERVER_API_PORT"),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "TABLETALK_SERVER_HEALTH_CHECK_PORT",
        ),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "TABLETALK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        ("logging.level", config.logging.level.clone(), "TABLETALK_LOGGING_LEVEL"),
        ("logging.format", config.logging.format.as_str().to_string(), "TABLETALK_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in entries {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {key} = {value} (source: {source})"));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("tabletalk.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/tabletalk.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
