//! # devserve-config
//!
//! Builds the one explicit [`SupervisorConfig`] the rest of the system is
//! handed by reference. Values come from a snapshot of the process
//! environment overlaid with an optional `.env`-style file; component logic
//! never reads ambient global state, and loading never mutates the process
//! environment.
//!
//! File format: `KEY=VALUE` lines, `#` comments and blank lines skipped,
//! surrounding double quotes stripped, `${VAR}` expanded against
//! file-defined keys first and the environment second. First-defined-wins:
//! a key already set in the environment is never overwritten by the file.

use devserve_common::{SupervisorError, SupervisorResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_FRONTEND_PORT: u16 = 8000;
const DEFAULT_BACKEND_PORT: u16 = 3000;
const DEFAULT_HEALTH_PATH: &str = "/api/health";
const DEFAULT_BACKEND_COMMAND: &str = "node backend/server.js";
const DEFAULT_TUNNEL_STATUS_URL: &str = "http://127.0.0.1:4040/api/tunnels";
const DEFAULT_STATIC_ROOT: &str = "frontend/public";
const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 20;

/// Resolved supervisor configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Port the static frontend server binds.
    pub frontend_port: u16,
    /// Port the backend is told to bind (forced via `PORT` in its env).
    pub backend_port: u16,
    /// Path of the backend's health endpoint.
    pub health_path: String,
    /// Backend start command, whitespace-split into argv.
    pub backend_command: Vec<String>,
    /// Local status API of the tunnel binary.
    pub tunnel_status_url: String,
    /// Which local port the tunnel exposes publicly.
    pub tunnel_port: u16,
    /// Whether to attempt starting a tunnel at all.
    pub tunnel_enabled: bool,
    /// Directory the static frontend is served from.
    pub static_root: PathBuf,
    /// Overall deadline for the backend health gate.
    pub health_timeout: Duration,
}

impl SupervisorConfig {
    /// Build the config from the process environment overlaid with an
    /// optional env file. A missing file is not an error.
    pub fn load(env_file: Option<&Path>) -> SupervisorResult<Self> {
        let environment: HashMap<String, String> = std::env::vars().collect();
        let file_values = match env_file {
            Some(path) => load_env_file(path, &environment),
            None => HashMap::new(),
        };
        Self::from_values(&environment, &file_values)
    }

    /// Build the config from explicit value maps. The environment map wins
    /// over the file map on every key.
    pub fn from_values(
        environment: &HashMap<String, String>,
        file_values: &HashMap<String, String>,
    ) -> SupervisorResult<Self> {
        let get = |key: &str| -> Option<String> {
            environment
                .get(key)
                .or_else(|| file_values.get(key))
                .cloned()
        };

        // PORT is the historical name for the frontend port; STATIC_PORT is
        // the explicit one
        let frontend_port = match get("PORT").or_else(|| get("STATIC_PORT")) {
            Some(raw) => parse_port("PORT", &raw)?,
            None => DEFAULT_FRONTEND_PORT,
        };

        let backend_port = match get("BACKEND_PORT") {
            Some(raw) => parse_port("BACKEND_PORT", &raw)?,
            None => DEFAULT_BACKEND_PORT,
        };

        let health_path = get("BACKEND_HEALTH_PATH")
            .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string());

        let backend_command: Vec<String> = get("BACKEND_START_CMD")
            .unwrap_or_else(|| DEFAULT_BACKEND_COMMAND.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if backend_command.is_empty() {
            return Err(SupervisorError::configuration(
                "BACKEND_START_CMD",
                "backend start command must not be empty",
            ));
        }

        let tunnel_status_url = get("NGROK_API_URL")
            .unwrap_or_else(|| DEFAULT_TUNNEL_STATUS_URL.to_string());

        // The tunnel fronts the backend unless told otherwise
        let tunnel_port = match get("TUNNEL_PORT") {
            Some(raw) => parse_port("TUNNEL_PORT", &raw)?,
            None => backend_port,
        };

        let static_root = PathBuf::from(
            get("STATIC_ROOT").unwrap_or_else(|| DEFAULT_STATIC_ROOT.to_string()),
        );

        let health_timeout = match get("HEALTH_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|e| {
                SupervisorError::configuration(
                    "HEALTH_TIMEOUT_SECS",
                    format!("invalid duration '{}': {}", raw, e),
                )
            })?),
            None => Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECS),
        };

        Ok(Self {
            frontend_port,
            backend_port,
            health_path,
            backend_command,
            tunnel_status_url,
            tunnel_port,
            tunnel_enabled: true,
            static_root,
            health_timeout,
        })
    }

    /// Health endpoint URL derived from the backend port and health path.
    pub fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.backend_port, self.health_path)
    }
}

fn parse_port(key: &str, raw: &str) -> SupervisorResult<u16> {
    raw.parse::<u16>().map_err(|e| {
        SupervisorError::configuration(key, format!("invalid port '{}': {}", raw, e))
    })
}

/// Parse a `.env`-style file into a key/value map, with `${VAR}` expansion.
///
/// Keys already present in `environment` are dropped from the result so the
/// environment always wins; during expansion, file-defined values shadow
/// environment values and unknown variables expand to empty.
pub fn load_env_file(path: &Path, environment: &HashMap<String, String>) -> HashMap<String, String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("Env file {} not loaded: {}", path.display(), e);
            return HashMap::new();
        }
    };

    let mut parsed: HashMap<String, String> = HashMap::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!("Skipping malformed env line: {}", line);
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim().trim_matches('"').to_string();
        parsed.insert(key, value);
    }

    parsed
        .iter()
        .filter(|(key, _)| !environment.contains_key(*key))
        .map(|(key, value)| (key.clone(), expand_vars(value, &parsed, environment)))
        .collect()
}

/// Expand `${VAR}` references against the file-defined keys first, then the
/// environment; unknown names expand to the empty string.
fn expand_vars(
    value: &str,
    parsed: &HashMap<String, String>,
    environment: &HashMap<String, String>,
) -> String {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                if let Some(v) = parsed.get(name).or_else(|| environment.get(name)) {
                    result.push_str(v);
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                // Unterminated reference, keep it literal
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_env_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::from_values(&env(&[]), &env(&[])).unwrap();
        assert_eq!(config.frontend_port, 8000);
        assert_eq!(config.backend_port, 3000);
        assert_eq!(config.health_path, "/api/health");
        assert_eq!(config.backend_command, vec!["node", "backend/server.js"]);
        assert_eq!(config.tunnel_port, 3000);
        assert_eq!(config.health_timeout, Duration::from_secs(20));
        assert_eq!(config.health_url(), "http://127.0.0.1:3000/api/health");
    }

    #[test]
    fn test_environment_wins_over_file() {
        let environment = env(&[("BACKEND_PORT", "3100")]);
        let file = env(&[("BACKEND_PORT", "9999"), ("PORT", "8100")]);
        let config = SupervisorConfig::from_values(&environment, &file).unwrap();
        assert_eq!(config.backend_port, 3100);
        assert_eq!(config.frontend_port, 8100);
    }

    #[test]
    fn test_static_port_fallback() {
        let config =
            SupervisorConfig::from_values(&env(&[("STATIC_PORT", "8200")]), &env(&[])).unwrap();
        assert_eq!(config.frontend_port, 8200);
    }

    #[test]
    fn test_invalid_port_is_configuration_error() {
        let result = SupervisorConfig::from_values(&env(&[("PORT", "not-a-port")]), &env(&[]));
        assert!(matches!(
            result,
            Err(SupervisorError::Configuration { .. })
        ));
    }

    #[test]
    fn test_tunnel_port_defaults_to_backend_port() {
        let config =
            SupervisorConfig::from_values(&env(&[("BACKEND_PORT", "3500")]), &env(&[])).unwrap();
        assert_eq!(config.tunnel_port, 3500);

        let config = SupervisorConfig::from_values(
            &env(&[("BACKEND_PORT", "3500"), ("TUNNEL_PORT", "8000")]),
            &env(&[]),
        )
        .unwrap();
        assert_eq!(config.tunnel_port, 8000);
    }

    #[test]
    fn test_env_file_parsing() {
        let file = write_env_file(
            "# comment\n\
             BACKEND_PORT=3200\n\
             \n\
             QUOTED=\"hello world\"\n\
             malformed line\n",
        );
        let values = load_env_file(file.path(), &env(&[]));
        assert_eq!(values.get("BACKEND_PORT").unwrap(), "3200");
        assert_eq!(values.get("QUOTED").unwrap(), "hello world");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_env_file_respects_existing_environment() {
        let file = write_env_file("BACKEND_PORT=9999\nOTHER=x\n");
        let environment = env(&[("BACKEND_PORT", "3100")]);
        let values = load_env_file(file.path(), &environment);
        // First-defined-wins: the file never overrides the environment
        assert!(!values.contains_key("BACKEND_PORT"));
        assert_eq!(values.get("OTHER").unwrap(), "x");
    }

    #[test]
    fn test_env_file_var_expansion() {
        let file = write_env_file(
            "HOST=127.0.0.1\n\
             BACKEND_URL=http://${HOST}:${FROM_ENV}/api\n\
             MISSING=${NO_SUCH_VAR}!\n",
        );
        let environment = env(&[("FROM_ENV", "3000")]);
        let values = load_env_file(file.path(), &environment);
        assert_eq!(values.get("BACKEND_URL").unwrap(), "http://127.0.0.1:3000/api");
        // Unknown variables expand to empty
        assert_eq!(values.get("MISSING").unwrap(), "!");
    }

    #[test]
    fn test_missing_env_file_is_not_an_error() {
        let values = load_env_file(Path::new("/nonexistent/.env"), &env(&[]));
        assert!(values.is_empty());
    }

    #[test]
    fn test_expand_unterminated_reference_kept_literal() {
        let parsed = env(&[]);
        let environment = env(&[]);
        assert_eq!(expand_vars("${OOPS", &parsed, &environment), "${OOPS");
    }
}
