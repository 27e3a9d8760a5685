//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::AppConfig;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from a TOML file.
///
/// Only syntax is checked here; the `[proxy]` section is validated when it is
/// handed to the controller, so a bad file still reports through the usual
/// status channel.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[proxy]\ntarget_url = \"http://127.0.0.1:9000\"\nport = 4100\n\n[server]\nrestart_grace_ms = 50"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.proxy.port, 4100);
        assert_eq!(config.server.restart_grace_ms, 50);
    }

    #[test]
    fn reports_parse_and_io_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[proxy\nport = ").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));

        let missing = file.path().with_extension("missing");
        assert!(matches!(load_config(&missing), Err(ConfigError::Io(_))));
    }
}
