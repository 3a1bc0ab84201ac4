use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::ModgraphConfig,
};

/// Standard config file names, checked in order.
pub(crate) const CONFIG_FILENAMES: &[&str] = &[
    "modgraph.toml",
    "modgraph.yaml",
    "modgraph.yml",
    "modgraph.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<ModgraphConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./modgraph.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/modgraph/modgraph.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ModgraphConfig::default()` if no config file is found or the
/// one found fails to load.
pub fn discover_and_load() -> ModgraphConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    ModgraphConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/modgraph/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "modgraph").map(|d| d.config_dir().to_path_buf())
}

/// Parse already-substituted config text, picking the format from the
/// extension of `path` (TOML when it has none).
pub fn parse_config(raw: &str, path: &Path) -> Result<ModgraphConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("modgraph.toml");
        std::fs::write(&toml_path, "[server]\nport = 9000\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().server.port, 9000);

        let yaml_path = dir.path().join("modgraph.yaml");
        std::fs::write(&yaml_path, "server:\n  port: 9001\n").unwrap();
        assert_eq!(load_config(&yaml_path).unwrap().server.port, 9001);

        let json_path = dir.path().join("modgraph.json");
        std::fs::write(&json_path, r#"{"server": {"port": 9002}}"#).unwrap();
        assert_eq!(load_config(&json_path).unwrap().server.port, 9002);
    }

    #[test]
    fn substitutes_env_fallbacks_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modgraph.toml");
        std::fs::write(
            &path,
            "[sessions]\ncookie_name = \"${MODGRAPH_TEST_UNSET_COOKIE:-sid}\"\n",
        )
        .unwrap();
        assert_eq!(load_config(&path).unwrap().sessions.cookie_name, "sid");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = parse_config("", Path::new("modgraph.ini")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { extension } if extension == "ini"));
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = parse_config("[server\n", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn find_in_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("modgraph.json"), "{}").unwrap();
        std::fs::write(dir.path().join("modgraph.toml"), "").unwrap();
        assert_eq!(find_in(dir.path()).unwrap(), dir.path().join("modgraph.toml"));
    }
}
