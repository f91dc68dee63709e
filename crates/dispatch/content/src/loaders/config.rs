//! Dispatch configuration loader.

use std::path::Path;

use dispatch_core::DispatchConfig;

use crate::loaders::{LoadResult, read_file};

/// Loader for dispatch configuration from TOML files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config data from a TOML file.
    ///
    /// Missing keys keep their defaults, so an empty file yields
    /// [`DispatchConfig::default`].
    pub fn load(path: &Path) -> LoadResult<DispatchConfig> {
        let content = read_file(path)?;
        Self::parse(&content)
    }

    /// Parse config data from TOML text.
    pub fn parse(content: &str) -> LoadResult<DispatchConfig> {
        let config: DispatchConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse dispatch config TOML: {}", e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use dispatch_core::NetRole;

    use super::*;

    #[test]
    fn loads_overrides_and_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "net_role = \"client\"").unwrap();
        writeln!(file, "abort_timeout_ticks = 30").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.net_role, NetRole::Client);
        assert_eq!(config.abort_timeout_ticks, Some(30));
        assert!(config.abort_invalid_dispatchers);
        assert!(config.warn_unset_references);
    }

    #[test]
    fn empty_file_is_default() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(
            ConfigLoader::load(file.path()).unwrap(),
            DispatchConfig::default()
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(ConfigLoader::parse("net_role = \"observer\"").is_err());
        assert!(ConfigLoader::load(Path::new("/nonexistent/dispatch.toml")).is_err());
    }
}
