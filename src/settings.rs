use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const CONFIG_BASENAME: &str = "wet_postcodes";
const ENV_PREFIX: &str = "WETPC";

/// Region and crawl settings. Defaults target Bristol on `.co.uk` pages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Outward-code prefix every kept postcode must start with.
    pub area_prefix: String,
    /// Value of `WARC-Identified-Content-Language` a page must carry.
    pub language: String,
    /// Literal substring a target URI must contain, trailing slash included.
    pub domain_marker: String,
    /// Base URL segment paths are appended to.
    pub server: String,
    /// Column of the reference CSV holding canonical postcodes.
    pub lookup_column: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            area_prefix: "BS".into(),
            language: "eng".into(),
            domain_marker: ".co.uk/".into(),
            server: "https://data.commoncrawl.org/".into(),
            lookup_column: "pcds".into(),
        }
    }
}

impl Settings {
    /// Defaults, then `wet_postcodes.toml` if present, then `WETPC_*` env vars.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(CONFIG_BASENAME).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to read settings")?;
        settings
            .try_deserialize()
            .context("Failed to parse settings")
    }

    #[cfg(test)]
    pub fn load_file(path: &std::path::Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .build()
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        Ok(settings.try_deserialize()?)
    }

    /// Marker without its trailing slash, e.g. `.co.uk`.
    pub fn domain_suffix(&self) -> &str {
        self.domain_marker.trim_end_matches('/')
    }

    /// Suffix a landing-page url ends with, e.g. `.co.uk/`.
    pub fn landing_suffix(&self) -> String {
        format!("{}/", self.domain_suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_bristol() {
        let s = Settings::default();
        assert_eq!(s.area_prefix, "BS");
        assert_eq!(s.language, "eng");
        assert_eq!(s.domain_suffix(), ".co.uk");
        assert_eq!(s.landing_suffix(), ".co.uk/");
    }

    #[test]
    fn file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.toml");
        std::fs::write(&path, "area_prefix = \"BA\"\ndomain_marker = \".org.uk/\"\n").unwrap();

        let s = Settings::load_file(&path).unwrap();
        assert_eq!(s.area_prefix, "BA");
        assert_eq!(s.landing_suffix(), ".org.uk/");
        assert_eq!(s.language, "eng");
        assert_eq!(s.lookup_column, "pcds");
    }
}
