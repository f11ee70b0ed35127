//! Named PCE connection profiles stored in `pce.toml`.
//!
//! ```toml
//! default = "prod"
//! [pce.prod]
//! fqdn = "pce.example.com"
//! port = 8443
//! org = 1
//! api_user = "api_1"
//! api_key = "secret"
//! ```
//!
//! `PCE_*` environment variables override the selected profile; when
//! `PCE_FQDN` is set the file may be absent entirely.

use crate::core::error::{PceError, PceResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "PCECTL_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "pce.toml";

fn default_port() -> u16 {
    8443
}

fn default_org() -> u32 {
    1
}

fn default_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PceProfile {
    pub fqdn: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_org")]
    pub org: u32,
    #[serde(default)]
    pub api_user: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub disable_tls: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl PceProfile {
    fn from_fqdn(fqdn: String) -> Self {
        Self {
            fqdn,
            port: default_port(),
            org: default_org(),
            api_user: String::new(),
            api_key: String::new(),
            disable_tls: false,
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub pce: BTreeMap<String, PceProfile>,
}

/// `$PCECTL_CONFIG`, else `./pce.toml`.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

impl ConfigFile {
    /// A missing file is an empty config, not an error.
    pub fn load(path: &Path) -> PceResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(PceError::IoError)?;
        toml::from_str(&content)
            .map_err(|e| PceError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> PceResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| PceError::ConfigError(e.to_string()))?;
        fs::write(path, content).map_err(PceError::IoError)
    }

    pub fn upsert(&mut self, name: &str, profile: PceProfile, make_default: bool) {
        self.pce.insert(name.to_string(), profile);
        if make_default || self.default.is_none() {
            self.default = Some(name.to_string());
        }
    }

    fn select(&self, name: Option<&str>) -> PceResult<Option<PceProfile>> {
        let name = match name.or(self.default.as_deref()) {
            Some(n) => n,
            None if self.pce.len() == 1 => return Ok(self.pce.values().next().cloned()),
            None => return Ok(None),
        };
        self.pce
            .get(name)
            .cloned()
            .map(Some)
            .ok_or_else(|| PceError::ConfigError(format!("no PCE profile named '{}'", name)))
    }

    /// Pick the profile for this run and apply environment overrides.
    pub fn resolve<F>(&self, name: Option<&str>, env: F) -> PceResult<PceProfile>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut profile = match (self.select(name)?, env("PCE_FQDN")) {
            (Some(p), _) => p,
            (None, Some(fqdn)) => PceProfile::from_fqdn(fqdn),
            (None, None) => {
                return Err(PceError::ConfigError(
                    "no PCE configured. Run `pcectl pce-add` or set PCE_FQDN.".into(),
                ));
            }
        };

        if let Some(fqdn) = env("PCE_FQDN") {
            profile.fqdn = fqdn;
        }
        if let Some(port) = env("PCE_PORT") {
            profile.port = port
                .parse()
                .map_err(|_| PceError::ConfigError(format!("invalid PCE_PORT '{}'", port)))?;
        }
        if let Some(org) = env("PCE_ORG") {
            profile.org = org
                .parse()
                .map_err(|_| PceError::ConfigError(format!("invalid PCE_ORG '{}'", org)))?;
        }
        if let Some(user) = env("PCE_API_USER") {
            profile.api_user = user;
        }
        if let Some(key) = env("PCE_API_KEY") {
            profile.api_key = key;
        }
        if let Some(flag) = env("PCE_DISABLE_TLS") {
            profile.disable_tls = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        if profile.api_user.is_empty() || profile.api_key.is_empty() {
            return Err(PceError::ConfigError(format!(
                "PCE profile for {} has no API credentials",
                profile.fqdn
            )));
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile(fqdn: &str) -> PceProfile {
        PceProfile {
            api_user: "api_1".into(),
            api_key: "k".into(),
            ..PceProfile::from_fqdn(fqdn.into())
        }
    }

    #[test]
    fn save_then_load_keeps_default() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("pce.toml");
        let mut cfg = ConfigFile::default();
        cfg.upsert("lab", profile("lab.example.com"), false);
        cfg.upsert("prod", profile("prod.example.com"), true);
        cfg.save(&path).unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.default.as_deref(), Some("prod"));
        let p = loaded.resolve(None, |_| None).unwrap();
        assert_eq!(p.fqdn, "prod.example.com");
        let p = loaded.resolve(Some("lab"), |_| None).unwrap();
        assert_eq!(p.fqdn, "lab.example.com");
    }

    #[test]
    fn env_overrides_apply_without_file() {
        let cfg = ConfigFile::default();
        let p = cfg
            .resolve(None, |k| match k {
                "PCE_FQDN" => Some("env.example.com".into()),
                "PCE_PORT" => Some("443".into()),
                "PCE_API_USER" => Some("u".into()),
                "PCE_API_KEY" => Some("k".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(p.fqdn, "env.example.com");
        assert_eq!(p.port, 443);
        assert_eq!(p.org, 1);
    }

    #[test]
    fn unknown_profile_is_config_error() {
        let mut cfg = ConfigFile::default();
        cfg.upsert("prod", profile("prod.example.com"), true);
        let err = cfg.resolve(Some("dev"), |_| None).unwrap_err();
        assert!(matches!(err, PceError::ConfigError(_)));
    }

    #[test]
    fn missing_credentials_rejected() {
        let mut cfg = ConfigFile::default();
        cfg.upsert("prod", PceProfile::from_fqdn("p".into()), true);
        assert!(cfg.resolve(None, |_| None).is_err());
    }
}
