//! Backup configuration.
//!
//! Settings come from a TOML file (`./config.toml` or
//! `$HOME/.smgmg/config.toml`), then a one-shot environment-variable merge
//! produces the final immutable value handed to the orchestrator. Nothing
//! re-reads environment state after startup.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::download::MatchPolicy;
use crate::files::{self, DestError};
use crate::names::DEFAULT_FILENAME_TEMPLATE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found in ./config.toml or $HOME/.smgmg/config.toml")]
    NotFound,
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0} can't be empty")]
    MissingValue(&'static str),
    #[error("store.force_metadata_times requires store.use_metadata_times")]
    MetadataFlags,
    #[error(transparent)]
    Destination(#[from] DestError),
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct Conf {
    pub authentication: AuthConf,
    pub store: StoreConf,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthConf {
    pub api_key: String,
    pub api_secret: String,
    pub user_token: String,
    pub user_secret: String,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StoreConf {
    /// Backup destination folder; must be an absolute, existing, writable
    /// directory.
    pub destination: String,
    /// Template for file naming.
    pub file_names: String,
    /// Template for the collision-resistant alternate naming. Empty selects
    /// the built-in key-splice default.
    pub file_names_unique: String,
    /// Fetch per-image metadata and mirror the remote timestamps onto
    /// downloaded files.
    pub use_metadata_times: bool,
    /// Also rewrite timestamps of files that were already backed up.
    pub force_metadata_times: bool,
    /// Require local MD5s to match the server-reported ones during dedup,
    /// instead of trusting sizes alone.
    pub verify_checksums: bool,
}

impl Default for StoreConf {
    fn default() -> Self {
        Self {
            destination: String::new(),
            file_names: DEFAULT_FILENAME_TEMPLATE.to_string(),
            file_names_unique: String::new(),
            use_metadata_times: false,
            force_metadata_times: false,
            verify_checksums: false,
        }
    }
}

// Credentials stay out of Debug output.
impl std::fmt::Debug for Conf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conf")
            .field("authentication.api_key", &"<redacted>")
            .field("store.destination", &self.store.destination)
            .field("store.file_names", &self.store.file_names)
            .field("store.file_names_unique", &self.store.file_names_unique)
            .field("store.use_metadata_times", &self.store.use_metadata_times)
            .field("store.force_metadata_times", &self.store.force_metadata_times)
            .field("store.verify_checksums", &self.store.verify_checksums)
            .finish_non_exhaustive()
    }
}

fn override_from_env(var: &str, field: &mut String) {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            *field = value;
        }
    }
}

impl Conf {
    /// Read the configuration file, from `path` when given, otherwise from
    /// `./config.toml` or `$HOME/.smgmg/config.toml`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path().ok_or(ConfigError::NotFound)?,
        };
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Merge environment overrides into the file-based settings, consuming
    /// and returning the value so the result reads as the single immutable
    /// configuration of the run.
    pub fn with_env_overrides(mut self) -> Self {
        override_from_env("SMGMG_BK_API_KEY", &mut self.authentication.api_key);
        override_from_env("SMGMG_BK_API_SECRET", &mut self.authentication.api_secret);
        override_from_env("SMGMG_BK_USER_TOKEN", &mut self.authentication.user_token);
        override_from_env("SMGMG_BK_USER_SECRET", &mut self.authentication.user_secret);
        override_from_env("SMGMG_BK_DESTINATION", &mut self.store.destination);
        override_from_env("SMGMG_BK_FILE_NAMES", &mut self.store.file_names);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.authentication.api_key.is_empty() {
            return Err(ConfigError::MissingValue("authentication.api_key"));
        }
        if self.authentication.api_secret.is_empty() {
            return Err(ConfigError::MissingValue("authentication.api_secret"));
        }
        if self.authentication.user_token.is_empty() {
            return Err(ConfigError::MissingValue("authentication.user_token"));
        }
        if self.authentication.user_secret.is_empty() {
            return Err(ConfigError::MissingValue("authentication.user_secret"));
        }
        if self.store.destination.is_empty() {
            return Err(ConfigError::MissingValue("store.destination"));
        }
        if self.store.force_metadata_times && !self.store.use_metadata_times {
            return Err(ConfigError::MetadataFlags);
        }
        files::check_dest_folder(self.destination())?;
        Ok(())
    }

    pub fn destination(&self) -> &Path {
        Path::new(&self.store.destination)
    }

    pub fn match_policy(&self) -> MatchPolicy {
        if self.store.verify_checksums {
            MatchPolicy::SizeAndChecksum
        } else {
            MatchPolicy::SizeOnly
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("config.toml");
    if local.is_file() {
        return Some(local);
    }
    let home = dirs::home_dir()?.join(".smgmg").join("config.toml");
    home.is_file().then_some(home)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_conf(destination: &str) -> Conf {
        Conf {
            authentication: AuthConf {
                api_key: "k".into(),
                api_secret: "s".into(),
                user_token: "t".into(),
                user_secret: "u".into(),
            },
            store: StoreConf {
                destination: destination.to_string(),
                ..StoreConf::default()
            },
        }
    }

    #[test]
    fn test_parse_full_config() {
        let conf: Conf = toml::from_str(
            r#"
            [authentication]
            api_key = "key"
            api_secret = "secret"
            user_token = "token"
            user_secret = "usecret"

            [store]
            destination = "/backups/smugmug"
            file_names = "{{.ImageKey}}-{{.FileName}}"
            file_names_unique = "{{.ImageKey}}"
            use_metadata_times = true
            force_metadata_times = true
            verify_checksums = true
            "#,
        )
        .unwrap();
        assert_eq!(conf.authentication.api_key, "key");
        assert_eq!(conf.store.destination, "/backups/smugmug");
        assert_eq!(conf.store.file_names, "{{.ImageKey}}-{{.FileName}}");
        assert!(conf.store.use_metadata_times);
        assert!(conf.store.force_metadata_times);
        assert!(conf.store.verify_checksums);
        assert_eq!(conf.match_policy(), MatchPolicy::SizeAndChecksum);
    }

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let conf: Conf = toml::from_str(
            r#"
            [authentication]
            api_key = "key"
            "#,
        )
        .unwrap();
        assert_eq!(conf.store.file_names, DEFAULT_FILENAME_TEMPLATE);
        assert_eq!(conf.store.file_names_unique, "");
        assert!(!conf.store.use_metadata_times);
        assert_eq!(conf.match_policy(), MatchPolicy::SizeOnly);
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        // All override vars exercised in one test: the variables are process
        // globals and tests run in parallel.
        env::set_var("SMGMG_BK_API_KEY", "env-key");
        env::set_var("SMGMG_BK_DESTINATION", "/env/dest");
        env::set_var("SMGMG_BK_FILE_NAMES", "{{.ImageKey}}");
        let conf = valid_conf("/file/dest").with_env_overrides();
        env::remove_var("SMGMG_BK_API_KEY");
        env::remove_var("SMGMG_BK_DESTINATION");
        env::remove_var("SMGMG_BK_FILE_NAMES");

        assert_eq!(conf.authentication.api_key, "env-key");
        assert_eq!(conf.store.destination, "/env/dest");
        assert_eq!(conf.store.file_names, "{{.ImageKey}}");
        // Untouched values survive the merge.
        assert_eq!(conf.authentication.api_secret, "s");
    }

    #[test]
    fn test_validate_rejects_empty_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut conf = valid_conf(dir.path().to_str().unwrap());
        conf.authentication.user_token.clear();
        assert!(matches!(
            conf.validate(),
            Err(ConfigError::MissingValue("authentication.user_token"))
        ));
    }

    #[test]
    fn test_validate_rejects_force_without_use() {
        let dir = tempfile::tempdir().unwrap();
        let mut conf = valid_conf(dir.path().to_str().unwrap());
        conf.store.force_metadata_times = true;
        assert!(matches!(conf.validate(), Err(ConfigError::MetadataFlags)));
    }

    #[test]
    fn test_validate_rejects_relative_destination() {
        let conf = valid_conf("relative/dest");
        assert!(matches!(
            conf.validate(),
            Err(ConfigError::Destination(DestError::NotAbsolute(_)))
        ));
    }

    #[test]
    fn test_validate_accepts_writable_absolute_destination() {
        let dir = tempfile::tempdir().unwrap();
        let conf = valid_conf(dir.path().to_str().unwrap());
        conf.validate().unwrap();
    }

    #[test]
    fn test_load_parses_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[authentication]\napi_key = \"key\"\n\n[store]\ndestination = \"/backups\"\n",
        )
        .unwrap();
        let conf = Conf::load(Some(&path)).unwrap();
        assert_eq!(conf.authentication.api_key, "key");
        assert_eq!(conf.store.destination, "/backups");
    }

    #[test]
    fn test_load_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Conf::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let conf = valid_conf("/backups");
        let rendered = format!("{conf:?}");
        assert!(!rendered.contains("\"k\""));
        assert!(rendered.contains("<redacted>"));
    }
}
