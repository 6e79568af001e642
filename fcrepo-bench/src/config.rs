//! Configuration for a benchmark run.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//!
//! 1. Command line flags (see [`cli`](crate::cli))
//! 2. Environment variables (prefixed with `FCBENCH__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `FCBENCH__` as a prefix, for example:
//!
//! - `FCBENCH__URL=http://localhost:8080/fcrepo` sets the repository endpoint
//! - `FCBENCH__ACTION=READ` sets the benchmarked action
//! - `FCBENCH__SIZE=1MiB` sets the datastream size
//!
//! # YAML Configuration File
//!
//! ```yaml
//! url: http://localhost:8080/fcrepo
//! variant: FCREPO4
//! action: UPDATE
//! num_binaries: 1000
//! size: 1MiB
//! threads: 8
//! log_file: durations.log
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "FCBENCH__";

/// The lifecycle action measured by a benchmark run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Add a datastream to each prepared object.
    #[serde(alias = "create")]
    Create,
    /// Read back the datastream of each prepared object.
    #[serde(alias = "read")]
    Read,
    /// Replace the datastream of each prepared object.
    #[serde(alias = "update")]
    Update,
    /// Delete the datastream of each prepared object.
    #[serde(alias = "delete")]
    Delete,
}

impl Action {
    /// Returns `true` if the objects need a datastream before this action can be measured.
    pub fn requires_datastreams(self) -> bool {
        matches!(self, Action::Read | Action::Update | Action::Delete)
    }

    /// Returns `true` if the datastreams are still present after this action has run.
    ///
    /// This is the flag passed to [`Repository::purge_objects`](crate::remote::Repository::purge_objects).
    pub fn leaves_datastreams(self) -> bool {
        self != Action::Delete
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Read => "READ",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Action::Create),
            "READ" => Ok(Action::Read),
            "UPDATE" => Ok(Action::Update),
            "DELETE" => Ok(Action::Delete),
            _ => Err(format!(
                "unknown action `{s}`, expected one of CREATE, READ, UPDATE, DELETE"
            )),
        }
    }
}

/// The flavor of the repository's REST API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum RepositoryVariant {
    /// Fedora Commons 3.x (`/objects` API).
    #[serde(rename = "FCREPO3", alias = "fcrepo3")]
    Fcrepo3,
    /// Fedora Commons 4.x (`/rest` API).
    #[serde(rename = "FCREPO4", alias = "fcrepo4")]
    Fcrepo4,
}

impl RepositoryVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            RepositoryVariant::Fcrepo3 => "FCREPO3",
            RepositoryVariant::Fcrepo4 => "FCREPO4",
        }
    }
}

impl fmt::Display for RepositoryVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FCREPO3" => Ok(RepositoryVariant::Fcrepo3),
            "FCREPO4" => Ok(RepositoryVariant::Fcrepo4),
            _ => Err(format!(
                "unknown repository variant `{s}`, expected FCREPO3 or FCREPO4"
            )),
        }
    }
}

/// Parameters of a single benchmark run.
///
/// The configuration is immutable once the run has started.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// The action to measure.
    ///
    /// # Default
    ///
    /// `CREATE`
    pub action: Action,

    /// Base URL of the repository, without the `/rest` or `/objects` suffix.
    ///
    /// # Default
    ///
    /// `http://localhost:8080/fcrepo`
    pub url: String,

    /// The REST API flavor spoken by the repository.
    ///
    /// # Default
    ///
    /// `FCREPO4`
    pub variant: RepositoryVariant,

    /// Number of objects, and therefore actions, in the run.
    ///
    /// # Default
    ///
    /// `1`
    pub num_binaries: usize,

    /// Size of each datastream.
    ///
    /// # Default
    ///
    /// `1 KiB`
    pub size: ByteSize,

    /// Number of concurrent workers.
    ///
    /// # Default
    ///
    /// `1`
    pub threads: usize,

    /// Optional file receiving one line per object with its action duration in milliseconds.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            action: Action::Create,
            url: "http://localhost:8080/fcrepo".to_owned(),
            variant: RepositoryVariant::Fcrepo4,
            num_binaries: 1,
            size: ByteSize::kib(1),
            threads: 1,
            log_file: None,
        }
    }
}

impl Config {
    /// Loads the configuration from defaults, an optional YAML file, and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Checks the invariants a run relies on.
    pub fn validate(&self) -> Result<()> {
        if self.num_binaries == 0 {
            anyhow::bail!("the number of binaries must be at least 1");
        }
        if self.threads == 0 {
            anyhow::bail!("the number of threads must be at least 1");
        }
        if self.url.is_empty() {
            anyhow::bail!("the repository url must not be empty");
        }
        Ok(())
    }

    /// The datastream size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();
            assert_eq!(config, Config::default());
            config.validate().unwrap();
            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("FCBENCH__ACTION", "READ");
            jail.set_env("FCBENCH__URL", "http://fedora:8080/fedora");
            jail.set_env("FCBENCH__VARIANT", "FCREPO3");
            jail.set_env("FCBENCH__NUM_BINARIES", "250");
            jail.set_env("FCBENCH__SIZE", "2MiB");
            jail.set_env("FCBENCH__THREADS", "4");

            let config = Config::load(None).unwrap();

            assert_eq!(config.action, Action::Read);
            assert_eq!(config.url, "http://fedora:8080/fedora");
            assert_eq!(config.variant, RepositoryVariant::Fcrepo3);
            assert_eq!(config.num_binaries, 250);
            assert_eq!(config.size_bytes(), 2 * 1024 * 1024);
            assert_eq!(config.threads, 4);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            action: update
            num_binaries: 10
            size: 1048576
            threads: 2
            log_file: /tmp/durations.log
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("FCBENCH__THREADS", "8");

            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.action, Action::Update);
            assert_eq!(config.num_binaries, 10);
            assert_eq!(config.size_bytes(), 1_048_576);
            // Env should overwrite the yaml config
            assert_eq!(config.threads, 8);
            assert_eq!(
                config.log_file.as_deref(),
                Some(Path::new("/tmp/durations.log"))
            );

            Ok(())
        });
    }

    #[test]
    fn rejects_zero_counts() {
        let config = Config {
            num_binaries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            threads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_actions() {
        assert_eq!("create".parse::<Action>().unwrap(), Action::Create);
        assert_eq!("DELETE".parse::<Action>().unwrap(), Action::Delete);
        assert!("purge".parse::<Action>().is_err());
    }

    #[test]
    fn datastream_requirements() {
        assert!(!Action::Create.requires_datastreams());
        assert!(Action::Read.requires_datastreams());
        assert!(Action::Update.requires_datastreams());
        assert!(Action::Delete.requires_datastreams());

        assert!(Action::Create.leaves_datastreams());
        assert!(!Action::Delete.leaves_datastreams());
    }
}
