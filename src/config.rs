//! Command-line configuration.

use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::{ffi::OsString, path::PathBuf};

use crate::engine::EngineOptions;

/// Startup data settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedConfig {
    /// Synthetic records generated at startup
    pub count: usize,
    /// Birth dates fall within this many years before today
    pub max_age_years: u32,
    /// Load the reference records into an empty store first
    pub fixtures: bool,
    /// Fixed RNG seed for reproducible data
    pub rng_seed: Option<u64>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            count: 1000,
            max_age_years: 40,
            fixtures: true,
            rng_seed: None,
        }
    }
}

/// Everything `main` needs to bring the server up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Data directory for catalog, tables and WAL
    pub data_dir: PathBuf,
    /// HTTP listen address
    pub listen: String,
    pub seed: SeedConfig,
    pub engine: EngineOptions,
}

/// The `people_db` command definition.
pub fn command() -> Command {
    Command::new("people_db")
        .about("Person records with a DataTables server-side query endpoint")
        .arg(Arg::new("data")
            .long("data")
            .value_name("DIR")
            .required(true)
            .help("Data directory for catalog, tables, wal"))
        .arg(Arg::new("listen")
            .long("listen")
            .value_name("ADDR")
            .default_value("127.0.0.1:8080")
            .help("Listen address for the HTTP server"))
        .arg(Arg::new("seed-count")
            .long("seed-count")
            .value_name("N")
            .value_parser(value_parser!(usize))
            .default_value("1000")
            .help("Synthetic records generated at startup"))
        .arg(Arg::new("seed-years")
            .long("seed-years")
            .value_name("N")
            .value_parser(value_parser!(u32))
            .default_value("40")
            .help("Generated birth dates fall within this many years"))
        .arg(Arg::new("seed-rng")
            .long("seed-rng")
            .value_name("N")
            .value_parser(value_parser!(u64))
            .help("RNG seed for reproducible sample data"))
        .arg(Arg::new("no-fixtures")
            .long("no-fixtures")
            .action(ArgAction::SetTrue)
            .help("Do not load the reference records into an empty store"))
        .arg(Arg::new("buffer-pages")
            .long("buffer-pages")
            .value_name("N")
            .value_parser(value_parser!(usize))
            .default_value("64")
            .help("Buffer pool capacity in pages"))
        .arg(Arg::new("no-wal-sync")
            .long("no-wal-sync")
            .action(ArgAction::SetTrue)
            .help("Skip fsync after each WAL append"))
}

impl ServerConfig {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let required = |name: &str| {
            matches
                .get_one::<String>(name)
                .cloned()
                .ok_or_else(|| anyhow!("missing --{}", name))
        };
        let number = |name: &str| {
            matches
                .get_one::<usize>(name)
                .copied()
                .ok_or_else(|| anyhow!("missing --{}", name))
        };

        Ok(Self {
            data_dir: PathBuf::from(required("data")?),
            listen: required("listen")?,
            seed: SeedConfig {
                count: number("seed-count")?,
                max_age_years: matches
                    .get_one::<u32>("seed-years")
                    .copied()
                    .ok_or_else(|| anyhow!("missing --seed-years"))?,
                fixtures: !matches.get_flag("no-fixtures"),
                rng_seed: matches.get_one::<u64>("seed-rng").copied(),
            },
            engine: EngineOptions {
                buffer_pages: number("buffer-pages")?,
                sync_wal: !matches.get_flag("no-wal-sync"),
            },
        })
    }

    /// Parses `args` (program name first).
    pub fn try_parse_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = command().try_get_matches_from(args)?;
        Self::from_matches(&matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::try_parse_from(["people_db", "--data", "/tmp/p"]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/p"));
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.seed, SeedConfig::default());
        assert_eq!(config.engine, EngineOptions::default());
    }

    #[test]
    fn overrides() {
        let config = ServerConfig::try_parse_from([
            "people_db",
            "--data",
            "d",
            "--listen",
            "0.0.0.0:9000",
            "--seed-count",
            "0",
            "--seed-years",
            "10",
            "--seed-rng",
            "99",
            "--no-fixtures",
            "--buffer-pages",
            "8",
            "--no-wal-sync",
        ])
        .unwrap();
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(
            config.seed,
            SeedConfig {
                count: 0,
                max_age_years: 10,
                fixtures: false,
                rng_seed: Some(99),
            }
        );
        assert_eq!(
            config.engine,
            EngineOptions {
                buffer_pages: 8,
                sync_wal: false,
            }
        );
    }

    #[test]
    fn data_dir_is_required_and_numbers_are_checked() {
        assert!(ServerConfig::try_parse_from(["people_db"]).is_err());
        assert!(ServerConfig::try_parse_from(["people_db", "--data", "d", "--seed-count", "-5"]).is_err());
    }
}
