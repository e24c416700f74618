use clap::{Parser, ValueEnum};
use snip_generator::random::DEFAULT_CODE_LENGTH;
use snip_shortener::settings::DEFAULT_MAX_ATTEMPTS;
use snip_storage::StorageConfig;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "SNIP_FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "SNIP_DATABASE_DSN";
pub const SWEEP_INTERVAL_SECS_ENV: &str = "SNIP_SWEEP_INTERVAL_SECS";
pub const CODE_LENGTH_ENV: &str = "SNIP_CODE_LENGTH";
pub const MAX_ATTEMPTS_ENV: &str = "SNIP_MAX_ATTEMPTS";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "memory")]
    Memory,
    #[value(name = "file")]
    File,
    #[value(name = "database")]
    Database,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::Memory => write!(f, "memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Database => write!(f, "database"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Link storage engine for a URL shortener")]
pub struct CLI {
    /// Storage backend. When unset, a database DSN wins over a file path,
    /// and memory is used if neither is given.
    #[arg(long, env = STORAGE_BACKEND_ENV, value_enum)]
    pub storage: Option<StorageBackendArg>,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, required_if_eq("storage", "file"))]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, env = DATABASE_DSN_ENV, required_if_eq("storage", "database"))]
    pub database_dsn: Option<String>,

    #[arg(long, env = SWEEP_INTERVAL_SECS_ENV, default_value_t = DEFAULT_SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = CODE_LENGTH_ENV, default_value_t = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,

    #[arg(long, env = MAX_ATTEMPTS_ENV, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: usize,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl CLI {
    pub fn storage_config(&self) -> StorageConfig {
        let dsn = self.database_dsn.clone();
        let path = self.file_storage_path.clone();

        match self.storage {
            Some(StorageBackendArg::Memory) => StorageConfig::default(),
            Some(StorageBackendArg::File) => StorageConfig {
                database_dsn: None,
                file_path: path,
            },
            Some(StorageBackendArg::Database) => StorageConfig {
                database_dsn: dsn,
                file_path: None,
            },
            None => StorageConfig {
                database_dsn: dsn,
                file_path: path,
            },
        }
    }
}
