// src/config.rs

use anyhow::{anyhow, Result};
use std::{
    env,
    path::{Path, PathBuf},
};
use url::Url;

use crate::schema::SchemaMetadata;

pub const DEFAULT_TABULAR_FILE: &str = "ViewingActivity.csv";
pub const DEFAULT_IDENTITY_FILE: &str = "account.json";
pub const DEFAULT_OWNER_FIELD: &str = "user";
pub const SINK_FILE: &str = "db.parquet";
pub const SCHEMA_FILE: &str = "schema.json";
pub const OUTPUT_FILE: &str = "output.json";
pub const DEFAULT_PINATA_API_URL: &str = "https://api.pinata.cloud";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishBackend {
    /// Pinata pinning API.
    Pinata { api_url: String, jwt: String },
    /// Content-addressed directory on local disk; `None` means
    /// `<output_dir>/published`.
    Local { dir: Option<PathBuf> },
}

/// Everything a run needs, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct RefinerConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Where the archive is expanded; `None` means `input_dir`.
    pub work_dir: Option<PathBuf>,
    pub archive_extension: String,
    pub tabular_file: String,
    pub identity_file: String,
    pub owner_field: String,
    pub schema: SchemaMetadata,
    pub encryption_key: String,
    pub gateway_url: String,
    pub publish: PublishBackend,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/input"),
            output_dir: PathBuf::from("/output"),
            work_dir: None,
            archive_extension: "zip".to_string(),
            tabular_file: DEFAULT_TABULAR_FILE.to_string(),
            identity_file: DEFAULT_IDENTITY_FILE.to_string(),
            owner_field: DEFAULT_OWNER_FIELD.to_string(),
            schema: SchemaMetadata {
                name: "Netflix Viewing Activity".to_string(),
                version: "0.0.1".to_string(),
                description: "Viewing activity exported from a Netflix account".to_string(),
                dialect: "duckdb".to_string(),
            },
            encryption_key: String::new(),
            gateway_url: "https://gateway.pinata.cloud/ipfs".to_string(),
            publish: PublishBackend::Local { dir: None },
        }
    }
}

impl RefinerConfig {
    pub fn sink_path(&self) -> PathBuf {
        self.output_dir.join(SINK_FILE)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.output_dir.join(SCHEMA_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(OUTPUT_FILE)
    }

    /// Where the archive is expanded.
    pub fn work_dir(&self) -> &Path {
        self.work_dir.as_deref().unwrap_or(&self.input_dir)
    }

    /// Store directory of the local backend, `None` for remote backends.
    pub fn local_publish_dir(&self) -> Option<PathBuf> {
        match &self.publish {
            PublishBackend::Local { dir } => Some(
                dir.clone()
                    .unwrap_or_else(|| self.output_dir.join("published")),
            ),
            PublishBackend::Pinata { .. } => None,
        }
    }

    /// Defaults overlaid with environment variables. Call [`validate`](Self::validate)
    /// once any further overrides are applied.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        self.input_dir = env_or_path("INPUT_DIR", &self.input_dir);
        self.output_dir = env_or_path("OUTPUT_DIR", &self.output_dir);
        if let Some(dir) = env_nonempty("WORK_DIR") {
            self.work_dir = Some(PathBuf::from(dir));
        }

        self.archive_extension = env_or_string("ARCHIVE_EXTENSION", &self.archive_extension)
            .trim_start_matches('.')
            .to_string();
        self.tabular_file = env_or_string("TABULAR_FILE", &self.tabular_file);
        self.identity_file = env_or_string("IDENTITY_FILE", &self.identity_file);
        self.owner_field = env_or_string("OWNER_FIELD", &self.owner_field);

        self.schema.name = env_or_string("SCHEMA_NAME", &self.schema.name);
        self.schema.version = env_or_string("SCHEMA_VERSION", &self.schema.version);
        self.schema.description = env_or_string("SCHEMA_DESCRIPTION", &self.schema.description);
        self.schema.dialect = env_or_string("SCHEMA_DIALECT", &self.schema.dialect);

        self.encryption_key = env_or_string("REFINEMENT_ENCRYPTION_KEY", &self.encryption_key);
        self.gateway_url = env_or_string("IPFS_GATEWAY_URL", &self.gateway_url);

        let jwt = env_nonempty("PINATA_API_JWT");
        let backend = env_nonempty("PUBLISH_BACKEND")
            .unwrap_or_else(|| if jwt.is_some() { "pinata" } else { "local" }.to_string());
        self.publish = match backend.as_str() {
            "local" => PublishBackend::Local {
                dir: env_nonempty("LOCAL_PUBLISH_DIR").map(PathBuf::from),
            },
            "pinata" => PublishBackend::Pinata {
                api_url: env_or_string("PINATA_API_URL", DEFAULT_PINATA_API_URL),
                jwt: jwt.unwrap_or_default(),
            },
            other => {
                return Err(anyhow!(
                    "invalid publish backend {:?}: use `local` or `pinata`",
                    other
                ))
            }
        };
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.encryption_key.is_empty() {
            return Err(anyhow!(
                "invalid config: REFINEMENT_ENCRYPTION_KEY must be set"
            ));
        }
        if self.archive_extension.is_empty() {
            return Err(anyhow!("invalid config: archive extension cannot be empty"));
        }
        if self.owner_field.trim().is_empty() {
            return Err(anyhow!("invalid config: owner field cannot be empty"));
        }
        Url::parse(&self.gateway_url)
            .map_err(|e| anyhow!("invalid gateway url {:?}: {}", self.gateway_url, e))?;
        if let PublishBackend::Pinata { api_url, jwt } = &self.publish {
            Url::parse(api_url)
                .map_err(|e| anyhow!("invalid pinata api url {:?}: {}", api_url, e))?;
            if jwt.is_empty() {
                return Err(anyhow!(
                    "invalid config: pinata backend requires PINATA_API_JWT"
                ));
            }
        }
        Ok(())
    }
}

fn env_nonempty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    env_nonempty(var).unwrap_or_else(|| fallback.to_string())
}

fn env_or_path(var: &str, fallback: &Path) -> PathBuf {
    env_nonempty(var)
        .map(PathBuf::from)
        .unwrap_or_else(|| fallback.to_path_buf())
}
