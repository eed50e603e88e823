use crate::store::{FsStore, HttpStore, ReportStore};
use crate::taxonomy::Taxonomy;
use crate::writer::ConcurrencyMode;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_OBJECT_KEY: &str = "wastage_report.xlsx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// A file inside a local (or mounted) directory.
    Fs,
    /// An HTTP object store.
    Http,
}

/// Store settings, from flags or the environment.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, env = "WASTAGE_BACKEND", value_enum, default_value_t = Backend::Fs)]
    pub backend: Backend,

    /// Base URL of the object store; `{region}` is substituted.
    #[arg(long, env = "WASTAGE_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "WASTAGE_REGION")]
    pub region: Option<String>,

    /// Bucket name, or the directory holding the report for the fs backend.
    #[arg(long, env = "WASTAGE_BUCKET", default_value = ".")]
    pub bucket: String,

    #[arg(long = "object-key", env = "WASTAGE_OBJECT_KEY", default_value = DEFAULT_OBJECT_KEY)]
    pub key: String,

    #[arg(long, env = "WASTAGE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "WASTAGE_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Department/outlet table (CSV with `Department,Outlet` columns).
    #[arg(long, env = "WASTAGE_TAXONOMY")]
    pub taxonomy: Option<PathBuf>,

    /// Overwrite the report even if someone else changed it since it was read.
    #[arg(long)]
    pub last_writer_wins: bool,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: Backend,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub bucket: String,
    pub key: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Fs,
            endpoint: None,
            region: None,
            bucket: ".".into(),
            key: DEFAULT_OBJECT_KEY.into(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    pub fn open(&self) -> Result<Box<dyn ReportStore>> {
        let store: Box<dyn ReportStore> = match self.backend {
            Backend::Fs => {
                Box::new(FsStore::new(&self.bucket, &self.key).with_timeout(self.timeout))
            }
            Backend::Http => {
                let endpoint = self
                    .endpoint
                    .as_deref()
                    .context("the http backend needs an endpoint (WASTAGE_ENDPOINT)")?;
                let store =
                    HttpStore::new(self, endpoint).context("could not build HTTP client")?;
                Box::new(store)
            }
        };
        Ok(store)
    }
}

impl StoreArgs {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            backend: self.backend,
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            token: self.token.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn taxonomy(&self) -> Result<Taxonomy> {
        match &self.taxonomy {
            Some(path) => Taxonomy::load(path)
                .with_context(|| format!("failed to load taxonomy from {}", path.display())),
            None => Ok(Taxonomy::default()),
        }
    }

    pub fn concurrency(&self) -> ConcurrencyMode {
        if self.last_writer_wins {
            ConcurrencyMode::LastWriterWins
        } else {
            ConcurrencyMode::Optimistic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        store: StoreArgs,
    }

    #[test]
    fn defaults_point_at_local_report() {
        let cli = Cli::try_parse_from(["wastage"]).unwrap();
        let config = cli.store.store_config();
        assert_eq!(config.backend, Backend::Fs);
        assert_eq!(config.key, DEFAULT_OBJECT_KEY);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(cli.store.concurrency(), ConcurrencyMode::Optimistic);
    }

    #[test]
    fn http_backend_requires_endpoint() {
        let config = StoreConfig {
            backend: Backend::Http,
            ..StoreConfig::default()
        };
        assert!(config.open().is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "wastage",
            "--backend",
            "http",
            "--endpoint",
            "http://127.0.0.1:9000",
            "--bucket",
            "kitchen",
            "--object-key",
            "march.xlsx",
            "--timeout-secs",
            "5",
            "--last-writer-wins",
        ])
        .unwrap();
        let config = cli.store.store_config();
        assert_eq!(config.backend, Backend::Http);
        assert_eq!(config.bucket, "kitchen");
        assert_eq!(config.key, "march.xlsx");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(cli.store.concurrency(), ConcurrencyMode::LastWriterWins);
        assert_eq!(config.open().unwrap().key(), "march.xlsx");
    }
}
