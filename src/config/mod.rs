mod file_config;

pub use file_config::{CatalogFileConfig, FileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

pub const CLIENT_ID_ENV: &str = "STREAMLOG_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "STREAMLOG_CLIENT_SECRET";

/// CLI arguments that participate in config resolution. Mirrors the CLI
/// surface so the binary can stay a thin shell over `AppConfig::resolve`.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub input_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub market: Option<String>,
}

/// Credentials for the catalog client's token exchange.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub input_dir: PathBuf,
    pub db_path: PathBuf,
    pub market: Option<String>,
    pub catalog: CatalogSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present; catalog
    /// credentials fall back to environment variables.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let input_dir = file
            .input_dir
            .map(PathBuf::from)
            .or_else(|| cli.input_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("input_dir must be specified on the CLI or in the config file")
            })?;

        if !input_dir.is_dir() {
            bail!("Input directory does not exist: {:?}", input_dir);
        }

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified on the CLI or in the config file")
            })?;

        let market = file.market.or_else(|| cli.market.clone());

        let file_catalog = file.catalog.unwrap_or_default();
        let client_id = file_catalog
            .client_id
            .or_else(|| std::env::var(CLIENT_ID_ENV).ok())
            .filter(|v| !v.is_empty());
        let client_secret = file_catalog
            .client_secret
            .or_else(|| std::env::var(CLIENT_SECRET_ENV).ok())
            .filter(|v| !v.is_empty());

        let (client_id, client_secret) = match (client_id, client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => bail!(
                "Catalog credentials missing: set [catalog] client_id/client_secret in the \
                 config file or the {}/{} environment variables",
                CLIENT_ID_ENV,
                CLIENT_SECRET_ENV
            ),
        };

        Ok(AppConfig {
            input_dir,
            db_path,
            market,
            catalog: CatalogSettings {
                client_id,
                client_secret,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_dirs(input_dir: PathBuf) -> CliConfig {
        CliConfig {
            input_dir: Some(input_dir),
            db_path: Some(PathBuf::from("/tmp/library.db")),
            market: Some("JP".to_string()),
        }
    }

    fn file_with_credentials() -> FileConfig {
        FileConfig {
            catalog: Some(CatalogFileConfig {
                client_id: Some("id".to_string()),
                client_secret: Some("secret".to_string()),
            }),
            ..FileConfig::default()
        }
    }

    #[test]
    fn test_file_values_override_cli() {
        let input = tempfile::TempDir::new().unwrap();
        let override_input = tempfile::TempDir::new().unwrap();

        let mut file = file_with_credentials();
        file.input_dir = Some(override_input.path().to_string_lossy().to_string());
        file.market = Some("DE".to_string());

        let config =
            AppConfig::resolve(&cli_with_dirs(input.path().to_path_buf()), Some(file)).unwrap();

        assert_eq!(config.input_dir, override_input.path());
        assert_eq!(config.market.as_deref(), Some("DE"));
    }

    #[test]
    fn test_missing_input_dir_is_an_error() {
        let input = tempfile::TempDir::new().unwrap();
        let missing = input.path().join("nope");

        let result = AppConfig::resolve(&cli_with_dirs(missing), Some(file_with_credentials()));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_credentials_is_an_error() {
        let input = tempfile::TempDir::new().unwrap();

        // Skipped when the environment happens to carry real credentials.
        if std::env::var(CLIENT_ID_ENV).is_ok() {
            return;
        }
        let result = AppConfig::resolve(&cli_with_dirs(input.path().to_path_buf()), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_parses() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            r#"
            market = "JP"

            [catalog]
            client_id = "abc"
            client_secret = "def"
            "#,
        )
        .unwrap();

        let file = FileConfig::load(temp_file.path()).unwrap();
        assert_eq!(file.market.as_deref(), Some("JP"));
        let catalog = file.catalog.unwrap();
        assert_eq!(catalog.client_id.as_deref(), Some("abc"));
        assert_eq!(catalog.client_secret.as_deref(), Some("def"));
    }
}
