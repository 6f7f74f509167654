use crate::app::catalog::{
    Credentials, ServerAddress, Target, DEFAULT_PG_PORT, DEFAULT_PG_SCHEMA,
};
use crate::app::cli::{Cli, Format};
use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub target: Target,
    pub credentials: Option<Credentials>,
    pub db_name: String,
    pub schema: String,
    pub statement_timeout: Option<Duration>,
    pub ignore_tables: Vec<String>,
    pub format: Format,
}

pub fn resolve_config(cli: Cli) -> Result<AppConfig> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();
    resolve_with(cli, |key| env::var(key).ok())
}

// Command-line values win over the environment.
fn resolve_with(cli: Cli, var: impl Fn(&str) -> Option<String>) -> Result<AppConfig> {
    let file = cli.sqlite.or_else(|| var("DB_FILE").map(PathBuf::from));

    let (target, credentials) = match file {
        Some(path) => (Target::File(path), None),
        None => {
            let host = cli
                .host
                .or_else(|| var("DB_HOST"))
                .context("DB_HOST must be set via --host or in .env/environment variables (or use --sqlite)")?;
            let dbname = cli
                .dbname
                .or_else(|| var("DB_NAME"))
                .context("DB_NAME must be set via --dbname or in .env/environment variables")?;
            let port = match cli.port {
                Some(port) => port,
                None => match var("DB_PORT") {
                    Some(raw) => raw.parse().with_context(|| format!("DB_PORT `{}` is not a port number", raw))?,
                    None => DEFAULT_PG_PORT,
                },
            };
            let credentials = cli.user.or_else(|| var("DB_USER")).map(|user| Credentials {
                user,
                password: var("DB_PASSWORD"),
            });
            (Target::Server(ServerAddress { host, port, dbname }), credentials)
        }
    };

    if matches!(target, Target::Server(_)) && credentials.is_none() {
        bail!("DB_USER must be set via --user or in .env/environment variables");
    }

    let statement_timeout = match cli.timeout {
        Some(secs) => Some(secs),
        None => var("DB_TIMEOUT_SECS")
            .map(|raw| raw.parse::<u64>())
            .transpose()
            .context("DB_TIMEOUT_SECS must be a whole number of seconds")?,
    }
    .map(Duration::from_secs);

    let db_name = target.name();

    Ok(AppConfig {
        target,
        credentials,
        db_name,
        schema: cli
            .schema
            .or_else(|| var("DB_SCHEMA"))
            .unwrap_or_else(|| DEFAULT_PG_SCHEMA.to_string()),
        statement_timeout,
        ignore_tables: cli.ignore.unwrap_or_default(),
        format: cli.format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn sqlite_file_from_cli() {
        let cli = Cli {
            sqlite: Some(PathBuf::from("test.db")),
            ..Default::default()
        };
        let config = resolve_with(cli, env_of(&[("DB_HOST", "ignored")])).unwrap();
        assert_eq!(config.target, Target::File(PathBuf::from("test.db")));
        assert_eq!(config.db_name, "test");
        assert!(config.credentials.is_none());
    }

    #[test]
    fn server_from_environment() {
        let env = env_of(&[
            ("DB_HOST", "localhost"),
            ("DB_NAME", "geo"),
            ("DB_USER", "app"),
            ("DB_PASSWORD", "secret"),
            ("DB_TIMEOUT_SECS", "5"),
        ]);
        let config = resolve_with(Cli::default(), env).unwrap();
        assert_eq!(
            config.target,
            Target::Server(ServerAddress {
                host: "localhost".into(),
                port: DEFAULT_PG_PORT,
                dbname: "geo".into(),
            })
        );
        let creds = config.credentials.unwrap();
        assert_eq!(creds.password.as_deref(), Some("secret"));
        assert_eq!(config.statement_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.schema, "public");
    }

    #[test]
    fn cli_overrides_environment() {
        let cli = Cli {
            host: Some("db.internal".into()),
            port: Some(6543),
            user: Some("admin".into()),
            ..Default::default()
        };
        let env = env_of(&[("DB_HOST", "localhost"), ("DB_NAME", "geo"), ("DB_USER", "app")]);
        let config = resolve_with(cli, env).unwrap();
        match config.target {
            Target::Server(addr) => {
                assert_eq!(addr.host, "db.internal");
                assert_eq!(addr.port, 6543);
            }
            other => panic!("unexpected target {other:?}"),
        }
        assert_eq!(config.credentials.unwrap().user, "admin");
    }

    #[test]
    fn missing_target_is_an_error() {
        assert!(resolve_with(Cli::default(), env_of(&[])).is_err());
    }

    #[test]
    fn bad_port_is_an_error() {
        let env = env_of(&[("DB_HOST", "h"), ("DB_NAME", "d"), ("DB_USER", "u"), ("DB_PORT", "x")]);
        assert!(resolve_with(Cli::default(), env).is_err());
    }
}
