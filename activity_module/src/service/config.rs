use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use super::BoxError;

/// Cron expression for the mail ingestion sweep, every 15 minutes.
pub const DEFAULT_INGEST_CRON: &str = "0 */15 * * * *";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Database name segment expected by the attachment endpoint.
    pub database_name: String,
    pub project_db_path: PathBuf,
    pub mailbox_db_path: PathBuf,
    pub scheduler_db_path: PathBuf,
    pub ingest_cron: String,
    pub scheduler_poll_interval: Duration,
    /// Bearer token required by the attachment endpoint; unset leaves
    /// the endpoint open for local use.
    pub api_token: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = env::var("ACTIVITY_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("ACTIVITY_SERVICE_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(9010);
        let database_name = env::var("ACTIVITY_DATABASE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "project".to_string());

        let runtime_root = resolve_path(
            env::var("ACTIVITY_RUNTIME_ROOT")
                .unwrap_or_else(|_| default_runtime_root().to_string_lossy().into_owned()),
        )?;
        let project_db_path = resolve_path(env::var("PROJECT_DB_PATH").unwrap_or_else(|_| {
            runtime_root
                .join("state")
                .join("project.db")
                .to_string_lossy()
                .into_owned()
        }))?;
        let mailbox_db_path = resolve_path(env::var("MAILBOX_DB_PATH").unwrap_or_else(|_| {
            runtime_root
                .join("state")
                .join("mailbox.db")
                .to_string_lossy()
                .into_owned()
        }))?;
        let scheduler_db_path = resolve_path(env::var("SCHEDULER_DB_PATH").unwrap_or_else(|_| {
            runtime_root
                .join("state")
                .join("tasks.db")
                .to_string_lossy()
                .into_owned()
        }))?;

        let ingest_cron = env::var("INGEST_CRON")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_INGEST_CRON.to_string());
        let scheduler_poll_interval = env::var("SCHEDULER_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(1));
        let api_token = env::var("ACTIVITY_SERVICE_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            host,
            port,
            database_name,
            project_db_path,
            mailbox_db_path,
            scheduler_db_path,
            ingest_cron,
            scheduler_poll_interval,
            api_token,
        })
    }
}

fn default_runtime_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".activity_service")
}

fn resolve_path(raw: String) -> Result<PathBuf, io::Error> {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir()?;
        Ok(cwd.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    struct EnvGuard {
        key: String,
        previous: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let previous = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                previous,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => env::set_var(&self.key, value),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn env_overrides_are_honored() {
        let _host = EnvGuard::set("ACTIVITY_SERVICE_HOST", "127.0.0.1");
        let _port = EnvGuard::set("ACTIVITY_SERVICE_PORT", "9999");
        let _database = EnvGuard::set("ACTIVITY_DATABASE", "tenant1");
        let _project = EnvGuard::set("PROJECT_DB_PATH", "/data/state/project.db");
        let _cron = EnvGuard::set("INGEST_CRON", "0 0 * * * *");

        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9999);
        assert_eq!(config.database_name, "tenant1");
        assert_eq!(config.project_db_path, PathBuf::from("/data/state/project.db"));
        assert_eq!(config.ingest_cron, "0 0 * * * *");
    }

    #[test]
    #[serial]
    fn defaults_apply_when_unset() {
        let _port = EnvGuard::set("ACTIVITY_SERVICE_PORT", "not-a-number");
        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.port, 9010);
        assert_eq!(config.ingest_cron, DEFAULT_INGEST_CRON);
        assert_eq!(config.scheduler_poll_interval, Duration::from_secs(1));
    }
}
