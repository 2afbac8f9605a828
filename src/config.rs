use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::TimeDelta;

use crate::scheduler::queue::DEFAULT_COOL_DOWN_SECS;

/// Where saved mirror status lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// SQLite database file, created on first start.
    Sqlite(PathBuf),
    /// Lost on exit. Useful for trying out configs.
    Memory,
}

impl DatabaseConfig {
    /// `:memory:` selects the in-memory store, anything else is a file path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == ":memory:" {
            DatabaseConfig::Memory
        } else {
            DatabaseConfig::Sqlite(PathBuf::from(arg))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Directory holding one `*.json` file per mirror
    pub conf_dir: PathBuf,
    pub database: DatabaseConfig,
    /// Added to each job's timeout before a lease counts as lost
    pub cool_down: TimeDelta,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            conf_dir: PathBuf::from("conf"),
            database: DatabaseConfig::Sqlite(PathBuf::from("orchestrator.db")),
            cool_down: TimeDelta::seconds(DEFAULT_COOL_DOWN_SECS),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr, conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr,
            conf_dir: conf_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.database = database;
        self
    }

    pub fn with_cool_down(mut self, cool_down: TimeDelta) -> Self {
        self.cool_down = cool_down;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:5000");
        assert_eq!(cfg.conf_dir, PathBuf::from("conf"));
        assert_eq!(
            cfg.database,
            DatabaseConfig::Sqlite(PathBuf::from("orchestrator.db"))
        );
        assert_eq!(cfg.cool_down, TimeDelta::minutes(5));
    }

    #[test]
    fn server_config_builders() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let cfg = ServerConfig::new(addr, "/etc/mirrors")
            .with_database(DatabaseConfig::Memory)
            .with_cool_down(TimeDelta::seconds(30));
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.conf_dir, PathBuf::from("/etc/mirrors"));
        assert_eq!(cfg.database, DatabaseConfig::Memory);
        assert_eq!(cfg.cool_down, TimeDelta::seconds(30));
    }

    #[test]
    fn database_from_arg() {
        assert_eq!(DatabaseConfig::from_arg(":memory:"), DatabaseConfig::Memory);
        assert_eq!(
            DatabaseConfig::from_arg("/var/lib/mirrors/state.db"),
            DatabaseConfig::Sqlite(PathBuf::from("/var/lib/mirrors/state.db"))
        );
    }
}
