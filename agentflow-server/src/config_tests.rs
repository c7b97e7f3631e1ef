//! Configuration loading tests: defaults, files and environment overrides

#[cfg(test)]
mod tests {
    use super::super::config::{Config, LogFormat};
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    /// Environment overrides are process-global; tests touching them run serially
    struct EnvGuard(Vec<&'static str>);

    impl EnvGuard {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (key, value) in vars {
                env::set_var(key, value);
            }
            Self(vars.iter().map(|(key, _)| *key).collect())
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for key in &self.0 {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.database.url.starts_with("sqlite:"));
        assert_eq!(config.server_addr().unwrap().port(), 8080);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    #[serial]
    fn test_load_without_sources_uses_defaults() {
        let config = Config::load(None).expect("Should load config successfully");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.database.migrate_on_startup);
        assert_eq!(config.database.max_connections, Some(10));
        assert!(!config.engine.retry_failed_steps);
        assert_eq!(config.engine.backoff_factor, 2.0);
        assert_eq!(config.bus.poll_interval_ms, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    #[serial]
    fn test_environment_variable_override() {
        let _guard = EnvGuard::set(&[
            ("AGENTFLOW_SERVER__PORT", "9191"),
            ("AGENTFLOW_DATABASE__URL", "sqlite:/tmp/agentflow_env_test.db"),
            ("AGENTFLOW_ENGINE__MAX_CONCURRENT_STEPS", "4"),
            ("AGENTFLOW_ENGINE__RETRY_FAILED_STEPS", "true"),
            ("AGENTFLOW_LOGGING__FORMAT", "json"),
        ]);

        let config = Config::load(None).unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.database.url, "sqlite:/tmp/agentflow_env_test.db");
        assert_eq!(config.engine.max_concurrent_steps, Some(4));
        assert!(config.engine.retry_failed_steps);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    #[serial]
    fn test_explicit_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentflow.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nport = 9300\n\n[engine]\nbackoff_factor = 1.5\n\n[bus]\nmax_history = 50"
        )
        .unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.server.port, 9300);
        assert_eq!(config.engine.backoff_factor, 1.5);
        assert_eq!(config.bus.max_history, 50);
        // untouched sections keep their defaults
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.bus.poll_interval_ms, 10);
    }

    #[test]
    #[serial]
    fn test_environment_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentflow.toml");
        std::fs::write(&path, "[server]\nport = 9300\n").unwrap();
        let _guard = EnvGuard::set(&[("AGENTFLOW_SERVER__PORT", "9400")]);

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.server.port, 9400);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Config::load(Some("/nonexistent/agentflow.toml")).is_err());
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        let _guard = EnvGuard::set(&[("AGENTFLOW_BUS__POLL_INTERVAL_MS", "0")]);
        assert!(Config::load(None).is_err());
    }

    #[test]
    fn test_invalid_server_address() {
        let mut config = Config::default();
        config.server.host = "not a host".to_string();
        assert!(config.server_addr().is_err());
    }
}
