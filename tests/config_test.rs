use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[cfg(test)]
mod config_tests {
    use super::*;
    use claude_ledger::config::{Config, DEFAULT_PRICING_URL};
    use claude_ledger::models::{CostMode, ReportTimezone, SortOrder};

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.logging.level, "ERROR");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.output, "console");

        assert_eq!(config.report.cost_mode, CostMode::Auto);
        assert_eq!(config.report.order, SortOrder::Asc);
        assert_eq!(config.report.timezone, ReportTimezone::Local);

        assert_eq!(config.blocks.duration_hours, 5);
        assert_eq!(config.blocks.recent_days, 3);
        assert_eq!(config.live.refresh_interval_secs, 1);

        assert_eq!(config.pricing.url, DEFAULT_PRICING_URL);
        assert_eq!(config.pricing.timeout_secs, 10);
        assert!(!config.pricing.offline);

        assert!(!config.paths.claude_roots.is_empty());
    }

    // All environment mutation lives in this one test; tests share the process
    #[test]
    fn test_env_variable_override() {
        env::set_var("LOG_LEVEL", "debug");
        env::set_var("CLAUDE_LEDGER_COST_MODE", "calculate");
        env::set_var("CLAUDE_LEDGER_ORDER", "desc");
        env::set_var("CLAUDE_LEDGER_TIMEZONE", "UTC");
        env::set_var("CLAUDE_LEDGER_REFRESH_SECS", "7");
        env::set_var("CLAUDE_LEDGER_OFFLINE", "true");
        env::set_var("CLAUDE_CONFIG_DIR", "/a/claude, /b/claude,");

        let mut config = Config::default();
        config
            .apply_env_overrides()
            .expect("Failed to apply env overrides");

        assert_eq!(config.logging.level, "DEBUG");
        assert_eq!(config.report.cost_mode, CostMode::Calculate);
        assert_eq!(config.report.order, SortOrder::Desc);
        assert_eq!(config.report.timezone, ReportTimezone::Utc);
        assert_eq!(config.live.refresh_interval_secs, 7);
        assert!(config.pricing.offline);
        assert_eq!(
            config.paths.claude_roots,
            vec![PathBuf::from("/a/claude"), PathBuf::from("/b/claude")]
        );
        assert!(config.validate().is_ok());

        env::set_var("CLAUDE_LEDGER_COST_MODE", "guess");
        let mut config = Config::default();
        assert!(config.apply_env_overrides().is_err());

        for name in [
            "LOG_LEVEL",
            "CLAUDE_LEDGER_COST_MODE",
            "CLAUDE_LEDGER_ORDER",
            "CLAUDE_LEDGER_TIMEZONE",
            "CLAUDE_LEDGER_REFRESH_SECS",
            "CLAUDE_LEDGER_OFFLINE",
            "CLAUDE_CONFIG_DIR",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.live.refresh_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pricing.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        // Block end times must stay representable
        let mut config = Config::default();
        config.blocks.duration_hours = 4_000_000_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_loading() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("claude-ledger.toml");

        let test_config = r#"
[logging]
level = "DEBUG"
format = "json"
output = "file"

[report]
cost_mode = "calculate"
order = "desc"

[blocks]
duration_hours = 4
recent_days = 7

[pricing]
offline = true

[paths]
claude_roots = ["/custom/claude"]
log_directory = "/custom/logs"
        "#;

        fs::write(&config_path, test_config).expect("Failed to write test config");
        let config = Config::load_from_file(&config_path).expect("Failed to load config");

        assert_eq!(config.logging.format, "json");
        assert_eq!(config.report.cost_mode, CostMode::Calculate);
        assert_eq!(config.report.order, SortOrder::Desc);
        assert_eq!(config.report.timezone, ReportTimezone::Local);
        assert_eq!(config.blocks.duration_hours, 4);
        assert_eq!(config.blocks.recent_days, 7);
        assert!(config.pricing.offline);
        assert_eq!(config.pricing.timeout_secs, 10);
        assert_eq!(config.paths.claude_roots, vec![PathBuf::from("/custom/claude")]);
        assert_eq!(config.live.refresh_interval_secs, 1);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "[blocks]\nduration_hours = \"five\"\n").unwrap();
        assert!(Config::load_from_file(&config_path).is_err());
        assert!(Config::load_from_file(&temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).expect("Failed to serialize config");
        let parsed: Config = toml::from_str(&serialized).expect("Failed to parse config");
        assert_eq!(parsed, config);
    }
}
