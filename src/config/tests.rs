use super::*;
use std::fs::File;
use std::io::Write;
use tempfile::{TempDir, tempdir};

/// Helper function to create a test configuration file
fn create_test_config_file(dir: &TempDir, content: &str) -> PathBuf {
    let config_path = dir.path().join("config.toml");
    let mut file = File::create(&config_path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    config_path
}

#[test]
fn test_apply_update_with_all_values() {
    let config = base_config(None);

    let update = ConfigUpdate {
        database_url: Some("updated.db".to_string()),
        listen_addr: Some("0.0.0.0:8080".parse().unwrap()),
        immich_url: Some("http://immich.local:2283".to_string()),
        immich_api_key: Some("immich-key".to_string()),
        astrometry_url: Some("http://localhost:8000/api".to_string()),
        astrometry_api_key: Some("astro-key".to_string()),
        sidecar_dir: Some(PathBuf::from("/srv/sidecars")),
        log_dir: Some(PathBuf::from("/var/log/skymmich")),
        sync_interval_minutes: Some(15),
        poll_interval_seconds: Some(5),
        max_solve_attempts: Some(7),
        solve_timeout_minutes: Some(90),
        server_url: None,
    };

    let updated = config.apply_update(update);

    assert_eq!(updated.database_url, "updated.db");
    assert_eq!(updated.listen_addr.port(), 8080);
    assert_eq!(updated.immich_url.as_deref(), Some("http://immich.local:2283"));
    assert_eq!(updated.immich_api_key.as_deref(), Some("immich-key"));
    assert_eq!(updated.astrometry_url, "http://localhost:8000/api");
    assert_eq!(updated.astrometry_api_key.as_deref(), Some("astro-key"));
    assert_eq!(updated.sidecar_dir, Some(PathBuf::from("/srv/sidecars")));
    assert_eq!(updated.log_dir, Some(PathBuf::from("/var/log/skymmich")));
    assert_eq!(updated.sync_interval_minutes, 15);
    assert_eq!(updated.poll_interval_seconds, 5);
    assert_eq!(updated.max_solve_attempts, 7);
    assert_eq!(updated.solve_timeout_minutes, 90);
}

#[test]
fn test_apply_update_with_partial_values() {
    let mut config = base_config(None);
    config.immich_url = Some("http://original".to_string());

    let update = ConfigUpdate {
        database_url: Some("updated.db".to_string()),
        ..Default::default()
    };

    let updated = config.apply_update(update);

    assert_eq!(updated.database_url, "updated.db");
    assert_eq!(updated.immich_url.as_deref(), Some("http://original")); // Unchanged
    assert_eq!(updated.poll_interval_seconds, 10); // Unchanged
}

#[test]
fn test_apply_update_with_no_values() {
    let config = base_config(None);
    let updated = config.clone().apply_update(ConfigUpdate::default());
    assert_eq!(updated, config);
}

#[test]
fn test_base_config_defaults() {
    let config = base_config(None);

    assert_eq!(config.database_url, "skymmich.db");
    assert_eq!(config.listen_addr, SocketAddr::from(([127, 0, 0, 1], 3000)));
    assert_eq!(config.astrometry_url, DEFAULT_ASTROMETRY_URL);
    assert!(config.immich_url.is_none());
    assert!(config.sidecar_dir.is_none());
    assert_eq!(config.sync_interval_minutes, 60);
    assert_eq!(config.poll_interval_seconds, 10);
    assert_eq!(config.max_solve_attempts, 3);
    assert_eq!(config.solve_timeout_minutes, 30);
}

#[test]
fn test_base_config_with_path() {
    let temp_dir = tempdir().unwrap();
    let config = base_config(Some(temp_dir.path().to_path_buf()));

    let expected_db_path = temp_dir.path().join("skymmich.db").to_string_lossy().to_string();
    assert_eq!(config.database_url, expected_db_path);
}

#[test]
fn test_interval_helpers() {
    let mut config = base_config(None);
    assert_eq!(config.poll_interval(), Duration::from_secs(10));
    assert_eq!(config.sync_interval(), Some(Duration::from_secs(3600)));
    assert_eq!(config.solve_timeout(), chrono::Duration::minutes(30));

    config.sync_interval_minutes = 0;
    config.poll_interval_seconds = 0;
    assert_eq!(config.sync_interval(), None);
    assert_eq!(config.poll_interval(), Duration::from_secs(1));
}

#[test]
fn test_config_from_args() {
    let args = CliArgs {
        database_url: Some("args.db".to_string()),
        immich_url: Some("http://immich".to_string()),
        max_solve_attempts: Some(9),
        debug: true,
        ..Default::default()
    };

    let update = config_from_args(args);

    assert_eq!(update.database_url.as_deref(), Some("args.db"));
    assert_eq!(update.immich_url.as_deref(), Some("http://immich"));
    assert_eq!(update.max_solve_attempts, Some(9));
    assert_eq!(update.astrometry_api_key, None);
    assert_eq!(update.server_url, None);
}

#[test]
fn test_config_from_file_with_no_path() {
    let update = config_from_file(None).unwrap();
    assert_eq!(update, ConfigUpdate::default());
}

#[test]
fn test_config_from_file_with_valid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = create_test_config_file(
        &temp_dir,
        r#"
            database_url = "file.db"
            listen_addr = "0.0.0.0:3100"
            immich_url = "http://immich.lan:2283"
            sidecar_dir = "/data/xmp"
            poll_interval_seconds = 20
            server_url = "http://skymmich.lan:3100"
        "#,
    );

    let result = config_from_file(Some(config_path));

    assert!(result.is_ok(), "Failed to parse config file: {:?}", result.err());
    let update = result.unwrap();
    assert_eq!(update.database_url.as_deref(), Some("file.db"));
    assert_eq!(update.listen_addr.map(|a| a.port()), Some(3100));
    assert_eq!(update.immich_url.as_deref(), Some("http://immich.lan:2283"));
    assert_eq!(update.sidecar_dir, Some(PathBuf::from("/data/xmp")));
    assert_eq!(update.poll_interval_seconds, Some(20));
    assert_eq!(update.server_url.as_deref(), Some("http://skymmich.lan:3100"));
    assert_eq!(update.max_solve_attempts, None);
}

#[test]
fn test_config_from_file_with_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = create_test_config_file(
        &temp_dir,
        r#"
            database_url = "file.db"
            poll_interval_seconds = "not a number"
        "#,
    );

    assert!(config_from_file(Some(config_path)).is_err());
}

#[test]
fn test_config_from_file_with_nonexistent_file() {
    let temp_dir = tempdir().unwrap();
    let missing = temp_dir.path().join("nonexistent_config.toml");

    let update = config_from_file(Some(missing)).unwrap();
    assert_eq!(update, ConfigUpdate::default());
}

#[test]
fn test_precedence_file_then_args() {
    let temp_dir = tempdir().unwrap();
    let config_path = create_test_config_file(
        &temp_dir,
        r#"
            database_url = "file.db"
            poll_interval_seconds = 50
        "#,
    );

    let args = CliArgs {
        database_url: Some("args.db".to_string()),
        ..Default::default()
    };

    let config = base_config(None)
        .apply_update(config_from_file(Some(config_path)).unwrap())
        .apply_update(config_from_args(args));

    assert_eq!(config.database_url, "args.db"); // From args
    assert_eq!(config.poll_interval_seconds, 50); // From file
    assert_eq!(config.max_solve_attempts, 3); // From base
}

#[test]
fn test_get_config_uses_explicit_config_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = create_test_config_file(
        &temp_dir,
        r#"
            astrometry_url = "http://solver.lan/api"
            solve_timeout_minutes = 45
        "#,
    );

    let args = CliArgs {
        config: Some(config_path),
        solve_timeout_minutes: Some(60),
        ..Default::default()
    };

    let config = get_config(args);
    assert_eq!(config.astrometry_url, "http://solver.lan/api");
    assert_eq!(config.solve_timeout_minutes, 60);
}
