#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use clap::Parser;
    use warden_cli::Cli;
    use warden_core::WardenError;

    fn config_in(dir: &Path) -> PathBuf {
        let path = dir.join("warden.toml");
        let db = dir.join("warden.db");
        std::fs::write(
            &path,
            format!(
                "[store]\ndb_path = {:?}\n\n[modes]\nlearning_period_days = 0\n\n[logging]\nlevel = \"error\"\n",
                db.to_string_lossy()
            ),
        )
        .unwrap();
        path
    }

    async fn run(config: &Path, args: &[&str]) -> warden_core::Result<()> {
        let mut full = vec![
            "warden".to_string(),
            "--config".to_string(),
            config.to_string_lossy().into_owned(),
            "--identity".to_string(),
            "tester@ci".to_string(),
            "--json".to_string(),
        ];
        full.extend(args.iter().map(|a| a.to_string()));
        Cli::try_parse_from(full).unwrap().run().await
    }

    // ── Decisions ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_evaluate_preview_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        run(&config, &["evaluate", "ls", "-la"]).await.unwrap();
        run(&config, &["preview", "git", "push", "--force"]).await.unwrap();
        run(&config, &["report", "ls", "-la"]).await.unwrap();
        run(&config, &["report", "--denied", "--mistake", "rm", "-rf", "dist"])
            .await
            .unwrap();
        assert!(dir.path().join("warden.db").exists());
    }

    #[tokio::test]
    async fn test_invalid_operation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let err = run(&config, &["evaluate", "--kind", "fetch", "not-a-url"])
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_authorize_blocked_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        assert!(run(&config, &["authorize", "rm", "-rf", "/"]).await.is_err());
        run(&config, &["authorize", "ls"]).await.unwrap();
    }

    // ── Modes and recovery ─────────────────────────────────────

    #[tokio::test]
    async fn test_mode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        run(&config, &["mode"]).await.unwrap();
        run(&config, &["mode", "paranoid"]).await.unwrap();
        let err = run(&config, &["mode", "flow"]).await.unwrap_err();
        assert!(matches!(err, WardenError::InvalidModeTransition { .. }));
        run(&config, &["mode", "adaptive"]).await.unwrap();
        run(&config, &["mode", "flow", "--minutes", "5"]).await.unwrap();
        run(&config, &["mode", "adaptive"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_recovery_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        run(&config, &["checkpoints"]).await.unwrap();
        run(&config, &["purge"]).await.unwrap();
        let missing = uuid::Uuid::new_v4().to_string();
        let err = run(&config, &["restore", missing.as_str()]).await.unwrap_err();
        assert!(matches!(err, WardenError::CheckpointNotFound(_)));
    }

    // ── Inspection ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_inspection_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        run(&config, &["rules"]).await.unwrap();
        run(&config, &["rules", "--sequences"]).await.unwrap();
        run(&config, &["config"]).await.unwrap();
        run(&config, &["version"]).await.unwrap();
        run(&config, &["doctor"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "[trust]\nauto_trust_after = 0\n").unwrap();
        let err = run(&path, &["version"]).await.unwrap_err();
        assert!(matches!(err, WardenError::Config(_)));
    }
}
