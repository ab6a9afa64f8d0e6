#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;
    use warden_config::RecoveryConfig;
    use warden_core::{Operation, Recoverability, WardenError};
    use warden_recovery::{RecoveryCoordinator, StrategyKind};
    use warden_store::{KvStore, MemoryStore};

    fn coordinator() -> (RecoveryCoordinator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let c = RecoveryCoordinator::new(store.clone(), RecoveryConfig::default());
        (c, store)
    }

    fn init_repo(root: &Path) {
        let git = root.join(".git");
        fs::create_dir_all(git.join("refs/heads")).unwrap();
        fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(git.join("refs/heads/main"), format!("{}\n", "a".repeat(40))).unwrap();
        fs::write(git.join("refs/heads/topic"), format!("{}\n", "b".repeat(40))).unwrap();
    }

    // ── Round trips ────────────────────────────────────────────

    #[test]
    fn test_archive_restores_deleted_tree() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("build");
        fs::create_dir_all(build.join("out")).unwrap();
        fs::write(build.join("out/app.bin"), b"\x00\x01binary").unwrap();

        let (c, _) = coordinator();
        let op = Operation::shell("rm -rf build");
        let cp = c.checkpoint(&op, dir.path()).unwrap();
        assert_eq!(cp.strategy, StrategyKind::FileArchive);

        fs::remove_dir_all(&build).unwrap();
        c.restore(&cp.id).unwrap();
        assert_eq!(fs::read(build.join("out/app.bin")).unwrap(), b"\x00\x01binary");
    }

    #[test]
    fn test_file_delete_restores_target() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.md");
        fs::write(&notes, "# todo").unwrap();

        let (c, _) = coordinator();
        let cp = c
            .checkpoint(&Operation::file_delete(notes.to_string_lossy()), dir.path())
            .unwrap();
        fs::remove_file(&notes).unwrap();
        c.restore(&cp.id).unwrap();
        assert_eq!(fs::read_to_string(&notes).unwrap(), "# todo");
    }

    #[test]
    fn test_git_ref_pointer_restores_branches() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let git = dir.path().join(".git");

        let (c, _) = coordinator();
        let reset = c
            .checkpoint(&Operation::shell("git reset --hard HEAD~2"), dir.path())
            .unwrap();
        assert_eq!(reset.strategy, StrategyKind::GitRefPointer);
        assert!(reset.backup_ref.contains("refs/heads/main"));

        let delete = c
            .checkpoint(&Operation::shell("git branch -D topic"), dir.path())
            .unwrap();

        fs::write(git.join("refs/heads/main"), format!("{}\n", "c".repeat(40))).unwrap();
        fs::remove_file(git.join("refs/heads/topic")).unwrap();

        c.restore(&reset.id).unwrap();
        c.restore(&delete.id).unwrap();
        assert_eq!(
            fs::read_to_string(git.join("refs/heads/main")).unwrap().trim(),
            "a".repeat(40)
        );
        assert_eq!(
            fs::read_to_string(git.join("refs/heads/topic")).unwrap().trim(),
            "b".repeat(40)
        );
    }

    #[test]
    fn test_config_copy_restores_contents() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("app.conf");
        fs::write(&conf, "port = 80\n").unwrap();

        let (c, _) = coordinator();
        let cp = c
            .checkpoint(&Operation::shell("sed -i 's/80/8080/' app.conf"), dir.path())
            .unwrap();
        assert_eq!(cp.strategy, StrategyKind::ConfigCopy);

        fs::write(&conf, "port = 8080\n").unwrap();
        c.restore(&cp.id).unwrap();
        assert_eq!(fs::read_to_string(&conf).unwrap(), "port = 80\n");
    }

    #[test]
    fn test_redirect_to_new_file_is_undone() {
        let dir = tempfile::tempdir().unwrap();
        let (c, _) = coordinator();
        let cp = c
            .checkpoint(&Operation::shell("echo hello > fresh.txt"), dir.path())
            .unwrap();
        fs::write(dir.path().join("fresh.txt"), "hello\n").unwrap();
        c.restore(&cp.id).unwrap();
        assert!(!dir.path().join("fresh.txt").exists());
    }

    // ── Lifecycle ──────────────────────────────────────────────

    #[test]
    fn test_restore_after_expiry_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let (c, store) = coordinator();
        let cp = c.checkpoint(&Operation::shell("rm a.txt"), dir.path()).unwrap();

        let later = cp.expires_at + Duration::seconds(1);
        let err = c.restore_at(&cp.id, later).unwrap_err();
        assert!(matches!(err, WardenError::CheckpointExpired(_)));
        assert!(store.keys("checkpoint:").unwrap().is_empty());
    }

    #[test]
    fn test_restore_consumes_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let (c, _) = coordinator();
        let cp = c.checkpoint(&Operation::shell("rm a.txt"), dir.path()).unwrap();
        c.restore(&cp.id).unwrap();
        assert!(matches!(
            c.restore(&cp.id).unwrap_err(),
            WardenError::CheckpointNotFound(_)
        ));
    }

    #[test]
    fn test_unknown_checkpoint() {
        let (c, _) = coordinator();
        assert!(matches!(
            c.restore(&Uuid::new_v4()).unwrap_err(),
            WardenError::CheckpointNotFound(_)
        ));
        assert!(c.get(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_restore_failure_keeps_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let (c, _) = coordinator();
        let cp = c
            .checkpoint(&Operation::shell("git rebase main"), dir.path())
            .unwrap();
        fs::remove_dir_all(dir.path().join(".git")).unwrap();

        let err = c.restore(&cp.id).unwrap_err();
        assert!(matches!(err, WardenError::RestoreFailed { .. }));
        assert!(c.get(&cp.id).unwrap().is_some());
    }

    #[test]
    fn test_purge_and_list() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let (c, _) = coordinator();
        let now = Utc::now();
        let old = c
            .checkpoint_at(&Operation::shell("rm a.txt"), dir.path(), now - Duration::minutes(10))
            .unwrap();
        let fresh = c
            .checkpoint_at(&Operation::shell("rm a.txt"), dir.path(), now)
            .unwrap();
        assert_eq!(
            c.list().unwrap().iter().map(|cp| cp.id).collect::<Vec<_>>(),
            vec![old.id, fresh.id]
        );

        assert_eq!(c.purge_expired_at(now).unwrap(), 1);
        assert_eq!(c.list().unwrap().len(), 1);
    }

    // ── Refusals ───────────────────────────────────────────────

    #[test]
    fn test_unsupported_operation() {
        let (c, _) = coordinator();
        let op = Operation::network_fetch("https://example.com");
        assert!(!c.supports(&op));
        assert!(matches!(
            c.checkpoint(&op, Path::new("/tmp")).unwrap_err(),
            WardenError::UnsupportedOperationKind { .. }
        ));
        assert!(c.supports(&Operation::shell("rm -rf /")));
    }

    #[test]
    fn test_system_paths_refused() {
        let (c, _) = coordinator();
        let err = c
            .checkpoint(&Operation::shell("rm -rf /"), Path::new("/home/dev"))
            .unwrap_err();
        assert!(matches!(err, WardenError::CheckpointFailed(_)));
        let err = c
            .checkpoint(&Operation::shell("sudo rm -rf /etc/nginx"), Path::new("/"))
            .unwrap_err();
        assert!(matches!(err, WardenError::CheckpointFailed(_)));
    }

    #[test]
    fn test_parent_segments_do_not_escape_refusal() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("a/b");
        fs::create_dir_all(&cwd).unwrap();
        let climb = "../".repeat(cwd.components().count() + 2);
        let (c, _) = coordinator();

        let err = c
            .checkpoint(&Operation::shell(format!("rm -rf {climb}")), &cwd)
            .unwrap_err();
        assert!(matches!(err, WardenError::CheckpointFailed(_)));

        let err = c
            .checkpoint(&Operation::shell(format!("rm {climb}etc/hosts")), &cwd)
            .unwrap_err();
        assert!(matches!(err, WardenError::CheckpointFailed(_)));

        assert!(
            c.checkpoint(&Operation::file_write("/home/dev/../../etc/passwd"), &cwd)
                .is_err()
        );
        assert!(c.list().unwrap().is_empty());
    }

    #[test]
    fn test_unbounded_retention_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let c = RecoveryCoordinator::new(
            Arc::new(MemoryStore::new()),
            RecoveryConfig {
                retention_secs: u64::MAX,
                ..RecoveryConfig::default()
            },
        );
        let cp = c.checkpoint(&Operation::shell("rm a.txt"), dir.path()).unwrap();
        assert!(cp.expires_at > cp.created_at);
        assert!(!cp.is_expired(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn test_oversized_archive_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.bin"), vec![7u8; 4096]).unwrap();
        let store = Arc::new(MemoryStore::new());
        let c = RecoveryCoordinator::new(
            store.clone(),
            RecoveryConfig {
                max_archive_bytes: 1024,
                ..RecoveryConfig::default()
            },
        );
        let err = c.checkpoint(&Operation::shell("rm big.bin"), dir.path()).unwrap_err();
        assert!(matches!(err, WardenError::CheckpointFailed(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_git_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (c, _) = coordinator();
        let err = c
            .checkpoint(&Operation::shell("git reset --hard"), dir.path())
            .unwrap_err();
        assert!(matches!(err, WardenError::CheckpointFailed(_)));
    }
}
