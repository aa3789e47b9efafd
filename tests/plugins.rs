use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arkd::config::AppConfig;
use arkd::context::AppContext;
use arkd::core::layout;
use arkd::db;
use arkd::error::Error;
use arkd::service::Service;
use tempfile::tempdir;
use tokio::time::timeout;

async fn service_with_install_dir(install_dir: &Path) -> Service {
    let config = AppConfig {
        server_roots_dir: Some(install_dir.to_path_buf()),
        ..AppConfig::default()
    };
    Service::new(AppContext::new(config, db::init_in_memory().await.unwrap()))
}

fn make_server(install_dir: &Path, name: &str) -> PathBuf {
    let root = install_dir.join(name);
    fs::create_dir_all(layout::plugins_dir(&root)).unwrap();
    root
}

fn make_source_plugin(dir: &Path, name: &str) -> PathBuf {
    let plugin = dir.join(name);
    fs::create_dir_all(plugin.join("data")).unwrap();
    fs::write(plugin.join(format!("{}.dll", name)), b"binary").unwrap();
    fs::write(plugin.join("config.json"), b"{\"enabled\":true}").unwrap();
    fs::write(plugin.join("data").join("items.json"), b"[]").unwrap();
    plugin
}

#[tokio::test]
async fn test_install_to_discovered_servers() {
    let temp = tempdir().unwrap();
    let install_dir = temp.path().join("servers");
    make_server(&install_dir, "Island");
    make_server(&install_dir, "Ragnarok");
    let source_dir = temp.path().join("downloads");
    make_source_plugin(&source_dir, "Shop");

    let service = service_with_install_dir(&install_dir).await;

    let sources: Vec<PathBuf> = service
        .list_source_plugins(source_dir.clone())
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.path)
        .collect();
    assert_eq!(sources.len(), 1);

    let destinations: Vec<PathBuf> = service
        .discover_plugin_destinations()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.plugin_path)
        .collect();
    assert_eq!(destinations.len(), 2);

    let report = service
        .install_plugins(sources.clone(), destinations.clone())
        .await
        .unwrap();
    assert!(report.errors.is_empty());
    assert_eq!(report.files_copied, 6);
    assert_eq!(report.files_overwritten, 0);
    for dest in &destinations {
        assert_eq!(
            fs::read(dest.join("Shop").join("data").join("items.json")).unwrap(),
            b"[]"
        );
    }

    // Reinstalling replaces every file.
    let report = service.install_plugins(sources, destinations).await.unwrap();
    assert_eq!(report.files_copied, 6);
    assert_eq!(report.files_overwritten, 6);
}

#[tokio::test]
async fn test_install_reports_bad_source_and_keeps_going() {
    let temp = tempdir().unwrap();
    let install_dir = temp.path().join("servers");
    let root = make_server(&install_dir, "Island");
    let good = make_source_plugin(&temp.path().join("downloads"), "Shop");
    let missing = temp.path().join("downloads").join("Ghost");

    let service = service_with_install_dir(&install_dir).await;
    let report = service
        .install_plugins(vec![missing, good], vec![layout::plugins_dir(&root)])
        .await
        .unwrap();

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("Ghost"));
    assert!(report.files_copied > 0);
    assert!(layout::plugins_dir(&root).join("Shop").join("config.json").is_file());
}

#[tokio::test]
async fn test_install_requires_sources_and_destinations() {
    let temp = tempdir().unwrap();
    let service = service_with_install_dir(temp.path()).await;

    let err = service
        .install_plugins(Vec::new(), vec![temp.path().to_path_buf()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_toggle_all_round_trip() {
    let temp = tempdir().unwrap();
    let install_dir = temp.path().join("servers");
    let island = make_server(&install_dir, "Island");
    let center = make_server(&install_dir, "Center");
    let bare = make_server(&install_dir, "Bare");
    fs::create_dir(layout::plugins_dir(&island).join("Shop")).unwrap();
    fs::create_dir(layout::plugins_dir(&center).join("Shop")).unwrap();

    let service = service_with_install_dir(&install_dir).await;

    let report = service
        .toggle_plugin_for_all_servers("Shop".to_string(), true)
        .await
        .unwrap();
    assert_eq!(report.toggled.len(), 2);
    assert!(report.errors.is_empty());
    assert!(layout::plugins_dir(&island).join("Shop_OFF").is_dir());
    assert!(layout::plugins_dir(&center).join("Shop_OFF").is_dir());
    assert!(!layout::plugins_dir(&bare).join("Shop_OFF").exists());

    // Already disabled everywhere: nothing to do.
    let report = service
        .toggle_plugin_for_all_servers("Shop".to_string(), true)
        .await
        .unwrap();
    assert!(report.toggled.is_empty());

    let report = service
        .toggle_plugin_for_all_servers("Shop_OFF".to_string(), false)
        .await
        .unwrap();
    assert_eq!(report.toggled.len(), 2);
    assert!(layout::plugins_dir(&island).join("Shop").is_dir());
    assert!(layout::plugins_dir(&center).join("Shop").is_dir());

    let folders = service.list_plugin_folders(island.clone()).await.unwrap();
    assert_eq!(folders.len(), 1);
    assert!(!folders[0].is_disabled);
    assert_eq!(folders[0].base_name, "Shop");
}

#[tokio::test]
async fn test_toggle_single_conflict_leaves_both_folders() {
    let temp = tempdir().unwrap();
    let install_dir = temp.path().join("servers");
    let root = make_server(&install_dir, "Island");
    let plugins = layout::plugins_dir(&root);
    fs::create_dir(plugins.join("Shop")).unwrap();
    fs::create_dir(plugins.join("Shop_OFF")).unwrap();

    let service = service_with_install_dir(&install_dir).await;
    let err = service
        .toggle_plugin_folder(plugins.join("Shop"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert!(plugins.join("Shop").is_dir());
    assert!(plugins.join("Shop_OFF").is_dir());

    fs::remove_dir(plugins.join("Shop_OFF")).unwrap();
    let toggled = service
        .toggle_plugin_folder(plugins.join("Shop"))
        .await
        .unwrap();
    assert_eq!(toggled, plugins.join("Shop_OFF"));
}

#[tokio::test]
async fn test_list_plugin_folders_missing_server() {
    let temp = tempdir().unwrap();
    let service = service_with_install_dir(temp.path()).await;

    let err = service
        .list_plugin_folders(temp.path().join("nowhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_plugin_writes_wait_for_backup_of_same_server() {
    let temp = tempdir().unwrap();
    let install_dir = temp.path().join("servers");
    let root = make_server(&install_dir, "Island");
    let plugins = layout::plugins_dir(&root);
    fs::create_dir(plugins.join("Shop")).unwrap();
    let source = make_source_plugin(&temp.path().join("downloads"), "Vault");

    let service = service_with_install_dir(&install_dir).await;

    // The worker holds the server root while it archives it.
    let backup = service.context().locks.acquire([root.clone()]).await;

    let install = tokio::spawn({
        let service = service.clone();
        let plugins = plugins.clone();
        async move { service.install_plugins(vec![source], vec![plugins]).await }
    });
    let toggle = tokio::spawn({
        let service = service.clone();
        let folder = plugins.join("Shop");
        async move { service.toggle_plugin_folder(folder).await }
    });
    let toggle_all = tokio::spawn({
        let service = service.clone();
        async move {
            service
                .toggle_plugin_for_all_servers("Vault".to_string(), true)
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!install.is_finished());
    assert!(!toggle.is_finished());
    assert!(!toggle_all.is_finished());
    assert!(!plugins.join("Vault").exists());
    assert!(plugins.join("Shop").is_dir());

    drop(backup);

    let report = timeout(Duration::from_secs(5), install)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(report.errors.is_empty());
    assert_eq!(report.files_copied, 3);

    let toggled = timeout(Duration::from_secs(5), toggle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(toggled, plugins.join("Shop_OFF"));

    // Ordering against the install is up to the lock, so only completion is
    // asserted here.
    timeout(Duration::from_secs(5), toggle_all)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_install_reports_unreadable_source_and_keeps_going() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().unwrap();
    let install_dir = temp.path().join("servers");
    let root = make_server(&install_dir, "Island");
    let downloads = temp.path().join("downloads");
    let locked = make_source_plugin(&downloads, "Locked");
    let good = make_source_plugin(&downloads, "Shop");

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Permission bits are not enforced for this user (root).
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let service = service_with_install_dir(&install_dir).await;
    let report = service
        .install_plugins(vec![locked.clone(), good], vec![layout::plugins_dir(&root)])
        .await
        .unwrap();

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("Locked"));
    assert_eq!(report.files_copied, 3);
    assert!(layout::plugins_dir(&root).join("Shop").join("config.json").is_file());
}
