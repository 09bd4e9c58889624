//! JsonFileStore 文件系统测试

use arm_config::{ArmConfig, ConfigDocument, ConfigError, ConfigStore, JsonFileStore};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_load_creates_empty_document_when_absent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("params.json");
    let store = JsonFileStore::new(&path);

    let doc = store.load().unwrap();
    assert!(doc.is_empty());
    assert!(path.exists());
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&std::fs::read_to_string(&path).unwrap())
            .unwrap(),
        json!({})
    );
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("params.json"));

    let mut doc = ConfigDocument::new();
    doc.set("j0", "limitAdj", json!(5)).unwrap();
    doc.set_global("label", json!("bench"));
    store.save(&doc).unwrap();

    let loaded = JsonFileStore::new(store.path()).load().unwrap();
    assert_eq!(loaded, doc);
    assert!(!dir.path().join("params.json.tmp").exists());
}

#[test]
fn test_load_rejects_invalid_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("params.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        JsonFileStore::new(&path).load(),
        Err(ConfigError::Json(_))
    ));
}

#[test]
fn test_load_rejects_non_object_root() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("params.json");
    std::fs::write(&path, "[1, 2, 3]").unwrap();

    assert!(matches!(
        JsonFileStore::new(&path).load(),
        Err(ConfigError::NotAnObject(_))
    ));
}

#[test]
fn test_arm_config_resolves_relative_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arm.toml");
    std::fs::write(
        &path,
        "id = \"bench\"\nstore = \"params.json\"\n[[joints]]\nid = \"j0\"\nbus_address = 1\n",
    )
    .unwrap();

    let arm = ArmConfig::load(&path).unwrap();
    assert_eq!(arm.store, Some(dir.path().join("params.json")));
}

#[test]
fn test_arm_config_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        ArmConfig::load(dir.path().join("missing.toml")),
        Err(ConfigError::Io { .. })
    ));
}

#[test]
fn test_demo_arm_description_parses() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/arm.toml");
    let config = ArmConfig::load(&path).unwrap();

    assert_eq!(config.id, "bench");
    assert_eq!(config.joints.len(), 3);
    assert_eq!(config.joints[0].params.limit_adj, 2.5);
    assert!(config.joints[2].params.invert);
    assert_eq!(config.joints[2].counts_per_degree, 100.0);
    assert_eq!(config.store, Some(path.parent().unwrap().join("bench-params.json")));
}

#[test]
fn test_save_replaces_file_without_leaving_temp() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("params.json"));
    store.load().unwrap();

    let mut doc = ConfigDocument::new();
    doc.set("j0", "limitAdj", json!(1.5)).unwrap();
    store.save(&doc).unwrap();
    doc.set("j0", "limitAdj", json!(2.5)).unwrap();
    store.save(&doc).unwrap();

    assert!(!store.temp_path().exists());
    assert_eq!(store.load().unwrap().get("j0", "limitAdj"), Some(&json!(2.5)));
}
