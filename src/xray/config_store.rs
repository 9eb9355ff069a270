//! XRay `config.json` access.
//!
//! Only the first inbound with `protocol == "vless"` is managed. Every write
//! goes through a temp file in the same directory followed by a rename, so
//! XRay never observes a half-written config on reload. Two concurrent
//! load→mutate→save units can still lose one of the edits; callers keep
//! write concurrency low instead of locking.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;

pub const VLESS_PROTOCOL: &str = "vless";

/// Handle to the config file on disk.
#[derive(Debug, Clone)]
pub struct XrayConfigFile {
    path: PathBuf,
}

impl XrayConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Value, AppError> {
        load(&self.path)
    }

    pub fn save(&self, doc: &Value) -> Result<(), AppError> {
        save(doc, &self.path)
    }

    /// Load, append the client, save.
    pub fn create_client(&self, id: &str, label: &str) -> Result<(), AppError> {
        let mut doc = self.load()?;
        add_client(&mut doc, id, label)?;
        self.save(&doc)
    }

    /// Load, drop the client, and save only if something was removed.
    pub fn remove_client(&self, id: &str) -> Result<bool, AppError> {
        let mut doc = self.load()?;
        if !remove_client(&mut doc, id)? {
            return Ok(false);
        }
        self.save(&doc)?;
        Ok(true)
    }

    pub fn client_ids(&self) -> Result<Vec<String>, AppError> {
        let mut doc = self.load()?;
        Ok(client_list(&mut doc)?
            .iter()
            .filter_map(|c| c.get("id").and_then(Value::as_str).map(String::from))
            .collect())
    }
}

pub fn load(path: &Path) -> Result<Value, AppError> {
    if !path.exists() {
        return Err(AppError::ConfigNotFound(path.display().to_string()));
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Serialize `doc` and atomically replace `path` with it.
pub fn save(doc: &Value, path: &Path) -> Result<(), AppError> {
    let mut body = serde_json::to_string_pretty(doc)?;
    body.push('\n');

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("config.json");
    let temp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let written = write_synced(&temp_path, body.as_bytes()).and_then(|_| {
        // keep the original mode (XRay often runs as a different user)
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&temp_path, meta.permissions())?;
        }
        fs::rename(&temp_path, path)
    });

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Client array of the first VLESS inbound, creating empty `settings` /
/// `clients` containers when the inbound has none yet.
pub fn client_list(doc: &mut Value) -> Result<&mut Vec<Value>, AppError> {
    let inbounds = doc
        .get_mut("inbounds")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| AppError::UnsupportedConfigShape("missing `inbounds` array".into()))?;

    let inbound = inbounds
        .iter_mut()
        .find(|inbound| inbound.get("protocol").and_then(Value::as_str) == Some(VLESS_PROTOCOL))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            AppError::UnsupportedConfigShape(format!("no inbound with protocol `{}`", VLESS_PROTOCOL))
        })?;

    inbound
        .entry("settings")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| AppError::UnsupportedConfigShape("inbound `settings` is not an object".into()))?
        .entry("clients")
        .or_insert_with(|| json!([]))
        .as_array_mut()
        .ok_or_else(|| AppError::UnsupportedConfigShape("inbound `clients` is not an array".into()))
}

pub fn add_client(doc: &mut Value, id: &str, label: &str) -> Result<(), AppError> {
    let clients = client_list(doc)?;
    if clients
        .iter()
        .any(|c| c.get("id").and_then(Value::as_str) == Some(id))
    {
        return Err(AppError::DuplicateCredential(id.to_string()));
    }
    clients.push(json!({ "id": id, "email": label }));
    Ok(())
}

pub fn remove_client(doc: &mut Value, id: &str) -> Result<bool, AppError> {
    let clients = client_list(doc)?;
    let before = clients.len();
    clients.retain(|c| c.get("id").and_then(Value::as_str) != Some(id));
    Ok(clients.len() != before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample() -> Value {
        json!({
            "log": { "access": "/var/log/xray/access.log" },
            "inbounds": [
                { "protocol": "dokodemo-door", "settings": { "address": "127.0.0.1" } },
                {
                    "protocol": "vless",
                    "port": 443,
                    "settings": {
                        "clients": [{ "id": "11111111-1111-4111-8111-111111111111", "email": "first" }],
                        "decryption": "none"
                    }
                },
                { "protocol": "vless", "settings": { "clients": [] } }
            ]
        })
    }

    fn ids(doc: &mut Value) -> BTreeSet<String> {
        client_list(doc)
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn uses_first_vless_inbound() {
        let mut doc = sample();
        add_client(&mut doc, "new-id", "bob").unwrap();
        assert_eq!(doc["inbounds"][1]["settings"]["clients"][1]["id"], "new-id");
        assert_eq!(doc["inbounds"][1]["settings"]["clients"][1]["email"], "bob");
        assert!(doc["inbounds"][2]["settings"]["clients"].as_array().unwrap().is_empty());
    }

    #[test]
    fn add_then_remove_restores_client_set() {
        let mut doc = sample();
        let before = ids(&mut doc);
        add_client(&mut doc, "22222222-2222-4222-8222-222222222222", "x").unwrap();
        assert!(remove_client(&mut doc, "22222222-2222-4222-8222-222222222222").unwrap());
        assert_eq!(ids(&mut doc), before);
    }

    #[test]
    fn duplicate_add_leaves_document_untouched() {
        let mut doc = sample();
        let snapshot = doc.clone();
        let err = add_client(&mut doc, "11111111-1111-4111-8111-111111111111", "dup").unwrap_err();
        assert!(matches!(err, AppError::DuplicateCredential(_)));
        assert_eq!(doc, snapshot);
    }

    #[test]
    fn remove_missing_reports_false() {
        let mut doc = sample();
        assert!(!remove_client(&mut doc, "nope").unwrap());
    }

    #[test]
    fn missing_settings_are_created() {
        let mut doc = json!({ "inbounds": [{ "protocol": "vless" }] });
        add_client(&mut doc, "a", "b").unwrap();
        assert_eq!(doc["inbounds"][0]["settings"]["clients"][0]["id"], "a");
    }

    #[test]
    fn no_vless_inbound_is_unsupported() {
        let mut doc = json!({ "inbounds": [{ "protocol": "vmess", "settings": { "clients": [] } }] });
        assert!(matches!(
            client_list(&mut doc),
            Err(AppError::UnsupportedConfigShape(_))
        ));
        let mut doc = json!({ "outbounds": [] });
        assert!(matches!(
            client_list(&mut doc),
            Err(AppError::UnsupportedConfigShape(_))
        ));
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(load(&missing), Err(AppError::ConfigNotFound(_))));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(load(&broken), Err(AppError::ConfigParse(_))));
    }

    #[test]
    fn save_replaces_file_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, serde_json::to_string(&sample()).unwrap()).unwrap();

        let file = XrayConfigFile::new(&path);
        file.create_client("33333333-3333-4333-8333-333333333333", "carol").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let raw = fs::read_to_string(&path).unwrap();
        // key order of untouched sections survives the round trip
        assert!(raw.find("\"log\"").unwrap() < raw.find("\"inbounds\"").unwrap());
        assert!(file
            .client_ids()
            .unwrap()
            .contains(&"33333333-3333-4333-8333-333333333333".to_string()));
    }

    #[test]
    fn remove_client_without_match_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let original = serde_json::to_string(&sample()).unwrap();
        fs::write(&path, &original).unwrap();

        let file = XrayConfigFile::new(&path);
        assert!(!file.remove_client("not-there").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }
}
