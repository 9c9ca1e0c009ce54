//! Script persistence.
//!
//! Canonical writers store the flat form; readers accept both flat and the
//! wrapped `{script, mode, output_language}` envelope. `load_raw` preserves
//! whatever shape is on disk for callers that re-serialize it.

use std::path::Path;

use lectio_models::Script;

use crate::atomic::write_json_atomic;
use crate::error::{StoreError, StoreResult};

/// Save a script in the flat canonical form.
pub fn save_script(path: &Path, script: &Script) -> StoreResult<()> {
    write_json_atomic(path, script)
}

/// Load a script, stripping the legacy wrapper when present.
pub fn load_script(path: &Path) -> StoreResult<Script> {
    let value = load_raw(path)?;
    Script::from_json_value(value)
        .map_err(|e| StoreError::corrupt_script(path, e.to_string()))
}

/// Load the raw JSON value without unwrapping.
pub fn load_raw(path: &Path) -> StoreResult<serde_json::Value> {
    if !path.exists() {
        return Err(StoreError::ScriptNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::corrupt_script(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectio_models::Section;
    use serde_json::json;

    #[test]
    fn test_save_load_roundtrip_flat() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("script.json");

        let script = Script {
            title: "Derivatives".into(),
            sections: vec![Section {
                id: "s1".into(),
                title: "Limits".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        save_script(&path, &script).unwrap();

        let loaded = load_script(&path).unwrap();
        assert_eq!(loaded.title, "Derivatives");
        assert_eq!(loaded.sections.len(), 1);

        // Canonical writer emits the flat form
        let raw = load_raw(&path).unwrap();
        assert!(raw.get("script").is_none());
    }

    #[test]
    fn test_load_strips_wrapper_but_raw_preserves_it() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("script.json");
        let wrapped = json!({
            "script": {"title": "Wrapped", "sections": []},
            "mode": "comprehensive",
            "output_language": "es"
        });
        std::fs::write(&path, serde_json::to_vec(&wrapped).unwrap()).unwrap();

        let script = load_script(&path).unwrap();
        assert_eq!(script.title, "Wrapped");

        let raw = load_raw(&path).unwrap();
        assert_eq!(raw["mode"], json!("comprehensive"));
    }

    #[test]
    fn test_missing_script() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_script(&tmp.path().join("none.json")).unwrap_err();
        assert!(matches!(err, StoreError::ScriptNotFound(_)));
    }

    #[test]
    fn test_corrupt_script() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("script.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = load_script(&path).unwrap_err();
        assert!(matches!(err, StoreError::CorruptScript { .. }));
    }
}
