//! On-disk configuration snapshots
//!
//! Snapshots are tab-indented JSON. A missing, empty or unparseable file
//! reads as "nothing persisted"; a failed write is an error.

use crate::error::FrameworkError;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// File name of the snapshot holding the final merged configuration
pub const ACTIVE_SNAPSHOT: &str = ".active.json";

/// Read a persisted configuration object
pub fn read_snapshot(path: &Path) -> Option<Value> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no persisted configuration");
            return None;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read persisted configuration, using defaults");
            return None;
        }
    };

    if contents.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(&contents) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "persisted configuration is not an object, ignoring it");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "persisted configuration is not valid JSON, ignoring it");
            None
        }
    }
}

/// Serialize a tree as tab-indented JSON
pub fn to_pretty_json(tree: &Value) -> Result<String, FrameworkError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    tree.serialize(&mut serializer)?;
    buffer.push(b'\n');
    String::from_utf8(buffer).map_err(|e| FrameworkError::internal(e.to_string()))
}

/// Write a snapshot, creating its directory if needed
pub fn write_snapshot(path: &Path, tree: &Value) -> Result<(), FrameworkError> {
    let contents = to_pretty_json(tree)?;
    let io_error = |source| FrameworkError::ConfigIo {
        action: "write",
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)?;
    tracing::debug!(path = %path.display(), "configuration snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_roundtrip_is_tab_indented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("local.json");
        let tree = json!({ "name": "demo", "server": { "port": 8080 } });

        write_snapshot(&path, &tree).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n\t\"name\": \"demo\""));
        assert!(raw.contains("\n\t\t\"port\": 8080"));
        assert_eq!(read_snapshot(&path), Some(tree));
    }

    #[test]
    fn test_unusable_snapshots_read_as_absent() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(read_snapshot(&dir.path().join("missing.json")), None);

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "  \n").unwrap();
        assert_eq!(read_snapshot(&empty), None);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ \"name\": ").unwrap();
        assert_eq!(read_snapshot(&broken), None);

        let scalar = dir.path().join("scalar.json");
        fs::write(&scalar, "42").unwrap();
        assert_eq!(read_snapshot(&scalar), None);
    }

    #[test]
    fn test_write_into_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let err = write_snapshot(&blocker.join("local.json"), &json!({})).unwrap_err();
        assert!(matches!(err, FrameworkError::ConfigIo { action: "write", .. }));
    }
}
