use crate::error::{Result, SolidifyError};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::{self, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Parsed JSON per file, together with the source text it was parsed from
static JSON_CACHE: Lazy<Mutex<HashMap<PathBuf, CachedDocument>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

struct CachedDocument {
    source: String,
    json: Value,
}

// A poisoned cache only means another thread panicked mid-insert; the map is still usable.
fn lock() -> MutexGuard<'static, HashMap<PathBuf, CachedDocument>> {
    JSON_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// JSON loader for configuration documents
pub struct JsonParser;

impl JsonParser {
    /// Load JSON data from a file path.
    ///
    /// The file is read on every call; the cached parse is reused only while
    /// the file content is unchanged, so an edited file is always picked up.
    pub fn load_json<P: AsRef<Path>>(file_path: P) -> Result<Value> {
        let path_buf = file_path.as_ref().to_path_buf();
        let source = fs::read_to_string(&path_buf).map_err(|e| {
            SolidifyError::Config(format!("failed to read {}: {}", path_buf.display(), e))
        })?;

        if let Some(cached) = lock().get(&path_buf) {
            if cached.source == source {
                return Ok(cached.json.clone());
            }
        }

        let json: Value = serde_json::from_str(&source)?;
        lock().insert(
            path_buf,
            CachedDocument {
                source,
                json: json.clone(),
            },
        );
        Ok(json)
    }

    /// Deserialize a typed value out of a loaded document
    pub fn decode<T: DeserializeOwned>(json: Value) -> Result<T> {
        Ok(serde_json::from_value(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("solidify_fem_{}_{}.json", name, std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_edited_file_is_reloaded() {
        let path = scratch_file("edited", r#"{ "time": { "dt": 0.5 } }"#);
        let first = JsonParser::load_json(&path).unwrap();
        assert_eq!(first["time"]["dt"], 0.5);
        assert_eq!(JsonParser::load_json(&path).unwrap(), first);

        fs::write(&path, r#"{ "time": { "dt": 2.0 } }"#).unwrap();
        let second = JsonParser::load_json(&path).unwrap();
        assert_eq!(second["time"]["dt"], 2.0);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_error_handling() {
        let non_existent = PathBuf::from("/path/that/does/not/exist.json");
        let result = JsonParser::load_json(non_existent);
        assert!(matches!(result, Err(SolidifyError::Config(_))));

        let path = scratch_file("broken", r#"{"broken": "json""#);
        let result = JsonParser::load_json(&path);
        assert!(matches!(result, Err(SolidifyError::Json(_))));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_decode_typed_value() {
        #[derive(serde::Deserialize)]
        struct Step {
            dt: f64,
        }

        let step: Step = JsonParser::decode(serde_json::json!({ "dt": 0.25 })).unwrap();
        assert_eq!(step.dt, 0.25);
    }
}
