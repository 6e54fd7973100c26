//! Export file encoding: base64 over the JSON save.

use crate::pipeline::{LoadError, check_marker};
use alembic_core::player::PlayerState;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// `Alterhistorian Save #N (stamp)`, where `stamp` is the host's local
/// date and time.
pub fn export_file_name(export_count: u32, stamp: &str) -> String {
    format!("Alterhistorian Save #{export_count} ({stamp})")
}

pub fn encode_export(player: &PlayerState) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(player)?;
    Ok(STANDARD.encode(json))
}

/// Decode an export file back to its save object. Surrounding whitespace
/// is ignored. The object must carry the current marker.
pub fn decode_import(text: &str) -> Result<Value, ImportError> {
    let bytes = STANDARD.decode(text.trim())?;
    let json = String::from_utf8(bytes)?;
    let value: Value = serde_json::from_str(&json)?;
    check_marker(&value)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alembic_core::player::VITAL_MARKER;
    use alembic_core::test_utils::*;

    // -----------------------------------------------------------------------
    // Test 1: export file name format
    // -----------------------------------------------------------------------
    #[test]
    fn file_name_format() {
        assert_eq!(
            export_file_name(3, "2024-05-01 13:37:00"),
            "Alterhistorian Save #3 (2024-05-01 13:37:00)"
        );
    }

    // -----------------------------------------------------------------------
    // Test 2: encoded export decodes to the same object
    // -----------------------------------------------------------------------
    #[test]
    fn encode_then_decode() {
        let engine = engine();
        let p = player(&engine);
        let text = encode_export(&p).unwrap();
        let value = decode_import(&format!("  {text}\n")).unwrap();
        assert_eq!(value, serde_json::to_value(&p).unwrap());
    }

    // -----------------------------------------------------------------------
    // Test 3: each failure stage maps to its error
    // -----------------------------------------------------------------------
    #[test]
    fn failure_stages() {
        assert!(matches!(decode_import("***"), Err(ImportError::Base64(_))));
        assert!(matches!(
            decode_import(&STANDARD.encode([0xff, 0xfe])),
            Err(ImportError::Utf8(_))
        ));
        assert!(matches!(
            decode_import(&STANDARD.encode("{not json")),
            Err(ImportError::Json(_))
        ));
        assert!(matches!(
            decode_import(&STANDARD.encode("42")),
            Err(ImportError::Load(LoadError::NotAnObject))
        ));
        assert!(matches!(
            decode_import(&STANDARD.encode(r#"{"vitalMarker":"nope"}"#)),
            Err(ImportError::Load(LoadError::MarkerMismatch { .. }))
        ));
        let ok = STANDARD.encode(format!(r#"{{"vitalMarker":"{VITAL_MARKER}"}}"#));
        assert!(decode_import(&ok).is_ok());
    }
}
