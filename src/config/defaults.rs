//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// [vault] Section Defaults
// ============================================================================

pub mod vault {
    use std::path::PathBuf;

    pub fn root() -> PathBuf {
        ".".into()
    }

    pub fn extensions() -> Vec<String> {
        vec!["md".into()]
    }
}

// ============================================================================
// [store] Section Defaults
// ============================================================================

pub mod store {
    use std::path::PathBuf;

    pub fn path() -> PathBuf {
        ".sheetblocks/state.json".into()
    }

    pub fn debounce_ms() -> u64 {
        200
    }

    pub fn max_delay_ms() -> u64 {
        1000
    }
}

// ============================================================================
// [watch] Section Defaults
// ============================================================================

pub mod watch {
    pub fn debounce_ms() -> u64 {
        300
    }
}
