//! One-shot commands: `render`, `click` and `state`.

use crate::{config::SheetConfig, log, session::Session, store::KvStore};
use anyhow::{Context, Result};
use std::path::Path;

/// Print `file` with its live blocks rendered.
pub fn render_document(config: &SheetConfig, file: &Path) -> Result<()> {
    let session = Session::open(config.clone())?;
    let document = session.document(file)?;
    println!("{}", session.render(&document)?);
    session.close()
}

/// Click a block `times` times, persist, and print the document.
pub fn click_block(
    config: &SheetConfig,
    file: &Path,
    block: usize,
    index: usize,
    times: usize,
) -> Result<()> {
    let session = Session::open(config.clone())?;
    let document = session.document(file)?;

    session.click(&document, block, index, times)?;
    log!("render"; "{document}: clicked block {block} box {index} x{times}");

    println!("{}", session.render(&document)?);
    session.close()
}

/// Print persisted state (or one key) as JSON.
pub fn show_state(config: &SheetConfig, key: Option<&str>) -> Result<()> {
    let store = KvStore::open(&config.store.path, config.store.timing());
    println!("{}", state_json(&store, key)?);
    Ok(())
}

fn state_json(store: &KvStore, key: Option<&str>) -> Result<String> {
    let value = match key {
        Some(key) => store
            .get_value(key)
            .with_context(|| format!("no state stored under `{key}`"))?,
        None => serde_json::Value::Object(store.snapshot()),
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FlushTiming, MemoryBackend};
    use std::sync::Arc;

    #[test]
    fn test_state_json() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("state.json", r#"{"tracker:hp::hero.md": 3, "checklist:gear": [true]}"#);
        let store = KvStore::with_backend("state.json", backend, FlushTiming::default());

        assert_eq!(state_json(&store, Some("tracker:hp::hero.md")).unwrap(), "3");
        let all: serde_json::Value = serde_json::from_str(&state_json(&store, None).unwrap()).unwrap();
        assert_eq!(all["checklist:gear"][0], true);
        assert!(state_json(&store, Some("missing")).is_err());
    }
}
