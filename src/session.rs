//! One running instance: vault, live blocks, store and bus wired together.
//!
//! ```text
//!  SheetConfig ─► Vault (scan) ──────────► LiveBlocks ◄── register_builtin(Services)
//!                  │  metadata changed ──►   │ reconcile              │
//!                  ▼                         ▼                        ▼
//!               Page per open document   TextRegion/Surface    KvStore + Broadcast
//! ```

use crate::{
    blocks::{DocPath, Interaction, LiveBlocks},
    broadcast::Broadcast,
    config::SheetConfig,
    host::{Change, Layout, Page, Vault},
    log,
    store::KvStore,
    widgets::{Services, register_builtin},
};
use anyhow::{Context, Result, bail};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::{Path, PathBuf},
    rc::Rc,
};

/// What happened to a document after a file event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reload {
    /// Text changed; `layout` is set when the document has an open page
    Updated {
        document: DocPath,
        change: Change,
        layout: Option<Layout>,
    },
    Removed(DocPath),
    Ignored,
}

pub struct Session {
    config: SheetConfig,
    vault: Rc<Vault>,
    blocks: LiveBlocks,
    services: Services,
    pages: RefCell<BTreeMap<DocPath, Rc<Page>>>,
}

impl Session {
    /// Scan the vault and open the configured state file.
    pub fn open(config: SheetConfig) -> Result<Self> {
        let store = KvStore::open(&config.store.path, config.store.timing());
        Self::with_store(config, store)
    }

    pub fn with_store(config: SheetConfig, store: KvStore) -> Result<Self> {
        let vault = Rc::new(Vault::new(&config.vault.root, &config.vault.extensions));
        let count = vault.scan()?;
        log!("blocks"; "{count} documents in {}", config.vault.root.display());

        let blocks = LiveBlocks::new(vault.clone());
        let services = Services {
            store,
            bus: Broadcast::new(),
        };
        register_builtin(&blocks, &services);

        Ok(Self {
            config,
            vault,
            blocks,
            services,
            pages: RefCell::default(),
        })
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn blocks(&self) -> &LiveBlocks {
        &self.blocks
    }

    pub fn store(&self) -> &KvStore {
        &self.services.store
    }

    /// Document id of `file`, given relative to the vault root or absolute.
    pub fn document(&self, file: &Path) -> Result<DocPath> {
        let path: PathBuf = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.vault.root().join(file)
        };
        let document = self.vault.doc_path(&path);
        if self.vault.text(&document).is_none() {
            bail!("`{}` is not a document of the vault", file.display());
        }
        Ok(document)
    }

    /// The page of `document`, mounting its blocks on first use.
    pub fn page(&self, document: &DocPath) -> Result<Rc<Page>> {
        if let Some(page) = self.pages.borrow().get(document) {
            return Ok(page.clone());
        }
        let page = Rc::new(Page::open(document.clone(), self.vault.clone(), self.blocks.clone())?);
        self.pages.borrow_mut().insert(document.clone(), page.clone());
        Ok(page)
    }

    /// Open a page for every document. Returns the number of live blocks.
    pub fn open_all(&self) -> Result<usize> {
        let mut live = 0;
        for document in self.vault.documents() {
            live += self.page(&document)?.block_count();
        }
        Ok(live)
    }

    pub fn render(&self, document: &DocPath) -> Result<String> {
        Ok(self.page(document)?.render())
    }

    /// Click box `index` of the `block`-th live block `times` times.
    pub fn click(&self, document: &DocPath, block: usize, index: usize, times: usize) -> Result<()> {
        let page = self.page(document)?;
        let (lang, surface) = page.block(block).with_context(|| {
            format!("{document} has {} live blocks, no block {block}", page.block_count())
        })?;

        for _ in 0..times {
            if !surface.interact(Interaction::Click(index)) {
                bail!("block {block} (`{lang}`) does not take clicks");
            }
        }
        Ok(())
    }

    /// Apply a file event for `path`.
    ///
    /// Frontmatter edits reach live blocks through the vault's metadata
    /// notification; the page refresh afterwards remounts blocks whose text or
    /// position changed.
    pub fn reload(&self, path: &Path) -> Result<Reload> {
        if !self.vault.is_document(path) {
            return Ok(Reload::Ignored);
        }
        let document = self.vault.doc_path(path);

        if !path.exists() {
            self.pages.borrow_mut().remove(&document);
            return Ok(if self.vault.remove(&document) {
                Reload::Removed(document)
            } else {
                Reload::Ignored
            });
        }

        let change = self.vault.load(path)?;
        let page = self.pages.borrow().get(&document).cloned();
        let layout = match page {
            Some(page) => Some(page.refresh()?),
            None => None,
        };
        Ok(Reload::Updated {
            document,
            change,
            layout,
        })
    }

    /// Documents with an open page.
    pub fn open_documents(&self) -> Vec<DocPath> {
        self.pages.borrow().keys().cloned().collect()
    }

    /// Release every page and write pending state.
    pub fn close(&self) -> Result<()> {
        self.pages.borrow_mut().clear();
        self.services.store.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cli::{Cli, Commands},
        store::{FlushTiming, MemoryBackend},
    };
    use std::{fs, sync::Arc};
    use tempfile::TempDir;

    const HERO: &str = "---\nname: Ilsa\nlevel: 2\n---\n# {{ frontmatter.name }}\n\n```tracker\nlabel: HP\nuses: \"{{ add 4 frontmatter.level }}\"\nstate_key: hp\n```\n\n```tracker\nlabel: HP again\nuses: 6\nstate_key: hp\n```\n";

    fn setup() -> (TempDir, Session, Arc<MemoryBackend>) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hero.md"), HERO).unwrap();

        let mut config = SheetConfig::default();
        config.update_with_cli(&Cli {
            root: Some(dir.path().to_path_buf()),
            config: "sheetblocks.toml".into(),
            store: None,
            command: Commands::Init,
        });

        let backend = Arc::new(MemoryBackend::new());
        let store = KvStore::with_backend("state.json", backend.clone(), FlushTiming::default());
        let session = Session::with_store(config, store).unwrap();
        (dir, session, backend)
    }

    #[test]
    fn test_render_document() {
        let (_dir, session, _) = setup();
        let doc = session.document(Path::new("hero.md")).unwrap();
        let out = session.render(&doc).unwrap();

        assert!(out.contains("HP  □□□□□□  0/6"));
        assert!(out.contains("HP again  □□□□□□  0/6"));
        // Plain text is not a template.
        assert!(out.contains("# {{ frontmatter.name }}"));
    }

    #[test]
    fn test_click_updates_both_instances_and_persists() {
        let (_dir, session, backend) = setup();
        let doc = session.document(Path::new("hero.md")).unwrap();

        session.click(&doc, 0, 3, 1).unwrap();
        let out = session.render(&doc).unwrap();
        assert!(out.contains("HP  ■■■■□□  4/6"));
        assert!(out.contains("HP again  ■■■■□□  4/6"));

        session.close().unwrap();
        let saved: serde_json::Value =
            serde_json::from_slice(&backend.contents(Path::new("state.json")).unwrap()).unwrap();
        assert_eq!(saved["tracker:hp::hero.md"], 4);
    }

    #[test]
    fn test_click_errors() {
        let (_dir, session, _) = setup();
        let doc = session.document(Path::new("hero.md")).unwrap();
        assert!(session.click(&doc, 5, 0, 1).is_err());
        assert!(session.document(Path::new("missing.md")).is_err());
    }

    #[test]
    fn test_reload_frontmatter_edit_reconciles() {
        let (_dir, session, _) = setup();
        let doc = session.document(Path::new("hero.md")).unwrap();
        session.render(&doc).unwrap();

        let path = session.vault().root().join("hero.md");
        fs::write(&path, HERO.replace("level: 2", "level: 1")).unwrap();
        let reload = session.reload(&path).unwrap();

        let Reload::Updated { change, layout, .. } = reload else {
            panic!("expected an update");
        };
        assert_eq!(change, Change::Metadata);
        assert!(!layout.unwrap().changed());
        assert!(session.render(&doc).unwrap().contains("HP  □□□□□  0/5"));
    }

    #[test]
    fn test_reload_traits_edit_updates_derived_values() {
        const ROGUE: &str = "---\nname: Vex\n---\n```traits\nbase: { agility: 1 }\n```\n\n```badges\nitems:\n  - { label: Evasion, value: \"{{ add 10 abilities.agility }}\" }\n```\n";
        let (_dir, session, _) = setup();
        let path = session.vault().root().join("rogue.md");
        fs::write(&path, ROGUE).unwrap();
        session.reload(&path).unwrap();

        let doc = session.document(&path).unwrap();
        assert!(session.render(&doc).unwrap().contains("[Evasion 11]"));

        fs::write(&path, ROGUE.replace("agility: 1", "agility: 4")).unwrap();
        let Reload::Updated { change, layout, .. } = session.reload(&path).unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(change, Change::Body);
        assert_eq!(layout.unwrap().rerendered, 1);

        let out = session.render(&doc).unwrap();
        assert!(out.contains("Agility +4"));
        assert!(out.contains("[Evasion 14]"));
    }

    #[test]
    fn test_reload_removed_and_ignored() {
        let (_dir, session, _) = setup();
        let doc = session.document(Path::new("hero.md")).unwrap();
        session.render(&doc).unwrap();
        assert_eq!(session.blocks().live_count(&doc), 2);

        let path = session.vault().root().join("hero.md");
        fs::remove_file(&path).unwrap();
        assert_eq!(session.reload(&path).unwrap(), Reload::Removed(doc.clone()));
        assert_eq!(session.blocks().live_count(&doc), 0);

        assert_eq!(session.reload(&session.vault().root().join("notes.txt")).unwrap(), Reload::Ignored);
    }
}
