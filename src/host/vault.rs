//! In-memory document host over a directory of markdown files.

use crate::{
    blocks::{DocPath, DocumentHost, MetadataListener, RenderContext, SectionInfo},
    document::{Frontmatter, parse_frontmatter},
    log,
};
use anyhow::{Context, Result};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};
use walkdir::WalkDir;

struct Document {
    text: String,
    frontmatter: Frontmatter,
}

/// What an update did to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    /// Frontmatter differs; listeners were notified
    Metadata,
    /// Only the body changed
    Body,
    Unchanged,
}

/// Documents of a vault, keyed by vault-relative path.
pub struct Vault {
    root: PathBuf,
    extensions: Vec<String>,
    docs: RefCell<BTreeMap<DocPath, Document>>,
    listeners: RefCell<Vec<Rc<dyn Fn(&DocPath, Option<&Frontmatter>)>>>,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.to_vec(),
            docs: RefCell::default(),
            listeners: RefCell::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` looks like a vault document.
    pub fn is_document(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Vault-relative identity of a file path (absolute or root-relative).
    pub fn doc_path(&self, path: &Path) -> DocPath {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
        DocPath::new(parts.join("/"))
    }

    pub fn file_path(&self, document: &DocPath) -> PathBuf {
        self.root.join(document.as_str())
    }

    /// Load every document under the root. Returns the number loaded.
    pub fn scan(&self) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = entry.with_context(|| format!("failed to scan {}", self.root.display()))?;
            if entry.file_type().is_file() && self.is_document(entry.path()) {
                self.load(entry.path())?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// (Re)read one file from disk.
    pub fn load(&self, path: &Path) -> Result<Change> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(self.update(self.doc_path(path), text))
    }

    /// Replace the text of `document`.
    ///
    /// Metadata listeners run when the frontmatter of a known document differs
    /// from its previous value.
    pub fn update(&self, document: DocPath, text: impl Into<String>) -> Change {
        let text = text.into();
        let frontmatter = parse_frontmatter(&text).unwrap_or_else(|e| {
            log!("error"; "{document}: invalid frontmatter: {e}");
            Frontmatter::new()
        });

        let change = {
            let mut docs = self.docs.borrow_mut();
            let change = match docs.get(&document) {
                None => Change::Created,
                Some(old) if old.frontmatter != frontmatter => Change::Metadata,
                Some(old) if old.text != text => Change::Body,
                Some(_) => Change::Unchanged,
            };
            docs.insert(
                document.clone(),
                Document {
                    text,
                    frontmatter: frontmatter.clone(),
                },
            );
            change
        };

        if change == Change::Metadata {
            self.notify(&document, &frontmatter);
        }
        change
    }

    pub fn remove(&self, document: &DocPath) -> bool {
        self.docs.borrow_mut().remove(document).is_some()
    }

    pub fn text(&self, document: &DocPath) -> Option<String> {
        self.docs.borrow().get(document).map(|d| d.text.clone())
    }

    pub fn documents(&self) -> Vec<DocPath> {
        self.docs.borrow().keys().cloned().collect()
    }

    fn notify(&self, document: &DocPath, frontmatter: &Frontmatter) {
        // Listeners re-enter the vault to read metadata and text.
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener(document, Some(frontmatter));
        }
    }
}

impl DocumentHost for Vault {
    fn metadata(&self, document: &DocPath) -> Option<Frontmatter> {
        self.docs.borrow().get(document).map(|d| d.frontmatter.clone())
    }

    fn section_info(&self, ctx: &RenderContext) -> Option<SectionInfo> {
        let docs = self.docs.borrow();
        let doc = docs.get(&ctx.document)?;
        Some(SectionInfo {
            text: doc.text.clone(),
            line_start: ctx.line_start,
            line_end: ctx.line_end,
        })
    }

    fn on_metadata_changed(&self, listener: MetadataListener) {
        self.listeners.borrow_mut().push(Rc::from(listener));
    }
}
