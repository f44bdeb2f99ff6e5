//! Reference host: a vault of markdown files rendered as text pages.

mod page;
mod region;
mod vault;

pub use page::{Layout, Page};
pub use region::TextRegion;
pub use vault::{Change, Vault};
