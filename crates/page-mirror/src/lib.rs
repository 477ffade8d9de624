//! page-mirror — core capture pipeline that turns a live page's network traffic
//! into a locally runnable static copy.
//!
//! The browser itself stays outside this crate: callers feed responses through
//! [`ResponseSource`] and expose the settled DOM through [`DocumentSource`].

pub mod capture;
pub mod classify;
pub mod error;
pub mod resolve;
pub mod rewrite;
pub mod root;
pub mod types;
pub mod writer;

pub use capture::{CaptureCoordinator, ResponseSource};
pub use classify::{classify, should_ignore};
pub use error::{ErrorScope, MirrorError, MirrorResult};
pub use resolve::{is_writable_path, resolve};
pub use rewrite::{DocumentRewriter, DocumentSource, RewriteReport};
pub use root::MirrorRoot;
pub use types::*;
pub use writer::{write_fetched, write_inline_image};
