//! HLS playlist handling: line grammar, reference resolution and rewriting.

pub mod parser;
pub mod rewriter;
pub mod uri;

pub use parser::{ManifestEntry, ReferenceKind, parse};
pub use rewriter::{Rewritten, rewrite};
pub use uri::{RelayEndpoint, Resolution, base_uri, resolve};
