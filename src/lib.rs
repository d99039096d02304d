mod error;
pub mod grammars;
pub mod languages;
mod options;
mod registry;
mod tokenizer;
mod tree;

pub use error::Error;
pub use options::{RegistryConfig, ScanOptions};
pub use registry::{AutoScanResult, PLAIN_GRAMMAR_NAME, Registry};
pub use tokenizer::ScanResult;
pub use tree::{Node, Tree, TreeVisitor};
