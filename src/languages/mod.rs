//! Grammars shipped with the crate, registered by [`Registry::builtin`](crate::Registry::builtin).
//!
//! Each language is a factory building a [`RawGrammar`] from the shared [`Primitives`], the
//! same shape as the closures given to [`Registry::register`](crate::Registry::register).
use crate::grammars::{Primitives, RawGrammar};

mod bash;
mod plaintext;
mod raptorfile;

pub use bash::bash;
pub use plaintext::plaintext;
pub use raptorfile::raptorfile;

pub(crate) type GrammarFactory = fn(&Primitives) -> RawGrammar;

/// Registration order matters: it's the order auto-detection goes through grammars
pub(crate) const BUILTIN: &[(&str, GrammarFactory)] = &[
    ("bash", bash),
    ("raptorfile", raptorfile),
    ("plaintext", plaintext),
];
