mod common;
mod compiled;
mod keywords;
mod pattern_set;
mod raw;
mod regex;

pub use common::Primitives;
pub use compiled::*;
pub use keywords::{Keyword, KeywordSpan, KeywordTable};
pub use pattern_set::{Candidate, MatchKind, PatternSet, PatternSetMatch};
pub use raw::{
    RawGrammar, RawKeywords, RawPattern, RawRule, RawRuleRef, RawScope, RawSubLanguage,
    SELF_REFERENCE,
};
pub use regex::Regex;
pub(crate) use regex::next_char_boundary;
