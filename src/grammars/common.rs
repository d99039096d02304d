use super::raw::{RawRule, RawRuleRef};

/// Building blocks shared by grammar definitions.
///
/// A grammar factory gets a `&Primitives` so it can reuse the common identifiers, strings,
/// comments and numbers instead of redefining them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Primitives;

const DOCTAG_WORDS: &str = "(TODO|FIXME|NOTE|BUG|OPTIMIZE|HACK|XXX):";

impl Primitives {
    pub const IDENT_RE: &'static str = r"[a-zA-Z]\w*";
    pub const UNDERSCORE_IDENT_RE: &'static str = r"[a-zA-Z_]\w*";
    pub const NUMBER_RE: &'static str = r"\b\d+(\.\d+)?";
    pub const C_NUMBER_RE: &'static str =
        r"(-?)(\b0[xX][a-fA-F0-9]+|(\b\d+(\.\d*)?|\.\d+)([eE][-+]?\d+)?)";
    pub const BINARY_NUMBER_RE: &'static str = r"\b(0b[01]+)";
    pub const MATCH_NOTHING_RE: &'static str = r"\b\B";
    pub const RE_STARTERS_RE: &'static str = r"!|!=|!==|%|%=|&|&&|&=|\*|\*=|\+|\+=|,|-|-=|/=|/|:|;|<<|<<=|<=|<|===|==|=|>>>=|>>=|>=|>>>|>>|>|\?|\[|\{|\(|\^|\^=|\||\|=|\|\||~";

    /// Joins the patterns one after the other
    pub fn concat(parts: &[&str]) -> String {
        parts.concat()
    }

    /// Non-capturing alternation of the patterns
    pub fn either(alternatives: &[&str]) -> String {
        format!("(?:{})", alternatives.join("|"))
    }

    pub fn lookahead(pattern: &str) -> String {
        format!("(?={pattern})")
    }

    pub fn optional(pattern: &str) -> String {
        format!("(?:{pattern})?")
    }

    pub fn any_number_of_times(pattern: &str) -> String {
        format!("(?:{pattern})*")
    }

    /// A backslash followed by any character, counting for nothing
    pub fn backslash_escape(&self) -> RawRule {
        RawRule::default().begin(r"\\[\s\S]").relevance(0)
    }

    pub fn apos_string_mode(&self) -> RawRule {
        RawRule::default()
            .scope("string")
            .begin("'")
            .end("'")
            .illegal(r"\n")
            .contains(vec![self.backslash_escape().into()])
    }

    pub fn quote_string_mode(&self) -> RawRule {
        RawRule::default()
            .scope("string")
            .begin("\"")
            .end("\"")
            .illegal(r"\n")
            .contains(vec![self.backslash_escape().into()])
    }

    /// A comment between `begin` and `end`.
    ///
    /// It highlights `TODO:` style tags and gains relevance when it looks like a sentence so
    /// commented-out code doesn't look like prose for auto-detection.
    pub fn comment(&self, begin: &str, end: &str) -> RawRule {
        let doctag = RawRule::default()
            .scope("doctag")
            .begin(format!("[ ]*(?={DOCTAG_WORDS})"))
            .end(DOCTAG_WORDS)
            .exclude_begin(true)
            .relevance(0);
        let english_word = Self::either(&[
            "I",
            "a",
            "is",
            "so",
            "us",
            "to",
            "at",
            "if",
            "in",
            "it",
            "on",
            r"[A-Za-z]+['](d|ve|re|ll|t|s|n)",
            r"[A-Za-z]+[-][a-z]+",
            r"[A-Za-z][a-z]{2,}",
        ]);
        let phrase =
            RawRule::default().begin(format!(r"[ ]+({english_word}[.]?[:]?([.][ ]|[ ])){{3}}"));

        RawRule::default()
            .scope("comment")
            .begin(begin)
            .end(end)
            .contains(vec![doctag.into(), phrase.into()])
    }

    pub fn c_line_comment_mode(&self) -> RawRule {
        self.comment("//", "$")
    }

    pub fn c_block_comment_mode(&self) -> RawRule {
        self.comment(r"/\*", r"\*/")
    }

    pub fn hash_comment_mode(&self) -> RawRule {
        self.comment("#", "$")
    }

    pub fn number_mode(&self) -> RawRule {
        RawRule::default()
            .scope("number")
            .begin(Self::NUMBER_RE)
            .relevance(0)
    }

    pub fn c_number_mode(&self) -> RawRule {
        RawRule::default()
            .scope("number")
            .begin(Self::C_NUMBER_RE)
            .relevance(0)
    }

    pub fn binary_number_mode(&self) -> RawRule {
        RawRule::default()
            .scope("number")
            .begin(Self::BINARY_NUMBER_RE)
            .relevance(0)
    }

    pub fn regexp_mode(&self) -> RawRule {
        RawRule::default()
            .scope("regexp")
            .begin(r"/(?=[^/\n]*/)")
            .end("/[gimuy]*")
            .contains(vec![
                self.backslash_escape().into(),
                RawRule::default()
                    .begin(r"\[")
                    .end(r"\]")
                    .relevance(0)
                    .contains(vec![self.backslash_escape().into()])
                    .into(),
            ])
    }

    pub fn title_mode(&self) -> RawRule {
        RawRule::default()
            .scope("title")
            .begin(Self::IDENT_RE)
            .relevance(0)
    }

    pub fn underscore_title_mode(&self) -> RawRule {
        RawRule::default()
            .scope("title")
            .begin(Self::UNDERSCORE_IDENT_RE)
            .relevance(0)
    }

    /// Skips method calls like `.foo` so they don't get picked up as keywords
    pub fn method_guard(&self) -> RawRule {
        RawRule::default()
            .begin(format!(r"\.\s*{}", Self::UNDERSCORE_IDENT_RE))
            .relevance(0)
    }

    /// Words that mostly appear in prose
    pub fn phrasal_words_mode(&self) -> RawRule {
        RawRule::default().begin(
            r"\b(a|an|the|are|I'm|isn't|don't|doesn't|won't|but|just|should|pretty|simply|enough|gonna|going|wtf|so|such|will|you|your|they|like|more)\b",
        )
    }

    /// A `#!` line at the very start of the text.
    /// When `binary` is given, only interpreters matching it are accepted.
    pub fn shebang(&self, binary: Option<&str>) -> RawRule {
        let start = r"\A#![ ]*/";
        let rule = RawRule::default()
            .scope("meta")
            .begin(start)
            .end("$")
            .relevance(0);
        match binary {
            Some(binary) => rule
                .begin(Self::concat(&[start, r".*\b", binary, r"\b.*"]))
                .relevance(10),
            None => rule,
        }
    }

    /// Makes the end of `rule` only match when its first capture is the same as the begin one.
    pub fn end_same_as_begin(&self, rule: RawRule) -> RawRule {
        rule.end_same_as_begin(true)
    }

    /// Shorthand for `"self"` in a `contains` list
    pub fn self_ref(&self) -> RawRuleRef {
        RawRuleRef::self_ref()
    }
}
