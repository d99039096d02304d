use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use super::compiled::{CompileError, CompiledGrammar};
use crate::error::AmbraResult;

/// The name used in `contains` to refer to the rule owning the list.
pub const SELF_REFERENCE: &str = "self";

/// A regex source, or a sequence of them.
///
/// For `begin`/`end`/`match` a sequence is matched as one pattern, each element in its own
/// capture group so a capture scope map can annotate them.
/// For `illegal` a sequence is an alternation.
///
/// # Examples
/// ```json
/// { "match": ["(fn)", "\\s+", "([a-z]+)"], "scope": { "1": "keyword", "3": "title.function" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawPattern {
    Single(String),
    Sequence(Vec<String>),
}

impl From<&str> for RawPattern {
    fn from(value: &str) -> Self {
        RawPattern::Single(value.to_owned())
    }
}

impl From<String> for RawPattern {
    fn from(value: String) -> Self {
        RawPattern::Single(value)
    }
}

impl<const N: usize> From<[&str; N]> for RawPattern {
    fn from(value: [&str; N]) -> Self {
        RawPattern::Sequence(value.iter().map(|s| s.to_string()).collect())
    }
}

/// Either a single scope name or a map from capture group number (as a string, since that's
/// what JSON gives us) to scope name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawScope {
    Name(String),
    Captures(BTreeMap<String, String>),
}

impl From<&str> for RawScope {
    fn from(value: &str) -> Self {
        RawScope::Name(value.to_owned())
    }
}

impl<const N: usize> From<[(usize, &str); N]> for RawScope {
    fn from(value: [(usize, &str); N]) -> Self {
        RawScope::Captures(
            value
                .iter()
                .map(|(group, scope)| (group.to_string(), scope.to_string()))
                .collect(),
        )
    }
}

/// Keywords of a rule.
///
/// # Examples
/// ```json
/// "keywords": "if else while"
/// "keywords": ["if", "else", "while"]
/// "keywords": {
///   "$pattern": "[a-z-]+",
///   "keyword": "if else|2 while",
///   "literal": ["true", "false"]
/// }
/// ```
/// Plain strings and lists use the `keyword` category.
/// A `word|N` entry gives the word a relevance of N.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawKeywords {
    Words(String),
    List(Vec<String>),
    Categories(BTreeMap<String, RawKeywords>),
}

impl RawKeywords {
    pub fn categories<'a>(categories: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        RawKeywords::Categories(
            categories
                .into_iter()
                .map(|(category, words)| (category.to_owned(), RawKeywords::Words(words.to_owned())))
                .collect(),
        )
    }
}

impl From<&str> for RawKeywords {
    fn from(value: &str) -> Self {
        RawKeywords::Words(value.to_owned())
    }
}

/// The grammar to use for the content of a rule.
///
/// A list, possibly empty, means auto-detection among those grammars (all of them if empty).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawSubLanguage {
    Single(String),
    Candidates(Vec<String>),
}

/// An entry of a `contains` list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawRuleRef {
    /// `"self"` or the name of a rule in the grammar repository.
    Named(String),
    Rule(Box<RawRule>),
}

impl RawRuleRef {
    pub fn self_ref() -> Self {
        RawRuleRef::Named(SELF_REFERENCE.to_owned())
    }

    pub fn named(name: &str) -> Self {
        RawRuleRef::Named(name.to_owned())
    }
}

impl From<RawRule> for RawRuleRef {
    fn from(value: RawRule) -> Self {
        RawRuleRef::Rule(Box::new(value))
    }
}

/// A rule, also called a mode.
///
/// Every field is optional so variants can override only what they need.
///
/// # Examples
/// ```json
/// {
///   "scope": "string",
///   "begin": "\"",
///   "end": "\"",
///   "illegal": "\\n",
///   "contains": [{ "begin": "\\\\[\\s\\S]", "relevance": 0 }, "interpolation"]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct RawRule {
    #[serde(alias = "className")]
    pub scope: Option<RawScope>,
    pub begin_scope: Option<RawScope>,
    pub end_scope: Option<RawScope>,
    pub begin: Option<RawPattern>,
    pub end: Option<RawPattern>,
    /// Shorthand for a `begin` without `end`
    #[serde(rename(deserialize = "match"))]
    pub match_: Option<RawPattern>,
    /// Space separated words: the rule begins on any of them, as long as they're not preceded
    /// by a `.`
    pub begin_keywords: Option<String>,
    pub keywords: Option<RawKeywords>,
    pub illegal: Option<RawPattern>,
    pub contains: Option<Vec<RawRuleRef>>,
    pub variants: Option<Vec<RawRule>>,
    /// A rule to enter when this one ends
    pub starts: Option<Box<RawRule>>,
    pub sub_language: Option<RawSubLanguage>,
    pub exclude_begin: Option<bool>,
    pub exclude_end: Option<bool>,
    pub return_begin: Option<bool>,
    pub return_end: Option<bool>,
    pub ends_parent: Option<bool>,
    pub ends_with_parent: Option<bool>,
    pub skip: Option<bool>,
    /// The end only matches if its first capture group is the same text as the first capture
    /// group of the begin. Used for heredocs.
    pub end_same_as_begin: Option<bool>,
    pub relevance: Option<u32>,
}

macro_rules! inherit_fields {
    ($base:ident, $overrides:ident; $($field:ident),* $(,)?) => {
        RawRule {
            $($field: $overrides.$field.clone().or_else(|| $base.$field.clone()),)*
            variants: None,
        }
    };
}

impl RawRule {
    pub fn scope(mut self, scope: impl Into<RawScope>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn begin_scope(mut self, scope: impl Into<RawScope>) -> Self {
        self.begin_scope = Some(scope.into());
        self
    }

    pub fn end_scope(mut self, scope: impl Into<RawScope>) -> Self {
        self.end_scope = Some(scope.into());
        self
    }

    pub fn begin(mut self, pattern: impl Into<RawPattern>) -> Self {
        self.begin = Some(pattern.into());
        self
    }

    pub fn end(mut self, pattern: impl Into<RawPattern>) -> Self {
        self.end = Some(pattern.into());
        self
    }

    pub fn match_(mut self, pattern: impl Into<RawPattern>) -> Self {
        self.match_ = Some(pattern.into());
        self
    }

    pub fn begin_keywords(mut self, words: &str) -> Self {
        self.begin_keywords = Some(words.to_owned());
        self
    }

    pub fn keywords(mut self, keywords: impl Into<RawKeywords>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    pub fn illegal(mut self, pattern: impl Into<RawPattern>) -> Self {
        self.illegal = Some(pattern.into());
        self
    }

    pub fn contains(mut self, rules: Vec<RawRuleRef>) -> Self {
        self.contains = Some(rules);
        self
    }

    pub fn variants(mut self, variants: Vec<RawRule>) -> Self {
        self.variants = Some(variants);
        self
    }

    pub fn starts(mut self, rule: RawRule) -> Self {
        self.starts = Some(Box::new(rule));
        self
    }

    pub fn sub_language(mut self, name: &str) -> Self {
        self.sub_language = Some(RawSubLanguage::Single(name.to_owned()));
        self
    }

    pub fn sub_language_candidates(mut self, names: &[&str]) -> Self {
        self.sub_language = Some(RawSubLanguage::Candidates(
            names.iter().map(|n| n.to_string()).collect(),
        ));
        self
    }

    pub fn exclude_begin(mut self, value: bool) -> Self {
        self.exclude_begin = Some(value);
        self
    }

    pub fn exclude_end(mut self, value: bool) -> Self {
        self.exclude_end = Some(value);
        self
    }

    pub fn return_begin(mut self, value: bool) -> Self {
        self.return_begin = Some(value);
        self
    }

    pub fn return_end(mut self, value: bool) -> Self {
        self.return_end = Some(value);
        self
    }

    pub fn ends_parent(mut self, value: bool) -> Self {
        self.ends_parent = Some(value);
        self
    }

    pub fn ends_with_parent(mut self, value: bool) -> Self {
        self.ends_with_parent = Some(value);
        self
    }

    pub fn skip(mut self, value: bool) -> Self {
        self.skip = Some(value);
        self
    }

    pub fn end_same_as_begin(mut self, value: bool) -> Self {
        self.end_same_as_begin = Some(value);
        self
    }

    pub fn relevance(mut self, relevance: u32) -> Self {
        self.relevance = Some(relevance);
        self
    }

    /// Returns a copy of `self` where every field set in `overrides` replaces ours.
    /// The result never has variants.
    pub fn inherit(&self, overrides: &RawRule) -> RawRule {
        inherit_fields!(self, overrides;
            scope, begin_scope, end_scope, begin, end, match_, begin_keywords, keywords,
            illegal, contains, starts, sub_language, exclude_begin, exclude_end, return_begin,
            return_end, ends_parent, ends_with_parent, skip, end_same_as_begin, relevance,
        )
    }

    /// The rules this one stands for: one per variant or itself if it has none.
    pub(crate) fn expand_variants(&self) -> Vec<RawRule> {
        match &self.variants {
            Some(variants) => variants.iter().map(|v| self.inherit(v)).collect(),
            None => vec![self.clone()],
        }
    }

    /// A rule ending with its parent can't be shared between parents since its terminator
    /// includes the parent's one.
    pub(crate) fn depends_on_parent(&self) -> bool {
        self.ends_with_parent == Some(true)
            || self
                .starts
                .as_ref()
                .is_some_and(|starts| starts.depends_on_parent())
    }
}

/// Top-level structure representing a complete grammar
///
/// # Examples
/// ```json
/// {
///   "name": "raptorfile",
///   "aliases": ["raptor"],
///   "case_insensitive": false,
///   "keywords": "FROM ENV MOUNT",
///   "illegal": "</",
///   "contains": [
///     "comment",
///     { "beginKeywords": "RUN CMD", "starts": { "end": "[^\\\\]$", "subLanguage": "bash" } }
///   ],
///   "repository": {
///     "comment": { "scope": "comment", "begin": "#", "end": "$" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct RawGrammar {
    /// Name of the language, used as the registry name when loading from a file
    pub name: String,
    /// Other names the grammar can be found under
    pub aliases: Vec<String>,
    /// Whether keywords and regexes ignore case
    #[serde(rename(deserialize = "case_insensitive"), alias = "caseInsensitive")]
    pub case_insensitive: bool,
    /// The grammar is never picked by auto-detection
    pub disable_autodetect: bool,
    /// On a tie during auto-detection, that grammar wins over this one
    pub superset_of: Option<String>,
    /// Renames scopes and keyword categories when emitting them
    pub class_name_aliases: HashMap<String, String>,
    /// Named rules that can be referenced by name in `contains`, possibly recursively
    pub repository: HashMap<String, RawRule>,
    /// The fields of the root rule: `keywords`, `contains`, `illegal`...
    #[serde(flatten)]
    pub root: RawRule,
}

impl RawGrammar {
    pub fn new(name: &str, root: RawRule) -> Self {
        Self {
            name: name.to_owned(),
            root,
            ..Default::default()
        }
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn case_insensitive(mut self, value: bool) -> Self {
        self.case_insensitive = value;
        self
    }

    pub fn disable_autodetect(mut self, value: bool) -> Self {
        self.disable_autodetect = value;
        self
    }

    pub fn superset_of(mut self, name: &str) -> Self {
        self.superset_of = Some(name.to_owned());
        self
    }

    pub fn class_name_alias(mut self, from: &str, to: &str) -> Self {
        self.class_name_aliases
            .insert(from.to_owned(), to.to_owned());
        self
    }

    pub fn repository_rule(mut self, name: &str, rule: RawRule) -> Self {
        self.repository.insert(name.to_owned(), rule);
        self
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> AmbraResult<Self> {
        let file = File::open(&path)?;
        let raw_grammar = serde_json::from_reader(&file)?;
        Ok(raw_grammar)
    }

    pub fn from_json_str(json: &str) -> AmbraResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compile this raw grammar into an optimized compiled grammar
    pub fn compile(&self) -> Result<CompiledGrammar, CompileError> {
        CompiledGrammar::from_raw_grammar(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_deserialize_grammar() {
        let grammar = RawGrammar::from_json_str(
            r##"{
                "name": "demo",
                "aliases": ["dm"],
                "case_insensitive": true,
                "supersetOf": "base",
                "classNameAliases": { "kw": "keyword" },
                "keywords": { "$pattern": "[a-z]+", "keyword": "let|3 in", "literal": ["true"] },
                "illegal": ["</", "\\$"],
                "contains": [
                    "self",
                    "comment",
                    {
                        "match": ["(r)", "(\"[^\"]*\")"],
                        "scope": { "1": "meta", "2": "string" },
                        "excludeBegin": true,
                        "relevance": 0
                    },
                    { "beginKeywords": "RUN", "starts": { "end": "$", "subLanguage": ["bash", "sh"] } }
                ],
                "repository": {
                    "comment": { "className": "comment", "begin": "#", "end": "$", "endsWithParent": true }
                }
            }"##,
        )
        .unwrap();

        assert_eq!(grammar.name, "demo");
        assert_eq!(grammar.aliases, vec!["dm"]);
        assert!(grammar.case_insensitive);
        assert_eq!(grammar.superset_of.as_deref(), Some("base"));
        assert_eq!(grammar.class_name_aliases["kw"], "keyword");
        assert_eq!(
            grammar.root.illegal,
            Some(RawPattern::Sequence(vec!["</".into(), "\\$".into()]))
        );

        let RawKeywords::Categories(categories) = grammar.root.keywords.as_ref().unwrap() else {
            panic!("expected categories");
        };
        assert_eq!(categories["$pattern"], RawKeywords::Words("[a-z]+".into()));
        assert_eq!(
            categories["literal"],
            RawKeywords::List(vec!["true".into()])
        );

        let contains = grammar.root.contains.as_ref().unwrap();
        assert_eq!(contains[0], RawRuleRef::self_ref());
        assert_eq!(contains[1], RawRuleRef::named("comment"));
        let RawRuleRef::Rule(string) = &contains[2] else {
            panic!("expected an inline rule");
        };
        assert_eq!(string.scope, Some(RawScope::from([(1, "meta"), (2, "string")])));
        assert_eq!(string.match_, Some(RawPattern::from(["(r)", "(\"[^\"]*\")"])));
        assert_eq!(string.exclude_begin, Some(true));
        assert_eq!(string.relevance, Some(0));
        let RawRuleRef::Rule(run) = &contains[3] else {
            panic!("expected an inline rule");
        };
        assert_eq!(
            run.starts.as_ref().unwrap().sub_language,
            Some(RawSubLanguage::Candidates(vec!["bash".into(), "sh".into()]))
        );

        let comment = &grammar.repository["comment"];
        assert_eq!(comment.scope, Some("comment".into()));
        assert!(comment.depends_on_parent());
    }

    #[test]
    fn variants_override_their_base() {
        let rule = RawRule::default()
            .scope("string")
            .relevance(0)
            .contains(vec![RawRuleRef::named("escape")])
            .variants(vec![
                RawRule::default().begin("'").end("'"),
                RawRule::default().begin("\"").end("\"").relevance(2),
            ]);

        let expanded = rule.expand_variants();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].begin, Some("'".into()));
        assert_eq!(expanded[0].relevance, Some(0));
        assert_eq!(expanded[1].relevance, Some(2));
        for variant in &expanded {
            assert_eq!(variant.scope, Some("string".into()));
            assert_eq!(variant.contains, Some(vec![RawRuleRef::named("escape")]));
            assert!(variant.variants.is_none());
        }

        assert_eq!(RawRule::default().begin("x").expand_variants().len(), 1);
    }

    #[test]
    fn starts_chain_depends_on_parent() {
        let rule = RawRule::default()
            .begin("a")
            .starts(RawRule::default().ends_with_parent(true));
        assert!(rule.depends_on_parent());
        assert!(!RawRule::default().begin("a").depends_on_parent());
    }
}
