use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::grammars::keywords::KeywordTable;
use crate::grammars::pattern_set::{Candidate, MatchKind, PatternSet};
use crate::grammars::raw::{
    RawGrammar, RawKeywords, RawPattern, RawRule, RawRuleRef, RawScope, RawSubLanguage,
    SELF_REFERENCE,
};
use crate::grammars::regex::{Regex, join_in_groups};

/// Used as begin and end when a rule doesn't give one: matches right away without consuming
/// anything.
pub const BOUNDARY_PATTERN: &str = r"\B|\b";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RuleId(pub(crate) u16);

impl Deref for RuleId {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub const ROOT_RULE_ID: RuleId = RuleId(0);

/// How to emit the text matched by a begin or end pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEmit {
    /// The whole lexeme under a single scope
    Whole(String),
    /// One node per element of an array pattern: (capture group, scope).
    /// Elements without a scope go through keyword classification.
    Groups(Vec<(usize, Option<String>)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubLanguage {
    Named(String),
    /// Auto-detection among those grammars, or all of them if empty
    Auto(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleFlags {
    pub exclude_begin: bool,
    pub exclude_end: bool,
    pub return_begin: bool,
    pub return_end: bool,
    pub ends_parent: bool,
    pub ends_with_parent: bool,
    pub skip: bool,
    pub end_same_as_begin: bool,
    /// Begin matches directly preceded by a `.` are ignored (set by `beginKeywords`)
    pub ignore_after_dot: bool,
}

#[derive(Debug)]
pub struct Rule {
    pub id: RuleId,
    pub scope: Option<String>,
    pub begin_scope: Option<ScopeEmit>,
    pub end_scope: Option<ScopeEmit>,
    /// Only the root rule doesn't have one
    pub begin: Option<Regex>,
    pub end: Option<Regex>,
    /// The end of this rule, or of the parents it ends with
    pub terminator: Option<Regex>,
    pub illegal: Option<Regex>,
    pub keywords: Option<KeywordTable>,
    pub contains: Vec<RuleId>,
    pub starts: Option<RuleId>,
    pub sub_language: Option<SubLanguage>,
    pub relevance: u32,
    pub flags: RuleFlags,
    /// Children begins, then the terminator, then the illegal pattern
    pub(crate) candidates: Vec<Candidate>,
}

#[derive(Debug)]
pub struct CompiledGrammar {
    pub name: String,
    pub aliases: Vec<String>,
    pub case_insensitive: bool,
    pub disable_autodetect: bool,
    pub superset_of: Option<String>,
    /// The root rule is always first
    pub(crate) rules: Vec<Rule>,
    /// Matchers are only built the first time a rule is active, from a given candidate index
    matchers: papaya::HashMap<(RuleId, usize), Arc<PatternSet>>,
}

impl CompiledGrammar {
    pub fn from_raw_grammar(raw: &RawGrammar) -> Result<Self, CompileError> {
        let mut compiler = Compiler {
            raw,
            rules: Vec::new(),
            shared: HashMap::new(),
            dependent_chain: HashSet::new(),
        };
        if raw
            .root
            .contains
            .as_ref()
            .is_some_and(|c| c.iter().any(|r| matches!(r, RawRuleRef::Named(n) if n == SELF_REFERENCE)))
        {
            return Err(CompileError::SelfAtTopLevel);
        }

        let root_id = compiler.reserve()?;
        compiler.compile_rule(&raw.root, root_id, None)?;

        let mut rules = compiler
            .rules
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(CompileError::UnfinishedRule)?;
        link_candidates(&mut rules);

        #[cfg(feature = "debug")]
        log::debug!("Compiled grammar {} into {} rules", raw.name, rules.len());

        Ok(Self {
            name: raw.name.clone(),
            aliases: raw.aliases.clone(),
            case_insensitive: raw.case_insensitive,
            disable_autodetect: raw.disable_autodetect,
            superset_of: raw.superset_of.clone(),
            rules,
            matchers: papaya::HashMap::new(),
        })
    }

    /// Only for ids coming from this grammar
    pub(crate) fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[*id as usize]
    }

    /// The rule with that id, `None` if it belongs to another, bigger, grammar
    pub fn get_rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(*id as usize)
    }

    pub fn root(&self) -> &Rule {
        self.rule(ROOT_RULE_ID)
    }

    pub fn rules_len(&self) -> usize {
        self.rules.len()
    }

    /// The combined matcher for the candidates of `rule_id` starting at index `start`.
    pub(crate) fn matcher(&self, rule_id: RuleId, start: usize) -> Result<Arc<PatternSet>, String> {
        let matchers = self.matchers.pin();
        if let Some(matcher) = matchers.get(&(rule_id, start)) {
            return Ok(Arc::clone(matcher));
        }

        let candidates = &self.rule(rule_id).candidates;
        let start = start.min(candidates.len());
        let matcher = Arc::new(PatternSet::new(
            &candidates[start..],
            start,
            self.case_insensitive,
        )?);
        Ok(Arc::clone(matchers.get_or_insert((rule_id, start), matcher)))
    }
}

fn link_candidates(rules: &mut [Rule]) {
    let all_candidates: Vec<Vec<Candidate>> = rules
        .iter()
        .map(|rule| {
            let mut candidates: Vec<Candidate> = rule
                .contains
                .iter()
                .filter_map(|child| {
                    let begin = rules[**child as usize].begin.as_ref()?;
                    Some(Candidate {
                        kind: MatchKind::Begin(*child),
                        pattern: begin.pattern().to_owned(),
                        captures_len: begin.captures_len(),
                    })
                })
                .collect();

            if let Some(terminator) = &rule.terminator {
                candidates.push(Candidate {
                    kind: MatchKind::End,
                    pattern: terminator.pattern().to_owned(),
                    captures_len: terminator.captures_len(),
                });
            }
            if let Some(illegal) = &rule.illegal {
                candidates.push(Candidate {
                    kind: MatchKind::Illegal,
                    pattern: illegal.pattern().to_owned(),
                    captures_len: illegal.captures_len(),
                });
            }
            candidates
        })
        .collect();

    for (rule, candidates) in rules.iter_mut().zip(all_candidates) {
        rule.candidates = candidates;
    }
}

#[derive(Clone, Copy)]
enum Delimiter {
    Begin,
    End,
}

struct Parent<'p> {
    terminator: Option<&'p str>,
}

struct Compiler<'a> {
    raw: &'a RawGrammar,
    rules: Vec<Option<Rule>>,
    /// Repository rules compiled once and shared by every parent
    shared: HashMap<String, Vec<RuleId>>,
    /// Repository rules being compiled for a specific parent, to catch infinite expansions
    dependent_chain: HashSet<String>,
}

impl<'a> Compiler<'a> {
    fn reserve(&mut self) -> Result<RuleId, CompileError> {
        let id = u16::try_from(self.rules.len())
            .map(RuleId)
            .map_err(|_| CompileError::TooManyRules)?;
        self.rules.push(None);
        Ok(id)
    }

    fn regex(&self, pattern: impl Into<String>) -> Result<Regex, CompileError> {
        let pattern = pattern.into();
        Regex::new(pattern.as_str(), self.raw.case_insensitive).map_err(|e| {
            CompileError::InvalidRegex {
                pattern,
                message: e.to_string(),
            }
        })
    }

    fn alias(&self, scope: &str) -> String {
        self.raw
            .class_name_aliases
            .get(scope)
            .cloned()
            .unwrap_or_else(|| scope.to_owned())
    }

    fn compile_rule(
        &mut self,
        raw: &RawRule,
        id: RuleId,
        parent: Option<&Parent>,
    ) -> Result<(), CompileError> {
        let mut begin = raw.begin.clone();
        if let Some(pattern) = &raw.match_ {
            if raw.begin.is_some() || raw.end.is_some() {
                return Err(CompileError::MatchWithBeginOrEnd);
            }
            begin = Some(pattern.clone());
        }

        let mut scope = None;
        let mut begin_scope = raw.begin_scope.clone();
        match &raw.scope {
            Some(RawScope::Name(name)) => scope = Some(self.alias(name)),
            Some(captures @ RawScope::Captures(_)) => begin_scope = Some(captures.clone()),
            None => {}
        }

        let mut flags = RuleFlags {
            exclude_begin: raw.exclude_begin.unwrap_or(false),
            exclude_end: raw.exclude_end.unwrap_or(false),
            return_begin: raw.return_begin.unwrap_or(false),
            return_end: raw.return_end.unwrap_or(false),
            ends_parent: raw.ends_parent.unwrap_or(false),
            ends_with_parent: raw.ends_with_parent.unwrap_or(false),
            skip: raw.skip.unwrap_or(false),
            end_same_as_begin: raw.end_same_as_begin.unwrap_or(false),
            ignore_after_dot: false,
        };
        let mut relevance = raw.relevance;
        let mut keywords = raw.keywords.clone();

        if let Some(words) = &raw.begin_keywords
            && parent.is_some()
        {
            let words = words.split_whitespace().collect::<Vec<_>>().join("|");
            // `(?!\.)` ignores `word.` and the flag ignores `.word`
            begin = Some(RawPattern::Single(format!(r"\b({words})(?!\.)(?=\b|\s)")));
            flags.ignore_after_dot = true;
            keywords = keywords.or_else(|| Some(RawKeywords::Words(words.replace('|', " "))));
            relevance = relevance.or(Some(0));
        }

        let (begin, begin_scope) = self.delimiter(begin, begin_scope, Delimiter::Begin, &flags)?;
        let (end, end_scope) =
            self.delimiter(raw.end.clone(), raw.end_scope.clone(), Delimiter::End, &flags)?;

        let illegal = match &raw.illegal {
            Some(RawPattern::Single(p)) => Some(self.regex(p.as_str())?),
            Some(RawPattern::Sequence(alternatives)) => {
                Some(self.regex(format!("(?:{})", alternatives.join("|")))?)
            }
            None => None,
        };

        let keywords = keywords
            .map(|k| KeywordTable::compile(&k, self.raw.case_insensitive, &self.raw.class_name_aliases))
            .transpose()?;

        let (begin, end, terminator) = match parent {
            None => (None, None, None),
            Some(parent) => {
                let begin = begin.unwrap_or_else(|| BOUNDARY_PATTERN.to_owned());
                let end = end.or_else(|| {
                    (!flags.ends_with_parent).then(|| BOUNDARY_PATTERN.to_owned())
                });
                let mut terminator = end.clone().unwrap_or_default();
                if flags.ends_with_parent
                    && let Some(parent_terminator) = parent.terminator
                {
                    if !terminator.is_empty() {
                        terminator.push('|');
                    }
                    terminator.push_str(parent_terminator);
                }
                (Some(begin), end, (!terminator.is_empty()).then_some(terminator))
            }
        };
        let begin = begin.map(|p| self.regex(p)).transpose()?;
        let end = end.map(|p| self.regex(p)).transpose()?;
        let terminator = terminator.map(|p| self.regex(p)).transpose()?;

        let contains = {
            let this = Parent {
                terminator: terminator.as_ref().map(|t| t.pattern()),
            };
            self.compile_contains(raw.contains.as_deref().unwrap_or_default(), id, &this)?
        };

        let starts = match &raw.starts {
            Some(starts) => {
                let starts_id = self.reserve()?;
                self.compile_rule(starts, starts_id, parent)?;
                Some(starts_id)
            }
            None => None,
        };

        let sub_language = raw.sub_language.as_ref().map(|s| match s {
            RawSubLanguage::Single(name) => SubLanguage::Named(name.clone()),
            RawSubLanguage::Candidates(names) => SubLanguage::Auto(names.clone()),
        });

        self.rules[*id as usize] = Some(Rule {
            id,
            scope,
            begin_scope,
            end_scope,
            begin,
            end,
            terminator,
            illegal,
            keywords,
            contains,
            starts,
            sub_language,
            relevance: relevance.unwrap_or(1),
            flags,
            candidates: Vec::new(),
        });
        Ok(())
    }

    /// Resolves a begin or end pattern with its scope.
    /// Arrays are joined in a single pattern and their scope map is converted to group indices.
    fn delimiter(
        &self,
        pattern: Option<RawPattern>,
        scope: Option<RawScope>,
        delimiter: Delimiter,
        flags: &RuleFlags,
    ) -> Result<(Option<String>, Option<ScopeEmit>), CompileError> {
        match (pattern, scope) {
            (Some(RawPattern::Sequence(parts)), scope) => {
                let conflicting = match delimiter {
                    Delimiter::Begin => flags.skip || flags.exclude_begin || flags.return_begin,
                    Delimiter::End => flags.skip || flags.exclude_end || flags.return_end,
                };
                if conflicting {
                    return Err(CompileError::InvalidCaptureScopes {
                        reason: "array patterns cannot be used with skip, exclude or return"
                            .to_owned(),
                    });
                }
                let Some(RawScope::Captures(map)) = scope else {
                    return Err(CompileError::InvalidCaptureScopes {
                        reason: "array patterns need a capture scope map".to_owned(),
                    });
                };

                let mut by_element = HashMap::new();
                for (key, scope) in &map {
                    match key.parse::<usize>() {
                        Ok(n) if n >= 1 && n <= parts.len() => {
                            by_element.insert(n, self.alias(scope));
                        }
                        _ => {
                            return Err(CompileError::InvalidCaptureScopes {
                                reason: format!(
                                    "'{key}' is not an element of a {} elements pattern",
                                    parts.len()
                                ),
                            });
                        }
                    }
                }

                let compiled = parts
                    .iter()
                    .map(|p| self.regex(p.as_str()))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut groups = Vec::with_capacity(parts.len());
                let mut group = 0;
                for (i, part) in compiled.iter().enumerate() {
                    group += 1;
                    groups.push((group, by_element.remove(&(i + 1))));
                    group += part.captures_len();
                }
                let joined = join_in_groups(
                    compiled.iter().map(|r| (r.pattern(), r.captures_len())),
                    "",
                );
                Ok((Some(joined), Some(ScopeEmit::Groups(groups))))
            }
            (pattern, Some(RawScope::Captures(_))) => Err(CompileError::InvalidCaptureScopes {
                reason: format!(
                    "a capture scope map needs an array pattern, got {:?}",
                    pattern
                ),
            }),
            (Some(RawPattern::Single(pattern)), Some(RawScope::Name(name))) => {
                Ok((Some(pattern), Some(ScopeEmit::Whole(self.alias(&name)))))
            }
            (None, Some(RawScope::Name(name))) => {
                Ok((None, Some(ScopeEmit::Whole(self.alias(&name)))))
            }
            (Some(RawPattern::Single(pattern)), None) => Ok((Some(pattern), None)),
            (None, None) => Ok((None, None)),
        }
    }

    fn compile_contains(
        &mut self,
        contains: &[RawRuleRef],
        owner: RuleId,
        parent: &Parent,
    ) -> Result<Vec<RuleId>, CompileError> {
        let mut out = Vec::with_capacity(contains.len());

        for entry in contains {
            match entry {
                RawRuleRef::Named(name) if name == SELF_REFERENCE => out.push(owner),
                RawRuleRef::Named(name) => out.extend(self.compile_shared(name, parent)?),
                RawRuleRef::Rule(raw) => {
                    for variant in raw.expand_variants() {
                        let id = self.reserve()?;
                        self.compile_rule(&variant, id, Some(parent))?;
                        out.push(id);
                    }
                }
            }
        }

        Ok(out)
    }

    fn compile_shared(&mut self, name: &str, parent: &Parent) -> Result<Vec<RuleId>, CompileError> {
        let raw = self.raw;
        let rule = raw
            .repository
            .get(name)
            .ok_or_else(|| CompileError::UnknownReference {
                name: name.to_owned(),
            })?;
        let variants = rule.expand_variants();
        let dependent = variants.iter().any(|v| v.depends_on_parent());

        if !dependent && let Some(ids) = self.shared.get(name) {
            return Ok(ids.clone());
        }

        let ids = variants
            .iter()
            .map(|_| self.reserve())
            .collect::<Result<Vec<_>, _>>()?;

        if dependent {
            if !self.dependent_chain.insert(name.to_owned()) {
                return Err(CompileError::RecursiveReference {
                    name: name.to_owned(),
                });
            }
            for (variant, id) in variants.iter().zip(&ids) {
                self.compile_rule(variant, *id, Some(parent))?;
            }
            self.dependent_chain.remove(name);
        } else {
            self.shared.insert(name.to_owned(), ids.clone());
            // Anything below a shared rule starts a new chain
            let chain = std::mem::take(&mut self.dependent_chain);
            for (variant, id) in variants.iter().zip(&ids) {
                self.compile_rule(variant, *id, Some(parent))?;
            }
            self.dependent_chain = chain;
        }

        Ok(ids)
    }
}

/// Errors that can occur during grammar compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    InvalidRegex { pattern: String, message: String },
    /// `match` is a shorthand for `begin` without `end`
    MatchWithBeginOrEnd,
    /// `self` can't be used in the root rule
    SelfAtTopLevel,
    UnknownReference { name: String },
    /// A repository rule ending with its parent includes itself without a shared rule in between
    RecursiveReference { name: String },
    InvalidCaptureScopes { reason: String },
    InvalidKeywordRelevance { keyword: String },
    TooManyRules,
    UnfinishedRule,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::InvalidRegex { pattern, message } => {
                write!(f, "Invalid regex pattern '{}': {}", pattern, message)
            }
            CompileError::MatchWithBeginOrEnd => {
                write!(f, "`match` cannot be used with `begin` or `end`")
            }
            CompileError::SelfAtTopLevel => {
                write!(f, "`self` is not supported in the top-level `contains`")
            }
            CompileError::UnknownReference { name } => {
                write!(f, "Unknown repository rule '{}'", name)
            }
            CompileError::RecursiveReference { name } => {
                write!(f, "Repository rule '{}' includes itself endlessly", name)
            }
            CompileError::InvalidCaptureScopes { reason } => {
                write!(f, "Invalid capture scopes: {}", reason)
            }
            CompileError::InvalidKeywordRelevance { keyword } => {
                write!(f, "Invalid relevance in keyword '{}'", keyword)
            }
            CompileError::TooManyRules => write!(f, "Too many rules in grammar"),
            CompileError::UnfinishedRule => write!(f, "A rule was reserved but never compiled"),
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(root: RawRule) -> Result<CompiledGrammar, CompileError> {
        RawGrammar::new("test", root).compile()
    }

    fn first_child(grammar: &CompiledGrammar) -> &Rule {
        grammar.rule(grammar.root().contains[0])
    }

    #[test]
    fn fills_defaults() {
        let grammar = compile(RawRule::default().contains(vec![
            RawRule::default().scope("number").match_(r"\d+").into(),
        ]))
        .unwrap();

        let root = grammar.root();
        assert!(root.begin.is_none());
        assert!(root.terminator.is_none());
        assert_eq!(root.candidates.len(), 1);

        let number = first_child(&grammar);
        assert_eq!(number.scope.as_deref(), Some("number"));
        assert_eq!(number.begin.as_ref().unwrap().pattern(), r"\d+");
        assert_eq!(number.end.as_ref().unwrap().pattern(), BOUNDARY_PATTERN);
        assert_eq!(number.terminator.as_ref().unwrap().pattern(), BOUNDARY_PATTERN);
        assert_eq!(number.relevance, 1);
    }

    #[test]
    fn compiles_begin_keywords() {
        let grammar = compile(
            RawRule::default()
                .begin_keywords("RUN CMD")
                .contains(vec![RawRule::default().begin_keywords("RUN CMD").into()]),
        )
        .unwrap();

        // ignored at the root
        assert!(grammar.root().begin.is_none());

        let rule = first_child(&grammar);
        assert_eq!(
            rule.begin.as_ref().unwrap().pattern(),
            r"\b(RUN|CMD)(?!\.)(?=\b|\s)"
        );
        assert!(rule.flags.ignore_after_dot);
        assert_eq!(rule.relevance, 0);
        assert_eq!(rule.keywords.as_ref().unwrap().get("CMD").unwrap().relevance, 1);
    }

    #[test]
    fn ends_with_parent_extends_terminator() {
        let grammar = compile(RawRule::default().contains(vec![
            RawRule::default()
                .begin("<")
                .end(">")
                .contains(vec![
                    RawRule::default().begin("=").ends_with_parent(true).into(),
                    RawRule::default()
                        .begin("\"")
                        .end("\"")
                        .ends_with_parent(true)
                        .into(),
                ])
                .into(),
        ]))
        .unwrap();

        let tag = first_child(&grammar);
        let value = grammar.rule(tag.contains[0]);
        assert!(value.end.is_none());
        assert_eq!(value.terminator.as_ref().unwrap().pattern(), ">");
        let string = grammar.rule(tag.contains[1]);
        assert_eq!(string.terminator.as_ref().unwrap().pattern(), "\"|>");
    }

    #[test]
    fn converts_capture_scope_maps() {
        let grammar = compile(RawRule::default().contains(vec![
            RawRule::default()
                .match_([r"(^|\s)", "#.*$"])
                .scope([(2, "comment")])
                .into(),
        ]))
        .unwrap();

        let comment = first_child(&grammar);
        assert!(comment.scope.is_none());
        assert_eq!(comment.begin.as_ref().unwrap().pattern(), r"((^|\s))(#.*$)");
        assert_eq!(
            comment.begin_scope,
            Some(ScopeEmit::Groups(vec![(1, None), (3, Some("comment".into()))]))
        );
    }

    #[test]
    fn rejects_invalid_definitions() {
        let cases = vec![
            (
                RawRule::default().contains(vec![RawRule::default().match_("a").end("b").into()]),
                CompileError::MatchWithBeginOrEnd,
            ),
            (
                RawRule::default().contains(vec![RawRuleRef::self_ref()]),
                CompileError::SelfAtTopLevel,
            ),
            (
                RawRule::default().contains(vec![RawRuleRef::named("nope")]),
                CompileError::UnknownReference {
                    name: "nope".into(),
                },
            ),
            (
                RawRule::default().contains(vec![RawRule::default().begin("(a").into()]),
                CompileError::InvalidRegex {
                    pattern: "(a".into(),
                    message: String::new(),
                },
            ),
            (
                RawRule::default().contains(vec![
                    RawRule::default().begin("a").scope([(1, "x")]).into(),
                ]),
                CompileError::InvalidCaptureScopes {
                    reason: String::new(),
                },
            ),
            (
                RawRule::default().contains(vec![
                    RawRule::default()
                        .begin(["a", "b"])
                        .scope([(1, "x")])
                        .exclude_begin(true)
                        .into(),
                ]),
                CompileError::InvalidCaptureScopes {
                    reason: String::new(),
                },
            ),
            (
                RawRule::default().contains(vec![RawRule::default().begin(["a", "b"]).into()]),
                CompileError::InvalidCaptureScopes {
                    reason: String::new(),
                },
            ),
            (
                RawRule::default().contains(vec![
                    RawRule::default().begin(["a", "b"]).scope([(3, "x")]).into(),
                ]),
                CompileError::InvalidCaptureScopes {
                    reason: String::new(),
                },
            ),
        ];

        for (root, expected) in cases {
            let err = compile(root).unwrap_err();
            assert_eq!(
                std::mem::discriminant(&err),
                std::mem::discriminant(&expected),
                "{err}"
            );
        }
    }

    #[test]
    fn shares_repository_rules() {
        let raw = RawGrammar::new(
            "test",
            RawRule::default().contains(vec![
                RawRuleRef::named("string"),
                RawRule::default()
                    .begin(r"\(")
                    .end(r"\)")
                    .contains(vec![RawRuleRef::named("string")])
                    .into(),
            ]),
        )
        .repository_rule(
            "string",
            RawRule::default()
                .scope("string")
                .begin("\"")
                .end("\"")
                .contains(vec![RawRuleRef::named("subst")]),
        )
        .repository_rule(
            "subst",
            RawRule::default()
                .begin(r"\$\(")
                .end(r"\)")
                .contains(vec![RawRuleRef::named("string"), RawRuleRef::self_ref()]),
        );
        let grammar = raw.compile().unwrap();

        let root = grammar.root();
        let string_id = root.contains[0];
        let parens = grammar.rule(root.contains[1]);
        assert_eq!(parens.contains, vec![string_id]);

        let subst = grammar.rule(grammar.rule(string_id).contains[0]);
        assert_eq!(subst.contains, vec![string_id, subst.id]);
        assert_eq!(grammar.rules_len(), 4);
    }

    #[test]
    fn rule_lookup_is_checked() {
        let grammar =
            compile(RawRule::default().contains(vec![RawRule::default().begin("a").into()]))
                .unwrap();
        assert_eq!(grammar.rules_len(), 2);
        assert!(grammar.get_rule(ROOT_RULE_ID).is_some());
        assert!(grammar.get_rule(RuleId(1)).is_some());
        assert!(grammar.get_rule(RuleId(2)).is_none());
    }

    #[test]
    fn parent_dependent_rules_are_compiled_per_parent() {
        let raw = RawGrammar::new(
            "test",
            RawRule::default().contains(vec![
                RawRule::default()
                    .begin("<")
                    .end(">")
                    .contains(vec![RawRuleRef::named("attr")])
                    .into(),
                RawRule::default()
                    .begin(r"\[")
                    .end(r"\]")
                    .contains(vec![RawRuleRef::named("attr")])
                    .into(),
            ]),
        )
        .repository_rule("attr", RawRule::default().begin("=").ends_with_parent(true));
        let grammar = raw.compile().unwrap();

        let root = grammar.root();
        let first = grammar.rule(grammar.rule(root.contains[0]).contains[0]);
        let second = grammar.rule(grammar.rule(root.contains[1]).contains[0]);
        assert_ne!(first.id, second.id);
        assert_eq!(first.terminator.as_ref().unwrap().pattern(), ">");
        assert_eq!(second.terminator.as_ref().unwrap().pattern(), r"\]");

        let looping = RawGrammar::new(
            "test",
            RawRule::default().contains(vec![RawRuleRef::named("loop")]),
        )
        .repository_rule(
            "loop",
            RawRule::default()
                .begin("a")
                .ends_with_parent(true)
                .contains(vec![RawRuleRef::named("loop")]),
        );
        assert_eq!(
            looping.compile().unwrap_err(),
            CompileError::RecursiveReference {
                name: "loop".into()
            }
        );
    }

    #[test]
    fn expands_variants_and_starts() {
        let grammar = compile(RawRule::default().contains(vec![
            RawRule::default()
                .scope("string")
                .variants(vec![
                    RawRule::default().begin("'").end("'"),
                    RawRule::default().begin("\"").end("\""),
                ])
                .into(),
            RawRule::default()
                .begin_keywords("RUN")
                .starts(RawRule::default().end("$").sub_language("bash"))
                .into(),
        ]))
        .unwrap();

        let root = grammar.root();
        assert_eq!(root.contains.len(), 3);
        assert_eq!(grammar.rule(root.contains[1]).scope.as_deref(), Some("string"));

        let run = grammar.rule(root.contains[2]);
        let starts = grammar.rule(run.starts.unwrap());
        assert_eq!(starts.sub_language, Some(SubLanguage::Named("bash".into())));
        assert_eq!(starts.terminator.as_ref().unwrap().pattern(), "$");
    }

    #[test]
    fn orders_candidates_and_caches_matchers() {
        let grammar = compile(
            RawRule::default().illegal(["</", "<!"]).contains(vec![
                RawRule::default().begin("a").into(),
                RawRule::default().begin("b").into(),
            ]),
        )
        .unwrap();

        let root = grammar.root();
        let kinds: Vec<_> = root.candidates.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MatchKind::Begin(root.contains[0]),
                MatchKind::Begin(root.contains[1]),
                MatchKind::Illegal,
            ]
        );
        assert_eq!(root.illegal.as_ref().unwrap().pattern(), "(?:</|<!)");

        let matcher = grammar.matcher(ROOT_RULE_ID, 0).unwrap();
        assert!(Arc::ptr_eq(&matcher, &grammar.matcher(ROOT_RULE_ID, 0).unwrap()));
        assert_eq!(matcher.len(), 3);
        assert_eq!(grammar.matcher(ROOT_RULE_ID, 1).unwrap().len(), 2);
        assert!(grammar.matcher(ROOT_RULE_ID, 10).unwrap().is_empty());
    }

    #[test]
    fn applies_class_name_aliases() {
        let raw = RawGrammar::new(
            "test",
            RawRule::default().contains(vec![
                RawRule::default().scope("str").begin("'").end("'").into(),
            ]),
        )
        .class_name_alias("str", "string");
        let grammar = raw.compile().unwrap();
        assert_eq!(first_child(&grammar).scope.as_deref(), Some("string"));
    }
}
