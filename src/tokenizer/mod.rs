//! The mode-stack interpreter: walks the text with the matcher of the current mode, opening and
//! closing modes as their begin and end patterns match.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Registry;
use crate::error::{AmbraResult, Error};
use crate::grammars::{
    CompiledGrammar, KeywordSpan, MatchKind, PatternSet, PatternSetMatch, Rule, RuleId,
    ScopeEmit, next_char_boundary,
};
use crate::tokenizer::stack::ModeStack;
use crate::tree::{Tree, TreeBuilder};

mod embed;
mod stack;

/// A keyword only counts for relevance that many times per scan
const MAX_KEYWORD_HITS: u32 = 7;

/// What a scan produced
#[derive(Debug)]
pub struct ScanResult {
    /// The grammar used, `None` for the plain text fallback of auto-detection
    pub language: Option<String>,
    pub tree: Tree,
    pub relevance: u32,
    /// Only set on lenient results, like the candidates of auto-detection
    pub error: Option<Error>,
    /// Modes still open at the end of the text
    pub(crate) top: ModeStack,
}

impl ScanResult {
    pub(crate) fn plain(text: &str, language: Option<String>, error: Option<Error>) -> Self {
        Self {
            language,
            tree: Tree::plain(text),
            relevance: 0,
            error,
            top: ModeStack::default(),
        }
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    /// Whether the scan was stopped by an `illegal` pattern
    pub fn is_illegal(&self) -> bool {
        self.error.as_ref().is_some_and(Error::is_illegal)
    }
}

#[derive(Debug, Clone, Copy)]
struct LastMatch {
    begin: bool,
    start: usize,
}

/// One scan of a text with a grammar.
pub(crate) struct Scanner<'r, 't> {
    registry: &'r Registry,
    grammar: Arc<CompiledGrammar>,
    text: &'t str,
    ignore_illegals: bool,
    /// How deep in sublanguages this scan is, 0 for the outermost one
    depth: usize,
    stack: ModeStack,
    tree: TreeBuilder,
    /// Text seen but not emitted yet
    buffer: String,
    relevance: u32,
    keyword_hits: HashMap<String, u32>,
    /// Final mode stack of the previous embedding of each sublanguage
    continuations: HashMap<String, ModeStack>,
    last_match: Option<LastMatch>,
    /// First candidate to try in the matcher of the current mode
    candidate_index: usize,
    resume: bool,
    iterations: usize,
}

impl<'r, 't> Scanner<'r, 't> {
    pub fn new(
        registry: &'r Registry,
        grammar: Arc<CompiledGrammar>,
        text: &'t str,
        ignore_illegals: bool,
        depth: usize,
    ) -> Self {
        Self {
            registry,
            grammar,
            text,
            ignore_illegals,
            depth,
            stack: ModeStack::default(),
            tree: TreeBuilder::default(),
            buffer: String::new(),
            relevance: 0,
            keyword_hits: HashMap::new(),
            continuations: HashMap::new(),
            last_match: None,
            candidate_index: 0,
            resume: false,
            iterations: 0,
        }
    }

    /// Scans the whole text, starting from `continuation` if given.
    pub fn run(mut self, continuation: Option<&ModeStack>) -> AmbraResult<ScanResult> {
        let registry = self.registry;
        let config = registry.config();
        if self.depth > config.max_depth {
            return Err(Error::RecursionLimit {
                language: self.grammar.name.clone(),
                depth: config.max_depth,
            });
        }

        if let Some(stack) = continuation {
            let grammar = Arc::clone(&self.grammar);
            for mode in stack.nested() {
                if let Some(scope) = &grammar.rule(mode.rule).scope {
                    self.tree.open_scope(scope);
                }
            }
            self.stack = stack.clone();
        }

        #[cfg(feature = "debug")]
        log::debug!(
            "Scanning {} bytes with {} (depth {})",
            self.text.len(),
            self.grammar.name,
            self.depth
        );

        let text = self.text;
        let mut index = 0;
        loop {
            self.iterations += 1;
            if self.iterations > config.max_iterations && self.iterations > index * 3 {
                return Err(Error::NoProgress {
                    language: self.grammar.name.clone(),
                    iterations: self.iterations,
                    offset: index,
                });
            }

            if self.resume {
                self.resume = false;
            } else {
                self.candidate_index = 0;
            }

            let Some(m) = self.exec(index)? else {
                break;
            };
            #[cfg(feature = "debug")]
            log::trace!(
                "[{}..{}] {:?} in rule {}",
                m.start,
                m.end,
                m.kind,
                self.stack.top().rule.0
            );

            let processed = self.process_lexeme(&text[index..m.start], &m)?;
            index = m.start + processed;
            if index > text.len() {
                break;
            }
        }

        self.buffer.push_str(&text[index.min(text.len())..]);
        self.process_buffer()?;

        Ok(ScanResult {
            language: Some(self.grammar.name.clone()),
            tree: self.tree.finish(),
            relevance: self.relevance,
            error: None,
            top: self.stack,
        })
    }

    fn matcher(&self, rule: RuleId, start: usize) -> AmbraResult<Arc<PatternSet>> {
        self.grammar
            .matcher(rule, start)
            .map_err(Error::TokenizeRegex)
    }

    /// Next match of the current mode at or after `index`.
    ///
    /// When resuming after an ignored begin, only the following candidates are tried at the
    /// same offset before falling back to every candidate one character later.
    fn exec(&mut self, index: usize) -> AmbraResult<Option<PatternSetMatch>> {
        let rule = self.stack.top().rule;
        let mut found = self
            .matcher(rule, self.candidate_index)?
            .find_at(self.text, index);

        if self.candidate_index > 0 && !found.as_ref().is_some_and(|m| m.start == index) {
            found = self
                .matcher(rule, 0)?
                .find_at(self.text, next_char_boundary(self.text, index));
        }

        if let Some(m) = &found {
            self.candidate_index = m.position + 1;
            if self.candidate_index >= self.grammar.rule(rule).candidates.len() {
                self.candidate_index = 0;
            }
        }
        Ok(found)
    }

    /// Appends the character at `start` to the buffer, returning how many bytes to skip.
    /// Always moves forward, even at the end of the text.
    fn consume_one_char(&mut self, start: usize) -> usize {
        let text = self.text;
        let next = next_char_boundary(text, start).min(text.len());
        if start < next {
            self.buffer.push_str(&text[start..next]);
        }
        (next.saturating_sub(start)).max(1)
    }

    /// Handles a match and returns how many bytes of it were consumed.
    fn process_lexeme(&mut self, before: &str, m: &PatternSetMatch) -> AmbraResult<usize> {
        let text = self.text;
        let lexeme = &text[m.start..m.end];
        self.buffer.push_str(before);

        if let Some(last) = self.last_match
            && last.begin
            && m.kind == MatchKind::End
            && last.start == m.start
            && lexeme.is_empty()
        {
            let consumed = self.consume_one_char(m.start);
            if !self.registry.config().safe_mode {
                return Err(Error::ZeroWidthLoop {
                    language: self.grammar.name.clone(),
                    offset: m.start,
                });
            }
            return Ok(consumed);
        }

        self.last_match = Some(LastMatch {
            begin: matches!(m.kind, MatchKind::Begin(_)),
            start: m.start,
        });

        match m.kind {
            MatchKind::Begin(rule) => return self.do_begin(rule, m),
            MatchKind::Illegal if !self.ignore_illegals => {
                let grammar = Arc::clone(&self.grammar);
                let mode = grammar
                    .rule(self.stack.top().rule)
                    .scope
                    .as_deref()
                    .unwrap_or("<unnamed>");
                return Err(Error::IllegalLexeme {
                    language: grammar.name.clone(),
                    lexeme: lexeme.to_owned(),
                    offset: m.start,
                    mode: mode.to_owned(),
                });
            }
            MatchKind::End => {
                if let Some(consumed) = self.do_end(m)? {
                    return Ok(consumed);
                }
            }
            MatchKind::Illegal => {
                if lexeme.is_empty() {
                    return Ok(self.consume_one_char(m.start));
                }
            }
        }

        self.buffer.push_str(lexeme);
        Ok(lexeme.len())
    }

    fn do_begin(&mut self, rule_id: RuleId, m: &PatternSetMatch) -> AmbraResult<usize> {
        let text = self.text;
        let grammar = Arc::clone(&self.grammar);
        let rule = grammar.rule(rule_id);
        let lexeme = &text[m.start..m.end];

        if rule.flags.ignore_after_dot && text[..m.start].ends_with('.') {
            if self.candidate_index == 0 {
                return Ok(self.consume_one_char(m.start));
            }
            self.resume = true;
            return Ok(0);
        }

        if rule.flags.skip {
            self.buffer.push_str(lexeme);
        } else {
            if rule.flags.exclude_begin {
                self.buffer.push_str(lexeme);
            }
            self.process_buffer()?;
            if !rule.flags.return_begin && !rule.flags.exclude_begin {
                self.buffer.push_str(lexeme);
            }
        }

        self.start_mode(rule, m)?;
        Ok(if rule.flags.return_begin {
            0
        } else {
            lexeme.len()
        })
    }

    fn start_mode(&mut self, rule: &Rule, m: &PatternSetMatch) -> AmbraResult<()> {
        let max_nesting = self.registry.config().max_nesting;
        if self.stack.len() >= max_nesting {
            return Err(Error::NestingLimit {
                language: self.grammar.name.clone(),
                depth: max_nesting,
                offset: m.start,
            });
        }

        let captures = &m.captures;
        if let Some(scope) = &rule.scope {
            self.tree.open_scope(scope);
        }

        match &rule.begin_scope {
            Some(ScopeEmit::Whole(scope)) => {
                let buffer = std::mem::take(&mut self.buffer);
                self.tree.add_scoped_text(&buffer, scope);
            }
            Some(ScopeEmit::Groups(groups)) => {
                self.emit_groups(groups, captures);
                self.buffer.clear();
            }
            None => {}
        }

        let begin_capture = if rule.flags.end_same_as_begin {
            self.capture_text(captures, 1).map(str::to_owned)
        } else {
            None
        };
        self.stack.push(rule.id, begin_capture);
        Ok(())
    }

    fn capture_text(&self, captures: &[Option<(usize, usize)>], group: usize) -> Option<&'t str> {
        let text: &'t str = self.text;
        let (start, end) = (*captures.get(group)?)?;
        text.get(start..end)
    }

    /// One node per group: scoped groups become keyword leaves and the others are classified
    /// with the keywords of the current mode.
    fn emit_groups(
        &mut self,
        groups: &[(usize, Option<String>)],
        captures: &[Option<(usize, usize)>],
    ) {
        for (group, scope) in groups {
            let Some(piece) = self.capture_text(captures, *group) else {
                continue;
            };
            match scope {
                Some(scope) => self.tree.add_scoped_text(piece, scope),
                None => {
                    self.buffer = piece.to_owned();
                    self.process_keywords();
                }
            }
        }
    }

    /// Finds which open mode the end match closes, as its depth in the stack.
    fn end_of_mode(&self, m: &PatternSetMatch) -> Option<usize> {
        let mut depth = self.stack.len() - 1;
        loop {
            let mode = self.stack.get(depth)?;
            let rule = self.grammar.rule(mode.rule);

            let matched = rule
                .end
                .as_ref()
                .and_then(|end| end.match_at(self.text, m.start))
                .is_some_and(|region| {
                    if !rule.flags.end_same_as_begin {
                        return true;
                    }
                    let capture = region.pos(1).and_then(|(s, e)| self.text.get(s..e));
                    capture == mode.begin_capture.as_deref()
                });

            if matched {
                while depth > 0
                    && self
                        .stack
                        .get(depth)
                        .is_some_and(|mode| self.grammar.rule(mode.rule).flags.ends_parent)
                {
                    depth -= 1;
                }
                return Some(depth);
            }

            if rule.flags.ends_with_parent && depth > 0 {
                depth -= 1;
            } else {
                return None;
            }
        }
    }

    /// Closes modes for an end match. Returns `None` if no open mode accepts it.
    fn do_end(&mut self, m: &PatternSetMatch) -> AmbraResult<Option<usize>> {
        let Some(end_depth) = self.end_of_mode(m) else {
            return Ok(None);
        };
        let text = self.text;
        let grammar = Arc::clone(&self.grammar);
        let origin = grammar.rule(self.stack.top().rule);
        let lexeme = &text[m.start..m.end];
        let ended = self.stack.get(end_depth).map(|mode| mode.rule);

        match &origin.end_scope {
            Some(ScopeEmit::Whole(scope)) => {
                self.process_buffer()?;
                self.tree.add_scoped_text(lexeme, scope);
            }
            Some(ScopeEmit::Groups(groups)) => {
                self.process_buffer()?;
                // The terminator may include parents ends: the own end gives the right groups
                let captures = origin
                    .end
                    .as_ref()
                    .and_then(|end| end.match_at(text, m.start))
                    .map(|region| (0..region.len()).map(|i| region.pos(i)).collect::<Vec<_>>())
                    .unwrap_or_else(|| m.captures.clone());
                self.emit_groups(groups, &captures);
                self.buffer.clear();
            }
            None if origin.flags.skip => self.buffer.push_str(lexeme),
            None => {
                if !(origin.flags.return_end || origin.flags.exclude_end) {
                    self.buffer.push_str(lexeme);
                }
                self.process_buffer()?;
                if origin.flags.exclude_end {
                    self.buffer.push_str(lexeme);
                }
            }
        }

        while self.stack.len() > end_depth.max(1) {
            let Some(mode) = self.stack.pop() else {
                break;
            };
            let rule = grammar.rule(mode.rule);
            if rule.scope.is_some() {
                self.tree.close_scope();
            }
            if !rule.flags.skip && rule.sub_language.is_none() {
                self.relevance = self.relevance.saturating_add(rule.relevance);
            }
        }

        if let Some(starts) = ended.and_then(|id| grammar.rule(id).starts) {
            self.start_mode(grammar.rule(starts), m)?;
        }

        Ok(Some(if origin.flags.return_end {
            0
        } else {
            lexeme.len()
        }))
    }

    /// Emits the buffer with the current mode: through its sublanguage or its keywords.
    fn process_buffer(&mut self) -> AmbraResult<()> {
        let grammar = Arc::clone(&self.grammar);
        let rule = grammar.rule(self.stack.top().rule);
        match &rule.sub_language {
            Some(sub_language) => self.process_sub_language(sub_language, rule.relevance)?,
            None => self.process_keywords(),
        }
        self.buffer.clear();
        Ok(())
    }

    fn process_keywords(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        let grammar = Arc::clone(&self.grammar);
        let Some(keywords) = &grammar.rule(self.stack.top().rule).keywords else {
            self.tree.add_text(&buffer);
            return;
        };

        for span in keywords.classify(&buffer) {
            match span {
                KeywordSpan::Plain(range) => self.tree.add_text(&buffer[range]),
                KeywordSpan::Keyword {
                    range,
                    word,
                    keyword,
                } => {
                    let hits = self.keyword_hits.entry(word).or_insert(0);
                    *hits += 1;
                    if *hits <= MAX_KEYWORD_HITS {
                        self.relevance = self.relevance.saturating_add(keyword.relevance);
                    }
                    if keyword.hidden {
                        self.tree.add_text(&buffer[range]);
                    } else {
                        self.tree.add_scoped_text(&buffer[range], &keyword.scope);
                    }
                }
            }
        }
    }
}
