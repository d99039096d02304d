use std::fmt::{Debug, Formatter};

use crate::grammars::compiled::RuleId;
use crate::grammars::regex::{Regex, join_in_groups};

/// What a candidate of a rule matcher stands for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// The begin pattern of a child rule
    Begin(RuleId),
    /// The terminator of the rule, possibly including its parents' ones
    End,
    /// The illegal pattern of the rule
    Illegal,
}

/// A single pattern of a rule matcher, as prepared by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: MatchKind,
    pub pattern: String,
    /// Capture groups of the pattern on its own
    pub captures_len: usize,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PatternSetMatch {
    pub kind: MatchKind,
    /// Index of the candidate in the full candidate list of the rule
    pub position: usize,
    pub start: usize,
    pub end: usize,
    /// Capture positions relative to the candidate: index 0 is the whole match and index N is
    /// the Nth group of the candidate pattern
    pub captures: Vec<Option<(usize, usize)>>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: MatchKind,
    position: usize,
    /// Group wrapping the candidate in the combined regex
    group: usize,
    captures_len: usize,
}

/// All the candidates of a rule, from a given index, compiled in a single alternation so one
/// search finds the leftmost match among them.
/// On a tie, the candidate declared first wins.
pub struct PatternSet {
    entries: Vec<Entry>,
    regex: Option<Regex>,
}

impl PatternSet {
    /// `first_position` is the index of `candidates[0]` in the full list of the rule.
    pub fn new(
        candidates: &[Candidate],
        first_position: usize,
        case_insensitive: bool,
    ) -> Result<Self, String> {
        if candidates.is_empty() {
            return Ok(Self {
                entries: Vec::new(),
                regex: None,
            });
        }

        let mut entries = Vec::with_capacity(candidates.len());
        let mut group = 1;
        for (i, candidate) in candidates.iter().enumerate() {
            entries.push(Entry {
                kind: candidate.kind,
                position: first_position + i,
                group,
                captures_len: candidate.captures_len,
            });
            group += 1 + candidate.captures_len;
        }

        let source = join_in_groups(
            candidates
                .iter()
                .map(|c| (c.pattern.as_str(), c.captures_len)),
            "|",
        );
        let regex = Regex::new(source, case_insensitive).map_err(|e| {
            format!(
                "Failed to compile pattern set with {} patterns: {}",
                candidates.len(),
                e
            )
        })?;

        Ok(Self {
            entries,
            regex: Some(regex),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn find_at(&self, text: &str, pos: usize) -> Option<PatternSetMatch> {
        let regex = self.regex.as_ref()?;
        // The full text is searched so lookbehinds see what's before `pos`
        let region = regex.search_from(text, pos)?;
        let (start, end) = region.pos(0)?;

        // Only one top-level alternative can have participated
        let entry = self
            .entries
            .iter()
            .find(|entry| region.pos(entry.group).is_some())?;

        let captures = (0..=entry.captures_len)
            .map(|i| region.pos(entry.group + i))
            .collect();

        Some(PatternSetMatch {
            kind: entry.kind,
            position: entry.position,
            start,
            end,
            captures,
        })
    }
}

impl Debug for PatternSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PatternSet({} candidates)", self.entries.len())
    }
}
