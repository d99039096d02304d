use std::collections::HashMap;
use std::ops::Range;

use super::compiled::CompileError;
use super::raw::RawKeywords;
use super::regex::{Regex, next_char_boundary};

/// What makes a word when no `$pattern` is given
pub const DEFAULT_KEYWORD_PATTERN: &str = r"\w+";
/// Category of keywords given as a plain string or list
pub const DEFAULT_KEYWORD_CATEGORY: &str = "keyword";
const PATTERN_KEY: &str = "$pattern";

/// Words so common in prose and code that they say nothing about the language
const COMMON_KEYWORDS: [&str; 11] = [
    "of", "and", "for", "in", "not", "or", "if", "then", "parent", "list", "value",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// Scope to emit, after class name aliasing
    pub scope: String,
    pub relevance: u32,
    /// Categories starting with `_` only count for relevance, their words are emitted as text
    pub hidden: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum KeywordSpan<'a> {
    Plain(Range<usize>),
    Keyword {
        range: Range<usize>,
        /// The word as stored in the table, case-folded for case-insensitive grammars
        word: String,
        keyword: &'a Keyword,
    },
}

#[derive(Debug)]
pub struct KeywordTable {
    words: HashMap<String, Keyword>,
    pattern: Regex,
    case_insensitive: bool,
}

impl KeywordTable {
    pub(crate) fn compile(
        raw: &RawKeywords,
        case_insensitive: bool,
        class_name_aliases: &HashMap<String, String>,
    ) -> Result<Self, CompileError> {
        let mut builder = TableBuilder {
            words: HashMap::new(),
            case_insensitive,
            class_name_aliases,
        };
        let mut pattern = None;

        match raw {
            RawKeywords::Categories(categories) => {
                for (category, entry) in categories {
                    if category == PATTERN_KEY {
                        if let RawKeywords::Words(p) = entry {
                            pattern = Some(p.as_str());
                        }
                        continue;
                    }
                    builder.add_category(category, entry)?;
                }
            }
            other => builder.add_category(DEFAULT_KEYWORD_CATEGORY, other)?,
        }

        let pattern = pattern.unwrap_or(DEFAULT_KEYWORD_PATTERN);
        let pattern = Regex::new(pattern, case_insensitive).map_err(|e| {
            CompileError::InvalidRegex {
                pattern: pattern.to_owned(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            words: builder.words,
            pattern,
            case_insensitive,
        })
    }

    pub fn get(&self, word: &str) -> Option<&Keyword> {
        if self.case_insensitive {
            self.words.get(&word.to_lowercase())
        } else {
            self.words.get(word)
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Splits `text` into keyword and plain spans, in order and covering all of it.
    pub fn classify(&self, text: &str) -> Vec<KeywordSpan<'_>> {
        let mut spans = Vec::new();
        let mut last = 0;
        let mut pos = 0;

        while let Some(region) = self.pattern.search_from(text, pos) {
            let Some((start, end)) = region.pos(0) else {
                break;
            };
            let word = if self.case_insensitive {
                text[start..end].to_lowercase()
            } else {
                text[start..end].to_owned()
            };

            if let Some(keyword) = self.words.get(&word) {
                if start > last {
                    spans.push(KeywordSpan::Plain(last..start));
                }
                spans.push(KeywordSpan::Keyword {
                    range: start..end,
                    word,
                    keyword,
                });
                last = end;
            }

            pos = if end > start {
                end
            } else {
                next_char_boundary(text, end)
            };
        }

        if last < text.len() {
            spans.push(KeywordSpan::Plain(last..text.len()));
        }
        spans
    }
}

struct TableBuilder<'a> {
    words: HashMap<String, Keyword>,
    case_insensitive: bool,
    class_name_aliases: &'a HashMap<String, String>,
}

impl TableBuilder<'_> {
    fn add_category(&mut self, category: &str, entry: &RawKeywords) -> Result<(), CompileError> {
        match entry {
            RawKeywords::Words(words) => {
                for word in words.split_whitespace() {
                    self.add_word(category, word)?;
                }
            }
            RawKeywords::List(words) => {
                for word in words {
                    self.add_word(category, word)?;
                }
            }
            RawKeywords::Categories(inner) => {
                for (inner_category, inner_entry) in inner {
                    if inner_category != PATTERN_KEY {
                        self.add_category(inner_category, inner_entry)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn add_word(&mut self, category: &str, raw_word: &str) -> Result<(), CompileError> {
        let raw_word = if self.case_insensitive {
            raw_word.to_lowercase()
        } else {
            raw_word.to_owned()
        };

        let (word, relevance) = match raw_word.split_once('|') {
            Some((word, relevance)) => {
                let relevance = relevance.parse::<u32>().map_err(|_| {
                    CompileError::InvalidKeywordRelevance {
                        keyword: raw_word.clone(),
                    }
                })?;
                (word, relevance)
            }
            None if COMMON_KEYWORDS.contains(&raw_word.to_lowercase().as_str()) => {
                (raw_word.as_str(), 0)
            }
            None => (raw_word.as_str(), 1),
        };

        let scope = self
            .class_name_aliases
            .get(category)
            .cloned()
            .unwrap_or_else(|| category.to_owned());
        self.words.insert(
            word.to_owned(),
            Keyword {
                scope,
                relevance,
                hidden: category.starts_with('_'),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(raw: RawKeywords, case_insensitive: bool) -> KeywordTable {
        KeywordTable::compile(&raw, case_insensitive, &HashMap::new()).unwrap()
    }

    #[test]
    fn computes_relevance_per_word() {
        let table = compile(
            RawKeywords::categories([("keyword", "let|5 for fn"), ("literal", "true|0 value")]),
            false,
        );
        assert_eq!(table.len(), 5);
        assert_eq!(table.get("let").unwrap().relevance, 5);
        assert_eq!(table.get("for").unwrap().relevance, 0);
        assert_eq!(table.get("fn").unwrap().relevance, 1);
        assert_eq!(table.get("true").unwrap().relevance, 0);
        assert_eq!(table.get("value").unwrap().scope, "literal");
        assert!(table.get("Let").is_none());
    }

    #[test]
    fn plain_words_are_keywords() {
        let table = compile("FROM ENV".into(), false);
        assert_eq!(table.get("FROM").unwrap().scope, DEFAULT_KEYWORD_CATEGORY);
        let table = compile(RawKeywords::List(vec!["a".into(), "b".into()]), false);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn case_insensitive_tables_fold_words() {
        let table = compile("SELECT From|3".into(), true);
        assert_eq!(table.get("select").unwrap().relevance, 1);
        assert_eq!(table.get("FROM").unwrap().relevance, 3);

        let spans = table.classify("Select x");
        assert_eq!(
            spans,
            vec![
                KeywordSpan::Keyword {
                    range: 0..6,
                    word: "select".into(),
                    keyword: table.get("select").unwrap(),
                },
                KeywordSpan::Plain(6..8),
            ]
        );
    }

    #[test]
    fn applies_class_name_aliases_and_hidden_categories() {
        let aliases = HashMap::from([("kw".to_string(), "keyword".to_string())]);
        let raw = RawKeywords::categories([("kw", "if"), ("_relevance_only", "magic|10")]);
        let table = KeywordTable::compile(&raw, false, &aliases).unwrap();
        assert_eq!(table.get("if").unwrap().scope, "keyword");
        let magic = table.get("magic").unwrap();
        assert!(magic.hidden);
        assert_eq!(magic.relevance, 10);
    }

    #[test]
    fn uses_custom_word_pattern() {
        let raw = RawKeywords::categories([("$pattern", r"[a-z][a-z.-]+"), ("built_in", "set-x")]);
        let table = compile(raw, false);
        assert_eq!(table.len(), 1);
        let spans = table.classify("a set-x b");
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0], KeywordSpan::Plain(0..2));
        assert!(matches!(&spans[1], KeywordSpan::Keyword { range, .. } if *range == (2..7)));
        assert_eq!(spans[2], KeywordSpan::Plain(7..9));
    }

    #[test]
    fn classify_covers_the_whole_text() {
        let table = compile("if else".into(), false);
        let text = "if x else elsewhere if";
        let spans = table.classify(text);
        let mut rebuilt = String::new();
        let mut keywords = 0;
        for span in &spans {
            match span {
                KeywordSpan::Plain(range) => rebuilt.push_str(&text[range.clone()]),
                KeywordSpan::Keyword { range, .. } => {
                    keywords += 1;
                    rebuilt.push_str(&text[range.clone()]);
                }
            }
        }
        assert_eq!(rebuilt, text);
        assert_eq!(keywords, 3);
        assert!(table.classify("").is_empty());
    }

    #[test]
    fn rejects_bad_relevance() {
        let result = KeywordTable::compile(&"if|high".into(), false, &HashMap::new());
        assert!(matches!(
            result,
            Err(CompileError::InvalidKeywordRelevance { keyword }) if keyword == "if|high"
        ));
    }
}
