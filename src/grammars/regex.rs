use std::fmt;

use onig::{Region, RegexOptions, SearchOptions, Syntax};

/// A compiled Oniguruma regex that keeps its source around.
///
/// Grammars are validated when compiled so every `Regex` we hold is known to be valid.
pub struct Regex {
    pattern: String,
    compiled: onig::Regex,
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

pub(crate) fn regex_options(case_insensitive: bool) -> RegexOptions {
    if case_insensitive {
        RegexOptions::REGEX_OPTION_CAPTURE_GROUP | RegexOptions::REGEX_OPTION_IGNORECASE
    } else {
        RegexOptions::REGEX_OPTION_CAPTURE_GROUP
    }
}

impl Regex {
    pub fn new(pattern: impl Into<String>, case_insensitive: bool) -> Result<Self, onig::Error> {
        let pattern = pattern.into();
        let compiled =
            onig::Regex::with_options(&pattern, regex_options(case_insensitive), Syntax::default())?;
        Ok(Self { pattern, compiled })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// How many capture groups the pattern has, not counting the whole match.
    pub fn captures_len(&self) -> usize {
        self.compiled.captures_len()
    }

    /// Tries to match the regex starting exactly at `pos`.
    /// The whole text is given to the engine so lookbehinds and anchors see the context.
    pub fn match_at(&self, text: &str, pos: usize) -> Option<Region> {
        if pos > text.len() {
            return None;
        }
        let mut region = Region::new();
        self.compiled
            .match_with_options(text, pos, SearchOptions::SEARCH_OPTION_NONE, Some(&mut region))
            .map(|_| region)
    }

    /// Finds the leftmost match at or after `pos`.
    pub fn search_from(&self, text: &str, pos: usize) -> Option<Region> {
        if pos > text.len() {
            return None;
        }
        let mut region = Region::new();
        self.compiled
            .search_with_options(
                text,
                pos,
                text.len(),
                SearchOptions::SEARCH_OPTION_NONE,
                Some(&mut region),
            )
            .map(|_| region)
    }
}

/// The offset of the character after the one at `pos`, or `pos + 1` past the end of the text.
pub(crate) fn next_char_boundary(text: &str, pos: usize) -> usize {
    text.get(pos..)
        .and_then(|rest| rest.chars().next())
        .map_or(pos + 1, |c| pos + c.len_utf8())
}

/// Rewrites every numbered backreference `\N` of `pattern` into `\(N + shift)`.
///
/// Needed when a pattern gets wrapped in a group and appended after other patterns: its own
/// groups are renumbered by the regex engine so the backreferences need to follow.
/// Escapes and character classes are skipped since `\1` means something else in there.
pub(crate) fn shift_backreferences(pattern: &str, shift: usize) -> String {
    if shift == 0 || !pattern.contains('\\') {
        return pattern.to_owned();
    }

    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    // Oniguruma supports nested classes like `[a-z&&[^x]]`
    let mut class_depth = 0usize;
    // A `]` right after `[` or `[^` is a literal
    let mut class_start = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                class_start = false;
                let Some(next) = chars.next() else {
                    out.push(c);
                    break;
                };
                if class_depth == 0 && next.is_ascii_digit() && next != '0' {
                    let mut digits = String::from(next);
                    while let Some(&d) = chars.peek()
                        && d.is_ascii_digit()
                    {
                        digits.push(d);
                        chars.next();
                    }
                    match digits.parse::<usize>() {
                        Ok(n) => {
                            out.push('\\');
                            out.push_str(&(n + shift).to_string());
                        }
                        Err(_) => {
                            out.push('\\');
                            out.push_str(&digits);
                        }
                    }
                } else {
                    out.push(c);
                    out.push(next);
                }
            }
            '[' => {
                class_depth += 1;
                class_start = true;
                out.push(c);
                if chars.peek() == Some(&'^') {
                    out.push('^');
                    chars.next();
                }
            }
            ']' if class_depth > 0 && !class_start => {
                class_depth -= 1;
                out.push(c);
            }
            _ => {
                class_start = false;
                out.push(c);
            }
        }
    }

    out
}

/// Wraps each pattern in a capturing group and joins them with `separator`, keeping
/// backreferences pointing at the right groups.
///
/// Each item is the pattern source and how many capture groups it contains.
pub(crate) fn join_in_groups<'a>(
    patterns: impl IntoIterator<Item = (&'a str, usize)>,
    separator: &str,
) -> String {
    let mut out = String::new();
    let mut groups_so_far = 0;

    for (i, (pattern, captures_len)) in patterns.into_iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        groups_so_far += 1;
        out.push('(');
        out.push_str(&shift_backreferences(pattern, groups_so_far));
        out.push(')');
        groups_so_far += captures_len;
    }

    out
}
