use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::error::{AmbraResult, Error};
use crate::grammars::{CompileError, CompiledGrammar, Primitives, RawGrammar};
use crate::languages;
use crate::options::{RegistryConfig, ScanOptions};
use crate::tokenizer::{ScanResult, Scanner};

/// The name of the grammar where nothing is highlighted
pub const PLAIN_GRAMMAR_NAME: &str = "plaintext";

#[derive(Debug, Clone)]
struct GrammarEntry {
    raw: RawGrammar,
    /// Compiled the first time the grammar is used
    compiled: OnceLock<Result<Arc<CompiledGrammar>, CompileError>>,
}

/// The outcome of auto-detection: every candidate grammar is tried and the best two kept.
#[derive(Debug)]
pub struct AutoScanResult {
    /// Falls back to a plain text result, with no language, if no grammar did better
    pub best: ScanResult,
    pub second_best: Option<ScanResult>,
}

/// The main struct in ambra.
///
/// Holds all the grammars and is responsible for scanning a text into a tree.
/// It is not responsible for rendering that tree.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    // Registration order matters for auto-detection ties
    grammars: Vec<GrammarEntry>,
    // lowercased grammar name or alias -> index in `grammars`
    grammar_id_by_name: HashMap<String, usize>,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// A registry with all the grammars shipped with ambra
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for (name, factory) in languages::BUILTIN {
            let mut raw = factory(&Primitives);
            raw.name = (*name).to_owned();
            registry.insert(raw);
        }
        registry
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn insert(&mut self, raw: RawGrammar) {
        let key = raw.name.to_lowercase();
        let aliases = raw.aliases.clone();
        let entry = GrammarEntry {
            raw,
            compiled: OnceLock::new(),
        };

        let id = match self.grammar_id_by_name.get(&key) {
            Some(&id) => {
                self.grammars[id] = entry;
                id
            }
            None => {
                self.grammars.push(entry);
                self.grammars.len() - 1
            }
        };
        self.grammar_id_by_name.insert(key, id);
        for alias in aliases {
            self.grammar_id_by_name.insert(alias.to_lowercase(), id);
        }
    }

    /// Adds a grammar, replacing any grammar with the same name that was never used.
    pub fn add_grammar_from_raw(&mut self, raw: RawGrammar) -> AmbraResult<()> {
        if let Some(&id) = self.grammar_id_by_name.get(&raw.name.to_lowercase())
            && self.grammars[id].compiled.get().is_some()
        {
            return Err(Error::ReplacingCompiledGrammar(raw.name));
        }

        #[cfg(feature = "debug")]
        log::debug!("Registering grammar {}", raw.name);

        self.insert(raw);
        Ok(())
    }

    /// Registers the grammar built by `factory` under `name`.
    ///
    /// The factory is called right away, with the shared primitives, so the aliases of the
    /// grammar are known. The grammar is only compiled the first time it's used.
    pub fn register<F>(&mut self, name: &str, factory: F) -> AmbraResult<()>
    where
        F: FnOnce(&Primitives) -> RawGrammar,
    {
        let mut raw = factory(&Primitives);
        raw.name = name.to_owned();
        self.add_grammar_from_raw(raw)
    }

    /// Reads a JSON grammar file and adds it.
    /// The file stem is used as the name if the grammar doesn't have one.
    pub fn add_grammar_from_path(&mut self, path: impl AsRef<Path>) -> AmbraResult<()> {
        let path = path.as_ref();
        let mut raw = RawGrammar::load_from_file(path)?;
        if raw.name.is_empty()
            && let Some(stem) = path.file_stem()
        {
            raw.name = stem.to_string_lossy().into_owned();
        }
        self.add_grammar_from_raw(raw)
    }

    /// Adds the grammar that will not match anything, with extra aliases.
    pub fn add_plain_grammar(&mut self, aliases: &[&str]) -> AmbraResult<()> {
        self.register(PLAIN_GRAMMAR_NAME, languages::plaintext)?;
        for alias in aliases {
            self.add_alias(PLAIN_GRAMMAR_NAME, alias);
        }
        Ok(())
    }

    /// Adds an alias for the given grammar. Does nothing if the grammar doesn't exist.
    pub fn add_alias(&mut self, grammar_name: &str, alias: &str) {
        if let Some(&id) = self.grammar_id_by_name.get(&grammar_name.to_lowercase()) {
            self.grammar_id_by_name.insert(alias.to_lowercase(), id);
        }
    }

    pub fn contains_grammar(&self, name: &str) -> bool {
        self.grammar_id_by_name.contains_key(&name.to_lowercase())
    }

    /// Names of the grammars, in registration order. Aliases are not included.
    pub fn grammar_names(&self) -> Vec<&str> {
        self.grammars.iter().map(|g| g.raw.name.as_str()).collect()
    }

    fn entry(&self, name: &str) -> Option<(usize, &GrammarEntry)> {
        let id = *self.grammar_id_by_name.get(&name.to_lowercase())?;
        Some((id, &self.grammars[id]))
    }

    /// The compiled grammar registered under that name or alias, compiling it if needed.
    pub fn grammar(&self, name: &str) -> AmbraResult<Arc<CompiledGrammar>> {
        let (_, entry) = self
            .entry(name)
            .ok_or_else(|| Error::GrammarNotFound(name.to_owned()))?;
        entry
            .compiled
            .get_or_init(|| CompiledGrammar::from_raw_grammar(&entry.raw).map(Arc::new))
            .clone()
            .map_err(|error| Error::Compile {
                grammar: entry.raw.name.clone(),
                error,
            })
    }

    /// Scans the text with the given grammar.
    ///
    /// Any error stops the scan, including text matching an `illegal` pattern unless
    /// [`ScanOptions::ignore_illegals`] is set.
    pub fn scan(&self, text: &str, options: &ScanOptions) -> AmbraResult<ScanResult> {
        let grammar = self.grammar(options.language)?;
        Scanner::new(self, grammar, text, options.ignore_illegals, 0).run(None)
    }

    /// Scans the text with every candidate grammar and keeps the two most relevant results.
    ///
    /// Without candidates, the configured auto-detection languages are used, or all the
    /// grammars. Unknown names are skipped and grammars disabling auto-detection are ignored.
    /// This never fails: errors of a candidate are stored in its result.
    pub fn scan_auto(&self, text: &str, candidates: Option<&[&str]>) -> AutoScanResult {
        match self.scan_auto_at(text, candidates, 0) {
            Ok(result) => result,
            Err(err) => AutoScanResult {
                best: ScanResult::plain(text, None, Some(err)),
                second_best: None,
            },
        }
    }

    pub(crate) fn scan_auto_at<S: AsRef<str>>(
        &self,
        text: &str,
        candidates: Option<&[S]>,
        depth: usize,
    ) -> AmbraResult<AutoScanResult> {
        if depth > self.config.max_depth {
            return Err(Error::RecursionLimit {
                language: "auto".to_owned(),
                depth: self.config.max_depth,
            });
        }

        let names: Vec<&str> = match (candidates, &self.config.auto_detect_languages) {
            (Some(candidates), _) => candidates.iter().map(AsRef::as_ref).collect(),
            (None, Some(configured)) => configured.iter().map(String::as_str).collect(),
            (None, None) => self.grammar_names(),
        };

        let mut seen = Vec::new();
        let mut results = vec![ScanResult::plain(text, None, None)];
        for name in names {
            let Some((id, entry)) = self.entry(name) else {
                continue;
            };
            if entry.raw.disable_autodetect || seen.contains(&id) {
                continue;
            }
            seen.push(id);

            let result = self
                .grammar(name)
                .and_then(|grammar| Scanner::new(self, grammar, text, false, depth).run(None));
            results.push(match result {
                Ok(result) => result,
                Err(err) => {
                    #[cfg(feature = "debug")]
                    log::debug!("Auto-detection candidate {} failed: {err}", entry.raw.name);
                    ScanResult::plain(text, Some(entry.raw.name.clone()), Some(err))
                }
            });
        }

        results.sort_by(|a, b| b.relevance.cmp(&a.relevance));
        let mut start = 0;
        while start < results.len() {
            let relevance = results[start].relevance;
            let len = results[start..]
                .iter()
                .take_while(|r| r.relevance == relevance)
                .count();
            self.put_subsets_first(&mut results[start..start + len]);
            start += len;
        }

        let mut results = results.into_iter();
        let best = results
            .next()
            .unwrap_or_else(|| ScanResult::plain(text, None, None));
        Ok(AutoScanResult {
            best,
            second_best: results.next(),
        })
    }

    /// Within results of equal relevance, moves every grammar ahead of the grammars declaring
    /// themselves a superset of it. Other results keep their order.
    fn put_subsets_first(&self, tied: &mut [ScanResult]) {
        // Bounded so grammars declaring each other as supersets can't loop forever
        for _ in 0..tied.len() * tied.len() {
            let misplaced = (0..tied.len()).find_map(|i| {
                (i + 1..tied.len())
                    .find(|&j| self.is_superset_of(&tied[i], &tied[j]))
                    .map(|j| (i, j))
            });
            let Some((superset, subset)) = misplaced else {
                break;
            };
            tied[superset..=subset].rotate_right(1);
        }
    }

    /// Whether the grammar of `a` declares itself a superset of the one of `b`
    fn is_superset_of(&self, a: &ScanResult, b: &ScanResult) -> bool {
        let (Some(a), Some(b)) = (&a.language, &b.language) else {
            return false;
        };
        let superset_of = self
            .entry(a)
            .and_then(|(_, entry)| entry.raw.superset_of.as_deref())
            .and_then(|name| self.entry(name));
        match (superset_of, self.entry(b)) {
            (Some((subset, _)), Some((other, _))) => subset == other,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammars::{RawKeywords, RawRule};

    fn keyword_grammar(name: &str, keywords: &str) -> RawGrammar {
        RawGrammar::new(name, RawRule::default().keywords(keywords))
    }

    #[test]
    fn names_and_aliases_are_case_insensitive() {
        let mut registry = Registry::default();
        registry
            .add_grammar_from_raw(keyword_grammar("Demo", "x").aliases(&["dm"]))
            .unwrap();
        registry.add_alias("demo", "DEMO2");
        registry.add_alias("unknown", "nothing");

        assert!(registry.contains_grammar("demo"));
        assert!(registry.contains_grammar("DM"));
        assert!(registry.contains_grammar("demo2"));
        assert!(!registry.contains_grammar("nothing"));
        assert_eq!(registry.grammar_names(), vec!["Demo"]);
        assert_eq!(registry.grammar("dm").unwrap().name, "Demo");
    }

    #[test]
    fn builtin_grammars_compile() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.grammar_names(),
            vec!["bash", "raptorfile", "plaintext"]
        );
        for name in ["bash", "sh", "zsh", "raptorfile", "raptor", "plaintext", "txt"] {
            assert!(registry.grammar(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn reports_configuration_errors() {
        let mut registry = Registry::default();
        registry
            .register("broken", |_| {
                RawGrammar::new(
                    "ignored",
                    RawRule::default().contains(vec![RawRule::default().match_("a").end("b").into()]),
                )
            })
            .unwrap();

        assert!(matches!(
            registry.scan("a", &ScanOptions::new("broken")),
            Err(Error::Compile {
                error: CompileError::MatchWithBeginOrEnd,
                ..
            })
        ));
        assert!(matches!(
            registry.scan("a", &ScanOptions::new("nope")),
            Err(Error::GrammarNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn refuses_to_replace_used_grammars() {
        let mut registry = Registry::default();
        registry.add_grammar_from_raw(keyword_grammar("a", "x")).unwrap();
        // never used, can be replaced
        registry.add_grammar_from_raw(keyword_grammar("a", "y")).unwrap();
        let result = registry.scan("y", &ScanOptions::new("a")).unwrap();
        insta::assert_snapshot!(result.tree, @r#"(keyword "y")"#);

        assert!(matches!(
            registry.add_grammar_from_raw(keyword_grammar("A", "z")),
            Err(Error::ReplacingCompiledGrammar(name)) if name == "A"
        ));
    }

    #[test]
    fn loads_grammar_files() {
        let dir = std::env::temp_dir().join(format!("ambra-registry-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ini.json");
        std::fs::write(
            &path,
            r#"{ "contains": [{ "className": "section", "begin": "\\[", "end": "\\]" }] }"#,
        )
        .unwrap();

        let mut registry = Registry::default();
        registry.add_grammar_from_path(&path).unwrap();
        let result = registry.scan("[a] b", &ScanOptions::new("ini")).unwrap();
        insta::assert_snapshot!(result.tree, @r#"(section "[a]") " b""#);

        assert!(matches!(
            registry.add_grammar_from_path(dir.join("missing.json")),
            Err(Error::Io(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn auto_detection_picks_most_relevant() {
        let mut registry = Registry::default();
        registry.add_grammar_from_raw(keyword_grammar("a", "foo")).unwrap();
        registry.add_grammar_from_raw(keyword_grammar("b", "foo bar")).unwrap();
        registry
            .add_grammar_from_raw(keyword_grammar("c", "foo bar baz").disable_autodetect(true))
            .unwrap();

        let result = registry.scan_auto("foo bar baz", None);
        assert_eq!(result.best.language.as_deref(), Some("b"));
        assert_eq!(result.best.relevance, 2);
        assert_eq!(result.second_best.unwrap().language.as_deref(), Some("a"));

        // nothing matches: plain text wins the tie by coming first
        let result = registry.scan_auto("nothing here", None);
        assert_eq!(result.best.language, None);
        assert_eq!(result.best.tree.text(), "nothing here");

        // unknown and duplicate candidates are skipped
        let result = registry.scan_auto("foo", Some(&["zzz", "a", "A"]));
        assert_eq!(result.best.language.as_deref(), Some("a"));
        assert_eq!(result.second_best.unwrap().language, None);
    }

    #[test]
    fn auto_detection_uses_configured_languages() {
        let mut registry = Registry::new(RegistryConfig {
            auto_detect_languages: Some(vec!["a".into()]),
            ..Default::default()
        });
        registry.add_grammar_from_raw(keyword_grammar("a", "foo")).unwrap();
        registry.add_grammar_from_raw(keyword_grammar("b", "foo bar")).unwrap();

        let result = registry.scan_auto("foo bar", None);
        assert_eq!(result.best.language.as_deref(), Some("a"));
    }

    #[test]
    fn auto_detection_records_illegal_candidates() {
        let mut registry = Registry::default();
        registry
            .add_grammar_from_raw(RawGrammar::new(
                "strict",
                RawRule::default().keywords("foo|5").illegal("<"),
            ))
            .unwrap();
        registry.add_grammar_from_raw(keyword_grammar("loose", "foo")).unwrap();

        let result = registry.scan_auto("foo <", None);
        assert_eq!(result.best.language.as_deref(), Some("loose"));
        let second = result.second_best.unwrap();
        // the plain text result comes first among the ties
        assert_eq!(second.language, None);

        let result = registry.scan_auto("foo <", Some(&["strict"]));
        let failed = result.second_best.unwrap();
        assert_eq!(failed.language.as_deref(), Some("strict"));
        assert!(failed.is_illegal());
        assert_eq!(failed.relevance, 0);
        assert_eq!(failed.tree.text(), "foo <");
    }

    #[test]
    fn superset_loses_ties() {
        let mut registry = Registry::default();
        registry
            .add_grammar_from_raw(
                RawGrammar::new(
                    "cpp",
                    RawRule::default().keywords(RawKeywords::categories([("keyword", "int")])),
                )
                .superset_of("c"),
            )
            .unwrap();
        registry.add_grammar_from_raw(keyword_grammar("c", "int")).unwrap();

        let result = registry.scan_auto("int x", None);
        assert_eq!(result.best.relevance, 1);
        assert_eq!(result.best.language.as_deref(), Some("c"));
        assert_eq!(result.second_best.unwrap().language.as_deref(), Some("cpp"));
    }

    #[test]
    fn superset_loses_ties_against_a_distant_subset() {
        let mut registry = Registry::default();
        registry
            .add_grammar_from_raw(keyword_grammar("cpp", "int").superset_of("c"))
            .unwrap();
        registry.add_grammar_from_raw(keyword_grammar("d", "int")).unwrap();
        registry.add_grammar_from_raw(keyword_grammar("c", "int")).unwrap();

        let result = registry.scan_auto("int x", None);
        assert_eq!(result.best.language.as_deref(), Some("c"));
        assert_eq!(result.second_best.unwrap().language.as_deref(), Some("cpp"));
    }

    #[test]
    fn superset_chains_are_ordered() {
        let mut registry = Registry::default();
        registry
            .add_grammar_from_raw(keyword_grammar("objcpp", "int").superset_of("cpp"))
            .unwrap();
        registry
            .add_grammar_from_raw(keyword_grammar("cpp", "int").superset_of("c"))
            .unwrap();
        registry.add_grammar_from_raw(keyword_grammar("c", "int")).unwrap();
        registry
            .add_grammar_from_raw(keyword_grammar("a", "int").superset_of("b"))
            .unwrap();
        registry
            .add_grammar_from_raw(keyword_grammar("b", "int").superset_of("a"))
            .unwrap();

        let result = registry.scan_auto("int x", Some(&["objcpp", "cpp", "c"]));
        assert_eq!(result.best.language.as_deref(), Some("c"));
        assert_eq!(result.second_best.unwrap().language.as_deref(), Some("cpp"));

        // Grammars claiming to be supersets of each other still give a result
        let result = registry.scan_auto("int x", Some(&["a", "b"]));
        assert_eq!(result.best.relevance, 1);
    }
}
