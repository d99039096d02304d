use crate::grammars::{Primitives, RawGrammar, RawRule};

/// No rules at all: the text comes out as a single text node.
pub fn plaintext(_: &Primitives) -> RawGrammar {
    RawGrammar::new("plaintext", RawRule::default())
        .aliases(&["text", "txt"])
        .disable_autodetect(true)
}

#[cfg(test)]
mod tests {
    use crate::{Registry, ScanOptions};

    #[test]
    fn leaves_text_untouched() {
        let registry = Registry::builtin();
        let result = registry
            .scan("if x { \"y\" } # z", &ScanOptions::new("txt"))
            .unwrap();
        insta::assert_snapshot!(result.tree, @r#""if x { \"y\" } # z""#);
        assert_eq!(result.relevance, 0);
        assert_eq!(result.language.as_deref(), Some("plaintext"));
    }

    #[test]
    fn never_auto_detected() {
        let registry = Registry::builtin();
        let auto = registry.scan_auto("hello", Some(&["plaintext"]));
        assert_eq!(auto.best.language, None);
    }
}
