use crate::error::{AmbraResult, Error};
use crate::grammars::SubLanguage;
use crate::tokenizer::Scanner;

impl Scanner<'_, '_> {
    /// Scans the buffer with another grammar and splices the resulting tree.
    ///
    /// Inner scans never fail because of `illegal` patterns. Any other failure leaves the text
    /// plain, without a language node, except hitting the sublanguage limit which stops
    /// everything.
    pub(super) fn process_sub_language(
        &mut self,
        sub_language: &SubLanguage,
        mode_relevance: u32,
    ) -> AmbraResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let buffer = std::mem::take(&mut self.buffer);
        let depth = self.depth + 1;

        let result = match sub_language {
            SubLanguage::Named(name) => {
                let Ok(grammar) = self.registry.grammar(name) else {
                    #[cfg(feature = "debug")]
                    log::warn!("Sublanguage {name} is not available, leaving the text as is");
                    self.tree.add_text(&buffer);
                    return Ok(());
                };

                let continuation = self.continuations.get(name);
                match Scanner::new(self.registry, grammar, &buffer, true, depth).run(continuation)
                {
                    Ok(result) => {
                        self.continuations.insert(name.clone(), result.top.clone());
                        result
                    }
                    Err(err @ Error::RecursionLimit { .. }) => return Err(err),
                    Err(_err) => {
                        #[cfg(feature = "debug")]
                        log::warn!("Sublanguage {name} failed, leaving the text as is: {_err}");
                        self.continuations.remove(name);
                        self.tree.add_text(&buffer);
                        return Ok(());
                    }
                }
            }
            SubLanguage::Auto(candidates) => {
                let candidates = (!candidates.is_empty()).then_some(candidates.as_slice());
                self.registry.scan_auto_at(&buffer, candidates, depth)?.best
            }
        };

        if mode_relevance > 0 {
            self.relevance = self.relevance.saturating_add(result.relevance);
        }
        self.tree.add_sublanguage(result.tree, result.language);
        Ok(())
    }
}
