use crate::grammars::{Primitives, RawGrammar, RawRule};

/// Build instructions whose arguments are shell commands, highlighted as bash until a line
/// that doesn't end with a backslash.
const SHELL_INSTRUCTIONS: &str = "RENDER WRITE MKDIR COPY INCLUDE RUN WORKDIR ENTRYPOINT CMD";

/// Raptor build files, a Dockerfile-like format embedding shell commands.
pub fn raptorfile(modes: &Primitives) -> RawGrammar {
    let root = RawRule::default()
        .keywords("FROM ENV MOUNT")
        .illegal("</")
        .contains(vec![
            modes.hash_comment_mode().into(),
            modes.apos_string_mode().into(),
            modes.quote_string_mode().into(),
            modes.number_mode().into(),
            RawRule::default()
                .begin_keywords(SHELL_INSTRUCTIONS)
                .starts(RawRule::default().end(r"[^\\]$").sub_language("bash"))
                .into(),
        ]);

    RawGrammar::new("raptorfile", root)
        .aliases(&["raptor"])
        .case_insensitive(false)
}
