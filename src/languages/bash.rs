use crate::grammars::{Primitives, RawGrammar, RawKeywords, RawRule, RawRuleRef};

const KEYWORDS: &str =
    "if then else elif fi time for while until in do done case esac coproc function select";
const LITERALS: &str = "true false";
// Shell builtins, then zsh builtins, then GNU coreutils
const BUILT_INS: &str = concat!(
    "break cd continue eval exec exit export getopts hash pwd readonly return shift test times ",
    "trap umask unset alias bind builtin caller command declare echo enable help let local ",
    "logout mapfile printf read readarray source sudo type typeset ulimit unalias set shopt ",
    "autoload bg bindkey bye cap chdir clone comparguments compcall compctl compdescribe ",
    "compfiles compgroups compquote comptags comptry compvalues dirs disable disown echotc ",
    "echoti emulate fc fg float functions getcap getln history integer jobs kill limit log ",
    "noglob popd print pushd pushln rehash sched setcap setopt stat suspend ttyctl unfunction ",
    "unhash unlimit unsetopt vared wait whence where which zcompile zformat zftp zle zmodload ",
    "zparseopts zprof zpty zregexparse zsocket zstyle ztcp chcon chgrp chown chmod cp dd df ",
    "dir dircolors ln ls mkdir mkfifo mknod mktemp mv realpath rm rmdir shred sync touch ",
    "truncate vdir b2sum base32 base64 cat cksum comm csplit cut expand fmt fold head join ",
    "md5sum nl numfmt od paste ptx pr sha1sum sha224sum sha256sum sha384sum sha512sum shuf ",
    "sort split sum tac tail tr tsort unexpand uniq wc arch basename chroot date dirname du ",
    "echo env expr factor groups hostid id link logname nice nohup nproc pathchk pinky ",
    "printenv printf pwd readlink runcon seq sleep stat stdbuf stty tee test timeout tty uname ",
    "unlink uptime users who whoami yes",
);
const SHELLS: &str = "(fish|bash|zsh|sh|csh|ksh|tcsh|dash|scsh)";

/// Bourne-like shells: bash, zsh and sh scripts.
pub fn bash(modes: &Primitives) -> RawGrammar {
    let var = RawRule::default().scope("variable").variants(vec![
        RawRule::default().begin(Primitives::concat(&[
            r"\$[\w\d#@][\w\d_]*",
            r"(?![\w\d])(?![$])",
        ])),
        // ${NAME:-default}, where the default can itself use variables
        RawRule::default().begin(r"\$\{").end(r"\}").contains(vec![
            modes.self_ref(),
            RawRule::default()
                .begin(":-")
                .contains(vec![RawRuleRef::named("var")])
                .into(),
        ]),
    ]);
    let subst = RawRule::default()
        .scope("subst")
        .begin(r"\$\(")
        .end(r"\)")
        .contains(vec![modes.backslash_escape().into(), RawRuleRef::named("string")]);
    let string = RawRule::default()
        .scope("string")
        .begin("\"")
        .end("\"")
        .contains(vec![
            modes.backslash_escape().into(),
            RawRuleRef::named("var"),
            RawRuleRef::named("subst"),
        ]);

    let function = RawRule::default()
        .scope("function")
        .begin(r"\w[\w\d_]*\s*\(\s*\)\s*\{")
        .return_begin(true)
        .relevance(0)
        .contains(vec![modes.title_mode().begin(r"\w[\w\d_]*").into()]);
    let arithmetic = RawRule::default()
        .begin(r"\$?\(\(")
        .end(r"\)\)")
        .contains(vec![
            RawRule::default()
                .scope("number")
                .begin(r"\d+#[0-9a-f]+")
                .into(),
            modes.number_mode().into(),
            RawRuleRef::named("var"),
        ]);
    let comment = RawRule::default()
        .match_([r"(^|\s)", "#.*$"])
        .scope([(2, "comment")]);
    let heredoc = RawRule::default().begin(r"<<-?\s*(?=\w+)").starts(
        RawRule::default().contains(vec![
            modes
                .end_same_as_begin(
                    RawRule::default()
                        .scope("string")
                        .begin(r"(\w+)")
                        .end(r"(\w+)"),
                )
                .into(),
        ]),
    );

    let root = RawRule::default()
        .keywords(RawKeywords::categories([
            ("$pattern", r"\b[a-z][a-z0-9._-]+\b"),
            ("keyword", KEYWORDS),
            ("literal", LITERALS),
            ("built_in", BUILT_INS),
        ]))
        .contains(vec![
            modes.shebang(Some(SHELLS)).into(),
            modes.shebang(None).into(),
            function.into(),
            arithmetic.into(),
            comment.into(),
            heredoc.into(),
            RawRule::default().match_(r"(\/[a-z._-]+)+").into(),
            RawRuleRef::named("string"),
            RawRule::default().match_(r#"\\""#).into(),
            RawRule::default().scope("string").begin("'").end("'").into(),
            RawRule::default().match_(r"\\'").into(),
            RawRuleRef::named("var"),
        ]);

    RawGrammar::new("bash", root)
        .aliases(&["sh", "zsh"])
        .repository_rule("var", var)
        .repository_rule("subst", subst)
        .repository_rule("string", string)
}
