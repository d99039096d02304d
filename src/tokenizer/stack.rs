use std::fmt;

use crate::grammars::{ROOT_RULE_ID, RuleId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ActiveMode {
    pub rule: RuleId,
    /// First capture of the begin match, only kept for rules ending on the same text
    pub begin_capture: Option<String>,
}

/// The modes currently open during a scan, from the root to the current one.
///
/// The root is never popped. The stack left at the end of an embedded scan is reused to
/// resume the next embedding of the same language.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct ModeStack {
    root: ActiveMode,
    modes: Vec<ActiveMode>,
}

impl Default for ModeStack {
    fn default() -> Self {
        Self {
            root: ActiveMode {
                rule: ROOT_RULE_ID,
                begin_capture: None,
            },
            modes: Vec::new(),
        }
    }
}

impl ModeStack {
    pub fn push(&mut self, rule: RuleId, begin_capture: Option<String>) {
        self.modes.push(ActiveMode {
            rule,
            begin_capture,
        });
    }

    /// Leaves the current mode. Returns `None` on the root.
    pub fn pop(&mut self) -> Option<ActiveMode> {
        self.modes.pop()
    }

    pub fn top(&self) -> &ActiveMode {
        self.modes.last().unwrap_or(&self.root)
    }

    /// The mode at `depth`, the root being at 0
    pub fn get(&self, depth: usize) -> Option<&ActiveMode> {
        match depth {
            0 => Some(&self.root),
            _ => self.modes.get(depth - 1),
        }
    }

    /// Number of open modes, including the root
    pub fn len(&self) -> usize {
        self.modes.len() + 1
    }

    /// The modes above the root, outermost first
    pub fn nested(&self) -> &[ActiveMode] {
        &self.modes
    }
}

impl fmt::Debug for ModeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ModeStack:")?;

        for (depth, mode) in std::iter::once(&self.root).chain(&self.modes).enumerate() {
            let indent = "  ".repeat(depth);
            write!(f, "{indent}rule={}", mode.rule.0)?;
            if let Some(capture) = &mode.begin_capture {
                write!(f, ", begin_capture={capture:?}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}
