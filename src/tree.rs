use std::fmt;

use serde::Serialize;

/// A node of the output tree.
///
/// Concatenating the text of every leaf, in order, gives back the scanned input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Text(String),
    Scope {
        #[serde(rename = "scope")]
        name: String,
        children: Vec<Node>,
    },
    /// The root of a sublanguage scan spliced into the tree.
    /// The name is `None` when auto-detection found nothing better than plain text.
    Language {
        #[serde(rename = "language")]
        name: Option<String>,
        children: Vec<Node>,
    },
}

/// Receives the content of a tree, in order, when walking it.
///
/// This is what a renderer implements.
pub trait TreeVisitor {
    fn text(&mut self, text: &str);

    fn open_scope(&mut self, scope: &str);

    fn close_scope(&mut self, scope: &str);

    fn open_language(&mut self, _language: Option<&str>) {}

    fn close_language(&mut self, _language: Option<&str>) {}
}

/// The annotated result of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// A tree without any scope
    pub fn plain(text: &str) -> Self {
        let nodes = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::Text(text.to_owned())]
        };
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(mut self) -> Vec<Node> {
        std::mem::take(&mut self.nodes)
    }

    pub fn walk<V: TreeVisitor>(&self, visitor: &mut V) {
        // Siblings being visited, with their parent and the next one to visit
        let mut stack: Vec<(Option<&Node>, &[Node], usize)> =
            vec![(None, self.nodes.as_slice(), 0)];
        while let Some((parent, nodes, i)) = stack.pop() {
            let Some(node) = nodes.get(i) else {
                match parent {
                    Some(Node::Scope { name, .. }) => visitor.close_scope(name),
                    Some(Node::Language { name, .. }) => visitor.close_language(name.as_deref()),
                    _ => {}
                }
                continue;
            };
            stack.push((parent, nodes, i + 1));

            match node {
                Node::Text(text) => visitor.text(text),
                Node::Scope { name, children } => {
                    visitor.open_scope(name);
                    stack.push((Some(node), children, 0));
                }
                Node::Language { name, children } => {
                    visitor.open_language(name.as_deref());
                    stack.push((Some(node), children, 0));
                }
            }
        }
    }

    /// The text of all the leaves
    pub fn text(&self) -> String {
        struct Collect(String);

        impl TreeVisitor for Collect {
            fn text(&mut self, text: &str) {
                self.0.push_str(text);
            }

            fn open_scope(&mut self, _scope: &str) {}

            fn close_scope(&mut self, _scope: &str) {}
        }

        let mut collect = Collect(String::new());
        self.walk(&mut collect);
        collect.0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Compact s-expression form: `(keyword "RUN") (language:bash " " (built_in "echo"))`
impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack: Vec<(&[Node], usize)> = vec![(self.nodes.as_slice(), 0)];
        while let Some((nodes, i)) = stack.pop() {
            let Some(node) = nodes.get(i) else {
                // The root has no parenthesis to close
                if !stack.is_empty() {
                    write!(f, ")")?;
                }
                continue;
            };
            stack.push((nodes, i + 1));
            if i > 0 {
                write!(f, " ")?;
            }

            let children = match node {
                Node::Text(text) => {
                    write!(f, "{text:?}")?;
                    continue;
                }
                Node::Scope { name, children } => {
                    write!(f, "({name}")?;
                    children
                }
                Node::Language { name, children } => {
                    match name {
                        Some(name) => write!(f, "(language:{name}")?,
                        None => write!(f, "(language")?,
                    }
                    children
                }
            };
            if !children.is_empty() {
                write!(f, " ")?;
            }
            stack.push((children, 0));
        }
        Ok(())
    }
}

/// Deep trees are released without recursing through every level
impl Drop for Tree {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.nodes);
        while let Some(node) = pending.pop() {
            match node {
                Node::Scope { children, .. } | Node::Language { children, .. } => {
                    pending.extend(children);
                }
                Node::Text(_) => {}
            }
        }
    }
}

/// Builds a tree while scanning.
///
/// Branches are opened and closed as modes are entered and left; the root can never be closed.
#[derive(Debug, Default)]
pub(crate) struct TreeBuilder {
    root: Vec<Node>,
    open: Vec<(String, Vec<Node>)>,
}

impl TreeBuilder {
    fn children(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some((_, children)) => children,
            None => &mut self.root,
        }
    }

    /// Adjacent text leaves are merged
    pub fn add_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let children = self.children();
        if let Some(Node::Text(last)) = children.last_mut() {
            last.push_str(text);
        } else {
            children.push(Node::Text(text.to_owned()));
        }
    }

    pub fn open_scope(&mut self, scope: &str) {
        self.open.push((scope.to_owned(), Vec::new()));
    }

    pub fn close_scope(&mut self) {
        if let Some((name, children)) = self.open.pop() {
            self.children().push(Node::Scope { name, children });
        }
    }

    /// A leaf wrapped in a single scope. Nothing is added for an empty text.
    pub fn add_scoped_text(&mut self, text: &str, scope: &str) {
        if text.is_empty() {
            return;
        }
        self.children().push(Node::Scope {
            name: scope.to_owned(),
            children: vec![Node::Text(text.to_owned())],
        });
    }

    pub fn add_sublanguage(&mut self, tree: Tree, language: Option<String>) {
        self.children().push(Node::Language {
            name: language,
            children: tree.into_nodes(),
        });
    }

    pub fn finish(mut self) -> Tree {
        while !self.open.is_empty() {
            self.close_scope();
        }
        Tree {
            nodes: std::mem::take(&mut self.root),
        }
    }
}
