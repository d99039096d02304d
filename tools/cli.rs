use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use ambra::{Registry, RegistryConfig, ScanOptions, ScanResult, TreeVisitor};
use clap::Parser;

#[derive(Parser)]
#[command(name = "ambra-cli")]
#[command(about = "Scan a file with the builtin grammars and print the scope tree")]
struct Args {
    /// File to scan, stdin if not given
    file: Option<PathBuf>,

    /// Grammar name or alias. The language is auto-detected if not given
    #[arg(short, long)]
    lang: Option<String>,

    /// Additional grammar files in JSON
    #[arg(short, long)]
    grammar: Vec<PathBuf>,

    /// A JSON file with the registry configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Treat text matching illegal patterns as plain text
    #[arg(long)]
    ignore_illegals: bool,

    /// Print the tree as JSON
    #[arg(long, conflicts_with = "outline")]
    json: bool,

    /// Print one scope per line, indented by depth
    #[arg(long)]
    outline: bool,
}

/// Prints the scopes of a tree with the text they cover.
#[derive(Default)]
struct Outline {
    depth: usize,
}

impl Outline {
    fn line(&self, content: &str) {
        println!("{}{content}", "  ".repeat(self.depth));
    }
}

impl TreeVisitor for Outline {
    fn text(&mut self, text: &str) {
        self.line(&format!("{text:?}"));
    }

    fn open_scope(&mut self, scope: &str) {
        self.line(scope);
        self.depth += 1;
    }

    fn close_scope(&mut self, _scope: &str) {
        self.depth -= 1;
    }

    fn open_language(&mut self, language: Option<&str>) {
        self.line(&format!("[{}]", language.unwrap_or("?")));
        self.depth += 1;
    }

    fn close_language(&mut self, _language: Option<&str>) {
        self.depth -= 1;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let text = match &args.file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    let config = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => RegistryConfig::default(),
    };
    let mut registry = Registry::builtin().with_config(config);
    for path in &args.grammar {
        registry.add_grammar_from_path(path)?;
    }

    let result = match &args.lang {
        Some(lang) => registry.scan(
            &text,
            &ScanOptions::new(lang).ignore_illegals(args.ignore_illegals),
        )?,
        None => {
            let auto = registry.scan_auto(&text, None);
            if let Some(second) = &auto.second_best {
                eprintln!("Runner-up: {}", describe(second));
            }
            auto.best
        }
    };

    if args.json {
        println!("{}", result.tree.to_json()?);
    } else if args.outline {
        result.tree.walk(&mut Outline::default());
    } else {
        println!("{}", result.tree);
    }
    eprintln!("Scanned as {}", describe(&result));

    Ok(())
}

fn describe(result: &ScanResult) -> String {
    let language = result.language.as_deref().unwrap_or("plain text");
    match &result.error {
        Some(err) => format!("{language} (relevance {}, {err})", result.relevance),
        None => format!("{language} (relevance {})", result.relevance),
    }
}
