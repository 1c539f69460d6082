pub mod case;
pub mod defaults;
pub mod eval;
pub mod generate;
pub mod infer;
pub mod models;
pub mod synth;
pub mod target;
pub mod workspace;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use evalite_core::{TestResult, VariableValue, VariableValues};

/// Text given inline or read from a file.
#[derive(Args, Debug)]
pub struct ContentArgs {
    /// Text content
    #[arg(conflicts_with = "file")]
    pub content: Option<String>,

    /// Read the content from a file instead
    #[arg(long, short)]
    pub file: Option<PathBuf>,
}

impl ContentArgs {
    pub fn read(self) -> Result<String> {
        match (self.content, self.file) {
            (Some(content), _) => Ok(content),
            (None, Some(path)) => {
                std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
            }
            (None, None) => bail!("give the content inline or with --file"),
        }
    }
}

/// `NAME=VALUE` test-case variables.
#[derive(Args, Debug, Default)]
pub struct VariableArgs {
    /// Text variable, as NAME=VALUE (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub vars: Vec<(String, String)>,

    /// Image variable read from a file, as NAME=PATH (repeatable)
    #[arg(long = "image", value_name = "NAME=PATH", value_parser = parse_assignment)]
    pub images: Vec<(String, String)>,
}

impl VariableArgs {
    pub fn into_values(self) -> Result<VariableValues> {
        let mut values = VariableValues::new();
        for (name, value) in self.vars {
            values.insert(name, VariableValue::text(value));
        }
        for (name, path) in self.images {
            let bytes = std::fs::read(&path).with_context(|| format!("reading image {path}"))?;
            values.insert(name, VariableValue::Image(bytes));
        }
        Ok(values)
    }
}

pub fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let Some((name, value)) = s.split_once('=') else {
        return Err(format!("expected NAME=VALUE, got '{s}'"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{s}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

/// A table with the shared look and the given header.
pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        header
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

/// Render test results as a table.
pub fn print_results(results: &[TestResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    let mut table = table(&["Test case", "Model", "Version", "Response"]);
    for result in results {
        table.add_row(vec![
            Cell::new(result.test_case_id),
            Cell::new(&result.model_config_name),
            Cell::new(format!("v{}", result.prompt_version)),
            Cell::new(&result.response),
        ]);
    }
    println!("{table}");
}

/// Short rendering of variable values for tables.
pub fn format_values(values: &VariableValues) -> String {
    values
        .iter()
        .map(|(name, value)| match value {
            VariableValue::Text(text) => format!("{name}={text}"),
            VariableValue::Image(bytes) => format!("{name}=<image, {} bytes>", bytes.len()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
