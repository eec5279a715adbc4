//! Output formatting for CLI

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn render_table(headers: Vec<&'static str>, rows: Vec<Vec<String>>) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers);
    for row in rows {
        table.add_row(row);
    }
    table.to_string()
}

fn render_plain(headers: &[&str], row: &[String]) -> String {
    headers
        .iter()
        .zip(row.iter())
        .map(|(header, value)| format!("{}: {}", header, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a serializable value as JSON or YAML
pub fn render_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        _ => serde_json::to_string_pretty(value)?,
    })
}

/// Print a single item
pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_table(T::headers(), vec![item.row()])),
        OutputFormat::Json | OutputFormat::Yaml => println!("{}", render_structured(item, format)?),
        OutputFormat::Plain => println!("{}", render_plain(&T::headers(), &item.row())),
    }
    Ok(())
}

#[derive(Serialize)]
struct ScriptOutput<'a> {
    script: &'a str,
}

/// Print a script: raw for table/plain, wrapped in `{script}` otherwise
pub fn print_script(script: &str, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Plain => println!("{}", script),
        _ => println!("{}", render_structured(&ScriptOutput { script }, format)?),
    }
    Ok(())
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        name: String,
        pages: usize,
    }

    impl TableDisplay for Row {
        fn headers() -> Vec<&'static str> {
            vec!["Name", "Pages"]
        }

        fn row(&self) -> Vec<String> {
            vec![self.name.clone(), self.pages.to_string()]
        }
    }

    #[test]
    fn test_plain_rendering() {
        let row = Row {
            name: "TestMaster".to_string(),
            pages: 10,
        };
        assert_eq!(render_plain(&Row::headers(), &row.row()), "Name: TestMaster\nPages: 10");
    }

    #[test]
    fn test_structured_rendering() {
        let out = ScriptOutput { script: "await page.goto('/');" };
        let json = render_structured(&out, OutputFormat::Json).unwrap();
        assert!(json.contains(r#""script": "await page.goto('/');""#));

        let yaml = render_structured(&out, OutputFormat::Yaml).unwrap();
        assert!(yaml.starts_with("script:"));
    }

    #[test]
    fn test_table_contains_cells() {
        let table = render_table(Row::headers(), vec![vec!["Shop".to_string(), "3".to_string()]]);
        assert!(table.contains("Shop"));
        assert!(table.contains("Pages"));
    }
}
