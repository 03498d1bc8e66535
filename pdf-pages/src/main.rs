use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pdf_pages::{extract_pages, PageText};

#[derive(Parser, Debug)]
#[command(
    name = "pdf_pages",
    version,
    about = "Print the text of every page in a PDF document"
)]
struct PagesCli {
    /// PDF file to read; '-' or no argument reads the document from stdin
    input: Option<PathBuf>,

    /// Print plain text with pages separated by blank lines instead of JSON
    #[arg(long, default_value_t = false)]
    plain: bool,

    /// Only print the page with this zero-based index
    #[arg(long)]
    page: Option<usize>,
}

fn main() -> Result<()> {
    let cli = PagesCli::parse();
    let bytes = read_input(cli.input.as_ref())?;
    let mut pages = extract_pages(&bytes).context("failed to extract pages")?;
    if let Some(wanted) = cli.page {
        pages.retain(|page| page.number == wanted);
        anyhow::ensure!(!pages.is_empty(), "document has no page {wanted}");
    }

    if cli.plain {
        println!("{}", render_plain(&pages));
    } else {
        let json = serde_json::to_string_pretty(&pages).context("failed to serialize pages")?;
        println!("{json}");
    }
    Ok(())
}

fn read_input(path: Option<&PathBuf>) -> Result<Vec<u8>> {
    match path {
        Some(path) if path.as_os_str() != "-" => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        _ => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn render_plain(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
