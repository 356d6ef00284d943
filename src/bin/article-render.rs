//! article-render CLI: render one article to HTML or JSON.

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use article_render::{ArticleError, ArticleParser, Document, ParseOptions};

#[derive(Parser)]
#[command(name = "article-render")]
#[command(version)]
#[command(about = "Render a markdown article with math and callouts to HTML", long_about = None)]
struct Cli {
    /// Article source file (reads from stdin if not provided)
    input_file: Option<String>,

    /// Document path used to resolve relative images and links
    /// (defaults to the input file path)
    #[arg(short, long)]
    path: Option<String>,

    /// YAML options file
    #[arg(short, long)]
    config: Option<String>,

    /// Print `{html, metadata, diagnostics, outline}` as JSON
    #[arg(long)]
    json: bool,

    /// Print the table of contents before the article HTML
    #[arg(long)]
    outline: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("article-render: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), ArticleError> {
    let options = match &cli.config {
        Some(path) => ParseOptions::from_yaml_file(path)?,
        None => ParseOptions::default(),
    };

    let source = match &cli.input_file {
        Some(file) => fs::read_to_string(file)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let mut doc = Document::new(source);
    doc.path = cli.path.clone().or_else(|| cli.input_file.clone());

    let parser = ArticleParser::with_options(options);
    let article = parser.parse(&doc);
    let outline = parser.outline(&article);

    for diagnostic in &article.diagnostics {
        eprintln!("{diagnostic}");
    }

    if cli.json {
        let value = serde_json::json!({
            "html": outline.html,
            "metadata": article.metadata,
            "diagnostics": article.diagnostics,
            "outline": outline.nodes,
        });
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| ArticleError::Io(io::Error::other(e)))?;
        println!("{text}");
        return Ok(());
    }

    if cli.outline
        && let Some(nodes) = &outline.nodes
    {
        println!("{}", article_render::outline::render_toc(nodes));
    }
    print!("{}", outline.html);
    Ok(())
}
