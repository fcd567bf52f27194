// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging (tracing) and load the configuration file
// 3. Dispatch to the appropriate subcommand handler
// 4. Exit with proper code (0 = success, 1 = failed documents, 2 = error)
// =============================================================================

mod cli;      // src/cli.rs - command-line parsing
mod config;   // src/config.rs - TOML configuration
mod crawl;    // src/crawl/ - cache, coalescing, graph walk, backlinks
mod document; // src/document/ - flags, links, inline scripts
mod fetch;    // src/fetch/ - document transport
mod render;   // src/render.rs - document to HTML
mod site;     // src/site/ - static pre-rendering

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use config::Config;
use crawl::{CrawlSnapshot, Crawler};
use fetch::HttpFetcher;
use site::{DirSink, RemoteBrowser, ResourcePolicy, SiteCrawler};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = everything loaded
//   Ok(1) = some documents or pages failed
//   Err = configuration or setup error (exit code 2)
async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Graph { json } => handle_graph(&config, cli.no_cache, json).await,
        Commands::Show { path, html, backlinks } => {
            handle_show(&config, cli.no_cache, &path, html, backlinks).await
        }
        Commands::Site { out } => handle_site(&config, out).await,
    }
}

// Logs go to stderr so they never mix with reports on stdout
fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn live_crawler(config: &Config, no_cache: bool) -> Result<Crawler<HttpFetcher>> {
    let fetcher = HttpFetcher::new(
        &config.base_url,
        config.cache_key.clone(),
        Duration::from_secs(config.timeout_secs),
    )?;
    let crawler = Crawler::new(fetcher, config.roots()?)
        .with_concurrency(config.concurrency)
        .with_error_message(config.messages.page_error.clone());
    crawler.set_bypass(no_cache);
    Ok(crawler)
}

// Handles the 'graph' subcommand
// Parameters:
//   json: print the whole snapshot as JSON instead of a table
async fn handle_graph(config: &Config, no_cache: bool, json: bool) -> Result<i32> {
    let crawler = live_crawler(config, no_cache)?;
    let snapshot = crawler.get_files().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_table(&snapshot);
        println!("   🔎 Visited: {}", crawler.visited().len());
    }

    Ok(if snapshot.error_count() > 0 { 1 } else { 0 })
}

// Handles the 'show' subcommand
// Parameters:
//   path: the document to show
//   html: print rendered HTML only
//   backlinks: crawl from the roots and this path first, so every backlink is known
async fn handle_show(config: &Config, no_cache: bool, path: &str, html: bool, backlinks: bool) -> Result<i32> {
    let crawler = live_crawler(config, no_cache)?;
    if backlinks {
        let mut roots = config.roots()?;
        roots.push(path.to_string());
        crawler.crawl(&roots).await;
        // Keep only the backlinks; the document itself is fetched fresh below
        crawler.reset();
    }
    let document = crawler.get_file(path).await;

    if html {
        print!("{}", render::render(&document));
        return Ok(if document.is_error { 1 } else { 0 });
    }

    let flags = &document.flags;
    println!("📄 {} ({})", flags.title, document.path);
    if !flags.tags.is_empty() {
        println!("   Tags: {}", flags.tags.join(", "));
    }
    if let (Some(start), Some(end)) = (&flags.derived.start_date, &flags.derived.end_date) {
        println!("   Dates: {} .. {}", start, end);
    }
    if let Some(cover) = &flags.cover {
        println!("   Cover: {}", cover);
    }
    for (name, value) in &flags.extra {
        println!("   @{}: {}", name, value);
    }

    println!("\n🔗 Links ({}):", document.links.len());
    for link in &document.links {
        let kind = if link.is_image {
            "image"
        } else if link.is_external {
            "external"
        } else if link.is_markdown {
            "document"
        } else {
            "other"
        };
        println!("   {:<10} {}", kind, link.href);
    }

    let sources = crawler.backlinks(path);
    println!("\n↩️  Backlinks ({}):", sources.len());
    for source in sources {
        println!("   {}", source);
    }

    Ok(if document.is_error { 1 } else { 0 })
}

// Handles the 'site' subcommand
// Parameters:
//   out: output directory, overriding prerender.out_dir
async fn handle_site(config: &Config, out: Option<std::path::PathBuf>) -> Result<i32> {
    let prerender = config.prerender()?;
    let roots = config.roots()?;
    let out_dir = out.unwrap_or_else(|| prerender.out_dir.clone());

    let app = format!("{}{}", prerender.host.trim_end_matches('/'), prerender.index_path);
    let browser = RemoteBrowser::new(
        &prerender.browser_endpoint,
        &app,
        ResourcePolicy::new(prerender.asset_prefix.clone()),
        Duration::from_secs(prerender.page_timeout_secs),
    )
    .context("setting up the headless browser")?
    .with_token(prerender.browser_token.clone())
    .with_category(config.paths.category.clone());

    println!("🔍 Pre-rendering {} into {}", app, out_dir.display());

    // roots() guarantees the index root exists and comes first
    let crawler = SiteCrawler::new(browser, DirSink::new(&out_dir), prerender.index_path.clone(), roots[0].clone())
        .with_concurrency(config.concurrency);
    let report = crawler.run(&roots).await;

    println!("📊 Summary:");
    println!("   ✅ Written: {}", report.written.len());
    println!("   ❌ Skipped: {}", report.skipped.len());
    for path in &report.skipped {
        println!("      {}", path);
    }

    Ok(if report.skipped.is_empty() { 0 } else { 1 })
}

// Prints the crawled documents as a human-readable table
fn print_table(snapshot: &CrawlSnapshot) {
    println!("{:<40} {:<30} {:>6} {:>10}", "PATH", "TITLE", "LINKS", "BACKLINKS");
    println!("{}", "=".repeat(89));

    for (path, document) in &snapshot.documents {
        let title = if document.is_error {
            format!("❌ {}", document.flags.title)
        } else {
            document.flags.title.clone()
        };
        let backlinks = snapshot.backlinks.get(path).map_or(0, Vec::len);
        println!(
            "{:<40} {:<30} {:>6} {:>10}",
            truncate(path, 40),
            truncate(&title, 30),
            document.document_links().count(),
            backlinks
        );
    }

    println!();
    println!("📊 Summary:");
    println!("   📋 Documents: {}", snapshot.documents.len());
    println!("   ❌ Failed: {}", snapshot.error_count());
}

// Shortens text for a fixed-width column, on a char boundary
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
