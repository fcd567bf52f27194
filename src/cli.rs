// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Commands:
//   wiki-graph graph [--json]          crawl everything reachable from the roots
//   wiki-graph show <path> [--html]    one document, with its links and backlinks
//   wiki-graph site [--out DIR]        pre-render the site into static files
//
// Global options (--config, --no-cache, --verbose) work with every command.
// =============================================================================

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "wiki-graph",
    version,
    about = "Crawl, cache and pre-render a markdown document site",
    long_about = "wiki-graph fetches the markdown documents of a site, follows their links \
                  from a set of root documents and builds the backlink graph. It can also \
                  drive a headless browser to pre-render every page into static HTML."
)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "wiki-graph.toml")]
    pub config: PathBuf,

    /// Fetch documents again even if they are cached
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Log progress (info level) to stderr; RUST_LOG overrides this
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl every document reachable from the configured roots
    ///
    /// Example: wiki-graph graph --json
    Graph {
        /// Output the documents and backlinks as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show a single document
    ///
    /// Example: wiki-graph show /notes/rust.md --backlinks
    Show {
        /// Document path, e.g. /notes/rust.md
        path: String,

        /// Print the rendered HTML instead of the flags and links
        #[arg(long)]
        html: bool,

        /// Crawl the site first so the backlinks are complete
        #[arg(long)]
        backlinks: bool,
    },

    /// Pre-render every reachable page into static HTML
    ///
    /// Example: wiki-graph site --out public
    Site {
        /// Output directory (defaults to prerender.out_dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["wiki-graph", "graph", "--json", "--no-cache", "-v"]);
        assert!(cli.no_cache);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("wiki-graph.toml"));
        assert!(matches!(cli.command, Commands::Graph { json: true }));
    }

    #[test]
    fn test_show_command() {
        let cli = Cli::parse_from(["wiki-graph", "--config", "site.toml", "show", "/a.md", "--html"]);
        assert_eq!(cli.config, PathBuf::from("site.toml"));
        match cli.command {
            Commands::Show { path, html, backlinks } => {
                assert_eq!(path, "/a.md");
                assert!(html);
                assert!(!backlinks);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
