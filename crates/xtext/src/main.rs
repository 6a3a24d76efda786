//! Command-line interface for the `xtext` structural text index.
//!
//! Operates on a collection directory: a tree of XML documents with a
//! `collection.xconf` rule document at its root and the index kept in a
//! `.xtext-index` subdirectory.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;
use xtext_config::{IndexConfiguration, SETTINGS_FILENAME, Settings};
use xtext_document::{DocId, Document, QName, parse_document};
use xtext_highlight::{MatchCorrelator, render_marked};
use xtext_index::{
    NodeMatch, QueryOptions, QueryTranslator, ReindexMode, SearchIndex, compute_config_hash,
    discover_documents, index_directory, needs_rebuild, write_config_hash,
};
use xtext_query::{Occur, QueryNode};

/// Name of the rule document inside a collection directory.
const XCONF_FILENAME: &str = "collection.xconf";

#[derive(Parser)]
#[command(name = "xtext")]
#[command(about = "Structural full-text search for XML document collections")]
/// Top-level CLI options.
struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    command: Commands,
}

#[derive(Subcommand)]
/// Supported `xtext` subcommands.
enum Commands {
    /// Build or rebuild the index for a collection directory
    Index {
        /// Collection directory
        collection: PathBuf,

        /// Rule document path [default: <collection>/collection.xconf]
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Search the collection
    Search {
        /// Collection directory
        collection: PathBuf,

        /// Search terms (combined as a conjunction)
        #[arg(required = true)]
        terms: Vec<String>,

        /// Restrict to nodes with this qualified name (repeatable)
        #[arg(short = 'n', long = "name")]
        names: Vec<String>,

        /// Query a named field instead of node names
        #[arg(long)]
        field: Option<String>,

        /// Maximum results to print
        #[arg(short = 'l', long, default_value = "20")]
        limit: usize,

        /// Print each match with highlighted context
        #[arg(long)]
        highlight: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show index structure and statistics
    Inspect {
        /// Collection directory
        collection: PathBuf,

        /// List indexed terms of this qualified name
        #[arg(long)]
        terms: Option<String>,
    },

    /// List the documents a collection contains
    Ls {
        /// Collection directory
        collection: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Index { collection, config } => cmd_index(&collection, config.as_deref()),
        Commands::Search {
            collection,
            terms,
            names,
            field,
            limit,
            highlight,
            json,
        } => cmd_search(&collection, &terms, &names, field.as_deref(), limit, highlight, json),
        Commands::Inspect { collection, terms } => cmd_inspect(&collection, terms.as_deref()),
        Commands::Ls { collection } => cmd_ls(&collection),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Loads settings and the rule document of a collection.
fn load_collection(
    collection: &Path,
    config_path: Option<&Path>,
) -> Result<(Settings, Arc<IndexConfiguration>), String> {
    if !collection.is_dir() {
        return Err(format!("not a directory: {}", collection.display()));
    }
    let settings =
        Settings::load(&collection.join(SETTINGS_FILENAME)).map_err(|e| e.to_string())?;

    let xconf_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| collection.join(XCONF_FILENAME));
    let xconf_text = fs::read_to_string(&xconf_path)
        .map_err(|e| format!("cannot read {}: {e}", xconf_path.display()))?;
    let xconf_doc = parse_document(DocId(0), &xconf_path.display().to_string(), &xconf_text)
        .map_err(|e| e.to_string())?;
    let config = IndexConfiguration::parse(&xconf_doc.root).map_err(|e| e.to_string())?;
    Ok((settings, Arc::new(config)))
}

/// Opens the collection's index, rebuilding it when the stored
/// configuration hash no longer matches.
fn open_index(
    collection: &Path,
    settings: &Settings,
    config: &Arc<IndexConfiguration>,
) -> Result<SearchIndex, String> {
    let index_dir = index_directory(collection);
    if needs_rebuild(&index_dir, config, settings) && index_dir.exists() {
        return Err(format!(
            "index at {} was built from a different configuration; run `xtext index` to rebuild",
            index_dir.display()
        ));
    }
    SearchIndex::open(&index_dir, Arc::clone(config), settings).map_err(|e| e.to_string())
}

/// Parses one document file relative to its collection.
fn load_document(collection: &Path, path: &Path, id: u32) -> Result<Document, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let uri = path
        .strip_prefix(collection)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    parse_document(DocId(id), &uri, &content)
        .map_err(|e| format!("{}: {e}", path.display()))
}

/// `xtext index`: full rebuild of the collection index.
fn cmd_index(collection: &Path, config_path: Option<&Path>) -> Result<(), String> {
    let (settings, config) = load_collection(collection, config_path)?;

    // The schema is derived from the configuration, so a configuration
    // change always means a rebuild from scratch.
    let index_dir = index_directory(collection);
    if index_dir.exists() {
        fs::remove_dir_all(&index_dir).map_err(|e| e.to_string())?;
    }
    let index =
        SearchIndex::open(&index_dir, Arc::clone(&config), &settings).map_err(|e| e.to_string())?;

    let files = discover_documents(collection);
    let mut indexed = 0usize;
    let mut entries = 0usize;
    let mut failures: Vec<(PathBuf, String)> = Vec::new();

    for (position, file) in files.iter().enumerate() {
        let id = u32::try_from(position).unwrap_or(u32::MAX - 1) + 1;
        let outcome = load_document(collection, file, id).and_then(|doc| {
            let mut session = index.session(&doc, ReindexMode::Store);
            session.run().map_err(|e| e.to_string())?;
            Ok(session.into_report())
        });
        match outcome {
            Ok(report) => {
                indexed += 1;
                entries += report.entries_written;
                for (rule, reason) in &report.disabled_rules {
                    eprintln!("warning: rule #{} disabled: {reason}", rule.0);
                }
            }
            // A failed document is abandoned; the rest continue.
            Err(message) => failures.push((file.clone(), message)),
        }
    }

    index.commit_manager().commit().map_err(|e| e.to_string())?;
    write_config_hash(&index_dir, &compute_config_hash(&config, &settings))
        .map_err(|e| e.to_string())?;

    println!(
        "indexed {indexed} of {} documents, {entries} entries",
        files.len()
    );
    for (file, message) in &failures {
        eprintln!("skipped {}: {message}", file.display());
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(format!("{} document(s) failed", failures.len()))
    }
}

/// One search result row for JSON output.
#[derive(Serialize)]
struct MatchRow {
    /// Document URI relative to the collection.
    uri: String,
    /// Node id within the document.
    node: String,
    /// Qualified name of the matched node.
    name: String,
    /// Content key the entry was indexed under.
    key: String,
    /// Score, boost included.
    score: f32,
    /// Facet paths on the entry.
    facets: Vec<String>,
}

impl From<&NodeMatch> for MatchRow {
    fn from(m: &NodeMatch) -> Self {
        Self {
            uri: m.uri.clone(),
            node: m.node.node.to_string(),
            name: m.node.name.to_string(),
            key: m.key.clone(),
            score: m.score,
            facets: m.facets.clone(),
        }
    }
}

/// Builds the query description from CLI terms.
fn build_query(terms: &[String]) -> QueryNode {
    if terms.len() == 1 {
        return QueryNode::term(terms[0].clone());
    }
    QueryNode::bool_of(
        terms
            .iter()
            .map(|term| (Occur::Must, QueryNode::term(term.clone())))
            .collect(),
    )
}

/// `xtext search`: query and print matches.
fn cmd_search(
    collection: &Path,
    terms: &[String],
    names: &[String],
    field: Option<&str>,
    limit: usize,
    highlight: bool,
    json: bool,
) -> Result<(), String> {
    let (settings, config) = load_collection(collection, None)?;
    let index = open_index(collection, &settings, &config)?;

    let description = build_query(terms);
    let qnames: Vec<QName> = names.iter().map(|name| QName::parse(name)).collect();
    let options = QueryOptions::default();

    let mut matches = match field {
        Some(field_name) => index
            .query_field(field_name, &description, None, None, &options)
            .map_err(|e| e.to_string())?,
        None => index
            .query(&description, &qnames, None, None, &options)
            .map_err(|e| e.to_string())?,
    };
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(limit);

    if json {
        let rows: Vec<MatchRow> = matches.iter().map(MatchRow::from).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())?
        );
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["uri", "node", "name", "score"]);
    for m in &matches {
        table.add_row(vec![
            m.uri.clone(),
            m.node.node.to_string(),
            m.node.name.to_string(),
            format!("{:.3}", m.score),
        ]);
    }
    println!("{table}");

    if highlight {
        print_highlights(collection, &index, &description, &matches)?;
    }
    Ok(())
}

/// Re-parses matched documents and prints highlighted fragments.
fn print_highlights(
    collection: &Path,
    index: &SearchIndex,
    description: &QueryNode,
    matches: &[NodeMatch],
) -> Result<(), String> {
    let correlator = MatchCorrelator::new(index);
    let mut seen: HashSet<(u32, String)> = HashSet::new();
    for m in matches {
        if !seen.insert((m.node.doc.0, m.node.node.to_string())) {
            continue;
        }
        let doc = load_document(collection, &collection.join(&m.uri), m.node.doc.0)?;
        let interest = index
            .commit_manager()
            .with_searcher(|searcher| {
                QueryTranslator::new(index).collect_terms(searcher, description, &m.key)
            })
            .map_err(|e| e.to_string())?;
        let spans = correlator
            .correlate(&doc, m, &interest)
            .map_err(|e| e.to_string())?;
        let element = doc.element(&m.node.node).map_err(|e| e.to_string())?;
        println!("{}#{}: {}", m.uri, m.node.node, render_marked(element, &spans));
    }
    Ok(())
}

/// `xtext inspect`: index statistics and term listings.
fn cmd_inspect(collection: &Path, terms: Option<&str>) -> Result<(), String> {
    let (settings, config) = load_collection(collection, None)?;
    let index = open_index(collection, &settings, &config)?;

    println!(
        "entries: {}",
        index.num_entries().map_err(|e| e.to_string())?
    );
    println!("rules: {}", config.rules().len());

    let keys = index.defined_keys().map_err(|e| e.to_string())?;
    println!("keys: {}", keys.join(", "));

    if let Some(name) = terms {
        let counts = index
            .scan_terms(&[QName::parse(name)], None, None, 100)
            .map_err(|e| e.to_string())?;
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec!["term", "count"]);
        for count in counts {
            table.add_row(vec![count.term, count.count.to_string()]);
        }
        println!("{table}");
    }
    Ok(())
}

/// `xtext ls`: list the collection's documents.
fn cmd_ls(collection: &Path) -> Result<(), String> {
    if !collection.is_dir() {
        return Err(format!("not a directory: {}", collection.display()));
    }
    for file in discover_documents(collection) {
        let relative = file.strip_prefix(collection).unwrap_or(&file);
        println!("{}", relative.display());
    }
    Ok(())
}
