//! sift — search-box filtering from the terminal
//!
//! # Usage
//!
//! ```bash
//! # Show how text tokenizes
//! sift tokens 'red "light blue" [color]'
//!
//! # Compile text against a schema and show the SQL
//! sift explain 'red [color]' --schema animals.toml
//!
//! # Type searches line by line against a database
//! sift search --schema animals.toml --database-url sqlite://zoo.db
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde::Deserialize;
use sift::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sift")]
#[command(version)]
#[command(about = "🔎 Incremental search-box filtering over SQL stores", long_about = None)]
#[command(after_help = "EXAMPLES:
    sift tokens 'red \"light blue\" [color]'
    sift explain 'red [color]' --schema animals.toml --mode filter
    sift explain 'red [color]' --schema animals.toml --json
    sift search --schema animals.toml --database-url sqlite://zoo.db")]
struct Cli {
    /// Configuration file (default: <config dir>/sift/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the token stream for some search text
    Tokens {
        /// The search text
        text: String,
    },
    /// Compile search text against a schema and show the SQL
    Explain {
        /// The search text
        text: String,

        /// Schema file describing the indexed fields
        #[arg(short, long)]
        schema: PathBuf,

        /// Compile as a broad query or as a filter
        #[arg(short, long, value_enum, default_value = "query")]
        mode: ModeArg,

        /// SQL dialect
        #[arg(short, long, value_enum, default_value = "sqlite")]
        dialect: DialectArg,

        /// Print the compiled query and SQL as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read search text line by line and run it against a database
    Search {
        /// Schema file describing the indexed fields
        #[arg(short, long)]
        schema: PathBuf,

        /// Database connection URL
        #[arg(long, env = "SIFT_DATABASE_URL")]
        database_url: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Query,
    Filter,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Query => SearchMode::Query,
            ModeArg::Filter => SearchMode::Filter,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Sqlite,
    Postgres,
}

impl From<DialectArg> for Dialect {
    fn from(dialect: DialectArg) -> Self {
        match dialect {
            DialectArg::Sqlite => Dialect::Sqlite,
            DialectArg::Postgres => Dialect::Postgres,
        }
    }
}

/// Declarative stand-in for field attributes.
#[derive(Deserialize)]
struct SchemaFile {
    name: Option<String>,
    table: Option<String>,
    key_column: Option<String>,
    #[serde(default)]
    fields: Vec<SchemaField>,
}

#[derive(Deserialize)]
struct SchemaField {
    name: String,
    column: Option<String>,
    #[serde(default)]
    modes: Vec<String>,
    #[serde(default)]
    persistence: PersistenceMode,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sift=debug" } else { "sift=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    let config = SiftConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Tokens { text } => {
            show_tokens(text);
            Ok(())
        }
        Commands::Explain {
            text,
            schema,
            mode,
            dialect,
            json,
        } => {
            let index = load_schema(schema, &config)?;
            if *json {
                explain_json(text, &index, (*mode).into(), (*dialect).into())
            } else {
                explain(text, &index, (*mode).into(), (*dialect).into());
                Ok(())
            }
        }
        Commands::Search {
            schema,
            database_url,
        } => {
            let index = load_schema(schema, &config)?;
            let url = database_url
                .clone()
                .or_else(|| config.store.url.clone())
                .context("no database URL; use --database-url, SIFT_DATABASE_URL or the config file")?;
            search(Arc::new(index), &url, &config, cli.verbose).await
        }
    }
}

fn load_schema(path: &Path, config: &SiftConfig) -> Result<EntityTypeIndex> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    let schema: SchemaFile =
        toml::from_str(&text).with_context(|| format!("parsing schema {}", path.display()))?;

    let mut fields = Vec::with_capacity(schema.fields.len());
    for field in schema.fields {
        let mut modes = IndexingMode::empty();
        for name in &field.modes {
            match name.parse::<IndexingMode>() {
                Ok(mode) => modes |= mode,
                Err(e) => bail!("field '{}': {}", field.name, e),
            }
        }
        let mut spec = FieldIndexSpec::new(field.name, modes, field.persistence);
        if let Some(column) = field.column {
            spec = spec.column(column);
        }
        fields.push(spec);
    }

    let table = schema.table.unwrap_or_else(|| config.store.table.clone());
    let key_column = schema
        .key_column
        .unwrap_or_else(|| config.store.key_column.clone());
    let name = schema.name.unwrap_or_else(|| table.clone());
    Ok(EntityTypeIndex::build(name, table, key_column, fields)?)
}

fn show_tokens(text: &str) {
    let tokens = sift::tokenize(text);
    if tokens.is_empty() {
        println!("{}", "(no tokens)".dimmed());
        return;
    }
    for (i, token) in tokens.iter().enumerate() {
        let kind = if token.bracketed {
            "tag".magenta()
        } else if token.quoted {
            "phrase".cyan()
        } else {
            "word".white()
        };
        println!("{:>3}  {:8} {}", i + 1, kind, token.text.yellow());
    }
}

fn explain(text: &str, index: &EntityTypeIndex, mode: SearchMode, dialect: Dialect) {
    println!("{}", "🔎 sift Query Explanation".cyan().bold());
    println!();
    println!("{} {}", "Input:".dimmed(), text.yellow());
    println!("{} {} ({})", "Mode:".dimmed(), mode.to_string().cyan(), dialect);
    println!();

    let compiled = compile_text(text, index, mode);

    println!("{}", "Tokens:".green().bold());
    for token in &compiled.tokens {
        println!("  • {}", token.to_string().white());
    }
    println!();
    println!("{}", "Expression:".green().bold());
    println!("  {}", compiled.expression.to_string().white());

    if !compiled.diagnostics.is_empty() {
        println!();
        println!("{}", "Diagnostics:".yellow().bold());
        for diagnostic in &compiled.diagnostics {
            println!("  ⚠ {}", diagnostic);
        }
    }

    let fragment = compiled.to_sql(dialect);
    println!();
    println!("{}", "Generated SQL:".green().bold());
    println!("  {}", fragment.sql.white());
    if !fragment.params.is_empty() {
        println!();
        println!("{}", "Bindings:".cyan());
        for (i, param) in fragment.params.iter().enumerate() {
            println!("  {:>2}: {}", i + 1, param.yellow());
        }
    }
}

fn explain_json(text: &str, index: &EntityTypeIndex, mode: SearchMode, dialect: Dialect) -> Result<()> {
    let compiled = compile_text(text, index, mode);
    let fragment = compiled.to_sql(dialect);
    let output = serde_json::json!({
        "dialect": dialect,
        "compiled": compiled,
        "sql": fragment,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn search(index: Arc<EntityTypeIndex>, url: &str, config: &SiftConfig, verbose: bool) -> Result<()> {
    let store = SqlStore::connect(url, index.table(), index.key_column()).await?;
    let mut session = FilterSession::new(index, Arc::new(store), config.session());
    let mut events = session.subscribe();

    println!("{}", "🔎 sift — type a search, one line per keystroke batch".cyan().bold());
    println!("{}", "Commands: :clear  :clear!  :quit".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            ":quit" | ":q" => break,
            ":clear" => session.clear(false),
            ":clear!" => session.clear(true),
            _ => {
                session.set_input_text(line.clone());
                session.commit();
                session.run_until_idle().await;
            }
        }

        if verbose {
            drain_events(&mut events);
        }
        print_state(&session);
    }

    Ok(())
}

fn drain_events(events: &mut broadcast::Receiver<SessionEvent>) {
    loop {
        match events.try_recv() {
            Ok(event) => println!("  {} {:?}", "event".dimmed(), event),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                println!("  {} {} events skipped", "event".dimmed(), n);
            }
            Err(_) => break,
        }
    }
}

fn print_state(session: &FilterSession) {
    println!(
        "{} {:?} / {:?}",
        "state".dimmed(),
        session.filtering_state(),
        session.search_entry_state()
    );
    for diagnostic in session.diagnostics() {
        println!("  {} {}", "⚠".yellow(), diagnostic);
    }
    if let Some(error) = session.last_error() {
        println!("  {} {}", "✗".red(), error);
    }

    let results = session.results();
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }
    let ids: Vec<String> = results.iter().map(|id| id.to_string()).collect();
    println!("{}", ids.join(" "));
    println!("{} row(s)", results.len().to_string().cyan());
}
