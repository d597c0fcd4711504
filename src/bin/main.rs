//! Registrar CLI - manage and compile report metadata
//!
//! Usage:
//!   registrar init
//!   registrar list [--category <category>]
//!   registrar validate <route>
//!   registrar compile <route> [--filter code=value ...]
//!   registrar lineage report <route>
//!   registrar lineage table <schema.table>
//!
//! Examples:
//!   registrar compile grad-rates --filter term=2024_fa
//!   registrar lineage table data.student_exit_status

use clap::{Parser, Subcommand};
use registrar::catalog;
use registrar::compile::compile_report;
use registrar::config::Settings;
use registrar::exec::Warehouse;
use registrar::lineage::LineageIndex;
use registrar::model::ReportId;
use registrar::store::MetadataStore;
use registrar::validation;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "registrar")]
#[command(about = "Registrar - metadata-driven query compiler for institutional reporting")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ./registrar.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the metadata store
    Init,

    /// List registered reports
    List {
        /// Only reports in this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Validate a report's active graph against the warehouse catalog
    Validate {
        /// Route slug of the report
        route: String,
    },

    /// Compile a report's active graph to SQL
    Compile {
        /// Route slug of the report
        route: String,

        /// Filter values as code=value pairs
        #[arg(short, long)]
        filter: Vec<String>,
    },

    /// Inspect report-to-table lineage
    Lineage {
        #[command(subcommand)]
        command: LineageCommands,
    },
}

#[derive(Subcommand)]
enum LineageCommands {
    /// Tables a report reads
    Report { route: String },

    /// Reports reading a table, given as schema.table
    Table { relation: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Init => cmd_init(&settings),
        Commands::List { category } => cmd_list(&settings, category),
        Commands::Validate { route } => cmd_validate(&settings, &route),
        Commands::Compile { route, filter } => cmd_compile(&settings, &route, &filter),
        Commands::Lineage { command } => cmd_lineage(&settings, command),
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, registrar::config::SettingsError> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
}

fn open_store(settings: &Settings) -> Result<MetadataStore, String> {
    let path = settings
        .store
        .expanded_path()
        .map_err(|e| e.to_string())?;
    MetadataStore::open(Path::new(&path)).map_err(|e| e.to_string())
}

fn open_warehouse(settings: &Settings) -> Result<Warehouse, String> {
    let path = settings
        .warehouse
        .expanded_path()
        .map_err(|e| e.to_string())?;
    let warehouse = if path == ":memory:" {
        Warehouse::open_in_memory().map_err(|e| e.to_string())?
    } else {
        Warehouse::open(Path::new(&path)).map_err(|e| e.to_string())?
    };
    let attach = settings
        .warehouse
        .expanded_attach()
        .map_err(|e| e.to_string())?;
    for (schema, db_path) in attach {
        warehouse
            .attach(Path::new(&db_path), &schema)
            .map_err(|e| e.to_string())?;
    }
    Ok(warehouse)
}

fn cmd_init(settings: &Settings) -> ExitCode {
    match open_store(settings) {
        Ok(_) => {
            println!("Initialized metadata store at {}", settings.store.path);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error initializing store: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_list(settings: &Settings, category: Option<String>) -> ExitCode {
    let store = match open_store(settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening store: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match store.list_reports(category.as_deref()) {
        Ok(reports) => {
            for report in reports {
                println!("{}\t{}\t{}", report.route, report.category, report.title);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error listing reports: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_validate(settings: &Settings, route: &str) -> ExitCode {
    let store = match open_store(settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening store: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let graph = match store
        .report_by_route(route)
        .and_then(|r| store.load_active_graph(&r.id))
    {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error loading graph: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let warehouse = match open_warehouse(settings) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error opening warehouse: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let snapshot = match catalog::introspect(warehouse.connection(), &settings.catalog.schemas) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error introspecting warehouse: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = validation::validate(&graph, &snapshot);
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error rendering report: {}", e);
            return ExitCode::FAILURE;
        }
    }
    if report.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn cmd_compile(settings: &Settings, route: &str, filters: &[String]) -> ExitCode {
    let mut filter_values = BTreeMap::new();
    for pair in filters {
        let Some((code, value)) = pair.split_once('=') else {
            eprintln!("Malformed filter '{}': expected code=value", pair);
            return ExitCode::FAILURE;
        };
        filter_values.insert(code.to_string(), value.to_string());
    }

    let store = match open_store(settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening store: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let report = match store.report_by_route(route) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error resolving report: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match compile_report(&store, &report.id, &filter_values) {
        Ok(compiled) => {
            println!("{}", compiled.text);
            println!();
            match serde_json::to_string(&compiled.params) {
                Ok(params) => println!("-- params: {}", params),
                Err(e) => {
                    eprintln!("Error rendering params: {}", e);
                    return ExitCode::FAILURE;
                }
            }
            println!("-- version: {}", compiled.content_version);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_lineage(settings: &Settings, command: LineageCommands) -> ExitCode {
    let store = match open_store(settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening store: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let index = match LineageIndex::build(&store) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error building lineage index: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match command {
        LineageCommands::Report { route } => {
            let id: ReportId = match store.report_by_route(&route) {
                Ok(r) => r.id,
                Err(e) => {
                    eprintln!("Error resolving report: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            for used in index.tables_used_by(&id) {
                println!("{}.{}\t{}\t{}", used.schema, used.table, used.alias, used.kind.as_str());
            }
            ExitCode::SUCCESS
        }
        LineageCommands::Table { relation } => {
            let Some((schema, table)) = relation.split_once('.') else {
                eprintln!("Malformed relation '{}': expected schema.table", relation);
                return ExitCode::FAILURE;
            };
            for report in index.reports_using(schema, table) {
                println!("{}\t{}", report.route, report.title);
            }
            ExitCode::SUCCESS
        }
    }
}
