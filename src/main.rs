use std::{path::PathBuf, process, sync::Arc};

use cdr_archive::{
    ArchiveOptions, Archiver, ArchiverConfig, SchemaReconciler, Store, observability, store,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// CLI arguments for the CDR archiver
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Move cold call-detail records into the archive database",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "cdr-archive.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Archive every configured root table and its associated tables
    Run {
        /// Row selection for a root table, overriding the configured one.
        /// May be repeated.
        #[arg(short, long = "predicate", value_name = "TABLE=EXPR", value_parser = parse_predicate)]
        predicates: Vec<(String, String)>,
    },
    /// Bring archive table structures in line with the live database
    Reconcile {
        /// Tables to reconcile (defaults to every configured table)
        tables: Vec<String>,
        /// Print the statements instead of executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_predicate(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((table, predicate)) if !table.trim().is_empty() && !predicate.trim().is_empty() => {
            Ok((table.trim().to_string(), predicate.to_string()))
        }
        _ => Err(format!("expected TABLE=EXPR, got '{arg}'")),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Command::Schema { output } = &args.command {
        #[cfg(feature = "json-schema")]
        run_schema_export(output.as_ref());
        #[cfg(not(feature = "json-schema"))]
        {
            let _ = output;
            eprintln!("Error: JSON schema export requires the 'json-schema' feature");
            process::exit(1);
        }
        return;
    }

    let config = match ArchiverConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    let (live, archive) = match connect_stores(&config).await {
        Ok(stores) => stores,
        Err(e) => {
            tracing::error!(error = %e, "Unable to connect to database");
            process::exit(1);
        }
    };

    match args.command {
        Command::Run { predicates } => run_archive(&config, live, archive, predicates).await,
        Command::Reconcile { tables, dry_run } => {
            run_reconcile(&config, live, archive, tables, dry_run).await
        }
        Command::Schema { .. } => {}
    }
}

async fn connect_stores(
    config: &ArchiverConfig,
) -> Result<(Arc<dyn Store>, Arc<dyn Store>), store::StoreError> {
    let live = store::connect(&config.live).await?;
    tracing::info!(store = config.live.kind(), "Connected to live database");
    let archive = store::connect(&config.archive).await?;
    tracing::info!(store = config.archive.kind(), "Connected to archive database");
    Ok((live, archive))
}

async fn run_archive(
    config: &ArchiverConfig,
    live: Arc<dyn Store>,
    archive: Arc<dyn Store>,
    predicates: Vec<(String, String)>,
) {
    let catalog = match config.catalog() {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let tables = match catalog.with_predicates(predicates) {
        Ok(tables) => tables,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let archiver = Archiver::new(live, archive, catalog, ArchiveOptions::from(&config.run))
        .with_cancellation(cancel);

    match archiver.archive_all(&tables).await {
        Ok(records) => {
            println!("{records} records archived");
        }
        Err(failure) => {
            eprintln!("Error: {failure}");
            process::exit(1);
        }
    }
}

async fn run_reconcile(
    config: &ArchiverConfig,
    live: Arc<dyn Store>,
    archive: Arc<dyn Store>,
    tables: Vec<String>,
    dry_run: bool,
) {
    let reconciler = SchemaReconciler::new(live, archive).with_engine(config.run.engine.clone());
    let tables = if tables.is_empty() {
        match config.catalog() {
            Ok(catalog) => catalog
                .table_names()
                .into_iter()
                .map(String::from)
                .collect(),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    } else {
        tables
    };

    let mut failed = false;
    for table in &tables {
        let result = if dry_run {
            match reconciler.plan(table).await {
                Ok(plan) => reconciler.statements(&plan),
                Err(e) => Err(e),
            }
        } else {
            match reconciler.reconcile(table).await {
                Ok(plan) => reconciler.statements(&plan),
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(statements) if statements.is_empty() => println!("-- {table}: up to date"),
            Ok(statements) => {
                for statement in statements {
                    println!("{};", statement.to_literal_sql());
                }
            }
            Err(e) => {
                tracing::error!(table = %table, error = %e, "Unable to update table structure");
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("Interrupt received, stopping after the current record");
            cancel.cancel();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Unable to listen for Ctrl+C");
        }
    }
}

/// Export config JSON schema to file or stdout
#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<&PathBuf>) {
    let content = match ArchiverConfig::json_schema_string() {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error: failed to serialize schema: {e}");
            process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &content) {
                eprintln!("Error: failed to write to {}: {e}", path.display());
                process::exit(1);
            }
            eprintln!("Config JSON schema written to {}", path.display());
        }
        None => {
            println!("{}", content);
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_run_predicates() {
        let args = Args::parse_from([
            "cdr-archive",
            "--config",
            "/etc/cdr-archive.toml",
            "run",
            "--predicate",
            "cdr=`cd_bnum` = '1300989659'",
            "-p",
            "cdr_sms=cs_from = 'x' OR cs_to = 'x'",
        ]);
        assert_eq!(args.config, PathBuf::from("/etc/cdr-archive.toml"));
        let Command::Run { predicates } = args.command else {
            panic!("expected run command");
        };
        assert_eq!(
            predicates,
            [
                ("cdr".to_string(), "`cd_bnum` = '1300989659'".to_string()),
                ("cdr_sms".to_string(), "cs_from = 'x' OR cs_to = 'x'".to_string()),
            ]
        );
    }

    #[test]
    fn test_predicate_requires_table() {
        assert_eq!(
            parse_predicate("cdr=cd_id = 1").unwrap(),
            ("cdr".to_string(), "cd_id = 1".to_string())
        );
        assert!(parse_predicate("=cd_id").is_err());
        assert!(parse_predicate("cdr").is_err());
        assert!(parse_predicate("cdr=").is_err());
    }

    #[test]
    fn test_parse_reconcile() {
        let args = Args::parse_from(["cdr-archive", "reconcile", "cdr", "cdr_notes", "--dry-run"]);
        let Command::Reconcile { tables, dry_run } = args.command else {
            panic!("expected reconcile command");
        };
        assert_eq!(tables, ["cdr", "cdr_notes"]);
        assert!(dry_run);
        assert_eq!(args.config, PathBuf::from("cdr-archive.toml"));
    }
}
