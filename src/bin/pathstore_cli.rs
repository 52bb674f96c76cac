use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use pathstore::adapter::{Adapter, DocumentStore, RelationalStore, SaveOptions, SaveOutcome};
use pathstore::config::{ConfigError, EngineConfig};
use pathstore::query::{Condition, Extend, SelectOptions};
use pathstore::schema::{ModelFile, SchemaRegistry};
use pathstore::{bootstrap, PathStoreError, PathStoreResult, Record, UpdateMode};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file without its `.toml` extension
    #[arg(short, long, default_value = "config/pathstore")]
    config: PathBuf,

    /// Read `<config>.<ENV>.toml` when the ENV variable is set
    #[arg(long)]
    with_env: bool,

    /// JSON model definition file
    #[arg(short, long, default_value = "config/models.json")]
    models: PathBuf,

    /// Storage backend to run against
    #[arg(short, long, value_enum, default_value = "document")]
    backend: Backend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    /// Embedded sled document store
    Document,
    /// SQLite relational store
    Relational,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate one schema, or every schema
    Sync {
        schema: Option<String>,
    },
    /// Import a `{ "data": [...] }` fixture file
    Dump {
        schema: String,
        fixture: PathBuf,
    },
    /// Print the records matching a condition
    Select {
        schema: String,
        /// Condition object as JSON
        #[arg(long)]
        condition: Option<String>,
        /// Comma-separated columns to return
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
        /// Populate relation fields; all of them unless names are given
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        extend: Option<Vec<String>>,
    },
    /// Create a record, or update the records matching a condition
    Save {
        schema: String,
        /// Record or patch as JSON
        values: String,
        #[arg(long)]
        condition: Option<String>,
        /// cover, append, delete or merge
        #[arg(long, default_value = "cover")]
        mode: String,
    },
    /// Count the records matching a condition
    Count {
        schema: String,
        #[arg(long)]
        condition: Option<String>,
    },
    /// Largest value of a field among the matching records
    Max {
        schema: String,
        field: String,
        #[arg(long)]
        condition: Option<String>,
    },
    /// Delete the records matching a condition
    Remove {
        schema: String,
        #[arg(long)]
        condition: Option<String>,
    },
    /// Run the configured startup sync and fixture imports
    Bootstrap {},
}

fn load_config(cli: &Cli) -> PathStoreResult<EngineConfig> {
    match EngineConfig::load(&cli.config, cli.with_env) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(path)) => {
            warn!("Config file {} not found, using defaults", path);
            let mut config = EngineConfig::default();
            config.apply_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

fn load_registry(path: &PathBuf) -> PathStoreResult<SchemaRegistry> {
    let text = std::fs::read_to_string(path)?;
    let file = ModelFile::from_json(&text)?;
    Ok(SchemaRegistry::builder().define_file(file).build()?)
}

fn parse_condition(raw: Option<&str>) -> PathStoreResult<Option<Condition>> {
    match raw {
        None => Ok(None),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw)?;
            Condition::from_value(value)
                .map(Some)
                .ok_or_else(|| PathStoreError::invalid_input("a condition must be a JSON object"))
        }
    }
}

fn parse_record(raw: &str) -> PathStoreResult<Record> {
    match serde_json::from_str(raw)? {
        Value::Object(record) => Ok(record),
        _ => Err(PathStoreError::invalid_input("values must be a JSON object")),
    }
}

fn print_json(value: &Value) -> PathStoreResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_sync(store: &dyn Adapter, schema: Option<String>) -> PathStoreResult<()> {
    let targets: Vec<String> = match schema {
        Some(schema) => vec![schema],
        None => store.registry().names().map(str::to_string).collect(),
    };
    for schema in &targets {
        store.sync(schema).await?;
    }
    print_json(&json!({ "synced": targets }))
}

async fn handle_select(
    store: &dyn Adapter,
    schema: String,
    condition: Option<String>,
    columns: Option<Vec<String>>,
    extend: Option<Vec<String>>,
) -> PathStoreResult<()> {
    let condition = parse_condition(condition.as_deref())?;
    let extend = match extend {
        None => Extend::None,
        Some(fields) if fields.is_empty() => Extend::All,
        Some(fields) => Extend::Fields(fields),
    };
    let options = SelectOptions {
        select_columns: columns,
        extend,
    };
    info!("Selecting from '{}'", schema);
    let found = store.select(&schema, condition.as_ref(), &options).await?;
    print_json(&found.to_value())
}

async fn handle_save(
    store: &dyn Adapter,
    schema: String,
    values: String,
    condition: Option<String>,
    mode: String,
) -> PathStoreResult<()> {
    let values = parse_record(&values)?;
    let condition = parse_condition(condition.as_deref())?;
    let options = SaveOptions::with_mode(UpdateMode::from_name(&mode));

    let output = match store.save(&schema, values, condition.as_ref(), &options).await? {
        SaveOutcome::Created(record) => json!({ "created": record }),
        SaveOutcome::Updated(record) => json!({ "updated": record }),
        SaveOutcome::Batch(outcome) => {
            for (id, error) in &outcome.failed {
                warn!("Failed to update '{}' {}: {}", schema, id, error);
            }
            json!({
                "updated": outcome.updated,
                "failed": outcome.failed.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>(),
            })
        }
    };
    print_json(&output)
}

async fn run(cli: Cli) -> PathStoreResult<()> {
    let config = load_config(&cli)?;
    let registry = Arc::new(load_registry(&cli.models)?);

    let store: Box<dyn Adapter> = match cli.backend {
        Backend::Document => Box::new(DocumentStore::new(config.document.clone(), registry)),
        Backend::Relational => Box::new(RelationalStore::new(config.relational.clone(), registry)),
    };
    store.connect().await?;

    match cli.command {
        Commands::Sync { schema } => handle_sync(store.as_ref(), schema).await?,
        Commands::Dump { schema, fixture } => {
            let inserted = store.dump(&schema, &fixture).await?;
            print_json(&json!({ "inserted": inserted }))?;
        }
        Commands::Select {
            schema,
            condition,
            columns,
            extend,
        } => handle_select(store.as_ref(), schema, condition, columns, extend).await?,
        Commands::Save {
            schema,
            values,
            condition,
            mode,
        } => handle_save(store.as_ref(), schema, values, condition, mode).await?,
        Commands::Count { schema, condition } => {
            let condition = parse_condition(condition.as_deref())?;
            let total = store.count(&schema, condition.as_ref()).await?;
            print_json(&json!({ "count": total }))?;
        }
        Commands::Max {
            schema,
            field,
            condition,
        } => {
            let condition = parse_condition(condition.as_deref())?;
            let best = store.max(&schema, &field, condition.as_ref()).await?;
            print_json(&json!({ "max": best }))?;
        }
        Commands::Remove { schema, condition } => {
            let condition = parse_condition(condition.as_deref())?;
            let removed = store.remove(&schema, condition.as_ref()).await?;
            print_json(&json!({ "removed": removed }))?;
        }
        Commands::Bootstrap {} => {
            let report = bootstrap::prepare(store.as_ref(), &config.bootstrap).await?;
            print_json(&json!({
                "synced": report.synced,
                "imported": report.imported,
            }))?;
        }
    }

    store.disconnect().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    run(cli).await?;
    Ok(())
}
