use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use text2sql::bootstrap::build_registry;
use text2sql::schema_knowledge::{DdlParser, SchemaKnowledge};
use text2sql::sql_scan::DialectLexer;
use text2sql::validation::PostValidator;
use text2sql::vector_store::InMemoryVectorStore;
use text2sql::{Dialect, ServiceConfig, SqlGeneration, TrainingRequest};
use tracing::info;

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(about = "Validated natural-language to SQL gateway")]
struct Args {
    /// Tenant to act for (default service when omitted)
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Dialect override: clickhouse, mysql or postgresql
    #[arg(long, global = true)]
    dialect: Option<Dialect>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate SQL for a question and run it
    Ask { question: String },
    /// Generate and validate SQL without running it
    Sql { question: String },
    /// Run SQL as given
    Execute { sql: String },
    /// Store training material
    Train {
        #[arg(long)]
        ddl_file: Vec<PathBuf>,
        #[arg(long)]
        doc_file: Vec<PathBuf>,
        #[arg(long)]
        question: Vec<String>,
        #[arg(long)]
        sql: Vec<String>,
        /// Describe the live database and store one record per table
        #[arg(long)]
        from_schema: bool,
    },
    /// List stored training records
    TrainingData,
    /// Remove a training record by id
    Remove { id: String },
    /// Check SQL against the tables and columns of a DDL file, offline
    CheckSql {
        #[arg(long)]
        ddl_file: PathBuf,
        sql: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    text2sql::init_tracing();

    let args = Args::parse();

    if let Command::CheckSql { ddl_file, sql } = &args.command {
        return check_sql(args.dialect.unwrap_or_default(), ddl_file, sql);
    }

    let config = ServiceConfig::from_env()?;
    let registry = build_registry(&config)?;
    let service = registry.get_service(args.tenant.as_deref())?;
    info!("Using {} dialect", args.dialect.unwrap_or(config.dialect));

    match args.command {
        Command::Ask { question } => {
            let answer = service.ask(&question, args.dialect).await;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::Sql { question } => match service.generate_sql(&question, args.dialect).await {
            SqlGeneration::Generated { sql, warnings } => {
                println!("{}", sql);
                for warning in warnings {
                    eprintln!("warning: {}", warning);
                }
            }
            other => println!("{}", serde_json::to_string_pretty(&other)?),
        },
        Command::Execute { sql } => {
            let result = service.execute(&sql).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Train {
            ddl_file,
            doc_file,
            question,
            sql,
            from_schema,
        } => {
            if from_schema {
                let results = service.train_from_information_schema().await?;
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            let request = TrainingRequest {
                ddl: read_joined(&ddl_file)?,
                documentation: read_joined(&doc_file)?,
                question: (!question.is_empty()).then_some(question),
                sql: (!sql.is_empty()).then_some(sql),
            };
            let nothing_else = request.ddl.is_none()
                && request.documentation.is_none()
                && request.question.is_none()
                && request.sql.is_none();
            if !(from_schema && nothing_else) {
                let results = service.train(request).await?;
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
        }
        Command::TrainingData => {
            let records = service.training_data().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Remove { id } => {
            service.remove_training_data(&id).await?;
            println!("Removed {}", id);
        }
        Command::CheckSql { .. } => {}
    }

    Ok(())
}

fn read_joined(paths: &[PathBuf]) -> Result<Option<String>> {
    if paths.is_empty() {
        return Ok(None);
    }
    let parts = paths
        .iter()
        .map(|p| std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(parts.join("\n")))
}

fn check_sql(dialect: Dialect, ddl_file: &Path, sql: &str) -> Result<()> {
    let ddl = std::fs::read_to_string(ddl_file)
        .with_context(|| format!("reading {}", ddl_file.display()))?;
    let schema = DdlParser::for_dialect(dialect)?.parse(&ddl);
    info!(
        "Loaded {} tables and {} columns from {}",
        schema.tables.len(),
        schema.columns.len(),
        ddl_file.display()
    );

    let knowledge = SchemaKnowledge::new(Arc::new(InMemoryVectorStore::with_hashing(64)), dialect)?;
    let validator = PostValidator::new(Arc::new(knowledge), Arc::new(DialectLexer::new(dialect)));
    let outcome = validator.validate_against(sql, &schema);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.valid {
        std::process::exit(1);
    }
    Ok(())
}
