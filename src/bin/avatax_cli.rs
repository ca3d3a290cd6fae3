use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use stateset_avatax::{
    avatax::{AvaTaxClient, TaxTransport},
    config::{self, AvalaraConfig},
    db,
    entities::{LogType, TaxTransactionLogModel},
    models::{Address, CalculateTaxRequest},
    services::{build_provider, LogSearch, TransactionLogService},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Ping => handle_ping(&context, cli.json).await?,
        Commands::Rate(args) => handle_rate(&context, args, cli.json).await?,
        Commands::ValidateAddress(args) => handle_validate_address(&context, args, cli.json).await?,
        Commands::EntityUseCodes => handle_entity_use_codes(&context, cli.json).await?,
        Commands::Companies { all } => handle_companies(&context, all, cli.json).await?,
        Commands::TaxCodeTypes => handle_tax_code_types(&context, cli.json).await?,
        Commands::TaxCodes { all } => handle_tax_codes(&context, all, cli.json).await?,
        Commands::Transaction(command) => handle_transaction_command(&context, command, cli.json).await?,
        Commands::Log(command) => handle_log_command(&context, command, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "avatax", about = "AvaTax adapter administration", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check credentials and connectivity
    Ping,
    /// Look up the tax rate for an address
    Rate(RateArgs),
    /// Resolve an address with the provider
    ValidateAddress(AddressArgs),
    /// List the provider's entity use codes
    EntityUseCodes,
    /// List the companies of the account
    Companies {
        #[arg(long, action = ArgAction::SetTrue, help = "Include inactive companies")]
        all: bool,
    },
    TaxCodeTypes,
    /// List the provider's system tax codes
    TaxCodes {
        #[arg(long, action = ArgAction::SetTrue, help = "Include inactive tax codes")]
        all: bool,
    },
    #[command(subcommand)]
    Transaction(TransactionCommands),
    #[command(subcommand)]
    Log(LogCommands),
}

#[derive(Args)]
struct AddressArgs {
    #[arg(long)]
    line1: String,
    #[arg(long)]
    line2: Option<String>,
    #[arg(long)]
    city: String,
    #[arg(long, help = "State or province code")]
    region: String,
    #[arg(long, help = "Two-letter ISO country code")]
    country: String,
    #[arg(long)]
    postal_code: String,
}

impl AddressArgs {
    fn into_address(self) -> Address {
        let address = Address::new(self.line1, self.city, self.region, self.country, self.postal_code);
        match self.line2 {
            Some(line2) => address.with_line2(line2),
            None => address,
        }
    }
}

#[derive(Args)]
struct RateArgs {
    #[command(flatten)]
    address: AddressArgs,
    #[arg(long, default_value_t = 0)]
    store_id: i64,
    #[arg(long, help = "Tax code of the tax category")]
    tax_code: Option<String>,
}

#[derive(Subcommand)]
enum TransactionCommands {
    /// Show a recorded transaction by document code
    Get {
        code: String,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// List log records, newest first
    List(LogListArgs),
    Show {
        id: i32,
    },
    Delete {
        id: i32,
    },
    /// Remove every log record
    Clear {
        #[arg(long, action = ArgAction::SetTrue, help = "Confirm removal of all records")]
        yes: bool,
    },
}

#[derive(Args)]
struct LogListArgs {
    #[arg(long)]
    customer_id: Option<i64>,
    #[arg(long, help = "Error, Create, CreateResponse, Void, VoidResponse, Refund or RefundResponse")]
    log_type: Option<LogType>,
    #[arg(long, help = "Only records created at or after this RFC 3339 time")]
    from: Option<DateTime<Utc>>,
    #[arg(long, help = "Only records created at or before this RFC 3339 time")]
    to: Option<DateTime<Utc>>,
    #[arg(long, default_value_t = 0, help = "Zero-based page index")]
    page: u64,
    #[arg(long, default_value_t = 25)]
    page_size: u64,
}

impl LogListArgs {
    fn into_search(self) -> LogSearch {
        LogSearch {
            customer_id: self.customer_id,
            log_type: self.log_type,
            created_from: self.from,
            created_to: self.to,
            page_index: self.page,
            page_size: self.page_size,
        }
    }
}

struct CliContext {
    config: AvalaraConfig,
    db: Arc<DatabaseConnection>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load AvaTax config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::connect_and_migrate(&config.database_url)
            .await
            .context("failed to open the transaction log database")?;

        Ok(Self {
            config,
            db: Arc::new(db_pool),
        })
    }

    fn client(&self) -> Result<AvaTaxClient> {
        AvaTaxClient::new(&self.config).context("AvaTax client unavailable")
    }

    fn log_service(&self) -> TransactionLogService {
        TransactionLogService::new(self.db.clone())
    }
}

async fn handle_ping(context: &CliContext, json: bool) -> Result<()> {
    let status = context.client()?.ping().await.context("ping failed")?;

    if json {
        print_json(&status)?;
    } else if status.authenticated {
        println!(
            "Connected to AvaTax {} as account {}",
            status.version.as_deref().unwrap_or("(unknown version)"),
            status
                .authenticated_account_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "(unknown)".to_string())
        );
    } else {
        println!("AvaTax reachable but the credentials were not accepted");
    }

    Ok(())
}

async fn handle_rate(context: &CliContext, args: RateArgs, json: bool) -> Result<()> {
    let provider = build_provider(context.config.clone(), context.db.clone())
        .context("tax provider unavailable")?;

    let request = CalculateTaxRequest {
        address: Some(args.address.into_address()),
        tax_code: args.tax_code,
        store_id: args.store_id,
        ..Default::default()
    };
    let result = provider.get_rate(&request).await;

    if json {
        print_json(&result)?;
        return Ok(());
    }

    match result.rate {
        Some(rate) => println!("Tax rate: {}%", rate.normalize()),
        None => {
            for error in &result.errors {
                eprintln!("- {}", error);
            }
            return Err(anyhow!("rate lookup failed"));
        }
    }

    Ok(())
}

async fn handle_validate_address(context: &CliContext, args: AddressArgs, json: bool) -> Result<()> {
    let validation = context
        .client()?
        .resolve_address(&args.into_address())
        .await
        .context("address resolution failed")?;

    if json {
        print_json(&validation)?;
        return Ok(());
    }

    if let Some(address) = &validation.validated {
        render_address(address);
    }
    for message in &validation.messages {
        println!("  ! {}", message);
    }
    if !validation.is_valid() {
        return Err(anyhow!("address could not be validated"));
    }

    Ok(())
}

async fn handle_entity_use_codes(context: &CliContext, json: bool) -> Result<()> {
    let codes = context
        .client()?
        .list_entity_use_codes()
        .await
        .context("failed to list entity use codes")?;

    if json {
        print_json(&codes)?;
    } else {
        for code in &codes {
            println!("- {} • {}", code.code, code.name);
        }
    }

    Ok(())
}

async fn handle_companies(context: &CliContext, all: bool, json: bool) -> Result<()> {
    let companies = context
        .client()?
        .list_companies(!all)
        .await
        .context("failed to list companies")?;

    if json {
        print_json(&companies)?;
    } else {
        for company in &companies {
            println!(
                "- {} • {}{}",
                company.company_code,
                company.name,
                if company.is_default { " (default)" } else { "" }
            );
        }
    }

    Ok(())
}

async fn handle_tax_code_types(context: &CliContext, json: bool) -> Result<()> {
    let types = context
        .client()?
        .list_tax_code_types()
        .await
        .context("failed to list tax code types")?;

    if json {
        print_json(&types)?;
    } else {
        for (id, name) in &types {
            println!("- {} • {}", id, name);
        }
    }

    Ok(())
}

async fn handle_tax_codes(context: &CliContext, all: bool, json: bool) -> Result<()> {
    let codes = context
        .client()?
        .list_tax_codes(!all)
        .await
        .context("failed to list tax codes")?;

    if json {
        print_json(&codes)?;
    } else {
        for code in &codes {
            println!(
                "- {} • {} • {}",
                code.tax_code,
                code.tax_code_type_id.as_deref().unwrap_or("-"),
                code.description.as_deref().unwrap_or("")
            );
        }
    }

    Ok(())
}

async fn handle_transaction_command(
    context: &CliContext,
    command: TransactionCommands,
    json: bool,
) -> Result<()> {
    match command {
        TransactionCommands::Get { code } => {
            let result = context
                .client()?
                .get_transaction(&code)
                .await
                .with_context(|| format!("failed to fetch transaction {}", code))?;

            if json {
                print_json(&result)?;
            } else {
                println!(
                    "Transaction {} • {} • taxable {} • tax {}",
                    result.document_code.as_deref().unwrap_or(&code),
                    result.result_code,
                    result.total_taxable,
                    result.total_tax
                );
                for line in &result.lines {
                    println!("  • line {} taxable {} tax {}", line.line_number, line.taxable_amount, line.tax);
                }
                for message in &result.messages {
                    println!("  ! {}", message);
                }
            }
        }
    }

    Ok(())
}

async fn handle_log_command(context: &CliContext, command: LogCommands, json: bool) -> Result<()> {
    let service = context.log_service();

    match command {
        LogCommands::List(args) => {
            let search = args.into_search();
            let page = service.search(&search).await.context("failed to search the log")?;

            if json {
                print_json(&page)?;
            } else {
                println!(
                    "Page {} ({} of {} records)",
                    page.page_index,
                    page.records.len(),
                    page.total
                );
                for record in &page.records {
                    render_log_record(record);
                }
            }
        }
        LogCommands::Show { id } => {
            let record = service
                .find_by_id(id)
                .await
                .context("failed to load log record")?
                .ok_or_else(|| anyhow!("log record {} not found", id))?;

            if json {
                print_json(&record)?;
            } else {
                render_log_record(&record);
                println!("{}", record.message);
            }
        }
        LogCommands::Delete { id } => {
            if !service.delete(id).await.context("failed to delete log record")? {
                return Err(anyhow!("log record {} not found", id));
            }
            println!("Deleted log record {}", id);
        }
        LogCommands::Clear { yes } => {
            if !yes {
                return Err(anyhow!("refusing to clear the log without --yes"));
            }
            let deleted = service.clear().await.context("failed to clear the log")?;
            println!("Deleted {} log records", deleted);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_address(address: &Address) {
    println!(
        "{}, {}, {} {} {}",
        address.line1, address.city, address.region, address.postal_code, address.country
    );
}

fn render_log_record(record: &TaxTransactionLogModel) {
    println!(
        "- #{} • {} • {} • customer {}",
        record.id,
        record.created_at.to_rfc3339(),
        record.log_type,
        record
            .customer_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
}
