use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{CreditService, ReportRange};
use crate::config::Config;
use crate::domain::{
    format_credits, format_signed, parse_credits, AccountRole, Audience, Credits, OrderStatus,
    PackageSpec, PaymentOutcome, PurchaseOrder, RelatedEntity, TransactionType,
};
use crate::storage::TransactionFilter;

/// Creditbook - credit ledger and package billing for a tutoring marketplace
#[derive(Parser)]
#[command(name = "creditbook")]
#[command(about = "Credit ledger, package catalog and purchase settlement for tutors and guardians")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides the config file)
    #[arg(short, long, env = "CREDITBOOK_DATABASE")]
    pub database: Option<String>,

    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Show the balance of an account
    Balance {
        /// Account ID
        account: String,
    },

    /// List ledger entries of an account, most recent first
    History {
        /// Account ID
        account: String,

        /// Filter by type: earned, spent, purchased, refund, bonus, adjustment
        #[arg(short = 't', long = "type")]
        transaction_type: Option<String>,

        /// Filter by related entity kind (e.g. "purchase_order")
        #[arg(short, long)]
        category: Option<String>,

        /// Filter from date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Filter to date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,

        /// Match reason or related entity ID
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Entries to skip
        #[arg(long)]
        offset: Option<usize>,
    },

    /// Credit an account for platform activity
    Earn {
        /// Account ID
        account: String,

        /// Credits earned
        amount: String,

        /// Why the credits were earned
        #[arg(short, long)]
        reason: String,

        /// Related entity as kind/id (e.g. "referral/42")
        #[arg(long)]
        related: Option<String>,
    },

    /// Spend credits from an account
    Spend {
        /// Account ID
        account: String,

        /// Credits to spend
        amount: String,

        /// What the credits are spent on
        #[arg(short, long)]
        reason: String,

        /// Related entity as kind/id (e.g. "job_application/17")
        #[arg(long)]
        related: Option<String>,
    },

    /// Grant promotional credits
    Bonus {
        /// Account ID
        account: String,

        /// Credits to grant
        amount: String,

        /// Campaign or reason
        #[arg(short, long)]
        reason: String,
    },

    /// Package catalog commands
    #[command(subcommand)]
    Package(PackageCommands),

    /// Purchase order commands
    #[command(subcommand)]
    Order(OrderCommands),

    /// Manually grant or deduct credits
    Adjust {
        /// Account ID
        account: String,

        /// Signed amount (e.g. "50" or "-50")
        #[arg(allow_hyphen_values = true)]
        delta: String,

        /// Why the balance is corrected
        #[arg(short, long)]
        reason: String,

        /// Administrator performing the adjustment
        #[arg(short, long)]
        actor: String,
    },

    /// Generate reports and analytics
    #[command(subcommand)]
    Report(ReportCommands),

    /// Verify ledger integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: transactions, orders, snapshot
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Limit a transactions export to one account
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open an account (no-op if it already exists)
    Open {
        /// Account ID (the marketplace user ID)
        id: String,

        /// Role: teacher or guardian
        #[arg(short, long)]
        role: String,
    },

    /// Show account details and recent activity
    Show {
        /// Account ID
        id: String,
    },

    /// Deactivate an account
    Deactivate {
        /// Account ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PackageCommands {
    /// Create a package
    Create {
        /// Package name
        name: String,

        #[command(flatten)]
        terms: PackageTerms,
    },

    /// Replace the terms of a package (existing orders keep their snapshot)
    Update {
        /// Package ID
        id: String,

        /// Package name
        #[arg(long)]
        name: String,

        #[command(flatten)]
        terms: PackageTerms,
    },

    /// Make a package purchasable
    Activate {
        /// Package ID
        id: String,
    },

    /// Stop selling a package
    Deactivate {
        /// Package ID
        id: String,
    },

    /// List packages
    List {
        /// Only packages offered to this audience: teacher, guardian
        #[arg(long)]
        audience: Option<String>,

        /// Include inactive packages
        #[arg(short, long)]
        all: bool,
    },
}

#[derive(clap::Args)]
pub struct PackageTerms {
    /// Base credits granted
    #[arg(long)]
    pub base: String,

    /// Bonus credits granted on top
    #[arg(long, default_value = "0")]
    pub bonus: String,

    /// Price charged
    #[arg(long)]
    pub price: String,

    /// Audience: teacher, guardian, both
    #[arg(long, default_value = "both")]
    pub audience: String,

    /// Subscription days granted on settlement
    #[arg(long)]
    pub validity_days: Option<u32>,
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Create a purchase order and hand it to the payment gateway
    Create {
        /// Account ID
        account: String,

        /// Package ID
        package: String,

        /// Payment reference issued by the gateway (generated if omitted)
        #[arg(long)]
        payment_ref: Option<String>,
    },

    /// Record a successful payment
    Confirm {
        /// Payment reference
        payment_ref: String,
    },

    /// Record a failed payment
    Fail {
        /// Payment reference
        payment_ref: String,

        /// Failure reason reported by the gateway
        #[arg(short, long, default_value = "payment declined")]
        reason: String,
    },

    /// Refund a settled order
    Refund {
        /// Order ID
        id: String,

        /// Refund reason
        #[arg(short, long)]
        reason: String,
    },

    /// Cancel an unpaid order
    Cancel {
        /// Order ID
        id: String,

        /// Cancellation reason
        #[arg(short, long, default_value = "cancelled by administrator")]
        reason: String,
    },

    /// Show an order by ID or payment reference
    Show {
        /// Order ID or payment reference
        id: String,
    },

    /// List orders
    List {
        /// Filter by account
        #[arg(long)]
        account: Option<String>,

        /// Filter by status: created, awaiting_payment, settled, failed, refunded
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Revenue from settled orders
    Revenue {
        #[command(flatten)]
        window: ReportWindow,
    },

    /// Subscribers and revenue per package
    Packages {
        #[command(flatten)]
        window: ReportWindow,
    },

    /// Order outcomes and payment success rate
    Success {
        #[command(flatten)]
        window: ReportWindow,
    },

    /// Daily orders, revenue and credit flow
    Daily {
        #[command(flatten)]
        window: ReportWindow,
    },

    /// Entry counts and totals per transaction type
    Types {
        #[command(flatten)]
        window: ReportWindow,
    },
}

#[derive(clap::Args)]
pub struct ReportWindow {
    /// Start date (YYYY-MM-DD, defaults to start of current month)
    #[arg(long)]
    pub from: Option<String>,

    /// End date, inclusive (YYYY-MM-DD, defaults to now)
    #[arg(long)]
    pub to: Option<String>,

    /// Output format: table, json
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if let Some(path) = &self.database {
            config = config.with_database_path(path.clone());
        }
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let service = CreditService::init(&config).await?;

        let result = match self.command {
            Commands::Init => {
                println!("Database initialized: {}", config.database_path);
                Ok(())
            }
            Commands::Account(cmd) => run_account_command(&service, cmd).await,
            Commands::Balance { account } => {
                let balance = service.ledger().get_balance(&account).await?;
                println!("{}: {} credits", account, format_credits(balance));
                Ok(())
            }
            Commands::History {
                account,
                transaction_type,
                category,
                from_date,
                to_date,
                search,
                limit,
                offset,
            } => {
                let filter = TransactionFilter {
                    transaction_type: transaction_type
                        .map(|t| parse_transaction_type(&t))
                        .transpose()?,
                    category,
                    from_date: from_date
                        .map(|s| parse_date(&s))
                        .transpose()
                        .context("Invalid from-date")?,
                    to_date: to_date
                        .map(|s| parse_date(&s).map(end_of_day))
                        .transpose()
                        .context("Invalid to-date")?,
                    search,
                    limit,
                    offset,
                };
                run_history_command(&service, &account, &filter).await
            }
            Commands::Earn {
                account,
                amount,
                reason,
                related,
            } => {
                let amount = parse_amount(&amount)?;
                let related = related.map(|r| parse_related(&r)).transpose()?;
                let txn = service
                    .ledger()
                    .append_transaction(&account, TransactionType::Earned, amount, &reason, related)
                    .await?;
                print_entry("Earned", &txn.account_id, txn.amount, txn.balance_after);
                Ok(())
            }
            Commands::Spend {
                account,
                amount,
                reason,
                related,
            } => {
                let amount = parse_amount(&amount)?;
                let related = related.map(|r| parse_related(&r)).transpose()?;
                let txn = service
                    .ledger()
                    .append_transaction(&account, TransactionType::Spent, -amount, &reason, related)
                    .await?;
                print_entry("Spent", &txn.account_id, txn.amount, txn.balance_after);
                Ok(())
            }
            Commands::Bonus {
                account,
                amount,
                reason,
            } => {
                let amount = parse_amount(&amount)?;
                let txn = service
                    .ledger()
                    .append_transaction(&account, TransactionType::Bonus, amount, &reason, None)
                    .await?;
                print_entry("Bonus", &txn.account_id, txn.amount, txn.balance_after);
                Ok(())
            }
            Commands::Package(cmd) => run_package_command(&service, cmd).await,
            Commands::Order(cmd) => run_order_command(&service, cmd).await,
            Commands::Adjust {
                account,
                delta,
                reason,
                actor,
            } => {
                let delta = parse_credits(&delta)
                    .with_context(|| format!("Invalid adjustment '{}'", delta))?;
                let txn = service
                    .adjustments()
                    .adjust_balance(&account, delta, &reason, &actor)
                    .await?;
                print_entry("Adjusted", &txn.account_id, txn.amount, txn.balance_after);
                Ok(())
            }
            Commands::Report(cmd) => run_report_command(&service, cmd).await,
            Commands::Check => run_check_command(&service).await,
            Commands::Export {
                export_type,
                output,
                account,
            } => {
                run_export_command(&service, &export_type, output.as_deref(), account.as_deref())
                    .await
            }
        };

        service.close().await;
        result
    }
}

async fn run_account_command(service: &CreditService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Open { id, role } => {
            let role = AccountRole::from_str(&role).ok_or_else(|| {
                anyhow::anyhow!("Invalid role '{}'. Valid roles: teacher, guardian", role)
            })?;
            let account = service.ledger().open_account(&id, role).await?;
            println!("Account: {} ({})", account.id, account.role);
        }

        AccountCommands::Show { id } => {
            let summary = service.get_account_summary(&id).await?;
            let account = &summary.account;

            println!("Account: {}", account.id);
            println!("  Role:         {}", account.role);
            println!("  Balance:      {} credits", format_credits(summary.balance));
            println!(
                "  Status:       {}",
                if account.active { "active" } else { "deactivated" }
            );
            if let Some(expires) = account.subscription_expires_at {
                println!(
                    "  Subscription: {} until {}",
                    if summary.has_active_subscription {
                        "active"
                    } else {
                        "expired"
                    },
                    expires.format("%Y-%m-%d")
                );
            }
            println!(
                "  Opened:       {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );

            if !summary.recent_transactions.is_empty() {
                println!();
                println!("  Recent activity:");
                for txn in &summary.recent_transactions {
                    println!(
                        "    {}  {:<10} {:>8}  {}",
                        txn.created_at.format("%Y-%m-%d"),
                        txn.transaction_type,
                        format_signed(txn.amount),
                        truncate(&txn.reason, 40)
                    );
                }
            }
        }

        AccountCommands::Deactivate { id } => {
            service.ledger().deactivate_account(&id).await?;
            println!("Deactivated account: {}", id);
        }
    }
    Ok(())
}

async fn run_history_command(
    service: &CreditService,
    account: &str,
    filter: &TransactionFilter,
) -> Result<()> {
    let transactions = service.ledger().list_transactions(account, filter).await?;

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<10} {:>10} {:>10} {:<9} REASON",
        "DATE", "TYPE", "AMOUNT", "BALANCE", "STATUS"
    );
    println!("{}", "-".repeat(80));
    for txn in &transactions {
        println!(
            "{:<12} {:<10} {:>10} {:>10} {:<9} {}",
            txn.created_at.format("%Y-%m-%d"),
            txn.transaction_type,
            format_signed(txn.amount),
            format_credits(txn.balance_after),
            txn.status.as_str(),
            truncate(&txn.reason, 30)
        );
    }
    Ok(())
}

async fn run_package_command(service: &CreditService, cmd: PackageCommands) -> Result<()> {
    match cmd {
        PackageCommands::Create { name, terms } => {
            let spec = terms.into_spec(name)?;
            let package = service.catalog().create_package(spec).await?;
            println!(
                "Created package: {} ({} credits for {}) {}",
                package.name,
                format_credits(package.total_credits()),
                format_credits(package.price),
                package.id
            );
        }

        PackageCommands::Update { id, name, terms } => {
            let id = parse_uuid(&id, "package")?;
            let spec = terms.into_spec(name)?;
            let package = service.catalog().update_package(id, spec).await?;
            println!("Updated package: {} ({})", package.name, package.id);
        }

        PackageCommands::Activate { id } => {
            let package = service
                .catalog()
                .set_active(parse_uuid(&id, "package")?, true)
                .await?;
            println!("Activated package: {}", package.name);
        }

        PackageCommands::Deactivate { id } => {
            let package = service
                .catalog()
                .set_active(parse_uuid(&id, "package")?, false)
                .await?;
            println!("Deactivated package: {}", package.name);
        }

        PackageCommands::List { audience, all } => {
            let audience = audience.map(|a| parse_audience(&a)).transpose()?;
            let packages = service.catalog().list_packages(audience, !all).await?;

            if packages.is_empty() {
                println!("No packages found.");
            } else {
                println!(
                    "{:<36}  {:<20} {:>8} {:>8} {:>8} {:<9} {:<8}",
                    "ID", "NAME", "CREDITS", "BONUS", "PRICE", "AUDIENCE", "STATUS"
                );
                println!("{}", "-".repeat(106));
                for package in packages {
                    println!(
                        "{:<36}  {:<20} {:>8} {:>8} {:>8} {:<9} {:<8}",
                        package.id,
                        truncate(&package.name, 20),
                        format_credits(package.base_credits),
                        format_credits(package.bonus_credits),
                        format_credits(package.price),
                        package.audience,
                        if package.active { "active" } else { "inactive" }
                    );
                }
            }
        }
    }
    Ok(())
}

impl PackageTerms {
    fn into_spec(self, name: String) -> Result<PackageSpec> {
        let base = parse_credits(&self.base).context("Invalid base credits")?;
        let bonus = parse_credits(&self.bonus).context("Invalid bonus credits")?;
        let price = parse_credits(&self.price).context("Invalid price")?;
        let audience = parse_audience(&self.audience)?;

        let mut spec = PackageSpec::new(name, base, bonus, price, audience);
        if let Some(days) = self.validity_days {
            spec = spec.with_validity_days(days);
        }
        Ok(spec)
    }
}

async fn run_order_command(service: &CreditService, cmd: OrderCommands) -> Result<()> {
    let orders = service.orders();
    match cmd {
        OrderCommands::Create {
            account,
            package,
            payment_ref,
        } => {
            let package_id = parse_uuid(&package, "package")?;
            let order = match payment_ref {
                Some(payment_ref) => {
                    orders
                        .create_order_with_ref(&account, package_id, &payment_ref)
                        .await?
                }
                None => orders.create_order(&account, package_id).await?,
            };
            println!("Created order: {}", order.id);
            println!("  Payment ref: {}", order.payment_ref);
            println!("  Price:       {}", format_credits(order.price_charged));
            println!("  Status:      {}", order.status);
        }

        OrderCommands::Confirm { payment_ref } => {
            let order = orders
                .confirm_payment(&payment_ref, PaymentOutcome::Succeeded)
                .await?;
            println!("Order {} is {}", order.id, order.status);
        }

        OrderCommands::Fail {
            payment_ref,
            reason,
        } => {
            let order = orders
                .confirm_payment(&payment_ref, PaymentOutcome::failed(reason))
                .await?;
            println!("Order {} is {}", order.id, order.status);
        }

        OrderCommands::Refund { id, reason } => {
            let outcome = orders
                .refund_order(parse_uuid(&id, "order")?, &reason)
                .await?;
            println!(
                "Refunded order {}: {} credits",
                outcome.order.id,
                format_signed(outcome.transaction.amount)
            );
            if outcome.is_partial() {
                println!(
                    "  Shortfall: {} credits were already spent",
                    format_credits(outcome.shortfall)
                );
            }
        }

        OrderCommands::Cancel { id, reason } => {
            let order = orders.cancel_order(parse_uuid(&id, "order")?, &reason).await?;
            println!("Cancelled order {}", order.id);
        }

        OrderCommands::Show { id } => {
            let order = match Uuid::parse_str(&id) {
                Ok(order_id) => orders.get_order(order_id).await?,
                Err(_) => orders.get_order_by_payment_ref(&id).await?,
            };
            print_order(&order);
        }

        OrderCommands::List { account, status } => {
            let status = status
                .map(|s| {
                    OrderStatus::from_str(&s)
                        .ok_or_else(|| anyhow::anyhow!("Invalid order status '{}'", s))
                })
                .transpose()?;
            let list = orders.list_orders(account.as_deref(), status).await?;

            if list.is_empty() {
                println!("No orders found.");
            } else {
                println!(
                    "{:<12} {:<16} {:<18} {:>8} {:>8} PAYMENT REF",
                    "DATE", "ACCOUNT", "STATUS", "PRICE", "CREDITS"
                );
                println!("{}", "-".repeat(90));
                for order in list {
                    println!(
                        "{:<12} {:<16} {:<18} {:>8} {:>8} {}",
                        order.created_at.format("%Y-%m-%d"),
                        truncate(&order.account_id, 16),
                        order.status,
                        format_credits(order.price_charged),
                        format_credits(order.credits_to_grant),
                        order.payment_ref
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_order(order: &PurchaseOrder) {
    println!("Order: {}", order.id);
    println!("  Account:     {}", order.account_id);
    println!("  Package:     {}", order.package_id);
    println!("  Payment ref: {}", order.payment_ref);
    println!("  Status:      {}", order.status);
    println!("  Price:       {}", format_credits(order.price_charged));
    println!("  Credits:     {}", format_credits(order.credits_to_grant));
    if let Some(days) = order.validity_days {
        println!("  Validity:    {} days", days);
    }
    println!(
        "  Created:     {}",
        order.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(settled) = order.settled_at {
        println!("  Settled:     {}", settled.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(txn) = order.settlement_transaction_id {
        println!("  Settlement:  {}", txn);
    }
    if let Some(reason) = &order.failure_reason {
        println!("  Failure:     {}", reason);
    }
}

async fn run_report_command(service: &CreditService, cmd: ReportCommands) -> Result<()> {
    let reporting = service.reporting();
    match cmd {
        ReportCommands::Revenue { window } => {
            let range = window.range()?;
            let report = reporting.revenue_report(range).await?;
            if window.is_json() {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_period("Revenue Report", &range);
                println!("Settled orders:   {:>12}", report.settled_orders);
                println!("Total revenue:    {:>12}", format_credits(report.total_revenue));
                println!("Refunded:         {:>12}", format_credits(report.refunded_revenue));
                println!("{}", "-".repeat(31));
                println!("Net revenue:      {:>12}", format_credits(report.net_revenue));
                println!("Credits granted:  {:>12}", format_credits(report.credits_granted));
            }
        }

        ReportCommands::Packages { window } => {
            let range = window.range()?;
            let report = reporting.package_report(range).await?;
            if window.is_json() {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_period("Package Report", &range);
                println!(
                    "{:<24} {:>12} {:>8} {:>9} {:>12}",
                    "PACKAGE", "SUBSCRIBERS", "ORDERS", "REFUNDED", "REVENUE"
                );
                println!("{}", "-".repeat(69));
                for pkg in &report.packages {
                    println!(
                        "{:<24} {:>12} {:>8} {:>9} {:>12}",
                        truncate(&pkg.name, 24),
                        pkg.subscribers,
                        pkg.orders_settled,
                        pkg.refunded_orders,
                        format_credits(pkg.revenue)
                    );
                }
            }
        }

        ReportCommands::Success { window } => {
            let range = window.range()?;
            let report = reporting.order_success_report(range).await?;
            if window.is_json() {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_period("Order Success Report", &range);
                for (status, count) in &report.counts {
                    println!("  {:<18} {:>8}", status, count);
                }
                println!("  {}", "-".repeat(27));
                println!("  {:<18} {:>8}", "total", report.total_orders);
                println!();
                println!("Success rate: {:.1}%", report.success_rate * 100.0);
            }
        }

        ReportCommands::Daily { window } => {
            let range = window.range()?;
            let points = reporting.daily_series(range).await?;
            if window.is_json() {
                println!("{}", serde_json::to_string_pretty(&points)?);
            } else {
                print_period("Daily Activity", &range);
                println!(
                    "{:<12} {:>8} {:>12} {:>10} {:>10}",
                    "DAY", "ORDERS", "REVENUE", "GRANTED", "SPENT"
                );
                println!("{}", "-".repeat(56));
                for point in &points {
                    println!(
                        "{:<12} {:>8} {:>12} {:>10} {:>10}",
                        point.day,
                        point.orders_settled,
                        format_credits(point.revenue),
                        format_credits(point.credits_granted),
                        format_credits(point.credits_spent)
                    );
                }
            }
        }

        ReportCommands::Types { window } => {
            let range = window.range()?;
            let summaries = reporting.transaction_type_report(range).await?;
            if window.is_json() {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print_period("Transactions by Type", &range);
                println!("{:<12} {:>8} {:>12}", "TYPE", "COUNT", "TOTAL");
                println!("{}", "-".repeat(34));
                for summary in &summaries {
                    println!(
                        "{:<12} {:>8} {:>12}",
                        summary.transaction_type,
                        summary.count,
                        format_signed(summary.total)
                    );
                }
            }
        }
    }
    Ok(())
}

impl ReportWindow {
    fn range(&self) -> Result<ReportRange> {
        use chrono::Datelike;

        let now = Utc::now();
        let to = match &self.to {
            Some(date_str) => end_of_day(parse_date(date_str)?),
            None => now,
        };
        let from = match &self.from {
            Some(date_str) => parse_date(date_str)?,
            None => now
                .date_naive()
                .with_day(1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(|| anyhow::anyhow!("Invalid start of month"))?
                .and_utc(),
        };
        Ok(ReportRange::new(from, to)?)
    }

    fn is_json(&self) -> bool {
        self.format == "json"
    }
}

fn print_period(title: &str, range: &ReportRange) {
    println!("{}", title);
    println!(
        "Period: {} to {}",
        range.from.format("%Y-%m-%d"),
        range.to.format("%Y-%m-%d %H:%M")
    );
    println!();
}

async fn run_check_command(service: &CreditService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.verify_integrity().await?;

    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!();

    if report.is_valid() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &CreditService,
    export_type: &str,
    output: Option<&str>,
    account: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "transactions" => {
            let count = exporter.export_transactions_csv(writer, account).await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "orders" => {
            let count = exporter.export_orders_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} orders", count);
            }
        }
        "snapshot" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported snapshot: {} accounts, {} packages, {} orders, {} transactions",
                    snapshot.accounts.len(),
                    snapshot.packages.len(),
                    snapshot.orders.len(),
                    snapshot.transactions.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: transactions, orders, snapshot",
                export_type
            );
        }
    }

    Ok(())
}

fn print_entry(label: &str, account_id: &str, amount: Credits, balance_after: Credits) {
    println!(
        "{}: {} credits on {} (balance {})",
        label,
        format_signed(amount),
        account_id,
        format_credits(balance_after)
    );
}

/// Parse a positive credit amount.
fn parse_amount(input: &str) -> Result<Credits> {
    let amount =
        parse_credits(input).with_context(|| format!("Invalid amount '{}'. Use e.g. '250'", input))?;
    if amount <= 0 {
        anyhow::bail!("Amount must be positive, got {}", input);
    }
    Ok(amount)
}

fn parse_related(input: &str) -> Result<RelatedEntity> {
    match input.split_once('/') {
        Some((kind, id)) if !kind.is_empty() && !id.is_empty() => Ok(RelatedEntity::new(kind, id)),
        _ => anyhow::bail!("Invalid related entity '{}'. Use kind/id", input),
    }
}

fn parse_transaction_type(input: &str) -> Result<TransactionType> {
    TransactionType::from_str(input).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid transaction type '{}'. Valid types: earned, spent, purchased, refund, bonus, adjustment",
            input
        )
    })
}

fn parse_audience(input: &str) -> Result<Audience> {
    Audience::from_str(input).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid audience '{}'. Valid audiences: teacher, guardian, both",
            input
        )
    })
}

fn parse_uuid(input: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(input).with_context(|| format!("Invalid {} ID format (expected UUID)", what))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    use chrono::NaiveDate;

    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;
    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}

/// Turn an inclusive end date into the exclusive bound of the next midnight.
fn end_of_day(date: DateTime<Utc>) -> DateTime<Utc> {
    date + Duration::days(1)
}
