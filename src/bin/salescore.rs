use std::time::Duration;

use clap::{Parser, Subcommand};
use salescore::{
    ActivityType, DealQuery, DealStage, MetricsPeriod, NewActivity, NewClient, NewDeal, NewTask,
    RangeRequest, RelatedType, SalesCore, TaskFilter, UserRole,
};

#[derive(Parser)]
#[command(name = "salescore", about = "Multi-tenant CRM and sales metrics CLI")]
struct Cli {
    /// Database path (default: ~/.salescore/salescore.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Per-query timeout for metrics, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Company (tenant) id; defaults to the `company_id` config value
    #[arg(long, global = true)]
    company: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show record counts per table
    Status,
    /// Manage companies
    Company {
        #[command(subcommand)]
        action: CompanyAction,
    },
    /// Manage users of a company
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage clients
    Client {
        #[command(subcommand)]
        action: ClientAction,
    },
    /// Manage deals
    Deal {
        #[command(subcommand)]
        action: DealAction,
    },
    /// Manage follow-up tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Log and list activities
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },
    /// Dashboard summary for the selected company
    Metrics {
        /// today, week, month or custom
        #[arg(long, default_value = "month")]
        period: String,
        /// Start date for a custom period (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date for a custom period, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CompanyAction {
    /// Create a company and print its id
    Add {
        name: String,
        /// Also make it the default company
        #[arg(long)]
        default: bool,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Add a user to the company
    Add {
        name: String,
        email: String,
        /// ADMIN or AGENT
        #[arg(long, default_value = "AGENT")]
        role: String,
    },
    /// List the company's users
    List,
}

#[derive(Subcommand)]
enum ClientAction {
    /// Add a client
    Add {
        name: String,
        phone: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List clients, newest first
    List {
        /// Substring match on name, phone or email
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "50")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a client
    Rm { id: String },
}

#[derive(Subcommand)]
enum DealAction {
    /// Add a deal for a client
    Add {
        client_id: String,
        title: String,
        #[arg(long, default_value = "0")]
        value: f64,
        /// NEW, CONTACTED, QUOTE_SENT, WAITING, WON or LOST
        #[arg(long, default_value = "NEW")]
        stage: String,
        /// Expected or actual close date (YYYY-MM-DD)
        #[arg(long)]
        close_date: Option<String>,
    },
    /// List deals, newest first
    List {
        #[arg(long)]
        stage: Option<String>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long, default_value = "50")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
        /// Group by pipeline stage
        #[arg(long)]
        board: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a deal to another stage
    Stage { id: String, stage: String },
    /// Delete a deal
    Rm { id: String },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Add a task for a client or deal
    Add {
        /// CLIENT or DEAL
        related_type: String,
        related_id: String,
        title: String,
        /// Due date (YYYY-MM-DD)
        due_date: String,
    },
    /// List tasks
    List {
        /// today, overdue, upcoming or all
        #[arg(long, default_value = "all")]
        filter: String,
        #[arg(long, default_value = "50")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a task done (or not done with --undo)
    Done {
        id: String,
        #[arg(long)]
        undo: bool,
    },
    /// Delete a task
    Rm { id: String },
}

#[derive(Subcommand)]
enum ActivityAction {
    /// Log an activity against a client or deal
    Add {
        /// CLIENT or DEAL
        related_type: String,
        related_id: String,
        /// NOTE, CALL, WHATSAPP or MEETING
        kind: String,
        content: String,
    },
    /// List activities, newest first
    List {
        /// CLIENT or DEAL, together with --related-id
        #[arg(long, requires = "related_id")]
        related_type: Option<String>,
        #[arg(long, requires = "related_type")]
        related_id: Option<String>,
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => salescore::Database::open_at(path).await?,
        None => salescore::Database::open().await?,
    };
    let core = SalesCore::new(db).with_query_timeout(cli.timeout_ms.map(Duration::from_millis));
    let company = cli.company.as_deref();

    match cli.command {
        Commands::Status => print_status(&core).await?,
        Commands::Company { action } => handle_company(&core, action).await?,
        Commands::User { action } => {
            let company_id = core.resolve_company(company).await?;
            handle_user(&core, &company_id, action).await?;
        }
        Commands::Client { action } => {
            let company_id = core.resolve_company(company).await?;
            handle_client(&core, &company_id, action).await?;
        }
        Commands::Deal { action } => {
            let company_id = core.resolve_company(company).await?;
            handle_deal(&core, &company_id, action).await?;
        }
        Commands::Task { action } => {
            let company_id = core.resolve_company(company).await?;
            handle_task(&core, &company_id, action).await?;
        }
        Commands::Activity { action } => {
            let company_id = core.resolve_company(company).await?;
            handle_activity(&core, &company_id, action).await?;
        }
        Commands::Metrics {
            period,
            from,
            to,
            json,
        } => {
            let company_id = core.resolve_company(company).await?;
            let request = RangeRequest {
                period: MetricsPeriod::parse(&period)?,
                from,
                to,
            };
            handle_metrics(&core, &company_id, &request, json).await?;
        }
        Commands::Config { action } => handle_config(&core, action).await?,
    }

    Ok(())
}

async fn print_status(core: &SalesCore) -> anyhow::Result<()> {
    let counts = core
        .db()
        .reader()
        .call(|conn| {
            let mut counts = Vec::new();
            for table in ["companies", "users", "clients", "deals", "tasks", "activities"] {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                counts.push((table, n));
            }
            Ok::<_, rusqlite::Error>(counts)
        })
        .await?;

    println!("Database Status");
    for (table, n) in counts {
        println!("  {:<11} {n}", format!("{table}:"));
    }
    match core.config_get(salescore::DEFAULT_COMPANY_KEY).await? {
        Some(id) => println!("  Default company: {id}"),
        None => println!("  Default company: not set"),
    }
    Ok(())
}

async fn handle_company(core: &SalesCore, action: CompanyAction) -> anyhow::Result<()> {
    match action {
        CompanyAction::Add { name, default } => {
            let company = core.create_company(&name).await?;
            if default {
                core.config_set(salescore::DEFAULT_COMPANY_KEY, &company.id).await?;
            }
            println!("{}", company.id);
        }
    }
    Ok(())
}

async fn handle_user(core: &SalesCore, company_id: &str, action: UserAction) -> anyhow::Result<()> {
    match action {
        UserAction::Add { name, email, role } => {
            let role: UserRole = role.parse()?;
            let user = core.create_user(company_id, &name, &email, role).await?;
            println!("{}", user.id);
        }
        UserAction::List => {
            for user in core.list_users(company_id).await? {
                println!("{}  {:<6} {} <{}>", user.id, user.role, user.name, user.email);
            }
        }
    }
    Ok(())
}

async fn handle_client(core: &SalesCore, company_id: &str, action: ClientAction) -> anyhow::Result<()> {
    match action {
        ClientAction::Add {
            name,
            phone,
            email,
            notes,
        } => {
            let client = core
                .create_client(
                    company_id,
                    NewClient {
                        name,
                        phone,
                        email,
                        notes,
                    },
                )
                .await?;
            println!("{}", client.id);
        }
        ClientAction::List {
            search,
            limit,
            offset,
            json,
        } => {
            let page = core
                .list_clients(company_id, search.as_deref(), limit, offset)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                for c in &page.items {
                    println!(
                        "{}  {:<24} {:<14} {}",
                        c.id,
                        c.name,
                        c.phone,
                        c.email.as_deref().unwrap_or("-")
                    );
                }
                println!("{} of {} clients", page.items.len(), page.total);
            }
        }
        ClientAction::Rm { id } => {
            core.delete_client(company_id, &id).await?;
            println!("Client removed.");
        }
    }
    Ok(())
}

async fn handle_deal(core: &SalesCore, company_id: &str, action: DealAction) -> anyhow::Result<()> {
    match action {
        DealAction::Add {
            client_id,
            title,
            value,
            stage,
            close_date,
        } => {
            let mut input = NewDeal::new(&client_id, &title)
                .value(value)
                .stage(stage.parse()?);
            if let Some(date) = close_date {
                input = input.close_date(&date);
            }
            let deal = core.create_deal(company_id, input).await?;
            println!("{}", deal.id);
        }
        DealAction::List {
            stage,
            client,
            limit,
            offset,
            board,
            json,
        } => {
            if board {
                let grouped = core.deals_grouped_by_stage(company_id).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&grouped)?);
                } else {
                    for (stage, deals) in &grouped {
                        println!("{stage} ({})", deals.len());
                        for d in deals {
                            println!("  {}  {:<28} {:>12.2}", d.id, d.title, d.value);
                        }
                    }
                }
                return Ok(());
            }

            let mut query = DealQuery::new(company_id).limit(limit).offset(offset);
            if let Some(stage) = stage {
                query = query.stage(stage.parse::<DealStage>()?);
            }
            if let Some(client) = client {
                query = query.client(&client);
            }
            let page = core.list_deals(query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                for d in &page.items {
                    println!(
                        "{}  {:<10} {:<28} {:<20} {:>12.2}",
                        d.id,
                        d.stage,
                        d.title,
                        d.client_name.as_deref().unwrap_or("-"),
                        d.value
                    );
                }
                println!("{} of {} deals", page.items.len(), page.total);
            }
        }
        DealAction::Stage { id, stage } => {
            let deal = core
                .update_deal_stage(company_id, &id, stage.parse()?)
                .await?;
            println!("{} -> {}", deal.id, deal.stage);
        }
        DealAction::Rm { id } => {
            core.delete_deal(company_id, &id).await?;
            println!("Deal removed.");
        }
    }
    Ok(())
}

async fn handle_task(core: &SalesCore, company_id: &str, action: TaskAction) -> anyhow::Result<()> {
    match action {
        TaskAction::Add {
            related_type,
            related_id,
            title,
            due_date,
        } => {
            let task = core
                .create_task(
                    company_id,
                    NewTask {
                        related_type: related_type.parse()?,
                        related_id,
                        title,
                        due_date,
                    },
                )
                .await?;
            println!("{}", task.id);
        }
        TaskAction::List {
            filter,
            limit,
            offset,
            json,
        } => {
            let filter: TaskFilter = filter.parse()?;
            let page = core.list_tasks(company_id, filter, None, limit, offset).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                for t in &page.items {
                    let mark = if t.done { "x" } else { " " };
                    println!("[{mark}] {}  {}  {}", t.id, t.due_date, t.title);
                }
                println!("{} of {} tasks", page.items.len(), page.total);
            }
        }
        TaskAction::Done { id, undo } => {
            let task = core.set_task_done(company_id, &id, !undo).await?;
            println!("{} done = {}", task.id, task.done);
        }
        TaskAction::Rm { id } => {
            core.delete_task(company_id, &id).await?;
            println!("Task removed.");
        }
    }
    Ok(())
}

async fn handle_activity(
    core: &SalesCore,
    company_id: &str,
    action: ActivityAction,
) -> anyhow::Result<()> {
    match action {
        ActivityAction::Add {
            related_type,
            related_id,
            kind,
            content,
        } => {
            let activity = core
                .create_activity(
                    company_id,
                    NewActivity {
                        related_type: related_type.parse()?,
                        related_id,
                        kind: kind.parse::<ActivityType>()?,
                        content,
                    },
                )
                .await?;
            println!("{}", activity.id);
        }
        ActivityAction::List {
            related_type,
            related_id,
            limit,
            json,
        } => {
            let related = match (related_type, related_id) {
                (Some(t), Some(id)) => Some((t.parse::<RelatedType>()?, id)),
                _ => None,
            };
            let page = core.list_activities(company_id, related, limit, 0).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                for a in &page.items {
                    println!("{}  {:<8} {}  {}", a.created_at, a.kind, a.related_type, a.content);
                }
            }
        }
    }
    Ok(())
}

async fn handle_metrics(
    core: &SalesCore,
    company_id: &str,
    request: &RangeRequest,
    json: bool,
) -> anyhow::Result<()> {
    let m = core.metrics_summary(company_id, request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&m)?);
        return Ok(());
    }

    println!(
        "Sales Metrics ({}): {} to {}",
        request.period,
        m.window.current_start.date(),
        (m.window.current_end - chrono::Duration::days(1)).date()
    );
    println!("  Clients:");
    println!("    New:          {} ({:+})", m.total_clients, m.comparison.clients_vs_previous);
    println!("  Deals:");
    println!("    Created:      {}", m.total_deals);
    println!("    Active:       {} ({:+})", m.active_deals, m.comparison.active_deals_vs_previous);
    println!("    Won value:    {:.2} ({:+.2})", m.won_value_sum, m.comparison.won_value_vs_previous);
    println!("    Pipeline:     {:.2}", m.pipeline_value);
    println!("    Avg value:    {:.2}", m.avg_deal_value);
    println!("    Conversion:   {}% ({:+} pts)", m.conversion_rate, m.comparison.conversion_vs_previous);
    println!("    Avg close:    {:.1} days", m.avg_close_days);
    println!("  By stage:");
    for stage in DealStage::ALL {
        let n = m.deals_by_stage.get(stage).copied().unwrap_or(0);
        println!("    {:<12} {n}", stage.as_str());
    }
    println!("  Pending tasks:  {}", m.pending_tasks);
    if !m.recent_deals.is_empty() {
        println!("  Recent deals:");
        for d in &m.recent_deals {
            println!(
                "    {}  {:<10} {:<28} {:<20} {:>12.2}",
                d.created_at, d.stage, d.title, d.client_name, d.value
            );
        }
    }
    Ok(())
}

async fn handle_config(core: &SalesCore, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match core.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            core.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = core.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}
