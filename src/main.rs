use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use canteen::approval::{self, ApprovalAction};
use canteen::auth::{self, DeliveryOutcome, Session};
use canteen::model::{AccountRecord, AccountStatus, InvoiceStatus};
use canteen::notify::{DEFAULT_ENDPOINT, HttpNotifier, Notifier, NotifyConfig};
use canteen::store::LocalStore;

#[derive(Parser)]
#[command(name = "canteen")]
#[command(about = "Catering back-office records with an email-gated signup", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a data directory (.canteen)
    Init {
        /// Re-initialize if .canteen already exists
        #[arg(long)]
        force: bool,
        /// Path to initialize (defaults to current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Request an account; approval links go to the configured approver
    Signup {
        email: String,
        password: String,
        name: String,
    },

    /// Log in as an approved account
    Login { email: String, password: String },

    /// Log out and forget the remembered account
    Logout,

    /// Show the remembered account, re-validated against the store
    Whoami {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Redeem an approval token, approving the account it names
    Approve { token: String },

    /// Redeem an approval token, rejecting the account it names
    Reject { token: String },

    /// List accounts awaiting approval
    Pending {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Configure or show approval-email delivery
    Notify {
        #[command(subcommand)]
        command: NotifyCommands,
    },

    /// Manage organizations
    Org {
        #[command(subcommand)]
        command: OrgCommands,
    },

    /// Manage food orders
    Order {
        #[command(subcommand)]
        command: OrderCommands,
    },

    /// Manage invoices
    Invoice {
        #[command(subcommand)]
        command: InvoiceCommands,
    },

    /// Manage expenses
    Expense {
        #[command(subcommand)]
        command: ExpenseCommands,
    },

    /// Show record counts and totals
    Summary {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum NotifyCommands {
    /// Show the configured delivery settings
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Set the delivery settings
    Set {
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
        #[arg(long)]
        service_id: String,
        #[arg(long)]
        template_id: String,
        #[arg(long)]
        public_key: String,
        /// Administrative address approval links are mailed to
        #[arg(long)]
        approver: String,
        /// Origin used when rendering approval links
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum OrgCommands {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        contact: String,
        #[arg(long)]
        email: String,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum OrderCommands {
    Add {
        #[arg(long)]
        org: i64,
        #[arg(long)]
        people: u32,
        /// Repeatable: one flag per food item
        #[arg(long = "item")]
        items: Vec<String>,
        #[arg(long)]
        cost: f64,
        /// Defaults to now (RFC3339)
        #[arg(long)]
        date: Option<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum InvoiceCommands {
    Add {
        #[arg(long)]
        org: i64,
        #[arg(long)]
        order: i64,
        #[arg(long)]
        amount: f64,
        /// Record the invoice as already paid
        #[arg(long)]
        paid: bool,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum ExpenseCommands {
    Add {
        #[arg(long)]
        description: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        category: String,
        /// Defaults to now (RFC3339)
        #[arg(long)]
        date: Option<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Remove { id: i64 },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force, path } = &cli.command {
        let root = match path {
            Some(path) => path.clone(),
            None => std::env::current_dir().context("get current dir")?,
        };
        LocalStore::init(&root, *force)?;
        println!("Initialized canteen data directory at {}", root.display());
        return Ok(());
    }

    let store = LocalStore::discover(&std::env::current_dir().context("get current dir")?)?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Signup {
            email,
            password,
            name,
        } => {
            let cfg = store.read_config()?;
            let base_url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
            let notifier = match cfg.notify.clone() {
                Some(nc) => Some(HttpNotifier::new(nc).map_err(|e| anyhow::anyhow!(e))?),
                None => None,
            };
            let approver = cfg
                .notify
                .as_ref()
                .map(|n| n.approver_email.clone())
                .unwrap_or_default();

            let outcome = auth::signup(
                &store,
                notifier.as_ref().map(|n| n as &dyn Notifier),
                &approver,
                &base_url,
                &email,
                &password,
                &name,
            )?;
            println!(
                "Account request recorded for {} (status: {})",
                outcome.account.email, outcome.account.status
            );
            match outcome.delivery {
                DeliveryOutcome::Sent => {
                    println!("Approval request sent to {}", approver);
                }
                DeliveryOutcome::Skipped => {
                    println!(
                        "No delivery configured (run `canteen notify set ...`); share these links with the approver:"
                    );
                    println!("approve: {}", outcome.approve_url);
                    println!("reject: {}", outcome.reject_url);
                }
                DeliveryOutcome::Failed(err) => {
                    println!(
                        "Account recorded, but the approval email was not delivered: {}",
                        err
                    );
                }
            }
        }

        Commands::Login { email, password } => {
            let mut session = Session::restore(&store)?;
            let account = auth::login(&store, &mut session, &email, &password)?;
            println!("Logged in as {} ({})", account.name, account.email);
        }

        Commands::Logout => {
            let mut session = Session::restore(&store)?;
            auth::logout(&store, &mut session)?;
            println!("Logged out");
        }

        Commands::Whoami { json } => {
            let session = Session::restore(&store)?;
            match session.current() {
                Some(account) if json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(account).context("serialize whoami json")?
                    );
                }
                Some(account) => {
                    println!("email: {}", account.email);
                    println!("name: {}", account.name);
                    println!("status: {}", account.status);
                }
                None => println!("Not logged in"),
            }
        }

        Commands::Approve { token } => {
            let account = approval::redeem(&store, &token, ApprovalAction::Approve)?;
            println!("Approved {}", account.email);
        }

        Commands::Reject { token } => {
            let account = approval::redeem(&store, &token, ApprovalAction::Reject)?;
            println!("Rejected {}", account.email);
        }

        Commands::Pending { json } => {
            let pending = store.list_accounts_by_status(AccountStatus::Pending)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&pending).context("serialize pending json")?
                );
            } else {
                for account in pending {
                    println!(
                        "{} {} {} {}",
                        account.id, account.email, account.name, account.created_at
                    );
                }
            }
        }

        Commands::Notify { command } => match command {
            NotifyCommands::Show { json } => {
                let cfg = store.read_config()?;
                if json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&cfg.notify)
                            .context("serialize notify json")?
                    );
                } else if let Some(notify) = cfg.notify {
                    println!("endpoint: {}", notify.endpoint);
                    println!("service: {}", notify.service_id);
                    println!("template: {}", notify.template_id);
                    println!("approver: {}", notify.approver_email);
                    if let Some(base_url) = cfg.base_url {
                        println!("base_url: {}", base_url);
                    }
                } else {
                    println!("No delivery configured");
                }
            }
            NotifyCommands::Set {
                endpoint,
                service_id,
                template_id,
                public_key,
                approver,
                base_url,
            } => {
                let mut cfg = store.read_config()?;
                cfg.notify = Some(NotifyConfig {
                    endpoint,
                    service_id,
                    template_id,
                    public_key,
                    approver_email: approver,
                });
                if base_url.is_some() {
                    cfg.base_url = base_url;
                }
                store.write_config(&cfg)?;
                println!("Delivery configured");
            }
        },

        Commands::Org { command } => match command {
            OrgCommands::Add {
                name,
                contact,
                email,
            } => {
                let account = require_account(&store)?;
                let org = store.add_organization(account.id, &name, &contact, &email)?;
                println!("{}", org.id);
            }
            OrgCommands::List { json } => {
                let orgs = store.list_organizations()?;
                if json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&orgs).context("serialize orgs json")?
                    );
                } else {
                    for org in orgs {
                        println!("{} {} {} {}", org.id, org.name, org.contact_person, org.email);
                    }
                }
            }
            OrgCommands::Remove { id } => {
                require_account(&store)?;
                store.remove_organization(id)?;
                println!("Removed organization {}", id);
            }
        },

        Commands::Order { command } => match command {
            OrderCommands::Add {
                org,
                people,
                items,
                cost,
                date,
            } => {
                let account = require_account(&store)?;
                let order = store.add_food_order(account.id, org, people, items, cost, date)?;
                println!("{}", order.id);
            }
            OrderCommands::List { json } => {
                let orders = store.list_food_orders()?;
                if json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&orders).context("serialize orders json")?
                    );
                } else {
                    for order in orders {
                        println!(
                            "{} org={} people={} cost={:.2} {}",
                            order.id,
                            order.organization_id,
                            order.people_served,
                            order.total_cost,
                            order.order_date
                        );
                    }
                }
            }
            OrderCommands::Remove { id } => {
                require_account(&store)?;
                store.remove_food_order(id)?;
                println!("Removed food order {}", id);
            }
        },

        Commands::Invoice { command } => match command {
            InvoiceCommands::Add {
                org,
                order,
                amount,
                paid,
            } => {
                let account = require_account(&store)?;
                let status = if paid {
                    InvoiceStatus::Paid
                } else {
                    InvoiceStatus::Pending
                };
                let invoice = store.add_invoice(account.id, org, order, amount, status)?;
                println!("{}", invoice.id);
            }
            InvoiceCommands::List { json } => {
                let invoices = store.list_invoices()?;
                if json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&invoices)
                            .context("serialize invoices json")?
                    );
                } else {
                    for invoice in invoices {
                        println!(
                            "{} org={} order={} amount={:.2} {}",
                            invoice.id,
                            invoice.organization_id,
                            invoice.order_id,
                            invoice.amount,
                            invoice.status
                        );
                    }
                }
            }
            InvoiceCommands::Remove { id } => {
                require_account(&store)?;
                store.remove_invoice(id)?;
                println!("Removed invoice {}", id);
            }
        },

        Commands::Expense { command } => match command {
            ExpenseCommands::Add {
                description,
                amount,
                category,
                date,
            } => {
                let account = require_account(&store)?;
                let expense =
                    store.add_expense(account.id, &description, amount, &category, date)?;
                println!("{}", expense.id);
            }
            ExpenseCommands::List { json } => {
                let expenses = store.list_expenses()?;
                if json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&expenses)
                            .context("serialize expenses json")?
                    );
                } else {
                    for expense in expenses {
                        println!(
                            "{} {} {:.2} {} {}",
                            expense.id,
                            expense.category,
                            expense.amount,
                            expense.date,
                            expense.description
                        );
                    }
                }
            }
            ExpenseCommands::Remove { id } => {
                require_account(&store)?;
                store.remove_expense(id)?;
                println!("Removed expense {}", id);
            }
        },

        Commands::Summary { json } => {
            let orgs = store.list_organizations()?;
            let orders = store.list_food_orders()?;
            let invoices = store.list_invoices()?;
            let expenses = store.list_expenses()?;

            let order_total: f64 = orders.iter().map(|o| o.total_cost).sum();
            let invoiced: f64 = invoices.iter().map(|i| i.amount).sum();
            let paid: f64 = invoices
                .iter()
                .filter(|i| i.status == InvoiceStatus::Paid)
                .map(|i| i.amount)
                .sum();
            let spent: f64 = expenses.iter().map(|e| e.amount).sum();

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "organizations": orgs.len(),
                        "orders": orders.len(),
                        "invoices": invoices.len(),
                        "expenses": expenses.len(),
                        "order_total": order_total,
                        "invoiced": invoiced,
                        "paid": paid,
                        "spent": spent,
                    }))
                    .context("serialize summary json")?
                );
            } else {
                println!(
                    "orgs={} orders={} invoices={} expenses={}",
                    orgs.len(),
                    orders.len(),
                    invoices.len(),
                    expenses.len()
                );
                println!(
                    "order_total={:.2} invoiced={:.2} paid={:.2} spent={:.2}",
                    order_total, invoiced, paid, spent
                );
            }
        }
    }

    Ok(())
}

fn require_account(store: &LocalStore) -> Result<AccountRecord> {
    let session = Session::restore(store)?;
    session
        .current()
        .cloned()
        .context("not logged in (run `canteen login`)")
}
