use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kiosk_api::{InProcApi, KioskApi, ListView, MemoryAuth, Settings};
use kiosk_core::{Collection, Document, Fields, KioskError};
use kiosk_persist::SqliteStore;
use kiosk_source::{CollectionSource, DocumentStore};
use metrics::counter;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kioskctl", version, about = "Kiosk back-office CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// SQLite database file
    #[arg(long = "db", global = true, env = "KIOSK_DB_PATH")]
    db: Option<String>,

    /// Admin email used to sign in
    #[arg(long = "email", global = true, env = "KIOSK_ADMIN_EMAIL")]
    email: Option<String>,

    /// Admin password used to sign in
    #[arg(long = "password", global = true, env = "KIOSK_ADMIN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert demo documents into every collection
    Seed {
        /// Number of products to create
        #[arg(long = "count", default_value_t = 12)]
        count: usize,
    },
    /// List one page (or every page) of a collection
    Ls {
        /// categories, products, tags, vouchers or orders
        collection: Collection,
        /// Sort option, e.g. "price-asc" (default: KIOSK_DEFAULT_SORT)
        #[arg(long = "sort")]
        sort: Option<String>,
        /// Page size; must be one of KIOSK_PAGE_SIZES
        #[arg(long = "page-size")]
        page_size: Option<usize>,
        /// Page to show
        #[arg(long = "page", default_value_t = 1)]
        page: usize,
        /// Walk every page in order
        #[arg(long = "all", action = ArgAction::SetTrue)]
        all: bool,
    },
    /// Document counts per collection
    Count {
        collection: Option<Collection>,
    },
    /// Create a document from a JSON object
    Create {
        collection: Collection,
        #[arg(long = "json")]
        json: String,
    },
    /// Merge JSON fields into a document
    Update {
        collection: Collection,
        id: String,
        #[arg(long = "json")]
        json: String,
    },
    /// Delete a document
    Rm {
        collection: Collection,
        id: String,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Seed { .. } => "seed",
            Commands::Ls { .. } => "ls",
            Commands::Count { .. } => "count",
            Commands::Create { .. } => "create",
            Commands::Update { .. } => "update",
            Commands::Rm { .. } => "rm",
        }
    }
}

fn init_tracing() {
    let env = std::env::var("KIOSK_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics(settings: &Settings) {
    if let Some(addr) = &settings.metrics_addr {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KIOSK_METRICS_ADDR; expected host:port");
        }
    }
}

fn parse_fields(json: &str) -> Result<Fields> {
    let v: serde_json::Value = serde_json::from_str(json).context("parsing --json")?;
    match v {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--json must be a JSON object"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut settings = Settings::from_env();
    if cli.db.is_some() {
        settings.db_path = cli.db.clone();
    }
    init_metrics(&settings);

    let store: Arc<dyn DocumentStore> = Arc::new(match &settings.db_path {
        Some(path) => SqliteStore::open(path)?,
        None => SqliteStore::open_default()?,
    });
    let auth = Arc::new(MemoryAuth::from_settings(&settings));
    let api = InProcApi::new(store.clone(), auth, settings);

    let email = cli.email.as_deref().context("admin email required (--email or KIOSK_ADMIN_EMAIL)")?;
    let password = cli.password.as_deref().context("admin password required (--password or KIOSK_ADMIN_PASSWORD)")?;
    api.sign_in(email, password).await?;

    counter!("kioskctl_commands_total", 1u64, "cmd" => cli.command.name());
    match cli.command {
        Commands::Seed { count } => {
            info!(count, "seed invoked");
            let created = seed(store.as_ref(), count).await?;
            match cli.output {
                Output::Human => println!("seeded {} documents", created),
                Output::Json => println!("{}", serde_json::json!({ "created": created })),
            }
        }
        Commands::Ls { collection, sort, page_size, page, all } => {
            info!(collection = %collection, sort = ?sort, page_size = ?page_size, page, all, "ls invoked");
            let view = api.open_list(collection).await?;
            if let Some(sort) = &sort {
                view.on_sort_change(sort).await?;
            }
            if let Some(n) = page_size {
                view.on_page_size_change(n).await?;
            }
            if all {
                loop {
                    print_page(&view, cli.output)?;
                    if !view.next_page().await? {
                        break;
                    }
                }
            } else {
                if page > 1 {
                    view.go_to_page(page).await?;
                }
                print_page(&view, cli.output)?;
            }
        }
        Commands::Count { collection } => {
            let stats = api.stats().await?;
            let rows: Vec<_> = stats.counts.into_iter().filter(|(c, _)| collection.map_or(true, |want| want == *c)).collect();
            match cli.output {
                Output::Human => {
                    for (c, n) in &rows {
                        println!("{:<11} {}", c, n);
                    }
                }
                Output::Json => {
                    let map: serde_json::Map<String, serde_json::Value> =
                        rows.iter().map(|(c, n)| (c.to_string(), serde_json::json!(n))).collect();
                    println!("{}", serde_json::to_string_pretty(&map)?);
                }
            }
        }
        Commands::Create { collection, json } => {
            let src = CollectionSource::new(store.clone(), collection);
            let doc = src.create(parse_fields(&json)?).await?;
            print_doc(&doc, cli.output)?;
        }
        Commands::Update { collection, id, json } => {
            let src = CollectionSource::new(store.clone(), collection);
            let doc = src.update(&id, parse_fields(&json)?).await?;
            print_doc(&doc, cli.output)?;
        }
        Commands::Rm { collection, id } => {
            let src = CollectionSource::new(store.clone(), collection);
            let removed = src.delete(&id).await?;
            match cli.output {
                Output::Human => println!("deleted {}/{}", collection, removed),
                Output::Json => println!("{}", serde_json::json!({ "deleted": removed })),
            }
        }
    }

    Ok(())
}

fn print_page(view: &ListView, output: Output) -> Result<()> {
    let st = view.state();
    match output {
        Output::Human => {
            let pages = st.total_pages.map(|t| t.to_string()).unwrap_or_else(|| "?".to_string());
            println!("-- {} page {}/{} (sort {}, {} per page)", view.collection(), st.current_page, pages, st.sort, st.page_size);
            println!("{:<32} {:<28} AGE", "ID", "LABEL");
            for d in &st.current_page_items {
                println!("{:<32} {:<28} {}", d.id, d.label(), render_age(d.created_at));
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&st)?),
    }
    Ok(())
}

fn print_doc(doc: &Document, output: Output) -> Result<()> {
    match output {
        Output::Human => println!("{} {}", doc.id, doc.label()),
        Output::Json => println!("{}", serde_json::to_string_pretty(doc)?),
    }
    Ok(())
}

fn render_age(created_ms: i64) -> String {
    let Some(created) = kiosk_core::millis_to_utc(created_ms) else { return "-".to_string() };
    let mut secs = (chrono::Utc::now() - created).num_seconds().max(0) as u64;
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("{}d{}h", days, hours) }
    else if hours > 0 { format!("{}h{}m", hours, mins) }
    else if mins > 0 { format!("{}m", mins) }
    else { format!("{}s", secs) }
}

fn obj(v: serde_json::Value) -> Fields { v.as_object().cloned().unwrap_or_default() }

/// Insert demo data; documents clashing with existing unique names are skipped.
async fn seed(store: &dyn DocumentStore, products: usize) -> Result<usize> {
    const CATEGORIES: [&str; 4] = ["Shoes", "Hats", "Bags", "Scarves"];
    const TAGS: [&str; 3] = ["sale", "new", "limited"];
    let mut docs: Vec<(Collection, Fields)> = Vec::new();
    for name in CATEGORIES {
        docs.push((Collection::Categories, obj(serde_json::json!({ "name": name }))));
    }
    for name in TAGS {
        docs.push((Collection::Tags, obj(serde_json::json!({ "name": name }))));
    }
    for i in 0..products {
        docs.push((
            Collection::Products,
            obj(serde_json::json!({
                "name": format!("Product {:02}", i + 1),
                "price": ((i * 37) % 90 + 10) as f64 + 0.99,
                "stock": (i * 7) % 25,
                "category": CATEGORIES[i % CATEGORIES.len()],
            })),
        ));
    }
    for (i, pct) in [10, 15, 25].iter().enumerate() {
        docs.push((
            Collection::Vouchers,
            obj(serde_json::json!({ "code": format!("SAVE{}", pct), "discountPercentage": pct, "expiryDate": format!("2030-0{}-01", i + 1) })),
        ));
    }
    for (i, customer) in ["Ann", "Bob", "Cy"].iter().enumerate() {
        docs.push((
            Collection::Orders,
            obj(serde_json::json!({ "customerName": customer, "total": 20.0 * (i + 1) as f64, "status": "pending" })),
        ));
    }

    let mut created = 0usize;
    for (collection, fields) in docs {
        match store.insert(collection, fields).await {
            Ok(_) => created += 1,
            Err(KioskError::Mutation(msg)) => warn!(collection = %collection, error = %msg, "seed: skipped"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(created)
}
