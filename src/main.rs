mod form;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use comfy_table::{Cell, Table};
use inquire::Text;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sales_order_entry::config::{self, Settings};
use sales_order_entry::lookup::{AddressSearch, spawn_resolve, spawn_search};
use sales_order_entry::query::QueryParams;
use sales_order_entry::xml::EXPORT_FILE_NAME;
use sales_order_entry::{MergeOutcome, OrderSession};

// ==========================================
// Structs & Enums
// ==========================================

#[derive(Parser)]
#[command(name = "sales-order-entry", version)]
#[command(about = "Compose sales orders, preview the XML export and share prefilled links")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Tax code for lines that leave it empty
    #[arg(long, global = true, env = "SALES_ORDER_TAX_CODE")]
    tax_code: Option<String>,

    /// Google Maps API key for address search
    #[arg(long, global = true, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
    google_maps_api_key: Option<String>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the order form, prefilled from a shared link if given
    Edit { link: Option<String> },
    /// Print the XML export of an order
    Preview { link: Option<String> },
    /// List the issues that block an export
    Validate {
        link: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Validate and write the XML export
    Export {
        link: Option<String>,
        #[arg(short, long, default_value = EXPORT_FILE_NAME)]
        output: PathBuf,
    },
    /// Print the canonical share link for an order
    Share { link: Option<String> },
    /// Show the decoded order
    Show {
        link: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Search for a delivery address
    Search {
        #[arg(required = true)]
        text: Vec<String>,
        /// Merge the Nth result (1-based) into the linked order and print the new link
        #[arg(long)]
        pick: Option<usize>,
        #[arg(long)]
        link: Option<String>,
    },
    /// Configure the default tax code, API key and share address
    Config,
}

// ==========================================
// Main Function
// ==========================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let settings = load_settings().with_overrides(cli.tax_code, cli.google_maps_api_key);

    match command {
        Commands::Edit { link } => {
            let mut session = open_session(link.as_deref(), &settings);
            let search = AddressSearch::from_settings(&settings);
            form::run(&mut session, &settings, &search)?;
        }
        Commands::Preview { link } => {
            let mut session = open_session(link.as_deref(), &settings);
            println!("{}", session.preview()?);
        }
        Commands::Validate { link, json } => {
            let session = open_session(link.as_deref(), &settings);
            let violations = session.validate();
            if json {
                println!("{}", serde_json::to_string_pretty(&violations)?);
            } else if violations.is_empty() {
                println!("✅ Order is ready to export.");
            } else {
                form::print_violations(&violations);
            }
            if !violations.is_empty() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Export { link, output } => {
            let session = open_session(link.as_deref(), &settings);
            let violations = session.validate();
            if !violations.is_empty() {
                form::print_violations(&violations);
                bail!("export blocked by {} validation issue(s)", violations.len());
            }
            let xml = session.export()?;
            fs::write(&output, xml).with_context(|| format!("writing {}", output.display()))?;
            println!("✅ XML saved: {}", output.display());
        }
        Commands::Share { link } => {
            let session = open_session(link.as_deref(), &settings);
            println!("{}", session.share_link(&settings.share_base_url));
        }
        Commands::Show { link, json } => {
            let session = open_session(link.as_deref(), &settings);
            if json {
                println!("{}", serde_json::to_string_pretty(session.order())?);
            } else {
                form::print_order(session.order(), &session.defaults().tax_code);
            }
        }
        Commands::Search { text, pick, link } => {
            return search_command(&settings, &text.join(" "), pick, link.as_deref());
        }
        Commands::Config => setup_config_wizard()?,
    }
    Ok(ExitCode::SUCCESS)
}

fn open_session(link: Option<&str>, settings: &Settings) -> OrderSession {
    let params = QueryParams::parse(link.unwrap_or_default());
    OrderSession::from_params(&params, settings.defaults())
}

// ==========================================
// Address search
// ==========================================

fn search_command(settings: &Settings, text: &str, pick: Option<usize>, link: Option<&str>) -> Result<ExitCode> {
    let search = AddressSearch::from_settings(settings);
    if let Some(advice) = search.advisory() {
        println!("⚠️  {advice}");
        return Ok(ExitCode::FAILURE);
    }
    let service = search.service()?;
    let mut session = open_session(link, settings);

    println!("🔍 Searching for \"{text}\"...");
    let ticket = session.begin_lookup();
    let (_, found) = spawn_search(service.clone(), ticket, text.to_string()).wait();
    let candidates = match found {
        Ok(c) => c,
        Err(e) => {
            println!("❌ Search failed: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    if candidates.is_empty() {
        println!("No results found.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table.set_header(vec![Cell::new("#"), Cell::new("Address"), Cell::new("Place ID")]);
    for (i, c) in candidates.iter().enumerate() {
        table.add_row(vec![Cell::new(i + 1), Cell::new(&c.description), Cell::new(&c.id)]);
    }
    println!("{table}");

    let Some(n) = pick else {
        return Ok(ExitCode::SUCCESS);
    };
    let Some(chosen) = n.checked_sub(1).and_then(|i| candidates.get(i)) else {
        bail!("--pick must be between 1 and {}", candidates.len());
    };

    let (ticket, resolved) = spawn_resolve(service, ticket, chosen.id.clone()).wait();
    let detail = match resolved {
        Ok(d) => d,
        Err(e) => {
            println!("❌ Failed to fetch place details: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    match session.apply_place(ticket, &detail) {
        MergeOutcome::Applied(_) => {
            println!("✅ Selected {}", chosen.description);
            if let Some(map) = detail.map_url() {
                println!("🗺  {map}");
            }
            println!("{}", session.share_link(&settings.share_base_url));
        }
        MergeOutcome::Stale => println!("⚠️  Address changed before the lookup finished; result discarded."),
    }
    Ok(ExitCode::SUCCESS)
}

// ==========================================
// Config & Utilities
// ==========================================

fn load_settings() -> Settings {
    let path = config::config_path();
    match config::load_from(&path) {
        Ok(found) => found.unwrap_or_default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
            Settings::default()
        }
    }
}

fn setup_config_wizard() -> Result<()> {
    println!("\n⚙️  --- Configuration Setup ---");
    let current = load_settings();

    let tax_code = Text::new("Default Tax Code:")
        .with_default(&current.default_tax_code)
        .prompt()?;
    let api_key = Text::new("Google Maps API key (leave empty to keep current, '-' to remove):").prompt()?;
    let share_base_url = Text::new("Share link base URL:")
        .with_default(&current.share_base_url)
        .prompt()?;

    let google_maps_api_key = match api_key.trim() {
        "" => current.google_maps_api_key.clone(),
        "-" => None,
        key => Some(key.to_string()),
    };
    let settings = Settings {
        default_tax_code: tax_code.trim().to_string(),
        google_maps_api_key,
        share_base_url: share_base_url.trim().to_string(),
    };

    let path = config::config_path();
    config::save_to(&path, &settings)?;
    println!("✅ Settings saved to {}", path.display());
    Ok(())
}
