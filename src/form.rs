//! Interactive order form. Each prompt answer is one edit event applied to
//! the session before the next prompt is shown. Address lookups run in the
//! background and are checked between prompts.

use std::cell::Cell as Flag;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use comfy_table::{Cell, Color, Table};
use inquire::{DateSelect, InquireError, Select, Text};

use sales_order_entry::config::Settings;
use sales_order_entry::lookup::{
    AddressSearch, PendingLookup, PlaceCandidate, PlaceDetail, spawn_resolve, spawn_search,
};
use sales_order_entry::model::{AddressField, HeaderField, LineField, SalesOrder};
use sales_order_entry::validation::Violation;
use sales_order_entry::xml::{EXPORT_FILE_NAME, build_sales_order_xml};
use sales_order_entry::{Change, MergeOutcome, OrderObserver, OrderSession};

#[derive(Debug, Clone, Copy)]
enum Action {
    EditHeader,
    EditAddress,
    SearchAddress,
    AddLine,
    EditLine,
    RemoveLine,
    ShowPreview,
    ToggleLivePreview,
    CopyLink,
    Download,
    Refresh,
    Quit,
}

impl Action {
    const ALL: [Action; 12] = [
        Action::EditHeader,
        Action::EditAddress,
        Action::SearchAddress,
        Action::AddLine,
        Action::EditLine,
        Action::RemoveLine,
        Action::ShowPreview,
        Action::ToggleLivePreview,
        Action::CopyLink,
        Action::Download,
        Action::Refresh,
        Action::Quit,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::EditHeader => "Edit Order Details",
            Action::EditAddress => "Edit Delivery Address",
            Action::SearchAddress => "Search Delivery Location (Google)",
            Action::AddLine => "Add Line Item",
            Action::EditLine => "Edit Line Item",
            Action::RemoveLine => "Remove Line Item",
            Action::ShowPreview => "Show XML Preview",
            Action::ToggleLivePreview => "Toggle Live XML Preview",
            Action::CopyLink => "Copy Prefilled Link",
            Action::Download => "Download XML",
            Action::Refresh => "Refresh",
            Action::Quit => "Quit",
        };
        f.write_str(label)
    }
}

/// An address lookup the form is still waiting on.
enum InFlight {
    Search(PendingLookup<Vec<PlaceCandidate>>),
    Resolve {
        pending: PendingLookup<PlaceDetail>,
        description: String,
    },
}

/// Reprints the XML after every edit while switched on.
struct LivePreview {
    enabled: Rc<Flag<bool>>,
    tax_code: String,
}

impl OrderObserver for LivePreview {
    fn order_changed(&mut self, order: &SalesOrder, _change: &Change) {
        if !self.enabled.get() {
            return;
        }
        match build_sales_order_xml(order, &self.tax_code) {
            Ok(xml) => println!("\n--- XML Preview ---\n{xml}\n"),
            Err(e) => println!("❌ Preview failed: {e}"),
        }
    }
}

pub fn run(session: &mut OrderSession, settings: &Settings, search: &AddressSearch) -> Result<()> {
    let live = Rc::new(Flag::new(false));
    session.subscribe(Box::new(LivePreview {
        enabled: Rc::clone(&live),
        tax_code: session.defaults().tax_code.clone(),
    }));

    println!("\n--- Sales Order Entry ---");
    if let Some(advice) = search.advisory() {
        println!("⚠️  {advice}");
    }

    let mut in_flight = None;
    loop {
        in_flight = poll_lookup(session, search, in_flight)?;
        print_order(session.order(), &session.defaults().tax_code);
        let Some(action) = ask(Select::new("What next?", Action::ALL.to_vec()).with_page_size(12).prompt())? else {
            continue;
        };
        match action {
            Action::EditHeader => edit_header(session)?,
            Action::EditAddress => edit_address(session)?,
            Action::SearchAddress => {
                if let Some(started) = search_address(session, search)? {
                    if in_flight.is_some() {
                        println!("Previous address search superseded.");
                    }
                    in_flight = Some(started);
                }
            }
            Action::AddLine => {
                let idx = session.add_line();
                println!("✅ Added line {}", idx + 1);
                edit_line_fields(session, idx)?;
            }
            Action::EditLine => {
                if let Some(idx) = pick_line(session.order(), "Edit which line?")? {
                    edit_line_fields(session, idx)?;
                }
            }
            Action::RemoveLine => {
                if let Some(idx) = pick_line(session.order(), "Remove which line?")? {
                    session.remove_line(idx);
                    println!("🗑  Removed line {}", idx + 1);
                }
            }
            Action::ShowPreview => println!("\n--- XML Preview ---\n{}\n", session.preview()?),
            Action::ToggleLivePreview => {
                live.set(!live.get());
                println!("Live preview {}", if live.get() { "on" } else { "off" });
            }
            Action::CopyLink => {
                println!("🔗 Prefilled link:\n{}", session.share_link(&settings.share_base_url));
            }
            Action::Download => download_xml(session)?,
            Action::Refresh => {}
            Action::Quit => return Ok(()),
        }
    }
}

// Esc backs out of a prompt; Ctrl-C still aborts the session.
fn ask<T>(answer: Result<T, InquireError>) -> Result<Option<T>> {
    match answer {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ==========================================
// Field editing
// ==========================================

fn edit_header(session: &mut OrderSession) -> Result<()> {
    let options: Vec<String> = HeaderField::ALL
        .iter()
        .map(|f| format!("{}: {}", f.label(), session.order().header.get(*f)))
        .collect();
    let Some(choice) = ask(Select::new("Which field?", options).raw_prompt())? else {
        return Ok(());
    };
    let field = HeaderField::ALL[choice.index];
    let current = session.order().header.get(field);

    let value = if field == HeaderField::OrderDate {
        let start = session.order().header.order_date.unwrap_or(session.defaults().today);
        ask(DateSelect::new("Order Date:").with_default(start).prompt())?.map(|d| d.format("%Y-%m-%d").to_string())
    } else {
        ask(Text::new(&format!("{}:", field.label())).with_initial_value(&current).prompt())?
    };
    if let Some(value) = value {
        session.set_header(field, &value);
    }
    Ok(())
}

fn edit_address(session: &mut OrderSession) -> Result<()> {
    let options: Vec<String> = AddressField::ALL
        .iter()
        .map(|f| format!("{}: {}", f.label(), session.order().delivery.get(*f)))
        .collect();
    let Some(choice) = ask(Select::new("Which field?", options).raw_prompt())? else {
        return Ok(());
    };
    let field = AddressField::ALL[choice.index];
    let current = session.order().delivery.get(field).to_string();
    if let Some(value) = ask(Text::new(&format!("{}:", field.label())).with_initial_value(&current).prompt())? {
        session.set_address(field, &value);
    }
    Ok(())
}

fn pick_line(order: &SalesOrder, message: &str) -> Result<Option<usize>> {
    if order.lines.is_empty() {
        println!("No line items yet.");
        return Ok(None);
    }
    let options: Vec<String> = order
        .numbered_lines()
        .map(|(n, line)| {
            let code = if line.product_code.is_empty() { "(no product code)" } else { &line.product_code };
            format!("Line {n}: {code} {}", line.description)
        })
        .collect();
    Ok(ask(Select::new(message, options).raw_prompt())?.map(|choice| choice.index))
}

fn edit_line_fields(session: &mut OrderSession, idx: usize) -> Result<()> {
    println!("(Esc keeps a field as it is)");
    for field in LineField::ALL {
        let Some(line) = session.order().lines.get(idx) else {
            return Ok(());
        };
        let current = line.get(field);
        let prompt = format!("Line {} {}:", idx + 1, field.label());
        if let Some(value) = ask(Text::new(&prompt).with_initial_value(&current).prompt())? {
            if value != current {
                session.set_line(idx, field, &value);
            }
        }
    }
    Ok(())
}

// ==========================================
// Address search
// ==========================================

fn search_address(session: &mut OrderSession, search: &AddressSearch) -> Result<Option<InFlight>> {
    let service = match search.service() {
        Ok(s) => s,
        Err(e) => {
            println!("⚠️  {e}");
            return Ok(None);
        }
    };
    let Some(query) = ask(Text::new("Search address...").with_placeholder("e.g. 10 Downing Street, London").prompt())?
    else {
        return Ok(None);
    };
    if query.trim().is_empty() {
        return Ok(None);
    }

    println!("🔍 Searching... keep editing, results show up when ready.");
    let ticket = session.begin_lookup();
    Ok(Some(InFlight::Search(spawn_search(service, ticket, query))))
}

/// Moves a lookup on if its answer has arrived. Returns what is still pending.
fn poll_lookup(
    session: &mut OrderSession,
    search: &AddressSearch,
    in_flight: Option<InFlight>,
) -> Result<Option<InFlight>> {
    match in_flight {
        None => Ok(None),
        Some(InFlight::Search(mut pending)) => {
            let Some((ticket, found)) = pending.try_take() else {
                println!("🔍 Address search still running...");
                return Ok(Some(InFlight::Search(pending)));
            };
            if !session.is_current(ticket) {
                println!("⚠️  Address changed while searching; results discarded.");
                return Ok(None);
            }
            let candidates = match found {
                Ok(c) if c.is_empty() => {
                    println!("No results found.");
                    return Ok(None);
                }
                Ok(c) => c,
                Err(e) => {
                    println!("❌ Search failed: {e}");
                    return Ok(None);
                }
            };

            let Some(PlaceCandidate { id, description }) = ask(Select::new("Select a result:", candidates).prompt())?
            else {
                return Ok(None);
            };
            let service = match search.service() {
                Ok(s) => s,
                Err(e) => {
                    println!("⚠️  {e}");
                    return Ok(None);
                }
            };
            Ok(Some(InFlight::Resolve {
                pending: spawn_resolve(service, ticket, id),
                description,
            }))
        }
        Some(InFlight::Resolve { mut pending, description }) => {
            let Some((ticket, resolved)) = pending.try_take() else {
                println!("📍 Fetching {description}...");
                return Ok(Some(InFlight::Resolve { pending, description }));
            };
            let detail = match resolved {
                Ok(d) => d,
                Err(e) => {
                    println!("❌ Failed to fetch place details: {e}");
                    return Ok(None);
                }
            };
            match session.apply_place(ticket, &detail) {
                MergeOutcome::Applied(_) => {
                    println!("✅ Selected {description}");
                    if let Some(map) = detail.map_url() {
                        println!("🗺  {map}");
                    }
                }
                MergeOutcome::Stale => println!("⚠️  Address changed before the lookup finished; result discarded."),
            }
            Ok(None)
        }
    }
}

// ==========================================
// Download
// ==========================================

fn download_xml(session: &mut OrderSession) -> Result<()> {
    let violations = session.validate();
    if !violations.is_empty() {
        print_violations(&violations);
        println!("❌ Please fix validation issues before downloading.");
        return Ok(());
    }
    let xml = session.export()?;

    let picked = rfd::FileDialog::new()
        .set_title("Save Sales Order XML")
        .set_file_name(EXPORT_FILE_NAME)
        .add_filter("XML", &["xml"])
        .save_file();
    let path = match picked {
        Some(path) => path,
        None => match ask(Text::new("Save as:").with_default(EXPORT_FILE_NAME).prompt())? {
            Some(p) => PathBuf::from(p),
            None => return Ok(()),
        },
    };

    match fs::write(&path, xml) {
        Ok(()) => println!("✅ XML saved: {}", path.display()),
        Err(e) => println!("❌ Failed to save {}: {e}", path.display()),
    }
    Ok(())
}

// ==========================================
// Output
// ==========================================

pub fn print_violations(violations: &[Violation]) {
    println!("Please fix the following before download:");
    for v in violations {
        println!("- {v}");
    }
}

pub fn print_order(order: &SalesOrder, default_tax_code: &str) {
    let mut details = Table::new();
    details.set_header(vec![Cell::new("Order Details"), Cell::new("")]);
    for field in HeaderField::ALL {
        details.add_row(vec![Cell::new(field.label()), Cell::new(order.header.get(field))]);
    }
    for field in AddressField::ALL {
        details.add_row(vec![Cell::new(field.label()), Cell::new(order.delivery.get(field))]);
    }
    println!("{details}");

    let mut lines = Table::new();
    let mut header = vec![Cell::new("#")];
    header.extend(LineField::ALL.iter().map(|f| Cell::new(f.label())));
    lines.set_header(header);
    for (n, line) in order.numbered_lines() {
        let mut row = vec![Cell::new(n)];
        for field in LineField::ALL {
            let text = match field {
                LineField::TaxCode => line.effective_tax_code(default_tax_code).to_string(),
                _ => line.get(field),
            };
            let cell = Cell::new(text);
            // Highlight numbers that would block an export.
            let bad = match field {
                LineField::Quantity => line.quantity <= 0.0,
                LineField::UnitPrice => line.unit_price < 0.0,
                _ => false,
            };
            row.push(if bad { cell.fg(Color::Rgb { r: 185, g: 28, b: 28 }) } else { cell });
        }
        lines.add_row(row);
    }
    println!("{lines}");
}
