//! One form session: the order, its change observers, and the guard that
//! keeps late address lookups from overwriting newer edits.

use tracing::{debug, info};

use crate::error::{ExportError, XmlError};
use crate::lookup::{PlaceDetail, merge_place};
use crate::model::{AddressField, Defaults, HeaderField, LineField, LineItem, SalesOrder};
use crate::query::{QueryParams, decode, share_link};
use crate::validation::{Violation, export_xml, validate};
use crate::xml::build_sales_order_xml;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Header(HeaderField),
    Address(AddressField),
    Line { index: usize, field: LineField },
    LineAdded(usize),
    LineRemoved(usize),
    PlaceMerged(Vec<AddressField>),
}

/// Told about every mutation, after it has been applied.
pub trait OrderObserver {
    fn order_changed(&mut self, order: &SalesOrder, change: &Change);
}

/// Issued when a lookup starts; only the newest ticket issued since the
/// last address edit may merge a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupTicket {
    generation: u64,
    address_revision: u64,
}

impl LookupTicket {
    /// A ticket outside any session, for running lookups standalone.
    pub fn detached() -> Self {
        Self {
            generation: 0,
            address_revision: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Applied(Vec<AddressField>),
    Stale,
}

pub struct OrderSession {
    order: SalesOrder,
    defaults: Defaults,
    observers: Vec<Box<dyn OrderObserver>>,
    revision: u64,
    address_revision: u64,
    lookup_generation: u64,
    preview: Option<(u64, String)>,
}

impl OrderSession {
    pub fn new(defaults: Defaults) -> Self {
        let order = SalesOrder::new(&defaults);
        Self::seeded(order, defaults)
    }

    /// Seeds the session from link parameters; no parameters gives a fresh order.
    pub fn from_params(params: &QueryParams, defaults: Defaults) -> Self {
        if params.is_empty() {
            return Self::new(defaults);
        }
        let order = decode(params, &defaults);
        debug!(lines = order.lines.len(), "seeded order from link");
        Self::seeded(order, defaults)
    }

    pub fn seeded(order: SalesOrder, defaults: Defaults) -> Self {
        Self {
            order,
            defaults,
            observers: Vec::new(),
            revision: 0,
            address_revision: 0,
            lookup_generation: 0,
            preview: None,
        }
    }

    pub fn order(&self) -> &SalesOrder {
        &self.order
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribe(&mut self, observer: Box<dyn OrderObserver>) {
        self.observers.push(observer);
    }

    // ==========================================
    // Mutations
    // ==========================================

    pub fn set_header(&mut self, field: HeaderField, value: &str) {
        self.order.header.set(field, value, self.defaults.today);
        self.changed(Change::Header(field));
    }

    pub fn set_address(&mut self, field: AddressField, value: &str) {
        self.order.delivery.set(field, value);
        self.address_revision += 1;
        self.changed(Change::Address(field));
    }

    /// Returns false, changing nothing, when no line sits at `index`.
    pub fn set_line(&mut self, index: usize, field: LineField, value: &str) -> bool {
        if !self.order.set_line(index, field, value) {
            return false;
        }
        self.changed(Change::Line { index, field });
        true
    }

    /// Appends a new empty line and returns its index.
    pub fn add_line(&mut self) -> usize {
        let line = LineItem::new(&self.defaults.tax_code);
        self.push_line(line)
    }

    pub fn push_line(&mut self, line: LineItem) -> usize {
        self.order.lines.push(line);
        let index = self.order.lines.len() - 1;
        self.changed(Change::LineAdded(index));
        index
    }

    pub fn remove_line(&mut self, index: usize) -> Option<LineItem> {
        let removed = self.order.remove_line(index)?;
        self.changed(Change::LineRemoved(index));
        Some(removed)
    }

    pub fn begin_lookup(&mut self) -> LookupTicket {
        self.lookup_generation += 1;
        LookupTicket {
            generation: self.lookup_generation,
            address_revision: self.address_revision,
        }
    }

    pub fn is_current(&self, ticket: LookupTicket) -> bool {
        ticket.generation == self.lookup_generation && ticket.address_revision == self.address_revision
    }

    /// Merges a resolved place unless a newer lookup started or the address
    /// was edited since `ticket` was issued.
    pub fn apply_place(&mut self, ticket: LookupTicket, detail: &PlaceDetail) -> MergeOutcome {
        if !self.is_current(ticket) {
            debug!(?ticket, "dropping stale place result");
            return MergeOutcome::Stale;
        }
        let written = merge_place(detail, &mut self.order.delivery);
        if written.is_empty() {
            return MergeOutcome::Applied(written);
        }
        // A ticket merges at most once.
        self.address_revision += 1;
        info!(fields = written.len(), "merged place into delivery address");
        self.changed(Change::PlaceMerged(written.clone()));
        MergeOutcome::Applied(written)
    }

    fn changed(&mut self, change: Change) {
        self.revision += 1;
        self.preview = None;
        for observer in &mut self.observers {
            observer.order_changed(&self.order, &change);
        }
    }

    // ==========================================
    // Reads
    // ==========================================

    /// Current XML, rendered at most once per revision.
    pub fn preview(&mut self) -> Result<&str, XmlError> {
        let fresh = matches!(&self.preview, Some((rev, _)) if *rev == self.revision);
        if !fresh {
            let xml = build_sales_order_xml(&self.order, &self.defaults.tax_code)?;
            self.preview = Some((self.revision, xml));
        }
        Ok(self.preview.as_ref().map(|(_, xml)| xml.as_str()).unwrap_or_default())
    }

    pub fn validate(&self) -> Vec<Violation> {
        validate(&self.order, &self.defaults.tax_code)
    }

    pub fn export(&self) -> Result<String, ExportError> {
        export_xml(&self.order, &self.defaults)
    }

    pub fn share_link(&self, base_url: &str) -> String {
        share_link(base_url, &self.order)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;

    struct Recorder(Rc<RefCell<Vec<Change>>>);

    impl OrderObserver for Recorder {
        fn order_changed(&mut self, _order: &SalesOrder, change: &Change) {
            self.0.borrow_mut().push(change.clone());
        }
    }

    fn session() -> OrderSession {
        OrderSession::new(Defaults::with_today("T1", NaiveDate::from_ymd_opt(2025, 7, 7).unwrap()))
    }

    fn place(town: &str) -> PlaceDetail {
        PlaceDetail {
            formatted_address: format!("1 Road, {town}"),
            components: vec![crate::lookup::AddressComponent {
                long_name: town.into(),
                short_name: town.into(),
                types: vec!["postal_town".into()],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn every_mutation_is_observed() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut s = session();
        s.subscribe(Box::new(Recorder(Rc::clone(&log))));

        s.set_header(HeaderField::CustomerAccount, "C1");
        s.set_address(AddressField::Town, "York");
        let idx = s.add_line();
        assert!(s.set_line(idx, LineField::ProductCode, "P"));
        assert!(!s.set_line(9, LineField::ProductCode, "P"));
        s.remove_line(0);

        assert_eq!(
            *log.borrow(),
            vec![
                Change::Header(HeaderField::CustomerAccount),
                Change::Address(AddressField::Town),
                Change::LineAdded(1),
                Change::Line { index: 1, field: LineField::ProductCode },
                Change::LineRemoved(0),
            ]
        );
        assert_eq!(s.revision(), 5);
    }

    #[test]
    fn preview_is_never_stale() {
        let mut s = session();
        let before = s.preview().unwrap().to_string();
        assert_eq!(s.preview().unwrap(), before);

        s.set_header(HeaderField::CustomerAccount, "C1");
        let after = s.preview().unwrap();
        assert_ne!(after, before);
        assert!(after.contains("<CustomerAccountRef>C1</CustomerAccountRef>"));
    }

    #[test]
    fn newer_lookup_wins() {
        let mut s = session();
        let first = s.begin_lookup();
        let second = s.begin_lookup();

        assert_eq!(s.apply_place(first, &place("Leeds")), MergeOutcome::Stale);
        assert!(matches!(s.apply_place(second, &place("York")), MergeOutcome::Applied(_)));
        assert_eq!(s.order().delivery.town, "York");
    }

    #[test]
    fn address_edit_after_lookup_start_wins() {
        let mut s = session();
        let ticket = s.begin_lookup();
        s.set_address(AddressField::Town, "Hull");
        assert_eq!(s.apply_place(ticket, &place("Leeds")), MergeOutcome::Stale);
        assert_eq!(s.order().delivery.town, "Hull");
    }

    #[test]
    fn header_edits_do_not_invalidate_lookups() {
        let mut s = session();
        let ticket = s.begin_lookup();
        s.set_header(HeaderField::Reference, "R");
        assert!(matches!(s.apply_place(ticket, &place("Leeds")), MergeOutcome::Applied(_)));
    }

    #[test]
    fn merged_ticket_is_spent() {
        let mut s = session();
        let ticket = s.begin_lookup();
        s.apply_place(ticket, &place("Leeds"));
        assert!(!s.is_current(ticket));
        assert_eq!(s.apply_place(ticket, &place("York")), MergeOutcome::Stale);
    }

    #[test]
    fn seeding_from_empty_params_is_fresh() {
        let d = Defaults::with_today("T1", NaiveDate::from_ymd_opt(2025, 7, 7).unwrap());
        let s = OrderSession::from_params(&QueryParams::default(), d.clone());
        assert_eq!(s.order(), &SalesOrder::new(&d));
    }
}
