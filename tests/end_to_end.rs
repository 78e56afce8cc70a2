use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use sales_order_entry::lookup::{AddressComponent, PlaceDetail};
use sales_order_entry::query::{QueryParams, decode_str, to_query_string};
use sales_order_entry::validation::Violation;
use sales_order_entry::xml::build_sales_order_xml;
use sales_order_entry::{
    AddressField, Defaults, HeaderField, LineField, LineItem, MergeOutcome, OrderSession, SalesOrder,
};

fn defaults() -> Defaults {
    Defaults::with_today("T1", NaiveDate::from_ymd_opt(2025, 9, 1).unwrap())
}

#[test]
fn widget_order_validates_and_exports() {
    let mut session = OrderSession::new(defaults());
    session.set_header(HeaderField::CustomerAccount, "CUST1");
    session.set_line(0, LineField::ProductCode, "WIDGET");
    session.set_line(0, LineField::Quantity, "2");
    session.set_line(0, LineField::UnitPrice, "9.5");

    assert_eq!(session.validate(), vec![]);
    let xml = session.export().unwrap();
    assert!(xml.contains("<CustomerAccountRef>CUST1</CustomerAccountRef>"));
    assert_eq!(xml.matches("<Line>").count(), 1);
    assert!(xml.contains(
        "<Line><Number>1</Number><ProductCode>WIDGET</ProductCode><Description/>\
         <Quantity>2</Quantity><UnitPrice>9.5</UnitPrice>"
    ));
}

#[test]
fn untouched_order_only_misses_the_account() {
    let d = defaults();
    let order = SalesOrder::new(&d);
    assert_eq!(order.lines[0].quantity, 1.0, "a new line starts at quantity 1");

    let session = OrderSession::seeded(order, d);
    let messages: Vec<String> = session.validate().iter().map(ToString::to_string).collect();
    assert_eq!(messages, vec!["Customer Account Ref is required."]);
}

#[test]
fn removing_a_line_renumbers_violations() {
    let mut session = OrderSession::new(defaults());
    session.set_header(HeaderField::CustomerAccount, "C");
    session.set_line(0, LineField::ProductCode, "A");
    let second = session.add_line();
    session.set_line(second, LineField::ProductCode, "B");
    let third = session.add_line();
    session.set_line(third, LineField::ProductCode, "C");
    session.set_line(third, LineField::Quantity, "0");

    assert_eq!(session.validate(), vec![Violation::NonPositiveQuantity(3)]);
    session.remove_line(0);
    assert_eq!(session.validate(), vec![Violation::NonPositiveQuantity(2)]);
    assert!(session.preview().unwrap().contains("<Number>2</Number><ProductCode>C</ProductCode>"));
}

#[test]
fn legacy_link_seeds_one_line() {
    let d = defaults();
    let session = OrderSession::from_params(&QueryParams::parse("line_product_code=ABC&line_qty=3"), d.clone());
    assert_eq!(
        session.order().lines,
        vec![LineItem {
            product_code: "ABC".into(),
            quantity: 3.0,
            ..LineItem::new(&d.tax_code)
        }]
    );
}

#[test]
fn shared_link_rebuilds_the_same_export() {
    let d = defaults();
    let mut session = OrderSession::new(d.clone());
    session.set_header(HeaderField::OrderNumber, "SO-100");
    session.set_header(HeaderField::CustomerAccount, "ACME01");
    session.set_header(HeaderField::Notes, "Ring bell & wait\nthen leave");
    session.set_header(HeaderField::OrderDate, "2025-08-15");
    session.set_address(AddressField::Company, "Acme Ltd");
    session.set_address(AddressField::PostCode, "LS1 4AP");
    session.set_line(0, LineField::ProductCode, "BOLT-M6");
    session.set_line(0, LineField::Quantity, "250");
    session.set_line(0, LineField::UnitPrice, "0.04");
    let i = session.add_line();
    session.set_line(i, LineField::Description, "Carriage");
    session.set_line(i, LineField::TaxCode, "T0");
    session.add_line();

    let link = session.share_link("https://orders.example/form");
    let tomorrow = Defaults::with_today("T1", NaiveDate::from_ymd_opt(2025, 9, 2).unwrap());
    let mut reopened = OrderSession::from_params(&QueryParams::parse(&link), tomorrow);

    let original = session.preview().unwrap().to_string();
    assert_eq!(reopened.preview().unwrap(), original);
    assert_eq!(reopened.order().lines.len(), 3);
}

#[test]
fn fresh_order_link_is_minimal() {
    let d = defaults();
    let order = SalesOrder::new(&d);
    let query = to_query_string(&order);
    assert_eq!(query, "order_date=2025-09-01&line0_qty=1&line0_unit_price=0&line0_tax_code=T1");

    let back = decode_str(&query, &d);
    assert_eq!(
        build_sales_order_xml(&back, "T1").unwrap(),
        build_sales_order_xml(&order, "T1").unwrap()
    );
}

#[test]
fn address_pick_updates_preview_and_link() {
    let mut session = OrderSession::new(defaults());
    session.set_address(AddressField::Contact, "Jo Bloggs");
    let ticket = session.begin_lookup();
    let detail = PlaceDetail {
        formatted_address: "1 Park Row, Leeds LS1 5HN, UK".into(),
        location: None,
        components: vec![
            AddressComponent {
                long_name: "1".into(),
                short_name: "1".into(),
                types: vec!["street_number".into()],
            },
            AddressComponent {
                long_name: "Park Row".into(),
                short_name: "Park Row".into(),
                types: vec!["route".into()],
            },
            AddressComponent {
                long_name: "Leeds".into(),
                short_name: "Leeds".into(),
                types: vec!["postal_town".into()],
            },
            AddressComponent {
                long_name: "United Kingdom".into(),
                short_name: "GB".into(),
                types: vec!["country".into(), "political".into()],
            },
        ],
    };

    let before = session.preview().unwrap().to_string();
    assert_eq!(
        session.apply_place(ticket, &detail),
        MergeOutcome::Applied(vec![
            AddressField::Address1,
            AddressField::Address2,
            AddressField::Town,
            AddressField::Country,
        ])
    );
    let after = session.preview().unwrap();
    assert_ne!(after, before);
    assert!(after.contains("<Contact>Jo Bloggs</Contact><Address1>1 Park Row</Address1>"));
    assert!(after.contains("<Town>Leeds</Town><PostCode/><Country>GB</Country>"));

    let link = session.share_link("http://localhost:8081/");
    assert!(link.contains("ship_addr1=1+Park+Row"));
    assert!(link.contains("ship_country=GB"));
}
