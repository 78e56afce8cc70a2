//! Sales order XML in the layout the accounts package imports.
//!
//! No totals are written.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::debug;

use crate::error::XmlError;
use crate::model::{AddressField, LineItem, SalesOrder};
use crate::parse::format_number;

pub const EXPORT_FILE_NAME: &str = "sales_order.xml";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

pub fn build_sales_order_xml(order: &SalesOrder, default_tax_code: &str) -> Result<String, XmlError> {
    let mut w = Writer::new(Cursor::new(Vec::new()));
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    open(&mut w, "SalesOrders")?;
    open(&mut w, "SalesOrder")?;

    let header = &order.header;
    let order_date = header
        .order_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    leaf(&mut w, "SalesOrderNumber", &header.order_number)?;
    leaf(&mut w, "CustomerAccountRef", &header.customer_account)?;
    leaf(&mut w, "CustomerOrderNumber", &header.customer_order_number)?;
    leaf(&mut w, "OrderDate", &order_date)?;
    leaf(&mut w, "Currency", &header.currency)?;
    leaf(&mut w, "Reference", &header.reference)?;
    leaf(&mut w, "Notes", &header.notes)?;

    open(&mut w, "DeliveryAddress")?;
    for field in AddressField::ALL {
        leaf(&mut w, address_tag(field), order.delivery.get(field))?;
    }
    close(&mut w, "DeliveryAddress")?;

    open(&mut w, "Lines")?;
    for (number, line) in order.numbered_lines() {
        write_line(&mut w, number, line, default_tax_code)?;
    }
    close(&mut w, "Lines")?;

    close(&mut w, "SalesOrder")?;
    close(&mut w, "SalesOrders")?;

    let xml = String::from_utf8(w.into_inner().into_inner())?;
    debug!(lines = order.lines.len(), bytes = xml.len(), "rendered sales order xml");
    Ok(xml)
}

fn write_line(w: &mut XmlWriter, number: usize, line: &LineItem, default_tax_code: &str) -> Result<(), XmlError> {
    open(w, "Line")?;
    leaf(w, "Number", &number.to_string())?;
    leaf(w, "ProductCode", &line.product_code)?;
    leaf(w, "Description", &line.description)?;
    leaf(w, "Quantity", &format_number(line.quantity))?;
    leaf(w, "UnitPrice", &format_number(line.unit_price))?;
    leaf(w, "TaxCode", line.effective_tax_code(default_tax_code))?;
    leaf(w, "NominalCode", &line.nominal_code)?;
    leaf(w, "DepartmentCode", &line.department)?;
    close(w, "Line")
}

fn address_tag(field: AddressField) -> &'static str {
    match field {
        AddressField::Company => "Company",
        AddressField::Contact => "Contact",
        AddressField::Address1 => "Address1",
        AddressField::Address2 => "Address2",
        AddressField::Town => "Town",
        AddressField::PostCode => "PostCode",
        AddressField::Country => "Country",
        AddressField::Telephone => "Telephone",
    }
}

fn open(w: &mut XmlWriter, tag: &str) -> Result<(), XmlError> {
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    Ok(())
}

fn close(w: &mut XmlWriter, tag: &str) -> Result<(), XmlError> {
    w.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

// Empty values still get an element, just a self-closing one.
fn leaf(w: &mut XmlWriter, tag: &str, text: &str) -> Result<(), XmlError> {
    if text.is_empty() {
        w.write_event(Event::Empty(BytesStart::new(tag)))?;
        return Ok(());
    }
    open(w, tag)?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    close(w, tag)
}
