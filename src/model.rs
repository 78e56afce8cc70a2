use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::parse::{date_or, format_number, number_or};

pub const DEFAULT_TAX_CODE: &str = "T1"; // adjust for your Sage setup
pub const DEFAULT_CURRENCY: &str = "GBP";
pub const DEFAULT_COUNTRY: &str = "UK";
pub const DEFAULT_QUANTITY: f64 = 1.0;
pub const DEFAULT_UNIT_PRICE: f64 = 0.0;

/// Values a fresh model or a decoded link falls back to.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub tax_code: String,
    pub today: NaiveDate,
}

impl Defaults {
    pub fn new(tax_code: impl Into<String>) -> Self {
        Self::with_today(tax_code, Local::now().date_naive())
    }

    pub fn with_today(tax_code: impl Into<String>, today: NaiveDate) -> Self {
        let tax_code = tax_code.into();
        let tax_code = if tax_code.trim().is_empty() {
            DEFAULT_TAX_CODE.to_string()
        } else {
            tax_code
        };
        Self { tax_code, today }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::new(DEFAULT_TAX_CODE)
    }
}

// ==========================================
// Field names
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderField {
    OrderNumber,
    CustomerAccount,
    CustomerOrderNumber,
    OrderDate,
    Currency,
    Reference,
    Notes,
}

impl HeaderField {
    pub const ALL: [HeaderField; 7] = [
        HeaderField::OrderNumber,
        HeaderField::CustomerAccount,
        HeaderField::CustomerOrderNumber,
        HeaderField::OrderDate,
        HeaderField::Currency,
        HeaderField::Reference,
        HeaderField::Notes,
    ];

    pub fn key(self) -> &'static str {
        match self {
            HeaderField::OrderNumber => "order_number",
            HeaderField::CustomerAccount => "customer_account",
            HeaderField::CustomerOrderNumber => "customer_order_number",
            HeaderField::OrderDate => "order_date",
            HeaderField::Currency => "currency",
            HeaderField::Reference => "reference",
            HeaderField::Notes => "notes",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HeaderField::OrderNumber => "Order Number",
            HeaderField::CustomerAccount => "Customer Account Ref",
            HeaderField::CustomerOrderNumber => "Customer Order Number",
            HeaderField::OrderDate => "Order Date",
            HeaderField::Currency => "Currency",
            HeaderField::Reference => "Reference",
            HeaderField::Notes => "Notes",
        }
    }

    /// Value a field takes when nothing was supplied. The order date's
    /// default depends on the day and is handled separately.
    pub fn default_value(self) -> &'static str {
        match self {
            HeaderField::Currency => DEFAULT_CURRENCY,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressField {
    Company,
    Contact,
    Address1,
    Address2,
    Town,
    PostCode,
    Country,
    Telephone,
}

impl AddressField {
    pub const ALL: [AddressField; 8] = [
        AddressField::Company,
        AddressField::Contact,
        AddressField::Address1,
        AddressField::Address2,
        AddressField::Town,
        AddressField::PostCode,
        AddressField::Country,
        AddressField::Telephone,
    ];

    pub fn key(self) -> &'static str {
        match self {
            AddressField::Company => "ship_company",
            AddressField::Contact => "ship_contact",
            AddressField::Address1 => "ship_addr1",
            AddressField::Address2 => "ship_addr2",
            AddressField::Town => "ship_town",
            AddressField::PostCode => "ship_postcode",
            AddressField::Country => "ship_country",
            AddressField::Telephone => "ship_phone",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AddressField::Company => "Company",
            AddressField::Contact => "Contact",
            AddressField::Address1 => "Address 1",
            AddressField::Address2 => "Address 2",
            AddressField::Town => "Town/City",
            AddressField::PostCode => "Post Code",
            AddressField::Country => "Country",
            AddressField::Telephone => "Telephone",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            AddressField::Country => DEFAULT_COUNTRY,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineField {
    ProductCode,
    Description,
    Quantity,
    UnitPrice,
    TaxCode,
    NominalCode,
    Department,
}

impl LineField {
    pub const ALL: [LineField; 7] = [
        LineField::ProductCode,
        LineField::Description,
        LineField::Quantity,
        LineField::UnitPrice,
        LineField::TaxCode,
        LineField::NominalCode,
        LineField::Department,
    ];

    pub fn key(self) -> &'static str {
        match self {
            LineField::ProductCode => "product_code",
            LineField::Description => "description",
            LineField::Quantity => "qty",
            LineField::UnitPrice => "unit_price",
            LineField::TaxCode => "tax_code",
            LineField::NominalCode => "nominal_code",
            LineField::Department => "department",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        LineField::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            LineField::ProductCode => "Product Code",
            LineField::Description => "Description",
            LineField::Quantity => "Qty",
            LineField::UnitPrice => "Unit Price",
            LineField::TaxCode => "Tax Code",
            LineField::NominalCode => "Nominal Code",
            LineField::Department => "Department",
        }
    }
}

// ==========================================
// Records
// ==========================================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderHeader {
    pub order_number: String,
    pub customer_account: String,
    pub customer_order_number: String,
    pub order_date: Option<NaiveDate>,
    pub currency: String,
    pub reference: String,
    pub notes: String,
}

impl OrderHeader {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            order_number: String::new(),
            customer_account: String::new(),
            customer_order_number: String::new(),
            order_date: Some(today),
            currency: DEFAULT_CURRENCY.to_string(),
            reference: String::new(),
            notes: String::new(),
        }
    }

    pub fn get(&self, field: HeaderField) -> String {
        match field {
            HeaderField::OrderDate => self
                .order_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            _ => self.text(field).map(str::to_string).unwrap_or_default(),
        }
    }

    /// An empty date clears it; anything else unparseable becomes `today`.
    pub fn set(&mut self, field: HeaderField, value: &str, today: NaiveDate) {
        let slot = match field {
            HeaderField::OrderDate => {
                self.order_date = if value.trim().is_empty() {
                    None
                } else {
                    Some(date_or(value, today))
                };
                return;
            }
            HeaderField::OrderNumber => &mut self.order_number,
            HeaderField::CustomerAccount => &mut self.customer_account,
            HeaderField::CustomerOrderNumber => &mut self.customer_order_number,
            HeaderField::Currency => &mut self.currency,
            HeaderField::Reference => &mut self.reference,
            HeaderField::Notes => &mut self.notes,
        };
        *slot = value.to_string();
    }

    fn text(&self, field: HeaderField) -> Option<&str> {
        match field {
            HeaderField::OrderNumber => Some(&self.order_number),
            HeaderField::CustomerAccount => Some(&self.customer_account),
            HeaderField::CustomerOrderNumber => Some(&self.customer_order_number),
            HeaderField::Currency => Some(&self.currency),
            HeaderField::Reference => Some(&self.reference),
            HeaderField::Notes => Some(&self.notes),
            HeaderField::OrderDate => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeliveryAddress {
    pub company: String,
    pub contact: String,
    pub address1: String,
    pub address2: String,
    pub town: String,
    pub postcode: String,
    pub country: String,
    pub telephone: String,
}

impl Default for DeliveryAddress {
    fn default() -> Self {
        Self {
            company: String::new(),
            contact: String::new(),
            address1: String::new(),
            address2: String::new(),
            town: String::new(),
            postcode: String::new(),
            country: DEFAULT_COUNTRY.to_string(),
            telephone: String::new(),
        }
    }
}

impl DeliveryAddress {
    pub fn get(&self, field: AddressField) -> &str {
        match field {
            AddressField::Company => &self.company,
            AddressField::Contact => &self.contact,
            AddressField::Address1 => &self.address1,
            AddressField::Address2 => &self.address2,
            AddressField::Town => &self.town,
            AddressField::PostCode => &self.postcode,
            AddressField::Country => &self.country,
            AddressField::Telephone => &self.telephone,
        }
    }

    pub fn set(&mut self, field: AddressField, value: &str) {
        let slot = match field {
            AddressField::Company => &mut self.company,
            AddressField::Contact => &mut self.contact,
            AddressField::Address1 => &mut self.address1,
            AddressField::Address2 => &mut self.address2,
            AddressField::Town => &mut self.town,
            AddressField::PostCode => &mut self.postcode,
            AddressField::Country => &mut self.country,
            AddressField::Telephone => &mut self.telephone,
        };
        *slot = value.to_string();
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LineItem {
    pub product_code: String,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub tax_code: String,
    pub nominal_code: String,
    pub department: String,
}

impl LineItem {
    pub fn new(tax_code: &str) -> Self {
        Self {
            product_code: String::new(),
            description: String::new(),
            quantity: DEFAULT_QUANTITY,
            unit_price: DEFAULT_UNIT_PRICE,
            tax_code: tax_code.to_string(),
            nominal_code: String::new(),
            department: String::new(),
        }
    }

    pub fn get(&self, field: LineField) -> String {
        match field {
            LineField::ProductCode => self.product_code.clone(),
            LineField::Description => self.description.clone(),
            LineField::Quantity => format_number(self.quantity),
            LineField::UnitPrice => format_number(self.unit_price),
            LineField::TaxCode => self.tax_code.clone(),
            LineField::NominalCode => self.nominal_code.clone(),
            LineField::Department => self.department.clone(),
        }
    }

    pub fn set(&mut self, field: LineField, value: &str) {
        match field {
            LineField::Quantity => self.quantity = number_or(value, DEFAULT_QUANTITY),
            LineField::UnitPrice => self.unit_price = number_or(value, DEFAULT_UNIT_PRICE),
            LineField::ProductCode => self.product_code = value.to_string(),
            LineField::Description => self.description = value.to_string(),
            LineField::TaxCode => self.tax_code = value.to_string(),
            LineField::NominalCode => self.nominal_code = value.to_string(),
            LineField::Department => self.department = value.to_string(),
        }
    }

    /// Tax code as exported: the default stands in for an empty one.
    pub fn effective_tax_code<'a>(&'a self, default_tax_code: &'a str) -> &'a str {
        if self.tax_code.is_empty() {
            default_tax_code
        } else {
            &self.tax_code
        }
    }

    /// A line is active once any field differs from what a new line holds.
    pub fn is_active(&self, default_tax_code: &str) -> bool {
        !self.product_code.is_empty()
            || !self.description.is_empty()
            || !self.nominal_code.is_empty()
            || !self.department.is_empty()
            || self.effective_tax_code(default_tax_code) != default_tax_code
            || self.quantity != DEFAULT_QUANTITY
            || self.unit_price != DEFAULT_UNIT_PRICE
    }
}

/// The one order a form session edits.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SalesOrder {
    pub header: OrderHeader,
    pub delivery: DeliveryAddress,
    pub lines: Vec<LineItem>,
}

impl SalesOrder {
    pub fn new(defaults: &Defaults) -> Self {
        Self {
            header: OrderHeader::new(defaults.today),
            delivery: DeliveryAddress::default(),
            lines: vec![LineItem::new(&defaults.tax_code)],
        }
    }

    /// Sets a field on the line at `index`; returns false when there is none.
    pub fn set_line(&mut self, index: usize, field: LineField, value: &str) -> bool {
        match self.lines.get_mut(index) {
            Some(line) => {
                line.set(field, value);
                true
            }
            None => false,
        }
    }

    pub fn remove_line(&mut self, index: usize) -> Option<LineItem> {
        (index < self.lines.len()).then(|| self.lines.remove(index))
    }

    /// Lines paired with their 1-based position.
    pub fn numbered_lines(&self) -> impl Iterator<Item = (usize, &LineItem)> {
        self.lines.iter().enumerate().map(|(i, line)| (i + 1, line))
    }
}
