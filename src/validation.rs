//! Checks run before an order may be exported. The live preview ignores them.

use std::fmt;

use serde::Serialize;

use crate::error::{ExportError, ValidationFailure};
use crate::model::{Defaults, SalesOrder};
use crate::xml::build_sales_order_xml;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "line", rename_all = "snake_case")]
pub enum Violation {
    MissingCustomerAccount,
    NoLines,
    MissingProductCode(usize),
    NonPositiveQuantity(usize),
    NegativeUnitPrice(usize),
}

impl Violation {
    /// 1-based line the violation refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Violation::MissingProductCode(n) | Violation::NonPositiveQuantity(n) | Violation::NegativeUnitPrice(n) => {
                Some(*n)
            }
            Violation::MissingCustomerAccount | Violation::NoLines => None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingCustomerAccount => write!(f, "Customer Account Ref is required."),
            Violation::NoLines => write!(f, "At least one line item is required."),
            Violation::MissingProductCode(n) => write!(f, "Line {n}: Product Code is required."),
            Violation::NonPositiveQuantity(n) => write!(f, "Line {n}: Quantity must be greater than zero."),
            Violation::NegativeUnitPrice(n) => write!(f, "Line {n}: Unit Price cannot be negative."),
        }
    }
}

pub fn validate(order: &SalesOrder, default_tax_code: &str) -> Vec<Violation> {
    let mut violations = Vec::new();

    if order.header.customer_account.is_empty() {
        violations.push(Violation::MissingCustomerAccount);
    }
    if order.lines.is_empty() {
        violations.push(Violation::NoLines);
    }

    for (n, line) in order.numbered_lines() {
        // Untouched lines are exempt from the product code rule only.
        if line.is_active(default_tax_code) && line.product_code.is_empty() {
            violations.push(Violation::MissingProductCode(n));
        }
        if line.quantity <= 0.0 {
            violations.push(Violation::NonPositiveQuantity(n));
        }
        if line.unit_price < 0.0 {
            violations.push(Violation::NegativeUnitPrice(n));
        }
    }

    violations
}

pub fn ensure_exportable(order: &SalesOrder, default_tax_code: &str) -> Result<(), ValidationFailure> {
    let violations = validate(order, default_tax_code);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure { violations })
    }
}

/// The export action: validation gate, then the XML document.
pub fn export_xml(order: &SalesOrder, defaults: &Defaults) -> Result<String, ExportError> {
    ensure_exportable(order, &defaults.tax_code)?;
    Ok(build_sales_order_xml(order, &defaults.tax_code)?)
}
