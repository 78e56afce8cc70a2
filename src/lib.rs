//! Sales order entry: the order model, its XML export, shareable links,
//! export validation and address lookup.

pub mod config;
pub mod error;
pub mod lookup;
pub mod model;
pub mod parse;
pub mod query;
pub mod session;
pub mod validation;
pub mod xml;

pub use error::{ConfigError, ExportError, LookupError, ParseError, ValidationFailure, XmlError};
pub use model::{AddressField, Defaults, DeliveryAddress, HeaderField, LineField, LineItem, OrderHeader, SalesOrder};
pub use session::{Change, LookupTicket, MergeOutcome, OrderObserver, OrderSession};
