//! Shareable links: the order flattened into query parameters and back.
//!
//! Lines travel as `line{idx}_{field}` with a 0-based `idx`. Links made
//! before multi-line orders carried one line as `line_{field}`; those are
//! still understood, see [`decode_legacy_line`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::{Url, form_urlencoded};

use crate::model::{
    AddressField, DEFAULT_QUANTITY, DEFAULT_UNIT_PRICE, Defaults, DeliveryAddress, HeaderField, LineField, LineItem,
    OrderHeader, SalesOrder,
};
use crate::parse::{date_or, number_or};

static LINE_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^line(\d+)_([a-z_]+)$").unwrap());

// ==========================================
// Encode
// ==========================================

/// Flattens the order into key/value pairs in a fixed order.
pub fn encode(order: &SalesOrder) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for field in HeaderField::ALL {
        let value = order.header.get(field);
        let keep = match field {
            // The date default moves with the calendar, so a set date always travels.
            HeaderField::OrderDate => !value.is_empty(),
            _ => value != field.default_value(),
        };
        if keep {
            pairs.push((field.key().to_string(), value));
        }
    }

    for field in AddressField::ALL {
        let value = order.delivery.get(field);
        if value != field.default_value() {
            pairs.push((field.key().to_string(), value.to_string()));
        }
    }

    for (idx, line) in order.lines.iter().enumerate() {
        for field in LineField::ALL {
            let value = line.get(field);
            let keep = match field {
                LineField::Quantity | LineField::UnitPrice | LineField::TaxCode => true,
                _ => !value.is_empty(),
            };
            if keep {
                pairs.push((format!("line{idx}_{}", field.key()), value));
            }
        }
    }

    pairs
}

pub fn to_query_string(order: &SalesOrder) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(encode(order))
        .finish()
}

/// `base_url` with the order's query; any query already on the base is dropped.
pub fn share_link(base_url: &str, order: &SalesOrder) -> String {
    let base = base_url.split(['?', '#']).next().unwrap_or_default();
    let query = to_query_string(order);
    if query.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{query}")
    }
}

// ==========================================
// Decode
// ==========================================

/// Inbound parameters, kept sorted by key. When a key repeats, the last value wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    values: BTreeMap<String, String>,
}

impl QueryParams {
    /// Accepts a full URL, `?a=b`, or `a=b`.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let query = match Url::parse(input) {
            Ok(url) => url.query().unwrap_or_default().to_string(),
            Err(_) => {
                let q = input.split_once('?').map_or(input, |(_, q)| q);
                q.split('#').next().unwrap_or_default().to_string()
            }
        };
        Self::from_pairs(form_urlencoded::parse(query.as_bytes()).into_owned())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rebuilds an order from link parameters. Malformed values fall back to
/// defaults and the result always has at least one line.
pub fn decode(params: &QueryParams, defaults: &Defaults) -> SalesOrder {
    let mut header = OrderHeader::new(defaults.today);
    for field in HeaderField::ALL {
        match (field, params.get(field.key())) {
            (HeaderField::OrderDate, Some(v)) if !v.trim().is_empty() => {
                header.order_date = Some(date_or(v, defaults.today));
            }
            (HeaderField::OrderDate, _) => {}
            (_, Some(v)) => header.set(field, v, defaults.today),
            (_, None) => {}
        }
    }

    let mut delivery = DeliveryAddress::default();
    for field in AddressField::ALL {
        if let Some(v) = params.get(field.key()) {
            delivery.set(field, v);
        }
    }

    let mut lines = decode_lines(params, defaults);
    if lines.is_empty() {
        lines.extend(decode_legacy_line(params, defaults));
    }
    if lines.is_empty() {
        lines.push(LineItem::new(&defaults.tax_code));
    }

    SalesOrder { header, delivery, lines }
}

pub fn decode_str(input: &str, defaults: &Defaults) -> SalesOrder {
    decode(&QueryParams::parse(input), defaults)
}

/// Lines from `line{idx}_{field}` keys, ordered by `idx`. Gaps in the
/// indices close up; unknown field names are skipped. When only index 0 is
/// present, fields it lacks are taken from `line_{field}`.
fn decode_lines(params: &QueryParams, defaults: &Defaults) -> Vec<LineItem> {
    let mut by_index: BTreeMap<u64, Vec<(LineField, &str)>> = BTreeMap::new();
    for (key, value) in &params.values {
        let Some(caps) = LINE_KEY.captures(key) else {
            continue;
        };
        let (Ok(idx), Some(field)) = (caps[1].parse::<u64>(), LineField::from_key(&caps[2])) else {
            debug!(%key, "ignoring unrecognised line parameter");
            continue;
        };
        by_index.entry(idx).or_default().push((field, value.as_str()));
    }

    // A lone line 0 may be a half-migrated single-line link.
    let single = by_index.len() == 1 && by_index.contains_key(&0);
    let legacy = |field: LineField| {
        if single {
            params.get(&format!("line_{}", field.key()))
        } else {
            None
        }
    };

    by_index
        .into_values()
        .map(|fields| {
            let own = |wanted| fields.iter().find(|(f, _)| *f == wanted).map(|(_, v)| *v);
            // A blank tax code is kept; the export substitutes the default.
            let tax_code = match (own(LineField::TaxCode), legacy(LineField::TaxCode)) {
                (Some(code), _) => code.to_string(),
                (None, Some(code)) if !code.is_empty() => code.to_string(),
                _ => defaults.tax_code.clone(),
            };
            line_from(tax_code, |field| own(field).or_else(|| legacy(field)))
        })
        .collect()
}

/// Compatibility path for single-line links made before multi-line orders.
/// Reads `line0_{field}` or else `line_{field}`, and only yields a line when
/// at least one of those keys is present.
pub fn decode_legacy_line(params: &QueryParams, defaults: &Defaults) -> Option<LineItem> {
    let lookup = |field: LineField| {
        params
            .get(&format!("line0_{}", field.key()))
            .or_else(|| params.get(&format!("line_{}", field.key())))
    };
    if LineField::ALL.into_iter().all(|f| lookup(f).is_none()) {
        return None;
    }
    debug!("decoding legacy single-line parameters");
    let tax_code = match lookup(LineField::TaxCode) {
        Some(code) if !code.is_empty() => code.to_string(),
        _ => defaults.tax_code.clone(),
    };
    Some(line_from(tax_code, lookup))
}

fn line_from<'a>(tax_code: String, lookup: impl Fn(LineField) -> Option<&'a str>) -> LineItem {
    let text = |field| lookup(field).unwrap_or_default().to_string();
    LineItem {
        product_code: text(LineField::ProductCode),
        description: text(LineField::Description),
        quantity: lookup(LineField::Quantity).map_or(DEFAULT_QUANTITY, |v| number_or(v, DEFAULT_QUANTITY)),
        unit_price: lookup(LineField::UnitPrice).map_or(DEFAULT_UNIT_PRICE, |v| number_or(v, DEFAULT_UNIT_PRICE)),
        tax_code,
        nominal_code: text(LineField::NominalCode),
        department: text(LineField::Department),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;

    fn defaults() -> Defaults {
        Defaults::with_today("T1", NaiveDate::from_ymd_opt(2025, 5, 1).unwrap())
    }

    fn pairs(order: &SalesOrder) -> Vec<(String, String)> {
        encode(order)
    }

    fn kv(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn fresh_order_encodes_minimally() {
        let order = SalesOrder::new(&defaults());
        assert_eq!(
            pairs(&order),
            vec![
                kv("order_date", "2025-05-01"),
                kv("line0_qty", "1"),
                kv("line0_unit_price", "0"),
                kv("line0_tax_code", "T1"),
            ]
        );
    }

    #[test]
    fn emptied_defaulted_fields_travel_as_empty() {
        let mut order = SalesOrder::new(&defaults());
        order.header.currency.clear();
        order.delivery.country.clear();
        let encoded = pairs(&order);
        assert!(encoded.contains(&kv("currency", "")));
        assert!(encoded.contains(&kv("ship_country", "")));

        let decoded = decode_str(&to_query_string(&order), &defaults());
        assert_eq!(decoded.header.currency, "");
        assert_eq!(decoded.delivery.country, "");
    }

    #[test]
    fn blank_tax_code_survives_a_round_trip() {
        let d = defaults();
        let mut order = SalesOrder::new(&d);
        order.lines[0].tax_code.clear();
        let query = to_query_string(&order);
        assert!(query.ends_with("line0_tax_code="));
        assert_eq!(decode_str(&query, &d).lines[0].tax_code, "");
    }

    #[test]
    fn keys_are_namespaced_per_line() {
        let d = defaults();
        let mut order = SalesOrder::new(&d);
        order.lines[0].product_code = "A".into();
        order.lines.push(LineItem::new(&d.tax_code));
        order.lines[1].description = "second".into();
        let encoded = pairs(&order);
        assert!(encoded.contains(&kv("line0_product_code", "A")));
        assert!(encoded.contains(&kv("line1_description", "second")));
        assert!(!encoded.iter().any(|(k, _)| k == "line1_product_code"));
    }

    #[test]
    fn decode_reads_header_and_address() {
        let order = decode_str(
            "customer_account=CUST1&order_date=2024-01-31&ship_town=Leeds&currency=EUR&notes=a+b%26c",
            &defaults(),
        );
        assert_eq!(order.header.customer_account, "CUST1");
        assert_eq!(order.header.order_date, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(order.header.currency, "EUR");
        assert_eq!(order.header.notes, "a b&c");
        assert_eq!(order.delivery.town, "Leeds");
        assert_eq!(order.delivery.country, "UK");
    }

    #[test]
    fn bad_values_fall_back() {
        let d = defaults();
        let order = decode_str("order_date=yesterday&line0_qty=many&line0_unit_price=x", &d);
        assert_eq!(order.header.order_date, Some(d.today));
        assert_eq!(order.lines[0].quantity, 1.0);
        assert_eq!(order.lines[0].unit_price, 0.0);
    }

    #[test]
    fn lines_follow_index_order_and_close_gaps() {
        let order = decode_str("line10_product_code=C&line2_product_code=B&line0_product_code=A", &defaults());
        let codes: Vec<_> = order.lines.iter().map(|l| l.product_code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
    }

    #[test]
    fn unknown_line_fields_are_skipped() {
        let order = decode_str("line0_colour=red&line0_product_code=A", &defaults());
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].product_code, "A");
    }

    #[test]
    fn legacy_single_line() {
        let d = defaults();
        let order = decode_str("line_product_code=ABC&line_qty=3", &d);
        assert_eq!(order.lines.len(), 1);
        let line = &order.lines[0];
        assert_eq!(line.product_code, "ABC");
        assert_eq!(line.quantity, 3.0);
        assert_eq!(line.unit_price, 0.0);
        assert_eq!(line.tax_code, d.tax_code);
    }

    #[test]
    fn legacy_prefix_takes_precedence() {
        let params = QueryParams::from_pairs([("line_description", "old"), ("line0_description", "new")]);
        let line = decode_legacy_line(&params, &defaults()).unwrap();
        assert_eq!(line.description, "new");
    }

    #[test]
    fn lone_line0_borrows_unprefixed_fields() {
        let d = defaults();
        let order = decode_str("line0_product_code=A&line_qty=3&line_product_code=B&line_tax_code=T9", &d);
        assert_eq!(order.lines.len(), 1);
        let line = &order.lines[0];
        assert_eq!(line.product_code, "A");
        assert_eq!(line.quantity, 3.0);
        assert_eq!(line.tax_code, "T9");
    }

    #[test]
    fn unprefixed_fields_ignored_with_several_lines() {
        let order = decode_str("line0_product_code=A&line1_product_code=B&line_qty=3", &defaults());
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines[0].quantity, 1.0);
    }

    #[test]
    fn legacy_needs_a_line_key() {
        let params = QueryParams::from_pairs([("customer_account", "X")]);
        assert!(decode_legacy_line(&params, &defaults()).is_none());
    }

    #[test]
    fn lineless_query_gets_one_empty_line() {
        let d = defaults();
        let order = decode_str("customer_account=X&line_colour=red", &d);
        assert_eq!(order.lines, vec![LineItem::new(&d.tax_code)]);
    }

    #[test]
    fn parses_urls_and_bare_queries() {
        let a = QueryParams::parse("http://localhost:8081/?customer_account=A%20B");
        let b = QueryParams::parse("?customer_account=A+B");
        let c = QueryParams::parse("customer_account=A+B#frag");
        assert_eq!(a.get("customer_account"), Some("A B"));
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(QueryParams::parse("").is_empty());
    }

    #[test]
    fn repeated_key_last_wins() {
        let params = QueryParams::parse("reference=one&reference=two");
        assert_eq!(params.get("reference"), Some("two"));
    }

    #[test]
    fn share_link_replaces_existing_query() {
        let d = defaults();
        let mut order = SalesOrder::new(&d);
        order.header.customer_account = "C 1".into();
        let link = share_link("http://localhost:8081/?stale=1", &order);
        assert!(link.starts_with("http://localhost:8081/?customer_account=C+1&order_date=2025-05-01"));
        assert!(!link.contains("stale"));
    }

    #[test]
    fn share_link_without_query_is_bare_base() {
        let d = defaults();
        let mut order = SalesOrder::new(&d);
        order.header.order_date = None;
        order.lines.clear();
        assert_eq!(share_link("http://example.test/form", &order), "http://example.test/form");
    }

    #[test]
    fn encode_is_deterministic() {
        let order = decode_str("line1_qty=2&line0_qty=3&reference=R", &defaults());
        assert_eq!(to_query_string(&order), to_query_string(&order.clone()));
        assert_eq!(
            to_query_string(&order),
            "order_date=2025-05-01&reference=R&line0_qty=3&line0_unit_price=0&line0_tax_code=T1\
             &line1_qty=2&line1_unit_price=0&line1_tax_code=T1"
        );
    }
}
