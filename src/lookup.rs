//! Address search against Google Places, and merging a chosen place into
//! the delivery address.
//!
//! Calls are blocking with a bounded timeout. [`spawn_search`] and
//! [`spawn_resolve`] move them onto a worker thread so the caller can keep
//! handling input while a lookup is in flight.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::LookupError;
use crate::model::{AddressField, DeliveryAddress};
use crate::session::LookupTicket;

pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_CANDIDATES: usize = 5;
pub const MISSING_KEY_ADVICE: &str = "Set GOOGLE_MAPS_API_KEY to enable Google address search.";

const AUTOCOMPLETE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/place/autocomplete/json";
const DETAILS_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/place/details/json";
const DETAIL_FIELDS: &str = "formatted_address,address_components,geometry";

// ==========================================
// Places
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub id: String,
    pub description: String,
}

impl fmt::Display for PlaceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddressComponent {
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    StreetNumber,
    Route,
    Locality,
    PostalTown,
    PostalCode,
    Country,
}

impl ComponentKind {
    pub fn tag(self) -> &'static str {
        match self {
            ComponentKind::StreetNumber => "street_number",
            ComponentKind::Route => "route",
            ComponentKind::Locality => "locality",
            ComponentKind::PostalTown => "postal_town",
            ComponentKind::PostalCode => "postal_code",
            ComponentKind::Country => "country",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaceDetail {
    pub formatted_address: String,
    pub location: Option<LatLng>,
    pub components: Vec<AddressComponent>,
}

impl PlaceDetail {
    pub fn component(&self, kind: ComponentKind) -> Option<&AddressComponent> {
        self.components.iter().find(|c| c.types.iter().any(|t| t == kind.tag()))
    }

    fn long_name(&self, kind: ComponentKind) -> &str {
        self.component(kind).map(|c| c.long_name.as_str()).unwrap_or_default()
    }

    pub fn map_url(&self) -> Option<String> {
        self.location
            .map(|LatLng { lat, lng }| format!("https://www.google.com/maps?q={lat},{lng}&z=16"))
    }
}

/// Copies the address parts of `detail` into `address`. A part that came
/// back empty leaves the existing value alone. Returns the fields written.
pub fn merge_place(detail: &PlaceDetail, address: &mut DeliveryAddress) -> Vec<AddressField> {
    let street = format!(
        "{} {}",
        detail.long_name(ComponentKind::StreetNumber),
        detail.long_name(ComponentKind::Route)
    );
    let town = match detail.long_name(ComponentKind::Locality) {
        "" => detail.long_name(ComponentKind::PostalTown),
        locality => locality,
    };
    let country = detail
        .component(ComponentKind::Country)
        .map(|c| c.short_name.clone())
        .unwrap_or_else(|| address.country.clone());

    let extracted = [
        (AddressField::Address1, street.trim().to_string()),
        (AddressField::Address2, detail.formatted_address.clone()),
        (AddressField::Town, town.to_string()),
        (AddressField::PostCode, detail.long_name(ComponentKind::PostalCode).to_string()),
        (AddressField::Country, country),
    ];

    let mut written = Vec::new();
    for (field, value) in extracted {
        if !value.is_empty() {
            address.set(field, &value);
            written.push(field);
        }
    }
    written
}

// ==========================================
// Service
// ==========================================

#[cfg_attr(test, mockall::automock)]
pub trait AddressLookup: Send + Sync {
    /// Ranked candidates for free text, best first.
    fn search(&self, text: &str) -> Result<Vec<PlaceCandidate>, LookupError>;

    fn resolve(&self, id: &str) -> Result<PlaceDetail, LookupError>;
}

pub struct GooglePlaces {
    client: Client,
    api_key: String,
    autocomplete_url: String,
    details_url: String,
}

impl GooglePlaces {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LookupError> {
        Self::with_endpoints(api_key, AUTOCOMPLETE_ENDPOINT, DETAILS_ENDPOINT)
    }

    pub fn with_endpoints(
        api_key: impl Into<String>,
        autocomplete_url: impl Into<String>,
        details_url: impl Into<String>,
    ) -> Result<Self, LookupError> {
        let client = Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            autocomplete_url: autocomplete_url.into(),
            details_url: details_url.into(),
        })
    }

    fn get<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T, LookupError> {
        let body = self
            .client
            .get(url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()?
            .error_for_status()?
            .text()?;
        parse_body(&body)
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, LookupError> {
    Ok(serde_json::from_str(body)?)
}

impl AddressLookup for GooglePlaces {
    fn search(&self, text: &str) -> Result<Vec<PlaceCandidate>, LookupError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let res: AutocompleteResponse = self.get(&self.autocomplete_url, &[("input", text), ("types", "address")])?;
        candidates(res)
    }

    fn resolve(&self, id: &str) -> Result<PlaceDetail, LookupError> {
        let res: DetailsResponse = self.get(&self.details_url, &[("place_id", id), ("fields", DETAIL_FIELDS)])?;
        check_status(&res.status, res.error_message)?;
        let result = res.result.unwrap_or_default();
        Ok(PlaceDetail {
            formatted_address: result.formatted_address,
            location: result.geometry.and_then(|g| g.location),
            components: result.address_components,
        })
    }
}

/// Up to [`MAX_CANDIDATES`] predictions that carry a place id, in service order.
fn candidates(res: AutocompleteResponse) -> Result<Vec<PlaceCandidate>, LookupError> {
    check_status(&res.status, res.error_message)?;
    debug!(count = res.predictions.len(), "autocomplete answered");
    Ok(res
        .predictions
        .into_iter()
        .filter(|p| !p.place_id.is_empty())
        .take(MAX_CANDIDATES)
        .map(|p| PlaceCandidate {
            description: if p.description.is_empty() { "Address".to_string() } else { p.description },
            id: p.place_id,
        })
        .collect())
}

fn check_status(status: &str, message: Option<String>) -> Result<(), LookupError> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        _ => Err(LookupError::Service {
            status: status.to_string(),
            message,
        }),
    }
}

#[derive(Deserialize)]
struct AutocompleteResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
    #[serde(default)]
    status: String,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct Prediction {
    #[serde(default)]
    description: String,
    #[serde(default)]
    place_id: String,
}

#[derive(Deserialize)]
struct DetailsResponse {
    result: Option<DetailsResult>,
    #[serde(default)]
    status: String,
    error_message: Option<String>,
}

#[derive(Deserialize, Default)]
struct DetailsResult {
    #[serde(default)]
    formatted_address: String,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
struct Geometry {
    location: Option<LatLng>,
}

// ==========================================
// Availability & background calls
// ==========================================

/// Address search is either wired to a service or switched off with a
/// reason the form shows once.
#[derive(Clone)]
pub enum AddressSearch {
    Enabled(Arc<dyn AddressLookup>),
    Disabled(String),
}

impl AddressSearch {
    pub fn from_settings(settings: &Settings) -> Self {
        let Some(key) = settings.api_key() else {
            return AddressSearch::Disabled(MISSING_KEY_ADVICE.to_string());
        };
        match GooglePlaces::new(key) {
            Ok(places) => AddressSearch::Enabled(Arc::new(places)),
            Err(e) => {
                warn!(error = %e, "address search unavailable");
                AddressSearch::Disabled(format!("Address search unavailable: {e}"))
            }
        }
    }

    pub fn service(&self) -> Result<Arc<dyn AddressLookup>, LookupError> {
        match self {
            AddressSearch::Enabled(service) => Ok(Arc::clone(service)),
            AddressSearch::Disabled(_) => Err(LookupError::MissingCredential(MISSING_KEY_ADVICE)),
        }
    }

    pub fn advisory(&self) -> Option<&str> {
        match self {
            AddressSearch::Enabled(_) => None,
            AddressSearch::Disabled(reason) => Some(reason),
        }
    }
}

/// A lookup running on a worker thread, tagged with the ticket it was
/// started under.
pub struct PendingLookup<T> {
    ticket: LookupTicket,
    rx: Receiver<Result<T, LookupError>>,
}

impl<T> PendingLookup<T> {
    /// The answer if it has arrived, without waiting. Once this returns
    /// `Some` the lookup is finished and should be dropped.
    pub fn try_take(&mut self) -> Option<(LookupTicket, Result<T, LookupError>)> {
        let res = match self.rx.try_recv() {
            Ok(res) => res,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(LookupError::Interrupted),
        };
        Some((self.ticket, res))
    }

    /// Blocks until the answer arrives, at most a little past the HTTP timeout.
    pub fn wait(self) -> (LookupTicket, Result<T, LookupError>) {
        self.wait_for(LOOKUP_TIMEOUT + Duration::from_secs(2))
    }

    pub fn wait_for(self, limit: Duration) -> (LookupTicket, Result<T, LookupError>) {
        let res = match self.rx.recv_timeout(limit) {
            Ok(res) => res,
            Err(RecvTimeoutError::Timeout) => Err(LookupError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(LookupError::Interrupted),
        };
        (self.ticket, res)
    }
}

pub fn spawn_search(lookup: Arc<dyn AddressLookup>, ticket: LookupTicket, text: String) -> PendingLookup<Vec<PlaceCandidate>> {
    spawn(ticket, move || lookup.search(&text))
}

pub fn spawn_resolve(lookup: Arc<dyn AddressLookup>, ticket: LookupTicket, id: String) -> PendingLookup<PlaceDetail> {
    spawn(ticket, move || lookup.resolve(&id))
}

fn spawn<T, F>(ticket: LookupTicket, call: F) -> PendingLookup<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LookupError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let res = call();
        if let Err(e) = &res {
            warn!(error = %e, "address lookup failed");
        }
        // The receiver may have given up already.
        let _ = tx.send(res);
    });
    PendingLookup { ticket, rx }
}
