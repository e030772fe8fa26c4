//! JSON availability API parser.
//!
//! Two response shapes are understood:
//!
//! ```json
//! { "sites": [ { "name": "C존 A1", "zone": "C ZONE", "available": true } ] }
//! [ { "name": "C존 A1", "zone": "C ZONE", "availability": "예약가능" } ]
//! ```

use chrono::NaiveDate;
use serde::Deserialize;
use slotwatch_core::{
    AcquisitionContext, AvailabilityItem, DocumentParser, InconclusiveReason, ParseOutcome,
};

use crate::html::{is_sold_out, zone_from_text};

/// Status strings that mean bookable in the array shape.
const AVAILABLE_STATUSES: [&str; 3] = ["예약가능", "available", "open"];

#[derive(Debug, Deserialize)]
struct SitesEnvelope {
    sites: Vec<EnvelopeSite>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeSite {
    name: String,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    available: bool,
    #[serde(default)]
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct ListedSite {
    name: String,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default, alias = "status")]
    availability: Option<String>,
    #[serde(default)]
    date: Option<NaiveDate>,
}

impl ListedSite {
    fn is_available(&self) -> bool {
        self.availability.as_deref().is_some_and(|status| {
            let status = status.trim();
            !is_sold_out(status)
                && AVAILABLE_STATUSES
                    .iter()
                    .any(|ok| status.eq_ignore_ascii_case(ok))
        })
    }
}

fn resolve_zone(zone: Option<String>, name: &str) -> String {
    zone.filter(|z| !z.trim().is_empty())
        .or_else(|| zone_from_text(name))
        .unwrap_or_default()
}

fn build_item(
    name: String,
    zone: Option<String>,
    date: Option<NaiveDate>,
    available: bool,
    ctx: &AcquisitionContext,
) -> AvailabilityItem {
    let zone = resolve_zone(zone, &name);
    let date = date.unwrap_or(ctx.search.date_from);
    if available {
        AvailabilityItem::available(name, zone, date, "")
    } else {
        AvailabilityItem::unavailable(name, zone, date, "")
    }
}

/// Parser for the secondary availability endpoints.
#[derive(Debug, Default, Clone)]
pub struct ApiResponseParser;

impl ApiResponseParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for ApiResponseParser {
    fn parse(&self, body: &str, ctx: &AcquisitionContext) -> ParseOutcome {
        let value: serde_json::Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => {
                return ParseOutcome::Inconclusive(InconclusiveReason::Unparseable(format!(
                    "not JSON: {e}"
                )))
            }
        };

        if value.get("sites").is_some() {
            return match serde_json::from_value::<SitesEnvelope>(value) {
                Ok(envelope) => ParseOutcome::Items(
                    envelope
                        .sites
                        .into_iter()
                        .map(|s| build_item(s.name, s.zone, s.date, s.available, ctx))
                        .collect(),
                ),
                Err(e) => ParseOutcome::Inconclusive(InconclusiveReason::Unparseable(format!(
                    "malformed sites list: {e}"
                ))),
            };
        }

        if value.is_array() {
            return match serde_json::from_value::<Vec<ListedSite>>(value) {
                Ok(sites) => ParseOutcome::Items(
                    sites
                        .into_iter()
                        .map(|s| {
                            let available = s.is_available();
                            build_item(s.name, s.zone, s.date, available, ctx)
                        })
                        .collect(),
                ),
                Err(e) => ParseOutcome::Inconclusive(InconclusiveReason::Unparseable(format!(
                    "malformed site array: {e}"
                ))),
            };
        }

        ParseOutcome::Inconclusive(InconclusiveReason::Unparseable(
            "unrecognised response shape".to_string(),
        ))
    }
}
