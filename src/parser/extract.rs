use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, warn};

use super::correlate::{correlate, Placed};
use super::labels;
use crate::browser::{Browser, Element};
use crate::error::Result;

const NAME_SELECTOR: &str = "h1.org-top-card-summary__title";
const SECTOR_SELECTOR: &str = "div.org-top-card-summary-info-list__info-item";
const SUMMARY_SELECTOR: &str = "p.break-words";
/// Direct children only; a nested `dl` inside a value would otherwise split it.
const LABEL_SELECTOR: &str = "dl > dt";
const VALUE_SELECTOR: &str = "dl > dd";
const LOCATION_SELECTOR: &str = "div[class*=\"org-location-card\"]";

/// Trailing link text on every location card.
const DIRECTIONS_MARKER: &str = "Cómo llegar";

const SINGLETONS: [(&str, &str); 3] = [
    (labels::NAME, NAME_SELECTOR),
    (labels::SECTOR, SECTOR_SELECTOR),
    (labels::SUMMARY, SUMMARY_SELECTOR),
];

/// Label → values as read off a detail page, in page order.
///
/// The key set is whatever the page shows. Re-inserting a label replaces its
/// values but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAttributes {
    entries: Vec<(String, Vec<String>)>,
}

impl RawAttributes {
    pub fn insert(&mut self, label: &str, values: Vec<String>) {
        match self.entries.iter_mut().find(|(k, _)| k == label) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((label.to_string(), values)),
        }
    }

    /// Case-insensitive lookup on the trimmed label.
    pub fn get(&self, label: &str) -> Option<&[String]> {
        let wanted = label.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| k.trim().to_lowercase() == wanted)
            .map(|(_, v)| v.as_slice())
    }

    pub fn first(&self, label: &str) -> Option<&str> {
        self.get(label)?.first().map(String::as_str)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RawAttributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Read every field the loaded detail page offers. Lookup failures drop the
/// field and are logged; this never fails as a whole.
pub async fn extract(browser: &dyn Browser) -> RawAttributes {
    let mut raw = RawAttributes::default();

    for (key, selector) in SINGLETONS {
        match browser.find(selector).await {
            Ok(Some(el)) => {
                let text = el.text.trim();
                if text.is_empty() {
                    debug!(field = key, "Field present but blank");
                } else {
                    raw.insert(key, vec![text.to_string()]);
                }
            }
            Ok(None) => debug!(field = key, "Field not on page"),
            Err(e) => warn!(field = key, "Field lookup failed: {}", e),
        }
    }

    if let Err(e) = extract_label_values(browser, &mut raw).await {
        warn!("Label/value list unreadable: {}", e);
    }

    match browser.find_all(LOCATION_SELECTOR).await {
        Ok(cards) => {
            let locations: Vec<String> = cards
                .iter()
                .map(|card| location_text(&card.text))
                // a card holding only the directions link carries no address
                .filter(|loc| !loc.is_empty())
                .collect();
            if !locations.is_empty() {
                raw.insert(labels::LOCATIONS, locations);
            }
        }
        Err(e) => warn!("Location cards unreadable: {}", e),
    }

    debug!(labels = ?raw.labels().collect::<Vec<_>>(), "Detail page read");
    raw
}

async fn extract_label_values(browser: &dyn Browser, raw: &mut RawAttributes) -> Result<()> {
    let label_els = browser.find_all(LABEL_SELECTOR).await?;
    let value_els = browser.find_all(VALUE_SELECTOR).await?;
    let labels = placed(&label_els, "label");
    let values = placed(&value_els, "value");

    for (label, range) in labels.iter().zip(correlate(&labels, &values)) {
        let title = label.text.trim();
        if title.is_empty() {
            continue;
        }
        let vals = values[range].iter().map(|v| v.text.trim().to_string()).collect();
        raw.insert(title, vals);
    }
    Ok(())
}

/// Elements without a layout box cannot be placed and are left out.
fn placed<'a>(elements: &'a [Element], kind: &str) -> Vec<Placed<'a>> {
    let placed: Vec<Placed<'a>> = elements
        .iter()
        .filter_map(|el| el.y.map(|y| Placed::new(&el.text, y)))
        .collect();
    let skipped = elements.len() - placed.len();
    if skipped > 0 {
        warn!(kind, skipped, "Elements without position left out of grouping");
    }
    placed
}

/// Card text up to the directions link, trimmed.
fn location_text(card: &str) -> String {
    card.split(DIRECTIONS_MARKER)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
