//! Layered field extraction over a parsed page.
//!
//! Trust order per field: CSS selector text → meta tags → JSON-LD → regex over
//! visible body text. Each field short-circuits at the first layer that yields
//! a value.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::marketplace::Marketplace;
use crate::scoring::money::{find_cap_rate, find_money, parse_money, parse_percent};

const GENERIC_TITLE_SELECTORS: &[&str] = &["h1"];
const GENERIC_ADDRESS_SELECTORS: &[&str] = &[
    "[itemprop='streetAddress']",
    "[itemprop='address']",
    "address",
    ".property-address",
];
const GENERIC_PRICE_SELECTORS: &[&str] = &[
    "[itemprop='price']",
    ".asking-price",
    ".price",
    "[data-testid='price']",
];
const NOI_SELECTORS: &[&str] = &["[data-cy='noi']", "[data-testid='noi']", ".noi"];
const CAP_RATE_SELECTORS: &[&str] = &["[data-cy='cap-rate']", "[data-testid='cap-rate']", ".cap-rate"];

const SKIPPED_TEXT_PARENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

static PRICE_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:asking\s+price|list(?:ing)?\s+price|sale\s+price|price|offered\s+at)\s*[:\-]?\s*(\$\s?[\d,]+(?:\.\d+)?\s*(?:million|mil|mm|m|thousand|k)?)\b")
        .expect("valid price regex")
});

static NOI_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bNOI\b|net\s+operating\s+income)\s*[:\-]?\s*(\$\s?[\d,]+(?:\.\d+)?\s*(?:million|mil|mm|m|thousand|k)?)\b")
        .expect("valid noi regex")
});

static ADDRESS_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,6}\s+(?:[A-Z0-9][A-Za-z0-9.'-]*\s+){1,4}(?:St|Street|Ave|Avenue|Rd|Road|Blvd|Boulevard|Dr|Drive|Hwy|Highway|Ln|Lane|Way|Pkwy|Parkway|Pike|Ct|Court)\b\.?(?:,\s*[A-Z][A-Za-z. ]+)?,\s*[A-Z]{2}(?:\s+\d{5})?")
        .expect("valid address regex")
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFields {
    pub title: Option<String>,
    pub address: Option<String>,
    pub price: Option<f64>,
    pub noi: Option<f64>,
    pub cap_rate: Option<f64>,
}

impl ListingFields {
    pub fn all_empty(&self) -> bool {
        self.title.is_none()
            && self.address.is_none()
            && self.price.is_none()
            && self.noi.is_none()
            && self.cap_rate.is_none()
    }
}

fn clean(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn element_text(el: ElementRef<'_>) -> Option<String> {
    clean(&el.text().collect::<String>())
}

/// Text of the first element matching any selector, in selector order.
pub fn first_selector_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        doc.select(&selector).find_map(element_text)
    })
}

/// Apply `parse` to each selector match until one parses. Numeric fields also
/// look at a `content` attribute (microdata).
fn first_selector_value(
    doc: &Html,
    selectors: &[&str],
    parse: impl Fn(&str) -> Option<f64>,
) -> Option<f64> {
    selectors.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        doc.select(&selector).find_map(|el| {
            el.value()
                .attr("content")
                .and_then(&parse)
                .or_else(|| element_text(el).as_deref().and_then(&parse))
        })
    })
}

/// `<meta property=..>` or `<meta name=..>` content, first non-empty.
pub fn meta_content(doc: &Html, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let raw = format!("meta[property='{key}'], meta[name='{key}']");
        let selector = Selector::parse(&raw).ok()?;
        doc.select(&selector)
            .find_map(|el| el.value().attr("content").and_then(clean))
    })
}

/// Every JSON-LD object on the page, with arrays and `@graph` flattened.
pub fn json_ld_objects(doc: &Html) -> Vec<Value> {
    let Ok(selector) = Selector::parse("script[type='application/ld+json']") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for el in doc.select(&selector) {
        let raw = el.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        flatten_ld(value, &mut out);
    }
    out
}

fn flatten_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_ld(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_ld(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn ld_str(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).and_then(clean)
}

fn ld_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_money(s).or_else(|| s.trim().parse().ok()),
        _ => None,
    }
}

fn ld_address(obj: &Value) -> Option<String> {
    match obj.get("address")? {
        Value::String(s) => clean(s),
        Value::Object(_) => {
            let addr = obj.get("address")?;
            let parts: Vec<String> = ["streetAddress", "addressLocality", "addressRegion"]
                .iter()
                .filter_map(|k| ld_str(addr, k))
                .collect();
            let mut joined = parts.join(", ");
            if let Some(zip) = ld_str(addr, "postalCode") {
                joined.push(' ');
                joined.push_str(&zip);
            }
            clean(&joined)
        }
        _ => None,
    }
}

fn ld_price(obj: &Value) -> Option<f64> {
    if let Some(price) = obj.get("price").and_then(ld_number) {
        return Some(price);
    }
    match obj.get("offers")? {
        Value::Array(offers) => offers
            .iter()
            .find_map(|o| o.get("price").and_then(ld_number)),
        offer => offer.get("price").and_then(ld_number),
    }
}

/// Value of an `additionalProperty` entry whose name matches `names`.
fn ld_property<'a>(obj: &'a Value, names: &[&str]) -> Option<&'a Value> {
    let props = obj.get("additionalProperty")?.as_array()?;
    props.iter().find_map(|p| {
        let name = p.get("name")?.as_str()?.to_lowercase();
        names
            .iter()
            .any(|n| name == *n)
            .then(|| p.get("value"))
            .flatten()
    })
}

/// Body text with script/style content skipped, whitespace collapsed.
pub fn visible_text(doc: &Html) -> String {
    let mut pieces = Vec::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_TEXT_PARENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }
    }
    pieces.join(" ")
}

/// Contents of `<title>`.
pub fn document_title(doc: &Html) -> Option<String> {
    first_selector_text(doc, &["title"])
}

fn selectors_for<'a>(market_specific: &'a [&'a str], generic: &'a [&'a str]) -> Vec<&'a str> {
    market_specific.iter().chain(generic.iter()).copied().collect()
}

/// Run every layer for every field.
pub fn extract_fields(doc: &Html, market: Option<&Marketplace>, text: &str) -> ListingFields {
    let ld = json_ld_objects(doc);

    let title_selectors = selectors_for(
        market.map(|m| m.title_selectors).unwrap_or(&[]),
        GENERIC_TITLE_SELECTORS,
    );
    let address_selectors = selectors_for(
        market.map(|m| m.address_selectors).unwrap_or(&[]),
        GENERIC_ADDRESS_SELECTORS,
    );
    let price_selectors = selectors_for(
        market.map(|m| m.price_selectors).unwrap_or(&[]),
        GENERIC_PRICE_SELECTORS,
    );

    let title = first_selector_text(doc, &title_selectors)
        .or_else(|| meta_content(doc, &["og:title", "twitter:title"]))
        .or_else(|| ld.iter().find_map(|o| ld_str(o, "name")));

    let address = first_selector_text(doc, &address_selectors)
        .or_else(|| meta_content(doc, &["og:street-address", "place:street_address", "address"]))
        .or_else(|| ld.iter().find_map(ld_address))
        .or_else(|| ADDRESS_TEXT_RE.find(text).and_then(|m| clean(m.as_str())));

    let price = first_selector_value(doc, &price_selectors, |s| {
        parse_money(s).or_else(|| find_money(s))
    })
    .or_else(|| {
        meta_content(doc, &["product:price:amount", "og:price:amount"])
            .and_then(|s| parse_money(&s))
    })
    .or_else(|| ld.iter().find_map(ld_price))
    .or_else(|| {
        PRICE_TEXT_RE
            .captures(text)
            .and_then(|c| parse_money(c.get(1)?.as_str()))
    });

    let noi = first_selector_value(doc, NOI_SELECTORS, |s| {
        parse_money(s).or_else(|| find_money(s))
    })
    .or_else(|| {
        ld.iter().find_map(|o| {
            ld_property(o, &["noi", "net operating income"]).and_then(ld_number)
        })
    })
    .or_else(|| {
        NOI_TEXT_RE
            .captures(text)
            .and_then(|c| parse_money(c.get(1)?.as_str()))
    });

    let cap_rate = first_selector_value(doc, CAP_RATE_SELECTORS, |s| {
        parse_percent(s).or_else(|| find_cap_rate(s))
    })
    .or_else(|| {
        ld.iter().find_map(|o| {
            ld_property(o, &["cap rate", "capitalization rate"]).and_then(|v| match v {
                Value::Number(n) => n.as_f64().and_then(|f| parse_percent(&f.to_string())),
                Value::String(s) => parse_percent(s),
                _ => None,
            })
        })
    })
    .or_else(|| find_cap_rate(text));

    ListingFields {
        title,
        address,
        price,
        noi,
        cap_rate,
    }
}

/// True when the visible text mentions any dollar figure.
pub fn has_price_text(text: &str) -> bool {
    find_money(text).is_some()
}
