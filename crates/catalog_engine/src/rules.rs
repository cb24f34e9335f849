//! Ordered selector fallbacks for storefront markup.

use std::sync::LazyLock;

use engine_logging::engine_warn;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::links::render_with_inline_links;

static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d{2})?").expect("static price pattern"));

/// Turns the first element a selector matches into a value, or declines.
pub type Extractor<T> = fn(ElementRef<'_>) -> Option<T>;

pub struct Rule<T> {
    name: String,
    selector: Selector,
    extract: Extractor<T>,
}

impl<T> Rule<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies to the first matching element only.
    pub fn apply(&self, doc: &Html) -> Option<T> {
        doc.select(&self.selector).next().and_then(self.extract)
    }
}

/// Rules tried in order; the first one producing a value wins.
pub struct RuleChain<T> {
    rules: Vec<Rule<T>>,
}

impl<T> RuleChain<T> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule. An unparsable selector is logged and skipped.
    pub fn rule(mut self, css: &str, extract: Extractor<T>) -> Self {
        match Selector::parse(css) {
            Ok(selector) => self.rules.push(Rule {
                name: css.to_string(),
                selector,
                extract,
            }),
            Err(err) => engine_warn!("Ignoring selector `{css}`: {err}"),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn first_match(&self, doc: &Html) -> Option<T> {
        self.rules.iter().find_map(|rule| rule.apply(doc))
    }

    /// Like [`RuleChain::first_match`], also naming the rule that matched.
    pub fn first_match_named(&self, doc: &Html) -> Option<(&str, T)> {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(doc).map(|value| (rule.name(), value)))
    }
}

impl<T> Default for RuleChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Visible text, whitespace collapsed; `None` when empty.
pub fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// Amount with a dot decimal separator, e.g. `"€ 24,90"` becomes `"24.90"`.
pub fn parse_price(text: &str) -> Option<String> {
    PRICE.find(text).map(|m| m.as_str().replace(',', "."))
}

fn price_of(element: ElementRef<'_>) -> Option<String> {
    element_text(element).and_then(|text| parse_price(&text))
}

fn inline_links_of(element: ElementRef<'_>) -> Option<String> {
    element_text(element)?;
    Some(render_with_inline_links(element).html)
}

pub fn price_rules() -> RuleChain<String> {
    RuleChain::new()
        .rule("sale-price.text-lg", price_of)
        .rule(".price", price_of)
        .rule(".product-price", price_of)
        .rule(".woocommerce-Price-amount", price_of)
}

pub fn product_name_rules() -> RuleChain<String> {
    RuleChain::new().rule("h1", element_text)
}

pub fn title_rules() -> RuleChain<String> {
    RuleChain::new()
        .rule("h1.product-single__title", element_text)
        .rule("h1.product-info__title", element_text)
        .rule("h1", element_text)
}

pub fn description_rules() -> RuleChain<String> {
    RuleChain::new()
        .rule("div#product_description", inline_links_of)
        .rule("div.accordion__content div.prose", inline_links_of)
        .rule("div.prose", inline_links_of)
}

/// Visible colour swatches, in page order.
pub fn variant_labels(doc: &Html) -> Vec<String> {
    let (Ok(swatch), Ok(label)) = (
        Selector::parse("label.color-swatch"),
        Selector::parse("span.sr-only"),
    ) else {
        return Vec::new();
    };
    doc.select(&swatch)
        .filter(|el| !is_hidden(*el))
        .filter_map(|el| el.select(&label).next().and_then(element_text))
        .collect()
}

fn is_hidden(element: ElementRef<'_>) -> bool {
    let attrs = element.value();
    if attrs.attr("hidden").is_some() || attrs.attr("aria-hidden") == Some("true") {
        return true;
    }
    if attrs.classes().any(|c| c == "hidden" || c == "is-hidden") {
        return true;
    }
    attrs
        .attr("style")
        .map(|style| style.replace(' ', "").to_ascii_lowercase())
        .is_some_and(|style| style.contains("display:none") || style.contains("visibility:hidden"))
}

/// `<title>` up to the first `|`, e.g. `"Blue Mug | Shop"` gives `"Blue Mug"`.
pub fn page_title(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let raw = doc.select(&selector).next().and_then(element_text)?;
    let title = raw.split('|').next().unwrap_or(&raw).trim().to_string();
    (!title.is_empty()).then_some(title)
}

/// Absolute gallery image URLs, deduplicated, in page order.
pub fn gallery_images(doc: &Html, page_url: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(".product-gallery__media img") else {
        return Vec::new();
    };
    let base = Url::parse(page_url).ok();
    let mut urls: Vec<String> = Vec::new();
    for img in doc.select(&selector) {
        let raw = img
            .value()
            .attr("src")
            .or_else(|| img.value().attr("data-src"))
            .map(str::trim)
            .filter(|src| !src.is_empty() && !src.starts_with("data:"));
        let Some(raw) = raw else { continue };
        let resolved = match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(_) => base.as_ref().and_then(|b| b.join(raw).ok()),
        };
        if let Some(url) = resolved {
            let url = url.to_string();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}
