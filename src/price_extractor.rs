use regex::Regex;

use crate::config::ExtractorConfig;
use crate::utils::error::{AppError, Result};

/// Pulls a unit price out of free-form item text such as
/// `"Cijena za jedinicu mjere: 0,41 €/kom"`.
///
/// Two patterns are tried in order:
/// 1. a number within `marker_window` non-digit characters after a label marker;
/// 2. a number directly followed by a currency symbol, `/` and a unit (`0,41 €/kom`).
///
/// The decimal comma is normalized to a dot. Anything unparsable or non-finite
/// is reported as `None`; there is no error path.
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    labelled: Regex,
    unit_suffixed: Regex,
    marker: Regex,
    currency_markers: Vec<String>,
}

impl PriceExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        // Longer markers first so "cijena za jedinicu mjere" wins over "cijena za"
        let mut markers: Vec<&String> = config.price_markers.iter().collect();
        markers.sort_by(|a, b| b.len().cmp(&a.len()));
        let marker_alternation = markers
            .iter()
            .map(|m| regex::escape(m.trim()))
            .collect::<Vec<_>>()
            .join("|");

        let mut currencies: Vec<&String> = config.currency_markers.iter().collect();
        currencies.sort_by(|a, b| b.len().cmp(&a.len()));
        let currency_alternation = currencies
            .iter()
            .map(|c| regex::escape(c.trim()))
            .collect::<Vec<_>>()
            .join("|");

        let labelled = Regex::new(&format!(
            r"(?i)(?:{})[^\d]{{0,{}}}?(\d+[.,]?\d*)",
            marker_alternation, config.marker_window
        ))
        .map_err(regex_error)?;
        let unit_suffixed = Regex::new(&format!(
            r"(?i)(\d+[.,]?\d*)\s*(?:{})\s*/\s*\p{{L}}+",
            currency_alternation
        ))
        .map_err(regex_error)?;
        let marker = Regex::new(&format!(r"(?i)(?:{})", marker_alternation)).map_err(regex_error)?;

        Ok(Self {
            labelled,
            unit_suffixed,
            marker,
            currency_markers: config
                .currency_markers
                .iter()
                .map(|c| c.trim().to_lowercase())
                .collect(),
        })
    }

    pub fn extract(&self, text: &str) -> Option<f64> {
        let captures = self
            .labelled
            .captures(text)
            .or_else(|| self.unit_suffixed.captures(text))?;
        parse_decimal(captures.get(1)?.as_str())
    }

    /// Whether `text` carries a unit-price label or a `€/unit` style token.
    pub fn has_price_marker(&self, text: &str) -> bool {
        self.marker.is_match(text) || self.unit_suffixed.is_match(text)
    }

    pub fn has_currency_marker(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.currency_markers
            .iter()
            .any(|marker| !marker.is_empty() && lowered.contains(marker.as_str()))
    }
}

fn parse_decimal(raw: &str) -> Option<f64> {
    let normalized = raw.replace(',', ".");
    let value: f64 = normalized.parse().ok()?;
    value.is_finite().then_some(value)
}

fn regex_error(err: regex::Error) -> AppError {
    AppError::Parse {
        message: format!("invalid extractor pattern: {}", err),
    }
}
