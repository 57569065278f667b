//! License contracts shipped with beat and sound kit sales.
//!
//! `templates` decides which terms apply (seller override or platform
//! default), `clauses` turns terms into legal text and `render` lays that text
//! out as a PDF.

mod clauses;
mod render;
pub mod templates;

pub use clauses::{Clause, standard_clauses};
pub use render::{RenderError, RenderedContract, render_contract, verification_id};
pub use templates::{TemplateResolution, resolve_template};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use strum::{AsRefStr, EnumString};

use crate::util::fold_key;

/// Canonical usage-rights tier of a digital goods sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LicenseKind {
    Basic,
    Premium,
    Unlimited,
    Exclusive,
    SoundKit,
}

impl LicenseKind {
    /// Map a storefront license label to its kind. Spanish and English labels
    /// are accepted, ignoring case and accents ("Básica", "EXCLUSIVE", "sound kit").
    pub fn normalize(raw: &str) -> Option<Self> {
        let key: String = fold_key(raw)
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect();
        let key = key
            .strip_suffix("license")
            .or_else(|| key.strip_suffix("licencia"))
            .unwrap_or(&key);
        let key = key.strip_prefix("licencia").unwrap_or(key);

        match key {
            "basica" | "basico" | "basic" => Some(LicenseKind::Basic),
            "premium" => Some(LicenseKind::Premium),
            "ilimitada" | "ilimitado" | "unlimited" => Some(LicenseKind::Unlimited),
            "exclusiva" | "exclusivo" | "exclusive" => Some(LicenseKind::Exclusive),
            "soundkit" | "kit" => Some(LicenseKind::SoundKit),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LicenseKind::Basic => "Basic License",
            LicenseKind::Premium => "Premium License",
            LicenseKind::Unlimited => "Unlimited License",
            LicenseKind::Exclusive => "Exclusive Rights License",
            LicenseKind::SoundKit => "Sound Kit License",
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, LicenseKind::Exclusive)
    }
}

/// Usage caps. `None` means unlimited, `Some(0)` means not permitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContractLimits {
    pub max_streams: Option<i64>,
    pub max_copies: Option<i64>,
    pub max_videos: Option<i64>,
    pub max_radio_stations: Option<i64>,
}

impl ContractLimits {
    pub fn platform_default(kind: LicenseKind) -> Self {
        match kind {
            LicenseKind::Basic => Self {
                max_streams: Some(50_000),
                max_copies: Some(2_000),
                max_videos: Some(1),
                max_radio_stations: Some(0),
            },
            LicenseKind::Premium => Self {
                max_streams: Some(500_000),
                max_copies: Some(10_000),
                max_videos: Some(1),
                max_radio_stations: Some(2),
            },
            LicenseKind::Unlimited | LicenseKind::Exclusive | LicenseKind::SoundKit => {
                Self::default()
            }
        }
    }
}

/// Terms a contract is rendered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractTerms {
    pub limits: ContractLimits,
    /// Seller-written legal text, rendered verbatim after folding to ASCII.
    pub custom_text: Option<String>,
    /// Whether the platform clauses accompany the custom text.
    pub include_standard_clauses: bool,
}

impl ContractTerms {
    pub fn platform_default(kind: LicenseKind) -> Self {
        Self {
            limits: ContractLimits::platform_default(kind),
            custom_text: None,
            include_standard_clauses: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Party {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// Everything a contract is rendered from. Rendering is a pure function of
/// this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractData {
    pub order_id: String,
    pub date: NaiveDate,
    pub license_kind: LicenseKind,
    pub product_name: String,
    pub price_cents: i64,
    pub currency: String,
    pub producer: Party,
    pub buyer: Party,
    pub terms: ContractTerms,
    pub platform_name: String,
    pub rendered_at: DateTime<Utc>,
}

/// `50000, "mxn"` -> `"500.00 MXN"`
pub fn format_money(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let units = (cents / 100).to_string();

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, c) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}{}.{:02} {}", sign, grouped, cents % 100, currency.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_spanish_and_english_labels() {
        assert_eq!(LicenseKind::normalize("Básica"), Some(LicenseKind::Basic));
        assert_eq!(LicenseKind::normalize("basic"), Some(LicenseKind::Basic));
        assert_eq!(LicenseKind::normalize("PREMIUM"), Some(LicenseKind::Premium));
        assert_eq!(LicenseKind::normalize("Ilimitada"), Some(LicenseKind::Unlimited));
        assert_eq!(LicenseKind::normalize("exclusiva"), Some(LicenseKind::Exclusive));
        assert_eq!(LicenseKind::normalize("Sound Kit"), Some(LicenseKind::SoundKit));
        assert_eq!(LicenseKind::normalize("kit"), Some(LicenseKind::SoundKit));
        assert_eq!(LicenseKind::normalize("Exclusive License"), Some(LicenseKind::Exclusive));
        assert_eq!(LicenseKind::normalize("gold"), None);
        assert_eq!(LicenseKind::normalize(""), None);
    }

    #[test]
    fn money_is_grouped() {
        assert_eq!(format_money(50_000, "mxn"), "500.00 MXN");
        assert_eq!(format_money(123_456_789, "usd"), "1,234,567.89 USD");
        assert_eq!(format_money(5, "eur"), "0.05 EUR");
    }
}
