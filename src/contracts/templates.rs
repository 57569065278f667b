use rusqlite::Connection;

use crate::db::queries;
use crate::models::LicenseTemplate;

use super::{ContractLimits, ContractTerms, LicenseKind};

/// Which terms govern a sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateResolution {
    SellerOverride(ContractTerms),
    UsePlatformDefault,
}

impl TemplateResolution {
    pub fn into_terms(self, kind: LicenseKind) -> ContractTerms {
        match self {
            TemplateResolution::SellerOverride(terms) => terms,
            TemplateResolution::UsePlatformDefault => ContractTerms::platform_default(kind),
        }
    }
}

impl From<LicenseTemplate> for ContractTerms {
    fn from(template: LicenseTemplate) -> Self {
        ContractTerms {
            limits: ContractLimits {
                max_streams: template.max_streams,
                max_copies: template.max_copies,
                max_videos: template.max_videos,
                max_radio_stations: template.max_radio_stations,
            },
            custom_text: template.custom_text.filter(|t| !t.trim().is_empty()),
            include_standard_clauses: template.include_standard_clauses,
        }
    }
}

/// Look up the seller's template for `kind`.
///
/// A missing seller or template is the normal default path. Lookup errors are
/// logged and also fall back to the platform default: a sale never fails
/// because its contract template could not be read.
pub fn resolve_template(
    conn: &Connection,
    seller_id: Option<&str>,
    kind: LicenseKind,
) -> TemplateResolution {
    let Some(seller_id) = seller_id.filter(|s| !s.is_empty()) else {
        return TemplateResolution::UsePlatformDefault;
    };

    match queries::get_license_template(conn, seller_id, kind.as_ref()) {
        Ok(Some(template)) => TemplateResolution::SellerOverride(template.into()),
        Ok(None) => TemplateResolution::UsePlatformDefault,
        Err(e) => {
            tracing::warn!(
                "License template lookup failed for seller {} ({}), using platform default: {}",
                seller_id,
                kind.as_ref(),
                e
            );
            TemplateResolution::UsePlatformDefault
        }
    }
}
