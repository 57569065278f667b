//! License contract rendering and template resolution

mod common;

use chrono::{NaiveDate, TimeZone, Utc};
use common::*;

use beatpay::contracts::{
    ContractData, ContractLimits, ContractTerms, LicenseKind, Party, TemplateResolution,
    render_contract, resolve_template, verification_id,
};

fn contract_data(kind: LicenseKind, terms: ContractTerms) -> ContractData {
    ContractData {
        order_id: "NA-1A2B3C4D".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        license_kind: kind,
        product_name: "Noche Azul".to_string(),
        price_cents: 50_000,
        currency: "mxn".to_string(),
        producer: Party {
            id: "producer-1".to_string(),
            name: "DJ Tester".to_string(),
            email: Some("producer@example.com".to_string()),
        },
        buyer: Party {
            id: "buyer-1".to_string(),
            name: "Ana Compradora".to_string(),
            email: Some("buyer@example.com".to_string()),
        },
        terms,
        platform_name: "Beatpay".to_string(),
        rendered_at: Utc.with_ymd_and_hms(2026, 3, 14, 18, 30, 0).unwrap(),
    }
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    count_occurrences(haystack, needle.as_bytes()) > 0
}

#[test]
fn test_rendering_is_deterministic() {
    let data = contract_data(
        LicenseKind::Basic,
        ContractTerms::platform_default(LicenseKind::Basic),
    );

    let a = render_contract(&data).unwrap();
    let b = render_contract(&data).unwrap();

    assert_eq!(a.bytes, b.bytes);
    assert_eq!(a.verification_id, b.verification_id);
    assert!(a.bytes.starts_with(b"%PDF-"));
}

#[test]
fn test_verification_id_format_and_sensitivity() {
    let data = contract_data(
        LicenseKind::Premium,
        ContractTerms::platform_default(LicenseKind::Premium),
    );
    let id = verification_id(&data);

    assert_eq!(id.len(), 19);
    let groups: Vec<&str> = id.split('-').collect();
    assert_eq!(groups.len(), 4);
    assert!(groups.iter().all(|g| g.len() == 4));
    assert!(
        id.chars()
            .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_uppercase())
    );

    let mut other = data.clone();
    other.price_cents += 1;
    assert_ne!(verification_id(&other), id);
}

#[test]
fn test_contract_shows_parties_and_terms() {
    let data = contract_data(
        LicenseKind::Basic,
        ContractTerms::platform_default(LicenseKind::Basic),
    );
    let rendered = render_contract(&data).unwrap();

    assert!(contains(&rendered.bytes, "NA-1A2B3C4D"));
    assert!(contains(&rendered.bytes, "Noche Azul"));
    assert!(contains(&rendered.bytes, "DJ Tester"));
    assert!(contains(&rendered.bytes, "Ana Compradora"));
    assert!(contains(&rendered.bytes, "500.00 MXN"));
    assert!(contains(&rendered.bytes, "BASIC LICENSE"));
}

#[test]
fn test_every_page_carries_verification_id() {
    let long_text = "The Licensee shall credit the Producer in every release and \
                     every promotional material that features the licensed work. "
        .repeat(120);
    let terms = ContractTerms {
        limits: ContractLimits::platform_default(LicenseKind::Premium),
        custom_text: Some(long_text),
        include_standard_clauses: true,
    };
    let data = contract_data(LicenseKind::Premium, terms);

    let rendered = render_contract(&data).unwrap();

    assert!(rendered.page_count >= 2, "expected pagination, got {} page(s)", rendered.page_count);
    assert_eq!(
        count_occurrences(&rendered.bytes, rendered.verification_id.as_bytes()),
        rendered.page_count
    );
    let last = format!("Page {} of {}", rendered.page_count, rendered.page_count);
    assert!(contains(&rendered.bytes, "Page 1 of"));
    assert!(contains(&rendered.bytes, &last));
}

#[test]
fn test_custom_text_without_standard_clauses() {
    let terms = ContractTerms {
        limits: ContractLimits::default(),
        custom_text: Some("Only for non-commercial use.".to_string()),
        include_standard_clauses: false,
    };
    let rendered = render_contract(&contract_data(LicenseKind::Exclusive, terms)).unwrap();

    assert!(contains(&rendered.bytes, "PRODUCER TERMS"));
    assert!(contains(&rendered.bytes, "Only for non-commercial use."));
}

// ============ Template resolution ============

#[test]
fn test_template_falls_back_to_platform_default() {
    let conn = setup_test_db();

    assert_eq!(
        resolve_template(&conn, None, LicenseKind::Basic),
        TemplateResolution::UsePlatformDefault
    );
    assert_eq!(
        resolve_template(&conn, Some("producer-1"), LicenseKind::Basic),
        TemplateResolution::UsePlatformDefault
    );

    let terms = resolve_template(&conn, Some("producer-1"), LicenseKind::Basic)
        .into_terms(LicenseKind::Basic);
    assert_eq!(terms.limits.max_streams, Some(50_000));
    assert_eq!(terms.limits.max_copies, Some(2_000));
    assert_eq!(terms.limits.max_radio_stations, Some(0));
    assert!(terms.include_standard_clauses);
}

#[test]
fn test_seller_template_overrides_default() {
    let conn = setup_test_db();
    create_test_profile(&conn, "producer-1", "producer@example.com", "DJ Tester");
    queries::create_license_template(
        &conn,
        "producer-1",
        &CreateLicenseTemplate {
            license_type: "basic".to_string(),
            max_streams: Some(100_000),
            max_copies: None,
            max_videos: Some(3),
            max_radio_stations: Some(1),
            custom_text: Some("Tag must stay in the intro.".to_string()),
            include_standard_clauses: true,
        },
    )
    .unwrap();

    match resolve_template(&conn, Some("producer-1"), LicenseKind::Basic) {
        TemplateResolution::SellerOverride(terms) => {
            assert_eq!(terms.limits.max_streams, Some(100_000));
            assert_eq!(terms.limits.max_copies, None);
            assert_eq!(terms.limits.max_videos, Some(3));
            assert_eq!(terms.custom_text.as_deref(), Some("Tag must stay in the intro."));
        }
        other => panic!("expected seller override, got {:?}", other),
    }

    // Other license kinds are unaffected
    assert_eq!(
        resolve_template(&conn, Some("producer-1"), LicenseKind::Premium),
        TemplateResolution::UsePlatformDefault
    );
}
