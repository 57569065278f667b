use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::util::ascii_fold;

use super::{Clause, ContractData, format_money, standard_clauses};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("PDF encoding failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone)]
pub struct RenderedContract {
    pub bytes: Vec<u8>,
    pub verification_id: String,
    pub page_count: usize,
}

// A4 in points. Courier glyphs are 0.6 em wide, which makes wrapping exact.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN_X: i64 = 56;
const TOP_Y: i64 = PAGE_HEIGHT - 56;
const BODY_BOTTOM_Y: i64 = 80;
const FOOTER_Y: i64 = 40;

const TITLE_SIZE: i64 = 14;
const BODY_SIZE: i64 = 10;
const FOOTER_SIZE: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(&self) -> &'static [u8] {
        match self {
            Font::Regular => b"F1",
            Font::Bold => b"F2",
        }
    }
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    font: Font,
    size: i64,
    /// Extra space above the line, dropped at the top of a page.
    gap_before: i64,
}

struct PlacedLine {
    line: Line,
    y: i64,
}

fn max_chars(size: i64) -> usize {
    (((PAGE_WIDTH - 2 * MARGIN_X) * 10) / (6 * size)) as usize
}

/// Greedy word wrap on character count; overlong words are hard-split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            lines.push(word);
            word = rest;
        }
        if current.is_empty() {
            current = word;
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(&word);
        } else {
            lines.push(std::mem::replace(&mut current, word));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct Layout {
    lines: Vec<Line>,
}

impl Layout {
    fn new() -> Self {
        Self { lines: Vec::new() }
    }

    fn paragraph(&mut self, text: &str, font: Font, size: i64, gap_before: i64) {
        let folded = ascii_fold(text);
        for (i, wrapped) in wrap(&folded, max_chars(size)).into_iter().enumerate() {
            self.lines.push(Line {
                text: wrapped,
                font,
                size,
                gap_before: if i == 0 { gap_before } else { 0 },
            });
        }
    }

    fn clause(&mut self, number: usize, clause: &Clause) {
        self.paragraph(
            &format!("{}. {}", number, clause.title.to_uppercase()),
            Font::Bold,
            BODY_SIZE,
            10,
        );
        for (i, para) in clause.body.split('\n').filter(|p| !p.trim().is_empty()).enumerate() {
            self.paragraph(para, Font::Regular, BODY_SIZE, if i == 0 { 2 } else { 6 });
        }
    }

    /// Split the laid out lines into pages.
    fn paginate(self) -> Vec<Vec<PlacedLine>> {
        let mut pages: Vec<Vec<PlacedLine>> = vec![Vec::new()];
        let mut y = TOP_Y;

        for line in self.lines {
            let leading = line.size + 4;
            let needed = line.gap_before + leading;
            let page_has_content = pages.last().is_some_and(|p| !p.is_empty());

            if page_has_content && y - needed < BODY_BOTTOM_Y {
                pages.push(Vec::new());
                y = TOP_Y;
            }

            let at_top = pages.last().is_none_or(|p| p.is_empty());
            y -= if at_top { leading } else { needed };

            if let Some(page) = pages.last_mut() {
                page.push(PlacedLine { line, y });
            }
        }
        pages
    }
}

/// Short fingerprint printed on every page so a copy can be matched with
/// the order it was issued for.
pub fn verification_id(data: &ContractData) -> String {
    let limits = &data.terms.limits;
    let fields = [
        data.order_id.clone(),
        data.date.to_string(),
        data.license_kind.as_ref().to_string(),
        data.product_name.clone(),
        data.price_cents.to_string(),
        data.currency.to_uppercase(),
        data.producer.id.clone(),
        data.producer.name.clone(),
        data.buyer.id.clone(),
        data.buyer.name.clone(),
        data.buyer.email.clone().unwrap_or_default(),
        format!(
            "{:?}/{:?}/{:?}/{:?}",
            limits.max_streams, limits.max_copies, limits.max_videos, limits.max_radio_stations
        ),
        data.terms.custom_text.clone().unwrap_or_default(),
        data.rendered_at.to_rfc3339(),
    ];

    let mut hasher = Sha256::new();
    for field in &fields {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode_upper(hasher.finalize());

    digest[..16]
        .as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

fn party_line(role: &str, name: &str, email: Option<&str>) -> String {
    match email {
        Some(email) if !email.is_empty() => format!("{}: {} <{}>", role, name, email),
        _ => format!("{}: {}", role, name),
    }
}

fn layout_contract(data: &ContractData) -> Layout {
    let mut layout = Layout::new();
    let label = data.license_kind.label();

    layout.paragraph(&label.to_uppercase(), Font::Bold, TITLE_SIZE, 0);
    layout.paragraph(
        &format!("Issued by {}", data.platform_name),
        Font::Regular,
        BODY_SIZE,
        4,
    );

    layout.paragraph(&format!("Order ID: {}", data.order_id), Font::Regular, BODY_SIZE, 14);
    layout.paragraph(
        &format!("Date: {}", data.date.format("%B %-d, %Y")),
        Font::Regular,
        BODY_SIZE,
        0,
    );
    layout.paragraph(&format!("Product: {}", data.product_name), Font::Regular, BODY_SIZE, 0);
    layout.paragraph(&format!("License: {}", label), Font::Regular, BODY_SIZE, 0);
    layout.paragraph(
        &format!("Price: {}", format_money(data.price_cents, &data.currency)),
        Font::Regular,
        BODY_SIZE,
        0,
    );
    layout.paragraph(
        &party_line("Producer", &data.producer.name, data.producer.email.as_deref()),
        Font::Regular,
        BODY_SIZE,
        8,
    );
    layout.paragraph(
        &party_line("Licensee", &data.buyer.name, data.buyer.email.as_deref()),
        Font::Regular,
        BODY_SIZE,
        0,
    );

    layout.paragraph(
        &format!(
            "This {} (the \"Agreement\") is entered into on {} between {} (the \"Producer\") \
             and {} (the \"Licensee\") for the product \"{}\".",
            label,
            data.date.format("%B %-d, %Y"),
            data.producer.name,
            data.buyer.name,
            data.product_name
        ),
        Font::Regular,
        BODY_SIZE,
        14,
    );

    let terms = &data.terms;
    let mut clauses = Vec::new();
    if terms.include_standard_clauses || terms.custom_text.is_none() {
        clauses.extend(standard_clauses(data));
    }
    if let Some(ref text) = terms.custom_text {
        clauses.push(Clause {
            title: "Producer Terms".to_string(),
            body: text.clone(),
        });
    }
    for (i, clause) in clauses.iter().enumerate() {
        layout.clause(i + 1, clause);
    }

    layout.paragraph(
        &format!(
            "Accepted electronically by the Licensee upon payment of order {}.",
            data.order_id
        ),
        Font::Regular,
        BODY_SIZE,
        18,
    );

    layout
}

fn text_op(font: Font, size: i64, x: i64, y: i64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![
                Object::Name(font.resource_name().to_vec()),
                Object::Integer(size),
            ],
        ),
        Operation::new("Td", vec![Object::Integer(x), Object::Integer(y)]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

/// Render the contract as an uncompressed PDF.
///
/// Output depends only on `data`: the same input yields identical bytes.
pub fn render_contract(data: &ContractData) -> Result<RenderedContract, RenderError> {
    let verification_id = verification_id(data);
    let pages = layout_contract(data).paginate();
    let page_count = pages.len();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(page_count);
    for (index, placed) in pages.into_iter().enumerate() {
        let mut operations = Vec::new();
        for PlacedLine { line, y } in placed {
            operations.extend(text_op(line.font, line.size, MARGIN_X, y, &line.text));
        }
        let footer = format!(
            "Verification ID: {} | Page {} of {}",
            verification_id,
            index + 1,
            page_count
        );
        operations.extend(text_op(Font::Regular, FOOTER_SIZE, MARGIN_X, FOOTER_Y, &footer));

        let content = Content { operations };
        let encoded = content.encode().map_err(|e| RenderError::Pdf(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(page_count as i64),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;

    Ok(RenderedContract {
        bytes,
        verification_id,
        page_count,
    })
}
