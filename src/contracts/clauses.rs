use super::{ContractData, ContractLimits, LicenseKind};

/// One numbered section of the contract body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub title: String,
    pub body: String,
}

impl Clause {
    fn new(title: &str, body: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            body: body.into(),
        }
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// "up to 50,000 streams", "an unlimited number of streams", "no streams"
fn cap(limit: Option<i64>, unit: &str) -> String {
    match limit {
        None => format!("an unlimited number of {}", unit),
        Some(n) if n <= 0 => format!("no {}", unit),
        Some(n) => format!("up to {} {}", group_thousands(n), unit),
    }
}

fn usage_clauses(limits: &ContractLimits) -> Vec<Clause> {
    vec![
        Clause::new(
            "Distribution",
            format!(
                "Licensee may distribute the New Work through digital retailers and streaming \
                 services for {} in aggregate, and may sell or give away {} of physical or \
                 downloadable copies.",
                cap(limits.max_streams, "streams"),
                cap(limits.max_copies, "units"),
            ),
        ),
        Clause::new(
            "Audiovisual Use",
            format!(
                "Licensee may synchronize the New Work with {} published on any platform, \
                 monetized or not.",
                cap(limits.max_videos, "music videos"),
            ),
        ),
        Clause::new(
            "Broadcast",
            match limits.max_radio_stations {
                Some(n) if n <= 0 => "Broadcast of the New Work by terrestrial or satellite \
                                     radio stations is not permitted under this license."
                    .to_string(),
                _ => format!(
                    "Licensee may license the New Work for broadcast on {}.",
                    cap(limits.max_radio_stations, "radio stations"),
                ),
            },
        ),
    ]
}

fn credit_clause(data: &ContractData) -> Clause {
    Clause::new(
        "Credit",
        format!(
            "Licensee shall credit the Producer as \"Prod. by {}\" in the title or description \
             of every release of the New Work where credits are customarily shown.",
            data.producer.name
        ),
    )
}

/// Platform clause set for the license kind, in the order they are printed.
pub fn standard_clauses(data: &ContractData) -> Vec<Clause> {
    let product = &data.product_name;
    let producer = &data.producer.name;
    let limits = &data.terms.limits;

    let mut clauses = Vec::new();

    match data.license_kind {
        LicenseKind::Basic | LicenseKind::Premium | LicenseKind::Unlimited => {
            let delivery = match data.license_kind {
                LicenseKind::Basic => "an MP3 file",
                LicenseKind::Premium => "MP3 and WAV files",
                _ => "MP3 and WAV files and the individual track stems",
            };
            clauses.push(Clause::new(
                "Grant of License",
                format!(
                    "Producer grants Licensee a non-exclusive, non-transferable license to use \
                     the instrumental \"{}\" (the \"Beat\"), delivered as {}, in one new song \
                     or composition (the \"New Work\"). Producer may continue to license the \
                     Beat to third parties.",
                    product, delivery
                ),
            ));
            clauses.extend(usage_clauses(limits));
            clauses.push(Clause::new(
                "Ownership",
                format!(
                    "{} retains full ownership of the Beat and its copyright. Licensee owns \
                     the lyrics and vocal performances recorded on the New Work. The musical \
                     composition of the New Work is split 50% to Licensee and 50% to Producer.",
                    producer
                ),
            ));
            clauses.push(credit_clause(data));
            clauses.push(Clause::new(
                "Restrictions",
                "Licensee may not resell, sublicense or distribute the Beat on its own, and may \
                 not register the Beat or the New Work with a content identification system \
                 (such as YouTube Content ID).",
            ));
            if data.license_kind != LicenseKind::Unlimited {
                clauses.push(Clause::new(
                    "Upgrades",
                    "Once any limit above is reached, Licensee must purchase a higher license \
                     before further exploitation of the New Work.",
                ));
            }
        }
        LicenseKind::Exclusive => {
            clauses.push(Clause::new(
                "Grant of Exclusive Rights",
                format!(
                    "Producer grants Licensee the exclusive right to use the instrumental \"{}\" \
                     (the \"Beat\"), delivered as MP3 and WAV files and the individual track \
                     stems, in new songs or compositions (each a \"New Work\") without limits \
                     on distribution, streaming, audiovisual use or broadcast.",
                    product
                ),
            ));
            clauses.push(Clause::new(
                "Withdrawal From Sale",
                "Producer shall remove the Beat from sale on every storefront upon execution of \
                 this agreement and shall not license it to any further party.",
            ));
            clauses.push(Clause::new(
                "Prior Licenses",
                "Non-exclusive licenses granted before this agreement remain valid until their \
                 own limits or terms expire. Licensee accepts that such prior releases may \
                 exist.",
            ));
            clauses.push(Clause::new(
                "Ownership and Publishing",
                format!(
                    "{} retains the copyright in the Beat as an underlying work. The musical \
                     composition of each New Work is split 50% to Licensee and 50% to Producer, \
                     and each party may register its share with its performing rights \
                     organization. Licensee may register the New Work with content \
                     identification systems.",
                    producer
                ),
            ));
            clauses.push(credit_clause(data));
        }
        LicenseKind::SoundKit => {
            clauses.push(Clause::new(
                "Grant of License",
                format!(
                    "Producer grants Licensee a non-exclusive, perpetual license to use the \
                     sounds contained in \"{}\" (the \"Kit\") in an unlimited number of musical \
                     compositions and productions.",
                    product
                ),
            ));
            clauses.push(Clause::new(
                "Royalty Free Use",
                "Compositions made with the Kit may be released, sold, streamed and broadcast \
                 commercially without further payment or royalties to Producer.",
            ));
            clauses.push(Clause::new(
                "Redistribution",
                "Licensee may not resell, share or give away the sounds of the Kit on their own \
                 or as part of another sample pack, sound library or preset collection, whether \
                 modified or not.",
            ));
            clauses.push(Clause::new(
                "Ownership",
                format!("{} retains full ownership of the Kit and its sounds.", producer),
            ));
        }
    }

    clauses.push(Clause::new(
        "Term",
        "This license is perpetual and worldwide, subject to the limits above.",
    ));
    clauses.push(Clause::new(
        "Platform",
        format!(
            "This agreement was concluded through {}, which processed the payment and issued \
             this document. {} is not a party to this agreement.",
            data.platform_name, data.platform_name
        ),
    ));

    clauses
}
