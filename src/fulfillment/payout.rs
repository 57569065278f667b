use serde::Serialize;

/// Fees withheld from a seller-owned sale. Percentages are given in percent
/// (3.6 means 3.6%).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeModel {
    pub processor_percent: f64,
    pub processor_fixed_cents: i64,
    /// Tax charged on top of the processor fee.
    pub processor_tax_multiplier: f64,
    pub commission_percent: f64,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            processor_percent: 3.6,
            processor_fixed_cents: 300,
            processor_tax_multiplier: 1.16,
            commission_percent: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Payout {
    pub gross_cents: i64,
    pub processor_fee_cents: i64,
    pub commission_cents: i64,
    pub net_cents: i64,
}

/// Split a gross sale amount into fees and the seller's net, rounding each
/// component to the nearest cent. The net is never negative.
pub fn compute_payout(gross_cents: i64, model: &FeeModel) -> Payout {
    let gross = gross_cents as f64;
    let processor_fee = ((gross * model.processor_percent / 100.0
        + model.processor_fixed_cents as f64)
        * model.processor_tax_multiplier)
        .round() as i64;
    let commission = (gross * model.commission_percent / 100.0).round() as i64;

    Payout {
        gross_cents,
        processor_fee_cents: processor_fee,
        commission_cents: commission,
        net_cents: (gross_cents - processor_fee - commission).max(0),
    }
}
