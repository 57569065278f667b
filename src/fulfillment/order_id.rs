use sha2::{Digest, Sha256};

use crate::util::ascii_fold;

const MAX_INITIALS: usize = 4;

/// Friendly order id: initials of the purchased items plus a hash of the payment.
///
/// `["Noche Azul", "Drum Kit Vol. 2"]` + `"pi_123"` -> `"ND-1A2B3C4D"`. Items without
/// a usable name contribute nothing; with no initials at all the prefix is `ORD`.
pub fn order_id<'a, I>(item_names: I, payment_reference: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut prefix: String = item_names
        .into_iter()
        .filter_map(|name| {
            ascii_fold(name)
                .chars()
                .find(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_uppercase())
        })
        .take(MAX_INITIALS)
        .collect();
    if prefix.is_empty() {
        prefix = "ORD".to_string();
    }

    let digest = hex::encode_upper(Sha256::digest(payment_reference.as_bytes()));
    format!("{}-{}", prefix, &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let a = order_id(["Noche Azul", "drum kit"], "pi_3PxYz");
        let b = order_id(["Noche Azul", "drum kit"], "pi_3PxYz");
        assert_eq!(a, b);
        assert!(a.starts_with("ND-"));
        assert_eq!(a.len(), "ND-".len() + 8);
    }

    #[test]
    fn hash_part_tracks_payment_reference() {
        let a = order_id(["Beat"], "pi_one");
        let b = order_id(["Beat"], "pi_two");
        assert_ne!(a, b);
        assert!(a[2..].chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
        assert!(a[2..].chars().all(|c| !c.is_ascii_lowercase()));
    }

    #[test]
    fn initials_are_folded_and_capped() {
        let id = order_id(["élan", "¡ritmo!", "sol", "luna", "mar"], "pi_x");
        assert!(id.starts_with("ERSL-"));
    }

    #[test]
    fn falls_back_to_ord_prefix() {
        assert!(order_id(Vec::<&str>::new(), "cs_test").starts_with("ORD-"));
        assert!(order_id(["***"], "cs_test").starts_with("ORD-"));
    }
}
