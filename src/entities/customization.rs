use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use utoipa::ToSchema;

/// A selected value on a single customization axis and the price it adds
/// to the product's base price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SlotSelection {
    pub value: String,
    pub price: Decimal,
}

/// Engraving carries more shape than the other axes: an engraving kind
/// plus optional free text or an uploaded logo reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EngravingSelection {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub value: String,
    pub price: Decimal,
}

/// Barrel length is a numeric measurement rather than a named option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BarrelLengthSelection {
    pub value: Decimal,
    pub price: Decimal,
}

/// The full set of chosen product options for one cart or order line.
///
/// Each slot is independent; an absent slot means no selection on that
/// axis. Two bundles are the same selection iff they are structurally
/// equal, including "both slots absent". Comparison always goes through
/// this typed struct rather than raw JSON, so the key order of the
/// persisted blob can never produce a false mismatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CustomizationBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_finish: Option<SlotSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engraving: Option<EngravingSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barrel_length: Option<BarrelLengthSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barrel_material: Option<SlotSelection>,
}

impl CustomizationBundle {
    /// True when no axis carries a selection.
    pub fn is_empty(&self) -> bool {
        self.color_finish.is_none()
            && self.engraving.is_none()
            && self.barrel_length.is_none()
            && self.barrel_material.is_none()
    }

    /// Sum of the price deltas of every present slot.
    pub fn price_delta(&self) -> Decimal {
        let mut total = Decimal::ZERO;
        if let Some(slot) = &self.color_finish {
            total += slot.price;
        }
        if let Some(slot) = &self.engraving {
            total += slot.price;
        }
        if let Some(slot) = &self.barrel_length {
            total += slot.price;
        }
        if let Some(slot) = &self.barrel_material {
            total += slot.price;
        }
        total
    }

    /// Parse a persisted customization blob back into the typed bundle.
    pub fn from_stored(stored: &Json) -> Result<Self, serde_json::Error> {
        serde_json::from_value(stored.clone())
    }

    /// Serialize for persistence. serde_json maps are key-sorted, so the
    /// stored form is canonical.
    pub fn to_stored(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}

/// Structural comparison between a requested bundle and a persisted blob.
///
/// "Both absent" is a match. A blob that fails to parse is treated as
/// not matching, which at worst creates a separate line instead of
/// merging into a corrupt one.
pub fn matches_stored(candidate: Option<&CustomizationBundle>, stored: Option<&Json>) -> bool {
    match (candidate, stored) {
        (None, None) => true,
        (Some(bundle), Some(json)) => CustomizationBundle::from_stored(json)
            .map(|parsed| parsed == *bundle)
            .unwrap_or(false),
        _ => false,
    }
}

/// Structural comparison between two persisted blobs (used by cart merge,
/// where both sides come from storage).
pub fn stored_bundles_equal(a: Option<&Json>, b: Option<&Json>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(left), Some(right)) => {
            match (
                CustomizationBundle::from_stored(left),
                CustomizationBundle::from_stored(right),
            ) {
                (Ok(parsed_left), Ok(parsed_right)) => parsed_left == parsed_right,
                _ => false,
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sample_bundle() -> CustomizationBundle {
        CustomizationBundle {
            color_finish: Some(SlotSelection {
                value: "cerakote-black".into(),
                price: dec!(25.00),
            }),
            engraving: None,
            barrel_length: Some(BarrelLengthSelection {
                value: dec!(16.5),
                price: dec!(40.00),
            }),
            barrel_material: None,
        }
    }

    #[test]
    fn price_delta_sums_present_slots() {
        assert_eq!(sample_bundle().price_delta(), dec!(65.00));
        assert_eq!(CustomizationBundle::default().price_delta(), Decimal::ZERO);
    }

    #[test]
    fn equality_ignores_stored_key_order() {
        let bundle = sample_bundle();
        let reordered = json!({
            "barrel_length": { "price": "40.00", "value": "16.5" },
            "color_finish": { "price": "25.00", "value": "cerakote-black" }
        });
        assert!(matches_stored(Some(&bundle), Some(&reordered)));
    }

    #[test]
    fn both_absent_is_a_match() {
        assert!(matches_stored(None, None));
        assert!(stored_bundles_equal(None, None));
    }

    #[test]
    fn one_sided_absence_is_not_a_match() {
        let bundle = sample_bundle();
        assert!(!matches_stored(Some(&bundle), None));
        assert!(!matches_stored(None, Some(&bundle.to_stored())));
    }

    #[test]
    fn extra_populated_slot_is_a_different_selection() {
        let base = sample_bundle();
        let mut extended = base.clone();
        extended.engraving = Some(EngravingSelection {
            kind: "text".into(),
            text: Some("MOLON LABE".into()),
            logo: None,
            value: "custom-text".into(),
            price: dec!(15.00),
        });
        assert!(!matches_stored(Some(&extended), Some(&base.to_stored())));
        assert!(!stored_bundles_equal(
            Some(&base.to_stored()),
            Some(&extended.to_stored())
        ));
    }

    #[test]
    fn malformed_stored_blob_never_matches() {
        let bundle = sample_bundle();
        let garbage = json!({ "color_finish": "not-an-object" });
        assert!(!matches_stored(Some(&bundle), Some(&garbage)));
    }

    #[test]
    fn round_trips_through_storage() {
        let bundle = sample_bundle();
        let stored = bundle.to_stored();
        let parsed = CustomizationBundle::from_stored(&stored).expect("parse");
        assert_eq!(parsed, bundle);
    }
}
