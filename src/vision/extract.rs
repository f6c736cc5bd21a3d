//! Candidate extraction
//!
//! Normalizes a recognized line into digits and emits the forward reading
//! plus, when different, the mirrored reading seen from the back of a sail.

use tracing::debug;

use super::{NumericCandidate, RawFragment};

/// Plausible digit count for a sail number
pub const MIN_DIGITS: usize = 2;
pub const MAX_DIGITS: usize = 6;

/// Plausible numeric range for a sail number
pub const MIN_VALUE: u32 = 10;
pub const MAX_VALUE: u32 = 999_999;

/// Replace letters OCR commonly confuses with digits
fn substitute_confusables(c: char) -> char {
    match c {
        'O' | 'o' => '0',
        'I' | 'l' => '1',
        other => other,
    }
}

/// Normalize fragment text to its digit string.
///
/// Substitution runs before stripping, so `"O1I"` becomes `"011"`.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(substitute_confusables)
        .filter(|c| c.is_ascii_digit())
        .collect()
}

fn in_range(value: u32) -> bool {
    (MIN_VALUE..=MAX_VALUE).contains(&value)
}

/// Extract 0, 1 or 2 numeric candidates from a fragment
pub fn extract_candidates(fragment: &RawFragment) -> Vec<NumericCandidate> {
    let digits = normalize_digits(&fragment.text);

    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return Vec::new();
    }

    // At most 6 ASCII digits, always fits in u32
    let Ok(forward) = digits.parse::<u32>() else {
        return Vec::new();
    };

    // A string whose own value is implausible yields nothing, mirrored or not
    if !in_range(forward) {
        return Vec::new();
    }

    let reversed_digits: String = digits.chars().rev().collect();
    let reversed = reversed_digits.parse::<u32>().ok().filter(|&v| v != forward);

    let mut candidates = Vec::with_capacity(2);
    candidates.push(NumericCandidate {
        value: forward,
        digit_string: digits.clone(),
        confidence: fragment.confidence,
        source_text: fragment.text.clone(),
        region: fragment.region.clone(),
        is_digit_reversed: false,
    });

    if let Some(value) = reversed.filter(|&v| in_range(v)) {
        candidates.push(NumericCandidate {
            value,
            digit_string: reversed_digits,
            confidence: fragment.confidence,
            source_text: fragment.text.clone(),
            region: fragment.region.clone(),
            is_digit_reversed: true,
        });
    }

    debug!(
        "Extracted {} candidate(s) from {:?}: {:?}",
        candidates.len(),
        fragment.text,
        candidates.iter().map(|c| c.value).collect::<Vec<_>>()
    );

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Region;

    fn fragment(text: &str) -> RawFragment {
        RawFragment::new(text, 0.9, Region::rect(0.0, 0.0, 40.0, 20.0))
    }

    fn values(text: &str) -> Vec<(u32, bool)> {
        extract_candidates(&fragment(text))
            .into_iter()
            .map(|c| (c.value, c.is_digit_reversed))
            .collect()
    }

    #[test]
    fn test_normalize_digits() {
        assert_eq!(normalize_digits("GBR 1234"), "1234");
        assert_eq!(normalize_digits("O1I"), "011");
        assert_eq!(normalize_digits("l0o"), "100");
        assert_eq!(normalize_digits("no digits"), "0");
        assert_eq!(normalize_digits(""), "");
    }

    #[test]
    fn test_forward_and_reversed() {
        assert_eq!(values("1234"), vec![(1234, false), (4321, true)]);
        assert_eq!(values("17"), vec![(17, false), (71, true)]);
    }

    #[test]
    fn test_palindrome_yields_single_candidate() {
        assert_eq!(values("121"), vec![(121, false)]);
        assert_eq!(values("55"), vec![(55, false)]);
    }

    #[test]
    fn test_substitution_before_range_filter() {
        // "O1I" -> "011" -> 11 forward, "110" reversed
        let candidates = extract_candidates(&fragment("O1I"));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].value, 11);
        assert_eq!(candidates[0].digit_string, "011");
        assert!(!candidates[0].is_digit_reversed);
        assert_eq!(candidates[1].value, 110);
        assert_eq!(candidates[1].digit_string, "110");
        assert!(candidates[1].is_digit_reversed);
    }

    #[test]
    fn test_length_out_of_bounds() {
        assert!(values("7").is_empty());
        assert!(values("1234567").is_empty());
        assert!(values("").is_empty());
        assert!(values("ABC").is_empty());
    }

    #[test]
    fn test_value_out_of_range() {
        // "05" is two digits but only 5
        assert!(values("05").is_empty());
        assert!(values("00").is_empty());
    }

    #[test]
    fn test_reversed_out_of_range_dropped() {
        // "10" reverses to "01" = 1
        assert_eq!(values("10"), vec![(10, false)]);
        // "500" reverses to "005" = 5
        assert_eq!(values("500"), vec![(500, false)]);
    }

    #[test]
    fn test_forward_out_of_range_drops_reversed_too() {
        // "09" = 9 is too small; its mirror "90" is not offered either
        assert!(values("09").is_empty());
        assert!(values("O7").is_empty());
    }

    #[test]
    fn test_every_valid_digit_string_yields_forward_value() {
        for value in [10u32, 42, 99, 100, 707, 1234, 54321, 999_999] {
            let text = value.to_string();
            let candidates = extract_candidates(&fragment(&text));
            assert!(
                candidates.iter().any(|c| c.value == value && !c.is_digit_reversed),
                "missing forward candidate for {}",
                text
            );
        }
    }

    #[test]
    fn test_provenance_is_kept() {
        let candidates = extract_candidates(&fragment("USA 42"));
        assert!(candidates.iter().all(|c| c.source_text == "USA 42"));
        assert!(candidates.iter().all(|c| (c.confidence - 0.9).abs() < f32::EPSILON));
    }
}
