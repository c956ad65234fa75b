//! Defect vocabulary: keyword matching, result derivation and error codes

use crate::model::{InspectionResult, NO_DEFECT, OTHER, PLACEHOLDER};

/// Label returned when classifier text contains no known keyword
pub const NO_VISIBLE_DEFECT: &str = "No Visible Defect";

/// Keyword → symptom label, matched case-insensitively in table order
pub const SYMPTOM_KEYWORDS: [(&str, &str); 9] = [
    ("crack", "Cracked Screen"),
    ("dent", "Dent"),
    ("scratch", "Scratch"),
    ("water", "Water Damage"),
    ("button", "Button Damage"),
    ("speaker", "Speaker Damage"),
    ("back cover", "Back Cover Damage"),
    ("burn", "Burn Marks"),
    ("bulging", "Bulging"),
];

/// Map free text from an image classifier to a symptom label
///
/// # Examples
///
/// ```
/// use qit_common::defect::match_symptom;
///
/// assert_eq!(match_symptom("The screen is Cracked near the notch"), "Cracked Screen");
/// assert_eq!(match_symptom("Looks clean"), "No Visible Defect");
/// ```
pub fn match_symptom(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    SYMPTOM_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, label)| *label)
        .unwrap_or(NO_VISIBLE_DEFECT)
}

/// Translate a classifier label into the symptom stored on a row
pub fn symptom_for_label(label: &str) -> &str {
    if label == NO_VISIBLE_DEFECT {
        NO_DEFECT
    } else {
        label
    }
}

/// True for the no-defect sentinel (case-insensitive)
pub fn is_no_defect(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(NO_DEFECT)
}

/// True for the open-vocabulary escape value
pub fn is_other(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(OTHER)
}

/// Result implied by location and symptom: OK only when both say no defect
pub fn derive_result(location: &str, symptom: &str) -> InspectionResult {
    if is_no_defect(location) && is_no_defect(symptom) {
        InspectionResult::Ok
    } else {
        InspectionResult::Ng
    }
}

/// Short error code for a symptom: the upper-cased initials of its words
///
/// The no-defect sentinel and blank text have no code.
pub fn derive_error_code(symptom: &str) -> String {
    let symptom = symptom.trim();
    if symptom.is_empty() || symptom == PLACEHOLDER || is_no_defect(symptom) {
        return PLACEHOLDER.to_string();
    }
    symptom
        .split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .flat_map(|c| c.to_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_each_keyword() {
        for (keyword, label) in SYMPTOM_KEYWORDS {
            let text = format!("I can see {} on the unit", keyword.to_uppercase());
            assert_eq!(match_symptom(&text), label);
        }
    }

    #[test]
    fn test_first_table_hit_wins() {
        // both "scratch" and "dent" appear; "dent" is earlier in the table
        assert_eq!(match_symptom("a scratch next to a dent"), "Dent");
    }

    #[test]
    fn test_no_keyword() {
        assert_eq!(match_symptom(""), NO_VISIBLE_DEFECT);
        assert_eq!(match_symptom("device looks fine"), NO_VISIBLE_DEFECT);
    }

    #[test]
    fn test_symptom_for_label() {
        assert_eq!(symptom_for_label(NO_VISIBLE_DEFECT), NO_DEFECT);
        assert_eq!(symptom_for_label("Dent"), "Dent");
    }

    #[test]
    fn test_derive_result() {
        assert_eq!(derive_result("No Defect", "No Defect"), InspectionResult::Ok);
        assert_eq!(derive_result("no defect", " NO DEFECT "), InspectionResult::Ok);
        assert_eq!(derive_result("Screen", "No Defect"), InspectionResult::Ng);
        assert_eq!(derive_result("No Defect", "Scratch"), InspectionResult::Ng);
        assert_eq!(derive_result("-", "-"), InspectionResult::Ng);
    }

    #[test]
    fn test_derive_error_code() {
        assert_eq!(derive_error_code("Cracked Screen"), "CS");
        assert_eq!(derive_error_code("Dent"), "D");
        assert_eq!(derive_error_code("back cover damage"), "BCD");
        assert_eq!(derive_error_code("No Defect"), "-");
        assert_eq!(derive_error_code("  "), "-");
    }
}
