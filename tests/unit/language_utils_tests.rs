/*!
 * Tests for ISO language code utilities
 */

use lektor::language_utils::{
    Language, get_language_name, language_codes_match, normalize_code, validate_language_code,
};

#[test]
fn test_validateLanguageCode_withVariousCodes_shouldAcceptIsoOnly() {
    for code in ["sr", "srp", "ru", "rus", "fre", "EN"] {
        assert!(validate_language_code(code).is_ok(), "{}", code);
    }
    for code in ["", "xx", "serbian", "s"] {
        assert!(validate_language_code(code).is_err(), "{}", code);
    }
}

#[test]
fn test_normalizeCode_shouldPreferTwoLetterCodes() {
    assert_eq!(normalize_code("srp").unwrap(), "sr");
    assert_eq!(normalize_code("ger").unwrap(), "de");
    assert!(normalize_code("zz").is_err());
}

#[test]
fn test_languageCodesMatch_shouldCompareAcrossStandards() {
    assert!(language_codes_match("sr", "srp"));
    assert!(language_codes_match("fre", "fr"));
    assert!(!language_codes_match("sr", "hr"));
    assert!(!language_codes_match("", ""));
}

#[test]
fn test_language_fromCode_shouldResolveNames() {
    let serbian = Language::from_code(" SR ");
    assert_eq!(serbian.code, "sr");
    assert_eq!(serbian.display_name(), "Serbian");
    assert_eq!(get_language_name("rus").unwrap(), "Russian");

    let unknown = Language::from_code("");
    assert!(unknown.is_unset());
}
