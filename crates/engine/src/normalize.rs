//! Turning free-form player input into catalog identifiers and names.

use crate::catalog::Catalog;

/// Resolves a typed guess to a canonical character id.
///
/// Without a catalog the trimmed input passes through. Otherwise, in order:
/// numeric alias, case-insensitive id, case-insensitive display name. Input
/// that resolves to nothing passes through trimmed; it simply never matches.
pub fn normalize_character_key(input: &str, catalog: Option<&Catalog>) -> String {
    let trimmed = input.trim();
    let Some(catalog) = catalog.filter(|_| !trimmed.is_empty()) else {
        return trimmed.to_string();
    };

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if let Some(id) = catalog.id_for_alias(trimmed) {
            return id.to_string();
        }
    }

    let lower = trimmed.to_lowercase();
    if let Some(id) = catalog.keys().iter().find(|id| id.to_lowercase() == lower) {
        return id.clone();
    }
    catalog
        .characters()
        .find(|c| c.name.to_lowercase() == lower)
        .map(|c| c.id.clone())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Shortest guess accepted as a partial variant name.
const MIN_PARTIAL_LEN: usize = 3;

/// Case- and accent-insensitive comparison of a variant-name guess. A guess
/// contained in the real name ("blood moon" for "Blood Moon Aatrox") counts.
pub fn skin_name_matches(guess: &str, correct: &str) -> bool {
    let guess = fold(guess);
    let correct = fold(correct);
    if guess.is_empty() {
        return false;
    }
    guess == correct || (guess.chars().count() >= MIN_PARTIAL_LEN && correct.contains(&guess))
}

/// Trimmed, lowercased, whitespace-collapsed, with Latin accents removed.
pub fn fold(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for word in input.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        for ch in word.chars().flat_map(char::to_lowercase) {
            match strip_accent(ch) {
                Some(plain) => out.push_str(plain),
                None => out.push(ch),
            }
        }
    }
    out
}

fn strip_accent(ch: char) -> Option<&'static str> {
    let plain = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'ĉ' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' | 'ģ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' | 'ļ' => "l",
        'ñ' | 'ń' | 'ň' | 'ņ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' | 'ŕ' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(plain)
}
