pub const NO_GROUP: &str = "S/G";

const GROUP_LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const FALLBACK_MAX_CHARS: usize = 10;

type Rule = fn(&str) -> Option<String>;

/// Ordered rewrite rules; the first rule that matches wins.
/// Inputs are already uppercased and trimmed.
const RULES: &[(&str, Rule)] = &[
    ("canonical", canonical),
    ("morning_prefix", morning_prefix),
    ("evening_prefix", evening_prefix),
    ("z_numbered", z_numbered),
    ("z_lettered", z_lettered),
];

/// Maps a raw spreadsheet group label to a canonical `<grade><letter><shift>` code.
///
/// Never fails: labels no rule recognizes are truncated to 10 characters, so two
/// distinct long labels sharing a prefix end up in the same group.
pub fn normalize_group(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return NO_GROUP.to_string();
    };
    let s = raw.trim().to_uppercase();
    if s.is_empty() {
        return NO_GROUP.to_string();
    }
    for (_, rule) in RULES {
        if let Some(code) = rule(&s) {
            return code;
        }
    }
    s.chars().take(FALLBACK_MAX_CHARS).collect()
}

pub fn is_canonical(code: &str) -> bool {
    let b = code.as_bytes();
    b.len() == 3
        && (b'1'..=b'3').contains(&b[0])
        && b[1].is_ascii_uppercase()
        && is_shift(b[2])
}

fn is_shift(b: u8) -> bool {
    b == b'M' || b == b'V'
}

fn canonical(s: &str) -> Option<String> {
    is_canonical(s).then(|| s.to_string())
}

fn morning_prefix(s: &str) -> Option<String> {
    first_year_section(s, b'M').map(|letter| format!("1{}M", letter as char))
}

fn evening_prefix(s: &str) -> Option<String> {
    first_year_section(s, b'V').map(|letter| format!("1{}V", letter as char))
}

// Finds the first `<shift>1<A-H>` anywhere in the label.
fn first_year_section(s: &str, shift: u8) -> Option<u8> {
    s.as_bytes().windows(3).find_map(|w| {
        (w[0] == shift && w[1] == b'1' && (b'A'..=b'H').contains(&w[2])).then_some(w[2])
    })
}

fn letter_for_group_number(n: u8) -> u8 {
    (n as usize)
        .checked_sub(1)
        .and_then(|i| GROUP_LETTERS.get(i))
        .copied()
        .unwrap_or(GROUP_LETTERS[0])
}

fn skip_digits(b: &[u8], mut i: usize) -> usize {
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    i
}

/// `Z<grade><group number>EST<digits>(M|V)<digits>`, e.g. `Z11EST56V1` -> `1AV`.
fn z_numbered(s: &str) -> Option<String> {
    let b = s.as_bytes();
    if b.len() < 7 || b[0] != b'Z' || !b[1].is_ascii_digit() || !b[2].is_ascii_digit() {
        return None;
    }
    if &b[3..6] != b"EST" {
        return None;
    }
    let i = skip_digits(b, 6);
    if i >= b.len() || !is_shift(b[i]) {
        return None;
    }
    if skip_digits(b, i + 1) != b.len() {
        return None;
    }
    let grade = b[1] as char;
    let letter = letter_for_group_number(b[2] - b'0') as char;
    let shift = b[i] as char;
    Some(format!("{grade}{letter}{shift}"))
}

/// `Z<digits>EST<digits>(M|V)<grade><letter>`, e.g. `Z4EST71V1I` -> `1IV`.
fn z_lettered(s: &str) -> Option<String> {
    let b = s.as_bytes();
    if b.first() != Some(&b'Z') {
        return None;
    }
    let i = skip_digits(b, 1);
    if i == 1 || !b[i..].starts_with(b"EST") {
        return None;
    }
    let j = skip_digits(b, i + 3);
    // Exactly three bytes must remain: shift, grade, letter.
    if b.len() != j + 3 {
        return None;
    }
    let (shift, grade, letter) = (b[j], b[j + 1], b[j + 2]);
    if !is_shift(shift) || !grade.is_ascii_digit() || !letter.is_ascii_uppercase() {
        return None;
    }
    Some(format!(
        "{}{}{}",
        grade as char, letter as char, shift as char
    ))
}
