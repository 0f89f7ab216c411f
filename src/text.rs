pub fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{FEFF}').unwrap_or(s)
}

/// Splits one CSV line. Handles quoted fields and doubled quotes; does not
/// support line breaks inside quotes.
pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

const BROKEN_ENYE: &[(&str, &str)] = &[
    ("Ã±", "ñ"),
    ("ÃA", "Ñ"),
    ("ÃO", "Ñ"),
    ("Ãa", "ñ"),
    ("Ão", "ñ"),
];

/// Repairs text that was stored as UTF-8 but read back as Latin-1
/// (`PEÃA` -> `PEÑA`, `Ã³` -> `ó`). Text that does not look damaged is
/// returned unchanged.
pub fn fix_mojibake(s: &str) -> String {
    // Exporters that lost the second byte of `Ñ` leave `Ã` plus an ascii letter.
    let mut patched = s.to_string();
    for (broken, fixed) in BROKEN_ENYE {
        if patched.contains(broken) {
            patched = patched.replace(broken, fixed);
        }
    }
    if patched != s {
        return patched;
    }

    let looks_damaged = s
        .chars()
        .zip(s.chars().skip(1))
        .any(|(a, b)| a == 'Ã' && ('\u{80}'..='\u{BF}').contains(&b));
    if !looks_damaged {
        return s.to_string();
    }

    let mut bytes = Vec::with_capacity(s.len());
    for ch in s.chars() {
        let code = ch as u32;
        if code > 0xFF {
            return s.to_string();
        }
        bytes.push(code as u8);
    }
    String::from_utf8(bytes).unwrap_or_else(|_| s.to_string())
}

/// Applies [`fix_mojibake`] to every string inside a JSON value.
pub fn fix_json_strings(v: &mut serde_json::Value) {
    match v {
        serde_json::Value::String(s) => {
            let fixed = fix_mojibake(s);
            if fixed != *s {
                *s = fixed;
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(fix_json_strings),
        serde_json::Value::Object(map) => map.values_mut().for_each(fix_json_strings),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn csv_record_handles_quotes() {
        assert_eq!(parse_csv_record("a,b,,c"), vec!["a", "b", "", "c"]);
        assert_eq!(
            parse_csv_record("\"PEREZ, JR\",\"say \"\"hi\"\"\",3"),
            vec!["PEREZ, JR", "say \"hi\"", "3"]
        );
    }

    #[test]
    fn mojibake_is_repaired() {
        assert_eq!(fix_mojibake("PEÃA"), "PEÑA");
        assert_eq!(fix_mojibake("MUÃOZ"), "MUÑOZ");
        assert_eq!(fix_mojibake("peÃ±a"), "peña");
        assert_eq!(fix_mojibake("JosÃ©"), "José");
        assert_eq!(fix_mojibake("GarcÃ\u{AD}a"), "García");
    }

    #[test]
    fn clean_text_is_untouched() {
        assert_eq!(fix_mojibake("PEÑA"), "PEÑA");
        assert_eq!(fix_mojibake("José"), "José");
        assert_eq!(fix_mojibake("plain"), "plain");
    }

    #[test]
    fn json_strings_are_repaired_recursively() {
        let mut v = json!({ "a": ["PEÃA", 3, { "b": "JosÃ©" }], "c": null });
        fix_json_strings(&mut v);
        assert_eq!(v, json!({ "a": ["PEÑA", 3, { "b": "José" }], "c": null }));
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(strip_bom("\u{FEFF}{}"), "{}");
        assert_eq!(strip_bom("{}"), "{}");
    }
}
