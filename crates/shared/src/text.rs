//! Small English and number helpers used when dissecting ingredient lines.

/// Best-effort singular form of an ingredient name ("tomatoes" -> "tomato").
pub fn unpluralize(word: &str) -> String {
    let word = word.trim();
    let lower = word.to_ascii_lowercase();
    let cut = |n: usize| word[..word.len() - n].to_string();

    if lower.len() > 3 && lower.ends_with("ies") {
        return format!("{}y", cut(3));
    }
    if lower.len() > 3 && lower.ends_with("oes") {
        return cut(2);
    }
    for suffix in ["ches", "shes", "sses", "xes", "zes"] {
        if lower.len() > suffix.len() && lower.ends_with(suffix) {
            return cut(2);
        }
    }
    if lower.len() > 1
        && lower.ends_with('s')
        && !lower.ends_with("ss")
        && !lower.ends_with("us")
        && !lower.ends_with("is")
    {
        return cut(1);
    }
    word.to_string()
}

/// Parses "2", "1.5", ".5", "1/2", "1 1/2" and the common vulgar fractions.
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let mut total = 0.0;
    for part in text.split_whitespace() {
        total += parse_part(part)?;
    }
    Some(total)
}

fn parse_part(part: &str) -> Option<f64> {
    if let Some(value) = vulgar_fraction(part) {
        return Some(value);
    }
    let mut chars = part.chars();
    if let (Some(last), true) = (chars.next_back(), part.chars().count() > 1) {
        if let Some(frac) = vulgar_fraction(&last.to_string()) {
            let whole: f64 = chars.as_str().parse().ok()?;
            return Some(whole + frac);
        }
    }
    if let Some((num, den)) = part.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    part.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn vulgar_fraction(part: &str) -> Option<f64> {
    Some(match part {
        "½" => 0.5,
        "⅓" => 1.0 / 3.0,
        "⅔" => 2.0 / 3.0,
        "¼" => 0.25,
        "¾" => 0.75,
        "⅛" => 0.125,
        _ => return None,
    })
}
