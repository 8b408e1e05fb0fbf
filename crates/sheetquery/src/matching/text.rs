//! Text normalization, edit-distance similarity and script detection.

/// Writing system of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    /// Han ideographs and Japanese kana.
    Cjk,
    Hangul,
    Other,
}

/// Script of a single character, `None` for digits and punctuation.
pub fn char_script(c: char) -> Option<Script> {
    if !c.is_alphabetic() {
        return None;
    }
    let script = match c as u32 {
        0x0000..=0x024F | 0x1E00..=0x1EFF => Script::Latin,
        0x0370..=0x03FF => Script::Greek,
        0x0400..=0x052F => Script::Cyrillic,
        0x0590..=0x05FF => Script::Hebrew,
        0x0600..=0x06FF | 0x0750..=0x077F => Script::Arabic,
        0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0xFF66..=0xFF9F => {
            Script::Cjk
        }
        0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF => Script::Hangul,
        _ => Script::Other,
    };
    Some(script)
}

/// Whether a character belongs to a script written without spaces.
pub fn is_cjk(c: char) -> bool {
    matches!(char_script(c), Some(Script::Cjk | Script::Hangul))
}

/// Most frequent script among the letters of `s`.
pub fn dominant_script(s: &str) -> Option<Script> {
    let mut counts: Vec<(Script, usize)> = Vec::new();
    for script in s.chars().filter_map(char_script) {
        match counts.iter_mut().find(|(sc, _)| *sc == script) {
            Some((_, n)) => *n += 1,
            None => counts.push((script, 1)),
        }
    }
    // First seen wins ties.
    let mut best: Option<(Script, usize)> = None;
    for (script, n) in counts {
        if best.is_none_or(|(_, b)| n > b) {
            best = Some((script, n));
        }
    }
    best.map(|(s, _)| s)
}

/// Whether two strings are written in the same script. Strings without
/// letters are compatible with anything.
pub fn same_script(a: &str, b: &str) -> bool {
    match (dominant_script(a), dominant_script(b)) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

/// Normalize text for comparison: split camelCase, lowercase, fold Latin
/// diacritics, turn separators and punctuation into single spaces.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.trim().chars() {
        if c.is_alphanumeric() {
            if prev.is_some_and(|p| p.is_lowercase()) && c.is_uppercase() {
                out.push(' ');
            }
            for lower in c.to_lowercase() {
                out.push(fold_diacritic(lower));
            }
        } else {
            out.push(' ');
        }
        prev = Some(c);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase and fold Latin diacritics, keeping punctuation and spacing.
pub fn fold_case(s: &str) -> String {
    s.to_lowercase().chars().map(fold_diacritic).collect()
}

/// Position of a normalized term inside normalized text: whole words for
/// space-separated scripts, plain substring for CJK terms.
pub fn find_term(haystack: &str, term: &str) -> Option<usize> {
    if term.is_empty() {
        return None;
    }
    if term.chars().any(is_cjk) {
        return haystack.find(term);
    }
    format!(" {} ", haystack).find(&format!(" {} ", term))
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'ē' | 'ę' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'ī' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'ō' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'ū' => 'u',
        'ñ' | 'ń' => 'n',
        'ç' | 'ć' | 'č' => 'c',
        'ś' | 'š' => 's',
        'ž' | 'ź' | 'ż' => 'z',
        'ł' => 'l',
        'ý' | 'ÿ' => 'y',
        'ё' => 'е',
        other => other,
    }
}

/// Split text into comparison tokens.
///
/// Space-separated scripts split on non-alphanumerics; runs of Han, Kana or
/// Hangul emit the run itself plus its character bigrams.
pub fn tokenize(s: &str) -> Vec<String> {
    let normalized = normalize(s);
    let mut tokens = Vec::new();
    for word in normalized.split(' ').filter(|w| !w.is_empty()) {
        let mut latin = String::new();
        let mut cjk: Vec<char> = Vec::new();
        for c in word.chars() {
            if is_cjk(c) {
                flush_word(&mut latin, &mut tokens);
                cjk.push(c);
            } else {
                flush_cjk(&mut cjk, &mut tokens);
                latin.push(c);
            }
        }
        flush_word(&mut latin, &mut tokens);
        flush_cjk(&mut cjk, &mut tokens);
    }
    tokens
}

fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
    if !word.is_empty() {
        tokens.push(std::mem::take(word));
    }
}

fn flush_cjk(run: &mut Vec<char>, tokens: &mut Vec<String>) {
    if run.is_empty() {
        return;
    }
    tokens.push(run.iter().collect());
    if run.len() > 2 {
        for pair in run.windows(2) {
            tokens.push(pair.iter().collect());
        }
    }
    run.clear();
}

/// Levenshtein edit distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];
    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Similarity ratio in `[0, 1]` of two already-normalized strings.
pub fn ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Similarity ratio after normalizing both sides.
pub fn similarity(a: &str, b: &str) -> f64 {
    ratio(&normalize(a), &normalize(b))
}

/// Resolve a concept to a header position: exact normalized match, then
/// containment, then the best similarity ratio above 0.7.
pub fn resolve_header(headers: &[String], concept: &str) -> Option<usize> {
    let target = normalize(concept);
    if target.is_empty() {
        return None;
    }
    let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();

    if let Some(i) = normalized.iter().position(|h| *h == target) {
        return Some(i);
    }

    let contains = normalized.iter().position(|h| {
        !h.is_empty()
            && (h.contains(&target) || (h.chars().count() >= 3 && target.contains(h.as_str())))
    });
    if contains.is_some() {
        return contains;
    }

    let mut best: Option<(usize, f64)> = None;
    for (i, h) in normalized.iter().enumerate() {
        if h.is_empty() || !same_script(h, &target) {
            continue;
        }
        let r = ratio(h, &target);
        if r > 0.7 && best.is_none_or(|(_, b)| r > b) {
            best = Some((i, r));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Vendor_Name "), "vendor name");
        assert_eq!(normalize("VendorName"), "vendor name");
        assert_eq!(normalize("Descripción"), "descripcion");
        assert_eq!(normalize("Total ($)"), "total");
        assert_eq!(normalize("金额"), "金额");
    }

    #[test]
    fn test_levenshtein_and_ratio() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert!((ratio("vendor", "vendors") - 6.0 / 7.0).abs() < 1e-9);
        assert_eq!(ratio("", ""), 0.0);
    }

    #[test]
    fn test_scripts() {
        assert_eq!(dominant_script("Amount"), Some(Script::Latin));
        assert_eq!(dominant_script("Сумма"), Some(Script::Cyrillic));
        assert_eq!(dominant_script("金额"), Some(Script::Cjk));
        assert_eq!(dominant_script("금액"), Some(Script::Hangul));
        assert_eq!(dominant_script("2024"), None);
        assert!(!same_script("amount", "сумма"));
        assert!(same_script("amount", "123"));
    }

    #[test]
    fn test_tokenize_mixed_scripts() {
        assert_eq!(tokenize("Total Amount"), vec!["total", "amount"]);
        assert_eq!(tokenize("销售金额"), vec!["销售金额", "销售", "售金", "金额"]);
        assert_eq!(tokenize("Q1売上"), vec!["q1", "売上"]);
    }

    #[test]
    fn test_find_term_whole_words() {
        assert_eq!(find_term("total by vendor", "vendor"), Some(9));
        assert_eq!(find_term("total by vendors", "vendor"), None);
        assert_eq!(find_term("按供应商汇总", "供应商"), Some(3));
        assert_eq!(fold_case("Más DE"), "mas de");
    }

    #[test]
    fn test_resolve_header() {
        let h = headers(&["Vendor", "Invoice Amount", "Date"]);
        assert_eq!(resolve_header(&h, "vendor"), Some(0));
        assert_eq!(resolve_header(&h, "amount"), Some(1));
        assert_eq!(resolve_header(&h, "dates"), Some(2));
        assert_eq!(resolve_header(&h, "region"), None);
        assert_eq!(resolve_header(&h, ""), None);
    }
}
