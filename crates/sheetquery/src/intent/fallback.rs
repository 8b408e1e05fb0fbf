//! Deterministic, keyword-driven intent classification.
//!
//! Used whenever the completion collaborator is unavailable. The same query
//! always produces the same intent.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::grid::{number_value, parse_number, Comparison};
use crate::llm::ResolutionSource;
use crate::matching::synonyms;
use crate::matching::text::{find_term, fold_case, normalize};

use super::types::{AggregationKind, IntentFilter, IntentType, SearchIntent};

// =============================================================================
// KEYWORD TABLES
// =============================================================================
// Terms are compared after normalization (lowercase, diacritics folded).

/// Aggregation triggers (en/es/fr/de/pt/ru/zh/ja) and what they compute.
const AGGREGATE_TERMS: &[(&str, AggregationKind)] = &[
    ("total", AggregationKind::Sum),
    ("totals", AggregationKind::Sum),
    ("sum", AggregationKind::Sum),
    ("summe", AggregationKind::Sum),
    ("suma", AggregationKind::Sum),
    ("somme", AggregationKind::Sum),
    ("soma", AggregationKind::Sum),
    ("gesamt", AggregationKind::Sum),
    ("insgesamt", AggregationKind::Sum),
    ("итого", AggregationKind::Sum),
    ("всего", AggregationKind::Sum),
    ("сумма", AggregationKind::Sum),
    ("总计", AggregationKind::Sum),
    ("合计", AggregationKind::Sum),
    ("总和", AggregationKind::Sum),
    ("合計", AggregationKind::Sum),
    ("総計", AggregationKind::Sum),
    ("count", AggregationKind::Count),
    ("how many", AggregationKind::Count),
    ("number of", AggregationKind::Count),
    ("cuantos", AggregationKind::Count),
    ("cuantas", AggregationKind::Count),
    ("combien", AggregationKind::Count),
    ("wie viele", AggregationKind::Count),
    ("anzahl", AggregationKind::Count),
    ("quantos", AggregationKind::Count),
    ("quantas", AggregationKind::Count),
    ("сколько", AggregationKind::Count),
    ("多少", AggregationKind::Count),
    ("几个", AggregationKind::Count),
    ("いくつ", AggregationKind::Count),
    ("件数", AggregationKind::Count),
    ("average", AggregationKind::Average),
    ("avg", AggregationKind::Average),
    ("mean", AggregationKind::Average),
    ("promedio", AggregationKind::Average),
    ("media", AggregationKind::Average),
    ("moyenne", AggregationKind::Average),
    ("durchschnitt", AggregationKind::Average),
    ("среднее", AggregationKind::Average),
    ("平均", AggregationKind::Average),
    ("maximum", AggregationKind::Max),
    ("max", AggregationKind::Max),
    ("highest", AggregationKind::Max),
    ("largest", AggregationKind::Max),
    ("maximo", AggregationKind::Max),
    ("максимум", AggregationKind::Max),
    ("最大", AggregationKind::Max),
    ("最高", AggregationKind::Max),
    ("minimum", AggregationKind::Min),
    ("min", AggregationKind::Min),
    ("lowest", AggregationKind::Min),
    ("smallest", AggregationKind::Min),
    ("minimo", AggregationKind::Min),
    ("минимум", AggregationKind::Min),
    ("最小", AggregationKind::Min),
    ("最低", AggregationKind::Min),
];

/// Filter triggers.
const FILTER_TERMS: &[&str] = &[
    "where", "greater than", "less than", "more than", "fewer than", "over", "under", "above",
    "below", "between", "only", "except", "after", "before", "donde", "mayor que", "menor que",
    "mas de", "menos de", "entre", "solo", "despues de", "antes de", "ou", "superieur",
    "inferieur", "plus de", "moins de", "seulement", "wo", "grosser", "kleiner", "mehr als",
    "weniger als", "zwischen", "nur", "onde", "maior que", "mais de", "apenas", "где",
    "больше", "меньше", "между", "только", "свыше", "大于", "小于", "超过", "低于", "之间",
    "仅", "より大きい", "より小さい", "以上", "以下", "未満", "だけ",
];

/// Lookup triggers.
const LOOKUP_TERMS: &[&str] = &[
    "what is", "whats", "find", "lookup", "look up", "which", "who", "when", "cual", "cual es",
    "que es", "busca", "buscar", "encuentra", "quien", "quel", "quelle", "trouve", "cherche",
    "qui", "was ist", "welche", "welcher", "finde", "suche", "wer", "qual", "encontre", "quem",
    "какой", "какая", "найди", "найти", "кто", "什么", "哪个", "查找", "查询", "谁", "何",
    "どの", "検索", "探して", "誰",
];

/// Words that may follow "by" without naming a grouping column.
const SORT_WORDS: &[&str] = &[
    "sorted", "sort", "ordered", "order", "ordenado", "ordenados", "trie", "tries",
    "sortiert", "ordenadas",
];

// =============================================================================
// PATTERNS
// =============================================================================

/// "X by / per / for each / grouped by Y" and localized equivalents.
static GROUP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r"\b(?:grouped by|group by|broken down by|for each|by|per)\s+(?:the\s+|each\s+)?(\p{L}[\p{L}\p{N}_-]*)",
        )
        .unwrap(),
        Regex::new(
            r"\b(?:agrupad[oa]s? por|por cada|por)\s+(?:el\s+|la\s+|los\s+|las\s+|o\s+|a\s+|os\s+|as\s+|cada\s+)?(\p{L}[\p{L}\p{N}_-]*)",
        )
        .unwrap(),
        Regex::new(r"\b(?:groupes? par|pour chaque|par)\s+(?:le\s+|la\s+|les\s+|l'|chaque\s+)?(\p{L}[\p{L}\p{N}_-]*)")
            .unwrap(),
        Regex::new(r"\b(?:gruppiert nach|pro|nach|je)\s+(?:dem\s+|der\s+|den\s+)?(\p{L}[\p{L}\p{N}_-]*)")
            .unwrap(),
        Regex::new(r"\b(?:сгруппировать по|для каждого|по)\s+(\p{L}[\p{L}\p{N}_-]*)").unwrap(),
        Regex::new(r"按(?:照)?\s*(\p{Han}+?)(?:分组|汇总|统计|计算|的|$)").unwrap(),
        Regex::new(r"每个?\s*(\p{Han}+?)(?:的|$)").unwrap(),
        Regex::new(r"(\p{Han}+|\p{Katakana}+)(?:ごと|別)").unwrap(),
    ]
});

/// `amount > 100`, `price <= 5`.
static SYMBOL_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\p{L}[\p{L}\p{N}_]*)\s*(>=|<=|!=|<>|>|<|=)\s*("[^"]+"|'[^']+'|-?[$€£¥]?[\d.,]+\b|\p{L}[\p{L}\p{N}_]*)"#)
        .unwrap()
});

/// `amount greater than 100`, `importe mas de 50`.
static WORD_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\p{L}[\p{L}\p{N}_]*)\s+(?:is\s+|es\s+|est\s+|ist\s+|e\s+)?(greater than|more than|over|above|exceeds|at least|less than|fewer than|under|below|at most|mayor que|mas de|menor que|menos de|superieur a|plus de|inferieur a|moins de|grosser als|mehr als|kleiner als|weniger als|maior que|mais de|больше|меньше|свыше)\s+(-?[$€£¥]?[\d.,]*\d)",
    )
    .unwrap()
});

/// `amount between 10 and 20`.
static BETWEEN_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\p{L}[\p{L}\p{N}_]*)\s+(?:between|entre|zwischen|между)\s+(-?[\d.,]*\d)\s+(?:and|y|et|und|e|и)\s+(-?[\d.,]*\d)",
    )
    .unwrap()
});

/// `金额大于100`.
static CJK_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\p{Han}+?)(大于|超过|高于|小于|低于|以上|以下|未満)\s*(-?[\d.,]*\d)").unwrap()
});

/// Words that never name a column on their own.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "where", "with", "and", "or", "all", "rows", "records",
    "el", "la", "los", "las", "de", "que", "le", "les", "der", "die", "das", "o", "os", "as",
];

// =============================================================================
// FALLBACK CLASSIFICATION
// =============================================================================

/// Classify a query without any collaborator.
pub fn fallback_intent(query: &str) -> SearchIntent {
    let folded = fold_case(query);
    let normalized = normalize(query);

    let key = extract_key(&folded);
    let filters = extract_filters(&folded);

    let mut aggregations = Vec::new();
    for (term, kind) in AGGREGATE_TERMS {
        if find_term(&normalized, &normalize(term)).is_some() && !aggregations.contains(kind) {
            aggregations.push(*kind);
        }
    }

    let has = |terms: &[&str]| terms.iter().any(|t| find_term(&normalized, &normalize(t)).is_some());

    let intent_type = if !aggregations.is_empty() || key.is_some() {
        IntentType::Aggregate
    } else if !filters.is_empty() || has(FILTER_TERMS) {
        IntentType::Filter
    } else if has(LOOKUP_TERMS) {
        IntentType::Lookup
    } else {
        IntentType::List
    };

    if intent_type == IntentType::Aggregate && aggregations.is_empty() {
        aggregations.push(AggregationKind::Sum);
    }

    let mut intent = SearchIntent::new(intent_type, ResolutionSource::Fallback);
    for concept in dictionary_concepts(&normalized) {
        intent.add_concept(&concept);
    }
    for filter in &filters {
        intent.add_concept(&filter.concept);
    }
    intent.key_concept = key;
    intent.filters = filters;
    intent.aggregations = aggregations;
    intent.normalize();
    intent
}

/// Grouping concept from "X by Y" style phrasing.
fn extract_key(folded: &str) -> Option<String> {
    for pattern in GROUP_PATTERNS.iter() {
        for caps in pattern.captures_iter(folded) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(word) = caps.get(1).map(|m| m.as_str().trim()) else {
                continue;
            };
            if word.is_empty() || STOPWORDS.contains(&word) {
                continue;
            }
            let before = folded[..whole.start()].trim_end();
            let last_word = before.rsplit(' ').next().unwrap_or("");
            if SORT_WORDS.contains(&last_word) {
                continue;
            }
            return Some(word.to_string());
        }
    }
    None
}

/// Comparison filters in symbol, word and CJK forms.
fn extract_filters(folded: &str) -> Vec<IntentFilter> {
    let mut filters = Vec::new();

    for caps in BETWEEN_FILTER.captures_iter(folded) {
        if let Some(concept) = concept_of(&caps) {
            filters.push(IntentFilter {
                concept,
                operator: Comparison::Between,
                value: operand(&caps[2]),
                upper: Some(operand(&caps[3])),
            });
        }
    }

    for caps in SYMBOL_FILTER.captures_iter(folded) {
        let Some(concept) = concept_of(&caps) else { continue };
        let Some(operator) = Comparison::parse(&caps[2]) else {
            continue;
        };
        filters.push(IntentFilter {
            concept,
            operator,
            value: operand(&caps[3]),
            upper: None,
        });
    }

    for caps in WORD_FILTER.captures_iter(folded) {
        let Some(concept) = concept_of(&caps) else { continue };
        filters.push(IntentFilter {
            concept,
            operator: word_operator(&caps[2]),
            value: operand(&caps[3]),
            upper: None,
        });
    }

    for caps in CJK_FILTER.captures_iter(folded) {
        let Some(concept) = concept_of(&caps) else { continue };
        filters.push(IntentFilter {
            concept,
            operator: word_operator(&caps[2]),
            value: operand(&caps[3]),
            upper: None,
        });
    }

    filters
}

fn concept_of(caps: &Captures<'_>) -> Option<String> {
    let word = caps.get(1)?.as_str().trim();
    if word.is_empty() || STOPWORDS.contains(&word) {
        None
    } else {
        Some(word.to_string())
    }
}

fn word_operator(phrase: &str) -> Comparison {
    match phrase {
        "at least" | "以上" => Comparison::Gte,
        "at most" | "以下" => Comparison::Lte,
        "less than" | "fewer than" | "under" | "below" | "menor que" | "menos de"
        | "inferieur a" | "moins de" | "kleiner als" | "weniger als" | "меньше" | "小于"
        | "低于" | "未満" => Comparison::Lt,
        _ => Comparison::Gt,
    }
}

/// Numeric operands become JSON numbers; quoted or bare words stay text.
fn operand(raw: &str) -> Value {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    match parse_number(trimmed) {
        Some(n) => number_value(n),
        None => Value::String(trimmed.to_string()),
    }
}

/// Business concepts mentioned in the query, in order of appearance. Each
/// hit is followed by its canonical English term.
fn dictionary_concepts(normalized: &str) -> Vec<String> {
    let mut hits: Vec<(usize, String, &'static str)> = Vec::new();
    for (kind, terms) in synonyms::clusters() {
        for term in terms {
            let term = normalize(term);
            if let Some(pos) = find_term(normalized, &term) {
                hits.push((pos, term, kind.canonical()));
            }
        }
    }
    hits.sort_by_key(|(pos, _, _)| *pos);

    let mut out = Vec::new();
    for (_, term, canonical) in hits {
        out.push(term);
        out.push(canonical.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_total_by_vendor() {
        let intent = fallback_intent("total by vendor");
        assert_eq!(intent.intent_type, IntentType::Aggregate);
        assert_eq!(intent.key_concept.as_deref(), Some("vendor"));
        assert_eq!(intent.concepts(), vec!["vendor", "total", "amount"]);
        assert_eq!(intent.aggregations, vec![AggregationKind::Sum]);
        assert_eq!(intent.source, ResolutionSource::Fallback);
    }

    #[test]
    fn test_localized_grouping() {
        let es = fallback_intent("importe total por proveedor");
        assert_eq!(es.intent_type, IntentType::Aggregate);
        assert_eq!(es.key_concept.as_deref(), Some("proveedor"));
        assert!(es.target_concepts.contains("vendor"));

        let zh = fallback_intent("按供应商汇总金额");
        assert_eq!(zh.key_concept.as_deref(), Some("供应商"));
        assert!(zh.target_concepts.contains("金额"));

        let ja = fallback_intent("仕入先別の合計");
        assert_eq!(ja.key_concept.as_deref(), Some("仕入先"));
    }

    #[test]
    fn test_sorted_by_is_not_grouping() {
        let intent = fallback_intent("show invoices sorted by date");
        assert!(intent.key_concept.is_none());
        assert_eq!(intent.intent_type, IntentType::List);
    }

    #[test]
    fn test_filters_extracted() {
        let intent = fallback_intent("invoices where amount > 100");
        assert_eq!(intent.intent_type, IntentType::Filter);
        assert_eq!(
            intent.filters,
            vec![IntentFilter {
                concept: "amount".to_string(),
                operator: Comparison::Gt,
                value: json!(100),
                upper: None,
            }]
        );

        let es = fallback_intent("facturas con importe más de 500");
        assert_eq!(es.filters[0].concept, "importe");
        assert_eq!(es.filters[0].operator, Comparison::Gt);
        assert_eq!(es.filters[0].value, json!(500));

        let between = fallback_intent("orders with price between 10 and 20");
        assert_eq!(between.filters[0].operator, Comparison::Between);
        assert_eq!(between.filters[0].upper, Some(json!(20)));
    }

    #[test]
    fn test_precedence_and_defaults() {
        assert_eq!(fallback_intent("how many invoices where amount > 5").intent_type, IntentType::Aggregate);
        assert_eq!(fallback_intent("what is the phone of Acme").intent_type, IntentType::Lookup);
        assert_eq!(fallback_intent("everything").intent_type, IntentType::List);
        let count = fallback_intent("how many invoices");
        assert_eq!(count.aggregations, vec![AggregationKind::Count]);
    }

    #[test]
    fn test_deterministic() {
        let a = fallback_intent("average price per product where qty >= 3");
        let b = fallback_intent("average price per product where qty >= 3");
        assert_eq!(a.concepts(), b.concepts());
        assert_eq!(a.filters, b.filters);
        assert_eq!(a.key_concept, b.key_concept);
    }
}
