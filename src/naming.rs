//! Identifier naming
//!
//! Turns database names into the identifiers carried by the IR: camel
//! casing with common initialisms, and the singular/plural forms used for
//! generated type and accessor names.

use std::sync::LazyLock;

use heck::ToSnakeCase;
use regex::Regex;

/// Words rendered fully upper-cased when camelizing.
const INITIALISMS: &[&str] = &[
    "ACL", "API", "ASCII", "CPU", "CSS", "DNS", "EOF", "GUID", "HTML", "HTTP", "HTTPS", "ID", "IP",
    "JSON", "LHS", "QPS", "RAM", "RHS", "RPC", "SLA", "SMTP", "SQL", "SSH", "TCP", "TLS", "TTL",
    "UDP", "UI", "UID", "UUID", "URI", "URL", "UTF8", "VM", "XML", "XMPP", "XSRF", "XSS",
];

/// Words whose singular and plural forms are the same.
const UNCOUNTABLE: &[&str] = &[
    "data", "deer", "equipment", "fish", "information", "metadata", "money", "news", "series",
    "sheep", "species", "staff",
];

/// (singular, plural)
const IRREGULAR: &[(&str, &str)] = &[
    ("child", "children"),
    ("foot", "feet"),
    ("goose", "geese"),
    ("man", "men"),
    ("mouse", "mice"),
    ("ox", "oxen"),
    ("person", "people"),
    ("tooth", "teeth"),
    ("woman", "women"),
    ("alias", "aliases"),
    ("status", "statuses"),
    ("bus", "buses"),
    ("movie", "movies"),
    ("index", "indices"),
    ("cache", "caches"),
    ("niche", "niches"),
    ("hero", "heroes"),
    ("potato", "potatoes"),
    ("tomato", "tomatoes"),
    ("echo", "echoes"),
];

static INDEX_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)_(ix|idx|index|pkey|ukey|key)$").unwrap());

/// Convert a database name to an UpperCamel identifier ("author_id" -> "AuthorID")
pub fn camelize(s: &str) -> String {
    words(s).iter().map(|w| capitalize_word(w)).collect()
}

/// Convert a database name to a lowerCamel identifier ("author_id" -> "authorID")
pub fn lower_camelize(s: &str) -> String {
    let words = words(s);
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(&word.to_lowercase());
        } else {
            out.push_str(&capitalize_word(word));
        }
    }
    out
}

/// Singularize the last `_` segment of a name and camelize the result
/// ("book_authors" -> "BookAuthor")
pub fn singularize_identifier(s: &str) -> String {
    match s.rfind('_') {
        Some(i) => camelize(&format!("{}{}", &s[..=i], singularize(&s[i + 1..]))),
        None => camelize(&singularize(s)),
    }
}

/// Singular form of a word, preserving the case of the untouched prefix
pub fn singularize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.len() != word.len() {
        return word.to_string();
    }

    if UNCOUNTABLE.iter().any(|u| ends_with_word(word, &lower, u)) {
        return word.to_string();
    }
    for (singular, plural) in IRREGULAR {
        if ends_with_word(word, &lower, plural) {
            return replace_tail(word, plural.len(), singular);
        }
    }

    let rules: &[(&str, &str)] = &[
        ("ies", "y"),
        ("sses", "ss"),
        ("shes", "sh"),
        ("ches", "ch"),
        ("xes", "x"),
        ("zzes", "zz"),
        ("lves", "lf"),
        ("rves", "rf"),
    ];
    for (suffix, replacement) in rules {
        if lower.ends_with(suffix) && lower.len() > suffix.len() {
            return replace_tail(word, suffix.len(), replacement);
        }
    }

    if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        return word.to_string();
    }
    if lower.ends_with('s') && lower.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Plural form of a word, preserving the case of the untouched prefix
pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();

    if word.is_empty() || lower.len() != word.len() {
        return word.to_string();
    }
    if UNCOUNTABLE.iter().any(|u| ends_with_word(word, &lower, u)) {
        return word.to_string();
    }
    for (singular, plural) in IRREGULAR {
        if ends_with_word(word, &lower, singular) {
            return replace_tail(word, singular.len(), plural);
        }
    }

    if lower.ends_with('y') && lower.len() > 1 {
        let before = lower.as_bytes()[lower.len() - 2];
        if !b"aeiou".contains(&before) {
            return replace_tail(word, 1, "ies");
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        return format!("{}es", word);
    }
    format!("{}s", word)
}

/// Derive the accessor suffix for an index from its name.
///
/// Chops a `_ix|_idx|_index|_pkey|_ukey|_key` suffix and a `<table>_`
/// prefix. Returns an empty string when what remains is the table name.
pub fn index_param_name(index_name: &str, table_name: &str) -> String {
    let mut name = match INDEX_SUFFIX_RE.find(index_name) {
        Some(m) => &index_name[..m.start()],
        None => index_name,
    };
    if name == table_name {
        return String::new();
    }
    if let Some(rest) = name.strip_prefix(table_name) {
        if let Some(rest) = rest.strip_prefix('_') {
            name = rest;
        }
    }
    camelize(name)
}

/// Upper-case the first character only ("authorId" -> "AuthorId")
pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Split a name into lower-case words, replacing characters that cannot
/// appear in an identifier.
fn words(s: &str) -> Vec<String> {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    cleaned
        .to_snake_case()
        .split('_')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn capitalize_word(word: &str) -> String {
    let upper = word.to_uppercase();
    if INITIALISMS.contains(&upper.as_str()) {
        return upper;
    }
    upper_first(word)
}

/// Whether `word` ends with the whole word `tail`: the match must start the
/// string, follow a `_`, or begin at an upper-case camel boundary.
fn ends_with_word(word: &str, lower: &str, tail: &str) -> bool {
    if !lower.ends_with(tail) {
        return false;
    }
    let start = word.len() - tail.len();
    start == 0
        || word[..start].ends_with('_')
        || word[start..].chars().next().is_some_and(char::is_uppercase)
}

fn replace_tail(word: &str, tail_len: usize, replacement: &str) -> String {
    let keep = &word[..word.len() - tail_len];
    let tail = &word[word.len() - tail_len..];
    if tail.chars().next().is_some_and(char::is_uppercase) {
        return format!("{}{}", keep, upper_first(replacement));
    }
    format!("{}{}", keep, replacement)
}
