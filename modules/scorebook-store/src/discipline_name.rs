//! Discipline title normaliser.
//!
//! Upstream titles are typed by faculty staff and drag along semester
//! markers, faculty suffixes and parenthetical notes that the store must not
//! keep, or viewer-side joins on the cleaned name break. The pipeline is
//! idempotent: cleaning an already-clean title returns it unchanged.
//!
//! Order matters. Apostrophes are canonicalised before the backtick sweep so
//! a backtick-as-apostrophe survives as `ʼ`; literal substitutions run before
//! the suffix regexes; trimming runs before the first letter is uppercased so
//! a leading symbol never ends up in the output.

use std::sync::LazyLock;

use regex::Regex;

/// Apostrophe variants between two letters, canonicalised to `ʼ`.
static APOSTROPHE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{L})[`'’ʼ](\p{L})").unwrap());

/// Suffix/prefix strips, applied in this order.
static STRIP_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // leading training-course marker, with or without an opening paren
        r"^Тренінг-курс\s*\(?",
        // faculty short-name suffix: ", Фт. ЕІТ"
        r",\s*[Фф]т\.\s*[^,]*$",
        // uppercase faculty abbreviation at the end: ", ФЕУ"
        r",\s*[А-ЯІЇЄҐ]{2,4}\s*$",
        // short dotted faculty suffix: ", Юр. Інст."
        r",\s*\p{Lu}\p{Ll}{1,4}\.(\s*\p{Lu}\p{Ll}{0,4}\.?)?\s*$",
        // semester marker and everything after it: ", 5 сем., Юрінст"
        r",\s*\d+\s*сем\.?.*$",
        // trailing parenthetical
        r"\([^()]*\)\s*$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const LEFT_TRIM: &[char] = &['_', '-', '`', '.', '#', '&', '$', '«', '(', ' ', '\t'];
const RIGHT_TRIM: &[char] = &[
    '_', '-', '`', '.', '1', '2', '3', '#', '&', '$', '/', '»', ')', ' ', '\t',
];

/// Normalise a raw discipline title. Total: never panics, any input maps to
/// some (possibly empty) cleaned string.
pub fn clean_discipline_name(raw: &str) -> String {
    let mut name = normalize_apostrophes(raw);

    name = name.replace(['\\', '`'], "");
    name = name.replace("1 С:", "1С:");
    name = name.replace("іноз мова", "іноземна мова");
    name = name.replace(['_', '+', '~', '*'], " ");

    for re in STRIP_RES.iter() {
        name = re.replace(&name, "").into_owned();
    }

    let name = name
        .trim_start_matches(LEFT_TRIM)
        .trim_end_matches(RIGHT_TRIM);
    let name = WHITESPACE_RE.replace_all(name, " ");

    uppercase_first(&name)
}

/// Replace until fixpoint: adjacent apostrophes overlap the match window, so
/// one pass can leave a variant behind.
fn normalize_apostrophes(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let replaced = APOSTROPHE_RE
            .replace_all(&current, "${1}ʼ${2}")
            .into_owned();
        if replaced == current {
            return current;
        }
        current = replaced;
    }
}

fn uppercase_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
