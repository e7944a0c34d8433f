use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static CODE_SHAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z0-9-]{4,32}$").unwrap());

/// Trims and collapses inner runs of whitespace into a single space.
pub fn collapse_whitespace(input: &str) -> String {
    WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

/// Canonical form of a recharge or sponsor code as printed on cards, e.g. `LOTO-TX4ZAQEA`.
pub fn normalize_code(input: &str) -> Option<String> {
    let code = WHITESPACE.replace_all(input, "").to_uppercase();

    CODE_SHAPE.is_match(&code).then_some(code)
}
