//! Ephemeral model inlining.
//!
//! Ephemeral models never materialize; dependents carry their compiled SQL
//! as prepended common-table-expressions instead.

/// Prepend CTE definitions to a SQL body, merging into an existing WITH
/// clause when the body already starts with one. `ctes` must arrive in
/// dependency order so nested ephemerals resolve.
pub fn inline_ephemeral_ctes(sql: &str, ctes: &[(String, String)]) -> String {
    if ctes.is_empty() {
        return sql.to_string();
    }

    let rendered: Vec<String> = ctes
        .iter()
        .map(|(name, body)| {
            let clean = body.trim().trim_end_matches(';').trim();
            format!("{} as (\n{}\n)", name, clean)
        })
        .collect();

    let trimmed = sql.trim();
    let starts_with_with = trimmed
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("with "));
    if starts_with_with {
        let rest = trimmed[5..].trim_start();
        format!("with {},\n{}", rendered.join(",\n"), rest)
    } else {
        format!("with {}\n{}", rendered.join(",\n"), trimmed)
    }
}

/// The CTE alias an ephemeral model is inlined under.
pub fn cte_name(model_name: &str) -> String {
    format!("__{}", model_name)
}
