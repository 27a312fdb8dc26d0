//! core::naming
//!
//! Slug generation used when an intent needs a filesystem-safe name
//! derived from free text (for example, deriving a default domain
//! segment from a plan's title).

/// Convert the first line of `text` into a lowercase, hyphenated slug:
/// non-alphanumeric characters are dropped, spaces and underscores become
/// hyphens, and the result is capped at a reasonable length.
///
/// ```
/// use tasktree::core::naming::slugify;
///
/// assert_eq!(slugify("Add user authentication"), "add-user-authentication");
/// assert_eq!(slugify("Fix bug #123"), "fix-bug-123");
/// ```
pub fn slugify(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");

    first_line
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else if c == ' ' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(50)
        .collect()
}
