use std::fmt::{self, Display, Formatter};

#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        $crate::Truncated::new(::std::convert::AsRef::<str>::as_ref(&$query), 497)
    };
}

/// Displays at most `max` bytes of the text, cut on a char boundary, followed by `...` when
/// something was left out.
#[derive(Clone, Copy)]
pub struct Truncated<'a> {
    head: &'a str,
    cut: bool,
}

impl<'a> Truncated<'a> {
    pub fn new(text: &'a str, max: usize) -> Self {
        if text.len() <= max {
            return Self {
                head: text,
                cut: false,
            };
        }
        let end = (0..=max)
            .rev()
            .find(|&i| text.is_char_boundary(i))
            .unwrap_or(0);
        Self {
            head: text[..end].trim_end(),
            cut: true,
        }
    }
}

impl Display for Truncated<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.head)?;
        if self.cut {
            f.write_str("...")?;
        }
        Ok(())
    }
}

/// Logs the error and returns it, use it right where the failure is detected.
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {{
        let error = $error;
        log::error!("{:#}", error);
        error
    }};
}

/// Whether the query asks the server to count every matching row regardless of `LIMIT`.
pub fn calculates_found_rows(query: &str) -> bool {
    const HINT: &str = "SQL_CALC_FOUND_ROWS";
    query
        .as_bytes()
        .windows(HINT.len())
        .any(|w| w.eq_ignore_ascii_case(HINT.as_bytes()))
}

/// Number of `?` placeholders in the query text, markers inside quoted literals
/// or quoted identifiers are not counted.
pub fn count_placeholders(query: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    let mut chars = query.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(_), '\\') => {
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '?') => count += 1,
            _ => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders() {
        assert_eq!(count_placeholders("SELECT 1"), 0);
        assert_eq!(count_placeholders("SELECT id FROM t WHERE name=?"), 1);
        assert_eq!(count_placeholders("INSERT INTO t VALUES (?, ?, ?)"), 3);
        assert_eq!(count_placeholders("SELECT '?' FROM t WHERE a=?"), 1);
        assert_eq!(count_placeholders(r#"SELECT "it\"s?" FROM `a?b` WHERE c=?"#), 1);
    }

    #[test]
    fn found_rows_hint() {
        assert!(calculates_found_rows(
            "SELECT SQL_CALC_FOUND_ROWS id FROM t LIMIT 10"
        ));
        assert!(calculates_found_rows("select sql_calc_found_rows * from t"));
        assert!(!calculates_found_rows("SELECT id FROM t"));
    }

    #[test]
    fn truncate() {
        let short = "SELECT 1";
        assert_eq!(format!("{}", truncate_long!(short)), "SELECT 1");
        let long = "x".repeat(600);
        let printed = format!("{}", truncate_long!(long));
        assert_eq!(printed.len(), 500);
        assert!(printed.ends_with("..."));

        let accented = format!("{}éyy", "x".repeat(496));
        let printed = truncate_long!(accented).to_string();
        assert_eq!(printed, format!("{}...", "x".repeat(496)));
        let printed = format!("{}", truncate_long!(format!("{}é", "x".repeat(497))));
        assert_eq!(printed.len(), 500);
        assert_eq!(format!("{}", truncate_long!("é".repeat(300))).len(), 499);
    }
}
