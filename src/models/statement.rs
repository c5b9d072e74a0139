//! Parameterized SQL statements.

use crate::models::Value;
use std::fmt;

/// SQL text plus the positional arguments for its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// A statement without placeholders.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.args)
    }
}

/// Renders the SQL with every `?` / `$n` placeholder replaced by its argument.
/// Placeholders inside quoted identifiers or string literals are left alone.
///
/// Output is for logs and diagnostics only; it is never sent to a database.
impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut next = 0;
        let mut quote: Option<char> = None;
        let mut chars = self.sql.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                write!(f, "{}", c)?;
                continue;
            }
            match c {
                '`' | '"' | '\'' => {
                    quote = Some(c);
                    write!(f, "{}", c)?;
                }
                '?' => {
                    match self.args.get(next) {
                        Some(arg) => write!(f, "{}", arg)?,
                        None => f.write_str("?")?,
                    }
                    next += 1;
                }
                '$' if chars.peek().is_some_and(|(_, d)| d.is_ascii_digit()) => {
                    let start = pos + 1;
                    let mut end = start;
                    while let Some((i, d)) = chars.peek().copied() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        end = i + 1;
                        chars.next();
                    }
                    let digits = &self.sql[start..end];
                    let arg = digits
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .and_then(|i| self.args.get(i));
                    match arg {
                        Some(arg) => write!(f, "{}", arg)?,
                        None => write!(f, "${}", digits)?,
                    }
                }
                _ => write!(f, "{}", c)?,
            }
        }
        Ok(())
    }
}
