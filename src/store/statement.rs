use std::fmt;

use super::{Dialect, Value, quote::quote};

/// SQL text with `?` placeholders and the values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub(crate) fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub(crate) fn push_param(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(value);
    }

    /// Render the statement with every placeholder replaced by its quoted
    /// literal.
    ///
    /// Question marks inside quoted strings or quoted identifiers are left
    /// alone, so free-text predicates such as `note = 'why?'` survive.
    pub fn to_literal_sql(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + self.params.len() * 8);
        let mut params = self.params.iter();
        let mut quote_char: Option<char> = None;
        let mut escaped = false;

        for c in self.sql.chars() {
            match quote_char {
                Some(q) => {
                    out.push(c);
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == q {
                        quote_char = None;
                    }
                }
                None => match c {
                    '\'' | '"' | '`' => {
                        quote_char = Some(c);
                        out.push(c);
                    }
                    '?' => match params.next() {
                        Some(value) => out.push_str(&quote(value)),
                        None => out.push(c),
                    },
                    _ => out.push(c),
                },
            }
        }
        out
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal_sql())
    }
}

/// Row selection condition for one archival pass over a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Caller supplied boolean expression, embedded verbatim.
    ///
    /// Its syntax is not checked; a malformed expression surfaces as a fetch
    /// failure when the first page is selected.
    Expression(String),
    /// `column = value`, built by the engine when cascading from a parent row.
    Equals { column: String, value: Value },
}

impl Predicate {
    pub fn expression(expr: impl Into<String>) -> Self {
        Predicate::Expression(expr.into())
    }

    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Equals {
            column: column.into(),
            value: value.into(),
        }
    }

    pub(crate) fn append_to(&self, dialect: Dialect, statement: &mut Statement) {
        match self {
            Predicate::Expression(expr) => {
                statement.push_sql("(");
                statement.push_sql(expr);
                statement.push_sql(")");
            }
            Predicate::Equals { column, value } => {
                statement.push_sql(&dialect.ident(column));
                statement.push_sql(" = ");
                statement.push_param(value.clone());
            }
        }
    }

    /// The predicate as it reads with its value written out, e.g.
    /// `` `ca_cdrId` = 17 ``.
    pub fn to_literal_sql(&self, dialect: Dialect) -> String {
        match self {
            Predicate::Expression(expr) => expr.clone(),
            Predicate::Equals { column, value } => {
                format!("{} = {}", dialect.ident(column), quote(value))
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal_sql(Dialect::MySql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_sql_skips_question_marks_in_strings() {
        let statement = Statement::with_params(
            "SELECT * FROM `t` WHERE note = 'why?' AND `we?ird` = ? AND id = ?",
            vec![Value::from("it's"), Value::Int(3)],
        );
        assert_eq!(
            statement.to_literal_sql(),
            r"SELECT * FROM `t` WHERE note = 'why?' AND `we?ird` = 'it\'s' AND id = 3"
        );
    }

    #[test]
    fn test_literal_sql_handles_escaped_quote_in_expression() {
        let statement = Statement::with_params(
            r"SELECT * FROM t WHERE a = 'x\'?' AND b = ?",
            vec![Value::Int(1)],
        );
        assert_eq!(
            statement.to_literal_sql(),
            r"SELECT * FROM t WHERE a = 'x\'?' AND b = 1"
        );
    }

    #[test]
    fn test_literal_sql_leaves_surplus_placeholders() {
        let statement = Statement::new("SELECT ?");
        assert_eq!(statement.to_literal_sql(), "SELECT ?");
    }

    #[test]
    fn test_predicate_literal_rendering() {
        let p = Predicate::equals("cc_userUniqueid", "1529.77");
        assert_eq!(
            p.to_literal_sql(Dialect::MySql),
            "`cc_userUniqueid` = '1529.77'"
        );
        assert_eq!(p.to_string(), "`cc_userUniqueid` = '1529.77'");

        let raw = Predicate::expression("`cs_from` = 'x' OR `cs_to` = 'x'");
        assert_eq!(raw.to_literal_sql(Dialect::Sqlite), "`cs_from` = 'x' OR `cs_to` = 'x'");
    }
}
