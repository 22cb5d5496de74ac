use std::fmt::Display;

use chrono::{DateTime, SecondsFormat, Utc};

/// PostgREST timestamps go into query strings, so never emit `+00:00`.
pub fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Builds PostgREST filter query strings (`column=op.value&...`).
#[derive(Debug, Default, Clone)]
pub struct QueryBuilder {
    parts: Vec<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter(mut self, column: &str, op: &str, value: impl Display) -> Self {
        let value = value.to_string();
        self.parts.push(format!("{}={}.{}", column, op, urlencoding::encode(&value)));
        self
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.parts.push(format!("select={}", columns));
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "neq", value)
    }

    pub fn gt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gt", value)
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lt", value)
    }

    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lte", value)
    }

    pub fn gte_time(self, column: &str, value: DateTime<Utc>) -> Self {
        self.filter(column, "gte", timestamp(value))
    }

    pub fn gt_time(self, column: &str, value: DateTime<Utc>) -> Self {
        self.filter(column, "gt", timestamp(value))
    }

    pub fn lt_time(self, column: &str, value: DateTime<Utc>) -> Self {
        self.filter(column, "lt", timestamp(value))
    }

    pub fn ilike(self, column: &str, needle: &str) -> Self {
        self.filter(column, "ilike", format!("*{}*", needle))
    }

    pub fn in_list<T: Display>(mut self, column: &str, values: &[T]) -> Self {
        let joined = values
            .iter()
            .map(|v| urlencoding::encode(&v.to_string()).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        self.parts.push(format!("{}=in.({})", column, joined));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.parts.push(format!("{}=is.null", column));
        self
    }

    /// Raw PostgREST `or=(...)` group, e.g. `first_name.ilike.*ann*,last_name.ilike.*ann*`.
    pub fn or(mut self, expression: &str) -> Self {
        self.parts.push(format!("or=({})", expression));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.parts.push(format!("order={}.{}", column, direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.parts.push(format!("limit={}", limit));
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.parts.push(format!("offset={}", offset));
        self
    }

    pub fn build(&self) -> String {
        if self.parts.is_empty() {
            String::new()
        } else {
            format!("?{}", self.parts.join("&"))
        }
    }

    pub fn path(&self, table: &str) -> String {
        format!("/rest/v1/{}{}", table, self.build())
    }
}
