//! Row-wise text, date, expression and filter operators.

use super::Assembly;
use crate::errors::{AssemblyError, InvalidOperationError};
use crate::fields::{FieldSpec, Selector};
use crate::operations::{
    assert_not_null, assert_size_equals, date_formatter, date_parser, debug_filter,
    expression_filter, expression_function, field_joiner, filter_not_null, filter_null,
    insert_function, regex_filter, regex_generator, regex_parser, regex_replace,
    regex_split_generator, regex_splitter, AssertionLevel, Expr, Operation, OperationKind,
};
use std::sync::Arc;

const DEFAULT_SPLIT_PATTERN: &str = r"[.,]*\s+";
const DEFAULT_MATCH_PATTERN: &str = r"[\w]+";
const DEFAULT_DATE_PATTERN: &str = "yyyy/MM/dd";

/// A value for [`Assembly::insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertValue {
    /// A constant.
    Literal(serde_json::Value),
    /// An expression evaluated per tuple.
    Expression(Expr),
}

macro_rules! literal_from {
    ($($source:ty),+) => {
        $(
            impl From<$source> for InsertValue {
                fn from(value: $source) -> Self {
                    Self::Literal(value.into())
                }
            }
        )+
    };
}

literal_from!(&str, String, bool, i32, i64, f64, serde_json::Value);

impl From<Expr> for InsertValue {
    fn from(expr: Expr) -> Self {
        Self::Expression(expr)
    }
}

impl Assembly<'_> {
    fn checked(
        &self,
        operation: Result<Arc<dyn Operation>, InvalidOperationError>,
    ) -> Result<Arc<dyn Operation>, AssemblyError> {
        operation.map_err(|e| AssemblyError::from(e).in_stage(self.name()))
    }

    /// Parses `fields` with a regex, one output field per group.
    pub fn parse(
        &mut self,
        fields: impl Into<Selector>,
        pattern: &str,
        into: impl Into<FieldSpec>,
        output: impl Into<Selector>,
    ) -> Result<&mut Self, AssemblyError> {
        let into = self.field_set(into)?;
        let operation = self.checked(regex_parser(pattern, into))?;
        self.each(fields, operation, output)
    }

    /// Splits a field into several fields on a regex.
    pub fn split(
        &mut self,
        field: &str,
        into: impl Into<FieldSpec>,
        pattern: Option<&str>,
        output: impl Into<Selector>,
    ) -> Result<&mut Self, AssemblyError> {
        let into = self.field_set(into)?;
        let pattern = pattern.unwrap_or(DEFAULT_SPLIT_PATTERN);
        let operation = self.checked(regex_splitter(into, pattern))?;
        self.each(field, operation, output)
    }

    /// Splits a field into one row per piece.
    pub fn split_rows(
        &mut self,
        field: &str,
        into: &str,
        pattern: Option<&str>,
        output: impl Into<Selector>,
    ) -> Result<&mut Self, AssemblyError> {
        let into = self.field_set(into)?;
        let pattern = pattern.unwrap_or(DEFAULT_SPLIT_PATTERN);
        let operation = self.checked(regex_split_generator(into, pattern))?;
        self.each(field, operation, output)
    }

    /// Emits one row per regex match in a field.
    pub fn match_rows(
        &mut self,
        field: &str,
        into: &str,
        pattern: Option<&str>,
        output: impl Into<Selector>,
    ) -> Result<&mut Self, AssemblyError> {
        let into = self.field_set(into)?;
        let pattern = pattern.unwrap_or(DEFAULT_MATCH_PATTERN);
        let operation = self.checked(regex_generator(into, pattern))?;
        self.each(field, operation, output)
    }

    /// Parses a field as a date into `into`, or `<field>_parsed`.
    pub fn parse_date(
        &mut self,
        field: &str,
        into: Option<&str>,
        pattern: Option<&str>,
    ) -> Result<&mut Self, AssemblyError> {
        let into = into.map_or_else(|| format!("{field}_parsed"), str::to_string);
        let operation = date_parser(&into, pattern.unwrap_or(DEFAULT_DATE_PATTERN));
        self.each(field, operation, Selector::All)
    }

    /// Formats a date field into `into`, or `<field>_formatted`.
    pub fn format_date(
        &mut self,
        field: &str,
        into: Option<&str>,
        pattern: Option<&str>,
        timezone: Option<&str>,
    ) -> Result<&mut Self, AssemblyError> {
        let into = into.map_or_else(|| format!("{field}_formatted"), str::to_string);
        let operation = date_formatter(&into, pattern.unwrap_or(DEFAULT_DATE_PATTERN), timezone);
        self.each(field, operation, Selector::All)
    }

    /// Replaces regex matches in a field into `into`, or `<field>_replaced`.
    pub fn replace(
        &mut self,
        field: &str,
        pattern: &str,
        replacement: &str,
        into: Option<&str>,
    ) -> Result<&mut Self, AssemblyError> {
        let into = into.map_or_else(|| format!("{field}_replaced"), str::to_string);
        let operation = self.checked(regex_replace(&into, pattern, replacement))?;
        self.each(field, operation, Selector::All)
    }

    /// Appends one field per entry, in name order.
    pub fn insert<I, K, V>(&mut self, values: I) -> Result<&mut Self, AssemblyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<InsertValue>,
    {
        let mut values: Vec<(String, InsertValue)> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in values {
            let operation = match &value {
                InsertValue::Literal(v) => insert_function(&name, v.clone()),
                InsertValue::Expression(expr) => expression_function(&name, expr),
            };
            self.each(Selector::All, operation, Selector::All)?;
        }
        Ok(self)
    }

    /// Removes tuples for which `expression` holds.
    pub fn filter(&mut self, expression: &str) -> Result<&mut Self, AssemblyError> {
        let expr = Expr::parse(expression).map_err(|e| AssemblyError::from(e).in_stage(self.name()))?;
        self.each(Selector::All, expression_filter(&expr), Selector::All)
    }

    /// Filters `from` with a regex; matches are removed when `remove_match` is set.
    pub fn filter_pattern(
        &mut self,
        from: impl Into<Selector>,
        pattern: &str,
        remove_match: bool,
    ) -> Result<&mut Self, AssemblyError> {
        let operation = self.checked(regex_filter(pattern, remove_match))?;
        self.each(from, operation, Selector::All)
    }

    /// Removes tuples for which `expression` holds.
    pub fn reject(&mut self, expression: &str) -> Result<&mut Self, AssemblyError> {
        self.filter(expression)
    }

    /// Keeps only tuples for which `expression` holds.
    pub fn where_(&mut self, expression: &str) -> Result<&mut Self, AssemblyError> {
        let expr = Expr::parse(expression)
            .map_err(|e| AssemblyError::from(e).in_stage(self.name()))?
            .negate();
        self.each(Selector::All, expression_filter(&expr), Selector::All)
    }

    /// Removes tuples with a null in `fields`.
    pub fn filter_null(&mut self, fields: impl Into<Selector>) -> Result<&mut Self, AssemblyError> {
        self.each(fields, filter_null(), Selector::All)
    }

    /// Alias of [`Assembly::filter_null`].
    pub fn reject_null(&mut self, fields: impl Into<Selector>) -> Result<&mut Self, AssemblyError> {
        self.filter_null(fields)
    }

    /// Removes tuples with no null in `fields`.
    pub fn filter_not_null(&mut self, fields: impl Into<Selector>) -> Result<&mut Self, AssemblyError> {
        self.each(fields, filter_not_null(), Selector::All)
    }

    /// Alias of [`Assembly::filter_not_null`].
    pub fn where_null(&mut self, fields: impl Into<Selector>) -> Result<&mut Self, AssemblyError> {
        self.filter_not_null(fields)
    }

    /// Evaluates `expression` over `from` into a new field.
    pub fn eval_expression(
        &mut self,
        expression: &str,
        into: &str,
        from: impl Into<Selector>,
        output: impl Into<Selector>,
    ) -> Result<&mut Self, AssemblyError> {
        let expr = Expr::parse(expression).map_err(|e| AssemblyError::from(e).in_stage(self.name()))?;
        self.each(from, expression_function(into, &expr), output)
    }

    /// Joins `fields` into one delimited field.
    pub fn join_fields(
        &mut self,
        fields: impl Into<Selector>,
        delimiter: &str,
        into: &str,
        output: impl Into<Selector>,
    ) -> Result<&mut Self, AssemblyError> {
        self.each(fields, field_joiner(into, delimiter), output)
    }

    /// Applies a tuple assertion.
    pub fn assert(&mut self, assertion: Arc<dyn Operation>) -> Result<&mut Self, AssemblyError> {
        if assertion.kind() != OperationKind::Assertion {
            let err = InvalidOperationError::new(assertion.name(), "not a tuple assertion");
            return Err(AssemblyError::from(err).in_stage(self.name()));
        }
        self.each(Selector::All, assertion, Selector::All)
    }

    /// Asserts every tuple has `size` fields.
    pub fn assert_size_equals(&mut self, size: usize, level: AssertionLevel) -> Result<&mut Self, AssemblyError> {
        self.assert(assert_size_equals(size, level))
    }

    /// Asserts no field is null.
    pub fn assert_not_null(&mut self, level: AssertionLevel) -> Result<&mut Self, AssemblyError> {
        self.assert(assert_not_null(level))
    }

    /// Prints tuples, and the field names every 10 tuples when `print_fields` is set.
    pub fn debug(&mut self, print_fields: bool) -> Result<&mut Self, AssemblyError> {
        self.each(Selector::All, debug_filter(print_fields, 1, 10), Selector::All)
    }
}
