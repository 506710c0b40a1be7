//! Typed article filters and their translation into SQL predicates.
//!
//! Request parameters and stored preferences are both turned into an
//! [`ArticleFilter`], a conjunction of [`Clause`]s that is appended to an
//! `sqlx::QueryBuilder` as a `WHERE` clause with bound parameters.

use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::db::Preferences;
use crate::validation::ValidationErrors;

/// Query-string parameters accepted by `GET /articles`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ArticleQuery {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Category,
    Source,
    Author,
}

impl Column {
    fn as_sql(self) -> &'static str {
        match self {
            Column::Category => "category",
            Column::Source => "source",
            Column::Author => "author",
        }
    }

    /// The lowercased copy of the column written alongside it on upsert.
    fn folded_sql(self) -> &'static str {
        match self {
            Column::Category => "search_category",
            Column::Source => "search_source",
            Column::Author => "search_author",
        }
    }
}

/// Unicode-aware case folding for substring matching. SQLite's `lower()`
/// only folds ASCII, so both the stored search columns and the needles go
/// through this.
pub fn fold(value: &str) -> String {
    value.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatch {
    /// The column is NULL.
    Absent,
    /// The column is NULL or the empty string.
    AbsentOrEmpty,
    Equals(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// Case-insensitive substring of title or description.
    Keyword(String),
    Field(Column, FieldMatch),
    /// Calendar day of `published_at`.
    PublishedOn(NaiveDate),
    /// Case-insensitive substring match against any of the values.
    ContainsAny(Column, Vec<String>),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArticleFilter {
    clauses: Vec<Clause>,
}

impl ArticleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn from_query(query: &ArticleQuery) -> Result<Self, ValidationErrors> {
        let mut filter = Self::new();

        if let Some(keyword) = non_blank(query.keyword.as_deref()) {
            filter = filter.with(Clause::Keyword(keyword.to_string()));
        }

        if let Some(category) = query.category.as_deref() {
            let matcher = if category.is_empty() {
                FieldMatch::AbsentOrEmpty
            } else {
                field_match(category)
            };
            filter = filter.with(Clause::Field(Column::Category, matcher));
        }

        for (column, value) in [
            (Column::Source, query.source.as_deref()),
            (Column::Author, query.author.as_deref()),
        ] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                filter = filter.with(Clause::Field(column, field_match(value)));
            }
        }

        if let Some(date) = non_blank(query.date.as_deref()) {
            let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                ValidationErrors::single(
                    "date",
                    "The date field must match the format YYYY-MM-DD.",
                )
            })?;
            filter = filter.with(Clause::PublishedOn(day));
        }

        Ok(filter)
    }

    /// OR within each preference dimension, AND across dimensions.
    /// Blank values are ignored; a dimension with no usable values adds nothing.
    pub fn from_preferences(preferences: &Preferences) -> Self {
        let mut filter = Self::new();

        for (column, values) in [
            (Column::Source, &preferences.sources),
            (Column::Category, &preferences.categories),
            (Column::Author, &preferences.authors),
        ] {
            let values: Vec<String> = values
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            if !values.is_empty() {
                filter = filter.with(Clause::ContainsAny(column, values));
            }
        }

        filter
    }

    /// Append ` WHERE ...` to the builder; does nothing for an empty filter.
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        for (i, clause) in self.clauses.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            clause.push_sql(builder);
        }
    }
}

impl Clause {
    fn push_sql(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Clause::Keyword(keyword) => {
                let needle = fold(keyword);
                builder.push("(instr(search_title, ");
                builder.push_bind(needle.clone());
                builder.push(") > 0 OR instr(search_description, ");
                builder.push_bind(needle);
                builder.push(") > 0)");
            }
            Clause::Field(column, FieldMatch::Absent) => {
                builder.push(format_args!("{} IS NULL", column.as_sql()));
            }
            Clause::Field(column, FieldMatch::AbsentOrEmpty) => {
                let column = column.as_sql();
                builder.push(format_args!("({column} IS NULL OR {column} = '')"));
            }
            Clause::Field(column, FieldMatch::Equals(value)) => {
                builder.push(format_args!("{} = ", column.as_sql()));
                builder.push_bind(value.clone());
            }
            Clause::PublishedOn(day) => {
                builder.push("substr(published_at, 1, 10) = ");
                builder.push_bind(day.format("%Y-%m-%d").to_string());
            }
            Clause::ContainsAny(column, values) => {
                builder.push("(");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        builder.push(" OR ");
                    }
                    builder.push(format_args!("instr({}, ", column.folded_sql()));
                    builder.push_bind(fold(value));
                    builder.push(") > 0");
                }
                builder.push(")");
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `"null"` and `"undefined"` are how browser clients send a missing value.
fn field_match(value: &str) -> FieldMatch {
    match value {
        "null" | "undefined" => FieldMatch::Absent,
        other => FieldMatch::Equals(other.to_string()),
    }
}
