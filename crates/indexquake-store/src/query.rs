//! Builders for search and aggregation requests.
//!
//! Both builders render to the argument vectors of `FT.SEARCH` and
//! `FT.AGGREGATE`; the in-memory store evaluates the same structures directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericFilter {
    pub field: String,
    pub min: f64,
    pub max: f64,
}

impl NumericFilter {
    pub fn new(field: &str, min: f64, max: f64) -> Self {
        Self {
            field: field.to_owned(),
            min,
            max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnField {
    pub path: String,
    pub alias: Option<String>,
}

impl ReturnField {
    /// Name under which the value appears in the returned document.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub filters: Vec<NumericFilter>,
    pub return_fields: Vec<ReturnField>,
    pub sort_by: Option<(String, SortOrder)>,
    pub limit: Option<(usize, usize)>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filters: Vec::new(),
            return_fields: Vec::new(),
            sort_by: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: NumericFilter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn return_field(mut self, path: &str) -> Self {
        self.return_fields.push(ReturnField {
            path: path.to_owned(),
            alias: None,
        });
        self
    }

    #[must_use]
    pub fn return_field_as(mut self, path: &str, alias: &str) -> Self {
        self.return_fields.push(ReturnField {
            path: path.to_owned(),
            alias: Some(alias.to_owned()),
        });
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort_by = Some((field.to_owned(), order));
        self
    }

    #[must_use]
    pub fn paging(mut self, offset: usize, num: usize) -> Self {
        self.limit = Some((offset, num));
        self
    }

    /// Arguments following `FT.SEARCH`.
    pub fn to_args(&self, index: &str) -> Vec<String> {
        let mut args = vec![index.to_owned(), self.text.clone()];
        for f in &self.filters {
            args.extend([
                "FILTER".to_owned(),
                f.field.clone(),
                f.min.to_string(),
                f.max.to_string(),
            ]);
        }
        if !self.return_fields.is_empty() {
            let mut fields = Vec::new();
            for r in &self.return_fields {
                fields.push(r.path.clone());
                if let Some(alias) = &r.alias {
                    fields.push("AS".to_owned());
                    fields.push(alias.clone());
                }
            }
            args.push("RETURN".to_owned());
            args.push(fields.len().to_string());
            args.extend(fields);
        }
        if let Some((field, order)) = &self.sort_by {
            args.extend([
                "SORTBY".to_owned(),
                field.clone(),
                order.keyword().to_owned(),
            ]);
        }
        if let Some((offset, num)) = self.limit {
            args.extend(["LIMIT".to_owned(), offset.to_string(), num.to_string()]);
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reducer {
    Count { alias: String },
    Sum { field: String, alias: String },
}

impl Reducer {
    pub fn count(alias: &str) -> Self {
        Reducer::Count {
            alias: alias.to_owned(),
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            Reducer::Count { alias } | Reducer::Sum { alias, .. } => alias,
        }
    }

    fn to_args(&self) -> Vec<String> {
        match self {
            Reducer::Count { alias } => vec![
                "REDUCE".to_owned(),
                "COUNT".to_owned(),
                "0".to_owned(),
                "AS".to_owned(),
                alias.clone(),
            ],
            Reducer::Sum { field, alias } => vec![
                "REDUCE".to_owned(),
                "SUM".to_owned(),
                "1".to_owned(),
                field.clone(),
                "AS".to_owned(),
                alias.clone(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateStep {
    Load(Vec<String>),
    Apply { expression: String, alias: String },
    GroupBy { fields: Vec<String>, reducers: Vec<Reducer> },
    SortBy(Vec<(String, SortOrder)>),
    Limit { offset: usize, num: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub query: String,
    pub steps: Vec<AggregateStep>,
}

impl AggregateRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn load(mut self, fields: &[&str]) -> Self {
        self.steps
            .push(AggregateStep::Load(fields.iter().map(|f| (*f).to_owned()).collect()));
        self
    }

    #[must_use]
    pub fn apply(mut self, expression: &str, alias: &str) -> Self {
        self.steps.push(AggregateStep::Apply {
            expression: expression.to_owned(),
            alias: alias.to_owned(),
        });
        self
    }

    #[must_use]
    pub fn group_by(mut self, fields: &[&str], reducers: Vec<Reducer>) -> Self {
        self.steps.push(AggregateStep::GroupBy {
            fields: fields.iter().map(|f| (*f).to_owned()).collect(),
            reducers,
        });
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.steps
            .push(AggregateStep::SortBy(vec![(field.to_owned(), order)]));
        self
    }

    #[must_use]
    pub fn limit(mut self, offset: usize, num: usize) -> Self {
        self.steps.push(AggregateStep::Limit { offset, num });
        self
    }

    /// Arguments following `FT.AGGREGATE`.
    pub fn to_args(&self, index: &str) -> Vec<String> {
        let mut args = vec![index.to_owned(), self.query.clone()];
        for step in &self.steps {
            match step {
                AggregateStep::Load(fields) => {
                    args.push("LOAD".to_owned());
                    args.push(fields.len().to_string());
                    args.extend(fields.iter().cloned());
                }
                AggregateStep::Apply { expression, alias } => {
                    args.extend([
                        "APPLY".to_owned(),
                        expression.clone(),
                        "AS".to_owned(),
                        alias.clone(),
                    ]);
                }
                AggregateStep::GroupBy { fields, reducers } => {
                    args.push("GROUPBY".to_owned());
                    args.push(fields.len().to_string());
                    args.extend(fields.iter().cloned());
                    for r in reducers {
                        args.extend(r.to_args());
                    }
                }
                AggregateStep::SortBy(keys) => {
                    args.push("SORTBY".to_owned());
                    args.push((keys.len() * 2).to_string());
                    for (field, order) in keys {
                        args.push(field.clone());
                        args.push(order.keyword().to_owned());
                    }
                }
                AggregateStep::Limit { offset, num } => {
                    args.extend(["LIMIT".to_owned(), offset.to_string(), num.to_string()]);
                }
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_args_order() {
        let q = SearchQuery::new("green")
            .filter(NumericFilter::new("rating_votes", 900.0, 1000.0))
            .return_field_as("$.description", "author")
            .sort_by("year_published", SortOrder::Desc)
            .paging(0, 500);
        assert_eq!(
            q.to_args("idx:books"),
            vec![
                "idx:books", "green", "FILTER", "rating_votes", "900", "1000", "RETURN", "3",
                "$.description", "AS", "author", "SORTBY", "year_published", "DESC", "LIMIT",
                "0", "500",
            ]
        );
    }

    #[test]
    fn plain_search_has_no_options() {
        assert_eq!(SearchQuery::new("*").to_args("i"), vec!["i", "*"]);
    }

    #[test]
    fn return_field_output_name() {
        let q = SearchQuery::new("x")
            .return_field("$.title")
            .return_field_as("$.description", "author");
        assert_eq!(q.return_fields[0].output_name(), "$.title");
        assert_eq!(q.return_fields[1].output_name(), "author");
    }

    #[test]
    fn aggregate_args_cover_every_step() {
        let req = AggregateRequest::new("@geo:[-73.982254 40.753181 1000 km]")
            .load(&["@geo"])
            .apply("geodistance(@geo, -73.982254, 40.753181)", "geodistance")
            .group_by(&[], vec![Reducer::count("total")])
            .sort_by("@total", SortOrder::Asc)
            .limit(0, 10);
        assert_eq!(
            req.to_args("idx"),
            vec![
                "idx",
                "@geo:[-73.982254 40.753181 1000 km]",
                "LOAD",
                "1",
                "@geo",
                "APPLY",
                "geodistance(@geo, -73.982254, 40.753181)",
                "AS",
                "geodistance",
                "GROUPBY",
                "0",
                "REDUCE",
                "COUNT",
                "0",
                "AS",
                "total",
                "SORTBY",
                "2",
                "@total",
                "ASC",
                "LIMIT",
                "0",
                "10",
            ]
        );
    }

    #[test]
    fn sum_reducer_args() {
        let req = AggregateRequest::new("*").group_by(
            &["@format"],
            vec![Reducer::Sum {
                field: "@pages".to_owned(),
                alias: "pages".to_owned(),
            }],
        );
        assert_eq!(
            req.to_args("i")[2..],
            ["GROUPBY", "1", "@format", "REDUCE", "SUM", "1", "@pages", "AS", "pages"]
        );
    }
}
