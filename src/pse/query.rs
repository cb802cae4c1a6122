use chrono::NaiveDate;

/// OData-style query parameters for the PSE API.
///
/// Only the four parameters the API understands are modeled; values are
/// passed to reqwest as query pairs, which handles the URL encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<String>,
    pub select: Option<String>,
    pub order_by: Option<String>,
    pub first: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn first(mut self, first: u32) -> Self {
        self.first = Some(first);
        self
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(filter) = &self.filter {
            params.push(("$filter", filter.clone()));
        }
        if let Some(select) = &self.select {
            params.push(("$select", select.clone()));
        }
        if let Some(order_by) = &self.order_by {
            params.push(("$orderby", order_by.clone()));
        }
        if let Some(first) = self.first {
            params.push(("$first", first.to_string()));
        }
        params
    }
}

/// Filter on a single business date.
pub fn date_filter(date: NaiveDate) -> String {
    format!("business_date eq '{}'", date.format("%Y-%m-%d"))
}

/// Inclusive business-date range filter.
pub fn date_range_filter(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "business_date ge '{}' and business_date le '{}'",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

/// Build the probing sequence for endpoints whose server-side filtering is
/// unreliable: ISO datetime filter first, then a date-only filter, then no
/// filter at all. Callers try the variants in this order and keep the first
/// one that yields a non-empty result set.
pub fn probe_variants(base: &Query, date: NaiveDate) -> Vec<Query> {
    let day = date.format("%Y-%m-%d");
    vec![
        base.clone().filter(format!(
            "business_date ge '{day}T00:00:00' and business_date le '{day}T23:59:59'"
        )),
        base.clone().filter(date_filter(date)),
        Query {
            filter: None,
            ..base.clone()
        },
    ]
}
