//! List-query parameter parsing, offset pagination, and the `Pagination-*` response
//! headers (§4.4.2).
//!
//! Grounded on the teacher's `common/pagination.rs` (limit clamping, a validated
//! query struct, mutually exclusive pagination modes), generalized from the
//! teacher's Relay-style cursor-only model to this system's offset-or-cursor model.

use crate::error::KurbisioError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Default for Order {
    fn default() -> Self {
        Order::Desc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Like,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub key: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub limit: u32,
    pub page: u32,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub filters: Vec<Filter>,
    pub search: Vec<Filter>,
    pub order: Order,
    pub metaonly: bool,
    pub with_companion_urls: bool,
    pub next_token: Option<String>,
}

impl ListQuery {
    pub fn offset(&self) -> u32 {
        (self.page.saturating_sub(1)) * self.limit
    }
}

/// Parse and validate `?limit=&page=&from=&until=&filter=&search=&order=&metaonly=&
/// with_companion_urls=&next_token=` (repeatable `filter`/`search`) against a list of
/// known searchable property names (used to reject `search` on a non-searchable key).
pub fn parse_list_query(
    params: &HashMap<String, Vec<String>>,
    searchable_properties: &[String],
) -> Result<ListQuery, KurbisioError> {
    let mut q = ListQuery {
        limit: DEFAULT_LIMIT,
        page: 1,
        order: Order::Desc,
        ..Default::default()
    };

    if let Some(v) = single(params, "limit") {
        let n: u32 = v
            .parse()
            .map_err(|_| KurbisioError::BadRequest("limit must be an integer".into()))?;
        if !(1..=MAX_LIMIT).contains(&n) {
            return Err(KurbisioError::BadRequest(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        q.limit = n;
    }

    if let Some(v) = single(params, "page") {
        let n: u32 = v
            .parse()
            .map_err(|_| KurbisioError::BadRequest("page must be an integer".into()))?;
        if n < 1 {
            return Err(KurbisioError::BadRequest("page must be >= 1".into()));
        }
        q.page = n;
    }

    if let Some(v) = single(params, "from") {
        q.from = Some(parse_rfc3339(v)?);
    }
    if let Some(v) = single(params, "until") {
        q.until = Some(parse_rfc3339(v)?);
    }

    if let Some(v) = single(params, "order") {
        q.order = match v.as_str() {
            "asc" => Order::Asc,
            "desc" => Order::Desc,
            _ => return Err(KurbisioError::BadRequest("order must be asc or desc".into())),
        };
    }

    q.metaonly = bool_param(params, "metaonly")?;
    q.with_companion_urls = bool_param(params, "with_companion_urls")?;
    q.next_token = single(params, "next_token").cloned();

    if q.next_token.is_some() && single(params, "page").is_some() {
        return Err(KurbisioError::BadRequest(
            "page and next_token are mutually exclusive".into(),
        ));
    }

    if let Some(values) = params.get("filter") {
        for v in values {
            q.filters.push(parse_filter(v)?);
        }
    }
    if let Some(values) = params.get("search") {
        for v in values {
            let f = parse_filter(v)?;
            if !searchable_properties.iter().any(|p| p == &f.key) {
                return Err(KurbisioError::BadRequest(format!(
                    "'{}' is not a searchable property",
                    f.key
                )));
            }
            q.search.push(f);
        }
    }

    Ok(q)
}

fn single<'a>(params: &'a HashMap<String, Vec<String>>, key: &str) -> Option<&'a String> {
    params.get(key).and_then(|v| v.first())
}

fn bool_param(params: &HashMap<String, Vec<String>>, key: &str) -> Result<bool, KurbisioError> {
    match single(params, key) {
        None => Ok(false),
        Some(v) => v
            .parse::<bool>()
            .map_err(|_| KurbisioError::BadRequest(format!("{key} must be true or false"))),
    }
}

fn parse_rfc3339(v: &str) -> Result<DateTime<Utc>, KurbisioError> {
    DateTime::parse_from_rfc3339(v)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| KurbisioError::BadRequest(format!("'{v}' is not a valid RFC3339 timestamp")))
}

/// `filter=k=v` (equality) or `filter=k~v` (LIKE).
fn parse_filter(raw: &str) -> Result<Filter, KurbisioError> {
    if let Some((key, value)) = raw.split_once('~') {
        return Ok(Filter {
            key: key.to_string(),
            op: FilterOp::Like,
            value: value.to_string(),
        });
    }
    if let Some((key, value)) = raw.split_once('=') {
        return Ok(Filter {
            key: key.to_string(),
            op: FilterOp::Eq,
            value: value.to_string(),
        });
    }
    Err(KurbisioError::BadRequest(format!(
        "'{raw}' is not a valid filter (expected k=v or k~v)"
    )))
}

#[derive(Debug, Clone)]
pub struct PaginationHeaders {
    pub limit: u32,
    pub total_count: i64,
    pub page_count: u32,
    pub current_page: u32,
    pub until: Option<DateTime<Utc>>,
}

impl PaginationHeaders {
    pub fn compute(query: &ListQuery, total_count: i64) -> Self {
        let page_count = if total_count <= 0 {
            0
        } else {
            ((total_count as u64 + query.limit as u64 - 1) / query.limit as u64) as u32
        };
        Self {
            limit: query.limit,
            total_count,
            page_count,
            current_page: query.page,
            until: query.until,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
        let mut m: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in pairs {
            m.entry(k.to_string()).or_default().push(v.to_string());
        }
        m
    }

    #[test]
    fn defaults_are_limit_100_page_1_order_desc() {
        let q = parse_list_query(&HashMap::new(), &[]).unwrap();
        assert_eq!(q.limit, 100);
        assert_eq!(q.page, 1);
        assert_eq!(q.order, Order::Desc);
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn limit_out_of_range_is_rejected() {
        assert!(parse_list_query(&params(&[("limit", "0")]), &[]).is_err());
        assert!(parse_list_query(&params(&[("limit", "101")]), &[]).is_err());
    }

    #[test]
    fn page_and_next_token_are_mutually_exclusive() {
        let p = params(&[("page", "2"), ("next_token", "abc")]);
        assert!(parse_list_query(&p, &[]).is_err());
    }

    #[test]
    fn search_on_non_searchable_property_is_rejected() {
        let p = params(&[("search", "name=jo")]);
        assert!(parse_list_query(&p, &[]).is_err());
        let p2 = params(&[("search", "name=jo")]);
        assert!(parse_list_query(&p2, &["name".to_string()]).is_ok());
    }

    #[test]
    fn like_filter_uses_tilde() {
        let f = parse_filter("name~jo").unwrap();
        assert_eq!(f.op, FilterOp::Like);
        assert_eq!(f.value, "jo");
    }

    #[test]
    fn offset_advances_by_limit_per_page() {
        let q = ListQuery {
            limit: 25,
            page: 3,
            ..Default::default()
        };
        assert_eq!(q.offset(), 50);
    }

    #[test]
    fn page_count_rounds_up() {
        let q = ListQuery {
            limit: 10,
            page: 1,
            ..Default::default()
        };
        let headers = PaginationHeaders::compute(&q, 25);
        assert_eq!(headers.page_count, 3);
    }
}
