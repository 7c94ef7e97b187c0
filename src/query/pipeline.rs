use std::collections::HashMap;

use sqlx::{Postgres, QueryBuilder};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use super::collection::{Collection, Column, ValueKind};
use crate::error::ApiError;

/// Parameter keys consumed by the pipeline itself, never treated as filters.
const RESERVED: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Internal bookkeeping field hidden by the default projection.
pub const VERSION_FIELD: &str = "rowVersion";

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Cannot query by field '{0}'")]
    UnknownField(String),

    #[error("Unsupported operator '{op}' on field '{field}'")]
    UnknownOperator { field: String, op: String },

    #[error("Invalid {field}: {value}")]
    BadValue { field: String, value: String },

    #[error("Cannot mix inclusion and exclusion in field selection")]
    MixedProjection,
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Comparison operators clients may use. Anything else never reaches
/// the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gte,
    Gt,
    Lte,
    Lt,
}

impl CmpOp {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "gte" => Some(Self::Gte),
            "gt" => Some(Self::Gt),
            "lte" => Some(Self::Lte),
            "lt" => Some(Self::Lt),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Gte => " >= ",
            Self::Gt => " > ",
            Self::Lte => " <= ",
            Self::Lt => " < ",
        }
    }
}

/// A raw parameter value parsed according to its column's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Time(OffsetDateTime),
    Id(Uuid),
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub column: &'static Column,
    pub op: CmpOp,
    pub value: FieldValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// Which fields of the serialized rows are returned to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Everything except the listed fields (the version field is always
    /// excluded on this arm).
    AllExcept(Vec<String>),
    /// Exactly the listed fields, plus the id.
    Only(Vec<String>),
}

impl Default for Projection {
    fn default() -> Self {
        Self::AllExcept(Vec::new())
    }
}

impl Projection {
    pub fn apply(&self, value: &mut serde_json::Value) {
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    self.apply(item);
                }
            }
            serde_json::Value::Object(map) => match self {
                Self::Only(fields) => {
                    map.retain(|key, _| key == "id" || fields.iter().any(|f| f == key));
                }
                Self::AllExcept(fields) => {
                    map.remove(VERSION_FIELD);
                    for field in fields {
                        map.remove(field.as_str());
                    }
                }
            },
            _ => {}
        }
    }
}

/// Immutable query description built from untrusted request parameters.
/// Each stage consumes the spec and returns a new one, so a spec can be
/// assembled in any order and shared freely once built.
#[derive(Debug)]
pub struct QuerySpec {
    collection: &'static Collection,
    filters: Vec<Filter>,
    sort: Vec<(&'static Column, SortDir)>,
    projection: Projection,
    page: i64,
    limit: i64,
}

impl QuerySpec {
    pub fn new(collection: &'static Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            // Unique id keeps the default ordering deterministic.
            sort: vec![(collection.id_column(), SortDir::Asc)],
            projection: Projection::default(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Runs all four stages over one parameter map.
    pub fn apply(
        collection: &'static Collection,
        params: &HashMap<String, String>,
    ) -> Result<Self, QueryError> {
        Ok(Self::new(collection)
            .filter(params)?
            .sort(params)?
            .select(params)?
            .paginate(params))
    }

    /// Translates the remaining parameters into typed comparisons.
    /// Unknown fields, unknown operators, and values that do not parse for
    /// their column kind are rejected outright.
    pub fn filter(mut self, params: &HashMap<String, String>) -> Result<Self, QueryError> {
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();

        for key in keys {
            if RESERVED.contains(&key.as_str()) {
                continue;
            }
            let (field, op) = parse_filter_key(key)?;
            let column = self
                .collection
                .column(field)
                .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
            let value = parse_value(column, &params[key])?;
            self.filters.push(Filter { column, op, value });
        }
        Ok(self)
    }

    /// Comma-separated sort keys, `-` prefix for descending. Without the
    /// parameter the id-ascending default stays in place.
    pub fn sort(mut self, params: &HashMap<String, String>) -> Result<Self, QueryError> {
        let raw = match params.get("sort") {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(self),
        };

        let mut keys = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, dir) = match part.strip_prefix('-') {
                Some(name) => (name, SortDir::Desc),
                None => (part, SortDir::Asc),
            };
            let column = self
                .collection
                .column(name)
                .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
            keys.push((column, dir));
        }
        if !keys.is_empty() {
            self.sort = keys;
        }
        Ok(self)
    }

    /// Comma-separated projection; `-` prefixed names switch the whole list
    /// to exclusion.
    pub fn select(mut self, params: &HashMap<String, String>) -> Result<Self, QueryError> {
        let raw = match params.get("fields") {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(self),
        };

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, excluded) = match part.strip_prefix('-') {
                Some(name) => (name, true),
                None => (part, false),
            };
            if name != VERSION_FIELD && self.collection.column(name).is_none() {
                return Err(QueryError::UnknownField(name.to_string()));
            }
            if excluded {
                exclude.push(name.to_string());
            } else {
                include.push(name.to_string());
            }
        }

        self.projection = match (include.is_empty(), exclude.is_empty()) {
            (_, true) if !include.is_empty() => Projection::Only(include),
            (true, false) => Projection::AllExcept(exclude),
            (false, false) => return Err(QueryError::MixedProjection),
            _ => Projection::default(),
        };
        Ok(self)
    }

    /// Positive page/limit with (1, 100) fallbacks. No upper bound is
    /// enforced on the limit.
    pub fn paginate(mut self, params: &HashMap<String, String>) -> Self {
        self.page = positive_int(params.get("page")).unwrap_or(DEFAULT_PAGE);
        self.limit = positive_int(params.get("limit")).unwrap_or(DEFAULT_LIMIT);
        self
    }

    /// Pins an equality filter outside the untrusted parameter path, e.g.
    /// the tour id of a nested review listing.
    pub fn constrain(mut self, field: &str, id: Uuid) -> Result<Self, QueryError> {
        let column = self
            .collection
            .column(field)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        self.filters.push(Filter {
            column,
            op: CmpOp::Eq,
            value: FieldValue::Id(id),
        });
        Ok(self)
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn skip(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn sort_keys(&self) -> Vec<(&'static str, SortDir)> {
        self.sort.iter().map(|(c, d)| (c.name, *d)).collect()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Renders the spec as a parameterized SELECT. Filter values are always
    /// bound, never spliced into the SQL text.
    pub fn select_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(self.collection.select_list);
        qb.push(" FROM ");
        qb.push(self.collection.table);

        let mut prefix = " WHERE ";
        if let Some(scope) = self.collection.scope {
            qb.push(prefix);
            qb.push(scope);
            prefix = " AND ";
        }
        for filter in &self.filters {
            qb.push(prefix);
            prefix = " AND ";
            qb.push(filter.column.sql);
            qb.push(filter.op.sql());
            match &filter.value {
                FieldValue::Text(v) => qb.push_bind(v.clone()),
                FieldValue::Int(v) => qb.push_bind(*v),
                FieldValue::Float(v) => qb.push_bind(*v),
                FieldValue::Bool(v) => qb.push_bind(*v),
                FieldValue::Time(v) => qb.push_bind(*v),
                FieldValue::Id(v) => qb.push_bind(*v),
            };
        }

        qb.push(" ORDER BY ");
        for (i, (column, dir)) in self.sort.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(column.sql);
            qb.push(match dir {
                SortDir::Asc => " ASC",
                SortDir::Desc => " DESC",
            });
        }

        qb.push(" LIMIT ");
        qb.push_bind(self.limit);
        qb.push(" OFFSET ");
        qb.push_bind(self.skip());
        qb
    }
}

fn positive_int(raw: Option<&String>) -> Option<i64> {
    raw?.parse::<i64>().ok().filter(|n| *n >= 1)
}

/// Splits `price[gte]` into field and operator; a bare key is equality.
fn parse_filter_key(key: &str) -> Result<(&str, CmpOp), QueryError> {
    let Some(open) = key.find('[') else {
        return Ok((key, CmpOp::Eq));
    };
    let field = &key[..open];
    let rest = &key[open + 1..];
    let token = rest.strip_suffix(']').filter(|t| !t.contains('['));
    match token.and_then(CmpOp::parse) {
        Some(op) => Ok((field, op)),
        None => Err(QueryError::UnknownOperator {
            field: field.to_string(),
            op: token.unwrap_or(rest).to_string(),
        }),
    }
}

fn parse_value(column: &Column, raw: &str) -> Result<FieldValue, QueryError> {
    let bad = || QueryError::BadValue {
        field: column.name.to_string(),
        value: raw.to_string(),
    };
    match column.kind {
        ValueKind::Text => Ok(FieldValue::Text(raw.to_string())),
        ValueKind::Int => raw.parse().map(FieldValue::Int).map_err(|_| bad()),
        ValueKind::Float => raw.parse().map(FieldValue::Float).map_err(|_| bad()),
        ValueKind::Bool => raw.parse().map(FieldValue::Bool).map_err(|_| bad()),
        ValueKind::Timestamp => OffsetDateTime::parse(raw, &Rfc3339)
            .map(FieldValue::Time)
            .map_err(|_| bad()),
        ValueKind::Id => Uuid::parse_str(raw).map(FieldValue::Id).map_err(|_| bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Collection;

    static HIKES: Collection = Collection {
        table: "hikes",
        select_list: "id, name, duration, price, ratings_average, created_at, row_version",
        scope: Some("secret_hike = false"),
        id: "id",
        columns: &[
            Column {
                name: "id",
                sql: "id",
                kind: ValueKind::Id,
            },
            Column {
                name: "name",
                sql: "name",
                kind: ValueKind::Text,
            },
            Column {
                name: "duration",
                sql: "duration",
                kind: ValueKind::Int,
            },
            Column {
                name: "price",
                sql: "price",
                kind: ValueKind::Float,
            },
            Column {
                name: "ratingsAverage",
                sql: "ratings_average",
                kind: ValueKind::Float,
            },
            Column {
                name: "createdAt",
                sql: "created_at",
                kind: ValueKind::Timestamp,
            },
        ],
    };

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn sort_parses_direction_pairs() {
        let spec = QuerySpec::new(&HIKES)
            .sort(&params(&[("sort", "-price,ratingsAverage")]))
            .unwrap();
        assert_eq!(
            spec.sort_keys(),
            vec![("price", SortDir::Desc), ("ratingsAverage", SortDir::Asc)]
        );
    }

    #[test]
    fn default_sort_is_id_ascending() {
        let spec = QuerySpec::new(&HIKES).sort(&params(&[])).unwrap();
        assert_eq!(spec.sort_keys(), vec![("id", SortDir::Asc)]);
    }

    #[test]
    fn sort_rejects_unknown_field() {
        let err = QuerySpec::new(&HIKES)
            .sort(&params(&[("sort", "passwordHash")]))
            .unwrap_err();
        assert_eq!(err, QueryError::UnknownField("passwordHash".into()));
    }

    #[test]
    fn pagination_computes_skip() {
        let spec = QuerySpec::new(&HIKES).paginate(&params(&[("page", "2"), ("limit", "10")]));
        assert_eq!(spec.skip(), 10);
        assert_eq!(spec.limit(), 10);
    }

    #[test]
    fn pagination_defaults_on_absent_params() {
        let spec = QuerySpec::new(&HIKES).paginate(&params(&[]));
        assert_eq!(spec.page(), 1);
        assert_eq!(spec.limit(), 100);
        assert_eq!(spec.skip(), 0);
    }

    #[test]
    fn pagination_falls_back_on_garbage() {
        let spec =
            QuerySpec::new(&HIKES).paginate(&params(&[("page", "two"), ("limit", "-5")]));
        assert_eq!(spec.page(), 1);
        assert_eq!(spec.limit(), 100);
    }

    #[test]
    fn filter_translates_operator_suffixes() {
        let spec = QuerySpec::new(&HIKES)
            .filter(&params(&[("duration", "5"), ("price[gte]", "500")]))
            .unwrap();
        let filters = spec.filters();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].op, CmpOp::Eq);
        assert_eq!(filters[0].value, FieldValue::Int(5));
        assert_eq!(filters[1].op, CmpOp::Gte);
        assert_eq!(filters[1].value, FieldValue::Float(500.0));
    }

    #[test]
    fn filter_skips_reserved_keys() {
        let spec = QuerySpec::new(&HIKES)
            .filter(&params(&[
                ("page", "3"),
                ("sort", "price"),
                ("limit", "5"),
                ("fields", "name"),
            ]))
            .unwrap();
        assert!(spec.filters().is_empty());
    }

    #[test]
    fn unrecognized_operator_never_reaches_the_store() {
        for key in ["price[ne]", "price[$gt]", "price[regex]", "price[gte][lt]"] {
            let err = QuerySpec::new(&HIKES)
                .filter(&params(&[(key, "500")]))
                .unwrap_err();
            assert!(
                matches!(err, QueryError::UnknownOperator { .. }),
                "{key} must be rejected"
            );
        }
    }

    #[test]
    fn unknown_filter_field_is_rejected() {
        let err = QuerySpec::new(&HIKES)
            .filter(&params(&[("$where", "1")]))
            .unwrap_err();
        assert_eq!(err, QueryError::UnknownField("$where".into()));
    }

    #[test]
    fn unparseable_value_is_rejected() {
        let err = QuerySpec::new(&HIKES)
            .filter(&params(&[("duration", "abc")]))
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::BadValue {
                field: "duration".into(),
                value: "abc".into(),
            }
        );
        assert_eq!(err.to_string(), "Invalid duration: abc");
    }

    #[test]
    fn default_projection_hides_only_the_version_field() {
        let spec = QuerySpec::new(&HIKES);
        let mut rows = serde_json::json!([
            {"id": "a", "name": "x", "price": 1.0, "rowVersion": 3}
        ]);
        spec.projection().apply(&mut rows);
        assert_eq!(
            rows,
            serde_json::json!([{"id": "a", "name": "x", "price": 1.0}])
        );
    }

    #[test]
    fn inclusion_projection_keeps_the_id() {
        let spec = QuerySpec::new(&HIKES)
            .select(&params(&[("fields", "name,price")]))
            .unwrap();
        let mut row = serde_json::json!(
            {"id": "a", "name": "x", "price": 1.0, "duration": 5, "rowVersion": 0}
        );
        spec.projection().apply(&mut row);
        assert_eq!(
            row,
            serde_json::json!({"id": "a", "name": "x", "price": 1.0})
        );
    }

    #[test]
    fn exclusion_projection_removes_listed_fields() {
        let spec = QuerySpec::new(&HIKES)
            .select(&params(&[("fields", "-duration")]))
            .unwrap();
        let mut row = serde_json::json!(
            {"id": "a", "duration": 5, "price": 1.0, "rowVersion": 0}
        );
        spec.projection().apply(&mut row);
        assert_eq!(row, serde_json::json!({"id": "a", "price": 1.0}));
    }

    #[test]
    fn mixed_projection_is_rejected() {
        let err = QuerySpec::new(&HIKES)
            .select(&params(&[("fields", "name,-duration")]))
            .unwrap_err();
        assert_eq!(err, QueryError::MixedProjection);
    }

    #[test]
    fn select_query_renders_scope_filters_and_bound_pagination() {
        let spec = QuerySpec::apply(
            &HIKES,
            &params(&[
                ("price[gte]", "500"),
                ("sort", "-price"),
                ("page", "2"),
                ("limit", "10"),
            ]),
        )
        .unwrap();
        let qb = spec.select_query();
        let sql = qb.sql();
        assert!(sql.contains("FROM hikes"));
        assert!(sql.contains("WHERE secret_hike = false AND price >= $1"));
        assert!(sql.contains("ORDER BY price DESC"));
        assert!(sql.ends_with("LIMIT $2 OFFSET $3"));
        // The raw value never appears in the SQL text.
        assert!(!sql.contains("500"));
    }

    #[test]
    fn constrain_pins_an_equality_filter() {
        let id = Uuid::new_v4();
        let spec = QuerySpec::new(&HIKES).constrain("id", id).unwrap();
        assert_eq!(spec.filters().len(), 1);
        assert_eq!(spec.filters()[0].value, FieldValue::Id(id));
    }
}
