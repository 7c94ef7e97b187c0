use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::tours::repo::Difficulty;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTourRequest {
    pub name: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_dates")]
    pub start_dates: Vec<OffsetDateTime>,
    pub start_lat: Option<f64>,
    pub start_lng: Option<f64>,
    pub start_address: Option<String>,
    #[serde(default)]
    pub secret_tour: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTourRequest {
    pub name: Option<String>,
    pub duration: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_dates_opt")]
    pub start_dates: Option<Vec<OffsetDateTime>>,
    pub start_lat: Option<f64>,
    pub start_lng: Option<f64>,
    pub start_address: Option<String>,
    pub secret_tour: Option<bool>,
}

/// Start dates travel as RFC 3339 strings on the wire.
pub(crate) fn serialize_dates<S: Serializer>(
    dates: &[OffsetDateTime],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let rendered: Result<Vec<String>, _> = dates
        .iter()
        .map(|d| d.format(&Rfc3339).map_err(serde::ser::Error::custom))
        .collect();
    rendered?.serialize(serializer)
}

fn deserialize_dates<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<OffsetDateTime>, D::Error> {
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|s| OffsetDateTime::parse(s, &Rfc3339).map_err(serde::de::Error::custom))
        .collect()
}

fn deserialize_dates_opt<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<OffsetDateTime>>, D::Error> {
    let raw = Option::<Vec<String>>::deserialize(deserializer)?;
    raw.map(|dates| {
        dates
            .iter()
            .map(|s| OffsetDateTime::parse(s, &Rfc3339).map_err(serde::de::Error::custom))
            .collect()
    })
    .transpose()
}

pub(crate) fn validate_create(body: &CreateTourRequest) -> Vec<String> {
    let mut problems = Vec::new();
    problems.extend(name_problems(&body.name));
    if body.duration < 1 {
        problems.push("A tour must have a positive duration".to_string());
    }
    if body.max_group_size < 1 {
        problems.push("A tour must have a positive group size".to_string());
    }
    if body.price <= 0.0 {
        problems.push("A tour must have a positive price".to_string());
    }
    if let Some(discount) = body.price_discount {
        if discount >= body.price {
            problems.push("The price discount should be below the regular price".to_string());
        }
    }
    if body.summary.trim().is_empty() {
        problems.push("A tour must have a summary".to_string());
    }
    if body.image_cover.trim().is_empty() {
        problems.push("A tour must have a cover image".to_string());
    }
    problems
}

pub(crate) fn name_problems(name: &str) -> Vec<String> {
    let len = name.trim().chars().count();
    let mut problems = Vec::new();
    if len < 10 {
        problems.push("A tour name must have at least 10 characters".to_string());
    }
    if len > 40 {
        problems.push("A tour name must have at most 40 characters".to_string());
    }
    problems
}
