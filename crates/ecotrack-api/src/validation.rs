//! Request validation. Every check records a `path -> message` entry so the
//! client gets all problems with a request at once.

use std::collections::{BTreeMap, HashSet};

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, rejection::JsonRejection},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use ecotrack_types::api::{MissionInput, MissionPatch};
use ecotrack_types::models::{Address, FieldKind, Impact, SchemaField};

use crate::error::ApiError;

pub const NAME_LEN: (usize, usize) = (2, 60);
pub const PASSWORD_LEN: (usize, usize) = (8, 128);
pub const TITLE_LEN: (usize, usize) = (3, 120);
pub const DESCRIPTION_MAX: usize = 5000;
pub const POINTS_RANGE: (i64, i64) = (1, 10_000);
pub const SCHEMA_FIELDS_MAX: usize = 30;
pub const EVIDENCE_URLS_MAX: usize = 10;
pub const TEXT_ANSWER_MAX: usize = 2000;
pub const REASON_LEN: (usize, usize) = (3, 500);
pub const NOTE_MAX: usize = 500;

/// JSON body extractor whose rejection is an [`ApiError`].
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// Path extractor whose rejection is an [`ApiError`].
pub struct PathParam<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(PathParam(value))
    }
}

/// Query string extractor whose rejection is an [`ApiError`].
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(QueryParams(value))
    }
}

/// Parse a body that may be empty, falling back to `T::default()`.
pub fn optional_body<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| {
        let mut details = BTreeMap::new();
        details.insert("body".to_string(), e.to_string());
        ApiError::Validation(details)
    })
}

#[derive(Debug, Default)]
pub struct Violations(BTreeMap<String, String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.entry(path.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.0))
        }
    }

    pub fn length(&mut self, path: &str, value: &str, (min, max): (usize, usize)) {
        let len = value.trim().chars().count();
        if len < min {
            self.add(path, format!("must be at least {} characters", min));
        } else if len > max {
            self.add(path, format!("must be at most {} characters", max));
        }
    }

    pub fn email(&mut self, path: &str, value: &str) {
        if !is_email(value) {
            self.add(path, "must be a valid email address");
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_email(value: &str) -> bool {
    let value = value.trim();
    if value.len() > 254 || value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub fn is_http_url(value: &str) -> bool {
    match reqwest::Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

pub fn validate_address(v: &mut Violations, address: &Address) {
    let parts = [
        ("address.street", &address.street),
        ("address.city", &address.city),
        ("address.postal_code", &address.postal_code),
        ("address.country", &address.country),
    ];
    for (path, value) in parts {
        if let Some(value) = value {
            if value.chars().count() > 120 {
                v.add(path, "must be at most 120 characters");
            }
        }
    }
}

// -- Missions --

pub fn validate_mission(input: &MissionInput) -> Result<(), ApiError> {
    let mut v = Violations::new();
    v.length("title", &input.title, TITLE_LEN);
    validate_description(&mut v, &input.description);
    validate_points(&mut v, input.points);
    validate_impact(&mut v, &input.impact);
    validate_schema(&mut v, &input.submission_schema);
    v.into_result()
}

pub fn validate_mission_patch(patch: &MissionPatch) -> Result<(), ApiError> {
    let mut v = Violations::new();
    if let Some(title) = &patch.title {
        v.length("title", title, TITLE_LEN);
    }
    if let Some(description) = &patch.description {
        validate_description(&mut v, description);
    }
    if let Some(points) = patch.points {
        validate_points(&mut v, points);
    }
    if let Some(impact) = &patch.impact {
        validate_impact(&mut v, impact);
    }
    if let Some(schema) = &patch.submission_schema {
        validate_schema(&mut v, schema);
    }
    v.into_result()
}

fn validate_description(v: &mut Violations, description: &str) {
    if description.chars().count() > DESCRIPTION_MAX {
        v.add("description", format!("must be at most {} characters", DESCRIPTION_MAX));
    }
}

fn validate_points(v: &mut Violations, points: i64) {
    let (min, max) = POINTS_RANGE;
    if !(min..=max).contains(&points) {
        v.add("points", format!("must be between {} and {}", min, max));
    }
}

fn validate_impact(v: &mut Violations, impact: &Impact) {
    for (path, value) in [
        ("impact.co2_kg", impact.co2_kg),
        ("impact.water_liters", impact.water_liters),
        ("impact.waste_kg", impact.waste_kg),
    ] {
        if !value.is_finite() || value < 0.0 {
            v.add(path, "must be a non-negative number");
        }
    }
}

fn is_field_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && key.len() <= 40
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn validate_schema(v: &mut Violations, schema: &[SchemaField]) {
    if schema.len() > SCHEMA_FIELDS_MAX {
        v.add(
            "submission_schema",
            format!("must have at most {} fields", SCHEMA_FIELDS_MAX),
        );
    }

    let mut seen = HashSet::new();
    for (i, field) in schema.iter().enumerate() {
        let base = format!("submission_schema[{}]", i);
        if !is_field_key(&field.key) {
            v.add(
                format!("{base}.key"),
                "must start with a lowercase letter and use only a-z, 0-9 and _ (max 40)",
            );
        } else if !seen.insert(field.key.as_str()) {
            v.add(format!("{base}.key"), "duplicate field key");
        }

        v.length(&format!("{base}.label"), &field.label, (1, 120));

        match field.kind {
            FieldKind::Select => {
                if field.options.is_empty() {
                    v.add(format!("{base}.options"), "select fields need at least one option");
                }
                let unique: HashSet<&str> = field.options.iter().map(String::as_str).collect();
                if unique.len() != field.options.len()
                    || field.options.iter().any(|o| o.trim().is_empty())
                {
                    v.add(format!("{base}.options"), "options must be unique and non-empty");
                }
            }
            _ if !field.options.is_empty() => {
                v.add(format!("{base}.options"), "options only apply to select fields");
            }
            _ => {}
        }
    }
}

// -- Submissions --

/// Check submitted answers against a mission's form definition.
pub fn validate_answers(
    v: &mut Violations,
    schema: &[SchemaField],
    answers: &BTreeMap<String, Value>,
) {
    for field in schema {
        let path = format!("answers.{}", field.key);
        let value = answers.get(&field.key).filter(|value| !is_blank(value));

        let Some(value) = value else {
            if field.required {
                v.add(path, "is required");
            }
            continue;
        };

        match field.kind {
            FieldKind::Text => match value.as_str() {
                Some(s) if s.chars().count() <= TEXT_ANSWER_MAX => {}
                Some(_) => v.add(path, format!("must be at most {} characters", TEXT_ANSWER_MAX)),
                None => v.add(path, "must be text"),
            },
            FieldKind::Number => {
                if !value.as_f64().is_some_and(f64::is_finite) {
                    v.add(path, "must be a number");
                }
            }
            FieldKind::Boolean => {
                if !value.is_boolean() {
                    v.add(path, "must be true or false");
                }
            }
            FieldKind::Url => {
                if !value.as_str().is_some_and(is_http_url) {
                    v.add(path, "must be an http(s) URL");
                }
            }
            FieldKind::Select => {
                let chosen = value.as_str();
                if !chosen.is_some_and(|c| field.options.iter().any(|o| o == c)) {
                    v.add(path, format!("must be one of: {}", field.options.join(", ")));
                }
            }
        }
    }

    let known: HashSet<&str> = schema.iter().map(|f| f.key.as_str()).collect();
    for key in answers.keys() {
        if !known.contains(key.as_str()) {
            v.add(format!("answers.{}", key), "is not part of this mission's form");
        }
    }
}

pub fn validate_evidence(v: &mut Violations, urls: &[String]) {
    if urls.len() > EVIDENCE_URLS_MAX {
        v.add("evidence_urls", format!("at most {} URLs", EVIDENCE_URLS_MAX));
    }
    for (i, url) in urls.iter().enumerate() {
        if url.len() > 2048 || !is_http_url(url) {
            v.add(format!("evidence_urls[{}]", i), "must be an http(s) URL");
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
