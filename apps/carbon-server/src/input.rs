//! Request validation.
//!
//! Every handler turns its raw query or body into one of the typed values
//! below before touching the store, so malformed input is rejected with a 400
//! and business logic only sees range-checked numbers.

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::{AppError, AppResult};
use crate::store::{Id, NewDevice, NewUsage};

/// JSON request body whose rejections (bad syntax, wrong field types, missing
/// content type) come back as a 400 with the usual `{ "error": ... }` body.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request(
        req: Request,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let Json(value) = Json::<T>::from_request(req, state).await?;
            Ok(Self(value))
        }
    }
}

/// Filter value meaning "no restriction on this axis".
pub const ALL: &str = "All";

const MISSING_FIELDS: &str = "Missing required fields.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter<T> {
    All,
    Only(T),
}

impl<T> Filter<T> {
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::All => None,
            Self::Only(value) => Some(value),
        }
    }
}

pub type CampusFilter = Filter<String>;
pub type YearFilter = Filter<i32>;

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmissionQuery {
    /// Campus name or `All`.
    campus: Option<String>,
    /// Four digit year or `All`.
    year: Option<String>,
}

impl EmissionQuery {
    pub fn new(campus: Option<&str>, year: Option<&str>) -> Self {
        Self {
            campus: campus.map(str::to_string),
            year: year.map(str::to_string),
        }
    }
}

/// The filter exactly as the client sent it, echoed back in responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct FilterEcho {
    pub campus: String,
    pub year: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionFilters {
    pub campus: CampusFilter,
    pub year: YearFilter,
    pub echo: FilterEcho,
}

fn is_all(value: &str) -> bool {
    value.is_empty() || value == ALL
}

pub fn parse_emission_query(query: EmissionQuery) -> AppResult<EmissionFilters> {
    let campus_raw = query.campus.unwrap_or_else(|| ALL.to_string());
    let year_raw = query.year.unwrap_or_else(|| ALL.to_string());

    let campus_trimmed = campus_raw.trim();
    let campus = if is_all(campus_trimmed) {
        Filter::All
    } else {
        Filter::Only(campus_trimmed.to_string())
    };

    let year_trimmed = year_raw.trim();
    let year = if is_all(year_trimmed) {
        Filter::All
    } else {
        let parsed = year_trimmed
            .parse::<i32>()
            .ok()
            .filter(|year| *year > 0)
            .ok_or_else(|| {
                AppError::bad_request(format!("year must be a positive integer or \"{ALL}\""))
            })?;
        Filter::Only(parsed)
    };

    Ok(EmissionFilters {
        campus,
        year,
        echo: FilterEcho {
            campus: campus_raw,
            year: year_raw,
        },
    })
}

/// A JSON number, or a string holding one. Form-driven clients send both.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse::<f64>().ok(),
        }
        .filter(|value| value.is_finite())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Number(value) if value.fract() == 0.0 && value.is_finite() => {
                Some(*value as i64)
            }
            Self::Number(_) => None,
            Self::Text(text) => text.trim().parse::<i64>().ok(),
        }
    }
}

fn required_text(value: Option<String>) -> AppResult<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request(MISSING_FIELDS))
}

fn required_number(value: Option<Numeric>) -> AppResult<Numeric> {
    value.ok_or_else(|| AppError::bad_request(MISSING_FIELDS))
}

fn positive_power(value: Numeric) -> AppResult<f64> {
    value
        .as_f64()
        .filter(|power| *power > 0.0)
        .ok_or_else(|| AppError::bad_request("device_power must be a positive number."))
}

fn non_negative_hours(value: Numeric) -> AppResult<f64> {
    value
        .as_f64()
        .filter(|hours| *hours >= 0.0)
        .ok_or_else(|| AppError::bad_request("usage_hours must be a non-negative number."))
}

fn year_and_month(year: Numeric, month: Numeric) -> AppResult<(i32, i32)> {
    let year = year
        .as_integer()
        .filter(|year| (1..=9999).contains(year))
        .map(|year| year as i32);
    let month = month
        .as_integer()
        .filter(|month| (1..=12).contains(month))
        .map(|month| month as i32);
    match (year, month) {
        (Some(year), Some(month)) => Ok((year, month)),
        _ => Err(AppError::bad_request("Invalid year or month.")),
    }
}

pub(crate) fn parse_id(value: &Numeric, field: &str) -> AppResult<Id> {
    value
        .as_integer()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::bad_request(format!("{field} must be a positive integer.")))
}

pub(crate) fn parse_path_id(value: &str, field: &str) -> AppResult<Id> {
    parse_id(&Numeric::Text(value.to_string()), field)
}

/// Body of the combined "register device + usage" operation.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct DeviceInputRequest {
    device_name: Option<String>,
    #[schema(value_type = Option<f64>)]
    device_power: Option<Numeric>,
    campus_name: Option<String>,
    building_name: Option<String>,
    room_name: Option<String>,
    #[schema(value_type = Option<f64>)]
    usage_hours: Option<Numeric>,
    #[schema(value_type = Option<i32>)]
    year: Option<Numeric>,
    #[schema(value_type = Option<i32>)]
    month: Option<Numeric>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FullUsageInput {
    pub device_name: String,
    pub device_power: f64,
    pub campus_name: String,
    pub building_name: String,
    pub room_name: String,
    pub usage_hours: f64,
    pub year: i32,
    pub month: i32,
}

impl TryFrom<DeviceInputRequest> for FullUsageInput {
    type Error = AppError;

    fn try_from(payload: DeviceInputRequest) -> AppResult<Self> {
        let device_name = required_text(payload.device_name)?;
        let campus_name = required_text(payload.campus_name)?;
        let building_name = required_text(payload.building_name)?;
        let room_name = required_text(payload.room_name)?;
        let device_power = required_number(payload.device_power)?;
        let usage_hours = required_number(payload.usage_hours)?;
        let year = required_number(payload.year)?;
        let month = required_number(payload.month)?;

        let device_power = positive_power(device_power)?;
        let usage_hours = non_negative_hours(usage_hours)?;
        let (year, month) = year_and_month(year, month)?;

        Ok(Self {
            device_name,
            device_power,
            campus_name,
            building_name,
            room_name,
            usage_hours,
            year,
            month,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct DeviceRequest {
    device_name: Option<String>,
    #[schema(value_type = Option<f64>)]
    device_power: Option<Numeric>,
    #[schema(value_type = Option<i64>)]
    room_id: Option<Numeric>,
}

impl TryFrom<DeviceRequest> for NewDevice {
    type Error = AppError;

    fn try_from(payload: DeviceRequest) -> AppResult<Self> {
        let device_name = required_text(payload.device_name)?;
        let device_power = required_number(payload.device_power)?;
        let room_id = required_number(payload.room_id)?;
        Ok(Self {
            device_name,
            device_power: positive_power(device_power)?,
            room_id: parse_id(&room_id, "room_id")?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct UsageRequest {
    #[schema(value_type = Option<i64>)]
    usage_id: Option<Numeric>,
    #[schema(value_type = Option<i64>)]
    device_id: Option<Numeric>,
    #[schema(value_type = Option<f64>)]
    usage_hours: Option<Numeric>,
    #[schema(value_type = Option<i32>)]
    year: Option<Numeric>,
    #[schema(value_type = Option<i32>)]
    month: Option<Numeric>,
}

impl UsageRequest {
    /// Fields for a new record; `usage_id` is ignored.
    pub(crate) fn into_new_usage(self) -> AppResult<NewUsage> {
        let device_id = required_number(self.device_id)?;
        let usage_hours = required_number(self.usage_hours)?;
        let year = required_number(self.year)?;
        let month = required_number(self.month)?;
        let (year, month) = year_and_month(year, month)?;
        Ok(NewUsage {
            device_id: parse_id(&device_id, "device_id")?,
            usage_hours: non_negative_hours(usage_hours)?,
            year,
            month,
        })
    }

    /// `usage_id` plus a full replacement record.
    pub(crate) fn into_update(mut self) -> AppResult<(Id, NewUsage)> {
        let usage_id = self
            .usage_id
            .take()
            .ok_or_else(|| AppError::bad_request("All fields are required."))?;
        let usage_id = parse_id(&usage_id, "usage_id")?;
        Ok((usage_id, self.into_new_usage()?))
    }

    pub(crate) fn into_usage_id(self) -> AppResult<Id> {
        let usage_id = self
            .usage_id
            .ok_or_else(|| AppError::bad_request("usage_id is required."))?;
        parse_id(&usage_id, "usage_id")
    }
}
