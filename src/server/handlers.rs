use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::currency::{fallback_currencies, ConversionResponse, CurrencyError};
use crate::location::providers::ReverseGeocoder;
use crate::location::types::Coordinates;
use crate::location::{GeoError, LocationData, SessionError, ShippingContext};

use super::state::AppState;
use super::upstream::public_ip;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

impl From<GeoError> for ApiError {
    fn from(e: GeoError) -> Self {
        match e {
            GeoError::InvalidLocation(_) => api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            GeoError::Timeout(_) => api_error(StatusCode::GATEWAY_TIMEOUT, e.to_string()),
            _ => api_error(StatusCode::BAD_GATEWAY, e.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Disposed => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            SessionError::InvalidLocation(geo) => geo.into(),
        }
    }
}

impl From<CurrencyError> for ApiError {
    fn from(e: CurrencyError) -> Self {
        let status = match &e {
            CurrencyError::InvalidCurrency(_) | CurrencyError::InvalidAmount(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::BAD_GATEWAY,
        };
        api_error(status, e.to_string())
    }
}

// ─── GET /api/geo/ip ─────────────────────────────────────────────

/// First public address from `X-Forwarded-For`, then `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    let real = headers.get("x-real-ip").and_then(|v| v.to_str().ok());

    forwarded
        .into_iter()
        .chain(real)
        .filter_map(|s| s.parse::<IpAddr>().ok())
        .find_map(public_ip)
}

pub async fn geo_ip(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<LocationData>, ApiError> {
    let start = Instant::now();
    let ip = client_ip(&headers);

    let location = state.ip_lookup.lookup_ip(ip).await.map_err(|e| {
        warn!(error = %e, "IP lookup failed");
        ApiError::from(e)
    })?;

    info!(
        country = %location.country_code,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/geo/ip"
    );
    Ok(Json(location))
}

// ─── GET /api/geo/reverse ────────────────────────────────────────

#[derive(Deserialize)]
pub struct ReverseQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

pub async fn geo_reverse(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReverseQuery>,
) -> Result<Json<LocationData>, ApiError> {
    let start = Instant::now();

    let (Some(lat), Some(lng)) = (params.lat, params.lng) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Provide 'lat' and 'lng' parameters"));
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid coordinates. Lat: -90..90, Lng: -180..180",
        ));
    }

    let coords = Coordinates {
        latitude: lat,
        longitude: lng,
    };
    let location = state.geocoder.reverse(coords).await.map_err(|e| {
        warn!(lat, lng, error = %e, "reverse geocoding failed");
        ApiError::from(e)
    })?;

    info!(
        lat,
        lng,
        country = %location.country_code,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/geo/reverse"
    );
    Ok(Json(location))
}

// ─── GET /api/convert ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConvertQuery {
    pub amount: Option<f64>,
    pub from: Option<String>,
    pub to: Option<String>,
}

pub async fn convert(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConvertQuery>,
) -> Result<Json<ConversionResponse>, ApiError> {
    let start = Instant::now();

    let (Some(amount), Some(from), Some(to)) = (params.amount, params.from, params.to) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Provide 'amount', 'from' and 'to' parameters",
        ));
    };

    let resp = state.rates.convert(amount, &from, &to).await.map_err(|e| {
        warn!(%from, %to, error = %e, "conversion failed");
        ApiError::from(e)
    })?;

    info!(
        %from,
        %to,
        rate = resp.meta.rate,
        source = resp.meta.source.map(|s| s.as_str()).unwrap_or("identity"),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/convert"
    );
    Ok(Json(resp))
}

// ─── GET /api/currencies ─────────────────────────────────────────

pub async fn currencies() -> Json<BTreeMap<String, String>> {
    Json(fallback_currencies())
}

// ─── Session ─────────────────────────────────────────────────────

pub async fn shipping_context(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ShippingContext>, ApiError> {
    let mut session = state.session.lock().await;
    session.init().await?;
    Ok(Json(session.context().shipping_context()))
}

pub async fn set_location(
    State(state): State<Arc<AppState>>,
    Json(location): Json<LocationData>,
) -> Result<Json<ShippingContext>, ApiError> {
    let mut session = state.session.lock().await;
    session.set_location_manually(location)?;
    let ctx = session.context().shipping_context();
    info!(country = %ctx.country_code, "POST /api/location");
    Ok(Json(ctx))
}

pub async fn refresh_location(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ShippingContext>, ApiError> {
    let start = Instant::now();
    let mut session = state.session.lock().await;
    session.refresh_location().await?;
    let ctx = session.context().shipping_context();
    info!(
        country = %ctx.country_code,
        method = ?ctx.detection_method,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "POST /api/location/refresh"
    );
    Ok(Json(ctx))
}
