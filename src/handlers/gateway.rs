use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
};

use crate::{error::ApiError, gateway, state::AppState, types::InboundOutcome};

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

pub async fn inbound_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InboundOutcome>, ApiError> {
    let client_ip = client_ip(&headers, connect_info.as_ref());
    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = gateway::process_inbound(
        &state.pool,
        &state.gateway,
        &state.queue,
        &body,
        signature_header,
        client_ip,
    )
    .await
    .map_err(map_gateway_error)?;

    if !outcome.accepted {
        let reason = outcome.reason.unwrap_or_else(|| "rejected".to_string());
        return Err(match reason.as_str() {
            "ip_not_allowed" => ApiError::Forbidden(reason),
            "invalid_json" | "missing_event_type" => ApiError::BadRequest(reason),
            _ => ApiError::Unauthorized(reason),
        });
    }

    Ok(Json(outcome))
}

fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    let forwarded = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());

    forwarded
        .or_else(|| connect_info.map(|info| info.0.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn map_gateway_error(err: gateway::GatewayError) -> ApiError {
    match err {
        gateway::GatewayError::Ledger(gateway::ledger::StoreError::Db(db)) => ApiError::Db(db),
        gateway::GatewayError::Ledger(gateway::ledger::StoreError::NotFound(message)) => {
            ApiError::Internal(message)
        }
        gateway::GatewayError::Queue(err) => map_queue_error(err),
    }
}

fn map_queue_error(err: crate::queue::StoreError) -> ApiError {
    match err {
        crate::queue::StoreError::Db(db) => ApiError::Db(db),
        crate::queue::StoreError::Conflict(message) => ApiError::Conflict(message),
        crate::queue::StoreError::NotFound(message) => ApiError::NotFound(message),
        crate::queue::StoreError::Parse(message) => ApiError::Internal(message),
    }
}
