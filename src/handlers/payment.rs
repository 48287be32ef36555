use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::domain::OrderStatus;
use crate::error::AppError;
use crate::handlers::orders::payer_ip;
use crate::middleware::auth::AuthUser;
use crate::payment::vnpay::{self, GatewayCallback, IpnCode, PaymentRequest};
use crate::use_cases::PaymentOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: i64,
    pub bank_code: Option<String>,
    pub locale: Option<String>,
}

/// Acknowledgement body the gateway expects from the IPN endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl From<IpnCode> for IpnResponse {
    fn from(code: IpnCode) -> Self {
        IpnResponse {
            rsp_code: code.code().to_string(),
            message: code.message().to_string(),
        }
    }
}

/// Result shown to the customer after the gateway redirects back.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReturnResult {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub order_id: Option<i64>,
}

impl ReturnResult {
    fn failure(code: IpnCode, order_id: Option<i64>) -> Self {
        ReturnResult {
            success: false,
            code: code.code().to_string(),
            message: code.message().to_string(),
            order_id,
        }
    }
}

/// Issues a fresh payment URL for an order still waiting on the gateway.
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let order = state.orders.get_by_id(body.order_id).await?;
    if !order.is_owned_by(user.id) {
        return Err(AppError::Forbidden(
            "You can only pay for your own orders".to_string(),
        ));
    }
    if order.status != OrderStatus::AwaitingPayment {
        return Err(AppError::Conflict(format!(
            "Order {} is {}, not awaiting payment",
            order.id, order.status
        )));
    }

    let ip = payer_ip(&state, &headers, peer.map(|ConnectInfo(addr)| addr));
    let url = vnpay::build_payment_url(
        &state.config.vnpay,
        &PaymentRequest {
            order_id: order.id,
            total: &order.total,
            client_ip: &ip,
            bank_code: body.bank_code.as_deref(),
            locale: body.locale.as_deref(),
        },
        Utc::now(),
    )?;

    tracing::info!(order_id = order.id, user_id = user.id, "payment url issued");
    Ok(Json(json!({ "order_id": order.id, "payment_url": url })))
}

/// Browser redirect from the gateway. Verified and applied exactly like the IPN.
pub async fn vnpay_return(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<ReturnResult> {
    if !vnpay::verify(&params, &state.config.vnpay.hash_secret) {
        tracing::warn!(txn_ref = ?params.get("vnp_TxnRef"), "return callback with invalid signature");
        return Json(ReturnResult::failure(IpnCode::InvalidSignature, None));
    }

    let callback = match GatewayCallback::from_params(&params) {
        Ok(callback) => callback,
        Err(e) => {
            tracing::warn!(error = %e, "malformed return callback");
            return Json(ReturnResult::failure(IpnCode::UnknownError, None));
        }
    };

    let order_id = Some(callback.order_id);
    let outcome = match state.confirm_payment().execute(&callback).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(order_id = callback.order_id, error = %e, "payment confirmation failed");
            return Json(ReturnResult::failure(IpnCode::UnknownError, order_id));
        }
    };

    let result = match outcome {
        PaymentOutcome::Paid(_) | PaymentOutcome::AlreadyPaid(_) => ReturnResult {
            success: true,
            code: "00".to_string(),
            message: vnpay::response_message("00").to_string(),
            order_id,
        },
        PaymentOutcome::Failed(_) => ReturnResult {
            success: false,
            message: vnpay::response_message(&callback.response_code).to_string(),
            code: callback.response_code.clone(),
            order_id,
        },
        other => ReturnResult::failure(other.ipn_code(), order_id),
    };
    Json(result)
}

/// Server-to-server notification. Always answers HTTP 200; the outcome is
/// carried in `RspCode`.
pub async fn vnpay_ipn(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<IpnResponse> {
    if !vnpay::verify(&params, &state.config.vnpay.hash_secret) {
        tracing::warn!(txn_ref = ?params.get("vnp_TxnRef"), "ipn with invalid signature rejected");
        return Json(IpnCode::InvalidSignature.into());
    }

    let callback = match GatewayCallback::from_params(&params) {
        Ok(callback) => callback,
        Err(e) => {
            tracing::warn!(error = %e, "malformed ipn parameters");
            return Json(IpnCode::UnknownError.into());
        }
    };

    let code = match state.confirm_payment().execute(&callback).await {
        Ok(outcome) => outcome.ipn_code(),
        Err(e) => {
            tracing::error!(order_id = callback.order_id, error = %e, "ipn processing failed");
            IpnCode::UnknownError
        }
    };

    tracing::info!(order_id = callback.order_id, rsp_code = code.code(), "ipn acknowledged");
    Json(code.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipn_response_uses_gateway_field_names() {
        let body = serde_json::to_value(IpnResponse::from(IpnCode::InvalidAmount)).unwrap();
        assert_eq!(body["RspCode"], "04");
        assert_eq!(body["Message"], "Invalid amount");
    }
}
