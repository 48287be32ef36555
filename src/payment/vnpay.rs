//! VNPay redirect signing and callback verification.
//!
//! Both directions sign the same canonical string: every parameter except
//! `vnp_SecureHash` and `vnp_SecureHashType`, keys sorted, values form-url-encoded, joined as
//! `key=value&key=value`, then HMAC-SHA512 with the merchant secret.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};
use url::form_urlencoded;

use crate::config::VnpayConfig;
use crate::domain::{parse_order_id, PaymentDetails};
use crate::validation::ValidationError;

type HmacSha512 = Hmac<Sha512>;

pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
pub const VERSION: &str = "2.1.0";
/// Minutes a generated payment link stays valid.
pub const PAYMENT_EXPIRY_MINUTES: i64 = 15;

/// Builds the canonical `key=value&...` string that gets signed.
pub fn canonical_query(params: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<&str, &str> = params
        .iter()
        .filter(|(key, _)| key.as_str() != SECURE_HASH && key.as_str() != SECURE_HASH_TYPE)
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();

    sorted
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex HMAC-SHA512 of the canonical query.
pub fn sign(params: &HashMap<String, String>, secret: &str) -> String {
    hmac_hex(&canonical_query(params), secret)
}

/// True only when `vnp_SecureHash` is present and matches the recomputed
/// signature (case-insensitive hex).
pub fn verify(params: &HashMap<String, String>, secret: &str) -> bool {
    let Some(supplied) = params.get(SECURE_HASH) else {
        return false;
    };
    let expected = sign(params, secret);
    supplied.len() == expected.len() && supplied.eq_ignore_ascii_case(&expected)
}

fn hmac_hex(data: &str, secret: &str) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts keys of any length"));
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Timestamp format used by the gateway, always in Vietnam time (GMT+7).
pub fn format_gateway_time(at: DateTime<Utc>) -> String {
    let offset = FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| unreachable!("+07:00 is a valid offset"));
    at.with_timezone(&offset).format("%Y%m%d%H%M%S").to_string()
}

/// Converts an order total in VND to the gateway's minor units (x100).
pub fn to_gateway_amount(total: &BigDecimal) -> Option<i64> {
    (total * BigDecimal::from(100)).with_scale(0).to_i64()
}

#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    pub order_id: i64,
    pub total: &'a BigDecimal,
    pub client_ip: &'a str,
    pub bank_code: Option<&'a str>,
    pub locale: Option<&'a str>,
}

/// Signed redirect URL that sends the customer to the gateway.
pub fn build_payment_url(
    config: &VnpayConfig,
    request: &PaymentRequest<'_>,
    now: DateTime<Utc>,
) -> Result<String, ValidationError> {
    let amount = to_gateway_amount(request.total)
        .filter(|amount| *amount > 0)
        .ok_or_else(|| ValidationError::new("total", "must be a positive amount"))?;

    let mut params: HashMap<String, String> = HashMap::new();
    params.insert("vnp_Version".into(), VERSION.into());
    params.insert("vnp_Command".into(), "pay".into());
    params.insert("vnp_TmnCode".into(), config.tmn_code.clone());
    params.insert("vnp_Locale".into(), request.locale.unwrap_or("vn").to_string());
    params.insert("vnp_CurrCode".into(), "VND".into());
    params.insert("vnp_TxnRef".into(), request.order_id.to_string());
    params.insert(
        "vnp_OrderInfo".into(),
        format!("Thanh toan don hang {}", request.order_id),
    );
    params.insert("vnp_OrderType".into(), "other".into());
    params.insert("vnp_Amount".into(), amount.to_string());
    params.insert("vnp_ReturnUrl".into(), config.return_url.clone());
    params.insert("vnp_IpAddr".into(), request.client_ip.to_string());
    params.insert("vnp_CreateDate".into(), format_gateway_time(now));
    params.insert(
        "vnp_ExpireDate".into(),
        format_gateway_time(now + Duration::minutes(PAYMENT_EXPIRY_MINUTES)),
    );
    if let Some(bank_code) = request.bank_code.filter(|code| !code.trim().is_empty()) {
        params.insert("vnp_BankCode".into(), bank_code.trim().to_string());
    }

    let query = canonical_query(&params);
    let signature = hmac_hex(&query, &config.hash_secret);
    Ok(format!(
        "{}?{}&{}={}",
        config.payment_url, query, SECURE_HASH, signature
    ))
}

/// Parsed fields of a verified return or IPN callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCallback {
    pub order_id: i64,
    /// Minor units (VND x 100), as reported.
    pub amount: i64,
    pub response_code: String,
    pub transaction_status: Option<String>,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
    pub card_type: Option<String>,
    pub pay_date: Option<String>,
    pub order_info: Option<String>,
}

impl GatewayCallback {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let required = |key: &'static str| {
            params
                .get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ValidationError::new(key, "is missing"))
        };
        let optional = |key: &str| {
            params
                .get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let order_id = parse_order_id(&required("vnp_TxnRef")?)?;
        let amount = required("vnp_Amount")?
            .parse::<i64>()
            .ok()
            .filter(|amount| *amount >= 0)
            .ok_or_else(|| ValidationError::new("vnp_Amount", "must be a non-negative integer"))?;

        Ok(GatewayCallback {
            order_id,
            amount,
            response_code: required("vnp_ResponseCode")?,
            transaction_status: optional("vnp_TransactionStatus"),
            transaction_no: optional("vnp_TransactionNo"),
            bank_code: optional("vnp_BankCode"),
            card_type: optional("vnp_CardType"),
            pay_date: optional("vnp_PayDate"),
            order_info: optional("vnp_OrderInfo"),
        })
    }

    /// Gateway amount normalized back to VND.
    pub fn amount_vnd(&self) -> BigDecimal {
        BigDecimal::from(self.amount) / BigDecimal::from(100)
    }

    /// The gateway reports success only when both codes are `00`.
    pub fn is_success(&self) -> bool {
        self.response_code == "00"
            && self
                .transaction_status
                .as_deref()
                .map_or(true, |status| status == "00")
    }

    pub fn payment_details(&self) -> PaymentDetails {
        PaymentDetails {
            transaction_no: self.transaction_no.clone(),
            bank_code: self.bank_code.clone(),
            card_type: self.card_type.clone(),
            pay_date: self.pay_date.clone(),
            response_code: self.response_code.clone(),
            response_message: response_message(&self.response_code).to_string(),
        }
    }
}

/// Human-readable explanation of a `vnp_ResponseCode`.
pub fn response_message(code: &str) -> &'static str {
    match code {
        "00" => "Transaction successful",
        "07" => "Amount deducted, transaction flagged as suspicious",
        "09" => "Card or account not registered for internet banking",
        "10" => "Card or account verification failed more than 3 times",
        "11" => "Payment window expired",
        "12" => "Card or account is locked",
        "13" => "Wrong one-time password",
        "24" => "Customer cancelled the transaction",
        "51" => "Insufficient balance",
        "65" => "Daily transaction limit exceeded",
        "75" => "Bank is under maintenance",
        "79" => "Wrong payment password entered too many times",
        _ => "Payment failed",
    }
}

/// Acknowledgement codes the gateway expects from the IPN endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpnCode {
    ConfirmSuccess,
    OrderNotFound,
    AlreadyConfirmed,
    InvalidAmount,
    InvalidSignature,
    UnknownError,
}

impl IpnCode {
    pub fn code(&self) -> &'static str {
        match self {
            IpnCode::ConfirmSuccess => "00",
            IpnCode::OrderNotFound => "01",
            IpnCode::AlreadyConfirmed => "02",
            IpnCode::InvalidAmount => "04",
            IpnCode::InvalidSignature => "97",
            IpnCode::UnknownError => "99",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            IpnCode::ConfirmSuccess => "Confirm Success",
            IpnCode::OrderNotFound => "Order not found",
            IpnCode::AlreadyConfirmed => "Order already confirmed",
            IpnCode::InvalidAmount => "Invalid amount",
            IpnCode::InvalidSignature => "Invalid signature",
            IpnCode::UnknownError => "Unknown error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllowedIps;
    use std::str::FromStr;

    const SECRET: &str = "SECRETKEY";

    fn sample_params() -> HashMap<String, String> {
        [
            ("vnp_TxnRef", "15"),
            ("vnp_Amount", "35000000"),
            ("vnp_ResponseCode", "00"),
            ("vnp_TransactionStatus", "00"),
            ("vnp_TransactionNo", "14226112"),
            ("vnp_BankCode", "NCB"),
            ("vnp_OrderInfo", "Thanh toan don hang 15"),
            ("vnp_TmnCode", "TESTCODE"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn config() -> VnpayConfig {
        VnpayConfig {
            tmn_code: "TESTCODE".to_string(),
            hash_secret: SECRET.to_string(),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "http://localhost:3000/payment/result".to_string(),
            ipn_allowed_ips: AllowedIps::Any,
        }
    }

    #[test]
    fn canonical_query_sorts_and_encodes() {
        let mut params = HashMap::new();
        params.insert("vnp_b".to_string(), "two words".to_string());
        params.insert("vnp_a".to_string(), "x&y=z".to_string());
        params.insert(SECURE_HASH.to_string(), "ignored".to_string());
        params.insert(SECURE_HASH_TYPE.to_string(), "HmacSHA512".to_string());

        assert_eq!(canonical_query(&params), "vnp_a=x%26y%3Dz&vnp_b=two+words");
    }

    #[test]
    fn canonical_query_keeps_parameters_without_the_vnp_prefix() {
        let mut params = HashMap::new();
        params.insert("vnp_TxnRef".to_string(), "42".to_string());
        params.insert("utm_source".to_string(), "zalo".to_string());
        params.insert(SECURE_HASH.to_string(), "ignored".to_string());

        assert_eq!(canonical_query(&params), "utm_source=zalo&vnp_TxnRef=42");
    }

    #[test]
    fn signature_is_128_lowercase_hex_chars() {
        let signature = sign(&sample_params(), SECRET);
        assert_eq!(signature.len(), 128);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn verify_accepts_own_signature_in_any_case() {
        let mut params = sample_params();
        let signature = sign(&params, SECRET);
        params.insert(SECURE_HASH.to_string(), signature.to_uppercase());
        params.insert(SECURE_HASH_TYPE.to_string(), "HmacSHA512".to_string());
        assert!(verify(&params, SECRET));
    }

    #[test]
    fn verify_rejects_tampered_parameter() {
        let mut params = sample_params();
        let signature = sign(&params, SECRET);
        params.insert(SECURE_HASH.to_string(), signature);
        params.insert("vnp_Amount".to_string(), "100".to_string());
        assert!(!verify(&params, SECRET));
    }

    #[test]
    fn verify_rejects_wrong_secret_and_missing_hash() {
        let mut params = sample_params();
        assert!(!verify(&params, SECRET));

        let signature = sign(&params, "OTHER");
        params.insert(SECURE_HASH.to_string(), signature);
        assert!(!verify(&params, SECRET));
    }

    #[test]
    fn payment_url_carries_a_verifiable_signature() {
        let total = BigDecimal::from(350_000);
        let now = DateTime::parse_from_rfc3339("2024-06-01T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let url = build_payment_url(
            &config(),
            &PaymentRequest {
                order_id: 15,
                total: &total,
                client_ip: "127.0.0.1",
                bank_code: Some("NCB"),
                locale: None,
            },
            now,
        )
        .unwrap();

        let parsed = url::Url::parse(&url).unwrap();
        let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["vnp_Amount"], "35000000");
        assert_eq!(params["vnp_TxnRef"], "15");
        assert_eq!(params["vnp_CreateDate"], "20240601100000");
        assert_eq!(params["vnp_ExpireDate"], "20240601101500");
        assert_eq!(params["vnp_BankCode"], "NCB");
        assert!(verify(&params, SECRET));
    }

    #[test]
    fn payment_url_rejects_zero_total() {
        let total = BigDecimal::from(0);
        let result = build_payment_url(
            &config(),
            &PaymentRequest {
                order_id: 1,
                total: &total,
                client_ip: "127.0.0.1",
                bank_code: None,
                locale: None,
            },
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn callback_parses_and_normalizes_amount() {
        let callback = GatewayCallback::from_params(&sample_params()).unwrap();
        assert_eq!(callback.order_id, 15);
        assert_eq!(callback.amount_vnd(), BigDecimal::from_str("350000").unwrap());
        assert!(callback.is_success());
        assert_eq!(callback.payment_details().response_message, "Transaction successful");
    }

    #[test]
    fn callback_rejects_malformed_reference() {
        let mut params = sample_params();
        params.insert("vnp_TxnRef".to_string(), "15abc".to_string());
        assert!(GatewayCallback::from_params(&params).is_err());

        params.remove("vnp_TxnRef");
        assert!(GatewayCallback::from_params(&params).is_err());
    }

    #[test]
    fn failed_transaction_status_is_not_success() {
        let mut params = sample_params();
        params.insert("vnp_TransactionStatus".to_string(), "02".to_string());
        assert!(!GatewayCallback::from_params(&params).unwrap().is_success());

        params.insert("vnp_ResponseCode".to_string(), "24".to_string());
        let callback = GatewayCallback::from_params(&params).unwrap();
        assert_eq!(callback.payment_details().response_message, "Customer cancelled the transaction");
    }
}
