use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::adapters::postgres_order_repository::{OrderRow, ORDER_COLUMNS};
use crate::db::models::Product;
use crate::domain::{Order, OrderStatus};
use crate::error::AppError;
use crate::handlers::date_range;
use crate::middleware::auth::MaybeAuthUser;
use crate::AppState;

/// Rows fetched per round trip while streaming an export.
const BATCH_SIZE: i64 = 500;

const ORDER_HEADERS: [&str; 15] = [
    "id",
    "user_id",
    "status",
    "payment_method",
    "subtotal",
    "discount_amount",
    "shipping_fee",
    "total",
    "discount_code",
    "shipping_name",
    "shipping_phone",
    "shipping_address",
    "transaction_no",
    "created_at",
    "paid_at",
];

const PRODUCT_HEADERS: [&str; 10] = [
    "id",
    "name",
    "slug",
    "category",
    "price",
    "unit",
    "stock",
    "origin",
    "is_active",
    "updated_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Tsv,
}

impl ExportFormat {
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(|f| f.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("csv") => Ok(ExportFormat::Csv),
            Some("tsv") => Ok(ExportFormat::Tsv),
            Some(other) => Err(AppError::Validation(format!(
                "format: '{}' must be one of csv, tsv",
                other
            ))),
        }
    }

    fn delimiter(&self) -> u8 {
        match self {
            ExportFormat::Csv => b',',
            ExportFormat::Tsv => b'\t',
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Tsv => "text/tab-separated-values; charset=utf-8",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct OrderExportQuery {
    pub format: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProductExportQuery {
    pub format: Option<String>,
    pub category: Option<String>,
}

#[derive(Serialize)]
struct OrderExportRow {
    id: i64,
    user_id: String,
    status: &'static str,
    payment_method: String,
    subtotal: String,
    discount_amount: String,
    shipping_fee: String,
    total: String,
    discount_code: String,
    shipping_name: String,
    shipping_phone: String,
    shipping_address: String,
    transaction_no: String,
    created_at: String,
    paid_at: String,
}

impl From<&Order> for OrderExportRow {
    fn from(order: &Order) -> Self {
        OrderExportRow {
            id: order.id,
            user_id: order.user_id.map(|id| id.to_string()).unwrap_or_default(),
            status: order.status.as_str(),
            payment_method: order.payment_method.clone(),
            subtotal: order.subtotal.to_string(),
            discount_amount: order.discount_amount.to_string(),
            shipping_fee: order.shipping_fee.to_string(),
            total: order.total.to_string(),
            discount_code: order.discount_code.clone().unwrap_or_default(),
            shipping_name: order.shipping_name.clone(),
            shipping_phone: order.shipping_phone.clone(),
            shipping_address: order.shipping_address.clone(),
            transaction_no: order.transaction_no.clone().unwrap_or_default(),
            created_at: order.created_at.to_rfc3339(),
            paid_at: order.paid_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct ProductExportRow {
    id: i64,
    name: String,
    slug: String,
    category: String,
    price: String,
    unit: String,
    stock: i32,
    origin: String,
    is_active: bool,
    updated_at: String,
}

impl From<&Product> for ProductExportRow {
    fn from(product: &Product) -> Self {
        ProductExportRow {
            id: product.id,
            name: product.name.clone(),
            slug: product.slug.clone(),
            category: product.category.clone(),
            price: product.price.to_string(),
            unit: product.unit.clone(),
            stock: product.stock,
            origin: product.origin.clone().unwrap_or_default(),
            is_active: product.is_active,
            updated_at: product.updated_at.to_rfc3339(),
        }
    }
}

fn encode_header(format: ExportFormat, headers: &[&str]) -> Result<String, AppError> {
    let mut writer = WriterBuilder::new()
        .delimiter(format.delimiter())
        .from_writer(Vec::new());
    writer
        .write_record(headers)
        .map_err(|e| AppError::Internal(format!("export header encoding failed: {}", e)))?;
    finish(writer)
}

fn encode_record<T: Serialize>(format: ExportFormat, record: &T) -> Result<String, AppError> {
    let mut writer = WriterBuilder::new()
        .delimiter(format.delimiter())
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .serialize(record)
        .map_err(|e| AppError::Internal(format!("export row encoding failed: {}", e)))?;
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, AppError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("export flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("export produced invalid utf-8: {}", e)))
}

#[derive(Debug, Clone)]
struct OrderFilter {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    status: Option<OrderStatus>,
}

fn order_batch_query(filter: &OrderFilter, after_id: i64) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {} FROM orders WHERE id > ", ORDER_COLUMNS));
    query.push_bind(after_id);
    if let Some(from) = filter.from {
        query.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND created_at < ").push_bind(to);
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    query.push(" ORDER BY id ASC LIMIT ").push_bind(BATCH_SIZE);
    query
}

/// Streams the whole filtered order set, one keyset-paginated batch at a time.
fn order_stream(
    pool: PgPool,
    filter: OrderFilter,
    format: ExportFormat,
) -> impl Stream<Item = Result<String, AppError>> + Send + 'static {
    async_stream::try_stream! {
        yield encode_header(format, &ORDER_HEADERS)?;

        let mut last_id = 0_i64;
        loop {
            let mut query = order_batch_query(&filter, last_id);
            let rows: Vec<OrderRow> = query
                .build_query_as::<OrderRow>()
                .fetch_all(&pool)
                .await
                .map_err(AppError::from)?;
            if rows.is_empty() {
                break;
            }

            for row in rows {
                let order = row.into_domain().map_err(AppError::from)?;
                last_id = order.id;
                yield encode_record(format, &OrderExportRow::from(&order))?;
            }
        }
    }
}

fn product_batch_query(category: Option<&str>, after_id: i64) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("SELECT * FROM products WHERE id > ");
    query.push_bind(after_id);
    if let Some(category) = category {
        query.push(" AND category = ").push_bind(category.to_string());
    }
    query.push(" ORDER BY id ASC LIMIT ").push_bind(BATCH_SIZE);
    query
}

fn product_stream(
    pool: PgPool,
    category: Option<String>,
    format: ExportFormat,
) -> impl Stream<Item = Result<String, AppError>> + Send + 'static {
    async_stream::try_stream! {
        yield encode_header(format, &PRODUCT_HEADERS)?;

        let mut last_id = 0_i64;
        loop {
            let mut query = product_batch_query(category.as_deref(), last_id);
            let products: Vec<Product> = query
                .build_query_as::<Product>()
                .fetch_all(&pool)
                .await
                .map_err(AppError::from)?;
            if products.is_empty() {
                break;
            }

            for product in products {
                last_id = product.id;
                yield encode_record(format, &ProductExportRow::from(&product))?;
            }
        }
    }
}

fn authorize(state: &AppState, user: &MaybeAuthUser) -> Result<(), AppError> {
    if !state.config.export_require_admin {
        return Ok(());
    }
    match &user.0 {
        None => Err(AppError::Unauthorized("Authentication required".to_string())),
        Some(user) if !user.is_admin() => {
            tracing::warn!(user_id = user.id, "non-admin export attempt rejected");
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
        Some(_) => Ok(()),
    }
}

fn attachment<S>(format: ExportFormat, stem: &str, stream: S) -> Result<Response, AppError>
where
    S: Stream<Item = Result<String, AppError>> + Send + 'static,
{
    let filename = format!("{}_{}.{}", stem, Utc::now().format("%Y%m%d"), format.extension());
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|e| AppError::Internal(format!("invalid export filename: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(format.content_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

pub async fn export_orders(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    Query(query): Query<OrderExportQuery>,
) -> Result<Response, AppError> {
    authorize(&state, &user)?;
    let format = ExportFormat::parse(query.format.as_deref())?;
    let (from, to) = date_range(query.from.as_deref(), query.to.as_deref())?;
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<OrderStatus>()?),
        None => None,
    };

    tracing::info!(format = format.extension(), ?status, "order export started");
    let filter = OrderFilter { from, to, status };
    attachment(format, "orders", order_stream(state.db.clone(), filter, format))
}

pub async fn export_products(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    Query(query): Query<ProductExportQuery>,
) -> Result<Response, AppError> {
    authorize(&state, &user)?;
    let format = ExportFormat::parse(query.format.as_deref())?;
    let category = query
        .category
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty());

    tracing::info!(format = format.extension(), ?category, "product export started");
    attachment(format, "products", product_stream(state.db.clone(), category, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn sample_order() -> Order {
        let now = Utc::now();
        Order {
            id: 42,
            user_id: Some(7),
            subtotal: BigDecimal::from(450_000),
            discount_amount: BigDecimal::from(0),
            shipping_fee: BigDecimal::from(30_000),
            total: BigDecimal::from(480_000),
            discount_code: None,
            status: OrderStatus::Paid,
            payment_method: "VNPAY".to_string(),
            shipping_name: "Tran Thi B".to_string(),
            shipping_phone: "0912345678".to_string(),
            shipping_address: "5 Hang Bai, Ha Noi".to_string(),
            note: None,
            transaction_no: Some("14123456".to_string()),
            bank_code: Some("NCB".to_string()),
            card_type: None,
            pay_date: None,
            response_code: Some("00".to_string()),
            response_message: None,
            created_at: now,
            updated_at: now,
            paid_at: Some(now),
        }
    }

    #[test]
    fn format_parsing() {
        assert_eq!(ExportFormat::parse(None).unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse(Some("TSV")).unwrap(), ExportFormat::Tsv);
        assert!(ExportFormat::parse(Some("xlsx")).is_err());
    }

    #[test]
    fn order_record_matches_header_width() {
        let line = encode_record(ExportFormat::Csv, &OrderExportRow::from(&sample_order())).unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(line.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.len(), ORDER_HEADERS.len());
        assert_eq!(&record[0], "42");
        assert_eq!(&record[2], "PAID");
        assert_eq!(&record[11], "5 Hang Bai, Ha Noi");
    }

    #[test]
    fn tsv_uses_tab_delimiter_and_quotes_embedded_commas() {
        let header = encode_header(ExportFormat::Tsv, &["id", "name"]).unwrap();
        assert_eq!(header, "id\tname\n");

        let csv = encode_record(ExportFormat::Csv, &OrderExportRow::from(&sample_order())).unwrap();
        assert!(csv.contains("\"5 Hang Bai, Ha Noi\""));

        let tsv = encode_record(ExportFormat::Tsv, &OrderExportRow::from(&sample_order())).unwrap();
        assert!(tsv.contains("\t5 Hang Bai, Ha Noi\t"));
    }

    #[test]
    fn order_batch_query_binds_every_filter() {
        let filter = OrderFilter {
            from: Some(Utc::now()),
            to: None,
            status: Some(OrderStatus::Completed),
        };
        let query = order_batch_query(&filter, 10);
        let sql = query.sql();
        assert!(sql.contains("id > $1"));
        assert!(sql.contains("created_at >= $2"));
        assert!(sql.contains("status = $3"));
        assert!(sql.ends_with("LIMIT $4"));
    }
}
