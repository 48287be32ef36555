use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, QueryBuilder, Result};

use crate::db::models::{CartLine, Product, ProductWithRating, Review, User, WishlistEntry};

// --- User Queries ---

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub phone: Option<&'a str>,
    pub address: Option<&'a str>,
    pub verification_token_hash: &'a str,
}

pub async fn insert_user(pool: &PgPool, user: &NewUser<'_>) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, full_name, phone, address, verification_token_hash)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.full_name)
    .bind(user.phone)
    .bind(user.address)
    .bind(user.verification_token_hash)
    .fetch_one(pool)
    .await
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_id(pool: &PgPool, id: i64) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn update_profile(
    pool: &PgPool,
    id: i64,
    full_name: &str,
    phone: Option<&str>,
    address: Option<&str>,
) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET full_name = $1, phone = $2, address = $3, updated_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(full_name)
    .bind(phone)
    .bind(address)
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn update_password(pool: &PgPool, id: i64, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(password_hash)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Marks the owner of the verification token as verified; `None` if no user holds it.
pub async fn verify_email(pool: &PgPool, token_hash: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET email_verified = TRUE, verification_token_hash = NULL, updated_at = NOW()
        WHERE verification_token_hash = $1
        RETURNING *
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

pub async fn set_reset_token(
    pool: &PgPool,
    id: i64,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE users SET reset_token_hash = $1, reset_token_expires_at = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(token_hash)
    .bind(expires_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Consumes an unexpired reset token and stores the new hash in one statement.
pub async fn reset_password(
    pool: &PgPool,
    token_hash: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET password_hash = $1, reset_token_hash = NULL, reset_token_expires_at = NULL, updated_at = NOW()
        WHERE reset_token_hash = $2 AND reset_token_expires_at > $3
        RETURNING *
        "#,
    )
    .bind(password_hash)
    .bind(token_hash)
    .bind(now)
    .fetch_optional(pool)
    .await
}

// --- Product Queries ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("price_asc") => ProductSort::PriceAsc,
            Some("price_desc") => ProductSort::PriceDesc,
            Some("name") => ProductSort::Name,
            _ => ProductSort::Newest,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            ProductSort::Newest => "p.created_at DESC, p.id DESC",
            ProductSort::PriceAsc => "p.price ASC, p.id ASC",
            ProductSort::PriceDesc => "p.price DESC, p.id DESC",
            ProductSort::Name => "p.name ASC, p.id ASC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<BigDecimal>,
    pub max_price: Option<BigDecimal>,
    pub sort: ProductSort,
    pub limit: i64,
    pub offset: i64,
}

fn push_product_filters<'a>(builder: &mut QueryBuilder<'a, sqlx::Postgres>, filter: &'a ProductFilter) {
    builder.push(" WHERE p.is_active");
    if let Some(category) = &filter.category {
        builder.push(" AND p.category = ").push_bind(category);
    }
    if let Some(search) = &filter.search {
        builder
            .push(" AND p.name ILIKE ")
            .push_bind(format!("%{}%", search.replace('%', "\\%").replace('_', "\\_")));
    }
    if let Some(min) = &filter.min_price {
        builder.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = &filter.max_price {
        builder.push(" AND p.price <= ").push_bind(max);
    }
}

/// One page of active products plus the total matching count.
pub async fn list_products(pool: &PgPool, filter: &ProductFilter) -> Result<(Vec<ProductWithRating>, i64)> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products p");
    push_product_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut query = QueryBuilder::new(
        "SELECT p.*, AVG(r.rating)::FLOAT8 AS average_rating, COUNT(r.id) AS review_count
         FROM products p LEFT JOIN reviews r ON r.product_id = p.id",
    );
    push_product_filters(&mut query, filter);
    query
        .push(" GROUP BY p.id ORDER BY ")
        .push(filter.sort.order_by())
        .push(" LIMIT ")
        .push_bind(filter.limit)
        .push(" OFFSET ")
        .push_bind(filter.offset);

    let products = query
        .build_query_as::<ProductWithRating>()
        .fetch_all(pool)
        .await?;

    Ok((products, total))
}

pub async fn get_product_with_rating(pool: &PgPool, id: i64) -> Result<Option<ProductWithRating>> {
    sqlx::query_as::<_, ProductWithRating>(
        r#"
        SELECT p.*, AVG(r.rating)::FLOAT8 AS average_rating, COUNT(r.id) AS review_count
        FROM products p LEFT JOIN reviews r ON r.product_id = p.id
        WHERE p.id = $1 AND p.is_active
        GROUP BY p.id
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_product(pool: &PgPool, id: i64) -> Result<Option<Product>> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_categories(pool: &PgPool) -> Result<Vec<String>> {
    sqlx::query_scalar("SELECT DISTINCT category FROM products WHERE is_active ORDER BY category")
        .fetch_all(pool)
        .await
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: BigDecimal,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub stock: i32,
    pub image_url: Option<String>,
    pub origin: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_unit() -> String {
    "kg".to_string()
}

fn default_active() -> bool {
    true
}

pub async fn insert_product(pool: &PgPool, slug: &str, input: &ProductInput) -> Result<Product> {
    sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (name, slug, description, category, price, unit, stock, image_url, origin, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(&input.name)
    .bind(slug)
    .bind(&input.description)
    .bind(&input.category)
    .bind(&input.price)
    .bind(&input.unit)
    .bind(input.stock)
    .bind(&input.image_url)
    .bind(&input.origin)
    .bind(input.is_active)
    .fetch_one(pool)
    .await
}

pub async fn update_product(
    pool: &PgPool,
    id: i64,
    slug: &str,
    input: &ProductInput,
) -> Result<Option<Product>> {
    sqlx::query_as::<_, Product>(
        r#"
        UPDATE products SET
            name = $1, slug = $2, description = $3, category = $4, price = $5,
            unit = $6, stock = $7, image_url = $8, origin = $9, is_active = $10, updated_at = NOW()
        WHERE id = $11
        RETURNING *
        "#,
    )
    .bind(&input.name)
    .bind(slug)
    .bind(&input.description)
    .bind(&input.category)
    .bind(&input.price)
    .bind(&input.unit)
    .bind(input.stock)
    .bind(&input.image_url)
    .bind(&input.origin)
    .bind(input.is_active)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn deactivate_product(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// --- Cart Queries ---

pub async fn cart_lines(pool: &PgPool, user_id: i64) -> Result<Vec<CartLine>> {
    sqlx::query_as::<_, CartLine>(
        r#"
        SELECT c.product_id, p.name, p.slug, p.image_url, p.unit, p.price, p.stock, c.quantity, p.is_active
        FROM cart_items c JOIN products p ON p.id = c.product_id
        WHERE c.user_id = $1
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn cart_quantity(pool: &PgPool, user_id: i64, product_id: i64) -> Result<i32> {
    let quantity: Option<i32> =
        sqlx::query_scalar("SELECT quantity FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .fetch_optional(pool)
            .await?;
    Ok(quantity.unwrap_or(0))
}

pub async fn set_cart_quantity(pool: &PgPool, user_id: i64, product_id: i64, quantity: i32) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cart_items (user_id, product_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, product_id)
        DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_cart_item(pool: &PgPool, user_id: i64, product_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn clear_cart(pool: &PgPool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// --- Wishlist Queries ---

pub async fn wishlist(pool: &PgPool, user_id: i64) -> Result<Vec<WishlistEntry>> {
    sqlx::query_as::<_, WishlistEntry>(
        r#"
        SELECT w.product_id, p.name, p.slug, p.image_url, p.price, p.stock, w.created_at
        FROM wishlist_items w JOIN products p ON p.id = w.product_id
        WHERE w.user_id = $1
        ORDER BY w.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn add_to_wishlist(pool: &PgPool, user_id: i64, product_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO wishlist_items (user_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(product_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_from_wishlist(pool: &PgPool, user_id: i64, product_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// --- Review Queries ---

pub async fn reviews_for_product(pool: &PgPool, product_id: i64) -> Result<Vec<Review>> {
    sqlx::query_as::<_, Review>(
        r#"
        SELECT r.id, r.user_id, r.product_id, r.rating, r.comment, u.full_name AS author_name, r.created_at
        FROM reviews r JOIN users u ON u.id = r.user_id
        WHERE r.product_id = $1
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(product_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_review(
    pool: &PgPool,
    user_id: i64,
    product_id: i64,
    rating: i16,
    comment: Option<&str>,
) -> Result<Review> {
    sqlx::query_as::<_, Review>(
        r#"
        WITH inserted AS (
            INSERT INTO reviews (user_id, product_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            RETURNING *
        )
        SELECT i.id, i.user_id, i.product_id, i.rating, i.comment, u.full_name AS author_name, i.created_at
        FROM inserted i JOIN users u ON u.id = i.user_id
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(rating)
    .bind(comment)
    .fetch_one(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sort_falls_back_to_newest() {
        assert_eq!(ProductSort::parse(None), ProductSort::Newest);
        assert_eq!(ProductSort::parse(Some("random")), ProductSort::Newest);
        assert_eq!(ProductSort::parse(Some("price_desc")), ProductSort::PriceDesc);
        assert_eq!(ProductSort::parse(Some(" name ")), ProductSort::Name);
    }

    #[test]
    fn filters_build_expected_sql() {
        let filter = ProductFilter {
            category: Some("beef".to_string()),
            search: Some("50%_off".to_string()),
            min_price: Some(BigDecimal::from(1000)),
            max_price: None,
            sort: ProductSort::PriceAsc,
            limit: 20,
            offset: 0,
        };
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM products p");
        push_product_filters(&mut builder, &filter);
        let sql = builder.sql();
        assert!(sql.contains("p.category = $1"));
        assert!(sql.contains("p.name ILIKE $2"));
        assert!(sql.contains("p.price >= $3"));
        assert!(!sql.contains("p.price <="));
    }
}
