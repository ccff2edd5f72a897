use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::Page;
use crate::domain::aggregates::catalog::{HistoryRefs, Product, ProductCategory, ProductDraft, ProductVariant, VariantDraft, VariantSync};
use crate::domain::aggregates::review::RatingSummary;

pub const RECENTLY_VIEWED: i64 = 10;

#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub category: Option<ProductCategory>,
    pub seller_id: Option<Uuid>,
    pub search: Option<String>,
}

/// A product as listed: variants plus its derived rating.
#[derive(Clone, Debug, Serialize)]
pub struct ProductListing {
    #[serde(flatten)]
    pub product: Product,
    #[serde(flatten)]
    pub rating: RatingSummary,
}

async fn attach_variants(conn: &mut PgConnection, products: &mut [Product]) -> Result<(), sqlx::Error> {
    if products.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let variants = sqlx::query_as::<_, ProductVariant>(
        "SELECT * FROM product_variants WHERE product_id = ANY($1) ORDER BY created_at, id",
    )
    .bind(&ids)
    .fetch_all(conn)
    .await?;
    let mut by_product: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
    for v in variants {
        by_product.entry(v.product_id).or_default().push(v);
    }
    for p in products.iter_mut() {
        p.variants = by_product.remove(&p.id).unwrap_or_default();
    }
    Ok(())
}

pub async fn find(conn: &mut PgConnection, id: Uuid) -> Result<Option<Product>, sqlx::Error> {
    let Some(product) = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let mut found = [product];
    attach_variants(conn, &mut found).await?;
    let [product] = found;
    Ok(Some(product))
}

pub async fn find_many(conn: &mut PgConnection, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>, sqlx::Error> {
    let mut products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;
    attach_variants(conn, &mut products).await?;
    Ok(products.into_iter().map(|p| (p.id, p)).collect())
}

pub async fn product_name(conn: &mut PgConnection, product_id: Uuid) -> Result<String, sqlx::Error> {
    let (name,): (String,) = sqlx::query_as("SELECT name FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(conn)
        .await?;
    Ok(name)
}

pub async fn find_by_ref(conn: &mut PgConnection, seller_id: Uuid, ref_no: &str) -> Result<Option<Product>, sqlx::Error> {
    let id: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE seller_id = $1 AND ref_no = $2")
        .bind(seller_id)
        .bind(ref_no)
        .fetch_optional(&mut *conn)
        .await?;
    match id {
        Some((id,)) => find(conn, id).await,
        None => Ok(None),
    }
}

const FILTER: &str = "($1::product_category IS NULL OR category = $1)
    AND ($2::uuid IS NULL OR seller_id = $2)
    AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR brand ILIKE '%' || $3 || '%'
         OR ref_no ILIKE '%' || $3 || '%' OR cas_number ILIKE '%' || $3 || '%')";

pub async fn list(conn: &mut PgConnection, filter: &ProductFilter, page: Page) -> Result<(Vec<ProductListing>, i64), sqlx::Error> {
    let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let mut products = sqlx::query_as::<_, Product>(&format!(
        "SELECT * FROM products WHERE {FILTER} ORDER BY created_at DESC, id LIMIT $4 OFFSET $5"
    ))
    .bind(filter.category)
    .bind(filter.seller_id)
    .bind(search)
    .bind(i64::from(page.limit()))
    .bind(page.offset())
    .fetch_all(&mut *conn)
    .await?;
    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products WHERE {FILTER}"))
        .bind(filter.category)
        .bind(filter.seller_id)
        .bind(search)
        .fetch_one(&mut *conn)
        .await?;
    attach_variants(&mut *conn, &mut products).await?;
    let listings = with_ratings(conn, products).await?;
    Ok((listings, total))
}

pub async fn with_ratings(conn: &mut PgConnection, products: Vec<Product>) -> Result<Vec<ProductListing>, sqlx::Error> {
    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let rows: Vec<(Uuid, Option<Decimal>, i64)> = sqlx::query_as(
        "SELECT product_id, ROUND(AVG(rating)::numeric, 2), COUNT(*) FROM reviews
         WHERE product_id = ANY($1) GROUP BY product_id",
    )
    .bind(&ids)
    .fetch_all(conn)
    .await?;
    let mut ratings: HashMap<Uuid, RatingSummary> = rows
        .into_iter()
        .map(|(id, average_rating, review_count)| (id, RatingSummary { average_rating, review_count }))
        .collect();
    Ok(products
        .into_iter()
        .map(|product| {
            let rating = ratings.remove(&product.id).unwrap_or_default();
            ProductListing { product, rating }
        })
        .collect())
}

pub async fn insert_variant(conn: &mut PgConnection, product_id: Uuid, v: &VariantDraft) -> Result<ProductVariant, sqlx::Error> {
    sqlx::query_as::<_, ProductVariant>(
        "INSERT INTO product_variants (id, product_id, label, est_price, price, created_at)
         VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(product_id)
    .bind(v.label.trim())
    .bind(v.est_price)
    .bind(v.price)
    .fetch_one(conn)
    .await
}

async fn update_variant(conn: &mut PgConnection, variant_id: Uuid, v: &VariantDraft) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE product_variants SET label = $2, est_price = $3, price = $4 WHERE id = $1")
        .bind(variant_id)
        .bind(v.label.trim())
        .bind(v.est_price)
        .bind(v.price)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert(conn: &mut PgConnection, seller_id: Uuid, d: &ProductDraft) -> Result<Product, sqlx::Error> {
    let mut product = sqlx::query_as::<_, Product>(
        "INSERT INTO products (id, seller_id, ref_no, name, description, category, brand, cas_number, gst_rate, discount, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(seller_id)
    .bind(d.ref_no.as_str())
    .bind(&d.name)
    .bind(&d.description)
    .bind(d.category)
    .bind(&d.brand)
    .bind(&d.cas_number)
    .bind(d.gst_rate)
    .bind(d.discount)
    .fetch_one(&mut *conn)
    .await?;
    for v in &d.variants {
        product.variants.push(insert_variant(&mut *conn, product.id, v).await?);
    }
    Ok(product)
}

/// Overwrites product fields and, when given, applies the variant changes
/// in place. Kept variants keep their ids.
pub async fn update(conn: &mut PgConnection, id: Uuid, d: &ProductDraft, variants: Option<&VariantSync>) -> Result<Product, sqlx::Error> {
    sqlx::query(
        "UPDATE products SET ref_no = $2, name = $3, description = $4, category = $5, brand = $6,
         cas_number = $7, gst_rate = $8, discount = $9, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(d.ref_no.as_str())
    .bind(&d.name)
    .bind(&d.description)
    .bind(d.category)
    .bind(&d.brand)
    .bind(&d.cas_number)
    .bind(d.gst_rate)
    .bind(d.discount)
    .execute(&mut *conn)
    .await?;
    if let Some(sync) = variants {
        if !sync.drop.is_empty() {
            sqlx::query("DELETE FROM product_variants WHERE product_id = $1 AND id = ANY($2)")
                .bind(id)
                .bind(&sync.drop)
                .execute(&mut *conn)
                .await?;
        }
        for (variant_id, v) in &sync.keep {
            update_variant(&mut *conn, *variant_id, v).await?;
        }
        for v in &sync.add {
            insert_variant(&mut *conn, id, v).await?;
        }
    }
    find(conn, id).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn set_image(conn: &mut PgConnection, id: Uuid, path: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE products SET image_path = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(path)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn product_history(conn: &mut PgConnection, product_id: Uuid) -> Result<HistoryRefs, sqlx::Error> {
    sqlx::query_as::<_, HistoryRefs>(
        "SELECT (SELECT COUNT(*) FROM order_items WHERE product_id = $1) AS order_lines,
                (SELECT COUNT(*) FROM quotation_requests WHERE product_id = $1) AS quotation_requests,
                (SELECT COUNT(*) FROM reviews WHERE product_id = $1) AS reviews",
    )
    .bind(product_id)
    .fetch_one(conn)
    .await
}

pub async fn variant_history(conn: &mut PgConnection, variant_ids: &[Uuid]) -> Result<HistoryRefs, sqlx::Error> {
    if variant_ids.is_empty() {
        return Ok(HistoryRefs::default());
    }
    sqlx::query_as::<_, HistoryRefs>(
        "SELECT (SELECT COUNT(*) FROM order_items WHERE variant_id = ANY($1)) AS order_lines,
                (SELECT COUNT(*) FROM quotation_requests WHERE variant_id = ANY($1)) AS quotation_requests,
                (SELECT COUNT(*) FROM reviews WHERE variant_id = ANY($1)) AS reviews",
    )
    .bind(variant_ids)
    .fetch_one(conn)
    .await
}

/// Removes the product with its variants and the cart, wishlist and
/// recent-view rows pointing at it.
pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<(), sqlx::Error> {
    for table in ["cart_items", "wishlist_items", "recent_views"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE product_id = $1")).bind(id).execute(&mut *conn).await?;
    }
    sqlx::query("DELETE FROM product_variants WHERE product_id = $1").bind(id).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(conn).await?;
    Ok(())
}

pub async fn record_view(conn: &mut PgConnection, user_id: Uuid, product_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO recent_views (user_id, product_id, viewed_at) VALUES ($1, $2, NOW())
         ON CONFLICT (user_id, product_id) DO UPDATE SET viewed_at = NOW()",
    )
    .bind(user_id)
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Most recent first.
pub async fn recently_viewed(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Product>, sqlx::Error> {
    let ids: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT product_id FROM recent_views WHERE user_id = $1 ORDER BY viewed_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(RECENTLY_VIEWED)
    .fetch_all(&mut *conn)
    .await?;
    let ids: Vec<Uuid> = ids.into_iter().map(|(id,)| id).collect();
    let mut products = find_many(conn, &ids).await?;
    Ok(ids.iter().filter_map(|id| products.remove(id)).collect())
}
