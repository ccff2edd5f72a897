use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::api::AppState;
use crate::auth::Actor;
use crate::db;
use crate::domain::analytics::{self, CustomerInsights, DashboardStats, Period, ProductPerformance, SalesRow, SalesTrends};
use crate::error::{ApiError, FieldErrors};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/seller/dashboard/stats", get(stats))
        .route("/seller/dashboard/sales-trends", get(sales_trends))
        .route("/seller/dashboard/product-performance", get(product_performance))
        .route("/seller/dashboard/customer-insights", get(customer_insights))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

impl PeriodQuery {
    fn period(&self) -> Result<Period, FieldErrors> {
        match self.period.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p.parse().map_err(|e: String| FieldErrors::single("period", e)),
            None => Ok(Period::default()),
        }
    }
}

/// The caller's order lines inside the requested window.
async fn seller_rows(s: &AppState, actor: &Actor, q: &PeriodQuery) -> Result<(Period, Vec<SalesRow>), ApiError> {
    let seller_id = actor.seller()?;
    let period = q.period()?;
    let mut conn = s.db.acquire().await?;
    let rows = db::analytics::sales_rows(&mut *conn, seller_id, period.since(Utc::now())).await?;
    Ok((period, rows))
}

async fn stats(State(s): State<AppState>, actor: Actor, Query(q): Query<PeriodQuery>) -> Result<Json<DashboardStats>, ApiError> {
    let (period, rows) = seller_rows(&s, &actor, &q).await?;
    Ok(Json(analytics::dashboard_stats(period, &rows)))
}

async fn sales_trends(State(s): State<AppState>, actor: Actor, Query(q): Query<PeriodQuery>) -> Result<Json<SalesTrends>, ApiError> {
    let (period, rows) = seller_rows(&s, &actor, &q).await?;
    Ok(Json(analytics::sales_trends(period, &rows)))
}

async fn product_performance(
    State(s): State<AppState>,
    actor: Actor,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<ProductPerformance>, ApiError> {
    let (period, rows) = seller_rows(&s, &actor, &q).await?;
    Ok(Json(analytics::product_performance(period, &rows)))
}

async fn customer_insights(
    State(s): State<AppState>,
    actor: Actor,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<CustomerInsights>, ApiError> {
    let (period, rows) = seller_rows(&s, &actor, &q).await?;
    Ok(Json(analytics::customer_insights(period, &rows)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_defaults_to_month() {
        assert_eq!(PeriodQuery { period: None }.period().unwrap(), Period::Month);
        assert_eq!(PeriodQuery { period: Some(" ".into()) }.period().unwrap(), Period::Month);
        assert_eq!(PeriodQuery { period: Some("Week".into()) }.period().unwrap(), Period::Week);
    }

    #[test]
    fn test_unknown_period_is_a_field_error() {
        let errors = PeriodQuery { period: Some("decade".into()) }.period().unwrap_err();
        assert!(errors.get("period").is_some());
    }
}
