//! Seller dashboard aggregation.
//!
//! Every figure is recomputed from order lines on each call. Revenue, units,
//! order counts and customer figures only count `completed` orders; the status
//! breakdown covers every order in the window.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use crate::domain::aggregates::catalog::ProductCategory;
use crate::domain::aggregates::order::OrderStatus;
use crate::domain::pricing::{self, VariantPrice};
use crate::domain::value_objects::Money;

pub const RECENT_ORDERS: usize = 5;
pub const TOP_CUSTOMERS: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Month,
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            other => Err(format!("unknown period '{other}', expected day, week, month or year")),
        }
    }
}

impl Period {
    /// Rolling window start.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let days = match self {
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 30,
            Period::Year => 365,
        };
        now - Duration::days(days)
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Period::Day => Granularity::Hour,
            Period::Week | Period::Month => Granularity::Day,
            Period::Year => Granularity::Month,
        }
    }
}

impl Granularity {
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let naive = match self {
            Granularity::Hour => date.and_hms_opt(at.hour(), 0, 0),
            Granularity::Day => date.and_hms_opt(0, 0, 0),
            Granularity::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        };
        naive.map(|n| Utc.from_utc_datetime(&n)).unwrap_or(at)
    }
}

/// One of the seller's order lines joined with its order and catalog entry.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SalesRow {
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    pub status: OrderStatus,
    pub ordered_at: DateTime<Utc>,
    pub product_id: Uuid,
    pub product_name: String,
    pub category: ProductCategory,
    pub quantity: i32,
    pub price: Money,
    pub variant_price: Option<Money>,
    pub variant_est_price: Option<Money>,
}

impl SalesRow {
    /// Frozen line price, falling back to the variant's prices when the
    /// stored price is missing.
    pub fn unit_price(&self) -> Money {
        if !self.price.is_zero() {
            return self.price;
        }
        pricing::effective_price(Some(&VariantPrice { price: self.variant_price, est_price: self.variant_est_price }))
    }

    pub fn revenue(&self) -> Money { self.unit_price().times(self.quantity) }

    pub fn is_completed(&self) -> bool { self.status == OrderStatus::Completed }
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardStats {
    pub period: Period,
    pub total_orders: i64,
    pub total_revenue: Money,
    pub units_sold: i64,
    pub average_order_value: Money,
    pub status_breakdown: BTreeMap<String, i64>,
    pub recent_orders: Vec<RecentOrder>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RecentOrder {
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    pub ordered_at: DateTime<Utc>,
    pub revenue: Money,
    pub units: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SalesTrends {
    pub period: Period,
    pub granularity: Granularity,
    pub points: Vec<TrendPoint>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TrendPoint {
    pub bucket: DateTime<Utc>,
    pub revenue: Money,
    pub orders: i64,
    pub units: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductPerformance {
    pub period: Period,
    pub products: Vec<ProductStat>,
    pub categories: Vec<CategoryStat>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductStat {
    pub product_id: Uuid,
    pub name: String,
    pub category: ProductCategory,
    pub revenue: Money,
    pub units: i64,
    pub orders: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CategoryStat {
    pub category: ProductCategory,
    pub revenue: Money,
    pub units: i64,
    pub orders: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CustomerInsights {
    pub period: Period,
    pub total_customers: i64,
    pub repeat_customers: i64,
    pub new_customers: i64,
    /// Percentage of customers with two or more completed orders.
    pub repeat_rate: Decimal,
    pub average_customer_value: Money,
    pub top_customers: Vec<CustomerStat>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CustomerStat {
    pub buyer_id: Uuid,
    pub orders: i64,
    pub revenue: Money,
}

/// Revenue, units and distinct orders for a group of lines.
#[derive(Default)]
struct Tally {
    revenue: Money,
    units: i64,
    orders: HashSet<Uuid>,
}

impl Tally {
    fn add(&mut self, row: &SalesRow) {
        self.revenue = self.revenue + row.revenue();
        self.units += i64::from(row.quantity);
        self.orders.insert(row.order_id);
    }
    fn order_count(&self) -> i64 { self.orders.len() as i64 }
}

fn average(total: Money, count: i64) -> Money {
    if count == 0 { Money::ZERO } else { Money::new(total.amount() / Decimal::from(count)) }
}

pub fn dashboard_stats(period: Period, rows: &[SalesRow]) -> DashboardStats {
    let mut completed = Tally::default();
    let mut per_order: HashMap<Uuid, (Uuid, DateTime<Utc>, Tally)> = HashMap::new();
    let mut statuses: HashMap<Uuid, OrderStatus> = HashMap::new();

    for row in rows {
        statuses.insert(row.order_id, row.status);
        if row.is_completed() {
            completed.add(row);
            per_order
                .entry(row.order_id)
                .or_insert_with(|| (row.buyer_id, row.ordered_at, Tally::default()))
                .2
                .add(row);
        }
    }

    let mut status_breakdown: BTreeMap<String, i64> = BTreeMap::new();
    for status in statuses.values() {
        *status_breakdown.entry(status.as_str().to_string()).or_default() += 1;
    }

    let mut recent_orders: Vec<RecentOrder> = per_order
        .into_iter()
        .map(|(order_id, (buyer_id, ordered_at, tally))| RecentOrder {
            order_id,
            buyer_id,
            ordered_at,
            revenue: tally.revenue,
            units: tally.units,
        })
        .collect();
    recent_orders.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at).then(b.order_id.cmp(&a.order_id)));
    recent_orders.truncate(RECENT_ORDERS);

    let total_orders = completed.order_count();
    DashboardStats {
        period,
        total_orders,
        total_revenue: completed.revenue,
        units_sold: completed.units,
        average_order_value: average(completed.revenue, total_orders),
        status_breakdown,
        recent_orders,
    }
}

pub fn sales_trends(period: Period, rows: &[SalesRow]) -> SalesTrends {
    let granularity = period.granularity();
    let mut buckets: BTreeMap<DateTime<Utc>, Tally> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.is_completed()) {
        buckets.entry(granularity.truncate(row.ordered_at)).or_default().add(row);
    }
    let points = buckets
        .into_iter()
        .map(|(bucket, t)| TrendPoint { bucket, revenue: t.revenue, orders: t.order_count(), units: t.units })
        .collect();
    SalesTrends { period, granularity, points }
}

pub fn product_performance(period: Period, rows: &[SalesRow]) -> ProductPerformance {
    let mut products: HashMap<Uuid, (String, ProductCategory, Tally)> = HashMap::new();
    let mut categories: HashMap<ProductCategory, Tally> = HashMap::new();
    for row in rows.iter().filter(|r| r.is_completed()) {
        products
            .entry(row.product_id)
            .or_insert_with(|| (row.product_name.clone(), row.category, Tally::default()))
            .2
            .add(row);
        categories.entry(row.category).or_default().add(row);
    }

    let mut products: Vec<ProductStat> = products
        .into_iter()
        .map(|(product_id, (name, category, t))| ProductStat {
            product_id,
            name,
            category,
            revenue: t.revenue,
            units: t.units,
            orders: t.order_count(),
        })
        .collect();
    products.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));

    let mut categories: Vec<CategoryStat> = categories
        .into_iter()
        .map(|(category, t)| CategoryStat { category, revenue: t.revenue, units: t.units, orders: t.order_count() })
        .collect();
    categories.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.category.as_str().cmp(b.category.as_str())));

    ProductPerformance { period, products, categories }
}

pub fn customer_insights(period: Period, rows: &[SalesRow]) -> CustomerInsights {
    let mut customers: HashMap<Uuid, Tally> = HashMap::new();
    for row in rows.iter().filter(|r| r.is_completed()) {
        customers.entry(row.buyer_id).or_default().add(row);
    }

    let total_customers = customers.len() as i64;
    let repeat_customers = customers.values().filter(|t| t.order_count() >= 2).count() as i64;
    let total_value: Money = customers.values().map(|t| t.revenue).sum();
    let repeat_rate = if total_customers == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(repeat_customers) * Decimal::ONE_HUNDRED / Decimal::from(total_customers)).round_dp(2)
    };

    let mut top_customers: Vec<CustomerStat> = customers
        .into_iter()
        .map(|(buyer_id, t)| CustomerStat { buyer_id, orders: t.order_count(), revenue: t.revenue })
        .collect();
    top_customers.sort_by(|a, b| b.revenue.cmp(&a.revenue).then(a.buyer_id.cmp(&b.buyer_id)));
    top_customers.truncate(TOP_CUSTOMERS);

    CustomerInsights {
        period,
        total_customers,
        repeat_customers,
        new_customers: total_customers - repeat_customers,
        repeat_rate,
        average_customer_value: average(total_value, total_customers),
        top_customers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(order_id: Uuid, buyer_id: Uuid, status: OrderStatus, qty: i32, price: i64) -> SalesRow {
        SalesRow {
            order_id,
            buyer_id,
            status,
            ordered_at: Utc.with_ymd_and_hms(2026, 3, 14, 10, 30, 0).unwrap(),
            product_id: Uuid::nil(),
            product_name: "Ethanol 99%".into(),
            category: ProductCategory::Chemicals,
            quantity: qty,
            price: Money::new(Decimal::from(price)),
            variant_price: None,
            variant_est_price: None,
        }
    }

    fn money(v: i64) -> Money { Money::new(Decimal::from(v)) }

    #[test]
    fn test_only_completed_orders_count() {
        let buyer = Uuid::now_v7();
        let rows = vec![
            row(Uuid::now_v7(), buyer, OrderStatus::Completed, 3, 50),
            row(Uuid::now_v7(), buyer, OrderStatus::Pending, 5, 50),
        ];
        let stats = dashboard_stats(Period::Month, &rows);
        assert_eq!(stats.total_revenue, money(150));
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.units_sold, 3);
        assert_eq!(stats.average_order_value, money(150));
        assert_eq!(stats.status_breakdown.get("pending"), Some(&1));
        assert_eq!(stats.status_breakdown.get("completed"), Some(&1));
        assert_eq!(stats.recent_orders.len(), 1);
    }

    #[test]
    fn test_price_fallback_for_missing_frozen_price() {
        let mut r = row(Uuid::now_v7(), Uuid::now_v7(), OrderStatus::Completed, 2, 0);
        r.variant_est_price = Some(money(30));
        assert_eq!(r.revenue(), money(60));
        r.variant_price = Some(money(40));
        assert_eq!(r.revenue(), money(80));
    }

    #[test]
    fn test_recent_orders_capped_and_newest_first() {
        let buyer = Uuid::now_v7();
        let rows: Vec<SalesRow> = (0..8)
            .map(|i| {
                let mut r = row(Uuid::now_v7(), buyer, OrderStatus::Completed, 1, 10);
                r.ordered_at = r.ordered_at + Duration::hours(i);
                r
            })
            .collect();
        let stats = dashboard_stats(Period::Year, &rows);
        assert_eq!(stats.recent_orders.len(), RECENT_ORDERS);
        assert_eq!(stats.recent_orders[0].ordered_at, rows[7].ordered_at);
    }

    #[test]
    fn test_trends_bucket_by_granularity() {
        let order = Uuid::now_v7();
        let mut a = row(order, Uuid::now_v7(), OrderStatus::Completed, 1, 10);
        let mut b = row(Uuid::now_v7(), Uuid::now_v7(), OrderStatus::Completed, 2, 10);
        a.ordered_at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 5, 0).unwrap();
        b.ordered_at = Utc.with_ymd_and_hms(2026, 3, 20, 23, 59, 0).unwrap();

        let monthly = sales_trends(Period::Year, &[a.clone(), b.clone()]);
        assert_eq!(monthly.granularity, Granularity::Month);
        assert_eq!(monthly.points.len(), 1);
        assert_eq!(monthly.points[0].bucket, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(monthly.points[0].orders, 2);
        assert_eq!(monthly.points[0].revenue, money(30));

        let daily = sales_trends(Period::Month, &[a.clone(), b]);
        assert_eq!(daily.points.len(), 2);

        let hourly = sales_trends(Period::Day, &[a]);
        assert_eq!(hourly.points[0].bucket, Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_product_and_category_rollups() {
        let o1 = Uuid::now_v7();
        let mut reagent = row(o1, Uuid::now_v7(), OrderStatus::Completed, 2, 100);
        reagent.product_id = Uuid::now_v7();
        let mut pipette = row(o1, Uuid::now_v7(), OrderStatus::Completed, 1, 500);
        pipette.product_id = Uuid::now_v7();
        pipette.product_name = "Pipette".into();
        pipette.category = ProductCategory::Instruments;
        let mut again = reagent.clone();
        again.order_id = Uuid::now_v7();

        let perf = product_performance(Period::Month, &[reagent, pipette, again]);
        assert_eq!(perf.products.len(), 2);
        assert_eq!(perf.products[0].name, "Pipette");
        assert_eq!(perf.products[1].units, 4);
        assert_eq!(perf.products[1].orders, 2);
        assert_eq!(perf.categories[0].category, ProductCategory::Instruments);
        assert_eq!(perf.categories[1].revenue, money(400));
    }

    #[test]
    fn test_customer_segmentation() {
        let loyal = Uuid::now_v7();
        let once = Uuid::now_v7();
        let rows = vec![
            row(Uuid::now_v7(), loyal, OrderStatus::Completed, 1, 100),
            row(Uuid::now_v7(), loyal, OrderStatus::Completed, 1, 100),
            row(Uuid::now_v7(), once, OrderStatus::Completed, 1, 100),
            row(Uuid::now_v7(), Uuid::now_v7(), OrderStatus::Cancelled, 1, 100),
        ];
        let insights = customer_insights(Period::Month, &rows);
        assert_eq!(insights.total_customers, 2);
        assert_eq!(insights.repeat_customers, 1);
        assert_eq!(insights.new_customers, 1);
        assert_eq!(insights.repeat_rate, Decimal::from(50));
        assert_eq!(insights.average_customer_value, money(150));
        assert_eq!(insights.top_customers[0].buyer_id, loyal);
    }

    #[test]
    fn test_empty_window() {
        let stats = dashboard_stats(Period::Day, &[]);
        assert_eq!(stats.total_orders, 0);
        assert_eq!(stats.average_order_value, Money::ZERO);
        assert_eq!(customer_insights(Period::Day, &[]).repeat_rate, Decimal::ZERO);
    }
}
