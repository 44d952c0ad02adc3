//! Domain report sections as produced by the dashboard.
//!
//! Field names follow the dashboard's camelCase JSON so exported payloads can
//! be read directly. Every table defaults to empty.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which section of a bundle a matrix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Sales,
    Financial,
    Inventory,
    Performance,
    Analytics,
}

impl SectionKind {
    /// Every kind, in bundle order.
    pub const ALL: [SectionKind; 5] = [
        SectionKind::Sales,
        SectionKind::Financial,
        SectionKind::Inventory,
        SectionKind::Performance,
        SectionKind::Analytics,
    ];

    /// Sheet title used when the section is exported on its own.
    pub fn sheet_name(&self) -> &'static str {
        match self {
            SectionKind::Sales => "Sales",
            SectionKind::Financial => "Financial",
            SectionKind::Inventory => "Inventory",
            SectionKind::Performance => "Performance",
            SectionKind::Analytics => "Analytics",
        }
    }

    /// Header line of the standalone section.
    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::Sales => "Sales Report Summary",
            SectionKind::Financial => "Financial Report Summary",
            SectionKind::Inventory => "Inventory Report Summary",
            SectionKind::Performance => "Performance Report Summary",
            SectionKind::Analytics => "Analytics Report Summary",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sheet_name())
    }
}

/// A set of independently optional report sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBundle {
    #[serde(default)]
    pub sales: Option<SalesReport>,
    #[serde(default)]
    pub financial: Option<FinancialReport>,
    #[serde(default)]
    pub inventory: Option<InventoryReport>,
    #[serde(default)]
    pub performance: Option<PerformanceReport>,
    #[serde(default)]
    pub analytics: Option<AnalyticsReport>,
}

impl ReportBundle {
    /// Check if no section is present.
    pub fn is_empty(&self) -> bool {
        self.sales.is_none()
            && self.financial.is_none()
            && self.inventory.is_none()
            && self.performance.is_none()
            && self.analytics.is_none()
    }

    /// Kinds of the sections present, in bundle order.
    pub fn kinds(&self) -> Vec<SectionKind> {
        SectionKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                SectionKind::Sales => self.sales.is_some(),
                SectionKind::Financial => self.financial.is_some(),
                SectionKind::Inventory => self.inventory.is_some(),
                SectionKind::Performance => self.performance.is_some(),
                SectionKind::Analytics => self.analytics.is_some(),
            })
            .collect()
    }
}

// ==================== Sales ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalesReport {
    pub summary: SalesSummary,
    pub sales_by_category: Vec<CategorySales>,
    pub sales_by_model: Vec<ModelSales>,
    pub sales_by_region: Vec<RegionSales>,
    pub top_salespersons: Vec<SalespersonSales>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalesSummary {
    pub total_sales: u32,
    pub total_revenue: f64,
    pub total_profit: f64,
    pub average_order_value: f64,
    /// Percentage.
    pub conversion_rate: f64,
    pub total_customers: u32,
    pub new_customers: u32,
    pub returning_customers: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategorySales {
    pub category: String,
    pub sales: u32,
    pub revenue: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSales {
    pub model: String,
    pub brand: String,
    pub sales: u32,
    pub revenue: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegionSales {
    pub region: String,
    pub sales: u32,
    pub revenue: f64,
    pub customers: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalespersonSales {
    pub name: String,
    pub sales: u32,
    pub revenue: f64,
    pub commission: f64,
}

// ==================== Financial ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinancialReport {
    pub summary: FinancialSummary,
    pub revenue_breakdown: Vec<RevenueLine>,
    pub expense_breakdown: Vec<ExpenseLine>,
    pub profit_loss: Vec<ProfitLossLine>,
    pub budget_comparison: Vec<BudgetLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinancialSummary {
    pub total_revenue: f64,
    pub total_expenses: f64,
    pub net_profit: f64,
    pub gross_margin: f64,
    pub operating_margin: f64,
    pub net_margin: f64,
    pub cash_flow: f64,
    pub accounts_receivable: f64,
    pub accounts_payable: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RevenueLine {
    pub source: String,
    pub amount: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpenseLine {
    pub category: String,
    pub amount: f64,
    pub percentage: f64,
    pub budget: f64,
    pub variance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfitLossLine {
    pub period: String,
    pub revenue: f64,
    pub expenses: f64,
    pub profit: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BudgetLine {
    pub category: String,
    pub budgeted: f64,
    pub actual: f64,
    pub variance: f64,
    pub variance_percentage: f64,
}

// ==================== Inventory ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryReport {
    pub summary: InventorySummary,
    pub inventory_by_category: Vec<InventoryCategory>,
    pub inventory_by_brand: Vec<InventoryBrand>,
    pub aging_analysis: Vec<AgingBucket>,
    pub stock_alerts: Vec<StockAlert>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventorySummary {
    pub total_vehicles: u32,
    pub total_value: f64,
    /// Days.
    pub average_age: f64,
    pub turnover_rate: f64,
    pub stockout_rate: f64,
    pub excess_inventory_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryCategory {
    pub category: String,
    pub count: u32,
    pub value: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryBrand {
    pub brand: String,
    pub count: u32,
    pub value: f64,
    pub average_age: f64,
    pub turnover_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgingBucket {
    /// e.g. "0-30 days".
    pub age_range: String,
    pub count: u32,
    pub value: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StockAlert {
    /// `low_stock`, `overstock` or `obsolete`.
    #[serde(rename = "type")]
    pub kind: String,
    pub model: String,
    pub current_stock: u32,
    pub recommended_stock: u32,
    pub priority: String,
}

// ==================== Performance ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceReport {
    pub summary: PerformanceSummary,
    pub sales_performance: Vec<EmployeePerformance>,
    pub department_performance: Vec<DepartmentPerformance>,
    pub kpi_metrics: Vec<KpiMetric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceSummary {
    pub total_employees: u32,
    pub average_performance_score: f64,
    pub top_performer_count: u32,
    pub improvement_needed_count: u32,
    pub training_completion_rate: f64,
    pub customer_satisfaction_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmployeePerformance {
    pub employee_id: String,
    pub name: String,
    pub department: String,
    pub sales_target: f64,
    pub actual_sales: f64,
    /// Percentage of target.
    pub achievement: f64,
    pub ranking: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DepartmentPerformance {
    pub department: String,
    pub employee_count: u32,
    pub average_score: f64,
    pub top_performers: u32,
    pub training_hours: f64,
    pub customer_rating: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KpiMetric {
    pub kpi: String,
    pub target: f64,
    pub actual: f64,
    pub unit: String,
    /// `on_track`, `at_risk` or `behind`.
    pub status: String,
    /// Percentage change.
    pub trend: f64,
}

// ==================== Analytics ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsReport {
    pub funnel: FunnelSummary,
    pub customers: CustomerSummary,
    pub engagement: EngagementSummary,
    pub channels: Vec<ChannelMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunnelSummary {
    pub visitors: u32,
    pub leads: u32,
    pub customers: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerSummary {
    pub active: u32,
    pub new: u32,
    pub returning: u32,
    pub churn: u32,
    pub rating: f64,
    pub nps: f64,
    pub csat: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngagementSummary {
    /// Seconds.
    pub average_session_duration: f64,
    pub pages_per_session: f64,
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelMetrics {
    pub channel: String,
    pub visitors: u32,
    pub conversions: u32,
    pub revenue: f64,
    pub cost: f64,
    pub roi: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_reads_dashboard_json() {
        let bundle: ReportBundle = serde_json::from_value(serde_json::json!({
            "sales": {
                "summary": { "totalSales": 42, "totalRevenue": 1250000000.0 },
                "salesByCategory": [
                    { "category": "SUV", "sales": 20, "revenue": 700000000.0, "percentage": 47.6 }
                ]
            },
            "inventory": {
                "stockAlerts": [
                    { "type": "low_stock", "model": "Avanza", "currentStock": 1,
                      "recommendedStock": 5, "priority": "high" }
                ]
            }
        }))
        .unwrap();

        let sales = bundle.sales.as_ref().unwrap();
        assert_eq!(sales.summary.total_sales, 42);
        assert_eq!(sales.sales_by_category[0].category, "SUV");
        assert!(sales.top_salespersons.is_empty());

        let inventory = bundle.inventory.as_ref().unwrap();
        assert_eq!(inventory.stock_alerts[0].kind, "low_stock");

        assert_eq!(
            bundle.kinds(),
            vec![SectionKind::Sales, SectionKind::Inventory]
        );
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = ReportBundle::default();
        assert!(bundle.is_empty());
        assert!(bundle.kinds().is_empty());
    }

    #[test]
    fn test_section_kind_names() {
        assert_eq!(SectionKind::Financial.sheet_name(), "Financial");
        assert_eq!(SectionKind::Sales.title(), "Sales Report Summary");
        assert_eq!(SectionKind::Analytics.to_string(), "Analytics");
        assert_eq!(
            serde_json::to_string(&SectionKind::Performance).unwrap(),
            "\"performance\""
        );
    }
}
