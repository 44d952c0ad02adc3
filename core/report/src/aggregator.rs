//! Fixed row layout for report sections.
//!
//! A standalone section matrix reads:
//!
//! ```text
//! <section title>                 header
//! <blank>                         header
//! <label>, <value>                one row per summary metric
//! <blank>
//! <table label>                   repeated per sub-table
//! <column>, <column>, ...
//! <row cells> ...
//! ```
//!
//! Every sub-table is emitted, even when it has no rows, so positions only
//! depend on the shape of the input.

use chrono::{DateTime, Utc};

use reportsync_common::{CellValue, Result, SheetMatrix};

use crate::model::{
    AnalyticsReport, FinancialReport, InventoryReport, PerformanceReport, ReportBundle,
    SalesReport, SectionKind,
};

/// Rows at the top of a standalone section that `combine_all` strips.
pub const SECTION_HEADER_ROWS: usize = 2;

/// Sheet title of the combined matrix.
pub const SUMMARY_SHEET: &str = "Summary";

/// A labeled sub-table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Line printed above the column header.
    pub label: &'static str,
    /// Column names.
    pub columns: &'static [&'static str],
    /// Data rows.
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    fn new(label: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            label,
            columns,
            rows: Vec::new(),
        }
    }

    fn rows<T>(mut self, items: &[T], row: impl Fn(&T) -> Vec<CellValue>) -> Self {
        self.rows = items.iter().map(row).collect();
        self
    }
}

/// A report section that can be laid out as a matrix.
pub trait ReportSection {
    /// Which section this is.
    fn kind(&self) -> SectionKind;

    /// Summary metrics, in display order.
    fn summary(&self) -> Vec<(&'static str, CellValue)>;

    /// Sub-tables, in display order.
    fn tables(&self) -> Vec<Table>;
}

/// Cover of a combined report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverInfo {
    /// Document title.
    pub title: String,
    /// Generation time, printed once on the cover.
    pub generated_at: DateTime<Utc>,
}

impl CoverInfo {
    /// Create a cover with an explicit timestamp.
    pub fn new(title: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            generated_at,
        }
    }

    /// Create a cover stamped with the current time.
    pub fn now(title: impl Into<String>) -> Self {
        Self::new(title, Utc::now())
    }
}

/// Turns report sections into spreadsheet matrices.
pub struct ReportAggregator;

impl ReportAggregator {
    /// Lay out one section as its own sheet.
    pub fn to_matrix(section: &dyn ReportSection) -> Result<SheetMatrix> {
        let kind = section.kind();
        let mut rows = vec![vec![CellValue::text(kind.title())], Vec::new()];
        rows.extend(Self::body(section));
        SheetMatrix::new(kind.sheet_name(), rows)
    }

    /// Lay out every present section under one cover, in bundle order.
    ///
    /// Section headers are replaced by a single divider row carrying the
    /// section name.
    pub fn combine_all(bundle: &ReportBundle, cover: &CoverInfo) -> Result<SheetMatrix> {
        let sections = Self::sections(bundle);

        let mut rows = vec![
            vec![CellValue::text(cover.title.clone())],
            vec![
                CellValue::text("Generated"),
                CellValue::text(cover.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            ],
            Vec::new(),
        ];

        for section in &sections {
            let standalone = Self::to_matrix(*section)?.into_rows();
            rows.push(vec![CellValue::text(section.kind().sheet_name())]);
            rows.extend(standalone.into_iter().skip(SECTION_HEADER_ROWS));
            rows.push(Vec::new());
        }

        rows.push(vec![
            CellValue::text("End of report"),
            CellValue::from(sections.len() as u32),
            CellValue::text(if sections.len() == 1 { "section" } else { "sections" }),
        ]);

        SheetMatrix::new(SUMMARY_SHEET, rows)
    }

    /// Present sections, in bundle order.
    pub fn sections(bundle: &ReportBundle) -> Vec<&dyn ReportSection> {
        let mut sections: Vec<&dyn ReportSection> = Vec::new();
        if let Some(s) = &bundle.sales {
            sections.push(s);
        }
        if let Some(s) = &bundle.financial {
            sections.push(s);
        }
        if let Some(s) = &bundle.inventory {
            sections.push(s);
        }
        if let Some(s) = &bundle.performance {
            sections.push(s);
        }
        if let Some(s) = &bundle.analytics {
            sections.push(s);
        }
        sections
    }

    fn body(section: &dyn ReportSection) -> Vec<Vec<CellValue>> {
        let mut rows: Vec<Vec<CellValue>> = section
            .summary()
            .into_iter()
            .map(|(label, value)| vec![CellValue::text(label), value])
            .collect();

        for table in section.tables() {
            rows.push(Vec::new());
            rows.push(vec![CellValue::text(table.label)]);
            rows.push(table.columns.iter().map(|c| CellValue::text(*c)).collect());
            rows.extend(table.rows);
        }
        rows
    }
}

fn t(value: &str) -> CellValue {
    CellValue::text(value)
}

fn n(value: f64) -> CellValue {
    CellValue::Number(value)
}

fn c(value: u32) -> CellValue {
    CellValue::from(value)
}

impl ReportSection for SalesReport {
    fn kind(&self) -> SectionKind {
        SectionKind::Sales
    }

    fn summary(&self) -> Vec<(&'static str, CellValue)> {
        let s = &self.summary;
        vec![
            ("Total Sales", c(s.total_sales)),
            ("Total Revenue", n(s.total_revenue)),
            ("Total Profit", n(s.total_profit)),
            ("Average Order Value", n(s.average_order_value)),
            ("Conversion Rate", n(s.conversion_rate)),
            ("Total Customers", c(s.total_customers)),
            ("New Customers", c(s.new_customers)),
            ("Returning Customers", c(s.returning_customers)),
        ]
    }

    fn tables(&self) -> Vec<Table> {
        vec![
            Table::new("Sales by Category", &["Category", "Sales", "Revenue", "Percentage"])
                .rows(&self.sales_by_category, |r| {
                    vec![t(&r.category), c(r.sales), n(r.revenue), n(r.percentage)]
                }),
            Table::new("Sales by Model", &["Model", "Brand", "Sales", "Revenue", "Profit"])
                .rows(&self.sales_by_model, |r| {
                    vec![t(&r.model), t(&r.brand), c(r.sales), n(r.revenue), n(r.profit)]
                }),
            Table::new("Sales by Region", &["Region", "Sales", "Revenue", "Customers"])
                .rows(&self.sales_by_region, |r| {
                    vec![t(&r.region), c(r.sales), n(r.revenue), c(r.customers)]
                }),
            Table::new("Top Salespersons", &["Name", "Sales", "Revenue", "Commission"])
                .rows(&self.top_salespersons, |r| {
                    vec![t(&r.name), c(r.sales), n(r.revenue), n(r.commission)]
                }),
        ]
    }
}

impl ReportSection for FinancialReport {
    fn kind(&self) -> SectionKind {
        SectionKind::Financial
    }

    fn summary(&self) -> Vec<(&'static str, CellValue)> {
        let s = &self.summary;
        vec![
            ("Total Revenue", n(s.total_revenue)),
            ("Total Expenses", n(s.total_expenses)),
            ("Net Profit", n(s.net_profit)),
            ("Gross Margin", n(s.gross_margin)),
            ("Operating Margin", n(s.operating_margin)),
            ("Net Margin", n(s.net_margin)),
            ("Cash Flow", n(s.cash_flow)),
            ("Accounts Receivable", n(s.accounts_receivable)),
            ("Accounts Payable", n(s.accounts_payable)),
        ]
    }

    fn tables(&self) -> Vec<Table> {
        vec![
            Table::new("Revenue Breakdown", &["Source", "Amount", "Percentage"])
                .rows(&self.revenue_breakdown, |r| {
                    vec![t(&r.source), n(r.amount), n(r.percentage)]
                }),
            Table::new(
                "Expense Breakdown",
                &["Category", "Amount", "Percentage", "Budget", "Variance"],
            )
            .rows(&self.expense_breakdown, |r| {
                vec![
                    t(&r.category),
                    n(r.amount),
                    n(r.percentage),
                    n(r.budget),
                    n(r.variance),
                ]
            }),
            Table::new(
                "Profit and Loss",
                &["Period", "Revenue", "Expenses", "Profit", "Margin"],
            )
            .rows(&self.profit_loss, |r| {
                vec![
                    t(&r.period),
                    n(r.revenue),
                    n(r.expenses),
                    n(r.profit),
                    n(r.margin),
                ]
            }),
            Table::new(
                "Budget Comparison",
                &["Category", "Budgeted", "Actual", "Variance", "Variance %"],
            )
            .rows(&self.budget_comparison, |r| {
                vec![
                    t(&r.category),
                    n(r.budgeted),
                    n(r.actual),
                    n(r.variance),
                    n(r.variance_percentage),
                ]
            }),
        ]
    }
}

impl ReportSection for InventoryReport {
    fn kind(&self) -> SectionKind {
        SectionKind::Inventory
    }

    fn summary(&self) -> Vec<(&'static str, CellValue)> {
        let s = &self.summary;
        vec![
            ("Total Vehicles", c(s.total_vehicles)),
            ("Total Value", n(s.total_value)),
            ("Average Age (days)", n(s.average_age)),
            ("Turnover Rate", n(s.turnover_rate)),
            ("Stockout Rate", n(s.stockout_rate)),
            ("Excess Inventory Value", n(s.excess_inventory_value)),
        ]
    }

    fn tables(&self) -> Vec<Table> {
        vec![
            Table::new("Inventory by Category", &["Category", "Count", "Value", "Percentage"])
                .rows(&self.inventory_by_category, |r| {
                    vec![t(&r.category), c(r.count), n(r.value), n(r.percentage)]
                }),
            Table::new(
                "Inventory by Brand",
                &["Brand", "Count", "Value", "Average Age", "Turnover Rate"],
            )
            .rows(&self.inventory_by_brand, |r| {
                vec![
                    t(&r.brand),
                    c(r.count),
                    n(r.value),
                    n(r.average_age),
                    n(r.turnover_rate),
                ]
            }),
            Table::new("Aging Analysis", &["Age Range", "Count", "Value", "Percentage"])
                .rows(&self.aging_analysis, |r| {
                    vec![t(&r.age_range), c(r.count), n(r.value), n(r.percentage)]
                }),
            Table::new(
                "Stock Alerts",
                &["Type", "Model", "Current Stock", "Recommended Stock", "Priority"],
            )
            .rows(&self.stock_alerts, |r| {
                vec![
                    t(&r.kind),
                    t(&r.model),
                    c(r.current_stock),
                    c(r.recommended_stock),
                    t(&r.priority),
                ]
            }),
        ]
    }
}

impl ReportSection for PerformanceReport {
    fn kind(&self) -> SectionKind {
        SectionKind::Performance
    }

    fn summary(&self) -> Vec<(&'static str, CellValue)> {
        let s = &self.summary;
        vec![
            ("Total Employees", c(s.total_employees)),
            ("Average Performance Score", n(s.average_performance_score)),
            ("Top Performers", c(s.top_performer_count)),
            ("Improvement Needed", c(s.improvement_needed_count)),
            ("Training Completion Rate", n(s.training_completion_rate)),
            ("Customer Satisfaction Score", n(s.customer_satisfaction_score)),
        ]
    }

    fn tables(&self) -> Vec<Table> {
        vec![
            Table::new(
                "Sales Performance",
                &[
                    "Employee ID",
                    "Name",
                    "Department",
                    "Target",
                    "Actual",
                    "Achievement",
                    "Ranking",
                ],
            )
            .rows(&self.sales_performance, |r| {
                vec![
                    t(&r.employee_id),
                    t(&r.name),
                    t(&r.department),
                    n(r.sales_target),
                    n(r.actual_sales),
                    n(r.achievement),
                    c(r.ranking),
                ]
            }),
            Table::new(
                "Department Performance",
                &[
                    "Department",
                    "Employees",
                    "Average Score",
                    "Top Performers",
                    "Training Hours",
                    "Customer Rating",
                ],
            )
            .rows(&self.department_performance, |r| {
                vec![
                    t(&r.department),
                    c(r.employee_count),
                    n(r.average_score),
                    c(r.top_performers),
                    n(r.training_hours),
                    n(r.customer_rating),
                ]
            }),
            Table::new(
                "KPI Metrics",
                &["KPI", "Target", "Actual", "Unit", "Status", "Trend"],
            )
            .rows(&self.kpi_metrics, |r| {
                vec![
                    t(&r.kpi),
                    n(r.target),
                    n(r.actual),
                    t(&r.unit),
                    t(&r.status),
                    n(r.trend),
                ]
            }),
        ]
    }
}

impl ReportSection for AnalyticsReport {
    fn kind(&self) -> SectionKind {
        SectionKind::Analytics
    }

    fn summary(&self) -> Vec<(&'static str, CellValue)> {
        vec![
            ("Visitors", c(self.funnel.visitors)),
            ("Leads", c(self.funnel.leads)),
            ("Customers", c(self.funnel.customers)),
            ("Active Customers", c(self.customers.active)),
            ("New Customers", c(self.customers.new)),
            ("Returning Customers", c(self.customers.returning)),
            ("Churned Customers", c(self.customers.churn)),
            ("Average Rating", n(self.customers.rating)),
            ("NPS", n(self.customers.nps)),
            ("CSAT", n(self.customers.csat)),
            (
                "Average Session Duration (s)",
                n(self.engagement.average_session_duration),
            ),
            ("Pages per Session", n(self.engagement.pages_per_session)),
            ("Bounce Rate", n(self.engagement.bounce_rate)),
        ]
    }

    fn tables(&self) -> Vec<Table> {
        vec![Table::new(
            "Channels",
            &["Channel", "Visitors", "Conversions", "Revenue", "Cost", "ROI"],
        )
        .rows(&self.channels, |r| {
            vec![
                t(&r.channel),
                c(r.visitors),
                c(r.conversions),
                n(r.revenue),
                n(r.cost),
                n(r.roi),
            ]
        })]
    }
}
