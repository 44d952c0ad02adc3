//! Report models and their spreadsheet layout.
//!
//! This crate is pure: it turns domain report sections into [`SheetMatrix`]
//! values and never touches the network. Identical input always yields an
//! identical matrix; the only timestamp lives in the caller-supplied cover.
//!
//! [`SheetMatrix`]: reportsync_common::SheetMatrix

pub mod aggregator;
pub mod model;

pub use aggregator::{
    CoverInfo, ReportAggregator, ReportSection, Table, SECTION_HEADER_ROWS, SUMMARY_SHEET,
};
pub use model::{
    AnalyticsReport, FinancialReport, InventoryReport, PerformanceReport, ReportBundle,
    SalesReport, SectionKind,
};
