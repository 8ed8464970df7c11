//! Output generation: JSON exports and Markdown reports.
//!
//! # Submodules
//!
//! - [`json`]: per-city snapshots of the stored collection
//! - [`report`]: collection health and scrape-run reports
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 2026-06-15/
//!     ├── toronto.json
//!     └── vancouver.json
//!
//! report.md                  # `report --output` or `scrape --report`
//! ```

pub mod json;
pub mod report;
