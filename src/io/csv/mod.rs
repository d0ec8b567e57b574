//! CSV tables exchanged between stages.

mod read;
mod write;

pub(crate) use read::*;
pub(crate) use write::*;

/// Demand-side score column written by the opportunity stage.
pub const OPPORTUNITY_COLUMN: &str = "ZEB_Opportunity_Index";

/// Supply-side score column of the paper analysis table.
pub const SUPPLY_COLUMN: &str = "Technology_Supply_Index";
