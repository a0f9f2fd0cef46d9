// ABOUTME: Closed option sets for change queries (mode, row filters, LSN operators)
// ABOUTME: Each maps to the literal string the capture functions expect

use clap::ValueEnum;
use serde::Serialize;
use std::fmt;

/// Whether every change or only the net effect per key is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChangeMode {
    All,
    Net,
}

impl ChangeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeMode::All => "all",
            ChangeMode::Net => "net",
        }
    }
}

impl fmt::Display for ChangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row filter accepted by `fn_cdc_get_all_changes_<capture_instance>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum AllChangesFilter {
    /// Only the post-image of updates.
    All,
    /// Both pre- and post-image rows for every update.
    #[default]
    AllUpdateOld,
}

impl AllChangesFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllChangesFilter::All => "all",
            AllChangesFilter::AllUpdateOld => "all update old",
        }
    }
}

/// Row filter accepted by `fn_cdc_get_net_changes_<capture_instance>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum NetChangesFilter {
    All,
    #[default]
    AllWithMask,
    AllWithMerge,
}

impl NetChangesFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetChangesFilter::All => "all",
            NetChangesFilter::AllWithMask => "all with mask",
            NetChangesFilter::AllWithMerge => "all with merge",
        }
    }
}

/// A row filter bound to the mode it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    All(AllChangesFilter),
    Net(NetChangesFilter),
}

impl RowFilter {
    pub fn mode(&self) -> ChangeMode {
        match self {
            RowFilter::All(_) => ChangeMode::All,
            RowFilter::Net(_) => ChangeMode::Net,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RowFilter::All(filter) => filter.as_str(),
            RowFilter::Net(filter) => filter.as_str(),
        }
    }

    /// Default filter for a mode: `all update old` or `all with mask`.
    pub fn default_for(mode: ChangeMode) -> Self {
        match mode {
            ChangeMode::All => RowFilter::All(AllChangesFilter::default()),
            ChangeMode::Net => RowFilter::Net(NetChangesFilter::default()),
        }
    }
}

impl From<AllChangesFilter> for RowFilter {
    fn from(filter: AllChangesFilter) -> Self {
        RowFilter::All(filter)
    }
}

impl From<NetChangesFilter> for RowFilter {
    fn from(filter: NetChangesFilter) -> Self {
        RowFilter::Net(filter)
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison used when mapping a point in time to an LSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RelationalOperator {
    LargestLessThan,
    LargestLessThanOrEqual,
    SmallestGreaterThan,
    SmallestGreaterThanOrEqual,
}

impl RelationalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationalOperator::LargestLessThan => "largest less than",
            RelationalOperator::LargestLessThanOrEqual => "largest less than or equal",
            RelationalOperator::SmallestGreaterThan => "smallest greater than",
            RelationalOperator::SmallestGreaterThanOrEqual => "smallest greater than or equal",
        }
    }
}
