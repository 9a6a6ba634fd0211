//! The closed set of tables exposed by the viewer.

use std::fmt;
use std::str::FromStr;

use crate::errors::ServiceError;

/// Column holding the trade date in every output table.
pub const TRADE_DATE_COLUMN: &str = "TradDt";

/// Column holding the ticker symbol in every output table.
pub const SYMBOL_COLUMN: &str = "TckrSymb";

/// A browsable table. Each variant maps to exactly one Postgres relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalTable {
    CmOutput,
    FnoOutput,
}

impl LogicalTable {
    pub const ALL: [LogicalTable; 2] = [LogicalTable::CmOutput, LogicalTable::FnoOutput];

    /// Name used by callers (URLs, API payloads, export file names).
    pub fn name(self) -> &'static str {
        match self {
            LogicalTable::CmOutput => "CM_Output",
            LogicalTable::FnoOutput => "FnO_Output",
        }
    }

    /// Quoted relation identifier, ready to splice into SQL.
    pub fn relation(self) -> &'static str {
        match self {
            LogicalTable::CmOutput => r#""CM_Output""#,
            LogicalTable::FnoOutput => r#""FnO_Output""#,
        }
    }
}

impl fmt::Display for LogicalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicalTable {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalTable::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| ServiceError::InvalidTable(s.to_string()))
    }
}
