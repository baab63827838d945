use serde::{Deserialize, Serialize};

/// One company's financial ratios, in the exact column order the
/// classifier was fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub gross_margin_ratio: f64,
    pub core_income_ratio: f64,
    pub cash_asset_ratio: f64,
    pub consolidated_liabilities_ratio: f64,
    pub tangible_assets_ratio: f64,
    pub revenues: f64,
}

impl Company {
    /// Column order of the training data.
    pub const FIELDS: [&'static str; 6] = [
        "gross_margin_ratio",
        "core_income_ratio",
        "cash_asset_ratio",
        "consolidated_liabilities_ratio",
        "tangible_assets_ratio",
        "revenues",
    ];

    pub fn as_row(&self) -> [f64; 6] {
        [
            self.gross_margin_ratio,
            self.core_income_ratio,
            self.cash_asset_ratio,
            self.consolidated_liabilities_ratio,
            self.tangible_assets_ratio,
            self.revenues,
        ]
    }
}
