// Configuration for DAO wallets
// Defaults for new treasuries plus naming of wallet records

use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{DaoError, DaoResult};
use crate::wallet::dao_info::{TreasuryRules, MAX_BASIS_POINTS};

#[cfg(test)]
mod tests;

/// Prefix for `DAO_WALLET_*` environment overrides
pub const ENV_PREFIX: &str = "DAO_WALLET";

/// Settings consulted when the host does not pass explicit values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    /// Share of the token supply that must vote, in basis points
    pub attendance_required: u64,

    /// Share of cast votes needed to pass, in basis points
    pub pass_percentage: u64,

    /// Blocks a proposal stays open before it can be closed
    pub proposal_timelock: u64,

    /// Generated wallet names look like `"<prefix> <n>"`
    pub wallet_name_prefix: String,
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self {
            attendance_required: 10,
            pass_percentage: 10,
            proposal_timelock: 10,
            wallet_name_prefix: "Profile".to_string(),
        }
    }
}

impl DaoConfig {
    /// Layer an optional TOML file and `DAO_WALLET_*` environment variables
    /// over the defaults.
    pub fn load(path: Option<&Path>) -> DaoResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("Loading DAO wallet configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let loaded: DaoConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn from_toml_str(contents: &str) -> DaoResult<Self> {
        let parsed: DaoConfig =
            toml::from_str(contents).map_err(|e| DaoError::Config(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> DaoResult<()> {
        if self.attendance_required > MAX_BASIS_POINTS {
            return Err(DaoError::Config(format!(
                "attendance_required {} exceeds {} basis points",
                self.attendance_required, MAX_BASIS_POINTS
            )));
        }
        if self.pass_percentage > MAX_BASIS_POINTS {
            return Err(DaoError::Config(format!(
                "pass_percentage {} exceeds {} basis points",
                self.pass_percentage, MAX_BASIS_POINTS
            )));
        }
        if self.wallet_name_prefix.trim().is_empty() {
            return Err(DaoError::Config("wallet_name_prefix must not be empty".into()));
        }
        if self.proposal_timelock == 0 {
            warn!("proposal_timelock is 0, proposals can be closed in the block they are created");
        }
        Ok(())
    }

    /// Rules for a new treasury issuing `supply` voting tokens
    pub fn default_rules(&self, supply: u64) -> TreasuryRules {
        TreasuryRules {
            supply,
            attendance_required: self.attendance_required,
            pass_percentage: self.pass_percentage,
            proposal_timelock: self.proposal_timelock,
        }
    }
}
