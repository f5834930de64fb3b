//! Error code vocabularies for the BPS → OPS error mapping (SPEC_FULL.md
//! §4.6). Kept as their own small module because they are referenced from
//! both the wire codec and the order service.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Error codes returned by the external Balance & Payment Service on a
/// failed `LOCK_BALANCE` request. BPS may return codes this system doesn't
/// recognise yet; `Other` preserves them for logging instead of panicking.
///
/// Serialized as its plain wire string (not an externally-tagged enum) so
/// `Other(code)` round-trips as `code` rather than `{"Other": code}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BpsErrorCode {
    AssetNotRelatedToAccount,
    NotExistsAsset,
    NotEnoughBalance,
    Other(String),
}

impl Serialize for BpsErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BpsErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(BpsErrorCode::from(String::deserialize(deserializer)?.as_str()))
    }
}

impl fmt::Display for BpsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BpsErrorCode::AssetNotRelatedToAccount => write!(f, "ASSET_NOT_RELATED_TO_ACCOUNT"),
            BpsErrorCode::NotExistsAsset => write!(f, "NOT_EXISTS_ASSET"),
            BpsErrorCode::NotEnoughBalance => write!(f, "NOT_ENOUGH_BALANCE"),
            BpsErrorCode::Other(code) => write!(f, "{code}"),
        }
    }
}

impl From<&str> for BpsErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "ASSET_NOT_RELATED_TO_ACCOUNT" => BpsErrorCode::AssetNotRelatedToAccount,
            "NOT_EXISTS_ASSET" => BpsErrorCode::NotExistsAsset,
            "NOT_ENOUGH_BALANCE" => BpsErrorCode::NotEnoughBalance,
            other => BpsErrorCode::Other(other.to_string()),
        }
    }
}

/// Error codes this system reports outward in `ORDER_NOTIFICATION` tickets,
/// per the §4.6 mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpsErrorCode {
    AssetNotRelatedToAccount,
    AssetNotExists,
    AssetBalanceNotEnough,
    Internal,
}

impl fmt::Display for OpsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpsErrorCode::AssetNotRelatedToAccount => "ASSET_NOT_RELATED_TO_ACCOUNT",
            OpsErrorCode::AssetNotExists => "ASSET_NOT_EXISTS",
            OpsErrorCode::AssetBalanceNotEnough => "ASSET_BALANCE_NOT_ENOUGH",
            OpsErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

/// §4.6's mapping table, verbatim.
pub fn map_bps_error_code(code: &BpsErrorCode) -> OpsErrorCode {
    match code {
        BpsErrorCode::AssetNotRelatedToAccount => OpsErrorCode::AssetNotRelatedToAccount,
        BpsErrorCode::NotExistsAsset => OpsErrorCode::AssetNotExists,
        BpsErrorCode::NotEnoughBalance => OpsErrorCode::AssetBalanceNotEnough,
        BpsErrorCode::Other(_) => OpsErrorCode::Internal,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsError {
    pub error_code: OpsErrorCode,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_bps_codes() {
        assert_eq!(
            map_bps_error_code(&BpsErrorCode::AssetNotRelatedToAccount),
            OpsErrorCode::AssetNotRelatedToAccount
        );
        assert_eq!(
            map_bps_error_code(&BpsErrorCode::NotExistsAsset),
            OpsErrorCode::AssetNotExists
        );
        assert_eq!(
            map_bps_error_code(&BpsErrorCode::NotEnoughBalance),
            OpsErrorCode::AssetBalanceNotEnough
        );
    }

    #[test]
    fn unknown_bps_code_maps_to_internal() {
        let code = BpsErrorCode::from("SOMETHING_NEW");
        assert_eq!(map_bps_error_code(&code), OpsErrorCode::Internal);
    }
}
