use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope wrapping every beaconcha.in response.
#[derive(Debug, Clone, Deserialize)]
pub struct Response<T> {
    pub status: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Validator {
    #[serde(rename = "activationeligibilityepoch", default)]
    pub activation_eligibility_epoch: i64,
    #[serde(rename = "activationepoch", default)]
    pub activation_epoch: i64,
    #[serde(default)]
    pub balance: i64,
    #[serde(rename = "effectivebalance", default)]
    pub effective_balance: i64,
    #[serde(rename = "exitepoch", default)]
    pub exit_epoch: i64,
    #[serde(rename = "lastattestationslot", default)]
    pub last_attestation_slot: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub slashed: bool,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "validatorindex", default)]
    pub validator_index: i64,
    #[serde(rename = "withdrawableepoch", default)]
    pub withdrawable_epoch: i64,
    #[serde(rename = "withdrawalcredentials", default)]
    pub withdrawal_credentials: String,
    #[serde(rename = "total_withdrawals", default)]
    pub total_withdrawals: i64,
}

#[derive(Debug, Error)]
pub enum CredentialParseError {
    #[error("withdrawal credentials {value:?} shorter than 4 characters")]
    TooShort { value: String },
    #[error("invalid withdrawal credential prefix {prefix:?}: {source}")]
    Invalid {
        prefix: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

impl Validator {
    pub fn is_exited(&self) -> bool {
        self.status == "exited"
    }

    /// Withdrawal type code decoded from the first 4 characters of the
    /// credential string.
    pub fn withdrawal_credentials_code(&self) -> Result<i64, CredentialParseError> {
        let prefix = self
            .withdrawal_credentials
            .get(..4)
            .ok_or_else(|| CredentialParseError::TooShort {
                value: self.withdrawal_credentials.clone(),
            })?;

        parse_prefixed_int(prefix).map_err(|source| CredentialParseError::Invalid {
            prefix: prefix.to_string(),
            source,
        })
    }
}

/// Parse an integer whose base is announced by its prefix: `0x` hex,
/// `0b` binary, `0o` octal, a remaining leading zero also octal,
/// decimal otherwise.
fn parse_prefixed_int(s: &str) -> Result<i64, std::num::ParseIntError> {
    let lower = s.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8)
    } else if lower.len() > 1 && lower.starts_with('0') {
        i64::from_str_radix(&lower[1..], 8)
    } else {
        lower.parse()
    }
}
