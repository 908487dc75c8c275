use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Senders permitted to talk to the assistant.
///
/// Configured as either `false` (everyone is admitted) or a list of sender ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AllowlistSetting", into = "AllowlistSetting")]
pub enum Allowlist {
    Disabled,
    Only(BTreeSet<String>),
}

impl Allowlist {
    pub fn only<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(senders.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn is_allowed(&self, sender: &str) -> bool {
        match self {
            Self::Disabled => true,
            Self::Only(senders) => senders.contains(sender),
        }
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::Only(BTreeSet::new())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AllowlistSetting {
    Flag(bool),
    Senders(BTreeSet<String>),
}

impl TryFrom<AllowlistSetting> for Allowlist {
    type Error = String;

    fn try_from(setting: AllowlistSetting) -> Result<Self, Self::Error> {
        match setting {
            AllowlistSetting::Flag(false) => Ok(Self::Disabled),
            AllowlistSetting::Flag(true) => {
                Err("allowlist must be `false` or a list of sender ids".to_string())
            }
            AllowlistSetting::Senders(senders) => Ok(Self::Only(senders)),
        }
    }
}

impl From<Allowlist> for AllowlistSetting {
    fn from(allowlist: Allowlist) -> Self {
        match allowlist {
            Allowlist::Disabled => Self::Flag(false),
            Allowlist::Only(senders) => Self::Senders(senders),
        }
    }
}
