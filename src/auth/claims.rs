//! The closed set of authorization claims a user can hold.

use std::{collections::BTreeMap, fmt};

use lazy_static::lazy_static;

use super::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Claim {
    Admin = 0,
    Operator = 1,
}

impl Claim {
    pub const ALL: [Claim; 2] = [Claim::Admin, Claim::Operator];

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Name used in listings and as the token flag key.
    pub fn name(self) -> &'static str {
        match self {
            Claim::Admin => "admin",
            Claim::Operator => "operator",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl TryFrom<i32> for Claim {
    type Error = AuthError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(AuthError::InvalidClaim(code))
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

lazy_static! {
    static ref CLAIM_NAMES: BTreeMap<i32, &'static str> =
        Claim::ALL.iter().map(|c| (c.code(), c.name())).collect();
}

/// Fails on the first code, in order, that is not a known claim.
pub fn validate_all(claims: &[i32]) -> Result<(), AuthError> {
    for &code in claims {
        Claim::try_from(code)?;
    }
    Ok(())
}

/// Every valid claim code with its name.
pub fn all_claims() -> &'static BTreeMap<i32, &'static str> {
    &CLAIM_NAMES
}
