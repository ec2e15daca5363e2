//! Student identity keys used for duplicate detection.
//!
//! Which fields make two students "the same" is a school-level decision, so
//! the key is configurable: email, name + date of birth, or either.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Fields that identify a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentityKey {
    /// Lowercased email address.
    Email,
    /// First name + last name + date of birth.
    NameAndDateOfBirth,
    /// Any of the above: a clash on either counts.
    #[default]
    Any,
}

impl IdentityKey {
    /// Derive the identities a student carries under this key.
    ///
    /// Identities that cannot be built (no email, no date of birth) are
    /// simply absent, so such students never clash on them.
    pub fn identities(
        &self,
        first_name: Option<&str>,
        last_name: Option<&str>,
        email: Option<&str>,
        date_of_birth: Option<NaiveDate>,
    ) -> Vec<Identity> {
        let mut out = Vec::with_capacity(2);

        if matches!(self, IdentityKey::Email | IdentityKey::Any) {
            if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
                out.push(Identity::Email(email.to_lowercase()));
            }
        }

        if matches!(self, IdentityKey::NameAndDateOfBirth | IdentityKey::Any) {
            let first = first_name.map(normalize_name).filter(|n| !n.is_empty());
            let last = last_name.map(normalize_name).filter(|n| !n.is_empty());
            if let (Some(first), Some(last), Some(dob)) = (first, last, date_of_birth) {
                out.push(Identity::NameAndDob { first, last, dob });
            }
        }

        out
    }
}

impl FromStr for IdentityKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "email" => Ok(IdentityKey::Email),
            "name-dob" | "name-and-dob" | "nameanddateofbirth" | "name-and-date-of-birth" => {
                Ok(IdentityKey::NameAndDateOfBirth)
            }
            "any" => Ok(IdentityKey::Any),
            other => Err(format!(
                "unknown identity key '{}' (expected email, name-dob or any)",
                other
            )),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Email => f.write_str("email"),
            IdentityKey::NameAndDateOfBirth => f.write_str("name-dob"),
            IdentityKey::Any => f.write_str("any"),
        }
    }
}

/// A derived identity of a student.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Email(String),
    NameAndDob {
        first: String,
        last: String,
        dob: NaiveDate,
    },
}

impl Identity {
    /// Issue field reported for a clash on this identity.
    pub fn field(&self) -> &'static str {
        match self {
            Identity::Email(_) => "email",
            Identity::NameAndDob { .. } => "name+dateOfBirth",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Email(email) => write!(f, "email {}", email),
            Identity::NameAndDob { first, last, dob } => {
                write!(f, "name {} {} born {}", first, last, dob.format("%Y-%m-%d"))
            }
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identities of every row in one upload, mapped to the rows carrying them.
#[derive(Debug, Clone, Default)]
pub struct UploadIndex {
    rows: HashMap<Identity, Vec<usize>>,
}

impl UploadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `row_number` carries `identity`.
    pub fn insert(&mut self, identity: Identity, row_number: usize) {
        let rows = self.rows.entry(identity).or_default();
        if !rows.contains(&row_number) {
            rows.push(row_number);
        }
    }

    /// Rows other than `row_number` carrying `identity`, ascending.
    pub fn other_rows(&self, identity: &Identity, row_number: usize) -> Vec<usize> {
        let mut rows: Vec<usize> = self
            .rows
            .get(identity)
            .map(|rows| rows.iter().copied().filter(|r| *r != row_number).collect())
            .unwrap_or_default();
        rows.sort_unstable();
        rows
    }
}
