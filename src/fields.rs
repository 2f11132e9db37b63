//! The fixed enumeration of candidate profile attributes that can be
//! independently granted, and the sets of them carried on consent requests.
//!
//! Field sets are persisted as space-separated canonical names, the same way
//! OAuth scope strings are stored, so `FieldSet` round-trips through a single
//! string column.

use crate::errors::ConsentError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    FullName,
    Email,
    Phone,
    Location,
    Headline,
    About,
    Education,
    Experience,
    Skills,
    Documents,
}

impl ProfileField {
    pub const ALL: [ProfileField; 10] = [
        ProfileField::FullName,
        ProfileField::Email,
        ProfileField::Phone,
        ProfileField::Location,
        ProfileField::Headline,
        ProfileField::About,
        ProfileField::Education,
        ProfileField::Experience,
        ProfileField::Skills,
        ProfileField::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::FullName => "full_name",
            ProfileField::Email => "email",
            ProfileField::Phone => "phone",
            ProfileField::Location => "location",
            ProfileField::Headline => "headline",
            ProfileField::About => "about",
            ProfileField::Education => "education",
            ProfileField::Experience => "experience",
            ProfileField::Skills => "skills",
            ProfileField::Documents => "documents",
        }
    }

    pub fn parse(name: &str) -> Option<ProfileField> {
        match name {
            "full_name" => Some(ProfileField::FullName),
            "email" => Some(ProfileField::Email),
            "phone" => Some(ProfileField::Phone),
            "location" => Some(ProfileField::Location),
            "headline" => Some(ProfileField::Headline),
            "about" => Some(ProfileField::About),
            "education" => Some(ProfileField::Education),
            "experience" => Some(ProfileField::Experience),
            "skills" => Some(ProfileField::Skills),
            "documents" => Some(ProfileField::Documents),
            _ => None,
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, duplicate-free set of profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldSet(BTreeSet<ProfileField>);

impl FieldSet {
    /// Parse a list of externally supplied field names. Fails closed on the
    /// first name outside the fixed enumeration.
    pub fn from_names<I, S>(names: I) -> Result<FieldSet, ConsentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            match ProfileField::parse(name) {
                Some(field) => {
                    set.insert(field);
                }
                None => return Err(ConsentError::UnknownField(name.to_string())),
            }
        }
        Ok(FieldSet(set))
    }

    /// Parse the space-separated storage form.
    pub fn from_storage(stored: &str) -> Result<FieldSet, ConsentError> {
        FieldSet::from_names(stored.split_whitespace())
    }

    /// Canonical storage form: sorted, space-separated names.
    pub fn to_storage(&self) -> String {
        self.0
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn all() -> FieldSet {
        FieldSet(ProfileField::ALL.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: ProfileField) -> bool {
        self.0.contains(&field)
    }

    pub fn is_subset(&self, other: &FieldSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = ProfileField> + '_ {
        self.0.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|f| f.as_str()).collect()
    }
}

impl FromIterator<ProfileField> for FieldSet {
    fn from_iter<I: IntoIterator<Item = ProfileField>>(iter: I) -> Self {
        FieldSet(iter.into_iter().collect())
    }
}
