//! Field-scoped profile projection.
//!
//! `project` is a pure function from a full snapshot and a granted field set
//! to the partial view a company is allowed to see. Ungranted attributes are
//! omitted from the serialized output entirely (`None` is skipped), never
//! nulled, so the receiver cannot distinguish "empty" from "not granted".
//! Composite fields (education, experience, skills, documents) are included
//! or excluded as whole units.

use crate::fields::{FieldSet, ProfileField};
use serde::{Deserialize, Serialize};

/// The candidate's full profile as the consent subsystem sees it. Owned and
/// mutated elsewhere; read-only input here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub candidate_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub headline: Option<String>,
    pub about: Option<String>,
    pub education: Vec<Education>,
    pub experience: Vec<Experience>,
    pub skills: Vec<Skill>,
    pub documents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: Option<String>,
    pub field_of_study: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    pub company_name: String,
    pub role: String,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub current: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub category: Option<String>,
    pub proficiency: Option<String>,
}

/// Redacted view of a profile. Every attribute is optional and absent from
/// the JSON output unless its field was granted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education: Option<Vec<Education>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<Vec<Experience>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<Skill>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<String>>,
}

/// Project a snapshot down to the granted fields. Pure: same inputs, same
/// output.
pub fn project(profile: &ProfileSnapshot, fields: &FieldSet) -> PartialProfile {
    let mut view = PartialProfile::default();
    for field in fields.iter() {
        match field {
            ProfileField::FullName => view.full_name = Some(profile.full_name.clone()),
            ProfileField::Email => view.email = Some(profile.email.clone()),
            ProfileField::Phone => view.phone = profile.phone.clone(),
            ProfileField::Location => view.location = profile.location.clone(),
            ProfileField::Headline => view.headline = profile.headline.clone(),
            ProfileField::About => view.about = profile.about.clone(),
            ProfileField::Education => view.education = Some(profile.education.clone()),
            ProfileField::Experience => view.experience = Some(profile.experience.clone()),
            ProfileField::Skills => view.skills = Some(profile.skills.clone()),
            ProfileField::Documents => view.documents = Some(profile.documents.clone()),
        }
    }
    view
}
