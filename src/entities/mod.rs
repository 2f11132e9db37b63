pub mod candidate_profile;
pub mod consent_request;

pub use candidate_profile::Entity as CandidateProfile;
pub use consent_request::Entity as ConsentRequest;
