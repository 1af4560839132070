//! Job board payloads

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPost {
    pub id: u64,
    pub company_name: String,
    pub company_id: String,
    pub created_at: String,
    pub name: String,
    #[serde(default)]
    pub photo_id: Option<String>,
    #[serde(default)]
    pub banner_id: Option<String>,
    pub position: String,
    pub duration: String,
    pub description: String,
    pub location: String,
    pub job_type: String,
    pub experience: String,
    pub min_salary: u64,
    pub max_salary: u64,
    pub approved: bool,
    pub open: bool,
}

/// Body of `GET /jobs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<JobPost>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub created_at: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub photo_id: Option<String>,
    #[serde(default)]
    pub banner_id: Option<String>,
    pub about: String,
    pub website: String,
    pub address: String,
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Major {
    #[serde(rename = "Software Engineering")]
    SoftwareEngineering,
    #[serde(rename = "Computer Science")]
    ComputerScience,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyStatus {
    Graduated,
    Undergraduate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFile {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: String,
    pub name: String,
    pub approved: bool,
    pub created: String,
    pub email: String,
    pub phone: String,
    pub photo: String,
    pub birth_date: String,
    pub about_me: String,
    pub github: String,
    #[serde(rename = "linkedIn")]
    pub linked_in: String,
    pub student_id: String,
    pub major: Major,
    pub status: StudyStatus,
    pub status_file: String,
    #[serde(default)]
    pub files: Vec<ProfileFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub id: String,
    pub name: String,
    pub approved: bool,
    pub phone: String,
    pub logo: String,
    pub banner: String,
    pub about_us: String,
    pub website: String,
    pub contact: String,
    pub address: String,
}

/// `{ "profile": ... }` envelope used by the profile endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEnvelope<P> {
    pub profile: P,
}
