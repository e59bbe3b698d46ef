// HITrack API types (manually entered, from the REST serializers)

pub mod tasks;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// List endpoints wrap their results like this
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// A foreign key: serializers send the bare primary key unless they nest the object
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Related<T> {
    Id(u64),
    Object(Box<T>),
}

impl<T> Related<T> {
    pub fn object(&self) -> Option<&T> {
        match self {
            Related::Id(_) => None,
            Related::Object(obj) => Some(obj),
        }
    }

    /// The primary key, when the object wasn't nested
    pub fn id(&self) -> Option<u64> {
        match self {
            Related::Id(id) => Some(*id),
            Related::Object(_) => None,
        }
    }
}

/// Scan/processing state shared by repositories, tags and images
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    InProcess,
    Success,
    Error,
    None,
    #[serde(other)]
    Unknown,
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        ProcessingStatus::None
    }
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::InProcess => "in_process",
            ProcessingStatus::Success => "success",
            ProcessingStatus::Error => "error",
            ProcessingStatus::None => "none",
            ProcessingStatus::Unknown => "unknown",
        }
    }

    /// Whether a scan is queued or running
    pub fn is_busy(&self) -> bool {
        matches!(self, ProcessingStatus::Pending | ProcessingStatus::InProcess)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryType {
    Docker,
    Helm,
    None,
    #[serde(other)]
    Unknown,
}

impl Default for RepositoryType {
    fn default() -> Self {
        RepositoryType::None
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: Option<u64>,
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tag_count: u64,
    #[serde(default)]
    pub repository_type: RepositoryType,
    #[serde(default)]
    pub scan_status: ProcessingStatus,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RepositoryTag {
    pub id: Option<u64>,
    pub uuid: String,
    pub tag: String,
    /// Missing from the list serializer
    pub repository: Option<Related<Repository>>,
    /// Short image records (uuid, name and counts only)
    pub images: Option<Vec<Image>>,
    #[serde(default)]
    pub vulnerabilities_count: u64,
    pub processing_status: Option<ProcessingStatus>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub repository_name: String,
    pub repository_uuid: String,
    pub tag: String,
    pub tag_uuid: String,
    pub repository_type: String,
}

pub type SeverityCounts = BTreeMap<String, u64>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Image {
    pub id: Option<u64>,
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub scan_status: ProcessingStatus,
    #[serde(default)]
    pub has_sbom: bool,
    #[serde(default)]
    pub findings: u64,
    #[serde(default)]
    pub unique_findings: u64,
    #[serde(default)]
    pub severity_counts: SeverityCounts,
    #[serde(default)]
    pub components_count: u64,
    #[serde(default)]
    pub fully_fixable_components_count: u64,
    #[serde(default)]
    pub fixable_findings: u64,
    #[serde(default)]
    pub fixable_unique_findings: u64,
    #[serde(default)]
    pub fixable_severity_counts: SeverityCounts,
    #[serde(default)]
    pub unique_severity_counts: SeverityCounts,
    #[serde(default)]
    pub fixable_unique_severity_counts: SeverityCounts,
    pub repository_info: Option<RepositoryInfo>,
    pub repository_tags: Option<Vec<RepositoryTag>>,
    pub component_versions: Option<Vec<ComponentVersion>>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Component {
    pub id: Option<u64>,
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub purl: Option<String>,
    pub cpes: Option<Vec<String>>,
    #[serde(default)]
    pub versions: Vec<ComponentVersion>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ComponentVersion {
    pub id: Option<u64>,
    pub uuid: String,
    pub version: String,
    /// Omitted when nested inside its component
    pub component: Option<Box<Component>>,
    /// Primary keys of the images using this version
    #[serde(default)]
    pub images: Vec<Related<Image>>,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default)]
    pub vulnerabilities_count: u64,
    #[serde(default)]
    pub used_count: u64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Vulnerability {
    pub id: Option<u64>,
    pub uuid: String,
    pub vulnerability_id: String,
    pub vulnerability_type: String,
    pub severity: String,
    pub description: Option<String>,
    #[serde(default)]
    pub epss: f64,
    pub fixable: Option<bool>,
    pub fix: Option<String>,
    pub details: Option<Box<VulnerabilityDetails>>,
    #[serde(default)]
    pub has_details: bool,
    #[serde(default)]
    pub exploit_available: bool,
    #[serde(default)]
    pub cisa_kev: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Enrichment data: CVE details, exploit availability, CISA KEV and EPSS
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct VulnerabilityDetails {
    pub id: Option<u64>,
    pub uuid: String,
    pub cve_details_score: Option<f64>,
    pub cve_details_severity: Option<String>,
    pub cve_details_published_date: Option<String>,
    pub cve_details_updated_date: Option<String>,
    pub cve_details_summary: Option<String>,
    pub cve_details_references: Option<Vec<String>>,
    pub exploit_available: bool,
    pub exploit_public: bool,
    pub exploit_verified: bool,
    pub exploit_links: Option<Vec<String>>,
    pub cisa_kev_known_exploited: bool,
    pub cisa_kev_date_added: Option<String>,
    pub cisa_kev_vendor_project: Option<String>,
    pub cisa_kev_product: Option<String>,
    pub cisa_kev_vulnerability_name: Option<String>,
    pub cisa_kev_short_description: Option<String>,
    pub cisa_kev_required_action: Option<String>,
    pub cisa_kev_due_date: Option<String>,
    pub cisa_kev_ransomware_use: Option<String>,
    pub cisa_kev_notes: Option<String>,
    pub cisa_kev_cwes: Option<Vec<String>>,
    pub exploit_db_available: bool,
    pub exploit_db_verified: bool,
    pub exploit_db_count: u64,
    pub exploit_db_verified_count: u64,
    pub exploit_db_working_count: u64,
    pub exploit_db_links: Option<Vec<String>>,
    pub last_updated: String,
    pub data_source: String,
    pub epss_score: Option<f64>,
    pub epss_percentile: Option<f64>,
    pub epss_date: Option<String>,
    pub epss_data_source: Option<String>,
    pub epss_last_updated: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub repositories: u64,
    pub images: u64,
    pub vulnerabilities: u64,
    pub components: u64,
}

/// Repository listing straight from a container registry (not yet imported)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RegistryRepository {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RegistryPagination {
    pub next_page: Option<String>,
    pub page_size: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RegistryRepositories {
    pub repositories: Vec<RegistryRepository>,
    pub pagination: RegistryPagination,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AddRepository {
    pub repository_name: String,
    pub repository_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AddRepositoriesRequest {
    pub repositories: Vec<AddRepository>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_uuid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AddRepositoryResult {
    pub repository: String,
    pub repository_id: String,
    pub created: bool,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AddRepositoriesResponse {
    pub status: String,
    pub message: String,
    pub results: Vec<AddRepositoryResult>,
}

/// Acknowledgement returned by the scan/process/rescan actions
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ActionStatus {
    pub status: Option<String>,
    pub message: Option<String>,
}

#[test]
fn test_page_of_repositories() {
    let page: Page<Repository> = serde_json::from_str(
        r#"{
            "count": 41,
            "next": "http://localhost:8000/repositories/?page=2",
            "previous": null,
            "results": [{
                "uuid": "5b0e8f0a-2a53-4a7e-9d6f-1c2b3a4d5e6f",
                "name": "team/api",
                "url": "registry.example.com/team/api",
                "tag_count": 12,
                "repository_type": "docker",
                "scan_status": "in_process",
                "created_at": "2024-03-07T14:05:09Z",
                "updated_at": "2024-03-08T09:00:00Z"
            }]
        }"#,
    )
    .unwrap();
    assert!(page.has_next());
    assert_eq!(page.results[0].repository_type, RepositoryType::Docker);
    assert!(page.results[0].scan_status.is_busy());
    assert_eq!(page.results[0].id, None);
}

#[test]
fn test_unknown_enum_values() {
    let repo: Repository = serde_json::from_str(
        r#"{
            "uuid": "u", "name": "n", "url": "x",
            "repository_type": "oci", "scan_status": "archived",
            "created_at": "", "updated_at": ""
        }"#,
    )
    .unwrap();
    assert_eq!(repo.repository_type, RepositoryType::Unknown);
    assert_eq!(repo.scan_status, ProcessingStatus::Unknown);
    assert_eq!(repo.tag_count, 0);
}

#[test]
fn test_vulnerability_with_details() {
    let vuln: Vulnerability = serde_json::from_str(
        r#"{
            "uuid": "v1",
            "vulnerability_id": "CVE-2023-44487",
            "vulnerability_type": "CVE",
            "severity": "HIGH",
            "epss": 0.94,
            "has_details": true,
            "exploit_available": true,
            "cisa_kev": true,
            "details": {
                "uuid": "d1",
                "cisa_kev_known_exploited": true,
                "cisa_kev_cwes": ["CWE-400"],
                "epss_score": 0.94,
                "epss_data_source": "FIRST-EPSS",
                "last_updated": "2024-01-01T00:00:00Z",
                "data_source": "nvd",
                "created_at": "", "updated_at": ""
            },
            "created_at": "", "updated_at": ""
        }"#,
    )
    .unwrap();
    let details = vuln.details.unwrap();
    assert!(details.cisa_kev_known_exploited);
    assert_eq!(details.exploit_db_count, 0);
    assert_eq!(details.epss_data_source.as_deref(), Some("FIRST-EPSS"));
}

#[test]
fn test_image_list_entry() {
    // image list and tag images endpoints: no created_at, no severity breakdowns
    let page: Page<Image> = serde_json::from_str(
        r#"{
            "count": 2,
            "next": null,
            "previous": null,
            "results": [{
                "uuid": "0f6e7a52-9a7d-4b59-b1c4-7f1f7c1d2e3a",
                "name": "team/api:1.2",
                "digest": "sha256:9b2c",
                "scan_status": "success",
                "has_sbom": true,
                "findings": 14,
                "unique_findings": 11,
                "components_count": 213,
                "updated_at": "2024-03-08T09:00:00Z"
            }, {
                "uuid": "4d1b9e0c-52f3-4c8e-8f61-2b7d0c9a1e44",
                "name": "team/api:1.1",
                "digest": "sha256:77aa",
                "scan_status": "pending",
                "has_sbom": false,
                "findings": 0,
                "unique_findings": 0,
                "components_count": 0,
                "updated_at": "2024-03-07T14:05:09Z"
            }]
        }"#,
    )
    .unwrap();
    assert_eq!(page.count, 2);
    let first = &page.results[0];
    assert!(first.has_sbom);
    assert_eq!(first.unique_findings, 11);
    assert_eq!(first.created_at, "");
    assert!(first.severity_counts.is_empty());
    assert!(page.results[1].scan_status.is_busy());
}

#[test]
fn test_tag_with_short_images() {
    let tag: RepositoryTag = serde_json::from_str(
        r#"{
            "uuid": "c3f1d6a8-0e4b-4a5f-9c2d-8b7e6f5a4d3c",
            "tag": "1.2",
            "repository": 7,
            "images": [
                {"uuid": "i1", "findings": 14, "components_count": 213, "name": "team/api:1.2"}
            ],
            "created_at": "2024-03-07T14:05:09Z",
            "updated_at": "2024-03-08T09:00:00Z",
            "vulnerabilities_count": 11,
            "processing_status": "success"
        }"#,
    )
    .unwrap();
    assert_eq!(tag.repository.as_ref().and_then(Related::id), Some(7));
    assert!(tag.repository.as_ref().and_then(Related::object).is_none());
    assert_eq!(tag.vulnerabilities_count, 11);
    let images = tag.images.unwrap();
    assert_eq!(images[0].findings, 14);
    assert_eq!(images[0].digest, "");
    assert_eq!(tag.processing_status, Some(ProcessingStatus::Success));
}

#[test]
fn test_tag_with_nested_repository() {
    let tag: RepositoryTag = serde_json::from_str(
        r#"{
            "uuid": "t1",
            "tag": "latest",
            "repository": {
                "uuid": "r1", "name": "team/api", "url": "registry.example.com/team/api",
                "repository_type": "docker", "tag_count": 3,
                "created_at": "2024-03-07T14:05:09Z", "updated_at": "2024-03-07T14:05:09Z"
            },
            "created_at": "2024-03-07T14:05:09Z",
            "updated_at": "2024-03-07T14:05:09Z"
        }"#,
    )
    .unwrap();
    let repo = tag.repository.as_ref().and_then(Related::object).unwrap();
    assert_eq!(repo.name, "team/api");
    assert_eq!(tag.repository.as_ref().and_then(Related::id), None);
}

#[test]
fn test_component_version_with_image_keys() {
    let cv: ComponentVersion = serde_json::from_str(
        r#"{
            "uuid": "cv1",
            "version": "3.0.13-r0",
            "component": {
                "uuid": "c1", "name": "openssl", "type": "apk",
                "created_at": "2024-03-07T14:05:09Z", "updated_at": "2024-03-07T14:05:09Z"
            },
            "images": [1, 2],
            "vulnerabilities": [{
                "uuid": "v1",
                "vulnerability_id": "CVE-2024-0727",
                "vulnerability_type": "CVE",
                "severity": "MEDIUM",
                "description": "PKCS12 NULL dereference",
                "epss": 0.0012,
                "created_at": "2024-03-07T14:05:09Z",
                "updated_at": "2024-03-07T14:05:09Z",
                "fixable": true,
                "fix": "3.0.13-r1"
            }],
            "created_at": "2024-03-07T14:05:09Z",
            "updated_at": "2024-03-07T14:05:09Z"
        }"#,
    )
    .unwrap();
    let keys: Vec<_> = cv.images.iter().filter_map(Related::id).collect();
    assert_eq!(keys, vec![1, 2]);
    assert_eq!(cv.component.as_ref().unwrap().kind, "apk");
    assert_eq!(cv.component.as_ref().unwrap().purl, None);
    assert_eq!(cv.vulnerabilities[0].fix.as_deref(), Some("3.0.13-r1"));
    assert_eq!(cv.vulnerabilities_count, 0);
}
