//! Typed wrappers for the REST resources.
//!
//! Detail routes are keyed by UUID, and all paths keep the trailing slash the API expects.

use crate::client::ApiClient;
use crate::error::Result;
use crate::models::*;
use serde_json::{json, Value};

/// Query parameters shared by list endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    /// Field name, prefixed with `-` for descending, eg `-created_at`
    pub ordering: Option<String>,
    /// Exact-match filters, eg `severity=HIGH`
    pub filters: Vec<(String, String)>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn search(mut self, search: &str) -> Self {
        self.search = Some(search.to_string());
        self
    }

    pub fn ordering(mut self, ordering: &str) -> Self {
        self.ordering = Some(ordering.to_string());
        self
    }

    pub fn filter(mut self, key: &str, value: &str) -> Self {
        self.filters.push((key.to_string(), value.to_string()));
        self
    }

    /// Like [`ListParams::ordering`], but only if no ordering was chosen yet
    fn default_ordering(mut self, ordering: &str) -> Self {
        if self.ordering.is_none() {
            self.ordering = Some(ordering.to_string());
        }
        self
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(p) = self.page {
            query.push(("page".to_string(), p.to_string()));
        }
        if let Some(s) = self.page_size {
            query.push(("page_size".to_string(), s.to_string()));
        }
        if let Some(s) = &self.search {
            query.push(("search".to_string(), s.clone()));
        }
        if let Some(o) = &self.ordering {
            query.push(("ordering".to_string(), o.clone()));
        }
        query.extend(self.filters.iter().cloned());
        query
    }
}

impl ApiClient {
    pub async fn stats(&self) -> Result<Stats> {
        self.get("stats/", vec![]).await
    }

    pub async fn list_repositories(&self, params: &ListParams) -> Result<Page<Repository>> {
        self.get("repositories/", params.to_query()).await
    }

    pub async fn get_repository(&self, uuid: &str) -> Result<Repository> {
        self.get(&format!("repositories/{uuid}/"), vec![]).await
    }

    pub async fn repository_tags(&self, uuid: &str) -> Result<Vec<RepositoryTag>> {
        self.get(&format!("repositories/{uuid}/tags/"), vec![]).await
    }

    /// Tags of a repository, newest first unless `params` says otherwise
    pub async fn repository_paginated_tags(
        &self,
        uuid: &str,
        params: &ListParams,
    ) -> Result<Page<RepositoryTag>> {
        let params = params.clone().default_ordering("-created_at");
        self.get(
            &format!("repositories/{uuid}/paginated-tags/"),
            params.to_query(),
        )
        .await
    }

    /// Up to 30 most recent tags, for charting findings over time
    pub async fn repository_tags_graph(&self, uuid: &str) -> Result<Vec<Value>> {
        self.get(&format!("repositories/{uuid}/tags-graph/"), vec![])
            .await
    }

    pub async fn scan_repository_tags(&self, uuid: &str) -> Result<ActionStatus> {
        self.post(&format!("repositories/{uuid}/scan_tags/"), None)
            .await
    }

    /// Lists repositories in a container registry. Defaults to the first ACR registry if no
    /// `registry_uuid` is given; `last` is the continuation marker from the previous page.
    pub async fn registry_repositories(
        &self,
        registry_uuid: Option<&str>,
        page_size: Option<u64>,
        last: Option<&str>,
    ) -> Result<RegistryRepositories> {
        let mut query = Vec::new();
        if let Some(r) = registry_uuid {
            query.push(("registry_uuid".to_string(), r.to_string()));
        }
        if let Some(s) = page_size {
            query.push(("page_size".to_string(), s.to_string()));
        }
        if let Some(l) = last {
            query.push(("last".to_string(), l.to_string()));
        }
        self.get("repositories/get_acr_repos/", query).await
    }

    pub async fn add_repositories(
        &self,
        request: &AddRepositoriesRequest,
    ) -> Result<AddRepositoriesResponse> {
        self.post(
            "jobs/add-repositories/",
            Some(serde_json::to_value(request)?),
        )
        .await
    }

    pub async fn list_tags(&self, params: &ListParams) -> Result<Page<RepositoryTag>> {
        self.get("repository-tags/", params.to_query()).await
    }

    pub async fn get_tag(&self, uuid: &str) -> Result<RepositoryTag> {
        self.get(&format!("repository-tags/{uuid}/"), vec![]).await
    }

    /// Images of a tag, most recently updated first unless the params say otherwise
    pub async fn tag_images(&self, uuid: &str, params: &ListParams) -> Result<Page<Image>> {
        let params = params.clone().default_ordering("-updated_at");
        self.get(
            &format!("repository-tags/{uuid}/images/"),
            params.to_query(),
        )
        .await
    }

    pub async fn process_tag(&self, uuid: &str) -> Result<ActionStatus> {
        self.post(&format!("repository-tags/{uuid}/process/"), None)
            .await
    }

    pub async fn rescan_tag_images(&self, uuid: &str) -> Result<ActionStatus> {
        self.post(&format!("repository-tags/{uuid}/rescan-images/"), None)
            .await
    }

    pub async fn list_images(&self, params: &ListParams) -> Result<Page<Image>> {
        self.get("images/", params.to_query()).await
    }

    pub async fn get_image(&self, uuid: &str) -> Result<Image> {
        self.get(&format!("images/{uuid}/"), vec![]).await
    }

    pub async fn image_vulnerabilities(&self, uuid: &str) -> Result<Vec<Vulnerability>> {
        self.get(&format!("images/{uuid}/vulnerabilities/"), vec![])
            .await
    }

    pub async fn image_components(
        &self,
        uuid: &str,
        params: &ListParams,
    ) -> Result<Page<ComponentVersion>> {
        self.get(&format!("images/{uuid}/components/"), params.to_query())
            .await
    }

    /// Raw SBOM document of an image
    pub async fn image_sbom(&self, uuid: &str) -> Result<Value> {
        self.get(&format!("images/{uuid}/sbom/"), vec![]).await
    }

    pub async fn rescan_image(&self, uuid: &str) -> Result<ActionStatus> {
        self.post(&format!("images/{uuid}/rescan/"), Some(json!({})))
            .await
    }

    pub async fn list_components(&self, params: &ListParams) -> Result<Page<Component>> {
        self.get("components/", params.to_query()).await
    }

    pub async fn get_component(&self, uuid: &str) -> Result<Component> {
        self.get(&format!("components/{uuid}/"), vec![]).await
    }

    pub async fn component_versions(&self, uuid: &str) -> Result<Vec<ComponentVersion>> {
        self.get(&format!("components/{uuid}/versions/"), vec![])
            .await
    }

    pub async fn list_component_versions(
        &self,
        params: &ListParams,
    ) -> Result<Page<ComponentVersion>> {
        self.get("component-versions/", params.to_query()).await
    }

    pub async fn get_component_version(&self, uuid: &str) -> Result<ComponentVersion> {
        self.get(&format!("component-versions/{uuid}/"), vec![])
            .await
    }

    pub async fn component_version_vulnerabilities(
        &self,
        uuid: &str,
    ) -> Result<Vec<Vulnerability>> {
        self.get(
            &format!("component-versions/{uuid}/vulnerabilities/"),
            vec![],
        )
        .await
    }

    pub async fn list_vulnerabilities(&self, params: &ListParams) -> Result<Page<Vulnerability>> {
        self.get("vulnerabilities/", params.to_query()).await
    }

    pub async fn get_vulnerability(&self, uuid: &str) -> Result<Vulnerability> {
        self.get(&format!("vulnerabilities/{uuid}/"), vec![]).await
    }

    /// Count of vulnerabilities per severity
    pub async fn severity_stats(&self) -> Result<Value> {
        self.get("vulnerabilities/severity_stats/", vec![]).await
    }
}

#[test]
fn test_list_params_query() {
    let params = ListParams::new()
        .page(2)
        .search("openssl")
        .ordering("-epss")
        .filter("severity", "CRITICAL");
    assert_eq!(
        params.to_query(),
        vec![
            ("page".to_string(), "2".to_string()),
            ("search".to_string(), "openssl".to_string()),
            ("ordering".to_string(), "-epss".to_string()),
            ("severity".to_string(), "CRITICAL".to_string()),
        ]
    );
    assert!(ListParams::new().to_query().is_empty());
    assert_eq!(
        ListParams::new()
            .ordering("tag")
            .default_ordering("-created_at")
            .ordering,
        Some("tag".to_string())
    );
}
