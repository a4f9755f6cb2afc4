//! Blob service REST calls that `object_store` does not offer: account-wide
//! container enumeration and container properties.

use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use cloudbridge_common::SecretString;

use super::auth::{request_date, SharedKey, API_VERSION};
use crate::provider::{BackendError, BackendResult, Container, Extra};

/// Response of `GET /?comp=list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    containers: ContainerList,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerList {
    #[serde(rename = "Container", default)]
    items: Vec<ContainerItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerItem {
    name: String,
    #[serde(default)]
    properties: ContainerProperties,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerProperties {
    #[serde(rename = "Last-Modified")]
    last_modified: Option<String>,
    #[serde(rename = "Etag")]
    etag: Option<String>,
    #[serde(rename = "LeaseState")]
    lease_state: Option<String>,
    #[serde(rename = "PublicAccess")]
    public_access: Option<String>,
}

/// One page of a container listing.
#[derive(Debug)]
pub(crate) struct ContainerPage {
    pub containers: Vec<Container>,
    pub next_marker: Option<String>,
}

/// Signed client for account-level Blob service requests.
pub(crate) struct BlobServiceClient {
    http: Client,
    base: String,
    signer: SharedKey,
}

impl BlobServiceClient {
    /// Create a client for `account`, optionally against an emulator or
    /// sovereign-cloud endpoint.
    pub(crate) fn new(
        account: &str,
        key: SecretString,
        endpoint: Option<&str>,
    ) -> BackendResult<Self> {
        let base = match endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", account),
        };
        let http = Client::builder()
            .user_agent("cloudbridge/0.1")
            .build()
            .map_err(BackendError::service)?;

        Ok(Self {
            http,
            base,
            signer: SharedKey::new(account, key),
        })
    }

    async fn send(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, &str)],
    ) -> BackendResult<Response> {
        let url = Url::parse(&format!("{}/{}", self.base, resource))
            .map_err(BackendError::service)?;
        let date = request_date(Utc::now());
        let authorization = self
            .signer
            .authorization(method.as_str(), url.path(), query, &date)?;

        self.http
            .request(method, url)
            .query(query)
            .header("x-ms-date", date.as_str())
            .header("x-ms-version", API_VERSION)
            .header(header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(BackendError::service)
    }

    /// List every container in the account, following `NextMarker`.
    pub(crate) async fn list_containers(&self) -> BackendResult<Vec<Container>> {
        let mut containers = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let body = {
                let mut query = vec![("comp", "list")];
                if let Some(marker) = marker.as_deref() {
                    query.push(("marker", marker));
                }
                let response = self.send(Method::GET, "", &query).await?;
                success_body(response).await?
            };

            let page = parse_container_page(&body)?;
            containers.extend(page.containers);

            match page.next_marker {
                Some(next) => {
                    debug!("Following container listing marker {}", next);
                    marker = Some(next);
                }
                None => break,
            }
        }

        Ok(containers)
    }

    /// Get container properties, or `None` if the container does not exist.
    pub(crate) async fn container_properties(&self, name: &str) -> BackendResult<Option<Container>> {
        let response = self
            .send(Method::HEAD, name, &[("restype", "container")])
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response.status(), None));
        }

        let headers = response.headers();
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(Some(to_container(
            name.to_string(),
            ContainerProperties {
                last_modified: value("last-modified"),
                etag: value("etag"),
                lease_state: value("x-ms-lease-state"),
                public_access: value("x-ms-blob-public-access"),
            },
        )))
    }
}

async fn success_body(response: Response) -> BackendResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(BackendError::service)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(status_error(status, Some(&body)))
    }
}

fn status_error(status: StatusCode, body: Option<&str>) -> BackendError {
    let code = body
        .and_then(|b| b.split_once("<Code>"))
        .and_then(|(_, rest)| rest.split_once("</Code>"))
        .map(|(code, _)| code)
        .unwrap_or("");
    BackendError::service(format!("Blob service returned {} {}", status, code).trim_end().to_string())
}

/// Parse one `EnumerationResults` document.
pub(crate) fn parse_container_page(xml: &str) -> BackendResult<ContainerPage> {
    let results: EnumerationResults =
        quick_xml::de::from_str(xml).map_err(BackendError::service)?;

    Ok(ContainerPage {
        containers: results
            .containers
            .items
            .into_iter()
            .map(|item| to_container(item.name, item.properties))
            .collect(),
        next_marker: results.next_marker.filter(|m| !m.is_empty()),
    })
}

fn to_container(name: String, properties: ContainerProperties) -> Container {
    let mut extra = Extra::new();
    let modified = properties.last_modified.as_deref().and_then(parse_http_date);
    if let Some(modified) = modified {
        extra.insert("last_modified".to_string(), modified.to_rfc3339().into());
    }
    if let Some(etag) = properties.etag {
        extra.insert("etag".to_string(), etag.into());
    }
    if let Some(state) = properties.lease_state {
        extra.insert("lease_state".to_string(), state.into());
    }
    if let Some(access) = properties.public_access {
        extra.insert("public_access".to_string(), access.into());
    }

    Container {
        name,
        created: None,
        size: None,
        extra,
    }
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
