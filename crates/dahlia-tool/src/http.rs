use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::ToolError;
use crate::manifest::{ArtifactStatus, Manifest};
use crate::tool::{CreateArtifact, Tool, ToolConnector};

#[derive(Debug, Deserialize)]
struct Created {
  command_index: usize,
}

/// HTTP client for the tool protocol.
pub struct HttpTool {
  base: Url,
  client: Client,
}

impl HttpTool {
  pub fn new(base: Url, client: Client) -> Self {
    let mut base = base;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    Self { base, client }
  }

  fn endpoint(&self, path: &str) -> Result<Url, ToolError> {
    self
      .base
      .join(path)
      .map_err(|e| ToolError::InvalidUrl(format!("{}{}: {}", self.base, path, e)))
  }

  /// `artifacts/<artifact>/<rest...>` below the base, each part escaped as
  /// a single path segment. No `rest` gives the trailing-slash collection URL.
  fn artifact_endpoint(&self, artifact: &str, rest: &[&str]) -> Result<Url, ToolError> {
    let mut url = self.base.clone();
    {
      let mut segments = url
        .path_segments_mut()
        .map_err(|_| ToolError::InvalidUrl(self.base.to_string()))?;
      segments.pop_if_empty().push("artifacts").push(artifact);
      if rest.is_empty() {
        segments.push("");
      } else {
        segments.extend(rest);
      }
    }
    Ok(url)
  }

  fn expect_ok(response: Response, artifact: Option<&str>) -> Result<Response, ToolError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    if status == StatusCode::NOT_FOUND
      && let Some(artifact) = artifact
    {
      return Err(ToolError::ArtifactNotFound(artifact.to_string()));
    }
    Err(ToolError::Status {
      status: status.as_u16(),
      url: response.url().to_string(),
    })
  }

  async fn form(&self, request: &CreateArtifact) -> Result<Form, ToolError> {
    let mut form = Form::new()
      .text("operation", "create")
      .text("artifact_name", request.artifact_name.clone())
      .text("action", request.action.clone());

    for (name, value) in &request.arguments {
      let body = value.to_wire().await?;
      let part = Part::bytes(body.to_vec()).mime_str(value.kind().mime_type())?;
      form = form.part(format!("arguments[{}]", name), part);
    }
    Ok(form)
  }
}

#[async_trait]
impl Tool for HttpTool {
  async fn manifest(&self) -> Result<Manifest, ToolError> {
    let response = self.client.get(self.endpoint("manifest")?).send().await?;
    let response = Self::expect_ok(response, None)?;
    response
      .json()
      .await
      .map_err(|e| ToolError::InvalidResponse(e.to_string()))
  }

  async fn create_artifact(&self, request: &CreateArtifact) -> Result<usize, ToolError> {
    let form = self.form(request).await?;
    debug!(
      tool = %self.base,
      artifact = %request.artifact_name,
      action = %request.action,
      "creating artifact"
    );
    let response = self
      .client
      .post(self.endpoint("artifacts/")?)
      .multipart(form)
      .send()
      .await?;
    let response = Self::expect_ok(response, None)?;
    let created: Created = response
      .json()
      .await
      .map_err(|e| ToolError::InvalidResponse(e.to_string()))?;
    Ok(created.command_index)
  }

  async fn wait_for_complete(&self, artifact: &str) -> Result<ArtifactStatus, ToolError> {
    let response = self
      .client
      .post(self.artifact_endpoint(artifact, &[])?)
      .form(&[("operation", "wait_for_complete")])
      .send()
      .await?;
    let response = Self::expect_ok(response, Some(artifact))?;
    response.text().await?.parse()
  }

  async fn status(&self, artifact: &str) -> Result<ArtifactStatus, ToolError> {
    let response = self
      .client
      .get(self.artifact_endpoint(artifact, &["status"])?)
      .send()
      .await?;
    let response = Self::expect_ok(response, Some(artifact))?;
    response.text().await?.parse()
  }

  async fn delete_artifact(&self, artifact: &str) -> Result<(), ToolError> {
    let response = self
      .client
      .delete(self.artifact_endpoint(artifact, &[])?)
      .send()
      .await?;
    match Self::expect_ok(response, Some(artifact)) {
      Ok(_) | Err(ToolError::ArtifactNotFound(_)) => Ok(()),
      Err(e) => Err(e),
    }
  }

  async fn log(&self, artifact: &str, command_index: usize) -> Result<String, ToolError> {
    let index = command_index.to_string();
    let url = self.artifact_endpoint(artifact, &["history", index.as_str(), "log"])?;
    let response = self.client.get(url).send().await?;
    let response = Self::expect_ok(response, Some(artifact))?;
    Ok(response.text().await?)
  }

  async fn interrupt(&self, artifact: &str) -> Result<(), ToolError> {
    let response = self
      .client
      .post(self.artifact_endpoint(artifact, &[])?)
      .form(&[("operation", "interrupt")])
      .send()
      .await?;
    Self::expect_ok(response, Some(artifact))?;
    Ok(())
  }
}

/// Connects to tools over HTTP, sharing one client.
#[derive(Clone, Default)]
pub struct HttpToolConnector {
  client: Client,
}

impl HttpToolConnector {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ToolConnector for HttpToolConnector {
  fn connect(&self, url: &Url) -> Result<Arc<dyn Tool>, ToolError> {
    Ok(Arc::new(HttpTool::new(url.clone(), self.client.clone())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_endpoints() {
    let tool = HttpTool::new(Url::parse("http://10.0.0.2:8000").unwrap(), Client::new());

    assert_eq!(
      tool.endpoint("manifest").unwrap().as_str(),
      "http://10.0.0.2:8000/manifest"
    );
    assert_eq!(
      tool.artifact_endpoint("model", &[]).unwrap().as_str(),
      "http://10.0.0.2:8000/artifacts/model/"
    );
    assert_eq!(
      tool
        .artifact_endpoint("model", &["history", "2", "log"])
        .unwrap()
        .as_str(),
      "http://10.0.0.2:8000/artifacts/model/history/2/log"
    );
  }

  #[test]
  fn test_artifact_names_are_escaped() {
    let tool = HttpTool::new(Url::parse("http://10.0.0.2:8000/").unwrap(), Client::new());

    let url = tool.artifact_endpoint("a/b?c#d", &["status"]).unwrap();
    assert_eq!(
      url.as_str(),
      "http://10.0.0.2:8000/artifacts/a%2Fb%3Fc%23d/status"
    );
    assert_eq!(url.query(), None);
    assert_eq!(url.fragment(), None);
  }

  #[test]
  fn test_base_path_is_kept() {
    let tool = HttpTool::new(
      Url::parse("http://proxy.local/workers/trainer").unwrap(),
      Client::new(),
    );
    assert_eq!(
      tool.endpoint("artifacts/").unwrap().as_str(),
      "http://proxy.local/workers/trainer/artifacts/"
    );
    assert_eq!(
      tool.artifact_endpoint("model", &["status"]).unwrap().as_str(),
      "http://proxy.local/workers/trainer/artifacts/model/status"
    );
  }
}
