//! CIM-XML over HTTP.
//!
//! Intrinsic method calls are posted to `<host>/cimom`; the response body
//! is delivered verbatim on the response channel.

use super::{QueryClient, QueryRequest, QueryToken, RawResponse, ResponseSender};
use crate::config::{ClientConfig, HostConfig};
use crate::error::ExportError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info};

const CIMOM_PATH: &str = "/cimom";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn map_http_error(error: reqwest::Error) -> ExportError {
    if let Some(status) = error.status() {
        match status.as_u16() {
            401 => ExportError::QueryError(format!("Authentication failed: {}", error)),
            _ => ExportError::QueryError(format!("Request failed with status {}: {}", status, error)),
        }
    } else if error.is_timeout() {
        ExportError::QueryError(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ExportError::QueryError(format!("Connection error: {}", error))
    } else {
        ExportError::QueryError(format!("HTTP error: {}", error))
    }
}

/// CIM-XML client for one host.
pub struct CimXmlClient {
    http: Client,
    endpoint: Url,
    host_label: String,
    credentials: Option<(String, Option<String>)>,
    responses: ResponseSender,
}

impl CimXmlClient {
    pub fn new(
        host: &HostConfig,
        client: &ClientConfig,
        responses: ResponseSender,
    ) -> Result<Self, ExportError> {
        let mut endpoint = host.parsed_url()?;
        endpoint.set_path(CIMOM_PATH);
        // credentials travel as basic auth, not in the URL
        strip_credentials(&mut endpoint)?;

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(client.request_timeout())
            .build()
            .map_err(|e| ExportError::QueryError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            host_label: host.hostname()?,
            credentials: host.credentials()?,
            responses,
        })
    }

    async fn call(&self, id: u64, method: &str, namespace: &str, params: &str) -> Result<String, ExportError> {
        let body = method_call(id, method, namespace, params);
        debug!(method, namespace, endpoint = %self.endpoint, "Posting CIM-XML request");

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("Content-Type", "application/xml; charset=\"utf-8\"")
            .header("CIMOperation", "MethodCall")
            .header("CIMMethod", method)
            .header("CIMObject", namespace.replace('/', "%2F"))
            .body(body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(map_http_error)?
            .error_for_status()
            .map_err(map_http_error)?;
        let text = response.text().await.map_err(map_http_error)?;

        if let Some(error) = cim_error(&text)? {
            return Err(ExportError::QueryError(error));
        }
        Ok(text)
    }
}

fn strip_credentials(endpoint: &mut Url) -> Result<(), ExportError> {
    if endpoint.set_username("").is_err() || endpoint.set_password(None).is_err() {
        return Err(ExportError::ConfigError(format!(
            "Host URL {} cannot carry credentials",
            endpoint
        )));
    }
    Ok(())
}

#[async_trait]
impl QueryClient for CimXmlClient {
    async fn submit(&self, token: QueryToken, request: QueryRequest) -> Result<(), ExportError> {
        let body = match &request {
            QueryRequest::ExecQuery { namespace, query } => {
                let params = format!(
                    "{}{}",
                    param_value("QueryLanguage", "WQL"),
                    param_value("Query", query)
                );
                self.call(token.value(), "ExecQuery", namespace, &params).await?
            }
            QueryRequest::EnumerateInstances { namespace, class } => {
                let params = format!(
                    "<IPARAMVALUE NAME=\"ClassName\"><CLASSNAME NAME=\"{}\"/></IPARAMVALUE>{}{}{}",
                    escape(class),
                    param_value("DeepInheritance", "TRUE"),
                    param_value("LocalOnly", "FALSE"),
                    param_value("IncludeClassOrigin", "TRUE"),
                );
                self.call(token.value(), "EnumerateInstances", namespace, &params).await?
            }
        };

        info!(%token, host = %self.host_label, bytes = body.len(), "Response received");
        self.responses
            .send(RawResponse::new(Some(token), body))
            .map_err(|_| ExportError::QueryError("Response channel closed".to_string()))
    }

    async fn enumerate_class_names(&self, namespace: &str) -> Result<Vec<String>, ExportError> {
        let body = self
            .call(
                QueryToken::next().value(),
                "EnumerateClassNames",
                namespace,
                &param_value("DeepInheritance", "TRUE"),
            )
            .await?;
        class_names(&body)
    }

    fn host_label(&self) -> &str {
        &self.host_label
    }
}

fn method_call(id: u64, method: &str, namespace: &str, params: &str) -> String {
    let namespaces: String = namespace
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| format!("<NAMESPACE NAME=\"{}\"/>", escape(s)))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
<CIM CIMVERSION=\"2.0\" DTDVERSION=\"2.0\">\
<MESSAGE ID=\"{}\" PROTOCOLVERSION=\"1.0\"><SIMPLEREQ>\
<IMETHODCALL NAME=\"{}\"><LOCALNAMESPACEPATH>{}</LOCALNAMESPACEPATH>{}</IMETHODCALL>\
</SIMPLEREQ></MESSAGE></CIM>",
        id, method, namespaces, params
    )
}

fn param_value(name: &str, value: &str) -> String {
    format!(
        "<IPARAMVALUE NAME=\"{}\"><VALUE>{}</VALUE></IPARAMVALUE>",
        name,
        escape(value)
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// The `ERROR` element of a response, formatted, if the call failed.
fn cim_error(body: &str) -> Result<Option<String>, ExportError> {
    let doc = roxmltree::Document::parse(body)
        .map_err(|e| ExportError::QueryError(format!("Malformed CIM-XML response: {}", e)))?;
    Ok(doc
        .descendants()
        .find(|n| n.is_element() && n.has_tag_name("ERROR"))
        .map(|n| {
            format!(
                "CIM error {}: {}",
                n.attribute("CODE").unwrap_or("?"),
                n.attribute("DESCRIPTION").unwrap_or("no description")
            )
        }))
}

fn class_names(body: &str) -> Result<Vec<String>, ExportError> {
    let doc = roxmltree::Document::parse(body)
        .map_err(|e| ExportError::QueryError(format!("Malformed CIM-XML response: {}", e)))?;
    let mut names: Vec<String> = doc
        .descendants()
        .filter(|n| n.is_element() && n.has_tag_name("CLASSNAME"))
        .filter_map(|n| n.attribute("NAME").map(str::to_string))
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}
