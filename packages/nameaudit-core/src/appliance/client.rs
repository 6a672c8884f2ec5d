use crate::error::{AuditError, Result};
use crate::search::SearchFilter;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Per-call timeout used when the caller does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const PLATFORM_ENDPOINT: &str = "extrahop/";
const VERSION_ENDPOINT: &str = "extrahop/version";
const DEVICE_SEARCH_ENDPOINT: &str = "devices/search";

/// Connection settings for an [`ApplianceClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Skip TLS certificate validation. Off unless the caller opts in.
    pub accept_invalid_certs: bool,
    /// Credential file named in 401 messages
    pub key_file: PathBuf,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
            key_file: crate::auth::default_key_file_path()
                .unwrap_or_else(|_| PathBuf::from(format!("~/{}", crate::auth::KEY_FILE_NAME))),
        }
    }
}

/// Platform and firmware reported by the appliance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplianceInfo {
    pub platform: String,
    pub firmware_version: String,
}

#[derive(Debug, Deserialize)]
struct PlatformResponse {
    platform: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

/// A device as returned by `devices/search`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub default_name: String,
    #[serde(rename = "ipaddr4", default)]
    pub ipv4: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub display_name: String,
    #[serde(rename = "macaddr", default)]
    pub mac_address: Option<String>,
}

/// Device ids are integers on current firmware; accept strings as well.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Map the appliance's internal platform identifier to the product label
pub fn platform_label(platform: &str) -> &str {
    match platform {
        "extrahop" => "EDA",
        other => other,
    }
}

/// Operations the report pipeline needs from an appliance
#[async_trait]
pub trait ApplianceApi: Send + Sync {
    /// Host the API calls go to
    fn host(&self) -> &str;

    /// `GET extrahop/`: platform label and firmware version
    async fn probe_version(&self) -> Result<ApplianceInfo>;

    /// `GET extrahop/version`: firmware version only
    async fn probe_firmware_version(&self) -> Result<String>;

    /// `POST devices/search`: one page of matching devices, in response order
    async fn search_devices(&self, filter: &SearchFilter) -> Result<Vec<Device>>;
}

/// Authenticated REST client for a single appliance
#[derive(Debug, Clone)]
pub struct ApplianceClient {
    host: String,
    base_url: String,
    auth: HeaderValue,
    key_file: PathBuf,
    http: reqwest::Client,
}

impl ApplianceClient {
    /// Build a client for `host` authenticating with `api_key`.
    ///
    /// Fails with `NotConfigured` before any network activity when either is empty.
    pub fn new(host: &str, api_key: &str, options: &ClientOptions) -> Result<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(AuditError::NotConfigured("appliance host"));
        }
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AuditError::NotConfigured("API key"));
        }

        let mut auth = HeaderValue::from_str(&format!("ExtraHop apikey={}", api_key)).map_err(
            |_| AuditError::InvalidApiKey {
                host: host.to_string(),
            },
        )?;
        auth.set_sensitive(true);

        if options.accept_invalid_certs {
            tracing::warn!(
                "TLS certificate validation is disabled for {}; only use this with self-signed appliance certificates",
                host
            );
        }

        // A redirect is reported like any other non-2xx status
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| AuditError::Transport {
                resource: host.to_string(),
                source: e,
            })?;

        Ok(Self {
            host: host.to_string(),
            base_url: api_base_url(host),
            auth,
            key_file: options.key_file.clone(),
            http,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Full URL for an API path, e.g. `https://<host>/api/v1/devices/search`
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Assemble the authenticated request for `path` without sending it.
    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Request> {
        let url = self.url(path);
        let mut builder = self
            .http
            .request(method, &url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(AUTHORIZATION, self.auth.clone());
        if let Some(body) = body {
            tracing::trace!("Request body: {}", body);
            builder = builder.json(body);
        }
        builder.build().map_err(|e| AuditError::Transport {
            resource: url,
            source: e,
        })
    }

    /// Send one request and return the parsed JSON body.
    ///
    /// Exactly one attempt is made; any non-2xx status is returned as an error.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let request = self.build_request(method, path, body)?;
        let url = request.url().to_string();
        tracing::debug!("Sending a {} request to {}", request.method(), url);

        let resp = self
            .http
            .execute(request)
            .await
            .map_err(|e| AuditError::Transport {
                resource: url.clone(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| AuditError::Transport {
            resource: url.clone(),
            source: e,
        })?;

        let ctx = ResponseContext {
            host: &self.host,
            resource: path,
            key_file: &self.key_file,
        };
        match classify_response(status, &text, &ctx) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!("{} {} failed: {}", status, url, e);
                Err(e)
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.request(Method::GET, path, None).await?;
        decode(path, value)
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = encode_body(path, body)?;
        let value = self.request(Method::POST, path, Some(&body)).await?;
        decode(path, value)
    }
}

#[async_trait]
impl ApplianceApi for ApplianceClient {
    fn host(&self) -> &str {
        &self.host
    }

    async fn probe_version(&self) -> Result<ApplianceInfo> {
        let resp: PlatformResponse = self.get_json(PLATFORM_ENDPOINT).await?;
        let info = ApplianceInfo {
            platform: platform_label(&resp.platform).to_string(),
            firmware_version: resp.version,
        };
        tracing::debug!(
            "Appliance at {} is an {} and the firmware version is {}",
            self.host,
            info.platform,
            info.firmware_version
        );
        Ok(info)
    }

    async fn probe_firmware_version(&self) -> Result<String> {
        let resp: VersionResponse = self.get_json(VERSION_ENDPOINT).await?;
        Ok(resp.version)
    }

    async fn search_devices(&self, filter: &SearchFilter) -> Result<Vec<Device>> {
        self.post_json(DEVICE_SEARCH_ENDPOINT, filter).await
    }
}

/// What a response is being classified for, used to build error messages
#[derive(Debug, Clone, Copy)]
pub struct ResponseContext<'a> {
    pub host: &'a str,
    pub resource: &'a str,
    pub key_file: &'a std::path::Path,
}

/// Turn a status code and body into a JSON value or a typed error.
pub fn classify_response(
    status: u16,
    body: &str,
    ctx: &ResponseContext<'_>,
) -> Result<serde_json::Value> {
    let resource = ctx.resource.to_string();
    match status {
        200..=299 => {
            serde_json::from_str(body).map_err(|e| AuditError::MalformedResponse { resource, source: e })
        }
        401 => Err(AuditError::Auth {
            resource,
            key_file: ctx.key_file.to_path_buf(),
        }),
        402 => Err(AuditError::License {
            host: ctx.host.to_string(),
        }),
        403 => Err(AuditError::Permission { resource }),
        404 => Err(AuditError::NotFound { resource }),
        422 => Err(AuditError::FeatureDisabled { resource }),
        500..=u16::MAX => Err(AuditError::Server { status, resource }),
        _ => Err(AuditError::UnknownHttp { status, resource }),
    }
}

fn api_base_url(host: &str) -> String {
    format!("https://{}/api/v1", host)
}

fn encode_body<B: Serialize + ?Sized>(path: &str, body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body).map_err(|e| AuditError::RequestEncoding {
        resource: path.to_string(),
        source: e,
    })
}

fn decode<T: DeserializeOwned>(path: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| AuditError::MalformedResponse {
        resource: path.to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::path::Path;

    fn ctx() -> ResponseContext<'static> {
        ResponseContext {
            host: "10.0.0.1",
            resource: "devices/search",
            key_file: Path::new("/root/.extrahop"),
        }
    }

    #[test]
    fn test_status_table() {
        let cases = [
            (401, ErrorKind::Auth),
            (402, ErrorKind::License),
            (403, ErrorKind::Permission),
            (404, ErrorKind::NotFound),
            (422, ErrorKind::FeatureDisabled),
            (500, ErrorKind::Server),
            (503, ErrorKind::Server),
            (400, ErrorKind::UnknownHttp),
            (409, ErrorKind::UnknownHttp),
            (302, ErrorKind::UnknownHttp),
        ];
        for (status, kind) in cases {
            let err = classify_response(status, "{}", &ctx()).unwrap_err();
            assert_eq!(err.kind(), kind, "status {}", status);
            assert_eq!(err.status(), Some(status));
        }
    }

    #[test]
    fn test_success_parses_json() {
        let value = classify_response(200, r#"[{"id": 1}]"#, &ctx()).unwrap();
        assert_eq!(value, json!([{ "id": 1 }]));
    }

    #[test]
    fn test_success_with_non_json_body_is_malformed() {
        let err = classify_response(200, "<html>login</html>", &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_auth_error_points_at_key_file() {
        let err = classify_response(401, "", &ctx()).unwrap_err();
        assert!(err.to_string().contains("/root/.extrahop"));
    }

    #[test]
    fn test_license_error_points_at_admin_page() {
        let err = classify_response(402, "", &ctx()).unwrap_err();
        assert!(err.to_string().contains("https://10.0.0.1/admin"));
    }

    fn client() -> ApplianceClient {
        ApplianceClient::new("10.0.0.1", "abc123", &ClientOptions::default()).unwrap()
    }

    #[test]
    fn test_url() {
        let client = client();
        assert_eq!(
            client.url("devices/search"),
            "https://10.0.0.1/api/v1/devices/search"
        );
        assert_eq!(client.url("/extrahop/"), "https://10.0.0.1/api/v1/extrahop/");
    }

    #[test]
    fn test_build_request_for_device_search() {
        let filter = crate::search::build("^VMware", 7, 100, 0);
        let body = encode_body(DEVICE_SEARCH_ENDPOINT, &filter).unwrap();
        let request = client()
            .build_request(Method::POST, DEVICE_SEARCH_ENDPOINT, Some(&body))
            .unwrap();

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(
            request.url().as_str(),
            "https://10.0.0.1/api/v1/devices/search"
        );
        let headers = request.headers();
        assert_eq!(headers[AUTHORIZATION], "ExtraHop apikey=abc123");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(
            headers[reqwest::header::CONTENT_TYPE],
            "application/json"
        );

        let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
        let sent: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(
            sent,
            json!({
                "active_from": "-7d",
                "active_until": 0,
                "filter": {
                    "field": "name",
                    "operand": { "value": "^VMware", "is_regex": true },
                    "operator": "!="
                },
                "limit": 100,
                "offset": 0
            })
        );
    }

    #[test]
    fn test_build_request_for_version_has_no_body() {
        let request = client()
            .build_request(Method::GET, VERSION_ENDPOINT, None)
            .unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(
            request.url().as_str(),
            "https://10.0.0.1/api/v1/extrahop/version"
        );
        assert_eq!(request.headers()[AUTHORIZATION], "ExtraHop apikey=abc123");
        assert!(request.body().is_none());
    }

    #[test]
    fn test_unencodable_body_is_request_encoding_error() {
        // Map keys must be strings in JSON
        let body: std::collections::BTreeMap<(i32, i32), i32> = [((1, 2), 3)].into();
        let err = encode_body(DEVICE_SEARCH_ENDPOINT, &body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestEncoding);
        assert!(err.to_string().contains("devices/search"));
    }

    /// Serve one canned response per connection on a loopback port
    async fn serve(responses: Vec<&'static str>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{}/api/v1", addr)
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let base = serve(vec![
            "HTTP/1.1 302 Found\r\nLocation: /api/v1/extrahop/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
        ])
        .await;
        let client = client().with_base_url(&base);

        let err = client
            .request(Method::GET, VERSION_ENDPOINT, None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, AuditError::UnknownHttp { status: 302, .. }),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_request_round_trip_over_loopback() {
        let base = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 20\r\nConnection: close\r\n\r\n{\"version\": \"9.4.0\"}",
        ])
        .await;
        let client = client().with_base_url(&base);

        let value = client
            .request(Method::GET, VERSION_ENDPOINT, None)
            .await
            .unwrap();
        assert_eq!(value, json!({ "version": "9.4.0" }));
    }

    #[test]
    fn test_platform_label() {
        assert_eq!(platform_label("extrahop"), "EDA");
        assert_eq!(platform_label("ECA"), "ECA");
        assert_eq!(platform_label("discover"), "discover");
    }

    #[test]
    fn test_new_requires_host_and_key() {
        let options = ClientOptions::default();
        let err = ApplianceClient::new("", "key", &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);
        let err = ApplianceClient::new("10.0.0.1", " ", &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);
    }

    #[test]
    fn test_new_rejects_key_with_control_characters() {
        let err = ApplianceClient::new("10.0.0.1", "bad\nkey", &ClientOptions::default())
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidApiKey { .. }));
    }

    #[test]
    fn test_device_deserialize() {
        let devices: Vec<Device> = serde_json::from_value(json!([
            {
                "id": 1,
                "default_name": "bad-name",
                "ipaddr4": "10.0.0.5",
                "display_name": "Bad Box",
                "macaddr": "",
                "extra_field": true
            },
            {
                "id": "abc",
                "default_name": null,
                "ipaddr4": null,
                "display_name": "x"
            }
        ]))
        .unwrap();

        assert_eq!(devices[0].id, "1");
        assert_eq!(devices[0].ipv4.as_deref(), Some("10.0.0.5"));
        assert_eq!(devices[0].mac_address.as_deref(), Some(""));
        assert_eq!(devices[1].id, "abc");
        assert_eq!(devices[1].default_name, "");
        assert_eq!(devices[1].ipv4, None);
        assert_eq!(devices[1].mac_address, None);
    }
}
