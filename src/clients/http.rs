use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;
use tracing::warn;

use crate::config::HttpSettings;
use crate::error::ApiError;

/// HTTP client using curl for making JSON API requests.
///
/// Transient failures (timeouts, connection errors, 429 and 5xx) are retried
/// with exponential backoff; everything else is returned on the first attempt.
pub struct CurlClient {
    /// Extra request headers, e.g. `Authorization: Bearer ...`.
    headers: Vec<String>,
    settings: HttpSettings,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

impl CurlClient {
    pub fn new(headers: Vec<String>, settings: HttpSettings) -> Self {
        Self { headers, settings }
    }

    pub async fn get(&self, url: &str) -> Result<String, ApiError> {
        self.send("GET", url, None).await
    }

    pub async fn post(&self, url: &str, json_data: &str) -> Result<String, ApiError> {
        self.send("POST", url, Some(json_data)).await
    }

    pub async fn patch(&self, url: &str, json_data: &str) -> Result<String, ApiError> {
        self.send("PATCH", url, Some(json_data)).await
    }

    async fn send(&self, method: &str, url: &str, body: Option<&str>) -> Result<String, ApiError> {
        let mut delay = self.settings.backoff;
        let mut attempt = 0;
        loop {
            match self.send_once(method, url, body).await {
                Err(err) if err.is_transient() && attempt < self.settings.retries => {
                    attempt += 1;
                    warn!(
                        "{} {} failed ({}), retrying in {:?} ({}/{})",
                        method, url, err, delay, attempt, self.settings.retries
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                result => return result,
            }
        }
    }

    async fn send_once(
        &self,
        method: &str,
        url: &str,
        body: Option<&str>,
    ) -> Result<String, ApiError> {
        debug!("{} {}", method, url);
        let mut command = Command::new("curl");
        command
            .args(["-s", "-S", "-w", "\n%{http_code}", "-X", method])
            .args(["--max-time", &self.settings.timeout.as_secs().max(1).to_string()])
            .args(["-H", "Accept: application/json", "-H", "User-Agent: gitops-pr"]);
        for header in &self.headers {
            command.args(["-H", header]);
        }
        if let Some(body) = body {
            command.args(["-H", "Content-Type: application/json", "-d", body]);
        }
        command.arg(url).kill_on_drop(true);

        let output = command
            .output()
            .await
            .map_err(|e| ApiError::definitive(None, format!("Failed to execute curl command: {e}")))?;

        if !output.status.success() {
            let message = format!(
                "curl command failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(match output.status.code() {
                Some(code) if is_transient_curl_exit(code) => ApiError::transient(None, message),
                _ => ApiError::definitive(None, message),
            });
        }

        parse_response(&output.stdout)
    }
}

/// curl exit codes for failures to resolve, connect, time out or finish a transfer.
fn is_transient_curl_exit(code: i32) -> bool {
    matches!(code, 6 | 7 | 28 | 35 | 52 | 55 | 56)
}

/// Parse curl output with the status code appended on the last line.
pub(crate) fn parse_response(stdout: &[u8]) -> Result<String, ApiError> {
    let output_str = String::from_utf8_lossy(stdout);
    let (response, status) = output_str
        .rsplit_once('\n')
        .unwrap_or(("", output_str.as_ref()));
    let status_code = status.trim().parse::<u16>().unwrap_or(0);

    if status_code == 0 {
        return Err(ApiError::transient(None, "no HTTP status in response"));
    }
    if status_code < 400 {
        return Ok(response.to_string());
    }

    let message = match serde_json::from_str::<ErrorBody>(response) {
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => format!("API error ({status_code}): {message}"),
        Ok(ErrorBody { errors, .. }) if !errors.is_empty() => {
            let errors = errors
                .iter()
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .collect::<Vec<_>>()
                .join("; ");
            format!("API error ({status_code}): {errors}")
        }
        _ => format!("API request failed with status {status_code}: {response}"),
    };

    if status_code == 429 || status_code >= 500 {
        Err(ApiError::transient(Some(status_code), message))
    } else {
        Err(ApiError::definitive(Some(status_code), message))
    }
}
