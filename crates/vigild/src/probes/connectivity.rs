//! TCP and HTTP reachability checks.

use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;
use vigil_common::ProbeReport;

/// Error code reported when the OS gives none (timeouts, resolver errors)
const UNKNOWN_ERROR_CODE: i32 = -1;

enum ConnectError {
    Unresolved(String),
    Io(std::io::Error),
}

async fn resolve_and_connect(host: &str, port: u16) -> Result<TcpStream, ConnectError> {
    let addr = lookup_host((host, port))
        .await
        .map_err(|e| ConnectError::Unresolved(e.to_string()))?
        .next()
        .ok_or_else(|| ConnectError::Unresolved(format!("No address found for {}", host)))?;
    TcpStream::connect(addr).await.map_err(ConnectError::Io)
}

/// TCP connect to `host:port`, name resolution included in `timeout`. A
/// refused or timed-out connect is `failed` with a non-zero `error_code`; an
/// unresolvable host is `no_data`.
pub async fn tcp_check(host: &str, port: u16, timeout: Duration) -> ProbeReport {
    let start = Instant::now();
    let report = match tokio::time::timeout(timeout, resolve_and_connect(host, port)).await {
        Ok(Ok(_stream)) => ProbeReport::connected(start.elapsed()),
        Ok(Err(ConnectError::Unresolved(reason))) => ProbeReport::no_data(reason),
        Ok(Err(ConnectError::Io(e))) => {
            let code = e.raw_os_error().unwrap_or(UNKNOWN_ERROR_CODE);
            ProbeReport::failed(format!("Connection failed with code {}", code)).with("error_code", code)
        }
        Err(_) => ProbeReport::failed(format!("Connection timed out after {}s", timeout.as_secs()))
            .with("error_code", UNKNOWN_ERROR_CODE),
    };

    debug!("TCP check {}:{} -> {:?}", host, port, report.status);
    report.with("host", host).with("port", port)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// GET `url`; 200 is `connected`, any other status `failed`, transport
/// errors `no_data`
pub async fn http_check(url: &str, timeout: Duration) -> ProbeReport {
    let client = match http_client(timeout) {
        Ok(client) => client,
        Err(e) => return ProbeReport::no_data(e.to_string()).with("url", url),
    };

    let start = Instant::now();
    match client.get(url).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => {
            ProbeReport::connected(start.elapsed()).with("url", url)
        }
        Ok(response) => {
            let code = response.status().as_u16();
            ProbeReport::failed(format!("Status code: {}", code))
                .with("status_code", code)
                .with("url", url)
        }
        Err(e) => ProbeReport::no_data(e.to_string()).with("url", url),
    }
}

/// GET a service health endpoint and record its status code and latency.
/// Any 2xx/3xx answer counts as healthy.
pub async fn service_health(url: &str, timeout: Duration) -> ProbeReport {
    let client = match http_client(timeout) {
        Ok(client) => client,
        Err(e) => return ProbeReport::no_data(e.to_string()).with("url", url),
    };

    let start = Instant::now();
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            let report = if status.is_success() || status.is_redirection() {
                ProbeReport::connected(start.elapsed())
            } else {
                ProbeReport::failed(format!("Status code: {}", status.as_u16())).with_latency(start.elapsed())
            };
            report.with("status_code", status.as_u16()).with("url", url)
        }
        Err(e) => ProbeReport::no_data(e.to_string()).with("url", url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use vigil_common::ProbeStatus;

    /// A port that was just bound and released, so nothing listens on it
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_tcp_check_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let report = tcp_check("127.0.0.1", port, Duration::from_secs(3)).await;
        assert_eq!(report.status, ProbeStatus::Connected);
        assert!(report.response_time_ms.is_some());
        assert_eq!(report.detail("port"), Some(&json!(port)));
    }

    #[tokio::test]
    async fn test_tcp_check_refused() {
        let port = closed_port().await;
        let report = tcp_check("127.0.0.1", port, Duration::from_secs(3)).await;

        assert_eq!(report.status, ProbeStatus::Failed);
        let code = report.detail("error_code").and_then(|v| v.as_i64()).unwrap();
        assert_ne!(code, 0);
    }

    #[tokio::test]
    async fn test_tcp_check_is_bounded_by_timeout() {
        // Non-routable address: either dropped (timeout) or rejected by the
        // local stack, never left hanging
        let check = tcp_check("10.255.255.1", 9, Duration::from_millis(300));
        let report = tokio::time::timeout(Duration::from_secs(5), check).await.unwrap();

        assert_eq!(report.status, ProbeStatus::Failed);
        assert!(report.detail("error_code").is_some());
    }

    #[tokio::test]
    async fn test_tcp_check_unresolvable_host_is_no_data() {
        let report = tcp_check("host.invalid", 5432, Duration::from_secs(5)).await;
        assert!(matches!(report.status, ProbeStatus::NoData | ProbeStatus::Failed));
        assert_eq!(report.detail("host"), Some(&json!("host.invalid")));
    }

    #[tokio::test]
    async fn test_http_check_unreachable_is_no_data() {
        let port = closed_port().await;
        let url = format!("http://127.0.0.1:{}/ready", port);
        let report = http_check(&url, Duration::from_secs(2)).await;

        assert_eq!(report.status, ProbeStatus::NoData);
        assert!(report.error.is_some());
        assert_eq!(report.detail("url"), Some(&json!(url)));
    }
}
