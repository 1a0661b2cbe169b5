// ABOUTME: Notification channel that POSTs events as JSON over plain HTTP.
// ABOUTME: One HTTP/1 connection per event, made with hyper's low-level client.

use super::{Channel, Event, NotifyError};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Uri;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

/// POSTs each event to an `http://` endpoint.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    uri: Uri,
    host: String,
    port: u16,
}

impl WebhookChannel {
    pub fn new(url: &str) -> Result<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::InvalidConfig(format!("webhook url {}: {}", url, e)))?;

        if uri.scheme_str() != Some("http") {
            return Err(Error::InvalidConfig(format!(
                "webhook url {} must use http://",
                url
            )));
        }
        let host = uri
            .host()
            .ok_or_else(|| Error::InvalidConfig(format!("webhook url {} has no host", url)))?
            .to_string();
        let port = uri.port_u16().unwrap_or(80);

        Ok(Self { uri, host, port })
    }

    fn path(&self) -> &str {
        self.uri.path_and_query().map_or("/", |p| p.as_str())
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn label(&self) -> String {
        format!("webhook:{}:{}", self.host, self.port)
    }

    async fn deliver(&self, event: &Event) -> std::result::Result<(), NotifyError> {
        let body = serde_json::to_vec(event).map_err(|e| NotifyError::Transport(e.to_string()))?;

        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| NotifyError::Transport(format!("HTTP handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("webhook connection error: {}", e);
            }
        });

        let req = hyper::Request::builder()
            .method("POST")
            .uri(self.path())
            .header("Host", self.host.as_str())
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| NotifyError::Transport(format!("failed to build request: {}", e)))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| NotifyError::Transport(format!("request failed: {}", e)))?;

        let status = resp.status();
        // Drain the body so the connection closes cleanly
        let _ = resp.into_body().collect().await;

        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn rejects_https_and_garbage() {
        assert!(WebhookChannel::new("https://hooks.example.com/x").is_err());
        assert!(WebhookChannel::new("not a url").is_err());
    }

    #[test]
    fn defaults_to_port_80_and_root_path() {
        let channel = WebhookChannel::new("http://hooks.example.com").unwrap();
        assert_eq!(channel.port, 80);
        assert_eq!(channel.path(), "/");
    }

    #[tokio::test]
    async fn posts_event_json() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut received = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                if n == 0 || String::from_utf8_lossy(&received).contains("\"severity\"") {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&received).to_string()
        });

        let channel = WebhookChannel::new(&format!("http://127.0.0.1:{}/hook", port)).unwrap();
        channel
            .deliver(&Event::critical("apply", "rolled back"))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook HTTP/1.1"));
        assert!(request.contains("\"subject\":\"apply\""));
        assert!(request.contains("\"severity\":\"critical\""));
    }
}
