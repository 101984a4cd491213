use crate::model::Readiness;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// HTTP health probe against the worker's root URL.
///
/// Readiness means "answers 200 at the configured URL"; nothing stricter is checked, so a
/// worker that serves its landing page before it has finished initializing counts as ready.
#[derive(Debug, Clone)]
pub(crate) struct HealthProbe {
    http: reqwest::Client,
    url: String,
}

impl HealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .no_proxy()
            .user_agent(format!("devmatch-launcher/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build health probe client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Single GET; any failure (refused, timeout, non-200) is simply "not responding".
    pub async fn is_responding(&self) -> bool {
        match self.http.get(&self.url).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "worker not responding yet");
                false
            }
        }
    }
}

/// Parameters for a bounded readiness wait.
pub(crate) struct ReadinessParams<'a> {
    pub probe: &'a HealthProbe,
    pub attempts: u32,
    pub interval: Duration,
    pub shutdown: &'a CancellationToken,
}

/// Probe up to `attempts` times, `interval` apart, stopping at the first 200.
///
/// `on_miss` is called with the attempt number after every unsuccessful probe.
pub(crate) async fn wait_until_ready(
    params: ReadinessParams<'_>,
    mut on_miss: impl FnMut(u32),
) -> Readiness {
    let ReadinessParams {
        probe,
        attempts,
        interval,
        shutdown,
    } = params;

    for attempt in 1..=attempts {
        if shutdown.is_cancelled() {
            return Readiness::Interrupted;
        }
        if probe.is_responding().await {
            tracing::info!(url = probe.url(), attempt, "worker is ready");
            return Readiness::Ready { attempts: attempt };
        }
        on_miss(attempt);
        if attempt == attempts {
            break;
        }
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::warn!("readiness wait interrupted by shutdown");
                return Readiness::Interrupted;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::warn!(url = probe.url(), attempts, "timed out waiting for worker");
    Readiness::TimedOut { attempts }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP server answering every request with `status`, counting requests.
    pub(crate) async fn stub_server(status: u16) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicU32::new(0));
        serve(listener, status, hits.clone());
        (url, hits)
    }

    pub(crate) fn serve(listener: TcpListener, status: u16, hits: Arc<AtomicU32>) {
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let hits = hits.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = sock.read(&mut buf).await;
                    hits.fetch_add(1, Ordering::SeqCst);
                    let resp = format!(
                        "HTTP/1.1 {status} X\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok"
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
    }

    /// URL of a local port with nothing listening.
    pub(crate) async fn closed_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/")
    }

    fn probe(url: &str) -> HealthProbe {
        HealthProbe::new(url, Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn not_ready_when_nothing_listens() {
        let url = closed_url().await;
        let token = CancellationToken::new();
        for attempts in [0, 1, 3] {
            let outcome = wait_until_ready(
                ReadinessParams {
                    probe: &probe(&url),
                    attempts,
                    interval: Duration::from_millis(10),
                    shutdown: &token,
                },
                |_| {},
            )
            .await;
            assert_eq!(outcome, Readiness::TimedOut { attempts });
        }
    }

    #[tokio::test]
    async fn ready_within_one_interval_of_server_coming_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{addr}/");

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let listener = TcpListener::bind(addr).await.unwrap();
            serve(listener, 200, Arc::new(AtomicU32::new(0)));
        });

        let interval = Duration::from_millis(50);
        let token = CancellationToken::new();
        let started = std::time::Instant::now();
        let outcome = wait_until_ready(
            ReadinessParams {
                probe: &probe(&url),
                attempts: 100,
                interval,
                shutdown: &token,
            },
            |_| {},
        )
        .await;
        assert!(outcome.is_ready(), "{outcome:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn non_200_is_probed_exactly_attempts_times() {
        let (url, hits) = stub_server(503).await;
        let token = CancellationToken::new();
        let mut misses = Vec::new();
        let outcome = wait_until_ready(
            ReadinessParams {
                probe: &probe(&url),
                attempts: 4,
                interval: Duration::from_millis(10),
                shutdown: &token,
            },
            |n| misses.push(n),
        )
        .await;
        assert_eq!(outcome, Readiness::TimedOut { attempts: 4 });
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert_eq!(misses, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait_early() {
        let url = closed_url().await;
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let outcome = wait_until_ready(
            ReadinessParams {
                probe: &probe(&url),
                attempts: 1_000,
                interval: Duration::from_millis(20),
                shutdown: &token,
            },
            |_| {},
        )
        .await;
        assert_eq!(outcome, Readiness::Interrupted);
        assert!(token.is_cancelled());
    }
}
