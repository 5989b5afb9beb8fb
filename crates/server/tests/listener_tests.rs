// SPDX-License-Identifier: BSD-3-Clause

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use eventsource_protocol::Event;
use eventsource_server::http::Request;
use eventsource_server::sse::{EventSender, Producer, Router, producer_fn};
use eventsource_test_util::{SseSuite, assert_status, default_sse_config};

/// Sends a fixed list of events, then idles until cancelled.
struct ScriptedProducer {
  events: Vec<Event>,
}

#[async_trait]
impl Producer for ScriptedProducer {
  async fn stream(&self, _request: Request, tx: EventSender, done: CancellationToken) {
    for event in self.events.iter().cloned() {
      if tx.send(event).await.is_err() {
        return;
      }
    }
    done.cancelled().await;
  }
}

fn scripted_producer(events: Vec<Event>) -> ScriptedProducer {
  ScriptedProducer { events }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_over_tcp() -> anyhow::Result<()> {
  let mut config = default_sse_config();
  config.retry_interval = 1500;

  let events = vec![Event::new("one").with_id("1"), Event::new("two\nlines").with_kind("update")];

  let mut suite = SseSuite::with_producer(config, scripted_producer(events));
  suite.setup().await?;

  let mut client = suite.connect().await?;
  client.get("/stream").await?;

  let head = client.read_response_head().await?;
  assert_status!(head, 200);
  assert_eq!(head.header("content-type"), Some("text/event-stream"));
  assert_eq!(head.header("cache-control"), Some("no-cache"));
  assert_eq!(head.header("connection"), Some("close"));
  assert_eq!(head.header("transfer-encoding"), Some("identity"));

  assert_eq!(client.expect_line().await?, "retry:1500");
  assert_eq!(client.read_event().await?, vec!["data:one", "id:1"]);
  assert_eq!(client.read_event().await?, vec!["event:update", "data:two", "data:lines"]);

  suite.teardown().await?;

  // Shutdown closes every live stream.
  client.read_to_end().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_producer_finishing_closes_connection() -> anyhow::Result<()> {
  let producer = producer_fn(|_, tx, _| async move {
    let _ = tx.send("bye").await;
  });

  let mut suite = SseSuite::with_producer(default_sse_config(), producer);
  suite.setup().await?;

  let mut client = suite.open_stream().await?;

  assert_eq!(client.read_event().await?, vec!["data:bye"]);
  client.read_to_end().await?;

  suite.teardown().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_heartbeat_over_tcp() -> anyhow::Result<()> {
  let mut config = default_sse_config();
  config.keep_alive_interval = Duration::from_millis(100);

  let mut suite = SseSuite::with_producer(config, scripted_producer(vec![]));
  suite.setup().await?;

  let mut client = suite.open_stream().await?;

  assert_eq!(client.expect_line().await?, ":");
  assert_eq!(client.expect_line().await?, ":");

  suite.teardown().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_responses() -> anyhow::Result<()> {
  struct TestCase {
    name: &'static str,
    raw: &'static [u8],
    expected_status: u16,
  }

  let test_cases = vec![
    TestCase { name: "unknown path", raw: b"GET /missing HTTP/1.1\r\nHost: localhost\r\n\r\n", expected_status: 404 },
    TestCase { name: "non-GET method", raw: b"POST /stream HTTP/1.1\r\nHost: localhost\r\n\r\n", expected_status: 405 },
    TestCase { name: "garbage", raw: b"hello there\r\n\r\n", expected_status: 400 },
    TestCase { name: "unsupported version", raw: b"GET /stream HTTP/2.0\r\n\r\n", expected_status: 400 },
  ];

  let mut suite = SseSuite::with_producer(default_sse_config(), scripted_producer(vec![]));
  suite.setup().await?;

  for test_case in test_cases {
    let mut client = suite.connect().await?;
    client.write_raw(test_case.raw).await?;

    let head = client.read_response_head().await?;
    assert_eq!(head.status, test_case.expected_status, "test case: {}", test_case.name);
    assert_eq!(head.header("content-length"), Some("0"), "test case: {}", test_case.name);

    if test_case.expected_status == 405 {
      assert_eq!(head.header("allow"), Some("GET"));
    }

    client.read_to_end().await?;
  }

  suite.teardown().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_head_too_large() -> anyhow::Result<()> {
  let mut config = default_sse_config();
  config.limits.max_request_head_size = 128;

  let mut suite = SseSuite::with_producer(config, scripted_producer(vec![]));
  suite.setup().await?;

  let mut client = suite.connect().await?;
  let request = format!("GET /stream HTTP/1.1\r\nX-Filler: {}\r\n\r\n", "a".repeat(256));
  client.write_raw(request.as_bytes()).await?;

  let head = client.read_response_head().await?;
  assert_status!(head, 431);

  suite.teardown().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_limit() -> anyhow::Result<()> {
  let mut config = default_sse_config();
  config.limits.max_connections = 1;

  let mut suite = SseSuite::with_producer(config, scripted_producer(vec![]));
  suite.setup().await?;

  let _first = suite.open_stream().await?;

  let mut second = suite.connect().await?;
  second.get("/stream").await?;

  let head = second.read_response_head().await?;
  assert_status!(head, 503);
  second.read_to_end().await?;

  suite.teardown().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_limit_over_tls() -> anyhow::Result<()> {
  let mut config = default_sse_config();
  config.listener.tls = true;
  config.limits.max_connections = 1;

  let mut suite = SseSuite::with_producer(config, scripted_producer(vec![]));
  suite.setup().await?;

  let mut first = suite.tls_connect().await?;
  first.get("/stream").await?;
  assert_status!(first.read_response_head().await?, 200);

  // No handshake is performed over the limit.
  assert!(suite.tls_connect().await.is_err());

  suite.teardown().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bootstrap_rejects_invalid_setup() -> anyhow::Result<()> {
  let mut config = default_sse_config();
  config.limits.max_request_head_size = 0;

  let mut suite = SseSuite::with_producer(config, scripted_producer(vec![]));
  assert!(suite.setup().await.is_err());

  let mut suite = SseSuite::new(default_sse_config(), Router::new());
  assert!(suite.setup().await.is_err());

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_read_timeout() -> anyhow::Result<()> {
  let mut config = default_sse_config();
  config.request_read_timeout = Duration::from_millis(100);

  let mut suite = SseSuite::with_producer(config, scripted_producer(vec![]));
  suite.setup().await?;

  // Send an incomplete head and wait for the server to give up.
  let mut client = suite.connect().await?;
  client.write_raw(b"GET /stream HTTP/1.1\r\n").await?;

  client.read_to_end().await?;

  suite.teardown().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_disconnect_cancels_producer() -> anyhow::Result<()> {
  let stopped = CancellationToken::new();

  let producer = producer_fn({
    let stopped = stopped.clone();
    move |_, tx, done| {
      let stopped = stopped.clone();
      async move {
        let mut n = 0;
        loop {
          tokio::select! {
            res = tx.send(format!("{}", n)) => {
              if res.is_err() {
                break;
              }
            },
            _ = done.cancelled() => break,
          }
          tokio::time::sleep(Duration::from_millis(10)).await;
          n += 1;
        }
        stopped.cancel();
      }
    }
  });

  let mut suite = SseSuite::with_producer(default_sse_config(), producer);
  suite.setup().await?;

  let mut client = suite.open_stream().await?;
  assert_eq!(client.read_event().await?, vec!["data:0"]);

  drop(client);

  tokio::time::timeout(Duration::from_secs(5), stopped.cancelled()).await?;

  suite.teardown().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_over_tls() -> anyhow::Result<()> {
  let mut config = default_sse_config();
  config.listener.tls = true;

  let mut suite = SseSuite::with_producer(config, scripted_producer(vec![Event::new("secure")]));
  suite.setup().await?;

  let mut client = suite.tls_connect().await?;
  client.get("/stream").await?;

  let head = client.read_response_head().await?;
  assert_status!(head, 200);

  assert_eq!(client.expect_line().await?, "retry:5000");
  assert_eq!(client.read_event().await?, vec!["data:secure"]);

  suite.teardown().await?;

  Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tls_requires_certificate_outside_localhost() -> anyhow::Result<()> {
  let mut config = default_sse_config();
  config.listener.tls = true;
  config.listener.domain = "events.example.org".to_string();

  let mut suite = SseSuite::with_producer(config, scripted_producer(vec![]));
  assert!(suite.setup().await.is_err());

  Ok(())
}
