// SPDX-License-Identifier: BSD-3-Clause

pub mod client;
pub mod mock_conn;
pub mod suite;
pub mod tls;

pub use client::{ResponseHead, TestClient};
pub use mock_conn::{MockConn, MockConnHandle, Unhijackable};
pub use suite::{SseSuite, default_sse_config};

/// Asserts that a response head carries the expected status code.
///
/// # Panics
///
/// Panics with the full status line if the code does not match.
#[macro_export]
macro_rules! assert_status {
  ($head:expr, $code:expr) => {
    let head = &$head;
    assert_eq!(head.status, $code, "unexpected response: {}", head.status_line);
  };
}
