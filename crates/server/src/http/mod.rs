// SPDX-License-Identifier: BSD-3-Clause

mod request;
mod response;

pub use request::{Request, RequestError, read_request};
pub use response::{Status, encode_empty_response, write_empty_response};
