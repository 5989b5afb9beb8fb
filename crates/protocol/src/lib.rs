// SPDX-License-Identifier: BSD-3-Clause

mod event;
mod serialize;
mod stream;

pub use event::Event;
pub use serialize::{serialize, write_event};
pub use stream::*;
