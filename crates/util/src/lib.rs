// SPDX-License-Identifier: BSD-3-Clause

pub mod codec;
pub mod conn;
