// SPDX-License-Identifier: BSD-3-Clause

/// The package version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The abbreviated hash of the commit the binary was built from.
pub const GIT_COMMIT_HASH: &str = env!("GIT_COMMIT_HASH");

/// The branch the binary was built from.
pub const GIT_BRANCH_NAME: &str = env!("GIT_BRANCH_NAME");

/// The version shown by `--version`, build provenance included.
pub const LONG_VERSION: &str =
  concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), " ", env!("GIT_BRANCH_NAME"), ")");
