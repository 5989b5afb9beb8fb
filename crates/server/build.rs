// SPDX-License-Identifier: BSD-3-Clause

use std::env;
use std::process::Command;

const UNKNOWN: &str = "unknown";

fn main() {
  let commit_hash = build_env("GIT_COMMIT_HASH").unwrap_or_else(|| git(&["rev-parse", "--short", "HEAD"]));
  let branch_name = build_env("GIT_BRANCH_NAME").unwrap_or_else(|| git(&["rev-parse", "--abbrev-ref", "HEAD"]));

  println!("cargo:rustc-env=GIT_COMMIT_HASH={}", commit_hash);
  println!("cargo:rustc-env=GIT_BRANCH_NAME={}", branch_name);

  // Builds outside a checkout (e.g. from a source tarball) set these by hand.
  println!("cargo:rerun-if-env-changed=GIT_COMMIT_HASH");
  println!("cargo:rerun-if-env-changed=GIT_BRANCH_NAME");
  println!("cargo:rerun-if-changed=.git/HEAD");
}

fn build_env(name: &str) -> Option<String> {
  env::var(name).ok().filter(|value| !value.is_empty())
}

fn git(args: &[&str]) -> String {
  match Command::new("git").args(args).output() {
    Ok(output) if output.status.success() => {
      let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
      if value.is_empty() { UNKNOWN.to_string() } else { value }
    },
    _ => UNKNOWN.to_string(),
  }
}
