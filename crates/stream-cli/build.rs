use std::process::Command;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Stamp the binary with the short commit hash and a build date for `--version`.
fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=.git/HEAD");

    println!("cargo:rustc-env=GIT_SHA={}", git_short_sha());
    println!("cargo:rustc-env=BUILD_DATE={}", build_date());
}

fn git_short_sha() -> String {
    let out = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output();
    match out {
        Ok(out) if out.status.success() => {
            let sha = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if sha.is_empty() { "unknown".to_string() } else { sha }
        }
        _ => "unknown".to_string(),
    }
}

/// Honors `SOURCE_DATE_EPOCH` for reproducible builds.
fn build_date() -> String {
    let when = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    when.format(&Rfc3339)
        .unwrap_or_else(|_| "unknown-date".to_string())
}
