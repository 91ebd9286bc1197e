use std::env;
use std::process::Command;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=.git/HEAD");

    for (key, value) in [
        ("GIT_SHA", git_sha()),
        ("BUILD_DATE", build_date()),
        ("CODEC_BACKEND", codec_backend().to_string()),
    ] {
        println!("cargo:rustc-env={key}={value}");
    }
}

fn git_sha() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reproducible builds pin the date through `SOURCE_DATE_EPOCH`.
fn build_date() -> String {
    env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown-date".to_string())
}

/// Native codec linked into this build, from the enabled cargo features.
fn codec_backend() -> &'static str {
    if env::var_os("CARGO_FEATURE_LIBOPUS").is_some() {
        "libopus"
    } else {
        "none"
    }
}
