//! `wrt launch`: ask the launchpad to start an application.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use wrt_config::Config;
use wrt_core::{AppId, LaunchRequest, RequestKind};

use crate::theme::Theme;

/// Request kind as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum KindArg {
    /// Start the application.
    Start,
    /// Open a document or URI.
    Open,
    /// Bring the application back to the foreground.
    Resume,
}

impl From<KindArg> for RequestKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Start => Self::Start,
            KindArg::Open => Self::Open,
            KindArg::Resume => Self::Resume,
        }
    }
}

/// Parse a `key=value` argument.
pub(crate) fn parse_key_value(raw: &str) -> Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected key=value, got '{raw}'");
    };
    if key.is_empty() {
        bail!("empty key in '{raw}'");
    }
    Ok((key.to_owned(), value.to_owned()))
}

/// Build the request sent for `wrt launch`.
pub(crate) fn build_request(
    app_id: &str,
    kind: KindArg,
    args: &[(String, String)],
) -> Result<LaunchRequest> {
    let app_id = AppId::new(app_id).context("invalid application id")?;
    let request = args
        .iter()
        .fold(LaunchRequest::new(app_id, kind.into()), |request, (k, v)| {
            request.with_arg(k.as_str(), v.as_str())
        });
    Ok(request)
}

/// Send the request and print the launched pid.
pub(crate) fn run_launch(config: &Config, request: &LaunchRequest) -> Result<()> {
    let socket = config.launchpad.launch_socket_path();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match runtime.block_on(send(&socket, request)) {
        Ok(pid) => {
            println!(
                "{}",
                Theme::success(&format!("{} launched as pid {pid}", request.app_id))
            );
            Ok(())
        },
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("{} failed to launch", request.app_id)));
            Err(e)
        },
    }
}

async fn send(socket: &Path, request: &LaunchRequest) -> Result<i32> {
    let pid = wrt_launchpad::request_launch(socket, request)
        .await
        .with_context(|| format!("launch via {} failed", socket.display()))?;
    Ok(pid.as_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("category=clock").unwrap(),
            ("category".to_owned(), "clock".to_owned())
        );
        assert_eq!(
            parse_key_value("start_url=file:///a?b=c").unwrap(),
            ("start_url".to_owned(), "file:///a?b=c".to_owned())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_build_request_carries_args() {
        let args = vec![("category".to_owned(), "clock".to_owned())];
        let request = build_request("org.example.clock", KindArg::Open, &args).unwrap();
        assert_eq!(request.kind, RequestKind::Open);
        assert_eq!(request.arg("category"), Some("clock"));
    }

    #[test]
    fn test_build_request_rejects_bad_id() {
        assert!(build_request("bad id!", KindArg::Start, &[]).is_err());
    }
}
