//! Client side of the launch socket.

use std::path::Path;

use nix::unistd::Pid;
use tokio::net::UnixStream;
use tracing::debug;

use wrt_core::LaunchRequest;

use crate::error::{LaunchpadError, LaunchpadResult};
use crate::protocol;

/// Ask the daemon listening on `socket` to launch `request`.
///
/// # Errors
///
/// Returns an I/O error if the daemon cannot be reached, or
/// [`LaunchpadError::LaunchRejected`] with the daemon's code if it refused.
pub async fn request_launch(socket: &Path, request: &LaunchRequest) -> LaunchpadResult<Pid> {
    let mut stream = UnixStream::connect(socket).await?;
    protocol::write_launch_request(&mut stream, request).await?;
    let code = protocol::read_reply(&mut stream).await?;
    debug!(code, app_id = %request.app_id, "launchpad replied");
    if code > 0 {
        Ok(Pid::from_raw(code))
    } else {
        Err(LaunchpadError::LaunchRejected(code))
    }
}
