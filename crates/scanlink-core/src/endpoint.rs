// ── Endpoint resolution ──
//
// Pure function from the hosting page's origin plus the configured path to
// the channel URL. Re-run on every attempt so an insecure -> secure switch
// of the page is picked up by the next connection.

use url::Url;

use crate::environment::PageOrigin;
use crate::error::ChannelError;

/// Build the channel address: `wss://` for a secure page, `ws://` otherwise.
pub fn resolve(origin: &PageOrigin, path: &str) -> Result<Url, ChannelError> {
    if origin.host.is_empty() {
        return Err(ChannelError::Endpoint {
            message: "page origin has no host".into(),
        });
    }

    let scheme = if origin.secure { "wss" } else { "ws" };
    let path = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };

    Url::parse(&format!("{scheme}://{}{path}", origin.host))
        .map_err(|e| ChannelError::from(scanlink_api::Error::InvalidUrl(e)))
}
