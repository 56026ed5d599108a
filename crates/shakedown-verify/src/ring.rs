//! Placement ring lookups.
//!
//! The ring is consulted by running the storage service's own lookup binary
//! on a proxy node (that is where the ring files live) and parsing the
//! candidate URLs out of its report. The order of the returned URLs is
//! significant and preserved exactly: the first `replica_count` entries are
//! primary locations, the rest are handoff locations.

use shakedown_core::config::ServiceLayout;
use shakedown_exec::Executor;

use crate::error::Result;

/// Which ring a lookup goes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    /// The account ring.
    Account,
    /// The container ring.
    Container,
    /// The object ring.
    Object,
}

impl RingKind {
    /// Ring file stem, as the storage service names it.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Container => "container",
            Self::Object => "object",
        }
    }

    /// Which ring serves an entity with the given name components.
    #[must_use]
    pub fn for_entity(container: Option<&str>, object: Option<&str>) -> Self {
        match (container, object) {
            (Some(_), Some(_)) => Self::Object,
            (Some(_), None) => Self::Container,
            _ => Self::Account,
        }
    }
}

/// Builds the ring lookup command for an entity.
#[must_use]
pub fn ring_lookup_command(
    layout: &ServiceLayout,
    account: &str,
    container: Option<&str>,
    object: Option<&str>,
) -> String {
    let ring = RingKind::for_entity(container, object);
    let mut cmd = format!(
        "{} -a {}/{}.ring.gz {}",
        layout.ring_lookup_bin,
        layout.ring_dir,
        ring.as_str(),
        account
    );
    if let Some(c) = container {
        cmd.push(' ');
        cmd.push_str(c);
        if let Some(o) = object {
            cmd.push(' ');
            cmd.push_str(o);
        }
    }
    cmd
}

/// Extracts the ordered candidate replica URLs from ring lookup output.
///
/// The lookup report prints one probe command per candidate location, e.g.
///
/// ```text
/// curl -g -I -XHEAD "http://10.0.0.2:6000/vdb1/815/AUTH_test/c1/f1.txt"
/// curl -g -I -XHEAD "http://10.0.0.3:6000/vdc/815/AUTH_test/c1/f1.txt" # [Handoff]
/// ```
///
/// The URL is the last token before any trailing `#` comment. Output order
/// is preserved: it encodes primary-before-handoff.
#[must_use]
pub fn parse_replica_urls(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| line.contains("curl"))
        .filter_map(|line| {
            let before_comment = line.split('#').next().unwrap_or("");
            before_comment
                .split_whitespace()
                .last()
                .map(|token| token.trim_matches('"').to_string())
        })
        .filter(|url| !url.is_empty())
        .collect()
}

/// Runs a ring lookup on the proxy and returns the ordered candidate URLs.
pub async fn replica_urls(
    proxy: &dyn Executor,
    layout: &ServiceLayout,
    account: &str,
    container: Option<&str>,
    object: Option<&str>,
) -> Result<Vec<String>> {
    let cmd = ring_lookup_command(layout, account, container, object);
    let output = proxy.run(&cmd).await?;
    Ok(parse_replica_urls(&output.stdout))
}
