//! The do-nothing restoration strategy.

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::StateRestorer;

/// Restoration turned off. Every operation succeeds without touching
/// anything; scenarios are not isolated from each other and the caller has
/// accepted that.
#[derive(Debug, Default)]
pub struct NoopRestorer;

impl NoopRestorer {
    /// Creates the no-op restorer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StateRestorer for NoopRestorer {
    async fn save(&self, _tag: &str) -> Result<()> {
        info!("state save and restoration is turned off");
        Ok(())
    }

    async fn load(&self, _tag: &str) -> Result<()> {
        info!("state save and restoration is turned off");
        Ok(())
    }

    async fn delete(&self, _tag: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_everything_is_a_no_op() {
        let restorer = NoopRestorer::new();
        restorer.save("").await.unwrap();
        restorer.load("tag").await.unwrap();
        restorer.delete("tag").await.unwrap();
    }
}
