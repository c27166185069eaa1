use std::time::Duration;

use errors::Result;
use uuid::Uuid;

use crate::retry::with_retry;
use crate::Store;

/// Retry bursts are short; a counter nobody touched for this long belongs to
/// a finished burst.
const RETRY_TTL: Duration = Duration::from_secs(5 * 60);

impl Store {
    /// Bumps the fast-retry counter for a monitor, re-arming its TTL, and
    /// returns the new count. Absence of the key means no active burst.
    pub async fn increment_retry(&self, id: Uuid) -> Result<i64> {
        let key = Self::retry_key(id);
        let key = key.as_str();
        let backend = self.backend();
        let count = with_retry(2, || async move {
            let count = backend.incr(key).await?;
            backend.expire(key, RETRY_TTL).await?;
            Ok(count)
        })
        .await?;
        Ok(count)
    }

    pub async fn clear_retry(&self, id: Uuid) -> Result<()> {
        let key = Self::retry_key(id);
        let key = key.as_str();
        with_retry(2, || self.backend().del(key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_up_and_clears() {
        let store = Store::memory();
        let id = Uuid::new_v4();

        assert_eq!(store.increment_retry(id).await.unwrap(), 1);
        assert_eq!(store.increment_retry(id).await.unwrap(), 2);
        assert_eq!(store.increment_retry(id).await.unwrap(), 3);

        store.clear_retry(id).await.unwrap();
        assert_eq!(store.increment_retry(id).await.unwrap(), 1);
    }
}
