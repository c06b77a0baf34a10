//! Viewport visibility over the virtualized list.

use tracing::{debug, warn};

use crate::infrastructure::page::HistoryPage;

/// Reports which coupons are currently rendered inside the list viewport,
/// in DOM order (newest first given the list's default ordering).
///
/// Fails soft: a read error yields an empty batch, which the engine treats
/// as an empty scroll step rather than a fatal condition.
pub struct VisibilityTracker<'a, P: HistoryPage + ?Sized> {
    page: &'a P,
}

impl<'a, P: HistoryPage + ?Sized> VisibilityTracker<'a, P> {
    #[must_use]
    pub fn new(page: &'a P) -> Self {
        Self { page }
    }

    pub async fn visible_ids(&self) -> Vec<String> {
        match self.page.visible_coupons().await {
            Ok(ids) => {
                debug!("{} coupons in viewport", ids.len());
                ids
            }
            Err(err) => {
                warn!("visibility read failed, treating viewport as empty: {err}");
                Vec::new()
            }
        }
    }
}
