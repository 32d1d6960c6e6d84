//! Backward pagination down to a feed's high-water mark.

use crate::error::{AppError, Result};
use crate::models::{FeedConfig, FilterConfig, Post};
use crate::pipeline::filter::exclude;
use crate::services::PostSource;

/// Collect the feed's posts newer than `mark`, newest first.
///
/// `first_page` is the page already fetched without a cursor. Excluded posts
/// are dropped and never end the walk; the first kept post with
/// `id <= mark` does. Each further page is requested with a cursor equal to
/// the id of the last post examined on the previous page, whether it was
/// kept or not. An empty page ends the walk.
pub async fn collect_new(
    source: &dyn PostSource,
    feed: &FeedConfig,
    rules: &FilterConfig,
    first_page: Vec<Post>,
    mark: u64,
) -> Result<Vec<Post>> {
    let mut accepted = Vec::new();
    let mut page = first_page;
    let mut cursor: Option<u64> = None;

    loop {
        if page.is_empty() {
            log::info!("Current results page for {} empty", feed.name);
            break;
        }

        let mut last_examined = None;
        for post in page {
            last_examined = Some(post.id);

            if let Some(reason) = exclude(&post, feed, rules) {
                log::info!(
                    "Rejected post {} in {}, {}",
                    post.id,
                    feed.name,
                    reason
                );
                continue;
            }

            if post.id <= mark {
                log::info!("{} posts in {} queue", accepted.len(), feed.name);
                return Ok(accepted);
            }

            log::debug!("Adding post id {} to {} queue", post.id, feed.name);
            accepted.push(post);
        }

        let next = last_examined.unwrap_or_default();
        if cursor.is_some_and(|previous| next >= previous) {
            return Err(AppError::upstream(
                &feed.name,
                format!("page cursor did not move past {next}"),
            ));
        }
        cursor = Some(next);

        log::info!("Reached end of page for {}, going to next", feed.name);
        page = source.fetch_page(feed, cursor).await?;
    }

    log::info!("{} posts in {} queue", accepted.len(), feed.name);
    Ok(accepted)
}
