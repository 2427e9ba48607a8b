use crate::core::{EventLogError, Result};
use crate::event::Event;
use crate::event::index::referenced_event_id;
use crate::query::{EventFetcher, KeyQuery, PageStream, QueryExecutor};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

/// Lazy, single-pass sequence of events.
///
/// Nothing is read from the store until the stream is polled, and dropping it
/// stops further round trips.
pub type EventStream = BoxStream<'static, Result<Event>>;

/// Walks the membership scans of a read one page at a time, resolving each
/// page of ids through the fetcher.
pub(crate) struct EventScan {
    executor: QueryExecutor,
    fetcher: EventFetcher,
    /// Partition scans not started yet, in visiting order.
    queries: VecDeque<KeyQuery>,
    pages: Option<PageStream>,
    ready: VecDeque<Event>,
    remaining: Option<usize>,
    descending: bool,
}

impl EventScan {
    pub(crate) fn new(
        executor: QueryExecutor,
        fetcher: EventFetcher,
        queries: Vec<KeyQuery>,
        limit: Option<usize>,
        descending: bool,
    ) -> Self {
        Self {
            executor,
            fetcher,
            queries: queries.into(),
            pages: None,
            ready: VecDeque::new(),
            remaining: limit,
            descending,
        }
    }

    pub(crate) fn into_stream(self) -> EventStream {
        stream::try_unfold(self, |mut scan| async move {
            let next = scan.next_event().await?;
            Ok::<_, EventLogError>(next.map(|event| (event, scan)))
        })
        .boxed()
    }

    async fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            if self.remaining == Some(0) {
                return Ok(None);
            }
            if let Some(event) = self.ready.pop_front() {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Ok(Some(event));
            }

            if self.pages.is_none() {
                let Some(mut query) = self.queries.pop_front() else {
                    return Ok(None);
                };
                if let Some(remaining) = self.remaining {
                    query.limit = Some(query.limit.map_or(remaining, |limit| limit.min(remaining)));
                }
                debug!(partition = %query.partition_key_value, "scanning partition");
                self.pages = Some(self.executor.find_all(query));
            }

            let Some(pages) = self.pages.as_mut() else {
                continue;
            };
            let next = pages.next().await;
            match next {
                Some(page) => self.resolve_page(page?).await?,
                None => self.pages = None,
            }
        }
    }

    async fn resolve_page(&mut self, items: Vec<crate::core::Item>) -> Result<()> {
        let mut ids = items
            .iter()
            .map(referenced_event_id)
            .collect::<Result<Vec<Uuid>>>()?;
        if let Some(remaining) = self.remaining {
            ids.truncate(remaining);
        }

        let mut events = self.fetcher.batch_get_events(&ids).await?;
        if self.descending {
            events.reverse();
        }
        self.ready.extend(events);
        Ok(())
    }
}
