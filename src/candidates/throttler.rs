use super::mention::Mention;

/// Keep/drop predicate over a tuple that already passed its matchers.
pub trait Throttler: Send + Sync {
    fn keep(&self, tuple: &[Mention<'_>]) -> bool;
}

/// All arguments on one known PDF page.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamePage;

impl Throttler for SamePage {
    fn keep(&self, tuple: &[Mention<'_>]) -> bool {
        page_span(tuple) == Some(0)
    }
}

/// Arguments at most `max_distance` pages apart. Unknown pages are dropped.
#[derive(Debug, Clone, Copy)]
pub struct MaxPageDistance {
    pub max_distance: i64,
}

impl Throttler for MaxPageDistance {
    fn keep(&self, tuple: &[Mention<'_>]) -> bool {
        page_span(tuple).is_some_and(|span| span <= self.max_distance)
    }
}

fn page_span(tuple: &[Mention<'_>]) -> Option<i64> {
    let mut pages = tuple.iter().map(Mention::page);
    let first = pages.next()??;
    let (mut low, mut high) = (first, first);
    for page in pages {
        let page = page?;
        low = low.min(page);
        high = high.max(page);
    }
    Some(high - low)
}
