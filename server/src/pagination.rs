use sea_orm::{ConnectionTrait, DbErr, Paginator, SelectorTrait};

/// One page of results together with the pagination context the list
/// templates need.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number.
    pub number: u64,
    pub total_pages: u64,
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn is_paginated(&self) -> bool {
        self.total_pages > 1
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn previous_number(&self) -> u64 {
        self.number.saturating_sub(1).max(1)
    }

    pub fn next_number(&self) -> u64 {
        (self.number + 1).min(self.total_pages.max(1))
    }

    /// Converts the page items while keeping the pagination context.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            total_pages: self.total_pages,
            total_items: self.total_items,
        }
    }
}

/// Fetches the requested page from a paginator.
///
/// Page numbers are 1-based; out-of-range requests are clamped into
/// `[1, total_pages]` rather than failing, so a stale `?page=` link after a
/// deletion still renders the last page.
pub async fn fetch_page<C, S>(
    paginator: &Paginator<'_, C, S>,
    requested: u64,
) -> Result<Page<S::Item>, DbErr>
where
    C: ConnectionTrait,
    S: SelectorTrait,
{
    let counts = paginator.num_items_and_pages().await?;
    let number = requested.clamp(1, counts.number_of_pages.max(1));
    let items = paginator.fetch_page(number - 1).await?;
    Ok(Page {
        items,
        number,
        total_pages: counts.number_of_pages,
        total_items: counts.number_of_items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of(number: u64, total_pages: u64) -> Page<u32> {
        Page {
            items: Vec::new(),
            number,
            total_pages,
            total_items: total_pages * 5,
        }
    }

    #[test]
    fn single_page_is_not_paginated() {
        let page = page_of(1, 1);
        assert!(!page.is_paginated());
        assert!(!page.has_previous());
        assert!(!page.has_next());
    }

    #[test]
    fn middle_page_links_both_ways() {
        let page = page_of(2, 3);
        assert!(page.is_paginated());
        assert!(page.has_previous());
        assert!(page.has_next());
        assert_eq!(page.previous_number(), 1);
        assert_eq!(page.next_number(), 3);
    }

    #[test]
    fn last_page_has_no_next() {
        let page = page_of(3, 3);
        assert!(page.has_previous());
        assert!(!page.has_next());
        assert_eq!(page.next_number(), 3);
    }

    #[test]
    fn map_preserves_pagination_context() {
        let page = Page {
            items: vec![1u32, 2, 3],
            number: 2,
            total_pages: 4,
            total_items: 18,
        };
        let mapped = page.map(|n| n.to_string());
        assert_eq!(mapped.items, vec!["1", "2", "3"]);
        assert_eq!(mapped.number, 2);
        assert_eq!(mapped.total_pages, 4);
        assert_eq!(mapped.total_items, 18);
    }
}
