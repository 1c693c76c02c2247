use serde::Serialize;

/// Page metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: Option<usize>,
    pub total: usize,
    pub returned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Take `[offset, offset + limit)` of `items` or everything after `offset` if there is no limit.
/// An offset past the end gives an empty page.
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Page<T> {
    let total = items.len();
    let page: Vec<T> = items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    Page {
        pagination: Pagination {
            offset,
            limit,
            total,
            returned: page.len(),
        },
        items: page,
    }
}
