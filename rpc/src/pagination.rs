//! Cursor-based pagination for list endpoints.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Query parameters accepted by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    /// Opaque cursor from a previous response.
    pub cursor: Option<String>,
    pub count: Option<u32>,
}

impl PaginationParams {
    /// Page size clamped to `[1, MAX_PAGE_SIZE]`.
    pub fn effective_count(&self) -> u32 {
        self.count
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Offset encoded in the cursor; 0 when absent or unreadable.
    pub fn decode_offset(&self) -> u64 {
        self.cursor.as_deref().and_then(decode_cursor).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    /// Cursor for the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

pub fn encode_cursor(offset: u64) -> String {
    hex::encode(offset.to_be_bytes())
}

pub fn decode_cursor(cursor: &str) -> Option<u64> {
    let bytes: [u8; 8] = hex::decode(cursor).ok()?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Cut one page out of `items`.
pub fn paginate<T>(items: Vec<T>, params: &PaginationParams) -> (Vec<T>, PaginationMeta) {
    let offset = usize::try_from(params.decode_offset()).unwrap_or(usize::MAX);
    let count = params.effective_count() as usize;
    let total = items.len();
    let page: Vec<T> = items.into_iter().skip(offset).take(count).collect();
    let end = offset.saturating_add(page.len());
    let cursor = (end < total).then(|| encode_cursor(end as u64));
    (page, PaginationMeta { cursor })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(cursor: Option<String>, count: Option<u32>) -> PaginationParams {
        PaginationParams { cursor, count }
    }

    #[test]
    fn cursor_decodes_what_it_encodes() {
        for offset in [0u64, 1, 42, 123_456_789] {
            assert_eq!(decode_cursor(&encode_cursor(offset)), Some(offset));
        }
        assert_eq!(decode_cursor("zz"), None);
        assert_eq!(decode_cursor("00ff"), None);
    }

    #[test]
    fn effective_count_defaults_and_clamps() {
        assert_eq!(params(None, None).effective_count(), DEFAULT_PAGE_SIZE);
        assert_eq!(params(None, Some(0)).effective_count(), 1);
        assert_eq!(params(None, Some(5000)).effective_count(), MAX_PAGE_SIZE);
    }

    #[test]
    fn pages_walk_to_the_end() {
        let items: Vec<u32> = (0..5).collect();
        let (page, meta) = paginate(items.clone(), &params(None, Some(2)));
        assert_eq!(page, vec![0, 1]);
        let (page, meta) = paginate(items.clone(), &params(meta.cursor, Some(2)));
        assert_eq!(page, vec![2, 3]);
        let (page, meta) = paginate(items, &params(meta.cursor, Some(2)));
        assert_eq!(page, vec![4]);
        assert!(meta.cursor.is_none());
    }
}
