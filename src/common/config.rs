/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Upper bound on the header page depth. The header page stores
/// `2^max_depth` directory page ids, so 9 bits fills a 4 KB page.
pub const HASH_HEADER_MAX_DEPTH: u32 = 9;

/// Upper bound on the directory page depth. The directory stores
/// `2^max_depth` local depths and bucket page ids side by side.
pub const HASH_DIRECTORY_MAX_DEPTH: u32 = 9;

use super::types::PageId;
