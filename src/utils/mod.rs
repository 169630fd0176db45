pub mod mapping_cache;
pub mod mapping_filter;
