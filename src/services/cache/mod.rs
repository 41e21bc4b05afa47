pub mod token_cache;

pub use token_cache::{DEFAULT_TOKEN_CACHE_CAPACITY, TokenCache};
