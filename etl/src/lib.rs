pub mod client;
pub mod fetcher;
pub mod models;
pub mod utils;

pub use client::{HttpPageSource, PageSource};
pub use fetcher::{FetchError, Fetcher};
pub use models::BreweryRecord;
pub use utils::retry::RetryPolicy;
pub use utils::time::{RecordingSleeper, Sleeper, TokioSleeper};
